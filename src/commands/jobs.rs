use crate::output::{emit_output, is_json_mode};
use crate::utils::{get_vault_client, get_vault_pair, handle_error, handle_restore_error, spinner};
use crate::vault_clients::{Job, JobAction, short_id};
use bytesize::ByteSize;
use clap::ArgMatches;
use console::style;
use futures::future::try_join;
use tabled::{Table, Tabled};

#[derive(Tabled)]
struct JobRow {
    vault: String,
    job: String,
    action: String,
    target: String,
    status: String,
    size: String,
    created: String,
}

impl From<&Job> for JobRow {
    fn from(job: &Job) -> Self {
        let target = match (&job.action, &job.archive_id) {
            (JobAction::ArchiveRetrieval, Some(id)) => short_id(id).to_string(),
            _ => "inventory".to_string(),
        };

        Self {
            vault: job.vault.clone(),
            job: short_id(&job.id).to_string(),
            action: job.action.to_string(),
            target,
            status: job.status.to_string(),
            size: job
                .output_size
                .map(|size| ByteSize(size).to_string())
                .unwrap_or_default(),
            created: job.created_at.clone().unwrap_or_default(),
        }
    }
}

pub async fn jobs(matches: &ArgMatches) {
    let (client, region) = match get_vault_client(matches).await {
        Ok(client) => client,
        Err(e) => handle_error(e, None),
    };

    let pb = spinner("Looking for the backup vaults...");

    let pair = match get_vault_pair(client.as_ref(), matches, &region).await {
        Ok(pair) => pair,
        Err(e) => handle_restore_error(e, Some(&pb)),
    };

    pb.set_message(format!("Listing jobs of {} and {}...", pair.data, pair.mapping));

    let (data_jobs, mapping_jobs) =
        match try_join(client.list_jobs(&pair.data), client.list_jobs(&pair.mapping)).await {
            Ok(jobs) => jobs,
            Err(e) => handle_restore_error(e, Some(&pb)),
        };

    pb.finish_and_clear();

    let all: Vec<Job> = mapping_jobs.into_iter().chain(data_jobs).collect();

    if is_json_mode() {
        emit_output(&all);
        return;
    }

    if all.is_empty() {
        println!(
            "{}",
            style(format!(
                "No retrieval jobs in {} or {}.",
                pair.data, pair.mapping
            ))
            .yellow()
        );
        return;
    }

    let rows: Vec<JobRow> = all.iter().map(JobRow::from).collect();
    println!("{}", Table::new(rows));

    let running = all.iter().filter(|job| !job.completed).count();
    if running > 0 {
        println!(
            "{} job(s) still running. Retrieval usually takes 3 to 5 hours.",
            style(running).cyan()
        );
    }
}
