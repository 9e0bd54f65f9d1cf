use crate::core::jobs::RetrievalJobTracker;
use crate::core::mapping::{MappingAcquirer, mapping_path};
use crate::core::metadata::{BackupInfo, FileRecord, MappingDatabase};
use crate::core::only::{OnlyRequest, parse_only_request, selector_for};
use crate::core::restore::{FileState, RestoreOrchestrator, RestoreProgress, RestoreReport};
use crate::core::retriever::BlockingRetriever;
use crate::core::selection::{SelectionStats, plan};
use crate::core::sqlite::SqliteMappingStore;
use crate::core::tree::build_tree;
use crate::core::vaults::VaultPair;
use crate::error::{RestoreError, Result};
use crate::output::{JsonProgress, emit_file_state, emit_output, emit_warning, is_json_mode};
use crate::signal::spawn_shutdown_listener;
use crate::utils::{
    finish_spinner, format_wait, get_pwd_string, get_vault_client, get_vault_pair, handle_error,
    handle_restore_error, spinner,
};
use bytesize::ByteSize;
use clap::ArgMatches;
use console::style;
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub(crate) struct MappingParams {
    pub(crate) target_path: PathBuf,
    pub(crate) offline: bool,
    pub(crate) timeout: Option<Duration>,
}

struct RestoreParams {
    mapping: MappingParams,
    only: OnlyRequest,
    yes: bool,
}

#[derive(Serialize)]
struct RestorePlanOutput<'a> {
    vault: &'a str,
    target_path: String,
    selection: SelectionStats,
}

#[derive(Serialize)]
struct RestoreSummary<'a> {
    vault: &'a str,
    target_path: String,
    restored_files: usize,
    restored_bytes: u64,
    failed_files: usize,
    cancelled: bool,
    files: &'a RestoreReport,
}

#[derive(Serialize)]
struct FileEvent<'a> {
    index: usize,
    path: &'a str,
    archive_id: &'a str,
    #[serde(flatten)]
    state: &'a FileState,
}

pub async fn restore(matches: &ArgMatches) {
    let params = match get_params(matches) {
        Ok(params) => params,
        Err(e) => handle_error(e, None),
    };

    let (client, region) = match get_vault_client(matches).await {
        Ok(client) => client,
        Err(e) => handle_error(e, None),
    };

    let cancel = CancellationToken::new();
    spawn_shutdown_listener(cancel.clone());

    let pb = spinner("Looking for the backup vaults...");

    let pair = match get_vault_pair(client.as_ref(), matches, &region).await {
        Ok(pair) => pair,
        Err(e) => handle_restore_error(e, Some(&pb)),
    };

    let retriever = BlockingRetriever::new(RetrievalJobTracker::new(client), cancel)
        .with_timeout(params.mapping.timeout);

    let database = match load_mapping(&retriever, &pair, &params.mapping, &pb).await {
        Ok(database) => database,
        Err(e) => handle_restore_error(e, Some(&pb)),
    };

    finish_spinner(
        &pb,
        &format!(
            "Loaded the mapping of {} ({} files, {})",
            pair.data,
            database.files.len(),
            ByteSize(database.total_size())
        ),
    );

    let tree = build_tree(&root_label(&database.info, &pair.data), &database.files);
    let selector = selector_for(params.only);

    let selection = match plan(&tree, selector.as_ref()) {
        Ok(selection) => selection,
        Err(RestoreError::SelectionCancelled) => {
            println!("{}", style("Restore cancelled.").yellow());
            return;
        }
        Err(e) => handle_restore_error(e, None),
    };

    if selection.is_empty() {
        if is_json_mode() {
            emit_output(&RestorePlanOutput {
                vault: &pair.data,
                target_path: params.mapping.target_path.display().to_string(),
                selection: selection.stats,
            });
        } else {
            println!("{}", style("Nothing selected, nothing to restore.").yellow());
        }
        return;
    }

    if is_json_mode() {
        emit_output(&RestorePlanOutput {
            vault: &pair.data,
            target_path: params.mapping.target_path.display().to_string(),
            selection: selection.stats,
        });
    } else {
        print_selection(&selection.stats, &params.mapping.target_path);

        if !params.yes {
            let confirmed = Confirm::new()
                .with_prompt("Start the restore?")
                .default(true)
                .interact()
                .unwrap_or_else(|e| handle_error(e.to_string(), None));

            if !confirmed {
                println!("{}", style("Restore cancelled.").yellow());
                return;
            }
        }
    }

    let orchestrator = RestoreOrchestrator::new(&retriever, &pair.data, &params.mapping.target_path);
    let progress = RestoreBar::new(selection.files.len() as u64);

    let report = orchestrator.restore(&selection.files, &progress).await;

    progress.finish();

    print_summary(&pair.data, &params.mapping.target_path, &report);
}

/// Acquires the mapping of `pair`, keeping `pb` informed while retrieval
/// jobs are pending.
pub(crate) async fn load_mapping(
    retriever: &BlockingRetriever,
    pair: &VaultPair,
    params: &MappingParams,
    pb: &ProgressBar,
) -> Result<MappingDatabase> {
    pb.set_message(format!("Loading the mapping from {}...", pair.mapping));

    if params.offline && !mapping_path(&params.target_path).is_file() {
        pb.suspend(|| {
            emit_warning(
                &format!(
                    "No mapping found in {}, downloading it from {}",
                    params.target_path.display(),
                    pair.mapping
                ),
                "mapping_not_found",
            )
        });
    }

    let acquirer = MappingAcquirer::new(retriever, Arc::new(SqliteMappingStore));
    let on_wait = |target: &crate::vault_clients::JobTarget, wait: Duration| {
        pb.set_message(format!(
            "Waiting for the {} job in {} (next check in {})",
            target,
            pair.mapping,
            format_wait(wait)
        ));
    };

    acquirer
        .acquire(
            &pair.data,
            &pair.mapping,
            &params.target_path,
            params.offline,
            &on_wait,
        )
        .await
}

fn root_label(info: &BackupInfo, vault: &str) -> String {
    [info.source_folder(), info.task_name()]
        .into_iter()
        .flatten()
        .find(|label| !label.trim().is_empty())
        .unwrap_or(vault)
        .to_string()
}

fn print_selection(stats: &SelectionStats, target_path: &Path) {
    println!(
        "Selected {} folder(s) and {} file(s), {} in total.",
        style(stats.folders).cyan(),
        style(stats.files).cyan(),
        style(ByteSize(stats.bytes)).cyan()
    );
    println!("Files will be restored below {}.", style(target_path.display()).bold());
    println!(
        "{}",
        style("Each file needs its own retrieval job, which usually takes 3 to 5 hours.").dim()
    );
}

fn print_summary(vault: &str, target_path: &Path, report: &RestoreReport) {
    let failed: Vec<_> = report.failed().collect();

    if is_json_mode() {
        emit_output(&RestoreSummary {
            vault,
            target_path: target_path.display().to_string(),
            restored_files: report.restored().count(),
            restored_bytes: report.restored_bytes(),
            failed_files: failed.len(),
            cancelled: report.cancelled,
            files: report,
        });

        if report.cancelled {
            handle_restore_error(RestoreError::Cancelled, None);
        }
        if !failed.is_empty() {
            std::process::exit(1);
        }
        return;
    }

    println!(
        "{} Restored {} file(s), {}",
        style("✓").green(),
        report.restored().count(),
        ByteSize(report.restored_bytes())
    );

    if report.cancelled {
        let remaining = report
            .files
            .iter()
            .filter(|file| file.state == FileState::Queued)
            .count();
        println!(
            "{}",
            style(format!("Interrupted, {} file(s) were not restored.", remaining)).yellow()
        );
    }

    if !failed.is_empty() {
        handle_error(
            format!(
                "Failed to restore {} files:\n{}",
                failed.len(),
                failed
                    .iter()
                    .map(|file| match &file.state {
                        FileState::Failed(reason) => format!("  - {}: {}", file.base_path, reason),
                        _ => format!("  - {}", file.base_path),
                    })
                    .collect::<Vec<String>>()
                    .join("\n")
            ),
            None,
        );
    }

    if report.cancelled {
        std::process::exit(130);
    }
}

/// indicatif bar in interactive mode, JSON events otherwise.
struct RestoreBar {
    pb: ProgressBar,
    json: Option<Arc<JsonProgress>>,
}

impl RestoreBar {
    fn new(total: u64) -> Self {
        if is_json_mode() {
            return Self {
                pb: ProgressBar::hidden(),
                json: Some(JsonProgress::new(total)),
            };
        }

        let pb = ProgressBar::new(total);
        pb.enable_steady_tick(Duration::from_millis(100));
        if let Ok(template) =
            ProgressStyle::with_template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(template.progress_chars("=> "));
        }

        Self { pb, json: None }
    }

    fn finish(&self) {
        self.pb.finish_and_clear();
    }
}

impl RestoreProgress for RestoreBar {
    fn on_state(&self, index: usize, record: &FileRecord, state: &FileState) {
        if let Some(json) = &self.json {
            emit_file_state(&FileEvent {
                index,
                path: &record.base_path,
                archive_id: &record.archive_id,
                state,
            });
            if matches!(state, FileState::Done | FileState::Failed(_)) {
                json.inc_by(1, Some(record.base_path.clone()));
            }
            return;
        }

        let name = record.file_name();
        match state {
            FileState::Queued => {}
            FileState::Retrieving => self.pb.set_message(format!("retrieving {}", name)),
            FileState::Waiting(seconds) => self.pb.set_message(format!(
                "waiting for retrieval job of {} (next check in {})",
                name,
                format_wait(Duration::from_secs(*seconds))
            )),
            FileState::Written => self.pb.set_message(format!("written {}", name)),
            FileState::Done => self.pb.inc(1),
            FileState::Failed(reason) => {
                self.pb.println(format!(
                    "{} {}: {}",
                    style("✗").red(),
                    record.base_path,
                    reason
                ));
                self.pb.inc(1);
            }
        }
    }
}

pub(crate) fn get_mapping_params(matches: &ArgMatches) -> std::result::Result<MappingParams, String> {
    let pwd_string = get_pwd_string()?;

    let target_path = matches
        .get_one::<String>("target-path")
        .map_or_else(|| PathBuf::from(&pwd_string), |target| Path::new(&pwd_string).join(target));

    if target_path.exists() && !target_path.is_dir() {
        return Err(format!("{} is not a directory", target_path.display()));
    }

    let timeout = parse_timeout(matches.get_one::<u64>("timeout").copied())?;

    Ok(MappingParams {
        target_path,
        offline: matches.get_flag("offline"),
        timeout,
    })
}

fn parse_timeout(minutes: Option<u64>) -> std::result::Result<Option<Duration>, String> {
    match minutes {
        None => Ok(None),
        Some(0) => Err("--timeout must be at least one minute".to_string()),
        Some(minutes) => minutes
            .checked_mul(60)
            .map(|seconds| Some(Duration::from_secs(seconds)))
            .ok_or_else(|| format!("--timeout of {} minutes is too large", minutes)),
    }
}

fn get_params(matches: &ArgMatches) -> std::result::Result<RestoreParams, String> {
    let mapping = get_mapping_params(matches)?;
    let only = parse_only_request(matches)?;

    Ok(RestoreParams {
        mapping,
        only,
        yes: matches.get_flag("yes"),
    })
}
