use crate::commands::restore::{get_mapping_params, load_mapping};
use crate::core::jobs::RetrievalJobTracker;
use crate::core::metadata::MappingDatabase;
use crate::core::retriever::BlockingRetriever;
use crate::core::tree::build_tree;
use crate::output::{emit_output, is_json_mode};
use crate::signal::spawn_shutdown_listener;
use crate::utils::{
    finish_spinner, get_vault_client, get_vault_pair, handle_error, handle_restore_error, spinner,
};
use bytesize::ByteSize;
use clap::ArgMatches;
use console::style;
use serde::Serialize;
use std::collections::BTreeMap;
use tabled::{Table, Tabled};
use tokio_util::sync::CancellationToken;

#[derive(Serialize)]
struct InfoOutput<'a> {
    vault: &'a str,
    mapping_vault: &'a str,
    backup_info: &'a BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_run: Option<String>,
    folders: u64,
    files: usize,
    total_bytes: u64,
}

#[derive(Tabled)]
struct InfoRow {
    key: String,
    value: String,
}

pub async fn info(matches: &ArgMatches) {
    let params = match get_mapping_params(matches) {
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

    let retriever =
        BlockingRetriever::new(RetrievalJobTracker::new(client), cancel).with_timeout(params.timeout);

    let database = match load_mapping(&retriever, &pair, &params, &pb).await {
        Ok(database) => database,
        Err(e) => handle_restore_error(e, Some(&pb)),
    };

    let folders = build_tree(&pair.data, &database.files).folder_count();
    let last_run = database
        .info
        .last_run()
        .map(|time| time.format("%Y-%m-%d %H:%M:%S").to_string());

    if is_json_mode() {
        pb.finish_and_clear();
        emit_output(&InfoOutput {
            vault: &pair.data,
            mapping_vault: &pair.mapping,
            backup_info: &database.info.entries,
            last_run,
            folders,
            files: database.files.len(),
            total_bytes: database.total_size(),
        });
        return;
    }

    finish_spinner(&pb, &format!("Loaded the mapping of {}", pair.data));

    println!("{}", Table::new(info_rows(&database)));

    if let Some(last_run) = last_run {
        println!("Last backup run: {}", style(last_run).cyan());
    }
    println!(
        "{} folder(s), {} file(s), {} in total",
        style(folders).cyan(),
        style(database.files.len()).cyan(),
        style(ByteSize(database.total_size())).cyan()
    );
}

fn info_rows(database: &MappingDatabase) -> Vec<InfoRow> {
    database
        .info
        .entries
        .iter()
        .map(|(key, value)| InfoRow {
            key: key.clone(),
            value: value.clone(),
        })
        .collect()
}
