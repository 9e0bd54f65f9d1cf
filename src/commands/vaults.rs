use crate::core::vaults::{MAPPING_SUFFIX, detect_backup_vaults};
use crate::output::{emit_output, is_json_mode};
use crate::utils::{get_vault_client, handle_error, handle_restore_error, spinner};
use clap::ArgMatches;
use console::style;
use serde::Serialize;
use tabled::{Table, Tabled};

#[derive(Serialize, Tabled)]
struct VaultRow {
    #[tabled(rename = "vault")]
    name: String,
    #[tabled(rename = "role")]
    role: String,
    #[tabled(rename = "paired with")]
    paired_with: String,
}

pub async fn vaults(matches: &ArgMatches) {
    let (client, region) = match get_vault_client(matches).await {
        Ok(client) => client,
        Err(e) => handle_error(e, None),
    };

    let pb = spinner(&format!("Listing vaults in {}...", region));

    let names = match client.list_vaults().await {
        Ok(names) => names,
        Err(e) => handle_restore_error(e, Some(&pb)),
    };

    pb.finish_and_clear();

    let rows = vault_rows(&names);

    if is_json_mode() {
        emit_output(&rows);
        return;
    }

    if rows.is_empty() {
        println!("{}", style(format!("No vaults found in {}.", region)).yellow());
        return;
    }

    println!("{}", Table::new(&rows));

    let backups = rows.iter().filter(|row| row.role == "backup data").count();
    if backups == 0 {
        println!(
            "{}",
            style("None of these vaults looks like a Synology DiskStation backup.").yellow()
        );
    }
}

fn vault_rows(names: &[String]) -> Vec<VaultRow> {
    let pairs = detect_backup_vaults(names);

    names
        .iter()
        .map(|name| {
            if let Some(pair) = pairs.iter().find(|pair| pair.data == *name) {
                return VaultRow {
                    name: name.clone(),
                    role: "backup data".to_string(),
                    paired_with: pair.mapping.clone(),
                };
            }

            if let Some(pair) = pairs.iter().find(|pair| pair.mapping == *name) {
                return VaultRow {
                    name: name.clone(),
                    role: "backup mapping".to_string(),
                    paired_with: pair.data.clone(),
                };
            }

            let role = if name.ends_with(MAPPING_SUFFIX) {
                "orphan mapping"
            } else {
                "other"
            };

            VaultRow {
                name: name.clone(),
                role: role.to_string(),
                paired_with: String::new(),
            }
        })
        .collect()
}
