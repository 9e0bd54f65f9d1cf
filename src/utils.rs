use crate::config::{client_config, validate_vault_name};
use crate::core::vaults::{VaultPair, select_backup_vault};
use crate::error::RestoreError;
use crate::output::{emit_error, emit_progress_message, is_json_mode};
use crate::vault_clients::{GlacierVaultClient, VaultClient};
use clap::ArgMatches;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;

pub fn handle_error(message: String, pb: Option<&ProgressBar>) -> ! {
    report_and_exit(&message, "error", pb)
}

pub fn handle_restore_error(error: RestoreError, pb: Option<&ProgressBar>) -> ! {
    report_and_exit(&error.to_string(), error.code(), pb)
}

fn report_and_exit(message: &str, code: &str, pb: Option<&ProgressBar>) -> ! {
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    if is_json_mode() {
        emit_error(message, code);
    }

    eprintln!("{} {}", style("✗").red().bold(), message);
    std::process::exit(1);
}

pub fn get_pwd_string() -> Result<String, String> {
    std::env::current_dir()
        .map(|dir| dir.to_string_lossy().to_string())
        .map_err(|e| format!("Failed to read the current directory: {}", e))
}

/// Spinner for a single step. Hidden in JSON mode, where the message is
/// emitted as a progress event instead.
pub fn spinner(message: &str) -> ProgressBar {
    if is_json_mode() {
        emit_progress_message(message);
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    pb.enable_steady_tick(Duration::from_millis(100));
    if let Ok(template) = ProgressStyle::with_template("{spinner:.green} {msg}") {
        pb.set_style(template);
    }
    pb.set_message(message.to_string());
    pb
}

pub fn finish_spinner(pb: &ProgressBar, message: &str) {
    let elapsed = pb.elapsed();

    if let Ok(template) = ProgressStyle::with_template("{prefix:.green} {msg}") {
        pb.set_style(template);
    }
    pb.set_prefix("✓");
    pb.finish_with_message(format!("{} ({:.2?})", message, elapsed));
}

/// Builds the vault client from the global connection flags and the saved
/// profile. Returns the region alongside for error messages.
pub async fn get_vault_client(matches: &ArgMatches) -> Result<(Arc<dyn VaultClient>, String), String> {
    let config = client_config(matches)?;
    let region = config.region.clone();
    let client = GlacierVaultClient::connect(config).await;

    Ok((Arc::new(client), region))
}

/// Lists the vaults of the region and picks the backup pair, either the one
/// named with `-v/--vault` or the only one that can be detected.
pub async fn get_vault_pair(
    client: &dyn VaultClient,
    matches: &ArgMatches,
    region: &str,
) -> Result<VaultPair, RestoreError> {
    let requested = matches.get_one::<String>("vault");
    if let Some(vault) = requested {
        validate_vault_name(vault).map_err(RestoreError::Config)?;
    }

    let names = client.list_vaults().await?;
    select_backup_vault(&names, requested.map(String::as_str), region)
}

pub fn format_wait(wait: Duration) -> String {
    let minutes = wait.as_secs() / 60;
    if minutes >= 60 {
        format!("{}h{:02}m", minutes / 60, minutes % 60)
    } else {
        format!("{}m", minutes.max(1))
    }
}
