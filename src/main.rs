use clap::{Arg, ArgAction, Command, arg, value_parser};
use clap::error::ErrorKind;

use crate::output::{
    detect_mode_from_args, emit_error, emit_help, emit_version, init_panic_hook_if_json,
    is_json_mode, set_output_mode,
};
use crate::utils::handle_error;

mod commands;
mod config;
mod core;
mod error;
mod logger;
mod output;
mod signal;
mod utils;
mod vault_clients;

fn vault_arg() -> Arg {
    arg!(-v --vault <VAULT> "The data vault of the backup (default: auto-detected)").required(false)
}

fn target_path_arg() -> Arg {
    Arg::new("target-path")
        .short('t')
        .long("target-path")
        .value_name("TARGET_PATH")
        .help("The directory to restore into and keep the mapping in (default: current directory)")
        .required(false)
}

fn offline_arg() -> Arg {
    Arg::new("offline")
        .long("offline")
        .help("Reuse a mapping downloaded earlier into the target directory")
        .action(ArgAction::SetTrue)
}

fn timeout_arg() -> Arg {
    Arg::new("timeout")
        .long("timeout")
        .value_name("MINUTES")
        .help("Give up waiting for a single retrieval job after this many minutes")
        .value_parser(value_parser!(u64))
        .required(false)
}

fn cli() -> Command {
    Command::new("syno-restore")
        .about("Restore files from a Synology DiskStation backup stored in Amazon Glacier.")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("mode")
                .long("mode")
                .value_name("MODE")
                .help("Output mode")
                .value_parser(["interactive", "json"])
                .default_value("interactive")
                .global(true),
        )
        .arg(
            Arg::new("debug")
                .short('d')
                .long("debug")
                .help("Print debug logs")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("access-key")
                .short('k')
                .long("access-key")
                .value_name("ACCESS_KEY")
                .help("AWS access key (default: saved config, then the AWS credential chain)")
                .global(true),
        )
        .arg(
            Arg::new("secret-key")
                .short('s')
                .long("secret-key")
                .value_name("SECRET_KEY")
                .help("AWS secret key")
                .global(true),
        )
        .arg(
            arg!(-r --region <REGION> "The region of the vaults (default: saved config, then us-east-1)")
                .required(false)
                .global(true),
        )
        .arg(
            arg!(-e --endpoint <ENDPOINT> "A custom Glacier endpoint URL")
                .required(false)
                .global(true),
        )
        .subcommand(
            Command::new("config")
                .about("Save the credentials and region to use by default"),
        )
        .subcommand(
            Command::new("vaults")
                .about("List the vaults of the region and show which look like DiskStation backups"),
        )
        .subcommand(
            Command::new("jobs")
                .about("List the retrieval jobs of a backup")
                .arg(vault_arg()),
        )
        .subcommand(
            Command::new("info")
                .about("Show what a backup contains")
                .arg(vault_arg())
                .arg(target_path_arg())
                .arg(offline_arg())
                .arg(timeout_arg()),
        )
        .subcommand(
            Command::new("restore")
                .about("Restore files from a backup")
                .arg(vault_arg())
                .arg(target_path_arg())
                .arg(offline_arg())
                .arg(timeout_arg())
                .arg(
                    Arg::new("only")
                        .long("only")
                        .value_name("PATH")
                        .help("Restore only these folders or files (can be used multiple times)")
                        .num_args(1..)
                        .action(ArgAction::Append)
                        .conflicts_with("all"),
                )
                .arg(
                    Arg::new("all")
                        .long("all")
                        .help("Restore the whole backup without asking what to select")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("yes")
                        .short('y')
                        .long("yes")
                        .help("Do not ask for confirmation before restoring")
                        .action(ArgAction::SetTrue),
                ),
        )
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();
    set_output_mode(detect_mode_from_args(&args));
    init_panic_hook_if_json();

    let matches = match cli().try_get_matches_from(&args) {
        Ok(matches) => matches,
        Err(e) if is_json_mode() => match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                emit_help(e.render().to_string());
                return;
            }
            ErrorKind::DisplayVersion => {
                emit_version(e.render().to_string());
                return;
            }
            _ => emit_error(&e.render().to_string(), "invalid_arguments"),
        },
        Err(e) => e.exit(),
    };

    logger::init(matches.get_flag("debug"), is_json_mode());

    match matches.subcommand() {
        Some(("config", matches)) => commands::config(matches),
        Some(("vaults", matches)) => commands::vaults(matches).await,
        Some(("jobs", matches)) => commands::jobs(matches).await,
        Some(("info", matches)) => commands::info(matches).await,
        Some(("restore", matches)) => commands::restore(matches).await,
        _ => {
            handle_error(
                "Invalid command! Run 'syno-restore --help' for more information.".to_string(),
                None,
            );
        }
    }
}
