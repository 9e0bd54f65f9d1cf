use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RestoreError {
    #[error("the requested vault '{vault}' was not found in this region ({region})")]
    VaultNotFound { vault: String, region: String },

    #[error("the mapping vault '{mapping}' paired with '{vault}' was not found")]
    MappingVaultMissing { vault: String, mapping: String },

    #[error(
        "no vault looking like a Synology DiskStation backup was found. Specify it with -v/--vault"
    )]
    NoBackupVaults,

    #[error(
        "more than one vault looking like a Synology DiskStation backup was found ({}). Specify which to use with -v/--vault",
        candidates.join(", ")
    )]
    AmbiguousVaultSelection { candidates: Vec<String> },

    #[error("the inventory of vault '{vault}' contains no archives")]
    InventoryEmpty { vault: String },

    #[error("the inventory of vault '{vault}' could not be parsed: {reason}")]
    InvalidInventory { vault: String, reason: String },

    #[error("failed to submit {target} job in vault '{vault}': {reason}")]
    SubmissionFailed {
        vault: String,
        target: String,
        reason: String,
    },

    #[error("gave up waiting for {target} in vault '{vault}' after {waited:?}")]
    TimedOut {
        vault: String,
        target: String,
        waited: Duration,
    },

    #[error(
        "checksum mismatch for archive {archive_id} in vault '{vault}' (expected {expected}, got {actual})"
    )]
    ChecksumMismatch {
        vault: String,
        archive_id: String,
        expected: String,
        actual: String,
    },

    #[error("failed to write {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("vault service error for '{vault}': {reason}")]
    Service { vault: String, reason: String },

    #[error("failed to read mapping database {}: {reason}", path.display())]
    Mapping { path: PathBuf, reason: String },

    #[error("refusing to restore '{path}': it escapes the target directory")]
    UnsafePath { path: String },

    #[error("selection cancelled")]
    SelectionCancelled,

    #[error("interrupted by shutdown signal")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),
}

impl RestoreError {
    pub fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RestoreError::Persistence {
            path: path.into(),
            source,
        }
    }

    pub fn service(vault: &str, reason: impl ToString) -> Self {
        RestoreError::Service {
            vault: vault.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Short machine-readable code used by `--mode json` error events.
    pub fn code(&self) -> &'static str {
        match self {
            RestoreError::VaultNotFound { .. } => "vault_not_found",
            RestoreError::MappingVaultMissing { .. } => "mapping_vault_missing",
            RestoreError::NoBackupVaults => "no_backup_vaults",
            RestoreError::AmbiguousVaultSelection { .. } => "ambiguous_vault_selection",
            RestoreError::InventoryEmpty { .. } => "inventory_empty",
            RestoreError::InvalidInventory { .. } => "invalid_inventory",
            RestoreError::SubmissionFailed { .. } => "submission_failed",
            RestoreError::TimedOut { .. } => "timed_out",
            RestoreError::ChecksumMismatch { .. } => "checksum_mismatch",
            RestoreError::Persistence { .. } => "persistence_error",
            RestoreError::Service { .. } => "service_error",
            RestoreError::Mapping { .. } => "mapping_error",
            RestoreError::UnsafePath { .. } => "unsafe_path",
            RestoreError::SelectionCancelled => "selection_cancelled",
            RestoreError::Cancelled => "cancelled",
            RestoreError::Config(_) => "config_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, RestoreError>;
