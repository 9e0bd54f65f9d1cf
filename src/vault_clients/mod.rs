#[cfg(test)]
pub mod fake;
mod glacier;
mod vault_client;

use serde::Serialize;
use std::fmt;

pub use glacier::{GlacierClientConfig, GlacierVaultClient};
pub use vault_client::VaultClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum JobAction {
    InventoryRetrieval,
    ArchiveRetrieval,
}

impl fmt::Display for JobAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobAction::InventoryRetrieval => write!(f, "InventoryRetrieval"),
            JobAction::ArchiveRetrieval => write!(f, "ArchiveRetrieval"),
        }
    }
}

/// Glacier marks failed jobs as completed too, so only `Succeeded` means
/// there is output to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobStatus {
    InProgress,
    Succeeded,
    Failed,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::InProgress => write!(f, "InProgress"),
            JobStatus::Succeeded => write!(f, "Succeeded"),
            JobStatus::Failed => write!(f, "Failed"),
        }
    }
}

/// What a retrieval job stages: the whole vault's inventory or one archive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JobTarget {
    Inventory,
    Archive(String),
}

impl JobTarget {
    pub fn action(&self) -> JobAction {
        match self {
            JobTarget::Inventory => JobAction::InventoryRetrieval,
            JobTarget::Archive(_) => JobAction::ArchiveRetrieval,
        }
    }
}

impl fmt::Display for JobTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobTarget::Inventory => write!(f, "inventory retrieval"),
            JobTarget::Archive(id) => write!(f, "archive retrieval of {}", short_id(id)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub id: String,
    pub vault: String,
    pub action: JobAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_id: Option<String>,
    pub completed: bool,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl Job {
    pub fn has_output(&self) -> bool {
        self.completed && self.status == JobStatus::Succeeded
    }

    pub fn is_failed(&self) -> bool {
        self.status == JobStatus::Failed
    }

    pub fn matches(&self, target: &JobTarget) -> bool {
        match target {
            JobTarget::Inventory => self.action == JobAction::InventoryRetrieval,
            JobTarget::Archive(id) => {
                self.action == JobAction::ArchiveRetrieval
                    && self.archive_id.as_deref() == Some(id.as_str())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub id: String,
    pub vault: String,
}

pub fn short_id(id: &str) -> &str {
    id.char_indices().nth(12).map_or(id, |(index, _)| &id[..index])
}
