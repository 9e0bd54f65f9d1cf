use crate::core::metadata::FileRecord;
use crate::core::retriever::BlockingRetriever;
use crate::error::{RestoreError, Result};
use crate::vault_clients::JobTarget;
use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub(crate) enum FileState {
    Queued,
    Retrieving,
    Waiting(u64),
    Written,
    Done,
    Failed(String),
}

/// Receives per-file state changes while a restore runs.
pub(crate) trait RestoreProgress: Send + Sync {
    fn on_state(&self, _index: usize, _record: &FileRecord, _state: &FileState) {}
}

pub(crate) struct NoProgress;

impl RestoreProgress for NoProgress {}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct FileOutcome {
    pub(crate) base_path: String,
    pub(crate) archive_id: String,
    pub(crate) destination: PathBuf,
    pub(crate) size: u64,
    pub(crate) state: FileState,
}

#[derive(Debug, Default, Serialize)]
pub(crate) struct RestoreReport {
    pub(crate) files: Vec<FileOutcome>,
    pub(crate) cancelled: bool,
}

impl RestoreReport {
    pub(crate) fn restored(&self) -> impl Iterator<Item = &FileOutcome> {
        self.files.iter().filter(|f| f.state == FileState::Done)
    }

    pub(crate) fn failed(&self) -> impl Iterator<Item = &FileOutcome> {
        self.files
            .iter()
            .filter(|f| matches!(f.state, FileState::Failed(_)))
    }

    pub(crate) fn restored_bytes(&self) -> u64 {
        self.restored().map(|f| f.size).sum()
    }
}

/// Downloads selected files one after another into `target_dir`.
pub(crate) struct RestoreOrchestrator<'r> {
    retriever: &'r BlockingRetriever,
    vault: String,
    target_dir: PathBuf,
}

impl<'r> RestoreOrchestrator<'r> {
    pub(crate) fn new(retriever: &'r BlockingRetriever, vault: &str, target_dir: &Path) -> Self {
        Self {
            retriever,
            vault: vault.to_string(),
            target_dir: target_dir.to_path_buf(),
        }
    }

    /// A failing file is recorded and skipped. Only a shutdown signal stops
    /// the run early; files not reached yet stay `Queued` in the report.
    pub(crate) async fn restore(
        &self,
        files: &[&FileRecord],
        progress: &dyn RestoreProgress,
    ) -> RestoreReport {
        let mut report = RestoreReport::default();

        for record in files {
            report.files.push(FileOutcome {
                base_path: record.base_path.clone(),
                archive_id: record.archive_id.clone(),
                destination: self.destination_for(record).unwrap_or_default(),
                size: record.file_size,
                state: FileState::Queued,
            });
        }

        for (index, record) in files.iter().enumerate() {
            let state = match self.restore_file(index, record, progress).await {
                Ok(()) => FileState::Done,
                Err(RestoreError::Cancelled) => {
                    report.cancelled = true;
                    break;
                }
                Err(e) => {
                    error!(file = %record.base_path, archive = %record.archive_id, "{}", e);
                    FileState::Failed(e.to_string())
                }
            };

            progress.on_state(index, record, &state);
            report.files[index].state = state;
        }

        info!(
            restored = report.restored().count(),
            failed = report.failed().count(),
            "restore finished"
        );

        report
    }

    async fn restore_file(
        &self,
        index: usize,
        record: &FileRecord,
        progress: &dyn RestoreProgress,
    ) -> Result<()> {
        let destination = self.destination_for(record)?;

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RestoreError::persistence(parent, e))?;
        }

        progress.on_state(index, record, &FileState::Retrieving);

        let on_wait = |_: &JobTarget, wait: Duration| {
            progress.on_state(index, record, &FileState::Waiting(wait.as_secs()));
        };
        let data = self
            .retriever
            .retrieve_observed(
                &self.vault,
                &JobTarget::Archive(record.archive_id.clone()),
                &on_wait,
            )
            .await?;

        tokio::fs::write(&destination, &data)
            .await
            .map_err(|e| RestoreError::persistence(&destination, e))?;

        progress.on_state(index, record, &FileState::Written);

        Ok(())
    }

    /// Mirrors the backup path below the target directory.
    pub(crate) fn destination_for(&self, record: &FileRecord) -> Result<PathBuf> {
        let relative = Path::new(record.base_path.trim_start_matches('/'));

        let mut destination = self.target_dir.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => destination.push(part),
                Component::CurDir => {}
                _ => {
                    return Err(RestoreError::UnsafePath {
                        path: record.base_path.clone(),
                    });
                }
            }
        }

        if destination == self.target_dir {
            return Err(RestoreError::UnsafePath {
                path: record.base_path.clone(),
            });
        }

        Ok(destination)
    }
}
