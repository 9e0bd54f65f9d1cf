use crate::core::metadata::{BackupInfo, FileRecord, InventoryResult, MappingDatabase};
use crate::core::retriever::{BlockingRetriever, WaitObserver};
use crate::error::{RestoreError, Result};
use crate::vault_clients::JobTarget;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) const MAPPING_FILE_NAME: &str = ".mapping.sqlite";

/// Decodes a downloaded mapping archive.
pub(crate) trait MappingStore: Send + Sync {
    fn read_backup_info(&self, path: &Path) -> Result<BackupInfo>;
    fn read_file_records(&self, path: &Path) -> Result<Vec<FileRecord>>;
}

pub(crate) fn mapping_path(target_dir: &Path) -> PathBuf {
    target_dir.join(MAPPING_FILE_NAME)
}

pub(crate) struct MappingAcquirer<'r> {
    retriever: &'r BlockingRetriever,
    store: Arc<dyn MappingStore>,
}

impl<'r> MappingAcquirer<'r> {
    pub(crate) fn new(retriever: &'r BlockingRetriever, store: Arc<dyn MappingStore>) -> Self {
        Self { retriever, store }
    }

    /// Loads the mapping of `vault`, downloading the single archive of
    /// `mapping_vault` unless `offline` allows reusing an earlier copy in
    /// `target_dir`.
    pub(crate) async fn acquire(
        &self,
        vault: &str,
        mapping_vault: &str,
        target_dir: &Path,
        offline: bool,
        on_wait: WaitObserver<'_>,
    ) -> Result<MappingDatabase> {
        let path = mapping_path(target_dir);

        if offline && path.is_file() {
            info!(vault, path = %path.display(), "reusing previously downloaded mapping");
        } else {
            if offline {
                info!(vault, "no local mapping found, downloading it");
            }
            let data = self.download(mapping_vault, on_wait).await?;
            persist(&path, &data).await?;
            info!(vault, path = %path.display(), bytes = data.len(), "mapping saved");
        }

        self.read(path).await
    }

    async fn download(&self, mapping_vault: &str, on_wait: WaitObserver<'_>) -> Result<bytes::Bytes> {
        let inventory_bytes = self
            .retriever
            .retrieve_observed(mapping_vault, &JobTarget::Inventory, on_wait)
            .await?;

        let inventory: InventoryResult =
            serde_json::from_slice(&inventory_bytes).map_err(|e| RestoreError::InvalidInventory {
                vault: mapping_vault.to_string(),
                reason: e.to_string(),
            })?;

        let archive = match inventory.archive_list.as_slice() {
            [] => {
                return Err(RestoreError::InventoryEmpty {
                    vault: mapping_vault.to_string(),
                });
            }
            [only] => only,
            [first, ..] => {
                warn!(
                    vault = mapping_vault,
                    archives = inventory.archive_list.len(),
                    archive = %first.archive_id,
                    "mapping vault holds more than one archive, using the first"
                );
                first
            }
        };

        self.retriever
            .retrieve_observed(
                mapping_vault,
                &JobTarget::Archive(archive.archive_id.clone()),
                on_wait,
            )
            .await
    }

    async fn read(&self, path: PathBuf) -> Result<MappingDatabase> {
        let store = Arc::clone(&self.store);
        let blocking_path = path.clone();

        tokio::task::spawn_blocking(move || -> Result<MappingDatabase> {
            let info = store.read_backup_info(&blocking_path)?;
            let files = store.read_file_records(&blocking_path)?;
            Ok(MappingDatabase { info, files })
        })
        .await
        .map_err(|e| RestoreError::Mapping {
            path,
            reason: e.to_string(),
        })?
    }
}

/// Writes next to `path` first so an interrupted download never leaves a
/// truncated mapping behind for offline mode.
async fn persist(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| RestoreError::persistence(parent, e))?;
    }

    let partial = path.with_extension("sqlite.part");
    tokio::fs::write(&partial, data)
        .await
        .map_err(|e| RestoreError::persistence(&partial, e))?;
    tokio::fs::rename(&partial, path)
        .await
        .map_err(|e| RestoreError::persistence(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::jobs::RetrievalJobTracker;
    use crate::core::sqlite::SqliteMappingStore;
    use crate::core::sqlite::tests::write_mapping;
    use crate::vault_clients::fake::FakeVaultClient;
    use tokio_util::sync::CancellationToken;

    fn inventory_json(ids: &[&str]) -> Vec<u8> {
        let archives: Vec<serde_json::Value> = ids
            .iter()
            .map(|id| serde_json::json!({"ArchiveId": id, "Size": 1, "CreationDate": "2024-01-01T00:00:00Z"}))
            .collect();
        serde_json::to_vec(&serde_json::json!({
            "VaultARN": "arn:aws:glacier:us-east-1:1:vaults/Backups_mapping",
            "InventoryDate": "2024-01-02T00:00:00Z",
            "ArchiveList": archives,
        }))
        .unwrap()
    }

    fn mapping_bytes(dir: &Path) -> Vec<u8> {
        let path = dir.join("source.sqlite");
        write_mapping(
            &path,
            &[("task_name", "Nightly")],
            &[FileRecord {
                share_name: "shareA".to_string(),
                base_path: "/ShareA/a.txt".to_string(),
                archive_id: "id1".to_string(),
                file_size: 3,
            }],
        );
        std::fs::read(path).unwrap()
    }

    fn retriever(client: Arc<FakeVaultClient>) -> BlockingRetriever {
        BlockingRetriever::new(RetrievalJobTracker::new(client), CancellationToken::new())
    }

    #[tokio::test(start_paused = true)]
    async fn empty_inventory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(
            FakeVaultClient::new()
                .with_output("Backups_mapping", JobTarget::Inventory, inventory_json(&[]))
                .with_job("Backups_mapping", JobTarget::Inventory, true),
        );
        let retriever = retriever(client);
        let acquirer = MappingAcquirer::new(&retriever, Arc::new(SqliteMappingStore));

        let result = acquirer
            .acquire("Backups", "Backups_mapping", dir.path(), false, &|_, _| {})
            .await;

        assert!(matches!(
            result,
            Err(RestoreError::InventoryEmpty { vault }) if vault == "Backups_mapping"
        ));
        assert!(!mapping_path(dir.path()).exists());
    }

    #[tokio::test(start_paused = true)]
    async fn downloads_and_persists_mapping() {
        let fixtures = tempfile::tempdir().unwrap();
        let target = tempfile::tempdir().unwrap();
        let mapping = mapping_bytes(fixtures.path());
        let client = Arc::new(
            FakeVaultClient::new()
                .with_output("Backups_mapping", JobTarget::Inventory, inventory_json(&["m1"]))
                .with_output(
                    "Backups_mapping",
                    JobTarget::Archive("m1".to_string()),
                    mapping.clone(),
                )
                .completing_after(1),
        );
        let retriever = retriever(client.clone());
        let acquirer = MappingAcquirer::new(&retriever, Arc::new(SqliteMappingStore));

        let database = acquirer
            .acquire("Backups", "Backups_mapping", target.path(), false, &|_, _| {})
            .await
            .unwrap();

        assert_eq!(database.info.task_name(), Some("Nightly"));
        assert_eq!(database.files.len(), 1);
        assert_eq!(std::fs::read(mapping_path(target.path())).unwrap(), mapping);
        assert_eq!(
            client.submissions(),
            vec![
                ("Backups_mapping".to_string(), JobTarget::Inventory),
                ("Backups_mapping".to_string(), JobTarget::Archive("m1".to_string())),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn several_archives_use_the_first() {
        let fixtures = tempfile::tempdir().unwrap();
        let target = tempfile::tempdir().unwrap();
        let client = Arc::new(
            FakeVaultClient::new()
                .with_output(
                    "Backups_mapping",
                    JobTarget::Inventory,
                    inventory_json(&["first", "second"]),
                )
                .with_output(
                    "Backups_mapping",
                    JobTarget::Archive("first".to_string()),
                    mapping_bytes(fixtures.path()),
                )
                .with_job("Backups_mapping", JobTarget::Inventory, true)
                .with_job("Backups_mapping", JobTarget::Archive("first".to_string()), true),
        );
        let retriever = retriever(client.clone());
        let acquirer = MappingAcquirer::new(&retriever, Arc::new(SqliteMappingStore));

        let database = acquirer
            .acquire("Backups", "Backups_mapping", target.path(), false, &|_, _| {})
            .await
            .unwrap();

        assert_eq!(database.files[0].archive_id, "id1");
        assert!(client.submissions().is_empty());
    }

    #[tokio::test]
    async fn offline_mode_reuses_local_copy() {
        let target = tempfile::tempdir().unwrap();
        let bytes = mapping_bytes(target.path());
        std::fs::write(mapping_path(target.path()), bytes).unwrap();
        let client = Arc::new(FakeVaultClient::new());
        let retriever = retriever(client.clone());
        let acquirer = MappingAcquirer::new(&retriever, Arc::new(SqliteMappingStore));

        let database = acquirer
            .acquire("Backups", "Backups_mapping", target.path(), true, &|_, _| {})
            .await
            .unwrap();

        assert_eq!(database.files.len(), 1);
        assert_eq!(client.list_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unreadable_inventory_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(
            FakeVaultClient::new()
                .with_output("Backups_mapping", JobTarget::Inventory, &b"<html>"[..])
                .with_job("Backups_mapping", JobTarget::Inventory, true),
        );
        let retriever = retriever(client);
        let acquirer = MappingAcquirer::new(&retriever, Arc::new(SqliteMappingStore));

        let result = acquirer
            .acquire("Backups", "Backups_mapping", dir.path(), false, &|_, _| {})
            .await;

        assert!(matches!(result, Err(RestoreError::InvalidInventory { .. })));
    }
}
