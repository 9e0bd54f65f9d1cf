use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;
use crate::vault_clients::{Job, JobHandle};

#[async_trait]
pub trait VaultClient: Send + Sync {
    async fn list_vaults(&self) -> Result<Vec<String>>;
    async fn list_jobs(&self, vault: &str) -> Result<Vec<Job>>;
    async fn submit_inventory_job(&self, vault: &str) -> Result<JobHandle>;
    async fn submit_archive_job(&self, vault: &str, archive_id: &str) -> Result<JobHandle>;
    async fn fetch_output(&self, job: &Job, validate_checksum: bool) -> Result<Bytes>;
}
