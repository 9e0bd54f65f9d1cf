use crate::core::tree_hash::tree_hash_hex;
use crate::error::{RestoreError, Result};
use crate::vault_clients::{Job, JobAction, JobHandle, JobStatus, VaultClient};
use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_glacier as glacier;
use aws_sdk_glacier::error::DisplayErrorContext;
use aws_sdk_glacier::types::{ActionCode, JobParameters, StatusCode};
use aws_types::region::Region;
use bytes::Bytes;
use tracing::{debug, warn};

// "-" means the account owning the credentials.
const ACCOUNT_ID: &str = "-";

pub struct GlacierVaultClient {
    client: glacier::Client,
}

pub struct GlacierClientConfig {
    pub region: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub endpoint: Option<String>,
}

impl GlacierVaultClient {
    pub async fn connect(config: GlacierClientConfig) -> Self {
        let region = Region::new(config.region);

        let shared_config = match (config.access_key, config.secret_key) {
            (Some(access_key), Some(secret_key)) => {
                let creds = Credentials::new(access_key, secret_key, None, None, "syno-restore");
                aws_config::SdkConfig::builder()
                    .credentials_provider(glacier::config::SharedCredentialsProvider::new(creds))
                    .region(region)
                    .build()
            }
            _ => {
                aws_config::defaults(aws_config::BehaviorVersion::latest())
                    .region(region)
                    .load()
                    .await
            }
        };

        let mut glacier_config_builder = glacier::config::Builder::from(&shared_config);
        if let Some(endpoint) = config.endpoint {
            glacier_config_builder = glacier_config_builder.endpoint_url(endpoint);
        }

        let client = glacier::Client::from_conf(glacier_config_builder.build());

        Self { client }
    }

    async fn submit(&self, vault: &str, parameters: JobParameters, target: String) -> Result<JobHandle> {
        let resp = self
            .client
            .initiate_job()
            .account_id(ACCOUNT_ID)
            .vault_name(vault)
            .job_parameters(parameters)
            .send()
            .await
            .map_err(|e| RestoreError::SubmissionFailed {
                vault: vault.to_string(),
                target: target.clone(),
                reason: DisplayErrorContext(&e).to_string(),
            })?;

        let id = resp
            .job_id()
            .ok_or_else(|| RestoreError::SubmissionFailed {
                vault: vault.to_string(),
                target,
                reason: "the service returned no job id".to_string(),
            })?
            .to_string();

        Ok(JobHandle {
            id,
            vault: vault.to_string(),
        })
    }
}

#[async_trait]
impl VaultClient for GlacierVaultClient {
    async fn list_vaults(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let resp = self
                .client
                .list_vaults()
                .account_id(ACCOUNT_ID)
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| RestoreError::service("*", DisplayErrorContext(&e)))?;

            for vault in resp.vault_list() {
                if let Some(name) = vault.vault_name() {
                    names.push(name.to_string());
                }
            }

            marker = resp.marker().map(|m| m.to_string());

            if marker.is_none() {
                break;
            }
        }

        Ok(names)
    }

    async fn list_jobs(&self, vault: &str) -> Result<Vec<Job>> {
        let mut jobs = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let resp = self
                .client
                .list_jobs()
                .account_id(ACCOUNT_ID)
                .vault_name(vault)
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| RestoreError::service(vault, DisplayErrorContext(&e)))?;

            for description in resp.job_list() {
                let action = match description.action() {
                    Some(ActionCode::InventoryRetrieval) => JobAction::InventoryRetrieval,
                    Some(ActionCode::ArchiveRetrieval) => JobAction::ArchiveRetrieval,
                    _ => continue,
                };

                let Some(id) = description.job_id() else {
                    continue;
                };

                let output_size = match action {
                    JobAction::InventoryRetrieval => description.inventory_size_in_bytes(),
                    JobAction::ArchiveRetrieval => description.archive_size_in_bytes(),
                };

                jobs.push(Job {
                    id: id.to_string(),
                    vault: vault.to_string(),
                    action,
                    archive_id: description.archive_id().map(|a| a.to_string()),
                    completed: description.completed(),
                    status: match description.status_code() {
                        Some(StatusCode::Succeeded) => JobStatus::Succeeded,
                        Some(StatusCode::Failed) => JobStatus::Failed,
                        _ => JobStatus::InProgress,
                    },
                    output_size: output_size.map(|size| size.max(0) as u64),
                    created_at: description.creation_date().map(|d| d.to_string()),
                });
            }

            marker = resp.marker().map(|m| m.to_string());

            if marker.is_none() {
                break;
            }
        }

        debug!(vault, jobs = jobs.len(), "listed retrieval jobs");

        Ok(jobs)
    }

    async fn submit_inventory_job(&self, vault: &str) -> Result<JobHandle> {
        let parameters = JobParameters::builder()
            .r#type("inventory-retrieval")
            .format("JSON")
            .build();

        self.submit(vault, parameters, "inventory retrieval".to_string())
            .await
    }

    async fn submit_archive_job(&self, vault: &str, archive_id: &str) -> Result<JobHandle> {
        let parameters = JobParameters::builder()
            .r#type("archive-retrieval")
            .archive_id(archive_id)
            .build();

        self.submit(vault, parameters, format!("archive retrieval of {}", archive_id))
            .await
    }

    async fn fetch_output(&self, job: &Job, validate_checksum: bool) -> Result<Bytes> {
        let resp = self
            .client
            .get_job_output()
            .account_id(ACCOUNT_ID)
            .vault_name(&job.vault)
            .job_id(&job.id)
            .send()
            .await
            .map_err(|e| RestoreError::service(&job.vault, DisplayErrorContext(&e)))?;

        let expected = resp.checksum().map(|c| c.to_ascii_lowercase());

        let data = resp
            .body
            .collect()
            .await
            .map_err(|e| RestoreError::service(&job.vault, e))?
            .into_bytes();

        if validate_checksum {
            match expected {
                Some(expected) => {
                    let actual = tree_hash_hex(&data);
                    if actual != expected {
                        return Err(RestoreError::ChecksumMismatch {
                            vault: job.vault.clone(),
                            archive_id: job.archive_id.clone().unwrap_or_default(),
                            expected,
                            actual,
                        });
                    }
                }
                None => warn!(
                    vault = %job.vault,
                    job = %job.id,
                    "the service returned no checksum, skipping validation"
                ),
            }
        }

        Ok(data)
    }
}
