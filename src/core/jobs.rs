use crate::error::Result;
use crate::vault_clients::{Job, JobTarget, VaultClient};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Outcome {
    Ready { data: Bytes, size: u64 },
    Pending,
}

/// Decides per `(vault, target)` whether to download a finished job's
/// output, keep waiting on a running one, or submit a new job.
///
/// Submission failures surface as `Err(SubmissionFailed)` and are never
/// retried here.
pub(crate) struct RetrievalJobTracker {
    client: Arc<dyn VaultClient>,
    submitted: Mutex<HashMap<(String, JobTarget), String>>,
}

impl RetrievalJobTracker {
    pub(crate) fn new(client: Arc<dyn VaultClient>) -> Self {
        Self {
            client,
            submitted: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) async fn resolve(&self, vault: &str, target: &JobTarget) -> Result<Outcome> {
        let jobs = self.client.list_jobs(vault).await?;

        let matching: Vec<&Job> = jobs.iter().filter(|job| job.matches(target)).collect();

        if let Some(job) = matching.iter().find(|job| job.has_output()) {
            debug!(vault, job = %job.id, "fetching output of completed {}", target);

            let validate_checksum = matches!(target, JobTarget::Archive(_));
            let data = self.client.fetch_output(job, validate_checksum).await?;
            let size = data.len() as u64;

            self.forget(vault, target);

            return Ok(Outcome::Ready { data, size });
        }

        if let Some(job) = matching.iter().find(|job| !job.completed) {
            debug!(vault, job = %job.id, status = %job.status, "{} still running", target);
            return Ok(Outcome::Pending);
        }

        // Failed jobs count as absent. Our own submission is only replaced
        // once the listing shows it failed.
        let key = (vault.to_string(), target.clone());
        {
            let mut submitted = self.lock_submitted();
            if let Some(job_id) = submitted.get(&key) {
                if matching.iter().any(|job| job.is_failed() && job.id == *job_id) {
                    warn!(vault, job = %job_id, "{} failed, submitting it again", target);
                    submitted.remove(&key);
                } else {
                    debug!(vault, job = %job_id, "submitted {} not listed yet", target);
                    return Ok(Outcome::Pending);
                }
            }
        }

        let handle = match target {
            JobTarget::Inventory => self.client.submit_inventory_job(vault).await?,
            JobTarget::Archive(archive_id) => {
                self.client.submit_archive_job(vault, archive_id).await?
            }
        };

        info!(vault, job = %handle.id, "submitted {}", target);
        self.lock_submitted().insert(key, handle.id);

        Ok(Outcome::Pending)
    }

    fn forget(&self, vault: &str, target: &JobTarget) {
        self.lock_submitted()
            .remove(&(vault.to_string(), target.clone()));
    }

    fn lock_submitted(&self) -> std::sync::MutexGuard<'_, HashMap<(String, JobTarget), String>> {
        // The map holds no invariants a panicking holder could break.
        self.submitted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
