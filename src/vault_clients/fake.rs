use crate::error::{RestoreError, Result};
use crate::vault_clients::{Job, JobHandle, JobStatus, JobTarget, VaultClient};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// In-memory vault service for tests. Outputs are registered per
/// `(vault, target)`; jobs submitted through the client complete after
/// `complete_after` observations through `list_jobs`.
#[derive(Default)]
pub struct FakeVaultClient {
    state: Mutex<FakeState>,
}

#[derive(Default)]
struct FakeState {
    vaults: Vec<String>,
    jobs: Vec<(Job, usize)>,
    outputs: HashMap<(String, JobTarget), Bytes>,
    corrupt_archives: HashSet<String>,
    reject_submissions: bool,
    complete_after: Option<usize>,
    hide_submitted_jobs: bool,
    failing_listings: usize,
    submissions: Vec<(String, JobTarget)>,
    list_calls: usize,
    fetches: usize,
    next_id: usize,
}

impl FakeVaultClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vaults(self, vaults: &[&str]) -> Self {
        self.state.lock().unwrap().vaults = vaults.iter().map(|v| v.to_string()).collect();
        self
    }

    pub fn with_output(self, vault: &str, target: JobTarget, data: impl Into<Bytes>) -> Self {
        self.state
            .lock()
            .unwrap()
            .outputs
            .insert((vault.to_string(), target), data.into());
        self
    }

    pub fn with_job(self, vault: &str, target: JobTarget, completed: bool) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let job = state.new_job(vault, &target, completed);
            state.jobs.push((job, 0));
        }
        self
    }

    /// A job the service gave up on: completed, but without output.
    pub fn with_failed_job(self, vault: &str, target: JobTarget) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let mut job = state.new_job(vault, &target, true);
            job.status = JobStatus::Failed;
            state.jobs.push((job, 0));
        }
        self
    }

    /// The next `count` calls to `list_jobs` fail with a service error.
    pub fn failing_listings(self, count: usize) -> Self {
        self.state.lock().unwrap().failing_listings = count;
        self
    }

    pub fn with_corrupt_archive(self, archive_id: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .corrupt_archives
            .insert(archive_id.to_string());
        self
    }

    pub fn rejecting_submissions(self) -> Self {
        self.state.lock().unwrap().reject_submissions = true;
        self
    }

    /// Submitted jobs never show up in `list_jobs`, like a listing that lags
    /// behind job creation.
    pub fn hiding_submitted_jobs(self) -> Self {
        self.state.lock().unwrap().hide_submitted_jobs = true;
        self
    }

    pub fn completing_after(self, observations: usize) -> Self {
        self.state.lock().unwrap().complete_after = Some(observations);
        self
    }

    pub fn submissions(&self) -> Vec<(String, JobTarget)> {
        self.state.lock().unwrap().submissions.clone()
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().unwrap().list_calls
    }

    pub fn fetches(&self) -> usize {
        self.state.lock().unwrap().fetches
    }
}

impl FakeState {
    fn new_job(&mut self, vault: &str, target: &JobTarget, completed: bool) -> Job {
        self.next_id += 1;
        let output_size = self
            .outputs
            .get(&(vault.to_string(), target.clone()))
            .map(|data| data.len() as u64);

        Job {
            id: format!("job-{}", self.next_id),
            vault: vault.to_string(),
            action: target.action(),
            archive_id: match target {
                JobTarget::Inventory => None,
                JobTarget::Archive(id) => Some(id.clone()),
            },
            completed,
            status: if completed {
                JobStatus::Succeeded
            } else {
                JobStatus::InProgress
            },
            output_size,
            created_at: None,
        }
    }

    fn submit(&mut self, vault: &str, target: JobTarget) -> Result<JobHandle> {
        self.submissions.push((vault.to_string(), target.clone()));

        if self.reject_submissions {
            return Err(RestoreError::SubmissionFailed {
                vault: vault.to_string(),
                target: target.to_string(),
                reason: "service unavailable".to_string(),
            });
        }

        let job = self.new_job(vault, &target, false);
        let handle = JobHandle {
            id: job.id.clone(),
            vault: vault.to_string(),
        };
        if !self.hide_submitted_jobs {
            self.jobs.push((job, 0));
        }

        Ok(handle)
    }
}

#[async_trait]
impl VaultClient for FakeVaultClient {
    async fn list_vaults(&self) -> Result<Vec<String>> {
        Ok(self.state.lock().unwrap().vaults.clone())
    }

    async fn list_jobs(&self, vault: &str) -> Result<Vec<Job>> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;
        if state.failing_listings > 0 {
            state.failing_listings -= 1;
            return Err(RestoreError::service(vault, "connection reset"));
        }
        let complete_after = state.complete_after;

        let mut jobs = Vec::new();
        for (job, observations) in state.jobs.iter_mut() {
            if job.vault != vault {
                continue;
            }
            if !job.completed && complete_after.is_some_and(|limit| *observations >= limit) {
                job.completed = true;
                job.status = JobStatus::Succeeded;
            }
            *observations += 1;
            jobs.push(job.clone());
        }

        Ok(jobs)
    }

    async fn submit_inventory_job(&self, vault: &str) -> Result<JobHandle> {
        self.state.lock().unwrap().submit(vault, JobTarget::Inventory)
    }

    async fn submit_archive_job(&self, vault: &str, archive_id: &str) -> Result<JobHandle> {
        self.state
            .lock()
            .unwrap()
            .submit(vault, JobTarget::Archive(archive_id.to_string()))
    }

    async fn fetch_output(&self, job: &Job, validate_checksum: bool) -> Result<Bytes> {
        let mut state = self.state.lock().unwrap();
        state.fetches += 1;

        if !job.has_output() {
            return Err(RestoreError::service(&job.vault, format!("job {} has no output", job.id)));
        }

        let target = match &job.archive_id {
            Some(id) => JobTarget::Archive(id.clone()),
            None => JobTarget::Inventory,
        };

        if let JobTarget::Archive(id) = &target {
            if validate_checksum && state.corrupt_archives.contains(id) {
                return Err(RestoreError::ChecksumMismatch {
                    vault: job.vault.clone(),
                    archive_id: id.clone(),
                    expected: "0".repeat(64),
                    actual: "f".repeat(64),
                });
            }
        }

        state
            .outputs
            .get(&(job.vault.clone(), target))
            .cloned()
            .ok_or_else(|| RestoreError::service(&job.vault, format!("no output for job {}", job.id)))
    }
}
