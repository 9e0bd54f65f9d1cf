use crate::core::jobs::{Outcome, RetrievalJobTracker};
use crate::error::{RestoreError, Result};
use crate::vault_clients::JobTarget;
use bytes::Bytes;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Retrieval jobs take hours, so there is no point asking more often.
pub(crate) const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Listing or download errors tolerated in a row before the wait gives up.
pub(crate) const MAX_TRANSIENT_FAILURES: u32 = 3;

/// Called with the target and the time until the next check whenever a
/// retrieval is still running.
pub(crate) type WaitObserver<'a> = &'a (dyn Fn(&JobTarget, Duration) + Send + Sync);

pub(crate) struct BlockingRetriever {
    tracker: RetrievalJobTracker,
    poll_interval: Duration,
    timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl BlockingRetriever {
    pub(crate) fn new(tracker: RetrievalJobTracker, cancel: CancellationToken) -> Self {
        Self {
            tracker,
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
            cancel,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub(crate) fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub(crate) async fn retrieve(&self, vault: &str, target: &JobTarget) -> Result<Bytes> {
        self.retrieve_observed(vault, target, &|_, _| {}).await
    }

    /// Resolves `target` until its output is ready. Waits `poll_interval`
    /// between attempts. Service errors are retried on the next poll up to
    /// `MAX_TRANSIENT_FAILURES` times in a row; any other error ends the
    /// loop at once.
    pub(crate) async fn retrieve_observed(
        &self,
        vault: &str,
        target: &JobTarget,
        on_wait: WaitObserver<'_>,
    ) -> Result<Bytes> {
        let started = Instant::now();
        let mut transient_failures = 0;

        loop {
            if self.cancel.is_cancelled() {
                return Err(RestoreError::Cancelled);
            }

            match self.tracker.resolve(vault, target).await {
                Ok(Outcome::Ready { data, .. }) => return Ok(data),
                Ok(Outcome::Pending) => transient_failures = 0,
                Err(e @ RestoreError::Service { .. }) if transient_failures < MAX_TRANSIENT_FAILURES => {
                    transient_failures += 1;
                    warn!(
                        vault,
                        attempt = transient_failures,
                        "checking {} failed, trying again on the next poll: {}",
                        target,
                        e
                    );
                }
                Err(e) => return Err(e),
            }

            let waited = started.elapsed();
            let wait = match self.timeout {
                Some(timeout) if waited >= timeout => {
                    return Err(RestoreError::TimedOut {
                        vault: vault.to_string(),
                        target: target.to_string(),
                        waited,
                    });
                }
                Some(timeout) => self.poll_interval.min(timeout - waited),
                None => self.poll_interval,
            };

            info!(vault, "{} not ready yet, checking again in {:?}", target, wait);
            on_wait(target, wait);

            tokio::select! {
                _ = self.cancel.cancelled() => return Err(RestoreError::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault_clients::fake::FakeVaultClient;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn archive(id: &str) -> JobTarget {
        JobTarget::Archive(id.to_string())
    }

    fn retriever(client: Arc<FakeVaultClient>, cancel: CancellationToken) -> BlockingRetriever {
        BlockingRetriever::new(RetrievalJobTracker::new(client), cancel)
    }

    #[tokio::test(start_paused = true)]
    async fn ready_output_returns_without_polling() {
        let client = Arc::new(
            FakeVaultClient::new()
                .with_output("Backups", archive("id1"), &b"payload"[..])
                .with_job("Backups", archive("id1"), true),
        );
        let retriever = retriever(client.clone(), CancellationToken::new());
        let waits = AtomicUsize::new(0);
        let started = Instant::now();

        let data = retriever
            .retrieve_observed("Backups", &archive("id1"), &|_, _| {
                waits.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();

        assert_eq!(&data[..], b"payload");
        assert_eq!(waits.load(Ordering::SeqCst), 0);
        assert_eq!(client.list_calls(), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_across_poll_intervals_until_ready() {
        let client = Arc::new(
            FakeVaultClient::new()
                .with_output("Backups", archive("id1"), &b"late"[..])
                .completing_after(2),
        );
        let retriever = retriever(client.clone(), CancellationToken::new());
        let started = Instant::now();

        let data = retriever.retrieve("Backups", &archive("id1")).await.unwrap();

        assert_eq!(&data[..], b"late");
        assert_eq!(client.submissions().len(), 1);
        // submit, observe twice while running, then complete
        assert_eq!(client.list_calls(), 4);
        assert_eq!(started.elapsed(), DEFAULT_POLL_INTERVAL * 3);
    }

    #[tokio::test(start_paused = true)]
    async fn listing_errors_are_retried_on_the_next_poll() {
        let client = Arc::new(
            FakeVaultClient::new()
                .with_output("Backups", archive("id1"), &b"payload"[..])
                .with_job("Backups", archive("id1"), true)
                .failing_listings(2),
        );
        let retriever = retriever(client.clone(), CancellationToken::new());
        let started = Instant::now();

        let data = retriever.retrieve("Backups", &archive("id1")).await.unwrap();

        assert_eq!(&data[..], b"payload");
        assert_eq!(client.list_calls(), 3);
        assert_eq!(started.elapsed(), DEFAULT_POLL_INTERVAL * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_listing_errors_end_the_wait() {
        let client = Arc::new(
            FakeVaultClient::new()
                .with_job("Backups", archive("id1"), false)
                .failing_listings(100),
        );
        let retriever = retriever(client.clone(), CancellationToken::new());

        let result = retriever.retrieve("Backups", &archive("id1")).await;

        assert!(matches!(result, Err(RestoreError::Service { .. })));
        assert_eq!(client.list_calls(), MAX_TRANSIENT_FAILURES as usize + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_timeout() {
        let client = Arc::new(FakeVaultClient::new().with_job("Backups", archive("id1"), false));
        let retriever = retriever(client, CancellationToken::new())
            .with_poll_interval(Duration::from_secs(600))
            .with_timeout(Some(Duration::from_secs(1500)));
        let started = Instant::now();

        let result = retriever.retrieve("Backups", &archive("id1")).await;

        assert!(matches!(result, Err(RestoreError::TimedOut { .. })));
        assert_eq!(started.elapsed(), Duration::from_secs(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn submission_failure_is_not_retried() {
        let client = Arc::new(FakeVaultClient::new().rejecting_submissions());
        let retriever = retriever(client.clone(), CancellationToken::new());

        let result = retriever.retrieve("Backups", &archive("id1")).await;

        assert!(matches!(result, Err(RestoreError::SubmissionFailed { .. })));
        assert_eq!(client.submissions().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_the_wait() {
        let client = Arc::new(FakeVaultClient::new().with_job("Backups", archive("id1"), false));
        let cancel = CancellationToken::new();
        let retriever = retriever(client, cancel.clone());

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let result = retriever.retrieve("Backups", &archive("id1")).await;

        assert!(matches!(result, Err(RestoreError::Cancelled)));
        assert!(started.elapsed() < DEFAULT_POLL_INTERVAL);
    }
}
