use std::sync::Arc;

use oracle_common::error::JobStoreError;
use oracle_common::http::Fetcher;
use oracle_common::store::JobStore;
use oracle_common::types::{ExecutionState, Job, JobResult};
use time::OffsetDateTime;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::config::PoolConfig;

struct Inner {
    store: Arc<JobStore>,
    fetcher: Fetcher,
    semaphore: Arc<Semaphore>,
    results_tx: mpsc::Sender<Option<JobResult>>,
    config: PoolConfig,
}

/// A bounded async task group executing [`Job`]s: fetch, parse, extract, with
/// retries isolated inside the fetcher and per-job failure isolation here.
/// Mirrors `hook_worker::worker::WebhookWorker`'s semaphore-gated
/// spawn-per-job model, generalized from webhook delivery to oracle jobs.
pub struct WorkerPool {
    inner: Arc<Inner>,
}

impl WorkerPool {
    pub fn new(
        store: Arc<JobStore>,
        fetcher: Fetcher,
        config: PoolConfig,
    ) -> (Self, mpsc::Receiver<Option<JobResult>>) {
        let (results_tx, results_rx) = mpsc::channel(config.results_channel_capacity);
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));

        let inner = Arc::new(Inner {
            store,
            fetcher,
            semaphore,
            results_tx,
            config,
        });

        (Self { inner }, results_rx)
    }

    /// Non-blocking enqueue: spawns a task that waits for a permit, then runs
    /// the job. The caller never blocks; back-pressure shows up as the spawned
    /// task waiting on the semaphore.
    pub fn submit(&self, job: Job, cancel: CancellationToken) {
        let inner = self.inner.clone();
        let labels = [("request_id", job.request_id.to_string())];
        metrics::counter!("oracle_jobs_total", &labels).increment(1);

        tokio::spawn(async move {
            let saturation = 1f64
                - inner.semaphore.available_permits() as f64 / inner.config.max_concurrent_jobs as f64;
            metrics::gauge!("oracle_worker_saturation_percent").set(saturation);

            let permit = tokio::select! {
                permit = inner.semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return,
                },
                _ = cancel.cancelled() => return,
            };

            if let Err(err) = process_job(&inner, job, &cancel).await {
                warn!(error = %err, "failed to process job");
            }

            drop(permit);
        });
    }

    /// Returns once every permit is free, i.e. no job is in flight.
    pub async fn wait(&self) {
        let max = self.inner.config.max_concurrent_jobs as u32;
        let _ = self.inner.semaphore.acquire_many(max).await;
    }

    /// Permits not currently held; an upper bound on how many more jobs the
    /// pool can start right now without queuing behind an in-flight one.
    pub fn available_capacity(&self) -> usize {
        self.inner.semaphore.available_permits()
    }
}

async fn process_job(
    inner: &Inner,
    job: Job,
    cancel: &CancellationToken,
) -> Result<(), JobStoreError> {
    let request_id = job.request_id;
    let labels = [("request_id", request_id.to_string())];

    // Step 1: honor the pre-run delay as a cooperative suspension, not a plain sleep.
    if job.delay > std::time::Duration::ZERO && job.nonce > 0 {
        tokio::select! {
            _ = tokio::time::sleep(job.delay) => {}
            _ = cancel.cancelled() => return Ok(()),
        }
    }

    // Step 2: atomically bump the stored nonce before issuing the HTTP call, so
    // results for a given request id are produced in monotonically increasing
    // nonce order.
    let bumped = inner
        .store
        .update_returning(request_id, |j| {
            j.execution_state = ExecutionState::Executing;
            j.nonce += 1;
        })
        .await?;

    // Step 3: fetch.
    let fetch_result = tokio::select! {
        result = inner.fetcher.fetch(&bumped.url) => result,
        _ = cancel.cancelled() => return Ok(()),
    };

    let bytes = match fetch_result {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(request_id, error = %err, "fetch failed");
            let _ = inner.results_tx.send(None).await;
            metrics::counter!("oracle_jobs_failed", &labels, "class" => "fetch").increment(1);
            // A failed attempt never happened as far as the round is concerned:
            // roll the speculative bump back so the next attempt retries the
            // same round, not a skipped one.
            rollback_and_cooldown(inner, request_id, job.nonce, inner.config.fetch_cooldown).await;
            return Ok(());
        }
    };

    // Step 4: parse + extract.
    let extracted = oracle_common::http::parse(&bytes)
        .map_err(|err| err.to_string())
        .and_then(|doc| oracle_common::http::extract(&doc, &bumped.parse_rule).map_err(|err| err.to_string()));

    let data = match extracted {
        Ok(data) => data,
        Err(err) => {
            error!(request_id, error = %err, "parse/extract failed, result will not be submitted");
            metrics::counter!("oracle_jobs_failed", &labels, "class" => "parse").increment(1);
            rollback_and_cooldown(inner, request_id, job.nonce, inner.config.parse_cooldown).await;
            return Ok(());
        }
    };

    // Step 5: push the result and await the chain's Complete event to re-arm.
    let result = JobResult {
        request_id,
        data,
        nonce: bumped.nonce,
    };
    inner
        .store
        .update(request_id, |j| {
            j.execution_state = ExecutionState::CompletedAwaitingRound;
        })
        .await?;
    metrics::counter!("oracle_jobs_completed", &labels).increment(1);
    let _ = inner.results_tx.send(Some(result)).await;

    Ok(())
}

/// A failed fetch/parse attempt must not advance the round: the speculative
/// nonce bump from step 2 is rolled back to `original_nonce`, and the job goes
/// back to `Pending` with `next_run` pushed out by `cooldown`.
async fn rollback_and_cooldown(
    inner: &Inner,
    request_id: u64,
    original_nonce: u64,
    cooldown: std::time::Duration,
) {
    let _ = inner
        .store
        .update(request_id, |j| {
            j.nonce = original_nonce;
            j.execution_state = ExecutionState::Pending;
            j.delay = cooldown;
            j.updated_at = OffsetDateTime::now_utc();
            j.next_run = j.updated_at + cooldown;
        })
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use oracle_common::http::FetcherConfig;
    use std::time::Duration;

    fn job(id: u64, url: String) -> Job {
        Job::new(id, url, "value".into(), 0, Duration::from_secs(60), Duration::ZERO)
    }

    #[tokio::test]
    async fn successful_job_bumps_nonce_and_pushes_result() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/ok")
            .with_status(200)
            .with_body(r#"{"value": "1388.95"}"#)
            .create_async()
            .await;

        let store = Arc::new(JobStore::new());
        let url = format!("{}/ok", server.url());
        store.put(job(7, url)).await;

        let fetcher = Fetcher::new(FetcherConfig::default());
        let (pool, mut results) = WorkerPool::new(store.clone(), fetcher, PoolConfig::default());

        pool.submit(store.get(7).await.unwrap(), CancellationToken::new());

        let result = results.recv().await.flatten().expect("expected a result");
        assert_eq!(result.request_id, 7);
        assert_eq!(result.data, "1388.95");
        assert_eq!(result.nonce, 1);

        let stored = store.get(7).await.unwrap();
        assert_eq!(stored.nonce, 1);
        assert_eq!(stored.execution_state, ExecutionState::CompletedAwaitingRound);
    }

    #[tokio::test]
    async fn fetch_failure_pushes_none_and_sets_cooldown() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/fail")
            .with_status(500)
            .create_async()
            .await;

        let store = Arc::new(JobStore::new());
        let url = format!("{}/fail", server.url());
        store.put(job(1, url)).await;

        let fetcher = Fetcher::new(oracle_common::http::FetcherConfig {
            retry_policy: oracle_common::retry::RetryPolicy::new(
                2,
                Duration::from_millis(1),
                Some(Duration::from_millis(2)),
            )
            .with_max_attempts(1),
            ..Default::default()
        });
        let (pool, mut results) = WorkerPool::new(store.clone(), fetcher, PoolConfig::default());

        pool.submit(store.get(1).await.unwrap(), CancellationToken::new());

        let result = results.recv().await.expect("channel should yield a None");
        assert!(result.is_none());

        let stored = store.get(1).await.unwrap();
        assert_eq!(stored.nonce, 0, "a failed attempt must not advance the round");
        assert_eq!(stored.execution_state, ExecutionState::Pending);
        assert!(stored.next_run > OffsetDateTime::now_utc());
    }

    #[tokio::test]
    async fn parse_failure_does_not_push_a_result() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/badshape")
            .with_status(200)
            .with_body(r#"{"rates": {"USD": 1}}"#)
            .create_async()
            .await;

        let store = Arc::new(JobStore::new());
        let mut j = job(2, format!("{}/badshape", server.url()));
        j.parse_rule = "rates.KRW".to_string();
        store.put(j).await;

        let fetcher = Fetcher::new(FetcherConfig::default());
        let (pool, mut results) = WorkerPool::new(store.clone(), fetcher, PoolConfig::default());

        pool.submit(store.get(2).await.unwrap(), CancellationToken::new());
        pool.wait().await;

        assert!(results.try_recv().is_err());

        let stored = store.get(2).await.unwrap();
        assert_eq!(stored.nonce, 0, "store[id].nonce is unchanged after a parse failure (S4)");
        assert_eq!(stored.execution_state, ExecutionState::Pending);
    }
}
