//! Dispatcher / scheduler. The sole mutator of the job store on the event
//! path: translates `RequestDoc`/`CompleteBatch` events into store upserts
//! and worker submissions, plus a 1s safety-net tick for missed re-arms.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use oracle_common::health::HealthHandle;
use oracle_common::store::JobStore;
use oracle_common::types::{Event, ExecutionState, Job, RequestStatus};
use oracle_worker::pool::WorkerPool;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct DispatcherConfig {
    pub daemon_address: String,
    pub safety_net_tick: Duration,
}

/// Runs until `events` closes or cancellation fires.
pub async fn run(
    mut events: mpsc::Receiver<Event>,
    store: Arc<JobStore>,
    pool: Arc<WorkerPool>,
    gas_price: Arc<ArcSwap<String>>,
    config: DispatcherConfig,
    cancel: CancellationToken,
    health: HealthHandle,
) {
    let mut last_complete_time: HashMap<u64, OffsetDateTime> = HashMap::new();
    let mut ticker = tokio::time::interval(config.safety_net_tick);

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                info!("dispatcher shutting down");
                return;
            }

            maybe_event = events.recv() => {
                match maybe_event {
                    Some(Event::RequestDoc(doc)) => {
                        handle_request_doc(&store, &pool, &config, &cancel, &last_complete_time, doc).await;
                    }
                    Some(Event::CompleteBatch(completions, min_gas_price)) => {
                        if let Some(price) = min_gas_price {
                            gas_price.store(Arc::new(price));
                        }
                        for completion in completions {
                            last_complete_time.insert(completion.request_id, completion.block_time);
                            handle_completion(&store, &pool, &cancel, completion.request_id, completion.nonce, completion.block_time).await;
                        }
                    }
                    Some(Event::FatalError(err)) => {
                        warn!(error = %err, "watcher reported a fatal error, dispatcher exiting");
                        return;
                    }
                    None => {
                        info!("watcher feed closed, dispatcher exiting");
                        return;
                    }
                }
                health.report_healthy().await;
            }

            _ = ticker.tick() => {
                safety_net_tick(&store, &pool, &cancel).await;
                health.report_healthy().await;
            }
        }
    }
}

async fn handle_request_doc(
    store: &Arc<JobStore>,
    pool: &Arc<WorkerPool>,
    config: &DispatcherConfig,
    cancel: &CancellationToken,
    last_complete_time: &HashMap<u64, OffsetDateTime>,
    doc: oracle_common::types::RequestDoc,
) {
    let request_id = doc.request_id;

    if doc.status != RequestStatus::Enabled {
        store.remove(request_id).await;
        return;
    }

    let Some(index) = doc.assigned_index(&config.daemon_address) else {
        store.remove(request_id).await;
        return;
    };

    let Some(endpoint) = doc.endpoint_for_index(index) else {
        store.remove(request_id).await;
        return;
    };

    let existing_nonce = store.get(request_id).await.map(|j| j.nonce).unwrap_or(0);
    let nonce = existing_nonce.max(doc.nonce);

    let now = OffsetDateTime::now_utc();
    let base_time = last_complete_time.get(&request_id).copied().unwrap_or(now - doc.period());
    let delay = (base_time + doc.period()).saturating_sub(now);

    let job = Job {
        request_id,
        url: endpoint.url.clone(),
        parse_rule: endpoint.parse_rule.clone(),
        nonce,
        period: doc.period(),
        status: RequestStatus::Enabled,
        execution_state: ExecutionState::Pending,
        delay,
        created_at: now,
        updated_at: now,
        next_run: now + delay,
    };
    store.put(job.clone()).await;

    pool.submit(job, cancel.clone());
}

async fn handle_completion(
    store: &Arc<JobStore>,
    pool: &Arc<WorkerPool>,
    cancel: &CancellationToken,
    request_id: u64,
    nonce: u64,
    block_time: OffsetDateTime,
) {
    let updated = store
        .update_returning(request_id, |j| {
            j.nonce = j.nonce.max(nonce);
            let now = OffsetDateTime::now_utc();
            j.delay = (block_time + j.period).saturating_sub(now);
            j.next_run = now + j.delay;
            j.execution_state = ExecutionState::Pending;
        })
        .await;

    if let Ok(job) = updated {
        pool.submit(job, cancel.clone());
    }
}

/// Polls `store.ready()` as a safety net for re-arms whose Complete event was
/// missed; submits at most the pool's currently-available capacity.
async fn safety_net_tick(store: &Arc<JobStore>, pool: &Arc<WorkerPool>, cancel: &CancellationToken) {
    let capacity = pool.available_capacity();
    if capacity == 0 {
        return;
    }

    let ready = store.ready(OffsetDateTime::now_utc()).await;
    if ready.len() > capacity {
        warn!(
            ready = ready.len(),
            capacity, "more jobs ready than available capacity this tick, deferring the rest"
        );
    }

    for job in ready.into_iter().take(capacity) {
        pool.submit(job, cancel.clone());
    }
}

trait DurationSaturatingSub {
    fn saturating_sub(self, rhs: Self) -> Duration;
}

impl DurationSaturatingSub for OffsetDateTime {
    fn saturating_sub(self, rhs: Self) -> Duration {
        let diff = self - rhs;
        if diff.is_negative() {
            Duration::ZERO
        } else {
            diff.try_into().unwrap_or(Duration::ZERO)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oracle_common::http::{Fetcher, FetcherConfig};
    use oracle_common::types::{Endpoint, RequestDoc};
    use oracle_worker::config::PoolConfig;

    fn doc(request_id: u64, account_list: Vec<&str>, url: String) -> RequestDoc {
        RequestDoc {
            request_id,
            status: RequestStatus::Enabled,
            period_sec: 60,
            account_list: account_list.into_iter().map(String::from).collect(),
            endpoints: vec![Endpoint { url, parse_rule: "value".to_string() }],
            nonce: 0,
        }
    }

    #[tokio::test]
    async fn register_event_creates_a_job_for_assigned_daemon() {
        let server = mockito::Server::new_async().await;
        let url = format!("{}/price", server.url());

        let store = Arc::new(JobStore::new());
        let fetcher = Fetcher::new(FetcherConfig::default());
        let (pool, _results) = WorkerPool::new(store.clone(), fetcher, PoolConfig::default());
        let pool = Arc::new(pool);
        let cancel = CancellationToken::new();

        handle_request_doc(
            &store,
            &pool,
            &DispatcherConfig { daemon_address: "addr-a".to_string(), safety_net_tick: Duration::from_secs(1) },
            &cancel,
            &HashMap::new(),
            doc(1, vec!["addr-a", "addr-b"], url.clone()),
        )
        .await;

        let job = store.get(1).await.expect("job should be stored");
        assert_eq!(job.url, url);
    }

    #[tokio::test]
    async fn register_event_for_unassigned_daemon_stores_nothing() {
        let server = mockito::Server::new_async().await;
        let url = format!("{}/price", server.url());

        let store = Arc::new(JobStore::new());
        let fetcher = Fetcher::new(FetcherConfig::default());
        let (pool, _results) = WorkerPool::new(store.clone(), fetcher, PoolConfig::default());
        let pool = Arc::new(pool);
        let cancel = CancellationToken::new();

        handle_request_doc(
            &store,
            &pool,
            &DispatcherConfig { daemon_address: "addr-z".to_string(), safety_net_tick: Duration::from_secs(1) },
            &cancel,
            &HashMap::new(),
            doc(2, vec!["addr-a", "addr-b"], url),
        )
        .await;

        assert!(store.get(2).await.is_none());
    }

    #[tokio::test]
    async fn completion_advances_nonce_and_rearms() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/x")
            .with_status(200)
            .with_body(r#"{"value": "42"}"#)
            .create_async()
            .await;

        let store = Arc::new(JobStore::new());
        let fetcher = Fetcher::new(FetcherConfig::default());
        let (pool, mut results) = WorkerPool::new(store.clone(), fetcher, PoolConfig::default());
        let pool = Arc::new(pool);
        let cancel = CancellationToken::new();

        store
            .put(Job::new(7, format!("{}/x", server.url()), "value".to_string(), 0, Duration::from_secs(60), Duration::ZERO))
            .await;

        handle_completion(&store, &pool, &cancel, 7, 1, OffsetDateTime::now_utc()).await;

        let job = store.get(7).await.unwrap();
        assert_eq!(job.nonce, 1);

        let result = results.recv().await.flatten().expect("re-armed job should produce a result");
        assert_eq!(result.request_id, 7);
    }
}
