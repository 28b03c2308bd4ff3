use std::sync::Arc;

use clap::Parser;
use oracle_common::chain::test_backend::TestChainClient;
use oracle_common::chain::{Account, ChainClient};
use oracle_common::health::HealthRegistry;
use oracle_common::keyring::{InMemoryKeyring, Keyring};
use oracle_common::store::JobStore;
use oracle_submitter::sequence::SequenceManager;
use oracle_submitter::submitter::Submitter;
use oracle_worker::pool::WorkerPool;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod cli;
mod config;
mod dispatcher;
mod handlers;
mod health_loop;
mod watcher;


use cli::Cli;
use config::Config;

/// How often the background task re-queries the chain for the account's
/// sequence number, bounding drift from broadcasts this daemon didn't see
/// (e.g. sent by another process sharing the same key). Not an externally
/// configured value.
const SEQUENCE_RESYNC_INTERVAL: std::time::Duration = std::time::Duration::from_secs(300);

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = Config::load(&cli.home).unwrap_or_else(|err| {
        eprintln!("failed to load configuration: {err}");
        std::process::exit(1);
    });

    let default_filter = cli.log_level.clone().unwrap_or_else(|| config.log.level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    if config.key.keyring_backend != "test" {
        error!(
            backend = %config.key.keyring_backend,
            "only the \"test\" keyring backend is wired up; file/os backends are external collaborators"
        );
        std::process::exit(1);
    }

    let address = config.key.name.clone();
    let keyring: Arc<dyn Keyring> = Arc::new(InMemoryKeyring::generate(address.clone(), 1));

    let chain = Arc::new(TestChainClient::new());
    chain
        .seed_account(&address, Account { account_number: 1, sequence: 0 })
        .await;
    let chain: Arc<dyn ChainClient> = chain;

    let liveness = HealthRegistry::new("liveness");
    let readiness = HealthRegistry::new("readiness");
    let deadline = time::Duration::seconds(config.health.probe_interval_sec as i64 * 4);

    let watcher_health = liveness.register("watcher".to_string(), deadline).await;
    let watcher_readiness = readiness.register("watcher".to_string(), deadline).await;
    let dispatcher_health = liveness.register("dispatcher".to_string(), deadline).await;
    let health_probe_handle = liveness.register("health_probe".to_string(), deadline).await;
    let submitter_health = liveness.register("submitter".to_string(), deadline).await;

    let store = Arc::new(JobStore::new());
    let fetcher = oracle_common::http::Fetcher::new(config.fetcher_config());
    let (pool, mut results_rx) = WorkerPool::new(store.clone(), fetcher, config.pool_config());
    let pool = Arc::new(pool);

    let sequence = SequenceManager::new(chain.clone(), address.clone())
        .await
        .unwrap_or_else(|err| {
            error!(error = %err, "failed to fetch initial account sequence");
            std::process::exit(1);
        });
    let submitter_config = config.submitter_config();
    let submitter = Arc::new(Submitter::new(chain.clone(), keyring, sequence, submitter_config));
    let gas_price = submitter.gas_price_handle();

    let cancel = CancellationToken::new();
    let (fatal_tx, mut fatal_rx) = mpsc::channel::<String>(1);

    let health_loop_config = health_loop::HealthLoopConfig {
        probe_interval: std::time::Duration::from_secs(config.health.probe_interval_sec),
        probe_timeout: std::time::Duration::from_secs(config.worker.timeout_sec),
        max_attempts: config.health.max_attempts,
    };
    let health_loop_handle = tokio::spawn(health_loop::run(
        chain.clone(),
        health_loop_config,
        fatal_tx.clone(),
        cancel.clone(),
        health_probe_handle,
    ));

    let events = watcher::spawn(
        chain.clone(),
        watcher::WatcherConfig::default(),
        cancel.clone(),
        watcher_health,
        watcher_readiness,
    );

    let dispatcher_config = dispatcher::DispatcherConfig {
        daemon_address: address.clone(),
        safety_net_tick: std::time::Duration::from_secs(1),
    };
    let dispatcher_handle = tokio::spawn(dispatcher::run(
        events,
        store.clone(),
        pool.clone(),
        gas_price,
        dispatcher_config,
        cancel.clone(),
        dispatcher_health,
    ));

    let submitter_consumer = {
        let submitter = submitter.clone();
        tokio::spawn(async move {
            while let Some(maybe_result) = results_rx.recv().await {
                let Some(result) = maybe_result else {
                    continue;
                };
                let request_id = result.request_id;
                if let Err(err) = submitter.submit(result).await {
                    warn!(request_id, error = %err, "failed to submit job result");
                }
                submitter_health.report_healthy().await;
            }
        })
    };

    let resync_handle = submitter
        .clone()
        .spawn_periodic_resync(SEQUENCE_RESYNC_INTERVAL, cancel.clone());

    let metrics_router = handlers::app(liveness, readiness);
    let metrics_bind = config.metrics.bind.clone();
    let metrics_handle = tokio::spawn(async move {
        if let Err(err) = oracle_common::metrics::serve(metrics_router, &metrics_bind).await {
            error!(error = %err, "metrics/health server exited");
        }
    });

    info!("oracled started");

    let fatal = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
            None
        }
        reason = fatal_rx.recv() => {
            error!(reason = ?reason, "fatal condition raised, shutting down");
            reason
        }
    };

    cancel.cancel();

    let _ = dispatcher_handle.await;
    pool.wait().await;
    drop(pool);
    let _ = submitter_consumer.await;

    resync_handle.abort();
    health_loop_handle.abort();
    metrics_handle.abort();

    match fatal {
        Some(_) => std::process::exit(1),
        None => std::process::exit(0),
    }
}
