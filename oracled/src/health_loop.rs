//! Periodic health/supervisor loop. Probes the chain RPC client on a timer;
//! after enough consecutive failures, raises a fatal and the process exits
//! so an external supervisor can restart it.

use std::sync::Arc;
use std::time::Duration;

use oracle_common::chain::ChainClient;
use oracle_common::health::HealthHandle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

pub struct HealthLoopConfig {
    pub probe_interval: Duration,
    pub probe_timeout: Duration,
    pub max_attempts: u32,
}

pub async fn run(
    chain: Arc<dyn ChainClient>,
    config: HealthLoopConfig,
    fatal_tx: mpsc::Sender<String>,
    cancel: CancellationToken,
    health: HealthHandle,
) {
    let mut ticker = tokio::time::interval(config.probe_interval);
    let mut consecutive_failures = 0u32;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {
                let probe = tokio::time::timeout(config.probe_timeout, chain.status());
                match probe.await {
                    Ok(Ok(status)) if status.running => {
                        consecutive_failures = 0;
                        health.report_healthy().await;
                    }
                    Ok(Ok(_)) => {
                        consecutive_failures += 1;
                        warn!(consecutive_failures, "chain node reports not running");
                    }
                    Ok(Err(err)) => {
                        consecutive_failures += 1;
                        warn!(consecutive_failures, error = %err, "health probe failed");
                    }
                    Err(_) => {
                        consecutive_failures += 1;
                        warn!(consecutive_failures, "health probe timed out");
                    }
                }

                if consecutive_failures > config.max_attempts {
                    error!(consecutive_failures, "health probe exhausted its attempt budget, raising fatal");
                    let _ = fatal_tx.try_send("health probe exhausted its attempt budget".to_string());
                    return;
                }
            }
        }
    }
}
