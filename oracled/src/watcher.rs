//! Subscription watcher. Maintains the three long-lived chain subscriptions
//! and turns their raw deliveries into a single typed event feed.

use std::sync::Arc;

use oracle_common::chain::{ChainClient, RawEvent, SubscriptionFilter};
use oracle_common::health::HealthHandle;
use oracle_common::types::{Event, RequestStatus};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub struct WatcherConfig {
    pub subscription_buffer: usize,
    pub output_buffer: usize,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            subscription_buffer: 256,
            output_buffer: 1024,
        }
    }
}

/// Runs the watcher to completion: backfill, open subscriptions, forward
/// deliveries. Returns the output feed; the task closes it on exit.
pub fn spawn(
    chain: Arc<dyn ChainClient>,
    config: WatcherConfig,
    cancel: CancellationToken,
    health: HealthHandle,
    readiness: HealthHandle,
) -> mpsc::Receiver<Event> {
    let (tx, rx) = mpsc::channel(config.output_buffer);

    tokio::spawn(async move {
        if let Err(err) = run(&chain, &tx, &config, &cancel, &health, &readiness).await {
            error!(error = %err, "watcher exiting fatally");
            let _ = tx.send(Event::FatalError(err)).await;
        }
    });

    rx
}

async fn run(
    chain: &Arc<dyn ChainClient>,
    tx: &mpsc::Sender<Event>,
    config: &WatcherConfig,
    cancel: &CancellationToken,
    health: &HealthHandle,
    readiness: &HealthHandle,
) -> Result<(), String> {
    // Startup: backfill every currently-enabled request document.
    let docs = chain
        .oracle_request_docs(RequestStatus::Enabled)
        .await
        .map_err(|err| format!("backfill query failed: {err}"))?;
    info!(count = docs.len(), "backfilled enabled request documents");
    for doc in docs {
        if tx.send(Event::RequestDoc(doc)).await.is_err() {
            return Ok(());
        }
    }

    let mut register_rx = chain
        .subscribe(SubscriptionFilter::Register, config.subscription_buffer)
        .await
        .map_err(|err| format!("register subscription failed: {err}"))?;
    let mut update_rx = chain
        .subscribe(SubscriptionFilter::Update, config.subscription_buffer)
        .await
        .map_err(|err| format!("update subscription failed: {err}"))?;
    let mut complete_rx = chain
        .subscribe(SubscriptionFilter::Complete, config.subscription_buffer)
        .await
        .map_err(|err| format!("complete subscription failed: {err}"))?;

    health.report_healthy().await;
    readiness.report_healthy().await;

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                chain.unsubscribe_all().await;
                return Ok(());
            }

            maybe = register_rx.recv() => {
                match maybe {
                    Some(event) => forward_request_changed(chain, tx, event).await?,
                    None => {
                        chain.unsubscribe_all().await;
                        return Err("register subscription closed unexpectedly".to_string());
                    }
                }
            }

            maybe = update_rx.recv() => {
                match maybe {
                    Some(event) => forward_request_changed(chain, tx, event).await?,
                    None => {
                        chain.unsubscribe_all().await;
                        return Err("update subscription closed unexpectedly".to_string());
                    }
                }
            }

            maybe = complete_rx.recv() => {
                match maybe {
                    Some(RawEvent::Completions { completions, min_gas_price }) => {
                        if tx.send(Event::CompleteBatch(completions, min_gas_price)).await.is_err() {
                            return Ok(());
                        }
                    }
                    Some(RawEvent::RequestChanged { .. }) => {
                        warn!("complete subscription delivered an unexpected RequestChanged event");
                    }
                    None => {
                        chain.unsubscribe_all().await;
                        return Err("complete subscription closed unexpectedly".to_string());
                    }
                }
            }

            _ = tokio::time::sleep(std::time::Duration::from_secs(10)) => {
                health.report_healthy().await;
            }
        }
    }
}

async fn forward_request_changed(
    chain: &Arc<dyn ChainClient>,
    tx: &mpsc::Sender<Event>,
    event: RawEvent,
) -> Result<(), String> {
    let RawEvent::RequestChanged { request_id } = event else {
        warn!("register/update subscription delivered an unexpected Completions event");
        return Ok(());
    };

    match chain.oracle_request_doc(request_id).await {
        Ok(doc) => {
            let _ = tx.send(Event::RequestDoc(doc)).await;
        }
        Err(err) => {
            warn!(request_id, error = %err, "failed to re-query request document after change event");
        }
    }
    Ok(())
}
