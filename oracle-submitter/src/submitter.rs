use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use oracle_common::canonical::signing_hash;
use oracle_common::chain::ChainClient;
use oracle_common::keyring::Keyring;
use oracle_common::types::{JobResult, SubmitDataSet};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::SubmitError;
use crate::sequence::SequenceManager;

/// Response codes the chain is known to use for oracle submissions.
const CODE_SUCCESS: u32 = 0;
const CODE_ALREADY_CERTIFIED: u32 = 18;
const CODE_SEQUENCE_MISMATCH: u32 = 32;

#[derive(Debug, Clone)]
pub struct SubmitterConfig {
    pub chain_id: String,
    pub gas_limit: u64,
    pub gas_adjustment: f64,
    pub default_gas_price: String,
    pub max_attempts: u32,
}

/// The transaction envelope wrapping a signed `SubmitDataSet`. The concrete wire
/// codec of the chain is an external collaborator; this struct stands in
/// for it and is serialized with `serde_json` rather than a protobuf codec.
#[derive(Debug, Serialize)]
struct TxEnvelope<'a> {
    chain_id: &'a str,
    account_number: u64,
    sequence: u64,
    gas_limit: u64,
    gas_adjustment: f64,
    gas_price: String,
    sign_mode: &'static str,
    msg: &'a SubmitDataSet,
}

/// Builds, signs, and broadcasts one transaction per successful job result,
/// recovering from sequence mismatches.
pub struct Submitter {
    chain: Arc<dyn ChainClient>,
    keyring: Arc<dyn Keyring>,
    sequence: SequenceManager,
    config: SubmitterConfig,
    gas_price: Arc<ArcSwap<String>>,
}

impl Submitter {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        keyring: Arc<dyn Keyring>,
        sequence: SequenceManager,
        config: SubmitterConfig,
    ) -> Self {
        let gas_price = Arc::new(ArcSwap::from_pointee(config.default_gas_price.clone()));
        Self {
            chain,
            keyring,
            sequence,
            config,
            gas_price,
        }
    }

    /// A cheap clone of the gas-price handle, shared with the dispatcher so it
    /// can update the hint carried on Complete events.
    pub fn gas_price_handle(&self) -> Arc<ArcSwap<String>> {
        self.gas_price.clone()
    }

    pub async fn submit(&self, result: JobResult) -> Result<(), SubmitError> {
        let mut attempt = 1u32;

        loop {
            let tx_bytes = self.build_signed_tx(&result).await?;

            match self.chain.broadcast(tx_bytes).await {
                Ok(response) => match response.code {
                    CODE_SUCCESS => {
                        self.sequence.next().await;
                        metrics::counter!("oracle_broadcast_total", "code" => "0").increment(1);
                        info!(request_id = result.request_id, nonce = result.nonce, "broadcast succeeded");
                        return Ok(());
                    }
                    CODE_ALREADY_CERTIFIED => {
                        metrics::counter!("oracle_broadcast_total", "code" => "18").increment(1);
                        info!(request_id = result.request_id, "round already certified, treating as success");
                        return Ok(());
                    }
                    CODE_SEQUENCE_MISMATCH => {
                        metrics::counter!("oracle_broadcast_total", "code" => "32").increment(1);
                        warn!(request_id = result.request_id, attempt, "sequence mismatch, resyncing");
                        self.sequence.sync().await?;
                        if attempt >= self.config.max_attempts {
                            return Err(SubmitError::RetriesExhausted { attempts: attempt });
                        }
                        tokio::time::sleep(Duration::from_secs(attempt as u64)).await;
                        attempt += 1;
                    }
                    other => {
                        error!(
                            request_id = result.request_id,
                            code = other,
                            raw_log = %response.raw_log,
                            "broadcast rejected, abandoning this result"
                        );
                        metrics::counter!("oracle_broadcast_total", "code" => "other").increment(1);
                        return Err(SubmitError::Rejected {
                            code: other,
                            raw_log: response.raw_log,
                        });
                    }
                },
                Err(err) => {
                    warn!(request_id = result.request_id, attempt, error = %err, "broadcast transport error");
                    if attempt >= self.config.max_attempts {
                        return Err(err.into());
                    }
                    tokio::time::sleep(Duration::from_secs(attempt as u64)).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn build_signed_tx(&self, result: &JobResult) -> Result<Vec<u8>, SubmitError> {
        let mut dataset = SubmitDataSet {
            request_id: result.request_id,
            raw_data: result.data.clone(),
            nonce: result.nonce,
            provider: self.keyring.address().to_string(),
            signature: Vec::new(),
        };

        let digest = signing_hash(&dataset);
        let signature = self.keyring.sign(&digest).await?;
        dataset.signature = signature.0;

        let (account_number, sequence) = self.sequence.get().await;
        let envelope = TxEnvelope {
            chain_id: &self.config.chain_id,
            account_number,
            sequence,
            gas_limit: self.config.gas_limit,
            gas_adjustment: self.config.gas_adjustment,
            gas_price: self.gas_price.load().as_ref().clone(),
            sign_mode: "SIGN_MODE_DIRECT",
            msg: &dataset,
        };

        Ok(serde_json::to_vec(&envelope).expect("TxEnvelope is always serializable"))
    }
}

impl Submitter {
    /// Spawns the background task that periodically resyncs the sequence
    /// manager to bound drift (default every 5 minutes).
    pub fn spawn_periodic_resync(
        self: Arc<Self>,
        interval: Duration,
        cancel: tokio_util::sync::CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = self.sequence.sync().await {
                            warn!(error = %err, "periodic sequence sync failed");
                        }
                    }
                    _ = cancel.cancelled() => return,
                }
            }
        })
    }
}
