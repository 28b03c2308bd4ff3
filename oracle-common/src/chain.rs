//! The chain RPC boundary. The core never talks to a concrete chain client;
//! it only ever calls through `ChainClient`, mirroring how `hook_common` draws a
//! line between the worker's logic and the concrete `PgQueue` it happens to run
//! against.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::ChainError;
use crate::types::{Completion, RequestDoc, RequestStatus};

/// Which of the three long-lived subscriptions to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionFilter {
    Register,
    Update,
    Complete,
}

/// A raw subscription delivery, before the watcher resolves it into a typed `Event`.
#[derive(Debug, Clone)]
pub enum RawEvent {
    /// Register/Update deliver just the affected request id; the watcher re-queries
    /// the document before emitting it.
    RequestChanged { request_id: u64 },
    /// Complete deliveries arrive batched, one entry per completion in the block.
    Completions {
        completions: Vec<Completion>,
        min_gas_price: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeStatus {
    pub running: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub account_number: u64,
    pub sequence: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastResponse {
    pub code: u32,
    pub raw_log: String,
    pub tx_hash: String,
}

/// The external chain RPC collaborator. Out of scope: the concrete wire
/// protocol, which a production implementation of this trait wraps.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn subscribe(
        &self,
        filter: SubscriptionFilter,
        buffer: usize,
    ) -> Result<mpsc::Receiver<RawEvent>, ChainError>;

    async fn unsubscribe_all(&self);

    async fn status(&self) -> Result<NodeStatus, ChainError>;

    async fn oracle_request_docs(&self, status: RequestStatus) -> Result<Vec<RequestDoc>, ChainError>;

    async fn oracle_request_doc(&self, id: u64) -> Result<RequestDoc, ChainError>;

    async fn account(&self, address: &str) -> Result<Account, ChainError>;

    async fn broadcast(&self, tx_bytes: Vec<u8>) -> Result<BroadcastResponse, ChainError>;
}

/// An in-process, channel-driven `ChainClient` used for development and tests.
/// Nothing here talks to a real network.
pub mod test_backend {
    use std::sync::Arc;

    use tokio::sync::{mpsc, Mutex};

    use super::*;

    #[derive(Default)]
    struct State {
        docs: std::collections::HashMap<u64, RequestDoc>,
        accounts: std::collections::HashMap<String, Account>,
        broadcasts: Vec<Vec<u8>>,
        next_broadcast_response: Option<BroadcastResponse>,
        running: bool,
    }

    /// A fully in-memory `ChainClient` driven by test code through `TestChainHandle`.
    pub struct TestChainClient {
        state: Arc<Mutex<State>>,
        register_tx: mpsc::Sender<RawEvent>,
        register_rx: Mutex<Option<mpsc::Receiver<RawEvent>>>,
        update_tx: mpsc::Sender<RawEvent>,
        update_rx: Mutex<Option<mpsc::Receiver<RawEvent>>>,
        complete_tx: mpsc::Sender<RawEvent>,
        complete_rx: Mutex<Option<mpsc::Receiver<RawEvent>>>,
    }

    impl TestChainClient {
        pub fn new() -> Self {
            let (register_tx, register_rx) = mpsc::channel(64);
            let (update_tx, update_rx) = mpsc::channel(64);
            let (complete_tx, complete_rx) = mpsc::channel(64);
            Self {
                state: Arc::new(Mutex::new(State {
                    running: true,
                    ..Default::default()
                })),
                register_tx,
                register_rx: Mutex::new(Some(register_rx)),
                update_tx,
                update_rx: Mutex::new(Some(update_rx)),
                complete_tx,
                complete_rx: Mutex::new(Some(complete_rx)),
            }
        }

        pub async fn seed_doc(&self, doc: RequestDoc) {
            self.state.lock().await.docs.insert(doc.request_id, doc);
        }

        pub async fn seed_account(&self, address: &str, account: Account) {
            self.state
                .lock()
                .await
                .accounts
                .insert(address.to_string(), account);
        }

        pub async fn set_next_broadcast_response(&self, response: BroadcastResponse) {
            self.state.lock().await.next_broadcast_response = Some(response);
        }

        pub async fn broadcasts(&self) -> Vec<Vec<u8>> {
            self.state.lock().await.broadcasts.clone()
        }

        pub async fn set_running(&self, running: bool) {
            self.state.lock().await.running = running;
        }

        pub async fn emit_register(&self, request_id: u64) {
            let _ = self
                .register_tx
                .send(RawEvent::RequestChanged { request_id })
                .await;
        }

        pub async fn emit_update(&self, request_id: u64) {
            let _ = self
                .update_tx
                .send(RawEvent::RequestChanged { request_id })
                .await;
        }

        pub async fn emit_complete(&self, completions: Vec<Completion>, min_gas_price: Option<String>) {
            let _ = self
                .complete_tx
                .send(RawEvent::Completions {
                    completions,
                    min_gas_price,
                })
                .await;
        }

        pub async fn close_all(&self) {
            self.register_rx.lock().await.take();
            self.update_rx.lock().await.take();
            self.complete_rx.lock().await.take();
        }
    }

    impl Default for TestChainClient {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl ChainClient for TestChainClient {
        async fn subscribe(
            &self,
            filter: SubscriptionFilter,
            _buffer: usize,
        ) -> Result<mpsc::Receiver<RawEvent>, ChainError> {
            let slot = match filter {
                SubscriptionFilter::Register => &self.register_rx,
                SubscriptionFilter::Update => &self.update_rx,
                SubscriptionFilter::Complete => &self.complete_rx,
            };
            slot.lock()
                .await
                .take()
                .ok_or_else(|| ChainError::SubscriptionFailed(format!("{filter:?} already subscribed")))
        }

        async fn unsubscribe_all(&self) {}

        async fn status(&self) -> Result<NodeStatus, ChainError> {
            Ok(NodeStatus {
                running: self.state.lock().await.running,
            })
        }

        async fn oracle_request_docs(&self, status: RequestStatus) -> Result<Vec<RequestDoc>, ChainError> {
            Ok(self
                .state
                .lock()
                .await
                .docs
                .values()
                .filter(|d| d.status == status)
                .cloned()
                .collect())
        }

        async fn oracle_request_doc(&self, id: u64) -> Result<RequestDoc, ChainError> {
            self.state
                .lock()
                .await
                .docs
                .get(&id)
                .cloned()
                .ok_or(ChainError::RequestDocNotFound(id))
        }

        async fn account(&self, address: &str) -> Result<Account, ChainError> {
            self.state
                .lock()
                .await
                .accounts
                .get(address)
                .cloned()
                .ok_or_else(|| ChainError::AccountNotFound(address.to_string()))
        }

        async fn broadcast(&self, tx_bytes: Vec<u8>) -> Result<BroadcastResponse, ChainError> {
            let mut state = self.state.lock().await;
            state.broadcasts.push(tx_bytes);
            Ok(state.next_broadcast_response.take().unwrap_or(BroadcastResponse {
                code: 0,
                raw_log: String::new(),
                tx_hash: "test-tx-hash".to_string(),
            }))
        }
    }
}
