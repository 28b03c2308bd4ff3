//! Account sequence number management. The sequence is private to this
//! manager; it is only ever mutated through `next()` (post-success increment)
//! or `sync()` (chain-query replace).

use std::sync::Arc;

use oracle_common::chain::ChainClient;
use oracle_common::error::ChainError;
use tokio::sync::RwLock;
use tracing::{info, warn};

struct State {
    account_number: u64,
    sequence: u64,
}

pub struct SequenceManager {
    state: RwLock<State>,
    chain: Arc<dyn ChainClient>,
    address: String,
}

impl SequenceManager {
    pub async fn new(chain: Arc<dyn ChainClient>, address: String) -> Result<Self, ChainError> {
        let account = chain.account(&address).await?;
        Ok(Self {
            state: RwLock::new(State {
                account_number: account.account_number,
                sequence: account.sequence,
            }),
            chain,
            address,
        })
    }

    pub async fn get(&self) -> (u64, u64) {
        let state = self.state.read().await;
        (state.account_number, state.sequence)
    }

    /// Advance the sequence after a successful broadcast.
    pub async fn next(&self) {
        let mut state = self.state.write().await;
        state.sequence += 1;
    }

    /// Resync from the chain, e.g. after a sequence-mismatch broadcast error.
    /// A "jump" (observed > local + 1) is logged but accepted.
    pub async fn sync(&self) -> Result<(), ChainError> {
        let account = self.chain.account(&self.address).await?;
        let mut state = self.state.write().await;
        if account.sequence > state.sequence + 1 {
            warn!(
                address = %self.address,
                local = state.sequence,
                observed = account.sequence,
                "sequence jumped ahead of local tracking"
            );
        }
        state.account_number = account.account_number;
        state.sequence = account.sequence;
        info!(address = %self.address, sequence = state.sequence, "sequence resynced");
        Ok(())
    }
}
