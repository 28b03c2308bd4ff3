use thiserror::Error;

use oracle_common::error::{ChainError, KeyringError};

#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("keyring error: {0}")]
    Keyring(#[from] KeyringError),
    #[error("chain RPC error: {0}")]
    Chain(#[from] ChainError),
    #[error("broadcast failed with code {code}: {raw_log}")]
    Rejected { code: u32, raw_log: String },
    #[error("exhausted {attempts} broadcast attempts")]
    RetriesExhausted { attempts: u32 },
}
