use thiserror::Error;

use oracle_common::error::JobStoreError;

/// Enumeration of errors related to worker pool execution.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("job store error: {0}")]
    Store(#[from] JobStoreError),
}
