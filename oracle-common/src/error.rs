use thiserror::Error;

/// Errors raised while fetching a remote JSON document.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("request to {url} failed: {source}")]
    Transport { url: String, source: reqwest::Error },
    #[error("{url} returned non-retryable status {status}: {body_prefix}")]
    Status {
        url: String,
        status: u16,
        body_prefix: String,
    },
    #[error("{url} exceeded the {limit}-byte response size cap")]
    TooLarge { url: String, limit: usize },
    #[error("exhausted {attempts} attempts fetching {url}")]
    RetriesExhausted { url: String, attempts: u32 },
}

/// Errors raised while parsing a fetched body as JSON.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("response body is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("top-level JSON value is neither an object nor an array of objects")]
    UnsupportedShape,
    #[error("top-level JSON array is empty")]
    EmptyArray,
}

/// Errors raised while extracting a dotted-path value from a parsed JSON object.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("parse rule must not be empty")]
    EmptyPath,
    #[error("key {key:?} not found at path segment {segment}")]
    KeyNotFound { key: String, segment: usize },
    #[error("segment {segment} ({raw:?}) is not a valid array index")]
    InvalidIndex { raw: String, segment: usize },
    #[error("index {index} out of bounds (len {len}) at segment {segment}")]
    IndexOutOfBounds {
        index: usize,
        len: usize,
        segment: usize,
    },
    #[error("path segment {segment} addresses a scalar value that cannot be indexed further")]
    NotIndexable { segment: usize },
}

/// Errors raised by the in-memory job store.
#[derive(Error, Debug)]
pub enum JobStoreError {
    #[error("no job is tracked for request id {0}")]
    NotFound(u64),
}

/// Errors surfaced by a `ChainClient` implementation.
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("transport error talking to chain RPC: {0}")]
    Transport(String),
    #[error("chain RPC returned a malformed response: {0}")]
    Malformed(String),
    #[error("subscription setup failed: {0}")]
    SubscriptionFailed(String),
    #[error("request document {0} not found")]
    RequestDocNotFound(u64),
    #[error("account {0} not found")]
    AccountNotFound(String),
}

/// Errors surfaced by a `Keyring` implementation.
#[derive(Error, Debug)]
pub enum KeyringError {
    #[error("key {0:?} not found in keyring")]
    KeyNotFound(String),
    #[error("signing failed: {0}")]
    SigningFailed(String),
}
