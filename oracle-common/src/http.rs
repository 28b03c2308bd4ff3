//! HTTP fetcher and JSON dotted-path extractor.
//!
//! Mirrors the shape of `hook_worker::worker::send_webhook`: build a client once,
//! classify failures as retryable/non-retryable, retry with the shared backoff
//! primitive from [`crate::retry`].

use std::time::Duration;

use http::StatusCode;
use reqwest::header;
use serde_json::Value;
use tracing::warn;

use crate::error::{ExtractError, FetchError, ParseError};
use crate::retry::RetryPolicy;

/// Byte length of the body prefix included in [`FetchError::Status`] to avoid log flooding.
const BODY_PREFIX_LEN: usize = 256;

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub timeout: Duration,
    pub max_response_bytes: usize,
    pub retry_policy: RetryPolicy,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_response_bytes: 10 * 1024 * 1024,
            retry_policy: RetryPolicy::new(2, Duration::from_millis(500), Some(Duration::from_secs(30)))
                .with_max_attempts(5)
                .with_jitter(0.1),
        }
    }
}

/// Fetches and parses JSON documents over HTTP with bounded retries and size caps.
pub struct Fetcher {
    client: reqwest::Client,
    config: FetcherConfig,
}

impl Fetcher {
    pub fn new(config: FetcherConfig) -> Self {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent("Oracle/1.0")
            .timeout(config.timeout)
            .build()
            .expect("failed to construct reqwest client for oracle fetcher");

        Self { client, config }
    }

    /// GET `url` with retries, returning the raw body bytes.
    pub async fn fetch(&self, url: &str) -> Result<bytes::Bytes, FetchError> {
        let mut attempt = 0u32;

        loop {
            match self.fetch_once(url).await {
                Ok(bytes) => return Ok(bytes),
                Err(err) if is_retryable(&err) => {
                    attempt += 1;
                    if !self.config.retry_policy.allows(attempt) {
                        warn!(url, attempt, "fetch retries exhausted");
                        return Err(FetchError::RetriesExhausted {
                            url: url.to_string(),
                            attempts: attempt,
                        });
                    }
                    let wait = self
                        .config
                        .retry_policy
                        .time_until_next_retry(attempt - 1, None);
                    warn!(url, attempt, ?wait, "retrying fetch");
                    tokio::time::sleep(wait).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn fetch_once(&self, url: &str) -> Result<bytes::Bytes, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| classify_transport_error(url, source))?;

        if let Some(len) = response.content_length() {
            if len as usize > self.config.max_response_bytes {
                return Err(FetchError::TooLarge {
                    url: url.to_string(),
                    limit: self.config.max_response_bytes,
                });
            }
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body_prefix: truncate_to_byte_cap(&body, BODY_PREFIX_LEN),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|source| classify_transport_error(url, source))?;

        if bytes.len() > self.config.max_response_bytes {
            return Err(FetchError::TooLarge {
                url: url.to_string(),
                limit: self.config.max_response_bytes,
            });
        }

        Ok(bytes)
    }
}

/// Truncates `body` to at most `cap` bytes, backing off to the nearest
/// preceding UTF-8 char boundary so a multi-byte sequence is never split.
fn truncate_to_byte_cap(body: &str, cap: usize) -> String {
    if body.len() <= cap {
        return body.to_string();
    }
    let mut end = cap;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_string()
}

fn classify_transport_error(url: &str, source: reqwest::Error) -> FetchError {
    if source.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Transport {
            url: url.to_string(),
            source,
        }
    }
}

fn is_retryable(err: &FetchError) -> bool {
    match err {
        FetchError::Timeout { .. } | FetchError::Transport { .. } => true,
        FetchError::Status { status, .. } => is_retryable_status(*status),
        FetchError::TooLarge { .. } | FetchError::RetriesExhausted { .. } => false,
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(
        StatusCode::from_u16(status),
        Ok(StatusCode::REQUEST_TIMEOUT)
            | Ok(StatusCode::CONFLICT)
            | Ok(StatusCode::TOO_MANY_REQUESTS)
    ) || StatusCode::from_u16(status)
        .map(|s| s.is_server_error())
        .unwrap_or(false)
}

/// Decode a fetched body as JSON, accepting a bare object or an array whose
/// first element is an object.
pub fn parse(bytes: &[u8]) -> Result<serde_json::Map<String, Value>, ParseError> {
    let value: Value = serde_json::from_slice(bytes)?;

    match value {
        Value::Object(map) => Ok(map),
        Value::Array(items) => {
            let first = items.into_iter().next().ok_or(ParseError::EmptyArray)?;
            match first {
                Value::Object(map) => Ok(map),
                _ => Err(ParseError::UnsupportedShape),
            }
        }
        _ => Err(ParseError::UnsupportedShape),
    }
}

/// Extract a value from a parsed document by a dotted path with optional
/// non-negative integer array indices.
pub fn extract(object: &serde_json::Map<String, Value>, path: &str) -> Result<String, ExtractError> {
    if path.is_empty() {
        return Err(ExtractError::EmptyPath);
    }

    let mut current = Value::Object(object.clone());

    for (segment, key) in path.split('.').enumerate() {
        current = match current {
            Value::Object(mut map) => map.remove(key).ok_or_else(|| ExtractError::KeyNotFound {
                key: key.to_string(),
                segment,
            })?,
            Value::Array(vec) => {
                let index: usize = key
                    .parse()
                    .map_err(|_| ExtractError::InvalidIndex {
                        raw: key.to_string(),
                        segment,
                    })?;
                let len = vec.len();
                vec.into_iter()
                    .nth(index)
                    .ok_or(ExtractError::IndexOutOfBounds { index, len, segment })?
            }
            _ => return Err(ExtractError::NotIndexable { segment }),
        };
    }

    Ok(stringify(&current))
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_accepts_bare_object() {
        let body = br#"{"a": 1}"#;
        let parsed = parse(body).unwrap();
        assert_eq!(parsed.get("a"), Some(&json!(1)));
    }

    #[test]
    fn parse_accepts_array_of_objects() {
        let body = br#"[{"a": 1}, {"a": 2}]"#;
        let parsed = parse(body).unwrap();
        assert_eq!(parsed.get("a"), Some(&json!(1)));
    }

    #[test]
    fn parse_rejects_array_of_scalars() {
        let body = br#"[1, 2]"#;
        assert!(matches!(parse(body), Err(ParseError::UnsupportedShape)));
    }

    #[test]
    fn parse_rejects_empty_array() {
        let body = br#"[]"#;
        assert!(matches!(parse(body), Err(ParseError::EmptyArray)));
    }

    #[test]
    fn extract_walks_nested_object_and_array() {
        let body = br#"{"rates": {"KRW": "1388.95"}, "list": [{"v": 7}]}"#;
        let parsed = parse(body).unwrap();
        assert_eq!(extract(&parsed, "rates.KRW").unwrap(), "1388.95");
        assert_eq!(extract(&parsed, "list.0.v").unwrap(), "7");
    }

    #[test]
    fn extract_fails_on_missing_key() {
        let parsed = parse(br#"{"a": 1}"#).unwrap();
        assert!(matches!(
            extract(&parsed, "b"),
            Err(ExtractError::KeyNotFound { .. })
        ));
    }

    #[test]
    fn extract_fails_on_out_of_bounds_index() {
        let parsed = parse(br#"{"list": [1, 2]}"#).unwrap();
        assert!(matches!(
            extract(&parsed, "list.5"),
            Err(ExtractError::IndexOutOfBounds { .. })
        ));
    }

    #[test]
    fn extract_stringifies_primitives() {
        let parsed = parse(br#"{"n": 3, "b": true, "s": "x"}"#).unwrap();
        assert_eq!(extract(&parsed, "n").unwrap(), "3");
        assert_eq!(extract(&parsed, "b").unwrap(), "true");
        assert_eq!(extract(&parsed, "s").unwrap(), "x");
    }

    #[test]
    fn round_trip_primitives() {
        for (k, v) in [("n", json!(42)), ("b", json!(false)), ("s", json!("hi"))] {
            let mut map = serde_json::Map::new();
            map.insert(k.to_string(), v.clone());
            let extracted = extract(&map, k).unwrap();
            let expected = stringify(&v);
            assert_eq!(extracted, expected);
        }
    }

    #[test]
    fn truncate_to_byte_cap_never_splits_a_multi_byte_char() {
        let body = "\u{934c}".repeat(200); // 3 bytes each, 600 bytes total
        let truncated = truncate_to_byte_cap(&body, BODY_PREFIX_LEN);
        assert!(truncated.len() <= BODY_PREFIX_LEN);
        assert!(truncated.is_char_boundary(truncated.len()));
    }

    #[test]
    fn is_retryable_status_classifies_known_codes() {
        assert!(is_retryable_status(500));
        assert!(is_retryable_status(503));
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(409));
        assert!(is_retryable_status(408));
        assert!(!is_retryable_status(404));
        assert!(!is_retryable_status(400));
    }
}
