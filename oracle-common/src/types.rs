use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Status of a `RequestDoc` as reported by the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStatus {
    Unspecified,
    Enabled,
    Paused,
    Disabled,
}

/// One endpoint a request document names: a URL to fetch and a dotted path to
/// extract the value the chain cares about from the resulting JSON document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub url: String,
    pub parse_rule: String,
}

/// Authoritative on-chain record describing an oracle task. Consumed read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestDoc {
    pub request_id: u64,
    pub status: RequestStatus,
    pub period_sec: u32,
    pub account_list: Vec<String>,
    pub endpoints: Vec<Endpoint>,
    pub nonce: u64,
}

impl RequestDoc {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_sec as u64)
    }

    /// Position of `address` in `account_list`, if present.
    pub fn assigned_index(&self, address: &str) -> Option<usize> {
        self.account_list.iter().position(|a| a == address)
    }

    /// The endpoint this daemon is responsible for, given its assigned index.
    /// Resolved as `index mod len(endpoints)`.
    pub fn endpoint_for_index(&self, index: usize) -> Option<&Endpoint> {
        if self.endpoints.is_empty() {
            return None;
        }
        self.endpoints.get(index % self.endpoints.len())
    }
}

/// Execution state of a tracked `Job`, independent of its on/off `status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionState {
    Pending,
    Executing,
    CompletedAwaitingRound,
    Failed,
}

/// An in-memory, per-request-id job tracked by this daemon. One job per request
/// this daemon shards; jobs are reconstructed from chain state at startup and
/// never persisted across restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub request_id: u64,
    pub url: String,
    pub parse_rule: String,
    pub nonce: u64,
    pub period: Duration,
    pub status: RequestStatus,
    pub execution_state: ExecutionState,
    /// Time until the next run is eligible, measured from `updated_at`.
    pub delay: Duration,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub next_run: OffsetDateTime,
}

impl Job {
    pub fn new(
        request_id: u64,
        url: String,
        parse_rule: String,
        nonce: u64,
        period: Duration,
        delay: Duration,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            request_id,
            url,
            parse_rule,
            nonce,
            period,
            status: RequestStatus::Enabled,
            execution_state: ExecutionState::Pending,
            delay,
            created_at: now,
            updated_at: now,
            next_run: now + delay,
        }
    }

    pub fn is_ready(&self, now: OffsetDateTime) -> bool {
        self.status == RequestStatus::Enabled
            && !matches!(
                self.execution_state,
                ExecutionState::Executing | ExecutionState::CompletedAwaitingRound
            )
            && self.next_run <= now
    }

    pub fn rearm(&mut self, delay: Duration) {
        self.delay = delay;
        self.updated_at = OffsetDateTime::now_utc();
        self.next_run = self.updated_at + delay;
        self.execution_state = ExecutionState::Pending;
    }
}

/// The result of a single successful job execution, ready to be submitted on-chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub request_id: u64,
    pub data: String,
    pub nonce: u64,
}

/// Wire form built from a `JobResult`, ready to be wrapped in `MsgSubmitOracleData`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitDataSet {
    pub request_id: u64,
    pub raw_data: String,
    pub nonce: u64,
    pub provider: String,
    pub signature: Vec<u8>,
}

/// A single completion carried in a `CompleteBatch` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub request_id: u64,
    pub nonce: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub block_time: OffsetDateTime,
}

/// The unified feed the watcher emits, consumed by the dispatcher.
#[derive(Debug, Clone)]
pub enum Event {
    RequestDoc(RequestDoc),
    CompleteBatch(Vec<Completion>, Option<String>),
    FatalError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(account_list: Vec<&str>, endpoints: usize) -> RequestDoc {
        RequestDoc {
            request_id: 1,
            status: RequestStatus::Enabled,
            period_sec: 60,
            account_list: account_list.into_iter().map(String::from).collect(),
            endpoints: (0..endpoints)
                .map(|i| Endpoint {
                    url: format!("https://example.com/{i}"),
                    parse_rule: "value".to_string(),
                })
                .collect(),
            nonce: 0,
        }
    }

    #[test]
    fn assigned_index_wraps_modulo_endpoint_count() {
        let d = doc(vec!["a", "b", "c"], 2);
        assert_eq!(d.assigned_index("c"), Some(2));
        assert_eq!(d.endpoint_for_index(2).unwrap().url, "https://example.com/0");
    }

    #[test]
    fn assigned_index_absent_returns_none() {
        let d = doc(vec!["a", "b"], 1);
        assert_eq!(d.assigned_index("z"), None);
    }

    #[test]
    fn endpoint_for_index_empty_endpoints_is_none() {
        let d = doc(vec!["a"], 0);
        assert_eq!(d.endpoint_for_index(0), None);
    }
}
