use std::time::Duration;

use oracle_common::error::FetchError;
use oracle_common::http::{extract, parse, Fetcher, FetcherConfig};
use oracle_common::retry::RetryPolicy;

fn fast_config() -> FetcherConfig {
    FetcherConfig {
        timeout: Duration::from_secs(5),
        max_response_bytes: 16,
        retry_policy: RetryPolicy::new(2, Duration::from_millis(1), Some(Duration::from_millis(5)))
            .with_max_attempts(2),
    }
}

#[tokio::test]
async fn fetch_over_size_cap_fails_without_a_result() {
    let mut server = mockito::Server::new_async().await;
    let body = "x".repeat(17);
    let mock = server
        .mock("GET", "/big")
        .with_status(200)
        .with_body(body)
        .create_async()
        .await;

    let fetcher = Fetcher::new(fast_config());
    let url = format!("{}/big", server.url());
    let result = fetcher.fetch(&url).await;

    assert!(matches!(result, Err(FetchError::TooLarge { .. })));
    mock.assert_async().await;
}

#[tokio::test]
async fn fetch_retries_on_server_error_then_succeeds() {
    let mut server = mockito::Server::new_async().await;
    let fail = server
        .mock("GET", "/flaky")
        .with_status(503)
        .expect(1)
        .create_async()
        .await;
    let ok = server
        .mock("GET", "/flaky")
        .with_status(200)
        .with_body(r#"{"value": "42"}"#)
        .expect(1)
        .create_async()
        .await;

    let fetcher = Fetcher::new(fast_config());
    let url = format!("{}/flaky", server.url());
    let bytes = fetcher.fetch(&url).await.expect("fetch should eventually succeed");
    let parsed = parse(&bytes).unwrap();
    assert_eq!(extract(&parsed, "value").unwrap(), "42");

    fail.assert_async().await;
    ok.assert_async().await;
}

#[tokio::test]
async fn fetch_fails_immediately_on_non_retryable_4xx() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/missing")
        .with_status(404)
        .expect(1)
        .create_async()
        .await;

    let fetcher = Fetcher::new(fast_config());
    let url = format!("{}/missing", server.url());
    let result = fetcher.fetch(&url).await;

    assert!(matches!(result, Err(FetchError::Status { status: 404, .. })));
    mock.assert_async().await;
}
