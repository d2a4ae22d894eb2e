//! Integration tests for bounded request retries

use std::time::{Duration, Instant};

use artwork_crawler::config::{RateWindow, RequestConfig};
use artwork_crawler::fetcher::http::HttpExecutor;
use artwork_crawler::fetcher::request::RequestSpec;
use artwork_crawler::fetcher::FetcherError;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::common::{executor, fast_request_config};

#[tokio::test]
async fn test_always_timing_out_endpoint_gets_exactly_max_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .expect(3)
        .mount(&server)
        .await;

    let executor = executor(3);
    let spec = RequestSpec::get(format!("{}/slow", server.uri())).param("q", "cats");
    let err = executor.execute(&spec).await.unwrap_err();

    match err {
        FetcherError::RequestFailed {
            method,
            attempts,
            params,
            last_status,
            ..
        } => {
            assert_eq!(method, "GET");
            assert_eq!(attempts, 3);
            assert_eq!(params, vec![("q".to_string(), "cats".to_string())]);
            assert_eq!(last_status, None);
        }
        other => panic!("expected RequestFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_server_error_then_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let executor = executor(3);
    let body: serde_json::Value = executor
        .execute_json(&RequestSpec::get(format!("{}/flaky", server.uri())))
        .await
        .unwrap();
    assert_eq!(body["ok"], true);
}

#[tokio::test]
async fn test_not_found_surfaces_status_after_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404).set_body_string("private work"))
        .expect(2)
        .mount(&server)
        .await;

    let executor = executor(2);
    let err = executor
        .execute_bytes(&RequestSpec::get(format!("{}/gone", server.uri())))
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(404));
    assert!(!err.to_string().contains("private work"));
}

#[tokio::test]
async fn test_query_parameters_are_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("word", "sea"))
        .and(query_param("p", "2"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let spec = RequestSpec::get(format!("{}/search", server.uri()))
        .param("word", "sea")
        .param("p", "2");
    let response = executor(1).execute(&spec).await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn test_per_request_retry_override() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let spec = RequestSpec::get(server.uri()).max_retries(1);
    let err = executor(5).execute(&spec).await.unwrap_err();
    assert!(matches!(err, FetcherError::RequestFailed { attempts: 1, last_status: Some(503), .. }));
}

#[tokio::test]
async fn test_rate_window_spaces_request_starts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/paced"))
        .respond_with(ResponseTemplate::new(200))
        .expect(3)
        .mount(&server)
        .await;

    let config = RequestConfig {
        rate_window: Some(RateWindow {
            max_requests: 2,
            window: Duration::from_millis(400),
        }),
        ..fast_request_config(1)
    };
    let executor = HttpExecutor::new(config).unwrap();
    let spec = RequestSpec::get(format!("{}/paced", server.uri()));

    let started = Instant::now();
    executor.execute(&spec).await.unwrap();
    executor.execute(&spec).await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(400));

    executor.execute(&spec).await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(400));
}
