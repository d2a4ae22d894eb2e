//! Integration tests for the token lifecycle

use std::sync::Arc;
use std::time::Duration;

use artwork_crawler::auth::{AuthError, AuthState, Clock, ManualClock, TokenManager};
use artwork_crawler::config::AuthConfig;
use chrono::{TimeZone, Utc};
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::common::executor;

fn token(access: &str, refresh: &str, expires_in: i64) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "access_token": access,
        "refresh_token": refresh,
        "token_type": "Bearer",
        "expires_in": expires_in,
    }))
}

fn manager(server: &MockServer, clock: Arc<ManualClock>) -> Arc<TokenManager> {
    let config = AuthConfig {
        token_url: format!("{}/auth/token", server.uri()),
        client_id: Some("crawler".to_string()),
        safety_margin: Duration::from_secs(30),
        ..AuthConfig::default()
    };
    Arc::new(TokenManager::new(executor(1), config).with_clock(clock))
}

fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()))
}

#[tokio::test]
async fn test_concurrent_callers_share_one_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/token"))
        .and(body_string_contains("grant_type=password"))
        .respond_with(token("access-1", "refresh-1", 3600))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-1"))
        .respond_with(token("access-2", "refresh-2", 3600))
        .expect(1)
        .mount(&server)
        .await;

    let clock = clock();
    let tokens = manager(&server, clock.clone());
    tokens.login("artist", "hunter2").await.unwrap();
    assert_eq!(
        tokens.auth_headers().await.unwrap(),
        vec![("Authorization".to_string(), "Bearer access-1".to_string())]
    );

    clock.advance(Duration::from_secs(3600));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let tokens = tokens.clone();
            tokio::spawn(async move { tokens.auth_headers().await })
        })
        .collect();

    for handle in handles {
        let headers = handle.await.unwrap().unwrap();
        assert_eq!(headers[0].1, "Bearer access-2");
    }
    assert_eq!(tokens.refresh_count(), 1);

    let credential = tokens.credential().await.unwrap();
    assert!(credential.remaining(clock.now()) > chrono::Duration::zero());
}

#[tokio::test]
async fn test_refresh_inside_safety_margin() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("grant_type=password"))
        .respond_with(token("access-1", "refresh-1", 100))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(token("access-2", "refresh-2", 100))
        .expect(1)
        .mount(&server)
        .await;

    let clock = clock();
    let tokens = manager(&server, clock.clone());
    tokens.login("artist", "hunter2").await.unwrap();

    clock.advance(Duration::from_secs(60));
    assert_eq!(tokens.auth_headers().await.unwrap()[0].1, "Bearer access-1");
    assert_eq!(tokens.refresh_count(), 0);

    clock.advance(Duration::from_secs(15));
    assert_eq!(tokens.auth_headers().await.unwrap()[0].1, "Bearer access-2");
    assert_eq!(tokens.refresh_count(), 1);
}

#[tokio::test]
async fn test_failed_refresh_clears_credential() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("grant_type=password"))
        .respond_with(token("access-1", "refresh-1", 60))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})))
        .mount(&server)
        .await;

    let clock = clock();
    let tokens = manager(&server, clock.clone());
    tokens.login("artist", "hunter2").await.unwrap();
    clock.advance(Duration::from_secs(120));

    let err = tokens.auth_headers().await.unwrap_err();
    assert!(matches!(err, AuthError::AuthFailed(_)));
    assert!(!err.to_string().contains("invalid_grant"));
    assert_eq!(tokens.state().await, AuthState::Unauthenticated);
    assert_eq!(tokens.auth_headers().await.unwrap_err(), AuthError::NotAuthenticated);
}

#[tokio::test]
async fn test_non_positive_lifetime_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(token("access-1", "refresh-1", 0))
        .mount(&server)
        .await;

    let tokens = manager(&server, clock());
    let err = tokens.login("artist", "hunter2").await.unwrap_err();
    assert!(matches!(err, AuthError::AuthFailed(_)));
    assert_eq!(tokens.state().await, AuthState::Unauthenticated);
}

#[tokio::test]
async fn test_lifetime_inside_margin_rejected_on_login() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(token("access-1", "refresh-1", 10))
        .expect(1)
        .mount(&server)
        .await;

    let tokens = manager(&server, clock());
    let err = tokens.login("artist", "hunter2").await.unwrap_err();
    assert_eq!(
        err,
        AuthError::AuthFailed(
            "token lifetime 10s does not exceed the 30s refresh margin".to_string()
        )
    );
    assert_eq!(tokens.state().await, AuthState::Unauthenticated);
    assert_eq!(tokens.auth_headers().await.unwrap_err(), AuthError::NotAuthenticated);
}

#[tokio::test]
async fn test_short_lived_refresh_fails_loudly() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("grant_type=password"))
        .respond_with(token("access-1", "refresh-1", 60))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(token("access-2", "refresh-2", 30))
        .expect(1)
        .mount(&server)
        .await;

    let clock = clock();
    let tokens = manager(&server, clock.clone());
    tokens.login("artist", "hunter2").await.unwrap();
    clock.advance(Duration::from_secs(45));

    let err = tokens.auth_headers().await.unwrap_err();
    assert!(matches!(err, AuthError::AuthFailed(ref m) if m.contains("refresh margin")));
    assert_eq!(tokens.refresh_count(), 1);
    assert_eq!(tokens.state().await, AuthState::Unauthenticated);
}

#[tokio::test]
async fn test_refresh_token_login_keeps_token_when_not_rotated() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("refresh_token=stored-refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-9",
            "expires_in": 3600,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let tokens = manager(&server, clock());
    tokens.login_with_refresh_token("stored-refresh").await.unwrap();

    let credential = tokens.credential().await.unwrap();
    assert_eq!(credential.refresh_token, "stored-refresh");
    assert_eq!(credential.token_type, "Bearer");

    tokens.logout().await;
    assert_eq!(tokens.state().await, AuthState::Unauthenticated);
}
