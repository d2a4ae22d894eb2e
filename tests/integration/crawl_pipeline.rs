//! End-to-end crawl: listing -> resolution -> filter -> download

use std::sync::Arc;

use artwork_crawler::auth::AuthState;
use artwork_crawler::config::{CrawlerConfig, SchedulerConfig};
use artwork_crawler::crawler::{simple_record_parser, CrawlError, Crawler};
use artwork_crawler::downloader::NoopProgressSink;
use artwork_crawler::fetcher::pagination::StopReason;
use artwork_crawler::fetcher::{
    EndpointTemplate, IdSource, JsonListingClient, ListingKind, ListingLayout, PagingStyle,
};
use artwork_crawler::output::FsDestination;
use artwork_crawler::ContentId;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, header, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::common::fast_request_config;

fn listing(server: &MockServer) -> Arc<JsonListingClient> {
    let layout = ListingLayout::new(PagingStyle::NextUrl {
        pointer: "/next_url".to_string(),
    })
    .with_search(
        EndpointTemplate::new(
            format!("{}/v1/search", server.uri()),
            IdSource::ArrayField {
                pointer: "/works".to_string(),
                id_field: Some("id".to_string()),
            },
        )
        .with_param("word", "{keyword}"),
    );
    Arc::new(JsonListingClient::new(layout))
}

fn config(server: &MockServer) -> CrawlerConfig {
    let mut config = CrawlerConfig::default();
    config.request = fast_request_config(1);
    config.auth.token_url = format!("{}/auth/token", server.uri());
    config.scheduler = SchedulerConfig {
        worker_count: Some(2),
        min_items_per_worker: 1,
        ..SchedulerConfig::default()
    };
    config
}

fn record(server: &MockServer, id: u64, pages: usize, bookmarks: u64) -> serde_json::Value {
    let urls: Vec<String> = (0..pages)
        .map(|n| format!("{}/img/{id}_p{n}.jpg", server.uri()))
        .collect();
    json!({"title": format!("work {id}"), "author": "mika", "bookmarks": bookmarks, "pages": urls})
}

async fn mount_service(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/auth/token"))
        .and(body_string_contains("grant_type=password"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok",
            "refresh_token": "ref",
            "expires_in": 3600,
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/search"))
        .and(header("Authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "works": [{"id": 1}, {"id": 2}, {"id": 3}],
            "next_url": format!("{}/v1/search/page2", server.uri()),
        })))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/search/page2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "works": [{"id": 3}, {"id": 4}],
            "next_url": null,
        })))
        .expect(1)
        .mount(server)
        .await;

    for (id, pages, bookmarks) in [(1, 2, 500), (2, 1, 20), (4, 3, 900)] {
        Mock::given(method("GET"))
            .and(path(format!("/works/{id}")))
            .and(header("Authorization", "Bearer tok"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(record(server, id, pages, bookmarks)),
            )
            .mount(server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/works/3"))
        .respond_with(ResponseTemplate::new(404))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path_regex("^/img/"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jpeg".to_vec()))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_crawl_collects_resolves_filters_and_downloads() {
    let server = MockServer::start().await;
    mount_service(&server).await;
    let dir = TempDir::new().unwrap();

    let crawler = Crawler::new(
        config(&server),
        listing(&server),
        Arc::new(FsDestination::new(dir.path())),
    )
    .unwrap()
    .with_progress_sink(Arc::new(NoopProgressSink));
    crawler.login("mika", "pw").await.unwrap();

    let resolver = crawler
        .http_resolver(format!("{}/works/{{id}}", server.uri()), simple_record_parser())
        .await;
    let kinds = [ListingKind::Search {
        keyword: "harbor".to_string(),
    }];

    let report = crawler
        .crawl_filtered(&resolver, &kinds, None, |work| work.bookmark_count >= 100)
        .await
        .unwrap();

    assert_eq!(
        report.collected.ids,
        vec![ContentId::new(1), ContentId::new(2), ContentId::new(3), ContentId::new(4)]
    );
    assert_eq!(report.collected.stop_reason, StopReason::NoNextPage);
    assert_eq!(report.resolved, 3);
    assert_eq!(report.not_found, vec![ContentId::new(3)]);
    assert_eq!(report.filtered_out, 1);
    assert_eq!(report.totals.ok, 5);
    assert_eq!(report.totals.total_parts, 5);
    assert!(dir.path().join("4_p2.jpg").exists());
    assert!(!dir.path().join("2_p0.jpg").exists());
}

#[tokio::test]
async fn test_crawl_without_login_is_rejected_by_listing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/search"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();

    let crawler = Crawler::new(
        config(&server),
        listing(&server),
        Arc::new(FsDestination::new(dir.path())),
    )
    .unwrap();
    let resolver = crawler
        .http_resolver(format!("{}/works/{{id}}", server.uri()), simple_record_parser())
        .await;

    let report = crawler
        .crawl(&resolver, &[ListingKind::Search { keyword: "x".to_string() }], Some(10))
        .await
        .unwrap();
    assert!(report.collected.ids.is_empty());
    assert_eq!(report.collected.stop_reason, StopReason::RequestFailed);
    assert_eq!(report.totals.total_parts, 0);
}

#[tokio::test]
async fn test_unsupported_listing_stops_pipeline() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let crawler = Crawler::new(
        config(&server),
        listing(&server),
        Arc::new(FsDestination::new(dir.path())),
    )
    .unwrap();
    let resolver = crawler
        .http_resolver(format!("{}/works/{{id}}", server.uri()), simple_record_parser())
        .await;

    let err = crawler
        .crawl(&resolver, &[ListingKind::Bookmarks { user_id: "9".to_string() }], None)
        .await
        .unwrap_err();
    assert!(matches!(err, CrawlError::Fetcher(_)));

    crawler.logout().await;
    let tokens = crawler.token_manager().unwrap();
    assert_eq!(tokens.state().await, AuthState::Unauthenticated);
}
