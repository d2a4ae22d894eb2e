//! Integration tests for paginated identifier collection

use artwork_crawler::fetcher::pagination::{PaginatedCollector, StopReason};
use artwork_crawler::fetcher::{
    EndpointTemplate, IdSource, JsonListingClient, ListingKind, ListingLayout, PagingStyle,
};
use artwork_crawler::ContentId;
use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::common::executor;

const PAGE_SIZE: u64 = 30;
const AVAILABLE: u64 = 243;

fn page_body(page: u64) -> Value {
    let first = (page - 1) * PAGE_SIZE + 1;
    let last = (first + PAGE_SIZE - 1).min(AVAILABLE);
    let works: Vec<Value> = (first..=last).map(|id| json!({"id": id, "title": "x"})).collect();
    json!({ "illusts": works })
}

fn client(server: &MockServer) -> JsonListingClient {
    let layout = ListingLayout::new(PagingStyle::PageIndex {
        param: "p".to_string(),
        first: 1,
        has_more: None,
    })
    .with_search(
        EndpointTemplate::new(
            format!("{}/search", server.uri()),
            IdSource::ArrayField {
                pointer: "/illusts".to_string(),
                id_field: Some("id".to_string()),
            },
        )
        .with_param("word", "{keyword}"),
    )
    .with_user_works(EndpointTemplate::new(
        format!("{}/users/{{user_id}}/works", server.uri()),
        IdSource::ObjectKeys {
            pointer: "/body".to_string(),
        },
    ));
    JsonListingClient::new(layout)
}

fn search() -> ListingKind {
    ListingKind::Search {
        keyword: "sea".to_string(),
    }
}

async fn mount_page(server: &MockServer, page: u64, body: Value, expected: u64) {
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("word", "sea"))
        .and(query_param("p", page.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(expected)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_limit_yields_exact_count() {
    let server = MockServer::start().await;
    mount_page(&server, 1, page_body(1), 1).await;
    mount_page(&server, 2, page_body(2), 1).await;
    mount_page(&server, 3, page_body(3), 0).await;

    let collector = PaginatedCollector::new(executor(1));
    let report = collector
        .collect_listing(&client(&server), &search(), Some(43))
        .await
        .unwrap();

    assert_eq!(report.ids.len(), 43);
    assert_eq!(report.ids[0], ContentId::new(1));
    assert_eq!(report.ids[42], ContentId::new(43));
    assert_eq!(report.pages_fetched, 2);
    assert_eq!(report.stop_reason, StopReason::LimitReached);
}

#[tokio::test]
async fn test_unlimited_stops_on_page_without_new_ids() {
    let server = MockServer::start().await;
    for page in 1..=9 {
        mount_page(&server, page, page_body(page), 1).await;
    }
    // The listing wraps around instead of ending
    mount_page(&server, 10, page_body(1), 1).await;
    mount_page(&server, 11, page_body(2), 0).await;

    let collector = PaginatedCollector::new(executor(1));
    let report = collector
        .collect_listing(&client(&server), &search(), None)
        .await
        .unwrap();

    let expected: Vec<ContentId> = (1..=AVAILABLE).map(ContentId::new).collect();
    assert_eq!(report.ids, expected);
    assert_eq!(report.pages_fetched, 10);
    assert_eq!(report.stop_reason, StopReason::Exhausted);
}

#[tokio::test]
async fn test_limit_above_available_returns_everything() {
    let server = MockServer::start().await;
    for page in 1..=9 {
        mount_page(&server, page, page_body(page), 1).await;
    }
    mount_page(&server, 10, json!({ "illusts": [] }), 1).await;

    let collector = PaginatedCollector::new(executor(1));
    let report = collector
        .collect_listing(&client(&server), &search(), Some(500))
        .await
        .unwrap();

    assert_eq!(report.ids.len(), AVAILABLE as usize);
    assert_eq!(report.stop_reason, StopReason::Exhausted);
}

#[tokio::test]
async fn test_mid_crawl_failure_keeps_partial_results() {
    let server = MockServer::start().await;
    mount_page(&server, 1, page_body(1), 1).await;
    mount_page(&server, 2, page_body(2), 1).await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("p", "3"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let collector = PaginatedCollector::new(executor(2));
    let report = collector
        .collect_listing(&client(&server), &search(), Some(100))
        .await
        .unwrap();

    assert_eq!(report.ids.len(), 60);
    assert_eq!(report.stop_reason, StopReason::RequestFailed);
}

#[tokio::test]
async fn test_max_pages_bound() {
    let server = MockServer::start().await;
    mount_page(&server, 1, page_body(1), 1).await;
    mount_page(&server, 2, page_body(2), 1).await;
    mount_page(&server, 3, page_body(3), 0).await;

    let collector = PaginatedCollector::new(executor(1)).with_max_pages(2);
    let report = collector
        .collect_listing(&client(&server), &search(), None)
        .await
        .unwrap();

    assert_eq!(report.ids.len(), 60);
    assert_eq!(report.stop_reason, StopReason::MaxPages);
}

#[tokio::test]
async fn test_collect_many_merges_in_listing_order() {
    let server = MockServer::start().await;
    mount_page(&server, 1, page_body(1), 1).await;
    mount_page(&server, 2, page_body(1), 1).await;
    Mock::given(method("GET"))
        .and(path("/users/77/works"))
        .and(query_param("p", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "body": { "25": null, "26": null, "1000": null }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/77/works"))
        .and(query_param("p", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "body": {} })))
        .expect(1)
        .mount(&server)
        .await;

    let kinds = vec![
        search(),
        ListingKind::UserWorks {
            user_id: "77".to_string(),
        },
    ];
    let collector = PaginatedCollector::new(executor(1));
    let report = collector
        .collect_many(&client(&server), &kinds, None, 2)
        .await
        .unwrap();

    assert_eq!(report.ids.len(), 31);
    assert_eq!(report.ids[29], ContentId::new(30));
    assert_eq!(report.ids[30], ContentId::new(1000));
    assert_eq!(report.pages_fetched, 4);
    assert_eq!(report.stop_reason, StopReason::Exhausted);
}
