//! Unit tests for the layout-driven listing client

use artwork_crawler::fetcher::pagination::PageCursor;
use artwork_crawler::fetcher::{
    create_listing_client, EndpointTemplate, FetcherError, IdSource, ListingKind, ListingLayout,
    PagingStyle,
};
use artwork_crawler::ContentId;
use serde_json::json;

fn ranking_layout(paging: PagingStyle) -> ListingLayout {
    ListingLayout::new(paging).with_ranking(
        EndpointTemplate::new(
            "https://api.example.com/ranking",
            IdSource::ArrayField {
                pointer: "/contents".to_string(),
                id_field: Some("illust_id".to_string()),
            },
        )
        .with_param("mode", "{mode}")
        .with_param("date", "{date}"),
    )
}

fn daily() -> ListingKind {
    ListingKind::Ranking {
        mode: "daily".to_string(),
        date: Some("20240501".to_string()),
    }
}

#[test]
fn test_page_index_paging() {
    let client = create_listing_client(ranking_layout(PagingStyle::PageIndex {
        param: "p".to_string(),
        first: 1,
        has_more: Some("/next".to_string()),
    }))
    .unwrap();

    let cursor = client.start(&daily()).unwrap();
    assert_eq!(cursor.param("mode"), Some("daily"));
    assert_eq!(cursor.param("date"), Some("20240501"));
    assert_eq!(cursor.param("p"), Some("1"));

    let page = json!({
        "contents": [{"illust_id": 5}, {"illust_id": "6"}, {"illust_id": 0}],
        "next": 2
    });
    assert_eq!(
        client.extract_ids(&daily(), &page),
        vec![ContentId::new(5), ContentId::new(6)]
    );

    let next = client.next_cursor(&page, &cursor).unwrap();
    assert_eq!(next.param("p"), Some("2"));
    assert_eq!(next.param("mode"), Some("daily"));

    let last = json!({"contents": [], "next": false});
    assert!(client.next_cursor(&last, &next).is_none());
}

#[test]
fn test_next_url_paging() {
    let client = create_listing_client(ranking_layout(PagingStyle::NextUrl {
        pointer: "/next_url".to_string(),
    }))
    .unwrap();
    let cursor = PageCursor::new("https://api.example.com/ranking").with_param("mode", "daily");

    let page = json!({"next_url": "https://api.example.com/ranking?mode=daily&offset=30"});
    let next = client.next_cursor(&page, &cursor).unwrap();
    assert_eq!(next.url, "https://api.example.com/ranking?mode=daily&offset=30");
    assert!(next.params.is_empty());
    assert_eq!(next.page, 1);

    assert!(client.next_cursor(&json!({"next_url": null}), &next).is_none());
    assert!(client.next_cursor(&json!({"next_url": ""}), &next).is_none());
}

#[test]
fn test_unsupported_kind() {
    let client = create_listing_client(ranking_layout(PagingStyle::NextUrl {
        pointer: "/next_url".to_string(),
    }))
    .unwrap();

    let err = client
        .start(&ListingKind::Search {
            keyword: "x".to_string(),
        })
        .unwrap_err();
    assert!(matches!(err, FetcherError::UnsupportedListing(_)));
}

#[test]
fn test_empty_layout_rejected() {
    let layout = ListingLayout::new(PagingStyle::NextUrl {
        pointer: "/next".to_string(),
    });
    assert!(create_listing_client(layout).is_err());
}

#[test]
fn test_listing_kind_from_json() {
    let kind: ListingKind =
        serde_json::from_value(json!({"kind": "user_works", "user_id": "1234"})).unwrap();
    assert_eq!(
        kind,
        ListingKind::UserWorks {
            user_id: "1234".to_string()
        }
    );
}
