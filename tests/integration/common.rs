//! Shared helpers for integration tests

use std::sync::Arc;
use std::time::Duration;

use artwork_crawler::config::RequestConfig;
use artwork_crawler::fetcher::http::HttpExecutor;
use artwork_crawler::{ContentId, SubPart, WorkItem};

/// Request settings with short timeouts and no retry pause
pub fn fast_request_config(max_retries: u32) -> RequestConfig {
    RequestConfig {
        max_retries,
        retry_delay: Duration::from_millis(10),
        timeout: Duration::from_millis(500),
        connect_timeout: Duration::from_millis(500),
        ..RequestConfig::default()
    }
}

pub fn executor(max_retries: u32) -> Arc<HttpExecutor> {
    Arc::new(HttpExecutor::new(fast_request_config(max_retries)).unwrap())
}

/// Work item whose pages live under `{base}/img/{id}_p{n}.png`
pub fn work(base: &str, id: u64, pages: usize) -> WorkItem {
    let parts = (0..pages)
        .map(|n| {
            SubPart::new(
                n,
                format!("{base}/img/{id}_p{n}.png"),
                format!("{id}_p{n}.png"),
            )
        })
        .collect();
    WorkItem::new(ContentId::new(id), format!("work {id}"), "tester", parts)
}
