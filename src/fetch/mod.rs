//! Retrieval adapters: turn a [`SourceDescriptor`] into raw entries.
//!
//! - [`FeedAdapter`] - RSS/Atom/JSON Feed documents via `feed-rs`
//! - [`PageAdapter`] - HTML listing pages via `scraper` and a [`PageLayout`]
//! - [`Retriever`] - dispatches on [`RetrievalVariant`]; this is what the
//!   orchestrator holds
//!
//! Both adapters share one [`HttpFetcher`] for transport (user agent, retry
//! with backoff, body size cap). Adapters never touch storage; a failure is
//! returned as a [`FetchError`] and isolated to its source by the caller.
//!
//! [`PageLayout`]: crate::source::PageLayout

mod feed;
mod http;
mod page;

use async_trait::async_trait;
use thiserror::Error;

use crate::source::{RetrievalVariant, SourceDescriptor};

pub use feed::{parse_feed, FeedAdapter};
pub use http::{HttpFetcher, DEFAULT_USER_AGENT};
pub use page::{parse_page, PageAdapter};

/// One item as yielded by an adapter, before normalization.
///
/// `timestamps` and `texts` are ordered by preference: the normalizer takes
/// the first non-empty value of each.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEntry {
    pub title: Option<String>,
    pub link: Option<String>,
    pub timestamps: Vec<String>,
    pub texts: Vec<String>,
}

/// Coarse classification of a [`FetchError`], as recorded per source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// Transport-level failure: connect, TLS, status, timeout, truncated body.
    Network,
    /// The document arrived but could not be understood.
    Parse,
}

/// Errors that can occur while retrieving one source.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request or adapter exceeded its time budget
    #[error("Request timed out")]
    Timeout,
    /// Server returned 429 Too Many Requests after max retries
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),
    /// Response body exceeded the size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// Document could not be parsed as a feed, or a configured selector is invalid
    #[error("Parse error: {0}")]
    Parse(String),
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::Parse(_) => FetchErrorKind::Parse,
            FetchError::Network(_)
            | FetchError::HttpStatus(_)
            | FetchError::Timeout
            | FetchError::RateLimited(_)
            | FetchError::ResponseTooLarge
            | FetchError::IncompleteResponse { .. } => FetchErrorKind::Network,
        }
    }
}

/// Capability shared by every retrieval strategy.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Retrieve the current entries published by `source`.
    ///
    /// An empty vector is a valid answer (nothing published, or a page whose
    /// layout no longer matches).
    async fn fetch_entries(&self, source: &SourceDescriptor) -> Result<Vec<RawEntry>, FetchError>;

    /// Retrieve page `page` of the source's archive, 0 being the current
    /// entries. Sources without older pages answer an empty vector for any
    /// later page.
    async fn fetch_page(&self, source: &SourceDescriptor, page: u32) -> Result<Vec<RawEntry>, FetchError> {
        if page == 0 {
            self.fetch_entries(source).await
        } else {
            Ok(Vec::new())
        }
    }
}

/// Selects the adapter matching a source's [`RetrievalVariant`].
pub struct Retriever {
    feed: FeedAdapter,
    page: PageAdapter,
}

impl Retriever {
    pub fn new(http: HttpFetcher) -> Self {
        let http = std::sync::Arc::new(http);
        Self {
            feed: FeedAdapter::new(http.clone()),
            page: PageAdapter::new(http),
        }
    }
}

#[async_trait]
impl SourceAdapter for Retriever {
    async fn fetch_entries(&self, source: &SourceDescriptor) -> Result<Vec<RawEntry>, FetchError> {
        match &source.variant {
            RetrievalVariant::Feed => self.feed.fetch_entries(source).await,
            RetrievalVariant::Page(_) => self.page.fetch_entries(source).await,
        }
    }

    async fn fetch_page(&self, source: &SourceDescriptor, page: u32) -> Result<Vec<RawEntry>, FetchError> {
        match &source.variant {
            RetrievalVariant::Feed => self.feed.fetch_page(source, page).await,
            RetrievalVariant::Page(_) => self.page.fetch_page(source, page).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::PageLayout;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>t</title>
    <item><title>Feed item</title><link>https://example.gov/feed-item</link></item>
</channel></rss>"#;

    const PAGE: &str = r#"<html><body>
<div class="views-row"><a href="/page-item">Page item</a></div>
</body></html>"#;

    #[test]
    fn test_error_kinds() {
        assert_eq!(FetchError::Timeout.kind(), FetchErrorKind::Network);
        assert_eq!(FetchError::HttpStatus(503).kind(), FetchErrorKind::Network);
        assert_eq!(FetchError::ResponseTooLarge.kind(), FetchErrorKind::Network);
        assert_eq!(
            FetchError::Parse("bad".into()).kind(),
            FetchErrorKind::Parse
        );
    }

    #[tokio::test]
    async fn test_feed_has_no_older_pages() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rss"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RSS))
            .expect(1)
            .mount(&mock_server)
            .await;

        let retriever = Retriever::new(HttpFetcher::new("amlwatch-test").unwrap());
        let feed = SourceDescriptor::feed(
            "F",
            Url::parse(&format!("{}/rss", mock_server.uri())).unwrap(),
        );
        assert_eq!(retriever.fetch_page(&feed, 0).await.unwrap().len(), 1);
        assert!(retriever.fetch_page(&feed, 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retriever_dispatches_by_variant() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rss"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RSS))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/list"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .mount(&mock_server)
            .await;

        let retriever = Retriever::new(HttpFetcher::new("amlwatch-test").unwrap());
        let base = Url::parse(&mock_server.uri()).unwrap();

        let feed = SourceDescriptor::feed("F", base.join("/rss").unwrap());
        let entries = retriever.fetch_entries(&feed).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title.as_deref(), Some("Feed item"));

        let page = SourceDescriptor::page("P", base.join("/list").unwrap(), PageLayout::default());
        let entries = retriever.fetch_entries(&page).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title.as_deref(), Some("Page item"));
        assert_eq!(
            entries[0].link.as_deref(),
            Some(format!("{}/page-item", mock_server.uri()).as_str())
        );
    }
}
