use async_trait::async_trait;
use feed_rs::parser;
use scraper::Html;
use std::sync::Arc;
use url::Url;

use super::{FetchError, HttpFetcher, RawEntry, SourceAdapter};
use crate::source::SourceDescriptor;
use crate::util::{clean_text, resolve_link};

/// Pulls a syndication document and yields one entry per item.
pub struct FeedAdapter {
    http: Arc<HttpFetcher>,
}

impl FeedAdapter {
    pub fn new(http: Arc<HttpFetcher>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl SourceAdapter for FeedAdapter {
    async fn fetch_entries(&self, source: &SourceDescriptor) -> Result<Vec<RawEntry>, FetchError> {
        let bytes = self.http.get_bytes(&source.endpoint).await?;
        let entries = parse_feed(&bytes, &source.endpoint)?;
        if entries.is_empty() {
            tracing::warn!(
                source = %source.name,
                bytes = bytes.len(),
                "Feed parsed but contained no entries"
            );
        }
        Ok(entries)
    }
}

/// Parse RSS, Atom or JSON Feed bytes into raw entries.
///
/// Timestamps are the item's explicit publish date, then its update date,
/// both rendered as RFC 3339. Texts are the full content body, then the
/// summary, with markup reduced to plain text.
///
/// Item links are resolved against `base` (the feed's own URL) with their
/// fragment removed; a link that does not resolve to http(s) is dropped.
pub fn parse_feed(bytes: &[u8], base: &Url) -> Result<Vec<RawEntry>, FetchError> {
    let feed = parser::parse(bytes).map_err(|e| FetchError::Parse(e.to_string()))?;

    let entries = feed
        .entries
        .into_iter()
        .map(|entry| {
            let timestamps = [entry.published, entry.updated]
                .into_iter()
                .flatten()
                .map(|dt| dt.to_rfc3339())
                .collect();

            let texts = [
                entry.content.and_then(|c| c.body),
                entry.summary.map(|s| s.content),
            ]
            .into_iter()
            .flatten()
            .map(|markup| html_to_text(&markup))
            .filter(|text| !text.is_empty())
            .collect();

            RawEntry {
                title: entry.title.map(|t| t.content),
                link: entry
                    .links
                    .into_iter()
                    .next()
                    .and_then(|l| match resolve_link(base, &l.href) {
                        Ok(url) => Some(url.to_string()),
                        Err(e) => {
                            tracing::debug!(href = %l.href, error = %e, "Skipping unresolvable link");
                            None
                        }
                    }),
                timestamps,
                texts,
            }
        })
        .collect();

    Ok(entries)
}

/// Reduce an HTML fragment (feed descriptions are frequently escaped HTML)
/// to its whitespace-normalized text.
fn html_to_text(markup: &str) -> String {
    if !markup.contains('<') {
        return clean_text(markup);
    }
    let fragment = Html::parse_fragment(markup);
    let text: String = fragment.root_element().text().collect::<Vec<_>>().join(" ");
    clean_text(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Justice News</title>
    <item>
        <title>Two Charged in Money Laundering Scheme</title>
        <link>https://www.justice.gov/opa/pr/two-charged</link>
        <pubDate>Tue, 14 Jan 2025 10:00:00 GMT</pubDate>
        <description>&lt;p&gt;Maria Lopez and &lt;b&gt;Peter Vance&lt;/b&gt; were charged.&lt;/p&gt;</description>
    </item>
    <item>
        <title>No Link Item</title>
    </item>
</channel></rss>"#;

    const VALID_ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>FINTRAC</title>
  <id>urn:fintrac</id>
  <updated>2025-02-01T00:00:00Z</updated>
  <entry>
    <title>Notice to reporting entities</title>
    <id>urn:fintrac:1</id>
    <link href="https://www.fintrac-canafe.gc.ca/notice-1"/>
    <updated>2025-02-01T12:30:00Z</updated>
    <summary>Short summary</summary>
  </entry>
</feed>"#;

    fn base() -> Url {
        Url::parse("https://www.justice.gov/feeds/opa/justice-news.xml").unwrap()
    }

    #[test]
    fn test_parse_rss_items() {
        let entries = parse_feed(VALID_RSS.as_bytes(), &base()).unwrap();
        assert_eq!(entries.len(), 2);

        let first = &entries[0];
        assert_eq!(
            first.title.as_deref(),
            Some("Two Charged in Money Laundering Scheme")
        );
        assert_eq!(
            first.link.as_deref(),
            Some("https://www.justice.gov/opa/pr/two-charged")
        );
        assert_eq!(first.timestamps, vec!["2025-01-14T10:00:00+00:00".to_string()]);
        assert_eq!(
            first.texts,
            vec!["Maria Lopez and Peter Vance were charged.".to_string()]
        );

        assert_eq!(entries[1].link, None);
        assert!(entries[1].timestamps.is_empty());
    }

    #[test]
    fn test_parse_atom_uses_updated_when_unpublished() {
        let entries = parse_feed(VALID_ATOM.as_bytes(), &base()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].timestamps, vec!["2025-02-01T12:30:00+00:00".to_string()]);
        assert_eq!(entries[0].texts, vec!["Short summary".to_string()]);
    }

    #[test]
    fn test_parse_malformed_is_parse_error() {
        match parse_feed(b"<html><body>not a feed</body></html>", &base()) {
            Err(FetchError::Parse(_)) => {}
            other => panic!("Expected Parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_empty_channel() {
        let empty = r#"<?xml version="1.0"?><rss version="2.0"><channel><title>x</title></channel></rss>"#;
        assert!(parse_feed(empty.as_bytes(), &base()).unwrap().is_empty());
    }

    #[test]
    fn test_parse_links_made_absolute_without_fragment() {
        let rss = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Justice News</title>
    <item><title>Relative</title><link>/opa/pr/relative-item</link></item>
    <item><title>Anchored</title><link>https://www.justice.gov/opa/pr/a#top</link></item>
    <item><title>Plain</title><link>https://www.justice.gov/opa/pr/a</link></item>
    <item><title>Mail</title><link>mailto:press@justice.gov</link></item>
</channel></rss>"#;
        let entries = parse_feed(rss.as_bytes(), &base()).unwrap();
        let links: Vec<_> = entries.iter().map(|e| e.link.as_deref()).collect();
        assert_eq!(
            links,
            [
                Some("https://www.justice.gov/opa/pr/relative-item"),
                Some("https://www.justice.gov/opa/pr/a"),
                Some("https://www.justice.gov/opa/pr/a"),
                None,
            ]
        );
    }

    #[test]
    fn test_html_to_text_plain_passthrough() {
        assert_eq!(html_to_text("  plain\n text "), "plain text");
    }

    #[tokio::test]
    async fn test_adapter_fetches_and_parses() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .insert_header("Content-Type", "application/xml"),
            )
            .mount(&mock_server)
            .await;

        let adapter = FeedAdapter::new(Arc::new(HttpFetcher::new("amlwatch-test").unwrap()));
        let source = SourceDescriptor::feed(
            "DOJ",
            Url::parse(&format!("{}/feed", mock_server.uri())).unwrap(),
        );

        let entries = adapter.fetch_entries(&source).await.unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[tokio::test]
    async fn test_adapter_malformed_document_is_parse_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>not a feed</body></html>"))
            .mount(&mock_server)
            .await;

        let adapter = FeedAdapter::new(Arc::new(HttpFetcher::new("amlwatch-test").unwrap()));
        let source = SourceDescriptor::feed(
            "DOJ",
            Url::parse(&format!("{}/feed", mock_server.uri())).unwrap(),
        );

        let err = adapter.fetch_entries(&source).await.unwrap_err();
        assert_eq!(err.kind(), crate::fetch::FetchErrorKind::Parse);
    }
}
