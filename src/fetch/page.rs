use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::{Arc, OnceLock};
use url::Url;

use super::{FetchError, HttpFetcher, RawEntry, SourceAdapter};
use crate::source::{PageLayout, RetrievalVariant, SourceDescriptor};
use crate::util::{clean_text, resolve_link};

/// "January 14, 2025" style dates embedded in listing text.
fn long_date_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"[A-Z][a-z]+ \d{1,2}, \d{4}").ok())
        .as_ref()
}

/// Scrapes an HTML listing page into entries using the source's [`PageLayout`].
///
/// A layout that matches nothing yields an empty vector rather than an error:
/// sites redesign without notice and that must not fail the whole cycle.
///
/// When the layout names a `body` selector, each entry's detail page is
/// fetched too and its body text becomes the entry's content. A detail page
/// that fails to load leaves the entry with its title only.
pub struct PageAdapter {
    http: Arc<HttpFetcher>,
}

impl PageAdapter {
    pub fn new(http: Arc<HttpFetcher>) -> Self {
        Self { http }
    }

    async fn fill_bodies(&self, source: &str, body: &str, entries: &mut [RawEntry]) -> Result<(), FetchError> {
        // Fail on a bad selector before any detail request goes out
        selector(body)?;

        for entry in entries.iter_mut() {
            let Some(link) = entry.link.as_deref() else {
                continue;
            };
            let url = match Url::parse(link) {
                Ok(url) => url,
                Err(_) => continue,
            };

            match self.http.get_bytes(&url).await {
                Ok(bytes) => {
                    let html = String::from_utf8_lossy(&bytes);
                    match detail_text(&html, body) {
                        Some(text) => entry.texts.push(text),
                        None => tracing::debug!(
                            source = %source,
                            url = %url,
                            "Detail page has no body element"
                        ),
                    }
                }
                Err(e) => tracing::warn!(
                    source = %source,
                    url = %url,
                    error = %e,
                    "Detail page fetch failed, keeping title as content"
                ),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SourceAdapter for PageAdapter {
    async fn fetch_entries(&self, source: &SourceDescriptor) -> Result<Vec<RawEntry>, FetchError> {
        self.fetch_page(source, 0).await
    }

    async fn fetch_page(&self, source: &SourceDescriptor, page: u32) -> Result<Vec<RawEntry>, FetchError> {
        let RetrievalVariant::Page(layout) = &source.variant else {
            return Err(FetchError::Parse("not a page source".to_string()));
        };
        let Some(url) = layout.page_url(&source.endpoint, page) else {
            return Ok(Vec::new());
        };

        let bytes = self.http.get_bytes(&url).await?;
        let html = String::from_utf8_lossy(&bytes);
        let mut entries = parse_page(&html, &source.endpoint, layout)?;

        if entries.is_empty() {
            tracing::warn!(
                source = %source.name,
                page = page,
                selector = %layout.entry,
                bytes = bytes.len(),
                "No entries matched page layout"
            );
        }

        if let Some(body) = &layout.body {
            self.fill_bodies(&source.name, body, &mut entries).await?;
        }
        Ok(entries)
    }
}

fn selector(css: &str) -> Result<Selector, FetchError> {
    Selector::parse(css).map_err(|e| FetchError::Parse(format!("invalid selector `{css}`: {e}")))
}

/// Extract entries from a listing page.
///
/// For each `layout.entry` container, timestamps are collected in preference
/// order: the `datetime` attribute of `layout.time`, the text of
/// `layout.date_text`, the text of `layout.time`, and finally a long-form
/// date found anywhere in the container. The first `layout.link` anchor gives
/// the title and link; the link is resolved against `base`.
///
/// Only an invalid selector is an error.
pub fn parse_page(html: &str, base: &Url, layout: &PageLayout) -> Result<Vec<RawEntry>, FetchError> {
    let entry_sel = selector(&layout.entry)?;
    let link_sel = selector(&layout.link)?;
    let time_sel = selector(&layout.time)?;
    let date_sel = selector(&layout.date_text)?;

    let document = Html::parse_document(html);

    let entries = document
        .select(&entry_sel)
        .map(|container| {
            let timestamps = container_timestamps(container, &time_sel, &date_sel);

            let anchor = container.select(&link_sel).next();
            let title = anchor.map(|a| clean_text(&element_text(a)));
            let link = anchor
                .and_then(|a| a.value().attr("href"))
                .and_then(|href| match resolve_link(base, href) {
                    Ok(url) => Some(url.to_string()),
                    Err(e) => {
                        tracing::debug!(href = %href, error = %e, "Skipping unresolvable link");
                        None
                    }
                });

            RawEntry {
                title,
                link,
                timestamps,
                texts: Vec::new(),
            }
        })
        .collect();

    Ok(entries)
}

/// Text of the first `body` match on an article page, if it has any.
fn detail_text(html: &str, body: &str) -> Option<String> {
    let body_sel = Selector::parse(body).ok()?;
    let document = Html::parse_document(html);
    let text = document.select(&body_sel).next().map(|el| clean_text(&element_text(el)))?;
    (!text.is_empty()).then_some(text)
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ")
}

fn container_timestamps(container: ElementRef<'_>, time_sel: &Selector, date_sel: &Selector) -> Vec<String> {
    let time_el = container.select(time_sel).next();

    let mut timestamps = Vec::new();
    if let Some(datetime) = time_el.and_then(|t| t.value().attr("datetime")) {
        timestamps.push(datetime.trim().to_string());
    }
    if let Some(date) = container.select(date_sel).next() {
        timestamps.push(clean_text(&element_text(date)));
    }
    if let Some(time) = time_el {
        timestamps.push(clean_text(&element_text(time)));
    }
    let text = clean_text(&element_text(container));
    if let Some(found) = long_date_pattern().and_then(|re| re.find(&text)) {
        timestamps.push(found.as_str().to_string());
    }

    timestamps.retain(|t| !t.is_empty());
    timestamps
}
