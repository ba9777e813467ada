//! Source registry: which external origins are ingested and how.
//!
//! A [`SourceDescriptor`] pairs a display name and endpoint with a closed
//! [`RetrievalVariant`]. The registry is plain configuration built once at
//! process start; adding a source whose variant already has an adapter needs
//! no new code, including HTML listing pages with a different DOM layout
//! (see [`PageLayout`]).
//!
//! None of the built-in endpoints are known to be correct or live. They are
//! best guesses carried over from the original deployment and are expected to
//! be overridden from the config file.

use url::Url;

use crate::util::{validate_endpoint, EndpointError};

/// CSS selectors describing where entries live on an HTML listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLayout {
    /// Repeating container, one per entry.
    pub entry: String,
    /// Anchor inside the container carrying the title text and `href`.
    pub link: String,
    /// Element whose `datetime` attribute (or text) is the entry timestamp.
    pub time: String,
    /// Human-readable date text used when no machine-readable timestamp exists.
    pub date_text: String,
    /// Element on each entry's detail page holding the article body. When
    /// unset, the listing title is all the content an entry gets.
    pub body: Option<String>,
    /// Older listing pages reachable through a query parameter.
    pub pagination: Option<Pagination>,
}

impl Default for PageLayout {
    /// Drupal "views" listing, as used by most US government press pages.
    fn default() -> Self {
        Self {
            entry: ".views-row".to_string(),
            link: "a".to_string(),
            time: "time".to_string(),
            date_text: ".date-display-single".to_string(),
            body: None,
            pagination: None,
        }
    }
}

impl PageLayout {
    /// URL of listing page `page`. Page 0 is the endpoint itself; later pages
    /// only exist when the layout is paginated.
    pub fn page_url(&self, endpoint: &Url, page: u32) -> Option<Url> {
        if page == 0 {
            return Some(endpoint.clone());
        }
        let pagination = self.pagination.as_ref()?;
        if page >= pagination.max_pages {
            return None;
        }
        let mut url = endpoint.clone();
        url.query_pairs_mut()
            .append_pair(&pagination.param, &page.to_string());
        Some(url)
    }
}

/// Drupal-style `?page=N` archive navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pagination {
    /// Query parameter carrying the zero-based page number.
    pub param: String,
    /// Number of pages a backfill may visit, page 0 included.
    pub max_pages: u32,
}

impl Pagination {
    pub fn new(max_pages: u32) -> Self {
        Self {
            param: "page".to_string(),
            max_pages,
        }
    }
}

/// How a source is retrieved. Matched exhaustively by the dispatcher in
/// [`crate::fetch::Retriever`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrievalVariant {
    /// RSS, Atom or JSON Feed document.
    Feed,
    /// HTML listing page scraped with the given selectors.
    Page(PageLayout),
}

impl RetrievalVariant {
    pub fn label(&self) -> &'static str {
        match self {
            RetrievalVariant::Feed => "feed",
            RetrievalVariant::Page(_) => "page",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    pub name: String,
    pub endpoint: Url,
    pub variant: RetrievalVariant,
}

impl SourceDescriptor {
    pub fn feed(name: impl Into<String>, endpoint: Url) -> Self {
        Self {
            name: name.into(),
            endpoint,
            variant: RetrievalVariant::Feed,
        }
    }

    pub fn page(name: impl Into<String>, endpoint: Url, layout: PageLayout) -> Self {
        Self {
            name: name.into(),
            endpoint,
            variant: RetrievalVariant::Page(layout),
        }
    }

    /// Number of archive pages a backfill may visit; 1 when unpaginated.
    pub fn max_pages(&self) -> u32 {
        match &self.variant {
            RetrievalVariant::Page(PageLayout {
                pagination: Some(pagination),
                ..
            }) => pagination.max_pages.max(1),
            _ => 1,
        }
    }
}

/// Built-in registry used when the config file declares no `[[sources]]`.
///
/// Order is significant: a cycle visits sources in exactly this order.
pub fn default_registry() -> Result<Vec<SourceDescriptor>, EndpointError> {
    Ok(vec![
        SourceDescriptor::feed(
            "DOJ",
            validate_endpoint("https://www.justice.gov/feeds/opa/justice-news.xml")?,
        ),
        SourceDescriptor::feed(
            "FATF",
            validate_endpoint("https://www.fatf-gafi.org/en/pages/rss.xml")?,
        ),
        SourceDescriptor::feed(
            "FINTRAC",
            validate_endpoint("https://www.fintrac-canafe.gc.ca/rss-eng.xml")?,
        ),
        SourceDescriptor::feed(
            "DHS",
            validate_endpoint("https://www.dhs.gov/news-releases/rss.xml")?,
        ),
        SourceDescriptor::page(
            "OFAC",
            validate_endpoint("https://ofac.treasury.gov/recent-actions")?,
            PageLayout {
                pagination: Some(Pagination::new(150)),
                ..PageLayout::default()
            },
        ),
        SourceDescriptor::page(
            "US_Treasury",
            validate_endpoint("https://home.treasury.gov/news/press-releases")?,
            PageLayout {
                entry: ".views-row".to_string(),
                link: "h3 a".to_string(),
                time: "time".to_string(),
                date_text: ".date-format".to_string(),
                body: Some("div.field-item".to_string()),
                pagination: Some(Pagination::new(150)),
            },
        ),
    ])
}
