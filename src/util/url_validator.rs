use thiserror::Error;
use url::Url;

/// Errors that can occur while validating a source endpoint or a scraped link.
#[derive(Error, Debug)]
pub enum EndpointError {
    /// The URL string could not be parsed (or joined against its base).
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL has no host component.
    #[error("URL has no host")]
    MissingHost,
}

fn check_http(url: Url) -> Result<Url, EndpointError> {
    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(EndpointError::UnsupportedScheme(scheme.to_owned())),
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(EndpointError::MissingHost);
    }
    Ok(url)
}

/// Validates a configured source endpoint.
///
/// The endpoint must be an absolute `http`/`https` URL with a host. Nothing
/// beyond syntax is checked: whether the endpoint is live or still publishes
/// the expected content is out of our hands.
///
/// # Examples
///
/// ```
/// use amlwatch::util::validate_endpoint;
///
/// let url = validate_endpoint("https://www.justice.gov/feeds/opa/justice-news.xml").unwrap();
/// assert_eq!(url.host_str(), Some("www.justice.gov"));
///
/// assert!(validate_endpoint("file:///etc/passwd").is_err());
/// assert!(validate_endpoint("/recent-actions").is_err());
/// ```
pub fn validate_endpoint(url_str: &str) -> Result<Url, EndpointError> {
    check_http(Url::parse(url_str.trim())?)
}

/// Resolves a scraped `href` against the page it was found on.
///
/// Relative links become absolute; fragments are dropped so that
/// `/action#top` and `/action` dedup to the same article. Links that resolve
/// to a non-http scheme (`mailto:`, `javascript:`) are rejected.
pub fn resolve_link(base: &Url, href: &str) -> Result<Url, EndpointError> {
    let mut resolved = base.join(href.trim())?;
    resolved.set_fragment(None);
    check_http(resolved)
}
