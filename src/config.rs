//! Configuration file parser for ~/.config/amlwatch/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`,
//! which ingests the built-in source registry. Unknown keys are ignored by
//! serde, though we log a warning when the file contains potential typos.
use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::extract::DEFAULT_DENY_LIST;
use crate::fetch::DEFAULT_USER_AGENT;
use crate::source::{default_registry, PageLayout, Pagination, SourceDescriptor};
use crate::util::validate_endpoint;

/// Environment variables consulted for the model API key, in order.
/// Either one takes precedence over the config file.
pub const API_KEY_ENV_VARS: [&str; 2] = ["GEMINI_API_KEY", "GOOGLE_API_KEY"];

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid source '{name}': {reason}")]
    InvalidSource { name: String, reason: String },
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Missing keys fall back to `Default::default()`.
///
/// Custom Debug impl masks `gemini_api_key` so it never reaches logs.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite file. Defaults to `amlwatch.db` next to the config file.
    pub database_path: Option<PathBuf>,

    /// Minutes between scheduled cycles. 0 = on-demand only.
    pub refresh_interval_minutes: u64,

    /// Upper bound on one source's retrieval, retries included.
    pub fetch_timeout_secs: u64,

    /// Address the read API binds to.
    pub listen_addr: String,

    /// User-Agent header sent to every source.
    pub user_agent: String,

    /// Phrases that disqualify a pattern-extracted entity.
    pub deny_list: Vec<String>,

    /// Gemini API key (alternative to GEMINI_API_KEY / GOOGLE_API_KEY).
    /// Env vars take precedence over the config file.
    pub gemini_api_key: Option<String>,

    /// Source registry. Empty = built-in defaults.
    pub sources: Vec<SourceConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            refresh_interval_minutes: 60,
            fetch_timeout_secs: 30,
            listen_addr: "127.0.0.1:3001".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            deny_list: DEFAULT_DENY_LIST.iter().map(|s| s.to_string()).collect(),
            gemini_api_key: None,
            sources: Vec::new(),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("refresh_interval_minutes", &self.refresh_interval_minutes)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("listen_addr", &self.listen_addr)
            .field("user_agent", &self.user_agent)
            .field("deny_list", &self.deny_list)
            .field(
                "gemini_api_key",
                &self.gemini_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("sources", &self.sources)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Feed,
    Page,
}

/// One `[[sources]]` table.
///
/// Selector and pagination keys only apply to `kind = "page"`; selectors
/// left out fall back to [`PageLayout::default`]. Setting `max_pages` makes
/// the archive available to a backfill.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub kind: SourceKind,
    pub endpoint: String,
    pub entry_selector: Option<String>,
    pub link_selector: Option<String>,
    pub time_selector: Option<String>,
    pub date_selector: Option<String>,
    /// Detail-page element holding the article body.
    pub body_selector: Option<String>,
    /// Query parameter for archive pages (default `page`).
    pub page_param: Option<String>,
    pub max_pages: Option<u32>,
}

impl SourceConfig {
    pub fn to_descriptor(&self) -> Result<SourceDescriptor, ConfigError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ConfigError::InvalidSource {
                name: self.endpoint.clone(),
                reason: "name is empty".to_string(),
            });
        }

        let endpoint = validate_endpoint(&self.endpoint).map_err(|e| ConfigError::InvalidSource {
            name: name.to_string(),
            reason: e.to_string(),
        })?;

        match self.kind {
            SourceKind::Feed => {
                if self.has_page_keys() {
                    tracing::warn!(source = %name, "Page layout keys ignored for feed source");
                }
                Ok(SourceDescriptor::feed(name, endpoint))
            }
            SourceKind::Page => {
                let defaults = PageLayout::default();
                let layout = PageLayout {
                    entry: self.entry_selector.clone().unwrap_or(defaults.entry),
                    link: self.link_selector.clone().unwrap_or(defaults.link),
                    time: self.time_selector.clone().unwrap_or(defaults.time),
                    date_text: self.date_selector.clone().unwrap_or(defaults.date_text),
                    body: self.body_selector.clone(),
                    pagination: self.pagination(),
                };
                Ok(SourceDescriptor::page(name, endpoint, layout))
            }
        }
    }

    fn pagination(&self) -> Option<Pagination> {
        let max_pages = self.max_pages?;
        Some(Pagination {
            param: self.page_param.clone().unwrap_or_else(|| "page".to_string()),
            max_pages,
        })
    }

    fn has_page_keys(&self) -> bool {
        self.entry_selector.is_some()
            || self.link_selector.is_some()
            || self.time_selector.is_some()
            || self.date_selector.is_some()
            || self.body_selector.is_some()
            || self.page_param.is_some()
            || self.max_pages.is_some()
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → silently accepted (serde default behavior), logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check file size before reading so a huge or corrupted file cannot
        // exhaust memory.
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        // Parse as a raw table first to detect unknown keys
        if let Ok(raw) = content.parse::<toml::Table>() {
            let known_keys = [
                "database_path",
                "refresh_interval_minutes",
                "fetch_timeout_secs",
                "listen_addr",
                "user_agent",
                "deny_list",
                "gemini_api_key",
                "sources",
            ];
            for key in raw.keys() {
                if !known_keys.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            sources = config.sources.len(),
            refresh_interval_minutes = config.refresh_interval_minutes,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Build the source registry: configured sources in file order, or the
    /// built-in defaults when none are configured.
    pub fn registry(&self) -> Result<Vec<SourceDescriptor>, ConfigError> {
        if self.sources.is_empty() {
            return default_registry().map_err(|e| ConfigError::InvalidSource {
                name: "built-in".to_string(),
                reason: e.to_string(),
            });
        }

        let registry = self
            .sources
            .iter()
            .map(SourceConfig::to_descriptor)
            .collect::<Result<Vec<_>, _>>()?;

        for (i, source) in registry.iter().enumerate() {
            if registry[..i].iter().any(|s| s.name == source.name) {
                tracing::warn!(source = %source.name, "Duplicate source name in config");
            }
        }
        Ok(registry)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_minutes.saturating_mul(60))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.max(1))
    }

    /// The model API key, from the environment or else the config file.
    pub fn gemini_api_key(&self) -> Option<SecretString> {
        let from_env = API_KEY_ENV_VARS
            .iter()
            .find_map(|var| std::env::var(var).ok());
        pick_api_key(from_env, self.gemini_api_key.as_deref())
    }
}

fn pick_api_key(from_env: Option<String>, from_file: Option<&str>) -> Option<SecretString> {
    from_env
        .filter(|k| !k.trim().is_empty())
        .or_else(|| from_file.map(str::to_string).filter(|k| !k.trim().is_empty()))
        .map(SecretString::from)
}

// ============================================================================
// Tests
// ============================================================================
