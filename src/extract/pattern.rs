use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;

use super::{dedup_by_name, CandidateEntity, EntityExtractor};

/// Phrases that mark a capitalized run as boilerplate rather than a name.
pub const DEFAULT_DENY_LIST: &[&str] = &[
    "Press Release",
    "Department",
    "Justice",
    "United States",
    "New York",
    "Washington",
];

pub const PATTERN_ENTITY_TYPE: &str = "Person/Org";

/// Countries recognized in `Name (Country)` designation listings.
pub const SANCTION_COUNTRIES: &[&str] = &[
    "Mexico",
    "Canada",
    "Poland",
    "China",
    "Russia",
    "Iran",
    "Korea",
    "Venezuela",
    "Colombia",
    "Ecuador",
    "Brazil",
];

/// `Bliri S.A. de C.V. (Mexico)` as written in OFAC and Treasury releases.
fn sanction_listing() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            let countries = SANCTION_COUNTRIES.join("|");
            Regex::new(&format!(
                r"\b([\p{{Lu}}0-9][\w.&'\-]*(?:\s+(?:(?:de|del|la|los|y|and|of|the)\s+)*[\p{{Lu}}0-9][\w.&'\-]*)*)\s\(({countries})\)"
            ))
            .ok()
        })
        .as_ref()
}

/// Two or more consecutive capitalized words.
fn capitalized_run() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"[A-Z][a-z]+(?:\s[A-Z][a-z]+)+").ok())
        .as_ref()
}

/// Heuristic extractor, in two passes.
///
/// 1. Designation listings, `Name (Country)`, typed `Sanctioned Entity (Country)`.
/// 2. Every maximal run of capitalized words that contains no deny-listed
///    phrase and does not overlap a name found in pass 1.
#[derive(Debug, Clone)]
pub struct PatternExtractor {
    deny_list: Vec<String>,
}

impl PatternExtractor {
    pub fn new(deny_list: Vec<String>) -> Self {
        Self { deny_list }
    }

    pub fn find(&self, text: &str) -> Vec<CandidateEntity> {
        let mut candidates = find_sanctioned(text);

        if let Some(re) = capitalized_run() {
            let runs: Vec<_> = re
                .find_iter(text)
                .map(|m| m.as_str())
                .filter(|name| !self.deny_list.iter().any(|phrase| name.contains(phrase.as_str())))
                .filter(|name| {
                    !candidates
                        .iter()
                        .any(|c| c.name.contains(name) || name.contains(c.name.as_str()))
                })
                .map(|name| CandidateEntity::new(name, PATTERN_ENTITY_TYPE))
                .collect();
            candidates.extend(runs);
        }

        dedup_by_name(candidates)
    }
}

fn find_sanctioned(text: &str) -> Vec<CandidateEntity> {
    let Some(re) = sanction_listing() else {
        return Vec::new();
    };
    re.captures_iter(text)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str().trim();
            let country = caps.get(2)?.as_str();
            (!name.is_empty())
                .then(|| CandidateEntity::new(name, format!("Sanctioned Entity ({country})")))
        })
        .collect()
}

impl Default for PatternExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_DENY_LIST.iter().map(|s| s.to_string()).collect())
    }
}

#[async_trait]
impl EntityExtractor for PatternExtractor {
    async fn extract(&self, text: &str) -> Vec<CandidateEntity> {
        self.find(text)
    }
}
