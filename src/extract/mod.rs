//! Candidate entity extraction.
//!
//! Extractors never fail: any internal problem yields an empty result. The
//! orchestrator only ever sees a `Vec<CandidateEntity>`, deduplicated by
//! exact name.

mod llm;
mod pattern;

use async_trait::async_trait;
use std::collections::HashSet;

pub use crate::storage::CandidateEntity;
pub use llm::{GeminiExtractor, DEFAULT_GEMINI_MODEL, MAX_PROMPT_CHARS};
pub use pattern::{PatternExtractor, DEFAULT_DENY_LIST, PATTERN_ENTITY_TYPE, SANCTION_COUNTRIES};

#[async_trait]
pub trait EntityExtractor: Send + Sync {
    async fn extract(&self, text: &str) -> Vec<CandidateEntity>;
}

/// Uses `primary`, and `secondary` whenever `primary` finds nothing.
pub struct FallbackExtractor {
    primary: Box<dyn EntityExtractor>,
    secondary: Box<dyn EntityExtractor>,
}

impl FallbackExtractor {
    pub fn new(primary: Box<dyn EntityExtractor>, secondary: Box<dyn EntityExtractor>) -> Self {
        Self { primary, secondary }
    }
}

#[async_trait]
impl EntityExtractor for FallbackExtractor {
    async fn extract(&self, text: &str) -> Vec<CandidateEntity> {
        let found = self.primary.extract(text).await;
        if !found.is_empty() {
            return found;
        }
        self.secondary.extract(text).await
    }
}

/// Keep the first candidate for each exact name, preserving order.
pub(crate) fn dedup_by_name(candidates: Vec<CandidateEntity>) -> Vec<CandidateEntity> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.name.clone()))
        .collect()
}
