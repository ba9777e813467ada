use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{dedup_by_name, CandidateEntity, EntityExtractor};
use crate::util::truncate_chars;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";

/// Only the head of long articles is sent to the model.
pub const MAX_PROMPT_CHARS: usize = 4000;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const PROMPT_PREAMBLE: &str = "Extract all financial crime entities, sanctioned individuals, \
or organizations from the text below.\n\
Return ONLY a list of entities in the format: Name | Type (Person/Org/Vessel/etc)\n\
Do not include headers or markdown.\n\nText:\n";

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

// ============================================================================
// Extractor
// ============================================================================

/// Model-backed extractor over the Gemini `generateContent` REST endpoint.
///
/// Every failure (transport, status, body shape) is logged and reported as
/// "no entities", so a [`FallbackExtractor`](super::FallbackExtractor) can
/// take over.
pub struct GeminiExtractor {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
}

impl GeminiExtractor {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: GEMINI_BASE_URL.to_string(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
        }
    }

    /// Point at a different API host (tests use a local mock server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    async fn generate(&self, prompt: &str) -> Result<String, reqwest::Error> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let body = GenerateRequest {
            contents: [Content {
                parts: [Part { text: prompt }],
            }],
        };

        let response: GenerateResponse = self
            .client
            .post(url)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .map(|p| p.text)
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

#[async_trait]
impl EntityExtractor for GeminiExtractor {
    async fn extract(&self, text: &str) -> Vec<CandidateEntity> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let prompt = format!("{PROMPT_PREAMBLE}{}", truncate_chars(text, MAX_PROMPT_CHARS));
        match self.generate(&prompt).await {
            Ok(reply) => parse_reply(&reply),
            Err(e) => {
                tracing::warn!(error = %e, model = %self.model, "Model extraction failed");
                Vec::new()
            }
        }
    }
}

/// Parse `Name | Type` lines, ignoring anything else the model wrote.
fn parse_reply(reply: &str) -> Vec<CandidateEntity> {
    let candidates = reply
        .lines()
        .filter_map(|line| {
            let (name, entity_type) = line.split_once('|')?;
            let name = name.trim().trim_start_matches(['-', '*']).trim();
            let entity_type = entity_type.split('|').next().unwrap_or_default().trim();
            if name.is_empty() || entity_type.is_empty() {
                return None;
            }
            Some(CandidateEntity::new(name, entity_type))
        })
        .collect();

    dedup_by_name(candidates)
}
