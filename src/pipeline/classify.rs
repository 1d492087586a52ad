//! Content classification: structured LLM completion with a rule-based fallback.
//!
//! The model must answer with a single JSON object matching [`CLASSIFICATION_PROMPT`]. The
//! payload is parsed into a strict struct; an unknown category, an empty summary or any JSON
//! error discards it completely and the deterministic classifier runs instead, so partially
//! valid model output never reaches the document row.

use super::{
    facts::{detect_expiry, extract_key_facts, format_date, parse_date, primary_labelled_amount},
    rules::{DOCUMENT_RULES, DocumentRule, match_rule},
    sanitize::{sanitize_string, sanitize_tags, sanitize_values, truncate_chars},
    types::{ClassificationParseFailure, ExpiryInfo, ResultSource, RiskAssessment},
};
use crate::{
    completion::{CompletionClient, CompletionRequest},
    store::{Category, KeyFacts},
};
use serde::Deserialize;
use std::sync::Arc;
use time::Date;

/// System prompt pinning the completion's output schema.
pub const CLASSIFICATION_PROMPT: &str = r#"You classify personal documents from India.
Answer with one JSON object and nothing else, using exactly this schema:
{
  "category": "Identity" | "Financial" | "Insurance" | "Medical" | "Legal" | "Property" | "Education" | "Tax" | "Other",
  "summary": "one sentence describing the document",
  "keyFacts": {
    "dates": [string], "amounts": [string], "identifiers": [string],
    "names": [string], "addresses": [string]
  },
  "tags": [string],
  "expiryInfo": { "hasExpiry": boolean, "expiryDate": "YYYY-MM-DD" | null, "daysUntilExpiry": number | null },
  "riskAssessment": { "level": "low" | "medium" | "high", "factors": [string] },
  "confidence": number between 0 and 100
}
Mention important balances or amounts in the summary. Omit expiryInfo when the document does not expire."#;

/// Confidence reported by the rule-based classifier.
pub const FALLBACK_CLASSIFICATION_CONFIDENCE: u8 = 85;

const DEFAULT_LIVE_CONFIDENCE: u8 = 95;
const MIN_LIVE_CONFIDENCE: f64 = 90.0;
const MAX_LIVE_CONFIDENCE: f64 = 98.0;

/// Classification written back onto the document.
#[derive(Debug)]
pub struct Classification {
    /// Assigned category.
    pub category: Category,
    /// One-sentence summary.
    pub summary: String,
    /// Structured facts.
    pub key_facts: KeyFacts,
    /// At least one normalized tag.
    pub tags: Vec<String>,
    /// Expiry details when the document expires.
    pub expiry_info: Option<ExpiryInfo>,
    /// Risk assessment when the model produced one.
    pub risk_assessment: Option<RiskAssessment>,
    /// Confidence on a 0–100 scale.
    pub confidence: u8,
    /// Whether the model or the rules produced the result.
    pub source: ResultSource,
    /// Why the rules were used.
    pub failure: Option<ClassificationParseFailure>,
}

impl Classification {
    /// Parsed expiry date when the classification says the document expires.
    pub fn expiry_date(&self) -> Option<Date> {
        self.expiry_info
            .as_ref()
            .filter(|info| info.has_expiry)
            .and_then(|info| info.expiry_date.as_deref())
            .and_then(parse_date)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClassificationPayload {
    category: String,
    summary: String,
    #[serde(default)]
    key_facts: KeyFacts,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    expiry_info: Option<ExpiryInfo>,
    #[serde(default)]
    risk_assessment: Option<RiskAssessment>,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Classifies extracted text into a category, summary, facts and tags.
pub struct ContentClassifier {
    client: Option<Arc<dyn CompletionClient>>,
    max_chars: usize,
    rules: &'static [DocumentRule],
}

impl ContentClassifier {
    /// Build a classifier; without a client every call uses the rules.
    pub fn new(client: Option<Arc<dyn CompletionClient>>, max_chars: usize) -> Self {
        Self {
            client,
            max_chars,
            rules: DOCUMENT_RULES,
        }
    }

    /// Replace the document rule table used by the fallback.
    pub fn with_rules(mut self, rules: &'static [DocumentRule]) -> Self {
        self.rules = rules;
        self
    }

    /// Classify `text`, falling back to the rules on any completion failure.
    pub async fn classify(&self, text: &str, file_name: &str) -> Classification {
        match self.classify_live(text, file_name).await {
            Ok(classification) => {
                tracing::info!(
                    file_name,
                    category = %classification.category,
                    confidence = classification.confidence,
                    "Classification completed"
                );
                classification
            }
            Err(failure) => {
                tracing::warn!(file_name, error = %failure, "Classification degraded to rules");
                let mut classification = self.fallback(text, file_name);
                classification.failure = Some(failure);
                classification
            }
        }
    }

    async fn classify_live(
        &self,
        text: &str,
        file_name: &str,
    ) -> Result<Classification, ClassificationParseFailure> {
        let client = self
            .client
            .as_ref()
            .ok_or(ClassificationParseFailure::NotConfigured)?;
        let raw = client
            .complete(CompletionRequest {
                system_prompt: CLASSIFICATION_PROMPT.to_string(),
                document_text: truncate_chars(text, self.max_chars).to_string(),
                filename: file_name.to_string(),
            })
            .await?;
        parse_classification(&raw)
    }

    /// Deterministic classification from the rule table and regular expressions.
    pub fn fallback(&self, text: &str, file_name: &str) -> Classification {
        let rule = match_rule(self.rules, file_name, Some(text));
        let category = rule.map_or(Category::Other, |rule| rule.category);
        let base = rule.map_or("Uncategorized personal document.", |rule| rule.summary);
        let summary = match primary_labelled_amount(text) {
            Some(found) => format!(
                "{} with {} {}.",
                base.trim_end_matches('.'),
                found.label,
                found.amount
            ),
            None => base.to_string(),
        };
        let tags = match rule {
            Some(rule) => sanitize_tags(rule.tags.iter().map(|tag| tag.to_string()).collect()),
            None => vec![category.as_str().to_lowercase()],
        };
        let expiry_info = detect_expiry(text).map(|date| ExpiryInfo {
            has_expiry: true,
            expiry_date: Some(format_date(date)),
            days_until_expiry: None,
        });

        Classification {
            category,
            summary,
            key_facts: extract_key_facts(text),
            tags,
            expiry_info,
            risk_assessment: None,
            confidence: FALLBACK_CLASSIFICATION_CONFIDENCE,
            source: ResultSource::Fallback,
            failure: None,
        }
    }
}

/// Parse a raw completion into a live classification.
pub fn parse_classification(raw: &str) -> Result<Classification, ClassificationParseFailure> {
    let payload: ClassificationPayload = serde_json::from_str(strip_code_fences(raw))?;

    let category = Category::parse(&payload.category).ok_or_else(|| {
        ClassificationParseFailure::InvalidPayload(format!(
            "unknown category {:?}",
            payload.category
        ))
    })?;
    let summary = sanitize_string(Some(payload.summary)).ok_or_else(|| {
        ClassificationParseFailure::InvalidPayload("summary is empty".to_string())
    })?;
    let mut tags = sanitize_tags(payload.tags);
    if tags.is_empty() {
        tags.push(category.as_str().to_lowercase());
    }
    let key_facts = KeyFacts {
        dates: sanitize_values(payload.key_facts.dates),
        amounts: sanitize_values(payload.key_facts.amounts),
        identifiers: sanitize_values(payload.key_facts.identifiers),
        names: sanitize_values(payload.key_facts.names),
        addresses: sanitize_values(payload.key_facts.addresses),
    };

    Ok(Classification {
        category,
        summary,
        key_facts,
        tags,
        expiry_info: payload.expiry_info,
        risk_assessment: payload.risk_assessment,
        confidence: live_confidence(payload.confidence),
        source: ResultSource::Live,
        failure: None,
    })
}

/// Remove a surrounding Markdown code fence (```json ... ```), if any.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().trim_end_matches("```").trim()
}

/// Model confidence clamped into the live band; fractions are read as percentages.
fn live_confidence(value: Option<f64>) -> u8 {
    match value {
        Some(raw) if raw.is_finite() => {
            let percent = if raw <= 1.0 { raw * 100.0 } else { raw };
            percent.round().clamp(MIN_LIVE_CONFIDENCE, MAX_LIVE_CONFIDENCE) as u8
        }
        _ => DEFAULT_LIVE_CONFIDENCE,
    }
}
