//! Text extraction stage: OCR with a deterministic fallback.

use super::{
    rules::{DOCUMENT_RULES, DocumentRule, match_rule},
    types::{ExtractionFailure, ResultSource},
};
use crate::ocr::{OcrClient, OcrRequest};
use std::sync::Arc;

/// Confidence reported for text returned by the OCR service.
pub const LIVE_OCR_CONFIDENCE: u8 = 95;

const DEFAULT_LANGUAGE: &str = "en";

/// Unicode blocks of the Indic scripts we recognize, with the language reported for each.
const SCRIPT_RANGES: &[(char, char, &str)] = &[
    ('\u{0900}', '\u{097F}', "hi"),
    ('\u{0980}', '\u{09FF}', "bn"),
    ('\u{0A00}', '\u{0A7F}', "pa"),
    ('\u{0A80}', '\u{0AFF}', "gu"),
    ('\u{0B80}', '\u{0BFF}', "ta"),
    ('\u{0C00}', '\u{0C7F}', "te"),
    ('\u{0C80}', '\u{0CFF}', "kn"),
    ('\u{0D00}', '\u{0D7F}', "ml"),
];

/// Text recovered from a document.
#[derive(Debug)]
pub struct Extraction {
    /// Recognized or placeholder text, never blank.
    pub text: String,
    /// Confidence on a 0–100 scale.
    pub confidence: u8,
    /// ISO 639-1 code of the dominant language.
    pub language: String,
    /// Whether OCR or the fallback produced the text.
    pub source: ResultSource,
    /// Why the fallback was used.
    pub failure: Option<ExtractionFailure>,
}

/// Runs OCR and substitutes rule-based placeholder text when it cannot.
pub struct TextExtractor {
    client: Option<Arc<dyn OcrClient>>,
    language_hints: Vec<String>,
    fallback_confidence: u8,
    rules: &'static [DocumentRule],
}

impl TextExtractor {
    /// Build an extractor; without a client every extraction uses the fallback.
    pub fn new(
        client: Option<Arc<dyn OcrClient>>,
        language_hints: Vec<String>,
        fallback_confidence: u8,
    ) -> Self {
        Self {
            client,
            language_hints,
            fallback_confidence,
            rules: DOCUMENT_RULES,
        }
    }

    /// Replace the document rule table used for placeholder text.
    pub fn with_rules(mut self, rules: &'static [DocumentRule]) -> Self {
        self.rules = rules;
        self
    }

    /// Extract text from the document at `file_uri`.
    pub async fn extract(&self, file_uri: &str, file_name: &str) -> Extraction {
        match self.recognize(file_uri).await {
            Ok((text, page_languages)) => {
                let language = majority_language(&page_languages)
                    .unwrap_or_else(|| detect_script_language(&text).to_string());
                tracing::info!(
                    file_name,
                    language = %language,
                    characters = text.chars().count(),
                    "OCR extraction completed"
                );
                Extraction {
                    text,
                    confidence: LIVE_OCR_CONFIDENCE,
                    language,
                    source: ResultSource::Live,
                    failure: None,
                }
            }
            Err(failure) => {
                tracing::warn!(file_name, error = %failure, "OCR unavailable; using fallback text");
                let text = self.fallback_text(file_name);
                Extraction {
                    language: detect_script_language(&text).to_string(),
                    text,
                    confidence: self.fallback_confidence,
                    source: ResultSource::Fallback,
                    failure: Some(failure),
                }
            }
        }
    }

    async fn recognize(&self, file_uri: &str) -> Result<(String, Vec<String>), ExtractionFailure> {
        let client = self.client.as_ref().ok_or(ExtractionFailure::NotConfigured)?;
        let response = client
            .recognize(OcrRequest {
                image_or_doc_uri: file_uri.to_string(),
                language_hints: self.language_hints.clone(),
            })
            .await?;
        let text = response.text.trim();
        if text.is_empty() {
            return Err(ExtractionFailure::EmptyText);
        }
        Ok((text.to_string(), response.per_page_languages))
    }

    /// Deterministic placeholder text for `file_name`.
    pub fn fallback_text(&self, file_name: &str) -> String {
        let body = match_rule(self.rules, file_name, None)
            .map_or("DOCUMENT\n[text not extracted]", |rule| rule.sample_text);
        format!("{body}\nSource file: {file_name}")
    }
}

/// Most frequent page language; ties go to the language seen first.
fn majority_language(page_languages: &[String]) -> Option<String> {
    let mut tally: Vec<(String, usize)> = Vec::new();
    for language in page_languages {
        let code = language.trim().to_lowercase();
        if code.is_empty() {
            continue;
        }
        match tally.iter_mut().find(|(seen, _)| *seen == code) {
            Some((_, count)) => *count += 1,
            None => tally.push((code, 1)),
        }
    }

    let mut best: Option<(String, usize)> = None;
    for (code, count) in tally {
        if best.as_ref().is_none_or(|(_, top)| count > *top) {
            best = Some((code, count));
        }
    }
    best.map(|(code, _)| code)
}

/// Language implied by the dominant script; Latin text and unknown scripts report `en`.
pub fn detect_script_language(text: &str) -> &'static str {
    let mut counts = [0_usize; SCRIPT_RANGES.len()];
    let mut latin = 0_usize;
    for ch in text.chars() {
        if ch.is_ascii_alphabetic() {
            latin += 1;
        } else if let Some(index) = SCRIPT_RANGES
            .iter()
            .position(|(start, end, _)| (*start..=*end).contains(&ch))
        {
            counts[index] += 1;
        }
    }

    let mut best: Option<(usize, usize)> = None;
    for (index, count) in counts.into_iter().enumerate() {
        if count > 0 && best.is_none_or(|(_, top)| count > top) {
            best = Some((index, count));
        }
    }
    match best {
        Some((index, count)) if count >= latin => SCRIPT_RANGES[index].2,
        _ => DEFAULT_LANGUAGE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::{OcrClientError, OcrResponse};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct StubOcr {
        reply: Mutex<Option<Result<OcrResponse, OcrClientError>>>,
        requests: Mutex<Vec<OcrRequest>>,
    }

    impl StubOcr {
        fn new(reply: Result<OcrResponse, OcrClientError>) -> Arc<Self> {
            Arc::new(Self {
                reply: Mutex::new(Some(reply)),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl OcrClient for StubOcr {
        async fn recognize(&self, request: OcrRequest) -> Result<OcrResponse, OcrClientError> {
            self.requests.lock().expect("lock").push(request);
            self.reply
                .lock()
                .expect("lock")
                .take()
                .unwrap_or_else(|| Err(OcrClientError::ProviderUnavailable("drained".into())))
        }
    }

    fn hints() -> Vec<String> {
        vec!["en".into(), "hi".into()]
    }

    #[tokio::test]
    async fn live_text_uses_majority_page_language() {
        let stub = StubOcr::new(Ok(OcrResponse {
            text: "  Policy Number: 12345  ".into(),
            per_page_languages: vec!["en".into(), "hi".into(), "HI".into()],
        }));
        let extractor = TextExtractor::new(Some(stub.clone()), hints(), 85);

        let extraction = extractor.extract("https://files/doc.pdf", "doc.pdf").await;

        assert_eq!(extraction.text, "Policy Number: 12345");
        assert_eq!(extraction.confidence, LIVE_OCR_CONFIDENCE);
        assert_eq!(extraction.language, "hi");
        assert_eq!(extraction.source, ResultSource::Live);
        let requests = stub.requests.lock().expect("lock");
        assert_eq!(requests[0].image_or_doc_uri, "https://files/doc.pdf");
        assert_eq!(requests[0].language_hints, hints());
    }

    #[tokio::test]
    async fn blank_ocr_text_falls_back() {
        let stub = StubOcr::new(Ok(OcrResponse {
            text: "   ".into(),
            per_page_languages: vec![],
        }));
        let extractor = TextExtractor::new(Some(stub), hints(), 85);

        let extraction = extractor.extract("uri", "aadhaar_front.jpg").await;

        assert_eq!(extraction.source, ResultSource::Fallback);
        assert_eq!(extraction.confidence, 85);
        assert!(matches!(extraction.failure, Some(ExtractionFailure::EmptyText)));
        assert!(extraction.text.contains("Aadhaar"));
    }

    #[tokio::test]
    async fn service_errors_fall_back_deterministically() {
        let extractor = TextExtractor::new(
            Some(StubOcr::new(Err(OcrClientError::RecognitionFailed("500".into())))),
            hints(),
            70,
        );
        let first = extractor.extract("uri", "sbi_statement.pdf").await;
        let unconfigured = TextExtractor::new(None, hints(), 70);
        let second = unconfigured.extract("uri", "sbi_statement.pdf").await;

        assert_eq!(first.text, second.text);
        assert_eq!(first.confidence, 70);
        assert!(matches!(first.failure, Some(ExtractionFailure::Service(_))));
        assert!(matches!(second.failure, Some(ExtractionFailure::NotConfigured)));
        assert!(first.text.ends_with("Source file: sbi_statement.pdf"));
    }

    #[test]
    fn unknown_files_get_generic_placeholder() {
        let extractor = TextExtractor::new(None, hints(), 85);
        let text = extractor.fallback_text("IMG_0001.jpg");
        assert!(text.starts_with("DOCUMENT"));
    }

    #[test]
    fn script_detection_recognizes_indic_text() {
        assert_eq!(detect_script_language("आधार कार्ड"), "hi");
        assert_eq!(detect_script_language("ஆதார் அட்டை"), "ta");
        assert_eq!(detect_script_language("Account Statement"), "en");
        assert_eq!(detect_script_language("12345"), "en");
    }

    #[test]
    fn majority_language_ignores_blank_codes() {
        assert_eq!(majority_language(&["".into(), " ".into()]), None);
        assert_eq!(
            majority_language(&["ta".into(), "en".into()]),
            Some("ta".into())
        );
    }

    static RATION_CARD_RULES: &[DocumentRule] = &[DocumentRule {
        name: "ration-card",
        category: crate::store::Category::Identity,
        filename_markers: &["ration"],
        text_markers: &["public distribution system"],
        tags: &["ration card"],
        summary: "Ration card issued under the public distribution system.",
        sample_text: "RATION CARD\nPublic Distribution System\nCard No: [not extracted]",
    }];

    #[tokio::test]
    async fn custom_rule_table_drives_fallback_text() {
        let extractor = TextExtractor::new(None, hints(), 85).with_rules(RATION_CARD_RULES);

        let known = extractor.extract("uri", "ration_card.jpg").await;
        let unknown = extractor.extract("uri", "aadhaar_front.jpg").await;

        assert!(known.text.starts_with("RATION CARD\nPublic Distribution System"));
        assert!(known.text.ends_with("Source file: ration_card.jpg"));
        assert_eq!(
            unknown.text,
            "DOCUMENT\n[text not extracted]\nSource file: aadhaar_front.jpg"
        );
    }
}
