//! Relationship detection by token-set similarity.
//!
//! Every run compares the new text against each of the user's other completed documents,
//! re-tokenizing all of them. That O(n) scan is fine for a personal vault; larger corpora
//! would need bucketing by shingle signature or a nearest-neighbour query over the stored
//! embeddings instead.

use super::types::RelationshipDetectionFailure;
use crate::store::{
    DocumentFilter, DocumentStore, Relationship, RelationshipType, generate_record_id,
};
use serde_json::json;
use std::{collections::HashSet, sync::Arc};

/// Jaccard similarity of the lower-cased whitespace token sets of `a` and `b`.
///
/// Two texts without any tokens score 0 rather than being treated as identical.
pub fn jaccard(a: &str, b: &str) -> f64 {
    let left = token_set(a);
    let right = token_set(b);
    let union = left.union(&right).count();
    if union == 0 {
        return 0.0;
    }
    left.intersection(&right).count() as f64 / union as f64
}

fn token_set(text: &str) -> HashSet<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

/// Relationship implied by `score`; both thresholds are exclusive lower bounds.
pub fn classify_similarity(
    score: f64,
    duplicate_threshold: f64,
    related_threshold: f64,
) -> Option<RelationshipType> {
    if score > duplicate_threshold {
        Some(RelationshipType::Duplicate)
    } else if score > related_threshold {
        Some(RelationshipType::Related)
    } else {
        None
    }
}

/// Records duplicate and related links between a new document and its peers.
pub struct RelationshipDetector {
    store: Arc<dyn DocumentStore>,
    duplicate_threshold: f64,
    related_threshold: f64,
}

impl RelationshipDetector {
    /// Build a detector with the given similarity thresholds.
    pub fn new(store: Arc<dyn DocumentStore>, duplicate_threshold: f64, related_threshold: f64) -> Self {
        Self {
            store,
            duplicate_threshold,
            related_threshold,
        }
    }

    /// Compare `text` against the user's other completed documents and store new links.
    ///
    /// Returns only the relationships inserted by this call.
    pub async fn detect(
        &self,
        document_id: &str,
        user_id: &str,
        text: &str,
    ) -> Result<Vec<Relationship>, RelationshipDetectionFailure> {
        let candidates = self
            .store
            .list_documents(user_id, &DocumentFilter::completed_peers_of(document_id))
            .await?;

        let mut recorded = Vec::new();
        for candidate in &candidates {
            let Some(candidate_text) = candidate.text() else {
                continue;
            };
            let score = jaccard(text, candidate_text);
            let Some(kind) =
                classify_similarity(score, self.duplicate_threshold, self.related_threshold)
            else {
                continue;
            };
            if self
                .store
                .relationship_exists(document_id, &candidate.id, kind)
                .await?
            {
                tracing::debug!(
                    document_id,
                    peer = %candidate.id,
                    kind = kind.as_str(),
                    "Relationship already recorded"
                );
                continue;
            }

            let relationship = Relationship {
                id: generate_record_id(),
                document_a_id: document_id.to_string(),
                document_b_id: candidate.id.clone(),
                relationship_type: kind,
                confidence_score: (score * 100.0).round() as u8,
                ai_detected: true,
                metadata: json!({ "method": "jaccard", "similarity": score }),
            };
            self.store.insert_relationship(&relationship).await?;
            recorded.push(relationship);
        }

        tracing::info!(
            document_id,
            candidates = candidates.len(),
            recorded = recorded.len(),
            "Relationship detection finished"
        );
        Ok(recorded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Document, DocumentStatus, InMemoryStore};

    fn words(range: std::ops::Range<usize>) -> String {
        range.map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    async fn completed(store: &InMemoryStore, id: &str, text: &str) {
        let mut document = Document::new_upload(id, "user-1", format!("{id}.pdf"), format!("{id}.pdf"));
        document.status = DocumentStatus::Completed;
        document.extracted_text = Some(text.to_string());
        store.put_document(document).await;
    }

    #[test]
    fn jaccard_is_symmetric_and_case_insensitive() {
        let a = "Policy Number 123 issued";
        let b = "policy number 456 ISSUED today";
        assert_eq!(jaccard(a, b), jaccard(b, a));
        assert!((jaccard(a, b) - 3.0 / 6.0).abs() < 1e-9);
        assert_eq!(jaccard("", "   "), 0.0);
        assert_eq!(jaccard("same text", "SAME text"), 1.0);
    }

    #[test]
    fn thresholds_are_exclusive() {
        assert_eq!(classify_similarity(0.92, 0.8, 0.5), Some(RelationshipType::Duplicate));
        assert_eq!(classify_similarity(0.8, 0.8, 0.5), Some(RelationshipType::Related));
        assert_eq!(classify_similarity(0.5, 0.8, 0.5), None);
        assert_eq!(classify_similarity(0.3, 0.8, 0.5), None);
    }

    #[tokio::test]
    async fn near_identical_documents_become_duplicates() {
        let store = Arc::new(InMemoryStore::new());
        // 23 shared tokens out of 25 in the union: 0.92.
        completed(&store, "old", &words(0..24)).await;
        let detector = RelationshipDetector::new(store.clone(), 0.8, 0.5);

        let text = format!("{} extra", words(1..24));
        let recorded = detector.detect("new", "user-1", &text).await.expect("detect");

        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].relationship_type, RelationshipType::Duplicate);
        assert_eq!(recorded[0].confidence_score, 92);
        assert_eq!(recorded[0].document_b_id, "old");
        assert!(recorded[0].ai_detected);
    }

    #[tokio::test]
    async fn low_similarity_records_nothing() {
        let store = Arc::new(InMemoryStore::new());
        // 3 shared tokens out of 10: 0.3.
        completed(&store, "old", &words(0..6)).await;
        let detector = RelationshipDetector::new(store.clone(), 0.8, 0.5);

        let recorded = detector
            .detect("new", "user-1", &words(3..10))
            .await
            .expect("detect");

        assert!(recorded.is_empty());
        assert!(store.relationships().await.is_empty());
    }

    #[tokio::test]
    async fn rerunning_detection_does_not_duplicate_rows() {
        let store = Arc::new(InMemoryStore::new());
        completed(&store, "old", "bank statement closing balance").await;
        let detector = RelationshipDetector::new(store.clone(), 0.8, 0.5);

        detector
            .detect("new", "user-1", "bank statement closing balance")
            .await
            .expect("first");
        let again = detector
            .detect("new", "user-1", "bank statement closing balance")
            .await
            .expect("second");

        assert!(again.is_empty());
        assert_eq!(store.relationships().await.len(), 1);
    }

    #[tokio::test]
    async fn other_users_and_unfinished_documents_are_ignored() {
        let store = Arc::new(InMemoryStore::new());
        let mut foreign = Document::new_upload("foreign", "user-2", "f.pdf", "f.pdf");
        foreign.status = DocumentStatus::Completed;
        foreign.extracted_text = Some("same words".into());
        store.put_document(foreign).await;
        let mut pending = Document::new_upload("pending", "user-1", "p.pdf", "p.pdf");
        pending.extracted_text = Some("same words".into());
        store.put_document(pending).await;
        let detector = RelationshipDetector::new(store.clone(), 0.8, 0.5);

        let recorded = detector.detect("new", "user-1", "same words").await.expect("detect");

        assert!(recorded.is_empty());
    }
}
