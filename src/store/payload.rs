//! Helpers for hashing content and stamping new rows.

use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use uuid::Uuid;

/// Compute a deterministic SHA-256 hash for a piece of text.
pub fn compute_content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)
}

/// Current timestamp formatted for row storage.
pub fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Construct a primary key for a new row.
pub fn generate_record_id() -> String {
    Uuid::new_v4().to_string()
}
