//! Resolution of stored file references into URIs the OCR service can fetch.

use crate::store::types::StoreError;

/// Turns the `file_ref` recorded on a document into a fetchable URI.
pub trait FileResolver: Send + Sync {
    /// Resolve `file_ref` to an absolute URI.
    fn resolve(&self, file_ref: &str) -> Result<String, StoreError>;
}

/// Maps storage object paths onto public object URLs of a Supabase-style bucket.
///
/// Absolute `http(s)` references are passed through untouched.
#[derive(Debug, Clone)]
pub struct PublicUrlResolver {
    base_url: String,
    bucket: String,
}

impl PublicUrlResolver {
    /// Build a resolver for `bucket` served from `base_url`.
    pub fn new(base_url: &str, bucket: &str) -> Result<Self, StoreError> {
        let parsed = reqwest::Url::parse(base_url)
            .map_err(|err| StoreError::InvalidUrl(format!("{base_url}: {err}")))?;
        Ok(Self {
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            bucket: bucket.trim_matches('/').to_string(),
        })
    }
}

impl FileResolver for PublicUrlResolver {
    fn resolve(&self, file_ref: &str) -> Result<String, StoreError> {
        let trimmed = file_ref.trim();
        if trimmed.is_empty() {
            return Err(StoreError::UnresolvableFile(
                "document has no file reference".into(),
            ));
        }
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            return Ok(trimmed.to_string());
        }

        let object_path = trimmed
            .trim_start_matches('/')
            .strip_prefix(&format!("{}/", self.bucket))
            .unwrap_or(trimmed.trim_start_matches('/'));
        Ok(format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.bucket, object_path
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> PublicUrlResolver {
        PublicUrlResolver::new("https://vault.example.co/", "documents").expect("resolver")
    }

    #[test]
    fn object_paths_map_to_public_urls() {
        assert_eq!(
            resolver().resolve("user-1/pan.jpg").expect("uri"),
            "https://vault.example.co/storage/v1/object/public/documents/user-1/pan.jpg"
        );
        assert_eq!(
            resolver().resolve("/documents/user-1/pan.jpg").expect("uri"),
            "https://vault.example.co/storage/v1/object/public/documents/user-1/pan.jpg"
        );
    }

    #[test]
    fn absolute_urls_pass_through() {
        let url = "https://cdn.example.org/scan.png";
        assert_eq!(resolver().resolve(url).expect("uri"), url);
    }

    #[test]
    fn blank_references_are_rejected() {
        assert!(matches!(
            resolver().resolve("  "),
            Err(StoreError::UnresolvableFile(_))
        ));
    }
}
