//! Helpers for normalizing model output before it is persisted.

use std::collections::HashSet;

/// Trim whitespace and drop empty strings.
pub(crate) fn sanitize_string(value: Option<String>) -> Option<String> {
    value.and_then(|input| {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Lower-case, hyphenate and dedupe tag values, dropping empties.
pub fn sanitize_tags(values: Vec<String>) -> Vec<String> {
    let mut unique = HashSet::new();
    let mut sanitized = Vec::new();

    for tag in values {
        let normalized = tag
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("-")
            .to_lowercase();
        if normalized.is_empty() {
            continue;
        }
        if unique.insert(normalized.clone()) {
            sanitized.push(normalized);
        }
    }
    sanitized
}

/// Trim and dedupe each list of key facts.
pub fn sanitize_values(values: Vec<String>) -> Vec<String> {
    let mut sanitized: Vec<String> = Vec::new();
    for value in values {
        if let Some(trimmed) = sanitize_string(Some(value))
            && !sanitized.contains(&trimmed)
        {
            sanitized.push(trimmed);
        }
    }
    sanitized
}

/// First `max_chars` characters of `text`, never splitting a character.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}
