//! Regex-based key fact extraction used when the language model is unavailable.

use crate::store::KeyFacts;
use regex::Regex;
use std::sync::LazyLock;
use time::{Date, Duration, Month, macros::format_description};

static DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(\d{4}-\d{2}-\d{2}|\d{1,2}[/-]\d{1,2}[/-]\d{4}|\d{1,2} (?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]* \d{4})\b",
    )
    .expect("date regex")
});

static AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:₹|\brs\.?|\binr)\s?\d[\d,]*(?:\.\d{1,2})?").expect("amount regex")
});

static LABELLED_AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(closing balance|opening balance|available balance|net pay|sum insured|premium|total amount|amount due)\s*:?\s*((?:₹|rs\.?|inr)\s?\d[\d,]*(?:\.\d{1,2})?)",
    )
    .expect("labelled amount regex")
});

static PAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z]{5}\d{4}[A-Z]\b").expect("pan regex"));

static AADHAAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{4}\s\d{4}\s\d{4}\b").expect("aadhaar regex"));

static NUMBERED_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:policy|account|a/c)\s*(?:no\.?|number|#)\s*:?\s*([A-Z0-9/-]*\d[A-Z0-9/-]*)")
        .expect("numbered id regex")
});

static NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^\s*(?:name|account holder|insured|patient)(?: name)?\s*:\s*([A-Za-z][A-Za-z .]{1,60}?)\s*$")
        .expect("name regex")
});

static ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^\s*address\s*:\s*(.{5,160}?)\s*$").expect("address regex")
});

static EXPIRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:valid\s+(?:till|until|upto|up\s+to)|expiry\s+date|date\s+of\s+expiry|expires\s+on|expiry)\s*:?\s*(\d{4}-\d{2}-\d{2}|\d{1,2}[/-]\d{1,2}[/-]\d{4})",
    )
    .expect("expiry regex")
});

/// Amount preceded by a recognizable label, e.g. `Closing Balance: ₹1,25,340`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelledAmount {
    /// Lower-cased label.
    pub label: String,
    /// Amount as written, currency symbol included.
    pub amount: String,
}

/// Pull dates, amounts, identifiers, names and addresses out of raw text.
pub fn extract_key_facts(text: &str) -> KeyFacts {
    let mut identifiers = Vec::new();
    for found in PAN.find_iter(text).chain(AADHAAR.find_iter(text)) {
        push_unique(&mut identifiers, found.as_str());
    }
    for captures in NUMBERED_ID.captures_iter(text) {
        push_unique(&mut identifiers, &captures[1]);
    }

    KeyFacts {
        dates: collect_unique(DATE.captures_iter(text).map(|c| c[1].to_string())),
        amounts: collect_unique(AMOUNT.find_iter(text).map(|m| m.as_str().trim().to_string())),
        identifiers,
        names: collect_unique(NAME.captures_iter(text).map(|c| c[1].trim().to_string())),
        addresses: collect_unique(ADDRESS.captures_iter(text).map(|c| c[1].trim().to_string())),
    }
}

/// Labels in order of preference when a document carries several amounts.
const LABEL_PRIORITY: &[&str] = &[
    "closing balance",
    "net pay",
    "sum insured",
    "total amount",
    "amount due",
    "premium",
    "available balance",
    "opening balance",
];

/// Most significant labelled amount in the text; a closing balance beats an opening one.
pub fn primary_labelled_amount(text: &str) -> Option<LabelledAmount> {
    LABELLED_AMOUNT
        .captures_iter(text)
        .map(|captures| LabelledAmount {
            label: captures[1].to_lowercase(),
            amount: captures[2].trim().to_string(),
        })
        .min_by_key(|found| {
            LABEL_PRIORITY
                .iter()
                .position(|label| *label == found.label)
                .unwrap_or(LABEL_PRIORITY.len())
        })
}

/// Expiry date announced by phrases such as "Valid Till" or "Date of Expiry".
pub fn detect_expiry(text: &str) -> Option<Date> {
    EXPIRY
        .captures_iter(text)
        .find_map(|captures| parse_date(&captures[1]))
}

/// Parse `YYYY-MM-DD`, `DD/MM/YYYY` or `DD-MM-YYYY`.
pub fn parse_date(value: &str) -> Option<Date> {
    let parts: Vec<&str> = value.trim().split(['-', '/']).collect();
    let [first, second, third] = parts.as_slice() else {
        return None;
    };
    let (year, month, day) = if first.len() == 4 {
        (*first, *second, *third)
    } else {
        (*third, *second, *first)
    };
    let month = Month::try_from(month.parse::<u8>().ok()?).ok()?;
    Date::from_calendar_date(year.parse().ok()?, month, day.parse().ok()?).ok()
}

/// Format a date as `YYYY-MM-DD`.
pub fn format_date(date: Date) -> String {
    date.format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| date.to_string())
}

/// `date` moved back by `days`, saturating at the calendar minimum.
pub fn days_before(date: Date, days: i64) -> Date {
    date.checked_sub(Duration::days(days)).unwrap_or(Date::MIN)
}

fn push_unique(values: &mut Vec<String>, candidate: &str) {
    let candidate = candidate.trim();
    if !candidate.is_empty() && !values.iter().any(|existing| existing == candidate) {
        values.push(candidate.to_string());
    }
}

fn collect_unique(values: impl Iterator<Item = String>) -> Vec<String> {
    let mut unique = Vec::new();
    for value in values {
        push_unique(&mut unique, &value);
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    const STATEMENT: &str = "STATE BANK OF INDIA\nAccount Statement\nAccount Holder: Priya Sharma\nAccount No: 30012345678\nStatement Date: 31/03/2025\nOpening Balance: ₹98,200\nClosing Balance: ₹1,25,340";

    #[test]
    fn statement_facts_are_extracted() {
        let facts = extract_key_facts(STATEMENT);
        assert_eq!(facts.dates, vec!["31/03/2025"]);
        assert_eq!(facts.amounts, vec!["₹98,200", "₹1,25,340"]);
        assert_eq!(facts.identifiers, vec!["30012345678"]);
        assert_eq!(facts.names, vec!["Priya Sharma"]);
    }

    #[test]
    fn labelled_amount_prefers_closing_balance() {
        let found = primary_labelled_amount(STATEMENT).expect("amount");
        assert_eq!(found.label, "closing balance");
        assert_eq!(found.amount, "₹1,25,340");
        assert!(primary_labelled_amount("nothing to see").is_none());
    }

    #[test]
    fn identity_numbers_are_recognized() {
        let facts = extract_key_facts("PAN ABCDE1234F issued. Aadhaar 1234 5678 9012");
        assert!(facts.identifiers.contains(&"ABCDE1234F".to_string()));
        assert!(facts.identifiers.contains(&"1234 5678 9012".to_string()));
    }

    #[test]
    fn expiry_phrases_are_parsed_in_both_orders() {
        assert_eq!(
            detect_expiry("Policy Valid Till: 15/08/2026"),
            Some(date!(2026 - 08 - 15))
        );
        assert_eq!(
            detect_expiry("Date of Expiry 2031-01-09"),
            Some(date!(2031 - 01 - 09))
        );
        assert_eq!(detect_expiry("no dates here"), None);
    }

    #[test]
    fn invalid_dates_are_rejected() {
        assert_eq!(parse_date("31/02/2025"), None);
        assert_eq!(parse_date("2025-13-01"), None);
        assert_eq!(parse_date("soon"), None);
    }

    #[test]
    fn reminder_offsets_cross_month_boundaries() {
        let expiry = date!(2026 - 03 - 15);
        assert_eq!(format_date(days_before(expiry, 30)), "2026-02-13");
    }
}
