//! Table of known document types used by the fallback extractor and classifier.
//!
//! Adding a document type means appending a [`DocumentRule`]; neither stage branches on
//! specific names.

use crate::store::Category;

/// Markers and canned output for one recognizable document type.
#[derive(Debug)]
pub struct DocumentRule {
    /// Short identifier used in logs.
    pub name: &'static str,
    /// Category assigned when the rule wins.
    pub category: Category,
    /// Filename tokens that identify the type. Markers of four or more characters also match
    /// as token prefixes (`passport` matches `passport2024`).
    pub filename_markers: &'static [&'static str],
    /// Lower-case phrases searched for in the text as whole words.
    pub text_markers: &'static [&'static str],
    /// Tags attached by the fallback classifier.
    pub tags: &'static [&'static str],
    /// One-sentence summary used by the fallback classifier.
    pub summary: &'static str,
    /// Placeholder text used by the fallback extractor.
    pub sample_text: &'static str,
}

const FILENAME_WEIGHT: usize = 3;

/// Known document types, most specific first; ties go to the earlier entry.
pub const DOCUMENT_RULES: &[DocumentRule] = &[
    DocumentRule {
        name: "aadhaar",
        category: Category::Identity,
        filename_markers: &["aadhaar", "aadhar", "uidai"],
        text_markers: &["aadhaar", "unique identification authority", "uidai"],
        tags: &["identity", "aadhaar", "government-id"],
        summary: "Aadhaar identity card issued by UIDAI.",
        sample_text: "GOVERNMENT OF INDIA\nUnique Identification Authority of India\nAadhaar\nAadhaar No: XXXX XXXX XXXX",
    },
    DocumentRule {
        name: "pan",
        category: Category::Identity,
        filename_markers: &["pan", "pancard"],
        text_markers: &["permanent account number", "income tax department"],
        tags: &["identity", "pan", "tax-id"],
        summary: "PAN card issued by the Income Tax Department.",
        sample_text: "INCOME TAX DEPARTMENT\nGOVT. OF INDIA\nPermanent Account Number Card",
    },
    DocumentRule {
        name: "passport",
        category: Category::Identity,
        filename_markers: &["passport"],
        text_markers: &["passport", "nationality", "place of issue"],
        tags: &["identity", "passport", "travel"],
        summary: "Passport issued by the Republic of India.",
        sample_text: "REPUBLIC OF INDIA\nPassport\nNationality: INDIAN\nPlace of Issue: [not extracted]",
    },
    DocumentRule {
        name: "driving-licence",
        category: Category::Identity,
        filename_markers: &["dl", "licence", "license", "driving"],
        text_markers: &["driving licence", "driving license", "transport department"],
        tags: &["identity", "driving-licence", "transport"],
        summary: "Driving licence issued by a state transport department.",
        sample_text: "INDIAN UNION DRIVING LICENCE\nTransport Department\nValid Till: [not extracted]",
    },
    DocumentRule {
        name: "bank-statement",
        category: Category::Financial,
        filename_markers: &["statement", "bank", "passbook", "sbi", "hdfc", "icici"],
        text_markers: &["account statement", "closing balance", "opening balance", "ifsc", "bank"],
        tags: &["banking", "statement", "financial"],
        summary: "Bank account statement.",
        sample_text: "BANK ACCOUNT STATEMENT\nStatement period: [not extracted]\nOpening Balance: [not extracted]\nClosing Balance: [not extracted]",
    },
    DocumentRule {
        name: "salary-slip",
        category: Category::Financial,
        filename_markers: &["payslip", "salary", "pay"],
        text_markers: &["salary slip", "net pay", "gross earnings", "basic salary"],
        tags: &["salary", "income", "employment"],
        summary: "Salary slip listing earnings and deductions.",
        sample_text: "SALARY SLIP\nGross Earnings: [not extracted]\nNet Pay: [not extracted]",
    },
    DocumentRule {
        name: "insurance-policy",
        category: Category::Insurance,
        filename_markers: &["insurance", "policy", "mediclaim"],
        text_markers: &["policy number", "sum insured", "premium", "insurance", "insured"],
        tags: &["insurance", "policy"],
        summary: "Insurance policy document.",
        sample_text: "INSURANCE POLICY SCHEDULE\nPolicy Number: [not extracted]\nSum Insured: [not extracted]\nPremium: [not extracted]",
    },
    DocumentRule {
        name: "medical-record",
        category: Category::Medical,
        filename_markers: &["prescription", "medical", "lab", "hospital", "discharge"],
        text_markers: &["patient", "diagnosis", "prescription", "hospital", "dr."],
        tags: &["medical", "health"],
        summary: "Medical record from a healthcare provider.",
        sample_text: "MEDICAL RECORD\nPatient: [not extracted]\nDiagnosis: [not extracted]\nPrescription: [not extracted]",
    },
    DocumentRule {
        name: "tax-filing",
        category: Category::Tax,
        filename_markers: &["itr", "form16", "tax", "gst"],
        text_markers: &["income tax return", "assessment year", "form 16", "tds"],
        tags: &["tax", "income-tax"],
        summary: "Income tax filing.",
        sample_text: "INCOME TAX RETURN ACKNOWLEDGEMENT\nAssessment Year: [not extracted]",
    },
    DocumentRule {
        name: "property-record",
        category: Category::Property,
        filename_markers: &["deed", "property", "rent", "lease", "khata"],
        text_markers: &["sale deed", "property", "lessor", "tenant", "sub-registrar"],
        tags: &["property", "real-estate"],
        summary: "Property ownership or rental record.",
        sample_text: "SALE DEED\nProperty: [not extracted]\nSub-Registrar Office: [not extracted]",
    },
    DocumentRule {
        name: "education-record",
        category: Category::Education,
        filename_markers: &["certificate", "marksheet", "degree", "transcript"],
        text_markers: &["university", "marks obtained", "grade", "certificate"],
        tags: &["education", "certificate"],
        summary: "Educational certificate or transcript.",
        sample_text: "UNIVERSITY CERTIFICATE\nMarks Obtained: [not extracted]\nGrade: [not extracted]",
    },
    DocumentRule {
        name: "legal-document",
        category: Category::Legal,
        filename_markers: &["agreement", "contract", "affidavit", "court", "notice"],
        text_markers: &["agreement", "hereinafter", "affidavit", "court", "witness"],
        tags: &["legal", "contract"],
        summary: "Legal agreement or court document.",
        sample_text: "AGREEMENT\nThis agreement (hereinafter the \"Agreement\") is made between [not extracted]",
    },
];

/// Pick the best-matching rule for a filename and, when available, its text.
pub fn match_rule<'a>(
    rules: &'a [DocumentRule],
    file_name: &str,
    text: Option<&str>,
) -> Option<&'a DocumentRule> {
    let tokens = filename_tokens(file_name);
    let lowered = text.map(str::to_lowercase);

    let mut best: Option<(&DocumentRule, usize)> = None;
    for rule in rules {
        let filename_hits = rule
            .filename_markers
            .iter()
            .filter(|marker| tokens.iter().any(|token| token_matches(token, marker)))
            .count();
        let text_hits = lowered.as_deref().map_or(0, |body| {
            rule.text_markers
                .iter()
                .filter(|marker| contains_phrase(body, marker))
                .count()
        });
        let score = filename_hits * FILENAME_WEIGHT + text_hits;
        if score > 0 && best.is_none_or(|(_, top)| score > top) {
            best = Some((rule, score));
        }
    }

    if let Some((rule, score)) = best {
        tracing::debug!(rule = rule.name, score, file_name, "Matched document rule");
    }
    best.map(|(rule, _)| rule)
}

fn filename_tokens(file_name: &str) -> Vec<String> {
    let stem = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name)
        .to_lowercase();
    stem.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

fn token_matches(token: &str, marker: &str) -> bool {
    token == marker || (marker.len() >= 4 && token.starts_with(marker))
}

fn contains_phrase(body: &str, phrase: &str) -> bool {
    let boundary = |c: Option<char>| c.is_none_or(|c| !c.is_alphanumeric());
    body.match_indices(phrase).any(|(start, _)| {
        let end = start + phrase.len();
        let starts_word = !phrase.starts_with(char::is_alphanumeric)
            || boundary(body[..start].chars().next_back());
        let ends_word =
            !phrase.ends_with(char::is_alphanumeric) || boundary(body[end..].chars().next());
        starts_word && ends_word
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_markers_choose_the_rule() {
        let rule = match_rule(DOCUMENT_RULES, "scans/My_Aadhaar_Front.jpg", None).expect("rule");
        assert_eq!(rule.name, "aadhaar");
        let rule = match_rule(DOCUMENT_RULES, "pan-card.png", None).expect("rule");
        assert_eq!(rule.name, "pan");
    }

    #[test]
    fn short_markers_do_not_match_inside_words() {
        assert!(match_rule(DOCUMENT_RULES, "company_panel.pdf", None).is_none());
        assert!(match_rule(DOCUMENT_RULES, "download.pdf", None).is_none());
    }

    #[test]
    fn text_markers_classify_unhelpful_filenames() {
        let text = "STATE BANK OF INDIA Account Statement Closing Balance: ₹1,25,340";
        let rule = match_rule(DOCUMENT_RULES, "IMG_2041.jpg", Some(text)).expect("rule");
        assert_eq!(rule.category, Category::Financial);
        assert_eq!(rule.name, "bank-statement");
    }

    #[test]
    fn text_markers_match_whole_words_only() {
        let text = "Courtesy upgrade offered at the lounge; mtds and outstandings";
        assert!(match_rule(DOCUMENT_RULES, "IMG_2041.jpg", Some(text)).is_none());

        let rule = match_rule(DOCUMENT_RULES, "IMG_2041.jpg", Some("Final grade: A+"))
            .expect("rule");
        assert_eq!(rule.category, Category::Education);
        let rule = match_rule(DOCUMENT_RULES, "IMG_2041.jpg", Some("Seen by Dr.Mehta"))
            .expect("rule");
        assert_eq!(rule.category, Category::Medical);
    }

    #[test]
    fn filename_outweighs_a_single_text_marker() {
        let rule = match_rule(
            DOCUMENT_RULES,
            "health_insurance_policy.pdf",
            Some("Cashless hospital network list"),
        )
        .expect("rule");
        assert_eq!(rule.category, Category::Insurance);
    }

    #[test]
    fn every_sample_text_is_recognized_by_its_own_rule() {
        for rule in DOCUMENT_RULES {
            let matched = match_rule(DOCUMENT_RULES, "upload.bin", Some(rule.sample_text))
                .unwrap_or_else(|| panic!("{} sample text unmatched", rule.name));
            assert_eq!(matched.category, rule.category, "rule {}", rule.name);
        }
    }
}
