//! Insight rules and expiry reminders.
//!
//! Each rule is a pure function of an [`InsightContext`] and yields at most one draft. Rules
//! run in [`INSIGHT_RULES`] order; new rules are appended so earlier ones keep producing the
//! same insights.

use super::{
    facts::{days_before, format_date},
    types::{InsightGenerationFailure, RiskAssessment},
};
use crate::store::{
    Category, DocumentFilter, DocumentStatus, DocumentStore, Insight, InsightType, Level,
    Reminder, generate_record_id,
};
use std::{collections::BTreeMap, sync::Arc};
use time::Date;

/// Categories every household vault is expected to hold.
pub const IMPORTANT_CATEGORIES: [Category; 4] = [
    Category::Identity,
    Category::Financial,
    Category::Insurance,
    Category::Medical,
];

/// Estimated yearly saving, in rupees, from reviewing an insurance policy.
pub const INSURANCE_REVIEW_SAVINGS: f64 = 15_000.0;

/// Inputs visible to insight rules.
#[derive(Debug)]
pub struct InsightContext<'a> {
    /// Document that triggered the run.
    pub document_id: &'a str,
    /// Its category.
    pub category: Category,
    /// Its risk assessment, if any.
    pub risk: Option<&'a RiskAssessment>,
    /// Count of the user's completed documents per category, the new document included.
    pub histogram: &'a BTreeMap<Category, usize>,
}

impl InsightContext<'_> {
    fn count(&self, category: Category) -> usize {
        self.histogram.get(&category).copied().unwrap_or(0)
    }
}

/// Insight content before it is assigned an id and owner.
#[derive(Debug, Clone, PartialEq)]
pub struct InsightDraft {
    /// Advisory category.
    pub insight_type: InsightType,
    /// Short headline.
    pub title: String,
    /// Body text.
    pub description: String,
    /// Display priority.
    pub priority: Level,
    /// Estimated savings in rupees.
    pub savings_potential: Option<f64>,
    /// Suggested next step.
    pub action_required: Option<String>,
    /// Documents the insight refers to.
    pub related_document_ids: Vec<String>,
}

impl InsightDraft {
    fn into_insight(self, user_id: &str) -> Insight {
        Insight {
            id: generate_record_id(),
            user_id: user_id.to_string(),
            insight_type: self.insight_type,
            title: self.title,
            description: self.description,
            priority: self.priority,
            savings_potential: self.savings_potential,
            action_required: self.action_required,
            related_document_ids: self.related_document_ids,
            acknowledged: false,
        }
    }
}

/// Signature shared by every insight rule.
pub type InsightRule = fn(&InsightContext<'_>) -> Option<InsightDraft>;

/// Rules in evaluation order.
pub const INSIGHT_RULES: &[InsightRule] =
    &[missing_important_categories, insurance_review, high_risk_document];

/// Compliance insight listing important categories with no documents.
pub fn missing_important_categories(context: &InsightContext<'_>) -> Option<InsightDraft> {
    let missing: Vec<&str> = IMPORTANT_CATEGORIES
        .into_iter()
        .filter(|category| context.count(*category) == 0)
        .map(Category::as_str)
        .collect();
    if missing.is_empty() {
        return None;
    }
    let names = missing.join(", ");
    Some(InsightDraft {
        insight_type: InsightType::Compliance,
        title: format!("Missing important documents: {names}"),
        description: format!(
            "Your vault has no {names} documents yet. Keeping them on file avoids delays when they are needed."
        ),
        priority: Level::Medium,
        savings_potential: None,
        action_required: Some(format!("Upload your {names} documents")),
        related_document_ids: Vec::new(),
    })
}

/// Opportunity insight suggesting a review of a newly added insurance policy.
pub fn insurance_review(context: &InsightContext<'_>) -> Option<InsightDraft> {
    (context.category == Category::Insurance).then(|| InsightDraft {
        insight_type: InsightType::Opportunity,
        title: "Review your insurance coverage".to_string(),
        description: "Comparing this policy with current plans could lower the premium or widen coverage at renewal."
            .to_string(),
        priority: Level::Medium,
        savings_potential: Some(INSURANCE_REVIEW_SAVINGS),
        action_required: Some("Compare renewal quotes before the policy renews".to_string()),
        related_document_ids: vec![context.document_id.to_string()],
    })
}

/// Security insight for documents assessed as high risk.
pub fn high_risk_document(context: &InsightContext<'_>) -> Option<InsightDraft> {
    let risk = context.risk.filter(|risk| risk.level == Level::High)?;
    let description = if risk.factors.is_empty() {
        "This document was assessed as high risk.".to_string()
    } else {
        format!(
            "This document was assessed as high risk: {}.",
            risk.factors.join("; ")
        )
    };
    Some(InsightDraft {
        insight_type: InsightType::Security,
        title: "High-risk document detected".to_string(),
        description,
        priority: Level::High,
        savings_potential: None,
        action_required: Some("Store the original securely and limit who it is shared with".to_string()),
        related_document_ids: vec![context.document_id.to_string()],
    })
}

/// Runs the insight rules for a newly classified document and stores their output.
pub struct InsightGenerator {
    store: Arc<dyn DocumentStore>,
    rules: &'static [InsightRule],
}

impl InsightGenerator {
    /// Build a generator using [`INSIGHT_RULES`].
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            rules: INSIGHT_RULES,
        }
    }

    /// Replace the rule list.
    pub fn with_rules(mut self, rules: &'static [InsightRule]) -> Self {
        self.rules = rules;
        self
    }

    /// Evaluate every rule and insert the resulting insights.
    pub async fn generate(
        &self,
        user_id: &str,
        document_id: &str,
        category: Category,
        risk: Option<&RiskAssessment>,
    ) -> Result<Vec<Insight>, InsightGenerationFailure> {
        let filter = DocumentFilter {
            status: Some(DocumentStatus::Completed),
            exclude_id: Some(document_id.to_string()),
            require_text: false,
        };
        let documents = self.store.list_documents(user_id, &filter).await?;

        let mut histogram = BTreeMap::new();
        for category in documents
            .iter()
            .filter_map(|document| document.category)
            .chain(std::iter::once(category))
        {
            *histogram.entry(category).or_insert(0) += 1;
        }

        let context = InsightContext {
            document_id,
            category,
            risk,
            histogram: &histogram,
        };
        let mut insights = Vec::new();
        for rule in self.rules {
            if let Some(draft) = rule(&context) {
                let insight = draft.into_insight(user_id);
                self.store.insert_insight(&insight).await?;
                insights.push(insight);
            }
        }

        tracing::info!(
            user_id,
            document_id,
            generated = insights.len(),
            "Insight generation finished"
        );
        Ok(insights)
    }
}

/// Auto-generated reminder firing `lead_days` before `expiry`.
pub fn reminder_for_expiry(
    user_id: &str,
    document_id: &str,
    file_name: &str,
    expiry: Date,
    lead_days: i64,
) -> Reminder {
    let expiry_label = format_date(expiry);
    Reminder {
        id: generate_record_id(),
        user_id: user_id.to_string(),
        related_document_id: Some(document_id.to_string()),
        title: format!("{file_name} expires on {expiry_label}"),
        description: format!("Renew or replace {file_name} before {expiry_label}."),
        reminder_date: format_date(days_before(expiry, lead_days)),
        urgency: Level::High,
        is_auto_generated: true,
        is_completed: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Document, InMemoryStore};
    use time::macros::date;

    async fn completed(store: &InMemoryStore, id: &str, category: Category) {
        let mut document = Document::new_upload(id, "user-1", "f.pdf", "f.pdf");
        document.status = DocumentStatus::Completed;
        document.category = Some(category);
        store.put_document(document).await;
    }

    #[tokio::test]
    async fn missing_medical_yields_one_compliance_insight() {
        let store = Arc::new(InMemoryStore::new());
        completed(&store, "id", Category::Identity).await;
        completed(&store, "bank", Category::Financial).await;
        completed(&store, "policy", Category::Insurance).await;
        let generator = InsightGenerator::new(store.clone());

        let insights = generator
            .generate("user-1", "new", Category::Tax, None)
            .await
            .expect("insights");

        let compliance: Vec<_> = insights
            .iter()
            .filter(|insight| insight.insight_type == InsightType::Compliance)
            .collect();
        assert_eq!(compliance.len(), 1);
        assert!(compliance[0].title.contains("Medical"));
        assert!(!compliance[0].title.contains("Identity"));
        assert_eq!(store.insights().await.len(), insights.len());
    }

    #[tokio::test]
    async fn new_document_counts_towards_the_histogram() {
        let store = Arc::new(InMemoryStore::new());
        completed(&store, "id", Category::Identity).await;
        completed(&store, "bank", Category::Financial).await;
        completed(&store, "policy", Category::Insurance).await;
        let generator = InsightGenerator::new(store);

        let insights = generator
            .generate("user-1", "new", Category::Medical, None)
            .await
            .expect("insights");

        assert!(insights.is_empty());
    }

    #[tokio::test]
    async fn insurance_and_high_risk_rules_reference_the_document() {
        let store = Arc::new(InMemoryStore::new());
        let generator = InsightGenerator::new(store);
        let risk = RiskAssessment {
            level: Level::High,
            factors: vec!["full policy number visible".into()],
        };

        let insights = generator
            .generate("user-1", "doc-9", Category::Insurance, Some(&risk))
            .await
            .expect("insights");

        let kinds: Vec<_> = insights.iter().map(|insight| insight.insight_type).collect();
        assert_eq!(
            kinds,
            vec![InsightType::Compliance, InsightType::Opportunity, InsightType::Security]
        );
        assert_eq!(insights[1].savings_potential, Some(INSURANCE_REVIEW_SAVINGS));
        assert_eq!(insights[1].related_document_ids, vec!["doc-9".to_string()]);
        assert!(insights[2].description.contains("full policy number visible"));
        assert!(insights.iter().all(|insight| !insight.acknowledged));
    }

    #[test]
    fn low_risk_produces_no_security_draft() {
        let histogram = BTreeMap::new();
        let risk = RiskAssessment {
            level: Level::Medium,
            factors: vec![],
        };
        let context = InsightContext {
            document_id: "doc",
            category: Category::Legal,
            risk: Some(&risk),
            histogram: &histogram,
        };
        assert!(high_risk_document(&context).is_none());
        assert!(insurance_review(&context).is_none());
    }

    #[test]
    fn reminder_fires_thirty_days_before_expiry() {
        let reminder = reminder_for_expiry("user-1", "doc-1", "passport.pdf", date!(2027 - 01 - 10), 30);
        assert_eq!(reminder.reminder_date, "2026-12-11");
        assert_eq!(reminder.urgency, Level::High);
        assert!(reminder.is_auto_generated);
        assert!(!reminder.is_completed);
        assert_eq!(reminder.related_document_id.as_deref(), Some("doc-1"));
    }

    fn vault_size(context: &InsightContext<'_>) -> Option<InsightDraft> {
        let total: usize = context.histogram.values().sum();
        (total >= 2).then(|| InsightDraft {
            insight_type: InsightType::Optimization,
            title: format!("{total} documents in your vault"),
            description: "Group related documents into folders.".into(),
            priority: Level::Low,
            savings_potential: None,
            action_required: None,
            related_document_ids: vec![context.document_id.to_string()],
        })
    }

    const VAULT_RULES: &[InsightRule] = &[vault_size];

    #[tokio::test]
    async fn custom_rule_list_replaces_the_defaults() {
        let store = Arc::new(InMemoryStore::new());
        completed(&store, "bank", Category::Financial).await;
        let generator = InsightGenerator::new(store.clone()).with_rules(VAULT_RULES);

        let insights = generator
            .generate("user-1", "policy", Category::Insurance, None)
            .await
            .expect("insights");

        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].insight_type, InsightType::Optimization);
        assert_eq!(insights[0].title, "2 documents in your vault");
        assert_eq!(store.insights().await, insights);
    }
}
