//! Action item construction.
//!
//! Turns a classified message plus tenant context into the structured
//! record that goes to the action log. Building never fails: unknown
//! tenant fields become the `unknown` sentinel.

use chrono::Utc;

use crate::error::PipelineError;
use crate::pipeline::policy::TriagePolicy;
use crate::pipeline::rules::KeywordSet;
use crate::pipeline::types::{
    ActionItem, InboundMessage, Priority, ReplyOrigin, RequestCategory, TenantSnapshot,
};
use crate::tenants::TenantContext;

/// Sentinel for tenant fields we could not resolve.
pub const UNKNOWN: &str = "unknown";

/// Status every new item starts in.
pub const OPEN_STATUS: &str = "open";

/// Default summary excerpt length, in characters.
pub const DEFAULT_SUMMARY_CHARS: usize = 80;

struct IssueMatcher {
    category: RequestCategory,
    issue: String,
    keywords: KeywordSet,
}

/// Builds `ActionItem`s from policy-driven keyword sets.
pub struct ActionItemBuilder {
    urgency: KeywordSet,
    locations: KeywordSet,
    issues: Vec<IssueMatcher>,
    summary_chars: usize,
}

impl ActionItemBuilder {
    pub fn new(policy: &TriagePolicy, summary_chars: usize) -> Result<Self, PipelineError> {
        let compile = |what: &str, keywords: &[String]| {
            KeywordSet::new(keywords)
                .map_err(|e| PipelineError::Policy(format!("{what} keywords: {e}")))
        };

        let issues = policy
            .issue_rules
            .iter()
            .map(|rule| -> Result<IssueMatcher, PipelineError> {
                Ok(IssueMatcher {
                    category: rule.category,
                    issue: rule.issue.clone(),
                    keywords: compile(&rule.issue, &rule.keywords)?,
                })
            })
            .collect::<Result<Vec<_>, PipelineError>>()?;

        Ok(Self {
            urgency: compile("urgency", &policy.urgency_keywords)?,
            locations: compile("location", &policy.locations)?,
            issues,
            summary_chars: summary_chars.max(1),
        })
    }

    /// Assemble the action item for one message.
    pub fn build(
        &self,
        message: &InboundMessage,
        category: RequestCategory,
        tenant: Option<&TenantContext>,
        reply_origin: ReplyOrigin,
    ) -> ActionItem {
        let text = message.classification_text();

        let issue = self
            .issues
            .iter()
            .filter(|m| m.category == category)
            .find(|m| m.keywords.is_match(&text))
            .map(|m| m.issue.clone());

        let priority = if self.urgency.is_match(&text) {
            Priority::High
        } else {
            Priority::Normal
        };

        ActionItem {
            message_id: message.id.clone(),
            category,
            tenant: snapshot(tenant),
            summary: self.summarize(category, message),
            created_at: Utc::now(),
            reply_origin,
            sender: message.sender.clone(),
            subject: message.subject.clone(),
            issue,
            location: self.locations.first_match(&text).map(str::to_string),
            priority,
            status: OPEN_STATUS.to_string(),
        }
    }

    /// `"<Category name>: <excerpt>"`, excerpt taken from the body (or the
    /// subject when the body is blank).
    fn summarize(&self, category: RequestCategory, message: &InboundMessage) -> String {
        let source = if message.body.trim().is_empty() {
            &message.subject
        } else {
            &message.body
        };
        let collapsed = source.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            return format!("{}: (no content)", category.display_name());
        }
        format!(
            "{}: {}",
            category.display_name(),
            truncate_chars(&collapsed, self.summary_chars)
        )
    }
}

fn snapshot(tenant: Option<&TenantContext>) -> TenantSnapshot {
    let known = |value: &str| {
        let v = value.trim();
        if v.is_empty() {
            UNKNOWN.to_string()
        } else {
            v.to_string()
        }
    };

    match tenant {
        Some(t) => TenantSnapshot {
            name: known(&t.name),
            unit: known(&t.unit),
            balance_due: t.balance_due,
        },
        None => TenantSnapshot {
            name: UNKNOWN.to_string(),
            unit: UNKNOWN.to_string(),
            balance_due: None,
        },
    }
}

/// Cut to `max` characters, marking the cut with `...`.
fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max).collect();
    format!("{}...", kept.trim_end())
}
