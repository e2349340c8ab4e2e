//! Reply generation: model first, templates as the safety net.
//!
//! The generative service is an untrusted upstream. Its output only reaches
//! a tenant after `validate_generated` accepts it; every call failure,
//! timeout or rejected output drops to the category template, which cannot
//! fail. A tenant always gets a non-empty reply.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::llm::provider::{ChatMessage, CompletionRequest, FinishReason, GenerativeTextService};
use crate::pipeline::types::{InboundMessage, ReplyDraft, ReplyOrigin, RequestCategory};
use crate::tenants::TenantContext;

/// Placeholder for tenant fields we do not have.
pub const ON_FILE: &str = "on file";

/// Greeting name when the tenant is unknown.
pub const UNKNOWN_GREETING: &str = "there";

const SIGN_OFF: &str = "- Property Management";

/// Markers of a template the model failed to fill in.
const DISALLOWED_TOKENS: &[&str] = &[
    "{name}",
    "{unit}",
    "{tenant",
    "{{",
    "}}",
    "[tenant name]",
    "[tenant's name]",
    "[your name]",
    "[name]",
    "[unit]",
    "[unit number]",
    "<placeholder>",
    "lorem ipsum",
];

/// Body text passed to the model is cut to this many characters.
const PROMPT_BODY_CHARS: usize = 2000;

/// Reply generation settings.
#[derive(Debug, Clone)]
pub struct ReplyConfig {
    /// Bound on one generative call.
    pub timeout: Duration,
    /// Longest generated reply we accept, in characters.
    pub max_reply_chars: usize,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            max_reply_chars: 2000,
            temperature: 0.7,
            max_tokens: 256,
        }
    }
}

// ── Validation ──────────────────────────────────────────────────────

/// Why generated text was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidReason {
    Empty,
    TooLong { length: usize, max: usize },
    DisallowedToken(String),
    ErrorPayload,
    Truncated,
}

impl std::fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "empty reply"),
            Self::TooLong { length, max } => write!(f, "reply too long ({length} > {max} chars)"),
            Self::DisallowedToken(token) => write!(f, "contains disallowed token {token:?}"),
            Self::ErrorPayload => write!(f, "reply is an error payload"),
            Self::Truncated => write!(f, "reply was cut off at the token limit"),
        }
    }
}

/// Outcome of checking generated text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Valid(String),
    Invalid(InvalidReason),
}

/// Decide whether generated text is fit to send to a tenant.
///
/// Accepts trimmed text that is non-empty, at most `max_chars` characters,
/// free of unfilled template markers, and not an error message.
pub fn validate_generated(text: &str, max_chars: usize) -> Validation {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Validation::Invalid(InvalidReason::Empty);
    }

    let length = trimmed.chars().count();
    if length > max_chars {
        return Validation::Invalid(InvalidReason::TooLong {
            length,
            max: max_chars,
        });
    }

    if is_error_payload(trimmed) {
        return Validation::Invalid(InvalidReason::ErrorPayload);
    }

    let lower = trimmed.to_lowercase();
    if let Some(token) = DISALLOWED_TOKENS.iter().find(|t| lower.contains(*t)) {
        return Validation::Invalid(InvalidReason::DisallowedToken((*token).to_string()));
    }

    Validation::Valid(trimmed.to_string())
}

/// Error text or a JSON error object passed through as content.
fn is_error_payload(text: &str) -> bool {
    let lower = text.to_lowercase();
    if lower.starts_with("error:") || lower.starts_with("error -") || lower.starts_with("exception:")
    {
        return true;
    }

    if text.starts_with('{')
        && let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(text)
    {
        return map.contains_key("error") || map.contains_key("errors");
    }

    false
}

// ── Generator ───────────────────────────────────────────────────────

/// Produces a reply for every message.
pub struct ReplyGenerator {
    service: Option<Arc<dyn GenerativeTextService>>,
    config: ReplyConfig,
}

impl ReplyGenerator {
    /// Pass `None` to disable the generative path entirely.
    pub fn new(service: Option<Arc<dyn GenerativeTextService>>, config: ReplyConfig) -> Self {
        Self { service, config }
    }

    /// Template-only generator.
    pub fn fallback_only() -> Self {
        Self::new(None, ReplyConfig::default())
    }

    /// Generate a reply, falling back to the category template on any
    /// service failure or unusable output.
    pub async fn generate(
        &self,
        category: RequestCategory,
        message: &InboundMessage,
        tenant: Option<&TenantContext>,
    ) -> ReplyDraft {
        if let Some(body) = self.try_generated(category, message, tenant).await {
            return ReplyDraft {
                body,
                origin: ReplyOrigin::Generated,
            };
        }

        ReplyDraft {
            body: render_fallback(category, tenant),
            origin: ReplyOrigin::Fallback,
        }
    }

    async fn try_generated(
        &self,
        category: RequestCategory,
        message: &InboundMessage,
        tenant: Option<&TenantContext>,
    ) -> Option<String> {
        let service = self.service.as_ref()?;

        let request = CompletionRequest::new(vec![
            ChatMessage::system(build_reply_system_prompt()),
            ChatMessage::user(build_reply_user_prompt(category, message, tenant)),
        ])
        .with_temperature(self.config.temperature)
        .with_max_tokens(self.config.max_tokens)
        .with_timeout(self.config.timeout);

        let response =
            match tokio::time::timeout(self.config.timeout, service.complete(request)).await {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => {
                    warn!(
                        id = %message.id,
                        category = "llm",
                        error = %e,
                        "Generative service failed, using fallback reply"
                    );
                    return None;
                }
                Err(_) => {
                    warn!(
                        id = %message.id,
                        category = "llm",
                        timeout = ?self.config.timeout,
                        "Generative service timed out, using fallback reply"
                    );
                    return None;
                }
            };

        if response.finish_reason == FinishReason::Length {
            warn!(
                id = %message.id,
                category = "llm",
                reason = %InvalidReason::Truncated,
                "Rejected generated reply, using fallback"
            );
            return None;
        }

        match validate_generated(&response.content, self.config.max_reply_chars) {
            Validation::Valid(text) => {
                info!(
                    id = %message.id,
                    model = service.model_name(),
                    chars = text.chars().count(),
                    input_tokens = response.input_tokens,
                    output_tokens = response.output_tokens,
                    "Generated reply accepted"
                );
                Some(text)
            }
            Validation::Invalid(reason) => {
                warn!(
                    id = %message.id,
                    category = "llm",
                    reason = %reason,
                    "Rejected generated reply, using fallback"
                );
                debug!(raw_response = %response.content, "Rejected generated text");
                None
            }
        }
    }
}

// ── Prompt construction ─────────────────────────────────────────────

fn build_reply_system_prompt() -> String {
    "You are a helpful and professional assistant who replies to tenant emails on behalf of \
     Property Management.\n\n\
     Rules:\n\
     - Reply in plain text, no markdown, no subject line\n\
     - Use the tenant info provided; never invent amounts or dates\n\
     - Never leave placeholders like [Tenant Name] in the reply\n\
     - Keep it short: 2-5 sentences\n\
     - Always sign off with: 'Property Management'"
        .to_string()
}

fn build_reply_user_prompt(
    category: RequestCategory,
    message: &InboundMessage,
    tenant: Option<&TenantContext>,
) -> String {
    let mut prompt = String::with_capacity(1024);

    prompt.push_str(&format!("Request category: {}\n\n", category.display_name()));

    match tenant {
        Some(t) => {
            prompt.push_str("Tenant Info:\n");
            prompt.push_str(&format!("- Name: {}\n", or_on_file(&t.name)));
            prompt.push_str(&format!("- Unit: {}\n", or_on_file(&t.unit)));
            match t.lease {
                Some(lease) => {
                    prompt.push_str(&format!("- Lease: {} to {}\n", lease.start, lease.end));
                }
                None => prompt.push_str(&format!("- Lease: {ON_FILE}\n")),
            }
            match t.balance_due {
                Some(balance) => {
                    prompt.push_str(&format!("- Balance Due: {}\n", format_balance(balance)));
                }
                None => prompt.push_str(&format!("- Balance Due: {ON_FILE}\n")),
            }
            if t.recent_maintenance.is_empty() {
                prompt.push_str("- Recent Requests: None\n");
            } else {
                let recent: Vec<String> = t
                    .recent_maintenance
                    .iter()
                    .take(5)
                    .map(|e| {
                        let status = serde_json::to_value(e.status)
                            .ok()
                            .and_then(|v| v.as_str().map(str::to_string))
                            .unwrap_or_default();
                        format!("{} ({}, {})", e.description, e.date, status)
                    })
                    .collect();
                prompt.push_str(&format!("- Recent Requests: {}\n", recent.join("; ")));
            }
        }
        None => {
            prompt.push_str("Tenant Info: sender is not in the tenant directory\n");
        }
    }

    prompt.push_str("\nTenant Message:\n");
    if !message.subject.trim().is_empty() {
        prompt.push_str(&format!("Subject: {}\n", message.subject.trim()));
    }
    let body: String = message.body.trim().chars().take(PROMPT_BODY_CHARS).collect();
    prompt.push_str(&body);
    prompt.push_str("\n\nReply (signed as Property Management):");

    prompt
}

// ── Fallback templates ──────────────────────────────────────────────

/// Tenant fields as they appear in templates, with sentinels filled in.
struct TemplateFields {
    name: String,
    unit: String,
    balance: String,
    lease_end: String,
}

impl TemplateFields {
    fn from_tenant(tenant: Option<&TenantContext>) -> Self {
        let Some(t) = tenant else {
            return Self {
                name: UNKNOWN_GREETING.to_string(),
                unit: format!("the unit {ON_FILE}"),
                balance: format!("the amount {ON_FILE}"),
                lease_end: format!("the date {ON_FILE}"),
            };
        };

        let name = t.name.trim();
        let unit = t.unit.trim();
        Self {
            name: if name.is_empty() {
                UNKNOWN_GREETING.to_string()
            } else {
                name.to_string()
            },
            unit: if unit.is_empty() {
                format!("the unit {ON_FILE}")
            } else {
                format!("Unit {unit}")
            },
            balance: t
                .balance_due
                .map(format_balance)
                .unwrap_or_else(|| format!("the amount {ON_FILE}")),
            lease_end: t
                .lease
                .map(|l| l.end.format("%B %-d, %Y").to_string())
                .unwrap_or_else(|| format!("the date {ON_FILE}")),
        }
    }
}

/// Render the deterministic reply for a category. Never fails and never
/// returns an empty string.
pub fn render_fallback(category: RequestCategory, tenant: Option<&TenantContext>) -> String {
    let f = TemplateFields::from_tenant(tenant);
    let middle = match category {
        RequestCategory::Maintenance => format!(
            "Thanks for reporting the maintenance issue in {}. We've logged a ticket and our \
             maintenance team will reach out shortly to schedule a visit. If this is an \
             emergency, such as active flooding, please call the management office right away.",
            f.unit
        ),
        RequestCategory::RentInquiry => format!(
            "Thanks for reaching out about your account for {}. Our records show a balance due \
             of {}, and your lease runs through {}. We'll confirm your payment status and follow \
             up with any updates.",
            f.unit, f.balance, f.lease_end
        ),
        RequestCategory::AccessRequest => format!(
            "We understand you need access to {}. If this is urgent, please contact building \
             security or call management directly. We can also coordinate access during regular \
             office hours.",
            f.unit
        ),
        RequestCategory::General => "Thanks for your message. A member of our team will follow \
             up with you shortly, including a call if you requested one."
            .to_string(),
        RequestCategory::Unclassified => "Thanks for contacting Property Management. We've \
             received your message and a member of our team will review it and get back to you \
             soon."
            .to_string(),
    };

    format!("Hi {},\n\n{}\n\n{}", f.name, middle, SIGN_OFF)
}

/// `$150.00`; credits render as `-$25.50`.
pub fn format_balance(balance: Decimal) -> String {
    let rounded = balance.round_dp(2);
    if rounded.is_sign_negative() && !rounded.is_zero() {
        format!("-${:.2}", rounded.abs())
    } else {
        format!("${:.2}", rounded.abs())
    }
}

fn or_on_file(value: &str) -> &str {
    let v = value.trim();
    if v.is_empty() { ON_FILE } else { v }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    use crate::error::LlmError;
    use crate::llm::provider::CompletionResponse;
    use crate::tenants::{LeaseTerm, MaintenanceEvent, MaintenanceStatus};

    fn tenant() -> TenantContext {
        TenantContext {
            name: "J. Doe".into(),
            unit: "4B".into(),
            lease: Some(LeaseTerm {
                start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                end: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
            }),
            balance_due: Some(dec!(0)),
            recent_maintenance: vec![MaintenanceEvent {
                date: NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
                description: "Dripping tap".into(),
                status: MaintenanceStatus::Completed,
            }],
        }
    }

    fn message(body: &str) -> InboundMessage {
        InboundMessage::new("jdoe@example.com", "Help", body).with_id("msg-1")
    }

    /// Mock service returning a fixed result.
    struct MockLlm {
        result: Result<String, ()>,
        finish_reason: FinishReason,
        delay: Option<Duration>,
    }

    impl MockLlm {
        fn ok(content: &str) -> Self {
            Self {
                result: Ok(content.to_string()),
                finish_reason: FinishReason::Stop,
                delay: None,
            }
        }

        fn failing() -> Self {
            Self {
                result: Err(()),
                finish_reason: FinishReason::Stop,
                delay: None,
            }
        }
    }

    #[async_trait]
    impl GenerativeTextService for MockLlm {
        fn model_name(&self) -> &str {
            "mock"
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match &self.result {
                Ok(content) => Ok(CompletionResponse {
                    content: content.clone(),
                    input_tokens: 10,
                    output_tokens: 10,
                    finish_reason: self.finish_reason,
                }),
                Err(()) => Err(LlmError::RequestFailed {
                    provider: "mock".into(),
                    reason: "connection refused".into(),
                }),
            }
        }
    }

    fn generator(llm: MockLlm) -> ReplyGenerator {
        ReplyGenerator::new(Some(Arc::new(llm)), ReplyConfig::default())
    }

    // ── Validation ──────────────────────────────────────────────────

    #[test]
    fn valid_text_is_trimmed() {
        assert_eq!(
            validate_generated("  Hi Jane, we're on it.\n", 100),
            Validation::Valid("Hi Jane, we're on it.".into())
        );
    }

    #[test]
    fn empty_and_whitespace_are_invalid() {
        assert_eq!(
            validate_generated("", 100),
            Validation::Invalid(InvalidReason::Empty)
        );
        assert_eq!(
            validate_generated(" \n\t ", 100),
            Validation::Invalid(InvalidReason::Empty)
        );
    }

    #[test]
    fn over_length_is_invalid() {
        let text = "a".repeat(101);
        assert_eq!(
            validate_generated(&text, 100),
            Validation::Invalid(InvalidReason::TooLong {
                length: 101,
                max: 100
            })
        );
        assert!(matches!(
            validate_generated(&"a".repeat(100), 100),
            Validation::Valid(_)
        ));
    }

    #[test]
    fn length_counts_chars_not_bytes() {
        let text = "é".repeat(100);
        assert!(matches!(validate_generated(&text, 100), Validation::Valid(_)));
    }

    #[test]
    fn placeholders_are_invalid() {
        for text in [
            "Hi [Tenant Name], we'll fix it.",
            "Hi {name}, thanks!",
            "Dear {{tenant}}",
            "Best, [Your Name]",
        ] {
            assert!(
                matches!(
                    validate_generated(text, 500),
                    Validation::Invalid(InvalidReason::DisallowedToken(_))
                ),
                "{text}"
            );
        }
    }

    #[test]
    fn error_payloads_are_invalid() {
        for text in [
            r#"{"error": {"message": "rate limited", "type": "rate_limit"}}"#,
            r#"{"errors": ["bad"]}"#,
            "Error: model overloaded",
            "ERROR - upstream unavailable",
        ] {
            assert_eq!(
                validate_generated(text, 500),
                Validation::Invalid(InvalidReason::ErrorPayload),
                "{text}"
            );
        }
    }

    #[test]
    fn prose_mentioning_errors_is_valid() {
        let text = "Hi Jane, sorry about the error on your statement. We'll correct it.";
        assert!(matches!(validate_generated(text, 500), Validation::Valid(_)));
    }

    // ── Generation paths ────────────────────────────────────────────

    #[tokio::test]
    async fn valid_generated_reply_is_used() {
        let g = generator(MockLlm::ok(
            "Hi J. Doe,\n\nWe'll send a plumber today.\n\nProperty Management",
        ));
        let t = tenant();
        let draft = g
            .generate(RequestCategory::Maintenance, &message("sink leak"), Some(&t))
            .await;
        assert_eq!(draft.origin, ReplyOrigin::Generated);
        assert!(draft.body.contains("plumber"));
    }

    #[tokio::test]
    async fn service_failure_falls_back_for_every_category() {
        let g = generator(MockLlm::failing());
        let t = tenant();
        for category in RequestCategory::ALL {
            for ctx in [Some(&t), None] {
                let draft = g.generate(category, &message("hello"), ctx).await;
                assert_eq!(draft.origin, ReplyOrigin::Fallback);
                assert!(!draft.body.trim().is_empty());
            }
        }
    }

    #[tokio::test]
    async fn invalid_output_falls_back() {
        let g = generator(MockLlm::ok("Hi [Tenant Name], we got it."));
        let draft = g
            .generate(RequestCategory::General, &message("call me"), None)
            .await;
        assert_eq!(draft.origin, ReplyOrigin::Fallback);
        assert!(!draft.body.contains("[Tenant Name]"));
    }

    #[tokio::test]
    async fn truncated_output_falls_back() {
        let mut llm = MockLlm::ok("Hi J. Doe, we will send some");
        llm.finish_reason = FinishReason::Length;
        let g = generator(llm);
        let draft = g
            .generate(RequestCategory::Maintenance, &message("leak"), None)
            .await;
        assert_eq!(draft.origin, ReplyOrigin::Fallback);
    }

    #[tokio::test]
    async fn timeout_falls_back() {
        let mut llm = MockLlm::ok("Hi, all good.");
        llm.delay = Some(Duration::from_secs(60));
        let g = ReplyGenerator::new(
            Some(Arc::new(llm)),
            ReplyConfig {
                timeout: Duration::from_millis(50),
                ..ReplyConfig::default()
            },
        );
        let draft = g
            .generate(RequestCategory::General, &message("hi"), None)
            .await;
        assert_eq!(draft.origin, ReplyOrigin::Fallback);
    }

    #[tokio::test]
    async fn disabled_service_uses_fallback() {
        let g = ReplyGenerator::fallback_only();
        let t = tenant();
        let draft = g
            .generate(
                RequestCategory::Maintenance,
                &message("My sink is leaking in unit 4B"),
                Some(&t),
            )
            .await;
        assert_eq!(draft.origin, ReplyOrigin::Fallback);
        assert!(draft.body.contains("Unit 4B"));
        assert!(draft.body.starts_with("Hi J. Doe,"));
    }

    // ── Templates ───────────────────────────────────────────────────

    #[test]
    fn every_category_has_a_template() {
        let t = tenant();
        for category in RequestCategory::ALL {
            let with = render_fallback(category, Some(&t));
            let without = render_fallback(category, None);
            assert!(with.ends_with(SIGN_OFF), "{category}");
            assert!(without.ends_with(SIGN_OFF), "{category}");
            assert!(!with.contains('{'), "{category}");
        }
    }

    #[test]
    fn absent_tenant_uses_sentinels() {
        let body = render_fallback(RequestCategory::RentInquiry, None);
        assert!(body.starts_with("Hi there,"));
        assert!(body.contains("the unit on file"));
        assert!(body.contains("the amount on file"));
        assert!(body.contains("the date on file"));
    }

    #[test]
    fn partially_known_tenant_uses_sentinels_for_gaps() {
        let t = TenantContext {
            name: "  ".into(),
            unit: "7".into(),
            lease: None,
            balance_due: None,
            recent_maintenance: vec![],
        };
        let body = render_fallback(RequestCategory::RentInquiry, Some(&t));
        assert!(body.starts_with("Hi there,"));
        assert!(body.contains("Unit 7"));
        assert!(body.contains("the amount on file"));
    }

    #[test]
    fn rent_template_interpolates_balance_and_lease() {
        let mut t = tenant();
        t.balance_due = Some(dec!(150));
        let body = render_fallback(RequestCategory::RentInquiry, Some(&t));
        assert!(body.contains("$150.00"));
        assert!(body.contains("December 31, 2024"));
    }

    #[test]
    fn balance_formatting() {
        assert_eq!(format_balance(dec!(0)), "$0.00");
        assert_eq!(format_balance(dec!(75.5)), "$75.50");
        assert_eq!(format_balance(dec!(-25.505)), "-$25.50");
        assert_eq!(format_balance(dec!(-0.001)), "$0.00");
    }

    // ── Prompt ──────────────────────────────────────────────────────

    #[test]
    fn prompt_includes_tenant_fields_and_message() {
        let t = tenant();
        let prompt =
            build_reply_user_prompt(RequestCategory::Maintenance, &message("Sink leaking"), Some(&t));
        assert!(prompt.contains("Maintenance request"));
        assert!(prompt.contains("- Name: J. Doe"));
        assert!(prompt.contains("- Unit: 4B"));
        assert!(prompt.contains("2024-01-01 to 2024-12-31"));
        assert!(prompt.contains("$0.00"));
        assert!(prompt.contains("Dripping tap (2024-03-05, completed)"));
        assert!(prompt.contains("Subject: Help"));
        assert!(prompt.contains("Sink leaking"));
    }

    #[test]
    fn prompt_for_unknown_sender() {
        let prompt = build_reply_user_prompt(RequestCategory::General, &message("hi"), None);
        assert!(prompt.contains("not in the tenant directory"));
    }

    #[test]
    fn prompt_truncates_long_body() {
        let long = "x".repeat(10_000);
        let prompt = build_reply_user_prompt(RequestCategory::General, &message(&long), None);
        assert!(prompt.len() < PROMPT_BODY_CHARS + 500);
    }

    #[test]
    fn system_prompt_demands_sign_off() {
        assert!(build_reply_system_prompt().contains("Property Management"));
    }
}
