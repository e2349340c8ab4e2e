//! Shared types for the triage pipeline.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{ChannelError, StoreError};

// ── Inbound message ─────────────────────────────────────────────────

/// A tenant email fetched from the mailbox.
///
/// Immutable once fetched; the pipeline only ever borrows it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Message-ID header, or a generated UUID when the header is missing.
    pub id: String,
    /// Bare sender address (no display name).
    pub sender: String,
    /// Display name from the From header, if any.
    pub sender_name: Option<String>,
    /// Subject line (empty when absent).
    pub subject: String,
    /// Plain-text body with quoted history removed.
    pub body: String,
    /// When the message was received.
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    /// Build a message with a fresh id and the current timestamp.
    pub fn new(
        sender: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: format!("gen-{}", uuid::Uuid::new_v4()),
            sender: sender.into(),
            sender_name: None,
            subject: subject.into(),
            body: body.into(),
            received_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Text the classifier sees: subject line, newline, body.
    pub fn classification_text(&self) -> String {
        format!("{}\n{}", self.subject, self.body)
    }
}

// ── Category ────────────────────────────────────────────────────────

/// Request category assigned to every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestCategory {
    Maintenance,
    RentInquiry,
    AccessRequest,
    General,
    Unclassified,
}

impl RequestCategory {
    /// Every category, in declaration order.
    pub const ALL: [RequestCategory; 5] = [
        Self::Maintenance,
        Self::RentInquiry,
        Self::AccessRequest,
        Self::General,
        Self::Unclassified,
    ];

    /// Matching order used by the classifier. `Unclassified` is never
    /// matched; it is what remains.
    pub const PRIORITY: [RequestCategory; 4] = [
        Self::Maintenance,
        Self::AccessRequest,
        Self::RentInquiry,
        Self::General,
    ];

    /// Short label for logging and serialization.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Maintenance => "maintenance",
            Self::RentInquiry => "rent_inquiry",
            Self::AccessRequest => "access_request",
            Self::General => "general",
            Self::Unclassified => "unclassified",
        }
    }

    /// Human-readable name used in summaries.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Maintenance => "Maintenance request",
            Self::RentInquiry => "Rent inquiry",
            Self::AccessRequest => "Access request",
            Self::General => "General inquiry",
            Self::Unclassified => "Unclassified message",
        }
    }
}

impl std::fmt::Display for RequestCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ── Reply ───────────────────────────────────────────────────────────

/// Which path produced a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyOrigin {
    Generated,
    Fallback,
}

/// Reply text plus its origin. The body is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyDraft {
    pub body: String,
    pub origin: ReplyOrigin,
}

// ── Action item ─────────────────────────────────────────────────────

/// Urgency of an action item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    #[default]
    Normal,
    High,
}

/// Tenant fields captured at processing time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantSnapshot {
    pub name: String,
    pub unit: String,
    /// `None` when the tenant or balance is unknown.
    pub balance_due: Option<Decimal>,
}

/// Structured record of the work a tenant message implies.
///
/// Built once per message and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionItem {
    pub message_id: String,
    pub category: RequestCategory,
    pub tenant: TenantSnapshot,
    pub summary: String,
    pub created_at: DateTime<Utc>,
    pub reply_origin: ReplyOrigin,
    pub sender: String,
    pub subject: String,
    /// Finer-grained issue label (e.g. "plumbing leak").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<String>,
    /// Room mentioned in the message, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub priority: Priority,
    pub status: String,
}

// ── Routing ─────────────────────────────────────────────────────────

/// Where a reply goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// Primary recipient: always the original sender.
    pub to: String,
    /// Ordered, de-duplicated stakeholder addresses.
    pub cc: Vec<String>,
}

/// A fully assembled outbound reply, handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    pub to: String,
    pub cc: Vec<String>,
    pub subject: String,
    pub body: String,
    /// Message-ID of the message being answered.
    pub in_reply_to: Option<String>,
}

// ── Outcome ─────────────────────────────────────────────────────────

/// Terminal send state for one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "send_result", rename_all = "snake_case")]
pub enum SendResult {
    Sent {
        #[serde(rename = "send_attempts")]
        attempts: u32,
    },
    /// Retries exhausted, or zero attempts when the sender had no
    /// deliverable address.
    SendFailedAfterRetries {
        #[serde(rename = "send_attempts")]
        attempts: u32,
        last_error: String,
    },
}

impl SendResult {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Sent { .. } => "sent",
            Self::SendFailedAfterRetries { .. } => "send_failed_after_retries",
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Sent { attempts } | Self::SendFailedAfterRetries { attempts, .. } => *attempts,
        }
    }

    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent { .. })
    }
}

/// Per-message processing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageState {
    Fetched,
    Classified,
    Drafted,
    /// Action item built. It is written to the sink once the send resolves.
    Logged,
    Sent,
    SendFailedAfterRetries,
}

impl MessageState {
    /// Forward-only transitions.
    pub fn can_transition_to(&self, target: MessageState) -> bool {
        use MessageState::*;

        matches!(
            (self, target),
            (Fetched, Classified)
                | (Classified, Drafted)
                | (Drafted, Logged)
                | (Logged, Sent)
                | (Logged, SendFailedAfterRetries)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Sent | Self::SendFailedAfterRetries)
    }
}

/// Everything the dispatcher produced for one message.
#[derive(Debug, Clone)]
pub struct ProcessingOutcome {
    pub action_item: ActionItem,
    pub reply: ReplyDraft,
    pub routing: RoutingDecision,
    pub send_result: SendResult,
    /// States visited, in order.
    pub states: Vec<MessageState>,
    /// Whether the sink accepted the log entry.
    pub persisted: bool,
}

/// Record appended to the action log: the action item plus how the send ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionLogEntry {
    #[serde(flatten)]
    pub item: ActionItem,
    #[serde(flatten)]
    pub send: SendResult,
}

// ── Collaborator traits ─────────────────────────────────────────────

/// Source of unread tenant mail.
#[async_trait]
pub trait MailboxSource: Send + Sync {
    /// Mailbox name for logging.
    fn name(&self) -> &str;

    /// Fetch the currently-unread messages. Each call is one sweep.
    async fn fetch_unread(&self) -> Result<Vec<InboundMessage>, ChannelError>;
}

/// Outbound mail transport. One call is one attempt; retries live in the
/// dispatcher.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, email: &OutboundEmail) -> Result<(), ChannelError>;
}

/// Append-only destination for action items.
#[async_trait]
pub trait ActionItemSink: Send + Sync {
    async fn append(&self, entry: &ActionLogEntry) -> Result<(), StoreError>;
}
