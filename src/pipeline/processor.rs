//! Dispatcher: drives each tenant message through the pipeline.
//!
//! Flow per message:
//! 1. Tenant lookup (absent tenant is fine)
//! 2. Classify (never fails)
//! 3. Generate reply (falls back to templates, never fails)
//! 4. Build action item (state `Logged`: the record exists, unwritten)
//! 5. Resolve routing, send with bounded retry (terminal state)
//! 6. Append the action item plus send outcome to the sink
//!
//! The sink append happens after the terminal state so the written record
//! carries the send outcome. A message without a deliverable sender is
//! recorded as failed with zero attempts and never reaches the transport.
//!
//! Nothing in the per-message path returns an error. Every failure is
//! logged with its category and recovered from in place, so one bad
//! message never aborts a cycle.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::error::PipelineError;
use crate::pipeline::action_item::{ActionItemBuilder, DEFAULT_SUMMARY_CHARS};
use crate::pipeline::policy::TriagePolicy;
use crate::pipeline::reply::ReplyGenerator;
use crate::pipeline::retry::{RetryPolicy, Sleeper, TokioSleeper};
use crate::pipeline::routing::RoutingResolver;
use crate::pipeline::rules::Classifier;
use crate::pipeline::types::{
    ActionItem, ActionItemSink, ActionLogEntry, InboundMessage, MailboxSource, MessageState,
    OutboundEmail, ProcessingOutcome, ReplyOrigin, SendResult, Transport,
};
use crate::store::SendFailureLog;
use crate::tenants::TenantDirectory;

/// Prefix for generated message ids; these never go into `In-Reply-To`.
const GENERATED_ID_PREFIX: &str = "gen-";

/// Dispatcher tuning.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub retry: RetryPolicy,
    pub summary_chars: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            summary_chars: DEFAULT_SUMMARY_CHARS,
        }
    }
}

/// Totals for one inbox sweep.
#[derive(Debug, Default)]
pub struct CycleReport {
    pub fetched: usize,
    pub sent: usize,
    pub send_failed: usize,
    pub generated_replies: usize,
    pub fallback_replies: usize,
    pub persist_failures: usize,
    pub outcomes: Vec<ProcessingOutcome>,
}

impl CycleReport {
    pub fn processed(&self) -> usize {
        self.outcomes.len()
    }

    fn record(&mut self, outcome: ProcessingOutcome) {
        if outcome.send_result.is_sent() {
            self.sent += 1;
        } else {
            self.send_failed += 1;
        }
        match outcome.reply.origin {
            ReplyOrigin::Generated => self.generated_replies += 1,
            ReplyOrigin::Fallback => self.fallback_replies += 1,
        }
        if !outcome.persisted {
            self.persist_failures += 1;
        }
        self.outcomes.push(outcome);
    }
}

/// Forward-only record of the states a message visits.
struct StateTrace {
    states: Vec<MessageState>,
}

impl StateTrace {
    fn new() -> Self {
        Self {
            states: vec![MessageState::Fetched],
        }
    }

    fn advance(&mut self, next: MessageState) {
        debug_assert!(
            self.states
                .last()
                .is_some_and(|last| last.can_transition_to(next)),
            "illegal transition to {next:?}"
        );
        self.states.push(next);
    }

    fn finish(self) -> Vec<MessageState> {
        debug_assert!(
            self.states.last().is_some_and(MessageState::is_terminal),
            "message left in non-terminal state {:?}",
            self.states.last()
        );
        self.states
    }
}

/// Orchestrates classification, reply generation, routing and delivery.
pub struct Dispatcher {
    tenants: Arc<dyn TenantDirectory>,
    classifier: Classifier,
    replies: ReplyGenerator,
    items: ActionItemBuilder,
    routing: RoutingResolver,
    transport: Arc<dyn Transport>,
    sink: Arc<dyn ActionItemSink>,
    failure_log: Option<SendFailureLog>,
    sleeper: Arc<dyn Sleeper>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(
        policy: &TriagePolicy,
        config: DispatcherConfig,
        tenants: Arc<dyn TenantDirectory>,
        replies: ReplyGenerator,
        transport: Arc<dyn Transport>,
        sink: Arc<dyn ActionItemSink>,
    ) -> Result<Self, PipelineError> {
        Ok(Self {
            tenants,
            classifier: Classifier::new(policy)?,
            replies,
            items: ActionItemBuilder::new(policy, config.summary_chars)?,
            routing: RoutingResolver::new(policy),
            transport,
            sink,
            failure_log: None,
            sleeper: Arc::new(TokioSleeper),
            config,
        })
    }

    /// Replace the real-time sleeper used between send attempts.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Record undeliverable replies to a JSON-lines file.
    pub fn with_failure_log(mut self, log: SendFailureLog) -> Self {
        self.failure_log = Some(log);
        self
    }

    /// Process one message to a terminal state.
    pub async fn process(&self, message: &InboundMessage) -> ProcessingOutcome {
        info!(
            id = %message.id,
            sender = %message.sender,
            "Processing tenant message"
        );
        let mut trace = StateTrace::new();

        let tenant = self.tenants.lookup(&message.sender);
        if tenant.is_none() {
            debug!(id = %message.id, sender = %message.sender, "Sender not in tenant directory");
        }

        let category = self.classifier.classify(message);
        trace.advance(MessageState::Classified);

        let reply = self
            .replies
            .generate(category, message, tenant.as_ref())
            .await;
        trace.advance(MessageState::Drafted);

        let action_item = self
            .items
            .build(message, category, tenant.as_ref(), reply.origin);
        trace.advance(MessageState::Logged);

        let routing = self.routing.resolve(category, &message.sender);
        let email = OutboundEmail {
            to: routing.to.clone(),
            cc: routing.cc.clone(),
            subject: reply_subject(&message.subject),
            body: reply.body.clone(),
            in_reply_to: in_reply_to(&message.id),
        };

        let send_result = if is_deliverable(&email.to) {
            self.send_with_retry(&message.id, &email).await
        } else {
            warn!(
                id = %message.id,
                sender = %message.sender,
                category = "transport",
                "No deliverable sender address, recording without reply"
            );
            SendResult::SendFailedAfterRetries {
                attempts: 0,
                last_error: format!("no deliverable sender address: {}", email.to),
            }
        };
        trace.advance(if send_result.is_sent() {
            MessageState::Sent
        } else {
            MessageState::SendFailedAfterRetries
        });

        let persisted = self.persist(&action_item, &send_result).await;

        info!(
            id = %message.id,
            category = %category,
            reply_origin = ?reply.origin,
            send_result = send_result.label(),
            attempts = send_result.attempts(),
            cc = routing.cc.len(),
            "Tenant message processed"
        );

        ProcessingOutcome {
            action_item,
            reply,
            routing,
            send_result,
            states: trace.finish(),
            persisted,
        }
    }

    /// One inbox sweep: fetch unread mail once, process sequentially.
    ///
    /// Only a failed fetch is an error; per-message problems are absorbed
    /// into the report.
    pub async fn run_cycle(
        &self,
        mailbox: &dyn MailboxSource,
    ) -> Result<CycleReport, PipelineError> {
        let messages = mailbox.fetch_unread().await.map_err(|e| {
            error!(mailbox = mailbox.name(), category = "mailbox", error = %e, "Mailbox fetch failed");
            PipelineError::Fetch(e)
        })?;

        let mut report = CycleReport {
            fetched: messages.len(),
            ..CycleReport::default()
        };
        if messages.is_empty() {
            info!(mailbox = mailbox.name(), "No unread tenant messages");
            return Ok(report);
        }

        info!(
            mailbox = mailbox.name(),
            fetched = report.fetched,
            "Processing tenant messages"
        );

        // The mailbox has already marked these read, so every one of them
        // must reach a terminal state in this cycle.
        for message in &messages {
            let outcome = self.process(message).await;
            report.record(outcome);
        }

        info!(
            processed = report.processed(),
            sent = report.sent,
            send_failed = report.send_failed,
            fallback = report.fallback_replies,
            "Cycle complete"
        );
        Ok(report)
    }

    async fn send_with_retry(&self, message_id: &str, email: &OutboundEmail) -> SendResult {
        let max_attempts = self.config.retry.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            match self.transport.send(email).await {
                Ok(()) => {
                    debug!(id = %message_id, attempt, to = %email.to, "Reply sent");
                    return SendResult::Sent { attempts: attempt };
                }
                Err(e) => {
                    warn!(
                        id = %message_id,
                        attempt,
                        max_attempts,
                        category = "transport",
                        error = %e,
                        "Reply send attempt failed"
                    );
                    last_error = e.to_string();
                    if attempt < max_attempts {
                        self.sleeper.sleep(self.config.retry.delay_for(attempt)).await;
                    }
                }
            }
        }

        error!(
            id = %message_id,
            attempts = max_attempts,
            category = "transport",
            error = %last_error,
            "Giving up on reply after retries"
        );

        if let Some(log) = &self.failure_log
            && let Err(e) = log
                .record(message_id, email, max_attempts, &last_error)
                .await
        {
            warn!(id = %message_id, category = "persistence", error = %e, "Failed to write send-failure log");
        }

        SendResult::SendFailedAfterRetries {
            attempts: max_attempts,
            last_error,
        }
    }

    async fn persist(&self, item: &ActionItem, send: &SendResult) -> bool {
        let entry = ActionLogEntry {
            item: item.clone(),
            send: send.clone(),
        };
        match self.sink.append(&entry).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    id = %item.message_id,
                    category = "persistence",
                    error = %e,
                    "Failed to append action item"
                );
                false
            }
        }
    }
}

/// `Re: <subject>`, without stacking prefixes.
pub fn reply_subject(subject: &str) -> String {
    let trimmed = subject.trim();
    if trimmed.is_empty() {
        return "Re: Your message".to_string();
    }
    let already = trimmed
        .get(..3)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("re:"));
    if already {
        trimmed.to_string()
    } else {
        format!("Re: {trimmed}")
    }
}

fn is_deliverable(address: &str) -> bool {
    address
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && !domain.is_empty())
}

fn in_reply_to(message_id: &str) -> Option<String> {
    if message_id.is_empty() || message_id.starts_with(GENERATED_ID_PREFIX) {
        None
    } else {
        Some(message_id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    use crate::error::{ChannelError, StoreError};
    use crate::pipeline::retry::Backoff;
    use crate::pipeline::types::RequestCategory;
    use crate::tenants::{StaticTenantDirectory, TenantContext};

    /// Fails the first `failures` attempts, then succeeds.
    struct FlakyTransport {
        failures: u32,
        calls: AtomicU32,
        sent: Mutex<Vec<OutboundEmail>>,
    }

    impl FlakyTransport {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Transport for FlakyTransport {
        async fn send(&self, email: &OutboundEmail) -> Result<(), ChannelError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                return Err(ChannelError::SendFailed {
                    name: "mock".into(),
                    reason: format!("attempt {call} refused"),
                });
            }
            self.sent.lock().unwrap().push(email.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemorySink {
        entries: Mutex<Vec<ActionLogEntry>>,
        fail: bool,
    }

    #[async_trait]
    impl ActionItemSink for MemorySink {
        async fn append(&self, entry: &ActionLogEntry) -> Result<(), StoreError> {
            if self.fail {
                return Err(StoreError::Rejected("disk full".into()));
            }
            self.entries.lock().unwrap().push(entry.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingSleeper {
        sleeps: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.sleeps.lock().unwrap().push(duration);
        }
    }

    struct StaticMailbox {
        messages: Vec<InboundMessage>,
    }

    #[async_trait]
    impl MailboxSource for StaticMailbox {
        fn name(&self) -> &str {
            "static"
        }

        async fn fetch_unread(&self) -> Result<Vec<InboundMessage>, ChannelError> {
            Ok(self.messages.clone())
        }
    }

    struct BrokenMailbox;

    #[async_trait]
    impl MailboxSource for BrokenMailbox {
        fn name(&self) -> &str {
            "broken"
        }

        async fn fetch_unread(&self) -> Result<Vec<InboundMessage>, ChannelError> {
            Err(ChannelError::FetchFailed {
                name: "broken".into(),
                reason: "login rejected".into(),
            })
        }
    }

    fn directory() -> Arc<dyn TenantDirectory> {
        let mut tenants = HashMap::new();
        tenants.insert(
            "jdoe@example.com".to_string(),
            TenantContext {
                name: "J. Doe".into(),
                unit: "4B".into(),
                lease: None,
                balance_due: Some(dec!(0)),
                recent_maintenance: vec![],
            },
        );
        Arc::new(StaticTenantDirectory::new(tenants))
    }

    struct Harness {
        dispatcher: Dispatcher,
        transport: Arc<FlakyTransport>,
        sink: Arc<MemorySink>,
        sleeper: Arc<RecordingSleeper>,
    }

    fn harness(failures: u32, config: DispatcherConfig) -> Harness {
        let transport = Arc::new(FlakyTransport::new(failures));
        let sink = Arc::new(MemorySink::default());
        let sleeper = Arc::new(RecordingSleeper::default());
        let dispatcher = Dispatcher::new(
            &TriagePolicy::default(),
            config,
            directory(),
            ReplyGenerator::fallback_only(),
            transport.clone(),
            sink.clone(),
        )
        .unwrap()
        .with_sleeper(sleeper.clone());
        Harness {
            dispatcher,
            transport,
            sink,
            sleeper,
        }
    }

    fn sink_message() -> InboundMessage {
        InboundMessage::new("jdoe@example.com", "Sink", "My sink is leaking in unit 4B")
            .with_id("<abc@mail.example.com>")
    }

    #[tokio::test]
    async fn successful_send_walks_all_states() {
        let h = harness(0, DispatcherConfig::default());
        let outcome = h.dispatcher.process(&sink_message()).await;

        assert_eq!(outcome.send_result, SendResult::Sent { attempts: 1 });
        assert_eq!(
            outcome.states,
            vec![
                MessageState::Fetched,
                MessageState::Classified,
                MessageState::Drafted,
                MessageState::Logged,
                MessageState::Sent,
            ]
        );
        assert!(outcome.persisted);
        assert!(h.sleeper.sleeps.lock().unwrap().is_empty());

        let sent = h.transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "jdoe@example.com");
        assert_eq!(sent[0].cc, vec!["maintenance@propertymanager.com"]);
        assert_eq!(sent[0].subject, "Re: Sink");
        assert_eq!(sent[0].in_reply_to.as_deref(), Some("<abc@mail.example.com>"));
        assert_eq!(sent[0].body, outcome.reply.body);
    }

    #[tokio::test]
    async fn one_failure_then_success_is_sent_after_two_attempts() {
        let h = harness(1, DispatcherConfig::default());
        let outcome = h.dispatcher.process(&sink_message()).await;

        assert_eq!(outcome.send_result, SendResult::Sent { attempts: 2 });
        assert_eq!(h.transport.calls.load(Ordering::SeqCst), 2);
        assert_eq!(*h.sleeper.sleeps.lock().unwrap(), vec![Duration::from_secs(2)]);
        assert_eq!(h.sink.entries.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_still_log_once() {
        let h = harness(u32::MAX, DispatcherConfig::default());
        let outcome = h.dispatcher.process(&sink_message()).await;

        match &outcome.send_result {
            SendResult::SendFailedAfterRetries {
                attempts,
                last_error,
            } => {
                assert_eq!(*attempts, 3);
                assert!(last_error.contains("attempt 3"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(
            outcome.states.last(),
            Some(&MessageState::SendFailedAfterRetries)
        );
        assert_eq!(h.transport.calls.load(Ordering::SeqCst), 3);
        // No sleep after the final attempt.
        assert_eq!(h.sleeper.sleeps.lock().unwrap().len(), 2);

        let entries = h.sink.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].item.message_id, "<abc@mail.example.com>");
        assert!(!entries[0].send.is_sent());
    }

    #[tokio::test]
    async fn linear_backoff_is_passed_to_sleeper() {
        let config = DispatcherConfig {
            retry: RetryPolicy::new(3, Backoff::Linear(Duration::from_millis(100))),
            ..DispatcherConfig::default()
        };
        let h = harness(u32::MAX, config);
        h.dispatcher.process(&sink_message()).await;
        assert_eq!(
            *h.sleeper.sleeps.lock().unwrap(),
            vec![Duration::from_millis(100), Duration::from_millis(200)]
        );
    }

    #[tokio::test]
    async fn exhausted_retries_write_failure_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("send_failures.log");
        let h = harness(u32::MAX, DispatcherConfig::default());
        let dispatcher = h.dispatcher.with_failure_log(SendFailureLog::new(&path));

        dispatcher.process(&sink_message()).await;

        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw.lines().count(), 1);
        assert!(raw.contains("jdoe@example.com"));
    }

    #[tokio::test]
    async fn sink_failure_is_not_fatal() {
        let transport = Arc::new(FlakyTransport::new(0));
        let sink = Arc::new(MemorySink {
            fail: true,
            ..MemorySink::default()
        });
        let dispatcher = Dispatcher::new(
            &TriagePolicy::default(),
            DispatcherConfig::default(),
            directory(),
            ReplyGenerator::fallback_only(),
            transport.clone(),
            sink,
        )
        .unwrap();

        let outcome = dispatcher.process(&sink_message()).await;
        assert!(outcome.send_result.is_sent());
        assert!(!outcome.persisted);
    }

    #[tokio::test]
    async fn unknown_sender_is_processed() {
        let h = harness(0, DispatcherConfig::default());
        let msg = InboundMessage::new("stranger@example.com", "", "Hello!");
        let outcome = h.dispatcher.process(&msg).await;

        assert_eq!(outcome.action_item.category, RequestCategory::Unclassified);
        assert_eq!(outcome.action_item.tenant.name, "unknown");
        assert!(outcome.routing.cc.is_empty());
        assert!(outcome.reply.body.starts_with("Hi there,"));
        // Generated ids are not real Message-IDs.
        assert!(h.transport.sent.lock().unwrap()[0].in_reply_to.is_none());
    }

    #[tokio::test]
    async fn outcome_correlates_by_message_id() {
        let h = harness(0, DispatcherConfig::default());
        let msg = sink_message();
        let outcome = h.dispatcher.process(&msg).await;
        assert_eq!(outcome.action_item.message_id, msg.id);
        assert_eq!(outcome.routing.to, msg.sender);
        assert_eq!(
            h.sink.entries.lock().unwrap()[0].item.message_id,
            msg.id
        );
    }

    #[tokio::test]
    async fn cycle_processes_every_message() {
        let h = harness(0, DispatcherConfig::default());
        let mailbox = StaticMailbox {
            messages: vec![
                sink_message(),
                InboundMessage::new("a@x.com", "Locked out", "I lost my keys"),
                InboundMessage::new("b@x.com", "", "Hello!"),
            ],
        };

        let report = h.dispatcher.run_cycle(&mailbox).await.unwrap();
        assert_eq!(report.fetched, 3);
        assert_eq!(report.processed(), 3);
        assert_eq!(report.sent, 3);
        assert_eq!(report.fallback_replies, 3);
        assert_eq!(h.sink.entries.lock().unwrap().len(), 3);
    }

    /// Hands out its messages once; a second fetch finds nothing unread.
    struct DrainingMailbox {
        unread: Mutex<Vec<InboundMessage>>,
    }

    #[async_trait]
    impl MailboxSource for DrainingMailbox {
        fn name(&self) -> &str {
            "draining"
        }

        async fn fetch_unread(&self) -> Result<Vec<InboundMessage>, ChannelError> {
            Ok(std::mem::take(&mut *self.unread.lock().unwrap()))
        }
    }

    #[tokio::test]
    async fn every_fetched_message_is_logged_once_marked_read() {
        let h = harness(0, DispatcherConfig::default());
        let mailbox = DrainingMailbox {
            unread: Mutex::new(vec![
                sink_message(),
                InboundMessage::new("b@x.com", "Rent", "What is my balance?"),
            ]),
        };

        let first = h.dispatcher.run_cycle(&mailbox).await.unwrap();
        assert_eq!(first.fetched, 2);
        assert_eq!(first.processed(), 2);

        let second = h.dispatcher.run_cycle(&mailbox).await.unwrap();
        assert_eq!(second.fetched, 0);
        assert_eq!(h.sink.entries.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn undeliverable_sender_is_recorded_without_sending() {
        let h = harness(0, DispatcherConfig::default());
        let msg = InboundMessage::new("unknown", "Unreadable message #9 (120 bytes)", "")
            .with_id("gen-imap-9-x");

        let outcome = h.dispatcher.process(&msg).await;

        assert_eq!(h.transport.calls.load(Ordering::SeqCst), 0);
        assert!(h.sleeper.sleeps.lock().unwrap().is_empty());
        assert_eq!(outcome.send_result.attempts(), 0);
        assert!(!outcome.send_result.is_sent());
        assert_eq!(outcome.action_item.category, RequestCategory::Unclassified);
        assert_eq!(
            outcome.states.last(),
            Some(&MessageState::SendFailedAfterRetries)
        );
        let entries = h.sink.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].item.sender, "unknown");
    }

    #[test]
    fn deliverable_addresses() {
        assert!(is_deliverable("jdoe@example.com"));
        assert!(!is_deliverable("unknown"));
        assert!(!is_deliverable("@example.com"));
        assert!(!is_deliverable("jdoe@"));
    }

    #[tokio::test]
    async fn cycle_failure_counts_do_not_abort() {
        let h = harness(u32::MAX, DispatcherConfig::default());
        let mailbox = StaticMailbox {
            messages: vec![sink_message(), InboundMessage::new("b@x.com", "", "Hi")],
        };
        let report = h.dispatcher.run_cycle(&mailbox).await.unwrap();
        assert_eq!(report.processed(), 2);
        assert_eq!(report.send_failed, 2);
        assert_eq!(h.sink.entries.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn fetch_failure_is_reported() {
        let h = harness(0, DispatcherConfig::default());
        let result = h.dispatcher.run_cycle(&BrokenMailbox).await;
        assert!(matches!(result, Err(PipelineError::Fetch(_))));
    }

    #[tokio::test]
    async fn empty_mailbox_is_a_quiet_cycle() {
        let h = harness(0, DispatcherConfig::default());
        let report = h
            .dispatcher
            .run_cycle(&StaticMailbox { messages: vec![] })
            .await
            .unwrap();
        assert_eq!(report.fetched, 0);
        assert_eq!(report.processed(), 0);
    }

    #[test]
    fn reply_subject_prefixes_once() {
        assert_eq!(reply_subject("Leak"), "Re: Leak");
        assert_eq!(reply_subject("Re: Leak"), "Re: Leak");
        assert_eq!(reply_subject("RE: Leak"), "RE: Leak");
        assert_eq!(reply_subject("  "), "Re: Your message");
        assert_eq!(reply_subject("Ré"), "Re: Ré");
    }

    #[test]
    fn generated_ids_have_no_in_reply_to() {
        assert_eq!(in_reply_to("gen-123"), None);
        assert_eq!(in_reply_to(""), None);
        assert_eq!(in_reply_to("<x@y>").as_deref(), Some("<x@y>"));
    }
}
