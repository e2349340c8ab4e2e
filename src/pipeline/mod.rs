//! Tenant message triage pipeline.
//!
//! Every unread tenant email flows through:
//! 1. `Classifier::classify()`: keyword rules, fixed priority, never fails
//! 2. `ReplyGenerator::generate()`: model reply or category template
//! 3. `ActionItemBuilder::build()`: structured record for the action log
//! 4. `RoutingResolver::resolve()`: sender plus per-category CC list
//! 5. `Dispatcher`: bounded-retry send, then append to the action log
//!
//! **Every message reaches a terminal state.** No failure past the mailbox
//! fetch aborts a cycle.

pub mod action_item;
pub mod policy;
pub mod processor;
pub mod reply;
pub mod retry;
pub mod routing;
pub mod rules;
pub mod types;

pub use action_item::ActionItemBuilder;
pub use policy::TriagePolicy;
pub use processor::{CycleReport, Dispatcher, DispatcherConfig};
pub use reply::{ReplyConfig, ReplyGenerator};
pub use retry::{Backoff, RetryPolicy, Sleeper, TokioSleeper};
pub use routing::RoutingResolver;
pub use rules::Classifier;
