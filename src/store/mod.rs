//! Persistence layer: file-backed action log and send-failure log.

pub mod action_log;

pub use action_log::{JsonActionLog, SendFailureLog};
