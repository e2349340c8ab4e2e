//! Mail I/O: the tenant inbox and the reply transport.

pub mod email;
pub mod email_types;

pub use email::{EmailConfig, ImapMailbox, SmtpTransport};
pub use email_types::{SenderAddress, parse_sender};
