//! Email channel: IMAP over rustls for the tenant inbox, SMTP via lettre
//! for replies.

use std::io::Write as IoWrite;
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use lettre::Transport as _;
use lettre::message::header::ContentType;
use lettre::message::{Mailbox, Message};
use lettre::transport::smtp::authentication::Credentials;
use mail_parser::{MessageParser, MimeHeaders};
use secrecy::{ExposeSecret, SecretString};
use uuid::Uuid;

use crate::channels::email_types::{parse_sender, strip_html, strip_quoted_text};
use crate::error::{ChannelError, ConfigError};
use crate::pipeline::action_item::UNKNOWN;
use crate::pipeline::types::{InboundMessage, MailboxSource, OutboundEmail, Transport};

const CHANNEL: &str = "email";

// ── Configuration ───────────────────────────────────────────────────

/// Mailbox and SMTP settings, built from environment variables.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub imap_host: String,
    pub imap_port: u16,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
    /// Upper bound on messages fetched per sweep.
    pub fetch_limit: Option<usize>,
}

impl EmailConfig {
    /// Build config from environment variables.
    ///
    /// `EMAIL_ADDRESS` and `EMAIL_PASSWORD` are required; hosts default to
    /// Gmail (IMAP 993, SMTPS 465).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required =
            |key: &str| get(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()));
        let port = |key: &str, default: u16| -> Result<u16, ConfigError> {
            match get(key) {
                Some(raw) => raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: format!("{e}"),
                }),
                None => Ok(default),
            }
        };

        let username = required("EMAIL_ADDRESS")?;
        let password = SecretString::from(required("EMAIL_PASSWORD")?);
        let imap_host = get("EMAIL_IMAP_HOST").unwrap_or_else(|| "imap.gmail.com".to_string());
        let smtp_host = get("EMAIL_SMTP_HOST").unwrap_or_else(|| imap_host.replace("imap", "smtp"));

        let fetch_limit = match get("EMAIL_FETCH_LIMIT") {
            Some(raw) => Some(raw.trim().parse::<usize>().map_err(|e| {
                ConfigError::InvalidValue {
                    key: "EMAIL_FETCH_LIMIT".into(),
                    message: format!("{e}"),
                }
            })?),
            None => None,
        };

        Ok(Self {
            imap_port: port("EMAIL_IMAP_PORT", 993)?,
            smtp_port: port("EMAIL_SMTP_PORT", 465)?,
            from_address: get("EMAIL_FROM_ADDRESS").unwrap_or_else(|| username.clone()),
            imap_host,
            smtp_host,
            username,
            password,
            fetch_limit,
        })
    }
}

// ── Inbound ─────────────────────────────────────────────────────────

/// Tenant inbox over IMAP. Each fetch marks the returned messages `\Seen`.
pub struct ImapMailbox {
    config: Arc<EmailConfig>,
}

impl ImapMailbox {
    pub fn new(config: Arc<EmailConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl MailboxSource for ImapMailbox {
    fn name(&self) -> &str {
        &self.config.username
    }

    async fn fetch_unread(&self) -> Result<Vec<InboundMessage>, ChannelError> {
        let cfg = Arc::clone(&self.config);
        let raw = tokio::task::spawn_blocking(move || fetch_unseen_imap(&cfg))
            .await
            .map_err(|e| ChannelError::FetchFailed {
                name: CHANNEL.into(),
                reason: format!("IMAP task panicked: {e}"),
            })?
            .map_err(|e| ChannelError::FetchFailed {
                name: CHANNEL.into(),
                reason: e.to_string(),
            })?;

        // Everything fetched is already `\Seen`, so an unreadable message
        // still goes through the pipeline as a placeholder.
        let mut messages = Vec::with_capacity(raw.len());
        for (seq, bytes) in raw {
            match parse_inbound(&bytes) {
                Some(message) => messages.push(message),
                None => {
                    tracing::warn!(
                        category = "mailbox",
                        seq = %seq,
                        bytes = bytes.len(),
                        "Unparseable email, logging placeholder"
                    );
                    messages.push(unparseable_message(&seq, &bytes));
                }
            }
        }

        tracing::info!(count = messages.len(), host = %self.config.imap_host, "Fetched unread email");
        Ok(messages)
    }
}

/// Turn a raw RFC 822 message into an `InboundMessage`.
///
/// Returns `None` when the message cannot be parsed or has no usable
/// sender address.
pub fn parse_inbound(raw: &[u8]) -> Option<InboundMessage> {
    let parsed = MessageParser::default().parse(raw)?;

    let from = parsed.from().and_then(|addr| addr.first())?;
    let (sender, sender_name) = match from.address() {
        Some(address) => (
            address.trim().to_string(),
            from.name().map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
        ),
        None => {
            let header = from.name()?;
            let fallback = parse_sender(header)?;
            (fallback.address, fallback.name)
        }
    };

    let id = parsed
        .message_id()
        .map(|s| format!("<{s}>"))
        .unwrap_or_else(|| format!("gen-{}", Uuid::new_v4()));

    let received_at = parsed
        .date()
        .and_then(|d| chrono::DateTime::from_timestamp(d.to_timestamp(), 0))
        .unwrap_or_else(Utc::now);

    Some(InboundMessage {
        id,
        sender,
        sender_name,
        subject: parsed.subject().unwrap_or_default().trim().to_string(),
        body: strip_quoted_text(&extract_text(&parsed)),
        received_at,
    })
}

/// Stand-in for a fetched message that `parse_inbound` rejected.
///
/// The sender is unknown, so the dispatcher records it without replying.
/// The subject is kept when the headers are readable at all.
pub fn unparseable_message(seq: &str, raw: &[u8]) -> InboundMessage {
    let subject = MessageParser::default()
        .parse_headers(raw)
        .and_then(|parsed| parsed.subject().map(|s| s.trim().to_string()))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| format!("Unreadable message #{seq} ({} bytes)", raw.len()));

    InboundMessage {
        id: format!("gen-imap-{seq}-{}", Uuid::new_v4()),
        sender: UNKNOWN.to_string(),
        sender_name: None,
        subject,
        body: String::new(),
        received_at: Utc::now(),
    }
}

/// Readable text from a parsed email: plain text, then HTML, then any
/// text attachment.
fn extract_text(parsed: &mail_parser::Message) -> String {
    if let Some(text) = parsed.body_text(0) {
        return text.to_string();
    }
    if let Some(html) = parsed.body_html(0) {
        return strip_html(html.as_ref());
    }
    for part in parsed.attachments() {
        let part: &mail_parser::MessagePart = part;
        if let Some(ct) = MimeHeaders::content_type(part)
            && ct.ctype() == "text"
            && let Ok(text) = std::str::from_utf8(part.contents())
        {
            return text.to_string();
        }
    }
    String::new()
}

/// Error type for IMAP fetch operations.
type ImapError = Box<dyn std::error::Error + Send + Sync>;

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// Quote a string for an IMAP command argument.
fn imap_quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn read_line(tls: &mut TlsStream) -> Result<String, ImapError> {
    let mut buf = Vec::new();
    loop {
        let mut byte = [0u8; 1];
        match std::io::Read::read(tls, &mut byte) {
            Ok(0) => return Err("IMAP connection closed".into()),
            Ok(_) => {
                buf.push(byte[0]);
                if buf.ends_with(b"\r\n") {
                    return Ok(String::from_utf8_lossy(&buf).to_string());
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn send_cmd(tls: &mut TlsStream, tag: &str, cmd: &str) -> Result<Vec<String>, ImapError> {
    let full = format!("{tag} {cmd}\r\n");
    IoWrite::write_all(tls, full.as_bytes())?;
    IoWrite::flush(tls)?;
    let mut lines = Vec::new();
    loop {
        let line = read_line(tls)?;
        let done = line.starts_with(tag);
        lines.push(line);
        if done {
            break;
        }
    }
    Ok(lines)
}

/// Sequence numbers from `* SEARCH` responses.
fn parse_search(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .filter(|line| line.starts_with("* SEARCH"))
        .flat_map(|line| line.split_whitespace().skip(2).map(str::to_string))
        .collect()
}

/// Messages to fetch this sweep. The limit applies here, before anything
/// is marked `\Seen`; messages past it stay unread for the next sweep.
fn select_unseen(search: &[String], limit: Option<usize>) -> Vec<String> {
    let mut ids = parse_search(search);
    if let Some(limit) = limit {
        ids.truncate(limit);
    }
    ids
}

/// Fetch unseen emails as (sequence number, raw RFC 822 bytes) pairs
/// (blocking, run in spawn_blocking).
fn fetch_unseen_imap(config: &EmailConfig) -> Result<Vec<(String, Vec<u8>)>, ImapError> {
    let tcp = TcpStream::connect((&*config.imap_host, config.imap_port))?;
    tcp.set_read_timeout(Some(Duration::from_secs(30)))?;

    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = Arc::new(
        rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth(),
    );
    let server_name = rustls_pki_types::ServerName::try_from(config.imap_host.clone())?;
    let conn = rustls::ClientConnection::new(tls_config, server_name)?;
    let mut tls = rustls::StreamOwned::new(conn, tcp);

    let _greeting = read_line(&mut tls)?;

    let login_resp = send_cmd(
        &mut tls,
        "A1",
        &format!(
            "LOGIN {} {}",
            imap_quote(&config.username),
            imap_quote(config.password.expose_secret())
        ),
    )?;
    if !login_resp.last().is_some_and(|l| l.contains("OK")) {
        return Err("IMAP login failed".into());
    }

    let _select = send_cmd(&mut tls, "A2", "SELECT \"INBOX\"")?;

    let search_resp = send_cmd(&mut tls, "A3", "SEARCH UNSEEN")?;
    let ids = select_unseen(&search_resp, config.fetch_limit);

    let mut results = Vec::with_capacity(ids.len());
    let mut tag_counter = 4_u32;

    for id in &ids {
        let fetch_tag = format!("A{tag_counter}");
        tag_counter += 1;
        let fetch_resp = send_cmd(&mut tls, &fetch_tag, &format!("FETCH {id} RFC822"))?;

        // Drop the untagged FETCH line and the closing `)` + tagged status.
        let raw: String = fetch_resp
            .iter()
            .skip(1)
            .take(fetch_resp.len().saturating_sub(3))
            .cloned()
            .collect();
        results.push((id.clone(), raw.into_bytes()));

        let store_tag = format!("A{tag_counter}");
        tag_counter += 1;
        if let Err(e) = send_cmd(&mut tls, &store_tag, &format!("STORE {id} +FLAGS (\\Seen)")) {
            tracing::warn!(category = "mailbox", id = %id, error = %e, "Failed to mark email seen");
        }
    }

    let logout_tag = format!("A{tag_counter}");
    let _ = send_cmd(&mut tls, &logout_tag, "LOGOUT");

    Ok(results)
}

// ── Outbound ────────────────────────────────────────────────────────

/// SMTP reply transport. Each `send` is a single attempt.
pub struct SmtpTransport {
    config: Arc<EmailConfig>,
}

impl SmtpTransport {
    pub fn new(config: Arc<EmailConfig>) -> Self {
        Self { config }
    }
}

fn mailbox(address: &str, role: &str) -> Result<Mailbox, ChannelError> {
    address.parse().map_err(|e| ChannelError::InvalidAddress {
        address: address.to_string(),
        reason: format!("{role}: {e}"),
    })
}

/// Assemble the MIME message for a reply.
pub fn build_message(from: &str, email: &OutboundEmail) -> Result<Message, ChannelError> {
    let mut builder = Message::builder()
        .from(mailbox(from, "from")?)
        .to(mailbox(&email.to, "to")?)
        .subject(email.subject.clone())
        .header(ContentType::TEXT_PLAIN);

    for cc in &email.cc {
        builder = builder.cc(mailbox(cc, "cc")?);
    }

    if let Some(id) = &email.in_reply_to {
        builder = builder.in_reply_to(id.clone()).references(id.clone());
    }

    builder
        .body(email.body.clone())
        .map_err(|e| ChannelError::InvalidMessage(format!("Failed to build email: {e}")))
}

#[async_trait]
impl Transport for SmtpTransport {
    async fn send(&self, email: &OutboundEmail) -> Result<(), ChannelError> {
        let message = build_message(&self.config.from_address, email)?;
        let cfg = Arc::clone(&self.config);
        let to = email.to.clone();
        let cc_count = email.cc.len();

        tokio::task::spawn_blocking(move || {
            let creds = Credentials::new(
                cfg.username.clone(),
                cfg.password.expose_secret().to_string(),
            );
            // 465 is implicit TLS; anything else negotiates STARTTLS.
            let relay = if cfg.smtp_port == 465 {
                lettre::SmtpTransport::relay(&cfg.smtp_host)
            } else {
                lettre::SmtpTransport::starttls_relay(&cfg.smtp_host)
            };
            let transport = relay
                .map_err(|e| ChannelError::SendFailed {
                    name: CHANNEL.into(),
                    reason: format!("SMTP relay error: {e}"),
                })?
                .port(cfg.smtp_port)
                .credentials(creds)
                .timeout(Some(Duration::from_secs(30)))
                .build();

            transport
                .send(&message)
                .map_err(|e| ChannelError::SendFailed {
                    name: CHANNEL.into(),
                    reason: format!("SMTP send failed: {e}"),
                })
        })
        .await
        .map_err(|e| ChannelError::SendFailed {
            name: CHANNEL.into(),
            reason: format!("SMTP task panicked: {e}"),
        })??;

        tracing::info!(to = %to, cc = cc_count, "Email sent");
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────
