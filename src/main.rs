use std::sync::Arc;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;

use tenant_triage::channels::{EmailConfig, ImapMailbox, SmtpTransport};
use tenant_triage::config::TriageConfig;
use tenant_triage::llm::{LlmConfig, create_service};
use tenant_triage::pipeline::{Dispatcher, ReplyGenerator};
use tenant_triage::store::{JsonActionLog, SendFailureLog};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    let config = TriageConfig::from_env().context("Invalid triage configuration")?;
    let _log_guard = init_tracing(&config);

    let email_config = Arc::new(EmailConfig::from_env().context("Invalid email configuration")?);
    let policy = config.load_policy().context("Failed to load triage policy")?;
    let tenants = config
        .load_tenants()
        .context("Failed to load tenant directory")?;

    let service = match LlmConfig::from_env() {
        Some(llm_config) => Some(
            create_service(&llm_config).context("Failed to create generative service")?,
        ),
        None => {
            tracing::warn!("TOGETHER_API_KEY not set, replies will use templates only");
            None
        }
    };

    eprintln!("🏠 Tenant Triage v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Mailbox: {} via {}", email_config.username, email_config.imap_host);
    eprintln!("   Tenants: {} known", tenants.len());
    eprintln!(
        "   Replies: {}",
        service
            .as_ref()
            .map(|s| s.model_name().to_string())
            .unwrap_or_else(|| "templates only".to_string())
    );
    eprintln!("   Action log: {}\n", config.action_log_path.display());

    let dispatcher = Dispatcher::new(
        &policy,
        config.dispatcher_config(),
        Arc::new(tenants),
        ReplyGenerator::new(service, config.reply_config()),
        Arc::new(SmtpTransport::new(Arc::clone(&email_config))),
        Arc::new(JsonActionLog::new(&config.action_log_path)),
    )?
    .with_failure_log(SendFailureLog::new(&config.send_failure_log_path));

    let mailbox = ImapMailbox::new(email_config);
    let report = dispatcher.run_cycle(&mailbox).await?;

    for outcome in &report.outcomes {
        let item = &outcome.action_item;
        eprintln!(
            "   {} [{}] {} -> {} (cc {})",
            outcome.send_result.label(),
            item.category,
            item.sender,
            item.summary,
            if outcome.routing.cc.is_empty() {
                "none".to_string()
            } else {
                outcome.routing.cc.join(", ")
            }
        );
    }
    eprintln!(
        "\n   Fetched {}, processed {}, sent {}, failed {}, unlogged {}",
        report.fetched,
        report.processed(),
        report.sent,
        report.send_failed,
        report.persist_failures
    );

    Ok(())
}

/// Stderr plus a daily log file. Falls back to stderr only when the log
/// directory cannot be created.
fn init_tracing(config: &TriageConfig) -> Option<WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    if std::fs::create_dir_all(&config.log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::daily(&config.log_dir, "tenant-triage.log");
        let (writer, guard) = tracing_appender::non_blocking(file_appender);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(writer);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
        None
    }
}
