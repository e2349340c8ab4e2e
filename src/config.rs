//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::pipeline::policy::TriagePolicy;
use crate::pipeline::processor::DispatcherConfig;
use crate::pipeline::reply::ReplyConfig;
use crate::pipeline::retry::{Backoff, RetryPolicy};
use crate::tenants::StaticTenantDirectory;

/// How the send backoff grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackoffMode {
    #[default]
    Constant,
    Linear,
}

impl FromStr for BackoffMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "constant" | "fixed" => Ok(Self::Constant),
            "linear" => Ok(Self::Linear),
            other => Err(format!("expected 'constant' or 'linear', got '{other}'")),
        }
    }
}

/// Triage engine configuration.
#[derive(Debug, Clone)]
pub struct TriageConfig {
    /// Total send attempts per reply, including the first.
    pub max_send_attempts: u32,
    /// Base pause between send attempts.
    pub send_backoff: Duration,
    pub backoff_mode: BackoffMode,
    /// Bound on one generative call.
    pub llm_timeout: Duration,
    /// Longest generated reply accepted, in characters.
    pub max_reply_chars: usize,
    /// Length of the body excerpt in action item summaries.
    pub summary_chars: usize,
    pub action_log_path: PathBuf,
    pub send_failure_log_path: PathBuf,
    /// JSON triage policy replacing the built-in keyword and CC tables.
    pub policy_path: Option<PathBuf>,
    /// JSON tenant directory replacing the built-in sample tenants.
    pub tenants_path: Option<PathBuf>,
    /// Directory for the daily log file.
    pub log_dir: PathBuf,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            max_send_attempts: 3,
            send_backoff: Duration::from_millis(2000),
            backoff_mode: BackoffMode::Constant,
            llm_timeout: Duration::from_secs(20),
            max_reply_chars: 2000,
            summary_chars: 80,
            action_log_path: PathBuf::from("output/action_items.json"),
            send_failure_log_path: PathBuf::from("output/send_failures.log"),
            policy_path: None,
            tenants_path: None,
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl TriageConfig {
    /// Build config from `TRIAGE_*` environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let max_send_attempts: u32 =
            parse_or(get("TRIAGE_MAX_SEND_ATTEMPTS"), "TRIAGE_MAX_SEND_ATTEMPTS", 3)?;
        if max_send_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "TRIAGE_MAX_SEND_ATTEMPTS".into(),
                message: "must be at least 1".into(),
            });
        }

        let backoff_ms: u64 = parse_or(get("TRIAGE_SEND_BACKOFF_MS"), "TRIAGE_SEND_BACKOFF_MS", 2000)?;
        let timeout_secs: u64 =
            parse_or(get("TRIAGE_LLM_TIMEOUT_SECS"), "TRIAGE_LLM_TIMEOUT_SECS", 20)?;

        Ok(Self {
            max_send_attempts,
            send_backoff: Duration::from_millis(backoff_ms),
            backoff_mode: parse_or(
                get("TRIAGE_BACKOFF_MODE"),
                "TRIAGE_BACKOFF_MODE",
                BackoffMode::Constant,
            )?,
            llm_timeout: Duration::from_secs(timeout_secs),
            max_reply_chars: parse_or(
                get("TRIAGE_MAX_REPLY_CHARS"),
                "TRIAGE_MAX_REPLY_CHARS",
                defaults.max_reply_chars,
            )?,
            summary_chars: parse_or(
                get("TRIAGE_SUMMARY_CHARS"),
                "TRIAGE_SUMMARY_CHARS",
                defaults.summary_chars,
            )?,
            action_log_path: get("TRIAGE_ACTION_LOG")
                .map(PathBuf::from)
                .unwrap_or(defaults.action_log_path),
            send_failure_log_path: get("TRIAGE_SEND_FAILURE_LOG")
                .map(PathBuf::from)
                .unwrap_or(defaults.send_failure_log_path),
            policy_path: get("TRIAGE_POLICY_FILE").map(PathBuf::from),
            tenants_path: get("TRIAGE_TENANTS_FILE").map(PathBuf::from),
            log_dir: get("TRIAGE_LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.log_dir),
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let backoff = match self.backoff_mode {
            BackoffMode::Constant => Backoff::Constant(self.send_backoff),
            BackoffMode::Linear => Backoff::Linear(self.send_backoff),
        };
        RetryPolicy::new(self.max_send_attempts, backoff)
    }

    pub fn reply_config(&self) -> ReplyConfig {
        ReplyConfig {
            timeout: self.llm_timeout,
            max_reply_chars: self.max_reply_chars,
            ..ReplyConfig::default()
        }
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            retry: self.retry_policy(),
            summary_chars: self.summary_chars,
        }
    }

    /// The policy file if configured, else the built-in defaults.
    pub fn load_policy(&self) -> Result<TriagePolicy, ConfigError> {
        match &self.policy_path {
            Some(path) => TriagePolicy::from_json_file(path),
            None => Ok(TriagePolicy::default()),
        }
    }

    /// The tenant file if configured, else the sample directory.
    pub fn load_tenants(&self) -> Result<StaticTenantDirectory, ConfigError> {
        match &self.tenants_path {
            Some(path) => StaticTenantDirectory::from_json_file(path),
            None => Ok(StaticTenantDirectory::sample()),
        }
    }
}

fn parse_value<T>(raw: &str, key: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => parse_value(&raw, key),
        None => Ok(default),
    }
}
