//! Generative text integration.
//!
//! The reply generator treats the model as an untrusted upstream: anything
//! it returns is validated, and every failure falls back to templates.
//! Requests go through rig-core; `RigAdapter` bridges rig's
//! `CompletionModel` to our `GenerativeTextService` trait. Currently one
//! backend is supported, Together.ai.

pub mod provider;
mod rig_adapter;

pub use provider::*;
pub use rig_adapter::RigAdapter;

use std::sync::Arc;

use rig::client::CompletionClient;
use secrecy::{ExposeSecret, SecretString};

use crate::error::LlmError;

/// Default model, matching the hosted Mistral instruct model.
pub const DEFAULT_MODEL: &str = "mistralai/Mistral-7B-Instruct-v0.1";

/// Configuration for the generative service.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: SecretString,
    pub model: String,
}

impl LlmConfig {
    /// Build config from environment variables.
    /// Returns `None` if `TOGETHER_API_KEY` is unset or blank (generative
    /// path disabled).
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let api_key = lookup("TOGETHER_API_KEY").filter(|k| !k.trim().is_empty())?;
        let model = lookup("TRIAGE_MODEL")
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        Some(Self {
            api_key: SecretString::from(api_key),
            model,
        })
    }
}

/// Create the generative service from configuration.
pub fn create_service(config: &LlmConfig) -> Result<Arc<dyn GenerativeTextService>, LlmError> {
    create_together_provider(config)
}

fn create_together_provider(
    config: &LlmConfig,
) -> Result<Arc<dyn GenerativeTextService>, LlmError> {
    use rig::providers::together;

    let client: together::Client =
        together::Client::new(config.api_key.expose_secret()).map_err(|e| {
            LlmError::RequestFailed {
                provider: "together".to_string(),
                reason: format!("Failed to create Together client: {e}"),
            }
        })?;

    let model = client.completion_model(&config.model);
    tracing::info!("Using Together.ai (model: {})", config.model);
    Ok(Arc::new(RigAdapter::new(model, "together", &config.model)))
}
