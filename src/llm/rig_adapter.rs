//! Adapter from rig's `CompletionModel` to `GenerativeTextService`.

use async_trait::async_trait;
use rig::completion::{AssistantContent, CompletionError, CompletionModel, Message};

use crate::error::LlmError;
use crate::llm::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, GenerativeTextService, Role,
};

/// Wraps any rig completion model. One `complete` call is one request.
pub struct RigAdapter<M> {
    model: M,
    provider: &'static str,
    model_name: String,
}

impl<M: CompletionModel> RigAdapter<M> {
    pub fn new(model: M, provider: &'static str, model_name: &str) -> Self {
        Self {
            model,
            provider,
            model_name: model_name.to_string(),
        }
    }
}

#[async_trait]
impl<M> GenerativeTextService for RigAdapter<M>
where
    M: CompletionModel + Send + Sync + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let conversation = split_conversation(&request.messages).ok_or_else(|| {
            LlmError::RequestFailed {
                provider: self.provider.into(),
                reason: "request has no final user message".into(),
            }
        })?;

        let mut builder = self
            .model
            .completion_request(Message::user(conversation.prompt))
            .messages(conversation.history);
        if let Some(preamble) = conversation.preamble {
            builder = builder.preamble(preamble);
        }
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(f64::from(temperature));
        }
        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(u64::from(max_tokens));
        }

        let result = match request.timeout {
            Some(timeout) => tokio::time::timeout(timeout, builder.send())
                .await
                .map_err(|_| LlmError::Timeout {
                    provider: self.provider.into(),
                    timeout,
                })?,
            None => builder.send().await,
        };
        let response = result.map_err(|e| map_completion_error(self.provider, e))?;

        let content = response
            .choice
            .iter()
            .filter_map(|part| match part {
                AssistantContent::Text(text) => Some(text.text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");
        if content.trim().is_empty() {
            return Err(LlmError::InvalidResponse {
                provider: self.provider.into(),
                reason: "response has no text content".into(),
            });
        }

        let input_tokens = saturate(response.usage.input_tokens);
        let output_tokens = saturate(response.usage.output_tokens);

        Ok(CompletionResponse {
            content: content.trim().to_string(),
            input_tokens,
            output_tokens,
            finish_reason: finish_reason(output_tokens, request.max_tokens),
        })
    }
}

/// A chat split into rig's shape: system preamble, prior turns, and the
/// final user prompt.
#[derive(Debug)]
struct Conversation {
    preamble: Option<String>,
    history: Vec<Message>,
    prompt: String,
}

fn split_conversation(messages: &[ChatMessage]) -> Option<Conversation> {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();

    let mut turns: Vec<&ChatMessage> = messages.iter().filter(|m| m.role != Role::System).collect();
    let last = turns.pop().filter(|m| m.role == Role::User)?;

    let history = turns
        .into_iter()
        .map(|m| match m.role {
            Role::Assistant => Message::assistant(m.content.clone()),
            _ => Message::user(m.content.clone()),
        })
        .collect();

    Some(Conversation {
        preamble: (!system.is_empty()).then(|| system.join("\n\n")),
        history,
        prompt: last.content.clone(),
    })
}

/// rig does not surface the provider's stop reason; a reply that used the
/// whole token budget is treated as cut off.
fn finish_reason(output_tokens: u32, max_tokens: Option<u32>) -> FinishReason {
    match max_tokens {
        Some(max) if max > 0 && output_tokens >= max => FinishReason::Length,
        _ => FinishReason::Stop,
    }
}

fn saturate(tokens: u64) -> u32 {
    u32::try_from(tokens).unwrap_or(u32::MAX)
}

fn map_completion_error(provider: &str, error: CompletionError) -> LlmError {
    match error {
        CompletionError::JsonError(e) => LlmError::Json(e),
        CompletionError::ResponseError(reason) => LlmError::InvalidResponse {
            provider: provider.into(),
            reason,
        },
        CompletionError::ProviderError(reason) => LlmError::Rejected {
            provider: provider.into(),
            reason,
        },
        other => LlmError::RequestFailed {
            provider: provider.into(),
            reason: other.to_string(),
        },
    }
}
