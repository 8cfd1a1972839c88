//! services/api/src/adapters/completion_llm.rs
//!
//! This module contains the adapter for the completion provider.
//! It implements the `CompletionService` port from the `core` crate.

use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use promptdeck_core::ports::{
    CompletionRequest, CompletionService, ExternalServiceError, PortError, PortResult,
};

/// Default system instruction when the caller does not supply one.
const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are a helpful assistant that refines and expands \
    software project prompts. Given a prompt describing a coding task or project idea, produce a \
    clear, well-structured response that a developer could act on directly.";

/// Timeouts and rate limits get one retry; everything else fails immediately.
const MAX_ATTEMPTS: u32 = 2;
const RETRY_DELAY: Duration = Duration::from_millis(500);

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `CompletionService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiCompletionAdapter {
    client: Client<OpenAIConfig>,
    model: String,
    default_max_tokens: u32,
    default_temperature: f32,
    request_timeout: Duration,
}

impl OpenAiCompletionAdapter {
    /// Creates a new `OpenAiCompletionAdapter`. `request_timeout` bounds each
    /// provider call; without it a stalled connection would keep the
    /// background task (and the prompt's `processing` status) alive forever.
    pub fn new(
        client: Client<OpenAIConfig>,
        model: String,
        default_max_tokens: u32,
        default_temperature: f32,
        request_timeout: Duration,
    ) -> Self {
        Self {
            client,
            model,
            default_max_tokens,
            default_temperature,
            request_timeout,
        }
    }
}

fn is_transient(e: &PortError) -> bool {
    matches!(
        e,
        PortError::External(ExternalServiceError::Timeout(_))
            | PortError::External(ExternalServiceError::RateLimited(_))
    )
}

/// Classifies provider failures so the web layer can pick the right status.
/// `async-openai` reports API-level failures as an `ApiError` whose `type`/`code`
/// strings carry the class; transport failures come back as reqwest errors.
fn classify_openai_error(e: OpenAIError) -> PortError {
    let external = match &e {
        OpenAIError::ApiError(api) => {
            let kind = api
                .r#type
                .as_deref()
                .or(api.code.as_deref())
                .unwrap_or("")
                .to_ascii_lowercase();
            if kind.contains("rate_limit") || kind.contains("insufficient_quota") {
                ExternalServiceError::RateLimited(api.message.clone())
            } else if kind.contains("authentication") || kind.contains("invalid_api_key") {
                ExternalServiceError::Unauthenticated(api.message.clone())
            } else if kind.contains("invalid_request") {
                ExternalServiceError::InvalidRequest(api.message.clone())
            } else {
                ExternalServiceError::Other(api.message.clone())
            }
        }
        OpenAIError::Reqwest(inner) => {
            if inner.is_timeout() {
                ExternalServiceError::Timeout(inner.to_string())
            } else {
                ExternalServiceError::Other(inner.to_string())
            }
        }
        other => ExternalServiceError::Other(other.to_string()),
    };
    PortError::External(external)
}

//=========================================================================================
// `CompletionService` Trait Implementation
//=========================================================================================

#[async_trait]
impl CompletionService for OpenAiCompletionAdapter {
    async fn generate(&self, request: CompletionRequest) -> PortResult<String> {
        let system_instruction = request
            .system_instruction
            .as_deref()
            .unwrap_or(DEFAULT_SYSTEM_INSTRUCTION);

        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system_instruction)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(request.prompt_text.clone())
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .max_tokens(request.max_tokens.unwrap_or(self.default_max_tokens))
            .temperature(request.temperature.unwrap_or(self.default_temperature))
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        // Call the API under a hard deadline, retrying transient failures a
        // bounded number of times. The error is mapped manually, which
        // respects the orphan rule.
        let mut attempt = 0;
        let response = loop {
            attempt += 1;
            let outcome =
                tokio::time::timeout(self.request_timeout, self.client.chat().create(chat_request.clone()))
                    .await;
            let err = match outcome {
                Ok(Ok(response)) => break response,
                Ok(Err(e)) => classify_openai_error(e),
                Err(_) => PortError::External(ExternalServiceError::Timeout(format!(
                    "completion call exceeded {}s",
                    self.request_timeout.as_secs()
                ))),
            };
            if attempt >= MAX_ATTEMPTS || !is_transient(&err) {
                return Err(err);
            }
            tokio::time::sleep(RETRY_DELAY).await;
        };

        // Extract the text content from the first choice in the response.
        if let Some(choice) = response.choices.into_iter().next() {
            if let Some(content) = choice.message.content {
                Ok(content)
            } else {
                Err(PortError::Unexpected(
                    "Completion response contained no text content.".to_string(),
                ))
            }
        } else {
            Err(PortError::Unexpected(
                "Completion provider returned no choices in its response.".to_string(),
            ))
        }
    }
}
