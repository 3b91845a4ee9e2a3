//! Integration with Large Language Model services.
//!
//! This module provides a thin wrapper around the OpenAI chat-completions
//! API. The worker owns retries and backoff; this client performs exactly
//! one call per invocation and propagates failures.

use std::sync::Arc;

use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;
use tracing::instrument;

use crate::base::{
    config::Config,
    types::{Res, Role, ThreadMessage},
};

use super::{GenericLlmClient, LlmClient};

// Extra methods on `LlmClient` applied by the openai implementation.

impl LlmClient {
    /// Creates a new OpenAI-backed LLM client.
    pub fn openai(config: &Config) -> Self {
        let client = OpenAiLlmClient::new(config);
        Self { inner: Arc::new(client) }
    }
}

// Specific implementations.

/// OpenAI LLM client implementation.
#[derive(Clone)]
pub struct OpenAiLlmClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiLlmClient {
    /// Create a new OpenAI LLM client.
    #[instrument(name = "OpenAiLlmClient::new", skip_all)]
    pub fn new(config: &Config) -> Self {
        let cfg = OpenAIConfig::new().with_api_key(config.openai_api_key.clone());

        Self {
            client: Client::with_config(cfg),
            model: config.openai_model.clone(),
        }
    }

    /// Map the provider-neutral message list into request messages.
    fn build_messages(messages: &[ThreadMessage]) -> Res<Vec<ChatCompletionRequestMessage>> {
        messages
            .iter()
            .map(|message| {
                let request_message = match message.role {
                    Role::System => ChatCompletionRequestSystemMessageArgs::default().content(message.content.clone()).build()?.into(),
                    Role::User => ChatCompletionRequestUserMessageArgs::default().content(message.content.clone()).build()?.into(),
                    Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default().content(message.content.clone()).build()?.into(),
                };

                Ok(request_message)
            })
            .collect()
    }
}

#[async_trait]
impl GenericLlmClient for OpenAiLlmClient {
    #[instrument(name = "OpenAiLlmClient::complete", skip_all)]
    async fn complete(&self, messages: &[ThreadMessage]) -> Res<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(Self::build_messages(messages)?)
            .build()?;

        let response = self.client.chat().create(request).await?;

        let answer = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow::anyhow!("Completion response contained no content."))?;

        Ok(answer.trim().to_string())
    }
}
