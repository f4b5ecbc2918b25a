/// The generative-text collaborator used by the maintenance workflows.
///
/// Workflows only need three shapes of request: a single prompt, a prompt with inline
/// images, and a multi-turn conversation under a system instruction. `TextService`
/// captures exactly that; `GenerativeText` implements it over an OpenAI-compatible host.
use std::future::Future;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::CommonError;
use crate::openai::{ContentPart, ImageUrl, Message, MessageContent, OpenAiClient};

/// An image sent alongside a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ImagePayload {
    /// Raw base64 payload (no `data:` prefix).
    pub base64: String,
    /// MIME type, e.g. "image/jpeg".
    pub mime_type: String,
}

impl ImagePayload {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    fn as_str(self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
        }
    }
}

/// One message of a conversation with the assistant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub content: String,
}

pub trait TextService: Send + Sync {
    /// Complete a single text prompt.
    fn complete(&self, prompt: &str) -> impl Future<Output = Result<String, CommonError>> + Send;

    /// Complete a prompt that refers to the attached images.
    fn complete_with_images(
        &self,
        prompt: &str,
        images: &[ImagePayload],
    ) -> impl Future<Output = Result<String, CommonError>> + Send;

    /// Continue a conversation. `turns` ends with the user message to answer.
    fn converse(
        &self,
        system: &str,
        turns: &[ChatTurn],
    ) -> impl Future<Output = Result<String, CommonError>> + Send;
}

/// `TextService` backed by an OpenAI-compatible chat completions endpoint.
#[derive(Clone)]
pub struct GenerativeText {
    client: OpenAiClient,
}

impl GenerativeText {
    pub fn new(client: OpenAiClient) -> Self {
        Self { client }
    }

    /// Whether a model is configured. Without one every request fails with
    /// `CommonError::NotConfigured`.
    pub fn is_configured(&self) -> bool {
        self.client.config().model.is_some()
    }

    fn model(&self) -> Result<String, CommonError> {
        self.client.config().model.clone().ok_or_else(|| {
            CommonError::NotConfigured("OPENAI_MODEL environment variable is not set".to_string())
        })
    }

    async fn run(&self, messages: Vec<Message>) -> Result<String, CommonError> {
        let model = self.model()?;
        let response = self
            .client
            .complete(&model, messages)
            .await
            .inspect_err(|e| warn!(error = %e, model = %model, "chat completion failed"))?;

        if let Some(usage) = &response.usage {
            debug!(
                model = %model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "chat completion finished"
            );
        }

        response
            .choices
            .first()
            .and_then(|c| c.message.content.as_ref())
            .filter(|s| !s.trim().is_empty())
            .cloned()
            .ok_or(CommonError::EmptyResponse)
    }
}

impl TextService for GenerativeText {
    async fn complete(&self, prompt: &str) -> Result<String, CommonError> {
        self.run(vec![Message::text("user", prompt)]).await
    }

    async fn complete_with_images(
        &self,
        prompt: &str,
        images: &[ImagePayload],
    ) -> Result<String, CommonError> {
        let mut parts = vec![ContentPart::Text {
            text: prompt.to_string(),
        }];
        parts.extend(images.iter().map(|image| ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: image.data_url(),
            },
        }));
        let message = Message {
            role: "user".to_string(),
            content: MessageContent::Parts(parts),
        };
        self.run(vec![message]).await
    }

    async fn converse(&self, system: &str, turns: &[ChatTurn]) -> Result<String, CommonError> {
        let model = self.model()?;
        let mut messages = Vec::with_capacity(turns.len() + 1);
        messages.push(Message::text("system", system));
        messages.extend(
            turns
                .iter()
                .map(|turn| Message::text(turn.role.as_str(), turn.content.clone())),
        );

        let reply = self
            .client
            .stream_text(&model, messages)
            .await
            .inspect_err(|e| warn!(error = %e, model = %model, "streaming chat failed"))?;

        if reply.trim().is_empty() {
            return Err(CommonError::EmptyResponse);
        }
        Ok(reply)
    }
}
