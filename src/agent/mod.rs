pub mod prompt;

use async_trait::async_trait;
use rig::completion::Chat;
use rig::message::Message as RigMessage;
use rig::prelude::CompletionClient;
use rig::providers::gemini;
use tracing::{debug, error};

use crate::errors::GenerationError;
use crate::models::{Message, MessageRole};

/// External generative-language service: prior turns go in as structured
/// history, the current turn as prompt text.
#[async_trait]
pub trait GenerativeClient: Send + Sync {
    async fn generate(&self, history: &[Message], prompt: &str) -> Result<String, GenerationError>;
}

/// Builds a rig [`RigMessage`] history list from stored [`Message`] records.
/// Roles other than user/assistant have no chat-history counterpart and are
/// skipped, as are stored entries whose role or content is not text.
fn to_rig_history(messages: &[Message]) -> Vec<RigMessage> {
    messages
        .iter()
        .filter(|m| m.is_readable())
        .filter_map(|m| match &m.role {
            MessageRole::User => Some(RigMessage::user(&m.content)),
            MessageRole::Assistant => Some(RigMessage::assistant(&m.content)),
            MessageRole::Other(_) => None,
        })
        .collect()
}

/// Gemini through the rig [`gemini::Client`]. A fresh agent is built per
/// request so the stored history is replayed each time; persona instructions
/// arrive in the prompt, so the agent has no preamble.
#[derive(Clone)]
pub struct GeminiAgentService {
    client: gemini::Client,
    model: String,
}

impl GeminiAgentService {
    pub fn new(api_key: &str, model: impl Into<String>) -> anyhow::Result<Self> {
        let client = gemini::Client::builder()
            .api_key(api_key)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build Gemini client: {e}"))?;
        Ok(Self { client, model: model.into() })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl GenerativeClient for GeminiAgentService {
    async fn generate(&self, history: &[Message], prompt: &str) -> Result<String, GenerationError> {
        let agent = self.client.agent(&self.model).build();
        let rig_history = to_rig_history(history);
        debug!(
            "Sending prompt to {} with {} history messages",
            self.model,
            rig_history.len()
        );

        let reply = agent.chat(prompt, rig_history).await.map_err(|e| {
            error!("Gemini request failed: {e}");
            GenerationError::Request(e.to_string())
        })?;

        if reply.trim().is_empty() {
            return Err(GenerationError::EmptyReply);
        }
        Ok(reply)
    }
}
