use std::sync::Arc;

use tracing::{error, info, warn};

use crate::agent::prompt::{compose_prompt, FALLBACK_REPLY, PERSONA};
use crate::agent::GenerativeClient;
use crate::db::{ConversationStore, WriteCondition};
use crate::errors::{AppError, StoreError};
use crate::models::{Conversation, Message};

/// How the exchange treats collaborator failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangePolicy {
    /// Read failure → empty history, generation failure → fallback reply,
    /// write failure → skipped. When off, each surfaces as an error.
    pub degrade_gracefully: bool,
    /// Guard the rewrite with a precondition on what was read.
    pub conditional_writes: bool,
}

impl Default for ExchangePolicy {
    fn default() -> Self {
        Self { degrade_gracefully: true, conditional_writes: false }
    }
}

struct LoadedHistory {
    messages: Vec<Message>,
    condition: WriteCondition,
}

/// Runs one conversation exchange: load history, generate, persist.
#[derive(Clone)]
pub struct ChatService {
    store: Option<Arc<dyn ConversationStore>>,
    agent: Option<Arc<dyn GenerativeClient>>,
    persona: Arc<str>,
    policy: ExchangePolicy,
}

impl ChatService {
    pub fn new(
        store: Option<Arc<dyn ConversationStore>>,
        agent: Option<Arc<dyn GenerativeClient>>,
        policy: ExchangePolicy,
    ) -> Self {
        Self { store, agent, persona: Arc::from(PERSONA), policy }
    }

    pub fn with_persona(mut self, persona: impl Into<Arc<str>>) -> Self {
        self.persona = persona.into();
        self
    }

    pub fn store_initialized(&self) -> bool {
        self.store.is_some()
    }

    pub fn agent_initialized(&self) -> bool {
        self.agent.is_some()
    }

    async fn load_history(&self, conversation_id: &str) -> Result<LoadedHistory, AppError> {
        let Some(store) = &self.store else {
            return Ok(LoadedHistory { messages: Vec::new(), condition: WriteCondition::Overwrite });
        };

        let (messages, condition) = match store.get(conversation_id).await {
            Ok(Some(stored)) => {
                let condition = stored
                    .revision
                    .map(WriteCondition::MatchesRevision)
                    .unwrap_or(WriteCondition::Overwrite);
                (stored.conversation.messages, condition)
            }
            Ok(None) => (Vec::new(), WriteCondition::MustNotExist),
            Err(e) if self.policy.degrade_gracefully => {
                warn!("Continuing without history for conversation {conversation_id}: {e}");
                // Unknown prior state: never clobber it when guarding writes
                (Vec::new(), WriteCondition::MustNotExist)
            }
            Err(e) => return Err(e.into()),
        };

        let condition = if self.policy.conditional_writes { condition } else { WriteCondition::Overwrite };
        Ok(LoadedHistory { messages, condition })
    }

    async fn generate_reply(
        &self,
        agent: &dyn GenerativeClient,
        conversation_id: &str,
        history: &[Message],
        user_message: &str,
    ) -> Result<String, AppError> {
        let prompt = compose_prompt(&self.persona, user_message);
        match agent.generate(history, &prompt).await {
            Ok(reply) => Ok(reply),
            Err(e) if self.policy.degrade_gracefully => {
                warn!("Using fallback reply for conversation {conversation_id}: {e}");
                Ok(FALLBACK_REPLY.to_string())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(&self, conversation: &Conversation, condition: WriteCondition) -> Result<(), AppError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        match store.put(conversation, condition).await {
            Ok(()) => Ok(()),
            Err(e) if self.policy.degrade_gracefully => {
                error!("Conversation {} not saved: {e}", conversation.conversation_id);
                Ok(())
            }
            Err(e @ StoreError::Conflict { .. }) => {
                warn!("{e}");
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Produces and persists one assistant reply for `user_message`.
    pub async fn exchange(
        &self,
        uid: &str,
        conversation_id: &str,
        user_message: &str,
    ) -> Result<String, AppError> {
        // ── Load prior turns ──────────────────────────────────────────────────
        let LoadedHistory { messages, condition } = self.load_history(conversation_id).await?;

        // ── Generate ──────────────────────────────────────────────────────────
        let agent = self.agent.as_deref().ok_or(AppError::AgentNotInitialized)?;
        let reply = self
            .generate_reply(agent, conversation_id, &messages, user_message)
            .await?;

        // ── Rewrite the whole conversation ────────────────────────────────────
        let mut updated = messages;
        updated.push(Message::user(user_message));
        updated.push(Message::assistant(reply.as_str()));
        let conversation = Conversation::new(uid, conversation_id, updated);
        self.persist(&conversation, condition).await?;

        info!(
            "Conversation {conversation_id} now has {} messages",
            conversation.messages.len()
        );
        Ok(reply)
    }
}
