//! In-memory stand-ins for the external collaborators.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::agent::GenerativeClient;
use crate::auth::{CredentialVerifier, Identity};
use crate::db::{ConversationStore, Revision, StoredConversation, WriteCondition};
use crate::errors::{AuthError, GenerationError, StoreError};
use crate::models::{Conversation, Message};

pub const VALID_TOKEN: &str = "valid-token";
pub const EXPIRED_TOKEN: &str = "expired-token";
pub const TEST_UID: &str = "user-1";

pub struct FakeVerifier;

#[async_trait]
impl CredentialVerifier for FakeVerifier {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        match token {
            VALID_TOKEN => Ok(Identity { uid: TEST_UID.to_string() }),
            EXPIRED_TOKEN => Err(AuthError::TokenExpired),
            _ => Err(AuthError::InvalidToken("signature mismatch".to_string())),
        }
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    docs: Mutex<HashMap<String, (Conversation, u64)>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    reads: AtomicUsize,
    conditions: Mutex<Vec<WriteCondition>>,
    bump_on_read: Mutex<Option<String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, conversation: Conversation) {
        let mut docs = self.docs.lock().unwrap();
        let revision = docs.get(&conversation.conversation_id).map_or(1, |(_, r)| r + 1);
        docs.insert(conversation.conversation_id.clone(), (conversation, revision));
    }

    pub fn conversation(&self, id: &str) -> Option<Conversation> {
        self.docs.lock().unwrap().get(id).map(|(c, _)| c.clone())
    }

    pub fn fail_reads(&self) {
        self.fail_reads.store(true, Ordering::SeqCst);
    }

    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Conditions of every `put`, in call order.
    pub fn conditions(&self) -> Vec<WriteCondition> {
        self.conditions.lock().unwrap().clone()
    }

    /// Simulates another writer landing right after the next read of `id`.
    pub fn bump_revision_on_next_read(&self, id: &str) {
        *self.bump_on_read.lock().unwrap() = Some(id.to_string());
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn get(&self, conversation_id: &str) -> Result<Option<StoredConversation>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection reset".to_string()));
        }

        let mut docs = self.docs.lock().unwrap();
        let stored = docs.get(conversation_id).map(|(c, r)| StoredConversation {
            conversation: c.clone(),
            revision: Some(Revision(r.to_string())),
        });

        let mut bump = self.bump_on_read.lock().unwrap();
        if bump.as_deref() == Some(conversation_id) {
            if let Some((_, revision)) = docs.get_mut(conversation_id) {
                *revision += 1;
            }
            *bump = None;
        }
        Ok(stored)
    }

    async fn put(&self, conversation: &Conversation, condition: WriteCondition) -> Result<(), StoreError> {
        self.conditions.lock().unwrap().push(condition.clone());
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("deadline exceeded".to_string()));
        }

        let mut docs = self.docs.lock().unwrap();
        let current = docs.get(&conversation.conversation_id).map(|(_, r)| *r);
        let conflict = match (&condition, current) {
            (WriteCondition::Overwrite, _) => false,
            (WriteCondition::MustNotExist, existing) => existing.is_some(),
            (WriteCondition::MatchesRevision(expected), Some(r)) => expected.0 != r.to_string(),
            (WriteCondition::MatchesRevision(_), None) => true,
        };
        if conflict {
            return Err(StoreError::Conflict { id: conversation.conversation_id.clone() });
        }

        let mut saved = conversation.clone();
        saved.last_updated = Some(Utc::now());
        docs.insert(saved.conversation_id.clone(), (saved, current.map_or(1, |r| r + 1)));
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct AgentCall {
    pub history: Vec<Message>,
    pub prompt: String,
}

/// Generative client answering from a script. The last reply repeats once
/// the script runs out.
pub struct FakeAgent {
    replies: Mutex<VecDeque<String>>,
    last: Mutex<Option<String>>,
    fail: bool,
    calls: Mutex<Vec<AgentCall>>,
}

impl FakeAgent {
    pub fn replying<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            last: Mutex::new(None),
            fail: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self { fail: true, ..Self::replying(Vec::<String>::new()) }
    }

    pub fn calls(&self) -> Vec<AgentCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerativeClient for FakeAgent {
    async fn generate(&self, history: &[Message], prompt: &str) -> Result<String, GenerationError> {
        self.calls.lock().unwrap().push(AgentCall {
            history: history.to_vec(),
            prompt: prompt.to_string(),
        });
        if self.fail {
            return Err(GenerationError::Request("quota exceeded".to_string()));
        }

        let mut last = self.last.lock().unwrap();
        if let Some(next) = self.replies.lock().unwrap().pop_front() {
            *last = Some(next);
        }
        last.clone().ok_or(GenerationError::EmptyReply)
    }
}

/// Generative client that panics, for the top-level failure path.
pub struct PanickingAgent;

#[async_trait]
impl GenerativeClient for PanickingAgent {
    async fn generate(&self, _history: &[Message], _prompt: &str) -> Result<String, GenerationError> {
        panic!("generative client blew up");
    }
}
