use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use reqwest::header::AUTHORIZATION;
use reqwest::{StatusCode, Url};
use serde_json::{json, Value};
use tracing::{debug, error};
use yup_oauth2::{ServiceAccountAuthenticator, ServiceAccountKey};

use super::document::{decode_document, encode_fields, FirestoreDocument, LAST_UPDATED_FIELD};
use super::{validate_conversation_id, ConversationStore, StoredConversation, WriteCondition};
use crate::errors::StoreError;
use crate::models::Conversation;

const DATASTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";

/// Produces an OAuth2 access token for each Firestore call. The authenticator
/// behind it caches and refreshes tokens on its own.
pub type AccessTokenSource = Arc<dyn Fn() -> BoxFuture<'static, Result<String, StoreError>> + Send + Sync>;

pub async fn read_service_account_key(path: &Path) -> Result<ServiceAccountKey, StoreError> {
    yup_oauth2::read_service_account_key(path).await.map_err(|e| {
        StoreError::Credentials(format!("Failed to load service account key from {}: {e}", path.display()))
    })
}

pub async fn service_account_token_source(key: ServiceAccountKey) -> Result<AccessTokenSource, StoreError> {
    let auth = ServiceAccountAuthenticator::builder(key)
        .build()
        .await
        .map_err(|e| StoreError::Credentials(e.to_string()))?;
    let auth = Arc::new(auth);

    Ok(Arc::new(move || {
        let auth = Arc::clone(&auth);
        async move {
            let token = auth
                .token(&[DATASTORE_SCOPE])
                .await
                .map_err(|e| StoreError::Credentials(e.to_string()))?;
            token
                .token()
                .map(str::to_string)
                .ok_or_else(|| StoreError::Credentials("OAuth token was None".to_string()))
        }
        .boxed()
    }))
}

/// Conversation documents in a Firestore collection, over the REST API.
#[derive(Clone)]
pub struct FirestoreConversationRepository {
    http: reqwest::Client,
    base_url: Url,
    project_id: String,
    collection: String,
    access_token: AccessTokenSource,
}

impl FirestoreConversationRepository {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        project_id: impl Into<String>,
        collection: impl Into<String>,
        access_token: AccessTokenSource,
    ) -> Result<Self, StoreError> {
        let base_url = Url::parse(base_url)
            .ok()
            .filter(|u| !u.cannot_be_a_base())
            .ok_or_else(|| StoreError::Unavailable(format!("Invalid Firestore base URL '{base_url}'")))?;
        Ok(Self {
            http,
            base_url,
            project_id: project_id.into(),
            collection: collection.into(),
            access_token,
        })
    }

    /// Resource name of a document, as used inside request bodies.
    fn document_name(&self, conversation_id: &str) -> String {
        format!(
            "projects/{}/databases/(default)/documents/{}/{}",
            self.project_id, self.collection, conversation_id
        )
    }

    fn url(&self, tail: &[&str]) -> Result<Url, StoreError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::Unavailable("Firestore base URL cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(["projects", self.project_id.as_str(), "databases", "(default)"])
            .extend(tail);
        Ok(url)
    }

    fn document_url(&self, conversation_id: &str) -> Result<Url, StoreError> {
        self.url(&["documents", self.collection.as_str(), conversation_id])
    }

    fn commit_url(&self) -> Result<Url, StoreError> {
        self.url(&["documents:commit"])
    }

    fn commit_body(&self, conversation: &Conversation, condition: &WriteCondition) -> Value {
        let mut write = json!({
            "update": {
                "name": self.document_name(&conversation.conversation_id),
                "fields": encode_fields(conversation),
            },
            "updateTransforms": [
                { "fieldPath": LAST_UPDATED_FIELD, "setToServerValue": "REQUEST_TIME" }
            ],
        });
        match condition {
            WriteCondition::Overwrite => {}
            WriteCondition::MustNotExist => {
                write["currentDocument"] = json!({ "exists": false });
            }
            WriteCondition::MatchesRevision(revision) => {
                write["currentDocument"] = json!({ "updateTime": revision.0 });
            }
        }
        json!({ "writes": [write] })
    }
}

/// Whether a failed commit was a precondition failure rather than a fault.
fn is_precondition_failure(status: StatusCode, body: &str) -> bool {
    if status == StatusCode::CONFLICT {
        return true;
    }
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error")?.get("status")?.as_str().map(str::to_owned))
        .is_some_and(|s| matches!(s.as_str(), "FAILED_PRECONDITION" | "ALREADY_EXISTS" | "ABORTED"))
}

#[async_trait]
impl ConversationStore for FirestoreConversationRepository {
    async fn get(&self, conversation_id: &str) -> Result<Option<StoredConversation>, StoreError> {
        validate_conversation_id(conversation_id)?;
        let token = (self.access_token)().await?;

        let response = self
            .http
            .get(self.document_url(conversation_id)?)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .send()
            .await
            .map_err(|e| {
                error!("Failed to fetch conversation {conversation_id}: {e}");
                StoreError::Unavailable(e.to_string())
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                debug!("Conversation {conversation_id} does not exist yet");
                Ok(None)
            }
            status if status.is_success() => {
                let doc: FirestoreDocument = response
                    .json()
                    .await
                    .map_err(|e| StoreError::Malformed(e.to_string()))?;
                decode_document(&doc, conversation_id).map(Some)
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                error!("Firestore returned {status} reading conversation {conversation_id}");
                Err(StoreError::Rejected { status: status.as_u16(), body })
            }
        }
    }

    async fn put(&self, conversation: &Conversation, condition: WriteCondition) -> Result<(), StoreError> {
        let conversation_id = conversation.conversation_id.as_str();
        validate_conversation_id(conversation_id)?;
        let token = (self.access_token)().await?;

        let response = self
            .http
            .post(self.commit_url()?)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .json(&self.commit_body(conversation, &condition))
            .send()
            .await
            .map_err(|e| {
                error!("Failed to save conversation {conversation_id}: {e}");
                StoreError::Unavailable(e.to_string())
            })?;

        let status = response.status();
        if status.is_success() {
            debug!(
                "Saved conversation {conversation_id} ({} messages)",
                conversation.messages.len()
            );
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        if condition != WriteCondition::Overwrite && is_precondition_failure(status, &body) {
            return Err(StoreError::Conflict { id: conversation_id.to_string() });
        }
        error!("Firestore returned {status} saving conversation {conversation_id}");
        Err(StoreError::Rejected { status: status.as_u16(), body })
    }
}
