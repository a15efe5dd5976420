use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde_json::Value;
use tracing::{info, warn};

use super::AppState;
use crate::auth::bearer_token;
use crate::errors::{AppError, AuthError};
use crate::models::{ChatRequest, ChatResponse, HealthResponse};

/// GET `/api/health`
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        message: "LeSuccess Tutor API is running".to_string(),
        firebase_initialized: state.chat.store_initialized(),
        ai_initialized: state.chat.agent_initialized(),
    })
}

/// Extracts `(message, conversationId)`. A body that is not a non-empty JSON
/// object is "no data"; an absent, empty or non-string field is "missing".
fn parse_chat_request(body: &[u8]) -> Result<(String, String), AppError> {
    let fields = match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(fields)) if !fields.is_empty() => fields,
        _ => return Err(AppError::MissingBody),
    };
    let request = serde_json::from_value::<ChatRequest>(Value::Object(fields))
        .map_err(|_| AppError::MissingFields)?;

    match (request.message, request.conversation_id) {
        (Some(message), Some(conversation_id)) if !message.is_empty() && !conversation_id.is_empty() => {
            Ok((message, conversation_id))
        }
        _ => Err(AppError::MissingFields),
    }
}

/// POST `/api/chat`: authenticates, then runs one conversation exchange.
///
/// The body is taken raw so authentication is decided before it is parsed.
pub async fn chat_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ChatResponse>, AppError> {
    let token = bearer_token(&headers)?;
    let verifier = state.verifier.as_ref().ok_or(AuthError::NotInitialized)?;
    let identity = verifier.verify(token).await.inspect_err(|e| {
        warn!("Rejected chat request: {e}");
    })?;

    let (message, conversation_id) = parse_chat_request(&body)?;
    info!("Chat request from {} for conversation {conversation_id}", identity.uid);

    let reply = state
        .chat
        .exchange(&identity.uid, &conversation_id, &message)
        .await?;
    Ok(Json(ChatResponse { reply }))
}
