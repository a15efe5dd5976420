use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

pub const INTERNAL_ERROR_MESSAGE: &str =
    "An error occurred while processing your request. Please try again.";

/// Failures of the credential verifier. Every variant answers 401.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("No valid authorization header")]
    MissingBearer,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Identity provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Identity provider not initialized")]
    NotInitialized,
}

/// Failures of the conversation store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Conversation store unreachable: {0}")]
    Unavailable(String),

    #[error("Conversation store credentials rejected: {0}")]
    Credentials(String),

    #[error("Conversation store returned {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Conversation '{id}' was modified concurrently")]
    Conflict { id: String },

    #[error("Malformed conversation document: {0}")]
    Malformed(String),

    #[error("Invalid conversation id '{0}'")]
    InvalidId(String),
}

/// Failures of the generative client.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Generation request failed: {0}")]
    Request(String),

    #[error("Generative service returned an empty reply")]
    EmptyReply,
}

/// Top-level application error, rendered as the JSON error bodies of the
/// HTTP surface.
#[derive(Debug, Error)]
pub enum AppError {
    // ── Authentication ───────────────────────────────────────────────────────
    #[error(transparent)]
    Auth(#[from] AuthError),

    // ── Validation ───────────────────────────────────────────────────────────
    #[error("No JSON data provided")]
    MissingBody,

    #[error("Missing message or conversationId")]
    MissingFields,

    // ── Service availability ─────────────────────────────────────────────────
    #[error("LeSuccess Tutor not initialized")]
    AgentNotInitialized,

    // ── Collaborator failures (only surfaced when not degrading) ─────────────
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    // ── System errors ────────────────────────────────────────────────────────
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::MissingBody | AppError::MissingFields => StatusCode::BAD_REQUEST,
            AppError::Store(StoreError::Conflict { .. }) => StatusCode::CONFLICT,
            AppError::AgentNotInitialized
            | AppError::Store(_)
            | AppError::Generation(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> serde_json::Value {
        match self {
            AppError::Auth(AuthError::MissingBearer) => json!({
                "error": "No valid authorization header",
                "details": "expected 'Authorization: Bearer <token>'",
            }),
            AppError::Auth(e) => json!({
                "error": "Invalid token",
                "details": e.to_string(),
            }),
            AppError::MissingBody | AppError::MissingFields => json!({
                "error": self.to_string(),
            }),
            AppError::Store(StoreError::Conflict { .. }) => json!({
                "error": "Conversation was modified concurrently",
                "details": self.to_string(),
                "message": "Please retry your message.",
            }),
            AppError::AgentNotInitialized => json!({
                "error": self.to_string(),
                "details": "the generative service is not configured",
                "message": INTERNAL_ERROR_MESSAGE,
            }),
            AppError::Store(_) | AppError::Generation(_) | AppError::Internal(_) => json!({
                "error": "Internal server error",
                "details": self.to_string(),
                "message": INTERNAL_ERROR_MESSAGE,
            }),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            // `{:?}` on anyhow carries the cause chain and, when enabled, the backtrace
            error!("Error in chat API: {:?}", self);
        }
        (status, Json(self.body())).into_response()
    }
}
