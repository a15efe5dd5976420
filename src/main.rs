mod agent;
mod auth;
mod config;
mod db;
mod errors;
mod models;
mod routes;
mod service;
#[cfg(test)]
mod testing;

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};

use crate::agent::{GeminiAgentService, GenerativeClient};
use crate::auth::firebase::FirebaseTokenVerifier;
use crate::auth::CredentialVerifier;
use crate::config::AppConfig;
use crate::db::conversation_repository::{
    read_service_account_key, service_account_token_source, FirestoreConversationRepository,
};
use crate::db::ConversationStore;
use crate::routes::{router, AppState};
use crate::service::chat_service::{ChatService, ExchangePolicy};

struct FirebaseHandles {
    project_id: String,
    verifier: Arc<dyn CredentialVerifier>,
    store: Arc<dyn ConversationStore>,
}

/// Identity verification and Firestore share the service-account key and project.
async fn init_firebase(config: &AppConfig, http: &reqwest::Client) -> anyhow::Result<FirebaseHandles> {
    let key = read_service_account_key(&config.firebase_credentials).await?;
    let project_id = config
        .firebase_project_id
        .clone()
        .or_else(|| key.project_id.clone())
        .context("No Firebase project id: set FIREBASE_PROJECT_ID or use a key file carrying project_id")?;

    let token_source = service_account_token_source(key).await?;
    let store = FirestoreConversationRepository::new(
        http.clone(),
        &config.firestore_base_url,
        &project_id,
        &config.conversations_collection,
        token_source,
    )?;
    let verifier = FirebaseTokenVerifier::new(http.clone(), &project_id);

    Ok(FirebaseHandles {
        project_id,
        verifier: Arc::new(verifier),
        store: Arc::new(store),
    })
}

fn init_agent(config: &AppConfig) -> Option<Arc<dyn GenerativeClient>> {
    let Some(api_key) = config.gemini_api_key() else {
        warn!("GEMINI_API_KEY not found in environment variables");
        return None;
    };
    match GeminiAgentService::new(api_key, &config.gemini_model) {
        Ok(agent) => {
            info!("LeSuccess Tutor AI initialized with model {}", agent.model());
            Some(Arc::new(agent))
        }
        Err(e) => {
            error!("LeSuccess Tutor AI initialization error: {e:#}");
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present (development convenience)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lesuccess_tutor=debug,tower_http=debug".into()),
        )
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;
    let http = reqwest::Client::new();

    // ── Firebase: identity + conversation store ───────────────────────────────
    // A broken setup leaves the handles absent; /api/health reports it.
    let (verifier, store) = match init_firebase(&config, &http).await {
        Ok(handles) => {
            info!("Firebase initialized for project {}", handles.project_id);
            (Some(handles.verifier), Some(handles.store))
        }
        Err(e) => {
            error!("Firebase initialization error: {e:#}");
            (None, None)
        }
    };

    // ── Generative client ─────────────────────────────────────────────────────
    let agent = init_agent(&config);

    // ── Exchange service ──────────────────────────────────────────────────────
    let policy = ExchangePolicy {
        degrade_gracefully: config.degrade_gracefully,
        conditional_writes: config.conditional_writes,
    };
    if policy.degrade_gracefully {
        info!("Store and generation failures will be absorbed (DEGRADE_GRACEFULLY=true)");
    } else {
        info!("Store and generation failures will be reported as errors");
    }
    if policy.conditional_writes {
        info!("Conversation writes are conditional on the revision read");
    }

    let mut chat = ChatService::new(store, agent, policy);
    if let Some(path) = &config.persona_path {
        let persona = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read persona file {}", path.display()))?;
        info!("Using persona from {}", path.display());
        chat = chat.with_persona(persona);
    }

    let app = router(AppState { verifier, chat });

    // ── Listen ────────────────────────────────────────────────────────────────
    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{addr}/");

    axum::serve(listener, app).await?;
    Ok(())
}
