//! Process configuration read from the environment (and `.env`, loaded by
//! `main` through dotenvy).
//!
//! Variables are unprefixed and map one-to-one onto [`AppConfig`] fields,
//! e.g. `GEMINI_API_KEY` → `gemini_api_key`.

use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_bind_host")]
    pub bind_host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Generative service key. The client stays uninitialized without it.
    #[serde(default)]
    pub gemini_api_key: Option<String>,

    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,

    /// Service-account key file for Firestore and the Firebase project.
    #[serde(default = "default_firebase_credentials")]
    pub firebase_credentials: PathBuf,

    /// Overrides the `project_id` found in the service-account key.
    #[serde(default)]
    pub firebase_project_id: Option<String>,

    #[serde(default = "default_firestore_base_url")]
    pub firestore_base_url: String,

    #[serde(default = "default_conversations_collection")]
    pub conversations_collection: String,

    /// Absorb store and generation failures instead of answering 5xx.
    #[serde(default = "default_true")]
    pub degrade_gracefully: bool,

    /// Guard conversation rewrites with a precondition on the revision read.
    #[serde(default)]
    pub conditional_writes: bool,

    /// File whose contents replace the built-in persona instructions.
    #[serde(default)]
    pub persona_path: Option<PathBuf>,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::from_environment(config::Environment::default())
    }

    fn from_environment(env: config::Environment) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(env.try_parsing(true))
            .build()?
            .try_deserialize()
    }

    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }

    /// The API key, if one is set and not blank.
    pub fn gemini_api_key(&self) -> Option<&str> {
        self.gemini_api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}

fn default_bind_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5001
}

fn default_gemini_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_firebase_credentials() -> PathBuf {
    PathBuf::from("serviceAccountKey.json")
}

fn default_firestore_base_url() -> String {
    "https://firestore.googleapis.com/v1".to_string()
}

fn default_conversations_collection() -> String {
    "conversations".to_string()
}

fn default_true() -> bool {
    true
}
