//! Firebase ID token verification.
//!
//! Tokens are RS256 JWTs signed by Google's `securetoken` service account.
//! The public keys come from a JWK set endpoint and are held for an hour. A
//! `kid` missing from the held set triggers one early refresh, at most once a
//! minute, so rotated keys are picked up.
//! A token is accepted when:
//!
//! - the signature verifies against the key named by its `kid`
//! - `aud` is the Firebase project id
//! - `iss` is `https://securetoken.google.com/<project id>`
//! - `exp` is in the future and `auth_time` is not
//! - `sub` (the uid) is non-empty and at most 128 characters

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

use super::{CredentialVerifier, Identity};
use crate::errors::AuthError;

pub const FIREBASE_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

const KEY_SET_TTL: Duration = Duration::from_secs(3600);
const KEY_REFRESH_INTERVAL: Duration = Duration::from_secs(60);
const MAX_UID_LENGTH: usize = 128;
const CLOCK_LEEWAY_SECS: i64 = 60;

#[derive(Debug, Deserialize)]
struct FirebaseClaims {
    sub: String,
    #[serde(default)]
    auth_time: Option<i64>,
}

struct CachedKeys {
    keys: JwkSet,
    fetched_at: Instant,
}

pub struct FirebaseTokenVerifier {
    http: reqwest::Client,
    project_id: String,
    jwks_url: String,
    keys: Arc<RwLock<Option<CachedKeys>>>,
    /// Minimum age of the held key set before an unknown `kid` refreshes it.
    refresh_interval: Duration,
}

impl FirebaseTokenVerifier {
    pub fn new(http: reqwest::Client, project_id: impl Into<String>) -> Self {
        Self {
            http,
            project_id: project_id.into(),
            jwks_url: FIREBASE_JWKS_URL.to_string(),
            keys: Arc::new(RwLock::new(None)),
            refresh_interval: KEY_REFRESH_INTERVAL,
        }
    }

    fn issuer(&self) -> String {
        format!("https://securetoken.google.com/{}", self.project_id)
    }

    async fn fetch_keys(&self) -> Result<JwkSet, AuthError> {
        debug!("Fetching Firebase signing keys from {}", self.jwks_url);

        let response = self.http.get(&self.jwks_url).send().await.map_err(|e| {
            error!("Failed to fetch Firebase signing keys: {e}");
            AuthError::ProviderUnavailable(format!("Failed to fetch signing keys: {e}"))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            error!("Firebase key endpoint returned {status}");
            return Err(AuthError::ProviderUnavailable(format!(
                "Signing key endpoint returned {status}"
            )));
        }

        response.json::<JwkSet>().await.map_err(|e| {
            error!("Failed to parse Firebase signing keys: {e}");
            AuthError::ProviderUnavailable(format!("Failed to parse signing keys: {e}"))
        })
    }

    async fn refresh_keys(&self) -> Result<JwkSet, AuthError> {
        let keys = self.fetch_keys().await?;
        *self.keys.write().await = Some(CachedKeys { keys: keys.clone(), fetched_at: Instant::now() });
        Ok(keys)
    }

    /// The key named `kid`, from the held set while it is fresh. An unknown
    /// `kid` refreshes the set once it is older than `refresh_interval`.
    async fn signing_key(&self, kid: &str) -> Result<Jwk, AuthError> {
        let held = {
            let cache = self.keys.read().await;
            let held = cache
                .as_ref()
                .filter(|cached| cached.fetched_at.elapsed() < KEY_SET_TTL)
                .map(|cached| (cached.keys.find(kid).cloned(), cached.fetched_at.elapsed()));
            held
        };

        match held {
            Some((Some(jwk), _)) => return Ok(jwk),
            Some((None, age)) if age < self.refresh_interval => return Err(unknown_key(kid)),
            Some((None, _)) => debug!("Signing key '{kid}' not held; refreshing Firebase keys"),
            None => {}
        }

        let keys = self.refresh_keys().await?;
        keys.find(kid).cloned().ok_or_else(|| unknown_key(kid))
    }

    #[cfg(test)]
    async fn seed_keys(&self, keys: JwkSet) {
        *self.keys.write().await = Some(CachedKeys { keys, fetched_at: Instant::now() });
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.project_id]);
        validation.set_issuer(&[self.issuer()]);
        validation.set_required_spec_claims(&["exp", "iat", "aud", "iss", "sub"]);
        validation.leeway = CLOCK_LEEWAY_SECS as u64;
        validation
    }
}

fn unknown_key(kid: &str) -> AuthError {
    AuthError::InvalidToken(format!("unknown signing key '{kid}'"))
}

/// Checks the Firebase-specific claims that `jsonwebtoken` does not know about.
fn identity_from_claims(claims: FirebaseClaims, now: i64) -> Result<Identity, AuthError> {
    if claims.sub.is_empty() || claims.sub.chars().count() > MAX_UID_LENGTH {
        return Err(AuthError::InvalidToken(
            "subject must be a non-empty string of at most 128 characters".to_string(),
        ));
    }
    if let Some(auth_time) = claims.auth_time {
        if auth_time > now + CLOCK_LEEWAY_SECS {
            return Err(AuthError::InvalidToken("auth_time is in the future".to_string()));
        }
    }
    Ok(Identity { uid: claims.sub })
}

#[async_trait]
impl CredentialVerifier for FirebaseTokenVerifier {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let header = decode_header(token)
            .map_err(|e| AuthError::InvalidToken(format!("malformed token: {e}")))?;

        if header.alg != Algorithm::RS256 {
            warn!("Rejected token signed with {:?}", header.alg);
            return Err(AuthError::InvalidToken(format!(
                "expected RS256 signature, got {:?}",
                header.alg
            )));
        }
        let kid = header
            .kid
            .ok_or_else(|| AuthError::InvalidToken("token has no 'kid' header".to_string()))?;

        let jwk = self.signing_key(&kid).await?;
        let key = DecodingKey::from_jwk(&jwk)
            .map_err(|e| AuthError::InvalidToken(format!("unusable signing key: {e}")))?;

        let data = decode::<FirebaseClaims>(token, &key, &self.validation()).map_err(|e| {
            use jsonwebtoken::errors::ErrorKind;
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken(e.to_string()),
            }
        })?;

        identity_from_claims(data.claims, chrono::Utc::now().timestamp())
    }
}
