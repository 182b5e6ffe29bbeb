//! Google service-account authentication.
//!
//! The key blob is parsed straight from configuration and never touches disk.
//! Access tokens are obtained with the JWT bearer grant and cached until
//! shortly before they expire.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::RwLock;

pub const SPREADSHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
pub const DRIVE_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/drive.readonly";

const TOKEN_LIFETIME_SECS: i64 = 3600;
/// Tokens are refreshed this long before Google would reject them.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("Invalid service account key: {0}")]
    InvalidKey(String),
    #[error("Failed to sign token request: {0}")]
    Signing(String),
    #[error("Token request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Token endpoint rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

impl ServiceAccountKey {
    pub fn from_json(json: &str) -> Result<Self, CredentialsError> {
        let key: ServiceAccountKey =
            serde_json::from_str(json).map_err(|e| CredentialsError::InvalidKey(e.to_string()))?;
        if key.client_email.is_empty() {
            return Err(CredentialsError::InvalidKey(
                "client_email is empty".to_string(),
            ));
        }
        if !key.private_key.contains("PRIVATE KEY") {
            return Err(CredentialsError::InvalidKey(
                "private_key is not a PEM block".to_string(),
            ));
        }
        Ok(key)
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Source of OAuth bearer tokens for Google API calls.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self) -> Result<String, CredentialsError>;
}

/// A fixed token, for local API emulators.
pub struct StaticToken(pub String);

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> Result<String, CredentialsError> {
        Ok(self.0.clone())
    }
}

/// Hands out bearer tokens for a service account, refreshing on demand.
pub struct TokenSource {
    client: Client,
    key: ServiceAccountKey,
    scopes: String,
    cached: RwLock<Option<CachedToken>>,
}

impl TokenSource {
    pub fn new(client: Client, key: ServiceAccountKey, scopes: &[&str]) -> Self {
        Self {
            client,
            key,
            scopes: scopes.join(" "),
            cached: RwLock::new(None),
        }
    }

    pub fn client_email(&self) -> &str {
        &self.key.client_email
    }

    async fn fetch_token(&self) -> Result<CachedToken, CredentialsError> {
        let now = Utc::now();
        let jwt = signed_assertion(&self.key, &self.scopes, now)?;

        let resp = self
            .client
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", jwt.as_str()),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(CredentialsError::Rejected { status, body });
        }

        let token: TokenResponse = resp.json().await?;
        let lifetime = token.expires_in.unwrap_or(TOKEN_LIFETIME_SECS);
        tracing::debug!(account = %self.key.client_email, lifetime, "Obtained access token");

        Ok(CachedToken {
            value: token.access_token,
            expires_at: now + Duration::seconds(lifetime - EXPIRY_MARGIN_SECS),
        })
    }
}

#[async_trait]
impl TokenProvider for TokenSource {
    /// Return a valid access token, fetching a new one if the cache is stale.
    async fn token(&self) -> Result<String, CredentialsError> {
        {
            let cached = self.cached.read().await;
            if let Some(token) = cached.as_ref() {
                if token.expires_at > Utc::now() {
                    return Ok(token.value.clone());
                }
            }
        }

        let mut cached = self.cached.write().await;
        // Another task may have refreshed while we waited for the write lock
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Utc::now() {
                return Ok(token.value.clone());
            }
        }

        let fresh = self.fetch_token().await?;
        let value = fresh.value.clone();
        *cached = Some(fresh);
        Ok(value)
    }
}

fn signed_assertion(
    key: &ServiceAccountKey,
    scopes: &str,
    now: DateTime<Utc>,
) -> Result<String, CredentialsError> {
    let iat = now.timestamp();
    let claims = serde_json::json!({
        "iss": key.client_email,
        "scope": scopes,
        "aud": key.token_uri,
        "iat": iat,
        "exp": iat + TOKEN_LIFETIME_SECS,
    });

    // Build JWT (header.claims.signature)
    let header = base64_url_encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let payload = base64_url_encode(claims.to_string().as_bytes());
    let unsigned = format!("{header}.{payload}");

    let signature = sign_rs256(unsigned.as_bytes(), &key.private_key)?;
    Ok(format!("{unsigned}.{}", base64_url_encode(&signature)))
}

fn base64_url_encode(data: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(data)
}

fn sign_rs256(data: &[u8], private_key_pem: &str) -> Result<Vec<u8>, CredentialsError> {
    use base64::Engine;

    // Strip PEM armor; the JSON blob may carry literal "\n" sequences
    let der_b64: String = private_key_pem
        .replace("\\n", "\n")
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with("-----"))
        .collect();
    let der = base64::engine::general_purpose::STANDARD
        .decode(der_b64)
        .map_err(|e| CredentialsError::InvalidKey(format!("private_key is not base64: {e}")))?;

    let key_pair = ring::signature::RsaKeyPair::from_pkcs8(&der)
        .map_err(|e| CredentialsError::InvalidKey(format!("Failed to parse RSA key: {e}")))?;

    let mut signature = vec![0u8; key_pair.public().modulus_len()];
    key_pair
        .sign(
            &ring::signature::RSA_PKCS1_SHA256,
            &ring::rand::SystemRandom::new(),
            data,
            &mut signature,
        )
        .map_err(|e| CredentialsError::Signing(e.to_string()))?;

    Ok(signature)
}
