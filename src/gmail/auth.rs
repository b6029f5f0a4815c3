//! Google credentials.
//!
//! Two kinds of credentials are involved:
//! - **User OAuth** for the Gmail API. Client secrets (`credentials.json`)
//!   come from the Google Cloud console; the granted token is stored as JSON
//!   in `token.json` and refreshed when it expires.
//! - **Service account** for Pub/Sub. A signed RS256 JWT is exchanged for an
//!   access token at the account's `token_uri`.
//!
//! Both are exposed through [`TokenProvider`], which the API clients call
//! before each request.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::config::GmailConfig;
use crate::error::{json_or_status, ApiError};

pub const GMAIL_SCOPE: &str = "https://www.googleapis.com/auth/gmail.modify";
pub const PUBSUB_SCOPE: &str = "https://www.googleapis.com/auth/pubsub";

/// Tokens this close to expiry are treated as expired.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Source of bearer tokens for API calls.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String>;
}

/// A fixed token, for callers that already hold one.
pub struct StaticToken(pub String);

#[async_trait]
impl TokenProvider for StaticToken {
    async fn access_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

// ============ Client secrets ============

#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    "https://accounts.google.com/o/oauth2/auth".to_string()
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

#[derive(Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    /// Parse a console download: `{"installed": {...}}` or `{"web": {...}}`.
    pub fn parse(content: &str) -> Result<Self> {
        let file: ClientSecretsFile =
            serde_json::from_str(content).context("Invalid client secrets JSON")?;
        file.installed
            .or(file.web)
            .context("Client secrets must contain an 'installed' or 'web' section")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Client secrets not found: {}", path.display()))?;
        Self::parse(&content)
    }
}

// ============ Stored user token ============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl StoredToken {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(exp) => exp - Duration::seconds(EXPIRY_MARGIN_SECS) > now,
            None => !self.access_token.is_empty(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read token file {}", path.display()))?;
        match serde_json::from_str(&content) {
            Ok(token) => {
                tracing::info!("Loaded existing user OAuth credentials from '{}'.", path.display());
                Ok(Some(token))
            }
            Err(e) => {
                tracing::warn!("Ignoring unreadable token file {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Failed to write token file {}", path.display()))?;
        tracing::info!("Saved user OAuth credentials to '{}'.", path.display());
        Ok(())
    }

    /// Build from a token endpoint response. A response without a refresh
    /// token keeps `previous_refresh`.
    pub fn from_response(
        json: &serde_json::Value,
        previous_refresh: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let access_token = json
            .get("access_token")
            .and_then(|v| v.as_str())
            .context("Token response missing access_token")?
            .to_string();
        let refresh_token = json
            .get("refresh_token")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or(previous_refresh);
        let expires_at = json
            .get("expires_in")
            .and_then(|v| v.as_i64())
            .map(|secs| now + Duration::seconds(secs));
        let scope = json
            .get("scope")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        Ok(Self {
            access_token,
            refresh_token,
            expires_at,
            scope,
        })
    }
}

async fn post_token_form(token_uri: &str, form: &[(&str, &str)]) -> Result<serde_json::Value> {
    let resp = reqwest::Client::new()
        .post(token_uri)
        .form(form)
        .send()
        .await
        .map_err(|source| ApiError::Transport {
            service: "OAuth",
            source,
        })?;
    Ok(json_or_status("OAuth", resp).await?)
}

/// Exchange a refresh token for a new access token.
pub async fn refresh_token(secrets: &ClientSecrets, token: &StoredToken) -> Result<StoredToken> {
    let refresh = token
        .refresh_token
        .as_deref()
        .context("Stored token has no refresh_token")?;
    tracing::info!("Refreshing expired user OAuth credentials.");
    let json = post_token_form(
        &secrets.token_uri,
        &[
            ("client_id", secrets.client_id.as_str()),
            ("client_secret", secrets.client_secret.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh),
        ],
    )
    .await
    .context("Token refresh failed")?;
    StoredToken::from_response(&json, token.refresh_token.clone(), Utc::now())
}

/// Consent page URL for the installed-app flow.
pub fn consent_url(secrets: &ClientSecrets, redirect_uri: &str, state: &str) -> Result<String> {
    let url = reqwest::Url::parse_with_params(
        &secrets.auth_uri,
        &[
            ("response_type", "code"),
            ("client_id", secrets.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("scope", GMAIL_SCOPE),
            ("access_type", "offline"),
            ("prompt", "consent"),
            ("state", state),
        ],
    )
    .with_context(|| format!("Invalid auth_uri: {}", secrets.auth_uri))?;
    Ok(url.to_string())
}

fn random_state() -> String {
    let mut hasher = Sha256::new();
    hasher.update(
        Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or_default()
            .to_le_bytes(),
    );
    hasher.update(std::process::id().to_le_bytes());
    format!("{:x}", hasher.finalize())[..32].to_string()
}

/// Wait for one redirect on `127.0.0.1:port` and return its query parameters.
async fn receive_redirect(port: u16) -> Result<HashMap<String, String>> {
    use axum::extract::Query;
    use axum::routing::get;

    let (tx, rx) = tokio::sync::oneshot::channel::<HashMap<String, String>>();
    let tx = std::sync::Arc::new(std::sync::Mutex::new(Some(tx)));

    let app = axum::Router::new().route(
        "/",
        get(move |Query(params): Query<HashMap<String, String>>| {
            let tx = tx.clone();
            async move {
                if let Some(sender) = tx.lock().ok().and_then(|mut guard| guard.take()) {
                    let _ = sender.send(params);
                }
                "The authentication flow has completed. You may close this window."
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .with_context(|| format!("Failed to listen on localhost:{}", port))?;
    let (done_tx, done_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = done_rx.await;
            })
            .await
    });

    let params = rx.await.context("OAuth redirect server stopped")?;
    let _ = done_tx.send(());
    let _ = server.await;
    Ok(params)
}

/// Run the installed-app consent flow and return the granted token.
pub async fn run_local_flow(secrets: &ClientSecrets, port: u16) -> Result<StoredToken> {
    let redirect_uri = format!("http://localhost:{}/", port);
    let state = random_state();
    let url = consent_url(secrets, &redirect_uri, &state)?;

    eprintln!("Please visit this URL to authorize this application:\n{}", url);
    tracing::info!("Waiting for the OAuth redirect on {}", redirect_uri);

    let params = receive_redirect(port).await?;
    if let Some(err) = params.get("error") {
        bail!("Authorization denied: {}", err);
    }
    if params.get("state").map(String::as_str) != Some(state.as_str()) {
        bail!("OAuth state mismatch");
    }
    let code = params.get("code").context("OAuth redirect carried no code")?;

    let json = post_token_form(
        &secrets.token_uri,
        &[
            ("client_id", secrets.client_id.as_str()),
            ("client_secret", secrets.client_secret.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
        ],
    )
    .await
    .context("Authorization code exchange failed")?;
    StoredToken::from_response(&json, None, Utc::now())
}

/// User OAuth credentials backed by the token file.
pub struct UserCredentials {
    secrets: ClientSecrets,
    token_file: PathBuf,
    token: Mutex<StoredToken>,
}

impl UserCredentials {
    /// Load the stored token, refreshing it or running the consent flow as needed.
    pub async fn authorize(config: &GmailConfig) -> Result<Self> {
        let secrets = ClientSecrets::load(&config.credentials_file)?;
        let stored = StoredToken::load(&config.token_file)?;

        let token = match stored {
            Some(token) if token.is_valid() => token,
            Some(token) if token.refresh_token.is_some() => {
                let refreshed = refresh_token(&secrets, &token).await?;
                refreshed.save(&config.token_file)?;
                refreshed
            }
            _ => {
                tracing::info!(
                    "Initiating OAuth flow using '{}'.",
                    config.credentials_file.display()
                );
                let granted = run_local_flow(&secrets, config.oauth_port).await?;
                granted.save(&config.token_file)?;
                granted
            }
        };

        Ok(Self {
            secrets,
            token_file: config.token_file.clone(),
            token: Mutex::new(token),
        })
    }
}

#[async_trait]
impl TokenProvider for UserCredentials {
    async fn access_token(&self) -> Result<String> {
        let mut token = self.token.lock().await;
        if !token.is_valid() {
            let refreshed = refresh_token(&self.secrets, &token).await?;
            refreshed.save(&self.token_file)?;
            *token = refreshed;
        }
        Ok(token.access_token.clone())
    }
}

// ============ Service account ============

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl ServiceAccountKey {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Service account file not found at '{}'", path.display()))?;
        let key: Self = serde_json::from_str(&content)
            .with_context(|| format!("Invalid service account JSON: {}", path.display()))?;
        tracing::info!(
            "Loaded service account credentials from '{}'.",
            path.display()
        );
        Ok(key)
    }
}

#[derive(Debug, Serialize)]
pub struct JwtClaims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

pub fn jwt_claims(key: &ServiceAccountKey, scope: &str, now: DateTime<Utc>) -> JwtClaims {
    let iat = now.timestamp();
    JwtClaims {
        iss: key.client_email.clone(),
        scope: scope.to_string(),
        aud: key.token_uri.clone(),
        iat,
        exp: iat + 3600,
    }
}

/// Service-account credentials, caching the exchanged token until it expires.
pub struct ServiceAccountCredentials {
    key: ServiceAccountKey,
    scope: String,
    cached: Mutex<Option<StoredToken>>,
}

impl ServiceAccountCredentials {
    pub fn new(key: ServiceAccountKey, scope: &str) -> Self {
        Self {
            key,
            scope: scope.to_string(),
            cached: Mutex::new(None),
        }
    }

    pub fn load(path: &Path, scope: &str) -> Result<Self> {
        Ok(Self::new(ServiceAccountKey::load(path)?, scope))
    }

    fn signed_assertion(&self) -> Result<String> {
        let mut header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();
        let encoding_key = jsonwebtoken::EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .context("Service account private_key is not a valid RSA PEM")?;
        let claims = jwt_claims(&self.key, &self.scope, Utc::now());
        jsonwebtoken::encode(&header, &claims, &encoding_key).context("Failed to sign JWT")
    }
}

#[async_trait]
impl TokenProvider for ServiceAccountCredentials {
    async fn access_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_valid()) {
            return Ok(token.access_token.clone());
        }

        let assertion = self.signed_assertion()?;
        let json = post_token_form(
            &self.key.token_uri,
            &[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ],
        )
        .await
        .context("Service account token exchange failed")?;
        let token = StoredToken::from_response(&json, None, Utc::now())?;
        let access = token.access_token.clone();
        *cached = Some(token);
        Ok(access)
    }
}
