//! OAuth credential exchange and bearer token lifecycle.
//!
//! One [`CredentialManager`] is shared by every request. The held token is
//! replaced whole on renewal, and renewal runs under a lock so concurrent
//! callers that find the token expired wait for a single exchange.

use chrono::{DateTime, TimeDelta, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::error::{AuthError, ConfigError};

/// Seconds subtracted from the token lifetime when computing expiry.
pub const EXPIRY_MARGIN_SECS: i64 = 60;

/// Service credentials and instance location. Immutable once built.
#[derive(Clone)]
pub struct Credential {
    instance_url: String,
    client_id: String,
    client_secret: String,
    username: String,
    password: String,
    grant_type: String,
}

impl Credential {
    pub fn new(
        instance_url: &str,
        client_id: String,
        client_secret: String,
        username: String,
        password: String,
        grant_type: String,
    ) -> Result<Self, ConfigError> {
        let url = instance_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::InvalidInstanceUrl(instance_url.to_string()));
        }
        Ok(Self {
            instance_url: url.trim_end_matches('/').to_string(),
            client_id,
            client_secret,
            username,
            password,
            grant_type,
        })
    }

    /// Base URL of the instance, without a trailing slash.
    pub fn instance_url(&self) -> &str {
        &self.instance_url
    }

    fn token_url(&self) -> String {
        format!("{}/oauth_token.do", self.instance_url)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("instance_url", &self.instance_url)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("grant_type", &self.grant_type)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: String,
    expires_in: i64,
    #[serde(default)]
    token_type: String,
}

/// Bearer token as issued by the OAuth endpoint.
#[derive(Debug, Clone)]
pub struct Token {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub token_type: String,
    pub issued_at: DateTime<Utc>,
}

impl Token {
    /// Issuance time plus lifetime, minus the safety margin.
    ///
    /// A lifetime past what chrono can represent clamps to the far end of
    /// the timeline: never expiring, or already expired when negative.
    pub fn expires_at(&self) -> DateTime<Utc> {
        let lifetime = self.expires_in.saturating_sub(EXPIRY_MARGIN_SECS);
        TimeDelta::try_seconds(lifetime)
            .and_then(|d| self.issued_at.checked_add_signed(d))
            .unwrap_or(if lifetime < 0 {
                DateTime::<Utc>::MIN_UTC
            } else {
                DateTime::<Utc>::MAX_UTC
            })
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }
}

/// Holds the credential and the current token, renewing lazily.
pub struct CredentialManager {
    credential: Credential,
    http: reqwest::Client,
    token: Mutex<Option<Token>>,
}

impl CredentialManager {
    pub fn new(credential: Credential, http: reqwest::Client) -> Self {
        Self {
            credential,
            http,
            token: Mutex::new(None),
        }
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Return a valid access token, exchanging credentials if none is held or
    /// the held one has expired. Single attempt, no retry.
    pub async fn get_token(&self) -> Result<String, AuthError> {
        let mut held = self.token.lock().await;

        if let Some(token) = held.as_ref() {
            if !token.is_expired_at(Utc::now()) {
                return Ok(token.access_token.clone());
            }
            tracing::debug!("Access token expired at {}, renewing", token.expires_at());
        }

        let fresh = self.request_token().await.inspect_err(|e| {
            tracing::error!("Token exchange failed: {}", e);
        })?;
        let access_token = fresh.access_token.clone();
        *held = Some(fresh);
        Ok(access_token)
    }

    /// Headers for an authenticated Table API request.
    pub async fn headers(&self) -> Result<HeaderMap, AuthError> {
        let token = self.get_token().await?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| {
            AuthError::InvalidResponse("access token is not a valid header value".into())
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(AUTHORIZATION, bearer);
        Ok(headers)
    }

    async fn request_token(&self) -> Result<Token, AuthError> {
        let cred = &self.credential;
        let form = [
            ("client_id", cred.client_id.as_str()),
            ("client_secret", cred.client_secret.as_str()),
            ("username", cred.username.as_str()),
            ("password", cred.password.as_str()),
            ("grant_type", cred.grant_type.as_str()),
        ];

        let resp = self.http.post(cred.token_url()).form(&form).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(AuthError::Rejected { status, body });
        }

        let data: TokenResponse = resp
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;

        tracing::info!(
            "Obtained {} access token valid for {}s",
            if data.token_type.is_empty() { "bearer" } else { data.token_type.as_str() },
            data.expires_in
        );

        Ok(Token {
            access_token: data.access_token,
            refresh_token: data.refresh_token,
            expires_in: data.expires_in,
            token_type: data.token_type,
            issued_at: Utc::now(),
        })
    }

    #[cfg(test)]
    pub(crate) async fn set_token(&self, token: Token) {
        *self.token.lock().await = Some(token);
    }
}
