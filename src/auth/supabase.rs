//! Supabase auth provider.
//!
//! Sign-in takes the OAuth callback URL (`void2610flyt://auth-callback#...`),
//! extracts the implicit-flow tokens from it and validates them against
//! `/auth/v1/user`. The resulting session is stored in the settings file so
//! it survives restarts.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::{AuthError, AuthEvent, AuthProvider, AuthResult, AuthSession, AuthUser};
use crate::config::BackendConfig;
use crate::settings::{keys, SettingsExt, SettingsStore};

pub struct SupabaseAuthProvider {
    auth_url: String,
    anon_key: String,
    client: Client,
    settings: Arc<dyn SettingsStore>,
    events: broadcast::Sender<AuthEvent>,
}

impl SupabaseAuthProvider {
    pub fn new(config: &BackendConfig, settings: Arc<dyn SettingsStore>) -> AuthResult<Self> {
        let (events, _) = broadcast::channel(16);
        Ok(Self {
            auth_url: config.auth_url(),
            anon_key: config.anon_key.clone(),
            client: Client::builder().build()?,
            settings,
            events,
        })
    }

    fn load_session(&self) -> Option<AuthSession> {
        self.settings.get_as::<AuthSession>(keys::AUTH_SESSION)
    }

    fn save_session(&self, session: &AuthSession) -> AuthResult<()> {
        self.settings
            .set_as(keys::AUTH_SESSION, session)
            .map_err(|e| AuthError::Storage(e.to_string()))
    }

    fn clear_session(&self) -> AuthResult<()> {
        self.settings
            .remove(keys::AUTH_SESSION)
            .map_err(|e| AuthError::Storage(e.to_string()))
    }

    fn notify(&self, event: AuthEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn public_request(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", self.anon_key))
    }

    async fn fetch_user(&self, access_token: &str) -> AuthResult<AuthUser> {
        let response = self
            .client
            .get(format!("{}/user", self.auth_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Api(parse_api_error(status, &body)));
        }
        let user = response.json::<SupabaseUser>().await?;
        Ok(user.into())
    }
}

#[async_trait]
impl AuthProvider for SupabaseAuthProvider {
    async fn sign_in(&self, redirect_url: &str) -> AuthResult<AuthSession> {
        let tokens = RedirectTokens::parse(redirect_url)?;
        let user = self.fetch_user(&tokens.access_token).await?;
        let session = tokens.into_session(user, chrono::Utc::now().timestamp());
        self.save_session(&session)?;
        self.notify(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self, session: &AuthSession) -> AuthResult<()> {
        let response = self
            .client
            .post(format!("{}/logout", self.auth_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(&session.access_token)
            .send()
            .await;

        // The local session goes regardless of what the server says.
        self.clear_session()?;
        self.notify(AuthEvent::SignedOut);

        let response = response?;
        if !(response.status().is_success() || response.status() == StatusCode::UNAUTHORIZED) {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Api(parse_api_error(status, &body)));
        }
        Ok(())
    }

    async fn current_session(&self) -> AuthResult<Option<AuthSession>> {
        let Some(stored) = self.load_session() else {
            return Ok(None);
        };
        if !stored.is_expired() {
            return Ok(Some(stored));
        }

        match self.refresh(&stored).await {
            Ok(refreshed) => Ok(Some(refreshed)),
            Err(e) => {
                warn!(error = %e, "Failed to refresh persisted session");
                self.clear_session()?;
                Ok(None)
            }
        }
    }

    async fn refresh(&self, session: &AuthSession) -> AuthResult<AuthSession> {
        if session.refresh_token.trim().is_empty() {
            return Err(AuthError::Api("Refresh token must not be empty".to_string()));
        }

        let payload = serde_json::json!({ "refresh_token": session.refresh_token });
        let request = self.public_request(
            self.client
                .post(format!("{}/token", self.auth_url))
                .query(&[("grant_type", "refresh_token")])
                .json(&payload),
        );
        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Api(parse_api_error(status, &body)));
        }

        let refreshed = response
            .json::<TokenResponse>()
            .await?
            .into_session(chrono::Utc::now().timestamp())?;
        debug!(user_id = %refreshed.user.id, "Session refreshed");
        self.save_session(&refreshed)?;
        self.notify(AuthEvent::TokenRefreshed(refreshed.clone()));
        Ok(refreshed)
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

impl fmt::Debug for SupabaseAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupabaseAuthProvider")
            .field("auth_url", &self.auth_url)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Redirect parsing
// ============================================================================

/// Tokens carried by an implicit-flow OAuth callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: Option<i64>,
    pub expires_in: Option<i64>,
}

impl RedirectTokens {
    /// Parses the fragment (or, failing that, the query) of a callback URL.
    pub fn parse(redirect_url: &str) -> AuthResult<Self> {
        let params = callback_params(redirect_url);

        if let Some(description) = params
            .get("error_description")
            .or_else(|| params.get("error"))
        {
            return Err(AuthError::Denied(description.clone()));
        }

        let take = |name: &str| {
            params
                .get(name)
                .filter(|v| !v.is_empty())
                .cloned()
                .ok_or_else(|| AuthError::InvalidRedirect(format!("{name} がありません")))
        };

        Ok(Self {
            access_token: take("access_token")?,
            refresh_token: take("refresh_token")?,
            expires_at: params.get("expires_at").and_then(|v| v.parse().ok()),
            expires_in: params.get("expires_in").and_then(|v| v.parse().ok()),
        })
    }

    /// Absolute expiry, defaulting to one hour from `now`.
    pub fn expires_at(&self, now: i64) -> i64 {
        self.expires_at
            .or_else(|| self.expires_in.map(|secs| now.saturating_add(secs)))
            .unwrap_or(now + 3600)
    }

    /// The session for `user`, with the expiry resolved against `now`.
    pub fn into_session(self, user: AuthUser, now: i64) -> AuthSession {
        let expires_at = self.expires_at(now);
        AuthSession {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user,
        }
    }
}

fn callback_params(url: &str) -> HashMap<String, String> {
    let raw = match url.split_once('#') {
        Some((_, fragment)) => fragment,
        None => url.split_once('?').map(|(_, query)| query).unwrap_or(""),
    };

    raw.split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| {
            let value = urlencoding::decode(&v.replace('+', " "))
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| v.to_string());
            (k.to_string(), value)
        })
        .collect()
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct SupabaseUser {
    id: String,
    email: Option<String>,
}

impl From<SupabaseUser> for AuthUser {
    fn from(value: SupabaseUser) -> Self {
        Self {
            id: value.id,
            email: value.email,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: Option<i64>,
    expires_in: Option<i64>,
    user: Option<SupabaseUser>,
}

impl TokenResponse {
    fn into_session(self, now: i64) -> AuthResult<AuthSession> {
        let expires_at = self
            .expires_at
            .or_else(|| self.expires_in.map(|secs| now.saturating_add(secs)));
        match (self.access_token, self.refresh_token, expires_at, self.user) {
            (Some(access_token), Some(refresh_token), Some(expires_at), Some(user)) => {
                Ok(AuthSession {
                    access_token,
                    refresh_token,
                    expires_at,
                    user: user.into(),
                })
            }
            _ => Err(AuthError::Api(
                "Auth response did not include enough session fields".to_string(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SupabaseErrorResponse {
    error: Option<String>,
    error_description: Option<String>,
    message: Option<String>,
    msg: Option<String>,
}

/// Extracts a readable message from a Supabase error body.
pub(crate) fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<SupabaseErrorResponse>(body) {
        if let Some(message) = payload
            .message
            .or(payload.msg)
            .or(payload.error_description)
            .or(payload.error)
        {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod redirect_tests {
        use super::*;

        #[test]
        fn test_parse_fragment() {
            let tokens = RedirectTokens::parse(
                "void2610flyt://auth-callback#access_token=abc&refresh_token=def&expires_in=3600&token_type=bearer",
            )
            .unwrap();
            assert_eq!(tokens.access_token, "abc");
            assert_eq!(tokens.refresh_token, "def");
            assert_eq!(tokens.expires_in, Some(3600));
            assert_eq!(tokens.expires_at(1_000), 4_600);
        }

        #[test]
        fn test_tokens_into_session() {
            let tokens = RedirectTokens::parse(
                "void2610flyt://auth-callback#access_token=abc&refresh_token=def&expires_in=600",
            )
            .unwrap();
            let user = AuthUser {
                id: "u1".to_string(),
                email: None,
            };

            let session = tokens.into_session(user, 2_000);
            assert_eq!(session.access_token, "abc");
            assert_eq!(session.refresh_token, "def");
            assert_eq!(session.expires_at, 2_600);
            assert_eq!(session.user.id, "u1");
        }

        #[test]
        fn test_parse_query_fallback() {
            let tokens = RedirectTokens::parse(
                "void2610flyt://auth-callback?access_token=a%2Bb&refresh_token=r&expires_at=99",
            )
            .unwrap();
            assert_eq!(tokens.access_token, "a+b");
            assert_eq!(tokens.expires_at(1_000), 99);
        }

        #[test]
        fn test_parse_provider_error() {
            let err = RedirectTokens::parse(
                "void2610flyt://auth-callback#error=access_denied&error_description=User+denied",
            )
            .unwrap_err();
            match err {
                AuthError::Denied(message) => assert_eq!(message, "User denied"),
                other => panic!("unexpected error: {other:?}"),
            }
        }

        #[test]
        fn test_parse_missing_tokens() {
            let err = RedirectTokens::parse("void2610flyt://auth-callback").unwrap_err();
            assert!(matches!(err, AuthError::InvalidRedirect(_)));
        }
    }

    mod wire_tests {
        use super::*;

        #[test]
        fn test_token_response_into_session() {
            let response: TokenResponse = serde_json::from_str(
                r#"{"access_token":"a","refresh_token":"r","expires_in":60,"user":{"id":"u","email":null}}"#,
            )
            .unwrap();
            let session = response.into_session(100).unwrap();
            assert_eq!(session.expires_at, 160);
            assert_eq!(session.user.id, "u");
        }

        #[test]
        fn test_token_response_missing_fields() {
            let response: TokenResponse = serde_json::from_str(r#"{"access_token":"a"}"#).unwrap();
            assert!(response.into_session(0).is_err());
        }

        #[test]
        fn test_parse_api_error() {
            assert_eq!(
                parse_api_error(StatusCode::BAD_REQUEST, r#"{"msg":"Invalid token"}"#),
                "Invalid token (400)"
            );
            assert_eq!(parse_api_error(StatusCode::BAD_GATEWAY, ""), "HTTP 502");
        }
    }
}
