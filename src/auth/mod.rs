//! Authentication session holder.
//!
//! The [`AuthManager`] owns the current [`AuthSession`] and publishes it
//! through a `watch` channel. Other components only get an [`AuthHandle`],
//! which reads the identity and access token but cannot change them.
//!
//! Sign-in is "redirect URL in, session out": the browser flow happens
//! elsewhere and hands the OAuth callback URL to [`AuthManager::sign_in`].

mod error;
pub mod supabase;

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

use crate::settings::{keys, SettingsExt, SettingsStore};

pub use error::{AuthError, AuthResult};
pub use supabase::SupabaseAuthProvider;

/// Sessions expiring within this many seconds count as expired.
const EXPIRY_SKEW_SECONDS: i64 = 60;

// ============================================================================
// Session types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub email: Option<String>,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix timestamp (seconds).
    pub expires_at: i64,
    pub user: AuthUser,
}

impl AuthSession {
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(chrono::Utc::now().timestamp())
    }

    #[must_use]
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at <= now + EXPIRY_SKEW_SECONDS
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSession")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

/// Read-only view of who is signed in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthIdentity {
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub is_authenticated: bool,
}

impl From<Option<&AuthSession>> for AuthIdentity {
    fn from(session: Option<&AuthSession>) -> Self {
        match session {
            Some(session) => Self {
                user_id: Some(session.user.id.clone()),
                email: session.user.email.clone(),
                is_authenticated: true,
            },
            None => Self::default(),
        }
    }
}

/// Session changes reported by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(AuthSession),
    SignedOut,
    TokenRefreshed(AuthSession),
}

// ============================================================================
// AuthProvider
// ============================================================================

/// Identity backend.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Completes an OAuth sign-in from the callback URL.
    async fn sign_in(&self, redirect_url: &str) -> AuthResult<AuthSession>;

    /// Revokes the session remotely and forgets it locally.
    async fn sign_out(&self, session: &AuthSession) -> AuthResult<()>;

    /// Returns the persisted session, refreshing it if it expired.
    async fn current_session(&self) -> AuthResult<Option<AuthSession>>;

    /// Exchanges the refresh token for a new session.
    async fn refresh(&self, session: &AuthSession) -> AuthResult<AuthSession>;

    /// Session change notifications.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}

// ============================================================================
// AuthHandle
// ============================================================================

/// Read-only access to the current session.
#[derive(Debug, Clone)]
pub struct AuthHandle {
    rx: watch::Receiver<Option<AuthSession>>,
}

impl AuthHandle {
    /// A handle that is never authenticated.
    pub fn signed_out() -> Self {
        let (_tx, rx) = watch::channel(None);
        Self { rx }
    }

    pub fn identity(&self) -> AuthIdentity {
        AuthIdentity::from(self.rx.borrow().as_ref())
    }

    pub fn access_token(&self) -> Option<String> {
        self.rx
            .borrow()
            .as_ref()
            .map(|session| session.access_token.clone())
    }

    pub fn user_id(&self) -> Option<String> {
        self.rx
            .borrow()
            .as_ref()
            .map(|session| session.user.id.clone())
    }

    /// Waits for the next session change (sign-in, refresh or sign-out).
    /// Returns false once the owning manager is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

// ============================================================================
// AuthManager
// ============================================================================

/// Owns the current session.
#[derive(Clone)]
pub struct AuthManager {
    provider: Option<Arc<dyn AuthProvider>>,
    settings: Arc<dyn SettingsStore>,
    session: Arc<watch::Sender<Option<AuthSession>>>,
}

impl AuthManager {
    /// `provider` is `None` when no backend is configured.
    pub fn new(provider: Option<Arc<dyn AuthProvider>>, settings: Arc<dyn SettingsStore>) -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            provider,
            settings,
            session: Arc::new(tx),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }

    pub fn handle(&self) -> AuthHandle {
        AuthHandle {
            rx: self.session.subscribe(),
        }
    }

    pub fn identity(&self) -> AuthIdentity {
        AuthIdentity::from(self.session.borrow().as_ref())
    }

    /// Provider notifications, if a provider is configured.
    pub fn subscribe(&self) -> Option<broadcast::Receiver<AuthEvent>> {
        self.provider.as_ref().map(|provider| provider.subscribe())
    }

    /// Restores the previous session if the user signed in before.
    pub async fn restore(&self) -> AuthResult<AuthIdentity> {
        let Some(provider) = &self.provider else {
            return Ok(AuthIdentity::default());
        };
        if !self
            .settings
            .get_as::<bool>(keys::HAS_USER_LOGGED_IN)
            .unwrap_or(false)
        {
            return Ok(AuthIdentity::default());
        }

        let session = provider.current_session().await?;
        if let Some(session) = &session {
            info!(user_id = %session.user.id, "Session restored");
        }
        self.session.send_replace(session);
        Ok(self.identity())
    }

    /// Completes sign-in from the OAuth callback URL.
    pub async fn sign_in(&self, redirect_url: &str) -> AuthResult<AuthIdentity> {
        let provider = self.provider.as_ref().ok_or(AuthError::NotConfigured)?;
        let session = provider.sign_in(redirect_url).await?;

        info!(user_id = %session.user.id, "Signed in");
        self.session.send_replace(Some(session));
        self.set_logged_in(true);
        Ok(self.identity())
    }

    /// Signs out. The local session is dropped even if the remote call
    /// fails.
    pub async fn sign_out(&self) -> AuthResult<()> {
        let current = self.session.send_replace(None);
        self.set_logged_in(false);

        if let (Some(provider), Some(session)) = (&self.provider, current) {
            if let Err(e) = provider.sign_out(&session).await {
                warn!(error = %e, "Remote sign-out failed");
                return Err(e);
            }
        }
        info!("Signed out");
        Ok(())
    }

    /// Refreshes the session when it is about to expire.
    pub async fn refresh_if_expired(&self) -> AuthResult<()> {
        let Some(provider) = &self.provider else {
            return Ok(());
        };
        let current = self.session.borrow().clone();
        let Some(session) = current.filter(AuthSession::is_expired) else {
            return Ok(());
        };

        let refreshed = provider.refresh(&session).await?;
        self.session.send_replace(Some(refreshed));
        Ok(())
    }

    /// Applies a provider notification. Returns true if the identity
    /// changed.
    pub fn apply_event(&self, event: AuthEvent) -> bool {
        let before = self.identity();
        match event {
            AuthEvent::SignedIn(session) | AuthEvent::TokenRefreshed(session) => {
                self.session.send_replace(Some(session));
            }
            AuthEvent::SignedOut => {
                self.session.send_replace(None);
            }
        }
        self.identity() != before
    }

    fn set_logged_in(&self, logged_in: bool) {
        if let Err(e) = self.settings.set_as(keys::HAS_USER_LOGGED_IN, &logged_in) {
            warn!(error = %e, "Failed to persist login flag");
        }
    }
}

impl fmt::Debug for AuthManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthManager")
            .field("configured", &self.is_configured())
            .field("identity", &self.identity())
            .finish()
    }
}

// ============================================================================
// MockAuthProvider
// ============================================================================

/// Scriptable provider for tests.
#[derive(Debug)]
pub struct MockAuthProvider {
    session: Mutex<Option<AuthSession>>,
    should_fail: AtomicBool,
    sign_out_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    events: broadcast::Sender<AuthEvent>,
}

impl Default for MockAuthProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAuthProvider {
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            session: Mutex::new(None),
            should_fail: AtomicBool::new(false),
            sign_out_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            events,
        }
    }

    /// Builds a session for `user_id` valid for an hour.
    #[must_use]
    pub fn session_for(user_id: &str) -> AuthSession {
        AuthSession {
            access_token: format!("access-{user_id}"),
            refresh_token: format!("refresh-{user_id}"),
            expires_at: chrono::Utc::now().timestamp() + 3600,
            user: AuthUser {
                id: user_id.to_string(),
                email: Some(format!("{user_id}@example.com")),
            },
        }
    }

    /// Session returned by the next sign-in or restore.
    pub fn set_session(&self, session: Option<AuthSession>) {
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = session;
    }

    pub fn set_should_fail(&self, should_fail: bool) {
        self.should_fail.store(should_fail, Ordering::SeqCst);
    }

    #[must_use]
    pub fn sign_out_count(&self) -> usize {
        self.sign_out_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn refresh_count(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Broadcasts an event as a real provider would.
    pub fn emit(&self, event: AuthEvent) {
        let _ = self.events.send(event);
    }

    fn check(&self) -> AuthResult<()> {
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(AuthError::Api("Mock failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl AuthProvider for MockAuthProvider {
    async fn sign_in(&self, redirect_url: &str) -> AuthResult<AuthSession> {
        self.check()?;
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| AuthError::InvalidRedirect(redirect_url.to_string()))
    }

    async fn sign_out(&self, _session: &AuthSession) -> AuthResult<()> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.emit(AuthEvent::SignedOut);
        Ok(())
    }

    async fn current_session(&self) -> AuthResult<Option<AuthSession>> {
        self.check()?;
        Ok(self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn refresh(&self, session: &AuthSession) -> AuthResult<AuthSession> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let mut refreshed = Self::session_for(&session.user.id);
        refreshed.access_token = format!("{}-refreshed", session.access_token);
        Ok(refreshed)
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MemorySettingsStore;

    fn manager() -> (AuthManager, Arc<MockAuthProvider>, Arc<MemorySettingsStore>) {
        let provider = Arc::new(MockAuthProvider::new());
        let settings = Arc::new(MemorySettingsStore::new());
        let manager = AuthManager::new(Some(provider.clone()), settings.clone());
        (manager, provider, settings)
    }

    mod session_tests {
        use super::*;

        #[test]
        fn test_debug_redacts_tokens() {
            let session = MockAuthProvider::session_for("user-1");
            let rendered = format!("{session:?}");
            assert!(!rendered.contains("access-user-1"));
            assert!(!rendered.contains("refresh-user-1"));
            assert!(rendered.contains("[REDACTED]"));
        }

        #[test]
        fn test_expiry_skew() {
            let mut session = MockAuthProvider::session_for("u");
            session.expires_at = 1_000;
            assert!(session.is_expired_at(1_000 - 30));
            assert!(!session.is_expired_at(1_000 - 61));
        }

        #[test]
        fn test_identity_from_session() {
            let session = MockAuthProvider::session_for("u");
            let identity = AuthIdentity::from(Some(&session));
            assert!(identity.is_authenticated);
            assert_eq!(identity.user_id.as_deref(), Some("u"));

            let anonymous = AuthIdentity::from(None);
            assert!(!anonymous.is_authenticated);
            assert!(anonymous.user_id.is_none());
        }
    }

    mod manager_tests {
        use super::*;

        #[tokio::test]
        async fn test_sign_in_publishes_identity() {
            let (manager, provider, settings) = manager();
            let handle = manager.handle();
            provider.set_session(Some(MockAuthProvider::session_for("user-1")));

            let identity = manager.sign_in("void2610flyt://auth-callback#x").await.unwrap();
            assert!(identity.is_authenticated);
            assert_eq!(handle.user_id().as_deref(), Some("user-1"));
            assert_eq!(handle.access_token().as_deref(), Some("access-user-1"));
            assert_eq!(settings.get_as::<bool>(keys::HAS_USER_LOGGED_IN), Some(true));
        }

        #[tokio::test]
        async fn test_sign_in_without_backend() {
            let settings = Arc::new(MemorySettingsStore::new());
            let manager = AuthManager::new(None, settings);
            let err = manager.sign_in("x").await.unwrap_err();
            assert!(matches!(err, AuthError::NotConfigured));
            assert!(!manager.is_configured());
        }

        #[tokio::test]
        async fn test_restore_requires_previous_login() {
            let (manager, provider, settings) = manager();
            provider.set_session(Some(MockAuthProvider::session_for("user-1")));

            let identity = manager.restore().await.unwrap();
            assert!(!identity.is_authenticated);

            settings.set_as(keys::HAS_USER_LOGGED_IN, &true).unwrap();
            let identity = manager.restore().await.unwrap();
            assert!(identity.is_authenticated);
        }

        #[tokio::test]
        async fn test_sign_out_clears_even_on_remote_failure() {
            let (manager, provider, settings) = manager();
            provider.set_session(Some(MockAuthProvider::session_for("user-1")));
            manager.sign_in("cb").await.unwrap();

            provider.set_should_fail(true);
            assert!(manager.sign_out().await.is_err());
            assert!(!manager.identity().is_authenticated);
            assert_eq!(settings.get_as::<bool>(keys::HAS_USER_LOGGED_IN), Some(false));
            assert_eq!(provider.sign_out_count(), 1);
        }

        #[tokio::test]
        async fn test_refresh_only_when_expired() {
            let (manager, provider, _settings) = manager();
            provider.set_session(Some(MockAuthProvider::session_for("user-1")));
            manager.sign_in("cb").await.unwrap();

            manager.refresh_if_expired().await.unwrap();
            assert_eq!(provider.refresh_count(), 0);

            let mut expired = MockAuthProvider::session_for("user-1");
            expired.expires_at = 0;
            manager.apply_event(AuthEvent::TokenRefreshed(expired));
            manager.refresh_if_expired().await.unwrap();
            assert_eq!(provider.refresh_count(), 1);
            assert!(manager
                .handle()
                .access_token()
                .unwrap()
                .ends_with("-refreshed"));
        }

        #[test]
        fn test_apply_event_reports_identity_changes() {
            let (manager, _provider, _settings) = manager();
            let session = MockAuthProvider::session_for("user-1");

            assert!(manager.apply_event(AuthEvent::SignedIn(session.clone())));
            assert!(!manager.apply_event(AuthEvent::TokenRefreshed(session)));
            assert!(manager.apply_event(AuthEvent::SignedOut));
            assert!(!manager.apply_event(AuthEvent::SignedOut));
        }

        #[tokio::test]
        async fn test_handle_wakes_on_token_refresh() {
            let (manager, provider, _settings) = manager();
            provider.set_session(Some(MockAuthProvider::session_for("user-1")));
            manager.sign_in("cb").await.unwrap();
            let mut handle = manager.handle();

            let mut refreshed = MockAuthProvider::session_for("user-1");
            refreshed.access_token = "access-user-1-next".to_string();
            manager.apply_event(AuthEvent::TokenRefreshed(refreshed));

            assert!(handle.changed().await);
            assert_eq!(handle.access_token().as_deref(), Some("access-user-1-next"));
        }

        #[test]
        fn test_signed_out_handle() {
            let handle = AuthHandle::signed_out();
            assert!(!handle.identity().is_authenticated);
            assert!(handle.access_token().is_none());
        }
    }
}
