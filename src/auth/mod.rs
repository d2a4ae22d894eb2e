//! Credential lifecycle management
//!
//! [`TokenManager`] owns the access/refresh token pair of one session. Every
//! authenticated request asks it for headers; when the access token is about
//! to expire the manager exchanges the refresh token first. The credential
//! lives behind an async mutex that is held for the whole exchange, so
//! concurrent callers queue behind a single refresh and reuse its result.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::AuthConfig;
use crate::fetcher::http::HttpExecutor;
use crate::fetcher::request::RequestSpec;
use crate::metrics::record_token_exchange;

/// Authentication errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// Login or refresh was rejected, or the token endpoint is unusable
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// An authenticated call was made without logging in
    #[error("not authenticated")]
    NotAuthenticated,
}

/// Result type for auth operations
pub type AuthResult<T> = Result<T, AuthError>;

/// Access/refresh token pair of one session
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// Bearer token sent with requests
    pub access_token: String,
    /// Token exchanged for a new access token
    pub refresh_token: String,
    /// Authorization scheme, usually `Bearer`
    pub token_type: String,
    /// When the token endpoint issued the pair
    pub issued_at: DateTime<Utc>,
    /// Lifetime of the access token in seconds
    pub ttl_seconds: i64,
}

impl Credential {
    /// Nominal expiry of the access token
    pub fn expires_at(&self) -> DateTime<Utc> {
        chrono::Duration::try_seconds(self.ttl_seconds)
            .and_then(|ttl| self.issued_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Whether the token expires within `margin` of `now`
    pub fn needs_refresh(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        let Ok(margin) = chrono::Duration::from_std(margin) else {
            return true;
        };
        match now.checked_add_signed(margin) {
            Some(deadline) => deadline >= self.expires_at(),
            None => true,
        }
    }

    /// Remaining lifetime at `now`, negative once expired
    pub fn remaining(&self, now: DateTime<Utc>) -> chrono::Duration {
        self.expires_at().signed_duration_since(now)
    }

    /// `Authorization` header value
    pub fn authorization(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("issued_at", &self.issued_at)
            .field("ttl_seconds", &self.ttl_seconds)
            .finish()
    }
}

/// Observable state of a [`TokenManager`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// No credential held
    Unauthenticated,
    /// A credential is held
    Authenticated,
    /// A refresh exchange is in flight
    Refreshing,
}

/// Source of the current time
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current UTC time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: std::sync::Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Clock frozen at `start`
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: std::sync::Mutex::new(start),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let by = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now = now.checked_add_signed(by).unwrap_or(*now);
    }

    /// Jump to an absolute time
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// OAuth token endpoint response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// New access token
    pub access_token: String,
    /// New refresh token; some services only rotate it occasionally
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Authorization scheme
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

const PASSWORD_GRANT: &str = "password";
const REFRESH_GRANT: &str = "refresh_token";

/// Owns and refreshes the credential of one session
#[derive(Debug)]
pub struct TokenManager {
    executor: Arc<HttpExecutor>,
    config: AuthConfig,
    clock: Arc<dyn Clock>,
    credential: Mutex<Option<Credential>>,
    refreshing: AtomicBool,
    refresh_count: AtomicU64,
}

impl TokenManager {
    /// Create an unauthenticated manager using the wall clock
    pub fn new(executor: Arc<HttpExecutor>, config: AuthConfig) -> Self {
        Self {
            executor,
            config,
            clock: Arc::new(SystemClock),
            credential: Mutex::new(None),
            refreshing: AtomicBool::new(false),
            refresh_count: AtomicU64::new(0),
        }
    }

    /// Read time from `clock` instead of the wall clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Log in with username and password (password grant)
    ///
    /// # Errors
    /// Returns [`AuthError::AuthFailed`] if the exchange fails or the issued
    /// token does not outlive the safety margin; the manager is left
    /// unauthenticated
    pub async fn login(&self, username: &str, password: &str) -> AuthResult<()> {
        let mut guard = self.credential.lock().await;
        *guard = None;

        let credential = self
            .exchange(
                PASSWORD_GRANT,
                vec![
                    ("username".to_string(), username.to_string()),
                    ("password".to_string(), password.to_string()),
                ],
                None,
            )
            .await?;

        info!(username = %username, expires_at = %credential.expires_at(), "Logged in");
        *guard = Some(credential);
        Ok(())
    }

    /// Log in by exchanging a previously issued refresh token
    ///
    /// # Errors
    /// Returns [`AuthError::AuthFailed`] if the exchange fails
    pub async fn login_with_refresh_token(&self, refresh_token: &str) -> AuthResult<()> {
        let mut guard = self.credential.lock().await;
        *guard = None;

        let credential = self
            .exchange(
                REFRESH_GRANT,
                vec![("refresh_token".to_string(), refresh_token.to_string())],
                Some(refresh_token),
            )
            .await?;

        info!(expires_at = %credential.expires_at(), "Logged in with refresh token");
        *guard = Some(credential);
        Ok(())
    }

    /// Headers for an authenticated request, refreshing first if needed
    ///
    /// # Errors
    /// - [`AuthError::NotAuthenticated`] before a successful login
    /// - [`AuthError::AuthFailed`] if a needed refresh fails; the credential
    ///   is dropped
    pub async fn auth_headers(&self) -> AuthResult<Vec<(String, String)>> {
        let mut guard = self.credential.lock().await;
        let current = guard.as_ref().ok_or(AuthError::NotAuthenticated)?;

        if current.needs_refresh(self.clock.now(), self.config.safety_margin) {
            debug!(expires_at = %current.expires_at(), "Access token expiring, refreshing");
            let refresh_token = current.refresh_token.clone();

            self.refreshing.store(true, Ordering::SeqCst);
            self.refresh_count.fetch_add(1, Ordering::SeqCst);
            let refreshed = self.refresh(&refresh_token).await;
            self.refreshing.store(false, Ordering::SeqCst);

            match refreshed {
                Ok(credential) => *guard = Some(credential),
                Err(e) => {
                    warn!(error = %e, "Token refresh failed, credential cleared");
                    *guard = None;
                    return Err(e);
                }
            }
        }

        let credential = guard.as_ref().ok_or(AuthError::NotAuthenticated)?;
        Ok(vec![(
            "Authorization".to_string(),
            credential.authorization(),
        )])
    }

    /// Drop the credential
    pub async fn logout(&self) {
        if self.credential.lock().await.take().is_some() {
            info!("Logged out");
        }
    }

    /// Current state
    pub async fn state(&self) -> AuthState {
        if self.refreshing.load(Ordering::SeqCst) {
            return AuthState::Refreshing;
        }
        match *self.credential.lock().await {
            Some(_) => AuthState::Authenticated,
            None => AuthState::Unauthenticated,
        }
    }

    /// Snapshot of the held credential
    pub async fn credential(&self) -> Option<Credential> {
        self.credential.lock().await.clone()
    }

    /// Refresh exchanges started by [`auth_headers`](Self::auth_headers)
    pub fn refresh_count(&self) -> u64 {
        self.refresh_count.load(Ordering::SeqCst)
    }

    async fn refresh(&self, refresh_token: &str) -> AuthResult<Credential> {
        if refresh_token.is_empty() {
            return Err(AuthError::AuthFailed(
                "no refresh token available".to_string(),
            ));
        }

        let credential = self
            .exchange(
                REFRESH_GRANT,
                vec![("refresh_token".to_string(), refresh_token.to_string())],
                Some(refresh_token),
            )
            .await?;

        info!(expires_at = %credential.expires_at(), "Access token refreshed");
        Ok(credential)
    }

    /// Run one grant against the token endpoint
    ///
    /// `previous_refresh` is kept when the response does not rotate the
    /// refresh token.
    async fn exchange(
        &self,
        grant: &'static str,
        fields: Vec<(String, String)>,
        previous_refresh: Option<&str>,
    ) -> AuthResult<Credential> {
        let result = self.exchange_inner(grant, fields, previous_refresh).await;
        record_token_exchange(grant, result.is_ok());
        result
    }

    async fn exchange_inner(
        &self,
        grant: &'static str,
        fields: Vec<(String, String)>,
        previous_refresh: Option<&str>,
    ) -> AuthResult<Credential> {
        if self.config.token_url.is_empty() {
            return Err(AuthError::AuthFailed(
                "no token endpoint configured".to_string(),
            ));
        }

        let mut form = vec![("grant_type".to_string(), grant.to_string())];
        if let Some(client_id) = &self.config.client_id {
            form.push(("client_id".to_string(), client_id.clone()));
        }
        if let Some(client_secret) = &self.config.client_secret {
            form.push(("client_secret".to_string(), client_secret.clone()));
        }
        form.extend(self.config.extra_params.iter().cloned());
        form.extend(fields);

        let spec = RequestSpec::post(self.config.token_url.as_str()).form(form);
        let issued_at = self.clock.now();

        let response: TokenResponse = self
            .executor
            .execute_json(&spec)
            .await
            .map_err(|e| AuthError::AuthFailed(format!("{grant} grant failed: {e}")))?;

        // Lifetime must outlast the refresh margin
        let margin = i64::try_from(self.config.safety_margin.as_secs()).unwrap_or(i64::MAX);
        if response.expires_in <= margin {
            return Err(AuthError::AuthFailed(format!(
                "token lifetime {}s does not exceed the {}s refresh margin",
                response.expires_in, margin
            )));
        }
        if response.access_token.is_empty() {
            return Err(AuthError::AuthFailed(
                "token endpoint returned an empty access token".to_string(),
            ));
        }

        let refresh_token = response
            .refresh_token
            .filter(|t| !t.is_empty())
            .or_else(|| previous_refresh.map(str::to_string))
            .unwrap_or_default();

        Ok(Credential {
            access_token: response.access_token,
            refresh_token,
            token_type: response.token_type,
            issued_at,
            ttl_seconds: response.expires_in,
        })
    }
}
