//! Session lifecycle: login, logout, bootstrap, refresh and renewal.
//!
//! `SessionManager` is the single owner of the signed-in state. It is cheap
//! to clone and is handed explicitly to the [`Gateway`] and everything built
//! on it.
//!
//! Two counters guard against races:
//! - `epoch` changes whenever the access token changes (login, refresh,
//!   logout). A caller that saw a 401 under epoch N only refreshes if the
//!   epoch is still N once it holds the refresh lock; otherwise someone else
//!   already refreshed and the newer token is reused.
//! - `session_id` changes whenever the signed-in identity changes (login,
//!   logout, bootstrap). A network result tied to an older `session_id` is
//!   discarded instead of being written back.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::Utc;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::api::error::{server_detail, DEFAULT_LOGIN_FAILURE};
use crate::api::transport::{ApiRequest, Transport};
use crate::api::{ApiError, Gateway};
use crate::models::User;

use super::codec::DecodedClaims;
use super::session::{AuthStatus, Role, Session};
use super::store::{Credentials, TokenStore};

/// Interval between silent renewals.
/// Access tokens live for five minutes server-side; renewing at four keeps
/// an idle session alive.
pub const DEFAULT_RENEWAL_INTERVAL: Duration = Duration::from_secs(4 * 60);

/// Shortest accepted renewal period
const MIN_RENEWAL_INTERVAL: Duration = Duration::from_secs(1);

const TOKEN_ENDPOINT: &str = "token/";
const REFRESH_ENDPOINT: &str = "token/refresh/";
pub(crate) const CURRENT_USER_ENDPOINT: &str = "users/me/";

#[derive(Debug, Deserialize)]
struct TokenPair {
    access: String,
    refresh: String,
}

#[derive(Debug, Deserialize)]
struct RefreshedToken {
    access: String,
    /// Present only when the server rotates refresh tokens
    refresh: Option<String>,
}

/// What a request was sent under, so a later refresh can tell whether the
/// token merely rotated or the signed-in identity changed.
#[derive(Debug, Clone)]
pub(crate) struct CredentialsSnapshot {
    pub epoch: u64,
    pub session_id: u64,
    pub access_token: Option<String>,
}

struct SessionState {
    status: AuthStatus,
    session: Option<Session>,
    user: Option<User>,
    loading: bool,
    epoch: u64,
    session_id: u64,
}

impl SessionState {
    fn new() -> Self {
        Self {
            status: AuthStatus::Unauthenticated,
            session: None,
            user: None,
            loading: false,
            epoch: 0,
            session_id: 0,
        }
    }

    fn is_signed_in(&self) -> bool {
        matches!(self.status, AuthStatus::Authenticated | AuthStatus::Refreshing)
    }

    // After a failed login an earlier session, if any, is still valid
    fn restore_status(&mut self) {
        self.status = if self.session.is_some() {
            AuthStatus::Authenticated
        } else {
            AuthStatus::Unauthenticated
        };
    }
}

struct Inner {
    base_url: String,
    transport: Arc<dyn Transport>,
    store: Arc<dyn TokenStore>,
    // Also serializes every write to `store`
    state: Mutex<SessionState>,
    // Held for the duration of a refresh or login exchange
    refresh_lock: tokio::sync::Mutex<()>,
}

#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    /// Create a manager with no session. Call [`bootstrap`](Self::bootstrap)
    /// to pick up a stored one.
    pub fn new(
        base_url: impl Into<String>,
        transport: Arc<dyn Transport>,
        store: Arc<dyn TokenStore>,
    ) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Self {
            inner: Arc::new(Inner {
                base_url,
                transport,
                store,
                state: Mutex::new(SessionState::new()),
                refresh_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Gateway bound to this session
    pub fn gateway(&self) -> Gateway {
        Gateway::new(self.clone())
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ===== Accessors =====

    pub fn status(&self) -> AuthStatus {
        self.state().status
    }

    /// The published session. During bootstrap this is the stored session
    /// still awaiting confirmation.
    pub fn session(&self) -> Option<Session> {
        self.state().session.clone()
    }

    pub fn claims(&self) -> Option<DecodedClaims> {
        self.state().session.as_ref().map(|s| s.claims().clone())
    }

    /// Role of the signed-in user; `Guest` when nobody is signed in
    pub fn role(&self) -> Role {
        let state = self.state();
        match state.session.as_ref() {
            Some(session) if state.is_signed_in() => session.role(),
            _ => Role::Guest,
        }
    }

    pub fn has_role(&self, required: Role) -> bool {
        self.role() >= required
    }

    /// Profile record from `users/me/`, once loaded
    pub fn current_user(&self) -> Option<User> {
        self.state().user.clone()
    }

    /// True only while bootstrap is waiting on the server
    pub fn is_loading(&self) -> bool {
        self.state().loading
    }

    /// Signed in with an access token that has not yet expired
    pub fn is_authenticated(&self) -> bool {
        let state = self.state();
        state.is_signed_in()
            && state
                .session
                .as_ref()
                .map(|s| !s.is_expired_at(Utc::now().timestamp()))
                .unwrap_or(false)
    }

    // ===== Gateway support =====

    pub(crate) fn url(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!(
                "{}{}",
                self.inner.base_url,
                endpoint.trim_start_matches('/')
            )
        }
    }

    pub(crate) fn transport(&self) -> &dyn Transport {
        self.inner.transport.as_ref()
    }

    /// Current counters and access token, read together
    pub(crate) fn credentials_snapshot(&self) -> CredentialsSnapshot {
        let state = self.state();
        CredentialsSnapshot {
            epoch: state.epoch,
            session_id: state.session_id,
            access_token: state.session.as_ref().map(|s| s.access_token().to_string()),
        }
    }

    // ===== Login / logout =====

    /// Exchange a username and password for a session.
    ///
    /// On success the tokens are persisted and the session is published
    /// before the profile is fetched; a failed profile fetch does not undo
    /// the login.
    pub async fn login(&self, username: &str, password: &str) -> Result<Session, ApiError> {
        let session = self.login_exchange(username, password).await?;

        info!(username = %session.claims().username, role = %session.role(), "Logged in");

        if let Err(e) = self.reload_user().await {
            warn!(error = %e, "Logged in but failed to load user profile");
        }
        Ok(session)
    }

    async fn login_exchange(&self, username: &str, password: &str) -> Result<Session, ApiError> {
        let _guard = self.inner.refresh_lock.lock().await;
        self.state().status = AuthStatus::Authenticating;

        let result = self.request_token_pair(username, password).await.and_then(|pair| {
            Ok(Session::from_credentials(Credentials {
                access_token: pair.access,
                refresh_token: pair.refresh,
            })?)
        });

        let mut state = self.state();
        let session = match result {
            Ok(session) => session,
            Err(e) => {
                state.restore_status();
                debug!(error = %e, "Login failed");
                return Err(e);
            }
        };

        if let Err(e) = self.inner.store.save(&session.to_persisted()) {
            state.restore_status();
            return Err(e.into());
        }

        state.session = Some(session.clone());
        state.user = None;
        state.status = AuthStatus::Authenticated;
        state.loading = false;
        state.epoch += 1;
        state.session_id += 1;
        Ok(session)
    }

    async fn request_token_pair(&self, username: &str, password: &str) -> Result<TokenPair, ApiError> {
        let request = ApiRequest::new(Method::POST, self.url(TOKEN_ENDPOINT))
            .json(json!({ "username": username, "password": password }));
        let response = self.inner.transport.send(request).await?;

        match response.status {
            status if status.is_success() => response.json(),
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => {
                Err(ApiError::InvalidCredentials(
                    server_detail(&response.body).unwrap_or_else(|| DEFAULT_LOGIN_FAILURE.to_string()),
                ))
            }
            status => Err(ApiError::from_status(status, &response.body)),
        }
    }

    /// Drop the session and its stored tokens. Always succeeds; calling it
    /// while signed out changes nothing visible.
    pub fn logout(&self) {
        let mut state = self.state();
        let was_signed_in = state.session.is_some();
        self.teardown(&mut state);
        if was_signed_in {
            info!("Logged out");
        }
    }

    fn teardown(&self, state: &mut SessionState) {
        if let Err(e) = self.inner.store.clear() {
            warn!(error = %e, "Failed to clear token store");
        }
        state.session = None;
        state.user = None;
        state.status = AuthStatus::Unauthenticated;
        state.loading = false;
        state.epoch += 1;
        state.session_id += 1;
    }

    // ===== Bootstrap =====

    /// Resume a stored session at startup by asking the server who we are.
    ///
    /// Never fails; the outcome is the resulting status. A network failure
    /// leaves the stored tokens in place for the next attempt, any other
    /// failure discards them.
    pub async fn bootstrap(&self) -> AuthStatus {
        let stored = match self.inner.store.load() {
            Ok(Some(stored)) => stored,
            Ok(None) => {
                debug!("No stored session");
                return AuthStatus::Unauthenticated;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read stored session");
                self.teardown(&mut self.state());
                return AuthStatus::Unauthenticated;
            }
        };

        let session = match Session::from_credentials(stored.credentials) {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "Stored access token is malformed; discarding");
                self.teardown(&mut self.state());
                return AuthStatus::Unauthenticated;
            }
        };

        let session_id = {
            let mut state = self.state();
            state.session = Some(session);
            state.user = None;
            state.status = AuthStatus::Authenticating;
            state.loading = true;
            state.epoch += 1;
            state.session_id += 1;
            state.session_id
        };

        let result = self
            .gateway()
            .get_json::<User>(CURRENT_USER_ENDPOINT)
            .await;

        let mut state = self.state();
        if state.session_id != session_id {
            debug!("Session changed during bootstrap; discarding result");
            state.loading = false;
            return state.status;
        }

        match result {
            Ok(user) => {
                info!(username = %user.username, "Session resumed");
                state.user = Some(user);
                state.status = AuthStatus::Authenticated;
                state.loading = false;
            }
            Err(ApiError::Network(e)) => {
                warn!(error = %e, "Could not reach server; keeping stored session for later");
                state.session = None;
                state.status = AuthStatus::Unauthenticated;
                state.loading = false;
                state.epoch += 1;
                state.session_id += 1;
            }
            Err(e) => {
                warn!(error = %e, "Stored session rejected");
                self.teardown(&mut state);
            }
        }
        state.status
    }

    /// Fetch `users/me/` and remember it as the current user.
    pub async fn reload_user(&self) -> Result<User, ApiError> {
        let session_id = self.state().session_id;
        let user: User = self.gateway().get_json(CURRENT_USER_ENDPOINT).await?;

        let mut state = self.state();
        if state.session_id == session_id && state.session.is_some() {
            state.user = Some(user.clone());
        }
        Ok(user)
    }

    // ===== Refresh =====

    /// Refresh the access token now.
    pub async fn refresh(&self) -> Result<Session, ApiError> {
        let observed = self.credentials_snapshot();
        self.refresh_from(&observed).await?;
        self.session().ok_or(ApiError::SessionExpired)
    }

    /// Refresh on behalf of a caller that sent a request under `observed`,
    /// and return the access token to use from now on.
    ///
    /// Only one refresh runs at a time. If the token rotated while this
    /// caller waited, the newer token is returned without another exchange.
    /// If the signed-in identity changed instead, the caller's request
    /// belongs to a session that no longer exists and is not retried.
    /// Any failure ends the session.
    pub(crate) async fn refresh_from(&self, observed: &CredentialsSnapshot) -> Result<String, ApiError> {
        let _guard = self.inner.refresh_lock.lock().await;

        let (refresh_token, session_id) = {
            let mut state = self.state();
            if state.session_id != observed.session_id {
                debug!("Session changed since the request was sent; not retrying");
                return Err(ApiError::SessionExpired);
            }
            let Some(session) = state.session.as_ref() else {
                debug!("No session to refresh");
                return Err(ApiError::SessionExpired);
            };
            if state.epoch != observed.epoch {
                debug!("Token already refreshed by another caller");
                return Ok(session.access_token().to_string());
            }
            let refresh_token = session.credentials().refresh_token.clone();
            if state.status == AuthStatus::Authenticated {
                state.status = AuthStatus::Refreshing;
            }
            (refresh_token, state.session_id)
        };

        let outcome = self.exchange_refresh_token(&refresh_token).await;

        let mut state = self.state();
        if state.session_id != session_id {
            debug!("Session ended during refresh; discarding refreshed token");
            return Err(ApiError::SessionExpired);
        }

        let session = match outcome {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "Token refresh failed; logging out");
                self.teardown(&mut state);
                return Err(ApiError::SessionExpired);
            }
        };

        if let Err(e) = self.inner.store.save(&session.to_persisted()) {
            warn!(error = %e, "Failed to persist refreshed session");
        }

        let previous_role = state.session.as_ref().map(Session::role);
        if previous_role != Some(session.role()) {
            info!(role = %session.role(), "Role changed after refresh");
        }

        let access_token = session.access_token().to_string();
        state.session = Some(session);
        if state.status == AuthStatus::Refreshing {
            state.status = AuthStatus::Authenticated;
        }
        state.epoch += 1;
        debug!(epoch = state.epoch, "Access token refreshed");
        Ok(access_token)
    }

    async fn exchange_refresh_token(&self, refresh_token: &str) -> Result<Session, ApiError> {
        let request = ApiRequest::new(Method::POST, self.url(REFRESH_ENDPOINT))
            .json(json!({ "refresh": refresh_token }));
        let response = self.inner.transport.send(request).await?;
        if !response.is_success() {
            return Err(ApiError::from_status(response.status, &response.body));
        }

        let refreshed: RefreshedToken = response.json()?;
        Ok(Session::from_credentials(Credentials {
            access_token: refreshed.access,
            refresh_token: refreshed
                .refresh
                .unwrap_or_else(|| refresh_token.to_string()),
        })?)
    }

    // ===== Renewal =====

    /// Refresh every `every` while signed in. A failed renewal logs out.
    ///
    /// The task stops when the returned handle is dropped or when the last
    /// `SessionManager` clone goes away.
    pub fn spawn_renewal(&self, every: Duration) -> RenewalTask {
        let every = if every < MIN_RENEWAL_INTERVAL {
            warn!(requested = ?every, "Renewal interval too short; using {:?}", MIN_RENEWAL_INTERVAL);
            MIN_RENEWAL_INTERVAL
        } else {
            every
        };
        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(run_renewal(weak, every));
        RenewalTask { handle }
    }
}

async fn run_renewal(weak: Weak<Inner>, every: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(inner) = weak.upgrade() else {
            debug!("Session manager dropped; stopping renewal");
            break;
        };
        let manager = SessionManager { inner };

        if manager.status() != AuthStatus::Authenticated {
            continue;
        }
        match manager.refresh().await {
            Ok(session) => debug!(role = %session.role(), "Session renewed"),
            Err(e) => warn!(error = %e, "Session renewal failed"),
        }
    }
}

/// Handle to the background renewal task; aborts it when dropped.
pub struct RenewalTask {
    handle: JoinHandle<()>,
}

impl RenewalTask {
    pub fn stop(self) {
        drop(self);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for RenewalTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
