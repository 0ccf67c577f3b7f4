//! Authenticated-user lifecycle.
//!
//! `AuthSession` is the one place screens consult to decide whether to show
//! protected content. It starts in `Initializing`, settles into
//! `Authenticated` or `Unauthenticated` once the stored token has been
//! checked, and moves between those two for the rest of the process.
//!
//! None of the public operations return transport errors; failures become a
//! state transition plus, for the sign-in calls, a `LoginOutcome` message.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::api::{ApiClient, ApiError, ApiResult, AuthGrant};
use crate::models::{Credentials, Registration, User};

use super::TokenStore;

#[derive(Debug, Clone, PartialEq)]
pub enum AuthState {
    Initializing,
    Authenticated(User),
    Unauthenticated,
}

impl AuthState {
    pub fn user(&self) -> Option<&User> {
        match self {
            AuthState::Authenticated(user) => Some(user),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated(_))
    }
}

/// Point-in-time view of the session handed to route guards and screens
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub loading: bool,
    pub is_authenticated: bool,
    pub user: Option<User>,
}

impl SessionSnapshot {
    pub fn loading() -> Self {
        Self {
            loading: true,
            is_authenticated: false,
            user: None,
        }
    }

    pub fn unauthenticated() -> Self {
        Self {
            loading: false,
            is_authenticated: false,
            user: None,
        }
    }

    pub fn authenticated(user: User) -> Self {
        Self {
            loading: false,
            is_authenticated: true,
            user: Some(user),
        }
    }
}

impl From<&AuthState> for SessionSnapshot {
    fn from(state: &AuthState) -> Self {
        match state {
            AuthState::Initializing => Self::loading(),
            AuthState::Authenticated(user) => Self::authenticated(user.clone()),
            AuthState::Unauthenticated => Self::unauthenticated(),
        }
    }
}

/// Result of a sign-in attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginOutcome {
    pub success: bool,
    pub message: Option<String>,
}

impl LoginOutcome {
    fn success(message: Option<String>) -> Self {
        Self {
            success: true,
            message,
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

/// Session manager shared by every screen.
/// Clone is cheap - clones observe and drive the same state.
#[derive(Clone)]
pub struct AuthSession {
    api: ApiClient,
    tokens: TokenStore,
    state: Arc<RwLock<AuthState>>,
    alive: Arc<AtomicBool>,
}

impl AuthSession {
    /// Create a session in the `Initializing` state. The session uses the
    /// client's token store, so both always agree on the credential.
    pub fn new(api: ApiClient) -> Self {
        let tokens = api.tokens().clone();
        Self {
            api,
            tokens,
            state: Arc::new(RwLock::new(AuthState::Initializing)),
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn state(&self) -> AuthState {
        self.state.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot::from(&*self.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn user(&self) -> Option<User> {
        self.state().user().cloned()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.read().unwrap_or_else(PoisonError::into_inner).is_authenticated()
    }

    pub fn is_loading(&self) -> bool {
        *self.state.read().unwrap_or_else(PoisonError::into_inner) == AuthState::Initializing
    }

    pub fn has_token(&self) -> bool {
        self.tokens.exists()
    }

    fn set_state(&self, state: AuthState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Startup check: rebuild the session from the stored token. A result
    /// arriving after `teardown` is discarded.
    pub async fn initialize(&self) {
        let result = self.verify().await;
        if !self.alive.load(Ordering::SeqCst) {
            debug!("Session torn down before startup auth check finished, discarding result");
            return;
        }
        self.apply_verification(result);
    }

    /// Mark the owner of this session as gone. Pending startup checks will
    /// not touch the state or the token store.
    pub fn teardown(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    /// Re-validate the stored token against the backend. Call this before
    /// any authenticated mutation so an expired session is caught up front.
    pub async fn check_auth_status(&self) -> bool {
        let result = self.verify().await;
        self.apply_verification(result)
    }

    /// `None` when there is no token to check. A rejected access token is
    /// traded once for a new one if a refresh token was kept at sign-in.
    async fn verify(&self) -> Option<ApiResult<User>> {
        if !self.tokens.exists() {
            return None;
        }
        match self.api.current_user().await {
            Err(e) if e.is_auth_failure() => Some(self.refresh_and_retry(e).await),
            result => Some(result),
        }
    }

    async fn refresh_and_retry(&self, rejected: ApiError) -> ApiResult<User> {
        let Some(refresh) = self.tokens.refresh_token() else {
            return Err(rejected);
        };
        let access = match self.api.refresh_access_token(&refresh).await {
            Ok(access) => access,
            Err(e) => {
                warn!(error = %e, "Token refresh failed");
                return Err(rejected);
            }
        };
        // A torn-down startup check must leave the store alone
        if !self.alive.load(Ordering::SeqCst) || !self.tokens.store(&access) {
            return Err(rejected);
        }
        debug!("Access token refreshed");
        self.api.current_user().await
    }

    fn apply_verification(&self, result: Option<ApiResult<User>>) -> bool {
        match result {
            None => {
                debug!("No stored token");
                self.set_state(AuthState::Unauthenticated);
                false
            }
            Some(Ok(user)) => {
                debug!(user_id = %user.id, "Session verified");
                if let Some(is_admin) = user.admin_role() {
                    self.tokens.set_cached_admin_flag(is_admin);
                }
                self.set_state(AuthState::Authenticated(user));
                true
            }
            Some(Err(e)) => {
                warn!(error = %e, "Auth check failed, clearing token");
                self.tokens.clear();
                self.set_state(AuthState::Unauthenticated);
                false
            }
        }
    }

    /// Sign in with email and password. On failure the state is unchanged.
    pub async fn login(&self, credentials: &Credentials) -> LoginOutcome {
        match self.api.login(credentials).await {
            Ok(grant) => self.complete_sign_in(grant),
            Err(e) => {
                warn!(error = %e, "Login failed");
                LoginOutcome::failure(e.login_message())
            }
        }
    }

    /// Ask for a one-time sign-in code to be emailed
    pub async fn request_otp(&self, email: &str) -> LoginOutcome {
        match self.api.request_otp(email).await {
            Ok(receipt) => LoginOutcome::success(receipt.message),
            Err(e) => {
                warn!(error = %e, "OTP request failed");
                LoginOutcome::failure(e.login_message())
            }
        }
    }

    pub async fn resend_otp(&self, email: &str) -> LoginOutcome {
        match self.api.resend_otp(email).await {
            Ok(receipt) => LoginOutcome::success(receipt.message),
            Err(e) => {
                warn!(error = %e, "OTP resend failed");
                LoginOutcome::failure(e.login_message())
            }
        }
    }

    /// Complete an OTP sign-in. Behaves like `login` once the code is accepted.
    pub async fn verify_otp(
        &self,
        email: &str,
        code: &str,
        referral_code: Option<&str>,
    ) -> LoginOutcome {
        match self.api.verify_otp(email, code, referral_code).await {
            Ok(grant) => self.complete_sign_in(grant),
            Err(e) => {
                warn!(error = %e, "OTP verification failed");
                LoginOutcome::failure(e.login_message())
            }
        }
    }

    /// Create an account; the emailed code is then passed to `verify_otp`.
    pub async fn register(&self, registration: &Registration) -> LoginOutcome {
        match self.api.register(registration).await {
            Ok(receipt) => LoginOutcome::success(receipt.message),
            Err(e) => {
                warn!(error = %e, "Registration failed");
                LoginOutcome::failure(e.login_message())
            }
        }
    }

    fn complete_sign_in(&self, grant: AuthGrant) -> LoginOutcome {
        if !self.tokens.store(&grant.token) {
            error!("Signed in but the token could not be stored");
            return LoginOutcome::failure(
                "Signed in, but the session could not be saved on this device",
            );
        }
        if let Some(ref refresh) = grant.refresh {
            if !self.tokens.store_refresh_token(refresh) {
                warn!("Refresh token not saved, session will end when the access token expires");
            }
        }
        if let Some(is_admin) = grant.user.admin_role() {
            self.tokens.set_cached_admin_flag(is_admin);
        }
        info!(user_id = %grant.user.id, "Login successful");
        self.set_state(AuthState::Authenticated(grant.user));
        LoginOutcome::success(None)
    }

    /// Forget the token and the user. Always succeeds.
    pub fn logout(&self) {
        self.tokens.clear();
        self.set_state(AuthState::Unauthenticated);
        info!("Logged out");
    }

    /// Revoke the session on the backend, then forget it locally. Local state
    /// is cleared even if the backend call fails. Returns whether the backend
    /// acknowledged the logout.
    pub async fn server_logout(&self) -> bool {
        let token = self.tokens.retrieve();
        let refresh = self.tokens.refresh_token();
        let revoked = if token.is_none() && refresh.is_none() {
            true
        } else {
            match self.api.logout(refresh.as_deref()).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "Server logout failed, clearing local session anyway");
                    false
                }
            }
        };
        self.logout();
        revoked
    }

    /// Run an authenticated request. The session is re-verified first; if
    /// that fails `op` is never called and `SessionExpired` is returned. A
    /// 401 or 403 from `op` itself also ends the session. `op` is never
    /// retried.
    pub async fn submit<T, F, Fut>(&self, op: F) -> ApiResult<T>
    where
        F: FnOnce(ApiClient) -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        if !self.check_auth_status().await {
            return Err(ApiError::SessionExpired);
        }

        match op(self.api.clone()).await {
            Err(e) if e.is_auth_failure() => {
                warn!(error = %e, "Request rejected credential, ending session");
                self.tokens.clear();
                self.set_state(AuthState::Unauthenticated);
                Err(e)
            }
            result => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use crate::auth::{MemoryBackend, TokenBackend};
    use crate::models::NewCategory;
    use crate::auth::token_store::{REFRESH_TOKEN_KEY, TOKEN_KEY};
    use wiremock::matchers::{any, body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Primary, secondary and cookie backends that outlive any one session
    #[derive(Clone, Default)]
    struct Storage {
        primary: MemoryBackend,
        secondary: MemoryBackend,
        cookie: MemoryBackend,
    }

    impl Storage {
        fn token_store(&self) -> TokenStore {
            TokenStore::new(vec![
                Box::new(self.primary.clone()),
                Box::new(self.secondary.clone()),
                Box::new(self.cookie.clone()),
            ])
        }
    }

    fn session_for(server: &MockServer, storage: &Storage) -> AuthSession {
        let api = ApiClient::new(format!("{}/api", server.uri()), storage.token_store())
            .expect("Failed to build client");
        AuthSession::new(api)
    }

    fn me_responds(status: u16, body: serde_json::Value) -> Mock {
        Mock::given(method("GET"))
            .and(path("/api/users/me/"))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
    }

    #[tokio::test]
    async fn test_login_with_valid_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token": "issued-token",
                "user": {"id": 1, "name": "Jane", "user_type": "recruiter"}
            })))
            .mount(&server)
            .await;

        let storage = Storage::default();
        let session = session_for(&server, &storage);
        let outcome = session
            .login(&Credentials::new("jane@example.com", "secret"))
            .await;

        assert!(outcome.success);
        assert!(session.is_authenticated());
        assert_eq!(session.user().map(|u| u.id), Some(crate::models::UserId::Int(1)));
        assert_eq!(session.tokens().retrieve().as_deref(), Some("issued-token"));
        assert!(!session.tokens().cached_admin_flag());
    }

    #[tokio::test]
    async fn test_login_with_invalid_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login/"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(serde_json::json!({"detail": "Invalid credentials"})),
            )
            .mount(&server)
            .await;

        let storage = Storage::default();
        let session = session_for(&server, &storage);
        session.initialize().await;

        let outcome = session
            .login(&Credentials::new("jane@example.com", "wrong"))
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.message.as_deref(), Some("Invalid credentials"));
        assert_eq!(session.state(), AuthState::Unauthenticated);
        assert!(session.tokens().retrieve().is_none());
    }

    #[tokio::test]
    async fn test_login_without_detail_still_explains() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login/"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let session = session_for(&server, &Storage::default());
        let outcome = session
            .login(&Credentials::new("jane@example.com", "secret"))
            .await;

        assert!(!outcome.success);
        assert!(outcome.message.is_some_and(|m| !m.is_empty()));
    }

    #[tokio::test]
    async fn test_login_fails_when_token_cannot_be_saved() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token": "issued-token",
                "user": {"id": 1}
            })))
            .mount(&server)
            .await;

        let storage = Storage::default();
        storage.primary.set_enabled(false);
        let session = session_for(&server, &storage);
        let outcome = session
            .login(&Credentials::new("jane@example.com", "secret"))
            .await;

        assert!(!outcome.success);
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn test_failed_login_leaves_no_partial_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token": "issued-token",
                "user": {"id": 1}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 1})))
            .expect(0)
            .mount(&server)
            .await;

        let storage = Storage::default();
        storage.secondary.set_enabled(false);
        let session = session_for(&server, &storage);
        let outcome = session
            .login(&Credentials::new("jane@example.com", "secret"))
            .await;

        assert!(!outcome.success);
        assert!(!session.is_authenticated());
        assert!(storage.primary.get(TOKEN_KEY).unwrap().is_none());
        assert!(storage.cookie.get(TOKEN_KEY).unwrap().is_none());

        // The next start must not pick up a leftover copy
        storage.secondary.set_enabled(true);
        let restarted = session_for(&server, &storage);
        restarted.initialize().await;
        assert_eq!(restarted.state(), AuthState::Unauthenticated);
    }

    #[tokio::test]
    async fn test_check_auth_status_with_rejected_token() {
        let server = MockServer::start().await;
        me_responds(401, serde_json::json!({"detail": "Token expired"}))
            .mount(&server)
            .await;

        let storage = Storage::default();
        let session = session_for(&server, &storage);
        session.tokens().store("stale");

        assert!(!session.check_auth_status().await);
        assert!(session.tokens().retrieve().is_none());
        assert_eq!(session.state(), AuthState::Unauthenticated);
        assert!(storage.cookie.get(TOKEN_KEY).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_check_auth_status_refreshes_user() {
        let server = MockServer::start().await;
        me_responds(200, serde_json::json!({"id": 1, "name": "Jane", "is_admin": true}))
            .mount(&server)
            .await;

        let session = session_for(&server, &Storage::default());
        session.tokens().store("abc123");

        assert!(session.check_auth_status().await);
        assert_eq!(session.user().and_then(|u| u.name), Some("Jane".to_string()));
        assert!(session.tokens().cached_admin_flag());
    }

    #[tokio::test]
    async fn test_expired_access_token_is_refreshed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/users/me/"))
            .and(header("authorization", "Bearer old-access"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/users/me/"))
            .and(header("authorization", "Bearer new-access"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"id": 1, "name": "Jane"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/auth/token/refresh/"))
            .and(body_json(serde_json::json!({"refresh": "refresh-1"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"access": "new-access"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let storage = Storage::default();
        let session = session_for(&server, &storage);
        session.tokens().store("old-access");
        session.tokens().store_refresh_token("refresh-1");

        assert!(session.check_auth_status().await);
        assert_eq!(session.user().and_then(|u| u.name), Some("Jane".to_string()));
        assert_eq!(storage.cookie.get(TOKEN_KEY).unwrap().as_deref(), Some("new-access"));
        assert_eq!(session.tokens().authorization().as_deref(), Some("Bearer new-access"));
    }

    #[tokio::test]
    async fn test_failed_refresh_ends_session() {
        let server = MockServer::start().await;
        me_responds(401, serde_json::json!({"detail": "Token expired"}))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/auth/token/refresh/"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(serde_json::json!({"detail": "Token is blacklisted"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let storage = Storage::default();
        let session = session_for(&server, &storage);
        session.tokens().store("old-access");
        session.tokens().store_refresh_token("refresh-1");
        session.initialize().await;

        assert_eq!(session.state(), AuthState::Unauthenticated);
        assert!(!session.has_token());
        assert!(session.tokens().refresh_token().is_none());
    }

    #[tokio::test]
    async fn test_reload_restores_session_from_stored_token() {
        let server = MockServer::start().await;
        me_responds(200, serde_json::json!({"id": 1, "name": "Jane"}))
            .expect(1)
            .mount(&server)
            .await;

        let storage = Storage::default();
        assert!(storage.token_store().store("abc123"));

        // Fresh session over the same storage, as after a restart
        let session = session_for(&server, &storage);
        assert!(session.is_loading());
        assert_eq!(session.tokens().retrieve().as_deref(), Some("abc123"));

        session.initialize().await;
        let snapshot = session.snapshot();
        assert!(!snapshot.loading);
        assert!(snapshot.is_authenticated);
        assert_eq!(snapshot.user.map(|u| u.id), Some(crate::models::UserId::Int(1)));
    }

    #[tokio::test]
    async fn test_initialize_without_token_skips_network() {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let session = session_for(&server, &Storage::default());
        session.initialize().await;

        assert_eq!(session.state(), AuthState::Unauthenticated);
    }

    #[tokio::test]
    async fn test_initialize_clears_invalid_token() {
        let server = MockServer::start().await;
        me_responds(403, serde_json::json!({"detail": "Forbidden"}))
            .mount(&server)
            .await;

        let storage = Storage::default();
        storage.cookie.set(TOKEN_KEY, "old").unwrap();
        let session = session_for(&server, &storage);
        session.initialize().await;

        assert_eq!(session.state(), AuthState::Unauthenticated);
        assert!(!session.has_token());
    }

    #[tokio::test]
    async fn test_teardown_discards_startup_result() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/users/me/"))
            .respond_with(ResponseTemplate::new(401).set_delay(Duration::from_millis(300)))
            .mount(&server)
            .await;

        let storage = Storage::default();
        let session = session_for(&server, &storage);
        session.tokens().store("abc123");

        tokio::join!(session.initialize(), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            session.teardown();
        });

        assert!(session.is_loading());
        assert_eq!(
            storage.primary.get(TOKEN_KEY).unwrap().as_deref(),
            Some("abc123")
        );
    }

    #[tokio::test]
    async fn test_logout_clears_everything() {
        let server = MockServer::start().await;
        me_responds(200, serde_json::json!({"id": 1}))
            .mount(&server)
            .await;

        let session = session_for(&server, &Storage::default());
        session.tokens().store("abc123");
        session.initialize().await;
        assert!(session.is_authenticated());

        session.logout();
        assert_eq!(session.state(), AuthState::Unauthenticated);
        assert!(session.user().is_none());
        assert!(session.tokens().retrieve().is_none());
        assert!(session.tokens().authorization().is_none());
    }

    #[tokio::test]
    async fn test_server_logout_revokes_refresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/logout/"))
            .and(header("authorization", "Bearer abc123"))
            .and(body_json(serde_json::json!({"refresh": "refresh-1"})))
            .respond_with(ResponseTemplate::new(205))
            .expect(1)
            .mount(&server)
            .await;

        let storage = Storage::default();
        let session = session_for(&server, &storage);
        session.tokens().store("abc123");
        session.tokens().store_refresh_token("refresh-1");

        assert!(session.server_logout().await);
        assert_eq!(session.state(), AuthState::Unauthenticated);
        assert!(!session.has_token());
        assert!(storage.primary.get(REFRESH_TOKEN_KEY).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_server_logout_clears_locally_when_backend_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/logout/"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let session = session_for(&server, &Storage::default());
        session.tokens().store("abc123");
        session.tokens().store_refresh_token("refresh-1");

        assert!(!session.server_logout().await);
        assert!(!session.has_token());
        assert!(session.tokens().authorization().is_none());
        assert!(session.tokens().refresh_token().is_none());
    }

    #[tokio::test]
    async fn test_server_logout_without_session_skips_network() {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let session = session_for(&server, &Storage::default());
        assert!(session.server_logout().await);
        assert_eq!(session.state(), AuthState::Unauthenticated);
    }

    #[tokio::test]
    async fn test_submit_with_expired_session_skips_request() {
        let server = MockServer::start().await;
        me_responds(401, serde_json::json!({"detail": "Token expired"}))
            .mount(&server)
            .await;

        let session = session_for(&server, &Storage::default());
        session.tokens().store("stale");

        let calls = AtomicUsize::new(0);
        let result = session
            .submit(|api| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    api.create_blog_category(&NewCategory {
                        name: "Careers".to_string(),
                        color: None,
                    })
                    .await
                }
            })
            .await;

        assert!(matches!(result, Err(ApiError::SessionExpired)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn test_submit_runs_request_after_verification() {
        let server = MockServer::start().await;
        me_responds(200, serde_json::json!({"id": 1}))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/blog/categories/"))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(serde_json::json!({"id": 3, "name": "Careers"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let session = session_for(&server, &Storage::default());
        session.tokens().store("abc123");

        let category = session
            .submit(|api| async move {
                api.create_blog_category(&NewCategory {
                    name: "Careers".to_string(),
                    color: None,
                })
                .await
            })
            .await
            .expect("submit");
        assert_eq!(category.id, 3);
        assert!(session.is_authenticated());
    }

    #[tokio::test]
    async fn test_submit_ends_session_on_unauthorized_response() {
        let server = MockServer::start().await;
        me_responds(200, serde_json::json!({"id": 1}))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/jobs/4/"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let session = session_for(&server, &Storage::default());
        session.tokens().store("abc123");

        let result = session.submit(|api| async move { api.delete_job(4).await }).await;
        assert!(matches!(result, Err(ApiError::Unauthorized(_))));
        assert!(!session.is_authenticated());
        assert!(!session.has_token());
    }

    #[tokio::test]
    async fn test_submit_ends_session_on_forbidden_response() {
        let server = MockServer::start().await;
        me_responds(200, serde_json::json!({"id": 1}))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/jobs/4/"))
            .respond_with(
                ResponseTemplate::new(403)
                    .set_body_json(serde_json::json!({"detail": "Token is invalid or expired"})),
            )
            .mount(&server)
            .await;

        let session = session_for(&server, &Storage::default());
        session.tokens().store("abc123");

        let result = session.submit(|api| async move { api.delete_job(4).await }).await;
        assert!(matches!(result, Err(ApiError::AccessDenied(_))));
        assert!(!session.is_authenticated());
        assert!(!session.has_token());
    }

    #[tokio::test]
    async fn test_submit_keeps_session_on_validation_error() {
        let server = MockServer::start().await;
        me_responds(200, serde_json::json!({"id": 1}))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/blog/categories/"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(serde_json::json!({"name": ["Already exists."]})),
            )
            .mount(&server)
            .await;

        let session = session_for(&server, &Storage::default());
        session.tokens().store("abc123");

        let err = session
            .submit(|api| async move {
                api.create_blog_category(&NewCategory {
                    name: "Careers".to_string(),
                    color: None,
                })
                .await
            })
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), "name: Already exists.");
        assert!(session.is_authenticated());
    }

    #[tokio::test]
    async fn test_otp_sign_in() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/request-otp/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": "OTP sent successfully",
                "email": "jane@example.com"
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/auth/verify-otp/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access": "access-token",
                "refresh": "refresh-token",
                "user": {"id": "a1b2", "user_type": "admin", "is_superuser": false}
            })))
            .mount(&server)
            .await;

        let session = session_for(&server, &Storage::default());
        let requested = session.request_otp("jane@example.com").await;
        assert!(requested.success);
        assert_eq!(requested.message.as_deref(), Some("OTP sent successfully"));

        let verified = session.verify_otp("jane@example.com", "123456", Some("NEW")).await;
        assert!(verified.success);
        assert!(session.is_authenticated());
        assert_eq!(session.tokens().retrieve().as_deref(), Some("access-token"));
        assert_eq!(session.tokens().refresh_token().as_deref(), Some("refresh-token"));
        assert!(session.tokens().cached_admin_flag());
    }

    #[tokio::test]
    async fn test_register_reports_emailed_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/register/"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "message": "Verification code sent",
                "email": "sam@example.com"
            })))
            .mount(&server)
            .await;

        let session = session_for(&server, &Storage::default());
        let outcome = session
            .register(&Registration {
                email: "sam@example.com".to_string(),
                ..Default::default()
            })
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.message.as_deref(), Some("Verification code sent"));
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn test_otp_rejected_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/verify-otp/"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(serde_json::json!({"non_field_errors": ["Invalid OTP"]})),
            )
            .mount(&server)
            .await;

        let session = session_for(&server, &Storage::default());
        let outcome = session.verify_otp("jane@example.com", "000000", None).await;
        assert!(!outcome.success);
        assert_eq!(outcome.message.as_deref(), Some("Invalid OTP"));
    }
}
