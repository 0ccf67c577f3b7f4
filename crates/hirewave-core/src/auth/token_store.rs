//! Redundant bearer-token storage.
//!
//! The token is written to every backend and read back in precedence order
//! (primary, secondary, cookie). A token found only in a lower-precedence
//! backend is copied into the primary one on read. The store also owns the
//! `Authorization` header value the API client attaches to every request.

use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::Duration;
use tracing::{debug, info, warn};

use super::backend::{
    CookieJarBackend, FileBackend, KeyringBackend, StorageResult, TokenBackend,
};

/// Canonical storage key for the bearer token
pub const TOKEN_KEY: &str = "accessToken";

/// Key older builds wrote the token under; migrated to `TOKEN_KEY` on read
pub const LEGACY_TOKEN_KEY: &str = "token";

/// Locally cached admin hint, consulted only when the profile has no role data
pub const ADMIN_FLAG_KEY: &str = "isAdmin";

/// Refresh token issued alongside the access token; kept in primary storage
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Cookie lifetime for the token (24 hours)
pub const COOKIE_MAX_AGE_SECS: i64 = 86_400;

/// Service name for the OS keychain backend
const KEYRING_SERVICE: &str = "hirewave";

const STORAGE_FILE: &str = "storage.json";
const COOKIE_FILE: &str = "cookies.json";

/// Secondary store used when the OS keychain cannot hold credentials
const FALLBACK_STORAGE_FILE: &str = "storage.secondary.json";

struct Inner {
    backends: Vec<Box<dyn TokenBackend>>,
    authorization: RwLock<Option<String>>,
}

/// Token store shared by the API client and the session manager.
/// Clone is cheap - all clones share the same backends and header slot.
#[derive(Clone)]
pub struct TokenStore {
    inner: Arc<Inner>,
}

impl TokenStore {
    /// Create a store over `backends`, highest precedence first.
    pub fn new(backends: Vec<Box<dyn TokenBackend>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                backends,
                authorization: RwLock::new(None),
            }),
        }
    }

    /// Storage file as primary, OS keychain as secondary, cookie jar last.
    pub fn with_default_backends(data_dir: &Path) -> Self {
        Self::with_keyring_service(data_dir, KEYRING_SERVICE)
    }

    /// Default backends with the keychain entries filed under `service`.
    /// When the keychain cannot round-trip a value (no platform store, locked
    /// or headless session) a second storage file takes its place.
    pub fn with_keyring_service(data_dir: &Path, service: &str) -> Self {
        let keyring = KeyringBackend::new(service);
        let secondary: Box<dyn TokenBackend> = if keyring.is_available() {
            Box::new(keyring)
        } else {
            warn!("OS keychain unavailable, using a secondary storage file");
            Box::new(FileBackend::new(data_dir.join(FALLBACK_STORAGE_FILE)))
        };

        Self::new(vec![
            Box::new(FileBackend::new(data_dir.join(STORAGE_FILE))),
            secondary,
            Box::new(CookieJarBackend::new(
                data_dir.join(COOKIE_FILE),
                Duration::seconds(COOKIE_MAX_AGE_SECS),
            )),
        ])
    }

    /// Persist `token` to every backend and apply it to outgoing requests.
    /// Returns false if the token is empty or any backend write fails; the
    /// backends already written are rolled back so no partial copy survives.
    pub fn store(&self, token: &str) -> bool {
        if token.is_empty() {
            warn!("Refusing to store empty token");
            return false;
        }
        if self.inner.backends.is_empty() {
            warn!("No storage backends configured");
            return false;
        }

        for (index, backend) in self.inner.backends.iter().enumerate() {
            if let Err(e) = backend.set(TOKEN_KEY, token) {
                warn!(backend = backend.name(), error = %e, "Failed to store token");
                Self::roll_back(&self.inner.backends[..index]);
                return false;
            }
        }

        self.apply_header(token);
        debug!("Token stored");
        true
    }

    /// First token found in precedence order, promoting it into the primary
    /// backend if it came from a lower one.
    pub fn retrieve(&self) -> Option<String> {
        for (index, backend) in self.inner.backends.iter().enumerate() {
            let token = match Self::read_token(backend.as_ref()) {
                Ok(Some(token)) => token,
                Ok(None) => continue,
                Err(e) => {
                    warn!(
                        backend = backend.name(),
                        error = %e,
                        "Failed to read token, skipping backend"
                    );
                    continue;
                }
            };

            if index > 0 {
                self.promote(backend.name(), &token);
            }
            self.apply_header(&token);
            return Some(token);
        }
        None
    }

    /// Remove the token from every backend and strip the header.
    pub fn clear(&self) {
        for backend in &self.inner.backends {
            for key in [TOKEN_KEY, LEGACY_TOKEN_KEY] {
                if let Err(e) = backend.remove(key) {
                    warn!(backend = backend.name(), key, error = %e, "Failed to remove token");
                }
            }
        }
        if let Some(primary) = self.inner.backends.first() {
            for key in [REFRESH_TOKEN_KEY, ADMIN_FLAG_KEY] {
                if let Err(e) = primary.remove(key) {
                    warn!(key, error = %e, "Failed to remove session entry");
                }
            }
        }
        self.strip_header();
        debug!("Token cleared");
    }

    pub fn exists(&self) -> bool {
        self.retrieve().is_some()
    }

    /// `Bearer <token>` header value currently applied to requests
    pub fn authorization(&self) -> Option<String> {
        self.inner
            .authorization
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Admin hint cached in the primary backend at sign-in.
    pub fn cached_admin_flag(&self) -> bool {
        let Some(primary) = self.inner.backends.first() else {
            return false;
        };
        match primary.get(ADMIN_FLAG_KEY) {
            Ok(value) => value.as_deref() == Some("true"),
            Err(e) => {
                warn!(error = %e, "Failed to read cached admin flag");
                false
            }
        }
    }

    pub fn set_cached_admin_flag(&self, is_admin: bool) -> bool {
        let Some(primary) = self.inner.backends.first() else {
            return false;
        };
        match primary.set(ADMIN_FLAG_KEY, if is_admin { "true" } else { "false" }) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to cache admin flag");
                false
            }
        }
    }

    /// Refresh token kept from the last sign-in, if any
    pub fn refresh_token(&self) -> Option<String> {
        let primary = self.inner.backends.first()?;
        match primary.get(REFRESH_TOKEN_KEY) {
            Ok(value) => value.filter(|t| !t.is_empty()),
            Err(e) => {
                warn!(error = %e, "Failed to read refresh token");
                None
            }
        }
    }

    pub fn store_refresh_token(&self, token: &str) -> bool {
        let Some(primary) = self.inner.backends.first() else {
            return false;
        };
        match primary.set(REFRESH_TOKEN_KEY, token) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to store refresh token");
                false
            }
        }
    }

    fn roll_back(written: &[Box<dyn TokenBackend>]) {
        for backend in written {
            if let Err(e) = backend.remove(TOKEN_KEY) {
                warn!(backend = backend.name(), error = %e, "Failed to roll back token write");
            }
        }
    }

    /// Read the token from one backend, migrating the legacy key if that is
    /// the only place it lives.
    fn read_token(backend: &dyn TokenBackend) -> StorageResult<Option<String>> {
        if let Some(token) = backend.get(TOKEN_KEY)?.filter(|t| !t.is_empty()) {
            return Ok(Some(token));
        }

        let legacy = backend.get(LEGACY_TOKEN_KEY)?.filter(|t| !t.is_empty());
        if let Some(ref token) = legacy {
            match backend
                .set(TOKEN_KEY, token)
                .and_then(|_| backend.remove(LEGACY_TOKEN_KEY))
            {
                Ok(()) => info!(backend = backend.name(), "Migrated token to canonical key"),
                Err(e) => warn!(
                    backend = backend.name(),
                    error = %e,
                    "Failed to migrate legacy token key"
                ),
            }
        }
        Ok(legacy)
    }

    fn promote(&self, source: &str, token: &str) {
        let Some(primary) = self.inner.backends.first() else {
            return;
        };
        match primary.set(TOKEN_KEY, token) {
            Ok(()) => debug!(source, "Promoted token into primary storage"),
            Err(e) => warn!(source, error = %e, "Failed to promote token into primary storage"),
        }
    }

    fn apply_header(&self, token: &str) {
        *self
            .inner
            .authorization
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(format!("Bearer {}", token));
    }

    fn strip_header(&self) {
        *self
            .inner
            .authorization
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}
