//! Storage backends the token store persists credentials into.
//!
//! Each backend is a small key-value surface. The token store holds them in
//! precedence order and never talks to a concrete backend type directly.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt storage file: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// A key-value storage surface holding credentials.
pub trait TokenBackend: Send + Sync {
    /// Short name used in log fields
    fn name(&self) -> &'static str;

    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Removing a missing key is not an error.
    fn remove(&self, key: &str) -> StorageResult<()>;
}

// ============================================================================
// In-memory backend
// ============================================================================

/// Process-local map. Clones share the same entries, so a clone kept by the
/// caller observes everything the token store writes.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    entries: Arc<Mutex<HashMap<String, String>>>,
    disabled: Arc<AtomicBool>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend that fails every operation, like storage turned off in the
    /// user's settings.
    pub fn disabled() -> Self {
        let backend = Self::default();
        backend.set_enabled(false);
        backend
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.disabled.store(!enabled, Ordering::SeqCst);
    }

    fn entries(&self) -> StorageResult<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        if self.disabled.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("memory storage is disabled".to_string()));
        }
        self.entries
            .lock()
            .map_err(|_| StorageError::Unavailable("memory storage lock poisoned".to_string()))
    }
}

impl TokenBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.entries()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.entries()?.remove(key);
        Ok(())
    }
}

// ============================================================================
// JSON file backends
// ============================================================================

fn read_json_map<T: DeserializeOwned>(path: &Path) -> StorageResult<HashMap<String, T>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let contents = std::fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(HashMap::new());
    }
    Ok(serde_json::from_str(&contents)?)
}

fn write_json_map<T: Serialize>(path: &Path, map: &HashMap<String, T>) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let contents = serde_json::to_string_pretty(map)?;
    std::fs::write(path, contents)?;
    Ok(())
}

/// Durable key-value file on disk.
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenBackend for FileBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let map: HashMap<String, String> = read_json_map(&self.path)?;
        Ok(map.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut map: HashMap<String, String> = read_json_map(&self.path)?;
        map.insert(key.to_string(), value.to_string());
        write_json_map(&self.path, &map)
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let mut map: HashMap<String, String> = read_json_map(&self.path)?;
        if map.remove(key).is_some() {
            write_json_map(&self.path, &map)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Cookie {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Cookie jar file. Every write carries a max-age; expired cookies read as
/// absent and are dropped on the next write.
pub struct CookieJarBackend {
    path: PathBuf,
    max_age: Duration,
}

impl CookieJarBackend {
    pub fn new(path: impl Into<PathBuf>, max_age: Duration) -> Self {
        Self {
            path: path.into(),
            max_age,
        }
    }

    /// Write a cookie with an explicit expiry instead of the jar's max-age
    pub fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        expires_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let now = Utc::now();
        let mut jar: HashMap<String, Cookie> = read_json_map(&self.path)?;
        jar.retain(|_, cookie| cookie.expires_at > now);
        jar.insert(
            key.to_string(),
            Cookie {
                value: value.to_string(),
                expires_at,
            },
        );
        write_json_map(&self.path, &jar)
    }
}

impl TokenBackend for CookieJarBackend {
    fn name(&self) -> &'static str {
        "cookie"
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let jar: HashMap<String, Cookie> = read_json_map(&self.path)?;
        match jar.get(key) {
            Some(cookie) if cookie.expires_at > Utc::now() => Ok(Some(cookie.value.clone())),
            Some(_) => {
                debug!(key, "Cookie expired");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.set_with_expiry(key, value, Utc::now() + self.max_age)
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let mut jar: HashMap<String, Cookie> = read_json_map(&self.path)?;
        if jar.remove(key).is_some() {
            write_json_map(&self.path, &jar)?;
        }
        Ok(())
    }
}

// ============================================================================
// OS keychain backend
// ============================================================================

/// Key written and removed again by `KeyringBackend::is_available`
const CHECK_KEY: &str = "hirewave-keychain-check";

/// Credentials kept in the OS keychain, one entry per key.
pub struct KeyringBackend {
    service: String,
}

impl KeyringBackend {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> StorageResult<keyring::Entry> {
        Ok(keyring::Entry::new(&self.service, key)?)
    }

    /// Whether a value written here can be read back through a new entry.
    /// Builds without a platform store fall back to keyring's mock store,
    /// which accepts writes but never returns them.
    pub fn is_available(&self) -> bool {
        let round_trip = || -> StorageResult<bool> {
            self.set(CHECK_KEY, "ok")?;
            let read_back = self.get(CHECK_KEY)?;
            self.remove(CHECK_KEY)?;
            Ok(read_back.as_deref() == Some("ok"))
        };
        match round_trip() {
            Ok(available) => available,
            Err(e) => {
                debug!(error = %e, "Keychain round trip failed");
                false
            }
        }
    }
}

impl TokenBackend for KeyringBackend {
    fn name(&self) -> &'static str {
        "keyring"
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.entry(key)?.set_password(value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
