//! Authentication module for token storage and the signed-in session.
//!
//! This module provides:
//! - `TokenStore`: redundant bearer-token storage with read-repair
//! - `TokenBackend` and its implementations: file, OS keychain, cookie jar, memory
//! - `AuthSession`: the authenticated-user state machine shared by all screens
//!
//! Only the token is persisted. The session is rebuilt from it on startup by
//! asking the backend who the token belongs to.

pub mod backend;
pub mod session;
pub mod token_store;

pub use backend::{
    CookieJarBackend, FileBackend, KeyringBackend, MemoryBackend, StorageError, TokenBackend,
};
pub use session::{AuthSession, AuthState, LoginOutcome, SessionSnapshot};
pub use token_store::TokenStore;
