//! HireWave client core.
//!
//! Shared by every HireWave front end: the REST client, redundant token
//! storage, the authenticated-session state machine, route access decisions
//! and feature flags.

pub mod api;
pub mod auth;
pub mod config;
pub mod flags;
pub mod guard;
pub mod models;
pub mod utils;

pub use api::{ApiClient, ApiError, ApiResult, Page};
pub use auth::{AuthSession, AuthState, LoginOutcome, SessionSnapshot, TokenStore};
pub use config::{Config, Mode};
pub use flags::FeatureFlags;
pub use guard::{AccessRequirement, FeatureDecision, GuardDecision};
