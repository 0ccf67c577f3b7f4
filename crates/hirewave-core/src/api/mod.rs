//! REST API client module for the HireWave backend.
//!
//! This module provides the `ApiClient` for communicating with the HireWave
//! API: the sign-in endpoints, the "who am I" profile exchange, and the job
//! and blog endpoints used by the dashboards.
//!
//! Every request carries the bearer header currently applied by the shared
//! `TokenStore`. Failures are normalized into `ApiError`, list responses
//! into `Page<T>`.

pub mod client;
pub mod error;
pub mod pagination;

pub use client::{ApiClient, AuthGrant, OtpReceipt};
pub use error::{ApiError, ApiResult};
pub use pagination::Page;
