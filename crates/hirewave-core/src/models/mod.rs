//! Data models for HireWave entities.
//!
//! This module contains the records exchanged with the HireWave REST API:
//!
//! - `User`, `UserId`, `UserType`: the authenticated account and its role
//! - `Credentials`, `Registration`: sign-in and sign-up request bodies
//! - `Job`, `JobUpdate`: job listings managed from the recruiter dashboards
//! - `BlogPost`, `BlogCategory`: blog CMS content

pub mod blog;
pub mod job;
pub mod user;

pub use blog::{BlogCategory, BlogPost, BlogPostDraft, NewCategory};
pub use job::{Job, JobStatus, JobUpdate};
pub use user::{Credentials, Registration, User, UserId, UserType};
