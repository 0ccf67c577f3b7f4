//! Utility functions for string formatting and list handling.

pub mod format;
pub mod table;

// Re-export commonly used functions at module level
pub use format::{contains_ignore_case, strip_html, truncate};
pub use table::{paginate, total_pages};
