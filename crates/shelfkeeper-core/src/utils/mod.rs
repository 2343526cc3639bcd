//! Utility functions for string formatting and manipulation.

pub mod format;

// Re-export commonly used functions at module level
pub use format::{format_date, format_optional, truncate_bytes, truncate_string};
