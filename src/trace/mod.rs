//! Shared trace data types and line-grammar helpers.
//!
//! # Module Organization
//!
//! - [`models`]: Record structs produced by the table builders
//! - [`constants`]: Line markers, keywords and token regexes
//! - [`tokens`]: Keyword-positional token access

pub mod constants;
pub mod models;
pub mod tokens;

// Re-export commonly used types
pub use models::*;
pub use tokens::LineTokens;
