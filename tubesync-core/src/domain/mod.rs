//! Core domain types
//!
//! These types are built only through their normalization functions, so every
//! value that reaches the sync layer already satisfies its invariants.

pub mod job;
pub mod progress;
pub mod recent;
pub mod task;
pub mod video;

use thiserror::Error;

/// Raised when a server payload cannot be turned into a domain value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },

    #[error("expected a JSON object")]
    NotAnObject,
}
