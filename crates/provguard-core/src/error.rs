//! Error type for the few fallible surfaces of the core.
//!
//! Health operations themselves (block, unblock, filter, analyze) are total
//! and never return this.

use thiserror::Error;

/// Errors raised while parsing user input or producing exports.
#[derive(Debug, Error)]
pub enum Error {
    /// A topic string that is not one of the canonical bus topics.
    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    /// An export format other than `json` or `csv`.
    #[error("unknown export format: {0}")]
    UnknownFormat(String),

    /// A block reason other than `predictive`, `manual`, or `auto-mitigation`.
    #[error("unknown block reason: {0}")]
    UnknownReason(String),

    /// A confidence scorer produced an unusable value.
    #[error("scoring failed: {0}")]
    Scoring(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
