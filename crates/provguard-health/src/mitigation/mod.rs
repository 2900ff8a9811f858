//! Auto-mitigation — confidence-scored failover on a fixed period.

pub mod control_loop;
pub mod scoring;

pub use control_loop::{MitigationLoop, TickOutcome};
pub use scoring::{
    ConfidenceScorer, FallbackSelector, HighestScoreSelector, ScoringContext, WeightedConfidence,
};
