//! Provguard health — provider health tracking and auto-mitigation.
//!
//! Components, leaf first:
//! - [`blacklist`]: time-bounded circuit breaker per provider
//! - [`predictive`]: warning analyzer over the audit trail
//! - [`audit`]: append-only decision log, filters, recorder, export
//! - [`mitigation`]: confidence-scored failover loop
//! - [`replay`]: re-emission of stored audit entries
//!
//! [`HealthEngine`] builds all of them around one message bus.

pub mod audit;
pub mod blacklist;
pub mod engine;
pub mod mitigation;
pub mod predictive;
pub mod replay;

pub use audit::{AuditFilter, AuditRecorder, AuditSnapshot, AuditTrail, ExportFormat};
pub use blacklist::{Blacklist, DEFAULT_BLOCK_TTL};
pub use engine::{EngineHandle, HealthEngine};
pub use mitigation::{
    ConfidenceScorer, FallbackSelector, HighestScoreSelector, MitigationLoop, ScoringContext,
    TickOutcome, WeightedConfidence,
};
pub use predictive::{analyze, analyze_with, WINDOW_SIZE};
pub use replay::ReplayEngine;
