//! Audit trail — recording, filtering, and export of routing decisions.

pub mod export;
pub mod filter;
pub mod recorder;
pub mod trail;

pub use export::{export_entries, ExportFormat};
pub use filter::{filter_by_source, filter_entries, AuditFilter};
pub use recorder::AuditRecorder;
pub use trail::{AuditSnapshot, AuditTrail};
