//! # Poolwatch Core
//!
//! Pure data model and classification logic for Postgres connection-pool
//! diagnostics: session registry records, probe results, health
//! classification, and diagnostic report assembly.
//!
//! Nothing in this crate performs I/O. The async registry client, prober,
//! and reaper live in `poolwatch-monitor`; this crate is where their
//! observations become decisions.

pub mod error;
pub mod health;
pub mod report;
pub mod session;

pub use error::{ConfigError, MonitorError, MonitorResult};
pub use health::{Classification, ProbeFailure, ProbeResult};
pub use report::{DiagnosticReport, RecommendedAction, ReportThresholds};
pub use session::{PoolSnapshot, SessionRecord, SessionState, StateCounts};
