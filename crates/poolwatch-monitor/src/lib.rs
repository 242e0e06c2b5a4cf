//! # Poolwatch Monitor
//!
//! Async operations against a live Postgres server: session registry
//! snapshots, idle-session reclamation, and bounded health probes.
//!
//! Every operation opens its own short-lived connection and releases it on
//! every exit path; nothing is shared between invocations, so concurrent
//! monitors need no coordination. Termination by backend pid is idempotent,
//! which makes overlapping reap passes safe.

pub mod config;
mod connect;
pub mod diagnose;
pub mod prober;
pub mod reaper;
pub mod registry;

pub use config::{ConnectionConfig, TlsMode};
pub use diagnose::{DiagnoseOptions, diagnose};
pub use prober::{DEFAULT_PROBE_TIMEOUT, probe};
pub use reaper::{ReapFailure, ReapPlan, ReapPolicy, ReapReport, plan_reap, run_reap};
pub use registry::snapshot;
