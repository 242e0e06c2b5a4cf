//! Full diagnostic flow
//!
//! Registry snapshot plus bounded probe, folded into one report. Loss of
//! registry visibility degrades the snapshot instead of aborting, and
//! probe failures classify the pool instead of erroring, so every
//! invocation explains what could and could not be observed.

use crate::config::ConnectionConfig;
use crate::prober::{self, DEFAULT_PROBE_TIMEOUT};
use crate::registry;
use poolwatch_core::{DiagnosticReport, MonitorError, PoolSnapshot, ReportThresholds};
use std::time::Duration;

/// Options for one diagnostic run
#[derive(Debug, Clone)]
pub struct DiagnoseOptions {
    pub probe_timeout: Duration,
    pub thresholds: ReportThresholds,
}

impl Default for DiagnoseOptions {
    fn default() -> Self {
        DiagnoseOptions {
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            thresholds: ReportThresholds::default(),
        }
    }
}

/// Run one diagnostic pass. Always yields a report.
pub async fn diagnose(config: &ConnectionConfig, options: &DiagnoseOptions) -> DiagnosticReport {
    let snapshot = match registry::snapshot(config).await {
        Ok(snapshot) => snapshot,
        Err(MonitorError::Registry { reason }) => {
            tracing::warn!(reason, "registry visibility degraded");
            PoolSnapshot::degraded(Vec::new())
        }
        Err(err) => {
            // The probe sees the same server and will turn this failure
            // into a classification.
            tracing::warn!(error = %err, "registry snapshot failed");
            PoolSnapshot::degraded(Vec::new())
        }
    };

    let probe = prober::probe(config, options.probe_timeout).await;
    DiagnosticReport::build(snapshot, probe, &options.thresholds)
}
