//! Bounded-latency health probe
//!
//! One trivial round trip under an explicit timeout. The probe never
//! returns an error: timeouts, refusals, and rejections are all data for
//! the classifier, so a single invocation always has something to report.

use crate::config::ConnectionConfig;
use crate::connect::{classify_pg_error, connect};
use poolwatch_core::{MonitorError, ProbeFailure, ProbeResult};
use std::time::{Duration, Instant};

/// Default bound for one probe round trip
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

// version() doubles as the trivial round trip and the version capture.
const PROBE_QUERY: &str = "SELECT version()";

/// Probe the server once, measuring wall-clock latency.
pub async fn probe(config: &ConnectionConfig, timeout: Duration) -> ProbeResult {
    let started = Instant::now();
    match tokio::time::timeout(timeout, round_trip(config)).await {
        Ok(Ok(version)) => {
            let latency = started.elapsed();
            tracing::debug!(latency_ms = latency.as_millis() as u64, "probe round trip succeeded");
            ProbeResult::success(latency, Some(version))
        }
        Ok(Err(err)) => {
            tracing::warn!(error = %err, "probe failed");
            ProbeResult::failure(started.elapsed(), failure_from(err))
        }
        Err(_) => {
            tracing::warn!(timeout_ms = timeout.as_millis() as u64, "probe timed out");
            ProbeResult::failure(started.elapsed(), ProbeFailure::Timeout)
        }
    }
}

async fn round_trip(config: &ConnectionConfig) -> Result<String, MonitorError> {
    let client = connect(config).await?;
    let row = client
        .query_one(PROBE_QUERY, &[])
        .await
        .map_err(|err| classify_pg_error(&err, &config.user))?;
    Ok(row.get(0))
}

fn failure_from(err: MonitorError) -> ProbeFailure {
    match err {
        MonitorError::Auth { .. } => ProbeFailure::Auth,
        MonitorError::ServerFull { .. } => ProbeFailure::ServerFull,
        MonitorError::Timeout { .. } => ProbeFailure::Timeout,
        MonitorError::Config(err) => ProbeFailure::Connect(err.to_string()),
        MonitorError::Connect { reason } | MonitorError::Registry { reason } => {
            ProbeFailure::Connect(reason)
        }
    }
}
