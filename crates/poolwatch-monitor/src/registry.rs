//! Session registry client
//!
//! One read-only query against `pg_stat_activity`, scoped to the
//! configured database and to client backends. Records and counts are
//! derived from the same row set, so the per-state counts always sum to
//! the total. Rows whose state the server hides from this user degrade
//! the counts to unknown instead of being miscounted as zero.

use crate::config::ConnectionConfig;
use crate::connect::{connect, with_timeout};
use chrono::{DateTime, Utc};
use poolwatch_core::{MonitorError, PoolSnapshot, SessionRecord, SessionState};
use std::time::Duration;

const SNAPSHOT_QUERY: &str = "\
SELECT pid, \
       state, \
       EXTRACT(EPOCH FROM (now() - state_change))::float8 AS state_age_secs, \
       query_start, \
       application_name \
  FROM pg_stat_activity \
 WHERE datname = $1 \
   AND backend_type = 'client backend'";

/// Capture a fresh snapshot of the server's session pool.
///
/// Opens its own short-lived connection and releases it on every exit
/// path. Fails with [`MonitorError::Connect`] or [`MonitorError::Auth`]
/// when the server cannot be reached at all; a registry view the user may
/// not read maps to [`MonitorError::Registry`] so callers can degrade
/// instead of abort.
pub async fn snapshot(config: &ConnectionConfig) -> Result<PoolSnapshot, MonitorError> {
    let client = connect(config).await?;
    let rows = with_timeout(
        "registry snapshot",
        config.connect_timeout,
        &config.user,
        client.query(SNAPSHOT_QUERY, &[&config.database]),
    )
    .await?;

    let mut sessions = Vec::with_capacity(rows.len());
    let mut hidden = 0usize;
    for row in &rows {
        let pid: i32 = row.get("pid");
        let state: Option<&str> = row.get("state");
        let Some(state) = state.and_then(SessionState::parse) else {
            hidden += 1;
            continue;
        };
        let age_secs: Option<f64> = row.get("state_age_secs");
        let query_start: Option<DateTime<Utc>> = row.get("query_start");
        let application_name: Option<String> = row.get("application_name");

        sessions.push(SessionRecord {
            pid,
            state,
            state_age: Duration::from_secs_f64(age_secs.unwrap_or(0.0).max(0.0)),
            query_start,
            application_name,
        });
    }

    if hidden > 0 {
        tracing::warn!(
            hidden,
            visible = sessions.len(),
            "session detail partially hidden; counts degraded to unknown"
        );
        Ok(PoolSnapshot::degraded(sessions))
    } else {
        tracing::debug!(sessions = sessions.len(), "captured registry snapshot");
        Ok(PoolSnapshot::observed(sessions))
    }
}
