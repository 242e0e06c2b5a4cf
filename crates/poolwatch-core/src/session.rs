//! Session registry data model
//!
//! Structures mirroring what the server's session-introspection view
//! (`pg_stat_activity`) reports: one record per backend, plus the tallied
//! per-state counts the reporter and reaper work from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::time::Duration;

/// State of one backend session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Currently executing a query
    Active,
    /// Holding a slot while executing nothing
    Idle,
    /// Holding an open transaction while executing nothing. Unsafe to
    /// terminate blindly: the transaction may belong to a live caller.
    IdleInTransaction,
}

impl SessionState {
    /// Map a raw registry state string onto the modeled states.
    ///
    /// The server reports more granular states than this tool acts on;
    /// aborted-in-transaction folds into [`SessionState::IdleInTransaction`],
    /// fastpath calls into [`SessionState::Active`], disabled tracking into
    /// [`SessionState::Idle`]. Unrecognized strings return `None` and are
    /// treated like hidden rows rather than guessed at.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "active" | "fastpath function call" => Some(SessionState::Active),
            "idle" | "disabled" => Some(SessionState::Idle),
            "idle in transaction" | "idle in transaction (aborted)" => {
                Some(SessionState::IdleInTransaction)
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Active => "active",
            SessionState::Idle => "idle",
            SessionState::IdleInTransaction => "idle_in_transaction",
        }
    }
}

/// One backend session, captured fresh on every registry query and never
/// persisted.
#[derive(Debug, Clone, Serialize)]
pub struct SessionRecord {
    /// Backend process identifier
    pub pid: i32,
    pub state: SessionState,
    /// Time since the session last changed state
    #[serde(serialize_with = "secs", rename = "state_age_secs")]
    pub state_age: Duration,
    /// Start of the current query, when one is running
    pub query_start: Option<DateTime<Utc>>,
    pub application_name: Option<String>,
}

fn secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_secs())
}

/// Per-state session counts. The per-state fields always sum to `total`;
/// [`StateCounts::tally`] is the only constructor used by the registry
/// client, so the invariant holds by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCounts {
    pub total: usize,
    pub active: usize,
    pub idle: usize,
    pub idle_in_transaction: usize,
}

impl StateCounts {
    /// Tally counts from a record list
    pub fn tally(records: &[SessionRecord]) -> Self {
        let mut counts = StateCounts {
            total: records.len(),
            active: 0,
            idle: 0,
            idle_in_transaction: 0,
        };
        for record in records {
            match record.state {
                SessionState::Active => counts.active += 1,
                SessionState::Idle => counts.idle += 1,
                SessionState::IdleInTransaction => counts.idle_in_transaction += 1,
            }
        }
        counts
    }

    /// Fraction of the pool sitting idle, 0.0 for an empty pool
    pub fn idle_fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.idle as f64 / self.total as f64
        }
    }
}

/// Point-in-time view of the server's session pool.
///
/// `counts` is `None` when per-session visibility was unavailable. An
/// unknown pool is never reported as an empty one; consumers must treat
/// the two cases differently.
#[derive(Debug, Clone, Serialize)]
pub struct PoolSnapshot {
    pub counts: Option<StateCounts>,
    pub sessions: Vec<SessionRecord>,
    pub captured_at: DateTime<Utc>,
}

impl PoolSnapshot {
    /// Snapshot with full visibility; counts are tallied from the records
    pub fn observed(sessions: Vec<SessionRecord>) -> Self {
        let counts = StateCounts::tally(&sessions);
        PoolSnapshot {
            counts: Some(counts),
            sessions,
            captured_at: Utc::now(),
        }
    }

    /// Snapshot with counts degraded to unknown; `sessions` holds whatever
    /// detail was still visible.
    pub fn degraded(sessions: Vec<SessionRecord>) -> Self {
        PoolSnapshot {
            counts: None,
            sessions,
            captured_at: Utc::now(),
        }
    }
}
