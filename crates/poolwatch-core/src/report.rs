//! Diagnostic report assembly
//!
//! Folds a registry snapshot and a probe result into the one artifact the
//! rest of the system consumes: a classification plus an ordered list of
//! recommended actions, chosen from a deterministic rule table.

use crate::health::{Classification, ProbeResult};
use crate::session::{PoolSnapshot, SessionState};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Operator guidance attached to a diagnostic report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    /// Credentials were rejected
    VerifyCredentials,
    /// The pool is exhausted or carrying a heavy idle surplus
    ReclaimIdleSessions,
    /// Idle-in-transaction sessions are past the age bound
    InvestigateLongTransactions,
    /// Active session count is unusually high
    ReviewActiveLoad,
    /// The server could not be reached
    CheckNetworkPath,
}

impl RecommendedAction {
    pub fn describe(&self) -> &'static str {
        match self {
            RecommendedAction::VerifyCredentials => {
                "verify database credentials; no retry will succeed without reconfiguration"
            }
            RecommendedAction::ReclaimIdleSessions => {
                "increase idle-session reclamation frequency or reduce the configured pool size"
            }
            RecommendedAction::InvestigateLongTransactions => {
                "investigate long-running transactions holding idle-in-transaction sessions"
            }
            RecommendedAction::ReviewActiveLoad => {
                "review query load; active session count is unusually high"
            }
            RecommendedAction::CheckNetworkPath => {
                "check network path and database availability before retrying"
            }
        }
    }
}

impl fmt::Display for RecommendedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Thresholds feeding the action rule table
#[derive(Debug, Clone)]
pub struct ReportThresholds {
    /// Age past which an idle or idle-in-transaction session is stale
    pub max_idle_age: Duration,
    /// Idle fraction above which reclamation is recommended
    pub idle_fraction_warn: f64,
    /// Pools smaller than this never trip the idle-fraction rule
    pub min_pool_for_fraction: usize,
    /// Active count above which load review is recommended
    pub active_warn: usize,
}

impl Default for ReportThresholds {
    fn default() -> Self {
        ReportThresholds {
            max_idle_age: Duration::from_secs(300),
            idle_fraction_warn: 0.8,
            min_pool_for_fraction: 10,
            active_warn: 10,
        }
    }
}

/// Aggregated diagnostic: snapshot, probe, classification, actions.
/// Immutable once built and owned solely by the caller that requested it.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticReport {
    pub snapshot: PoolSnapshot,
    pub probe: ProbeResult,
    pub classification: Classification,
    pub actions: Vec<RecommendedAction>,
    pub generated_at: DateTime<Utc>,
}

impl DiagnosticReport {
    /// Build a report from one snapshot and one probe outcome.
    ///
    /// The action rules run in a fixed order so reports are reproducible:
    /// credential guidance first, then capacity reclamation, then stuck
    /// transactions, then load review, then reachability.
    pub fn build(
        snapshot: PoolSnapshot,
        probe: ProbeResult,
        thresholds: &ReportThresholds,
    ) -> Self {
        let classification = Classification::from_probe(&probe);
        let mut actions = Vec::new();

        if classification == Classification::AuthFailure {
            actions.push(RecommendedAction::VerifyCredentials);
        }

        let idle_heavy = snapshot.counts.is_some_and(|counts| {
            counts.total >= thresholds.min_pool_for_fraction
                && counts.idle_fraction() > thresholds.idle_fraction_warn
        });
        if classification == Classification::Exhausted || idle_heavy {
            actions.push(RecommendedAction::ReclaimIdleSessions);
        }

        let stuck = snapshot.sessions.iter().any(|session| {
            session.state == SessionState::IdleInTransaction
                && session.state_age >= thresholds.max_idle_age
        });
        if stuck {
            actions.push(RecommendedAction::InvestigateLongTransactions);
        }

        let busy = snapshot
            .counts
            .is_some_and(|counts| counts.active > thresholds.active_warn);
        if busy {
            actions.push(RecommendedAction::ReviewActiveLoad);
        }

        if classification == Classification::Unreachable {
            actions.push(RecommendedAction::CheckNetworkPath);
        }

        DiagnosticReport {
            snapshot,
            probe,
            classification,
            actions,
            generated_at: Utc::now(),
        }
    }

    /// Exit code for the operator surface
    pub fn exit_code(&self) -> i32 {
        self.classification.exit_code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::ProbeFailure;
    use crate::session::SessionRecord;

    fn sessions(
        active: usize,
        idle_stale: usize,
        idle_fresh: usize,
        in_transaction: usize,
        stale_age: Duration,
    ) -> Vec<SessionRecord> {
        let mut records = Vec::new();
        let mut pid = 100;
        let mut push = |state: SessionState, age: Duration, count: usize| {
            for _ in 0..count {
                records.push(SessionRecord {
                    pid,
                    state,
                    state_age: age,
                    query_start: None,
                    application_name: None,
                });
                pid += 1;
            }
        };
        push(SessionState::Active, Duration::from_secs(1), active);
        push(SessionState::Idle, stale_age, idle_stale);
        push(SessionState::Idle, Duration::from_secs(10), idle_fresh);
        push(SessionState::IdleInTransaction, stale_age, in_transaction);
        records
    }

    #[test]
    fn probe_timeout_reports_exhaustion_with_reclamation_guidance() {
        let snapshot = PoolSnapshot::observed(sessions(2, 15, 3, 0, Duration::from_secs(400)));
        let probe = ProbeResult::failure(Duration::from_secs(8), ProbeFailure::Timeout);

        let report = DiagnosticReport::build(snapshot, probe, &ReportThresholds::default());

        assert_eq!(report.classification, Classification::Exhausted);
        assert_eq!(report.exit_code(), 1);
        assert!(
            report
                .actions
                .contains(&RecommendedAction::ReclaimIdleSessions)
        );
    }

    #[test]
    fn fast_probe_with_heavy_idle_fraction_still_flags_reclamation() {
        // 27 idle of 30 total: healthy by latency, idle fraction 0.9.
        let snapshot = PoolSnapshot::observed(sessions(3, 27, 0, 0, Duration::from_secs(400)));
        let probe = ProbeResult::success(Duration::from_millis(450), None);

        let report = DiagnosticReport::build(snapshot, probe, &ReportThresholds::default());

        assert_eq!(report.classification, Classification::Healthy);
        assert_eq!(report.exit_code(), 0);
        assert!(
            report
                .actions
                .contains(&RecommendedAction::ReclaimIdleSessions)
        );
    }

    #[test]
    fn small_pools_never_trip_the_idle_fraction_rule() {
        let snapshot = PoolSnapshot::observed(sessions(0, 4, 0, 0, Duration::from_secs(400)));
        let probe = ProbeResult::success(Duration::from_millis(20), None);

        let report = DiagnosticReport::build(snapshot, probe, &ReportThresholds::default());
        assert!(
            !report
                .actions
                .contains(&RecommendedAction::ReclaimIdleSessions)
        );
    }

    #[test]
    fn degraded_snapshot_still_produces_a_report_from_the_probe() {
        let snapshot = PoolSnapshot::degraded(Vec::new());
        let probe = ProbeResult::success(Duration::from_millis(300), None);

        let report = DiagnosticReport::build(snapshot, probe, &ReportThresholds::default());

        assert!(report.snapshot.counts.is_none());
        assert_eq!(report.classification, Classification::Healthy);
        assert!(report.actions.is_empty());
    }

    #[test]
    fn auth_failure_leads_with_credential_guidance() {
        let snapshot = PoolSnapshot::degraded(Vec::new());
        let probe = ProbeResult::failure(Duration::from_millis(30), ProbeFailure::Auth);

        let report = DiagnosticReport::build(snapshot, probe, &ReportThresholds::default());

        assert_eq!(report.classification, Classification::AuthFailure);
        assert_eq!(report.exit_code(), 2);
        assert_eq!(report.actions.first(), Some(&RecommendedAction::VerifyCredentials));
    }

    #[test]
    fn stale_transactions_are_flagged_but_never_resolved_here() {
        let snapshot = PoolSnapshot::observed(sessions(1, 0, 0, 2, Duration::from_secs(600)));
        let probe = ProbeResult::success(Duration::from_millis(100), None);

        let report = DiagnosticReport::build(snapshot, probe, &ReportThresholds::default());
        assert!(
            report
                .actions
                .contains(&RecommendedAction::InvestigateLongTransactions)
        );
    }

    #[test]
    fn high_active_load_is_called_out() {
        let snapshot = PoolSnapshot::observed(sessions(15, 2, 0, 0, Duration::from_secs(400)));
        let probe = ProbeResult::success(Duration::from_millis(80), None);

        let report = DiagnosticReport::build(snapshot, probe, &ReportThresholds::default());
        assert!(report.actions.contains(&RecommendedAction::ReviewActiveLoad));
    }

    #[test]
    fn unreachable_server_recommends_checking_the_path() {
        let snapshot = PoolSnapshot::degraded(Vec::new());
        let probe = ProbeResult::failure(
            Duration::from_millis(12),
            ProbeFailure::Connect("connection refused".to_string()),
        );

        let report = DiagnosticReport::build(snapshot, probe, &ReportThresholds::default());
        assert_eq!(report.classification, Classification::Unreachable);
        assert_eq!(report.exit_code(), 1);
        assert!(report.actions.contains(&RecommendedAction::CheckNetworkPath));
    }

    #[test]
    fn report_serializes_for_the_json_surface() {
        let snapshot = PoolSnapshot::observed(sessions(1, 1, 0, 0, Duration::from_secs(400)));
        let probe = ProbeResult::success(Duration::from_millis(200), Some("PostgreSQL 15.1".into()));
        let report = DiagnosticReport::build(snapshot, probe, &ReportThresholds::default());

        let rendered = serde_json::to_value(&report).expect("report serializes");
        assert_eq!(rendered["classification"], "healthy");
        assert_eq!(rendered["probe"]["latency_ms"], 200);
        assert_eq!(rendered["snapshot"]["counts"]["total"], 2);
    }
}
