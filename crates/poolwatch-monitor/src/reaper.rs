//! Idle session reclamation
//!
//! Candidate selection is a pure function over registry records so the
//! policy is testable without a server; execution terminates backends one
//! pid at a time. Termination by pid is idempotent: a session that
//! disappeared before the attempt still leaves the idle count reduced,
//! which is the outcome the reaper is after. Sessions idling inside an
//! open transaction are never terminated; they are surfaced as warnings
//! because killing one could abandon another component's transaction
//! mid-flight.

use crate::config::ConnectionConfig;
use crate::connect::{connect, with_timeout};
use crate::registry;
use chrono::{DateTime, Utc};
use poolwatch_core::{MonitorError, SessionRecord, SessionState, StateCounts};
use serde::Serialize;
use std::time::Duration;

const OWN_PID_QUERY: &str = "SELECT pg_backend_pid()";
const TERMINATE_QUERY: &str = "SELECT pg_terminate_backend($1)";

/// Policy knobs for one reclamation pass
#[derive(Debug, Clone)]
pub struct ReapPolicy {
    /// Minimum idle age before a session becomes a candidate
    pub max_idle_age: Duration,
    /// Idle sessions left untouched so short bursts can reuse them
    /// without paying for fresh connections
    pub safety_floor: usize,
    /// Maximum terminations in one pass
    pub budget: usize,
}

impl Default for ReapPolicy {
    fn default() -> Self {
        ReapPolicy {
            max_idle_age: Duration::from_secs(300),
            safety_floor: 5,
            budget: 50,
        }
    }
}

/// Candidate pids in termination order, plus warn-only observations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReapPlan {
    /// Oldest idle first; lower pid breaks ties
    pub candidates: Vec<i32>,
    /// Idle-in-transaction sessions past the age bound. Never terminated.
    pub stuck_in_transaction: Vec<i32>,
}

/// Select which sessions one reclamation pass may terminate.
///
/// Candidates are idle sessions at least `max_idle_age` old, excluding
/// `own_pid`. The pass keeps `safety_floor` idle sessions alive (counted
/// against all idle sessions, not just stale ones) and terminates at most
/// `budget`.
pub fn plan_reap(
    records: &[SessionRecord],
    own_pid: Option<i32>,
    policy: &ReapPolicy,
) -> ReapPlan {
    let idle_total = records
        .iter()
        .filter(|record| record.state == SessionState::Idle)
        .count();

    let mut eligible: Vec<&SessionRecord> = records
        .iter()
        .filter(|record| record.state == SessionState::Idle)
        .filter(|record| record.state_age >= policy.max_idle_age)
        .filter(|record| Some(record.pid) != own_pid)
        .collect();
    eligible.sort_by(|a, b| {
        b.state_age
            .cmp(&a.state_age)
            .then(a.pid.cmp(&b.pid))
    });

    let allowance = idle_total.saturating_sub(policy.safety_floor);
    let take = allowance.min(policy.budget).min(eligible.len());

    let stuck_in_transaction = records
        .iter()
        .filter(|record| {
            record.state == SessionState::IdleInTransaction
                && record.state_age >= policy.max_idle_age
        })
        .map(|record| record.pid)
        .collect();

    ReapPlan {
        candidates: eligible[..take].iter().map(|record| record.pid).collect(),
        stuck_in_transaction,
    }
}

/// One termination attempt that the server rejected
#[derive(Debug, Clone, Serialize)]
pub struct ReapFailure {
    pub pid: i32,
    pub reason: String,
}

/// Outcome of one reclamation pass
#[derive(Debug, Clone, Serialize)]
pub struct ReapReport {
    /// Counts as seen before any termination; `None` when visibility was
    /// degraded
    pub counts_before: Option<StateCounts>,
    pub terminated: usize,
    pub failures: Vec<ReapFailure>,
    /// Warn-only: stale sessions holding open transactions
    pub stuck_in_transaction: Vec<i32>,
    pub visibility_degraded: bool,
    pub finished_at: DateTime<Utc>,
}

impl ReapReport {
    fn degraded() -> Self {
        ReapReport {
            counts_before: None,
            terminated: 0,
            failures: Vec::new(),
            stuck_in_transaction: Vec::new(),
            visibility_degraded: true,
            finished_at: Utc::now(),
        }
    }
}

/// Run one reclamation pass: snapshot, plan, terminate.
///
/// Safe to run from concurrent monitors; two passes racing over the same
/// stale session both succeed because termination is idempotent. With
/// fully degraded registry visibility there are no candidates, and the
/// pass reports that instead of failing.
pub async fn run_reap(
    config: &ConnectionConfig,
    policy: &ReapPolicy,
) -> Result<ReapReport, MonitorError> {
    let snapshot = match registry::snapshot(config).await {
        Ok(snapshot) => snapshot,
        Err(MonitorError::Registry { reason }) => {
            tracing::warn!(reason, "session detail unavailable; nothing to reap");
            return Ok(ReapReport::degraded());
        }
        Err(err) => return Err(err),
    };

    let client = connect(config).await?;
    let own_pid: i32 = with_timeout(
        "backend pid lookup",
        config.connect_timeout,
        &config.user,
        client.query_one(OWN_PID_QUERY, &[]),
    )
    .await?
    .get(0);

    let plan = plan_reap(&snapshot.sessions, Some(own_pid), policy);
    if !plan.stuck_in_transaction.is_empty() {
        tracing::warn!(
            pids = ?plan.stuck_in_transaction,
            "stale idle-in-transaction sessions found; refusing to terminate them"
        );
    }

    let mut terminated = 0usize;
    let mut failures = Vec::new();
    for pid in &plan.candidates {
        match with_timeout(
            "terminate backend",
            config.connect_timeout,
            &config.user,
            client.query_one(TERMINATE_QUERY, &[pid]),
        )
        .await
        {
            Ok(row) => {
                let acknowledged: bool = row.get(0);
                if !acknowledged {
                    tracing::debug!(pid, "session already gone before termination");
                }
                terminated += 1;
            }
            Err(err) => {
                tracing::warn!(pid, error = %err, "termination attempt failed");
                failures.push(ReapFailure {
                    pid: *pid,
                    reason: err.to_string(),
                });
            }
        }
    }

    tracing::info!(
        terminated,
        failed = failures.len(),
        planned = plan.candidates.len(),
        "reap pass complete"
    );

    Ok(ReapReport {
        counts_before: snapshot.counts,
        terminated,
        failures,
        stuck_in_transaction: plan.stuck_in_transaction,
        visibility_degraded: snapshot.counts.is_none(),
        finished_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn record(pid: i32, state: SessionState, age_secs: u64) -> SessionRecord {
        SessionRecord {
            pid,
            state,
            state_age: Duration::from_secs(age_secs),
            query_start: None,
            application_name: None,
        }
    }

    fn policy(max_idle_age: u64, safety_floor: usize, budget: usize) -> ReapPolicy {
        ReapPolicy {
            max_idle_age: Duration::from_secs(max_idle_age),
            safety_floor,
            budget,
        }
    }

    #[test]
    fn reaps_down_to_the_safety_floor() {
        // 2 active, 18 idle of which 15 are stale: allowance is 18 - 5,
        // bounded by 15 eligible and a budget of 50.
        let mut records = vec![
            record(1, SessionState::Active, 10),
            record(2, SessionState::Active, 20),
        ];
        for pid in 10..25 {
            records.push(record(pid, SessionState::Idle, 400));
        }
        for pid in 25..28 {
            records.push(record(pid, SessionState::Idle, 100));
        }

        let plan = plan_reap(&records, None, &policy(300, 5, 50));
        assert_eq!(plan.candidates.len(), 13);
        // Only stale sessions are candidates.
        assert!(plan.candidates.iter().all(|pid| (10..25).contains(pid)));
    }

    #[test]
    fn second_pass_finds_nothing_left_to_reap() {
        let mut records: Vec<SessionRecord> = (10..28)
            .map(|pid| record(pid, SessionState::Idle, 400))
            .collect();

        let first = plan_reap(&records, None, &policy(300, 5, 50));
        assert_eq!(first.candidates.len(), 13);

        records.retain(|r| !first.candidates.contains(&r.pid));
        let second = plan_reap(&records, None, &policy(300, 5, 50));
        assert!(second.candidates.is_empty());
    }

    #[test]
    fn idle_in_transaction_is_warned_about_never_terminated() {
        let records = vec![
            record(1, SessionState::IdleInTransaction, 900),
            record(2, SessionState::IdleInTransaction, 600),
            record(3, SessionState::IdleInTransaction, 30),
            record(4, SessionState::Idle, 900),
        ];

        let plan = plan_reap(&records, None, &policy(300, 0, 50));
        assert_eq!(plan.candidates, vec![4]);
        assert_eq!(plan.stuck_in_transaction, vec![1, 2]);
    }

    #[test]
    fn own_session_is_never_a_candidate() {
        let records = vec![
            record(7, SessionState::Idle, 900),
            record(8, SessionState::Idle, 900),
        ];
        let plan = plan_reap(&records, Some(7), &policy(300, 0, 50));
        assert_eq!(plan.candidates, vec![8]);
    }

    #[test]
    fn oldest_idle_goes_first_with_pid_breaking_ties() {
        let records = vec![
            record(30, SessionState::Idle, 400),
            record(10, SessionState::Idle, 900),
            record(20, SessionState::Idle, 900),
            record(40, SessionState::Idle, 600),
        ];
        let plan = plan_reap(&records, None, &policy(300, 0, 3));
        assert_eq!(plan.candidates, vec![10, 20, 40]);
    }

    #[test]
    fn budget_caps_a_single_pass() {
        let records: Vec<SessionRecord> = (1..=20)
            .map(|pid| record(pid, SessionState::Idle, 400))
            .collect();
        let plan = plan_reap(&records, None, &policy(300, 0, 4));
        assert_eq!(plan.candidates.len(), 4);
    }

    #[test]
    fn floor_larger_than_idle_count_means_no_reaping() {
        let records: Vec<SessionRecord> = (1..=3)
            .map(|pid| record(pid, SessionState::Idle, 900))
            .collect();
        let plan = plan_reap(&records, None, &policy(300, 5, 50));
        assert!(plan.candidates.is_empty());
    }

    proptest! {
        #[test]
        fn planning_invariants_hold_for_arbitrary_pools(
            states in prop::collection::vec((0u8..3, 0u64..1000), 0..60),
            safety_floor in 0usize..20,
            budget in 0usize..60,
        ) {
            let records: Vec<SessionRecord> = states
                .iter()
                .enumerate()
                .map(|(index, (state, age))| {
                    let state = match state {
                        0 => SessionState::Active,
                        1 => SessionState::Idle,
                        _ => SessionState::IdleInTransaction,
                    };
                    record(index as i32 + 1, state, *age)
                })
                .collect();
            let policy = policy(300, safety_floor, budget);

            let plan = plan_reap(&records, None, &policy);

            let idle_total = records
                .iter()
                .filter(|r| r.state == SessionState::Idle)
                .count();

            // The surviving idle count never drops below the floor.
            prop_assert!(plan.candidates.len() <= idle_total.saturating_sub(safety_floor));
            prop_assert!(plan.candidates.len() <= budget);

            // Candidates are stale idle sessions only.
            for pid in &plan.candidates {
                let record = records.iter().find(|r| r.pid == *pid).unwrap();
                prop_assert_eq!(record.state, SessionState::Idle);
                prop_assert!(record.state_age >= policy.max_idle_age);
            }

            // In-transaction sessions are never candidates.
            for record in &records {
                if record.state == SessionState::IdleInTransaction {
                    prop_assert!(!plan.candidates.contains(&record.pid));
                }
            }
        }
    }
}
