//! Probe results and pool health classification
//!
//! Classifies pool health from the outcome of a bounded round-trip probe.
//! The rules are a pure function so the same observation always yields the
//! same classification, regardless of which worker ran the probe.

use serde::{Serialize, Serializer};
use std::fmt;
use std::time::Duration;

/// Latency below which a successful probe counts as healthy
pub const HEALTHY_LATENCY: Duration = Duration::from_millis(1000);

/// Latency at or above which a degraded probe is flagged severe
pub const SEVERE_LATENCY: Duration = Duration::from_millis(5000);

/// Failure category for an unsuccessful probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeFailure {
    /// Credentials rejected; retrying cannot help
    Auth,
    /// The server refused the session because no slots are free
    ServerFull,
    /// The round trip exceeded its timeout bound
    Timeout,
    /// Any other transport failure
    Connect(String),
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeFailure::Auth => f.write_str("authentication rejected"),
            ProbeFailure::ServerFull => f.write_str("server refused new session"),
            ProbeFailure::Timeout => f.write_str("round trip timed out"),
            ProbeFailure::Connect(reason) => f.write_str(reason),
        }
    }
}

/// Result of one bounded round-trip against the database
#[derive(Debug, Clone, Serialize)]
pub struct ProbeResult {
    /// Wall-clock round trip, measured even when the probe fails
    #[serde(serialize_with = "millis", rename = "latency_ms")]
    pub latency: Duration,
    /// Server version string, when the round trip got far enough to ask
    pub server_version: Option<String>,
    pub error: Option<ProbeFailure>,
}

fn millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

impl ProbeResult {
    pub fn success(latency: Duration, server_version: Option<String>) -> Self {
        ProbeResult {
            latency,
            server_version,
            error: None,
        }
    }

    pub fn failure(latency: Duration, error: ProbeFailure) -> Self {
        ProbeResult {
            latency,
            server_version: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Pool health classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Round trip succeeded with acceptable latency
    Healthy,
    /// Round trip succeeded but latency is elevated
    Degraded {
        /// Latency at or past [`SEVERE_LATENCY`]
        severe: bool,
    },
    /// The server has no spare session slots, or the probe timed out
    /// waiting for one
    Exhausted,
    /// The server could not be reached at all
    Unreachable,
    /// Credentials were rejected; no retry will succeed
    AuthFailure,
}

impl Classification {
    /// Classify a probe outcome. First matching rule wins:
    /// auth rejection, then timeout or a refused session, then any other
    /// connect failure, then latency thresholds.
    pub fn from_probe(probe: &ProbeResult) -> Self {
        match &probe.error {
            Some(ProbeFailure::Auth) => Classification::AuthFailure,
            Some(ProbeFailure::Timeout) | Some(ProbeFailure::ServerFull) => {
                Classification::Exhausted
            }
            Some(ProbeFailure::Connect(_)) => Classification::Unreachable,
            None => {
                if probe.latency < HEALTHY_LATENCY {
                    Classification::Healthy
                } else {
                    Classification::Degraded {
                        severe: probe.latency >= SEVERE_LATENCY,
                    }
                }
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Healthy => "healthy",
            Classification::Degraded { .. } => "degraded",
            Classification::Exhausted => "exhausted",
            Classification::Unreachable => "unreachable",
            Classification::AuthFailure => "auth_failure",
        }
    }

    /// Whether the pool can still serve the application
    pub fn is_usable(&self) -> bool {
        matches!(
            self,
            Classification::Healthy | Classification::Degraded { .. }
        )
    }

    /// Exit code for the operator surface: 0 for a usable pool, 1 for
    /// exhaustion or unreachability, 2 for credential failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Classification::Healthy | Classification::Degraded { .. } => 0,
            Classification::Exhausted | Classification::Unreachable => 1,
            Classification::AuthFailure => 2,
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Degraded { severe: true } => write!(f, "degraded (severe)"),
            other => write!(f, "{}", other.as_str()),
        }
    }
}
