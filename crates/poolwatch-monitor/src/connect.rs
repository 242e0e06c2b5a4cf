//! Short-lived connections and driver error classification
//!
//! Every monitor operation borrows a connection from here for its own
//! scope and drops it on the way out; nothing holds a connection across
//! operations. Driver errors are classified by SQLSTATE where the server
//! provides one. Message text is consulted only for the pgbouncer
//! session-limit rejection, which carries no structured code.

use crate::config::ConnectionConfig;
use poolwatch_core::MonitorError;
use std::future::Future;
use std::time::Duration;
use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, NoTls};

/// Open a connection scoped to one operation.
///
/// The connection driver runs on its own task and winds down when the
/// returned client is dropped, so abandoning an operation cannot leak a
/// session past the configured timeout.
pub(crate) async fn connect(config: &ConnectionConfig) -> Result<Client, MonitorError> {
    let pg_config = config.build_pg_config();

    let (client, connection) = tokio::time::timeout(config.connect_timeout, pg_config.connect(NoTls))
        .await
        .map_err(|_| MonitorError::Timeout {
            operation: "connect",
            timeout: config.connect_timeout,
        })?
        .map_err(|err| classify_pg_error(&err, &config.user))?;

    tokio::spawn(async move {
        if let Err(err) = connection.await {
            tracing::debug!(error = %err, "connection driver terminated");
        }
    });

    tracing::debug!(host = %config.host, port = config.port, "connection established");
    Ok(client)
}

/// Run one driver future under the statement timeout bound
pub(crate) async fn with_timeout<T, F>(
    operation: &'static str,
    timeout: Duration,
    user: &str,
    fut: F,
) -> Result<T, MonitorError>
where
    F: Future<Output = Result<T, tokio_postgres::Error>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(classify_pg_error(&err, user)),
        Err(_) => Err(MonitorError::Timeout { operation, timeout }),
    }
}

/// Classify a driver error into the monitor taxonomy
pub(crate) fn classify_pg_error(err: &tokio_postgres::Error, user: &str) -> MonitorError {
    classify_code(err.code(), &err.to_string(), user)
}

fn classify_code(code: Option<&SqlState>, message: &str, user: &str) -> MonitorError {
    match code {
        Some(state)
            if *state == SqlState::INVALID_PASSWORD
                || *state == SqlState::INVALID_AUTHORIZATION_SPECIFICATION =>
        {
            MonitorError::Auth {
                user: user.to_string(),
            }
        }
        Some(state)
            if *state == SqlState::TOO_MANY_CONNECTIONS
                || *state == SqlState::CANNOT_CONNECT_NOW =>
        {
            MonitorError::ServerFull {
                reason: message.to_string(),
            }
        }
        Some(state) if *state == SqlState::INSUFFICIENT_PRIVILEGE => MonitorError::Registry {
            reason: message.to_string(),
        },
        // Pooled deployments reject over-limit sessions with a bare message
        // and no SQLSTATE.
        _ if message.contains("MaxClientsInSessionMode") => MonitorError::ServerFull {
            reason: message.to_string(),
        },
        _ => MonitorError::Connect {
            reason: message.to_string(),
        },
    }
}
