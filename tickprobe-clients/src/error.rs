//! Error types for the service clients.

use thiserror::Error;

/// Errors that can occur when talking to InfluxDB or Kapacitor.
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// Connection failed.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Timeout waiting for response.
    #[error("Request timed out")]
    Timeout,

    /// The client was built with missing or invalid settings.
    #[error("Invalid client configuration: {0}")]
    Config(String),

    /// The service answered with an unexpected status.
    #[error("{status}:: {body}")]
    Status {
        /// HTTP status line, e.g. `400 Bad Request`.
        status: String,
        /// Response body as returned by the service.
        body: String,
    },

    /// InfluxDB reported an error for a statement.
    #[error("Query failed: {0}")]
    Query(String),

    /// A task definition could not be submitted as given.
    #[error("Task Load: {0}")]
    InvalidTask(String),

    /// The database did not appear within the polling budget.
    #[error("Database not found: {0}")]
    DatabaseNotFound(String),

    /// The database did not go away within the polling budget.
    #[error("Database still found: {0}")]
    DatabaseStillFound(String),

    /// Task status carried no `alert*` node stats.
    #[error("kapacitor.status: expected alert.* key to be found on stats")]
    MissingAlertStats,

    /// An alert stat was not a number.
    #[error("kapacitor.status: wrong response from service: {key} = {value}")]
    InvalidStatValue {
        /// Stat name, qualified by the node it came from.
        key: String,
        /// The offending JSON value.
        value: String,
    },
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Parse(err.to_string())
    }
}

#[cfg(any(feature = "influxdb", feature = "kapacitor"))]
impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout
        } else if err.is_connect() {
            ClientError::Connection(err.to_string())
        } else if err.is_decode() {
            ClientError::Parse(err.to_string())
        } else {
            ClientError::Http(err.to_string())
        }
    }
}
