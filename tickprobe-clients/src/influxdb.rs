//! InfluxDB 1.x client for test provisioning.
//!
//! Covers the handful of HTTP API calls an integration suite needs: create a
//! database with a retention policy, load line-protocol fixtures, and drop
//! the database again. `CREATE`/`DROP` are followed by a bounded readiness
//! poll so callers can rely on the database state once the call returns.
//!
//! Fixture lines may carry `now()` timestamp macros; they are translated
//! against a clock snapshot taken when the client is built, so every line in
//! a load agrees on "now".
//!
//! ## Example
//!
//! ```rust,no_run
//! use tickprobe_clients::influxdb::InfluxDb;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let influx = InfluxDb::builder()
//!         .endpoint("http://localhost:8086")
//!         .build()?;
//!
//!     influx.setup("alerts_test", None, None).await?;
//!     influx
//!         .write(&["cpu,host=a usage=97 now()-5m"], "alerts_test", "autogen")
//!         .await?;
//!     influx.cleanup("alerts_test").await?;
//!
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use tickprobe_types::{MatchMode, Nanoseconds, TimestampTranslator};

use crate::poll::{self, DatabaseProbe, ReadinessPoll, Sleeper, TokioSleeper};
use crate::ClientError;

/// Retention policy used when setup is not given one.
pub const DEFAULT_RETENTION_POLICY: &str = "autogen";

/// Retention duration used when setup is not given one.
pub const DEFAULT_DURATION: &str = "1h";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// InfluxDB client for provisioning and loading test data.
#[derive(Debug, Clone)]
pub struct InfluxDb {
    client: Client,
    endpoint: String,
    translator: TimestampTranslator,
    poll: ReadinessPoll,
    sleeper: Arc<dyn Sleeper>,
}

impl InfluxDb {
    /// Create a new builder for configuring the client.
    pub fn builder() -> InfluxDbBuilder {
        InfluxDbBuilder::default()
    }

    /// Create a client for `endpoint` with default settings.
    pub fn new(endpoint: impl Into<String>) -> Result<Self, ClientError> {
        Self::builder().endpoint(endpoint).build()
    }

    /// Base URL of the HTTP API.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The translator applied to written lines.
    pub fn translator(&self) -> &TimestampTranslator {
        &self.translator
    }

    /// Write line-protocol `lines` to `db`/`rp`, one request per line.
    ///
    /// `now()` macros are translated first; a line whose macro cannot be
    /// evaluated is sent as written. The batch stops at the first transport
    /// error. Returns the number of lines sent.
    pub async fn write<S>(&self, lines: &[S], db: &str, rp: &str) -> Result<usize, ClientError>
    where
        S: AsRef<str>,
    {
        let url = format!("{}/write", self.endpoint);

        for line in lines {
            let line = match self.translator.translate(line.as_ref()) {
                Ok(translated) => translated,
                Err(e) => {
                    warn!(error = %e, "timestamp translation failed, sending line as written");
                    e.into_line().into()
                }
            };

            let response = self
                .client
                .post(&url)
                .query(&[("db", db), ("rp", rp)])
                .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
                .body(line.clone().into_owned())
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                warn!(%status, %body, line = %line, "InfluxDB rejected line");
            }

            debug!(db, rp, line = %line, "InfluxDB added line");
        }

        Ok(lines.len())
    }

    /// Run an InfluxQL statement through `/query`.
    ///
    /// Errors reported inside the result set are returned as
    /// [`ClientError::Query`].
    pub async fn query(&self, q: &str) -> Result<QueryResponse, ClientError> {
        debug!(q, "InfluxDB query");

        let response = self
            .client
            .post(format!("{}/query", self.endpoint))
            .form(&[("q", q)])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.to_string(),
                body,
            });
        }

        let parsed: QueryResponse = serde_json::from_str(&body)?;
        if let Some(err) = parsed.first_error() {
            return Err(ClientError::Query(err.to_string()));
        }

        Ok(parsed)
    }

    /// Create `db` with retention policy `rp` and wait for it to appear.
    ///
    /// `duration` defaults to `"1h"` and `rp` to `"autogen"` when missing or
    /// empty.
    pub async fn setup(
        &self,
        db: &str,
        duration: Option<&str>,
        rp: Option<&str>,
    ) -> Result<(), ClientError> {
        let duration = duration.filter(|d| !d.is_empty()).unwrap_or(DEFAULT_DURATION);
        let rp = rp.filter(|r| !r.is_empty()).unwrap_or(DEFAULT_RETENTION_POLICY);
        info!(db, rp, duration, "InfluxDB setup");

        self.query(&create_database_statement(db, duration, rp)).await?;
        self.monitor_create(db).await?;
        Ok(())
    }

    /// Drop `db` and wait for it to disappear.
    pub async fn cleanup(&self, db: &str) -> Result<(), ClientError> {
        self.query(&format!("DROP DATABASE {}", quote_ident(db))).await?;
        self.monitor_delete(db).await?;
        info!(db, "InfluxDB cleanup");
        Ok(())
    }

    /// Poll until `db` exists. Returns the attempts used.
    pub async fn monitor_create(&self, db: &str) -> Result<u32, ClientError> {
        debug!(db, "InfluxDB create monitor");
        poll::monitor_create(self, &self.poll, self.sleeper.as_ref(), db).await
    }

    /// Poll until `db` is gone. Returns the attempts used.
    pub async fn monitor_delete(&self, db: &str) -> Result<u32, ClientError> {
        debug!(db, "InfluxDB delete monitor");
        poll::monitor_delete(self, &self.poll, self.sleeper.as_ref(), db).await
    }
}

#[async_trait]
impl DatabaseProbe for InfluxDb {
    async fn database_exists(&self, db: &str) -> Result<bool, ClientError> {
        debug!(db, "InfluxDB checking database");
        let response = self.query("SHOW DATABASES").await?;
        Ok(response.contains_value(db))
    }
}

/// Builder for InfluxDb.
#[derive(Debug, Default)]
pub struct InfluxDbBuilder {
    endpoint: Option<String>,
    timeout: Option<Duration>,
    now: Option<Nanoseconds>,
    match_mode: Option<MatchMode>,
    poll: Option<ReadinessPoll>,
    sleeper: Option<Arc<dyn Sleeper>>,
}

impl InfluxDbBuilder {
    /// Set the HTTP API endpoint (e.g., "http://localhost:8086"). Required.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the request timeout (default: 10 seconds).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Pin the `now()` snapshot (default: wall clock at build time).
    pub fn now(mut self, now: Nanoseconds) -> Self {
        self.now = Some(now);
        self
    }

    /// Set how `now()` tokens are located (default: whitespace-anchored).
    pub fn match_mode(mut self, mode: MatchMode) -> Self {
        self.match_mode = Some(mode);
        self
    }

    /// Set the readiness poll budget (default: 10 attempts, 1 second apart).
    pub fn poll(mut self, poll: ReadinessPoll) -> Self {
        self.poll = Some(poll);
        self
    }

    /// Replace the sleeper used between poll attempts.
    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = Some(sleeper);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<InfluxDb, ClientError> {
        let endpoint = self
            .endpoint
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| ClientError::Config("InfluxDB endpoint is required".to_string()))?;

        let client = Client::builder()
            .timeout(self.timeout.unwrap_or(Duration::from_secs(10)))
            .build()
            .map_err(|e| ClientError::Config(e.to_string()))?;

        let translator = TimestampTranslator::new(self.now.unwrap_or_else(Nanoseconds::now))
            .with_match_mode(self.match_mode.unwrap_or_default());

        Ok(InfluxDb {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            translator,
            poll: self.poll.unwrap_or_default(),
            sleeper: self.sleeper.unwrap_or_else(|| Arc::new(TokioSleeper)),
        })
    }
}

/// Response body of `/query`.
#[derive(Debug, Default, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub results: Vec<QueryResult>,
}

/// One statement's result.
#[derive(Debug, Default, Deserialize)]
pub struct QueryResult {
    #[serde(default)]
    pub series: Vec<Series>,
    #[serde(default)]
    pub error: Option<String>,
}

/// A result series; `values` holds rows of arbitrary JSON cells.
#[derive(Debug, Default, Deserialize)]
pub struct Series {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub values: Vec<Vec<serde_json::Value>>,
}

impl QueryResponse {
    /// Whether any cell in any series equals the string `needle`.
    pub fn contains_value(&self, needle: &str) -> bool {
        self.results
            .iter()
            .flat_map(|r| &r.series)
            .flat_map(|s| &s.values)
            .flatten()
            .any(|cell| cell.as_str() == Some(needle))
    }

    /// The first statement error, if any.
    pub fn first_error(&self) -> Option<&str> {
        self.results.iter().find_map(|r| r.error.as_deref())
    }
}

fn create_database_statement(db: &str, duration: &str, rp: &str) -> String {
    format!(
        "CREATE DATABASE {} WITH DURATION {} REPLICATION 1 NAME {}",
        quote_ident(db),
        duration,
        quote_ident(rp)
    )
}

// Double-quote an identifier for InfluxQL
fn quote_ident(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}
