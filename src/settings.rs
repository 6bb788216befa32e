//! Layered configuration for the command-line driver.
//!
//! Values come from built-in defaults, then an optional TOML file, then
//! `TICKPROBE_*` environment variables (nested keys use `__`, e.g.
//! `TICKPROBE_INFLUXDB__URL`).
//!
//! ```toml
//! timeout = "10s"
//!
//! [influxdb]
//! url = "http://localhost:8086"
//!
//! [kapacitor]
//! url = "http://localhost:9092"
//!
//! [poll]
//! attempts = 10
//! interval = "1s"
//!
//! [timestamp]
//! match_mode = "whitespace"   # or "anywhere"
//!
//! [setup]
//! duration = "1h"
//! retention_policy = "autogen"
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;

use tickprobe_clients::influxdb::InfluxDb;
use tickprobe_clients::kapacitor::Kapacitor;
use tickprobe_clients::poll::ReadinessPoll;
use tickprobe_types::{parse_duration_literal, MatchMode};

const ENV_PREFIX: &str = "TICKPROBE";

/// Settings for both service clients and the setup defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Per-request HTTP timeout, as a duration literal.
    pub timeout: String,
    pub influxdb: ServiceSettings,
    pub kapacitor: ServiceSettings,
    pub poll: PollSettings,
    pub timestamp: TimestampSettings,
    pub setup: SetupSettings,
}

/// Where a service lives.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceSettings {
    pub url: String,
}

/// Readiness polling budget after create/drop.
#[derive(Debug, Clone, Deserialize)]
pub struct PollSettings {
    pub attempts: u32,
    /// Duration literal between attempts.
    pub interval: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimestampSettings {
    pub match_mode: MatchMode,
}

/// Defaults for `setup` and `write` when flags are omitted.
#[derive(Debug, Clone, Deserialize)]
pub struct SetupSettings {
    pub duration: String,
    pub retention_policy: String,
}

impl Settings {
    /// Load settings, reading `path` if given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = defaults()?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = builder
            .build()
            .context("failed to read configuration")?
            .try_deserialize()
            .context("invalid configuration")?;

        settings.validate()?;
        Ok(settings)
    }

    /// Check the client timing settings.
    ///
    /// `setup.duration` is an InfluxQL duration (`7d`, `52w`, `INF`) and is
    /// left for InfluxDB to judge.
    pub fn validate(&self) -> Result<()> {
        self.request_timeout()?;
        self.poll_interval()?;
        Ok(())
    }

    /// Per-request HTTP timeout.
    pub fn request_timeout(&self) -> Result<Duration> {
        parse_duration_literal(&self.timeout)
            .map(|n| n.to_duration())
            .with_context(|| format!("invalid timeout {:?}", self.timeout))
    }

    /// Wait between readiness checks.
    pub fn poll_interval(&self) -> Result<Duration> {
        parse_duration_literal(&self.poll.interval)
            .map(|n| n.to_duration())
            .with_context(|| format!("invalid poll.interval {:?}", self.poll.interval))
    }

    /// Readiness polling budget.
    pub fn readiness_poll(&self) -> Result<ReadinessPoll> {
        Ok(ReadinessPoll::new(self.poll.attempts, self.poll_interval()?))
    }

    /// Build the InfluxDB client. Its `now()` snapshot is taken here.
    pub fn influxdb(&self) -> Result<InfluxDb> {
        InfluxDb::builder()
            .endpoint(&self.influxdb.url)
            .timeout(self.request_timeout()?)
            .match_mode(self.timestamp.match_mode)
            .poll(self.readiness_poll()?)
            .build()
            .context("failed to build InfluxDB client")
    }

    /// Build the Kapacitor client.
    pub fn kapacitor(&self) -> Result<Kapacitor> {
        Kapacitor::builder()
            .endpoint(&self.kapacitor.url)
            .timeout(self.request_timeout()?)
            .build()
            .context("failed to build Kapacitor client")
    }
}

fn defaults() -> Result<ConfigBuilder<config::builder::DefaultState>> {
    Ok(Config::builder()
        .set_default("timeout", "10s")?
        .set_default("influxdb.url", "http://localhost:8086")?
        .set_default("kapacitor.url", "http://localhost:9092")?
        .set_default("poll.attempts", i64::from(ReadinessPoll::DEFAULT_ATTEMPTS))?
        .set_default("poll.interval", "1s")?
        .set_default("timestamp.match_mode", "whitespace")?
        .set_default("setup.duration", "1h")?
        .set_default("setup.retention_policy", "autogen")?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn toml_file(contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(file, "{}", contents).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::load(None).unwrap();

        assert_eq!(settings.influxdb.url, "http://localhost:8086");
        assert_eq!(settings.kapacitor.url, "http://localhost:9092");
        assert_eq!(settings.request_timeout().unwrap(), Duration::from_secs(10));
        assert_eq!(settings.readiness_poll().unwrap(), ReadinessPoll::default());
        assert_eq!(settings.timestamp.match_mode, MatchMode::Whitespace);
        assert_eq!(settings.setup.duration, "1h");
        assert_eq!(settings.setup.retention_policy, "autogen");
    }

    #[test]
    fn test_file_overrides_defaults() {
        let file = toml_file(
            r#"
            timeout = "30s"

            [influxdb]
            url = "http://influx.test:8086"

            [poll]
            attempts = 3
            interval = "2s"

            [timestamp]
            match_mode = "anywhere"
            "#,
        );

        let settings = Settings::load(Some(file.path())).unwrap();

        assert_eq!(settings.influxdb.url, "http://influx.test:8086");
        assert_eq!(settings.kapacitor.url, "http://localhost:9092");
        assert_eq!(settings.request_timeout().unwrap(), Duration::from_secs(30));
        assert_eq!(
            settings.readiness_poll().unwrap(),
            ReadinessPoll::new(3, Duration::from_secs(2))
        );
        assert_eq!(settings.timestamp.match_mode, MatchMode::Anywhere);
    }

    #[test]
    fn test_invalid_duration_rejected() {
        let file = toml_file(
            r#"
            [poll]
            interval = "500ms"
            "#,
        );

        let err = Settings::load(Some(file.path())).unwrap_err();
        assert!(format!("{:#}", err).contains("poll.interval"));
    }

    #[test]
    fn test_setup_duration_accepts_influxql_units() {
        let file = toml_file(
            r#"
            [setup]
            duration = "7d"
            "#,
        );

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.setup.duration, "7d");
        assert_eq!(settings.setup.retention_policy, "autogen");
    }

    #[test]
    fn test_missing_file_rejected() {
        let result = Settings::load(Some(Path::new("/nonexistent/tickprobe.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_clients_build_from_settings() {
        let settings = Settings::load(None).unwrap();

        let influx = settings.influxdb().unwrap();
        assert_eq!(influx.endpoint(), "http://localhost:8086");
        assert_eq!(influx.translator().match_mode(), MatchMode::Whitespace);

        let kapacitor = settings.kapacitor().unwrap();
        assert_eq!(kapacitor.endpoint(), "http://localhost:9092");
    }
}
