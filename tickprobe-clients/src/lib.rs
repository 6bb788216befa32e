//! # tickprobe-clients
//!
//! Thin async clients for the two services an alerting integration suite
//! talks to.
//!
//! ## Supported Systems
//!
//! - **InfluxDB** (`influxdb` feature) - Creates and drops test databases,
//!   waits for them to appear/disappear, and loads line-protocol fixtures
//!   with `now()` timestamp macros resolved
//! - **Kapacitor** (`kapacitor` feature) - Loads and deletes tasks, clears
//!   alert topics, writes data directly, and sums alert counters from task
//!   status
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tickprobe_clients::influxdb::InfluxDb;
//! use tickprobe_clients::kapacitor::Kapacitor;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let influx = InfluxDb::new("http://localhost:8086")?;
//!     let kapacitor = Kapacitor::new("http://localhost:9092")?;
//!
//!     influx.setup("alerts_test", Some("1h"), Some("autogen")).await?;
//!     // ... load a task, write data, check kapacitor.status(...)
//!     kapacitor.delete_all_topics().await?;
//!     influx.cleanup("alerts_test").await?;
//!     Ok(())
//! }
//! ```

pub mod error;

#[cfg(feature = "influxdb")]
pub mod influxdb;

#[cfg(feature = "kapacitor")]
pub mod kapacitor;

#[cfg(feature = "influxdb")]
pub mod poll;

pub use error::ClientError;

// Re-export types for convenience
pub use tickprobe_types::{MatchMode, Nanoseconds, TimestampTranslator};
