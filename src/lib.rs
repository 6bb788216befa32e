//! # tickprobe
//!
//! Provisioning and data-loading helpers for alerting integration tests
//! against InfluxDB 1.x and Kapacitor.
//!
//! A typical test run:
//!
//! 1. `setup` a throwaway database and wait until InfluxDB lists it
//! 2. `load-task` the Kapacitor task under test
//! 3. `write` fixture data whose timestamps are relative to `now()`
//! 4. read alert counters back with `status`
//! 5. `delete-task`, `delete-topics` and `cleanup`
//!
//! ## Crates
//!
//! - [`tickprobe_types`]: duration literals, the integer expression
//!   evaluator and the `now()` timestamp translator
//! - [`tickprobe_clients`]: async InfluxDB and Kapacitor HTTP clients with
//!   readiness polling
//! - this crate: layered [`Settings`], fixture readers and the subcommands
//!   of the `tickprobe` binary
//!
//! ## As a library
//!
//! ```no_run
//! use tickprobe::{fixture, Settings};
//!
//! # tokio_test::block_on(async {
//! let settings = Settings::load(None)?;
//! let influx = settings.influxdb()?;
//!
//! influx.setup("alerts_test", None, None).await?;
//! let lines = fixture::read_lines("cpu_spike.txt".as_ref())?;
//! influx.write(&lines, "alerts_test", "autogen").await?;
//! influx.cleanup("alerts_test").await?;
//! # Ok::<(), anyhow::Error>(())
//! # });
//! ```

pub mod commands;
pub mod fixture;
pub mod settings;

pub use commands::{Command, Target};
pub use settings::Settings;
pub use tickprobe_clients::{influxdb::InfluxDb, kapacitor::Kapacitor, ClientError};
pub use tickprobe_types::{MatchMode, Nanoseconds, TimestampTranslator};
