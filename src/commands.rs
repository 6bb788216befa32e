//! Subcommands of the `tickprobe` binary.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Subcommand, ValueEnum};
use tracing::{info, warn};

use tickprobe_types::TimestampTranslator;

use crate::fixture;
use crate::settings::Settings;

/// Where `write` sends data lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Target {
    /// InfluxDB `/write`.
    Influxdb,
    /// Kapacitor `/kapacitor/v1/write`.
    Kapacitor,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create a database with a retention policy and wait until it is listed
    Setup {
        /// Database name
        db: String,

        /// InfluxQL retention duration (e.g. "1h", "7d", "INF")
        #[arg(long)]
        duration: Option<String>,

        /// Retention policy name
        #[arg(long)]
        rp: Option<String>,
    },

    /// Drop a database and wait until it is gone
    Cleanup {
        /// Database name
        db: String,
    },

    /// Translate `now()` macros in a data file and write the lines
    Write {
        /// Line-protocol file; blank lines and `#` comments are skipped
        file: PathBuf,

        /// Target database
        #[arg(long)]
        db: String,

        /// Target retention policy
        #[arg(long)]
        rp: Option<String>,

        /// Service that receives the lines
        #[arg(long, value_enum, default_value_t = Target::Influxdb)]
        target: Target,
    },

    /// Print the lines of a data file with `now()` macros resolved
    Translate {
        /// Line-protocol file
        file: PathBuf,
    },

    /// Create a Kapacitor task from a JSON definition
    LoadTask {
        /// JSON task definition
        file: PathBuf,
    },

    /// Delete a Kapacitor task
    DeleteTask {
        /// Task ID
        id: String,
    },

    /// Delete every Kapacitor alert topic
    DeleteTopics,

    /// Print the alert counters of a Kapacitor task as JSON
    Status {
        /// Task ID
        id: String,
    },
}

/// Translate every line against one clock snapshot.
///
/// Lines whose macro cannot be evaluated are kept as written.
pub fn translate_lines(translator: &TimestampTranslator, lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .map(|line| match translator.translate(line) {
            Ok(translated) => translated.into_owned(),
            Err(e) => {
                warn!(error = %e, "timestamp translation failed, keeping line as written");
                e.into_line()
            }
        })
        .collect()
}

/// Run `command` against the services named in `settings`.
pub async fn run(command: Command, settings: &Settings) -> Result<()> {
    match command {
        Command::Setup { db, duration, rp } => {
            // InfluxQL duration (`7d`, `INF`, ...); InfluxDB reports bad ones
            let duration = duration.unwrap_or_else(|| settings.setup.duration.clone());
            let rp = rp.unwrap_or_else(|| settings.setup.retention_policy.clone());

            let influx = settings.influxdb()?;
            influx.setup(&db, Some(&duration), Some(&rp)).await?;
            println!("created database {} (rp {}, duration {})", db, rp, duration);
        }

        Command::Cleanup { db } => {
            let influx = settings.influxdb()?;
            influx.cleanup(&db).await?;
            println!("dropped database {}", db);
        }

        Command::Write {
            file,
            db,
            rp,
            target,
        } => {
            let lines = fixture::read_lines(&file)?;
            let rp = rp.unwrap_or_else(|| settings.setup.retention_policy.clone());

            let written = match target {
                Target::Influxdb => settings.influxdb()?.write(&lines, &db, &rp).await?,
                Target::Kapacitor => {
                    let translator = TimestampTranslator::at_current_time()
                        .with_match_mode(settings.timestamp.match_mode);
                    let lines = translate_lines(&translator, &lines);
                    settings.kapacitor()?.write(&lines, &db, &rp).await?
                }
            };

            info!(file = %file.display(), written, ?target, "write complete");
            println!("wrote {} lines to {}.{}", written, db, rp);
        }

        Command::Translate { file } => {
            let lines = fixture::read_lines(&file)?;
            let translator = TimestampTranslator::at_current_time()
                .with_match_mode(settings.timestamp.match_mode);
            for line in translate_lines(&translator, &lines) {
                println!("{}", line);
            }
        }

        Command::LoadTask { file } => {
            let task = fixture::read_task(&file)?;
            let id = task
                .get("id")
                .and_then(|id| id.as_str())
                .unwrap_or("<unnamed>")
                .to_string();
            settings.kapacitor()?.load_task(task).await?;
            println!("loaded task {}", id);
        }

        Command::DeleteTask { id } => {
            settings.kapacitor()?.delete_task(&id).await?;
            println!("deleted task {}", id);
        }

        Command::DeleteTopics => {
            let topics = settings.kapacitor()?.delete_all_topics().await?;
            println!("deleted {} topics", topics.len());
        }

        Command::Status { id } => {
            let counts = settings.kapacitor()?.status(&id).await?;
            println!("{}", serde_json::to_string_pretty(&counts)?);
        }
    }

    Ok(())
}
