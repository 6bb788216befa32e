//! Bounded readiness polling.
//!
//! InfluxDB applies `CREATE DATABASE` and `DROP DATABASE` asynchronously, so
//! setup and cleanup wait for `SHOW DATABASES` to agree before returning.
//! The wait is a fixed number of attempts with a fixed interval between
//! them; it never polls forever.

use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::ClientError;

/// Something that can tell whether a database exists.
#[async_trait]
pub trait DatabaseProbe: Send + Sync {
    /// Check whether `db` is currently listed by the server.
    async fn database_exists(&self, db: &str) -> Result<bool, ClientError>;
}

/// Waits between poll attempts.
///
/// Injected so tests can record the requested intervals instead of sleeping.
#[async_trait]
pub trait Sleeper: Send + Sync + Debug {
    /// Wait for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// What a poll is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expectation {
    /// Wait for the database to exist.
    Present,
    /// Wait for the database to be gone.
    Absent,
}

impl Expectation {
    fn is_met(self, exists: bool) -> bool {
        match self {
            Expectation::Present => exists,
            Expectation::Absent => !exists,
        }
    }
}

/// Progress of a readiness poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    /// About to run check number `attempt` (1-based).
    Polling { attempt: u32 },
    /// The condition held on attempt number `attempts`.
    Resolved { attempts: u32 },
    /// The condition never held within `attempts` checks.
    Exhausted { attempts: u32 },
}

impl PollState {
    /// Whether the poll has finished, one way or the other.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PollState::Polling { .. })
    }
}

/// Attempt budget and spacing for a readiness poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPoll {
    max_attempts: u32,
    interval: Duration,
}

impl Default for ReadinessPoll {
    fn default() -> Self {
        Self {
            max_attempts: Self::DEFAULT_ATTEMPTS,
            interval: Self::DEFAULT_INTERVAL,
        }
    }
}

impl ReadinessPoll {
    /// Checks made before giving up.
    pub const DEFAULT_ATTEMPTS: u32 = 10;

    /// Wait between checks.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

    /// Create a poll with the given budget. At least one attempt is always made.
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval,
        }
    }

    /// Maximum number of checks.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait between checks.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// The state a fresh poll starts in.
    pub fn start(&self) -> PollState {
        PollState::Polling { attempt: 1 }
    }

    /// Move to the next state given the outcome of the current check.
    ///
    /// Terminal states stay where they are.
    pub fn advance(&self, state: PollState, condition_met: bool) -> PollState {
        match state {
            PollState::Polling { attempt } if condition_met => {
                PollState::Resolved { attempts: attempt }
            }
            PollState::Polling { attempt } if attempt >= self.max_attempts => {
                PollState::Exhausted { attempts: attempt }
            }
            PollState::Polling { attempt } => PollState::Polling {
                attempt: attempt + 1,
            },
            terminal => terminal,
        }
    }

    /// Run `check` until it reports true or the budget is spent.
    ///
    /// Sleeps `interval` between checks but not after the last one. An error
    /// from `check` ends the poll immediately. Returns the terminal state.
    pub async fn run<F, Fut>(
        &self,
        sleeper: &dyn Sleeper,
        mut check: F,
    ) -> Result<PollState, ClientError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool, ClientError>>,
    {
        let mut state = self.start();

        while let PollState::Polling { attempt } = state {
            let met = check().await?;
            state = self.advance(state, met);
            debug!(attempt, met, "readiness check");

            if !state.is_terminal() {
                sleeper.sleep(self.interval).await;
            }
        }

        Ok(state)
    }
}

/// Wait until `db` exists.
pub async fn monitor_create<P>(
    probe: &P,
    poll: &ReadinessPoll,
    sleeper: &dyn Sleeper,
    db: &str,
) -> Result<u32, ClientError>
where
    P: DatabaseProbe + ?Sized,
{
    wait_for(probe, poll, sleeper, db, Expectation::Present).await
}

/// Wait until `db` no longer exists.
pub async fn monitor_delete<P>(
    probe: &P,
    poll: &ReadinessPoll,
    sleeper: &dyn Sleeper,
    db: &str,
) -> Result<u32, ClientError>
where
    P: DatabaseProbe + ?Sized,
{
    wait_for(probe, poll, sleeper, db, Expectation::Absent).await
}

/// Poll `probe` until `db` matches `expect`, returning the attempts used.
pub async fn wait_for<P>(
    probe: &P,
    poll: &ReadinessPoll,
    sleeper: &dyn Sleeper,
    db: &str,
    expect: Expectation,
) -> Result<u32, ClientError>
where
    P: DatabaseProbe + ?Sized,
{
    let state = poll
        .run(sleeper, || async move {
            let exists = probe.database_exists(db).await?;
            Ok(expect.is_met(exists))
        })
        .await?;

    match state {
        PollState::Resolved { attempts } => Ok(attempts),
        _ => Err(match expect {
            Expectation::Present => ClientError::DatabaseNotFound(db.to_string()),
            Expectation::Absent => ClientError::DatabaseStillFound(db.to_string()),
        }),
    }
}
