//! # tickprobe-types
//!
//! Pure building blocks for time-series test fixtures: compact duration
//! literals, a checked integer expression evaluator, and the `now()`
//! timestamp macro translator that ties them together. Nothing in this crate
//! performs I/O.
//!
//! ## Features
//!
//! - `serde`: Serialize/Deserialize for [`Nanoseconds`] and [`MatchMode`]
//!
//! ## Example
//!
//! ```rust
//! use tickprobe_types::{Nanoseconds, TimestampTranslator};
//!
//! // Pin "now" so every line in a data load agrees on it
//! let translator = TimestampTranslator::new(Nanoseconds(1_700_000_000_000_000_000));
//!
//! let line = translator.translate("cpu,host=a usage=12 now()-1h30m").unwrap();
//! assert_eq!(line, "cpu,host=a usage=12 1699994600000000000");
//!
//! // Lines without a macro pass through untouched
//! let line = translator.translate("cpu,host=a usage=12 1699994600000000000").unwrap();
//! assert_eq!(line, "cpu,host=a usage=12 1699994600000000000");
//! ```

mod duration;
pub mod expr;
mod timestamp;

pub use duration::*;
pub use expr::{evaluate, ExprError};
pub use timestamp::*;

