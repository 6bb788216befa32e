//! `now()` timestamp macros in data lines.
//!
//! Fixture data is written with relative timestamps so it stays inside the
//! retention window no matter when the suite runs:
//!
//! ```text
//! cpu,host=a usage=12 now()-1h30m
//! cpu,host=a usage=15 now()-(1h-5m)
//! ```
//!
//! [`TimestampTranslator`] turns the `now()` segment into an absolute
//! nanosecond timestamp: duration literals are replaced by their nanosecond
//! values, `now()` by the translator's clock snapshot, and the result is
//! evaluated as integer arithmetic.
//!
//! The clock snapshot is taken once per translator. Every line translated by
//! the same instance sees the same "now", which keeps relative offsets within
//! one data load consistent with each other; build a new translator to pick
//! up wall-clock time again.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use thiserror::Error;

use crate::duration::{parse_duration_literal, Nanoseconds};
use crate::expr::{evaluate, ExprError};

/// `now()` preceded by whitespace, with the text on either side captured.
/// Greedy, so the last qualifying token in the line wins.
static WHITESPACE_NOW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(.*)\s+(?i:now\(\))(.*)").expect("valid regex"));

/// `now()` anywhere in the line.
static ANYWHERE_NOW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)now\(\)").expect("valid regex"));

/// Duration literals: h/m/s only, case-sensitive.
static DURATION_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9]+[smh])+").expect("valid regex"));

/// How the `now()` token is located in a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum MatchMode {
    /// The token must follow whitespace, so `field=1now()` is left alone.
    /// The output keeps everything before that whitespace, then one space,
    /// then the timestamp.
    #[default]
    Whitespace,

    /// The first token anywhere in the line. The timestamp replaces the
    /// token and the rest of the line at the token's exact offset.
    Anywhere,
}

/// A line whose `now()` expression could not be evaluated.
///
/// Holds on to the untranslated line so the caller can decide whether to use
/// it as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot evaluate timestamp expression {expression:?} in line {line:?}: {source}")]
pub struct TranslateError {
    line: String,
    expression: String,
    #[source]
    source: ExprError,
}

impl TranslateError {
    /// The original, untranslated line.
    pub fn line(&self) -> &str {
        &self.line
    }

    /// The expression that failed, after duration substitution.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// The underlying evaluation error.
    pub fn expr_error(&self) -> &ExprError {
        &self.source
    }

    /// Take back the original line.
    pub fn into_line(self) -> String {
        self.line
    }
}

/// Rewrites `now()` expressions into absolute nanosecond timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampTranslator {
    now: Nanoseconds,
    mode: MatchMode,
}

impl TimestampTranslator {
    /// Create a translator pinned to `now`, using whitespace matching.
    pub fn new(now: Nanoseconds) -> Self {
        Self {
            now,
            mode: MatchMode::default(),
        }
    }

    /// Create a translator pinned to the current wall-clock time.
    pub fn at_current_time() -> Self {
        Self::new(Nanoseconds::now())
    }

    /// Use a different token matching discipline.
    pub fn with_match_mode(mut self, mode: MatchMode) -> Self {
        self.mode = mode;
        self
    }

    /// The clock snapshot every translation uses.
    pub fn now(&self) -> Nanoseconds {
        self.now
    }

    /// The token matching discipline.
    pub fn match_mode(&self) -> MatchMode {
        self.mode
    }

    /// Translate one line.
    ///
    /// Lines without a `now()` token come back borrowed and unchanged.
    pub fn translate<'a>(&self, line: &'a str) -> Result<Cow<'a, str>, TranslateError> {
        let (prefix, suffix, separator) = match self.mode {
            MatchMode::Whitespace => {
                let Some(caps) = WHITESPACE_NOW.captures(line) else {
                    return Ok(Cow::Borrowed(line));
                };
                let prefix = caps.get(1).map_or("", |m| m.as_str());
                let suffix = caps.get(2).map_or("", |m| m.as_str());
                (prefix, suffix, " ")
            }
            MatchMode::Anywhere => {
                let Some(token) = ANYWHERE_NOW.find(line) else {
                    return Ok(Cow::Borrowed(line));
                };
                (&line[..token.start()], &line[token.end()..], "")
            }
        };

        let expression = normalize_durations(&format!("{}{}", self.now, suffix));

        match evaluate(&expression) {
            Ok(timestamp) => Ok(Cow::Owned(format!("{}{}{}", prefix, separator, timestamp))),
            Err(source) => Err(TranslateError {
                line: line.to_string(),
                expression,
                source,
            }),
        }
    }

    /// Translate one line, falling back to the original on failure.
    pub fn translate_or_original<'a>(&self, line: &'a str) -> Cow<'a, str> {
        self.translate(line).unwrap_or(Cow::Borrowed(line))
    }
}

impl Default for TimestampTranslator {
    fn default() -> Self {
        Self::at_current_time()
    }
}

/// Replace every duration literal in `s` with its nanosecond count.
///
/// Literals that cannot be represented are left as written; evaluation will
/// then reject the expression.
pub fn normalize_durations(s: &str) -> String {
    DURATION_LITERAL
        .replace_all(s, |caps: &Captures| {
            let literal = &caps[0];
            match parse_duration_literal(literal) {
                Ok(n) => n.to_string(),
                Err(_) => literal.to_string(),
            }
        })
        .into_owned()
}
