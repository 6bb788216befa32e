//! Fixture files: line-protocol data and task definitions.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};

/// Read data lines from `path`.
///
/// Blank lines and lines starting with `#` are skipped; everything else is
/// kept verbatim (minus the line terminator), `now()` macros included.
pub fn read_lines(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read data file {}", path.display()))?;
    Ok(parse_lines(&content))
}

/// Split fixture text into data lines.
pub fn parse_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .filter(|line| {
            let trimmed = line.trim();
            !trimmed.is_empty() && !trimmed.starts_with('#')
        })
        .map(str::to_string)
        .collect()
}

/// Read a task definition (a JSON object) from `path`.
pub fn read_task(path: &Path) -> Result<Map<String, Value>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read task file {}", path.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("task file {} is not valid JSON", path.display()))?;

    match value {
        Value::Object(task) => Ok(task),
        other => bail!(
            "task file {} must contain a JSON object, found {}",
            path.display(),
            json_kind(&other)
        ),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
