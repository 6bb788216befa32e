//! Kapacitor client for alert task tests.
//!
//! Loads task definitions, feeds data straight into Kapacitor's write
//! endpoint, reads back alert counters from task status, and clears tasks and
//! alert topics between test cases.
//!
//! Batch tasks are rewritten before submission so every `every(...)` runs at
//! `every(1s)`; a test should not have to wait out a production schedule.
//!
//! ## Example
//!
//! ```rust,no_run
//! use tickprobe_clients::kapacitor::Kapacitor;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let kapacitor = Kapacitor::new("http://localhost:9092")?;
//!
//!     let task = serde_json::json!({
//!         "id": "cpu_alert",
//!         "type": "stream",
//!         "dbrps": [{ "db": "telegraf", "rp": "autogen" }],
//!         "script": "stream|from().measurement('cpu')|alert().crit(lambda: \"usage\" > 90)",
//!         "status": "enabled"
//!     });
//!     kapacitor.load_task(task.as_object().cloned().unwrap_or_default()).await?;
//!
//!     let counts = kapacitor.status("cpu_alert").await?;
//!     println!("crit alerts: {:?}", counts.get("crits_triggered"));
//!
//!     kapacitor.delete_task("cpu_alert").await?;
//!     kapacitor.delete_all_topics().await?;
//!     Ok(())
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::ClientError;

/// Task API path.
pub const TASKS_PATH: &str = "/kapacitor/v1/tasks";

/// Alert topics API path.
pub const TOPICS_PATH: &str = "/kapacitor/v1/alerts/topics";

/// Line protocol write path.
pub const WRITE_PATH: &str = "/kapacitor/v1/write";

/// Node whose stats carry the alert counters.
const NODE_STATS: &str = "node-stats";

static EVERY_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"every\((.*?)\)").expect("valid regex"));

/// Kapacitor client.
#[derive(Debug, Clone)]
pub struct Kapacitor {
    client: Client,
    endpoint: String,
}

impl Kapacitor {
    /// Create a new builder for configuring the client.
    pub fn builder() -> KapacitorBuilder {
        KapacitorBuilder::default()
    }

    /// Create a client for `endpoint` with default settings.
    pub fn new(endpoint: impl Into<String>) -> Result<Self, ClientError> {
        Self::builder().endpoint(endpoint).build()
    }

    /// Base URL of the HTTP API.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Submit a task definition.
    ///
    /// For `"type": "batch"` tasks the `script` must be a string and has its
    /// `every(...)` schedules replaced with `every(1s)`. Any status other
    /// than 200 is an error carrying the response body.
    pub async fn load_task(&self, mut task: Map<String, Value>) -> Result<(), ClientError> {
        let id = task.get("id").and_then(Value::as_str).unwrap_or("<unnamed>").to_string();
        info!(task = %id, "Kapacitor loading task");

        if task.get("type").and_then(Value::as_str) == Some("batch") {
            let script = task
                .get("script")
                .and_then(Value::as_str)
                .ok_or_else(|| ClientError::InvalidTask("script is not of type string".to_string()))?;
            let script = batch_replace_every(script);
            debug!(task = %id, %script, "batch script after replace");
            task.insert("script".to_string(), Value::String(script));
        }

        let response = self
            .client
            .post(format!("{}{}", self.endpoint, TASKS_PATH))
            .json(&task)
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            let status = response.status().to_string();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status { status, body });
        }

        Ok(())
    }

    /// Delete every alert topic, stopping at the first failure.
    ///
    /// Returns the ids of the deleted topics.
    pub async fn delete_all_topics(&self) -> Result<Vec<String>, ClientError> {
        let response = self
            .client
            .get(format!("{}{}", self.endpoint, TOPICS_PATH))
            .send()
            .await?;

        let body = response.text().await?;
        let topics: TopicList = serde_json::from_str(&body)?;
        debug!(count = topics.topics.len(), "Kapacitor topics");

        let mut deleted = Vec::with_capacity(topics.topics.len());
        for topic in topics.topics {
            self.delete_topic(&topic.id).await?;
            deleted.push(topic.id);
        }
        Ok(deleted)
    }

    /// Delete one alert topic.
    pub async fn delete_topic(&self, topic: &str) -> Result<(), ClientError> {
        let response = self
            .client
            .delete(format!("{}{}/{}", self.endpoint, TOPICS_PATH, urlencoded(topic)))
            .send()
            .await?;

        info!(topic, status = %response.status(), "Kapacitor deleted topic");
        Ok(())
    }

    /// Delete one task.
    pub async fn delete_task(&self, id: &str) -> Result<(), ClientError> {
        let response = self
            .client
            .delete(format!("{}{}/{}", self.endpoint, TASKS_PATH, urlencoded(id)))
            .send()
            .await?;

        info!(task = id, status = %response.status(), "Kapacitor deleted task");
        Ok(())
    }

    /// Write line-protocol `lines` to `db`/`rp`, one request per line.
    ///
    /// Lines are sent as written; `now()` macros are not translated here.
    /// The batch stops at the first transport error. Returns the number of
    /// lines sent.
    pub async fn write<S>(&self, lines: &[S], db: &str, rp: &str) -> Result<usize, ClientError>
    where
        S: AsRef<str>,
    {
        let url = format!("{}{}", self.endpoint, WRITE_PATH);

        for line in lines {
            let line = line.as_ref();
            self.client
                .post(&url)
                .query(&[("db", db), ("rp", rp)])
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(line.to_string())
                .send()
                .await?;
            debug!(db, rp, line, "Kapacitor added data");
        }

        Ok(lines.len())
    }

    /// Alert counters for task `id`, summed across all `alert*` nodes.
    pub async fn status(&self, id: &str) -> Result<BTreeMap<String, i64>, ClientError> {
        debug!(task = id, "Kapacitor fetching status");

        let response = self
            .client
            .get(format!("{}{}/{}", self.endpoint, TASKS_PATH, urlencoded(id)))
            .send()
            .await?;

        let body = response.text().await?;
        let status: TaskStatus = serde_json::from_str(&body)?;
        aggregate_alert_stats(&status)
    }
}

/// Builder for Kapacitor.
#[derive(Debug, Default)]
pub struct KapacitorBuilder {
    endpoint: Option<String>,
    timeout: Option<Duration>,
}

impl KapacitorBuilder {
    /// Set the HTTP API endpoint (e.g., "http://localhost:9092"). Required.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the request timeout (default: 10 seconds).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<Kapacitor, ClientError> {
        let endpoint = self
            .endpoint
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| ClientError::Config("Kapacitor endpoint is required".to_string()))?;

        let client = Client::builder()
            .timeout(self.timeout.unwrap_or(Duration::from_secs(10)))
            .build()
            .map_err(|e| ClientError::Config(e.to_string()))?;

        Ok(Kapacitor {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }
}

/// Replace every `every(...)` in a TICKscript with `every(1s)`.
pub fn batch_replace_every(script: &str) -> String {
    EVERY_CALL.replace_all(script, "every(1s)").into_owned()
}

/// Task body as returned by `GET /kapacitor/v1/tasks/{id}`, reduced to the
/// stats section.
#[derive(Debug, Default, Deserialize)]
pub struct TaskStatus {
    #[serde(default)]
    pub stats: HashMap<String, Map<String, Value>>,
}

/// Sum every numeric field of every `alert*` node, by field name.
///
/// Values are truncated to integers before summing.
pub fn aggregate_alert_stats(status: &TaskStatus) -> Result<BTreeMap<String, i64>, ClientError> {
    let mut totals = BTreeMap::new();
    let mut found = false;

    let Some(nodes) = status.stats.get(NODE_STATS) else {
        return Err(ClientError::MissingAlertStats);
    };

    for (node, stats) in nodes.iter().filter(|(k, _)| k.starts_with("alert")) {
        found = true;

        let fields = stats.as_object().ok_or_else(|| ClientError::InvalidStatValue {
            key: node.clone(),
            value: stats.to_string(),
        })?;

        for (field, value) in fields {
            let n = value.as_f64().ok_or_else(|| ClientError::InvalidStatValue {
                key: format!("{}.{}", node, field),
                value: value.to_string(),
            })?;
            let total = totals.entry(field.clone()).or_insert(0i64);
            *total = total
                .checked_add(n as i64)
                .ok_or_else(|| ClientError::InvalidStatValue {
                    key: format!("{}.{}", node, field),
                    value: format!("{} (sum overflows)", value),
                })?;
        }
    }

    if !found {
        return Err(ClientError::MissingAlertStats);
    }
    Ok(totals)
}

// Escape an id for use as a single URL path segment
fn urlencoded(s: &str) -> String {
    s.replace('%', "%25")
        .replace('/', "%2F")
        .replace('?', "%3F")
        .replace('#', "%23")
        .replace(' ', "%20")
}

/// Response of `GET /kapacitor/v1/alerts/topics`.
#[derive(Debug, Default, Deserialize)]
struct TopicList {
    #[serde(default)]
    topics: Vec<Topic>,
}

#[derive(Debug, Deserialize)]
struct Topic {
    id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, body_string, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn status_from(value: Value) -> TaskStatus {
        serde_json::from_value(value).unwrap()
    }

    fn task(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_builder_requires_endpoint() {
        assert!(matches!(
            Kapacitor::builder().build().unwrap_err(),
            ClientError::Config(_)
        ));
    }

    #[test]
    fn test_builder_trims_trailing_slash() {
        let k = Kapacitor::new("http://kapacitor.local:9092/").unwrap();
        assert_eq!(k.endpoint(), "http://kapacitor.local:9092");
    }

    #[test]
    fn test_batch_replace_every() {
        assert_eq!(batch_replace_every("every(30s)"), "every(1s)");
        assert_eq!(batch_replace_every("no every here"), "no every here");
    }

    #[test]
    fn test_batch_replace_every_is_non_greedy() {
        let script = "batch|query('SELECT mean(usage) FROM cpu').period(5m).every(10m)|window().every(1h)";
        assert_eq!(
            batch_replace_every(script),
            "batch|query('SELECT mean(usage) FROM cpu').period(5m).every(1s)|window().every(1s)"
        );
    }

    #[test]
    fn test_aggregate_sums_alert_nodes() {
        let status = status_from(json!({
            "stats": {
                "node-stats": {
                    "alert1": { "crit": 2.0 },
                    "alert2": { "crit": 3.0 }
                }
            }
        }));

        let totals = aggregate_alert_stats(&status).unwrap();
        assert_eq!(totals, BTreeMap::from([("crit".to_string(), 5)]));
    }

    #[test]
    fn test_aggregate_ignores_other_nodes() {
        let status = status_from(json!({
            "stats": {
                "task-stats": { "throughput": 0.0 },
                "node-stats": {
                    "alert2": { "crits_triggered": 1, "warns_triggered": 4.7 },
                    "stream0": { "emitted": 100 },
                    "from1": { "emitted": "n/a" }
                }
            }
        }));

        let totals = aggregate_alert_stats(&status).unwrap();
        assert_eq!(totals.get("crits_triggered"), Some(&1));
        assert_eq!(totals.get("warns_triggered"), Some(&4));
        assert!(!totals.contains_key("emitted"));
    }

    #[test]
    fn test_aggregate_requires_alert_node() {
        let status = status_from(json!({
            "stats": { "node-stats": { "stream0": { "emitted": 1 } } }
        }));
        assert!(matches!(
            aggregate_alert_stats(&status),
            Err(ClientError::MissingAlertStats)
        ));

        assert!(matches!(
            aggregate_alert_stats(&TaskStatus::default()),
            Err(ClientError::MissingAlertStats)
        ));
    }

    #[test]
    fn test_aggregate_rejects_non_numeric() {
        let status = status_from(json!({
            "stats": { "node-stats": { "alert2": { "crit": "two" } } }
        }));

        match aggregate_alert_stats(&status) {
            Err(ClientError::InvalidStatValue { key, value }) => {
                assert_eq!(key, "alert2.crit");
                assert_eq!(value, "\"two\"");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_aggregate_rejects_overflowing_sum() {
        let status = status_from(json!({
            "stats": {
                "node-stats": {
                    "alert1": { "crit": 9_000_000_000_000_000_000i64 },
                    "alert2": { "crit": 9_000_000_000_000_000_000i64 }
                }
            }
        }));

        match aggregate_alert_stats(&status) {
            Err(ClientError::InvalidStatValue { key, value }) => {
                assert!(key.ends_with(".crit"));
                assert!(value.contains("overflows"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_urlencoded_escapes_path_separators() {
        assert_eq!(urlencoded("cpu_alert"), "cpu_alert");
        assert_eq!(urlencoded("a/b"), "a%2Fb");
        assert_eq!(urlencoded("50%?#x y"), "50%25%3F%23x%20y");
    }

    #[test]
    fn test_aggregate_rejects_non_object_node() {
        let status = status_from(json!({
            "stats": { "node-stats": { "alert2": 7 } }
        }));
        assert!(matches!(
            aggregate_alert_stats(&status),
            Err(ClientError::InvalidStatValue { .. })
        ));
    }

    #[tokio::test]
    async fn test_load_batch_task_rewrites_schedule() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(TASKS_PATH))
            .and(body_json(json!({
                "id": "batch_cpu",
                "type": "batch",
                "script": "batch|query('SELECT * FROM cpu').every(1s)"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "batch_cpu" })))
            .expect(1)
            .mount(&server)
            .await;

        let k = Kapacitor::new(server.uri()).unwrap();
        k.load_task(task(json!({
            "id": "batch_cpu",
            "type": "batch",
            "script": "batch|query('SELECT * FROM cpu').every(5m)"
        })))
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_load_stream_task_untouched() {
        let server = MockServer::start().await;
        let definition = json!({
            "id": "stream_cpu",
            "type": "stream",
            "script": "stream|from().measurement('cpu').every(5m)"
        });

        Mock::given(method("POST"))
            .and(path(TASKS_PATH))
            .and(body_json(definition.clone()))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let k = Kapacitor::new(server.uri()).unwrap();
        k.load_task(task(definition)).await.unwrap();
    }

    #[tokio::test]
    async fn test_load_batch_task_requires_string_script() {
        // Rejected before any request is made
        let k = Kapacitor::new("http://127.0.0.1:1").unwrap();
        let err = k
            .load_task(task(json!({ "id": "t", "type": "batch", "script": 42 })))
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::InvalidTask(_)));
        assert_eq!(err.to_string(), "Task Load: script is not of type string");
    }

    #[tokio::test]
    async fn test_load_task_surfaces_status_and_body() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(TASKS_PATH))
            .respond_with(
                ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid TICKscript"}"#),
            )
            .mount(&server)
            .await;

        let k = Kapacitor::new(server.uri()).unwrap();
        let err = k
            .load_task(task(json!({ "id": "t", "type": "stream", "script": "stream" })))
            .await
            .unwrap_err();

        match err {
            ClientError::Status { status, body } => {
                assert!(status.starts_with("400"));
                assert_eq!(body, r#"{"error":"invalid TICKscript"}"#);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_delete_all_topics() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(TOPICS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "link": { "rel": "self", "href": TOPICS_PATH },
                "topics": [
                    { "id": "main:cpu_alert:alert2", "level": "CRITICAL" },
                    { "id": "main:mem_alert:alert2", "level": "OK" }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        for id in ["main:cpu_alert:alert2", "main:mem_alert:alert2"] {
            Mock::given(method("DELETE"))
                .and(path(format!("{}/{}", TOPICS_PATH, id)))
                .respond_with(ResponseTemplate::new(204))
                .expect(1)
                .mount(&server)
                .await;
        }

        let k = Kapacitor::new(server.uri()).unwrap();
        let deleted = k.delete_all_topics().await.unwrap();
        assert_eq!(deleted, vec!["main:cpu_alert:alert2", "main:mem_alert:alert2"]);
    }

    #[tokio::test]
    async fn test_delete_all_topics_with_none() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(TOPICS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "topics": [] })))
            .mount(&server)
            .await;

        let k = Kapacitor::new(server.uri()).unwrap();
        assert!(k.delete_all_topics().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_all_topics_rejects_bad_json() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(TOPICS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let k = Kapacitor::new(server.uri()).unwrap();
        assert!(matches!(
            k.delete_all_topics().await,
            Err(ClientError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_task() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path(format!("{}/cpu_alert", TASKS_PATH)))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let k = Kapacitor::new(server.uri()).unwrap();
        k.delete_task("cpu_alert").await.unwrap();
    }

    #[tokio::test]
    async fn test_ids_are_escaped_in_paths() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path(format!("{}/a%2Fb", TASKS_PATH)))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("DELETE"))
            .and(path(format!("{}/alerts%2Fcpu", TOPICS_PATH)))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(format!("{}/a%2Fb", TASKS_PATH)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "stats": { "node-stats": { "alert1": { "crits_triggered": 1 } } }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let k = Kapacitor::new(server.uri()).unwrap();
        k.delete_task("a/b").await.unwrap();
        k.delete_topic("alerts/cpu").await.unwrap();
        assert_eq!(k.status("a/b").await.unwrap()["crits_triggered"], 1);
    }

    #[tokio::test]
    async fn test_write_sends_lines_verbatim() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(WRITE_PATH))
            .and(query_param("db", "telegraf"))
            .and(query_param("rp", "autogen"))
            .and(body_string("cpu usage=99 now()"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let k = Kapacitor::new(server.uri()).unwrap();
        let sent = k.write(&["cpu usage=99 now()"], "telegraf", "autogen").await.unwrap();
        assert_eq!(sent, 1);
    }

    #[tokio::test]
    async fn test_status_aggregates_response() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("{}/cpu_alert", TASKS_PATH)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "cpu_alert",
                "type": "stream",
                "executing": true,
                "stats": {
                    "task-stats": { "throughput": 0 },
                    "node-stats": {
                        "alert2": { "crits_triggered": 3, "oks_triggered": 1, "errors": 0 },
                        "alert5": { "crits_triggered": 2, "oks_triggered": 0, "errors": 0 }
                    }
                }
            })))
            .mount(&server)
            .await;

        let k = Kapacitor::new(server.uri()).unwrap();
        let totals = k.status("cpu_alert").await.unwrap();
        assert_eq!(totals["crits_triggered"], 5);
        assert_eq!(totals["oks_triggered"], 1);
        assert_eq!(totals["errors"], 0);
    }
}
