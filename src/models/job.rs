use serde::{Deserialize, Deserializer, Serialize};
use strum::Display;

/// Depth of a Lighthouse run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AnalysisType {
    /// Performance category only, with the expensive layout audits skipped.
    #[default]
    Basic,
    /// Performance, accessibility, best-practices and SEO.
    Detailed,
}

impl From<&str> for AnalysisType {
    fn from(value: &str) -> Self {
        match value {
            "detailed" => AnalysisType::Detailed,
            _ => AnalysisType::Basic,
        }
    }
}

/// Form factor simulated by the audit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DeviceType {
    #[default]
    Desktop,
    Mobile,
}

impl From<&str> for DeviceType {
    fn from(value: &str) -> Self {
        match value {
            "mobile" => DeviceType::Mobile,
            _ => DeviceType::Desktop,
        }
    }
}

/// Lenient option parsing: missing, null or unknown values take the default.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: for<'a> From<&'a str> + Default,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => T::from(s.as_str()),
        _ => T::default(),
    })
}

/// Recognized per-job options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOptions {
    #[serde(default, deserialize_with = "lenient")]
    pub analysis_type: AnalysisType,
    #[serde(default, deserialize_with = "lenient")]
    pub device_type: DeviceType,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

/// An audit request as pushed onto the queue by the producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    #[serde(deserialize_with = "opaque_id")]
    pub id: String,
    pub url: String,
    #[serde(default, deserialize_with = "nullable_options")]
    pub options: JobOptions,
    /// Retries already spent on this job.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub attempt: u32,
    /// Epoch millis before which a re-queued job must not run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_at: Option<i64>,
    /// Producer fields the worker does not interpret (timestamp, priority, ...).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Producer ids are opaque: numbers are accepted and kept in their decimal form.
fn opaque_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "job id must be a string or a number, got {other}"
        ))),
    }
}

fn nullable_options<'de, D>(deserializer: D) -> Result<JobOptions, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<JobOptions>::deserialize(deserializer)?.unwrap_or_default())
}

impl Job {
    pub fn new(id: impl Into<String>, url: impl Into<String>, options: JobOptions) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            options,
            attempt: 0,
            retry_at: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Parse a raw queue payload.
    pub fn parse(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    /// Whether a re-queued job is still inside its backoff window.
    pub fn is_deferred(&self, now_millis: i64) -> bool {
        self.retry_at.is_some_and(|at| at > now_millis)
    }
}

/// Status of an audit job as seen by status readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Transient progress record stored under `<prefix>status:<jobId>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusRecord {
    pub job_id: String,
    pub complete: bool,
    pub status: JobStatus,
    pub error: Option<String>,
    pub timestamp: i64,
}

impl JobStatusRecord {
    pub fn new(job_id: &str, status: JobStatus, error: Option<String>) -> Self {
        Self {
            job_id: job_id.to_string(),
            complete: status.is_terminal(),
            status,
            error,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}
