use serde::Serialize;
use serde_json::{Map, Value};

use super::job::{AnalysisType, DeviceType};

/// Lighthouse report augmented with the request that produced it.
///
/// Serializes as the raw report object with `analysisType`, `deviceType`,
/// `url` and `timestamp` merged in at the top level.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    #[serde(flatten)]
    pub report: Map<String, Value>,
    pub analysis_type: AnalysisType,
    pub device_type: DeviceType,
    pub url: String,
    pub timestamp: i64,
}

impl AuditReport {
    pub fn new(
        report: Value,
        url: &str,
        analysis_type: AnalysisType,
        device_type: DeviceType,
    ) -> Self {
        let mut report = match report {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("report".to_string(), other);
                map
            }
        };
        // Augmented keys win over same-named report keys.
        for key in ["analysisType", "deviceType", "url", "timestamp"] {
            report.remove(key);
        }

        Self {
            report,
            analysis_type,
            device_type,
            url: url.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}
