//! Lighthouse audit adapter.
//!
//! One call to [`LighthouseAuditor::run_audit`] launches a private Chrome,
//! points the Lighthouse CLI at it, reads the JSON report back from a temp
//! artifact and tears everything down again. The browser and the artifact
//! are both RAII guards, so cleanup also happens when the call is cancelled.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use crate::config::AppConfig;
use crate::models::job::{AnalysisType, DeviceType};
use crate::services::browser::{BrowserOptions, BrowserProcess};

pub const BASIC_CATEGORIES: &[&str] = &["performance"];

pub const DETAILED_CATEGORIES: &[&str] = &["performance", "accessibility", "best-practices", "seo"];

/// Audits whose only output is visual.
pub const VISUAL_AUDITS: &[&str] = &[
    "screenshot-thumbnails",
    "final-screenshot",
    "full-page-screenshot",
    "modern-image-formats",
    "uses-optimized-images",
];

/// Layout-timing audits skipped on basic runs to shorten them.
pub const BASIC_SKIPPED_AUDITS: &[&str] = &[
    "largest-contentful-paint",
    "cumulative-layout-shift",
    "third-party-summary",
    "unsized-images",
];

/// Prefix Lighthouse puts in front of fatal errors on stderr.
const RUNTIME_ERROR_PREFIX: &str = "Runtime error encountered:";

/// Runs one page audit and returns the engine's report.
#[async_trait]
pub trait AuditEngine: Send + Sync {
    async fn run_audit(
        &self,
        url: &str,
        analysis_type: AnalysisType,
        device_type: DeviceType,
    ) -> Result<Value, AuditExecutionError>;
}

/// Lighthouse run configuration derived from a job's options.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditSettings {
    pub categories: Vec<&'static str>,
    pub skip_audits: Vec<&'static str>,
    pub form_factor: DeviceType,
}

impl AuditSettings {
    pub fn new(analysis_type: AnalysisType, device_type: DeviceType) -> Self {
        let (categories, skip_audits) = match analysis_type {
            AnalysisType::Detailed => (DETAILED_CATEGORIES.to_vec(), VISUAL_AUDITS.to_vec()),
            AnalysisType::Basic => (
                BASIC_CATEGORIES.to_vec(),
                [VISUAL_AUDITS, BASIC_SKIPPED_AUDITS].concat(),
            ),
        };

        Self {
            categories,
            skip_audits,
            form_factor: device_type,
        }
    }

    /// Lighthouse CLI arguments for auditing `url` through the browser on `port`.
    pub fn lighthouse_args(&self, url: &str, port: u16, output_path: &Path) -> Vec<String> {
        vec![
            url.to_string(),
            format!("--port={port}"),
            "--output=json".to_string(),
            format!("--output-path={}", output_path.display()),
            format!("--only-categories={}", self.categories.join(",")),
            format!("--skip-audits={}", self.skip_audits.join(",")),
            format!("--form-factor={}", self.form_factor),
            "--throttling-method=simulate".to_string(),
            "--screenEmulation.disabled".to_string(),
            "--disable-storage-reset".to_string(),
            "--quiet".to_string(),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct AuditorOptions {
    pub lighthouse_path: String,
    /// Directory for report artifacts and browser profiles
    pub temp_dir: PathBuf,
    pub browser: BrowserOptions,
}

impl AuditorOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            lighthouse_path: config.lighthouse_path.clone(),
            temp_dir: config.lighthouse_temp_dir.clone(),
            browser: BrowserOptions {
                chrome_path: config.chrome_path.clone(),
                temp_dir: config.lighthouse_temp_dir.clone(),
                optimized: config.lighthouse_optimized,
                startup_timeout: config.chrome_startup_timeout(),
            },
        }
    }
}

/// [`AuditEngine`] backed by the Lighthouse CLI and a local Chrome.
pub struct LighthouseAuditor {
    options: AuditorOptions,
}

impl LighthouseAuditor {
    pub fn new(options: AuditorOptions) -> Self {
        Self { options }
    }

    async fn execute(
        &self,
        url: &str,
        settings: &AuditSettings,
        port: u16,
        output_path: &Path,
    ) -> Result<Value, AuditExecutionError> {
        let output = Command::new(&self.options.lighthouse_path)
            .args(settings.lighthouse_args(url, port, output_path))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                AuditExecutionError::Engine(format!(
                    "failed to run '{}': {}",
                    self.options.lighthouse_path, e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AuditExecutionError::Engine(engine_failure_message(
                &stderr,
                output.status,
            )));
        }

        read_report(output_path).await
    }
}

#[async_trait]
impl AuditEngine for LighthouseAuditor {
    async fn run_audit(
        &self,
        url: &str,
        analysis_type: AnalysisType,
        device_type: DeviceType,
    ) -> Result<Value, AuditExecutionError> {
        tracing::info!(
            url = %url,
            analysis_type = %analysis_type,
            device_type = %device_type,
            "Starting Lighthouse analysis"
        );

        let settings = AuditSettings::new(analysis_type, device_type);
        let mut artifact = TempArtifact::new(&self.options.temp_dir);

        let mut browser = BrowserProcess::launch(&self.options.browser)
            .await
            .map_err(|e| AuditExecutionError::Launch(e.to_string()))?;

        let result = self
            .execute(url, &settings, browser.port(), artifact.path())
            .await;

        artifact.remove().await;
        if let Err(e) = browser.terminate().await {
            tracing::warn!(pid = ?browser.pid(), error = %e, "Failed to terminate Chrome");
        }

        if let Err(e) = &result {
            tracing::error!(url = %url, error = %e, "Lighthouse analysis failed");
        }
        result
    }
}

/// Parse the report Lighthouse wrote to `path` into a JSON object.
async fn read_report(path: &Path) -> Result<Value, AuditExecutionError> {
    let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
        AuditExecutionError::Report(format!("failed to read report {}: {}", path.display(), e))
    })?;

    let report: Value = serde_json::from_str(&raw)
        .map_err(|e| AuditExecutionError::Report(format!("invalid report JSON: {e}")))?;

    if !report.is_object() {
        return Err(AuditExecutionError::Report(
            "report is not a JSON object".to_string(),
        ));
    }
    Ok(report)
}

/// Most specific failure line from Lighthouse's stderr.
fn engine_failure_message(stderr: &str, status: std::process::ExitStatus) -> String {
    let mut lines = stderr.lines().map(str::trim).filter(|l| !l.is_empty());

    if let Some(line) = lines.clone().find(|l| l.contains(RUNTIME_ERROR_PREFIX)) {
        if let Some((_, message)) = line.split_once(RUNTIME_ERROR_PREFIX) {
            return message.trim().to_string();
        }
    }

    match lines.next_back() {
        Some(line) => line.to_string(),
        None => format!("lighthouse exited with {status}"),
    }
}

/// Report artifact path scoped to one audit invocation.
struct TempArtifact {
    path: PathBuf,
    removed: bool,
}

impl TempArtifact {
    fn new(dir: &Path) -> Self {
        let name = format!(
            "lighthouse-{}-{}.json",
            chrono::Utc::now().timestamp_millis(),
            uuid::Uuid::new_v4().simple()
        );
        Self {
            path: dir.join(name),
            removed: false,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    async fn remove(&mut self) {
        self.removed = true;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "Temp report already absent");
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to remove temp report"
                );
            }
        }
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        if !self.removed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Failure of a single audit. Displays as the underlying cause.
#[derive(Debug, thiserror::Error)]
pub enum AuditExecutionError {
    #[error("{0}")]
    Launch(String),

    #[error("{0}")]
    Engine(String),

    #[error("{0}")]
    Report(String),

    #[error("Job timed out after {} seconds", .0.as_secs())]
    TimedOut(Duration),
}

impl AuditExecutionError {
    /// Infrastructure failures worth another attempt on a fresh browser.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AuditExecutionError::Launch(_) | AuditExecutionError::TimedOut(_)
        )
    }
}
