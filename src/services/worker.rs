//! Job lifecycle controller.
//!
//! Pops one job per tick, records `PROCESSING`, runs the audit under a
//! watchdog, stores the report and the terminal status, then waits out the
//! poll interval. Every job failure is resolved inside [`JobController::poll_once`];
//! only queue errors reach the loop, which logs them and carries on.

use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::time::sleep;

use crate::app_state::AppState;
use crate::config::AppConfig;
use crate::models::job::{Job, JobStatus, JobStatusRecord};
use crate::models::report::AuditReport;
use crate::services::audit::AuditExecutionError;
use crate::services::queue::QueueError;
use crate::services::store::{result_key, set_json, status_key};

/// Longest payload excerpt logged for a malformed job.
const MAX_LOGGED_PAYLOAD: usize = 512;

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub results_prefix: String,
    pub poll_interval: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub job_timeout: Duration,
    pub status_ttl_secs: u64,
    pub result_ttl_secs: u64,
}

impl WorkerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            results_prefix: config.lighthouse_results_prefix.clone(),
            poll_interval: config.poll_interval(),
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff(),
            job_timeout: config.job_timeout(),
            status_ttl_secs: config.status_ttl_secs,
            result_ttl_secs: config.result_ttl_secs,
        }
    }

    /// Backoff before retry number `attempt + 1`: `retry_backoff * 2^attempt`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.retry_backoff
            .saturating_mul(2u32.saturating_pow(attempt.min(16)))
    }
}

/// What a single poll cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Queue was empty.
    Idle,
    /// Payload could not be parsed and was discarded.
    Dropped,
    /// Job is still backing off and went back to the tail of the queue.
    Deferred { job_id: String },
    Completed { job_id: String },
    Failed { job_id: String, error: String },
    /// Job was re-queued after a retryable failure.
    Retried { job_id: String, attempt: u32 },
}

pub struct JobController {
    state: AppState,
    settings: WorkerSettings,
}

impl JobController {
    pub fn new(state: AppState, settings: WorkerSettings) -> Self {
        Self { state, settings }
    }

    pub fn settings(&self) -> &WorkerSettings {
        &self.settings
    }

    /// Poll the queue until `shutdown` flips to `true` or its sender is dropped.
    ///
    /// An in-flight job is abandoned on shutdown; its status record keeps
    /// saying `PROCESSING` until it expires.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            poll_interval_ms = self.settings.poll_interval.as_millis() as u64,
            max_retries = self.settings.max_retries,
            job_timeout_secs = self.settings.job_timeout.as_secs(),
            "Worker ready, starting job processing loop"
        );

        loop {
            tokio::select! {
                _ = shutdown_requested(&mut shutdown) => break,
                outcome = self.poll_once() => match outcome {
                    Ok(PollOutcome::Idle) => tracing::trace!("No jobs available"),
                    Ok(outcome) => tracing::debug!(?outcome, "Poll cycle finished"),
                    Err(e) => tracing::error!(error = %e, "Error in job processing loop"),
                },
            }

            tokio::select! {
                _ = shutdown_requested(&mut shutdown) => break,
                _ = sleep(self.settings.poll_interval) => {}
            }
        }

        tracing::info!("Worker loop stopped");
    }

    /// Pop at most one job and drive it to an outcome.
    pub async fn poll_once(&self) -> Result<PollOutcome, QueueError> {
        let Some(payload) = self.state.queue.pop().await? else {
            return Ok(PollOutcome::Idle);
        };

        let job = match Job::parse(&payload) {
            Ok(job) => job,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    payload = %excerpt(&payload),
                    "Dropping malformed job payload"
                );
                metrics::counter!("lighthouse_jobs_dropped").increment(1);
                return Ok(PollOutcome::Dropped);
            }
        };

        if job.is_deferred(now_millis()) {
            tracing::debug!(job_id = %job.id, retry_at = ?job.retry_at, "Job still backing off");
            if let Err(e) = self.state.queue.push(&job).await {
                tracing::error!(job_id = %job.id, error = %e, "Failed to re-queue deferred job");
                return Err(e);
            }
            return Ok(PollOutcome::Deferred { job_id: job.id });
        }

        Ok(self.process(job).await)
    }

    async fn process(&self, job: Job) -> PollOutcome {
        let analysis_type = job.options.analysis_type;
        let device_type = job.options.device_type;

        tracing::info!(
            job_id = %job.id,
            url = %job.url,
            attempt = job.attempt,
            "Processing job"
        );
        metrics::counter!("lighthouse_jobs_total").increment(1);

        self.update_status(&job.id, JobStatus::Processing, None).await;

        let start = Instant::now();
        let audit = tokio::time::timeout(
            self.settings.job_timeout,
            self.state
                .engine
                .run_audit(&job.url, analysis_type, device_type),
        )
        .await
        .unwrap_or(Err(AuditExecutionError::TimedOut(self.settings.job_timeout)));
        let duration = start.elapsed();
        metrics::histogram!("lighthouse_audit_duration_seconds").record(duration.as_secs_f64());

        let report = match audit {
            Ok(report) => report,
            Err(e) if e.is_retryable() && job.attempt < self.settings.max_retries => {
                return self.retry(job, e).await;
            }
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "Error processing job");
                return self.fail(&job.id, e.to_string()).await;
            }
        };

        tracing::info!(
            job_id = %job.id,
            duration_ms = duration.as_millis() as u64,
            device_type = %device_type,
            "Analysis completed"
        );

        let report = AuditReport::new(report, &job.url, analysis_type, device_type);
        let key = result_key(&self.settings.results_prefix, &job.id);
        if let Err(e) = set_json(
            self.state.store.as_ref(),
            &key,
            &report,
            self.settings.result_ttl_secs,
        )
        .await
        {
            tracing::error!(job_id = %job.id, error = %e, "Failed to store audit report");
            return self.fail(&job.id, e.to_string()).await;
        }

        self.update_status(&job.id, JobStatus::Completed, None).await;
        metrics::counter!("lighthouse_jobs_completed").increment(1);
        tracing::info!(job_id = %job.id, "Job completed successfully");

        PollOutcome::Completed { job_id: job.id }
    }

    async fn fail(&self, job_id: &str, error: String) -> PollOutcome {
        self.update_status(job_id, JobStatus::Failed, Some(error.clone()))
            .await;
        metrics::counter!("lighthouse_jobs_failed").increment(1);
        PollOutcome::Failed {
            job_id: job_id.to_string(),
            error,
        }
    }

    /// Put the job back on the queue with its backoff deadline.
    async fn retry(&self, mut job: Job, error: AuditExecutionError) -> PollOutcome {
        let delay = self.settings.backoff_for(job.attempt);
        job.attempt += 1;
        job.retry_at = Some(now_millis() + delay.as_millis() as i64);

        if let Err(e) = self.state.queue.push(&job).await {
            tracing::error!(job_id = %job.id, error = %e, "Failed to re-queue job");
            return self.fail(&job.id, error.to_string()).await;
        }

        self.update_status(&job.id, JobStatus::Pending, Some(error.to_string()))
            .await;
        metrics::counter!("lighthouse_jobs_retried").increment(1);
        tracing::warn!(
            job_id = %job.id,
            attempt = job.attempt,
            max_retries = self.settings.max_retries,
            backoff_ms = delay.as_millis() as u64,
            error = %error,
            "Job re-queued for retry"
        );

        PollOutcome::Retried {
            job_id: job.id,
            attempt: job.attempt,
        }
    }

    /// Write the status record. Returns whether the write succeeded.
    pub async fn update_status(&self, job_id: &str, status: JobStatus, error: Option<String>) -> bool {
        let record = JobStatusRecord::new(job_id, status, error);
        let key = status_key(&self.settings.results_prefix, job_id);

        match set_json(
            self.state.store.as_ref(),
            &key,
            &record,
            self.settings.status_ttl_secs,
        )
        .await
        {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(job_id = %job_id, status = %status, error = %e, "Failed to update job status");
                false
            }
        }
    }
}

/// Resolves once shutdown is signalled or the sender goes away.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn excerpt(payload: &str) -> &str {
    match payload.char_indices().nth(MAX_LOGGED_PAYLOAD) {
        Some((idx, _)) => &payload[..idx],
        None => payload,
    }
}
