//! In-memory stand-ins for the queue, the result store and the audit engine.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lighthouse_worker::app_state::AppState;
use lighthouse_worker::models::job::{AnalysisType, DeviceType, Job};
use lighthouse_worker::services::audit::{AuditEngine, AuditExecutionError};
use lighthouse_worker::services::queue::{JobQueue, QueueError};
use lighthouse_worker::services::store::{ResultStore, StoreError};
use lighthouse_worker::services::worker::{JobController, WorkerSettings};
use serde_json::Value;

pub const PREFIX: &str = "lighthouse-results:";

/// FIFO of raw payloads, recording when each pop happened.
#[derive(Default)]
pub struct MemoryQueue {
    items: Mutex<VecDeque<String>>,
    pops: Mutex<Vec<tokio::time::Instant>>,
    failing_pops: AtomicUsize,
    failing_pushes: AtomicBool,
}

fn connection_refused() -> redis::RedisError {
    redis::RedisError::from((redis::ErrorKind::IoError, "connection refused"))
}

impl MemoryQueue {
    pub fn with_payloads(payloads: &[&str]) -> Self {
        let queue = Self::default();
        queue
            .items
            .lock()
            .unwrap()
            .extend(payloads.iter().map(|p| p.to_string()));
        queue
    }

    pub fn payloads(&self) -> Vec<String> {
        self.items.lock().unwrap().iter().cloned().collect()
    }

    pub fn pop_times(&self) -> Vec<tokio::time::Instant> {
        self.pops.lock().unwrap().clone()
    }

    /// Make the next `n` pops fail as if Redis were unreachable.
    pub fn fail_next_pops(&self, n: usize) {
        self.failing_pops.store(n, Ordering::SeqCst);
    }

    pub fn fail_pushes(&self) {
        self.failing_pushes.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn pop(&self) -> Result<Option<String>, QueueError> {
        self.pops.lock().unwrap().push(tokio::time::Instant::now());
        let failing = self
            .failing_pops
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(QueueError::Redis(connection_refused()));
        }
        Ok(self.items.lock().unwrap().pop_front())
    }

    async fn push(&self, job: &Job) -> Result<(), QueueError> {
        if self.failing_pushes.load(Ordering::SeqCst) {
            return Err(QueueError::Redis(connection_refused()));
        }
        let payload = serde_json::to_string(job)?;
        self.items.lock().unwrap().push_back(payload);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Write {
    pub key: String,
    pub value: Value,
    pub ttl_secs: u64,
}

/// Records every `set` in order. Keys matching `fail_on` are rejected.
#[derive(Default)]
pub struct MemoryStore {
    writes: Mutex<Vec<Write>>,
    fail_on: Option<fn(&str) -> bool>,
}

impl MemoryStore {
    pub fn failing(fail_on: fn(&str) -> bool) -> Self {
        Self {
            writes: Mutex::default(),
            fail_on: Some(fail_on),
        }
    }

    pub fn writes(&self) -> Vec<Write> {
        self.writes.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<Value> {
        self.writes()
            .into_iter()
            .filter(|w| w.key.contains("status:"))
            .map(|w| w.value)
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.writes()
            .into_iter()
            .rev()
            .find(|w| w.key == key)
            .map(|w| w.value)
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn set(&self, key: &str, value: String, ttl_secs: u64) -> Result<(), StoreError> {
        if self.fail_on.is_some_and(|fail| fail(key)) {
            return Err(StoreError::Redis(connection_refused()));
        }
        self.writes.lock().unwrap().push(Write {
            key: key.to_string(),
            value: serde_json::from_str(&value)?,
            ttl_secs,
        });
        Ok(())
    }
}

/// What the fake engine does when invoked.
pub enum Behavior {
    Report(Value),
    Engine(&'static str),
    Launch(&'static str),
    /// Never finishes; flips the flag when the audit future is dropped.
    Hang(Arc<AtomicBool>),
}

#[derive(Debug, Clone)]
pub struct Call {
    pub url: String,
    pub analysis_type: AnalysisType,
    pub device_type: DeviceType,
    /// Status records present in the store when the audit started.
    pub statuses_seen: Vec<Value>,
}

pub struct FakeEngine {
    behavior: Behavior,
    store: Arc<MemoryStore>,
    calls: Mutex<Vec<Call>>,
    invocations: AtomicUsize,
}

impl FakeEngine {
    pub fn new(behavior: Behavior, store: Arc<MemoryStore>) -> Self {
        Self {
            behavior,
            store,
            calls: Mutex::default(),
            invocations: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

struct SetOnDrop(Arc<AtomicBool>);

impl Drop for SetOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl AuditEngine for FakeEngine {
    async fn run_audit(
        &self,
        url: &str,
        analysis_type: AnalysisType,
        device_type: DeviceType,
    ) -> Result<Value, AuditExecutionError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(Call {
            url: url.to_string(),
            analysis_type,
            device_type,
            statuses_seen: self.store.statuses(),
        });

        match &self.behavior {
            Behavior::Report(report) => Ok(report.clone()),
            Behavior::Engine(msg) => Err(AuditExecutionError::Engine(msg.to_string())),
            Behavior::Launch(msg) => Err(AuditExecutionError::Launch(msg.to_string())),
            Behavior::Hang(dropped) => {
                let _guard = SetOnDrop(dropped.clone());
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}

pub fn settings() -> WorkerSettings {
    WorkerSettings {
        results_prefix: PREFIX.to_string(),
        poll_interval: Duration::from_millis(5000),
        max_retries: 3,
        retry_backoff: Duration::from_millis(2000),
        job_timeout: Duration::from_secs(300),
        status_ttl_secs: 1800,
        result_ttl_secs: 86400,
    }
}

/// Controller wired to in-memory collaborators, with handles to inspect them.
pub struct Harness {
    pub controller: JobController,
    pub queue: Arc<MemoryQueue>,
    pub store: Arc<MemoryStore>,
    pub engine: Arc<FakeEngine>,
}

impl Harness {
    pub fn new(payloads: &[&str], behavior: Behavior) -> Self {
        Self::build(payloads, behavior, MemoryStore::default(), settings())
    }

    pub fn build(
        payloads: &[&str],
        behavior: Behavior,
        store: MemoryStore,
        settings: WorkerSettings,
    ) -> Self {
        let queue = Arc::new(MemoryQueue::with_payloads(payloads));
        let store = Arc::new(store);
        let engine = Arc::new(FakeEngine::new(behavior, store.clone()));

        let state = AppState {
            queue: queue.clone(),
            store: store.clone(),
            engine: engine.clone(),
        };

        Self {
            controller: JobController::new(state, settings),
            queue,
            store,
            engine,
        }
    }
}

pub fn sample_report() -> Value {
    serde_json::json!({
        "lighthouseVersion": "12.0.0",
        "requestedUrl": "https://example.com",
        "categories": {"performance": {"id": "performance", "score": 0.93}},
        "audits": {"first-contentful-paint": {"numericValue": 812.4}}
    })
}
