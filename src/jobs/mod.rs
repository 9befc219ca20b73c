//! Background job execution.
//!
//! Jobs are durable rows in the store's queue (see `store::jobs`). Handlers
//! are registered by job-type string; a pool of workers loops
//! dequeue → handle → complete/retry/fail. Cancellation flows through a
//! `CancellationToken` handed to every handler invocation.

use crate::store::SqliteStore;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How many times a job may be attempted before it is marked failed.
pub const DEFAULT_MAX_ATTEMPTS: i64 = 3;

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Context handed to every handler call.
pub struct JobContext {
    pub cancel: CancellationToken,
}

impl JobContext {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    /// The queue type string this handler consumes.
    fn job_type(&self) -> &'static str;

    async fn handle(&self, ctx: &JobContext, payload: JsonValue) -> Result<()>;
}

#[derive(Default)]
pub struct JobRegistry {
    handlers: HashMap<&'static str, Arc<dyn JobHandler>>,
}

impl JobRegistry {
    pub fn new() -> JobRegistry {
        JobRegistry::default()
    }

    pub fn register(&mut self, handler: Arc<dyn JobHandler>) {
        let job_type = handler.job_type();
        if self.handlers.insert(job_type, handler).is_some() {
            warn!("Job handler for type '{}' was replaced", job_type);
        }
    }

    pub fn get(&self, job_type: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(job_type).cloned()
    }

    pub fn types(&self) -> Vec<&'static str> {
        self.handlers.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

pub struct WorkerPool {
    store: Arc<SqliteStore>,
    registry: Arc<JobRegistry>,
    workers: usize,
    max_attempts: i64,
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(
        store: Arc<SqliteStore>,
        registry: Arc<JobRegistry>,
        workers: usize,
        cancel: CancellationToken,
    ) -> WorkerPool {
        WorkerPool {
            store,
            registry,
            workers: workers.max(1),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            cancel,
            handles: Vec::new(),
        }
    }

    pub fn start(&mut self) {
        for worker_id in 0..self.workers {
            let store = self.store.clone();
            let registry = self.registry.clone();
            let cancel = self.cancel.clone();
            let max_attempts = self.max_attempts;
            self.handles.push(tokio::spawn(async move {
                worker_loop(worker_id, store, registry, cancel, max_attempts).await;
            }));
        }
        info!("Started {} job worker(s)", self.workers);
    }

    /// Cancel the workers and wait for in-flight handlers, bounded by
    /// `deadline`.
    pub async fn shutdown(self, deadline: Duration) {
        self.cancel.cancel();
        let drain = futures::future::join_all(self.handles);
        if tokio::time::timeout(deadline, drain).await.is_err() {
            warn!("Job workers did not drain within {:?}", deadline);
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    store: Arc<SqliteStore>,
    registry: Arc<JobRegistry>,
    cancel: CancellationToken,
    max_attempts: i64,
) {
    let types = registry.types();
    loop {
        if cancel.is_cancelled() {
            break;
        }

        let job = match store.dequeue_job(&types) {
            Ok(job) => job,
            Err(err) => {
                error!("Worker {}: dequeue failed: {}", worker_id, err);
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(POLL_INTERVAL) => continue,
                }
            }
        };

        let Some(job) = job else {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
            }
            continue;
        };

        let Some(handler) = registry.get(&job.job_type) else {
            // Cannot happen while types come from the registry itself
            error!("Worker {}: no handler for job type '{}'", worker_id, job.job_type);
            let _ = store.fail_job(job.id, "no handler registered");
            continue;
        };

        debug!(
            "Worker {}: running job {} (type '{}', attempt {})",
            worker_id, job.id, job.job_type, job.attempts
        );
        let payload: JsonValue = serde_json::from_str(&job.payload).unwrap_or(JsonValue::Null);
        let ctx = JobContext {
            cancel: cancel.child_token(),
        };

        match handler.handle(&ctx, payload).await {
            Ok(()) => {
                if let Err(err) = store.complete_job(job.id) {
                    error!("Worker {}: failed to complete job {}: {}", worker_id, job.id, err);
                }
            }
            Err(job_err) => {
                let message = job_err.to_string();
                warn!(
                    "Worker {}: job {} (type '{}') failed: {}",
                    worker_id, job.id, job.job_type, message
                );
                match store.retry_job(job.id, &message, max_attempts) {
                    Ok(true) => {}
                    Ok(false) => {
                        if let Err(err) = store.fail_job(job.id, &message) {
                            error!("Worker {}: failed to fail job {}: {}", worker_id, job.id, err);
                        }
                    }
                    Err(err) => {
                        error!("Worker {}: retry bookkeeping failed for job {}: {}", worker_id, job.id, err);
                    }
                }
            }
        }
    }
    debug!("Worker {} stopped", worker_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::JobStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler {
        calls: Arc<AtomicUsize>,
        fail_first: bool,
    }

    #[async_trait]
    impl JobHandler for CountingHandler {
        fn job_type(&self) -> &'static str {
            "counting"
        }

        async fn handle(&self, _ctx: &JobContext, _payload: JsonValue) -> Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_first && call == 0 {
                anyhow::bail!("first attempt fails");
            }
            Ok(())
        }
    }

    async fn wait_for_status(store: &SqliteStore, id: i64, status: JobStatus) {
        for _ in 0..200 {
            if store.get_job(id).unwrap().unwrap().status == status {
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("job {} never reached {:?}", id, status);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn worker_completes_jobs() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = JobRegistry::new();
        registry.register(Arc::new(CountingHandler {
            calls: calls.clone(),
            fail_first: false,
        }));

        let cancel = CancellationToken::new();
        let mut pool = WorkerPool::new(store.clone(), Arc::new(registry), 1, cancel.clone());
        pool.start();

        let id = store.enqueue_job("counting", "{}").unwrap();
        wait_for_status(&store, id, JobStatus::Completed).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        pool.shutdown(Duration::from_secs(5)).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failing_job_is_retried() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = JobRegistry::new();
        registry.register(Arc::new(CountingHandler {
            calls: calls.clone(),
            fail_first: true,
        }));

        let cancel = CancellationToken::new();
        let mut pool = WorkerPool::new(store.clone(), Arc::new(registry), 1, cancel.clone());
        pool.start();

        let id = store.enqueue_job("counting", "{}").unwrap();
        wait_for_status(&store, id, JobStatus::Completed).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.get_job(id).unwrap().unwrap().attempts, 2);

        pool.shutdown(Duration::from_secs(5)).await;
    }
}
