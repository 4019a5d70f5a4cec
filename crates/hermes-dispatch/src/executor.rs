//! Bounded execution context for asynchronous and one-way dispatch.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use hermes_core::{ExecutionError, Fault};
use hermes_telemetry::metrics;
use parking_lot::RwLock;
use tokio::sync::{oneshot, watch, Semaphore};
use tracing::{debug, info, warn};

use crate::response::{AsyncHandler, ResponseFuture};
use crate::task::{TaskId, TaskInfo, TaskStats, TaskStatus};

/// Configuration for the executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum number of tasks running at once. Further tasks queue.
    pub max_concurrent: usize,
    /// Timeout applied to every task.
    pub default_timeout: Option<Duration>,
    /// Maximum number of task records kept.
    pub max_registry_size: usize,
    /// How long finished task records are kept.
    pub history_retention: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 256,
            default_timeout: Some(Duration::from_secs(300)),
            max_registry_size: 10_000,
            history_retention: Duration::from_secs(3600),
        }
    }
}

impl ExecutorConfig {
    /// Creates a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the concurrency bound.
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    /// Sets the task timeout.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    /// Disables the task timeout.
    pub fn without_timeout(mut self) -> Self {
        self.default_timeout = None;
        self
    }

    /// Sets the maximum number of task records.
    pub fn with_max_registry_size(mut self, size: usize) -> Self {
        self.max_registry_size = size;
        self
    }

    /// Sets how long finished task records are kept.
    pub fn with_history_retention(mut self, retention: Duration) -> Self {
        self.history_retention = retention;
        self
    }
}

struct RunningGuard(Arc<AtomicU64>);

impl RunningGuard {
    fn new(running: &Arc<AtomicU64>) -> Self {
        running.fetch_add(1, Ordering::AcqRel);
        Self(Arc::clone(running))
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Executor running dispatch work on the tokio runtime.
///
/// Concurrency is bounded by a semaphore; queued tasks wait for a permit.
/// After [`shutdown`](Self::shutdown) or [`shutdown_now`](Self::shutdown_now)
/// new submissions fail fast with [`ExecutionError::ExecutorShutdown`], and
/// tasks stopped by shutdown report the same error to their waiters.
#[derive(Debug)]
pub struct Executor {
    config: ExecutorConfig,
    registry: DashMap<TaskId, Arc<RwLock<TaskInfo>>>,
    stats: Arc<TaskStats>,
    permits: Arc<Semaphore>,
    running: Arc<AtomicU64>,
    shutdown: AtomicBool,
    abort_tx: watch::Sender<bool>,
}

impl Executor {
    /// Creates an executor with default configuration.
    pub fn new() -> Self {
        Self::with_config(ExecutorConfig::default())
    }

    /// Creates an executor with custom configuration.
    pub fn with_config(config: ExecutorConfig) -> Self {
        let (abort_tx, _) = watch::channel(false);
        Self {
            permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            config,
            registry: DashMap::new(),
            stats: Arc::new(TaskStats::new()),
            running: Arc::new(AtomicU64::new(0)),
            shutdown: AtomicBool::new(false),
            abort_tx,
        }
    }

    /// The configuration.
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Returns `true` once shutdown has begun.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Number of tasks queued or running.
    pub fn running_count(&self) -> u64 {
        self.running.load(Ordering::Acquire)
    }

    /// Task statistics.
    pub fn stats(&self) -> &TaskStats {
        &self.stats
    }

    /// Task record by ID.
    pub fn get_task(&self, id: TaskId) -> Option<TaskInfo> {
        self.registry.get(&id).map(|v| v.read().clone())
    }

    /// Every task record.
    pub fn list_tasks(&self) -> Vec<TaskInfo> {
        self.registry
            .iter()
            .map(|entry| entry.value().read().clone())
            .collect()
    }

    /// Submits a task, returning a polling handle.
    ///
    /// A fault returned by the task surfaces as [`ExecutionError::Failed`].
    pub fn submit<F, T>(&self, name: impl Into<String>, task: F) -> ResponseFuture<T>
    where
        F: Future<Output = Result<T, Fault>> + Send + 'static,
        T: Send + 'static,
    {
        self.submit_with_timeout(name, task, self.config.default_timeout)
    }

    /// Submits a task with a specific timeout.
    pub fn submit_with_timeout<F, T>(
        &self,
        name: impl Into<String>,
        task: F,
        timeout: Option<Duration>,
    ) -> ResponseFuture<T>
    where
        F: Future<Output = Result<T, Fault>> + Send + 'static,
        T: Send + 'static,
    {
        match self.prepare(name.into(), task, timeout) {
            Some((id, cancel_tx, body)) => {
                ResponseFuture::spawned(id, tokio::spawn(body), cancel_tx)
            }
            None => ResponseFuture::failed(ExecutionError::ExecutorShutdown),
        }
    }

    /// Submits a task whose outcome is pushed to `handler`.
    ///
    /// After shutdown the handler is invoked immediately with
    /// [`ExecutionError::ExecutorShutdown`]. The returned future completes once
    /// the handler has run.
    pub fn submit_with_callback<F, T, H>(
        &self,
        name: impl Into<String>,
        task: F,
        handler: H,
    ) -> ResponseFuture<()>
    where
        F: Future<Output = Result<T, Fault>> + Send + 'static,
        T: Send + 'static,
        H: AsyncHandler<T>,
    {
        match self.prepare(name.into(), task, self.config.default_timeout) {
            Some((id, cancel_tx, body)) => {
                let handle = tokio::spawn(async move {
                    let result = body.await;
                    let cancelled = matches!(result, Err(ExecutionError::Cancelled));
                    handler.handle_response(result);
                    if cancelled {
                        Err(ExecutionError::Cancelled)
                    } else {
                        Ok(())
                    }
                });
                ResponseFuture::spawned(id, handle, cancel_tx)
            }
            None => {
                handler.handle_response(Err(ExecutionError::ExecutorShutdown));
                ResponseFuture::failed(ExecutionError::ExecutorShutdown)
            }
        }
    }

    /// Runs a fire-and-forget task.
    pub fn spawn_detached<F>(&self, name: impl Into<String>, task: F) -> Result<TaskId, ExecutionError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let task = async move {
            task.await;
            Ok::<(), Fault>(())
        };
        let (id, _cancel_tx, body) = self
            .prepare(name.into(), task, self.config.default_timeout)
            .ok_or(ExecutionError::ExecutorShutdown)?;

        tokio::spawn(async move {
            if let Err(err) = body.await {
                debug!(task_id = %id, error = %err, "detached task did not complete");
            }
        });
        Ok(id)
    }

    fn prepare<F, T>(
        &self,
        name: String,
        task: F,
        timeout: Option<Duration>,
    ) -> Option<(
        TaskId,
        oneshot::Sender<()>,
        impl Future<Output = Result<T, ExecutionError>> + Send + 'static,
    )>
    where
        F: Future<Output = Result<T, Fault>> + Send + 'static,
        T: Send + 'static,
    {
        if self.is_shutdown() {
            self.stats.record_rejected();
            metrics::record_async_submission("rejected");
            debug!(task_name = %name, "rejecting task, executor is shut down");
            return None;
        }

        let id = TaskId::new();
        let info = Arc::new(RwLock::new(TaskInfo::new(id, name.clone())));
        self.track(id, Arc::clone(&info));

        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        let mut abort_rx = self.abort_tx.subscribe();
        let permits = Arc::clone(&self.permits);
        let stats = Arc::clone(&self.stats);
        let guard = RunningGuard::new(&self.running);

        self.stats.record_submitted();
        metrics::record_async_submission("accepted");
        debug!(task_id = %id, task_name = %name, "submitting task");

        let body = async move {
            let _guard = guard;

            // A dropped handle is not a cancellation request.
            let cancelled = async move {
                if cancel_rx.await.is_err() {
                    std::future::pending::<()>().await;
                }
            };
            tokio::pin!(cancelled);

            let permit = tokio::select! {
                permit = permits.acquire_owned() => permit.ok(),
                () = &mut cancelled => None,
                () = aborted(&mut abort_rx) => None,
            };
            let Some(_permit) = permit else {
                let (status, err) = if *abort_rx.borrow() {
                    (TaskStatus::Aborted, ExecutionError::ExecutorShutdown)
                } else {
                    (TaskStatus::Cancelled, ExecutionError::Cancelled)
                };
                info.write().finish(status);
                stats.record(status);
                return Err(err);
            };

            info.write().mark_started();

            let deadline = async {
                match timeout {
                    Some(duration) => tokio::time::sleep(duration).await,
                    None => std::future::pending::<()>().await,
                }
            };

            let (status, result) = tokio::select! {
                result = task => match result {
                    Ok(value) => (TaskStatus::Completed, Ok(value)),
                    Err(fault) => (TaskStatus::Failed, Err(ExecutionError::Failed(fault))),
                },
                () = &mut cancelled => {
                    info!(task_id = %id, "task cancelled");
                    (TaskStatus::Cancelled, Err(ExecutionError::Cancelled))
                }
                () = aborted(&mut abort_rx) => {
                    warn!(task_id = %id, "task stopped by executor shutdown");
                    (TaskStatus::Aborted, Err(ExecutionError::ExecutorShutdown))
                }
                () = deadline => {
                    let limit = timeout.unwrap_or_default();
                    warn!(task_id = %id, timeout = ?limit, "task timed out");
                    (TaskStatus::TimedOut, Err(ExecutionError::Timeout(limit)))
                }
            };

            info.write().finish(status);
            stats.record(status);
            debug!(task_id = %id, status = %status, "task finished");
            result
        };

        Some((id, cancel_tx, body))
    }

    fn track(&self, id: TaskId, info: Arc<RwLock<TaskInfo>>) {
        if self.registry.len() >= self.config.max_registry_size {
            self.cleanup_finished_tasks();
        }
        if self.registry.len() < self.config.max_registry_size {
            self.registry.insert(id, info);
        }
    }

    fn cleanup_finished_tasks(&self) {
        let retention = self.config.history_retention;
        let now = chrono::Utc::now();

        self.registry.retain(|_, info| {
            let info = info.read();
            match info.completed_at {
                Some(completed_at) if info.status.is_terminal() => {
                    (now - completed_at).num_seconds() < retention.as_secs() as i64
                }
                _ => true,
            }
        });
    }

    /// Shuts down gracefully.
    ///
    /// New submissions are refused at once. Running tasks get up to `timeout`
    /// to finish; whatever is still running afterwards is stopped and reports
    /// [`ExecutionError::ExecutorShutdown`].
    pub async fn shutdown(&self, timeout: Duration) {
        info!("shutting down executor");
        self.shutdown.store(true, Ordering::Release);

        let deadline = tokio::time::Instant::now() + timeout;
        while self.running_count() > 0 {
            if tokio::time::Instant::now() >= deadline {
                warn!(
                    running = self.running_count(),
                    "shutdown timeout reached, stopping remaining tasks"
                );
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        self.abort_tx.send_replace(true);
        info!("executor shutdown complete");
    }

    /// Shuts down immediately, stopping every queued and running task.
    pub fn shutdown_now(&self) {
        info!(running = self.running_count(), "shutting down executor now");
        self.shutdown.store(true, Ordering::Release);
        self.abort_tx.send_replace(true);
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

async fn aborted(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|stopped| *stopped).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// An executor that can be cloned and shared between dispatchers.
#[derive(Debug, Clone, Default)]
pub struct SharedExecutor(Arc<Executor>);

impl SharedExecutor {
    /// Creates a shared executor with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a shared executor with configuration.
    pub fn with_config(config: ExecutorConfig) -> Self {
        Self(Arc::new(Executor::with_config(config)))
    }

    /// The inner executor.
    pub fn inner(&self) -> &Executor {
        &self.0
    }

    /// Returns `true` once shutdown has begun.
    pub fn is_shutdown(&self) -> bool {
        self.0.is_shutdown()
    }

    /// Submits a task, returning a polling handle.
    pub fn submit<F, T>(&self, name: impl Into<String>, task: F) -> ResponseFuture<T>
    where
        F: Future<Output = Result<T, Fault>> + Send + 'static,
        T: Send + 'static,
    {
        self.0.submit(name, task)
    }

    /// Submits a task with a specific timeout.
    pub fn submit_with_timeout<F, T>(
        &self,
        name: impl Into<String>,
        task: F,
        timeout: Option<Duration>,
    ) -> ResponseFuture<T>
    where
        F: Future<Output = Result<T, Fault>> + Send + 'static,
        T: Send + 'static,
    {
        self.0.submit_with_timeout(name, task, timeout)
    }

    /// Submits a task whose outcome is pushed to `handler`.
    pub fn submit_with_callback<F, T, H>(
        &self,
        name: impl Into<String>,
        task: F,
        handler: H,
    ) -> ResponseFuture<()>
    where
        F: Future<Output = Result<T, Fault>> + Send + 'static,
        T: Send + 'static,
        H: AsyncHandler<T>,
    {
        self.0.submit_with_callback(name, task, handler)
    }

    /// Runs a fire-and-forget task.
    pub fn spawn_detached<F>(&self, name: impl Into<String>, task: F) -> Result<TaskId, ExecutionError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.0.spawn_detached(name, task)
    }

    /// Shuts down gracefully.
    pub async fn shutdown(&self, timeout: Duration) {
        self.0.shutdown(timeout).await;
    }

    /// Shuts down immediately.
    pub fn shutdown_now(&self) {
        self.0.shutdown_now();
    }
}

impl From<Executor> for SharedExecutor {
    fn from(executor: Executor) -> Self {
        Self(Arc::new(executor))
    }
}
