//! The executor collaborator: submits pump work and leaf bodies for later
//! execution. The spec treats the concrete executor as an external
//! collaborator with a minimal documented interface; this module is that
//! interface plus a usable `tokio`-backed default, because a library with no
//! runnable default is not one this codebase would ship.

use std::sync::Arc;

use crate::error::ExecutorBuildError;

/// A unit of work submitted to an executor. Boxed `FnOnce` rather than a
/// `Future`: the event-loop pump and leaf bodies in this crate are plain
/// synchronous closures, so there is nothing to `.await` here.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Submits work for later execution.
///
/// # Contract
/// - `spawn_compute` and `spawn_blocking` must not run `job` synchronously on
///   the calling thread.
/// - `job` must eventually run exactly once, or never (if the executor has
///   shut down); an executor is free to drop a queued job on shutdown, and
///   any task depending on it then simply never completes, per the task
///   contract's "may never call s or f" allowance.
pub trait Executor: Send + Sync + 'static {
    /// Submit to the default compute pool — for pump work and leaf bodies
    /// expected to run quickly and never block.
    fn spawn_compute(&self, job: Job);

    /// Submit to an unbounded pool intended for blocking work (`effect_off`).
    fn spawn_blocking(&self, job: Job);
}

/// A shared, type-erased executor handle.
pub type DynExecutor = Arc<dyn Executor>;

/// Configuration for an owned [`DefaultExecutor`] runtime.
#[derive(Clone, Debug)]
pub struct ExecutorConfig {
    /// Worker thread count for the compute pool. `None` defers to tokio's
    /// own default (the number of CPUs).
    pub worker_threads: Option<usize>,
    /// Thread name prefix, surfaced in panics and profiler output.
    pub thread_name: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            worker_threads: None,
            thread_name: "task-core".to_owned(),
        }
    }
}

/// `tokio`-backed default executor. The compute pool is tokio's own
/// multi-threaded scheduler; the blocking pool is tokio's dedicated
/// blocking-thread pool, which is exactly the "unbounded blocking executor"
/// the spec's external interface calls for.
pub struct DefaultExecutor {
    handle: tokio::runtime::Handle,
    // Keeps an owned runtime alive for the lifetime of this executor when we
    // built one ourselves; `None` when wrapping a caller-supplied handle.
    _owned_runtime: Option<Arc<tokio::runtime::Runtime>>,
}

impl DefaultExecutor {
    /// Wrap the `tokio` runtime the caller is already inside.
    pub fn current() -> Self {
        Self::from_handle(tokio::runtime::Handle::current())
    }

    /// Wrap an existing handle without taking ownership of its runtime.
    pub fn from_handle(handle: tokio::runtime::Handle) -> Self {
        Self {
            handle,
            _owned_runtime: None,
        }
    }

    /// Build and own a fresh multi-threaded runtime per `config`.
    pub fn build(config: ExecutorConfig) -> Result<Self, ExecutorBuildError> {
        let mut builder = tokio::runtime::Builder::new_multi_thread();
        builder.enable_all().thread_name(config.thread_name.clone());
        if let Some(n) = config.worker_threads {
            builder.worker_threads(n);
        }
        let runtime = builder.build()?;
        let handle = runtime.handle().clone();
        Ok(Self {
            handle,
            _owned_runtime: Some(Arc::new(runtime)),
        })
    }

    pub fn handle(&self) -> &tokio::runtime::Handle {
        &self.handle
    }
}

impl Executor for DefaultExecutor {
    fn spawn_compute(&self, job: Job) {
        tracing::trace!("task-core: submitting compute job");
        self.handle.spawn(async move { job() });
    }

    fn spawn_blocking(&self, job: Job) {
        tracing::trace!("task-core: submitting blocking job");
        self.handle.spawn_blocking(job);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[tokio::test]
    async fn spawn_compute_runs_off_the_calling_thread() {
        let executor = DefaultExecutor::current();
        let (tx, rx) = mpsc::channel();
        executor.spawn_compute(Box::new(move || {
            tx.send(42).unwrap();
        }));
        assert_eq!(rx.recv().unwrap(), 42);
    }

    #[tokio::test]
    async fn spawn_blocking_runs_the_job() {
        let executor = DefaultExecutor::current();
        let (tx, rx) = mpsc::channel();
        executor.spawn_blocking(Box::new(move || {
            tx.send("done").unwrap();
        }));
        assert_eq!(rx.recv().unwrap(), "done");
    }
}
