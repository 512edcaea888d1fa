//! The crate's one error currency.
//!
//! Every leaf and combinator here fails with `TaskError<E>` rather than a
//! bare `E`: the engine itself can fail a task (a handler panicked, the
//! executor shut down, every racer lost) and those failure kinds have
//! nothing to do with the user's own error type. Keeping them in one enum,
//! generic over `E`, means `then`/`or_else` chains stay fully typed instead
//! of collapsing to `Box<dyn Error>` the way the untyped original can get
//! away with.

use std::fmt;

/// Unified failure channel for tasks in this crate.
///
/// `Panicked` mirrors `tokio::task::JoinError`'s own `is_panic` case: a
/// handler or leaf body unwinding is caught at the executor boundary and
/// reported here rather than taking the pump thread down with it.
#[derive(Debug, Clone)]
pub enum TaskError<E> {
    /// A subscriber or the outer task was cancelled before it produced a
    /// result.
    Cancelled,
    /// A leaf body or a continuation invoked by this crate unwound.
    Panicked,
    /// The executor backing this task was shut down before it could run.
    ExecutorTerminated,
    /// The user-level failure this task actually describes.
    Failed(E),
    /// `race` with every competitor failing; carries every child's error in
    /// submission order.
    Aggregate(Vec<TaskError<E>>),
    /// [`crate::leaf::with_timeout`]'s wrapped task did not settle before
    /// the deadline; it has been cancelled.
    TimedOut,
}

/// Capability required by [`crate::promise::Promise`] to synthesize the
/// "Cancelled" failure it delivers to a subscriber that cancels before the
/// promise settles. `TaskError<E>` is the only type in this crate that
/// implements it; a promise over a bare user error type cannot represent
/// cancellation and is not supported.
pub trait Cancellable {
    fn cancelled() -> Self;
}

impl<E> Cancellable for TaskError<E> {
    fn cancelled() -> Self {
        TaskError::Cancelled
    }
}

impl<E: fmt::Display> fmt::Display for TaskError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskError::Cancelled => write!(f, "task cancelled"),
            TaskError::Panicked => write!(f, "task panicked"),
            TaskError::ExecutorTerminated => write!(f, "executor terminated"),
            TaskError::TimedOut => write!(f, "task timed out"),
            TaskError::Failed(e) => write!(f, "{e}"),
            TaskError::Aggregate(errors) => {
                write!(f, "all {} competing tasks failed: ", errors.len())?;
                for (i, e) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{e}")?;
                }
                Ok(())
            },
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for TaskError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

impl<E> TaskError<E> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskError::Cancelled)
    }

    pub fn failed(e: E) -> Self {
        TaskError::Failed(e)
    }
}

/// This crate's tasks overwhelmingly fail with engine-level kinds alongside
/// a user error, so most signatures traffic in `TTask` rather than a bare
/// `DynTask<T, E>`.
pub type TTask<T, E> = crate::contract::DynTask<T, TaskError<E>>;

/// Failure mode of [`crate::do_block::block_on`].
#[derive(Debug)]
pub enum BlockOnError<E> {
    /// The calling thread is a worker of a single-threaded async runtime;
    /// blocking it here would deadlock that runtime's own executor. This is
    /// the concrete, detectable form of the spec's "host cannot suspend the
    /// calling thread" failure.
    NoThreadSuspension,
    /// The task itself failed.
    Failed(TaskError<E>),
}

impl<E: fmt::Display> fmt::Display for BlockOnError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockOnError::NoThreadSuspension => {
                write!(f, "cannot block the current thread: it drives a single-threaded async runtime")
            },
            BlockOnError::Failed(e) => write!(f, "{e}"),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for BlockOnError<E> {}

/// Failure building an owned [`crate::executor::DefaultExecutor`] runtime.
#[derive(Debug, thiserror::Error)]
#[error("failed to build task-core runtime: {0}")]
pub struct ExecutorBuildError(#[from] pub std::io::Error);
