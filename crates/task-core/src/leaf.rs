//! Leaf tasks: the smallest building blocks every composite task eventually
//! bottoms out in.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::contract::{Canceller, DynTask, Task, from_fn, noop_canceller};
use crate::error::{TTask, TaskError};
use crate::event_loop::{boot, boot_via};
use crate::executor::{DynExecutor, Executor};
use crate::scheduler::{DynScheduler, Scheduler};

/// A task that succeeds immediately with a clone of `value` every time it is
/// started. `T: Clone` is what makes it re-runnable: each `start` hands its
/// own continuation an independent copy rather than sharing one.
pub fn success<T, E>(value: T) -> DynTask<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Send + 'static,
{
    from_fn(move |on_success, _on_failure| {
        on_success(value.clone());
        noop_canceller()
    })
}

/// A task that fails immediately with a clone of `error` every time it is
/// started.
pub fn failure<T, E>(error: E) -> DynTask<T, E>
where
    T: Send + 'static,
    E: Clone + Send + Sync + 'static,
{
    from_fn(move |_on_success, on_failure| {
        on_failure(error.clone());
        noop_canceller()
    })
}

/// Convenience over [`failure`] for the common case where the task's
/// failure channel is already [`TaskError`] (i.e. the task is a [`TTask`]):
/// wraps `error` as [`TaskError::Failed`] so the caller does not have to.
pub fn fail<T, E>(error: E) -> TTask<T, E>
where
    T: Send + 'static,
    E: Clone + Send + Sync + 'static,
{
    failure(TaskError::Failed(error))
}

/// Runs `body` on `executor`'s compute pool and settles with its result. A
/// panic inside `body` is caught and reported as [`TaskError::Panicked`]
/// rather than taking down the pool's worker thread.
///
/// Cancellation here is cooperative in name only: `body` is not preemptible
/// (this crate makes no resource-symmetry promises for arbitrary user code),
/// but a cancel arriving before `body` finishes still suppresses delivery of
/// its result, because settling always routes through [`crate::event_loop`]'s
/// once-only guard.
pub fn effect<T, E, F>(executor: DynExecutor, body: F) -> DynTask<T, TaskError<E>>
where
    T: Send + 'static,
    E: Send + 'static,
    F: Fn() -> Result<T, E> + Send + Sync + 'static,
{
    spawn_leaf(executor, body, |executor, job| executor.spawn_compute(job))
}

/// As [`effect`], but the body runs on the unbounded blocking pool instead
/// of the compute pool — for work expected to park a thread.
pub fn effect_off<T, E, F>(executor: DynExecutor, body: F) -> DynTask<T, TaskError<E>>
where
    T: Send + 'static,
    E: Send + 'static,
    F: Fn() -> Result<T, E> + Send + Sync + 'static,
{
    spawn_leaf(executor, body, |executor, job| executor.spawn_blocking(job))
}

fn spawn_leaf<T, E, F, S>(executor: DynExecutor, body: F, submit: S) -> DynTask<T, TaskError<E>>
where
    T: Send + 'static,
    E: Send + 'static,
    F: Fn() -> Result<T, E> + Send + Sync + 'static,
    S: Fn(&DynExecutor, crate::executor::Job) + Send + Sync + 'static,
{
    let body = Arc::new(body);
    let submit = Arc::new(submit);
    let loop_executor = Arc::clone(&executor);
    boot_via(loop_executor, move |handle| {
        let body = Arc::clone(&body);
        let job: crate::executor::Job = Box::new(move || {
            match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| body())) {
                Ok(Ok(value)) => handle.succeed(value),
                Ok(Err(error)) => handle.fail(TaskError::Failed(error)),
                Err(_panic) => handle.fail(TaskError::Panicked),
            }
        });
        (submit)(&executor, job);
        Box::new(|| {})
    })
}

/// Schedules `on_success(value.clone())` to fire after `delay` via
/// `scheduler`. The canceller cancels the scheduled callback; calling it
/// after the delay has elapsed is a no-op, per the scheduler's own
/// contract. Re-running this task starts an independent timer each time.
pub fn timeout<T, E>(value: T, delay: Duration, scheduler: DynScheduler) -> DynTask<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Send + 'static,
{
    from_fn(move |on_success, _on_failure| {
        let value = value.clone();
        scheduler.schedule(delay, Box::new(move || on_success(value)))
    })
}

/// Wraps `task` so that, if it has not settled within `duration`, it is
/// cancelled and the wrapping task fails with [`TaskError::TimedOut`].
/// Whichever of the timer or the inner task settles first cancels the
/// other. Not part of the spec's leaf vocabulary — a deadline over an
/// existing task is a different operation from "produce a value after a
/// delay" — but grounded in the same [`Scheduler`] collaborator.
pub fn with_timeout<T, E>(
    task: DynTask<T, TaskError<E>>,
    duration: Duration,
    scheduler: DynScheduler,
) -> DynTask<T, TaskError<E>>
where
    T: Send + 'static,
    E: Send + 'static,
{
    boot(move |handle| {
        let task_cancel: Arc<Mutex<Option<Canceller>>> = Arc::new(Mutex::new(None));
        let timer_cancel: Arc<Mutex<Option<Canceller>>> = Arc::new(Mutex::new(None));

        let on_success_handle = handle.clone();
        let timer_cancel_for_success = Arc::clone(&timer_cancel);
        let on_failure_handle = handle.clone();
        let timer_cancel_for_failure = Arc::clone(&timer_cancel);
        let task_canceller = task.start(
            Box::new(move |value| {
                if let Some(cancel) = timer_cancel_for_success.lock().take() {
                    cancel();
                }
                on_success_handle.succeed(value);
            }),
            Box::new(move |error| {
                if let Some(cancel) = timer_cancel_for_failure.lock().take() {
                    cancel();
                }
                on_failure_handle.fail(error);
            }),
        );
        *task_cancel.lock() = Some(task_canceller);

        let timer_handle = handle.clone();
        let task_cancel_for_timer = Arc::clone(&task_cancel);
        let timer_canceller = scheduler.schedule(
            duration,
            Box::new(move || {
                if let Some(cancel) = task_cancel_for_timer.lock().take() {
                    cancel();
                }
                timer_handle.fail(TaskError::TimedOut);
            }),
        );
        *timer_cancel.lock() = Some(timer_canceller);

        let task_cancel_for_cancel = Arc::clone(&task_cancel);
        let timer_cancel_for_cancel = Arc::clone(&timer_cancel);
        Box::new(move || {
            if let Some(cancel) = task_cancel_for_cancel.lock().take() {
                cancel();
            }
            if let Some(cancel) = timer_cancel_for_cancel.lock().take() {
                cancel();
            }
        })
    })
}
