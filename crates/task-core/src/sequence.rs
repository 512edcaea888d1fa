//! `then`/`or_else`: chain a task onto the outcome of another — the spec's
//! `then`/`else`, renamed because `else` is a Rust keyword.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::contract::{Canceller, Task};
use crate::error::{TTask, TaskError};
use crate::event_loop::boot;
use crate::leaf::success;

/// Run `task`; on success, run `f(value)` and adopt its result. A failure
/// from `task` itself passes straight through without ever calling `f`.
pub fn then<T, R, E, F>(task: TTask<T, E>, f: F) -> TTask<R, E>
where
    T: Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
    F: Fn(T) -> TTask<R, E> + Send + Sync + 'static,
{
    let f = Arc::new(f);
    boot(move |handle| {
        let next_cancel: Arc<Mutex<Option<Canceller>>> = Arc::new(Mutex::new(None));

        let on_success = {
            let f = Arc::clone(&f);
            let handle = handle.clone();
            let next_cancel = Arc::clone(&next_cancel);
            Box::new(move |value: T| {
                let f = Arc::clone(&f);
                let handle = handle.clone();
                let next_cancel = Arc::clone(&next_cancel);
                handle.clone().run(move || {
                    let next_task = (f)(value);
                    let success_handle = handle.clone();
                    let failure_handle = handle.clone();
                    let cancel = next_task.start(
                        Box::new(move |v| success_handle.succeed(v)),
                        Box::new(move |e| failure_handle.fail(e)),
                    );
                    *next_cancel.lock() = Some(cancel);
                });
            })
        };
        let on_failure = {
            let handle = handle.clone();
            Box::new(move |error: TaskError<E>| handle.fail(error))
        };

        let first_cancel = Arc::new(Mutex::new(Some(task.start(on_success, on_failure))));

        let first_cancel_for_cancel = Arc::clone(&first_cancel);
        let next_cancel_for_cancel = Arc::clone(&next_cancel);
        Box::new(move || {
            if let Some(cancel) = first_cancel_for_cancel.lock().take() {
                cancel();
            }
            if let Some(cancel) = next_cancel_for_cancel.lock().take() {
                cancel();
            }
        })
    })
}

/// Run `task`; on failure, run `f(error)` and adopt its result instead. A
/// success from `task` passes straight through without ever calling `f`.
/// The spec's `else`.
pub fn or_else<T, E, F>(task: TTask<T, E>, f: F) -> TTask<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
    F: Fn(TaskError<E>) -> TTask<T, E> + Send + Sync + 'static,
{
    let f = Arc::new(f);
    boot(move |handle| {
        let next_cancel: Arc<Mutex<Option<Canceller>>> = Arc::new(Mutex::new(None));

        let on_success = {
            let handle = handle.clone();
            Box::new(move |value: T| handle.succeed(value))
        };
        let on_failure = {
            let f = Arc::clone(&f);
            let handle = handle.clone();
            let next_cancel = Arc::clone(&next_cancel);
            Box::new(move |error: TaskError<E>| {
                let f = Arc::clone(&f);
                let handle = handle.clone();
                let next_cancel = Arc::clone(&next_cancel);
                handle.clone().run(move || {
                    let next_task = (f)(error);
                    let success_handle = handle.clone();
                    let failure_handle = handle.clone();
                    let cancel = next_task.start(
                        Box::new(move |v| success_handle.succeed(v)),
                        Box::new(move |e| failure_handle.fail(e)),
                    );
                    *next_cancel.lock() = Some(cancel);
                });
            })
        };

        let first_cancel = Arc::new(Mutex::new(Some(task.start(on_success, on_failure))));

        let first_cancel_for_cancel = Arc::clone(&first_cancel);
        let next_cancel_for_cancel = Arc::clone(&next_cancel);
        Box::new(move || {
            if let Some(cancel) = first_cancel_for_cancel.lock().take() {
                cancel();
            }
            if let Some(cancel) = next_cancel_for_cancel.lock().take() {
                cancel();
            }
        })
    })
}

/// Transform a task's success value without giving it the chance to start
/// another task — a thin convenience over [`then`] for the common case
/// where the continuation is a pure function rather than another task.
pub fn map<T, R, E, F>(task: TTask<T, E>, f: F) -> TTask<R, E>
where
    T: Send + 'static,
    R: Clone + Send + Sync + 'static,
    E: Send + 'static,
    F: Fn(T) -> R + Send + Sync + 'static,
{
    then(task, move |value| success(f(value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::Task;
    use crate::leaf::fail;
    use std::sync::mpsc;

    #[tokio::test]
    async fn then_chains_on_success() {
        let first: TTask<i32, String> = success(1);
        let task = then(first, |v| success::<i32, TaskError<String>>(v + 1));
        let (tx, rx) = mpsc::channel();
        task.start(Box::new(move |v| tx.send(v).unwrap()), Box::new(|_| {}));
        assert_eq!(rx.recv().unwrap(), 2);
    }

    #[tokio::test]
    async fn then_passes_through_a_failure_without_calling_f() {
        let first: TTask<i32, String> = fail("boom".to_owned());
        let task = then(first, |_: i32| -> TTask<i32, String> {
            panic!("must not run");
        });
        let (tx, rx) = mpsc::channel();
        task.start(
            Box::new(|_| panic!("should not succeed")),
            Box::new(move |e| tx.send(e).unwrap()),
        );
        assert!(matches!(rx.recv().unwrap(), TaskError::Failed(ref m) if m == "boom"));
    }

    #[tokio::test]
    async fn or_else_recovers_a_failure() {
        let first: TTask<i32, String> = fail("boom".to_owned());
        let task = or_else(first, |_| success(9));
        let (tx, rx) = mpsc::channel();
        task.start(Box::new(move |v| tx.send(v).unwrap()), Box::new(|_| {}));
        assert_eq!(rx.recv().unwrap(), 9);
    }

    #[tokio::test]
    async fn or_else_passes_through_a_success_without_calling_f() {
        let first: TTask<i32, String> = success(4);
        let task = or_else(first, |_| -> TTask<i32, String> { panic!("must not run") });
        let (tx, rx) = mpsc::channel();
        task.start(Box::new(move |v| tx.send(v).unwrap()), Box::new(|_| {}));
        assert_eq!(rx.recv().unwrap(), 4);
    }

    #[tokio::test]
    async fn map_transforms_the_success_value() {
        let first: TTask<i32, String> = success(3);
        let task = map(first, |v| v * 10);
        let (tx, rx) = mpsc::channel();
        task.start(Box::new(move |v| tx.send(v).unwrap()), Box::new(|_| {}));
        assert_eq!(rx.recv().unwrap(), 30);
    }

    #[tokio::test]
    async fn then_cancels_the_chained_task_when_the_outer_is_cancelled() {
        use crate::contract::from_fn;
        use crate::executor::DefaultExecutor;
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::time::Duration;

        let executor: crate::executor::DynExecutor = Arc::new(DefaultExecutor::current());
        let first: TTask<i32, String> = crate::leaf::effect(executor, || Ok(1));

        let chained_started = Arc::new(AtomicBool::new(false));
        let chained_cancelled = Arc::new(AtomicBool::new(false));
        let started = Arc::clone(&chained_started);
        let cancelled = Arc::clone(&chained_cancelled);
        let task = then(first, move |_: i32| -> TTask<i32, String> {
            started.store(true, Ordering::SeqCst);
            let cancelled = Arc::clone(&cancelled);
            from_fn(move |_s, _f| {
                let cancelled = Arc::clone(&cancelled);
                Box::new(move || cancelled.store(true, Ordering::SeqCst))
            })
        });

        let (tx, rx) = mpsc::channel::<i32>();
        let cancel = task.start(Box::new(move |v| tx.send(v).unwrap()), Box::new(|_| {}));
        tokio::time::sleep(Duration::from_millis(15)).await;
        cancel();
        tokio::time::sleep(Duration::from_millis(15)).await;

        assert!(chained_started.load(Ordering::SeqCst), "chained task never started");
        assert!(
            chained_cancelled.load(Ordering::SeqCst),
            "cancelling the outer task must invoke the chained task's canceller"
        );
        assert!(rx.try_recv().is_err());
    }
}
