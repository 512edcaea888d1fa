//! `race`: run every task concurrently and settle with whichever succeeds
//! first, cancelling the rest. Only fails if every competitor does, and
//! then with every competitor's error.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::contract::{Canceller, Task};
use crate::error::{TTask, TaskError};
use crate::event_loop::boot_via;
use crate::executor::DynExecutor;

/// Run every task in `tasks` concurrently; settle with the first success,
/// cancelling every other still-running competitor. If every competitor
/// fails, fail with [`TaskError::Aggregate`] carrying each competitor's
/// error in submission order.
pub fn race<T, E>(executor: DynExecutor, tasks: Vec<TTask<T, E>>) -> TTask<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    boot_via(executor, move |handle| {
        let count = tasks.len();
        if count == 0 {
            let done_handle = handle.clone();
            handle.run(move || done_handle.fail(TaskError::Aggregate(Vec::new())));
            return Box::new(|| {});
        }

        let errors: Arc<Mutex<Vec<Option<TaskError<E>>>>> =
            Arc::new(Mutex::new((0..count).map(|_| None).collect()));
        let remaining = Arc::new(AtomicUsize::new(count));
        let cancellers: Arc<Mutex<Vec<Option<Canceller>>>> =
            Arc::new(Mutex::new((0..count).map(|_| None).collect()));

        for (index, task) in tasks.into_iter().enumerate() {
            let on_success = {
                let cancellers = Arc::clone(&cancellers);
                let handle = handle.clone();
                Box::new(move |value: T| {
                    let cancellers = Arc::clone(&cancellers);
                    let handle = handle.clone();
                    handle.clone().run(move || {
                        for slot in cancellers.lock().iter_mut() {
                            if let Some(cancel) = slot.take() {
                                cancel();
                            }
                        }
                        handle.succeed(value);
                    });
                })
            };
            let on_failure = {
                let errors = Arc::clone(&errors);
                let remaining = Arc::clone(&remaining);
                let handle = handle.clone();
                Box::new(move |error: TaskError<E>| {
                    let errors = Arc::clone(&errors);
                    let remaining = Arc::clone(&remaining);
                    let handle = handle.clone();
                    handle.clone().run(move || {
                        errors.lock()[index] = Some(error);
                        if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                            let collected: Vec<TaskError<E>> = errors
                                .lock()
                                .iter_mut()
                                .map(|slot| slot.take().expect("every competitor settled"))
                                .collect();
                            handle.fail(TaskError::Aggregate(collected));
                        }
                    });
                })
            };
            let canceller = task.start(on_success, on_failure);
            cancellers.lock()[index] = Some(canceller);
        }

        let cancel_all = Arc::clone(&cancellers);
        Box::new(move || {
            for slot in cancel_all.lock().iter_mut() {
                if let Some(cancel) = slot.take() {
                    cancel();
                }
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::Task;
    use crate::executor::DefaultExecutor;
    use crate::leaf::{effect, fail, success};
    use std::sync::mpsc;
    use std::time::Duration;

    fn executor() -> DynExecutor {
        Arc::new(DefaultExecutor::current())
    }

    #[tokio::test]
    async fn race_settles_with_the_first_success() {
        let slow = effect::<i32, String, _>(executor(), || {
            std::thread::sleep(Duration::from_millis(40));
            Ok(1)
        });
        let fast: TTask<i32, String> = success(2);
        let tasks = vec![slow, fast];
        let task = race(executor(), tasks);
        let (tx, rx) = mpsc::channel();
        let _cancel = task.start(Box::new(move |v| tx.send(v).unwrap()), Box::new(|_| {}));
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(rx.recv().unwrap(), 2);
    }

    #[tokio::test]
    async fn race_fails_only_once_every_competitor_has() {
        let tasks: Vec<TTask<i32, String>> =
            vec![fail("a".to_owned()), fail("b".to_owned())];
        let task = race(executor(), tasks);
        let (tx, rx) = mpsc::channel();
        let _cancel = task.start(
            Box::new(|_| panic!("should not succeed")),
            Box::new(move |e| tx.send(e).unwrap()),
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
        match rx.recv().unwrap() {
            TaskError::Aggregate(errors) => assert_eq!(errors.len(), 2),
            other => panic!("expected Aggregate, got {other:?}"),
        }
    }
}
