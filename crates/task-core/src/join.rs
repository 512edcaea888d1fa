//! `join`: run every task concurrently and succeed once all of them have,
//! combining their values; fail as soon as the first one does, cancelling
//! the rest.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::contract::{Canceller, Task};
use crate::error::{TTask, TaskError};
use crate::event_loop::boot_via;
use crate::executor::DynExecutor;

/// Run every task in `tasks` concurrently, combine their values with
/// `combine` once all have succeeded, and fail fast — cancelling every
/// still-running sibling — the moment any one fails.
pub fn join_with<T, R, E, F>(
    executor: DynExecutor,
    tasks: Vec<TTask<T, E>>,
    combine: F,
) -> TTask<R, E>
where
    T: Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
    F: Fn(Vec<T>) -> R + Send + Sync + 'static,
{
    let combine = Arc::new(combine);
    boot_via(executor, move |handle| {
        let count = tasks.len();
        if count == 0 {
            let done_handle = handle.clone();
            let combine = Arc::clone(&combine);
            handle.run(move || done_handle.succeed((combine)(Vec::new())));
            return Box::new(|| {});
        }

        let results: Arc<Mutex<Vec<Option<T>>>> =
            Arc::new(Mutex::new((0..count).map(|_| None).collect()));
        let remaining = Arc::new(AtomicUsize::new(count));
        let cancellers: Arc<Mutex<Vec<Option<Canceller>>>> =
            Arc::new(Mutex::new((0..count).map(|_| None).collect()));

        for (index, task) in tasks.into_iter().enumerate() {
            let on_success = {
                let results = Arc::clone(&results);
                let remaining = Arc::clone(&remaining);
                let combine = Arc::clone(&combine);
                let handle = handle.clone();
                Box::new(move |value: T| {
                    let results = Arc::clone(&results);
                    let remaining = Arc::clone(&remaining);
                    let combine = Arc::clone(&combine);
                    let handle = handle.clone();
                    handle.clone().run(move || {
                        results.lock()[index] = Some(value);
                        if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                            let collected: Vec<T> = results
                                .lock()
                                .iter_mut()
                                .map(|slot| slot.take().expect("every child settled"))
                                .collect();
                            handle.succeed((combine)(collected));
                        }
                    });
                })
            };
            let on_failure = {
                let cancellers = Arc::clone(&cancellers);
                let handle = handle.clone();
                Box::new(move |error: TaskError<E>| {
                    let cancellers = Arc::clone(&cancellers);
                    let handle = handle.clone();
                    handle.clone().run(move || {
                        for slot in cancellers.lock().iter_mut() {
                            if let Some(cancel) = slot.take() {
                                cancel();
                            }
                        }
                        handle.fail(error);
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

/// `join_with` specialized to collecting every result into a `Vec` in
/// submission order.
pub fn join<T, E>(executor: DynExecutor, tasks: Vec<TTask<T, E>>) -> TTask<Vec<T>, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    join_with(executor, tasks, |values| values)
}

/// Join exactly two differently-typed tasks without boxing into a `Vec` —
/// the small-arity convenience the spec anticipates alongside the variadic
/// form.
pub fn join2<A, B, E>(executor: DynExecutor, a: TTask<A, E>, b: TTask<B, E>) -> TTask<(A, B), E>
where
    A: Send + 'static,
    B: Send + 'static,
    E: Send + 'static,
{
    boot_via(executor, move |handle| {
        let a_slot: Arc<Mutex<Option<A>>> = Arc::new(Mutex::new(None));
        let b_slot: Arc<Mutex<Option<B>>> = Arc::new(Mutex::new(None));
        let remaining = Arc::new(AtomicUsize::new(2));
        let cancellers: Arc<Mutex<[Option<Canceller>; 2]>> = Arc::new(Mutex::new([None, None]));

        let a_cancel = {
            let a_slot = Arc::clone(&a_slot);
            let b_slot = Arc::clone(&b_slot);
            let remaining = Arc::clone(&remaining);
            let handle = handle.clone();
            let cancellers = Arc::clone(&cancellers);
            a.start(
                Box::new(move |value| {
                    let a_slot = Arc::clone(&a_slot);
                    let b_slot = Arc::clone(&b_slot);
                    let remaining = Arc::clone(&remaining);
                    let handle = handle.clone();
                    handle.clone().run(move || {
                        *a_slot.lock() = Some(value);
                        if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                            let a = a_slot.lock().take().expect("a settled");
                            let b = b_slot.lock().take().expect("b settled");
                            handle.succeed((a, b));
                        }
                    });
                }),
                Box::new(move |error| {
                    let handle = handle.clone();
                    let cancellers = Arc::clone(&cancellers);
                    handle.clone().run(move || {
                        for slot in cancellers.lock().iter_mut() {
                            if let Some(cancel) = slot.take() {
                                cancel();
                            }
                        }
                        handle.fail(error);
                    });
                }),
            )
        };

        let b_cancel = {
            let a_slot = Arc::clone(&a_slot);
            let b_slot = Arc::clone(&b_slot);
            let remaining = Arc::clone(&remaining);
            let handle = handle.clone();
            let cancellers = Arc::clone(&cancellers);
            b.start(
                Box::new(move |value| {
                    let a_slot = Arc::clone(&a_slot);
                    let b_slot = Arc::clone(&b_slot);
                    let remaining = Arc::clone(&remaining);
                    let handle = handle.clone();
                    handle.clone().run(move || {
                        *b_slot.lock() = Some(value);
                        if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                            let a = a_slot.lock().take().expect("a settled");
                            let b = b_slot.lock().take().expect("b settled");
                            handle.succeed((a, b));
                        }
                    });
                }),
                Box::new(move |error| {
                    let handle = handle.clone();
                    let cancellers = Arc::clone(&cancellers);
                    handle.clone().run(move || {
                        for slot in cancellers.lock().iter_mut() {
                            if let Some(cancel) = slot.take() {
                                cancel();
                            }
                        }
                        handle.fail(error);
                    });
                }),
            )
        };

        *cancellers.lock() = [Some(a_cancel), Some(b_cancel)];
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

/// Join exactly three differently-typed tasks — the same shape as
/// [`join2`], extended to a third slot.
pub fn join3<A, B, C, E>(
    executor: DynExecutor,
    a: TTask<A, E>,
    b: TTask<B, E>,
    c: TTask<C, E>,
) -> TTask<(A, B, C), E>
where
    A: Send + 'static,
    B: Send + 'static,
    C: Send + 'static,
    E: Send + 'static,
{
    boot_via(executor, move |handle| {
        let a_slot: Arc<Mutex<Option<A>>> = Arc::new(Mutex::new(None));
        let b_slot: Arc<Mutex<Option<B>>> = Arc::new(Mutex::new(None));
        let c_slot: Arc<Mutex<Option<C>>> = Arc::new(Mutex::new(None));
        let remaining = Arc::new(AtomicUsize::new(3));
        let cancellers: Arc<Mutex<[Option<Canceller>; 3]>> =
            Arc::new(Mutex::new([None, None, None]));

        fn fail_and_cancel_siblings<A, B, C, E>(
            handle: crate::event_loop::Handle<(A, B, C), TaskError<E>>,
            cancellers: Arc<Mutex<[Option<Canceller>; 3]>>,
        ) -> crate::contract::Continuation<TaskError<E>>
        where
            A: Send + 'static,
            B: Send + 'static,
            C: Send + 'static,
            E: Send + 'static,
        {
            Box::new(move |error| {
                handle.clone().run(move || {
                    for slot in cancellers.lock().iter_mut() {
                        if let Some(cancel) = slot.take() {
                            cancel();
                        }
                    }
                    handle.fail(error);
                });
            })
        }

        let a_cancel = {
            let a_slot = Arc::clone(&a_slot);
            let b_slot = Arc::clone(&b_slot);
            let c_slot = Arc::clone(&c_slot);
            let remaining = Arc::clone(&remaining);
            let handle = handle.clone();
            a.start(
                Box::new(move |value| {
                    let a_slot = Arc::clone(&a_slot);
                    let b_slot = Arc::clone(&b_slot);
                    let c_slot = Arc::clone(&c_slot);
                    let remaining = Arc::clone(&remaining);
                    let handle = handle.clone();
                    handle.clone().run(move || {
                        *a_slot.lock() = Some(value);
                        if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                            let a = a_slot.lock().take().expect("a settled");
                            let b = b_slot.lock().take().expect("b settled");
                            let c = c_slot.lock().take().expect("c settled");
                            handle.succeed((a, b, c));
                        }
                    });
                }),
                fail_and_cancel_siblings(handle.clone(), Arc::clone(&cancellers)),
            )
        };

        let b_cancel = {
            let a_slot = Arc::clone(&a_slot);
            let b_slot = Arc::clone(&b_slot);
            let c_slot = Arc::clone(&c_slot);
            let remaining = Arc::clone(&remaining);
            let handle = handle.clone();
            b.start(
                Box::new(move |value| {
                    let a_slot = Arc::clone(&a_slot);
                    let b_slot = Arc::clone(&b_slot);
                    let c_slot = Arc::clone(&c_slot);
                    let remaining = Arc::clone(&remaining);
                    let handle = handle.clone();
                    handle.clone().run(move || {
                        *b_slot.lock() = Some(value);
                        if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                            let a = a_slot.lock().take().expect("a settled");
                            let b = b_slot.lock().take().expect("b settled");
                            let c = c_slot.lock().take().expect("c settled");
                            handle.succeed((a, b, c));
                        }
                    });
                }),
                fail_and_cancel_siblings(handle.clone(), Arc::clone(&cancellers)),
            )
        };

        let c_cancel = {
            let a_slot = Arc::clone(&a_slot);
            let b_slot = Arc::clone(&b_slot);
            let c_slot = Arc::clone(&c_slot);
            let remaining = Arc::clone(&remaining);
            let handle = handle.clone();
            c.start(
                Box::new(move |value| {
                    let a_slot = Arc::clone(&a_slot);
                    let b_slot = Arc::clone(&b_slot);
                    let c_slot = Arc::clone(&c_slot);
                    let remaining = Arc::clone(&remaining);
                    let handle = handle.clone();
                    handle.clone().run(move || {
                        *c_slot.lock() = Some(value);
                        if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                            let a = a_slot.lock().take().expect("a settled");
                            let b = b_slot.lock().take().expect("b settled");
                            let c = c_slot.lock().take().expect("c settled");
                            handle.succeed((a, b, c));
                        }
                    });
                }),
                fail_and_cancel_siblings(handle.clone(), Arc::clone(&cancellers)),
            )
        };

        *cancellers.lock() = [Some(a_cancel), Some(b_cancel), Some(c_cancel)];
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
    use crate::error::Cancellable;
    use crate::executor::DefaultExecutor;
    use crate::leaf::{fail, success};
    use std::sync::mpsc;

    fn executor() -> DynExecutor {
        Arc::new(DefaultExecutor::current())
    }

    #[tokio::test]
    async fn join_combines_every_success() {
        let tasks: Vec<TTask<i32, String>> = vec![success(6), success(7), success(29)];
        let task = join_with(executor(), tasks, |values| values.iter().sum::<i32>());
        let (tx, rx) = mpsc::channel();
        let _cancel = task.start(Box::new(move |v| tx.send(v).unwrap()), Box::new(|_| {}));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(rx.recv().unwrap(), 42);
    }

    #[tokio::test]
    async fn join_fails_fast_on_first_failure() {
        let tasks: Vec<TTask<i32, String>> = vec![success(1), fail("nope".to_owned())];
        let task = join(executor(), tasks);
        let (tx, rx) = mpsc::channel();
        let _cancel = task.start(
            Box::new(|_| panic!("should not succeed")),
            Box::new(move |e| tx.send(e).unwrap()),
        );
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let error = rx.recv().unwrap();
        assert!(matches!(error, TaskError::Failed(ref msg) if msg == "nope"));
    }

    #[tokio::test]
    async fn join_of_no_tasks_succeeds_with_empty_combine() {
        let tasks: Vec<TTask<i32, String>> = Vec::new();
        let task = join_with(executor(), tasks, |values| values.len());
        let (tx, rx) = mpsc::channel();
        let _cancel = task.start(Box::new(move |v| tx.send(v).unwrap()), Box::new(|_| {}));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(rx.recv().unwrap(), 0);
    }

    #[tokio::test]
    async fn join2_pairs_heterogeneous_values() {
        let a: TTask<i32, String> = success(1);
        let b: TTask<&'static str, String> = success("ok");
        let task = join2(executor(), a, b);
        let (tx, rx) = mpsc::channel();
        let _cancel = task.start(Box::new(move |v| tx.send(v).unwrap()), Box::new(|_| {}));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(rx.recv().unwrap(), (1, "ok"));
    }

    #[tokio::test]
    async fn join3_triples_heterogeneous_values() {
        let a: TTask<i32, String> = success(1);
        let b: TTask<&'static str, String> = success("two");
        let c: TTask<bool, String> = success(true);
        let task = join3(executor(), a, b, c);
        let (tx, rx) = mpsc::channel();
        let _cancel = task.start(Box::new(move |v| tx.send(v).unwrap()), Box::new(|_| {}));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(rx.recv().unwrap(), (1, "two", true));
    }

    #[test]
    fn aggregate_and_cancellation_stay_in_the_taskerror_channel() {
        let err: TaskError<String> = TaskError::cancelled();
        assert!(err.is_cancelled());
    }
}
