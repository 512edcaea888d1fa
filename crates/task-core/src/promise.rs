//! A completable, memoized, multi-subscriber task: the one place in this
//! crate where more than one continuation can legitimately be registered
//! against the same result.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::contract::{Canceller, Continuation, Task, noop_canceller};
use crate::error::Cancellable;

enum State<T, E> {
    Open(HashMap<u64, (Continuation<T>, Continuation<E>)>),
    Closed(Result<T, E>),
}

/// A task that can be completed from the outside, any number of times
/// subscribed to, and delivers the same (cloned) result to every
/// subscriber once it settles.
///
/// `E: Cancellable` is what lets a subscriber cancel independently of the
/// others: a cancelled subscriber is handed a synthetic `E::cancelled()`
/// failure and dropped from the bookkeeping, while everyone else still gets
/// the promise's real result whenever it arrives.
pub struct Promise<T, E> {
    state: Mutex<State<T, E>>,
    next_id: AtomicU64,
    self_weak: Weak<Promise<T, E>>,
}

impl<T, E> Promise<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + Cancellable + 'static,
{
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            state: Mutex::new(State::Open(HashMap::new())),
            next_id: AtomicU64::new(0),
            self_weak: weak.clone(),
        })
    }

    /// Settle the promise with a success value. No-op if already settled.
    pub fn succeed(&self, value: T) {
        self.complete(Ok(value));
    }

    /// Settle the promise with a failure. No-op if already settled.
    pub fn fail(&self, error: E) {
        self.complete(Err(error));
    }

    /// Settle the promise. First call wins — later calls, from any thread,
    /// are silently dropped, which is the promise-level analogue of a leaf
    /// task's "exactly one result" rule.
    pub fn complete(&self, result: Result<T, E>) {
        let subscribers = {
            let mut state = self.state.lock();
            if matches!(&*state, State::Closed(_)) {
                return;
            }
            let previous = std::mem::replace(&mut *state, State::Closed(result.clone()));
            match previous {
                State::Open(subs) => subs,
                State::Closed(_) => unreachable!("checked above"),
            }
        };
        tracing::debug!(
            subscriber_count = subscribers.len(),
            settled_ok = result.is_ok(),
            "task-core: promise settling"
        );
        for (_, (on_success, on_failure)) in subscribers {
            match result.clone() {
                Ok(v) => on_success(v),
                Err(e) => on_failure(e),
            }
        }
    }

    fn cancel_subscriber(&self, id: u64) {
        let removed = {
            let mut state = self.state.lock();
            match &mut *state {
                State::Open(subs) => subs.remove(&id),
                State::Closed(_) => None,
            }
        };
        if let Some((_, on_failure)) = removed {
            on_failure(E::cancelled());
        }
    }
}

impl<T, E> Task<T, E> for Promise<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + Cancellable + 'static,
{
    fn start(&self, on_success: Continuation<T>, on_failure: Continuation<E>) -> Canceller {
        let mut state = self.state.lock();
        match &mut *state {
            State::Closed(result) => {
                let result = result.clone();
                drop(state);
                match result {
                    Ok(v) => on_success(v),
                    Err(e) => on_failure(e),
                }
                noop_canceller()
            },
            State::Open(subs) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                subs.insert(id, (on_success, on_failure));
                drop(state);
                let weak = self.self_weak.clone();
                Box::new(move || {
                    if let Some(promise) = weak.upgrade() {
                        promise.cancel_subscriber(id);
                    }
                })
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskError;
    use std::sync::mpsc;

    #[test]
    fn late_subscriber_gets_the_memoized_result() {
        let promise: Arc<Promise<i32, TaskError<String>>> = Promise::new();
        promise.succeed(41);
        let (tx, rx) = mpsc::channel();
        promise.start(Box::new(move |v| tx.send(v).unwrap()), Box::new(|_| {}));
        assert_eq!(rx.recv().unwrap(), 41);
    }

    #[test]
    fn every_subscriber_gets_the_result() {
        let promise: Arc<Promise<i32, TaskError<String>>> = Promise::new();
        let (tx1, rx1) = mpsc::channel();
        let (tx2, rx2) = mpsc::channel();
        promise.start(Box::new(move |v| tx1.send(v).unwrap()), Box::new(|_| {}));
        promise.start(Box::new(move |v| tx2.send(v).unwrap()), Box::new(|_| {}));
        promise.succeed(7);
        assert_eq!(rx1.recv().unwrap(), 7);
        assert_eq!(rx2.recv().unwrap(), 7);
    }

    #[test]
    fn second_complete_is_ignored() {
        let promise: Arc<Promise<i32, TaskError<String>>> = Promise::new();
        promise.succeed(1);
        promise.succeed(2);
        let (tx, rx) = mpsc::channel();
        promise.start(Box::new(move |v| tx.send(v).unwrap()), Box::new(|_| {}));
        assert_eq!(rx.recv().unwrap(), 1);
    }

    #[test]
    fn cancelling_a_subscriber_delivers_a_synthetic_cancellation_only_to_it() {
        let promise: Arc<Promise<i32, TaskError<String>>> = Promise::new();
        let (tx1, rx1) = mpsc::channel();
        let (tx2, rx2) = mpsc::channel();
        let cancel1 = promise.start(
            Box::new(|_| panic!("should not succeed")),
            Box::new(move |e| tx1.send(e).unwrap()),
        );
        promise.start(Box::new(move |v| tx2.send(v).unwrap()), Box::new(|_| {}));
        cancel1();
        assert!(matches!(rx1.recv().unwrap(), TaskError::Cancelled));
        promise.succeed(99);
        assert_eq!(rx2.recv().unwrap(), 99);
    }
}
