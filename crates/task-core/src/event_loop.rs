//! The shared building block behind every combinator and leaf that must
//! coordinate more than one asynchronous thing at once ([`Promise`],
//! [`crate::join`], [`crate::race`], [`crate::leaf::timeout`]).
//!
//! Two problems recur in every one of those: callbacks can arrive from
//! several executor threads concurrently (two racers finishing back to
//! back, a timer firing the same instant a value arrives) and a result must
//! still be delivered at most once. [`EventLoop`] is a private single-writer
//! FIFO queue that serializes arbitrary work onto one logical thread of
//! control at a time; [`boot`]/[`boot_via`] wrap it into the [`Task`]
//! contract, mirroring the spec's own `task`/`task-via` helper.
//!
//! [`Promise`]: crate::promise::Promise

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::contract::{Canceller, Continuation, DynTask, Task};
use crate::executor::{DefaultExecutor, DynExecutor, Job};

type Thunk = Box<dyn FnOnce() + Send + 'static>;

enum PumpState {
    /// No thunk is running and the queue is empty.
    Idle,
    /// A pump is actively draining the queue on some executor thread.
    Pumping,
    /// Cancelled or settled; further enqueues are dropped silently.
    Terminated,
}

struct Inner {
    queue: VecDeque<Thunk>,
    mode: PumpState,
}

/// A private single-writer FIFO. Enqueued thunks run one at a time, in
/// submission order, never concurrently with each other — the serialization
/// guarantee every combinator in this crate leans on instead of taking its
/// own locks per call site.
pub struct EventLoop {
    executor: DynExecutor,
    inner: Mutex<Inner>,
}

impl EventLoop {
    pub fn new(executor: DynExecutor) -> Arc<Self> {
        Arc::new(Self {
            executor,
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                mode: PumpState::Idle,
            }),
        })
    }

    /// Enqueue `job`. The first enqueue into an idle loop submits a pump to
    /// the executor; later enqueues while a pump is already running just
    /// extend its queue — this is the "0 -> 1 transition submits, already
    /// running just extends" rule that keeps exactly one pump active.
    pub fn enqueue(self: &Arc<Self>, job: Thunk) {
        let mut inner = self.inner.lock();
        if matches!(inner.mode, PumpState::Terminated) {
            tracing::trace!("task-core: enqueue on a terminated loop, dropping");
            return;
        }
        inner.queue.push_back(job);
        if matches!(inner.mode, PumpState::Idle) {
            inner.mode = PumpState::Pumping;
            drop(inner);
            let this = Arc::clone(self);
            self.executor.spawn_compute(Box::new(move || this.pump()));
        }
    }

    fn pump(self: Arc<Self>) {
        loop {
            let job = {
                let mut inner = self.inner.lock();
                match inner.queue.pop_front() {
                    Some(job) => Some(job),
                    None => {
                        if !matches!(inner.mode, PumpState::Terminated) {
                            inner.mode = PumpState::Idle;
                        }
                        None
                    },
                }
            };
            match job {
                Some(job) => {
                    if let Err(panic) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(job)) {
                        tracing::debug!(?panic, "task-core: a queued thunk panicked, continuing the pump");
                    }
                },
                None => break,
            }
        }
    }

    /// Stop draining and discard anything still queued. Used once a task
    /// has settled or been cancelled: nothing enqueued after that point can
    /// matter, so there is no reason to keep running it.
    pub fn terminate(&self) {
        let mut inner = self.inner.lock();
        inner.mode = PumpState::Terminated;
        inner.queue.clear();
    }
}

/// What a booted task's body returns: work to run, via the loop, if the
/// task is cancelled before it settles.
pub type CancelHandler = Box<dyn FnOnce() + Send + 'static>;

/// Handed to a booted task's body. `run` schedules further work onto the
/// same serialized loop (the way a combinator schedules a child's
/// continuation); `succeed`/`fail` settle the task itself, at most once
/// no matter how many times or from how many threads they are called.
pub struct Handle<T, E> {
    loop_: Arc<EventLoop>,
    settled: Arc<Mutex<bool>>,
    on_success: Arc<Mutex<Option<Continuation<T>>>>,
    on_failure: Arc<Mutex<Option<Continuation<E>>>>,
}

impl<T, E> Clone for Handle<T, E> {
    fn clone(&self) -> Self {
        Self {
            loop_: Arc::clone(&self.loop_),
            settled: Arc::clone(&self.settled),
            on_success: Arc::clone(&self.on_success),
            on_failure: Arc::clone(&self.on_failure),
        }
    }
}

impl<T, E> Handle<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Schedule `job` onto this task's private loop.
    pub fn run<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.loop_.enqueue(Box::new(job));
    }

    pub fn succeed(&self, value: T) {
        self.settle(Ok(value));
    }

    pub fn fail(&self, error: E) {
        self.settle(Err(error));
    }

    fn settle(&self, result: Result<T, E>) {
        let settled = Arc::clone(&self.settled);
        let on_success = Arc::clone(&self.on_success);
        let on_failure = Arc::clone(&self.on_failure);
        let loop_ = Arc::clone(&self.loop_);
        self.loop_.enqueue(Box::new(move || {
            let mut guard = settled.lock();
            if *guard {
                return;
            }
            *guard = true;
            drop(guard);
            loop_.terminate();
            match result {
                Ok(v) => {
                    if let Some(s) = on_success.lock().take() {
                        s(v);
                    }
                },
                Err(e) => {
                    if let Some(f) = on_failure.lock().take() {
                        f(e);
                    }
                },
            }
        }));
    }
}

struct BootTask<T, E, F> {
    executor: DynExecutor,
    // Held behind an `Arc` (rather than inline) so `start`, which only gets
    // `&self`, can cheaply hand a `'static` handle of the body to the boot
    // thunk without borrowing `self` past the call.
    body: Arc<F>,
    _marker: std::marker::PhantomData<fn() -> (T, E)>,
}

impl<T, E, F> Task<T, E> for BootTask<T, E, F>
where
    T: Send + 'static,
    E: Send + 'static,
    F: Fn(Handle<T, E>) -> CancelHandler + Send + Sync + 'static,
{
    fn start(&self, on_success: Continuation<T>, on_failure: Continuation<E>) -> Canceller {
        let loop_ = EventLoop::new(Arc::clone(&self.executor));
        let settled = Arc::new(Mutex::new(false));
        let on_success = Arc::new(Mutex::new(Some(on_success)));
        let on_failure = Arc::new(Mutex::new(Some(on_failure)));
        let handle = Handle {
            loop_: Arc::clone(&loop_),
            settled: Arc::clone(&settled),
            on_success: Arc::clone(&on_success),
            on_failure: Arc::clone(&on_failure),
        };
        let cancel_handler: Arc<Mutex<Option<CancelHandler>>> = Arc::new(Mutex::new(None));

        let body = Arc::clone(&self.body);
        let body_cancel_handler = Arc::clone(&cancel_handler);
        let body_handle = handle.clone();
        loop_.enqueue(Box::new(move || {
            let handler = (body)(body_handle);
            *body_cancel_handler.lock() = Some(handler);
        }));

        let loop_for_cancel = Arc::clone(&loop_);
        Box::new(move || {
            let settled = Arc::clone(&settled);
            let on_success = Arc::clone(&on_success);
            let on_failure = Arc::clone(&on_failure);
            let cancel_handler = Arc::clone(&cancel_handler);
            let loop_for_termination = Arc::clone(&loop_for_cancel);
            loop_for_cancel.enqueue(Box::new(move || {
                let mut guard = settled.lock();
                if *guard {
                    return;
                }
                *guard = true;
                drop(guard);
                on_success.lock().take();
                on_failure.lock().take();
                if let Some(handler) = cancel_handler.lock().take() {
                    handler();
                }
                loop_for_termination.terminate();
            }));
        })
    }
}

/// Boot a task whose body and every continuation it schedules run
/// serialized through a private event loop submitted to `executor`.
pub fn boot_via<T, E, F>(executor: DynExecutor, body: F) -> DynTask<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
    F: Fn(Handle<T, E>) -> CancelHandler + Send + Sync + 'static,
{
    Arc::new(BootTask {
        executor,
        body: Arc::new(body),
        _marker: std::marker::PhantomData,
    })
}

/// [`boot_via`] against the ambient `tokio` runtime the caller is inside.
pub fn boot<T, E, F>(body: F) -> DynTask<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
    F: Fn(Handle<T, E>) -> CancelHandler + Send + Sync + 'static,
{
    boot_via(Arc::new(DefaultExecutor::current()), body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[tokio::test]
    async fn booted_task_delivers_success_once() {
        let task: DynTask<i32, String> = boot(|handle| {
            let settle_handle = handle.clone();
            handle.run(move || settle_handle.succeed(7));
            Box::new(|| {})
        });
        let (tx, rx) = mpsc::channel();
        let _cancel = task.start(
            Box::new(move |v| tx.send(v).unwrap()),
            Box::new(|_: String| panic!("should not fail")),
        );
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(rx.recv().unwrap(), 7);
    }

    #[tokio::test]
    async fn cancelling_before_settle_suppresses_success() {
        let task: DynTask<i32, String> = boot(|_handle| Box::new(|| {}));
        let (tx, rx) = mpsc::channel::<i32>();
        let cancel = task.start(
            Box::new(move |v| tx.send(v).unwrap()),
            Box::new(|_: String| {}),
        );
        cancel();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn booted_task_is_rerunnable() {
        let counter = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let task: DynTask<u32, String> = boot({
            let counter = Arc::clone(&counter);
            move |handle| {
                let n = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
                let settle_handle = handle.clone();
                handle.run(move || settle_handle.succeed(n));
                Box::new(|| {})
            }
        });
        let (tx1, rx1) = mpsc::channel();
        task.start(Box::new(move |v| tx1.send(v).unwrap()), Box::new(|_| {}));
        let (tx2, rx2) = mpsc::channel();
        task.start(Box::new(move |v| tx2.send(v).unwrap()), Box::new(|_| {}));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(rx1.recv().unwrap(), 1);
        assert_eq!(rx2.recv().unwrap(), 2);
    }
}
