//! The task contract: a re-runnable, callable value that delivers exactly one
//! result by invoking a success or a failure continuation and returns a
//! canceller.

use std::sync::Arc;

/// Delivers a task's single terminal result. Boxed as `FnOnce` so the type
/// system enforces "at most once" for every continuation this crate hands to
/// a task author — there is no way to call the same boxed closure twice.
pub type Continuation<T> = Box<dyn FnOnce(T) + Send + 'static>;

/// Requests cooperative termination. Unlike [`Continuation`], a canceller is
/// `Fn` rather than `FnOnce`: callers are allowed (and expected) to invoke it
/// more than once, and every canceller produced by this crate treats the
/// second and later calls as no-ops.
pub type Canceller = Box<dyn Fn() + Send + Sync + 'static>;

/// A canceller that does nothing, for leaves that complete synchronously and
/// have nothing left to cancel by the time they return one.
pub fn noop_canceller() -> Canceller {
    Box::new(|| {})
}

/// The universal task shape: start the computation, deliver its result to
/// exactly one of `on_success`/`on_failure`, and hand back a canceller.
///
/// `start` takes `&self` rather than consuming the task, which is what makes
/// a task value re-runnable: calling `start` twice begins two independent
/// executions sharing only whatever state the task's constructor captured by
/// value (typically nothing mutable).
pub trait Task<T, E>: Send + Sync + 'static {
    fn start(&self, on_success: Continuation<T>, on_failure: Continuation<E>) -> Canceller;
}

impl<T, E, F> Task<T, E> for F
where
    F: Fn(Continuation<T>, Continuation<E>) -> Canceller + Send + Sync + 'static,
{
    fn start(&self, on_success: Continuation<T>, on_failure: Continuation<E>) -> Canceller {
        (self)(on_success, on_failure)
    }
}

/// A task value, type-erased. This is what gets passed around and composed;
/// cloning it (cheap, an `Arc` bump) gives another handle to the same
/// re-runnable description of work.
pub type DynTask<T, E> = Arc<dyn Task<T, E>>;

/// Build a [`DynTask`] directly from a `start`-shaped closure.
pub fn from_fn<T, E, F>(f: F) -> DynTask<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
    F: Fn(Continuation<T>, Continuation<E>) -> Canceller + Send + Sync + 'static,
{
    Arc::new(f)
}
