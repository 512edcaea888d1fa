//! Continuation-passing tasks.
//!
//! A [`Task`] is a re-runnable, callable value that delivers exactly one
//! result — by invoking a success or a failure continuation — and hands
//! back a [`Canceller`]. Unlike a `Future`, a task does nothing on its own:
//! calling [`Task::start`] is what runs it, and calling it again runs it
//! again, independently.
//!
//! ```ignore
//! use task_core::{leaf, do_block};
//!
//! let greeting = leaf::success::<&str, String>("hello");
//! let value = do_block::block_on(leaf::success("hello"))?;
//! ```
//!
//! # Layout
//! - [`contract`] — the `Task` trait itself.
//! - [`error`] — [`error::TaskError`], the crate's one error currency.
//! - [`executor`] / [`scheduler`] — the two external collaborators every
//!   task eventually bottoms out on.
//! - [`event_loop`] — the private single-writer queue combinators use to
//!   serialize concurrent callbacks; exposed for anyone implementing a new
//!   leaf or combinator outside this crate.
//! - [`leaf`] — `success`, `failure`, `effect`, `effect_off`, `timeout`.
//! - [`promise`] — the completable, multi-subscriber task.
//! - [`do_block`] — `do_task`/`block_on`.
//! - [`join`] / [`race`] / [`sequence`] — the composite combinators.

pub mod contract;
pub mod do_block;
pub mod error;
pub mod event_loop;
pub mod executor;
pub mod join;
pub mod leaf;
pub mod promise;
pub mod race;
pub mod scheduler;
pub mod sequence;

pub use contract::{Canceller, Continuation, DynTask, Task, from_fn, noop_canceller};
pub use do_block::{JoinHandle, block_on, do_task};
pub use error::{BlockOnError, Cancellable, ExecutorBuildError, TTask, TaskError};
pub use event_loop::{CancelHandler, EventLoop, Handle, boot, boot_via};
pub use executor::{DefaultExecutor, DynExecutor, Executor, ExecutorConfig, Job};
pub use join::{join, join2, join3, join_with};
pub use leaf::{effect, effect_off, fail, failure, success, timeout, with_timeout};
pub use promise::Promise;
pub use race::race;
pub use scheduler::{DefaultScheduler, DynScheduler, Scheduler};
pub use sequence::{map, or_else, then};
