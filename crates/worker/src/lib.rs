//! Execution-context plumbing shared by the quill crates.
//!
//! * [`context`]: per-thread tags for the worker, scheduler and daemon
//!   contexts, used for affinity checks at API entry.
//! * [`spawn_context_thread`] / [`spawn_context_loop`]: dedicated threads that
//!   carry their context tag for their whole lifetime.
//! * [`Invariants`]: fatal checks with a configurable handler.
//! * [`GenerationClock`] / [`GenerationToken`]: generation-scoped cancellation.

pub mod context;
mod invariant;
mod panic;
mod spawn;
mod token;

pub use context::ContextKind;
pub use invariant::{AbortHandler, InvariantHandler, Invariants, RecordingHandler, Violation, ViolationAction};
pub use panic::{join_error_panic_message, panic_message};
pub use spawn::{context_runtime, spawn_context_loop, spawn_context_thread};
pub use token::{GenerationClock, GenerationToken};
