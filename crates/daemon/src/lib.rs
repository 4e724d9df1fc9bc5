//! Background daemons over a shared document.
//!
//! A daemon is a computation keyed by its type and a [`Descriptor`]. Any
//! context asks for its data through [`SchedulerHandle::request_snapshot`],
//! which either serves the published [`Snapshot`] or queues the daemon's
//! creation and returns `None`. The scheduler thread owns every registry
//! write; daemon steps run on its blocking pool, one step at a time per
//! daemon, reading the document through the daemon's own observer.
//!
//! Mutations are bracketed by [`SchedulerHandle::pause_all`] and
//! [`SchedulerHandle::resume_valid_and_discard_invalid`]: the first returns
//! once no step is executing, the second evicts every daemon whose observer
//! was blinded by the mutation and lets the rest continue.

mod config;
mod daemon;
mod descriptor;
mod error;
mod record;
mod scheduler;
mod slot;

pub use config::DaemonConfig;
pub use daemon::{CreateContext, Daemon, DaemonStatus, StepContext};
pub use descriptor::{AnyDescriptor, Descriptor};
pub use error::SchedulerError;
pub use record::{DaemonRecord, ResumeReport};
pub use scheduler::{Scheduler, SchedulerHandle};
pub use slot::{DaemonState, Snapshot};
