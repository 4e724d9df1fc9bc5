use quill_worker::ContextKind;
use thiserror::Error;

/// Errors returned by scheduler round-trips.
#[derive(Debug, Error)]
pub enum SchedulerError {
	/// The scheduler thread could not be started.
	#[error("failed to spawn the scheduler thread: {0}")]
	Spawn(#[from] std::io::Error),

	/// The scheduler has shut down; no reply will come.
	#[error("daemon scheduler is closed")]
	Closed,

	/// A blocking round-trip was attempted from a context that would deadlock.
	#[error("{operation} cannot be called from the {context} context")]
	WrongContext { operation: &'static str, context: ContextKind },
}
