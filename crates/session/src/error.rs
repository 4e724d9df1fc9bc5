use quill_daemon::SchedulerError;
use thiserror::Error;

/// Errors from the session API.
#[derive(Debug, Error)]
pub enum SessionError {
	/// The worker thread could not be started.
	#[error("failed to spawn the worker thread: {0}")]
	Spawn(#[from] std::io::Error),

	#[error(transparent)]
	Scheduler(#[from] SchedulerError),

	/// The worker has shut down.
	#[error("session is closed")]
	Closed,
}
