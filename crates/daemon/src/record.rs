use std::time::Duration;

use crate::DaemonState;

/// Diagnostic view of one registry entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonRecord {
	/// Daemon type name without its module path.
	pub daemon: &'static str,
	/// `Debug` rendering of the descriptor.
	pub descriptor: String,
	pub state: DaemonState,
	/// Number of versions published so far.
	pub version: u64,
	/// Time spent constructing and stepping this instance.
	pub compute: Duration,
	/// Time since the entry was last requested.
	pub idle: Duration,
	pub needs_requeue: bool,
	pub blinded: bool,
}

/// Counts returned by [`crate::SchedulerHandle::resume_valid_and_discard_invalid`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResumeReport {
	/// Entries dropped because their observer was blinded.
	pub evicted: usize,
	/// Entries left in the registry.
	pub live: usize,
}
