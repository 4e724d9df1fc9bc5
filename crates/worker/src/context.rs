use std::cell::Cell;

/// Logical execution contexts a quill thread can belong to.
///
/// Every thread spawned through [`crate::spawn_context_thread`] is tagged with
/// its context so API entry points can check affinity. Host threads that only
/// submit contacts stay untagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKind {
	/// The single document-owning worker.
	Worker,
	/// The single daemon scheduler that owns registry writes.
	Scheduler,
	/// A daemon pool thread, for the duration of one compute step.
	Daemon,
}

impl ContextKind {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Worker => "worker",
			Self::Scheduler => "scheduler",
			Self::Daemon => "daemon",
		}
	}
}

impl std::fmt::Display for ContextKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

thread_local! {
	static CURRENT: Cell<Option<ContextKind>> = const { Cell::new(None) };
}

/// Returns the context the calling thread is tagged with, if any.
pub fn current() -> Option<ContextKind> {
	CURRENT.with(Cell::get)
}

/// Returns true when the calling thread is tagged with `kind`.
pub fn is_current(kind: ContextKind) -> bool {
	current() == Some(kind)
}

/// Tags the calling thread with `kind` until the guard drops.
///
/// Guards nest: dropping one restores whatever tag was active before it.
pub fn enter(kind: ContextKind) -> ContextGuard {
	let previous = CURRENT.with(|cell| cell.replace(Some(kind)));
	tracing::trace!(context = kind.as_str(), "context.enter");
	ContextGuard { previous }
}

/// Restores the previous context tag on drop.
#[must_use = "the context tag is removed as soon as the guard drops"]
#[derive(Debug)]
pub struct ContextGuard {
	previous: Option<ContextKind>,
}

impl Drop for ContextGuard {
	fn drop(&mut self) {
		CURRENT.with(|cell| cell.set(self.previous));
	}
}
