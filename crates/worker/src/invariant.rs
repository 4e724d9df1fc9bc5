//! Fatal invariant checks with a pluggable failure handler.
//!
//! Programming errors (wrong execution context, protocol misuse) are routed
//! through [`Invariants::check`]. The default handler logs and aborts the
//! process; harnesses install a handler that records and ignores instead.

use std::panic::Location;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::context::{self, ContextKind};

/// One failed invariant check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
	pub message: String,
	pub location: &'static Location<'static>,
	pub context: Option<ContextKind>,
}

impl std::fmt::Display for Violation {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{} at {}", self.message, self.location)
	}
}

/// What to do after a violation has been reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationAction {
	/// Abort the process.
	Abort,
	/// Panic on the violating thread.
	Panic,
	/// Let the caller continue; the check returns `false`.
	IgnoreOnce,
	/// Continue, and never report this call site again.
	IgnoreAll,
}

/// Decides how a violation is handled.
pub trait InvariantHandler: Send + Sync {
	fn on_violation(&self, violation: &Violation) -> ViolationAction;
}

/// Default handler: logs the violation and aborts.
#[derive(Debug, Default)]
pub struct AbortHandler;

impl InvariantHandler for AbortHandler {
	fn on_violation(&self, _violation: &Violation) -> ViolationAction {
		ViolationAction::Abort
	}
}

/// Records every violation and lets execution continue.
#[derive(Debug, Default)]
pub struct RecordingHandler {
	seen: Mutex<Vec<Violation>>,
}

impl RecordingHandler {
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns all violations recorded so far.
	pub fn violations(&self) -> Vec<Violation> {
		self.seen.lock().clone()
	}

	pub fn is_empty(&self) -> bool {
		self.seen.lock().is_empty()
	}
}

impl InvariantHandler for RecordingHandler {
	fn on_violation(&self, violation: &Violation) -> ViolationAction {
		self.seen.lock().push(violation.clone());
		ViolationAction::IgnoreOnce
	}
}

/// Cloneable invariant checker shared by every context of one session.
#[derive(Clone)]
pub struct Invariants {
	handler: Arc<dyn InvariantHandler>,
	ignored: Arc<Mutex<Vec<&'static Location<'static>>>>,
}

impl Default for Invariants {
	fn default() -> Self {
		Self::new(Arc::new(AbortHandler))
	}
}

impl std::fmt::Debug for Invariants {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Invariants").field("ignored", &self.ignored.lock().len()).finish_non_exhaustive()
	}
}

impl Invariants {
	pub fn new(handler: Arc<dyn InvariantHandler>) -> Self {
		Self {
			handler,
			ignored: Arc::new(Mutex::new(Vec::new())),
		}
	}

	/// Returns `cond`, reporting a violation at the caller's location when it is false.
	#[track_caller]
	pub fn check(&self, cond: bool, message: impl FnOnce() -> String) -> bool {
		if cond {
			return true;
		}
		self.report(message(), Location::caller());
		false
	}

	/// Requires the calling thread to be tagged with `kind`.
	#[track_caller]
	pub fn expect_context(&self, kind: ContextKind) -> bool {
		let current = context::current();
		self.check(current == Some(kind), || {
			format!("expected {kind} context, running on {}", current.map_or("untagged", ContextKind::as_str))
		})
	}

	/// Requires the calling thread not to be tagged with `kind`.
	#[track_caller]
	pub fn forbid_context(&self, kind: ContextKind, what: &str) -> bool {
		self.check(!context::is_current(kind), || format!("{what} must not run on the {kind} context"))
	}

	/// Reports an unconditional violation.
	#[track_caller]
	pub fn fail(&self, message: impl Into<String>) {
		self.report(message.into(), Location::caller());
	}

	fn report(&self, message: String, location: &'static Location<'static>) {
		if self.ignored.lock().contains(&location) {
			tracing::debug!(%location, message, "invariant.ignored");
			return;
		}

		let violation = Violation {
			message,
			location,
			context: context::current(),
		};
		tracing::error!(
			%location,
			context = violation.context.map_or("untagged", ContextKind::as_str),
			message = %violation.message,
			"invariant violated"
		);

		match self.handler.on_violation(&violation) {
			ViolationAction::Abort => std::process::abort(),
			ViolationAction::Panic => panic!("invariant violated: {violation}"),
			ViolationAction::IgnoreOnce => {}
			ViolationAction::IgnoreAll => self.ignored.lock().push(location),
		}
	}
}
