//! Gesture resolution.
//!
//! Contacts arrive as [`Contact`] kinds carrying an optional hit. The
//! [`GestureResolver`] accumulates them into a [`HitList`], tracks the
//! interaction [`Status`], and asks an [`OperationProvider`] what the
//! accumulated gesture means.
//!
//! # Status machine
//!
//! ```text
//! None -> Glancing -> Hovering -> Pending -> Running -> None
//!            ^___________|          ^
//!  (any) ---- First ----------------|
//! ```
//!
//! # Resolution order
//!
//! The first interpretation the provider offers wins:
//!
//! 1. a stroke over every hit;
//! 2. with two or more hits whose ends are both hits: a repress when the ends
//!    are equal, a line from first to last otherwise;
//! 3. a press on a single hit.

mod hits;
mod resolver;

use std::fmt::Debug;

pub use hits::HitList;
use quill_daemon::SchedulerHandle;
use quill_document::DocumentReader;
pub use resolver::{GestureError, GestureResolver, Step};

use crate::Operation;

/// A located contact. Equality is structural.
pub trait Hit: Clone + PartialEq + Debug + Send + 'static {}

impl<T> Hit for T where T: Clone + PartialEq + Debug + Send + 'static {}

/// Kind of pointer contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Contact {
	/// Pointer moved with no button held.
	Glance,
	/// Button pressed.
	First,
	/// Pointer moved with the button held.
	Next,
	/// Button released.
	Last,
}

/// Interaction status owned by the resolver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Status {
	#[default]
	None,
	Glancing,
	Hovering,
	Pending,
	Running,
}

impl Status {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::None => "none",
			Self::Glancing => "glancing",
			Self::Hovering => "hovering",
			Self::Pending => "pending",
			Self::Running => "running",
		}
	}
}

impl std::fmt::Display for Status {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// What the host can consult while resolving: the document and the daemons.
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
	pub document: &'a DocumentReader,
	pub scheduler: &'a SchedulerHandle,
}

/// Host capability mapping gestures to operations.
///
/// Called synchronously on the worker. Every method defaults to offering
/// nothing, so hosts implement only the interpretations they support.
pub trait OperationProvider<H>: Send + 'static {
	/// The whole hit sequence, discontinuity markers included.
	fn operation_for_stroke(&self, _hits: &[Option<H>], _cx: &ResolveContext<'_>) -> Option<Box<dyn Operation>> {
		None
	}

	/// A single hit.
	fn operation_for_press(&self, _hit: &H, _cx: &ResolveContext<'_>) -> Option<Box<dyn Operation>> {
		None
	}

	/// A gesture that left and came back to the same hit.
	fn operation_for_repress(&self, _hit: &H, _cx: &ResolveContext<'_>) -> Option<Box<dyn Operation>> {
		None
	}

	/// A gesture from one hit to a different one.
	fn operation_for_line(&self, _first: &H, _last: &H, _cx: &ResolveContext<'_>) -> Option<Box<dyn Operation>> {
		None
	}
}
