use quill_worker::{ContextKind, Invariants};
use thiserror::Error;

use super::{Contact, Hit, HitList, OperationProvider, ResolveContext, Status};
use crate::Operation;

/// A contact that is not valid in the current status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GestureError {
	#[error("{contact:?} contact received while {status}")]
	UnexpectedContact { contact: Contact, status: Status },
}

/// What the worker should do after feeding the resolver a contact.
pub enum Step {
	/// Nothing observable changed.
	Unchanged,
	/// Publish the status and the current candidate's description.
	Report { status: Status, description: Option<String> },
	/// The gesture ended in `Running`: invoke the operation if there is one,
	/// then call [`GestureResolver::finish`].
	Commit { operation: Option<Box<dyn Operation>> },
}

impl std::fmt::Debug for Step {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Unchanged => f.write_str("Unchanged"),
			Self::Report { status, description } => f
				.debug_struct("Report")
				.field("status", status)
				.field("description", description)
				.finish(),
			Self::Commit { operation } => f
				.debug_struct("Commit")
				.field("operation", &operation.as_ref().map(|operation| operation.description()))
				.finish(),
		}
	}
}

/// Hit accumulation and the status machine.
///
/// Every contact must be fed from the worker context; a contact arriving on
/// any other thread is reported through `invariants`.
#[derive(Debug)]
pub struct GestureResolver<H> {
	hits: HitList<H>,
	status: Status,
	invariants: Invariants,
}

impl<H: Hit> GestureResolver<H> {
	pub fn new(invariants: Invariants) -> Self {
		Self {
			hits: HitList::new(),
			status: Status::None,
			invariants,
		}
	}

	pub fn status(&self) -> Status {
		self.status
	}

	pub fn hits(&self) -> &HitList<H> {
		&self.hits
	}

	/// Pointer moved with no button held.
	///
	/// Restarts the gesture on `hit`. Repeating the single hit already being
	/// glanced at is a no-op, so the hover timer keeps running.
	#[track_caller]
	pub fn glance(&mut self, hit: Option<H>, provider: &dyn OperationProvider<H>, cx: &ResolveContext<'_>) -> Result<Step, GestureError> {
		self.invariants.expect_context(ContextKind::Worker);
		self.expect_one_of(Contact::Glance, &[Status::None, Status::Glancing, Status::Hovering])?;

		if let Some(hit) = &hit
			&& matches!(self.status, Status::Glancing | Status::Hovering)
			&& self.hits.is_only(hit)
		{
			tracing::trace!(status = %self.status, "gesture.glance.coalesced");
			return Ok(Step::Unchanged);
		}

		self.status = if hit.is_some() { Status::Glancing } else { Status::None };
		self.hits.restart(hit);
		Ok(self.report(provider, cx))
	}

	/// The hover delay elapsed without another glance.
	///
	/// A timer that fires after the status moved on is stale and ignored.
	#[track_caller]
	pub fn hover_elapsed(&mut self, provider: &dyn OperationProvider<H>, cx: &ResolveContext<'_>) -> Step {
		self.invariants.expect_context(ContextKind::Worker);
		if self.status != Status::Glancing {
			tracing::trace!(status = %self.status, "gesture.hover.stale");
			return Step::Unchanged;
		}
		self.status = Status::Hovering;
		self.report(provider, cx)
	}

	/// Button pressed. Valid in any status.
	#[track_caller]
	pub fn first(&mut self, hit: Option<H>, provider: &dyn OperationProvider<H>, cx: &ResolveContext<'_>) -> Step {
		self.invariants.expect_context(ContextKind::Worker);
		if hit.is_none() {
			tracing::debug!("gesture.first.without_hit");
		}
		self.status = Status::Pending;
		self.hits.restart(hit);
		self.report(provider, cx)
	}

	/// Pointer moved with the button held.
	#[track_caller]
	pub fn next(&mut self, hit: Option<H>, provider: &dyn OperationProvider<H>, cx: &ResolveContext<'_>) -> Result<Step, GestureError> {
		self.invariants.expect_context(ContextKind::Worker);
		self.expect_one_of(Contact::Next, &[Status::Pending])?;
		// A press that started off any hit ignores the rest of the drag.
		if self.hits.is_empty() {
			return Ok(Step::Unchanged);
		}
		self.hits.push(hit);
		Ok(self.report(provider, cx))
	}

	/// Button released. Resolves one final time and moves to `Running`.
	#[track_caller]
	pub fn last(&mut self, hit: Option<H>, provider: &dyn OperationProvider<H>, cx: &ResolveContext<'_>) -> Result<Step, GestureError> {
		self.invariants.expect_context(ContextKind::Worker);
		self.expect_one_of(Contact::Last, &[Status::Pending])?;
		if self.hits.is_empty() {
			self.status = Status::None;
			return Ok(Step::Report {
				status: Status::None,
				description: None,
			});
		}
		self.hits.push(hit);
		let operation = self.candidate(provider, cx);
		self.status = Status::Running;
		tracing::debug!(
			hits = self.hits.len(),
			operation = operation.as_ref().map(|operation| operation.description()).as_deref(),
			"gesture.commit"
		);
		Ok(Step::Commit { operation })
	}

	/// Ends a committed gesture.
	#[track_caller]
	pub fn finish(&mut self) -> Step {
		self.invariants.expect_context(ContextKind::Worker);
		self.hits.clear();
		self.status = Status::None;
		Step::Report {
			status: Status::None,
			description: None,
		}
	}

	/// Candidate operation for the current hits, in resolution order.
	#[track_caller]
	pub fn resolve(&self, provider: &dyn OperationProvider<H>, cx: &ResolveContext<'_>) -> Option<Box<dyn Operation>> {
		self.invariants.expect_context(ContextKind::Worker);
		self.candidate(provider, cx)
	}

	fn candidate(&self, provider: &dyn OperationProvider<H>, cx: &ResolveContext<'_>) -> Option<Box<dyn Operation>> {
		if self.hits.is_empty() {
			return None;
		}
		if let Some(operation) = provider.operation_for_stroke(self.hits.as_slice(), cx) {
			return Some(operation);
		}
		if let Some((first, last)) = self.hits.ends() {
			let operation = if first == last {
				provider.operation_for_repress(first, cx)
			} else {
				provider.operation_for_line(first, last, cx)
			};
			if operation.is_some() {
				return operation;
			}
		}
		provider.operation_for_press(self.hits.single()?, cx)
	}

	fn report(&self, provider: &dyn OperationProvider<H>, cx: &ResolveContext<'_>) -> Step {
		let description = self.candidate(provider, cx).map(|operation| operation.description());
		tracing::trace!(status = %self.status, hits = self.hits.len(), description = description.as_deref(), "gesture.resolve");
		Step::Report {
			status: self.status,
			description,
		}
	}

	fn expect_one_of(&self, contact: Contact, allowed: &[Status]) -> Result<(), GestureError> {
		if allowed.contains(&self.status) {
			return Ok(());
		}
		Err(GestureError::UnexpectedContact {
			contact,
			status: self.status,
		})
	}
}
