//! Operation executor.
//!
//! Every document mutation goes through [`Executor::invoke`], which brackets
//! it with a daemon pause so no step ever observes a half-applied operation.
//!
//! # Execution Phases
//!
//! 1. Announce: publish [`SessionEvent::OperationBegin`] with the description
//! 2. Pause: wait until no daemon step is executing
//! 3. Mutate: invoke the operation on the only write handle; dropping the
//!    handle commits and blinds every observer whose reads were touched
//! 4. Resume: evict blinded daemons, restart the rest
//! 5. Report: publish [`SessionEvent::OperationEnd`] exactly once

use std::time::Instant;

use quill_daemon::SchedulerHandle;
use quill_document::Document;
use quill_worker::{ContextKind, Invariants};

use crate::events::EventSink;
use crate::{Operation, SessionEvent};

#[derive(Debug, Clone)]
pub(crate) struct Executor {
	scheduler: SchedulerHandle,
	events: EventSink,
	invariants: Invariants,
}

impl Executor {
	pub(crate) fn new(scheduler: SchedulerHandle, events: EventSink, invariants: Invariants) -> Self {
		Self {
			scheduler,
			events,
			invariants,
		}
	}

	/// Runs `operation` against `document`. Returns whether it succeeded.
	///
	/// A failed operation keeps whatever it changed before failing; the
	/// resume still runs so those changes invalidate dependent daemons.
	pub(crate) async fn invoke(&self, document: &mut Document, mut operation: Box<dyn Operation>) -> bool {
		self.invariants.expect_context(ContextKind::Worker);

		let description = operation.description();
		let started = Instant::now();
		tracing::info!(operation = %description, version = document.version(), "operation.begin");
		self.events.publish(SessionEvent::OperationBegin {
			description: description.clone(),
		});

		// A closed scheduler has no steps left to pause.
		if let Err(err) = self.scheduler.pause_all().await {
			tracing::warn!(operation = %description, error = %err, "operation.pause");
		}

		let result = {
			let mut write = document.write();
			let result = operation.invoke(&mut write);
			tracing::debug!(touched = write.touched(), ok = result.is_ok(), "operation.invoke");
			result
		};

		match self.scheduler.resume_valid_and_discard_invalid().await {
			Ok(report) => tracing::debug!(evicted = report.evicted, live = report.live, "operation.resume"),
			Err(err) => tracing::warn!(operation = %description, error = %err, "operation.resume"),
		}

		let (success, message) = match result {
			Ok(()) => (true, format!("{description} completed successfully.")),
			Err(err) => {
				tracing::warn!(operation = %description, error = %err, "operation.failed");
				(false, err.to_string())
			}
		};
		tracing::info!(
			operation = %description,
			success,
			version = document.version(),
			elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
			"operation.end"
		);
		self.events.publish(SessionEvent::OperationEnd { success, description: message });
		success
	}
}
