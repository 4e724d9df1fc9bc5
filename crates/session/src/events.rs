use tokio::sync::broadcast;

use crate::Status;

/// Notifications published by the worker, in the order they were raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
	/// The gesture status changed or its candidate was re-resolved.
	/// `description` is `None` when no operation is offered.
	StatusChanged { status: Status, description: Option<String> },
	/// An operation is about to run.
	OperationBegin { description: String },
	/// An operation finished. Raised exactly once per begin.
	OperationEnd { success: bool, description: String },
	/// Throttled "redraw now" signal.
	Refresh { status: Status },
}

/// Publishing side of the session's event channel.
#[derive(Debug, Clone)]
pub(crate) struct EventSink {
	tx: broadcast::Sender<SessionEvent>,
}

impl EventSink {
	pub(crate) fn new(capacity: usize) -> Self {
		let (tx, _) = broadcast::channel(capacity.max(1));
		Self { tx }
	}

	pub(crate) fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
		self.tx.subscribe()
	}

	pub(crate) fn publish(&self, event: SessionEvent) {
		tracing::trace!(?event, receivers = self.tx.receiver_count(), "session.event");
		// No subscribers is fine; presentation may attach later.
		let _ = self.tx.send(event);
	}
}
