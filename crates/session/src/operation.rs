use quill_document::{DocumentError, DocumentWrite};
use thiserror::Error;

/// A unit of document mutation.
///
/// Operations are resolved from gestures (or queued directly) and invoked on
/// the worker with the only write handle, while every daemon is paused.
pub trait Operation: Send {
	/// Human-readable description, shown while the operation is offered and
	/// reported when it begins and ends.
	fn description(&self) -> String;

	/// Applies the mutation. Changes made before an error are kept.
	fn invoke(&mut self, document: &mut DocumentWrite<'_>) -> Result<(), OperationError>;
}

/// Why an operation failed; its `Display` is what the end event reports.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationError {
	#[error(transparent)]
	Document(#[from] DocumentError),

	#[error("{0}")]
	Failed(String),
}

impl OperationError {
	pub fn failed(message: impl Into<String>) -> Self {
		Self::Failed(message.into())
	}
}
