use thiserror::Error;

use crate::NodeId;

/// Errors raised by document mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
	/// The node was removed or never existed.
	#[error("node {0} does not exist")]
	UnknownNode(NodeId),

	/// The root can be edited but never removed.
	#[error("the document root cannot be removed")]
	RootRemoval,

	/// Insertion index past the end of the child list.
	#[error("child index {index} out of bounds for node {parent} with {len} children")]
	ChildIndex { parent: NodeId, index: usize, len: usize },
}

/// Result type for document operations.
pub type Result<T> = std::result::Result<T, DocumentError>;
