//! Versioned document tree shared between one writer and many readers.
//!
//! The [`Document`] owns the only write handle. Readers take the shared lock
//! through a [`DocumentReader`]; a reader bound to an [`Observer`] records
//! every node it resolves. A committed write blinds each observer whose
//! recorded reads intersect the nodes it touched, which is how background
//! computations learn that their results went stale.
//!
//! Touch rules:
//! - changing a node's text or label touches that node;
//! - inserting a child touches the parent;
//! - removing a subtree touches the parent and every removed node.

mod document;
mod error;
mod node;
mod observer;
mod store;
mod tree;

pub use document::{Document, DocumentRead, DocumentReader, DocumentWrite};
pub use error::{DocumentError, Result};
pub use node::{NodeId, NodeRef};
pub use observer::Observer;
pub use tree::Tree;
