use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use rustc_hash::FxHashSet;

use crate::error::{DocumentError, Result};
use crate::store::Store;
use crate::{NodeId, NodeRef, Observer, Tree};

struct Shared {
	store: RwLock<Store>,
	observers: Mutex<Vec<Weak<Observer>>>,
}

impl Shared {
	fn register(&self, observer: &Arc<Observer>) {
		let mut observers = self.observers.lock();
		observers.retain(|weak| weak.strong_count() > 0);
		if !observers.iter().any(|weak| std::ptr::eq(weak.as_ptr(), Arc::as_ptr(observer))) {
			observers.push(Arc::downgrade(observer));
		}
	}
}

/// The mutable document tree and its single write handle.
///
/// `Document` is deliberately not `Clone`: whoever owns it is the only
/// context that can mutate the tree. Everyone else reads through a
/// [`DocumentReader`].
pub struct Document {
	shared: Arc<Shared>,
}

impl std::fmt::Debug for Document {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let store = self.shared.store.read();
		f.debug_struct("Document")
			.field("version", &store.version())
			.field("nodes", &store.len())
			.finish()
	}
}

impl Document {
	pub fn new(root: Tree) -> Self {
		Self {
			shared: Arc::new(Shared {
				store: RwLock::new(Store::new(root)),
				observers: Mutex::new(Vec::new()),
			}),
		}
	}

	/// Returns an unobserved reader sharing this document.
	pub fn reader(&self) -> DocumentReader {
		DocumentReader {
			shared: Arc::clone(&self.shared),
			observer: None,
		}
	}

	pub fn read(&self) -> DocumentRead<'_> {
		DocumentRead {
			store: self.shared.store.read(),
			observer: None,
		}
	}

	/// Takes the exclusive write lock.
	///
	/// All changes made through the returned handle are committed when it is
	/// dropped: the version is bumped and every observer whose read set
	/// intersects the touched nodes is blinded before any reader can see the
	/// new tree.
	pub fn write(&mut self) -> DocumentWrite<'_> {
		DocumentWrite {
			store: self.shared.store.write(),
			shared: &self.shared,
			touched: FxHashSet::default(),
			changed: false,
		}
	}

	pub fn version(&self) -> u64 {
		self.shared.store.read().version()
	}

	/// Number of live nodes. Only the owner may ask: no observer could be
	/// blinded by a count, so readers never see it.
	pub fn node_count(&self) -> usize {
		self.shared.store.read().len()
	}
}

/// Cloneable read access, optionally bound to an [`Observer`].
#[derive(Clone)]
pub struct DocumentReader {
	shared: Arc<Shared>,
	observer: Option<Arc<Observer>>,
}

impl std::fmt::Debug for DocumentReader {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("DocumentReader")
			.field("observer", &self.observer.as_ref().map(|observer| observer.id()))
			.finish_non_exhaustive()
	}
}

impl DocumentReader {
	/// Returns a reader that records every node it resolves into `observer`.
	pub fn observe(&self, observer: Arc<Observer>) -> DocumentReader {
		self.shared.register(&observer);
		DocumentReader {
			shared: Arc::clone(&self.shared),
			observer: Some(observer),
		}
	}

	/// Returns the same document without an observer binding.
	pub fn unobserved(&self) -> DocumentReader {
		DocumentReader {
			shared: Arc::clone(&self.shared),
			observer: None,
		}
	}

	pub fn observer(&self) -> Option<&Arc<Observer>> {
		self.observer.as_ref()
	}

	/// Takes the shared lock, recording reads into the bound observer if any.
	pub fn read(&self) -> DocumentRead<'_> {
		DocumentRead {
			store: self.shared.store.read(),
			observer: self.observer.as_deref(),
		}
	}

	/// Takes the shared lock, recording reads into `observer`.
	pub fn read_observed<'a>(&'a self, observer: &'a Arc<Observer>) -> DocumentRead<'a> {
		self.shared.register(observer);
		DocumentRead {
			store: self.shared.store.read(),
			observer: Some(observer),
		}
	}

	pub fn version(&self) -> u64 {
		self.shared.store.read().version()
	}

	/// Returns true when both readers share one document.
	pub fn same_document(&self, other: &DocumentReader) -> bool {
		Arc::ptr_eq(&self.shared, &other.shared)
	}
}

/// A consistent view of the tree, held under the shared lock.
pub struct DocumentRead<'a> {
	store: RwLockReadGuard<'a, Store>,
	observer: Option<&'a Observer>,
}

impl DocumentRead<'_> {
	pub fn root(&self) -> NodeRef<'_> {
		let root = self.store.root();
		match NodeRef::resolve(&self.store, self.observer, root) {
			Some(node) => node,
			None => unreachable!("document root {root} is always live"),
		}
	}

	pub fn node(&self, id: NodeId) -> Option<NodeRef<'_>> {
		NodeRef::resolve(&self.store, self.observer, id)
	}

	pub fn version(&self) -> u64 {
		self.store.version()
	}
}

/// Exclusive write access. Changes commit on drop.
pub struct DocumentWrite<'a> {
	store: RwLockWriteGuard<'a, Store>,
	shared: &'a Shared,
	touched: FxHashSet<NodeId>,
	changed: bool,
}

impl DocumentWrite<'_> {
	pub fn root(&self) -> NodeRef<'_> {
		let root = self.store.root();
		match NodeRef::resolve(&self.store, None, root) {
			Some(node) => node,
			None => unreachable!("document root {root} is always live"),
		}
	}

	pub fn node(&self, id: NodeId) -> Option<NodeRef<'_>> {
		NodeRef::resolve(&self.store, None, id)
	}

	/// Replaces a node's text and returns the previous one.
	pub fn set_text(&mut self, id: NodeId, text: Option<String>) -> Result<Option<String>> {
		let data = self.store.get_mut(id)?;
		if data.text == text {
			return Ok(text);
		}
		let old = std::mem::replace(&mut data.text, text);
		self.touch(id);
		Ok(old)
	}

	/// Replaces a node's label and returns the previous one.
	pub fn set_label(&mut self, id: NodeId, label: impl Into<String>) -> Result<String> {
		let label = label.into();
		let data = self.store.get_mut(id)?;
		if data.label == label {
			return Ok(label);
		}
		let old = std::mem::replace(&mut data.label, label);
		self.touch(id);
		Ok(old)
	}

	pub fn append(&mut self, parent: NodeId, tree: Tree) -> Result<NodeId> {
		let len = self.store.get_mut(parent)?.children.len();
		self.insert(parent, len, tree)
	}

	/// Inserts `tree` as the `index`th child of `parent`.
	pub fn insert(&mut self, parent: NodeId, index: usize, tree: Tree) -> Result<NodeId> {
		let len = self.store.get_mut(parent)?.children.len();
		if index > len {
			return Err(DocumentError::ChildIndex { parent, index, len });
		}
		let id = self.store.insert_tree(Some(parent), tree);
		self.store.get_mut(parent)?.children.insert(index, id);
		self.touch(parent);
		Ok(id)
	}

	/// Detaches the subtree rooted at `id` and returns it.
	pub fn remove(&mut self, id: NodeId) -> Result<Tree> {
		if id == self.store.root() {
			return Err(DocumentError::RootRemoval);
		}
		let parent = self.store.get_mut(id)?.parent;
		if let Some(parent) = parent {
			self.store.get_mut(parent)?.children.retain(|child| *child != id);
			self.touch(parent);
		}
		self.changed = true;
		self.store.remove_subtree(id, &mut self.touched).ok_or(DocumentError::UnknownNode(id))
	}

	/// Number of nodes touched so far in this write.
	pub fn touched(&self) -> usize {
		self.touched.len()
	}

	fn touch(&mut self, id: NodeId) {
		self.touched.insert(id);
		self.changed = true;
	}

	fn commit(&mut self) {
		if !self.changed {
			return;
		}
		let version = self.store.bump_version();

		let mut blinded = 0usize;
		let mut observers = self.shared.observers.lock();
		observers.retain(|weak| match weak.upgrade() {
			Some(observer) => {
				if observer.blind_if_touched(&self.touched) {
					blinded += 1;
				}
				!observer.is_blinded()
			}
			None => false,
		});

		tracing::debug!(version, touched = self.touched.len(), blinded, "document.commit");
	}
}

impl Drop for DocumentWrite<'_> {
	fn drop(&mut self) {
		self.commit();
	}
}

#[cfg(test)]
mod tests;
