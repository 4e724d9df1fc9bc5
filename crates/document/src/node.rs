use std::fmt;

use crate::store::{NodeData, Store};
use crate::{Observer, Tree};

/// Identity of a live node.
///
/// Ids are only meaningful for the document that issued them. A removed
/// node's id never resolves again, even after its storage is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
	index: usize,
	generation: u32,
}

impl NodeId {
	pub(crate) const fn new(index: usize, generation: u32) -> Self {
		Self { index, generation }
	}

	pub(crate) const fn index(self) -> usize {
		self.index
	}

	pub(crate) const fn generation(self) -> u32 {
		self.generation
	}
}

impl fmt::Display for NodeId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}.{}", self.index, self.generation)
	}
}

/// Borrowed view of one live node.
///
/// Creating a `NodeRef` through an observed read records the node in the
/// observer's read set; everything reachable from it is recorded as it is
/// visited.
#[derive(Clone, Copy)]
pub struct NodeRef<'r> {
	id: NodeId,
	data: &'r NodeData,
	store: &'r Store,
	observer: Option<&'r Observer>,
}

impl fmt::Debug for NodeRef<'_> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("NodeRef")
			.field("id", &self.id)
			.field("label", &self.data.label)
			.field("children", &self.data.children.len())
			.finish()
	}
}

impl<'r> NodeRef<'r> {
	pub(crate) fn resolve(store: &'r Store, observer: Option<&'r Observer>, id: NodeId) -> Option<Self> {
		let data = store.get(id)?;
		if let Some(observer) = observer {
			observer.record(id);
		}
		Some(Self {
			id,
			data,
			store,
			observer,
		})
	}

	pub fn id(&self) -> NodeId {
		self.id
	}

	pub fn label(&self) -> &'r str {
		&self.data.label
	}

	pub fn text(&self) -> Option<&'r str> {
		self.data.text.as_deref()
	}

	pub fn child_count(&self) -> usize {
		self.data.children.len()
	}

	pub fn child(&self, index: usize) -> Option<NodeRef<'r>> {
		let id = *self.data.children.get(index)?;
		Self::resolve(self.store, self.observer, id)
	}

	pub fn children(&self) -> impl Iterator<Item = NodeRef<'r>> + 'r {
		let store = self.store;
		let observer = self.observer;
		self.data.children.iter().filter_map(move |id| Self::resolve(store, observer, *id))
	}

	pub fn parent(&self) -> Option<NodeRef<'r>> {
		Self::resolve(self.store, self.observer, self.data.parent?)
	}

	/// Position of this node among its parent's children.
	///
	/// The position depends on the siblings, so the parent is read too.
	pub fn index_in_parent(&self) -> Option<usize> {
		let parent = self.parent()?;
		parent.data.children.iter().position(|id| *id == self.id)
	}

	/// Copies this subtree into a detached [`Tree`], reading every node of it.
	pub fn to_tree(&self) -> Tree {
		Tree {
			label: self.data.label.clone(),
			text: self.data.text.clone(),
			children: self.children().map(|child| child.to_tree()).collect(),
		}
	}

	/// Structural comparison against a detached tree, reading as far as needed.
	pub fn same_structure_as(&self, tree: &Tree) -> bool {
		self.data.label == tree.label
			&& self.data.text == tree.text
			&& self.child_count() == tree.children.len()
			&& self.children().zip(&tree.children).all(|(node, tree)| node.same_structure_as(tree))
	}
}
