//! Arena storage for the live document tree.

use rustc_hash::FxHashSet;
use slab::Slab;

use crate::error::{DocumentError, Result};
use crate::{NodeId, Tree};

pub(crate) struct NodeData {
	pub(crate) label: String,
	pub(crate) text: Option<String>,
	pub(crate) parent: Option<NodeId>,
	pub(crate) children: Vec<NodeId>,
}

struct Slot {
	generation: u32,
	data: NodeData,
}

/// Generational arena holding every live node.
///
/// Slab keys are reused after removal; the generation stored alongside each
/// node keeps stale [`NodeId`]s from resolving to an unrelated node.
pub(crate) struct Store {
	nodes: Slab<Slot>,
	next_generation: u32,
	root: NodeId,
	version: u64,
}

impl Store {
	pub(crate) fn new(root: Tree) -> Self {
		let mut store = Self {
			nodes: Slab::new(),
			next_generation: 0,
			root: NodeId::new(0, 0),
			version: 0,
		};
		store.root = store.insert_tree(None, root);
		store
	}

	pub(crate) fn root(&self) -> NodeId {
		self.root
	}

	pub(crate) fn version(&self) -> u64 {
		self.version
	}

	pub(crate) fn bump_version(&mut self) -> u64 {
		self.version = self.version.wrapping_add(1);
		self.version
	}

	pub(crate) fn len(&self) -> usize {
		self.nodes.len()
	}

	pub(crate) fn get(&self, id: NodeId) -> Option<&NodeData> {
		self.nodes.get(id.index()).filter(|slot| slot.generation == id.generation()).map(|slot| &slot.data)
	}

	pub(crate) fn get_mut(&mut self, id: NodeId) -> Result<&mut NodeData> {
		self.nodes
			.get_mut(id.index())
			.filter(|slot| slot.generation == id.generation())
			.map(|slot| &mut slot.data)
			.ok_or(DocumentError::UnknownNode(id))
	}

	/// Inserts `tree` as a detached subtree and returns its root id.
	pub(crate) fn insert_tree(&mut self, parent: Option<NodeId>, tree: Tree) -> NodeId {
		let Tree { label, text, children } = tree;
		let generation = self.next_generation;
		self.next_generation = self.next_generation.wrapping_add(1);
		let index = self.nodes.insert(Slot {
			generation,
			data: NodeData {
				label,
				text,
				parent,
				children: Vec::with_capacity(children.len()),
			},
		});
		let id = NodeId::new(index, generation);

		let child_ids: Vec<_> = children.into_iter().map(|child| self.insert_tree(Some(id), child)).collect();
		if let Some(slot) = self.nodes.get_mut(index) {
			slot.data.children = child_ids;
		}
		id
	}

	/// Copies the subtree rooted at `id` into a detached value.
	pub(crate) fn detach(&self, id: NodeId) -> Option<Tree> {
		let data = self.get(id)?;
		Some(Tree {
			label: data.label.clone(),
			text: data.text.clone(),
			children: data.children.iter().filter_map(|child| self.detach(*child)).collect(),
		})
	}

	/// Removes the subtree rooted at `id`, recording every removed id in `touched`.
	///
	/// The caller unlinks `id` from its parent.
	pub(crate) fn remove_subtree(&mut self, id: NodeId, touched: &mut FxHashSet<NodeId>) -> Option<Tree> {
		if self.get(id).is_none() {
			return None;
		}
		let slot = self.nodes.remove(id.index());
		touched.insert(id);
		let NodeData { label, text, children, .. } = slot.data;
		Some(Tree {
			label,
			text,
			children: children.into_iter().filter_map(|child| self.remove_subtree(child, touched)).collect(),
		})
	}
}
