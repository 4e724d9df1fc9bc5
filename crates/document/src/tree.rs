use serde::{Deserialize, Serialize};

/// Detached, owned tree value.
///
/// Trees carry no identity: two trees are equal when their structure is.
/// They are what crosses context boundaries (hits, descriptors, inserted
/// content) and what [`crate::NodeRef::to_tree`] produces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tree {
	pub label: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub text: Option<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub children: Vec<Tree>,
}

impl Tree {
	/// Creates a childless tree with no text.
	pub fn new(label: impl Into<String>) -> Self {
		Self {
			label: label.into(),
			text: None,
			children: Vec::new(),
		}
	}

	/// Creates a childless tree carrying text.
	pub fn leaf(label: impl Into<String>, text: impl Into<String>) -> Self {
		Self::new(label).with_text(text)
	}

	pub fn with_text(mut self, text: impl Into<String>) -> Self {
		self.text = Some(text.into());
		self
	}

	pub fn with_child(mut self, child: Tree) -> Self {
		self.children.push(child);
		self
	}

	pub fn with_children(mut self, children: impl IntoIterator<Item = Tree>) -> Self {
		self.children.extend(children);
		self
	}

	/// Total number of nodes, this one included.
	pub fn node_count(&self) -> usize {
		1 + self.children.iter().map(Tree::node_count).sum::<usize>()
	}

	/// Returns the first child with the given label.
	pub fn find_child(&self, label: &str) -> Option<&Tree> {
		self.children.iter().find(|child| child.label == label)
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashSet;

	use super::*;

	#[test]
	fn equality_is_structural() {
		let a = Tree::new("para").with_child(Tree::leaf("word", "hello"));
		let b = Tree::new("para").with_child(Tree::leaf("word", "hello"));
		let c = Tree::new("para").with_child(Tree::leaf("word", "world"));

		assert_eq!(a, b);
		assert_ne!(a, c);

		let set: HashSet<_> = [a, b, c].into_iter().collect();
		assert_eq!(set.len(), 2);
	}

	#[test]
	fn node_count_includes_descendants() {
		let tree = Tree::new("doc").with_children([Tree::new("a").with_child(Tree::new("a1")), Tree::new("b")]);
		assert_eq!(tree.node_count(), 4);
		assert_eq!(tree.find_child("a").map(Tree::node_count), Some(2));
	}
}
