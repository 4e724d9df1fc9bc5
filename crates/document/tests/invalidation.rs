//! Property tests for observer invalidation.

use std::sync::Arc;

use proptest::prelude::*;
use quill_document::{Document, NodeId, Observer, Tree};

fn flat(width: usize) -> Tree {
	Tree::new("root").with_children((0..width).map(|i| Tree::leaf("cell", i.to_string())))
}

fn cell_ids(doc: &Document) -> Vec<NodeId> {
	doc.read().root().children().map(|node| node.id()).collect()
}

proptest! {
	/// Must blind an observer exactly when a committed write touched a node it read.
	///
	/// * Enforced in: `DocumentWrite::commit`
	/// * Failure symptom: daemons keep serving results computed from text that has since changed,
	///   or are discarded after unrelated edits.
	#[test]
	fn blinded_iff_read_set_was_touched(
		width in 1usize..12,
		reads in proptest::collection::vec(0usize..12, 0..6),
		writes in proptest::collection::vec(0usize..12, 1..4),
	) {
		let mut doc = Document::new(flat(width));
		let ids = cell_ids(&doc);
		let reads: Vec<_> = reads.into_iter().filter(|i| *i < width).collect();
		let writes: Vec<_> = writes.into_iter().filter(|i| *i < width).collect();

		let observer = Arc::new(Observer::new());
		{
			let reader = doc.reader();
			let read = reader.read_observed(&observer);
			for i in &reads {
				prop_assert!(read.node(ids[*i]).is_some());
			}
		}

		{
			let mut write = doc.write();
			for i in &writes {
				write.set_text(ids[*i], Some(format!("edited {i}"))).expect("live node");
			}
		}

		let touched = reads.iter().any(|i| writes.contains(i));
		prop_assert_eq!(observer.is_blinded(), touched);
	}

	/// Must never resolve a removed node's id, even after the slot is reused.
	///
	/// * Enforced in: `Store::get`
	/// * Failure symptom: a stale hit resolves to an unrelated node inserted later.
	#[test]
	fn removed_ids_stay_dead(width in 2usize..10, victim in 0usize..10) {
		let victim = victim % width;
		let mut doc = Document::new(flat(width));
		let ids = cell_ids(&doc);
		let root = doc.read().root().id();

		doc.write().remove(ids[victim]).expect("remove");
		doc.write().append(root, Tree::leaf("cell", "fresh")).expect("append");

		prop_assert!(doc.read().node(ids[victim]).is_none());
		prop_assert_eq!(doc.read().root().child_count(), width);
	}
}
