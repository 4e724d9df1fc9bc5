use pretty_assertions::assert_eq;

use super::*;

fn sample() -> Tree {
	Tree::new("doc").with_children([
		Tree::new("para").with_children([Tree::leaf("word", "hello"), Tree::leaf("word", "world")]),
		Tree::new("para").with_child(Tree::leaf("word", "again")),
	])
}

fn first_para(doc: &Document) -> NodeId {
	doc.read().root().child(0).map(|node| node.id()).expect("first paragraph")
}

#[test]
fn observed_reads_record_only_visited_nodes() {
	let doc = Document::new(sample());
	let observer = Arc::new(Observer::new());
	let reader = doc.reader().observe(Arc::clone(&observer));

	{
		let read = reader.read();
		let para = read.root().child(1).expect("second paragraph");
		assert_eq!(para.child(0).and_then(|word| word.text()), Some("again"));
	}

	assert_eq!(observer.read_count(), 3);
}

#[test]
fn text_change_blinds_only_readers_of_that_node() {
	let mut doc = Document::new(sample());
	let reader = doc.reader();

	let hello_reader = Arc::new(Observer::new());
	let again_reader = Arc::new(Observer::new());
	let hello = {
		let read = reader.read_observed(&hello_reader);
		read.root().child(0).and_then(|para| para.child(0)).map(|node| node.id()).expect("hello")
	};
	{
		let read = reader.read_observed(&again_reader);
		let _ = read.root().child(1).and_then(|para| para.child(0)).map(|node| node.to_tree());
	}

	{
		let mut write = doc.write();
		let old = write.set_text(hello, Some("howdy".into())).expect("set text");
		assert_eq!(old.as_deref(), Some("hello"));
	}

	assert!(hello_reader.is_blinded());
	assert!(!again_reader.is_blinded());
	assert_eq!(doc.version(), 1);
}

#[test]
fn append_blinds_readers_of_the_parent() {
	let mut doc = Document::new(sample());
	let para = first_para(&doc);

	let children_reader = Arc::new(Observer::new());
	let sibling_reader = Arc::new(Observer::new());
	let _ = doc.reader().read_observed(&children_reader).node(para).map(|node| node.child_count());
	let _ = doc.reader().read_observed(&sibling_reader).root().child(1).map(|node| node.label().len());

	doc.write().append(para, Tree::leaf("word", "!")).expect("append");

	assert!(children_reader.is_blinded());
	assert!(!sibling_reader.is_blinded());
	assert_eq!(
		doc.read().node(para).map(|node| node.to_tree()),
		Some(Tree::new("para").with_children([
			Tree::leaf("word", "hello"),
			Tree::leaf("word", "world"),
			Tree::leaf("word", "!"),
		]))
	);
}

/// Must blind a reader of a node's position when a sibling shifts it.
///
/// * Enforced in: `NodeRef::index_in_parent`
/// * Failure symptom: a daemon keeps serving an index that is off by one.
#[test]
fn sibling_insert_blinds_readers_of_an_index() {
	let mut doc = Document::new(sample());
	let root = doc.read().root().id();
	let second = doc.read().root().child(1).map(|node| node.id()).expect("second paragraph");

	let position_reader = Arc::new(Observer::new());
	let index = doc.reader().read_observed(&position_reader).node(second).and_then(|node| node.index_in_parent());
	assert_eq!(index, Some(1));

	doc.write().insert(root, 0, Tree::new("para")).expect("insert");

	assert!(position_reader.is_blinded());
	assert_eq!(doc.read().node(second).and_then(|node| node.index_in_parent()), Some(2));
}

#[test]
fn node_count_belongs_to_the_owner() {
	let mut doc = Document::new(sample());
	assert_eq!(doc.node_count(), 6);

	let observer = Arc::new(Observer::new());
	let copied = doc.reader().read_observed(&observer).root().to_tree();
	assert_eq!(copied.node_count(), doc.node_count());
	let para = first_para(&doc);
	doc.write().append(para, Tree::leaf("word", "!")).expect("append");

	assert_eq!(doc.node_count(), 7);
	assert!(observer.is_blinded());
}

#[test]
fn removal_touches_the_whole_subtree() {
	let mut doc = Document::new(sample());
	let para = first_para(&doc);
	let world = doc.read().node(para).and_then(|node| node.child(1)).map(|node| node.id()).expect("world");

	let deep_reader = Arc::new(Observer::new());
	let _ = doc.reader().read_observed(&deep_reader).node(world).map(|node| node.text());

	let removed = doc.write().remove(para).expect("remove");
	assert_eq!(removed.node_count(), 3);
	assert!(deep_reader.is_blinded());
	assert!(doc.read().node(world).is_none());
	assert_eq!(doc.read().root().child_count(), 1);
}

#[test]
fn root_cannot_be_removed() {
	let mut doc = Document::new(sample());
	let root = doc.read().root().id();
	assert_eq!(doc.write().remove(root), Err(DocumentError::RootRemoval));
	assert_eq!(doc.version(), 0);
}

#[test]
fn insert_past_end_is_rejected() {
	let mut doc = Document::new(sample());
	let para = first_para(&doc);
	let err = doc.write().insert(para, 5, Tree::new("word")).expect_err("out of bounds");
	assert_eq!(err, DocumentError::ChildIndex { parent: para, index: 5, len: 2 });
}

#[test]
fn noop_write_does_not_bump_version() {
	let mut doc = Document::new(sample());
	let root = doc.read().root().id();
	{
		let mut write = doc.write();
		write.set_label(root, "doc").expect("same label");
		assert_eq!(write.touched(), 0);
	}
	assert_eq!(doc.version(), 0);
}

#[test]
fn blinding_happens_before_readers_see_the_new_tree() {
	let mut doc = Document::new(sample());
	let observer = Arc::new(Observer::new());
	let reader = doc.reader().observe(Arc::clone(&observer));
	let root = reader.read().root().id();

	doc.write().set_label(root, "book").expect("relabel");

	let read = reader.unobserved();
	let read = read.read();
	assert_eq!(read.root().label(), "book");
	assert!(observer.is_blinded());
}

#[test]
fn to_tree_and_structure_comparison_agree() {
	let doc = Document::new(sample());
	let read = doc.read();
	let tree = read.root().to_tree();
	assert_eq!(tree, sample());
	assert!(read.root().same_structure_as(&sample()));
	assert!(!read.root().same_structure_as(&Tree::new("doc")));
}

#[test]
fn readers_share_one_document() {
	let doc = Document::new(sample());
	let a = doc.reader();
	let b = a.observe(Arc::new(Observer::new()));
	assert!(a.same_document(&b));
	assert!(!a.same_document(&Document::new(sample()).reader()));
}
