use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use crate::NodeId;

static NEXT_OBSERVER: AtomicU64 = AtomicU64::new(1);

/// Read set of one background computation.
///
/// Every node resolved through a reader bound to this observer is recorded.
/// When a committed write touches any recorded node the observer is blinded,
/// permanently: its owner's results can no longer be trusted and must be
/// recomputed from scratch.
#[derive(Debug)]
pub struct Observer {
	id: u64,
	reads: Mutex<FxHashSet<NodeId>>,
	blinded: AtomicBool,
}

impl Default for Observer {
	fn default() -> Self {
		Self::new()
	}
}

impl Observer {
	pub fn new() -> Self {
		Self {
			id: NEXT_OBSERVER.fetch_add(1, Ordering::Relaxed),
			reads: Mutex::new(FxHashSet::default()),
			blinded: AtomicBool::new(false),
		}
	}

	pub fn id(&self) -> u64 {
		self.id
	}

	/// Returns true once a write has touched anything this observer read.
	pub fn is_blinded(&self) -> bool {
		self.blinded.load(Ordering::Acquire)
	}

	/// Number of distinct nodes read so far.
	pub fn read_count(&self) -> usize {
		self.reads.lock().len()
	}

	pub(crate) fn record(&self, id: NodeId) {
		if self.is_blinded() {
			return;
		}
		self.reads.lock().insert(id);
	}

	/// Blinds the observer if its read set intersects `touched`.
	///
	/// Returns true when this call did the blinding.
	pub(crate) fn blind_if_touched(&self, touched: &FxHashSet<NodeId>) -> bool {
		if self.is_blinded() {
			return false;
		}
		let mut reads = self.reads.lock();
		let (small, large) = if reads.len() <= touched.len() {
			(&*reads, touched)
		} else {
			(touched, &*reads)
		};
		if !small.iter().any(|id| large.contains(id)) {
			return false;
		}
		self.blinded.store(true, Ordering::Release);
		reads.clear();
		true
	}
}
