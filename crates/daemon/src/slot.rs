use std::any::Any;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};

use arc_swap::ArcSwap;
use quill_document::Observer;

/// Lifecycle state of a registry entry, as reported by [`crate::DaemonRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DaemonState {
	/// Created and waiting for a pool thread.
	Queued,
	/// A step is executing on a pool thread.
	Running,
	/// Yielded; resumes when a pool thread is free and the scheduler is not paused.
	Paused,
	/// Finished; the published data is final until invalidated.
	Complete,
	/// Waiting on another daemon; rebuilt from scratch on the next request.
	Dependent,
}

impl DaemonState {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Queued => "queued",
			Self::Running => "running",
			Self::Paused => "paused",
			Self::Complete => "complete",
			Self::Dependent => "dependent",
		}
	}

	fn from_u8(raw: u8) -> Self {
		match raw {
			1 => Self::Running,
			2 => Self::Paused,
			3 => Self::Complete,
			4 => Self::Dependent,
			_ => Self::Queued,
		}
	}

	const fn to_u8(self) -> u8 {
		match self {
			Self::Queued => 0,
			Self::Running => 1,
			Self::Paused => 2,
			Self::Complete => 3,
			Self::Dependent => 4,
		}
	}
}

impl std::fmt::Display for DaemonState {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Frozen view of a daemon's published data.
///
/// Holding a snapshot never blocks the daemon: later publications swap in a
/// new version and leave this one untouched.
pub struct Snapshot<T> {
	data: Arc<T>,
	version: u64,
	complete: bool,
}

impl<T> Clone for Snapshot<T> {
	fn clone(&self) -> Self {
		Self {
			data: Arc::clone(&self.data),
			version: self.version,
			complete: self.complete,
		}
	}
}

impl<T: std::fmt::Debug> std::fmt::Debug for Snapshot<T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Snapshot")
			.field("version", &self.version)
			.field("complete", &self.complete)
			.field("data", &self.data)
			.finish()
	}
}

impl<T> Snapshot<T> {
	/// Number of publications before this one; 0 means nothing published yet.
	pub fn version(&self) -> u64 {
		self.version
	}

	/// True once the daemon finished and this is its final data.
	pub fn is_complete(&self) -> bool {
		self.complete
	}

	pub fn data(&self) -> &Arc<T> {
		&self.data
	}
}

impl<T> Deref for Snapshot<T> {
	type Target = T;

	fn deref(&self) -> &T {
		&self.data
	}
}

struct Published<T> {
	data: Arc<T>,
	version: u64,
	complete: bool,
}

/// Bookkeeping shared by every slot regardless of data type.
pub(crate) struct SlotMeta {
	observer: Arc<Observer>,
	last_request_ms: AtomicU64,
	compute_us: AtomicU64,
	version: AtomicU64,
	needs_requeue: AtomicBool,
	state: AtomicU8,
}

impl SlotMeta {
	pub(crate) fn new(observer: Arc<Observer>, requested_ms: u64) -> Self {
		Self {
			observer,
			last_request_ms: AtomicU64::new(requested_ms),
			compute_us: AtomicU64::new(0),
			version: AtomicU64::new(0),
			needs_requeue: AtomicBool::new(false),
			state: AtomicU8::new(DaemonState::Queued.to_u8()),
		}
	}

	pub(crate) fn observer(&self) -> &Arc<Observer> {
		&self.observer
	}

	pub(crate) fn touch(&self, now_ms: u64) {
		self.last_request_ms.fetch_max(now_ms, Ordering::Relaxed);
	}

	pub(crate) fn last_request_ms(&self) -> u64 {
		self.last_request_ms.load(Ordering::Relaxed)
	}

	pub(crate) fn add_compute(&self, elapsed: std::time::Duration) {
		let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
		self.compute_us.fetch_add(micros, Ordering::Relaxed);
	}

	pub(crate) fn compute_us(&self) -> u64 {
		self.compute_us.load(Ordering::Relaxed)
	}

	pub(crate) fn version(&self) -> u64 {
		self.version.load(Ordering::Acquire)
	}

	pub(crate) fn needs_requeue(&self) -> bool {
		self.needs_requeue.load(Ordering::Acquire)
	}

	/// Flags the entry for requeue. The flag is never cleared: the next
	/// request replaces the entry.
	pub(crate) fn set_needs_requeue(&self) {
		self.needs_requeue.store(true, Ordering::Release);
	}

	pub(crate) fn state(&self) -> DaemonState {
		DaemonState::from_u8(self.state.load(Ordering::Acquire))
	}

	pub(crate) fn set_state(&self, state: DaemonState) {
		self.state.store(state.to_u8(), Ordering::Release);
	}

	/// Servable means a reader may be handed this entry's data.
	pub(crate) fn is_servable(&self) -> bool {
		!self.needs_requeue() && !self.observer.is_blinded()
	}
}

/// Published data of one daemon, readable from any context.
pub(crate) struct Slot<T> {
	meta: SlotMeta,
	current: ArcSwap<Published<T>>,
}

impl<T: Default> Slot<T> {
	pub(crate) fn new(meta: SlotMeta) -> Self {
		Self {
			meta,
			current: ArcSwap::from_pointee(Published {
				data: Arc::new(T::default()),
				version: 0,
				complete: false,
			}),
		}
	}
}

impl<T> Slot<T> {
	pub(crate) fn snapshot(&self) -> Snapshot<T> {
		let current = self.current.load();
		Snapshot {
			data: Arc::clone(&current.data),
			version: current.version,
			complete: current.complete,
		}
	}

	pub(crate) fn current(&self) -> Arc<T> {
		Arc::clone(&self.current.load().data)
	}

	/// Swaps in a new version. Only the owning daemon publishes, so the
	/// load-then-store pair never races another writer.
	pub(crate) fn publish(&self, data: Arc<T>) -> u64 {
		let version = self.current.load().version + 1;
		self.current.store(Arc::new(Published {
			data,
			version,
			complete: false,
		}));
		self.meta.version.store(version, Ordering::Release);
		version
	}

	fn mark_complete(&self) {
		let current = self.current.load_full();
		if current.complete {
			return;
		}
		self.current.store(Arc::new(Published {
			data: Arc::clone(&current.data),
			version: current.version,
			complete: true,
		}));
	}
}

/// Type-erased slot as stored in the registry.
pub(crate) trait ErasedSlot: Send + Sync {
	fn meta(&self) -> &SlotMeta;
	fn as_any(&self) -> &dyn Any;
	fn complete(&self);
}

impl<T: Send + Sync + 'static> ErasedSlot for Slot<T> {
	fn meta(&self) -> &SlotMeta {
		&self.meta
	}

	fn as_any(&self) -> &dyn Any {
		self
	}

	fn complete(&self) {
		self.mark_complete();
		self.meta.set_state(DaemonState::Complete);
	}
}
