use std::sync::Arc;

use quill_document::{DocumentReader, Observer};
use quill_worker::GenerationToken;

use crate::descriptor::{AnyDescriptor, Descriptor};
use crate::slot::{ErasedSlot, Slot, SlotMeta, Snapshot};
use crate::SchedulerHandle;

/// What a compute step asks the scheduler to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DaemonStatus {
	/// Finished. The published data stays valid until the daemon is invalidated.
	Complete,
	/// Yielded at a safe point; the next step resumes where this one left off.
	Pause,
	/// Needs another daemon's result that was not ready. The instance is
	/// dropped and rebuilt from scratch on the next request.
	Dependent,
}

/// A background computation keyed by its type and [`Daemon::Descriptor`].
///
/// Steps run on a pool thread and must return promptly once
/// [`StepContext::should_pause`] reports true: the scheduler cannot let a
/// document mutation proceed while any step is still executing.
pub trait Daemon: Send + Sized + 'static {
	type Descriptor: Descriptor;
	type Data: Default + Clone + Send + Sync + 'static;

	/// Builds the daemon on the scheduler context. Reads made through `cx`
	/// count towards the daemon's invalidation.
	fn create(descriptor: &Self::Descriptor, cx: &CreateContext<'_>) -> Self;

	/// First step. Defaults to [`Daemon::resume`].
	fn start(&mut self, cx: &mut StepContext<'_, Self::Data>) -> DaemonStatus {
		self.resume(cx)
	}

	fn resume(&mut self, cx: &mut StepContext<'_, Self::Data>) -> DaemonStatus;
}

/// Construction-time access to the document.
pub struct CreateContext<'a> {
	pub(crate) reader: &'a DocumentReader,
	pub(crate) observer: &'a Arc<Observer>,
	pub(crate) requested_ms: u64,
}

impl CreateContext<'_> {
	/// Reader bound to the new daemon's observer.
	pub fn document(&self) -> &DocumentReader {
		self.reader
	}
}

/// Everything a step needs besides the daemon's own slot.
pub(crate) struct StepEnv {
	pub(crate) reader: DocumentReader,
	pub(crate) token: GenerationToken,
	pub(crate) scheduler: SchedulerHandle,
}

/// Per-step access to the document, the pause signal and the daemon's
/// published data.
pub struct StepContext<'a, T> {
	env: &'a StepEnv,
	slot: &'a Slot<T>,
}

impl<T> StepContext<'_, T> {
	/// Reader bound to this daemon's observer.
	pub fn document(&self) -> &DocumentReader {
		&self.env.reader
	}

	/// True once the scheduler wants every daemon parked. Return
	/// [`DaemonStatus::Pause`] at the next safe point.
	pub fn should_pause(&self) -> bool {
		self.env.token.is_cancelled()
	}

	/// Generation of the pause token this step runs under.
	pub fn generation(&self) -> u64 {
		self.env.token.generation()
	}

	/// The most recently published data.
	pub fn current(&self) -> Arc<T> {
		self.slot.current()
	}

	/// Publishes a new version of the data.
	pub fn publish(&mut self, data: T) -> u64 {
		let version = self.slot.publish(Arc::new(data));
		self.env.scheduler.notify_progress();
		version
	}

	/// Requests another daemon's data. `None` usually means this daemon
	/// should return [`DaemonStatus::Dependent`].
	pub fn snapshot<D: Daemon>(&self, descriptor: D::Descriptor) -> Option<Snapshot<D::Data>> {
		self.env.scheduler.request_snapshot::<D>(descriptor)
	}
}

impl<T: Clone> StepContext<'_, T> {
	/// Copy-on-write update: readers holding the old version keep it.
	pub fn update(&mut self, f: impl FnOnce(&mut T)) -> u64 {
		let mut next = T::clone(&self.slot.current());
		f(&mut next);
		self.publish(next)
	}
}

/// A daemon with its type erased, owned by exactly one context at a time.
pub(crate) trait ErasedDaemon: Send {
	fn step(&mut self, env: &StepEnv) -> DaemonStatus;
}

struct Running<D: Daemon> {
	daemon: D,
	slot: Arc<Slot<D::Data>>,
	started: bool,
}

impl<D: Daemon> ErasedDaemon for Running<D> {
	fn step(&mut self, env: &StepEnv) -> DaemonStatus {
		let mut cx = StepContext { env, slot: &self.slot };
		if self.started {
			self.daemon.resume(&mut cx)
		} else {
			self.started = true;
			self.daemon.start(&mut cx)
		}
	}
}

/// Output of a factory: the daemon and the slot it publishes into.
pub(crate) struct Prepared {
	pub(crate) daemon: Box<dyn ErasedDaemon>,
	pub(crate) slot: Arc<dyn ErasedSlot>,
}

/// Type-erased constructor captured at request time.
pub(crate) type DaemonFactory = Arc<dyn Fn(&dyn AnyDescriptor, &CreateContext<'_>) -> Option<Prepared> + Send + Sync>;

pub(crate) fn erase_factory<D, F>(create: F) -> DaemonFactory
where
	D: Daemon,
	F: Fn(&D::Descriptor, &CreateContext<'_>) -> D + Send + Sync + 'static,
{
	Arc::new(move |descriptor: &dyn AnyDescriptor, cx: &CreateContext<'_>| {
		let descriptor = descriptor.as_any().downcast_ref::<D::Descriptor>()?;
		let daemon = create(descriptor, cx);
		let slot = Arc::new(Slot::<D::Data>::new(SlotMeta::new(Arc::clone(cx.observer), cx.requested_ms)));
		Some(Prepared {
			daemon: Box::new(Running::<D> {
				daemon,
				slot: Arc::clone(&slot),
				started: false,
			}),
			slot,
		})
	})
}
