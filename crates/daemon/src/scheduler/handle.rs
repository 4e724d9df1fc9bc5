use std::sync::Arc;

use quill_worker::{ContextKind, Invariants};
use tokio::sync::{oneshot, watch};

use super::{Command, Shared};
use crate::daemon::{CreateContext, erase_factory};
use crate::descriptor::DaemonKey;
use crate::slot::Slot;
use crate::{Daemon, DaemonRecord, ResumeReport, SchedulerError, Snapshot};

/// Cloneable entry point to the scheduler, usable from any context.
#[derive(Clone)]
pub struct SchedulerHandle {
	shared: Arc<Shared>,
}

impl std::fmt::Debug for SchedulerHandle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SchedulerHandle")
			.field("entries", &self.shared.registry.read().len())
			.finish_non_exhaustive()
	}
}

impl SchedulerHandle {
	pub(super) fn new(shared: Arc<Shared>) -> Self {
		Self { shared }
	}

	pub(super) fn shared(&self) -> &Shared {
		&self.shared
	}

	pub fn invariants(&self) -> &Invariants {
		&self.shared.invariants
	}

	/// Returns the daemon's current data, or queues its creation and returns `None`.
	pub fn request_snapshot<D: Daemon>(&self, descriptor: D::Descriptor) -> Option<Snapshot<D::Data>> {
		self.request_snapshot_with::<D, _>(descriptor, D::create)
	}

	/// Like [`SchedulerHandle::request_snapshot`] with a custom constructor.
	///
	/// The constructor only runs if this request ends up creating the daemon.
	/// Must not be called from the scheduler context: the request would wait
	/// on the thread that has to service it.
	pub fn request_snapshot_with<D, F>(&self, descriptor: D::Descriptor, create: F) -> Option<Snapshot<D::Data>>
	where
		D: Daemon,
		F: Fn(&D::Descriptor, &CreateContext<'_>) -> D + Send + Sync + 'static,
	{
		if !self.shared.invariants.forbid_context(ContextKind::Scheduler, "request_snapshot") {
			return None;
		}

		let key = DaemonKey::of::<D>(descriptor);
		let now = self.shared.now_ms();
		{
			let registry = self.shared.registry.read();
			if let Some(slot) = registry.get(&key) {
				let meta = slot.meta();
				meta.touch(now);
				if meta.is_servable()
					&& let Some(slot) = slot.as_any().downcast_ref::<Slot<D::Data>>()
				{
					return Some(slot.snapshot());
				}
			}
		}

		tracing::trace!(daemon = key.type_name(), descriptor = ?key.descriptor(), "daemon.request.miss");
		let _ = self.send(Command::Create {
			key,
			factory: erase_factory::<D, F>(create),
			requested_ms: now,
		});
		None
	}

	/// Blocks until every in-flight step has returned and all daemons are parked.
	pub async fn pause_all(&self) -> Result<(), SchedulerError> {
		self.round_trip("pause_all", |reply| Command::Pause { reply }).await
	}

	pub fn pause_all_blocking(&self) -> Result<(), SchedulerError> {
		self.round_trip_blocking("pause_all", |reply| Command::Pause { reply })
	}

	/// Evicts every daemon whose observer is blinded and resumes the rest.
	///
	/// Creation requests deferred by the pause are serviced afterwards.
	pub async fn resume_valid_and_discard_invalid(&self) -> Result<ResumeReport, SchedulerError> {
		self.round_trip("resume", |reply| Command::Resume { reply }).await
	}

	pub fn resume_valid_and_discard_invalid_blocking(&self) -> Result<ResumeReport, SchedulerError> {
		self.round_trip_blocking("resume", |reply| Command::Resume { reply })
	}

	/// Lists every registry entry, sorted by daemon type then descriptor.
	pub async fn records(&self) -> Result<Vec<DaemonRecord>, SchedulerError> {
		self.round_trip("records", |reply| Command::Records { reply }).await
	}

	pub fn records_blocking(&self) -> Result<Vec<DaemonRecord>, SchedulerError> {
		self.round_trip_blocking("records", |reply| Command::Records { reply })
	}

	/// Runs the idle sweep now and returns how many entries it dropped.
	pub async fn collect_garbage(&self) -> Result<usize, SchedulerError> {
		self.round_trip("collect_garbage", |reply| Command::CollectGarbage { reply }).await
	}

	pub fn collect_garbage_blocking(&self) -> Result<usize, SchedulerError> {
		self.round_trip_blocking("collect_garbage", |reply| Command::CollectGarbage { reply })
	}

	/// Number of registry entries, as seen under the shared lock.
	pub fn len(&self) -> usize {
		self.shared.registry.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Counter bumped on every publication by any daemon.
	pub fn subscribe_progress(&self) -> watch::Receiver<u64> {
		self.shared.progress.subscribe()
	}

	pub(crate) fn notify_progress(&self) {
		self.shared.progress.send_modify(|count| *count = count.wrapping_add(1));
	}

	pub(super) async fn shutdown(&self) -> Result<(), SchedulerError> {
		self.round_trip("shutdown", |reply| Command::Shutdown { reply: Some(reply) }).await
	}

	pub(super) fn shutdown_blocking(&self) -> Result<(), SchedulerError> {
		self.round_trip_blocking("shutdown", |reply| Command::Shutdown { reply: Some(reply) })
	}

	pub(super) fn send(&self, command: Command) -> Result<(), SchedulerError> {
		let name = command.name();
		self.shared.commands.send(command).map_err(|_| {
			tracing::warn!(command = name, "scheduler.send.closed");
			SchedulerError::Closed
		})
	}

	/// Round-trips block the caller on the scheduler; from the scheduler
	/// itself or from a step it waits on, that never returns.
	fn check_round_trip(&self, operation: &'static str) -> Result<(), SchedulerError> {
		for context in [ContextKind::Scheduler, ContextKind::Daemon] {
			if !self.shared.invariants.forbid_context(context, operation) {
				return Err(SchedulerError::WrongContext { operation, context });
			}
		}
		Ok(())
	}

	async fn round_trip<R>(&self, operation: &'static str, make: impl FnOnce(oneshot::Sender<R>) -> Command) -> Result<R, SchedulerError> {
		self.check_round_trip(operation)?;
		let (reply, rx) = oneshot::channel();
		self.send(make(reply))?;
		rx.await.map_err(|_| SchedulerError::Closed)
	}

	fn round_trip_blocking<R>(&self, operation: &'static str, make: impl FnOnce(oneshot::Sender<R>) -> Command) -> Result<R, SchedulerError> {
		self.check_round_trip(operation)?;
		let (reply, rx) = oneshot::channel();
		self.send(make(reply))?;
		rx.blocking_recv().map_err(|_| SchedulerError::Closed)
	}
}
