//! The daemon scheduler context.
//!
//! One dedicated thread drives [`SchedulerLoop`] on a current-thread runtime.
//! Its blocking pool executes daemon steps. Everything that changes the
//! registry arrives as a [`Command`]: creation requests are fire-and-forget,
//! the rest carry a oneshot reply.

mod handle;
mod state;
#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

pub use handle::SchedulerHandle;
use parking_lot::RwLock;
use quill_document::DocumentReader;
use quill_worker::{ContextKind, Invariants, panic_message, spawn_context_loop};
use rustc_hash::FxHashMap;
use tokio::sync::{mpsc, oneshot, watch};

use self::state::SchedulerLoop;
use crate::daemon::DaemonFactory;
use crate::descriptor::DaemonKey;
use crate::slot::ErasedSlot;
use crate::{DaemonConfig, DaemonRecord, ResumeReport, SchedulerError};

pub(crate) enum Command {
	Create {
		key: DaemonKey,
		factory: DaemonFactory,
		requested_ms: u64,
	},
	Pause {
		reply: oneshot::Sender<()>,
	},
	Resume {
		reply: oneshot::Sender<ResumeReport>,
	},
	Records {
		reply: oneshot::Sender<Vec<DaemonRecord>>,
	},
	CollectGarbage {
		reply: oneshot::Sender<usize>,
	},
	Shutdown {
		reply: Option<oneshot::Sender<()>>,
	},
}

impl Command {
	fn name(&self) -> &'static str {
		match self {
			Self::Create { .. } => "create",
			Self::Pause { .. } => "pause",
			Self::Resume { .. } => "resume",
			Self::Records { .. } => "records",
			Self::CollectGarbage { .. } => "collect_garbage",
			Self::Shutdown { .. } => "shutdown",
		}
	}
}

/// State reachable from every handle.
pub(crate) struct Shared {
	/// Readers take the shared lock; only the scheduler thread writes.
	registry: RwLock<FxHashMap<DaemonKey, Arc<dyn ErasedSlot>>>,
	commands: mpsc::UnboundedSender<Command>,
	progress: watch::Sender<u64>,
	invariants: Invariants,
	epoch: Instant,
}

impl Shared {
	fn now_ms(&self) -> u64 {
		u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
	}
}

/// Owner of the scheduler thread.
///
/// Dropping it asks the thread to shut down without waiting; use
/// [`Scheduler::shutdown`] to wait for every daemon to be dropped.
pub struct Scheduler {
	handle: SchedulerHandle,
	thread: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Scheduler {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Scheduler").field("running", &self.thread.is_some()).finish()
	}
}

impl Scheduler {
	/// Starts the scheduler thread and its step pool.
	pub fn spawn(document: DocumentReader, config: DaemonConfig, invariants: Invariants) -> Result<Self, SchedulerError> {
		let (commands, command_rx) = mpsc::unbounded_channel();
		let (progress, _) = watch::channel(0);
		let handle = SchedulerHandle::new(Arc::new(Shared {
			registry: RwLock::new(FxHashMap::default()),
			commands,
			progress,
			invariants,
			epoch: Instant::now(),
		}));

		let loop_handle = handle.clone();
		let document = document.unobserved();
		let pool_size = config.pool_size();
		tracing::info!(pool_size, gc_interval_ms = config.gc_interval_ms, idle_ttl_ms = ?config.idle_ttl_ms, "scheduler.spawn");
		let thread = spawn_context_loop(ContextKind::Scheduler, "quill-scheduler", pool_size, move || {
			SchedulerLoop::new(loop_handle, document, config, command_rx).run()
		})?;

		Ok(Self {
			handle,
			thread: Some(thread),
		})
	}

	pub fn handle(&self) -> &SchedulerHandle {
		&self.handle
	}

	/// Pauses every daemon, drops the registry and joins the thread.
	pub async fn shutdown(mut self) -> Result<(), SchedulerError> {
		let result = self.handle.shutdown().await;
		self.join();
		result
	}

	/// Blocking flavor of [`Scheduler::shutdown`].
	pub fn shutdown_blocking(mut self) -> Result<(), SchedulerError> {
		let result = self.handle.shutdown_blocking();
		self.join();
		result
	}

	fn join(&mut self) {
		let Some(thread) = self.thread.take() else {
			return;
		};
		if let Err(payload) = thread.join() {
			tracing::error!(panic = panic_message(&*payload).as_deref().unwrap_or("<non-string panic payload>"), "scheduler.join");
		}
	}
}

impl Drop for Scheduler {
	fn drop(&mut self) {
		if self.thread.take().is_some() {
			let _ = self.handle.send(Command::Shutdown { reply: None });
		}
	}
}
