use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use quill_document::{DocumentReader, Observer};
use quill_worker::context::{self, ContextKind};
use quill_worker::{GenerationClock, GenerationToken, join_error_panic_message, panic_message};
use rustc_hash::FxHashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

use super::{Command, SchedulerHandle};
use crate::daemon::{CreateContext, DaemonFactory, ErasedDaemon, StepEnv};
use crate::descriptor::DaemonKey;
use crate::slot::{DaemonState, ErasedSlot};
use crate::{DaemonConfig, DaemonRecord, DaemonStatus, ResumeReport};

/// Scheduler-side bookkeeping for one registry entry.
struct Entry {
	/// Distinguishes this instance from a later rebuild under the same key.
	id: u64,
	slot: Arc<dyn ErasedSlot>,
	/// `None` while a step holds the daemon, or once it completed.
	daemon: Option<Box<dyn ErasedDaemon>>,
	running: bool,
}

struct CreateRequest {
	key: DaemonKey,
	factory: DaemonFactory,
	requested_ms: u64,
}

enum StepOutcome {
	Returned {
		daemon: Box<dyn ErasedDaemon>,
		status: DaemonStatus,
		elapsed: Duration,
	},
	Failed {
		panic: Option<String>,
	},
}

struct StepDone {
	key: DaemonKey,
	entry_id: u64,
	outcome: StepOutcome,
}

pub(super) struct SchedulerLoop {
	handle: SchedulerHandle,
	document: DocumentReader,
	config: DaemonConfig,
	commands: mpsc::UnboundedReceiver<Command>,
	done_tx: mpsc::UnboundedSender<StepDone>,
	done_rx: mpsc::UnboundedReceiver<StepDone>,
	entries: FxHashMap<DaemonKey, Entry>,
	ready: VecDeque<DaemonKey>,
	deferred: Vec<CreateRequest>,
	in_flight: usize,
	next_entry: u64,
	clock: GenerationClock,
	token: GenerationToken,
	paused: bool,
	pause_waiters: Vec<oneshot::Sender<()>>,
	closing: bool,
	close_waiters: Vec<oneshot::Sender<()>>,
}

impl SchedulerLoop {
	pub(super) fn new(handle: SchedulerHandle, document: DocumentReader, config: DaemonConfig, commands: mpsc::UnboundedReceiver<Command>) -> Self {
		let (done_tx, done_rx) = mpsc::unbounded_channel();
		let clock = GenerationClock::new();
		let token = clock.token();
		Self {
			handle,
			document,
			config,
			commands,
			done_tx,
			done_rx,
			entries: FxHashMap::default(),
			ready: VecDeque::new(),
			deferred: Vec::new(),
			in_flight: 0,
			next_entry: 0,
			clock,
			token,
			paused: false,
			pause_waiters: Vec::new(),
			closing: false,
			close_waiters: Vec::new(),
		}
	}

	pub(super) async fn run(mut self) {
		let mut gc = tokio::time::interval(self.config.gc_interval());
		gc.set_missed_tick_behavior(MissedTickBehavior::Delay);
		gc.reset();

		loop {
			self.dispatch();
			self.settle_pause();
			if self.closing && self.in_flight == 0 {
				self.finish_shutdown();
				break;
			}

			tokio::select! {
				biased;
				Some(done) = self.done_rx.recv() => self.on_step_done(done),
				command = self.commands.recv() => match command {
					Some(command) => self.on_command(command),
					None => self.begin_shutdown(None),
				},
				_ = gc.tick() => {
					self.collect_garbage();
				}
			}
		}
	}

	fn on_command(&mut self, command: Command) {
		self.handle.invariants().expect_context(ContextKind::Scheduler);
		match command {
			Command::Create { key, factory, requested_ms } => {
				let request = CreateRequest { key, factory, requested_ms };
				if self.closing {
					tracing::trace!(daemon = request.key.type_name(), "daemon.create.closing");
				} else if self.paused {
					tracing::trace!(daemon = request.key.type_name(), descriptor = ?request.key.descriptor(), "daemon.create.deferred");
					self.deferred.push(request);
				} else {
					self.create(request);
				}
			}
			Command::Pause { reply } => {
				self.pause();
				self.pause_waiters.push(reply);
			}
			Command::Resume { reply } => {
				let report = self.resume();
				let _ = reply.send(report);
			}
			Command::Records { reply } => {
				let _ = reply.send(self.records());
			}
			Command::CollectGarbage { reply } => {
				let _ = reply.send(self.collect_garbage());
			}
			Command::Shutdown { reply } => self.begin_shutdown(reply),
		}
	}

	fn create(&mut self, request: CreateRequest) {
		let CreateRequest { key, factory, requested_ms } = request;
		let requeue = match self.entries.get(&key) {
			None => false,
			Some(entry) if entry.slot.meta().needs_requeue() && !entry.running => true,
			Some(_) => {
				tracing::trace!(daemon = key.type_name(), descriptor = ?key.descriptor(), "daemon.create.duplicate");
				return;
			}
		};
		// A rebuild keeps the descriptor the entry was created with.
		let key = match requeue.then(|| self.entries.remove_entry(&key)).flatten() {
			Some((saved, _)) => saved,
			None => key,
		};

		let observer = Arc::new(Observer::new());
		let started = Instant::now();
		let built = {
			let reader = self.document.observe(Arc::clone(&observer));
			let cx = CreateContext {
				reader: &reader,
				observer: &observer,
				requested_ms,
			};
			std::panic::catch_unwind(AssertUnwindSafe(|| factory(key.descriptor(), &cx)))
		};

		let prepared = match built {
			Ok(Some(prepared)) => prepared,
			Ok(None) => {
				self.drop_registry_entry(&key, requeue);
				self.handle
					.invariants()
					.fail(format!("factory for {key:?} was handed a descriptor of another type"));
				return;
			}
			Err(payload) => {
				self.drop_registry_entry(&key, requeue);
				tracing::error!(
					daemon = key.type_name(),
					descriptor = ?key.descriptor(),
					panic = panic_message(&*payload).as_deref().unwrap_or("<non-string panic payload>"),
					"daemon.create.panic"
				);
				return;
			}
		};

		let elapsed = started.elapsed();
		prepared.slot.meta().add_compute(elapsed);
		self.handle.shared().registry.write().insert(key.clone(), Arc::clone(&prepared.slot));

		let id = self.next_entry;
		self.next_entry += 1;
		self.entries.insert(
			key.clone(),
			Entry {
				id,
				slot: prepared.slot,
				daemon: Some(prepared.daemon),
				running: false,
			},
		);
		tracing::debug!(
			daemon = key.type_name(),
			descriptor = ?key.descriptor(),
			requeue,
			reads = observer.read_count(),
			elapsed_us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
			"daemon.create"
		);
		self.ready.push_back(key);
	}

	fn drop_registry_entry(&self, key: &DaemonKey, requeue: bool) {
		if requeue {
			self.handle.shared().registry.write().remove(key);
		}
	}

	fn dispatch(&mut self) {
		if self.paused {
			return;
		}
		while self.in_flight < self.config.pool_size() {
			let Some(key) = self.ready.pop_front() else {
				break;
			};
			self.spawn_step(key);
		}
	}

	fn spawn_step(&mut self, key: DaemonKey) {
		let Some(entry) = self.entries.get_mut(&key) else {
			return;
		};
		let Some(mut daemon) = entry.daemon.take() else {
			return;
		};
		entry.running = true;
		entry.slot.meta().set_state(DaemonState::Running);

		let env = StepEnv {
			reader: self.document.observe(Arc::clone(entry.slot.meta().observer())),
			token: self.token.clone(),
			scheduler: self.handle.clone(),
		};
		let entry_id = entry.id;
		self.in_flight += 1;
		tracing::trace!(daemon = key.type_name(), generation = self.token.generation(), in_flight = self.in_flight, "daemon.step");

		let task = tokio::task::spawn_blocking(move || {
			let _context = context::enter(ContextKind::Daemon);
			let started = Instant::now();
			let status = daemon.step(&env);
			(daemon, status, started.elapsed())
		});
		let done = self.done_tx.clone();
		tokio::spawn(async move {
			let outcome = match task.await {
				Ok((daemon, status, elapsed)) => StepOutcome::Returned { daemon, status, elapsed },
				Err(err) => StepOutcome::Failed {
					panic: join_error_panic_message(err),
				},
			};
			let _ = done.send(StepDone { key, entry_id, outcome });
		});
	}

	fn on_step_done(&mut self, done: StepDone) {
		self.in_flight = self.in_flight.saturating_sub(1);
		let StepDone { key, entry_id, outcome } = done;

		let Some(entry) = self.entries.get_mut(&key).filter(|entry| entry.id == entry_id) else {
			tracing::trace!(daemon = key.type_name(), "daemon.step.orphaned");
			return;
		};
		entry.running = false;

		match outcome {
			StepOutcome::Failed { panic } => {
				tracing::error!(
					daemon = key.type_name(),
					descriptor = ?key.descriptor(),
					panic = panic.as_deref().unwrap_or("<cancelled>"),
					"daemon.step.panic"
				);
				self.evict(&key);
			}
			StepOutcome::Returned { daemon, status, elapsed } => {
				let meta = entry.slot.meta();
				meta.add_compute(elapsed);
				match status {
					DaemonStatus::Complete => {
						entry.slot.complete();
						tracing::debug!(daemon = key.type_name(), descriptor = ?key.descriptor(), version = meta.version(), "daemon.complete");
					}
					DaemonStatus::Pause => {
						meta.set_state(DaemonState::Paused);
						entry.daemon = Some(daemon);
						self.ready.push_back(key);
					}
					DaemonStatus::Dependent => {
						// The instance is dropped here and never stepped again, so it
						// cannot report Dependent twice. A later request rebuilds it.
						drop(daemon);
						meta.set_needs_requeue();
						meta.set_state(DaemonState::Dependent);
						tracing::debug!(daemon = key.type_name(), descriptor = ?key.descriptor(), "daemon.dependent");
					}
				}
			}
		}
	}

	fn pause(&mut self) {
		if self.paused {
			return;
		}
		self.paused = true;
		self.token.cancel();
		tracing::debug!(in_flight = self.in_flight, generation = self.token.generation(), "scheduler.pause");
	}

	/// Answers pause waiters once no step is executing.
	fn settle_pause(&mut self) {
		if !self.paused || self.in_flight > 0 || self.pause_waiters.is_empty() {
			return;
		}
		tracing::trace!(waiters = self.pause_waiters.len(), parked = self.ready.len(), "scheduler.paused");
		for waiter in self.pause_waiters.drain(..) {
			let _ = waiter.send(());
		}
	}

	fn resume(&mut self) -> ResumeReport {
		let mut evicted = 0usize;
		{
			let mut registry = self.handle.shared().registry.write();
			self.entries.retain(|key, entry| {
				if entry.running || !entry.slot.meta().observer().is_blinded() {
					return true;
				}
				registry.remove(key);
				evicted += 1;
				tracing::debug!(daemon = key.type_name(), descriptor = ?key.descriptor(), "daemon.evict");
				false
			});
		}
		let entries = &self.entries;
		self.ready.retain(|key| entries.contains_key(key));

		if self.paused {
			self.paused = false;
			self.token = self.clock.token();
		}
		let report = ResumeReport {
			evicted,
			live: self.entries.len(),
		};
		tracing::debug!(evicted, live = report.live, deferred = self.deferred.len(), generation = self.token.generation(), "scheduler.resume");

		for request in std::mem::take(&mut self.deferred) {
			self.create(request);
		}
		report
	}

	fn evict(&mut self, key: &DaemonKey) {
		if self.entries.remove(key).is_some() {
			self.handle.shared().registry.write().remove(key);
		}
	}

	/// Drops entries that are blinded, or idle past the configured TTL.
	fn collect_garbage(&mut self) -> usize {
		let now = self.handle.shared().now_ms();
		let ttl = self.config.idle_ttl().map(|ttl| u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX));
		let before = self.entries.len();
		{
			let mut registry = self.handle.shared().registry.write();
			self.entries.retain(|key, entry| {
				if entry.running {
					return true;
				}
				let meta = entry.slot.meta();
				let idle = ttl.is_some_and(|ttl| now.saturating_sub(meta.last_request_ms()) >= ttl);
				if !idle && !meta.observer().is_blinded() {
					return true;
				}
				registry.remove(key);
				tracing::trace!(daemon = key.type_name(), descriptor = ?key.descriptor(), idle, "daemon.collect");
				false
			});
		}
		let collected = before - self.entries.len();
		if collected > 0 {
			let entries = &self.entries;
			self.ready.retain(|key| entries.contains_key(key));
			tracing::debug!(collected, live = self.entries.len(), "scheduler.gc");
		}
		collected
	}

	fn records(&self) -> Vec<DaemonRecord> {
		let now = self.handle.shared().now_ms();
		let mut records: Vec<_> = self
			.entries
			.iter()
			.map(|(key, entry)| {
				let meta = entry.slot.meta();
				DaemonRecord {
					daemon: key.type_name(),
					descriptor: format!("{:?}", key.descriptor()),
					state: meta.state(),
					version: meta.version(),
					compute: Duration::from_micros(meta.compute_us()),
					idle: Duration::from_millis(now.saturating_sub(meta.last_request_ms())),
					needs_requeue: meta.needs_requeue(),
					blinded: meta.observer().is_blinded(),
				}
			})
			.collect();
		records.sort_by(|a, b| a.daemon.cmp(b.daemon).then_with(|| a.descriptor.cmp(&b.descriptor)));
		records
	}

	fn begin_shutdown(&mut self, reply: Option<oneshot::Sender<()>>) {
		if !self.closing {
			tracing::debug!(in_flight = self.in_flight, entries = self.entries.len(), "scheduler.shutdown.begin");
		}
		self.closing = true;
		self.pause();
		self.close_waiters.extend(reply);
	}

	fn finish_shutdown(&mut self) {
		let dropped = self.entries.len();
		self.entries.clear();
		self.ready.clear();
		self.deferred.clear();
		self.handle.shared().registry.write().clear();
		tracing::info!(dropped, "scheduler.shutdown");
		for waiter in self.close_waiters.drain(..) {
			let _ = waiter.send(());
		}
	}
}
