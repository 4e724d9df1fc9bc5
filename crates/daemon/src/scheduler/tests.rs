use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use quill_document::{Document, Tree};
use quill_worker::{ContextKind, Invariants, RecordingHandler, spawn_context_thread};

use crate::{CreateContext, Daemon, DaemonConfig, DaemonState, DaemonStatus, Scheduler, SchedulerError, SchedulerHandle, Snapshot, StepContext};

fn init_tracing() {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.with_test_writer()
		.try_init();
}

fn wait_for<T>(mut probe: impl FnMut() -> Option<T>) -> T {
	let deadline = Instant::now() + Duration::from_secs(10);
	loop {
		if let Some(value) = probe() {
			return value;
		}
		assert!(Instant::now() < deadline, "timed out waiting for the scheduler");
		std::thread::sleep(Duration::from_millis(1));
	}
}

fn complete<D: Daemon>(handle: &SchedulerHandle, descriptor: D::Descriptor) -> Snapshot<D::Data> {
	wait_for(|| handle.request_snapshot::<D>(descriptor.clone()).filter(Snapshot::is_complete))
}

struct Fixture {
	document: Document,
	scheduler: Scheduler,
	handler: Arc<RecordingHandler>,
}

impl Fixture {
	fn new() -> Self {
		Self::with_config(DaemonConfig::default())
	}

	fn with_config(config: DaemonConfig) -> Self {
		init_tracing();
		let document = Document::new(Tree::new("doc").with_children([Tree::leaf("cell", "alpha"), Tree::leaf("cell", "be")]));
		let handler = Arc::new(RecordingHandler::new());
		let scheduler = Scheduler::spawn(document.reader(), config, Invariants::new(handler.clone())).expect("spawn scheduler");
		Self {
			document,
			scheduler,
			handler,
		}
	}

	fn handle(&self) -> &SchedulerHandle {
		self.scheduler.handle()
	}

	fn edit_cell(&mut self, index: usize, text: &str) {
		self.handle().pause_all_blocking().expect("pause");
		let id = self.document.read().root().child(index).map(|node| node.id()).expect("cell");
		self.document.write().set_text(id, Some(text.to_owned())).expect("edit");
	}
}

/// Length of the text of one root child.
struct TextLength {
	index: usize,
}

impl Daemon for TextLength {
	type Descriptor = usize;
	type Data = usize;

	fn create(index: &usize, _cx: &CreateContext<'_>) -> Self {
		Self { index: *index }
	}

	fn resume(&mut self, cx: &mut StepContext<'_, usize>) -> DaemonStatus {
		let len = {
			let read = cx.document().read();
			read.root().child(self.index).and_then(|node| node.text().map(str::len)).unwrap_or(0)
		};
		cx.publish(len);
		DaemonStatus::Complete
	}
}

/// Twice a [`TextLength`]; depends on it.
struct Doubled {
	index: usize,
}

impl Daemon for Doubled {
	type Descriptor = usize;
	type Data = usize;

	fn create(index: &usize, _cx: &CreateContext<'_>) -> Self {
		Self { index: *index }
	}

	fn resume(&mut self, cx: &mut StepContext<'_, usize>) -> DaemonStatus {
		match cx.snapshot::<TextLength>(self.index).filter(Snapshot::is_complete) {
			Some(len) => {
				cx.publish(*len * 2);
				DaemonStatus::Complete
			}
			None => DaemonStatus::Dependent,
		}
	}
}

/// Counts forever, one tick per step, yielding after every tick.
struct Ticker;

impl Daemon for Ticker {
	type Descriptor = &'static str;
	type Data = u64;

	fn create(_name: &&'static str, _cx: &CreateContext<'_>) -> Self {
		Self
	}

	fn resume(&mut self, cx: &mut StepContext<'_, u64>) -> DaemonStatus {
		std::thread::sleep(Duration::from_millis(1));
		cx.update(|ticks| *ticks += 1);
		DaemonStatus::Pause
	}
}

struct Panicker;

impl Daemon for Panicker {
	type Descriptor = ();
	type Data = ();

	fn create(_: &(), _cx: &CreateContext<'_>) -> Self {
		Self
	}

	fn resume(&mut self, _cx: &mut StepContext<'_, ()>) -> DaemonStatus {
		panic!("daemon step exploded");
	}
}

#[test]
fn first_request_misses_then_serves_completed_data() {
	let fx = Fixture::new();
	assert!(fx.handle().request_snapshot::<TextLength>(0).is_none());

	let snapshot = complete::<TextLength>(fx.handle(), 0);
	assert_eq!(*snapshot, 5);
	assert_eq!(snapshot.version(), 1);
	assert!(fx.handler.is_empty());
}

#[test]
fn constructor_reads_are_tracked() {
	struct Eager {
		len: usize,
	}
	impl Daemon for Eager {
		type Descriptor = usize;
		type Data = usize;

		fn create(index: &usize, cx: &CreateContext<'_>) -> Self {
			let read = cx.document().read();
			let len = read.root().child(*index).and_then(|node| node.text().map(str::len)).unwrap_or(0);
			Self { len }
		}

		fn resume(&mut self, cx: &mut StepContext<'_, usize>) -> DaemonStatus {
			cx.publish(self.len);
			DaemonStatus::Complete
		}
	}

	let mut fx = Fixture::new();
	assert_eq!(*complete::<Eager>(fx.handle(), 1), 2);

	fx.edit_cell(1, "bee");
	let report = fx.handle().resume_valid_and_discard_invalid_blocking().expect("resume");
	assert_eq!(report.evicted, 1);
	assert_eq!(*complete::<Eager>(fx.handle(), 1), 3);
}

/// Must evict exactly the daemons whose reads a mutation touched, before resume returns.
///
/// * Enforced in: `SchedulerLoop::resume`
/// * Failure symptom: snapshots keep serving text lengths of cells that were edited.
#[test]
fn resume_evicts_blinded_daemons_only() {
	let mut fx = Fixture::new();
	let before_first = complete::<TextLength>(fx.handle(), 0);
	let before_second = complete::<TextLength>(fx.handle(), 1);
	assert_eq!((*before_first, *before_second), (5, 2));

	fx.edit_cell(0, "gamma ray");
	let report = fx.handle().resume_valid_and_discard_invalid_blocking().expect("resume");
	assert_eq!(report.evicted, 1);
	assert_eq!(report.live, 1);

	assert!(fx.handle().request_snapshot::<TextLength>(0).is_none());
	let untouched = fx.handle().request_snapshot::<TextLength>(1).expect("still served");
	assert_eq!(untouched.version(), before_second.version());
	assert_eq!(*complete::<TextLength>(fx.handle(), 0), 9);
}

#[test]
fn pause_parks_every_daemon_until_resume() {
	let fx = Fixture::new();
	let first = wait_for(|| fx.handle().request_snapshot::<Ticker>("tick").filter(|ticks| *ticks.data().as_ref() > 2));

	fx.handle().pause_all_blocking().expect("pause");
	let records = fx.handle().records_blocking().expect("records");
	assert_eq!(records.len(), 1);
	assert_eq!(records[0].state, DaemonState::Paused);

	let parked = fx.handle().request_snapshot::<Ticker>("tick").expect("served while paused");
	std::thread::sleep(Duration::from_millis(20));
	let still = fx.handle().request_snapshot::<Ticker>("tick").expect("served while paused");
	assert_eq!(parked.version(), still.version());
	assert!(still.version() >= first.version());

	fx.handle().resume_valid_and_discard_invalid_blocking().expect("resume");
	wait_for(|| fx.handle().request_snapshot::<Ticker>("tick").filter(|ticks| ticks.version() > still.version()));
}

/// Must never let a mutation land while a daemon step is executing.
///
/// * Enforced in: `SchedulerLoop::settle_pause`
/// * Failure symptom: a daemon sees the document version change under it mid-step.
#[test]
fn no_mutation_is_observed_mid_step() {
	struct Watcher {
		torn: Arc<AtomicBool>,
		steps: Arc<AtomicUsize>,
	}
	impl Daemon for Watcher {
		type Descriptor = ();
		type Data = ();

		fn create(_: &(), _cx: &CreateContext<'_>) -> Self {
			unreachable!("built through request_snapshot_with")
		}

		fn resume(&mut self, cx: &mut StepContext<'_, ()>) -> DaemonStatus {
			self.steps.fetch_add(1, Ordering::Relaxed);
			let seen = cx.document().version();
			while !cx.should_pause() {
				if cx.document().version() != seen {
					self.torn.store(true, Ordering::Relaxed);
				}
				std::thread::yield_now();
			}
			DaemonStatus::Pause
		}
	}

	let mut fx = Fixture::new();
	let torn = Arc::new(AtomicBool::new(false));
	let steps = Arc::new(AtomicUsize::new(0));
	let make = {
		let torn = Arc::clone(&torn);
		let steps = Arc::clone(&steps);
		move |_: &(), _: &CreateContext<'_>| Watcher {
			torn: Arc::clone(&torn),
			steps: Arc::clone(&steps),
		}
	};
	assert!(fx.handle().request_snapshot_with::<Watcher, _>((), make.clone()).is_none());
	wait_for(|| (steps.load(Ordering::Relaxed) > 0).then_some(()));

	for round in 0..20 {
		fx.edit_cell(round % 2, &format!("round {round}"));
		fx.handle().resume_valid_and_discard_invalid_blocking().expect("resume");
		let _ = fx.handle().request_snapshot_with::<Watcher, _>((), make.clone());
	}

	assert!(!torn.load(Ordering::Relaxed), "a step observed a mutation");
	assert!(steps.load(Ordering::Relaxed) > 1);
	assert_eq!(fx.handle().len(), 1);
}

#[test]
fn dependent_daemons_are_rebuilt_on_request() {
	let fx = Fixture::new();
	let builds = Arc::new(AtomicUsize::new(0));
	let counted = {
		let builds = Arc::clone(&builds);
		move |index: &usize, _: &CreateContext<'_>| {
			builds.fetch_add(1, Ordering::Relaxed);
			Doubled { index: *index }
		}
	};

	let doubled = wait_for(|| {
		fx.handle()
			.request_snapshot_with::<Doubled, _>(1, counted.clone())
			.filter(Snapshot::is_complete)
	});
	assert_eq!(*doubled, 4);
	assert!(builds.load(Ordering::Relaxed) >= 2, "the first build cannot have its dependency");
	assert!(fx.handler.is_empty(), "{:?}", fx.handler.violations());
}

/// Must refuse snapshot requests made on the scheduler context.
///
/// * Enforced in: `SchedulerHandle::request_snapshot_with`
/// * Failure symptom: the scheduler waits on a creation only it can service.
#[test]
fn scheduler_context_requests_fail_the_invariant() {
	let fx = Fixture::new();
	let handle = fx.handle().clone();
	let served = spawn_context_thread(ContextKind::Scheduler, "fake-scheduler", move || {
		let snapshot = handle.request_snapshot::<TextLength>(0);
		let paused = handle.pause_all_blocking();
		(snapshot.is_none(), paused)
	})
	.expect("spawn")
	.join()
	.expect("join");

	assert!(served.0);
	assert!(matches!(
		served.1,
		Err(SchedulerError::WrongContext {
			context: ContextKind::Scheduler,
			..
		})
	));
	let violations = fx.handler.violations();
	assert_eq!(violations.len(), 2);
	assert!(violations[0].message.contains("request_snapshot must not run on the scheduler context"));
	assert!(fx.handle().records_blocking().expect("records").is_empty());
}

/// Must refuse a snapshot request made by a constructor, which runs on the scheduler.
///
/// * Enforced in: `SchedulerHandle::request_snapshot_with`
/// * Failure symptom: the scheduler blocks on its own command queue and every request hangs.
#[test]
fn constructor_requests_on_the_scheduler_fail_the_invariant() {
	let fx = Fixture::new();
	let nested_missed = Arc::new(AtomicBool::new(false));
	let make = {
		let handle = fx.handle().clone();
		let nested_missed = Arc::clone(&nested_missed);
		move |index: &usize, _: &CreateContext<'_>| {
			if handle.request_snapshot::<TextLength>(index + 1).is_none() {
				nested_missed.store(true, Ordering::Relaxed);
			}
			TextLength { index: *index }
		}
	};

	assert!(fx.handle().request_snapshot_with::<TextLength, _>(0, make).is_none());
	assert_eq!(*complete::<TextLength>(fx.handle(), 0), 5);
	assert!(nested_missed.load(Ordering::Relaxed));

	let violations = fx.handler.violations();
	assert_eq!(violations.len(), 1, "{violations:?}");
	assert_eq!(violations[0].context, Some(ContextKind::Scheduler));
	assert!(violations[0].message.contains("request_snapshot must not run on the scheduler context"));
	assert_eq!(fx.handle().records_blocking().expect("records").len(), 1);
}

#[test]
fn panicking_step_evicts_the_entry() {
	let fx = Fixture::new();
	let builds = Arc::new(AtomicUsize::new(0));
	let counted = {
		let builds = Arc::clone(&builds);
		move |_: &(), _: &CreateContext<'_>| {
			builds.fetch_add(1, Ordering::Relaxed);
			Panicker
		}
	};

	assert!(fx.handle().request_snapshot_with::<Panicker, _>((), counted.clone()).is_none());
	wait_for(|| (builds.load(Ordering::Relaxed) == 1).then_some(()));
	// Records round-trip through the scheduler, so the creation has been fully handled.
	wait_for(|| fx.handle().records_blocking().expect("records").is_empty().then_some(()));
	assert!(fx.handle().is_empty());

	assert!(fx.handle().request_snapshot_with::<Panicker, _>((), counted).is_none());
	wait_for(|| (builds.load(Ordering::Relaxed) == 2).then_some(()));
}

#[test]
fn creation_requested_while_paused_waits_for_resume() {
	let fx = Fixture::new();
	fx.handle().pause_all_blocking().expect("pause");
	assert!(fx.handle().request_snapshot::<TextLength>(1).is_none());

	std::thread::sleep(Duration::from_millis(20));
	assert!(fx.handle().records_blocking().expect("records").is_empty());

	fx.handle().resume_valid_and_discard_invalid_blocking().expect("resume");
	assert_eq!(*complete::<TextLength>(fx.handle(), 1), 2);
}

#[test]
fn records_are_sorted_by_type_then_descriptor() {
	let fx = Fixture::new();
	complete::<TextLength>(fx.handle(), 1);
	complete::<TextLength>(fx.handle(), 0);
	complete::<Doubled>(fx.handle(), 0);

	let records = fx.handle().records_blocking().expect("records");
	let summary: Vec<_> = records
		.iter()
		.map(|record| (record.daemon, record.descriptor.as_str(), record.state, record.version))
		.collect();
	assert_eq!(
		summary,
		vec![
			("Doubled", "0", DaemonState::Complete, 1),
			("TextLength", "0", DaemonState::Complete, 1),
			("TextLength", "1", DaemonState::Complete, 1),
		]
	);
	assert!(records.iter().all(|record| !record.blinded && !record.needs_requeue));
}

#[test]
fn idle_entries_are_collected_on_demand() {
	let fx = Fixture::with_config(DaemonConfig {
		idle_ttl_ms: Some(0),
		gc_interval_ms: 60_000,
		..DaemonConfig::default()
	});
	complete::<TextLength>(fx.handle(), 0);
	assert_eq!(fx.handle().collect_garbage_blocking().expect("gc"), 1);
	assert!(fx.handle().is_empty());
}

#[test]
fn entries_without_ttl_survive_collection() {
	let fx = Fixture::new();
	complete::<TextLength>(fx.handle(), 0);
	assert_eq!(fx.handle().collect_garbage_blocking().expect("gc"), 0);
	assert_eq!(fx.handle().len(), 1);
}

#[test]
fn shutdown_drops_everything_and_closes_the_handle() {
	let fx = Fixture::new();
	complete::<TextLength>(fx.handle(), 0);
	let _ = fx.handle().request_snapshot::<Ticker>("tick");
	let handle = fx.handle().clone();

	fx.scheduler.shutdown_blocking().expect("shutdown");
	assert!(handle.is_empty());
	assert!(handle.request_snapshot::<TextLength>(0).is_none());
	assert!(matches!(handle.pause_all_blocking(), Err(SchedulerError::Closed)));
}

#[test]
fn progress_counter_tracks_publications() {
	let fx = Fixture::new();
	let progress = fx.handle().subscribe_progress();
	let start = *progress.borrow();
	complete::<TextLength>(fx.handle(), 0);
	assert!(*progress.borrow() > start);
}
