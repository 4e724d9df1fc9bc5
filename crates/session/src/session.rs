use std::thread::JoinHandle;

use quill_daemon::{Scheduler, SchedulerHandle};
use quill_document::{Document, DocumentReader, Tree};
use quill_worker::{ContextKind, Invariants, panic_message, spawn_context_loop};
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::events::EventSink;
use crate::worker::{Request, WorkerLoop};
use crate::{Config, Contact, Hit, Operation, OperationProvider, SessionError, SessionEvent};

/// Handle to a running session: the worker thread, its document and its daemons.
///
/// Dropping it asks the worker to shut down without waiting; use
/// [`Session::shutdown`] to wait until every daemon has been dropped.
pub struct Session<H> {
	requests: mpsc::UnboundedSender<Request<H>>,
	events: EventSink,
	reader: DocumentReader,
	scheduler: SchedulerHandle,
	invariants: Invariants,
	thread: Option<JoinHandle<()>>,
}

impl<H> std::fmt::Debug for Session<H> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Session")
			.field("version", &self.reader.version())
			.field("daemons", &self.scheduler.len())
			.field("running", &self.thread.is_some())
			.finish()
	}
}

impl<H: Hit> Session<H> {
	/// Takes ownership of `root` and starts the scheduler and worker threads.
	pub fn spawn<P>(config: Config, root: Tree, provider: P, invariants: Invariants) -> Result<Self, SessionError>
	where
		P: OperationProvider<H>,
	{
		let document = Document::new(root);
		let nodes = document.node_count();
		let reader = document.reader();
		let scheduler = Scheduler::spawn(document.reader(), config.daemons.clone(), invariants.clone())?;
		let handle = scheduler.handle().clone();
		let events = EventSink::new(config.events.capacity);
		let (requests, request_rx) = mpsc::unbounded_channel();

		tracing::info!(
			nodes,
			hover_delay_ms = config.gesture.hover_delay_ms,
			"session.spawn"
		);
		let worker = WorkerLoop::new(document, scheduler, provider, config, events.clone(), invariants.clone(), request_rx);
		let thread = spawn_context_loop(ContextKind::Worker, "quill-worker", 1, move || worker.run())?;

		Ok(Self {
			requests,
			events,
			reader,
			scheduler: handle,
			invariants,
			thread: Some(thread),
		})
	}

	/// Forwards a pointer contact to the worker. Never blocks.
	pub fn submit_contact(&self, kind: Contact, hit: Option<H>) -> Result<(), SessionError> {
		self.send(Request::Contact { kind, hit })
	}

	/// Invokes `operation` on the worker outside of any gesture.
	pub fn queue_operation(&self, operation: Box<dyn Operation>) -> Result<(), SessionError> {
		tracing::debug!(operation = %operation.description(), "session.queue");
		self.send(Request::Queue(operation))
	}

	/// Events raised after this call, in the order the worker raised them.
	pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
		self.events.subscribe()
	}

	/// Unobserved reader over the session's document.
	pub fn document(&self) -> &DocumentReader {
		&self.reader
	}

	pub fn daemons(&self) -> &SchedulerHandle {
		&self.scheduler
	}

	pub fn invariants(&self) -> &Invariants {
		&self.invariants
	}

	/// Drains the worker, shuts the scheduler down and joins the worker thread.
	pub async fn shutdown(mut self) -> Result<(), SessionError> {
		let (reply, done) = oneshot::channel();
		self.send(Request::Shutdown { reply: Some(reply) })?;
		let result = done.await.map_err(|_| SessionError::Closed);
		self.join();
		result
	}

	/// Blocking flavor of [`Session::shutdown`]. Must not be called from an async context.
	pub fn shutdown_blocking(mut self) -> Result<(), SessionError> {
		let (reply, done) = oneshot::channel();
		self.send(Request::Shutdown { reply: Some(reply) })?;
		let result = done.blocking_recv().map_err(|_| SessionError::Closed);
		self.join();
		result
	}

	fn send(&self, request: Request<H>) -> Result<(), SessionError> {
		self.requests.send(request).map_err(|_| SessionError::Closed)
	}
}

impl<H> Session<H> {
	fn join(&mut self) {
		let Some(thread) = self.thread.take() else {
			return;
		};
		if let Err(payload) = thread.join() {
			tracing::error!(panic = panic_message(&*payload).as_deref().unwrap_or("<non-string panic payload>"), "session.join");
		}
	}
}

impl<H> Drop for Session<H> {
	fn drop(&mut self) {
		if self.thread.take().is_some() {
			let _ = self.requests.send(Request::Shutdown { reply: None });
		}
	}
}
