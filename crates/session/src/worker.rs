//! The document-owning worker loop.
//!
//! Owns the [`Document`], the scheduler, the resolver and the executor. Every
//! contact and queued operation is handled here in arrival order, so status
//! events are raised in the same order the contacts were submitted.

use quill_daemon::Scheduler;
use quill_document::{Document, DocumentReader};
use quill_worker::Invariants;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;

use crate::events::EventSink;
use crate::executor::Executor;
use crate::refresh::RefreshThrottle;
use crate::{Config, Contact, GestureError, GestureResolver, Hit, Operation, OperationProvider, ResolveContext, SessionEvent, Status, Step};

pub(crate) enum Request<H> {
	Contact { kind: Contact, hit: Option<H> },
	Queue(Box<dyn Operation>),
	Shutdown { reply: Option<oneshot::Sender<()>> },
}

pub(crate) struct WorkerLoop<H, P> {
	document: Document,
	reader: DocumentReader,
	scheduler: Scheduler,
	provider: P,
	resolver: GestureResolver<H>,
	executor: Executor,
	events: EventSink,
	invariants: Invariants,
	config: Config,
	requests: mpsc::UnboundedReceiver<Request<H>>,
	progress: watch::Receiver<u64>,
	hover: Option<Instant>,
	refresh: RefreshThrottle,
}

impl<H: Hit, P: OperationProvider<H>> WorkerLoop<H, P> {
	pub(crate) fn new(
		document: Document,
		scheduler: Scheduler,
		provider: P,
		config: Config,
		events: EventSink,
		invariants: Invariants,
		requests: mpsc::UnboundedReceiver<Request<H>>,
	) -> Self {
		let reader = document.reader();
		let progress = scheduler.handle().subscribe_progress();
		let executor = Executor::new(scheduler.handle().clone(), events.clone(), invariants.clone());
		let refresh = RefreshThrottle::new(&config.refresh);
		let resolver = GestureResolver::new(invariants.clone());
		Self {
			document,
			reader,
			scheduler,
			provider,
			resolver,
			executor,
			events,
			invariants,
			config,
			requests,
			progress,
			hover: None,
			refresh,
		}
	}

	pub(crate) async fn run(mut self) {
		tracing::debug!("worker.start");
		let mut progress_open = true;
		let reply = loop {
			tokio::select! {
				biased;
				request = self.requests.recv() => match request {
					Some(Request::Contact { kind, hit }) => self.contact(kind, hit).await,
					Some(Request::Queue(operation)) => {
						self.executor.invoke(&mut self.document, operation).await;
						self.request_refresh(self.config.refresh.perceivable());
					}
					Some(Request::Shutdown { reply }) => break reply,
					None => break None,
				},
				() = sleep_until(self.hover) => {
					self.hover = None;
					let cx = ResolveContext {
						document: &self.reader,
						scheduler: self.scheduler.handle(),
					};
					let step = self.resolver.hover_elapsed(&self.provider, &cx);
					self.apply(step).await;
				}
				() = sleep_until(self.refresh.deadline()) => {
					self.refresh.fire();
					self.publish_refresh();
				}
				changed = self.progress.changed(), if progress_open => match changed {
					Ok(()) => self.request_refresh(self.config.refresh.daemon_progress()),
					Err(_) => progress_open = false,
				},
			}
		};

		tracing::debug!(status = %self.resolver.status(), "worker.shutdown");
		if let Err(err) = self.scheduler.shutdown().await {
			tracing::warn!(error = %err, "worker.shutdown.scheduler");
		}
		if let Some(reply) = reply {
			let _ = reply.send(());
		}
	}

	async fn contact(&mut self, kind: Contact, hit: Option<H>) {
		tracing::trace!(?kind, ?hit, status = %self.resolver.status(), "worker.contact");
		match self.resolve(kind, hit) {
			Ok(step) => self.apply(step).await,
			Err(err) => self.invariants.fail(err.to_string()),
		}
	}

	fn resolve(&mut self, kind: Contact, hit: Option<H>) -> Result<Step, GestureError> {
		let cx = ResolveContext {
			document: &self.reader,
			scheduler: self.scheduler.handle(),
		};
		let provider: &dyn OperationProvider<H> = &self.provider;
		match kind {
			Contact::Glance => self.resolver.glance(hit, provider, &cx),
			Contact::First => Ok(self.resolver.first(hit, provider, &cx)),
			Contact::Next => self.resolver.next(hit, provider, &cx),
			Contact::Last => self.resolver.last(hit, provider, &cx),
		}
	}

	async fn apply(&mut self, step: Step) {
		match step {
			Step::Unchanged => {}
			Step::Report { status, description } => self.report(status, description),
			Step::Commit { operation } => {
				self.hover = None;
				self.publish_refresh();
				match operation {
					Some(operation) => {
						self.executor.invoke(&mut self.document, operation).await;
					}
					None => tracing::debug!(hits = self.resolver.hits().len(), "worker.commit.empty"),
				}
				if let Step::Report { status, description } = self.resolver.finish() {
					self.report(status, description);
				}
			}
		}
	}

	fn report(&mut self, status: Status, description: Option<String>) {
		self.hover = (status == Status::Glancing).then(|| Instant::now() + self.config.gesture.hover_delay());
		self.events.publish(SessionEvent::StatusChanged { status, description });
		self.request_refresh(self.config.refresh.perceivable());
	}

	fn request_refresh(&mut self, within: std::time::Duration) {
		if self.refresh.request(within, Instant::now()) {
			self.publish_refresh();
		}
	}

	fn publish_refresh(&self) {
		self.events.publish(SessionEvent::Refresh {
			status: self.resolver.status(),
		});
	}
}

async fn sleep_until(deadline: Option<Instant>) {
	match deadline {
		Some(deadline) => tokio::time::sleep_until(deadline).await,
		None => std::future::pending().await,
	}
}
