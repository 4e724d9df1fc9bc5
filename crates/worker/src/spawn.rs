use std::future::Future;

use crate::context::{self, ContextKind};

/// Spawns a dedicated named OS thread tagged with `kind` for its whole lifetime.
pub fn spawn_context_thread<F, R>(kind: ContextKind, name: impl Into<String>, f: F) -> std::io::Result<std::thread::JoinHandle<R>>
where
	F: FnOnce() -> R + Send + 'static,
	R: Send + 'static,
{
	let name = name.into();
	tracing::trace!(context = kind.as_str(), thread = %name, "worker.spawn_context_thread");
	std::thread::Builder::new().name(name).spawn(move || {
		let _context = context::enter(kind);
		f()
	})
}

/// Builds the single-threaded runtime a context loop is driven by.
///
/// Blocking work spawned from the runtime lands on at most `blocking_threads`
/// threads named `blocking_name`.
pub fn context_runtime(blocking_threads: usize, blocking_name: &str) -> std::io::Result<tokio::runtime::Runtime> {
	tokio::runtime::Builder::new_current_thread()
		.enable_time()
		.max_blocking_threads(blocking_threads.max(1))
		.thread_name(blocking_name)
		.build()
}

/// Spawns a context thread that drives `make_loop()` to completion on its own runtime.
///
/// The future is built on the new thread so it does not need to be `Send`.
pub fn spawn_context_loop<M, Fut>(
	kind: ContextKind,
	name: impl Into<String>,
	blocking_threads: usize,
	make_loop: M,
) -> std::io::Result<std::thread::JoinHandle<()>>
where
	M: FnOnce() -> Fut + Send + 'static,
	Fut: Future<Output = ()>,
{
	let name = name.into();
	let runtime = context_runtime(blocking_threads, &format!("{name}-pool"))?;
	spawn_context_thread(kind, name, move || {
		runtime.block_on(make_loop());
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn context_thread_is_tagged() {
		let handle = spawn_context_thread(ContextKind::Scheduler, "quill-test-scheduler", || {
			(context::current(), std::thread::current().name().map(str::to_owned))
		})
		.expect("spawn");
		let (kind, name) = handle.join().expect("join");
		assert_eq!(kind, Some(ContextKind::Scheduler));
		assert_eq!(name.as_deref(), Some("quill-test-scheduler"));
	}

	#[test]
	fn context_loop_runs_future_to_completion() {
		let (tx, rx) = std::sync::mpsc::channel();
		let handle = spawn_context_loop(ContextKind::Worker, "quill-test-worker", 1, move || async move {
			tokio::time::sleep(std::time::Duration::from_millis(1)).await;
			let _ = tx.send(context::current());
		})
		.expect("spawn");
		handle.join().expect("join");
		assert_eq!(rx.recv().ok().flatten(), Some(ContextKind::Worker));
	}
}
