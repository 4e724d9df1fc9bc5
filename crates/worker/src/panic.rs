use std::any::Any;

/// The message a panic was raised with, if its payload is a string.
pub fn panic_message(payload: &(dyn Any + Send)) -> Option<String> {
	match payload.downcast_ref::<&'static str>() {
		Some(message) => Some((*message).to_owned()),
		None => payload.downcast_ref::<String>().cloned(),
	}
}

/// Panic message of a task that failed. `None` means the task was cancelled.
pub fn join_error_panic_message(err: tokio::task::JoinError) -> Option<String> {
	if err.is_cancelled() {
		return None;
	}
	let payload = err.into_panic();
	Some(panic_message(&*payload).unwrap_or_else(|| String::from("<non-string panic payload>")))
}
