//! Refresh throttling.
//!
//! Requests carry an upper bound on how long the presentation may wait. The
//! throttle keeps the earliest pending deadline; short bounds bypass it.

use std::time::Duration;

use tokio::time::Instant;

use crate::RefreshConfig;

#[derive(Debug)]
pub(crate) struct RefreshThrottle {
	immediate_threshold: Duration,
	deadline: Option<Instant>,
}

impl RefreshThrottle {
	pub(crate) fn new(config: &RefreshConfig) -> Self {
		Self {
			immediate_threshold: config.immediate_threshold(),
			deadline: None,
		}
	}

	/// Asks for a refresh no later than `within` from `now`.
	///
	/// Returns true when the caller should publish right away. An earlier
	/// pending deadline already covers the request.
	pub(crate) fn request(&mut self, within: Duration, now: Instant) -> bool {
		let desired = now + within;
		if let Some(deadline) = self.deadline
			&& deadline <= desired
		{
			return false;
		}
		if within < self.immediate_threshold {
			self.deadline = None;
			return true;
		}
		self.deadline = Some(desired);
		false
	}

	pub(crate) fn deadline(&self) -> Option<Instant> {
		self.deadline
	}

	/// Clears the pending deadline once it has been honoured.
	pub(crate) fn fire(&mut self) {
		self.deadline = None;
	}
}
