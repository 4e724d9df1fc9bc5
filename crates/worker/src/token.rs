use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio_util::sync::CancellationToken;

/// Hands out pause epochs, each with its own cancellation token.
///
/// Clones share the counter, so generations stay unique across them.
#[derive(Debug, Default, Clone)]
pub struct GenerationClock {
	issued: Arc<AtomicU64>,
}

impl GenerationClock {
	pub fn new() -> Self {
		Self::default()
	}

	/// Starts a new epoch. The first token is generation 1.
	pub fn token(&self) -> GenerationToken {
		let generation = self.issued.fetch_add(1, Ordering::AcqRel).wrapping_add(1);
		GenerationToken {
			generation,
			cancel: CancellationToken::new(),
		}
	}
}

/// Cancellation scoped to one epoch.
///
/// The scheduler hands a clone to every compute step of the epoch;
/// cancelling it asks all of them to yield at their next safe point.
/// A later epoch never revives a cancelled token.
#[derive(Debug, Clone)]
pub struct GenerationToken {
	generation: u64,
	cancel: CancellationToken,
}

impl GenerationToken {
	pub const fn generation(&self) -> u64 {
		self.generation
	}

	pub fn is_cancelled(&self) -> bool {
		self.cancel.is_cancelled()
	}

	pub fn cancel(&self) {
		self.cancel.cancel();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn epochs_are_numbered_across_clones() {
		let clock = GenerationClock::new();
		let first = clock.token();
		let second = clock.clone().token();
		let third = clock.token();
		assert_eq!((first.generation(), second.generation(), third.generation()), (1, 2, 3));
	}

	#[test]
	fn cancelling_one_epoch_leaves_the_next_running() {
		let clock = GenerationClock::new();
		let paused = clock.token();
		let step = paused.clone();
		paused.cancel();
		assert!(step.is_cancelled());

		let resumed = clock.token();
		assert!(!resumed.is_cancelled());
		assert!(step.is_cancelled());
	}
}
