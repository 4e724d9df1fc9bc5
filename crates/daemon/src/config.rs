use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Scheduler tuning, usually read from the `[daemons]` config section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonConfig {
	/// Maximum number of daemon steps running at once.
	pub pool_size: usize,
	/// Period of the idle garbage-collection sweep.
	pub gc_interval_ms: u64,
	/// Entries not requested for this long are collected. `None` keeps them
	/// until invalidated.
	pub idle_ttl_ms: Option<u64>,
}

impl Default for DaemonConfig {
	fn default() -> Self {
		Self {
			pool_size: 4,
			gc_interval_ms: 5000,
			idle_ttl_ms: None,
		}
	}
}

impl DaemonConfig {
	pub fn pool_size(&self) -> usize {
		self.pool_size.max(1)
	}

	pub fn gc_interval(&self) -> Duration {
		Duration::from_millis(self.gc_interval_ms.max(1))
	}

	pub fn idle_ttl(&self) -> Option<Duration> {
		self.idle_ttl_ms.map(Duration::from_millis)
	}
}
