use std::path::{Path, PathBuf};
use std::time::Duration;

use quill_daemon::DaemonConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from loading a session config.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("failed to read {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("invalid config: {0}")]
	Parse(#[from] toml::de::Error),
}

/// Session configuration. Every section and key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
	pub gesture: GestureConfig,
	pub refresh: RefreshConfig,
	pub events: EventsConfig,
	pub daemons: DaemonConfig,
}

impl Config {
	pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
		Ok(toml::from_str(source)?)
	}

	pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
			path: path.to_path_buf(),
			source,
		})?;
		let config = Self::from_toml_str(&source)?;
		tracing::debug!(path = %path.display(), "config.load");
		Ok(config)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GestureConfig {
	/// Delay between a glance and the hover that follows it.
	pub hover_delay_ms: u64,
}

impl Default for GestureConfig {
	fn default() -> Self {
		Self { hover_delay_ms: 1000 }
	}
}

impl GestureConfig {
	pub fn hover_delay(&self) -> Duration {
		Duration::from_millis(self.hover_delay_ms)
	}
}

/// Refresh deadlines, see [`crate::SessionEvent::Refresh`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RefreshConfig {
	/// Upper bound after a user-driven change.
	pub perceivable_ms: u64,
	/// Upper bound after a daemon published progress.
	pub daemon_progress_ms: u64,
	/// Requests shorter than this publish immediately.
	pub immediate_threshold_ms: u64,
}

impl Default for RefreshConfig {
	fn default() -> Self {
		Self {
			perceivable_ms: 33,
			daemon_progress_ms: 330,
			immediate_threshold_ms: 10,
		}
	}
}

impl RefreshConfig {
	pub fn perceivable(&self) -> Duration {
		Duration::from_millis(self.perceivable_ms)
	}

	pub fn daemon_progress(&self) -> Duration {
		Duration::from_millis(self.daemon_progress_ms)
	}

	pub fn immediate_threshold(&self) -> Duration {
		Duration::from_millis(self.immediate_threshold_ms)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EventsConfig {
	/// Broadcast buffer; slow subscribers lag past this many events.
	pub capacity: usize,
}

impl Default for EventsConfig {
	fn default() -> Self {
		Self { capacity: 256 }
	}
}
