use serde::{Deserialize, Serialize};
use tracing::{error, warn};

/// Settings shared by both task managers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
	/// Prefix for the registry and the worker names.
	pub name: String,
	/// Number of workers spawned by `run`.
	pub worker_count: usize,
	/// Workers wait for work instead of exiting once the queue is drained, and
	/// `dispatch` waits for a free slot instead of failing on a full queue.
	pub blocking: bool,
	/// Maximum queued items, 0 means unbounded.
	pub capacity: usize,
}

impl Default for ManagerConfig {
	fn default() -> Self {
		let worker_count = std::thread::available_parallelism().map_or_else(
			|e| {
				error!(?e, "Failed to get available parallelism for the task manager");
				1
			},
			|non_zero| non_zero.get(),
		);

		Self {
			name: "task-manager".to_string(),
			worker_count,
			blocking: false,
			capacity: 0,
		}
	}
}

impl ManagerConfig {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			..Default::default()
		}
	}

	#[must_use]
	pub fn with_worker_count(mut self, worker_count: usize) -> Self {
		self.worker_count = worker_count;
		self
	}

	#[must_use]
	pub fn with_blocking(mut self, blocking: bool) -> Self {
		self.blocking = blocking;
		self
	}

	#[must_use]
	pub fn with_capacity(mut self, capacity: usize) -> Self {
		self.capacity = capacity;
		self
	}

	pub(crate) fn effective_worker_count(&self) -> usize {
		if self.worker_count == 0 {
			warn!(manager = %self.name, "Task manager configured with 0 workers, using 1");
			1
		} else {
			self.worker_count
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn partial_config_falls_back_to_defaults() {
		let config: ManagerConfig =
			serde_json::from_str(r#"{ "name": "ingest", "capacity": 64 }"#).unwrap();

		assert_eq!(config.name, "ingest");
		assert_eq!(config.capacity, 64);
		assert!(!config.blocking);
		assert!(config.worker_count >= 1);
	}

	#[test]
	fn zero_workers_is_clamped() {
		let config = ManagerConfig::new("empty").with_worker_count(0);

		assert_eq!(config.effective_worker_count(), 1);
	}
}
