use crate::{
	config::ManagerConfig,
	error::{BoxError, RunError},
	queue::BoundedQueue,
	work::WorkItem,
};

use super::Manager;

/// Worker pool executing [`WorkItem`]s in the order they were queued.
pub type TaskManager<A, E = BoxError> = Manager<WorkItem<A, E>, BoundedQueue<WorkItem<A, E>>>;

impl<A: Send + 'static, E: RunError> Manager<WorkItem<A, E>, BoundedQueue<WorkItem<A, E>>> {
	#[must_use]
	pub fn new(config: ManagerConfig) -> Self {
		let queue = BoundedQueue::new(config.capacity);

		Self::with_queue(config, queue)
	}
}
