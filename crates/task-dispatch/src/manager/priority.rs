use std::{cmp::Ordering, sync::Arc};

use crate::{
	config::ManagerConfig,
	error::{BoxError, Error, RunError},
	queue::{HeapOrder, PriorityQueue},
	work::PriorityWorkItem,
};

use super::Manager;

/// Worker pool executing [`PriorityWorkItem`]s, the best priority under the configured
/// [`HeapOrder`] first.
pub type PriorityTaskManager<A, P, E = BoxError> =
	Manager<PriorityWorkItem<A, P, E>, PriorityQueue<PriorityWorkItem<A, P, E>>>;

impl<A, P, E> Manager<PriorityWorkItem<A, P, E>, PriorityQueue<PriorityWorkItem<A, P, E>>>
where
	A: Send + 'static,
	P: Send + 'static,
	E: RunError,
{
	/// `cmp` orders priorities, items are compared through it and nothing else.
	pub fn new(
		config: ManagerConfig,
		order: HeapOrder,
		cmp: impl Fn(&P, &P) -> Ordering + Send + Sync + 'static,
	) -> Self {
		let capacity = config.capacity;

		let queue = PriorityQueue::with_comparator(
			order,
			Arc::new(move |l: &PriorityWorkItem<A, P, E>, r: &PriorityWorkItem<A, P, E>| {
				cmp(l.priority(), r.priority())
			}),
			capacity,
		);

		Self::with_queue(config, queue)
	}

	#[must_use]
	pub fn order(&self) -> HeapOrder {
		self.queue.order()
	}

	/// Priority of the item the next pop would return.
	pub fn top_priority(&self) -> Result<P, Error>
	where
		P: Clone,
	{
		self.queue.top_with(|item| item.priority().clone())
	}
}
