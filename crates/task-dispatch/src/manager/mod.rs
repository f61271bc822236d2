//! Worker pools dispatching queued work.
//!
//! [`Manager`] is generic over the queue it pulls from; [`TaskManager`] (FIFO) and
//! [`PriorityTaskManager`] (binary heap) are the two flavours built on top of it.

use std::{
	marker::PhantomData,
	mem,
	sync::{Arc, Mutex, PoisonError},
};

use futures_concurrency::future::Join;
use tokio::sync::oneshot;
use tracing::{debug, error, instrument, trace, warn};

use super::{
	config::ManagerConfig,
	error::{Error, PushError},
	queue::DispatchQueue,
	registry::{CancelHandle, TaskRegistry},
	work::Work,
};

mod fifo;
mod priority;
mod worker;

pub use fifo::TaskManager;
pub use priority::PriorityTaskManager;

/// A blocking-mode worker, stopped through its cancellation token.
#[derive(Debug)]
struct Stopper {
	cancel: CancelHandle,
	exit_rx: oneshot::Receiver<()>,
}

/// A fixed size pool of workers bound to one queue.
///
/// Workers are lightweight tasks spawned through the manager's own [`TaskRegistry`]. In
/// non-blocking mode a worker exits as soon as it finds the queue empty. In blocking mode it
/// waits for more work until [`Manager::shutdown`] is called.
pub struct Manager<I, Q> {
	name: String,
	worker_count: usize,
	blocking: bool,
	registry: TaskRegistry,
	queue: Arc<Q>,
	exits: Mutex<Vec<oneshot::Receiver<()>>>,
	stoppers: Mutex<Vec<Stopper>>,
	_item: PhantomData<fn() -> I>,
}

impl<I, Q> std::fmt::Debug for Manager<I, Q> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Manager")
			.field("name", &self.name)
			.field("worker_count", &self.worker_count)
			.field("blocking", &self.blocking)
			.field("registry", &self.registry)
			.finish_non_exhaustive()
	}
}

impl<I: Work, Q: DispatchQueue<I>> Manager<I, Q> {
	/// Build a manager around any queue implementing [`DispatchQueue`].
	pub fn with_queue(config: ManagerConfig, queue: Q) -> Self {
		let worker_count = config.effective_worker_count();
		let ManagerConfig { name, blocking, .. } = config;

		debug!(manager = %name, worker_count, blocking, "Task manager created");

		Self {
			registry: TaskRegistry::new(format!("{name}.registry")),
			name,
			worker_count,
			blocking,
			queue: Arc::new(queue),
			exits: Mutex::default(),
			stoppers: Mutex::default(),
			_item: PhantomData,
		}
	}

	#[must_use]
	pub fn name(&self) -> &str {
		&self.name
	}

	#[must_use]
	pub const fn worker_count(&self) -> usize {
		self.worker_count
	}

	#[must_use]
	pub const fn is_blocking(&self) -> bool {
		self.blocking
	}

	#[must_use]
	pub const fn registry(&self) -> &TaskRegistry {
		&self.registry
	}

	/// Number of workers still alive.
	#[must_use]
	pub fn live_workers(&self) -> usize {
		self.registry.count()
	}

	#[must_use]
	pub fn queue_size(&self) -> usize {
		self.queue.len()
	}

	/// Queue `item` without waiting, fails when a bounded queue is full.
	pub fn push_task(&self, item: I) -> Result<(), PushError<I>> {
		self.queue.push(item)
	}

	/// Queue `item`, waiting for a free slot when a bounded queue is full.
	pub async fn push_task_blocking(&self, item: I) -> Result<(), PushError<I>> {
		self.queue.push_blocking(item).await
	}

	/// Queue `item` using the push flavour matching the manager mode.
	pub async fn dispatch(&self, item: I) -> Result<(), PushError<I>> {
		if self.blocking {
			self.push_task_blocking(item).await
		} else {
			self.push_task(item)
		}
	}

	/// Take the next item the same way the workers do: waiting for one in blocking mode,
	/// failing with [`Error::QueueEmpty`] otherwise.
	pub async fn pop_task(&self) -> Result<I, Error> {
		if self.blocking {
			self.queue.pop_blocking().await
		} else {
			self.queue.pop()
		}
	}

	/// Spawn the workers.
	///
	/// With `detach` set, non-blocking workers keep no exit marker and [`Manager::wait`] returns
	/// right away. Blocking workers always stay reachable through [`Manager::shutdown`].
	///
	/// Must be called from within a tokio runtime.
	#[instrument(skip(self), fields(manager = %self.name, blocking = self.blocking))]
	pub fn run(&self, detach: bool) {
		for index in 0..self.worker_count {
			let worker_name = format!("{}.worker{index}", self.name);
			let queue = Arc::clone(&self.queue);

			if self.blocking {
				let (exit_tx, exit_rx) = oneshot::channel();

				let (_, cancel) = self
					.registry
					.spawn_cancellable(worker_name, move |task| {
						worker::run_blocking(task, queue, exit_tx)
					});

				self.stoppers
					.lock()
					.unwrap_or_else(PoisonError::into_inner)
					.push(Stopper { cancel, exit_rx });
			} else {
				let exit_tx = (!detach).then(|| {
					let (exit_tx, exit_rx) = oneshot::channel();

					self.exits
						.lock()
						.unwrap_or_else(PoisonError::into_inner)
						.push(exit_rx);

					exit_tx
				});

				self.registry.spawn(worker_name, move |task| {
					worker::run(task, queue, exit_tx)
				});
			}
		}

		trace!(workers = self.worker_count, "Workers spawned");
	}

	/// Wait for every non-detached, non-blocking worker to drain the queue and exit.
	#[instrument(skip(self), fields(manager = %self.name))]
	pub async fn wait(&self) {
		let exits = mem::take(&mut *self.exits.lock().unwrap_or_else(PoisonError::into_inner));

		if exits.is_empty() {
			return;
		}

		for res in exits.join().await {
			if res.is_err() {
				error!("Worker exited without signalling completion");
			}
		}

		debug!("All workers exited");
	}

	/// [`Manager::run`] then [`Manager::wait`].
	///
	/// Must be called from within a tokio runtime.
	pub async fn run_and_wait(&self, detach: bool) {
		self.run(detach);
		self.wait().await;
	}

	/// Stop blocking workers and wait for every worker to exit.
	///
	/// Blocking workers notice the request between two items, a running work item is never
	/// interrupted. Calling it more than once is fine.
	#[instrument(skip(self), fields(manager = %self.name))]
	pub async fn shutdown(&self) {
		let stoppers =
			mem::take(&mut *self.stoppers.lock().unwrap_or_else(PoisonError::into_inner));

		let exit_rxs = stoppers
			.into_iter()
			.map(|Stopper { cancel, exit_rx }| {
				cancel.cancel();
				exit_rx
			})
			.collect::<Vec<_>>();

		if !exit_rxs.is_empty() {
			for res in exit_rxs.join().await {
				if res.is_err() {
					error!("Blocking worker exited without signalling completion");
				}
			}
		}

		self.wait().await;

		debug!("Task manager shutdown");
	}

	/// Tear the manager down, dropping whatever is still queued.
	///
	/// Must only be called once the workers stopped, see [`Manager::wait`] and
	/// [`Manager::shutdown`]. Workers still running see [`Error::Destroyed`] on their next pop.
	pub fn destroy(self) {
		let live_workers = self.registry.count();
		if live_workers > 0 {
			warn!(
				manager = %self.name,
				live_workers,
				"Destroying task manager with workers still running"
			);
		}

		self.queue.destroy();

		debug!(manager = %self.name, "Task manager destroyed");
	}
}
