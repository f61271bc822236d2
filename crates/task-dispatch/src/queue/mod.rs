//! Blocking bounded queues.
//!
//! Both queues share the same blocking machinery: a mutex guarded storage plus two
//! [`Notify`] instances standing in for the "item available" and "slot available" condition
//! variables. Blocking calls suspend the calling tokio task, never the OS thread.

use std::{
	fmt,
	future::Future,
	pin::pin,
	sync::{Mutex, MutexGuard},
};

use tokio::sync::Notify;
use tracing::{debug, warn};

use super::error::{Error, PushError};

mod fifo;
mod priority;

pub use fifo::BoundedQueue;
pub use priority::{Comparator, HeapOrder, PriorityQueue};

/// The seam between the managers and the queue flavour they dispatch from.
pub trait DispatchQueue<T>: Send + Sync + 'static {
	/// Non-blocking push, fails with [`Error::QueueFull`] when a bounded queue is at capacity.
	fn push(&self, item: T) -> Result<(), PushError<T>>;

	/// Waits for a free slot when a bounded queue is at capacity.
	fn push_blocking(&self, item: T) -> impl Future<Output = Result<(), PushError<T>>> + Send;

	/// Non-blocking pop, fails with [`Error::QueueEmpty`] when there is nothing queued.
	fn pop(&self) -> Result<T, Error>;

	/// Waits until an item is available.
	fn pop_blocking(&self) -> impl Future<Output = Result<T, Error>> + Send;

	/// Snapshot of the current length, may be stale as soon as it returns.
	fn len(&self) -> usize;

	fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Drops every queued item and wakes every blocked caller with [`Error::Destroyed`].
	fn destroy(&self);
}

/// Backing container of a queue, only ever touched with the queue lock held.
pub(crate) trait Storage: Send {
	type Item;

	fn len(&self) -> usize;

	fn put(&mut self, item: Self::Item) -> Result<(), Error>;

	fn take(&mut self) -> Result<Option<Self::Item>, Error>;

	/// Restore the container invariants after a panic left it half updated.
	fn repair(&mut self) {}
}

pub(crate) struct BlockingCore<S> {
	// `None` once destroyed
	storage: Mutex<Option<S>>,
	capacity: usize,
	item_available: Notify,
	// Only bounded queues can be full
	slot_available: Option<Notify>,
}

impl<S> fmt::Debug for BlockingCore<S> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("BlockingCore")
			.field("capacity", &self.capacity)
			.field("bounded", &self.slot_available.is_some())
			.finish_non_exhaustive()
	}
}

impl<S: Storage> BlockingCore<S> {
	pub(crate) fn new(storage: S, capacity: usize) -> Self {
		Self {
			storage: Mutex::new(Some(storage)),
			capacity,
			item_available: Notify::new(),
			slot_available: (capacity != 0).then(Notify::new),
		}
	}

	pub(crate) const fn capacity(&self) -> usize {
		self.capacity
	}

	/// A user comparator may panic mid update, so a poisoned storage is repaired before reuse.
	pub(crate) fn lock(&self) -> MutexGuard<'_, Option<S>> {
		self.storage.lock().unwrap_or_else(|poisoned| {
			let mut guard = poisoned.into_inner();

			if let Some(storage) = guard.as_mut() {
				warn!("Queue lock poisoned, repairing storage");
				storage.repair();
			}

			self.storage.clear_poison();

			guard
		})
	}

	const fn is_full(&self, len: usize) -> bool {
		self.capacity != 0 && len >= self.capacity
	}

	pub(crate) fn len(&self) -> usize {
		self.lock().as_ref().map_or(0, Storage::len)
	}

	pub(crate) fn push(&self, item: S::Item) -> Result<(), PushError<S::Item>> {
		{
			let mut guard = self.lock();
			let Some(storage) = guard.as_mut() else {
				return Err(PushError::new(Error::Destroyed, item));
			};

			if self.is_full(storage.len()) {
				return Err(PushError::new(
					Error::QueueFull {
						capacity: self.capacity,
					},
					item,
				));
			}

			storage.put(item).map_err(PushError::consumed)?;
		}

		self.item_available.notify_one();

		Ok(())
	}

	pub(crate) async fn push_blocking(&self, item: S::Item) -> Result<(), PushError<S::Item>> {
		let Some(slot_available) = &self.slot_available else {
			// Unbounded queues never block on push
			return self.push(item);
		};

		let mut notified = pin!(slot_available.notified());

		loop {
			// Register before checking so a pop between the check and the await isn't missed
			notified.as_mut().enable();

			{
				let mut guard = self.lock();
				let Some(storage) = guard.as_mut() else {
					return Err(PushError::new(Error::Destroyed, item));
				};

				if !self.is_full(storage.len()) {
					storage.put(item).map_err(PushError::consumed)?;
					drop(guard);

					self.item_available.notify_one();

					return Ok(());
				}
			}

			notified.as_mut().await;
			notified.set(slot_available.notified());
		}
	}

	/// Called with the lock released, after an item left the storage.
	fn on_taken(&self, remaining: usize) {
		if let Some(slot_available) = &self.slot_available {
			slot_available.notify_one();
		}

		// Chain the hand-off so a burst of pushes drains into every waiting consumer
		if remaining > 0 {
			self.item_available.notify_one();
		}
	}

	pub(crate) fn pop(&self) -> Result<S::Item, Error> {
		let (item, remaining) = {
			let mut guard = self.lock();
			let storage = guard.as_mut().ok_or(Error::Destroyed)?;
			let item = storage.take()?.ok_or(Error::QueueEmpty)?;

			(item, storage.len())
		};

		self.on_taken(remaining);

		Ok(item)
	}

	pub(crate) async fn pop_blocking(&self) -> Result<S::Item, Error> {
		let mut notified = pin!(self.item_available.notified());

		loop {
			notified.as_mut().enable();

			let taken = {
				let mut guard = self.lock();
				let storage = guard.as_mut().ok_or(Error::Destroyed)?;

				storage.take()?.map(|item| (item, storage.len()))
			};

			if let Some((item, remaining)) = taken {
				self.on_taken(remaining);
				return Ok(item);
			}

			notified.as_mut().await;
			notified.set(self.item_available.notified());
		}
	}

	pub(crate) fn destroy(&self) {
		let dropped = self.lock().take().map_or(0, |storage| storage.len());

		debug!(dropped, "Queue destroyed");

		self.item_available.notify_waiters();
		if let Some(slot_available) = &self.slot_available {
			slot_available.notify_waiters();
		}
	}
}
