use std::collections::VecDeque;

use crate::error::{Error, PushError};

use super::{BlockingCore, DispatchQueue, Storage};

impl<T: Send> Storage for VecDeque<T> {
	type Item = T;

	fn len(&self) -> usize {
		Self::len(self)
	}

	fn put(&mut self, item: T) -> Result<(), Error> {
		self.push_back(item);
		Ok(())
	}

	fn take(&mut self) -> Result<Option<T>, Error> {
		Ok(self.pop_front())
	}
}

/// Thread-safe FIFO queue with an optional capacity bound.
///
/// A capacity of 0 means unbounded: pushes never fail nor block. Items come out in the exact
/// order they went in, whichever task pops them.
#[derive(Debug)]
pub struct BoundedQueue<T> {
	core: BlockingCore<VecDeque<T>>,
}

impl<T: Send> BoundedQueue<T> {
	#[must_use]
	pub fn new(capacity: usize) -> Self {
		Self {
			core: BlockingCore::new(VecDeque::new(), capacity),
		}
	}

	#[must_use]
	pub fn unbounded() -> Self {
		Self::new(0)
	}

	#[must_use]
	pub const fn capacity(&self) -> usize {
		self.core.capacity()
	}

	pub fn push_back(&self, item: T) -> Result<(), PushError<T>> {
		self.core.push(item)
	}

	/// Suspends until a slot frees up when the queue is full.
	///
	/// Only fails if the queue gets destroyed meanwhile, giving the item back.
	pub async fn push_back_blocking(&self, item: T) -> Result<(), PushError<T>> {
		self.core.push_blocking(item).await
	}

	pub fn pop_front(&self) -> Result<T, Error> {
		self.core.pop()
	}

	/// Suspends until an item is available and removes the head.
	pub async fn pop_front_blocking(&self) -> Result<T, Error> {
		self.core.pop_blocking().await
	}

	#[must_use]
	pub fn size(&self) -> usize {
		self.core.len()
	}

	/// Drops all queued items, every later call fails with [`Error::Destroyed`].
	pub fn destroy(&self) {
		self.core.destroy();
	}
}

impl<T: Send + 'static> DispatchQueue<T> for BoundedQueue<T> {
	fn push(&self, item: T) -> Result<(), PushError<T>> {
		self.push_back(item)
	}

	async fn push_blocking(&self, item: T) -> Result<(), PushError<T>> {
		self.push_back_blocking(item).await
	}

	fn pop(&self) -> Result<T, Error> {
		self.pop_front()
	}

	async fn pop_blocking(&self) -> Result<T, Error> {
		self.pop_front_blocking().await
	}

	fn len(&self) -> usize {
		self.size()
	}

	fn destroy(&self) {
		Self::destroy(self);
	}
}

#[cfg(test)]
mod tests {
	use std::{sync::Arc, time::Duration};

	use tokio::{spawn, time::sleep};

	use super::*;

	#[test]
	fn preserves_push_order() {
		let queue = BoundedQueue::unbounded();

		for i in 0..100 {
			queue.push_back(i).unwrap();
		}

		let popped = (0..100)
			.map(|_| queue.pop_front().unwrap())
			.collect::<Vec<_>>();

		assert_eq!(popped, (0..100).collect::<Vec<_>>());
		assert_eq!(queue.pop_front(), Err(Error::QueueEmpty));
	}

	#[test]
	fn unbounded_never_full() {
		let queue = BoundedQueue::new(0);

		for i in 0..10_000 {
			queue.push_back(i).unwrap();
		}

		assert_eq!(queue.size(), 10_000);
	}

	#[test]
	fn full_queue_gives_item_back() {
		let queue = BoundedQueue::new(2);

		queue.push_back("a").unwrap();
		queue.push_back("b").unwrap();

		let err = queue.push_back("c").unwrap_err();
		assert_eq!(err.reason(), &Error::QueueFull { capacity: 2 });
		assert_eq!(err.into_inner(), Some("c"));

		assert_eq!(queue.pop_front(), Ok("a"));
		queue.push_back("c").unwrap();
		assert_eq!(queue.size(), 2);
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn blocking_push_released_by_pop() {
		let queue = Arc::new(BoundedQueue::new(2));

		queue.push_back(1).unwrap();
		queue.push_back(2).unwrap();
		assert!(queue.push_back(3).is_err());

		let pusher = spawn({
			let queue = Arc::clone(&queue);
			async move { queue.push_back_blocking(3).await }
		});

		sleep(Duration::from_millis(50)).await;
		assert!(!pusher.is_finished());
		assert_eq!(queue.size(), 2);

		assert_eq!(queue.pop_front(), Ok(1));

		pusher.await.unwrap().unwrap();

		assert_eq!(queue.pop_front(), Ok(2));
		assert_eq!(queue.pop_front(), Ok(3));
	}

	#[tokio::test]
	async fn destroy_wakes_blocked_consumer() {
		let queue = Arc::new(BoundedQueue::<u32>::new(4));

		let consumer = spawn({
			let queue = Arc::clone(&queue);
			async move { queue.pop_front_blocking().await }
		});

		sleep(Duration::from_millis(20)).await;
		queue.destroy();

		assert_eq!(consumer.await.unwrap(), Err(Error::Destroyed));
		assert_eq!(
			queue.push_back(1).unwrap_err().reason(),
			&Error::Destroyed
		);
		assert_eq!(queue.size(), 0);
	}
}
