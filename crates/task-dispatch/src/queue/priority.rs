use std::{cmp::Ordering, fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::{Error, PushError};

use super::{BlockingCore, DispatchQueue, Storage};

/// Injected ordering between two queued items.
pub type Comparator<T> = Arc<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

/// Which end of the ordering sits at the root of the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum HeapOrder {
	/// The smallest item is popped first.
	MinRoot = 1,
	/// The biggest item is popped first.
	MaxRoot = 2,
}

impl TryFrom<u8> for HeapOrder {
	type Error = Error;

	fn try_from(code: u8) -> Result<Self, Self::Error> {
		match code {
			1 => Ok(Self::MinRoot),
			2 => Ok(Self::MaxRoot),
			_ => Err(Error::InvalidHeapOrder(code)),
		}
	}
}

impl HeapOrder {
	/// Whether `parent` has to move below `child` to keep the heap property.
	fn violated(self, ordering: Ordering) -> bool {
		match self {
			Self::MinRoot => ordering == Ordering::Greater,
			Self::MaxRoot => ordering == Ordering::Less,
		}
	}
}

/// Array backed binary heap, index `i` has its parent at `(i + 1) / 2 - 1`.
struct Heap<T> {
	items: Vec<T>,
	order: HeapOrder,
	cmp: Comparator<T>,
}

impl<T> Heap<T> {
	fn violated(&self, parent: usize, child: usize) -> bool {
		self.order
			.violated((self.cmp)(&self.items[parent], &self.items[child]))
	}

	fn swap(&mut self, left: usize, right: usize) -> Result<(), Error> {
		let len = self.items.len();

		for index in [left, right] {
			if index >= len {
				return Err(Error::IndexOutOfRange { index, len });
			}
		}

		self.items.swap(left, right);

		Ok(())
	}

	fn sift_up(&mut self) -> Result<(), Error> {
		let Some(mut child) = self.items.len().checked_sub(1) else {
			return Ok(());
		};

		while child > 0 {
			let parent = (child + 1) / 2 - 1;

			if !self.violated(parent, child) {
				break;
			}

			self.swap(parent, child)?;
			child = parent;
		}

		Ok(())
	}

	fn sift_down(&mut self, mut parent: usize) -> Result<(), Error> {
		let len = self.items.len();

		loop {
			let left = (parent + 1) * 2 - 1;
			let right = left + 1;

			if left >= len {
				break;
			}

			// The child that belongs nearer to the root, a missing right child never wins
			let preferred = if right < len && self.violated(left, right) {
				right
			} else {
				left
			};

			if !self.violated(parent, preferred) {
				break;
			}

			self.swap(parent, preferred)?;
			parent = preferred;
		}

		Ok(())
	}
}

impl<T: Send> Storage for Heap<T> {
	type Item = T;

	fn len(&self) -> usize {
		self.items.len()
	}

	fn put(&mut self, item: T) -> Result<(), Error> {
		self.items.push(item);
		self.sift_up()
	}

	fn take(&mut self) -> Result<Option<T>, Error> {
		let Some(last) = self.items.len().checked_sub(1) else {
			return Ok(None);
		};

		self.swap(0, last)?;
		let root = self.items.pop();
		self.sift_down(0)?;

		Ok(root)
	}

	fn repair(&mut self) {
		// Bottom-up heapify, every parent index from the last one back to the root
		for parent in (0..self.items.len() / 2).rev() {
			if let Err(e) = self.sift_down(parent) {
				error!(%e, "Failed to restore heap order");
				return;
			}
		}
	}
}

/// Thread-safe binary heap of items ordered by an injected comparator.
///
/// Same blocking contract as [`BoundedQueue`](super::BoundedQueue), a pop always returns an
/// item no worse than every other queued item under the configured [`HeapOrder`]. Items
/// comparing equal come out in no particular order.
pub struct PriorityQueue<T> {
	core: BlockingCore<Heap<T>>,
	order: HeapOrder,
}

impl<T> fmt::Debug for PriorityQueue<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("PriorityQueue")
			.field("order", &self.order)
			.field("core", &self.core)
			.finish()
	}
}

impl<T: Send> PriorityQueue<T> {
	pub fn new(
		order: HeapOrder,
		cmp: impl Fn(&T, &T) -> Ordering + Send + Sync + 'static,
		capacity: usize,
	) -> Self {
		Self::with_comparator(order, Arc::new(cmp), capacity)
	}

	/// Build a queue from a raw order code: `1` for min-root, `2` for max-root.
	pub fn from_order_code(
		code: u8,
		cmp: impl Fn(&T, &T) -> Ordering + Send + Sync + 'static,
		capacity: usize,
	) -> Result<Self, Error> {
		HeapOrder::try_from(code).map(|order| Self::new(order, cmp, capacity))
	}

	#[must_use]
	pub fn with_comparator(order: HeapOrder, cmp: Comparator<T>, capacity: usize) -> Self {
		Self {
			core: BlockingCore::new(
				Heap {
					items: Vec::new(),
					order,
					cmp,
				},
				capacity,
			),
			order,
		}
	}

	#[must_use]
	pub const fn order(&self) -> HeapOrder {
		self.order
	}

	#[must_use]
	pub const fn capacity(&self) -> usize {
		self.core.capacity()
	}

	pub fn push(&self, item: T) -> Result<(), PushError<T>> {
		self.core.push(item)
	}

	pub async fn push_blocking(&self, item: T) -> Result<(), PushError<T>> {
		self.core.push_blocking(item).await
	}

	pub fn pop(&self) -> Result<T, Error> {
		self.core.pop()
	}

	pub async fn pop_blocking(&self) -> Result<T, Error> {
		self.core.pop_blocking().await
	}

	/// Look at the root without removing it.
	pub fn top_with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, Error> {
		let guard = self.core.lock();
		let heap = guard.as_ref().ok_or(Error::Destroyed)?;

		heap.items.first().map(f).ok_or(Error::QueueEmpty)
	}

	pub fn top(&self) -> Result<T, Error>
	where
		T: Clone,
	{
		self.top_with(T::clone)
	}

	#[must_use]
	pub fn size(&self) -> usize {
		self.core.len()
	}

	pub fn destroy(&self) {
		self.core.destroy();
	}
}

impl<T: Send + 'static> DispatchQueue<T> for PriorityQueue<T> {
	fn push(&self, item: T) -> Result<(), PushError<T>> {
		Self::push(self, item)
	}

	async fn push_blocking(&self, item: T) -> Result<(), PushError<T>> {
		Self::push_blocking(self, item).await
	}

	fn pop(&self) -> Result<T, Error> {
		Self::pop(self)
	}

	async fn pop_blocking(&self) -> Result<T, Error> {
		Self::pop_blocking(self).await
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
	use std::{
		panic::{catch_unwind, AssertUnwindSafe},
		sync::atomic::{AtomicBool, Ordering as AtomicOrdering},
		time::Duration,
	};

	use rand::{seq::SliceRandom, Rng};
	use tokio::{spawn, time::sleep};

	use super::*;

	fn drain<T: Send>(queue: &PriorityQueue<T>) -> Vec<T> {
		std::iter::from_fn(|| queue.pop().ok()).collect()
	}

	fn assert_heap_property<T: Send>(queue: &PriorityQueue<T>) {
		let guard = queue.core.lock();
		let heap = guard.as_ref().unwrap();

		for child in 1..heap.items.len() {
			assert!(!heap.violated((child + 1) / 2 - 1, child));
		}
	}

	#[test]
	fn min_root_pops_ascending() {
		let queue = PriorityQueue::new(HeapOrder::MinRoot, i32::cmp, 0);

		for value in [8, 5, 10, 2, 1] {
			queue.push(value).unwrap();
		}

		assert_eq!(queue.top(), Ok(1));
		assert_eq!(drain(&queue), vec![1, 2, 5, 8, 10]);
	}

	#[test]
	fn max_root_pops_descending() {
		let queue = PriorityQueue::new(HeapOrder::MaxRoot, i32::cmp, 0);

		for value in [8, 5, 10, 2, 1] {
			queue.push(value).unwrap();
		}

		assert_eq!(queue.top(), Ok(10));
		assert_eq!(drain(&queue), vec![10, 8, 5, 2, 1]);
	}

	#[test]
	fn interleaved_push_and_pop_keep_heap_property() {
		let mut rng = rand::thread_rng();
		let queue = PriorityQueue::new(HeapOrder::MinRoot, u32::cmp, 0);
		let mut shadow = Vec::new();

		for _ in 0..2_000 {
			if rng.gen_bool(0.6) || shadow.is_empty() {
				let value = rng.gen_range(0..500);
				queue.push(value).unwrap();
				shadow.push(value);
			} else {
				let popped = queue.pop().unwrap();
				let min = *shadow.iter().min().unwrap();
				assert_eq!(popped, min);
				let pos = shadow.iter().position(|v| *v == min).unwrap();
				shadow.swap_remove(pos);
			}

			assert_heap_property(&queue);
		}

		shadow.sort_unstable();
		assert_eq!(drain(&queue), shadow);
	}

	#[derive(Debug, Clone, Copy, PartialEq, Eq)]
	struct Job {
		name: &'static str,
		priority: u8,
	}

	#[test]
	fn comparator_orders_by_external_key() {
		let queue = PriorityQueue::new(
			HeapOrder::MaxRoot,
			|l: &Job, r: &Job| l.priority.cmp(&r.priority),
			0,
		);

		let mut jobs = vec![
			Job { name: "low", priority: 1 },
			Job { name: "high", priority: 9 },
			Job { name: "mid", priority: 5 },
			Job { name: "lowest", priority: 0 },
		];
		jobs.shuffle(&mut rand::thread_rng());

		for job in jobs {
			queue.push(job).unwrap();
		}

		assert_eq!(queue.top().map(|job| job.name), Ok("high"));
		assert_eq!(
			queue.top_with(|job| job.priority),
			Ok(9)
		);
		assert_eq!(
			drain(&queue)
				.into_iter()
				.map(|job| job.name)
				.collect::<Vec<_>>(),
			vec!["high", "mid", "low", "lowest"]
		);
	}

	#[test]
	fn empty_and_full_errors() {
		let queue = PriorityQueue::new(HeapOrder::MinRoot, i32::cmp, 2);

		assert_eq!(queue.pop(), Err(Error::QueueEmpty));
		assert_eq!(queue.top(), Err(Error::QueueEmpty));

		queue.push(3).unwrap();
		queue.push(1).unwrap();

		let err = queue.push(2).unwrap_err();
		assert_eq!(err.reason(), &Error::QueueFull { capacity: 2 });
		assert_eq!(err.into_inner(), Some(2));
		assert_eq!(queue.size(), 2);
	}

	#[test]
	fn order_codes() {
		assert_eq!(HeapOrder::try_from(1), Ok(HeapOrder::MinRoot));
		assert_eq!(HeapOrder::try_from(2), Ok(HeapOrder::MaxRoot));
		assert_eq!(HeapOrder::try_from(0), Err(Error::InvalidHeapOrder(0)));

		let err = PriorityQueue::from_order_code(3, i32::cmp, 0).unwrap_err();
		assert_eq!(err, Error::InvalidHeapOrder(3));
	}

	#[test]
	fn swap_rejects_out_of_range_indices() {
		let mut heap = Heap {
			items: vec![1, 2],
			order: HeapOrder::MinRoot,
			cmp: Arc::new(i32::cmp),
		};

		assert_eq!(
			heap.swap(0, 2),
			Err(Error::IndexOutOfRange { index: 2, len: 2 })
		);
		assert_eq!(heap.swap(1, 0), Ok(()));
		assert_eq!(heap.items, vec![2, 1]);
	}

	#[test]
	fn panicking_comparator_leaves_a_valid_heap() {
		let armed = Arc::new(AtomicBool::new(false));

		let queue = PriorityQueue::new(
			HeapOrder::MinRoot,
			{
				let armed = Arc::clone(&armed);
				move |l: &i32, r: &i32| {
					if (*l == 0 || *r == 0) && armed.swap(false, AtomicOrdering::SeqCst) {
						panic!("comparator blew up");
					}
					l.cmp(r)
				}
			},
			0,
		);

		for value in 1..=8 {
			queue.push(value).unwrap();
		}

		armed.store(true, AtomicOrdering::SeqCst);
		assert!(catch_unwind(AssertUnwindSafe(|| queue.push(0))).is_err());
		assert!(queue.core.storage.is_poisoned());

		// The interrupted push left 0 as a leaf, the next lock puts it back at the root
		assert_eq!(queue.top(), Ok(0));
		assert!(!queue.core.storage.is_poisoned());
		assert_heap_property(&queue);
		assert_eq!(drain(&queue), (0..=8).collect::<Vec<_>>());
	}

	#[test]
	fn repair_restores_any_permutation() {
		let mut heap = Heap {
			items: vec![9, 3, 7, 1, 8, 2, 6, 0, 5, 4],
			order: HeapOrder::MaxRoot,
			cmp: Arc::new(i32::cmp),
		};

		heap.repair();

		for child in 1..heap.items.len() {
			assert!(!heap.violated((child + 1) / 2 - 1, child));
		}
		assert_eq!(heap.items[0], 9);
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn blocking_pop_waits_for_push() {
		let queue = Arc::new(PriorityQueue::new(HeapOrder::MinRoot, i32::cmp, 1));

		let consumer = spawn({
			let queue = Arc::clone(&queue);
			async move { queue.pop_blocking().await }
		});

		sleep(Duration::from_millis(50)).await;
		assert!(!consumer.is_finished());

		queue.push_blocking(7).await.unwrap();

		assert_eq!(consumer.await.unwrap(), Ok(7));
	}
}
