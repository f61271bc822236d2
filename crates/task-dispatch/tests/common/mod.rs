#![allow(dead_code)]

use std::{
	sync::{
		atomic::{AtomicUsize, Ordering},
		Arc, Mutex,
	},
	time::Duration,
};

use task_dispatch::{LightweightTask, PriorityWorkItem, TaskRegistry, WorkItem};
use thiserror::Error;
use tokio::time::{sleep, timeout};

#[derive(Debug, Error)]
pub enum SampleError {
	#[error("sample error <arg='{0}'>")]
	SampleError(u64),
}

pub const TIMEOUT: Duration = Duration::from_secs(10);

/// Polls `cond` until it holds, panicking after [`TIMEOUT`].
pub async fn eventually(mut cond: impl FnMut() -> bool) {
	timeout(TIMEOUT, async {
		while !cond() {
			sleep(Duration::from_millis(1)).await;
		}
	})
	.await
	.expect("condition never held");
}

pub async fn wait_for_empty_registry(registry: &TaskRegistry) {
	eventually(|| registry.count() == 0).await;
}

/// Counts executions per argument, so double runs show up.
#[derive(Debug, Clone)]
pub struct ExecutionLog {
	runs: Arc<Vec<AtomicUsize>>,
	total: Arc<AtomicUsize>,
}

impl ExecutionLog {
	pub fn new(len: usize) -> Self {
		Self {
			runs: Arc::new((0..len).map(|_| AtomicUsize::new(0)).collect()),
			total: Arc::new(AtomicUsize::new(0)),
		}
	}

	pub fn record(&self, arg: u64) {
		self.runs[usize::try_from(arg).unwrap()].fetch_add(1, Ordering::SeqCst);
		self.total.fetch_add(1, Ordering::SeqCst);
	}

	pub fn total(&self) -> usize {
		self.total.load(Ordering::SeqCst)
	}

	pub fn all_ran_once(&self) -> bool {
		self.runs.iter().all(|runs| runs.load(Ordering::SeqCst) == 1)
	}

	/// A work item recording its argument, failing on odd ones.
	pub fn item(&self, arg: u64) -> WorkItem<u64, SampleError> {
		let log = self.clone();

		WorkItem::new(
			move |_task: LightweightTask, arg: u64| async move {
				log.record(arg);
				if arg % 2 == 1 {
					Err(SampleError::SampleError(arg))
				} else {
					Ok(())
				}
			},
			arg,
		)
	}
}

/// Records `(worker name, priority)` in execution order.
#[derive(Debug, Clone, Default)]
pub struct OrderLog {
	entries: Arc<Mutex<Vec<(String, u32)>>>,
}

impl OrderLog {
	pub fn item(
		&self,
		log: &ExecutionLog,
		arg: u64,
		priority: u32,
		delay: Duration,
	) -> PriorityWorkItem<u64, u32, SampleError> {
		let order = self.clone();
		let log = log.clone();

		PriorityWorkItem::new(
			move |task: LightweightTask, arg: u64| async move {
				order
					.entries
					.lock()
					.unwrap()
					.push((task.name().to_string(), priority));
				log.record(arg);
				sleep(delay).await;
				Ok(())
			},
			arg,
			priority,
		)
	}

	pub fn entries(&self) -> Vec<(String, u32)> {
		self.entries.lock().unwrap().clone()
	}
}
