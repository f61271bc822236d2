//!
//! # Task Dispatch
//!
//! A bounded, thread-safe task queue (FIFO and priority flavours) and a worker pool that pulls
//! queued work and executes it on a fixed number of lightweight tasks.
//!
//! Queue some [`WorkItem`]s (a function plus the argument it will be called with) and the
//! manager takes care of:
//! - Back-pressure when a bounded queue is full, either failing fast or waiting for a slot;
//! - Running every queued item exactly once on one of its workers;
//! - Keeping track of its workers through a [`TaskRegistry`], with ids, names and creation times;
//! - Draining and joining workers, or stopping blocking workers on shutdown.
//!
//! Errors returned by work functions are logged and dropped, the pool never retries them.
//!
//! ## Basic example
//!
//! ```
//! use std::sync::{
//! 	atomic::{AtomicUsize, Ordering},
//! 	Arc,
//! };
//!
//! use task_dispatch::{ManagerConfig, TaskManager, WorkItem};
//!
//! #[tokio::main]
//! async fn main() {
//! 	let manager: TaskManager<u64> =
//! 		TaskManager::new(ManagerConfig::new("example").with_worker_count(2));
//!
//! 	let done = Arc::new(AtomicUsize::new(0));
//!
//! 	for i in 0..10 {
//! 		let done = Arc::clone(&done);
//!
//! 		manager
//! 			.push_task(WorkItem::new(
//! 				move |_task, n: u64| async move {
//! 					assert!(n < 10);
//! 					done.fetch_add(1, Ordering::Relaxed);
//! 					Ok(())
//! 				},
//! 				i,
//! 			))
//! 			.unwrap();
//! 	}
//!
//! 	manager.run_and_wait(false).await;
//!
//! 	assert_eq!(done.load(Ordering::Relaxed), 10);
//!
//! 	manager.destroy();
//! }
//! ```

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

mod config;
mod error;
mod manager;
mod queue;
mod registry;
mod work;

pub use config::ManagerConfig;
pub use error::{BoxError, Error, PushError, RunError};
pub use manager::{Manager, PriorityTaskManager, TaskManager};
pub use queue::{BoundedQueue, Comparator, DispatchQueue, HeapOrder, PriorityQueue};
pub use registry::{CancelHandle, LightweightTask, RegistryDump, TaskId, TaskRegistry};
pub use work::{PriorityWorkItem, Work, WorkItem};
