use std::{panic::AssertUnwindSafe, sync::Arc};

use futures::FutureExt;
use tokio::{select, sync::oneshot};
use tracing::{debug, error, trace, warn};

use crate::{error::Error, queue::DispatchQueue, registry::LightweightTask, work::Work};

async fn execute<I: Work>(task: &LightweightTask, item: I) {
	match AssertUnwindSafe(item.run(task.clone()))
		.catch_unwind()
		.await
	{
		Ok(Ok(())) => {}
		// Payload failures are the payload's business, the worker just moves on
		Ok(Err(e)) => warn!(?e, "Work item failed"),
		Err(panic) => error!(?panic, "Work item panicked"),
	}
}

/// Leave the registry before signalling, so a woken waiter sees an accurate live count.
fn signal_exit(task: &LightweightTask, exit_tx: oneshot::Sender<()>) {
	task.on_quit();

	if exit_tx.send(()).is_err() {
		warn!("Worker exit marker receiver dropped before worker exit");
	}
}

/// Non-blocking dispatch loop, exits once the queue is found empty.
pub(super) async fn run<I: Work, Q: DispatchQueue<I>>(
	task: LightweightTask,
	queue: Arc<Q>,
	exit_tx: Option<oneshot::Sender<()>>,
) {
	trace!("Worker starting...");

	loop {
		match queue.pop() {
			Ok(item) => execute(&task, item).await,
			Err(Error::QueueEmpty) => {
				trace!("Queue drained, worker exiting...");
				break;
			}
			Err(e) => {
				debug!(%e, "Worker can't pop anymore, exiting...");
				break;
			}
		}
	}

	if let Some(exit_tx) = exit_tx {
		signal_exit(&task, exit_tx);
	}
}

/// Blocking dispatch loop, waits for work until the worker is cancelled or the queue destroyed.
pub(super) async fn run_blocking<I: Work, Q: DispatchQueue<I>>(
	task: LightweightTask,
	queue: Arc<Q>,
	exit_tx: oneshot::Sender<()>,
) {
	trace!("Blocking worker starting...");

	loop {
		let item = select! {
			biased;

			() = task.cancelled() => {
				trace!("Worker cancelled, exiting...");
				break;
			}

			res = queue.pop_blocking() => match res {
				Ok(item) => item,
				Err(e) => {
					debug!(%e, "Worker can't pop anymore, exiting...");
					break;
				}
			},
		};

		execute(&task, item).await;
	}

	signal_exit(&task, exit_tx);
}
