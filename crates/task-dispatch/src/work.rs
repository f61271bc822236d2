use std::{fmt, future::Future};

use futures::{future::BoxFuture, FutureExt};

use super::{
	error::{BoxError, RunError},
	registry::LightweightTask,
};

type WorkFn<A, E> = Box<dyn FnOnce(LightweightTask, A) -> BoxFuture<'static, Result<(), E>> + Send>;

/// Anything a worker knows how to execute.
pub trait Work: Send + 'static {
	type Error: RunError;

	/// Consume the work, running it on behalf of `task`.
	fn run(self, task: LightweightTask) -> BoxFuture<'static, Result<(), Self::Error>>;
}

/// A unit of work: a function plus the argument it will be called with.
///
/// The function receives the handle of the worker executing it, so it can log with the worker
/// name or check for cancellation.
pub struct WorkItem<A, E = BoxError> {
	func: WorkFn<A, E>,
	arg: A,
}

impl<A, E> fmt::Debug for WorkItem<A, E> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "<WorkItem>")
	}
}

impl<A: Send + 'static, E: RunError> WorkItem<A, E> {
	pub fn new<F, Fut>(func: F, arg: A) -> Self
	where
		F: FnOnce(LightweightTask, A) -> Fut + Send + 'static,
		Fut: Future<Output = Result<(), E>> + Send + 'static,
	{
		Self {
			func: Box::new(move |task, arg| func(task, arg).boxed()),
			arg,
		}
	}

	#[must_use]
	pub const fn arg(&self) -> &A {
		&self.arg
	}
}

impl<A: Send + 'static, E: RunError> Work for WorkItem<A, E> {
	type Error = E;

	fn run(self, task: LightweightTask) -> BoxFuture<'static, Result<(), E>> {
		(self.func)(task, self.arg)
	}
}

/// A [`WorkItem`] tagged with a priority, ordered by the comparator given to the priority manager.
pub struct PriorityWorkItem<A, P, E = BoxError> {
	work: WorkItem<A, E>,
	priority: P,
}

impl<A, P: fmt::Debug, E> fmt::Debug for PriorityWorkItem<A, P, E> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("PriorityWorkItem")
			.field("priority", &self.priority)
			.finish_non_exhaustive()
	}
}

impl<A: Send + 'static, P: Send + 'static, E: RunError> PriorityWorkItem<A, P, E> {
	pub fn new<F, Fut>(func: F, arg: A, priority: P) -> Self
	where
		F: FnOnce(LightweightTask, A) -> Fut + Send + 'static,
		Fut: Future<Output = Result<(), E>> + Send + 'static,
	{
		Self {
			work: WorkItem::new(func, arg),
			priority,
		}
	}

	#[must_use]
	pub const fn with_priority(work: WorkItem<A, E>, priority: P) -> Self {
		Self { work, priority }
	}

	#[must_use]
	pub const fn priority(&self) -> &P {
		&self.priority
	}

	#[must_use]
	pub const fn arg(&self) -> &A {
		self.work.arg()
	}
}

impl<A: Send + 'static, P: Send + 'static, E: RunError> Work for PriorityWorkItem<A, P, E> {
	type Error = E;

	fn run(self, task: LightweightTask) -> BoxFuture<'static, Result<(), E>> {
		self.work.run(task)
	}
}
