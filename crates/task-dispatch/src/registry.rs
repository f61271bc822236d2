use std::{
	collections::HashMap,
	fmt,
	future::Future,
	sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use chrono::{DateTime, Utc};
use tokio::spawn;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, trace_span, Instrument};

/// Identity of a lightweight task, unique and monotonic within one [`TaskRegistry`].
pub type TaskId = u64;

/// Handle given to every function spawned through a [`TaskRegistry`].
///
/// It carries the task identity and, for cancellable spawns, the cooperative cancellation token.
/// The handle only holds a weak reference back to its registry, so it never keeps a registry alive.
#[derive(Debug, Clone)]
pub struct LightweightTask {
	id: TaskId,
	name: Arc<str>,
	created_at: DateTime<Utc>,
	registry: Weak<Inner>,
	cancel_token: Option<CancellationToken>,
}

impl LightweightTask {
	#[must_use]
	pub const fn id(&self) -> TaskId {
		self.id
	}

	#[must_use]
	pub fn name(&self) -> &str {
		&self.name
	}

	#[must_use]
	pub const fn created_at(&self) -> DateTime<Utc> {
		self.created_at
	}

	/// The cancellation token, only present when the task was spawned with
	/// [`TaskRegistry::spawn_cancellable`].
	#[must_use]
	pub const fn cancellation_token(&self) -> Option<&CancellationToken> {
		self.cancel_token.as_ref()
	}

	#[must_use]
	pub fn is_cancelled(&self) -> bool {
		self.cancel_token
			.as_ref()
			.is_some_and(CancellationToken::is_cancelled)
	}

	/// Wait until cancellation is requested.
	///
	/// A task spawned without a token can never be cancelled, so this future never completes for it.
	pub async fn cancelled(&self) {
		match &self.cancel_token {
			Some(token) => token.cancelled().await,
			None => std::future::pending().await,
		}
	}

	/// Remove this task from its registry.
	///
	/// Spawned functions don't need to call it, the registry runs it when the function returns,
	/// panics or is dropped by the runtime. Calling it more than once is harmless.
	pub fn on_quit(&self) {
		if let Some(inner) = self.registry.upgrade() {
			inner.remove(self.id);
		}
	}
}

/// Requests cancellation of a task spawned with [`TaskRegistry::spawn_cancellable`].
///
/// Cancelling only signals intent: the task has to observe its token and exit on its own.
#[derive(Debug, Clone)]
pub struct CancelHandle {
	task_id: TaskId,
	token: CancellationToken,
}

impl CancelHandle {
	#[must_use]
	pub const fn task_id(&self) -> TaskId {
		self.task_id
	}

	/// Idempotent, only the first call has any effect.
	pub fn cancel(&self) {
		if !self.token.is_cancelled() {
			trace!(task_id = self.task_id, "Requesting task cancellation");
		}
		self.token.cancel();
	}

	#[must_use]
	pub fn is_cancelled(&self) -> bool {
		self.token.is_cancelled()
	}
}

#[derive(Debug)]
struct Inner {
	name: String,
	// Counter and map share one lock so an id is allocated and registered atomically
	state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
	counter: TaskId,
	tasks: HashMap<TaskId, LightweightTask>,
}

impl Inner {
	fn state(&self) -> MutexGuard<'_, State> {
		self.state.lock().unwrap_or_else(PoisonError::into_inner)
	}

	fn remove(&self, task_id: TaskId) {
		if self.state().tasks.remove(&task_id).is_some() {
			debug!(registry = %self.name, task_id, "Lightweight task quit");
		}
	}
}

/// Removes the task from its registry however the spawned future ends.
struct QuitGuard(LightweightTask);

impl Drop for QuitGuard {
	fn drop(&mut self) {
		self.0.on_quit();
	}
}

/// Spawns and keeps track of lightweight tasks.
///
/// Each pool owns its own registry, cloning a registry only clones a handle to the same task map.
#[derive(Debug, Clone)]
pub struct TaskRegistry {
	inner: Arc<Inner>,
}

impl TaskRegistry {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			inner: Arc::new(Inner {
				name: name.into(),
				state: Mutex::default(),
			}),
		}
	}

	#[must_use]
	pub fn name(&self) -> &str {
		&self.inner.name
	}

	fn register(&self, name: String, cancel_token: Option<CancellationToken>) -> LightweightTask {
		let mut state = self.inner.state();

		state.counter += 1;

		let task = LightweightTask {
			id: state.counter,
			name: name.into(),
			created_at: Utc::now(),
			registry: Arc::downgrade(&self.inner),
			cancel_token,
		};

		state.tasks.insert(task.id, task.clone());

		task
	}

	fn launch<F, Fut>(&self, task: LightweightTask, func: F)
	where
		F: FnOnce(LightweightTask) -> Fut + Send + 'static,
		Fut: Future + Send + 'static,
		Fut::Output: Send + 'static,
	{
		debug!(
			registry = %self.inner.name,
			task_id = task.id,
			task_name = %task.name,
			"Spawning lightweight task",
		);

		let span = trace_span!(
			"lightweight_task",
			registry = %self.inner.name,
			task_id = task.id,
			task_name = %task.name,
		);

		let guard = QuitGuard(task.clone());

		spawn(
			async move {
				let _guard = guard;
				func(task).await;
			}
			.instrument(span),
		);
	}

	/// Spawn `func` as a new lightweight task and return its id right away, without waiting
	/// for the function to start.
	///
	/// Must be called from within a tokio runtime.
	pub fn spawn<F, Fut>(&self, name: impl Into<String>, func: F) -> TaskId
	where
		F: FnOnce(LightweightTask) -> Fut + Send + 'static,
		Fut: Future + Send + 'static,
		Fut::Output: Send + 'static,
	{
		let task = self.register(name.into(), None);
		let task_id = task.id;

		self.launch(task, func);

		task_id
	}

	/// Same as [`TaskRegistry::spawn`], but the task also receives a cancellation token and the
	/// caller gets a [`CancelHandle`] to trigger it.
	pub fn spawn_cancellable<F, Fut>(&self, name: impl Into<String>, func: F) -> (TaskId, CancelHandle)
	where
		F: FnOnce(LightweightTask) -> Fut + Send + 'static,
		Fut: Future + Send + 'static,
		Fut::Output: Send + 'static,
	{
		let token = CancellationToken::new();
		let task = self.register(name.into(), Some(token.clone()));
		let task_id = task.id;

		self.launch(task, func);

		(task_id, CancelHandle { task_id, token })
	}

	/// Stop tracking `task`. Spawned tasks are removed automatically when they exit.
	pub fn remove(&self, task: &LightweightTask) {
		self.inner.remove(task.id);
	}

	#[must_use]
	pub fn count(&self) -> usize {
		self.inner.state().tasks.len()
	}

	#[must_use]
	pub fn lookup(&self, task_id: TaskId) -> Option<LightweightTask> {
		self.inner.state().tasks.get(&task_id).cloned()
	}

	/// Snapshot of every live task, also emitted as a `debug` event.
	pub fn dump_all(&self) -> RegistryDump {
		let mut tasks = self
			.inner
			.state()
			.tasks
			.values()
			.map(|task| DumpEntry {
				id: task.id,
				name: Arc::clone(&task.name),
				created_at: task.created_at,
			})
			.collect::<Vec<_>>();

		tasks.sort_unstable_by_key(|entry| entry.id);

		let dump = RegistryDump {
			registry: self.inner.name.clone(),
			tasks,
		};

		debug!("{dump}");

		dump
	}
}

#[derive(Debug, Clone)]
struct DumpEntry {
	id: TaskId,
	name: Arc<str>,
	created_at: DateTime<Utc>,
}

/// Diagnostic listing of the live tasks of a registry, ordered by id.
#[derive(Debug, Clone)]
pub struct RegistryDump {
	registry: String,
	tasks: Vec<DumpEntry>,
}

impl RegistryDump {
	#[must_use]
	pub fn len(&self) -> usize {
		self.tasks.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.tasks.is_empty()
	}

	pub fn task_ids(&self) -> impl Iterator<Item = TaskId> + '_ {
		self.tasks.iter().map(|entry| entry.id)
	}
}

impl fmt::Display for RegistryDump {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		writeln!(f, "---- registry <name='{}'> dump begin ----", self.registry)?;
		writeln!(f, "task_count: {}", self.tasks.len())?;
		for DumpEntry {
			id,
			name,
			created_at,
		} in &self.tasks
		{
			writeln!(
				f,
				"task_id: {id} | task_name: {name} | created_at: {}",
				created_at.timestamp()
			)?;
		}
		write!(f, "---- registry <name='{}'> dump end ----", self.registry)
	}
}
