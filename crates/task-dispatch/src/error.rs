use std::fmt;

use thiserror::Error;

/// Errors raised by the queues and managers themselves.
///
/// Capacity errors (`QueueFull`, `QueueEmpty`) are recoverable and only ever returned by the
/// non-blocking operations. The remaining variants point at a misuse of the API.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
	#[error("queue is full <capacity='{capacity}'>")]
	QueueFull { capacity: usize },
	#[error("queue is empty")]
	QueueEmpty,
	#[error("invalid heap order code: {0}")]
	InvalidHeapOrder(u8),
	#[error("heap index out of range <index='{index}', len='{len}'>")]
	IndexOutOfRange { index: usize, len: usize },
	#[error("queue was destroyed")]
	Destroyed,
}

/// A rejected push, giving the item back to the caller together with the reason.
#[derive(Error)]
#[error("{reason}")]
pub struct PushError<T> {
	reason: Error,
	item: Option<T>,
}

impl<T> PushError<T> {
	pub(crate) const fn new(reason: Error, item: T) -> Self {
		Self {
			reason,
			item: Some(item),
		}
	}

	/// The queue took ownership of the item before failing, so there is nothing to give back.
	pub(crate) const fn consumed(reason: Error) -> Self {
		Self { reason, item: None }
	}

	#[must_use]
	pub const fn reason(&self) -> &Error {
		&self.reason
	}

	/// Take back the item that could not be queued.
	pub fn into_inner(self) -> Option<T> {
		self.item
	}
}

impl<T> fmt::Debug for PushError<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("PushError")
			.field("reason", &self.reason)
			.field("item", &self.item.as_ref().map(|_| "<Item>"))
			.finish()
	}
}

impl<T> From<PushError<T>> for Error {
	fn from(PushError { reason, .. }: PushError<T>) -> Self {
		reason
	}
}

/// Bound for the error type returned by work functions.
///
/// Payload errors never escape the dispatch loop, they are logged and dropped, so the only
/// requirement is that they can be displayed and moved across workers.
pub trait RunError: fmt::Debug + fmt::Display + Send + 'static {}

impl<T: fmt::Debug + fmt::Display + Send + 'static> RunError for T {}

/// Catch-all payload error, handy when work functions don't share a concrete error type.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
