//! Message channel between note producers and the indexing worker pool.
//!
//! Delivery is at-least-once. A [`Delivery`] that is dropped without [`Delivery::ack`] or
//! [`Delivery::reject`] is redelivered, immediately for [`MemoryChannel`] and after the claim
//! lease for [`PgChannel`].

pub mod memory;
pub mod postgres;
pub mod request;
pub mod retry;

mod error;

pub use error::{Error, Result};
pub use memory::{DeadLetter, MemoryChannel};
pub use postgres::PgChannel;
pub use request::IndexingRequest;
pub use retry::RetryPolicy;

use std::{future::Future, pin::Pin};

use uuid::Uuid;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What to do with a message that could not be processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
	/// Requeue with backoff until the retry budget runs out.
	Retry,
	DeadLetter,
}

pub trait Publisher
where
	Self: Send + Sync,
{
	fn publish<'a>(&'a self, payload: &'a [u8]) -> BoxFuture<'a, Result<()>>;
}

pub trait Channel
where
	Self: Send + Sync,
{
	fn subscribe<'a>(&'a self) -> BoxFuture<'a, Result<Box<dyn Subscription>>>;
}

pub trait Subscription
where
	Self: Send,
{
	/// Waits for the next message. `None` means the channel is closed and drained.
	fn next<'a>(&'a mut self) -> BoxFuture<'a, Result<Option<Box<dyn Delivery>>>>;
}

pub trait Delivery
where
	Self: Send,
{
	fn message_id(&self) -> Uuid;

	fn payload(&self) -> &[u8];

	/// Number of times this message has been handed out, including this one.
	fn attempts(&self) -> u32;

	fn ack(self: Box<Self>) -> BoxFuture<'static, Result<()>>;

	fn reject(
		self: Box<Self>,
		disposition: Disposition,
		reason: String,
	) -> BoxFuture<'static, Result<()>>;
}
