use std::time::Duration;

use time::OffsetDateTime;
use uuid::Uuid;

use quill_storage::{db::Db, models::QueueMessage, queue};

use crate::{
	BoxFuture, Channel, Delivery, Disposition, Error, Publisher, Result, RetryPolicy, Subscription,
	retry,
};

/// Durable channel backed by the `indexing_queue` table.
#[derive(Clone)]
pub struct PgChannel {
	db: Db,
	topic: String,
	policy: RetryPolicy,
	poll_interval: Duration,
	lease_seconds: i64,
}
impl PgChannel {
	pub fn new(db: Db, cfg: &quill_config::Queue) -> Self {
		Self {
			db,
			topic: cfg.topic.clone(),
			policy: RetryPolicy::from_config(cfg),
			poll_interval: Duration::from_millis(cfg.poll_interval_ms),
			lease_seconds: cfg.lease_seconds,
		}
	}

	pub fn topic(&self) -> &str {
		&self.topic
	}
}

impl Publisher for PgChannel {
	fn publish<'a>(&'a self, payload: &'a [u8]) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let message_id =
				queue::enqueue_message(&self.db.pool, &self.topic, payload, OffsetDateTime::now_utc())
					.await?;

			tracing::debug!(message_id = %message_id, topic = %self.topic, "Message published.");

			Ok(())
		})
	}
}

impl Channel for PgChannel {
	fn subscribe<'a>(&'a self) -> BoxFuture<'a, Result<Box<dyn Subscription>>> {
		Box::pin(async move {
			self.db
				.ping()
				.await
				.map_err(|err| Error::ChannelUnavailable { message: err.to_string() })?;

			tracing::info!(topic = %self.topic, "Subscribed to indexing queue.");

			Ok(Box::new(PgSubscription { channel: self.clone() }) as Box<dyn Subscription>)
		})
	}
}

struct PgSubscription {
	channel: PgChannel,
}

impl Subscription for PgSubscription {
	fn next<'a>(&'a mut self) -> BoxFuture<'a, Result<Option<Box<dyn Delivery>>>> {
		Box::pin(async move {
			let channel = &self.channel;

			loop {
				let claimed = queue::claim_next_message(
					&channel.db,
					&channel.topic,
					OffsetDateTime::now_utc(),
					channel.lease_seconds,
					channel.policy.max_attempts,
				)
				.await?;

				if let Some(message) = claimed {
					return Ok(Some(Box::new(PgDelivery {
						db: channel.db.clone(),
						policy: channel.policy,
						message,
					}) as Box<dyn Delivery>));
				}

				tokio::time::sleep(channel.poll_interval).await;
			}
		})
	}
}

// Dropping without settling leaves the row CLAIMED until its lease runs out. Settling after
// the lease ran out is a no-op once another claim exists.
struct PgDelivery {
	db: Db,
	policy: RetryPolicy,
	message: QueueMessage,
}
impl PgDelivery {
	fn attempt_count(&self) -> u32 {
		u32::try_from(self.message.attempts).unwrap_or_default()
	}

	// The lease ran out and another consumer claimed the row, or it was dead-lettered.
	fn superseded(&self, action: &str) {
		tracing::warn!(
			message_id = %self.message.message_id,
			attempts = self.message.attempts,
			action,
			"Claim was superseded before it settled; outcome discarded."
		);
	}
}

impl Delivery for PgDelivery {
	fn message_id(&self) -> Uuid {
		self.message.message_id
	}

	fn payload(&self) -> &[u8] {
		&self.message.payload
	}

	fn attempts(&self) -> u32 {
		self.attempt_count()
	}

	fn ack(self: Box<Self>) -> BoxFuture<'static, Result<()>> {
		Box::pin(async move {
			let settled = queue::mark_message_done(
				&self.db,
				self.message.message_id,
				self.message.attempts,
				OffsetDateTime::now_utc(),
			)
			.await?;

			if !settled {
				self.superseded("ack");
			}

			Ok(())
		})
	}

	fn reject(
		self: Box<Self>,
		disposition: Disposition,
		reason: String,
	) -> BoxFuture<'static, Result<()>> {
		Box::pin(async move {
			let now = OffsetDateTime::now_utc();
			let attempts = self.attempt_count();
			let reason = retry::sanitize_error(&reason);

			if disposition == Disposition::DeadLetter || self.policy.is_exhausted(attempts) {
				let settled = queue::mark_message_dead(
					&self.db,
					self.message.message_id,
					self.message.attempts,
					&reason,
					now,
				)
				.await?;

				if !settled {
					self.superseded("dead-letter");

					return Ok(());
				}

				tracing::warn!(
					message_id = %self.message.message_id,
					attempts,
					reason = %reason,
					"Message moved to dead-letter."
				);

				return Ok(());
			}

			let delay = self.policy.backoff_for_attempt(attempts);
			let available_at = now + delay;

			let settled = queue::mark_message_failed(
				&self.db,
				self.message.message_id,
				self.message.attempts,
				&reason,
				available_at,
				now,
			)
			.await?;

			if !settled {
				self.superseded("retry");

				return Ok(());
			}

			tracing::info!(
				message_id = %self.message.message_id,
				attempts,
				delay_ms = delay.as_millis() as u64,
				reason = %reason,
				"Message scheduled for retry."
			);

			Ok(())
		})
	}
}
