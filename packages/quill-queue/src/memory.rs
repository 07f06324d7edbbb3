use std::sync::{
	Arc, Mutex,
	atomic::{AtomicUsize, Ordering},
};

use tokio::sync::{Mutex as AsyncMutex, mpsc, watch};
use uuid::Uuid;

use crate::{
	BoxFuture, Channel, Delivery, Disposition, Error, Publisher, Result, RetryPolicy, Subscription,
	retry,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
	pub message_id: Uuid,
	pub payload: Vec<u8>,
	pub attempts: u32,
	pub reason: String,
}

// Each envelope carries a sender so it can always be requeued; the stream ends once `close`
// has run and every envelope has been settled.
#[derive(Debug)]
struct Envelope {
	message_id: Uuid,
	payload: Vec<u8>,
	attempts: u32,
	requeue: mpsc::UnboundedSender<Envelope>,
}

struct Shared {
	sender: Mutex<Option<mpsc::UnboundedSender<Envelope>>>,
	receiver: AsyncMutex<mpsc::UnboundedReceiver<Envelope>>,
	policy: RetryPolicy,
	dead_letters: Mutex<Vec<DeadLetter>>,
	acked: AtomicUsize,
	settled: watch::Sender<usize>,
}
impl Shared {
	fn settle(&self) {
		self.settled.send_modify(|count| *count += 1);
	}

	fn dead_letter(&self, envelope: Envelope, reason: String) {
		tracing::warn!(
			message_id = %envelope.message_id,
			attempts = envelope.attempts,
			reason = %reason,
			"Message moved to dead-letter."
		);

		self.dead_letters.lock().unwrap_or_else(|err| err.into_inner()).push(DeadLetter {
			message_id: envelope.message_id,
			payload: envelope.payload,
			attempts: envelope.attempts,
			reason,
		});
		self.settle();
	}
}

/// In-process channel with competing consumers over one tokio mpsc queue.
#[derive(Clone)]
pub struct MemoryChannel {
	shared: Arc<Shared>,
}
impl MemoryChannel {
	pub fn new(policy: RetryPolicy) -> Self {
		let (sender, receiver) = mpsc::unbounded_channel();
		let (settled, _) = watch::channel(0);

		Self {
			shared: Arc::new(Shared {
				sender: Mutex::new(Some(sender)),
				receiver: AsyncMutex::new(receiver),
				policy,
				dead_letters: Mutex::new(Vec::new()),
				acked: AtomicUsize::new(0),
				settled,
			}),
		}
	}

	/// Stops accepting publishes. Subscribers drain what is queued, including pending retries,
	/// and then see the end of the stream.
	pub fn close(&self) {
		self.shared.sender.lock().unwrap_or_else(|err| err.into_inner()).take();
	}

	pub fn acked(&self) -> usize {
		self.shared.acked.load(Ordering::SeqCst)
	}

	pub fn dead_letters(&self) -> Vec<DeadLetter> {
		self.shared.dead_letters.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}

	/// Resolves once `count` messages have been acknowledged or dead-lettered in total.
	pub async fn wait_for_settled(&self, count: usize) {
		let mut rx = self.shared.settled.subscribe();
		let _ = rx.wait_for(|settled| *settled >= count).await;
	}
}

impl Publisher for MemoryChannel {
	fn publish<'a>(&'a self, payload: &'a [u8]) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let sender = self
				.shared
				.sender
				.lock()
				.unwrap_or_else(|err| err.into_inner())
				.clone()
				.ok_or(Error::Closed)?;
			let envelope = Envelope {
				message_id: Uuid::new_v4(),
				payload: payload.to_vec(),
				attempts: 0,
				requeue: sender.clone(),
			};

			sender.send(envelope).map_err(|_| Error::Closed)
		})
	}
}

impl Channel for MemoryChannel {
	fn subscribe<'a>(&'a self) -> BoxFuture<'a, Result<Box<dyn Subscription>>> {
		Box::pin(async move {
			Ok(Box::new(MemorySubscription { shared: self.shared.clone() }) as Box<dyn Subscription>)
		})
	}
}

struct MemorySubscription {
	shared: Arc<Shared>,
}

impl Subscription for MemorySubscription {
	fn next<'a>(&'a mut self) -> BoxFuture<'a, Result<Option<Box<dyn Delivery>>>> {
		Box::pin(async move {
			let Some(mut envelope) = self.shared.receiver.lock().await.recv().await else {
				return Ok(None);
			};

			envelope.attempts += 1;

			Ok(Some(Box::new(MemoryDelivery { envelope: Some(envelope), shared: self.shared.clone() })
				as Box<dyn Delivery>))
		})
	}
}

struct MemoryDelivery {
	envelope: Option<Envelope>,
	shared: Arc<Shared>,
}
impl Drop for MemoryDelivery {
	fn drop(&mut self) {
		let Some(envelope) = self.envelope.take() else {
			return;
		};

		tracing::debug!(message_id = %envelope.message_id, "Unsettled delivery dropped; requeueing.");

		let requeue = envelope.requeue.clone();

		if let Err(err) = requeue.send(envelope) {
			self.shared.dead_letter(err.0, "Channel closed before redelivery.".to_string());
		}
	}
}

impl Delivery for MemoryDelivery {
	fn message_id(&self) -> Uuid {
		self.envelope.as_ref().map(|envelope| envelope.message_id).unwrap_or_default()
	}

	fn payload(&self) -> &[u8] {
		self.envelope.as_ref().map(|envelope| envelope.payload.as_slice()).unwrap_or_default()
	}

	fn attempts(&self) -> u32 {
		self.envelope.as_ref().map(|envelope| envelope.attempts).unwrap_or_default()
	}

	fn ack(mut self: Box<Self>) -> BoxFuture<'static, Result<()>> {
		if self.envelope.take().is_some() {
			self.shared.acked.fetch_add(1, Ordering::SeqCst);
			self.shared.settle();
		}

		Box::pin(async { Ok(()) })
	}

	fn reject(
		mut self: Box<Self>,
		disposition: Disposition,
		reason: String,
	) -> BoxFuture<'static, Result<()>> {
		let envelope = self.envelope.take();
		let shared = self.shared.clone();
		let reason = retry::sanitize_error(&reason);

		Box::pin(async move {
			let Some(envelope) = envelope else {
				return Ok(());
			};

			if disposition == Disposition::DeadLetter || shared.policy.is_exhausted(envelope.attempts)
			{
				shared.dead_letter(envelope, reason);

				return Ok(());
			}

			let delay = shared.policy.backoff_for_attempt(envelope.attempts);

			tracing::info!(
				message_id = %envelope.message_id,
				attempts = envelope.attempts,
				delay_ms = delay.as_millis() as u64,
				reason = %reason,
				"Message scheduled for retry."
			);

			tokio::spawn(async move {
				tokio::time::sleep(delay).await;

				let requeue = envelope.requeue.clone();

				if let Err(err) = requeue.send(envelope) {
					shared.dead_letter(err.0, "Channel closed before retry.".to_string());
				}
			});

			Ok(())
		})
	}
}
