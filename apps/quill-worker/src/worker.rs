use std::{sync::Arc, time::Duration};

use time::OffsetDateTime;
use tokio::{
	sync::{Semaphore, watch},
	task::JoinHandle,
};
use uuid::Uuid;

use quill_providers::EmbeddingClient;
use quill_queue::{Channel, Delivery, IndexingRequest, Subscription};
use quill_storage::{VectorStore, models::NewEmbedding};

use crate::{Error, Result, source_text};

const RECEIVE_ERROR_BACKOFF_MS: u64 = 1_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOutcome {
	Indexed { embedding_id: Uuid, invalidated: u64 },
	/// A live record already holds the current source text; nothing was written.
	Unchanged { embedding_id: Uuid },
	/// The note was soft-deleted before the message was processed.
	NoteDeleted { invalidated: u64 },
}

/// Pulls indexing requests off a channel and turns each into one embedding record.
#[derive(Clone)]
pub struct IndexingWorker {
	store: Arc<dyn VectorStore>,
	embedding: Arc<dyn EmbeddingClient>,
	max_concurrent: usize,
	serialize_per_note: bool,
	actor: String,
}
impl IndexingWorker {
	pub fn new(
		store: Arc<dyn VectorStore>,
		embedding: Arc<dyn EmbeddingClient>,
		cfg: &quill_config::Worker,
	) -> Self {
		let max_concurrent = cfg.max_concurrent.clamp(1, u32::MAX as usize).min(Semaphore::MAX_PERMITS);

		Self {
			store,
			embedding,
			max_concurrent,
			serialize_per_note: cfg.serialize_per_note,
			actor: cfg.actor.clone(),
		}
	}

	/// Subscribes and returns once the subscription is open; messages are processed on
	/// background tasks until the returned handle is shut down or the channel ends.
	pub async fn consume(&self, channel: &dyn Channel) -> Result<WorkerHandle> {
		let subscription = channel.subscribe().await?;
		let slots = Arc::new(Semaphore::new(self.max_concurrent));
		let (stop_tx, stop_rx) = watch::channel(false);
		let task = tokio::spawn(self.clone().run(subscription, slots, stop_rx));

		tracing::info!(max_concurrent = self.max_concurrent, "Indexing worker started.");

		Ok(WorkerHandle { stop: stop_tx, task })
	}

	/// Runs the indexing steps for one payload inside a single unit of work.
	pub async fn process(&self, payload: &[u8]) -> Result<IndexOutcome> {
		let request = IndexingRequest::decode(payload)
			.map_err(|err| Error::MalformedPayload { message: err.to_string() })?;
		let note_id = request.note_id;
		let mut uow = self.store.begin().await?;

		if self.serialize_per_note {
			uow.lock_note(note_id).await?;
		}

		let note = uow.note_by_id(note_id).await?.ok_or(Error::NoteNotFound { note_id })?;
		let now = OffsetDateTime::now_utc();

		if note.is_deleted {
			let invalidated = uow.invalidate_for_note(note_id, &self.actor, now).await?;

			uow.commit().await?;

			return Ok(IndexOutcome::NoteDeleted { invalidated });
		}

		let invalidated = if request.delete_old_embedding {
			uow.invalidate_for_note(note_id, &self.actor, now).await?
		} else {
			0
		};
		let source_text = source_text::render_source_text(&note)?;

		// A redelivered create finds the record its first delivery committed.
		if !request.delete_old_embedding {
			let live = uow.live_embeddings(note_id).await?;

			if let Some(existing) = live.iter().find(|record| record.source_text == source_text) {
				let embedding_id = existing.embedding_id;

				uow.commit().await?;

				return Ok(IndexOutcome::Unchanged { embedding_id });
			}
		}

		let vector = self.embedding.embed(&source_text).await?;
		let expected = self.store.dim();

		if vector.len() != expected as usize {
			return Err(Error::DimensionMismatch { expected, actual: vector.len() });
		}
		if let Some(index) = vector.iter().position(|value| !value.is_finite()) {
			return Err(Error::NonFiniteVector { index });
		}

		let record = NewEmbedding {
			embedding_id: Uuid::new_v4(),
			note_id,
			source_text,
			vector,
			created_at: now,
			created_by: self.actor.clone(),
		};

		uow.create_embedding(&record).await?;
		uow.commit().await?;

		Ok(IndexOutcome::Indexed { embedding_id: record.embedding_id, invalidated })
	}

	async fn run(
		self,
		mut subscription: Box<dyn Subscription>,
		slots: Arc<Semaphore>,
		mut stop: watch::Receiver<bool>,
	) {
		loop {
			// Take a slot before dequeuing so a saturated pool leaves messages on the channel.
			let permit = tokio::select! {
				biased;
				_ = stopped(&mut stop) => break,
				permit = slots.clone().acquire_owned() => match permit {
					Ok(permit) => permit,
					Err(_) => break,
				},
			};
			let next = tokio::select! {
				biased;
				_ = stopped(&mut stop) => break,
				next = subscription.next() => next,
			};

			match next {
				Ok(Some(delivery)) => {
					let worker = self.clone();

					tokio::spawn(async move {
						worker.handle(delivery).await;

						drop(permit);
					});
				},
				Ok(None) => {
					tracing::info!("Indexing channel closed.");

					break;
				},
				Err(err) => {
					drop(permit);

					tracing::error!(error = %err, "Failed to receive from indexing channel.");

					tokio::select! {
						_ = stopped(&mut stop) => break,
						_ = tokio::time::sleep(Duration::from_millis(RECEIVE_ERROR_BACKOFF_MS)) => {},
					}
				},
			}
		}

		// Every slot back means every in-flight task has finished.
		match slots.acquire_many(self.max_concurrent as u32).await {
			Ok(_) => tracing::info!("Indexing worker drained."),
			Err(err) => tracing::warn!(error = %err, "Indexing worker drain was interrupted."),
		}
	}

	async fn handle(&self, delivery: Box<dyn Delivery>) {
		let message_id = delivery.message_id();
		let attempts = delivery.attempts();
		let result = self.process(delivery.payload()).await;

		match result {
			Ok(outcome) => {
				if let Err(err) = delivery.ack().await {
					tracing::error!(
						message_id = %message_id,
						error = %err,
						"Failed to acknowledge indexing message."
					);

					return;
				}

				tracing::info!(message_id = %message_id, ?outcome, "Indexing message processed.");
			},
			Err(err) => {
				let disposition = err.disposition();

				tracing::warn!(
					message_id = %message_id,
					attempts,
					?disposition,
					error = %err,
					"Indexing message failed."
				);

				if let Err(reject_err) = delivery.reject(disposition, err.to_string()).await {
					tracing::error!(
						message_id = %message_id,
						error = %reject_err,
						"Failed to reject indexing message."
					);
				}
			},
		}
	}
}

pub struct WorkerHandle {
	stop: watch::Sender<bool>,
	task: JoinHandle<()>,
}
impl WorkerHandle {
	/// Stops dequeuing and waits for in-flight messages to finish.
	pub async fn shutdown(self) -> Result<()> {
		let _ = self.stop.send(true);

		self.join().await
	}

	/// Waits for the consume loop to end on its own, e.g. when the channel closes.
	pub async fn join(self) -> Result<()> {
		let Self { stop, task } = self;
		let result = task.await.map_err(|err| Error::Join { message: err.to_string() });

		drop(stop);

		result
	}
}

async fn stopped(stop: &mut watch::Receiver<bool>) {
	while !*stop.borrow_and_update() {
		if stop.changed().await.is_err() {
			return;
		}
	}
}
