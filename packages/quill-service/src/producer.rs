use std::sync::Arc;

use uuid::Uuid;

use quill_queue::{IndexingRequest, Publisher};

use crate::Result;

/// Publishes indexing requests after note mutations.
///
/// A producer without a publisher is a no-op: mutations still succeed, nothing gets indexed.
#[derive(Clone, Default)]
pub struct IndexingProducer {
	publisher: Option<Arc<dyn Publisher>>,
}
impl IndexingProducer {
	pub fn new(publisher: Arc<dyn Publisher>) -> Self {
		Self { publisher: Some(publisher) }
	}

	pub fn disabled() -> Self {
		Self::default()
	}

	pub fn is_enabled(&self) -> bool {
		self.publisher.is_some()
	}

	/// Returns `Ok(false)` when no publisher is configured.
	pub async fn try_request(&self, note_id: Uuid, delete_old_embedding: bool) -> Result<bool> {
		let Some(publisher) = &self.publisher else {
			return Ok(false);
		};
		let payload = IndexingRequest { note_id, delete_old_embedding }.encode()?;

		publisher.publish(&payload).await?;

		Ok(true)
	}

	/// Fire-and-forget: failures are logged and swallowed.
	pub async fn request(&self, note_id: Uuid, delete_old_embedding: bool) {
		match self.try_request(note_id, delete_old_embedding).await {
			Ok(true) => tracing::debug!(note_id = %note_id, delete_old_embedding, "Indexing requested."),
			Ok(false) =>
				tracing::debug!(note_id = %note_id, "No publisher configured; skipping indexing request."),
			Err(err) => tracing::warn!(
				note_id = %note_id,
				error = %err,
				"Failed to publish indexing request; note will stay unindexed until re-indexed."
			),
		}
	}
}
