//! Storage seams used by the indexing worker and the retrieval service.
//!
//! [`VectorStore`] and [`NoteStore`] are implemented by [`PgStore`] and by
//! [`crate::MemoryStore`]. All worker writes go through a [`UnitOfWork`], which is rolled back
//! when dropped without [`UnitOfWork::commit`].

use std::{future::Future, pin::Pin};

use sqlx::{Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use quill_config::VectorMetric;

use crate::{
	Error, Result,
	db::Db,
	embeddings,
	models::{
		EmbeddingRecord, Neighbor, NewEmbedding, NewNote, NewNotebook, Note, NotebookDeletion,
	},
	notes, vector,
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait VectorStore
where
	Self: Send + Sync,
{
	fn dim(&self) -> u32;

	fn metric(&self) -> VectorMetric;

	fn begin<'a>(&'a self) -> BoxFuture<'a, Result<Box<dyn UnitOfWork>>>;

	fn create_embedding<'a>(&'a self, record: &'a NewEmbedding) -> BoxFuture<'a, Result<i64>>;

	/// Soft-deletes every live record of the note. Returns how many records changed.
	fn invalidate_for_note<'a>(
		&'a self,
		note_id: Uuid,
		actor: &'a str,
		at: OffsetDateTime,
	) -> BoxFuture<'a, Result<u64>>;

	/// Up to `k` distinct notes, nearest first, ties broken by insertion order.
	fn find_nearest<'a>(&'a self, query: &'a [f32], k: u32)
	-> BoxFuture<'a, Result<Vec<Neighbor>>>;

	fn live_embeddings<'a>(&'a self, note_id: Uuid) -> BoxFuture<'a, Result<Vec<EmbeddingRecord>>>;
}

pub trait UnitOfWork
where
	Self: Send,
{
	/// Serializes with every other unit of work that locks the same note until commit or drop.
	fn lock_note<'a>(&'a mut self, note_id: Uuid) -> BoxFuture<'a, Result<()>>;

	/// Loads the note including soft-deleted ones.
	fn note_by_id<'a>(&'a mut self, note_id: Uuid) -> BoxFuture<'a, Result<Option<Note>>>;

	fn invalidate_for_note<'a>(
		&'a mut self,
		note_id: Uuid,
		actor: &'a str,
		at: OffsetDateTime,
	) -> BoxFuture<'a, Result<u64>>;

	fn create_embedding<'a>(&'a mut self, record: &'a NewEmbedding)
	-> BoxFuture<'a, Result<i64>>;

	/// Live records of the note as this unit sees them, oldest first.
	fn live_embeddings<'a>(&'a mut self, note_id: Uuid)
	-> BoxFuture<'a, Result<Vec<EmbeddingRecord>>>;

	fn commit(self: Box<Self>) -> BoxFuture<'static, Result<()>>;
}

/// Reads skip soft-deleted notes.
pub trait NoteStore
where
	Self: Send + Sync,
{
	fn get_note_by_id<'a>(&'a self, note_id: Uuid) -> BoxFuture<'a, Result<Option<Note>>>;

	/// Result order is unspecified.
	fn get_notes_by_ids<'a>(&'a self, note_ids: &'a [Uuid]) -> BoxFuture<'a, Result<Vec<Note>>>;

	fn get_notes_by_notebook_id<'a>(
		&'a self,
		notebook_id: Uuid,
	) -> BoxFuture<'a, Result<Vec<Note>>>;

	fn create_notebook<'a>(&'a self, notebook: &'a NewNotebook) -> BoxFuture<'a, Result<()>>;

	fn rename_notebook<'a>(
		&'a self,
		notebook_id: Uuid,
		name: &'a str,
		actor: &'a str,
		at: OffsetDateTime,
	) -> BoxFuture<'a, Result<()>>;

	/// Soft-deletes the notebook, its notes and their embeddings in one transaction.
	fn delete_notebook<'a>(
		&'a self,
		notebook_id: Uuid,
		actor: &'a str,
		at: OffsetDateTime,
	) -> BoxFuture<'a, Result<NotebookDeletion>>;

	fn create_note<'a>(&'a self, note: &'a NewNote) -> BoxFuture<'a, Result<()>>;

	fn update_note<'a>(
		&'a self,
		note_id: Uuid,
		title: &'a str,
		content: &'a str,
		actor: &'a str,
		at: OffsetDateTime,
	) -> BoxFuture<'a, Result<()>>;

	fn move_note<'a>(
		&'a self,
		note_id: Uuid,
		notebook_id: Option<Uuid>,
		actor: &'a str,
		at: OffsetDateTime,
	) -> BoxFuture<'a, Result<()>>;

	/// Soft-deletes the note and invalidates its embeddings atomically. Returns the number of
	/// embeddings invalidated.
	fn delete_note<'a>(
		&'a self,
		note_id: Uuid,
		actor: &'a str,
		at: OffsetDateTime,
	) -> BoxFuture<'a, Result<u64>>;
}

#[derive(Clone)]
pub struct PgStore {
	db: Db,
	dim: u32,
	metric: VectorMetric,
}
impl PgStore {
	pub fn new(db: Db, cfg: &quill_config::Vector) -> Self {
		Self { db, dim: cfg.dim, metric: cfg.metric }
	}

	pub fn db(&self) -> &Db {
		&self.db
	}

	async fn require_notebook(
		tx: &mut Transaction<'static, Postgres>,
		notebook_id: Option<Uuid>,
	) -> Result<()> {
		let Some(notebook_id) = notebook_id else {
			return Ok(());
		};

		if notes::fetch_live_notebook(&mut **tx, notebook_id).await?.is_none() {
			return Err(Error::NotFound(format!("notebook {notebook_id}")));
		}

		Ok(())
	}
}

impl VectorStore for PgStore {
	fn dim(&self) -> u32 {
		self.dim
	}

	fn metric(&self) -> VectorMetric {
		self.metric
	}

	fn begin<'a>(&'a self) -> BoxFuture<'a, Result<Box<dyn UnitOfWork>>> {
		Box::pin(async move {
			let tx = self.db.pool.begin().await?;

			Ok(Box::new(PgUnitOfWork { tx, dim: self.dim }) as Box<dyn UnitOfWork>)
		})
	}

	fn create_embedding<'a>(&'a self, record: &'a NewEmbedding) -> BoxFuture<'a, Result<i64>> {
		Box::pin(async move {
			vector::validate_vector_dim(&record.vector, self.dim)?;

			embeddings::insert_embedding(&self.db.pool, record).await
		})
	}

	fn invalidate_for_note<'a>(
		&'a self,
		note_id: Uuid,
		actor: &'a str,
		at: OffsetDateTime,
	) -> BoxFuture<'a, Result<u64>> {
		Box::pin(embeddings::invalidate_note_embeddings(&self.db.pool, note_id, actor, at))
	}

	fn find_nearest<'a>(
		&'a self,
		query: &'a [f32],
		k: u32,
	) -> BoxFuture<'a, Result<Vec<Neighbor>>> {
		Box::pin(async move {
			vector::validate_vector_dim(query, self.dim)?;

			if k == 0 {
				return Ok(Vec::new());
			}

			embeddings::find_nearest(&self.db.pool, self.metric, query, k).await
		})
	}

	fn live_embeddings<'a>(&'a self, note_id: Uuid) -> BoxFuture<'a, Result<Vec<EmbeddingRecord>>> {
		Box::pin(embeddings::fetch_live_embeddings(&self.db.pool, note_id))
	}
}

impl NoteStore for PgStore {
	fn get_note_by_id<'a>(&'a self, note_id: Uuid) -> BoxFuture<'a, Result<Option<Note>>> {
		Box::pin(notes::fetch_live_note(&self.db.pool, note_id))
	}

	fn get_notes_by_ids<'a>(&'a self, note_ids: &'a [Uuid]) -> BoxFuture<'a, Result<Vec<Note>>> {
		Box::pin(async move {
			if note_ids.is_empty() {
				return Ok(Vec::new());
			}

			notes::fetch_live_notes(&self.db.pool, note_ids).await
		})
	}

	fn get_notes_by_notebook_id<'a>(
		&'a self,
		notebook_id: Uuid,
	) -> BoxFuture<'a, Result<Vec<Note>>> {
		Box::pin(notes::fetch_live_notes_by_notebook(&self.db.pool, notebook_id))
	}

	fn create_notebook<'a>(&'a self, notebook: &'a NewNotebook) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut tx = self.db.pool.begin().await?;

			Self::require_notebook(&mut tx, notebook.parent_id).await?;
			notes::insert_notebook(&mut *tx, notebook).await?;

			tx.commit().await?;

			Ok(())
		})
	}

	fn rename_notebook<'a>(
		&'a self,
		notebook_id: Uuid,
		name: &'a str,
		actor: &'a str,
		at: OffsetDateTime,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let changed =
				notes::rename_notebook(&self.db.pool, notebook_id, name, actor, at).await?;

			if changed == 0 {
				return Err(Error::NotFound(format!("notebook {notebook_id}")));
			}

			Ok(())
		})
	}

	fn delete_notebook<'a>(
		&'a self,
		notebook_id: Uuid,
		actor: &'a str,
		at: OffsetDateTime,
	) -> BoxFuture<'a, Result<NotebookDeletion>> {
		Box::pin(async move {
			let mut tx = self.db.pool.begin().await?;
			let embeddings =
				embeddings::invalidate_notebook_embeddings(&mut *tx, notebook_id, actor, at).await?;
			let notes = notes::soft_delete_notes_by_notebook(&mut *tx, notebook_id, actor, at).await?;
			let changed = notes::soft_delete_notebook(&mut *tx, notebook_id, actor, at).await?;

			if changed == 0 {
				return Err(Error::NotFound(format!("notebook {notebook_id}")));
			}

			tx.commit().await?;

			Ok(NotebookDeletion { notes, embeddings })
		})
	}

	fn create_note<'a>(&'a self, note: &'a NewNote) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut tx = self.db.pool.begin().await?;

			Self::require_notebook(&mut tx, note.notebook_id).await?;
			notes::insert_note(&mut *tx, note).await?;

			tx.commit().await?;

			Ok(())
		})
	}

	fn update_note<'a>(
		&'a self,
		note_id: Uuid,
		title: &'a str,
		content: &'a str,
		actor: &'a str,
		at: OffsetDateTime,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let changed =
				notes::update_note_body(&self.db.pool, note_id, title, content, actor, at).await?;

			if changed == 0 {
				return Err(Error::NotFound(format!("note {note_id}")));
			}

			Ok(())
		})
	}

	fn move_note<'a>(
		&'a self,
		note_id: Uuid,
		notebook_id: Option<Uuid>,
		actor: &'a str,
		at: OffsetDateTime,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut tx = self.db.pool.begin().await?;

			Self::require_notebook(&mut tx, notebook_id).await?;

			let changed =
				notes::update_note_notebook(&mut *tx, note_id, notebook_id, actor, at).await?;

			if changed == 0 {
				return Err(Error::NotFound(format!("note {note_id}")));
			}

			tx.commit().await?;

			Ok(())
		})
	}

	fn delete_note<'a>(
		&'a self,
		note_id: Uuid,
		actor: &'a str,
		at: OffsetDateTime,
	) -> BoxFuture<'a, Result<u64>> {
		Box::pin(async move {
			let mut tx = self.db.pool.begin().await?;
			let changed = notes::soft_delete_note(&mut *tx, note_id, actor, at).await?;

			if changed == 0 {
				return Err(Error::NotFound(format!("note {note_id}")));
			}

			let invalidated =
				embeddings::invalidate_note_embeddings(&mut *tx, note_id, actor, at).await?;

			tx.commit().await?;

			Ok(invalidated)
		})
	}
}

pub struct PgUnitOfWork {
	tx: Transaction<'static, Postgres>,
	dim: u32,
}

impl UnitOfWork for PgUnitOfWork {
	fn lock_note<'a>(&'a mut self, note_id: Uuid) -> BoxFuture<'a, Result<()>> {
		Box::pin(notes::lock_note(&mut *self.tx, note_id))
	}

	fn note_by_id<'a>(&'a mut self, note_id: Uuid) -> BoxFuture<'a, Result<Option<Note>>> {
		Box::pin(notes::fetch_note(&mut *self.tx, note_id))
	}

	fn invalidate_for_note<'a>(
		&'a mut self,
		note_id: Uuid,
		actor: &'a str,
		at: OffsetDateTime,
	) -> BoxFuture<'a, Result<u64>> {
		Box::pin(embeddings::invalidate_note_embeddings(&mut *self.tx, note_id, actor, at))
	}

	fn create_embedding<'a>(
		&'a mut self,
		record: &'a NewEmbedding,
	) -> BoxFuture<'a, Result<i64>> {
		Box::pin(async move {
			vector::validate_vector_dim(&record.vector, self.dim)?;

			embeddings::insert_embedding(&mut *self.tx, record).await
		})
	}

	fn live_embeddings<'a>(
		&'a mut self,
		note_id: Uuid,
	) -> BoxFuture<'a, Result<Vec<EmbeddingRecord>>> {
		Box::pin(embeddings::fetch_live_embeddings(&mut *self.tx, note_id))
	}

	fn commit(self: Box<Self>) -> BoxFuture<'static, Result<()>> {
		Box::pin(async move {
			self.tx.commit().await?;

			Ok(())
		})
	}
}
