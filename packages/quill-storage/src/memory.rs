//! Process-local store with the same visibility rules as [`crate::PgStore`].
//!
//! Unit-of-work writes are staged and applied under one lock at commit, so readers never see
//! half of a unit. Invalidation captures the live record ids when it is called, the way a
//! read-committed `UPDATE` only touches rows committed before the statement.

use std::{
	collections::HashMap,
	sync::{Arc, Mutex, MutexGuard},
};

use time::OffsetDateTime;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use quill_config::VectorMetric;

use crate::{
	Error, Result, metric,
	models::{
		EmbeddingRecord, Neighbor, NewEmbedding, NewNote, NewNotebook, Note, Notebook,
		NotebookDeletion,
	},
	store::{BoxFuture, NoteStore, UnitOfWork, VectorStore},
	vector,
};

#[derive(Default)]
struct MemoryState {
	notebooks: HashMap<Uuid, Notebook>,
	notes: HashMap<Uuid, Note>,
	embeddings: Vec<EmbeddingRecord>,
	next_seq: i64,
}
impl MemoryState {
	fn resolve(&self, note: &Note) -> Note {
		let mut note = note.clone();

		note.notebook_name = note
			.notebook_id
			.and_then(|id| self.notebooks.get(&id))
			.map(|notebook| notebook.name.clone());

		note
	}

	fn live_note(&self, note_id: Uuid) -> Option<Note> {
		self.notes.get(&note_id).filter(|note| !note.is_deleted).map(|note| self.resolve(note))
	}

	fn require_notebook(&self, notebook_id: Option<Uuid>) -> Result<()> {
		let Some(notebook_id) = notebook_id else {
			return Ok(());
		};

		match self.notebooks.get(&notebook_id) {
			Some(notebook) if !notebook.is_deleted => Ok(()),
			_ => Err(Error::NotFound(format!("notebook {notebook_id}"))),
		}
	}

	fn live_embedding_ids(&self, note_id: Uuid) -> Vec<Uuid> {
		self.embeddings
			.iter()
			.filter(|record| record.note_id == note_id && !record.is_deleted)
			.map(|record| record.embedding_id)
			.collect()
	}

	fn insert_embedding(&mut self, record: &NewEmbedding) -> Result<i64> {
		if !self.notes.contains_key(&record.note_id) {
			return Err(Error::Conflict(format!("note {} does not exist", record.note_id)));
		}
		if self.embeddings.iter().any(|existing| existing.embedding_id == record.embedding_id) {
			return Err(Error::Conflict(format!("embedding {} already exists", record.embedding_id)));
		}

		self.next_seq += 1;

		self.embeddings.push(EmbeddingRecord {
			embedding_id: record.embedding_id,
			note_id: record.note_id,
			source_text: record.source_text.clone(),
			vector: record.vector.clone(),
			seq: self.next_seq,
			created_at: record.created_at,
			created_by: record.created_by.clone(),
			deleted_at: None,
			deleted_by: None,
			is_deleted: false,
		});

		Ok(self.next_seq)
	}

	fn invalidate(&mut self, ids: &[Uuid], actor: &str, at: OffsetDateTime) -> u64 {
		let mut changed = 0;

		for record in self.embeddings.iter_mut() {
			if !record.is_deleted && ids.contains(&record.embedding_id) {
				record.is_deleted = true;
				record.deleted_at = Some(at);
				record.deleted_by = Some(actor.to_string());
				changed += 1;
			}
		}

		changed
	}
}

#[derive(Clone)]
pub struct MemoryStore {
	state: Arc<Mutex<MemoryState>>,
	note_locks: Arc<Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>>,
	dim: u32,
	metric: VectorMetric,
}
impl MemoryStore {
	pub fn new(dim: u32, metric: VectorMetric) -> Self {
		Self {
			state: Arc::new(Mutex::new(MemoryState::default())),
			note_locks: Arc::new(Mutex::new(HashMap::new())),
			dim,
			metric,
		}
	}

	/// Every record of the note, live or not, in insertion order.
	pub fn all_embeddings(&self, note_id: Uuid) -> Vec<EmbeddingRecord> {
		let state = self.lock();
		let mut records: Vec<_> =
			state.embeddings.iter().filter(|record| record.note_id == note_id).cloned().collect();

		records.sort_by_key(|record| record.seq);

		records
	}

	fn lock(&self) -> MutexGuard<'_, MemoryState> {
		self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
	}

	/// Notes that currently have a lock entry, held or awaited.
	pub fn note_lock_count(&self) -> usize {
		self.note_locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
	}

	fn note_lock(&self, note_id: Uuid) -> Arc<AsyncMutex<()>> {
		let mut locks = self.note_locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

		locks.entry(note_id).or_default().clone()
	}

	// Clones are only taken under the map lock, so a count of one means nobody holds or awaits it.
	fn release_note_locks(&self, note_ids: &[Uuid]) {
		let mut locks = self.note_locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

		for note_id in note_ids {
			if locks.get(note_id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
				locks.remove(note_id);
			}
		}
	}
}

impl VectorStore for MemoryStore {
	fn dim(&self) -> u32 {
		self.dim
	}

	fn metric(&self) -> VectorMetric {
		self.metric
	}

	fn begin<'a>(&'a self) -> BoxFuture<'a, Result<Box<dyn UnitOfWork>>> {
		Box::pin(async move {
			Ok(Box::new(MemoryUnitOfWork {
				store: self.clone(),
				staged: Vec::new(),
				held_locks: Vec::new(),
			}) as Box<dyn UnitOfWork>)
		})
	}

	fn create_embedding<'a>(&'a self, record: &'a NewEmbedding) -> BoxFuture<'a, Result<i64>> {
		Box::pin(async move {
			vector::validate_vector_dim(&record.vector, self.dim)?;

			self.lock().insert_embedding(record)
		})
	}

	fn invalidate_for_note<'a>(
		&'a self,
		note_id: Uuid,
		actor: &'a str,
		at: OffsetDateTime,
	) -> BoxFuture<'a, Result<u64>> {
		Box::pin(async move {
			let mut state = self.lock();
			let ids = state.live_embedding_ids(note_id);

			Ok(state.invalidate(&ids, actor, at))
		})
	}

	fn find_nearest<'a>(
		&'a self,
		query: &'a [f32],
		k: u32,
	) -> BoxFuture<'a, Result<Vec<Neighbor>>> {
		Box::pin(async move {
			vector::validate_vector_dim(query, self.dim)?;

			let state = self.lock();
			let mut best: HashMap<Uuid, (f32, i64)> = HashMap::new();

			for record in &state.embeddings {
				if record.is_deleted {
					continue;
				}
				if !state.notes.get(&record.note_id).is_some_and(|note| !note.is_deleted) {
					continue;
				}

				let distance = metric::distance(self.metric, query, &record.vector);
				let candidate = (distance, record.seq);

				best.entry(record.note_id)
					.and_modify(|current| {
						if rank(candidate, *current).is_lt() {
							*current = candidate;
						}
					})
					.or_insert(candidate);
			}

			let mut ranked: Vec<_> = best.into_iter().collect();

			ranked.sort_by(|(_, a), (_, b)| rank(*a, *b));
			ranked.truncate(k as usize);

			Ok(ranked
				.into_iter()
				.map(|(note_id, (distance, _))| Neighbor { note_id, distance })
				.collect())
		})
	}

	fn live_embeddings<'a>(&'a self, note_id: Uuid) -> BoxFuture<'a, Result<Vec<EmbeddingRecord>>> {
		Box::pin(async move {
			Ok(self.all_embeddings(note_id).into_iter().filter(|record| !record.is_deleted).collect())
		})
	}
}

impl NoteStore for MemoryStore {
	fn get_note_by_id<'a>(&'a self, note_id: Uuid) -> BoxFuture<'a, Result<Option<Note>>> {
		Box::pin(async move { Ok(self.lock().live_note(note_id)) })
	}

	fn get_notes_by_ids<'a>(&'a self, note_ids: &'a [Uuid]) -> BoxFuture<'a, Result<Vec<Note>>> {
		Box::pin(async move {
			let state = self.lock();

			Ok(note_ids.iter().filter_map(|id| state.live_note(*id)).collect())
		})
	}

	fn get_notes_by_notebook_id<'a>(
		&'a self,
		notebook_id: Uuid,
	) -> BoxFuture<'a, Result<Vec<Note>>> {
		Box::pin(async move {
			let state = self.lock();
			let mut notes: Vec<_> = state
				.notes
				.values()
				.filter(|note| !note.is_deleted && note.notebook_id == Some(notebook_id))
				.map(|note| state.resolve(note))
				.collect();

			notes.sort_by_key(|note| note.created_at);

			Ok(notes)
		})
	}

	fn create_notebook<'a>(&'a self, notebook: &'a NewNotebook) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut state = self.lock();

			state.require_notebook(notebook.parent_id)?;

			if state.notebooks.contains_key(&notebook.notebook_id) {
				return Err(Error::Conflict(format!("notebook {} already exists", notebook.notebook_id)));
			}

			state.notebooks.insert(
				notebook.notebook_id,
				Notebook {
					notebook_id: notebook.notebook_id,
					name: notebook.name.clone(),
					parent_id: notebook.parent_id,
					created_at: notebook.created_at,
					created_by: notebook.created_by.clone(),
					updated_at: None,
					updated_by: None,
					is_deleted: false,
				},
			);

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
			let mut state = self.lock();
			let Some(notebook) =
				state.notebooks.get_mut(&notebook_id).filter(|notebook| !notebook.is_deleted)
			else {
				return Err(Error::NotFound(format!("notebook {notebook_id}")));
			};

			notebook.name = name.to_string();
			notebook.updated_at = Some(at);
			notebook.updated_by = Some(actor.to_string());

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
			let mut state = self.lock();

			state.require_notebook(Some(notebook_id))?;

			let note_ids: Vec<Uuid> = state
				.notes
				.values()
				.filter(|note| !note.is_deleted && note.notebook_id == Some(notebook_id))
				.map(|note| note.note_id)
				.collect();
			let mut deletion = NotebookDeletion { notes: 0, embeddings: 0 };

			for note_id in note_ids {
				if let Some(note) = state.notes.get_mut(&note_id) {
					note.is_deleted = true;
					note.deleted_at = Some(at);
					note.deleted_by = Some(actor.to_string());
					deletion.notes += 1;
				}

				let ids = state.live_embedding_ids(note_id);

				deletion.embeddings += state.invalidate(&ids, actor, at);
			}

			if let Some(notebook) = state.notebooks.get_mut(&notebook_id) {
				notebook.is_deleted = true;
			}

			Ok(deletion)
		})
	}

	fn create_note<'a>(&'a self, note: &'a NewNote) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut state = self.lock();

			state.require_notebook(note.notebook_id)?;

			if state.notes.contains_key(&note.note_id) {
				return Err(Error::Conflict(format!("note {} already exists", note.note_id)));
			}

			state.notes.insert(
				note.note_id,
				Note {
					note_id: note.note_id,
					title: note.title.clone(),
					content: note.content.clone(),
					notebook_id: note.notebook_id,
					notebook_name: None,
					created_at: note.created_at,
					created_by: note.created_by.clone(),
					updated_at: None,
					updated_by: None,
					deleted_at: None,
					deleted_by: None,
					is_deleted: false,
				},
			);

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
			let mut state = self.lock();
			let Some(note) = state.notes.get_mut(&note_id).filter(|note| !note.is_deleted) else {
				return Err(Error::NotFound(format!("note {note_id}")));
			};

			note.title = title.to_string();
			note.content = content.to_string();
			note.updated_at = Some(at);
			note.updated_by = Some(actor.to_string());

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
			let mut state = self.lock();

			state.require_notebook(notebook_id)?;

			let Some(note) = state.notes.get_mut(&note_id).filter(|note| !note.is_deleted) else {
				return Err(Error::NotFound(format!("note {note_id}")));
			};

			note.notebook_id = notebook_id;
			note.updated_at = Some(at);
			note.updated_by = Some(actor.to_string());

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
			let mut state = self.lock();
			let Some(note) = state.notes.get_mut(&note_id).filter(|note| !note.is_deleted) else {
				return Err(Error::NotFound(format!("note {note_id}")));
			};

			note.is_deleted = true;
			note.deleted_at = Some(at);
			note.deleted_by = Some(actor.to_string());

			let ids = state.live_embedding_ids(note_id);

			Ok(state.invalidate(&ids, actor, at))
		})
	}
}

enum StagedWrite {
	Invalidate { ids: Vec<Uuid>, actor: String, at: OffsetDateTime },
	Create(NewEmbedding),
}

struct MemoryUnitOfWork {
	store: MemoryStore,
	staged: Vec<StagedWrite>,
	held_locks: Vec<(Uuid, OwnedMutexGuard<()>)>,
}
impl MemoryUnitOfWork {
	fn staged_live_ids(&self, note_id: Uuid, committed: Vec<Uuid>) -> Vec<Uuid> {
		let mut live = committed;

		for write in &self.staged {
			match write {
				StagedWrite::Create(record) if record.note_id == note_id =>
					live.push(record.embedding_id),
				StagedWrite::Invalidate { ids, .. } => live.retain(|id| !ids.contains(id)),
				StagedWrite::Create(_) => {},
			}
		}

		live
	}
}

impl UnitOfWork for MemoryUnitOfWork {
	fn lock_note<'a>(&'a mut self, note_id: Uuid) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let lock = self.store.note_lock(note_id);

			self.held_locks.push((note_id, lock.lock_owned().await));

			Ok(())
		})
	}

	fn note_by_id<'a>(&'a mut self, note_id: Uuid) -> BoxFuture<'a, Result<Option<Note>>> {
		Box::pin(async move {
			let state = self.store.lock();

			Ok(state.notes.get(&note_id).map(|note| state.resolve(note)))
		})
	}

	fn invalidate_for_note<'a>(
		&'a mut self,
		note_id: Uuid,
		actor: &'a str,
		at: OffsetDateTime,
	) -> BoxFuture<'a, Result<u64>> {
		Box::pin(async move {
			let committed = self.store.lock().live_embedding_ids(note_id);
			let ids = self.staged_live_ids(note_id, committed);
			let changed = ids.len() as u64;

			self.staged.push(StagedWrite::Invalidate { ids, actor: actor.to_string(), at });

			Ok(changed)
		})
	}

	fn create_embedding<'a>(
		&'a mut self,
		record: &'a NewEmbedding,
	) -> BoxFuture<'a, Result<i64>> {
		Box::pin(async move {
			vector::validate_vector_dim(&record.vector, self.store.dim)?;

			let state = self.store.lock();

			if !state.notes.contains_key(&record.note_id) {
				return Err(Error::Conflict(format!("note {} does not exist", record.note_id)));
			}

			// Provisional; the committed seq is assigned when the write is applied.
			let provisional = state.next_seq + 1;

			drop(state);

			self.staged.push(StagedWrite::Create(record.clone()));

			Ok(provisional)
		})
	}

	fn live_embeddings<'a>(
		&'a mut self,
		note_id: Uuid,
	) -> BoxFuture<'a, Result<Vec<EmbeddingRecord>>> {
		Box::pin(async move {
			let state = self.store.lock();
			let live = self.staged_live_ids(note_id, state.live_embedding_ids(note_id));
			let mut records: Vec<_> = state
				.embeddings
				.iter()
				.filter(|record| live.contains(&record.embedding_id))
				.cloned()
				.collect();

			records.sort_by_key(|record| record.seq);

			Ok(records)
		})
	}

	fn commit(self: Box<Self>) -> BoxFuture<'static, Result<()>> {
		Box::pin(async move {
			let this = *self;
			let mut state = this.store.lock();
			let snapshot = (state.embeddings.clone(), state.next_seq);

			for write in &this.staged {
				let applied = match write {
					StagedWrite::Invalidate { ids, actor, at } => {
						state.invalidate(ids, actor, *at);

						Ok(())
					},
					StagedWrite::Create(record) => state.insert_embedding(record).map(|_| ()),
				};

				if let Err(err) = applied {
					(state.embeddings, state.next_seq) = snapshot;

					return Err(err);
				}
			}

			drop(state);
			drop(this);

			Ok(())
		})
	}
}

impl Drop for MemoryUnitOfWork {
	fn drop(&mut self) {
		let held = std::mem::take(&mut self.held_locks);
		let note_ids: Vec<Uuid> = held.iter().map(|(note_id, _)| *note_id).collect();

		drop(held);

		self.store.release_note_locks(&note_ids);
	}
}

fn rank(a: (f32, i64), b: (f32, i64)) -> std::cmp::Ordering {
	a.0.total_cmp(&b.0).then(a.1.cmp(&b.1))
}
