use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use quill_storage::models::{NewNote, NewNotebook};

use crate::{Error, QuillService, Result};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateNotebookRequest {
	pub name: String,
	#[serde(default)]
	pub parent_id: Option<Uuid>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NotebookResponse {
	pub notebook_id: Uuid,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RenameNotebookRequest {
	pub notebook_id: Uuid,
	pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RenameNotebookResponse {
	pub notebook_id: Uuid,
	/// Notes whose embeddings were queued for rebuilding with the new name.
	pub reindexed: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeleteNotebookRequest {
	pub notebook_id: Uuid,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeleteNotebookResponse {
	pub notebook_id: Uuid,
	pub notes_deleted: u64,
	pub embeddings_invalidated: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateNoteRequest {
	pub title: String,
	pub content: String,
	#[serde(default)]
	pub notebook_id: Option<Uuid>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NoteResponse {
	pub note_id: Uuid,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UpdateNoteRequest {
	pub note_id: Uuid,
	pub title: String,
	pub content: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MoveNoteRequest {
	pub note_id: Uuid,
	/// `None` moves the note out of any notebook.
	#[serde(default)]
	pub notebook_id: Option<Uuid>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeleteNoteRequest {
	pub note_id: Uuid,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeleteNoteResponse {
	pub note_id: Uuid,
	pub embeddings_invalidated: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ReindexRequest {
	#[serde(default)]
	pub note_ids: Vec<Uuid>,
	#[serde(default)]
	pub notebook_id: Option<Uuid>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReindexResponse {
	pub published: usize,
}

impl QuillService {
	pub async fn create_notebook(&self, req: CreateNotebookRequest) -> Result<NotebookResponse> {
		let name = required(&req.name, "name")?;
		let notebook = NewNotebook {
			notebook_id: Uuid::new_v4(),
			name: name.to_string(),
			parent_id: req.parent_id,
			created_at: OffsetDateTime::now_utc(),
			created_by: self.actor.clone(),
		};

		self.notes.create_notebook(&notebook).await?;

		Ok(NotebookResponse { notebook_id: notebook.notebook_id })
	}

	/// Renames the notebook and re-indexes its notes, whose source text carries the name.
	pub async fn rename_notebook(
		&self,
		req: RenameNotebookRequest,
	) -> Result<RenameNotebookResponse> {
		let name = required(&req.name, "name")?;

		self.notes
			.rename_notebook(req.notebook_id, name, &self.actor, OffsetDateTime::now_utc())
			.await?;

		let notes = self.notes.get_notes_by_notebook_id(req.notebook_id).await?;

		for note in &notes {
			self.producer.request(note.note_id, true).await;
		}

		Ok(RenameNotebookResponse { notebook_id: req.notebook_id, reindexed: notes.len() })
	}

	pub async fn delete_notebook(&self, req: DeleteNotebookRequest) -> Result<DeleteNotebookResponse> {
		let deletion = self
			.notes
			.delete_notebook(req.notebook_id, &self.actor, OffsetDateTime::now_utc())
			.await?;

		tracing::info!(
			notebook_id = %req.notebook_id,
			notes = deletion.notes,
			embeddings = deletion.embeddings,
			"Notebook deleted."
		);

		Ok(DeleteNotebookResponse {
			notebook_id: req.notebook_id,
			notes_deleted: deletion.notes,
			embeddings_invalidated: deletion.embeddings,
		})
	}

	pub async fn create_note(&self, req: CreateNoteRequest) -> Result<NoteResponse> {
		let title = required(&req.title, "title")?;
		let note = NewNote {
			note_id: Uuid::new_v4(),
			title: title.to_string(),
			content: req.content,
			notebook_id: req.notebook_id,
			created_at: OffsetDateTime::now_utc(),
			created_by: self.actor.clone(),
		};

		self.notes.create_note(&note).await?;
		self.producer.request(note.note_id, false).await;

		Ok(NoteResponse { note_id: note.note_id })
	}

	pub async fn update_note(&self, req: UpdateNoteRequest) -> Result<NoteResponse> {
		let title = required(&req.title, "title")?;

		self.notes
			.update_note(req.note_id, title, &req.content, &self.actor, OffsetDateTime::now_utc())
			.await?;
		self.producer.request(req.note_id, true).await;

		Ok(NoteResponse { note_id: req.note_id })
	}

	pub async fn move_note(&self, req: MoveNoteRequest) -> Result<NoteResponse> {
		self.notes
			.move_note(req.note_id, req.notebook_id, &self.actor, OffsetDateTime::now_utc())
			.await?;
		self.producer.request(req.note_id, true).await;

		Ok(NoteResponse { note_id: req.note_id })
	}

	/// Soft-deletes the note together with its embeddings. Nothing is published.
	pub async fn delete_note(&self, req: DeleteNoteRequest) -> Result<DeleteNoteResponse> {
		let invalidated =
			self.notes.delete_note(req.note_id, &self.actor, OffsetDateTime::now_utc()).await?;

		Ok(DeleteNoteResponse { note_id: req.note_id, embeddings_invalidated: invalidated })
	}

	/// Queues a rebuild for the listed notes and every note in `notebook_id`.
	///
	/// Unlike the mutation paths, a missing publisher or a failed publish is an error here.
	pub async fn reindex(&self, req: ReindexRequest) -> Result<ReindexResponse> {
		if !self.producer.is_enabled() {
			return Err(Error::Queue { message: "No indexing publisher is configured.".to_string() });
		}

		let mut note_ids = Vec::new();

		for note_id in req.note_ids {
			if self.notes.get_note_by_id(note_id).await?.is_none() {
				return Err(Error::NotFound { message: format!("note {note_id}") });
			}

			note_ids.push(note_id);
		}

		if let Some(notebook_id) = req.notebook_id {
			for note in self.notes.get_notes_by_notebook_id(notebook_id).await? {
				if !note_ids.contains(&note.note_id) {
					note_ids.push(note.note_id);
				}
			}
		}

		for note_id in &note_ids {
			self.producer.try_request(*note_id, true).await?;
		}

		tracing::info!(published = note_ids.len(), "Re-index requests published.");

		Ok(ReindexResponse { published: note_ids.len() })
	}
}

fn required<'a>(value: &'a str, field: &str) -> Result<&'a str> {
	let trimmed = value.trim();

	if trimmed.is_empty() {
		return Err(Error::InvalidRequest { message: format!("{field} must not be empty.") });
	}

	Ok(trimmed)
}
