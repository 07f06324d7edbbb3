use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Notebook {
	pub notebook_id: Uuid,
	pub name: String,
	pub parent_id: Option<Uuid>,
	pub created_at: OffsetDateTime,
	pub created_by: String,
	pub updated_at: Option<OffsetDateTime>,
	pub updated_by: Option<String>,
	pub is_deleted: bool,
}

/// A note joined with the name of its notebook, if any.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Note {
	pub note_id: Uuid,
	pub title: String,
	pub content: String,
	pub notebook_id: Option<Uuid>,
	pub notebook_name: Option<String>,
	pub created_at: OffsetDateTime,
	pub created_by: String,
	pub updated_at: Option<OffsetDateTime>,
	pub updated_by: Option<String>,
	pub deleted_at: Option<OffsetDateTime>,
	pub deleted_by: Option<String>,
	pub is_deleted: bool,
}

#[derive(Debug, Clone)]
pub struct NewNotebook {
	pub notebook_id: Uuid,
	pub name: String,
	pub parent_id: Option<Uuid>,
	pub created_at: OffsetDateTime,
	pub created_by: String,
}

#[derive(Debug, Clone)]
pub struct NewNote {
	pub note_id: Uuid,
	pub title: String,
	pub content: String,
	pub notebook_id: Option<Uuid>,
	pub created_at: OffsetDateTime,
	pub created_by: String,
}

#[derive(Debug, Clone)]
pub struct EmbeddingRecord {
	pub embedding_id: Uuid,
	pub note_id: Uuid,
	pub source_text: String,
	pub vector: Vec<f32>,
	pub seq: i64,
	pub created_at: OffsetDateTime,
	pub created_by: String,
	pub deleted_at: Option<OffsetDateTime>,
	pub deleted_by: Option<String>,
	pub is_deleted: bool,
}

#[derive(Debug, Clone)]
pub struct NewEmbedding {
	pub embedding_id: Uuid,
	pub note_id: Uuid,
	pub source_text: String,
	pub vector: Vec<f32>,
	pub created_at: OffsetDateTime,
	pub created_by: String,
}

/// One `find_nearest` hit: the closest live record of a note and its distance to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
	pub note_id: Uuid,
	pub distance: f32,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct QueueMessage {
	pub message_id: Uuid,
	pub topic: String,
	pub payload: Vec<u8>,
	pub status: String,
	pub attempts: i32,
	pub last_error: Option<String>,
	pub available_at: OffsetDateTime,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

/// What a notebook deletion soft-deleted along with the notebook itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotebookDeletion {
	pub notes: u64,
	pub embeddings: u64,
}
