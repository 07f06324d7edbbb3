use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Result,
	models::{NewNote, NewNotebook, Note, Notebook},
};

const NOTE_COLUMNS: &str = "\
n.note_id,
\tn.title,
\tn.content,
\tn.notebook_id,
\tb.name AS notebook_name,
\tn.created_at,
\tn.created_by,
\tn.updated_at,
\tn.updated_by,
\tn.deleted_at,
\tn.deleted_by,
\tn.is_deleted";

/// Loads a note regardless of its deletion state.
pub async fn fetch_note<'e, E>(executor: E, note_id: Uuid) -> Result<Option<Note>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"\
SELECT
\t{NOTE_COLUMNS}
FROM notes n
LEFT JOIN notebooks b ON b.notebook_id = n.notebook_id
WHERE n.note_id = $1"
	);
	let row = sqlx::query_as::<_, Note>(&sql).bind(note_id).fetch_optional(executor).await?;

	Ok(row)
}

pub async fn fetch_live_note<'e, E>(executor: E, note_id: Uuid) -> Result<Option<Note>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"\
SELECT
\t{NOTE_COLUMNS}
FROM notes n
LEFT JOIN notebooks b ON b.notebook_id = n.notebook_id
WHERE n.note_id = $1 AND n.is_deleted = false"
	);
	let row = sqlx::query_as::<_, Note>(&sql).bind(note_id).fetch_optional(executor).await?;

	Ok(row)
}

pub async fn fetch_live_notes<'e, E>(executor: E, note_ids: &[Uuid]) -> Result<Vec<Note>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"\
SELECT
\t{NOTE_COLUMNS}
FROM notes n
LEFT JOIN notebooks b ON b.notebook_id = n.notebook_id
WHERE n.note_id = ANY($1) AND n.is_deleted = false"
	);
	let rows = sqlx::query_as::<_, Note>(&sql).bind(note_ids).fetch_all(executor).await?;

	Ok(rows)
}

pub async fn fetch_live_notes_by_notebook<'e, E>(executor: E, notebook_id: Uuid) -> Result<Vec<Note>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"\
SELECT
\t{NOTE_COLUMNS}
FROM notes n
LEFT JOIN notebooks b ON b.notebook_id = n.notebook_id
WHERE n.notebook_id = $1 AND n.is_deleted = false
ORDER BY n.created_at ASC"
	);
	let rows = sqlx::query_as::<_, Note>(&sql).bind(notebook_id).fetch_all(executor).await?;

	Ok(rows)
}

pub async fn fetch_live_notebook<'e, E>(executor: E, notebook_id: Uuid) -> Result<Option<Notebook>>
where
	E: PgExecutor<'e>,
{
	let row = sqlx::query_as::<_, Notebook>(
		"\
SELECT notebook_id, name, parent_id, created_at, created_by, updated_at, updated_by, is_deleted
FROM notebooks
WHERE notebook_id = $1 AND is_deleted = false",
	)
	.bind(notebook_id)
	.fetch_optional(executor)
	.await?;

	Ok(row)
}

pub async fn insert_notebook<'e, E>(executor: E, notebook: &NewNotebook) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO notebooks (notebook_id, name, parent_id, created_at, created_by)
VALUES ($1,$2,$3,$4,$5)",
	)
	.bind(notebook.notebook_id)
	.bind(notebook.name.as_str())
	.bind(notebook.parent_id)
	.bind(notebook.created_at)
	.bind(notebook.created_by.as_str())
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn rename_notebook<'e, E>(
	executor: E,
	notebook_id: Uuid,
	name: &str,
	actor: &str,
	at: OffsetDateTime,
) -> Result<u64>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
UPDATE notebooks
SET name = $1, updated_at = $2, updated_by = $3
WHERE notebook_id = $4 AND is_deleted = false",
	)
	.bind(name)
	.bind(at)
	.bind(actor)
	.bind(notebook_id)
	.execute(executor)
	.await?;

	Ok(result.rows_affected())
}

pub async fn insert_note<'e, E>(executor: E, note: &NewNote) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO notes (note_id, title, content, notebook_id, created_at, created_by)
VALUES ($1,$2,$3,$4,$5,$6)",
	)
	.bind(note.note_id)
	.bind(note.title.as_str())
	.bind(note.content.as_str())
	.bind(note.notebook_id)
	.bind(note.created_at)
	.bind(note.created_by.as_str())
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn update_note_body<'e, E>(
	executor: E,
	note_id: Uuid,
	title: &str,
	content: &str,
	actor: &str,
	at: OffsetDateTime,
) -> Result<u64>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
UPDATE notes
SET title = $1, content = $2, updated_at = $3, updated_by = $4
WHERE note_id = $5 AND is_deleted = false",
	)
	.bind(title)
	.bind(content)
	.bind(at)
	.bind(actor)
	.bind(note_id)
	.execute(executor)
	.await?;

	Ok(result.rows_affected())
}

pub async fn update_note_notebook<'e, E>(
	executor: E,
	note_id: Uuid,
	notebook_id: Option<Uuid>,
	actor: &str,
	at: OffsetDateTime,
) -> Result<u64>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
UPDATE notes
SET notebook_id = $1, updated_at = $2, updated_by = $3
WHERE note_id = $4 AND is_deleted = false",
	)
	.bind(notebook_id)
	.bind(at)
	.bind(actor)
	.bind(note_id)
	.execute(executor)
	.await?;

	Ok(result.rows_affected())
}

pub async fn soft_delete_note<'e, E>(
	executor: E,
	note_id: Uuid,
	actor: &str,
	at: OffsetDateTime,
) -> Result<u64>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
UPDATE notes
SET is_deleted = true, deleted_at = $1, deleted_by = $2
WHERE note_id = $3 AND is_deleted = false",
	)
	.bind(at)
	.bind(actor)
	.bind(note_id)
	.execute(executor)
	.await?;

	Ok(result.rows_affected())
}

/// Transaction-scoped advisory lock keyed on the note id.
pub async fn lock_note<'e, E>(executor: E, note_id: Uuid) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
		.bind(note_id)
		.execute(executor)
		.await?;

	Ok(())
}

pub async fn soft_delete_notebook<'e, E>(
	executor: E,
	notebook_id: Uuid,
	actor: &str,
	at: OffsetDateTime,
) -> Result<u64>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
UPDATE notebooks
SET is_deleted = true, deleted_at = $1, deleted_by = $2
WHERE notebook_id = $3 AND is_deleted = false",
	)
	.bind(at)
	.bind(actor)
	.bind(notebook_id)
	.execute(executor)
	.await?;

	Ok(result.rows_affected())
}

pub async fn soft_delete_notes_by_notebook<'e, E>(
	executor: E,
	notebook_id: Uuid,
	actor: &str,
	at: OffsetDateTime,
) -> Result<u64>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
UPDATE notes
SET is_deleted = true, deleted_at = $1, deleted_by = $2
WHERE notebook_id = $3 AND is_deleted = false",
	)
	.bind(at)
	.bind(actor)
	.bind(notebook_id)
	.execute(executor)
	.await?;

	Ok(result.rows_affected())
}
