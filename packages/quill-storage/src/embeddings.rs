use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use quill_config::VectorMetric;

use crate::{
	Result, metric,
	models::{EmbeddingRecord, Neighbor, NewEmbedding},
	vector,
};

#[derive(Debug, sqlx::FromRow)]
struct EmbeddingRow {
	embedding_id: Uuid,
	note_id: Uuid,
	source_text: String,
	vec_text: String,
	seq: i64,
	created_at: OffsetDateTime,
	created_by: String,
	deleted_at: Option<OffsetDateTime>,
	deleted_by: Option<String>,
	is_deleted: bool,
}
impl TryFrom<EmbeddingRow> for EmbeddingRecord {
	type Error = crate::Error;

	fn try_from(row: EmbeddingRow) -> Result<Self> {
		Ok(Self {
			embedding_id: row.embedding_id,
			note_id: row.note_id,
			source_text: row.source_text,
			vector: vector::parse_vector_text(&row.vec_text)?,
			seq: row.seq,
			created_at: row.created_at,
			created_by: row.created_by,
			deleted_at: row.deleted_at,
			deleted_by: row.deleted_by,
			is_deleted: row.is_deleted,
		})
	}
}

pub async fn insert_embedding<'e, E>(executor: E, record: &NewEmbedding) -> Result<i64>
where
	E: PgExecutor<'e>,
{
	let vec_text = vector::format_vector_text(&record.vector);
	let seq: i64 = sqlx::query_scalar(
		"\
INSERT INTO note_embeddings (
	embedding_id,
	note_id,
	source_text,
	embedding_dim,
	vec,
	created_at,
	created_by
)
VALUES ($1,$2,$3,$4,$5::text::vector,$6,$7)
RETURNING seq",
	)
	.bind(record.embedding_id)
	.bind(record.note_id)
	.bind(record.source_text.as_str())
	.bind(record.vector.len() as i32)
	.bind(vec_text)
	.bind(record.created_at)
	.bind(record.created_by.as_str())
	.fetch_one(executor)
	.await?;

	Ok(seq)
}

pub async fn invalidate_note_embeddings<'e, E>(
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
UPDATE note_embeddings
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

/// Closest live record per note, nearest first, earlier `seq` winning ties.
pub async fn find_nearest<'e, E>(
	executor: E,
	metric: VectorMetric,
	query: &[f32],
	k: u32,
) -> Result<Vec<Neighbor>>
where
	E: PgExecutor<'e>,
{
	let op = metric::pg_operator(metric);
	let sql = format!(
		"\
SELECT note_id, distance
FROM (
	SELECT DISTINCT ON (e.note_id)
		e.note_id,
		(e.vec {op} $1::text::vector)::real AS distance,
		e.seq
	FROM note_embeddings e
	JOIN notes n ON n.note_id = e.note_id
	WHERE e.is_deleted = false AND n.is_deleted = false
	ORDER BY e.note_id, distance ASC, e.seq ASC
) best
ORDER BY distance ASC, seq ASC
LIMIT $2"
	);
	let rows: Vec<(Uuid, f32)> = sqlx::query_as(&sql)
		.bind(vector::format_vector_text(query))
		.bind(i64::from(k))
		.fetch_all(executor)
		.await?;

	Ok(rows.into_iter().map(|(note_id, distance)| Neighbor { note_id, distance }).collect())
}

pub async fn fetch_live_embeddings<'e, E>(executor: E, note_id: Uuid) -> Result<Vec<EmbeddingRecord>>
where
	E: PgExecutor<'e>,
{
	let rows = sqlx::query_as::<_, EmbeddingRow>(
		"\
SELECT
\tembedding_id,
\tnote_id,
\tsource_text,
\tvec::text AS vec_text,
\tseq,
\tcreated_at,
\tcreated_by,
\tdeleted_at,
\tdeleted_by,
\tis_deleted
FROM note_embeddings
WHERE note_id = $1 AND is_deleted = false
ORDER BY seq ASC",
	)
	.bind(note_id)
	.fetch_all(executor)
	.await?;

	rows.into_iter().map(EmbeddingRecord::try_from).collect()
}

pub async fn invalidate_notebook_embeddings<'e, E>(
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
UPDATE note_embeddings e
SET is_deleted = true, deleted_at = $1, deleted_by = $2
FROM notes n
WHERE n.note_id = e.note_id AND n.notebook_id = $3 AND e.is_deleted = false",
	)
	.bind(at)
	.bind(actor)
	.bind(notebook_id)
	.execute(executor)
	.await?;

	Ok(result.rows_affected())
}
