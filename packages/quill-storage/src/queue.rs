use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Result, db::Db, models::QueueMessage};

const LEASE_EXHAUSTED: &str = "Lease expired on the final delivery attempt.";

pub async fn enqueue_message<'e, E>(
	executor: E,
	topic: &str,
	payload: &[u8],
	now: OffsetDateTime,
) -> Result<Uuid>
where
	E: PgExecutor<'e>,
{
	let message_id = Uuid::new_v4();

	sqlx::query(
		"\
INSERT INTO indexing_queue (message_id, topic, payload, status, attempts, available_at, created_at, updated_at)
VALUES ($1,$2,$3,'PENDING',0,$4,$4,$4)",
	)
	.bind(message_id)
	.bind(topic)
	.bind(payload)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(message_id)
}

/// Claims the oldest available message on `topic` and leases it for `lease_seconds`.
///
/// A `CLAIMED` row whose lease has run out is claimable again, which is how a consumer that
/// died mid-task gets its message redelivered. Expired claims that already used
/// `max_attempts` deliveries are moved to `DEAD` instead.
pub async fn claim_next_message(
	db: &Db,
	topic: &str,
	now: OffsetDateTime,
	lease_seconds: i64,
	max_attempts: u32,
) -> Result<Option<QueueMessage>> {
	let mut tx = db.pool.begin().await?;
	let max_attempts = i32::try_from(max_attempts).unwrap_or(i32::MAX);
	let abandoned: Vec<(Uuid, i32)> = sqlx::query_as(
		"\
UPDATE indexing_queue
SET status = 'DEAD', last_error = $4, updated_at = $2
WHERE topic = $1 AND status = 'CLAIMED' AND available_at <= $2 AND attempts >= $3
RETURNING message_id, attempts",
	)
	.bind(topic)
	.bind(now)
	.bind(max_attempts)
	.bind(LEASE_EXHAUSTED)
	.fetch_all(&mut *tx)
	.await?;

	for (message_id, attempts) in &abandoned {
		tracing::warn!(
			message_id = %message_id,
			attempts,
			reason = LEASE_EXHAUSTED,
			"Message moved to dead-letter."
		);
	}

	let row = sqlx::query_as::<_, QueueMessage>(
		"\
SELECT
\tmessage_id,
\ttopic,
\tpayload,
\tstatus,
\tattempts,
\tlast_error,
\tavailable_at,
\tcreated_at,
\tupdated_at
FROM indexing_queue
WHERE topic = $1 AND status IN ('PENDING','FAILED','CLAIMED') AND available_at <= $2
ORDER BY available_at ASC, created_at ASC
LIMIT 1
FOR UPDATE SKIP LOCKED",
	)
	.bind(topic)
	.bind(now)
	.fetch_optional(&mut *tx)
	.await?;
	let message = if let Some(mut message) = row {
		let lease_until = now + time::Duration::seconds(lease_seconds);

		sqlx::query(
			"\
UPDATE indexing_queue
SET status = 'CLAIMED', attempts = attempts + 1, available_at = $1, updated_at = $2
WHERE message_id = $3",
		)
		.bind(lease_until)
		.bind(now)
		.bind(message.message_id)
		.execute(&mut *tx)
		.await?;

		message.status = "CLAIMED".to_string();
		message.attempts += 1;
		message.available_at = lease_until;
		message.updated_at = now;

		Some(message)
	} else {
		None
	};

	tx.commit().await?;

	Ok(message)
}

/// Settle writes only apply to the claim identified by `attempts`. They return `false` when
/// that claim has since been superseded by a newer one or settled already.
pub async fn mark_message_done(
	db: &Db,
	message_id: Uuid,
	attempts: i32,
	now: OffsetDateTime,
) -> Result<bool> {
	let res = sqlx::query(
		"\
UPDATE indexing_queue
SET status = 'DONE', updated_at = $1
WHERE message_id = $2 AND status = 'CLAIMED' AND attempts = $3",
	)
	.bind(now)
	.bind(message_id)
	.bind(attempts)
	.execute(&db.pool)
	.await?;

	Ok(res.rows_affected() == 1)
}

pub async fn mark_message_failed(
	db: &Db,
	message_id: Uuid,
	attempts: i32,
	error_text: &str,
	available_at: OffsetDateTime,
	now: OffsetDateTime,
) -> Result<bool> {
	let res = sqlx::query(
		"\
UPDATE indexing_queue
SET status = 'FAILED',
\tlast_error = $1,
\tavailable_at = $2,
\tupdated_at = $3
WHERE message_id = $4 AND status = 'CLAIMED' AND attempts = $5",
	)
	.bind(error_text)
	.bind(available_at)
	.bind(now)
	.bind(message_id)
	.bind(attempts)
	.execute(&db.pool)
	.await?;

	Ok(res.rows_affected() == 1)
}

pub async fn mark_message_dead(
	db: &Db,
	message_id: Uuid,
	attempts: i32,
	error_text: &str,
	now: OffsetDateTime,
) -> Result<bool> {
	let res = sqlx::query(
		"\
UPDATE indexing_queue
SET status = 'DEAD', last_error = $1, updated_at = $2
WHERE message_id = $3 AND status = 'CLAIMED' AND attempts = $4",
	)
	.bind(error_text)
	.bind(now)
	.bind(message_id)
	.bind(attempts)
	.execute(&db.pool)
	.await?;

	Ok(res.rows_affected() == 1)
}

pub async fn get_message(db: &Db, message_id: Uuid) -> Result<Option<QueueMessage>> {
	let row = sqlx::query_as::<_, QueueMessage>(
		"\
SELECT message_id, topic, payload, status, attempts, last_error, available_at, created_at, updated_at
FROM indexing_queue
WHERE message_id = $1",
	)
	.bind(message_id)
	.fetch_optional(&db.pool)
	.await?;

	Ok(row)
}
