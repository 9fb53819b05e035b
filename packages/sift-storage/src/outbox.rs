//! Event-side work ledger. Events are written in the same transaction as
//! the primary mutation they describe, drained in creation order by the
//! relay, and kept forever as an audit trail.

use sqlx::PgExecutor;
use time::OffsetDateTime;

use sift_domain::events::OutboxPayload;

use crate::{Result, db::Db, models::OutboxEvent};

pub async fn enqueue_event<'e, E>(
	executor: E,
	payload: &OutboxPayload,
	created_at: OffsetDateTime,
) -> Result<i64>
where
	E: PgExecutor<'e>,
{
	let encoded = serde_json::to_value(payload)?;
	let event_id: i64 = sqlx::query_scalar(
		"\
INSERT INTO outbox_events (event_type, payload, created_at)
VALUES ($1, $2, $3)
RETURNING event_id",
	)
	.bind(payload.event_type())
	.bind(encoded)
	.bind(created_at)
	.fetch_one(executor)
	.await?;

	Ok(event_id)
}

/// Eligible events in creation order. Dead-lettered and processed events
/// never reappear here.
pub async fn fetch_relay_batch(db: &Db, limit: i64) -> Result<Vec<OutboxEvent>> {
	let rows = sqlx::query_as::<_, OutboxEvent>(
		"\
SELECT
	event_id,
	event_type,
	payload,
	created_at,
	processed_at,
	failed,
	last_error,
	attempts
FROM outbox_events
WHERE processed_at IS NULL AND NOT failed
ORDER BY event_id
LIMIT $1",
	)
	.bind(limit)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}

pub async fn mark_event_processed(db: &Db, event_id: i64, now: OffsetDateTime) -> Result<()> {
	sqlx::query(
		"\
UPDATE outbox_events
SET processed_at = $1,
	attempts = attempts + 1
WHERE event_id = $2",
	)
	.bind(now)
	.bind(event_id)
	.execute(&db.pool)
	.await?;

	Ok(())
}

pub async fn record_event_failure(db: &Db, event_id: i64, error_text: &str) -> Result<()> {
	sqlx::query(
		"\
UPDATE outbox_events
SET last_error = $1,
	attempts = attempts + 1
WHERE event_id = $2",
	)
	.bind(error_text)
	.bind(event_id)
	.execute(&db.pool)
	.await?;

	Ok(())
}

pub async fn mark_event_dead_lettered(db: &Db, event_id: i64) -> Result<()> {
	sqlx::query(
		"UPDATE outbox_events SET failed = true, last_error = 'max attempts exceeded' WHERE event_id = $1",
	)
	.bind(event_id)
	.execute(&db.pool)
	.await?;

	Ok(())
}

pub async fn list_dead_letters(db: &Db, limit: i64) -> Result<Vec<OutboxEvent>> {
	let rows = sqlx::query_as::<_, OutboxEvent>(
		"\
SELECT
	event_id,
	event_type,
	payload,
	created_at,
	processed_at,
	failed,
	last_error,
	attempts
FROM outbox_events
WHERE failed
ORDER BY event_id
LIMIT $1",
	)
	.bind(limit)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}

/// Operator remediation: puts a dead-lettered event back in the relay queue
/// with a fresh attempt counter. Returns false when the event does not
/// exist or was already processed.
pub async fn requeue_event(db: &Db, event_id: i64) -> Result<bool> {
	let result = sqlx::query(
		"\
UPDATE outbox_events
SET failed = false,
	attempts = 0,
	last_error = NULL
WHERE event_id = $1 AND processed_at IS NULL",
	)
	.bind(event_id)
	.execute(&db.pool)
	.await?;

	Ok(result.rows_affected() > 0)
}
