//! Chunk-side work ledger: the claim primitive and embedding state
//! transitions. Retry policy (when to revert vs. fail) lives with the
//! embedding worker; this module only offers the individual transitions.

use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Result, db::Db, models::{ChunkRow, ClaimedChunk}, vectors};

/// Atomically claims up to `limit` pending chunks, transitioning them to
/// `in_flight` and returning their pre-transition contents.
///
/// The inner select skips rows locked by a concurrent claimant instead of
/// waiting on them, so two claimants never block each other and never
/// receive the same row. An empty result means there is nothing to do.
pub async fn claim_pending_chunks(db: &Db, limit: i64) -> Result<Vec<ClaimedChunk>> {
	let rows = sqlx::query_as::<_, ClaimedChunk>(
		"\
UPDATE chunks
SET embedding_status = 'in_flight'
WHERE chunk_id IN (
	SELECT chunk_id
	FROM chunks
	WHERE embedding_status = 'pending'
	ORDER BY chunk_id
	LIMIT $1
	FOR UPDATE SKIP LOCKED
)
RETURNING chunk_id, text, retry_count, token_count",
	)
	.bind(limit)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}

pub async fn mark_chunk_embedded(
	db: &Db,
	chunk_id: Uuid,
	vector: &[f32],
	now: OffsetDateTime,
) -> Result<()> {
	let vec_text = vectors::format_vector_text(vector);

	sqlx::query(
		"\
UPDATE chunks
SET embedding = $1::text::vector,
	embedding_status = 'done',
	retry_count = 0,
	last_error = NULL,
	embedded_at = $2
WHERE chunk_id = $3",
	)
	.bind(vec_text.as_str())
	.bind(now)
	.bind(chunk_id)
	.execute(&db.pool)
	.await?;

	Ok(())
}

/// Transient failure: back to `pending` with the bumped retry counter, so a
/// later poll picks the chunk up again.
pub async fn revert_chunk_to_pending(
	db: &Db,
	chunk_id: Uuid,
	retry_count: i32,
	error_text: &str,
) -> Result<()> {
	sqlx::query(
		"\
UPDATE chunks
SET embedding_status = 'pending',
	retry_count = $1,
	last_error = $2
WHERE chunk_id = $3",
	)
	.bind(retry_count)
	.bind(error_text)
	.bind(chunk_id)
	.execute(&db.pool)
	.await?;

	Ok(())
}

/// Terminal failure. Never picked up again until an operator requeues it.
pub async fn mark_chunk_failed(
	db: &Db,
	chunk_id: Uuid,
	retry_count: i32,
	error_text: &str,
) -> Result<()> {
	sqlx::query(
		"\
UPDATE chunks
SET embedding_status = 'failed',
	retry_count = $1,
	last_error = $2
WHERE chunk_id = $3",
	)
	.bind(retry_count)
	.bind(error_text)
	.bind(chunk_id)
	.execute(&db.pool)
	.await?;

	Ok(())
}

pub async fn list_failed_chunks(db: &Db, limit: i64) -> Result<Vec<ChunkRow>> {
	let rows = sqlx::query_as::<_, ChunkRow>(
		"\
SELECT
	chunk_id,
	doc_id,
	chunk_index,
	text,
	embedding_status,
	retry_count,
	token_count,
	last_error,
	embedded_at,
	created_at
FROM chunks
WHERE embedding_status = 'failed'
ORDER BY chunk_id
LIMIT $1",
	)
	.bind(limit)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}

/// Operator remediation: puts every failed chunk back on the ladder with a
/// fresh counter.
pub async fn requeue_failed_chunks(db: &Db) -> Result<u64> {
	let result = sqlx::query(
		"\
UPDATE chunks
SET embedding_status = 'pending',
	retry_count = 0,
	last_error = NULL
WHERE embedding_status = 'failed'",
	)
	.execute(&db.pool)
	.await?;

	Ok(result.rows_affected())
}

/// Operator remediation for chunks orphaned in `in_flight` by a crashed
/// worker. Only safe while no embedding worker is running, since a live
/// claimant's rows are indistinguishable from orphaned ones.
pub async fn requeue_in_flight_chunks(db: &Db) -> Result<u64> {
	let result =
		sqlx::query("UPDATE chunks SET embedding_status = 'pending' WHERE embedding_status = 'in_flight'")
			.execute(&db.pool)
			.await?;

	Ok(result.rows_affected())
}
