//! Query-side reads: candidate lists for the retrieval engine and ledger
//! depth for observability. Both candidate lists are restricted to chunks
//! whose embedding is done, so in-flight embedding work never shows up in
//! results.

use uuid::Uuid;

use crate::{
	Result,
	db::Db,
	models::{ChunkDetail, LedgerDepth},
	vectors,
};

/// Full-text candidates ranked by `ts_rank`, best first.
pub async fn lexical_search(db: &Db, query: &str, limit: i64) -> Result<Vec<(Uuid, f32)>> {
	let rows = sqlx::query_as::<_, (Uuid, f32)>(
		"\
SELECT chunk_id, ts_rank(tsv, plainto_tsquery('english', $1)) AS score
FROM chunks
WHERE tsv @@ plainto_tsquery('english', $1)
	AND embedding_status = 'done'
ORDER BY score DESC, chunk_id
LIMIT $2",
	)
	.bind(query)
	.bind(limit)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}

/// Nearest-neighbor candidates by cosine similarity, best first.
pub async fn vector_search(db: &Db, embedding: &[f32], limit: i64) -> Result<Vec<(Uuid, f32)>> {
	let vec_text = vectors::format_vector_text(embedding);
	let rows = sqlx::query_as::<_, (Uuid, f32)>(
		"\
SELECT chunk_id, (1 - (embedding <=> $1::text::vector))::real AS score
FROM chunks
WHERE embedding IS NOT NULL
	AND embedding_status = 'done'
ORDER BY embedding <=> $1::text::vector, chunk_id
LIMIT $2",
	)
	.bind(vec_text.as_str())
	.bind(limit)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}

/// Chunk text plus document context for result assembly. Chunks of deleted
/// documents drop out here.
pub async fn fetch_chunk_details(db: &Db, chunk_ids: &[Uuid]) -> Result<Vec<ChunkDetail>> {
	if chunk_ids.is_empty() {
		return Ok(Vec::new());
	}

	let rows = sqlx::query_as::<_, ChunkDetail>(
		"\
SELECT
	c.chunk_id,
	c.doc_id,
	c.text,
	d.source_path,
	d.metadata->>'sender_email' AS sender_email
FROM chunks c
JOIN documents d ON d.doc_id = c.doc_id
WHERE c.chunk_id = ANY($1)
	AND d.deleted_at IS NULL",
	)
	.bind(chunk_ids)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}

pub async fn ledger_depth(db: &Db) -> Result<LedgerDepth> {
	let chunk_counts: (i64, i64, i64, i64) = sqlx::query_as(
		"\
SELECT
	count(*) FILTER (WHERE embedding_status = 'pending'),
	count(*) FILTER (WHERE embedding_status = 'in_flight'),
	count(*) FILTER (WHERE embedding_status = 'done'),
	count(*) FILTER (WHERE embedding_status = 'failed')
FROM chunks",
	)
	.fetch_one(&db.pool)
	.await?;
	let event_counts: (i64, i64) = sqlx::query_as(
		"\
SELECT
	count(*) FILTER (WHERE processed_at IS NULL AND NOT failed),
	count(*) FILTER (WHERE failed)
FROM outbox_events",
	)
	.fetch_one(&db.pool)
	.await?;

	Ok(LedgerDepth {
		chunks_pending: chunk_counts.0,
		chunks_in_flight: chunk_counts.1,
		chunks_done: chunk_counts.2,
		chunks_failed: chunk_counts.3,
		events_unprocessed: event_counts.0,
		events_dead_lettered: event_counts.1,
	})
}
