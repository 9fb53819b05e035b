use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
pub struct Document {
	pub doc_id: Uuid,
	pub source_path: String,
	pub source_type: String,
	pub sha256: String,
	pub metadata: Value,
	pub ingested_at: OffsetDateTime,
	pub deleted_at: Option<OffsetDateTime>,
}

/// A work-ledger chunk row without its vector. Vectors only travel from the
/// embedding provider into the store, never back out through this type.
#[derive(Debug, sqlx::FromRow)]
pub struct ChunkRow {
	pub chunk_id: Uuid,
	pub doc_id: Uuid,
	pub chunk_index: i32,
	pub text: String,
	pub embedding_status: String,
	pub retry_count: i32,
	pub token_count: Option<i32>,
	pub last_error: Option<String>,
	pub embedded_at: Option<OffsetDateTime>,
	pub created_at: OffsetDateTime,
}

/// Pre-transition contents returned by the claim primitive.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct ClaimedChunk {
	pub chunk_id: Uuid,
	pub text: String,
	pub retry_count: i32,
	pub token_count: Option<i32>,
}

#[derive(Debug, sqlx::FromRow)]
pub struct OutboxEvent {
	pub event_id: i64,
	pub event_type: String,
	pub payload: Value,
	pub created_at: OffsetDateTime,
	pub processed_at: Option<OffsetDateTime>,
	pub failed: bool,
	pub last_error: Option<String>,
	pub attempts: i32,
}

#[derive(Debug, sqlx::FromRow)]
pub struct ChunkDetail {
	pub chunk_id: Uuid,
	pub doc_id: Uuid,
	pub text: String,
	pub source_path: String,
	pub sender_email: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct LedgerDepth {
	pub chunks_pending: i64,
	pub chunks_in_flight: i64,
	pub chunks_done: i64,
	pub chunks_failed: i64,
	pub events_unprocessed: i64,
	pub events_dead_lettered: i64,
}
