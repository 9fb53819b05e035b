//! Transactional ingestion write path. The document row, its pending
//! chunks, and the `document_added` outbox event commit or roll back as
//! one unit, which is what keeps the graph projection convergent without a
//! cross-store transaction.
//!
//! Parsing source files into `NewDocument`/`NewChunk` happens upstream.

use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use sift_domain::{
	events::{DocumentAdded, OutboxPayload, PersonSnapshot, RecipientSnapshot},
	tokens,
};

use crate::{Result, db::Db, outbox};

#[derive(Clone, Debug)]
pub struct NewDocument {
	pub doc_id: Uuid,
	pub source_path: String,
	pub source_type: String,
	pub sha256: String,
	pub metadata: Value,
	pub sender: PersonSnapshot,
	pub recipients: Vec<RecipientSnapshot>,
}

#[derive(Clone, Debug)]
pub struct NewChunk {
	pub chunk_index: i32,
	pub text: String,
	pub token_count: Option<i32>,
}

pub async fn sha256_exists(db: &Db, sha256: &str) -> Result<bool> {
	let row: Option<i32> = sqlx::query_scalar("SELECT 1 FROM documents WHERE sha256 = $1")
		.bind(sha256)
		.fetch_optional(&db.pool)
		.await?;

	Ok(row.is_some())
}

pub async fn ingest_document(
	db: &Db,
	doc: &NewDocument,
	chunks: &[NewChunk],
	now: OffsetDateTime,
) -> Result<Uuid> {
	let mut metadata = doc.metadata.clone();

	if let Value::Object(map) = &mut metadata {
		map.insert("sender_email".to_string(), Value::String(doc.sender.email.clone()));
	}

	let mut tx = db.pool.begin().await?;

	sqlx::query(
		"\
INSERT INTO documents (doc_id, source_path, source_type, sha256, metadata, ingested_at)
VALUES ($1, $2, $3, $4, $5, $6)",
	)
	.bind(doc.doc_id)
	.bind(doc.source_path.as_str())
	.bind(doc.source_type.as_str())
	.bind(doc.sha256.as_str())
	.bind(&metadata)
	.bind(now)
	.execute(&mut *tx)
	.await?;

	for chunk in chunks {
		let token_count =
			chunk.token_count.unwrap_or_else(|| tokens::estimate_tokens(&chunk.text) as i32);

		sqlx::query(
			"\
INSERT INTO chunks (chunk_id, doc_id, chunk_index, text, embedding_status, token_count)
VALUES ($1, $2, $3, $4, 'pending', $5)",
		)
		.bind(chunk_id_for(doc.doc_id, chunk.chunk_index))
		.bind(doc.doc_id)
		.bind(chunk.chunk_index)
		.bind(chunk.text.as_str())
		.bind(token_count)
		.execute(&mut *tx)
		.await?;
	}

	let payload = OutboxPayload::DocumentAdded(DocumentAdded {
		doc_id: doc.doc_id,
		source_path: doc.source_path.clone(),
		source_type: doc.source_type.clone(),
		ingested_at: now,
		sender: doc.sender.clone(),
		recipients: doc.recipients.clone(),
	});

	outbox::enqueue_event(&mut *tx, &payload, now).await?;

	tx.commit().await?;

	Ok(doc.doc_id)
}

pub fn chunk_id_for(doc_id: Uuid, chunk_index: i32) -> Uuid {
	let name = format!("{doc_id}:{chunk_index}");

	Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
}
