//! Operator-facing inspection and remediation. Terminal failures stay
//! terminal until someone calls one of the requeue operations; nothing here
//! runs automatically.

use sift_storage::{
	ledger,
	models::{ChunkRow, LedgerDepth, OutboxEvent},
	outbox, queries,
};

use crate::{Result, SiftService};

impl SiftService {
	/// Work-ledger depth: how much embedding and relay work is outstanding,
	/// and how much has terminally failed.
	pub async fn ledger_backlog(&self) -> Result<LedgerDepth> {
		Ok(queries::ledger_depth(&self.db).await?)
	}

	pub async fn list_failed_chunks(&self, limit: i64) -> Result<Vec<ChunkRow>> {
		Ok(ledger::list_failed_chunks(&self.db, limit).await?)
	}

	pub async fn list_dead_letters(&self, limit: i64) -> Result<Vec<OutboxEvent>> {
		Ok(outbox::list_dead_letters(&self.db, limit).await?)
	}

	pub async fn requeue_failed_chunks(&self) -> Result<u64> {
		let count = ledger::requeue_failed_chunks(&self.db).await?;

		if count > 0 {
			tracing::info!(count, "Requeued failed chunks for embedding.");
		}

		Ok(count)
	}

	/// Requeues chunks stuck in `in_flight` after a worker crash. Only call
	/// while the embedding workers are stopped.
	pub async fn requeue_in_flight_chunks(&self) -> Result<u64> {
		let count = ledger::requeue_in_flight_chunks(&self.db).await?;

		if count > 0 {
			tracing::info!(count, "Requeued in-flight chunks for embedding.");
		}

		Ok(count)
	}

	pub async fn requeue_event(&self, event_id: i64) -> Result<bool> {
		let requeued = outbox::requeue_event(&self.db, event_id).await?;

		if requeued {
			tracing::info!(event_id, "Requeued dead-lettered outbox event.");
		}

		Ok(requeued)
	}
}
