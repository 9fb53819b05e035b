//! Embedding pipeline.
//!
//! Claims pending chunks through the skip-locked claim primitive, batches
//! them under the per-call token budget, and walks each chunk along the
//! retry ladder: transient failures revert to `pending` with a bumped
//! counter until `retry_max`, structurally oversized input is split rather
//! than retried, and a single chunk too large for any call fails terminally.
//! A circuit breaker suspends polling after too many consecutive call
//! failures so an unavailable embedding service is not hammered.

use std::{sync::Arc, time::Duration};

use color_eyre::Result;
use time::OffsetDateTime;
use tokio::sync::watch;

use sift_config::{EmbeddingWorker, SharedConfig};
use sift_domain::tokens;
use sift_providers::embedding::{EmbedError, Embedder};
use sift_storage::{db::Db, ledger, models::ClaimedChunk};

pub struct EmbedState {
	pub db: Db,
	pub cfg: SharedConfig,
	pub embedder: Arc<dyn Embedder>,
}

#[derive(Debug, Default)]
struct CycleReport {
	claimed: usize,
	succeeded_batches: u32,
	failed_batches: u32,
}

pub async fn run_embedding_worker(
	state: EmbedState,
	mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
	let mut consecutive_failures = 0_u32;

	tracing::info!("Embedding worker started.");

	loop {
		if *shutdown.borrow() {
			break;
		}

		let cfg = state.cfg.snapshot();
		let settings = &cfg.worker.embedding;
		let mut idle = false;

		match run_cycle(&state, settings).await {
			Ok(report) => {
				if report.failed_batches == 0 {
					consecutive_failures = 0;
				} else {
					consecutive_failures += report.failed_batches;
				}
				if report.claimed == 0 {
					idle = true;
				} else {
					tracing::info!(
						claimed = report.claimed,
						succeeded_batches = report.succeeded_batches,
						failed_batches = report.failed_batches,
						"Embedding cycle finished."
					);
				}
			},
			Err(err) => {
				tracing::error!(error = %err, "Embedding cycle failed.");

				consecutive_failures += 1;
				idle = true;
			},
		}

		if consecutive_failures >= settings.breaker_threshold {
			tracing::error!(
				consecutive_failures,
				cooldown_ms = settings.breaker_cooldown_ms,
				"Embedding circuit breaker open. Suspending polling."
			);

			consecutive_failures = 0;

			if sleep_or_shutdown(&mut shutdown, Duration::from_millis(settings.breaker_cooldown_ms))
				.await
			{
				break;
			}

			continue;
		}

		if idle
			&& sleep_or_shutdown(&mut shutdown, Duration::from_millis(settings.poll_interval_ms))
				.await
		{
			break;
		}
	}

	tracing::info!("Embedding worker stopped.");

	Ok(())
}

/// One claim-and-process cycle. Claimed chunks always reach a post-cycle
/// state: `done`, `pending` (with a bumped counter), or `failed`.
async fn run_cycle(state: &EmbedState, settings: &EmbeddingWorker) -> Result<CycleReport> {
	let claimed = ledger::claim_pending_chunks(&state.db, i64::from(settings.batch_size)).await?;
	let mut report = CycleReport { claimed: claimed.len(), ..CycleReport::default() };

	if claimed.is_empty() {
		return Ok(report);
	}

	// Work stack instead of recursion: oversized batches push their halves
	// back and get retried in smaller pieces.
	let mut stack = plan_batches(claimed, settings.token_budget);

	stack.reverse();

	while let Some(batch) = stack.pop() {
		let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();

		match state.embedder.embed(&texts).await {
			Ok(vectors) if vectors.len() == batch.len() => {
				let now = OffsetDateTime::now_utc();

				for (chunk, vector) in batch.iter().zip(vectors.iter()) {
					ledger::mark_chunk_embedded(&state.db, chunk.chunk_id, vector, now).await?;
				}

				report.succeeded_batches += 1;
			},
			Ok(vectors) => {
				let message = format!(
					"Embedding service returned {} vectors for {} chunks.",
					vectors.len(),
					batch.len()
				);

				tracing::error!(batch_size = batch.len(), "{message}");
				revert_batch(state, settings, &batch, &message).await?;

				report.failed_batches += 1;
			},
			Err(EmbedError::InputTooLarge { message }) if batch.len() > 1 => {
				tracing::warn!(
					batch_size = batch.len(),
					message = %message,
					"Embedding input too large. Splitting batch."
				);

				let mid = batch.len() / 2;
				let (left, right) = batch.split_at(mid);

				stack.push(right.to_vec());
				stack.push(left.to_vec());
			},
			Err(EmbedError::InputTooLarge { message }) => {
				// A lone chunk the service cannot take will never fit, no
				// matter how often it is retried. Exhaust its ladder outright.
				let chunk = &batch[0];

				tracing::error!(chunk_id = %chunk.chunk_id, message = %message, "Chunk exceeds embedding capacity.");
				ledger::mark_chunk_failed(&state.db, chunk.chunk_id, settings.retry_max, &message)
					.await?;
			},
			Err(EmbedError::Transient { message }) => {
				tracing::error!(batch_size = batch.len(), message = %message, "Embedding batch failed.");
				revert_batch(state, settings, &batch, &message).await?;

				report.failed_batches += 1;
			},
		}
	}

	Ok(report)
}

async fn revert_batch(
	state: &EmbedState,
	settings: &EmbeddingWorker,
	batch: &[ClaimedChunk],
	error_text: &str,
) -> Result<()> {
	for chunk in batch {
		let next_count = chunk.retry_count.saturating_add(1);

		if next_count >= settings.retry_max {
			tracing::warn!(chunk_id = %chunk.chunk_id, retry_count = next_count, "Chunk embedding failed terminally.");
			ledger::mark_chunk_failed(&state.db, chunk.chunk_id, next_count, error_text).await?;
		} else {
			ledger::revert_chunk_to_pending(&state.db, chunk.chunk_id, next_count, error_text)
				.await?;
		}
	}

	Ok(())
}

/// Greedy partition keeping each call under the token budget. Chunk length
/// varies, so batch sizes do too. A single chunk over the budget still goes
/// out alone; the service's own oversized-input answer decides its fate.
fn plan_batches(chunks: Vec<ClaimedChunk>, token_budget: u32) -> Vec<Vec<ClaimedChunk>> {
	let mut batches = Vec::new();
	let mut current = Vec::new();
	let mut current_tokens = 0_u32;

	for chunk in chunks {
		let chunk_tokens = chunk_token_estimate(&chunk);

		if !current.is_empty() && current_tokens.saturating_add(chunk_tokens) > token_budget {
			batches.push(std::mem::take(&mut current));

			current_tokens = 0;
		}

		current_tokens = current_tokens.saturating_add(chunk_tokens);
		current.push(chunk);
	}

	if !current.is_empty() {
		batches.push(current);
	}

	batches
}

fn chunk_token_estimate(chunk: &ClaimedChunk) -> u32 {
	match chunk.token_count {
		Some(count) if count > 0 => count as u32,
		_ => tokens::estimate_tokens(&chunk.text),
	}
}

/// Returns true when shutdown was requested during the wait.
async fn sleep_or_shutdown(shutdown: &mut watch::Receiver<bool>, wait: Duration) -> bool {
	let changed = tokio::select! {
		_ = tokio::time::sleep(wait) => false,
		_ = shutdown.changed() => true,
	};

	changed || *shutdown.borrow()
}
