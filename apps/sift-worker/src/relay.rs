//! Outbox relay.
//!
//! Drains committed events from the primary store to the graph store in
//! creation order, so dependent facts (an entity created, then merged) land
//! in the order they were recorded. Application is idempotent because a
//! crash between "applied" and "marked processed" re-delivers the event on
//! restart. Graph-store downtime just lets events accumulate; after
//! `max_attempts` failures an event is dead-lettered and left for an
//! operator. The graph is never written outside this relay.

use std::{sync::Arc, time::Duration};

use color_eyre::{Result, eyre};
use time::OffsetDateTime;
use tokio::sync::watch;

use sift_config::{RelayWorker, SharedConfig};
use sift_domain::events::OutboxPayload;
use sift_providers::graph::GraphStore;
use sift_storage::{db::Db, models::OutboxEvent, outbox};

const MAX_RELAY_ERROR_CHARS: usize = 1_024;

pub struct RelayState {
	pub db: Db,
	pub cfg: SharedConfig,
	pub graph: Arc<dyn GraphStore>,
}

pub async fn run_relay_worker(
	state: RelayState,
	mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
	tracing::info!("Outbox relay started.");

	loop {
		if *shutdown.borrow() {
			break;
		}

		let cfg = state.cfg.snapshot();
		let settings = &cfg.worker.relay;
		let mut idle = false;

		match relay_once(&state, settings).await {
			Ok(processed_any) => idle = !processed_any,
			Err(err) => {
				tracing::error!(error = %err, "Outbox relay cycle failed.");

				idle = true;
			},
		}

		if idle {
			let wait = Duration::from_millis(settings.poll_interval_ms);
			let changed = tokio::select! {
				_ = tokio::time::sleep(wait) => false,
				_ = shutdown.changed() => true,
			};

			if changed || *shutdown.borrow() {
				break;
			}
		}
	}

	tracing::info!("Outbox relay stopped.");

	Ok(())
}

/// One poll cycle over a bounded batch. Failures are isolated per event;
/// the rest of the batch proceeds.
async fn relay_once(state: &RelayState, settings: &RelayWorker) -> Result<bool> {
	let events = outbox::fetch_relay_batch(&state.db, i64::from(settings.batch_size)).await?;

	if events.is_empty() {
		return Ok(false);
	}

	for event in events {
		// Poison events are dead-lettered without another application
		// attempt.
		if event.attempts >= settings.max_attempts {
			outbox::mark_event_dead_lettered(&state.db, event.event_id).await?;
			tracing::warn!(
				event_id = event.event_id,
				attempts = event.attempts,
				"Outbox event dead-lettered."
			);

			continue;
		}

		match apply_event(&*state.graph, &event).await {
			Ok(()) => {
				outbox::mark_event_processed(&state.db, event.event_id, OffsetDateTime::now_utc())
					.await?;
			},
			Err(err) => {
				let error_text = sanitize_relay_error(&err.to_string());

				outbox::record_event_failure(&state.db, event.event_id, &error_text).await?;
				tracing::error!(error = %err, event_id = event.event_id, "Outbox event failed.");
			},
		}
	}

	Ok(true)
}

async fn apply_event(graph: &dyn GraphStore, event: &OutboxEvent) -> Result<()> {
	let payload: OutboxPayload = serde_json::from_value(event.payload.clone())
		.map_err(|err| eyre::eyre!("Undecodable outbox payload: {err}."))?;

	match payload {
		OutboxPayload::DocumentAdded(added) => graph.merge_document(&added).await,
		OutboxPayload::EntityMerged(merged) => graph.invalidate_entity_edges(&merged).await,
		OutboxPayload::EntityRemoved(removed) => graph.detach_entity(&removed).await,
	}
}

/// Error text lands in a durable, operator-visible column; secrets that
/// providers echo back in error bodies must not.
fn sanitize_relay_error(text: &str) -> String {
	let mut parts = Vec::new();
	let mut redact_next = false;

	for raw in text.split_whitespace() {
		let mut word = raw.to_string();

		if redact_next {
			word = "[REDACTED]".to_string();
			redact_next = false;
		}
		if raw.eq_ignore_ascii_case("bearer") {
			redact_next = true;
		}

		let lowered = raw.to_ascii_lowercase();

		for key in ["api_key", "apikey", "password", "secret", "token"] {
			if lowered.contains(key) && (lowered.contains('=') || lowered.contains(':')) {
				let sep = if raw.contains('=') { '=' } else { ':' };
				let prefix = match raw.split(sep).next() {
					Some(prefix) => prefix,
					None => raw,
				};

				word = format!("{prefix}{sep}[REDACTED]");

				break;
			}
		}

		parts.push(word);
	}

	let mut out = parts.join(" ");

	if out.chars().count() > MAX_RELAY_ERROR_CHARS {
		out = out.chars().take(MAX_RELAY_ERROR_CHARS).collect();
		out.push_str("...");
	}

	out
}
