//! Bounded, time-limited cache of finished rankings.
//!
//! The only in-process mutable state shared between query executions; it
//! carries its own lock and never touches the ledger. Entries expire by
//! TTL, and under capacity pressure the oldest-inserted entry goes first.
//! Stale hits during active ingestion are an accepted tradeoff of the
//! short lifetime.

use std::{
	collections::HashMap,
	sync::Mutex,
	time::{Duration, Instant},
};

use crate::search::SearchResponse;

pub struct ResultCache {
	inner: Mutex<CacheInner>,
}

struct CacheInner {
	entries: HashMap<String, CacheEntry>,
	// Monotone insertion counter; ages entries without clock ties.
	next_seq: u64,
}

struct CacheEntry {
	seq: u64,
	expires_at: Instant,
	response: SearchResponse,
}

impl ResultCache {
	pub fn new() -> Self {
		Self { inner: Mutex::new(CacheInner { entries: HashMap::new(), next_seq: 0 }) }
	}

	pub fn get(&self, key: &str) -> Option<SearchResponse> {
		let now = Instant::now();
		let mut inner = self.inner.lock().unwrap_or_else(|err| err.into_inner());

		match inner.entries.get(key) {
			Some(entry) if entry.expires_at > now => Some(entry.response.clone()),
			Some(_) => {
				inner.entries.remove(key);

				None
			},
			None => None,
		}
	}

	pub fn insert(&self, key: String, response: SearchResponse, ttl: Duration, max_entries: usize) {
		let now = Instant::now();
		let mut inner = self.inner.lock().unwrap_or_else(|err| err.into_inner());

		inner.entries.retain(|_, entry| entry.expires_at > now);

		while inner.entries.len() >= max_entries.max(1) {
			let Some(oldest) = inner
				.entries
				.iter()
				.min_by_key(|(_, entry)| entry.seq)
				.map(|(key, _)| key.clone())
			else {
				break;
			};

			inner.entries.remove(&oldest);
		}

		let seq = inner.next_seq;

		inner.next_seq += 1;
		inner.entries.insert(key, CacheEntry { seq, expires_at: now + ttl, response });
	}

	#[cfg(test)]
	fn len(&self) -> usize {
		self.inner.lock().unwrap_or_else(|err| err.into_inner()).entries.len()
	}
}

impl Default for ResultCache {
	fn default() -> Self {
		Self::new()
	}
}

/// Cache key: blake3 over the normalized query and the limit. The
/// normalization must match what the pipeline searches with, or a hit could
/// return a ranking computed for different text.
pub fn fingerprint(query: &str, limit: usize) -> String {
	let payload = serde_json::json!({
		"query": query,
		"limit": limit,
	});
	let raw = serde_json::to_vec(&payload).unwrap_or_default();

	blake3::hash(&raw).to_hex().to_string()
}
