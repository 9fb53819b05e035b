use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	pub search: Search,
	#[serde(default)]
	pub worker: Worker,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub graph: Graph,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

/// Secondary graph store. Writes are idempotent merges keyed by stable
/// identifiers; the store is never read back by the core.
#[derive(Clone, Debug, Deserialize)]
pub struct Graph {
	pub api_base: String,
	pub api_key: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	/// Absent means reranking is permanently unavailable; search degrades.
	pub rerank: Option<RerankProviderConfig>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RerankProviderConfig {
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
	#[serde(default = "default_min_candidates")]
	pub min_candidates: u32,
}

#[derive(Debug, Deserialize)]
pub struct Search {
	#[serde(default = "default_candidate_k")]
	pub candidate_k: u32,
	#[serde(default = "default_rrf_k")]
	pub rrf_k: u32,
	#[serde(default = "default_half")]
	pub lexical_weight: f32,
	#[serde(default = "default_half")]
	pub vector_weight: f32,
	#[serde(default = "default_max_query_chars")]
	pub max_query_chars: u32,
	#[serde(default)]
	pub cache: SearchCache,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SearchCache {
	pub enabled: bool,
	pub ttl_seconds: u64,
	pub max_entries: usize,
}
impl Default for SearchCache {
	fn default() -> Self {
		Self { enabled: true, ttl_seconds: 60, max_entries: 512 }
	}
}

#[derive(Debug, Default, Deserialize)]
pub struct Worker {
	#[serde(default)]
	pub embedding: EmbeddingWorker,
	#[serde(default)]
	pub relay: RelayWorker,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EmbeddingWorker {
	pub poll_interval_ms: u64,
	pub batch_size: u32,
	/// Cumulative token-estimate ceiling per embedding call.
	pub token_budget: u32,
	pub retry_max: i32,
	pub breaker_threshold: u32,
	pub breaker_cooldown_ms: u64,
}
impl Default for EmbeddingWorker {
	fn default() -> Self {
		Self {
			poll_interval_ms: 1_000,
			batch_size: 200,
			token_budget: 8_192,
			retry_max: 5,
			breaker_threshold: 10,
			breaker_cooldown_ms: 60_000,
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RelayWorker {
	pub poll_interval_ms: u64,
	pub batch_size: u32,
	pub max_attempts: i32,
}
impl Default for RelayWorker {
	fn default() -> Self {
		Self { poll_interval_ms: 2_000, batch_size: 50, max_attempts: 10 }
	}
}

fn default_candidate_k() -> u32 {
	50
}

fn default_rrf_k() -> u32 {
	60
}

fn default_half() -> f32 {
	0.5
}

fn default_max_query_chars() -> u32 {
	2_000
}

fn default_min_candidates() -> u32 {
	5
}
