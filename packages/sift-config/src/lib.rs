mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, EmbeddingProviderConfig, EmbeddingWorker, Graph, Postgres, Providers, RelayWorker,
	RerankProviderConfig, Search, SearchCache, Service, Storage, Worker,
};

use std::{
	fs,
	path::Path,
	sync::{Arc, RwLock},
};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.log_level.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.log_level must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.dsn.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.postgres.dsn must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.storage.graph.api_base.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.graph.api_base must be non-empty.".to_string(),
		});
	}
	if cfg.storage.graph.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "storage.graph.timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.api_key.trim().is_empty() {
		return Err(Error::Validation {
			message: "providers.embedding.api_key must be non-empty.".to_string(),
		});
	}
	if cfg.providers.embedding.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.timeout_ms must be greater than zero.".to_string(),
		});
	}

	if let Some(rerank) = cfg.providers.rerank.as_ref() {
		if rerank.api_key.trim().is_empty() {
			return Err(Error::Validation {
				message: "providers.rerank.api_key must be non-empty.".to_string(),
			});
		}
		if rerank.timeout_ms == 0 {
			return Err(Error::Validation {
				message: "providers.rerank.timeout_ms must be greater than zero.".to_string(),
			});
		}
		if rerank.min_candidates == 0 {
			return Err(Error::Validation {
				message: "providers.rerank.min_candidates must be greater than zero.".to_string(),
			});
		}
	}

	if cfg.search.candidate_k == 0 {
		return Err(Error::Validation {
			message: "search.candidate_k must be greater than zero.".to_string(),
		});
	}
	if cfg.search.rrf_k == 0 {
		return Err(Error::Validation {
			message: "search.rrf_k must be greater than zero.".to_string(),
		});
	}

	for (label, weight) in
		[("lexical_weight", cfg.search.lexical_weight), ("vector_weight", cfg.search.vector_weight)]
	{
		if !weight.is_finite() {
			return Err(Error::Validation {
				message: format!("search.{label} must be a finite number."),
			});
		}
		if !(0.0..=1.0).contains(&weight) {
			return Err(Error::Validation {
				message: format!("search.{label} must be in the range 0.0-1.0."),
			});
		}
	}

	if cfg.search.lexical_weight + cfg.search.vector_weight <= 0.0 {
		return Err(Error::Validation {
			message: "At least one search fusion weight must be greater than zero.".to_string(),
		});
	}
	if cfg.search.max_query_chars == 0 {
		return Err(Error::Validation {
			message: "search.max_query_chars must be greater than zero.".to_string(),
		});
	}
	if cfg.search.cache.enabled {
		if cfg.search.cache.ttl_seconds == 0 {
			return Err(Error::Validation {
				message: "search.cache.ttl_seconds must be greater than zero.".to_string(),
			});
		}
		if cfg.search.cache.max_entries == 0 {
			return Err(Error::Validation {
				message: "search.cache.max_entries must be greater than zero.".to_string(),
			});
		}
	}

	if cfg.worker.embedding.batch_size == 0 {
		return Err(Error::Validation {
			message: "worker.embedding.batch_size must be greater than zero.".to_string(),
		});
	}
	if cfg.worker.embedding.token_budget == 0 {
		return Err(Error::Validation {
			message: "worker.embedding.token_budget must be greater than zero.".to_string(),
		});
	}
	if cfg.worker.embedding.retry_max <= 0 {
		return Err(Error::Validation {
			message: "worker.embedding.retry_max must be greater than zero.".to_string(),
		});
	}
	if cfg.worker.embedding.breaker_threshold == 0 {
		return Err(Error::Validation {
			message: "worker.embedding.breaker_threshold must be greater than zero.".to_string(),
		});
	}
	if cfg.worker.relay.batch_size == 0 {
		return Err(Error::Validation {
			message: "worker.relay.batch_size must be greater than zero.".to_string(),
		});
	}
	if cfg.worker.relay.max_attempts <= 0 {
		return Err(Error::Validation {
			message: "worker.relay.max_attempts must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if let Some(rerank) = cfg.providers.rerank.as_ref()
		&& rerank.api_base.trim().is_empty()
	{
		cfg.providers.rerank = None;
	}
}

/// Shared, swappable configuration. Worker loops snapshot it once per poll
/// cycle, so a `replace` takes effect on the next cycle without disturbing
/// in-flight work.
#[derive(Clone)]
pub struct SharedConfig {
	inner: Arc<RwLock<Arc<Config>>>,
}
impl SharedConfig {
	pub fn new(cfg: Config) -> Self {
		Self { inner: Arc::new(RwLock::new(Arc::new(cfg))) }
	}

	pub fn snapshot(&self) -> Arc<Config> {
		self.inner.read().unwrap_or_else(|err| err.into_inner()).clone()
	}

	pub fn replace(&self, cfg: Config) {
		*self.inner.write().unwrap_or_else(|err| err.into_inner()) = Arc::new(cfg);
	}
}
