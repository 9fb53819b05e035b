pub mod admin;
pub mod search;

mod error;

pub use error::{Error, Result};
pub use search::{DegradedReason, SearchItem, SearchRequest, SearchResponse};

use std::sync::Arc;

use sift_config::SharedConfig;
use sift_providers::{
	embedding::{Embedder, HttpEmbedder},
	rerank::{HttpReranker, Reranker},
};
use sift_storage::db::Db;

use crate::search::cache::ResultCache;

pub struct SiftService {
	pub cfg: SharedConfig,
	pub db: Db,
	pub embedder: Arc<dyn Embedder>,
	pub reranker: Arc<dyn Reranker>,
	cache: ResultCache,
}
impl SiftService {
	pub fn new(
		cfg: SharedConfig,
		db: Db,
		embedder: Arc<dyn Embedder>,
		reranker: Arc<dyn Reranker>,
	) -> Self {
		Self { cfg, db, embedder, reranker, cache: ResultCache::new() }
	}

	pub fn with_http_providers(cfg: SharedConfig, db: Db) -> Self {
		let embedder = Arc::new(HttpEmbedder::new(cfg.clone()));
		let reranker = Arc::new(HttpReranker::new(cfg.clone()));

		Self::new(cfg, db, embedder, reranker)
	}
}
