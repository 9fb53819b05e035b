//! Pairwise reranking client. Unavailability is an expected condition, not
//! a fault: the retrieval engine degrades and says so.

use std::time::Duration as StdDuration;

use reqwest::Client;
use serde_json::Value;

use sift_config::{RerankProviderConfig, SharedConfig};

use crate::BoxFuture;

#[derive(Debug, thiserror::Error)]
pub enum RerankError {
	#[error("Reranking model is not configured.")]
	Unavailable,
	#[error("{message}")]
	Failed { message: String },
}
impl RerankError {
	fn failed(message: impl Into<String>) -> Self {
		Self::Failed { message: message.into() }
	}
}

pub trait Reranker
where
	Self: Send + Sync,
{
	fn rerank<'a>(
		&'a self,
		query: &'a str,
		docs: &'a [String],
	) -> BoxFuture<'a, Result<Vec<f32>, RerankError>>;
}

pub struct HttpReranker {
	shared: SharedConfig,
}
impl HttpReranker {
	pub fn new(shared: SharedConfig) -> Self {
		Self { shared }
	}
}
impl Reranker for HttpReranker {
	fn rerank<'a>(
		&'a self,
		query: &'a str,
		docs: &'a [String],
	) -> BoxFuture<'a, Result<Vec<f32>, RerankError>> {
		Box::pin(async move {
			let cfg = self.shared.snapshot();
			let Some(rerank_cfg) = cfg.providers.rerank.as_ref() else {
				return Err(RerankError::Unavailable);
			};

			rerank(rerank_cfg, query, docs).await
		})
	}
}

pub async fn rerank(
	cfg: &RerankProviderConfig,
	query: &str,
	docs: &[String],
) -> Result<Vec<f32>, RerankError> {
	let client = Client::builder()
		.timeout(StdDuration::from_millis(cfg.timeout_ms))
		.build()
		.map_err(|err| RerankError::failed(err.to_string()))?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({ "model": cfg.model, "query": query, "documents": docs });
	let headers = crate::auth_headers(&cfg.api_key, &cfg.default_headers)
		.map_err(|err| RerankError::failed(err.to_string()))?;
	let res = client
		.post(url)
		.headers(headers)
		.json(&body)
		.send()
		.await
		.map_err(|err| RerankError::failed(err.to_string()))?;
	let res = res.error_for_status().map_err(|err| RerankError::failed(err.to_string()))?;
	let json: Value = res.json().await.map_err(|err| RerankError::failed(err.to_string()))?;

	parse_rerank_response(json, docs.len())
}

fn parse_rerank_response(json: Value, doc_count: usize) -> Result<Vec<f32>, RerankError> {
	let mut scores = vec![0.0f32; doc_count];
	let results = json
		.get("results")
		.or_else(|| json.get("data"))
		.and_then(|v| v.as_array())
		.ok_or_else(|| RerankError::failed("Rerank response is missing results array."))?;

	for item in results {
		let index = item
			.get("index")
			.and_then(|v| v.as_u64())
			.ok_or_else(|| RerankError::failed("Rerank result missing index."))? as usize;
		let score = item
			.get("relevance_score")
			.or_else(|| item.get("score"))
			.and_then(|v| v.as_f64())
			.ok_or_else(|| RerankError::failed("Rerank result missing score."))? as f32;
		if index < scores.len() {
			scores[index] = score;
		}
	}

	Ok(scores)
}
