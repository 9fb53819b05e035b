//! Hybrid retrieval: lexical + vector candidates, rank fusion, optional
//! reranking, and a bounded result cache. Stage unavailability never fails
//! a request; it produces a best-effort ranking with explicit degradation
//! flags. Only malformed input is an error.

pub(crate) mod cache;
pub mod fusion;

use std::collections::HashMap;

use serde::Serialize;
use uuid::Uuid;

use sift_providers::rerank::RerankError;
use sift_storage::queries;

use crate::{Error, Result, SiftService, search::fusion::FusedCandidate};

/// Fused candidates fetched per requested result, so the reranker sees a
/// deeper pool than the final page.
const RERANK_POOL_FACTOR: usize = 5;
/// Characters of chunk text handed to the reranking model per candidate.
const RERANK_INPUT_CHARS: usize = 500;
const SNIPPET_CHARS: usize = 200;
const MAX_LIMIT: usize = 100;

/// Weights this far from an even split switch fusion to the weighted-sum
/// strategy.
const WEIGHT_DEVIATION_EPSILON: f32 = 0.01;

#[derive(Clone, Debug)]
pub struct SearchRequest {
	pub query: String,
	pub limit: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SearchResponse {
	pub query: String,
	pub items: Vec<SearchItem>,
	pub degraded: bool,
	pub degradation: Vec<DegradedReason>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SearchItem {
	pub chunk_id: Uuid,
	pub doc_id: Uuid,
	pub source_path: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub sender: Option<String>,
	pub snippet: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub lexical_score: Option<f32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub vector_score: Option<f32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub fused_score: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub rerank_score: Option<f32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedReason {
	/// The query could not be embedded; the ranking is lexical-only.
	VectorUnavailable,
	/// The reranking model was unreachable or not configured.
	RerankUnavailable,
	/// Too few fused candidates to be worth a reranking pass.
	RerankSkipped,
}

impl SiftService {
	pub async fn search(&self, req: SearchRequest) -> Result<SearchResponse> {
		let cfg = self.cfg.snapshot();
		let query = normalize_query(&req.query);

		if query.is_empty() {
			return Err(Error::InvalidRequest { message: "Query text must be non-empty.".to_string() });
		}
		if query.chars().count() > cfg.search.max_query_chars as usize {
			return Err(Error::InvalidRequest {
				message: format!(
					"Query text exceeds {} characters.",
					cfg.search.max_query_chars
				),
			});
		}
		if req.limit == 0 || req.limit > MAX_LIMIT {
			return Err(Error::InvalidRequest {
				message: format!("Result limit must be between 1 and {MAX_LIMIT}."),
			});
		}

		let fingerprint = cache::fingerprint(&query, req.limit);

		if cfg.search.cache.enabled
			&& let Some(hit) = self.cache.get(&fingerprint)
		{
			tracing::debug!(query = %query, "Search cache hit.");

			return Ok(hit);
		}

		let mut degradation = Vec::new();
		let candidate_k = i64::from(cfg.search.candidate_k);
		let lexical = queries::lexical_search(&self.db, &query, candidate_k).await?;
		let query_texts = [query.clone()];
		let vector = match self.embedder.embed(&query_texts).await {
			Ok(mut embeddings) if !embeddings.is_empty() => {
				let embedding = embeddings.swap_remove(0);

				queries::vector_search(&self.db, &embedding, candidate_k).await?
			},
			Ok(_) => {
				tracing::warn!("Embedding service returned no vector for the query.");
				degradation.push(DegradedReason::VectorUnavailable);

				Vec::new()
			},
			Err(err) => {
				tracing::warn!(error = %err, "Query embedding unavailable; degrading to lexical-only.");
				degradation.push(DegradedReason::VectorUnavailable);

				Vec::new()
			},
		};

		let fused = fuse_candidates(&cfg.search, &lexical, &vector);
		let pool: Vec<Uuid> =
			fused.iter().take(req.limit * RERANK_POOL_FACTOR).map(|f| f.chunk_id).collect();
		let details = queries::fetch_chunk_details(&self.db, &pool).await?;
		let details: HashMap<Uuid, _> =
			details.into_iter().map(|detail| (detail.chunk_id, detail)).collect();
		let mut valid: Vec<&FusedCandidate> =
			fused.iter().filter(|f| details.contains_key(&f.chunk_id)).collect();

		valid.truncate(req.limit * RERANK_POOL_FACTOR);

		let min_candidates = cfg
			.providers
			.rerank
			.as_ref()
			.map(|rerank| rerank.min_candidates as usize)
			.unwrap_or(5);
		let mut rerank_scores: HashMap<Uuid, f32> = HashMap::new();

		if valid.len() < min_candidates {
			degradation.push(DegradedReason::RerankSkipped);
		} else {
			let inputs: Vec<String> = valid
				.iter()
				.map(|f| truncate_chars(&details[&f.chunk_id].text, RERANK_INPUT_CHARS))
				.collect();

			match self.reranker.rerank(&query, &inputs).await {
				Ok(scores) => {
					for (candidate, score) in valid.iter().zip(scores.iter()) {
						rerank_scores.insert(candidate.chunk_id, *score);
					}

					// Stable sort: rerank ties keep their fused order.
					valid.sort_by(|left, right| {
						let lhs = rerank_scores.get(&left.chunk_id).copied().unwrap_or(0.0);
						let rhs = rerank_scores.get(&right.chunk_id).copied().unwrap_or(0.0);

						rhs.total_cmp(&lhs)
					});
				},
				Err(RerankError::Unavailable) => {
					degradation.push(DegradedReason::RerankUnavailable);
				},
				Err(err) => {
					tracing::warn!(error = %err, "Reranking failed; returning fused order.");
					degradation.push(DegradedReason::RerankUnavailable);
				},
			}
		}

		let lexical_scores: HashMap<Uuid, f32> = lexical.iter().copied().collect();
		let vector_scores: HashMap<Uuid, f32> = vector.iter().copied().collect();
		let items: Vec<SearchItem> = valid
			.iter()
			.take(req.limit)
			.map(|candidate| {
				let detail = &details[&candidate.chunk_id];

				SearchItem {
					chunk_id: candidate.chunk_id,
					doc_id: detail.doc_id,
					source_path: detail.source_path.clone(),
					sender: detail.sender_email.clone(),
					snippet: truncate_chars(&detail.text, SNIPPET_CHARS),
					lexical_score: lexical_scores.get(&candidate.chunk_id).copied(),
					vector_score: vector_scores.get(&candidate.chunk_id).copied(),
					fused_score: Some(candidate.score),
					rerank_score: rerank_scores.get(&candidate.chunk_id).copied(),
				}
			})
			.collect();
		let response = SearchResponse {
			query,
			items,
			degraded: !degradation.is_empty(),
			degradation,
		};

		if cfg.search.cache.enabled {
			self.cache.insert(
				fingerprint,
				response.clone(),
				std::time::Duration::from_secs(cfg.search.cache.ttl_seconds),
				cfg.search.cache.max_entries,
			);
		}

		tracing::info!(
			result_count = response.items.len(),
			degraded = response.degraded,
			lexical_matches = lexical.len(),
			vector_matches = vector.len(),
			"Search completed."
		);

		Ok(response)
	}
}

/// RRF by default; the weighted-sum strategy only when the configured
/// weights deviate from an even split and vector scores exist. Never both.
fn fuse_candidates(
	cfg: &sift_config::Search,
	lexical: &[(Uuid, f32)],
	vector: &[(Uuid, f32)],
) -> Vec<FusedCandidate> {
	let use_weighted = ((cfg.lexical_weight - 0.5).abs() > WEIGHT_DEVIATION_EPSILON
		|| (cfg.vector_weight - 0.5).abs() > WEIGHT_DEVIATION_EPSILON)
		&& !vector.is_empty();

	if use_weighted {
		fusion::weighted_fuse(lexical, vector, cfg.lexical_weight, cfg.vector_weight)
	} else {
		let lexical_ids: Vec<Uuid> = lexical.iter().map(|(id, _)| *id).collect();
		let vector_ids: Vec<Uuid> = vector.iter().map(|(id, _)| *id).collect();

		fusion::rrf_fuse(&lexical_ids, &vector_ids, cfg.rrf_k)
	}
}

fn normalize_query(query: &str) -> String {
	query.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
	text.chars().take(max_chars).collect()
}
