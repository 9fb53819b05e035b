//! Candidate-list fusion.
//!
//! Two mutually exclusive strategies: reciprocal rank fusion (the default)
//! and a min-max-normalized weighted score sum for deployments that weight
//! the engines unevenly. Ordering is fully deterministic: score, then the
//! candidate's best individual rank, then the identifier.

use std::{cmp::Ordering, collections::HashMap};

use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FusedCandidate {
	pub chunk_id: Uuid,
	pub score: f64,
	/// Lowest zero-based rank this candidate held in any input list.
	pub best_rank: usize,
}

/// RRF: each appearance contributes `1 / (k + rank + 1)`; absence from a
/// list contributes nothing.
pub fn rrf_fuse(lexical_ids: &[Uuid], vector_ids: &[Uuid], k: u32) -> Vec<FusedCandidate> {
	let mut merged: HashMap<Uuid, FusedCandidate> = HashMap::new();

	for ids in [lexical_ids, vector_ids] {
		for (rank, chunk_id) in ids.iter().enumerate() {
			let contribution = 1.0 / (f64::from(k) + rank as f64 + 1.0);
			let entry = merged
				.entry(*chunk_id)
				.or_insert(FusedCandidate { chunk_id: *chunk_id, score: 0.0, best_rank: rank });

			entry.score += contribution;
			entry.best_rank = entry.best_rank.min(rank);
		}
	}

	sort_fused(merged.into_values().collect())
}

/// Weighted sum over min-max-normalized raw scores, so lexical rank
/// magnitudes cannot drown out cosine similarities.
pub fn weighted_fuse(
	lexical: &[(Uuid, f32)],
	vector: &[(Uuid, f32)],
	lexical_weight: f32,
	vector_weight: f32,
) -> Vec<FusedCandidate> {
	let norm_lexical = min_max_normalize(lexical);
	let norm_vector = min_max_normalize(vector);
	let mut best_ranks: HashMap<Uuid, usize> = HashMap::new();

	for ids in [lexical, vector] {
		for (rank, (chunk_id, _)) in ids.iter().enumerate() {
			let entry = best_ranks.entry(*chunk_id).or_insert(rank);

			*entry = (*entry).min(rank);
		}
	}

	let merged = best_ranks
		.into_iter()
		.map(|(chunk_id, best_rank)| {
			let score = f64::from(lexical_weight)
				* norm_lexical.get(&chunk_id).copied().unwrap_or(0.0)
				+ f64::from(vector_weight) * norm_vector.get(&chunk_id).copied().unwrap_or(0.0);

			FusedCandidate { chunk_id, score, best_rank }
		})
		.collect();

	sort_fused(merged)
}

fn min_max_normalize(scores: &[(Uuid, f32)]) -> HashMap<Uuid, f64> {
	if scores.is_empty() {
		return HashMap::new();
	}

	let mut lo = f64::INFINITY;
	let mut hi = f64::NEG_INFINITY;

	for (_, score) in scores {
		let score = f64::from(*score);

		lo = lo.min(score);
		hi = hi.max(score);
	}

	let range = hi - lo;

	scores
		.iter()
		.map(|(chunk_id, score)| {
			let normalized =
				if range == 0.0 { 1.0 } else { (f64::from(*score) - lo) / range };

			(*chunk_id, normalized)
		})
		.collect()
}

fn sort_fused(mut merged: Vec<FusedCandidate>) -> Vec<FusedCandidate> {
	merged.sort_by(|left, right| {
		cmp_score_desc(left.score, right.score)
			.then_with(|| left.best_rank.cmp(&right.best_rank))
			.then_with(|| left.chunk_id.cmp(&right.chunk_id))
	});

	merged
}

pub fn cmp_score_desc(a: f64, b: f64) -> Ordering {
	b.total_cmp(&a)
}
