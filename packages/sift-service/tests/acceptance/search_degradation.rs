use std::sync::{
	Arc,
	atomic::{AtomicUsize, Ordering},
};

use sift_service::{DegradedReason, SearchRequest, SiftService};

use crate::acceptance::{
	FailingEmbedder, SpyEmbedder, StubEmbedder, StubReranker, UnavailableReranker, connect,
	embed_pending_directly, seed_document, shared_config, test_db,
};

const CORPUS: [&str; 4] = [
	"Hybrid retrieval fuses lexical and vector rankings into one list.",
	"The outbox relay drains committed events toward the graph store.",
	"Vector rankings come from embeddings over retrieval chunks.",
	"Lexical rankings come from full-text search over retrieval chunks.",
];

async fn seeded_corpus(dsn: &str) -> sift_storage::db::Db {
	let db = connect(dsn).await;

	seed_document(&db, "/corpus/retrieval.md", &CORPUS).await;
	embed_pending_directly(&db).await;

	db
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set SIFT_PG_DSN to run."]
async fn healthy_pipeline_is_not_degraded() {
	let Some(test_db) = test_db().await else {
		eprintln!("Skipping healthy_pipeline_is_not_degraded; set SIFT_PG_DSN to run.");

		return;
	};
	let db = seeded_corpus(test_db.dsn()).await;
	let service = SiftService::new(
		shared_config(test_db.dsn()),
		db,
		Arc::new(StubEmbedder),
		Arc::new(StubReranker),
	);
	let response = service
		.search(SearchRequest { query: "retrieval rankings".to_string(), limit: 10 })
		.await
		.expect("Search failed.");

	assert!(!response.degraded);
	assert!(response.degradation.is_empty());
	assert!(!response.items.is_empty());

	for item in &response.items {
		assert!(item.fused_score.is_some());
		assert!(item.rerank_score.is_some());
		assert!(!item.snippet.is_empty());
		assert_eq!(item.source_path, "/corpus/retrieval.md");
	}

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set SIFT_PG_DSN to run."]
async fn embedding_outage_degrades_to_lexical_only() {
	let Some(test_db) = test_db().await else {
		eprintln!("Skipping embedding_outage_degrades_to_lexical_only; set SIFT_PG_DSN to run.");

		return;
	};
	let db = seeded_corpus(test_db.dsn()).await;
	let service = SiftService::new(
		shared_config(test_db.dsn()),
		db,
		Arc::new(FailingEmbedder),
		Arc::new(StubReranker),
	);
	let response = service
		.search(SearchRequest { query: "retrieval rankings".to_string(), limit: 10 })
		.await
		.expect("Search failed.");

	assert!(response.degraded);
	assert!(response.degradation.contains(&DegradedReason::VectorUnavailable));
	assert!(!response.degradation.contains(&DegradedReason::RerankUnavailable));
	assert!(!response.items.is_empty(), "Lexical-only results still serve.");

	for item in &response.items {
		assert!(item.vector_score.is_none(), "No vector stage ran; no vector score may appear.");
		assert!(item.lexical_score.is_some());
	}

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set SIFT_PG_DSN to run."]
async fn rerank_outage_degrades_to_fused_order() {
	let Some(test_db) = test_db().await else {
		eprintln!("Skipping rerank_outage_degrades_to_fused_order; set SIFT_PG_DSN to run.");

		return;
	};
	let db = seeded_corpus(test_db.dsn()).await;
	let service = SiftService::new(
		shared_config(test_db.dsn()),
		db,
		Arc::new(StubEmbedder),
		Arc::new(UnavailableReranker),
	);
	let response = service
		.search(SearchRequest { query: "retrieval rankings".to_string(), limit: 10 })
		.await
		.expect("Search failed.");

	assert!(response.degraded);
	assert_eq!(response.degradation, vec![DegradedReason::RerankUnavailable]);

	for item in &response.items {
		assert!(item.rerank_score.is_none());
		assert!(item.fused_score.is_some());
	}

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set SIFT_PG_DSN to run."]
async fn both_stages_down_surface_both_reasons() {
	let Some(test_db) = test_db().await else {
		eprintln!("Skipping both_stages_down_surface_both_reasons; set SIFT_PG_DSN to run.");

		return;
	};
	let db = seeded_corpus(test_db.dsn()).await;
	let service = SiftService::new(
		shared_config(test_db.dsn()),
		db,
		Arc::new(FailingEmbedder),
		Arc::new(UnavailableReranker),
	);
	let response = service
		.search(SearchRequest { query: "retrieval rankings".to_string(), limit: 10 })
		.await
		.expect("Search failed.");

	assert!(response.degraded);
	assert!(response.degradation.contains(&DegradedReason::VectorUnavailable));
	assert!(response.degradation.contains(&DegradedReason::RerankUnavailable));
	assert!(!response.items.is_empty());

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set SIFT_PG_DSN to run."]
async fn thin_candidate_pools_skip_reranking() {
	let Some(test_db) = test_db().await else {
		eprintln!("Skipping thin_candidate_pools_skip_reranking; set SIFT_PG_DSN to run.");

		return;
	};
	let db = seeded_corpus(test_db.dsn()).await;
	let service = SiftService::new(
		shared_config(test_db.dsn()),
		db,
		Arc::new(FailingEmbedder),
		Arc::new(StubReranker),
	);
	// Exactly one chunk mentions the outbox; min_candidates is 2.
	let response = service
		.search(SearchRequest { query: "outbox".to_string(), limit: 10 })
		.await
		.expect("Search failed.");

	assert_eq!(response.items.len(), 1);
	assert!(response.degradation.contains(&DegradedReason::RerankSkipped));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set SIFT_PG_DSN to run."]
async fn cache_hit_skips_recomputation_and_matches_exactly() {
	let Some(test_db) = test_db().await else {
		eprintln!(
			"Skipping cache_hit_skips_recomputation_and_matches_exactly; set SIFT_PG_DSN to run."
		);

		return;
	};
	let db = seeded_corpus(test_db.dsn()).await;
	let calls = Arc::new(AtomicUsize::new(0));
	let service = SiftService::new(
		shared_config(test_db.dsn()),
		db,
		Arc::new(SpyEmbedder { calls: calls.clone() }),
		Arc::new(StubReranker),
	);
	let request = SearchRequest { query: "retrieval rankings".to_string(), limit: 10 };
	let first = service.search(request.clone()).await.expect("First search failed.");
	let second = service.search(request).await.expect("Second search failed.");

	assert_eq!(first, second);
	assert_eq!(calls.load(Ordering::SeqCst), 1, "The cached query must not re-embed.");

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set SIFT_PG_DSN to run."]
async fn malformed_queries_are_rejected() {
	let Some(test_db) = test_db().await else {
		eprintln!("Skipping malformed_queries_are_rejected; set SIFT_PG_DSN to run.");

		return;
	};
	let db = connect(test_db.dsn()).await;
	let service = SiftService::new(
		shared_config(test_db.dsn()),
		db,
		Arc::new(StubEmbedder),
		Arc::new(StubReranker),
	);

	assert!(
		service.search(SearchRequest { query: "   ".to_string(), limit: 10 }).await.is_err(),
		"Blank query must be rejected."
	);
	assert!(
		service
			.search(SearchRequest { query: "x".repeat(3_000), limit: 10 })
			.await
			.is_err(),
		"Oversized query must be rejected."
	);
	assert!(
		service
			.search(SearchRequest { query: "valid".to_string(), limit: 0 })
			.await
			.is_err(),
		"Zero limit must be rejected."
	);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
