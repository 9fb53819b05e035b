use std::{
	future::IntoFuture,
	sync::{
		Arc, Mutex,
		atomic::{AtomicUsize, Ordering},
	},
	time::{Duration, Instant},
};

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing};
use serde_json::Value;
use sqlx::PgPool;
use tokio::{
	net::TcpListener,
	sync::{oneshot, oneshot::Sender, watch},
};

use sift_providers::embedding::HttpEmbedder;
use sift_worker::embed::{EmbedState, run_embedding_worker};

use crate::acceptance::{
	self, FailingEmbedder, OversizedEmbedder, StubEmbedder, VECTOR_DIM, connect, seed_document,
	shared_config, test_db,
};

async fn wait_for_depth<F>(pool: &PgPool, timeout: Duration, predicate: F) -> bool
where
	F: Fn((i64, i64, i64)) -> bool,
{
	let deadline = Instant::now() + timeout;

	loop {
		let counts: (i64, i64, i64) = sqlx::query_as(
			"\
SELECT
	count(*) FILTER (WHERE embedding_status = 'done'),
	count(*) FILTER (WHERE embedding_status = 'failed'),
	count(*) FILTER (WHERE embedding_status = 'pending')
FROM chunks",
		)
		.fetch_one(pool)
		.await
		.expect("Failed to count chunk states.");

		if predicate(counts) {
			return true;
		}
		if Instant::now() >= deadline {
			return false;
		}

		tokio::time::sleep(Duration::from_millis(50)).await;
	}
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set SIFT_PG_DSN to run."]
async fn healthy_service_embeds_every_pending_chunk() {
	let Some(test_db) = test_db().await else {
		eprintln!("Skipping healthy_service_embeds_every_pending_chunk; set SIFT_PG_DSN to run.");

		return;
	};
	let db = connect(test_db.dsn()).await;
	let chunk_texts: Vec<String> =
		(0..200).map(|index| format!("Pending chunk number {index} awaiting a vector.")).collect();
	let chunk_refs: Vec<&str> = chunk_texts.iter().map(String::as_str).collect();

	seed_document(&db, "/corpus/bulk.md", &chunk_refs).await;

	let (shutdown_tx, shutdown_rx) = watch::channel(false);
	let state = EmbedState {
		db: connect(test_db.dsn()).await,
		cfg: shared_config(test_db.dsn()),
		embedder: Arc::new(StubEmbedder),
	};
	let handle = tokio::spawn(run_embedding_worker(state, shutdown_rx));
	let all_done = wait_for_depth(&db.pool, Duration::from_secs(10), |(done, _, _)| done == 200).await;

	assert!(all_done, "Expected all 200 chunks to reach done.");

	let with_vectors: i64 = sqlx::query_scalar(
		"SELECT count(*) FROM chunks WHERE embedding_status = 'done' AND embedding IS NOT NULL",
	)
	.fetch_one(&db.pool)
	.await
	.expect("Failed to count vectors.");

	assert_eq!(with_vectors, 200);

	let _ = shutdown_tx.send(true);
	let _ = handle.await;

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set SIFT_PG_DSN to run."]
async fn repeated_transient_failure_terminates_in_failed_state() {
	let Some(test_db) = test_db().await else {
		eprintln!(
			"Skipping repeated_transient_failure_terminates_in_failed_state; set SIFT_PG_DSN to run."
		);

		return;
	};
	let db = connect(test_db.dsn()).await;

	seed_document(&db, "/corpus/doomed.md", &["First chunk.", "Second chunk."]).await;

	let (shutdown_tx, shutdown_rx) = watch::channel(false);
	let state = EmbedState {
		db: connect(test_db.dsn()).await,
		cfg: shared_config(test_db.dsn()),
		embedder: Arc::new(FailingEmbedder),
	};
	let handle = tokio::spawn(run_embedding_worker(state, shutdown_rx));
	// retry_max is 3 in the test config: no infinite retry loop.
	let all_failed =
		wait_for_depth(&db.pool, Duration::from_secs(10), |(_, failed, _)| failed == 2).await;

	assert!(all_failed, "Expected both chunks to reach failed.");

	let rows: Vec<(i32, Option<String>)> =
		sqlx::query_as("SELECT retry_count, last_error FROM chunks ORDER BY chunk_id")
			.fetch_all(&db.pool)
			.await
			.expect("Failed to read chunk rows.");

	for (retry_count, last_error) in rows {
		assert_eq!(retry_count, 3);
		assert!(last_error.is_some());
	}

	// Terminal failures are excluded from later claims.
	tokio::time::sleep(Duration::from_millis(200)).await;

	let still_failed: i64 =
		sqlx::query_scalar("SELECT count(*) FROM chunks WHERE embedding_status = 'failed'")
			.fetch_one(&db.pool)
			.await
			.expect("Failed to count failed chunks.");

	assert_eq!(still_failed, 2);

	let _ = shutdown_tx.send(true);
	let _ = handle.await;

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set SIFT_PG_DSN to run."]
async fn oversized_batches_are_split_until_calls_fit() {
	let Some(test_db) = test_db().await else {
		eprintln!("Skipping oversized_batches_are_split_until_calls_fit; set SIFT_PG_DSN to run.");

		return;
	};
	let db = connect(test_db.dsn()).await;
	let chunk_texts: Vec<String> =
		(0..10).map(|index| format!("Split candidate chunk number {index}.")).collect();
	let chunk_refs: Vec<&str> = chunk_texts.iter().map(String::as_str).collect();

	seed_document(&db, "/corpus/oversized.md", &chunk_refs).await;

	let accepted_batches = Arc::new(Mutex::new(Vec::new()));
	let (shutdown_tx, shutdown_rx) = watch::channel(false);
	let state = EmbedState {
		db: connect(test_db.dsn()).await,
		cfg: shared_config(test_db.dsn()),
		embedder: Arc::new(OversizedEmbedder {
			max_texts: 2,
			accepted_batches: accepted_batches.clone(),
		}),
	};
	let handle = tokio::spawn(run_embedding_worker(state, shutdown_rx));
	let all_done = wait_for_depth(&db.pool, Duration::from_secs(10), |(done, _, _)| done == 10).await;

	assert!(all_done, "Expected all chunks embedded after splitting.");

	let batches = accepted_batches.lock().unwrap_or_else(|err| err.into_inner()).clone();

	assert!(!batches.is_empty());
	// The oversized batch was never sent whole; every accepted call fit.
	assert!(batches.iter().all(|len| *len <= 2), "Unexpected batch sizes: {batches:?}");

	let _ = shutdown_tx.send(true);
	let _ = handle.await;

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

async fn start_embed_server(request_count: Arc<AtomicUsize>) -> (String, Sender<()>) {
	let app =
		Router::new().route("/v1/embeddings", routing::post(embed_handler)).with_state(request_count);
	let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind embed server.");
	let addr = listener.local_addr().expect("Failed to read embed server address.");
	let (tx, rx) = oneshot::channel();
	let server = axum::serve(listener, app).with_graceful_shutdown(async move {
		let _ = rx.await;
	});

	tokio::spawn(async move {
		let _ = server.into_future().await;
	});

	(format!("http://{addr}"), tx)
}

async fn embed_handler(
	State(counter): State<Arc<AtomicUsize>>,
	Json(payload): Json<Value>,
) -> impl IntoResponse {
	let call_index = counter.fetch_add(1, Ordering::SeqCst);

	if call_index == 0 {
		return StatusCode::INTERNAL_SERVER_ERROR.into_response();
	}

	let inputs =
		payload.get("input").and_then(|value| value.as_array()).cloned().unwrap_or_default();
	let data: Vec<_> = inputs
		.iter()
		.enumerate()
		.map(|(index, _)| {
			let embedding: Vec<f32> = vec![0.1_f32; VECTOR_DIM as usize];

			serde_json::json!({
				"index": index,
				"embedding": embedding
			})
		})
		.collect();

	(StatusCode::OK, Json(serde_json::json!({ "data": data }))).into_response()
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set SIFT_PG_DSN to run."]
async fn http_embedder_rides_the_retry_ladder_to_done() {
	let Some(test_db) = test_db().await else {
		eprintln!("Skipping http_embedder_rides_the_retry_ladder_to_done; set SIFT_PG_DSN to run.");

		return;
	};
	let db = connect(test_db.dsn()).await;

	seed_document(&db, "/corpus/retry.md", &["A chunk that succeeds on the second call."]).await;

	let request_count = Arc::new(AtomicUsize::new(0));
	let (api_base, stop_server) = start_embed_server(request_count.clone()).await;
	let mut config = acceptance::test_config(test_db.dsn().to_string());

	config.providers.embedding.api_base = api_base;

	let shared = sift_config::SharedConfig::new(config);
	let (shutdown_tx, shutdown_rx) = watch::channel(false);
	let state = EmbedState {
		db: connect(test_db.dsn()).await,
		cfg: shared.clone(),
		embedder: Arc::new(HttpEmbedder::new(shared)),
	};
	let handle = tokio::spawn(run_embedding_worker(state, shutdown_rx));
	// First call fails with 500, the revert puts the chunk back on the
	// ladder, and the next poll succeeds.
	let done = wait_for_depth(&db.pool, Duration::from_secs(10), |(done, _, _)| done == 1).await;

	assert!(done, "Expected the chunk to reach done after one retry.");
	assert!(request_count.load(Ordering::SeqCst) >= 2);

	let _ = shutdown_tx.send(true);
	let _ = handle.await;
	let _ = stop_server.send(());

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
