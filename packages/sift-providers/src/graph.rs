//! Secondary graph store client.
//!
//! Every write is an idempotent merge keyed by stable identifiers (document
//! id, person email, entity id), so re-delivery after a crash between
//! "applied" and "marked processed" is a no-op. Edge invalidation sets
//! `valid_until` instead of removing rows; history is append-only.

use std::time::Duration;

use color_eyre::{Result, eyre};
use reqwest::{Client, StatusCode};
use time::format_description::well_known::Rfc3339;

use sift_config::{Graph, SharedConfig};
use sift_domain::events::{DocumentAdded, EntityMerged, EntityRemoved};

use crate::BoxFuture;

pub trait GraphStore
where
	Self: Send + Sync,
{
	/// Merge the document node, the sender/recipient person nodes, and the
	/// SENT/RECEIVED edges (`valid_from` taken from the snapshot).
	fn merge_document<'a>(&'a self, event: &'a DocumentAdded) -> BoxFuture<'a, Result<()>>;

	/// Stamp `valid_until` on the merged entity's outgoing edges.
	fn invalidate_entity_edges<'a>(&'a self, event: &'a EntityMerged)
	-> BoxFuture<'a, Result<()>>;

	/// Detach-delete the entity node and its edges.
	fn detach_entity<'a>(&'a self, event: &'a EntityRemoved) -> BoxFuture<'a, Result<()>>;
}

pub struct HttpGraphStore {
	shared: SharedConfig,
}
impl HttpGraphStore {
	pub fn new(shared: SharedConfig) -> Self {
		Self { shared }
	}

	async fn post(&self, path: &str, body: serde_json::Value, missing_ok: bool) -> Result<()> {
		let cfg = self.shared.snapshot();
		let graph: &Graph = &cfg.storage.graph;
		let client = Client::builder().timeout(Duration::from_millis(graph.timeout_ms)).build()?;
		let url = format!("{}{}", graph.api_base, path);
		let res = client
			.post(url)
			.headers(crate::auth_headers(&graph.api_key, &graph.default_headers)?)
			.json(&body)
			.send()
			.await?;

		if missing_ok && res.status() == StatusCode::NOT_FOUND {
			tracing::info!(path, "Graph target missing; treating as already applied.");

			return Ok(());
		}

		res.error_for_status()?;

		Ok(())
	}
}
impl GraphStore for HttpGraphStore {
	fn merge_document<'a>(&'a self, event: &'a DocumentAdded) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let body = serde_json::to_value(event)
				.map_err(|err| eyre::eyre!("Failed to encode document_added payload: {err}."))?;

			self.post("/v1/graph/merge-document", body, false).await
		})
	}

	fn invalidate_entity_edges<'a>(
		&'a self,
		event: &'a EntityMerged,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let valid_until = event
				.merged_at
				.format(&Rfc3339)
				.map_err(|_| eyre::eyre!("Failed to format merge timestamp."))?;
			let body = serde_json::json!({
				"entity_id": event.from_id,
				"merged_into": event.into_id,
				"valid_until": valid_until,
			});

			// A merge of an entity the graph never saw has nothing to invalidate.
			self.post("/v1/graph/invalidate-edges", body, true).await
		})
	}

	fn detach_entity<'a>(&'a self, event: &'a EntityRemoved) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let body = serde_json::json!({ "entity_id": event.entity_id });

			// Deleting something already gone is benign.
			self.post("/v1/graph/detach-entity", body, true).await
		})
	}
}
