//! Embedding service client.
//!
//! Failures are split into two kinds the pipeline treats differently:
//! [`EmbedError::InputTooLarge`] triggers a structural batch split, while
//! [`EmbedError::Transient`] rides the per-chunk retry ladder. The split is
//! decided from the HTTP status and the provider's machine-readable error
//! code, never from prose error text.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::Value;

use sift_config::{EmbeddingProviderConfig, SharedConfig};

use crate::BoxFuture;

/// Provider error codes that mean the request body itself was too large for
/// one call.
const INPUT_TOO_LARGE_CODES: [&str; 2] = ["input_too_large", "context_length_exceeded"];

#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
	#[error("Embedding input exceeds the service's capacity: {message}")]
	InputTooLarge { message: String },
	#[error("{message}")]
	Transient { message: String },
}
impl EmbedError {
	fn transient(message: impl Into<String>) -> Self {
		Self::Transient { message: message.into() }
	}
}

pub trait Embedder
where
	Self: Send + Sync,
{
	fn embed<'a>(&'a self, texts: &'a [String])
	-> BoxFuture<'a, Result<Vec<Vec<f32>>, EmbedError>>;
}

/// Reads the provider section from [`SharedConfig`] on every call, so a
/// config reload redirects the next call without restarting workers.
pub struct HttpEmbedder {
	shared: SharedConfig,
}
impl HttpEmbedder {
	pub fn new(shared: SharedConfig) -> Self {
		Self { shared }
	}
}
impl Embedder for HttpEmbedder {
	fn embed<'a>(
		&'a self,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>, EmbedError>> {
		Box::pin(async move {
			let cfg = self.shared.snapshot();

			embed(&cfg.providers.embedding, texts).await
		})
	}
}

pub async fn embed(
	cfg: &EmbeddingProviderConfig,
	texts: &[String],
) -> Result<Vec<Vec<f32>>, EmbedError> {
	let client = Client::builder()
		.timeout(Duration::from_millis(cfg.timeout_ms))
		.build()
		.map_err(|err| EmbedError::transient(err.to_string()))?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"input": texts,
		"dimensions": cfg.dimensions,
	});
	let headers = crate::auth_headers(&cfg.api_key, &cfg.default_headers)
		.map_err(|err| EmbedError::transient(err.to_string()))?;
	let res = client
		.post(url)
		.headers(headers)
		.json(&body)
		.send()
		.await
		.map_err(|err| EmbedError::transient(err.to_string()))?;
	let status = res.status();

	if !status.is_success() {
		let body: Value = res.json().await.unwrap_or(Value::Null);

		return Err(classify_failure(status, &body));
	}

	let json: Value =
		res.json().await.map_err(|err| EmbedError::transient(err.to_string()))?;

	parse_embedding_response(json)
}

fn classify_failure(status: StatusCode, body: &Value) -> EmbedError {
	let code = body
		.get("error")
		.and_then(|err| err.get("code"))
		.and_then(|code| code.as_str())
		.unwrap_or_default();

	if status == StatusCode::PAYLOAD_TOO_LARGE
		|| INPUT_TOO_LARGE_CODES.contains(&code)
	{
		return EmbedError::InputTooLarge {
			message: format!("status {status}, code {code:?}"),
		};
	}

	EmbedError::Transient { message: format!("Embedding request failed with status {status}.") }
}

fn parse_embedding_response(json: Value) -> Result<Vec<Vec<f32>>, EmbedError> {
	let data = json
		.get("data")
		.and_then(|v| v.as_array())
		.ok_or_else(|| EmbedError::transient("Embedding response is missing data array."))?;

	let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());
	for (fallback_index, item) in data.iter().enumerate() {
		let index = item
			.get("index")
			.and_then(|v| v.as_u64())
			.map(|v| v as usize)
			.unwrap_or(fallback_index);
		let embedding = item
			.get("embedding")
			.and_then(|v| v.as_array())
			.ok_or_else(|| EmbedError::transient("Embedding item missing embedding array."))?;
		let mut vec = Vec::with_capacity(embedding.len());
		for value in embedding {
			let number = value
				.as_f64()
				.ok_or_else(|| EmbedError::transient("Embedding value must be numeric."))?;
			vec.push(number as f32);
		}
		indexed.push((index, vec));
	}

	indexed.sort_by_key(|(index, _)| *index);

	Ok(indexed.into_iter().map(|(_, vec)| vec).collect())
}
