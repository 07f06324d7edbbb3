use reqwest::Client;
use serde_json::Value;

use crate::{BoxFuture, EmbeddingClient, Error, Result};
use quill_config::EmbeddingProviderConfig;

/// OpenAI-compatible embeddings endpoint.
pub struct HttpEmbeddingClient {
	cfg: EmbeddingProviderConfig,
	client: Client,
}
impl HttpEmbeddingClient {
	pub fn new(cfg: EmbeddingProviderConfig) -> Result<Self> {
		let client = crate::build_client(cfg.timeout_ms)?;

		Ok(Self { cfg, client })
	}

	pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
		let url = format!("{}{}", self.cfg.api_base, self.cfg.path);
		let body = serde_json::json!({
			"model": self.cfg.model,
			"input": texts,
			"dimensions": self.cfg.dimensions,
		});
		let headers = crate::auth_headers(self.cfg.api_key.as_deref(), &self.cfg.default_headers)?;
		let json =
			crate::post_json(&self.client, &self.cfg.provider_id, &url, headers, &body).await?;
		let vectors = parse_embedding_response(json)?;

		if vectors.len() != texts.len() {
			return Err(Error::InvalidResponse {
				message: format!(
					"Embedding provider returned {} vectors for {} inputs.",
					vectors.len(),
					texts.len()
				),
			});
		}

		Ok(vectors)
	}
}
impl EmbeddingClient for HttpEmbeddingClient {
	fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>>> {
		Box::pin(async move {
			let vectors = self.embed_batch(std::slice::from_ref(&text.to_string())).await?;

			vectors.into_iter().next().ok_or_else(|| Error::InvalidResponse {
				message: "Embedding provider returned no vectors.".to_string(),
			})
		})
	}
}

fn parse_embedding_response(json: Value) -> Result<Vec<Vec<f32>>> {
	let data = json.get("data").and_then(|v| v.as_array()).ok_or_else(|| Error::InvalidResponse {
		message: "Embedding response is missing data array.".to_string(),
	})?;
	let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());

	for (fallback_index, item) in data.iter().enumerate() {
		let index = item
			.get("index")
			.and_then(|v| v.as_u64())
			.map(|v| v as usize)
			.unwrap_or(fallback_index);
		let embedding = item.get("embedding").and_then(|v| v.as_array()).ok_or_else(|| {
			Error::InvalidResponse { message: "Embedding item missing embedding array.".to_string() }
		})?;
		let mut vec = Vec::with_capacity(embedding.len());

		for value in embedding {
			let number = value.as_f64().ok_or_else(|| Error::InvalidResponse {
				message: "Embedding value must be numeric.".to_string(),
			})?;

			vec.push(number as f32);
		}

		indexed.push((index, vec));
	}

	indexed.sort_by_key(|(index, _)| *index);

	Ok(indexed.into_iter().map(|(_, vec)| vec).collect())
}
