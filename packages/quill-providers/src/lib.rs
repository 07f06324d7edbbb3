pub mod embedding;
pub mod generation;

mod error;

pub use embedding::HttpEmbeddingClient;
pub use error::{Error, Result};
pub use generation::HttpGenerationClient;

use std::{future::Future, pin::Pin};

use reqwest::{
	Client, StatusCode,
	header::{AUTHORIZATION, HeaderMap, HeaderName},
};
use serde_json::{Map, Value};

const MAX_ERROR_BODY_CHARS: usize = 512;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Turns text into a fixed-length vector.
pub trait EmbeddingClient
where
	Self: Send + Sync,
{
	fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>>>;
}

/// Single-turn, non-streaming text generation.
pub trait GenerationClient
where
	Self: Send + Sync,
{
	fn generate<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String>>;
}

pub fn auth_headers(
	api_key: Option<&str>,
	default_headers: &Map<String, Value>,
) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	if let Some(api_key) = api_key {
		headers.insert(AUTHORIZATION, format!("Bearer {api_key}").parse().map_err(invalid_header)?);
	}

	for (key, value) in default_headers {
		let Some(raw) = value.as_str() else {
			return Err(Error::InvalidConfig {
				message: "Default header values must be strings.".to_string(),
			});
		};

		headers.insert(
			HeaderName::from_bytes(key.as_bytes()).map_err(invalid_header)?,
			raw.parse().map_err(invalid_header)?,
		);
	}

	Ok(headers)
}

pub(crate) async fn post_json(
	client: &Client,
	provider_id: &str,
	url: &str,
	headers: HeaderMap,
	body: &Value,
) -> Result<Value> {
	let res = client.post(url).headers(headers).json(body).send().await.map_err(|err| {
		Error::ModelUnavailable { provider_id: provider_id.to_string(), message: err.to_string() }
	})?;
	let status = res.status();

	if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
		return Err(Error::InvalidCredentials {
			provider_id: provider_id.to_string(),
			status: status.as_u16(),
		});
	}
	if !status.is_success() {
		let body = res.text().await.unwrap_or_default();
		let body: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();

		return Err(Error::ModelUnavailable {
			provider_id: provider_id.to_string(),
			message: format!("HTTP {}: {body}", status.as_u16()),
		});
	}

	res.json::<Value>().await.map_err(|err| Error::InvalidResponse {
		message: format!("Provider {provider_id} returned an undecodable body: {err}."),
	})
}

pub(crate) fn build_client(timeout_ms: u64) -> Result<Client> {
	Client::builder()
		.timeout(std::time::Duration::from_millis(timeout_ms))
		.build()
		.map_err(|err| Error::InvalidConfig { message: format!("Failed to build HTTP client: {err}.") })
}

fn invalid_header(err: impl std::fmt::Display) -> Error {
	Error::InvalidConfig { message: format!("Invalid provider header: {err}.") }
}
