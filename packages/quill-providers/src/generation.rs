use reqwest::Client;
use serde_json::Value;

use crate::{BoxFuture, Error, GenerationClient, Result};
use quill_config::LlmProviderConfig;

/// Chat-completions endpoint driven with a single user turn.
pub struct HttpGenerationClient {
	cfg: LlmProviderConfig,
	client: Client,
}
impl HttpGenerationClient {
	pub fn new(cfg: LlmProviderConfig) -> Result<Self> {
		let client = crate::build_client(cfg.timeout_ms)?;

		Ok(Self { cfg, client })
	}

	async fn complete(&self, prompt: &str) -> Result<String> {
		let url = format!("{}{}", self.cfg.api_base, self.cfg.path);
		let body = serde_json::json!({
			"model": self.cfg.model,
			"temperature": self.cfg.temperature,
			"stream": false,
			"messages": [{ "role": "user", "content": prompt }],
		});
		let headers = crate::auth_headers(self.cfg.api_key.as_deref(), &self.cfg.default_headers)?;
		let json =
			crate::post_json(&self.client, &self.cfg.provider_id, &url, headers, &body).await?;

		parse_generation_response(&json)
	}
}
impl GenerationClient for HttpGenerationClient {
	fn generate<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String>> {
		Box::pin(self.complete(prompt))
	}
}

fn parse_generation_response(json: &Value) -> Result<String> {
	// OpenAI-style `choices[0].message`, falling back to the bare `message` object returned by
	// local chat servers.
	let message = json
		.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|choices| choices.first())
		.and_then(|choice| choice.get("message"))
		.or_else(|| json.get("message"));

	message
		.and_then(|msg| msg.get("content"))
		.and_then(|content| content.as_str())
		.map(str::to_string)
		.ok_or_else(|| Error::InvalidResponse {
			message: "Generation response is missing message content.".to_string(),
		})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_choice_content() {
		let json = serde_json::json!({
			"choices": [{ "message": { "role": "assistant", "content": "Paris." } }]
		});

		assert_eq!(parse_generation_response(&json).expect("parse failed"), "Paris.");
	}

	#[test]
	fn parses_bare_message_content() {
		let json = serde_json::json!({
			"model": "llama3.2",
			"message": { "role": "assistant", "content": "In June." },
			"done": true
		});

		assert_eq!(parse_generation_response(&json).expect("parse failed"), "In June.");
	}

	#[test]
	fn missing_content_is_invalid() {
		let json = serde_json::json!({ "choices": [] });

		assert!(matches!(parse_generation_response(&json), Err(Error::InvalidResponse { .. })));
	}
}
