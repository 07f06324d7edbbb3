use std::future::IntoFuture;

use axum::{Json, Router, http::StatusCode, response::IntoResponse, routing};
use reqwest::header::AUTHORIZATION;
use serde_json::{Map, Value};
use tokio::{net::TcpListener, sync::oneshot};

use quill_config::{EmbeddingProviderConfig, LlmProviderConfig};
use quill_providers::{
	EmbeddingClient, Error, GenerationClient, HttpEmbeddingClient, HttpGenerationClient,
};

async fn start_server(app: Router) -> (String, oneshot::Sender<()>) {
	let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind test server.");
	let addr = listener.local_addr().expect("Failed to read test server address.");
	let (tx, rx) = oneshot::channel();
	let server = axum::serve(listener, app).with_graceful_shutdown(async move {
		let _ = rx.await;
	});

	tokio::spawn(async move {
		let _ = server.into_future().await;
	});

	(format!("http://{addr}"), tx)
}

fn embedding_config(api_base: String, api_key: Option<&str>) -> EmbeddingProviderConfig {
	EmbeddingProviderConfig {
		provider_id: "test".to_string(),
		api_base,
		api_key: api_key.map(str::to_string),
		path: "/embeddings".to_string(),
		model: "embed".to_string(),
		dimensions: 3,
		timeout_ms: 2_000,
		default_headers: Map::new(),
	}
}

fn generation_config(api_base: String) -> LlmProviderConfig {
	LlmProviderConfig {
		provider_id: "test".to_string(),
		api_base,
		api_key: None,
		path: "/chat".to_string(),
		model: "chat".to_string(),
		temperature: 0.0,
		timeout_ms: 2_000,
		default_headers: Map::new(),
	}
}

async fn embed_handler(Json(payload): Json<Value>) -> impl IntoResponse {
	let inputs = payload.get("input").and_then(Value::as_array).cloned().unwrap_or_default();
	let data: Vec<Value> = inputs
		.iter()
		.enumerate()
		.map(|(index, _)| serde_json::json!({ "index": index, "embedding": [0.25, 0.5, 1.0] }))
		.collect();

	Json(serde_json::json!({ "data": data }))
}

async fn chat_handler(Json(payload): Json<Value>) -> impl IntoResponse {
	let prompt = payload
		.pointer("/messages/0/content")
		.and_then(Value::as_str)
		.unwrap_or_default()
		.to_string();

	Json(serde_json::json!({
		"choices": [{ "message": { "role": "assistant", "content": format!("echo: {prompt}") } }]
	}))
}

#[test]
fn builds_bearer_auth_header() {
	let headers = quill_providers::auth_headers(Some("secret"), &Map::new())
		.expect("Failed to build headers.");
	let value = headers.get(AUTHORIZATION).expect("Missing authorization header.");

	assert_eq!(value, "Bearer secret");
}

#[test]
fn omits_auth_header_without_key() {
	let headers = quill_providers::auth_headers(None, &Map::new()).expect("Failed to build headers.");

	assert!(headers.get(AUTHORIZATION).is_none());
}

#[test]
fn rejects_non_string_default_headers() {
	let mut extra = Map::new();

	extra.insert("x-retries".to_string(), Value::from(3));

	assert!(matches!(
		quill_providers::auth_headers(None, &extra),
		Err(Error::InvalidConfig { .. })
	));
}

#[tokio::test]
async fn embeds_through_http_endpoint() {
	let (base, shutdown) =
		start_server(Router::new().route("/embeddings", routing::post(embed_handler))).await;
	let client = HttpEmbeddingClient::new(embedding_config(base, Some("key")))
		.expect("Failed to build embedding client.");
	let vector = client.embed("Paris in June").await.expect("Embedding request failed.");

	assert_eq!(vector, vec![0.25, 0.5, 1.0]);

	let _ = shutdown.send(());
}

#[tokio::test]
async fn unauthorized_maps_to_invalid_credentials() {
	let app = Router::new()
		.route("/embeddings", routing::post(|| async { StatusCode::UNAUTHORIZED.into_response() }));
	let (base, shutdown) = start_server(app).await;
	let client = HttpEmbeddingClient::new(embedding_config(base, Some("wrong")))
		.expect("Failed to build embedding client.");
	let err = client.embed("text").await.expect_err("Expected unauthorized error.");

	assert!(matches!(err, Error::InvalidCredentials { status: 401, .. }));
	assert!(!err.is_transient());

	let _ = shutdown.send(());
}

#[tokio::test]
async fn server_error_maps_to_model_unavailable() {
	let app = Router::new().route(
		"/embeddings",
		routing::post(|| async { StatusCode::SERVICE_UNAVAILABLE.into_response() }),
	);
	let (base, shutdown) = start_server(app).await;
	let client = HttpEmbeddingClient::new(embedding_config(base, None))
		.expect("Failed to build embedding client.");
	let err = client.embed("text").await.expect_err("Expected unavailable error.");

	assert!(matches!(err, Error::ModelUnavailable { .. }));
	assert!(err.is_transient());

	let _ = shutdown.send(());
}

#[tokio::test]
async fn generates_single_turn_answer() {
	let (base, shutdown) =
		start_server(Router::new().route("/chat", routing::post(chat_handler))).await;
	let client = HttpGenerationClient::new(generation_config(base))
		.expect("Failed to build generation client.");
	let answer = client.generate("Where in June?").await.expect("Generation request failed.");

	assert_eq!(answer, "echo: Where in June?");

	let _ = shutdown.send(());
}
