use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub queue: Queue,
	#[serde(default)]
	pub worker: Worker,
	#[serde(default)]
	pub retrieval: Retrieval,
	pub providers: Providers,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub vector: Vector,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Vector {
	pub dim: u32,
	#[serde(default)]
	pub metric: VectorMetric,
}

/// Distance function used for every write and query against one store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorMetric {
	#[default]
	L2,
	Cosine,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Queue {
	pub topic: String,
	#[serde(default = "default_poll_interval_ms")]
	pub poll_interval_ms: u64,
	#[serde(default = "default_lease_seconds")]
	pub lease_seconds: i64,
	#[serde(default = "default_max_attempts")]
	pub max_attempts: u32,
	#[serde(default = "default_base_backoff_ms")]
	pub base_backoff_ms: u64,
	#[serde(default = "default_max_backoff_ms")]
	pub max_backoff_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Worker {
	#[serde(default = "default_max_concurrent")]
	pub max_concurrent: usize,
	/// Takes a transaction-scoped advisory lock per note so concurrent re-indexing of the same
	/// note cannot leave two live embeddings.
	#[serde(default)]
	pub serialize_per_note: bool,
	#[serde(default = "default_actor")]
	pub actor: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Retrieval {
	#[serde(default = "default_candidate_k")]
	pub candidate_k: u32,
	#[serde(default = "default_display_k")]
	pub display_k: u32,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub generation: LlmProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	#[serde(default)]
	pub api_key: Option<String>,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	#[serde(default)]
	pub api_key: Option<String>,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

impl Default for Queue {
	fn default() -> Self {
		Self {
			topic: "embed-note-content".to_string(),
			poll_interval_ms: default_poll_interval_ms(),
			lease_seconds: default_lease_seconds(),
			max_attempts: default_max_attempts(),
			base_backoff_ms: default_base_backoff_ms(),
			max_backoff_ms: default_max_backoff_ms(),
		}
	}
}

impl Default for Worker {
	fn default() -> Self {
		Self {
			max_concurrent: default_max_concurrent(),
			serialize_per_note: false,
			actor: default_actor(),
		}
	}
}

impl Default for Retrieval {
	fn default() -> Self {
		Self { candidate_k: default_candidate_k(), display_k: default_display_k() }
	}
}

fn default_poll_interval_ms() -> u64 {
	500
}

fn default_lease_seconds() -> i64 {
	60
}

fn default_max_attempts() -> u32 {
	5
}

fn default_base_backoff_ms() -> u64 {
	500
}

fn default_max_backoff_ms() -> u64 {
	30_000
}

fn default_max_concurrent() -> usize {
	100
}

fn default_actor() -> String {
	"System".to_string()
}

fn default_candidate_k() -> u32 {
	10
}

fn default_display_k() -> u32 {
	5
}
