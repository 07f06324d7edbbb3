mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, EmbeddingProviderConfig, LlmProviderConfig, Postgres, Providers, Queue, Retrieval,
	Service, Storage, Vector, VectorMetric, Worker,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	parse(&raw).map_err(|err| match err {
		Error::ParseConfig { source, .. } => Error::ParseConfig { path: path.to_path_buf(), source },
		other => other,
	})
}

/// Parses, normalizes and validates a config held in memory.
pub fn parse(raw: &str) -> Result<Config> {
	let mut cfg: Config = toml::from_str(raw)
		.map_err(|err| Error::ParseConfig { path: Default::default(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.log_level.trim().is_empty() {
		return Err(validation("service.log_level must be non-empty."));
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(validation("storage.postgres.pool_max_conns must be greater than zero."));
	}
	if cfg.storage.vector.dim == 0 {
		return Err(validation("storage.vector.dim must be greater than zero."));
	}
	if cfg.providers.embedding.dimensions != cfg.storage.vector.dim {
		return Err(validation("providers.embedding.dimensions must match storage.vector.dim."));
	}
	if cfg.queue.topic.trim().is_empty() {
		return Err(validation("queue.topic must be non-empty."));
	}
	if cfg.queue.max_attempts == 0 {
		return Err(validation("queue.max_attempts must be greater than zero."));
	}
	if cfg.queue.lease_seconds <= 0 {
		return Err(validation("queue.lease_seconds must be greater than zero."));
	}
	if cfg.queue.poll_interval_ms == 0 {
		return Err(validation("queue.poll_interval_ms must be greater than zero."));
	}
	if cfg.queue.base_backoff_ms > cfg.queue.max_backoff_ms {
		return Err(validation("queue.base_backoff_ms must not exceed queue.max_backoff_ms."));
	}
	if cfg.worker.max_concurrent == 0 {
		return Err(validation("worker.max_concurrent must be greater than zero."));
	}
	if cfg.worker.actor.trim().is_empty() {
		return Err(validation("worker.actor must be non-empty."));
	}
	if cfg.retrieval.display_k == 0 {
		return Err(validation("retrieval.display_k must be greater than zero."));
	}
	if cfg.retrieval.display_k > cfg.retrieval.candidate_k {
		return Err(validation("retrieval.display_k must not exceed retrieval.candidate_k."));
	}
	if !cfg.providers.generation.temperature.is_finite() {
		return Err(validation("providers.generation.temperature must be a finite number."));
	}

	for (label, value) in [
		("providers.embedding.api_base", &cfg.providers.embedding.api_base),
		("providers.embedding.model", &cfg.providers.embedding.model),
		("providers.generation.api_base", &cfg.providers.generation.api_base),
		("providers.generation.model", &cfg.providers.generation.model),
	] {
		if value.trim().is_empty() {
			return Err(validation(&format!("{label} must be non-empty.")));
		}
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg.providers.embedding.api_key.as_deref().map(|key| key.trim().is_empty()).unwrap_or(false)
	{
		cfg.providers.embedding.api_key = None;
	}
	if cfg.providers.generation.api_key.as_deref().map(|key| key.trim().is_empty()).unwrap_or(false)
	{
		cfg.providers.generation.api_key = None;
	}

	cfg.worker.actor = cfg.worker.actor.trim().to_string();
}

fn validation(message: &str) -> Error {
	Error::Validation { message: message.to_string() }
}
