//! Deterministic and instrumented provider stand-ins for tests that run without model servers.

use std::{
	sync::{
		Arc, Mutex,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use quill_providers::{BoxFuture, EmbeddingClient, Error, GenerationClient, Result};

/// Counts case-insensitive keyword occurrences; dimension `i` is the count of `keywords[i]`.
pub struct KeywordEmbedding {
	keywords: Vec<String>,
}
impl KeywordEmbedding {
	pub fn new(keywords: &[&str]) -> Self {
		Self { keywords: keywords.iter().map(|keyword| keyword.to_lowercase()).collect() }
	}

	pub fn dim(&self) -> u32 {
		self.keywords.len() as u32
	}

	pub fn vectorize(&self, text: &str) -> Vec<f32> {
		let lowered = text.to_lowercase();

		self.keywords.iter().map(|keyword| lowered.matches(keyword.as_str()).count() as f32).collect()
	}
}
impl EmbeddingClient for KeywordEmbedding {
	fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>>> {
		Box::pin(async move { Ok(self.vectorize(text)) })
	}
}

/// Returns the same vector for every input.
pub struct FixedEmbedding {
	vector: Vec<f32>,
}
impl FixedEmbedding {
	pub fn new(vector: Vec<f32>) -> Self {
		Self { vector }
	}
}
impl EmbeddingClient for FixedEmbedding {
	fn embed<'a>(&'a self, _: &'a str) -> BoxFuture<'a, Result<Vec<f32>>> {
		Box::pin(async move { Ok(self.vector.clone()) })
	}
}

/// Records the highest number of overlapping `embed` calls.
pub struct ConcurrencyProbe {
	inner: Arc<dyn EmbeddingClient>,
	delay: Duration,
	in_flight: AtomicUsize,
	max_in_flight: AtomicUsize,
	calls: AtomicUsize,
}
impl ConcurrencyProbe {
	pub fn new(inner: Arc<dyn EmbeddingClient>, delay: Duration) -> Self {
		Self {
			inner,
			delay,
			in_flight: AtomicUsize::new(0),
			max_in_flight: AtomicUsize::new(0),
			calls: AtomicUsize::new(0),
		}
	}

	pub fn max_in_flight(&self) -> usize {
		self.max_in_flight.load(Ordering::SeqCst)
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}
impl EmbeddingClient for ConcurrencyProbe {
	fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>>> {
		Box::pin(async move {
			let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;

			self.max_in_flight.fetch_max(now, Ordering::SeqCst);
			self.calls.fetch_add(1, Ordering::SeqCst);

			tokio::time::sleep(self.delay).await;

			let result = self.inner.embed(text).await;

			self.in_flight.fetch_sub(1, Ordering::SeqCst);

			result
		})
	}
}

#[derive(Debug, Clone, Copy)]
pub enum FailureKind {
	Unavailable,
	Credentials,
}

/// Fails the first `failures` calls, then delegates.
pub struct FlakyEmbedding {
	inner: Arc<dyn EmbeddingClient>,
	kind: FailureKind,
	remaining: AtomicUsize,
	calls: AtomicUsize,
}
impl FlakyEmbedding {
	pub fn new(inner: Arc<dyn EmbeddingClient>, failures: usize, kind: FailureKind) -> Self {
		Self { inner, kind, remaining: AtomicUsize::new(failures), calls: AtomicUsize::new(0) }
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	fn take_failure(&self) -> bool {
		self.remaining
			.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
			.is_ok()
	}
}
impl EmbeddingClient for FlakyEmbedding {
	fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>>> {
		Box::pin(async move {
			self.calls.fetch_add(1, Ordering::SeqCst);

			if self.take_failure() {
				return Err(match self.kind {
					FailureKind::Unavailable => Error::ModelUnavailable {
						provider_id: "stub".to_string(),
						message: "Injected outage.".to_string(),
					},
					FailureKind::Credentials =>
						Error::InvalidCredentials { provider_id: "stub".to_string(), status: 401 },
				});
			}

			self.inner.embed(text).await
		})
	}
}

/// Replies with a fixed answer, or fails, and keeps every prompt it was given.
pub struct RecordingGeneration {
	reply: Option<String>,
	prompts: Mutex<Vec<String>>,
}
impl RecordingGeneration {
	pub fn replying(reply: &str) -> Self {
		Self { reply: Some(reply.to_string()), prompts: Mutex::new(Vec::new()) }
	}

	pub fn failing() -> Self {
		Self { reply: None, prompts: Mutex::new(Vec::new()) }
	}

	pub fn prompts(&self) -> Vec<String> {
		self.prompts.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}
}
impl GenerationClient for RecordingGeneration {
	fn generate<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String>> {
		Box::pin(async move {
			self.prompts.lock().unwrap_or_else(|err| err.into_inner()).push(prompt.to_string());

			match &self.reply {
				Some(reply) => Ok(reply.clone()),
				None => Err(Error::ModelUnavailable {
					provider_id: "stub".to_string(),
					message: "Injected outage.".to_string(),
				}),
			}
		})
	}
}
