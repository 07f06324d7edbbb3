pub mod ask;
pub mod notes;
pub mod producer;
pub mod prompt;
pub mod search;

mod error;

pub use ask::{AskRequest, AskResponse};
pub use error::{Error, Result};
pub use notes::{
	CreateNoteRequest, CreateNotebookRequest, DeleteNoteRequest, DeleteNoteResponse,
	DeleteNotebookRequest, DeleteNotebookResponse, MoveNoteRequest, NoteResponse,
	NotebookResponse, ReindexRequest, ReindexResponse, RenameNotebookRequest,
	RenameNotebookResponse, UpdateNoteRequest,
};
pub use producer::IndexingProducer;
pub use search::{SearchItem, SearchRequest, SearchResponse};

use std::sync::Arc;

use quill_config::Retrieval;
use quill_providers::{EmbeddingClient, GenerationClient, HttpEmbeddingClient, HttpGenerationClient};
use quill_storage::{NoteStore, VectorStore};

const DEFAULT_ACTOR: &str = "System";

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingClient>,
	pub generation: Arc<dyn GenerationClient>,
}
impl Providers {
	pub fn new(embedding: Arc<dyn EmbeddingClient>, generation: Arc<dyn GenerationClient>) -> Self {
		Self { embedding, generation }
	}

	pub fn from_config(cfg: &quill_config::Providers) -> quill_providers::Result<Self> {
		Ok(Self {
			embedding: Arc::new(HttpEmbeddingClient::new(cfg.embedding.clone())?),
			generation: Arc::new(HttpGenerationClient::new(cfg.generation.clone())?),
		})
	}
}

/// Retrieval, question answering and the note mutations that feed the index.
pub struct QuillService {
	pub vectors: Arc<dyn VectorStore>,
	pub notes: Arc<dyn NoteStore>,
	pub providers: Providers,
	pub producer: IndexingProducer,
	pub retrieval: Retrieval,
	pub actor: String,
}
impl QuillService {
	pub fn new<S>(store: Arc<S>, providers: Providers, producer: IndexingProducer) -> Self
	where
		S: VectorStore + NoteStore + 'static,
	{
		Self {
			vectors: store.clone(),
			notes: store,
			providers,
			producer,
			retrieval: Retrieval::default(),
			actor: DEFAULT_ACTOR.to_string(),
		}
	}

	pub fn with_retrieval(mut self, retrieval: Retrieval) -> Self {
		self.retrieval = retrieval;

		self
	}

	pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
		self.actor = actor.into();

		self
	}
}
