use std::{
	sync::{Arc, Mutex},
	time::Duration,
};

use uuid::Uuid;

use quill_config::VectorMetric;
use quill_providers::{EmbeddingClient, GenerationClient};
use quill_queue::{BoxFuture, IndexingRequest, MemoryChannel, Publisher, RetryPolicy};
use quill_service::{
	AskRequest, CreateNoteRequest, CreateNotebookRequest, DeleteNoteRequest,
	DeleteNotebookRequest, Error, IndexingProducer, MoveNoteRequest, Providers, QuillService,
	ReindexRequest, RenameNotebookRequest, SearchRequest, UpdateNoteRequest,
};
use quill_storage::{MemoryStore, VectorStore};
use quill_testkit::stubs::{
	FailureKind, FixedEmbedding, FlakyEmbedding, KeywordEmbedding, RecordingGeneration,
};
use quill_worker::{IndexingWorker, WorkerHandle};

const KEYWORDS: [&str; 4] = ["rust", "pasta", "tomato", "garden"];

struct Harness {
	store: MemoryStore,
	channel: MemoryChannel,
	service: QuillService,
	generation: Arc<RecordingGeneration>,
	worker: WorkerHandle,
	published: usize,
}
impl Harness {
	async fn start() -> Self {
		Self::with_embedding(Arc::new(KeywordEmbedding::new(&KEYWORDS))).await
	}

	async fn with_embedding(embedding: Arc<dyn EmbeddingClient>) -> Self {
		let store = MemoryStore::new(KEYWORDS.len() as u32, VectorMetric::L2);
		let channel =
			MemoryChannel::new(RetryPolicy { max_attempts: 3, base_backoff_ms: 1, max_backoff_ms: 5 });
		let generation = Arc::new(RecordingGeneration::replying("Boil the pasta."));
		let worker = IndexingWorker::new(
			Arc::new(store.clone()),
			Arc::new(KeywordEmbedding::new(&KEYWORDS)),
			&quill_config::Worker::default(),
		)
		.consume(&channel)
		.await
		.expect("consume");
		let service = QuillService::new(
			Arc::new(store.clone()),
			Providers::new(embedding, generation.clone()),
			IndexingProducer::new(Arc::new(channel.clone())),
		);

		Self { store, channel, service, generation, worker, published: 0 }
	}

	async fn note(&mut self, title: &str, content: &str, notebook_id: Option<Uuid>) -> Uuid {
		let created = self
			.service
			.create_note(CreateNoteRequest {
				title: title.to_string(),
				content: content.to_string(),
				notebook_id,
			})
			.await
			.expect("create note");

		self.published += 1;

		created.note_id
	}

	/// Waits until every request published so far has been handled.
	async fn settle(&self) {
		tokio::time::timeout(Duration::from_secs(10), self.channel.wait_for_settled(self.published))
			.await
			.expect("Indexing did not settle in time.");
	}

	async fn stop(self) {
		self.worker.shutdown().await.expect("shutdown");
	}
}

#[derive(Default)]
struct RecordingPublisher {
	requests: Mutex<Vec<IndexingRequest>>,
}
impl RecordingPublisher {
	fn requests(&self) -> Vec<(Uuid, bool)> {
		self.requests
			.lock()
			.expect("lock")
			.iter()
			.map(|req| (req.note_id, req.delete_old_embedding))
			.collect()
	}
}
impl Publisher for RecordingPublisher {
	fn publish<'a>(&'a self, payload: &'a [u8]) -> BoxFuture<'a, quill_queue::Result<()>> {
		Box::pin(async move {
			let req = IndexingRequest::decode(payload)?;

			self.requests.lock().expect("lock").push(req);

			Ok(())
		})
	}
}

fn offline_service(producer: IndexingProducer) -> (MemoryStore, QuillService) {
	let store = MemoryStore::new(KEYWORDS.len() as u32, VectorMetric::L2);
	let generation: Arc<dyn GenerationClient> = Arc::new(RecordingGeneration::replying("ok"));
	let service = QuillService::new(
		Arc::new(store.clone()),
		Providers::new(Arc::new(KeywordEmbedding::new(&KEYWORDS)), generation),
		producer,
	);

	(store, service)
}

#[tokio::test]
async fn created_notes_become_searchable_nearest_first() {
	let mut harness = Harness::start().await;
	let exact = harness.note("Rust", "notes", None).await;
	let double = harness.note("Rust rust", "deep dive", None).await;
	let mut others = Vec::new();

	for idx in 0..4 {
		others.push(harness.note(&format!("Pasta {idx}"), "tomato sauce", None).await);
	}

	harness.settle().await;

	let res = harness
		.service
		.search(SearchRequest { query: "  rust ".to_string() })
		.await
		.expect("search");

	assert_eq!(res.items.len(), 5);
	assert_eq!(res.items[0].note_id, exact);
	assert_eq!(res.items[0].title, "Rust");
	assert_eq!(res.items[0].distance, 0.0);
	assert_eq!(res.items[1].note_id, double);
	assert!(res.items.windows(2).all(|pair| pair[0].distance <= pair[1].distance));

	harness.stop().await;
}

#[tokio::test]
async fn empty_query_is_rejected() {
	let harness = Harness::start().await;
	let res = harness.service.search(SearchRequest { query: " \n".to_string() }).await;

	assert!(matches!(res, Err(Error::InvalidRequest { .. })));

	harness.stop().await;
}

#[tokio::test]
async fn query_embedding_failure_is_reported() {
	let harness = Harness::with_embedding(Arc::new(FlakyEmbedding::new(
		Arc::new(KeywordEmbedding::new(&KEYWORDS)),
		1,
		FailureKind::Unavailable,
	)))
	.await;
	let res = harness.service.search(SearchRequest { query: "rust".to_string() }).await;

	assert!(matches!(res, Err(Error::EmbeddingUnavailable { .. })));

	harness.stop().await;
}

#[tokio::test]
async fn unusable_query_vectors_are_reported_as_embedding_failures() {
	for vector in [vec![f32::INFINITY; 4], vec![1.0, 0.0], vec![f32::NAN, 0.0, 0.0, 0.0]] {
		let harness = Harness::with_embedding(Arc::new(FixedEmbedding::new(vector))).await;
		let search = harness.service.search(SearchRequest { query: "rust".to_string() }).await;
		let ask = harness.service.ask(AskRequest { question: "rust?".to_string() }).await;

		assert!(matches!(search, Err(Error::EmbeddingUnavailable { .. })));
		assert!(matches!(ask, Err(Error::EmbeddingUnavailable { .. })));
		assert!(harness.generation.prompts().is_empty());

		harness.stop().await;
	}
}

#[tokio::test]
async fn ask_sends_numbered_references_in_distance_order() {
	let mut harness = Harness::start().await;
	let pasta = harness.note("Pasta", "Boil for nine minutes.", None).await;
	let garden = harness.note("Garden", "Water daily.", None).await;

	harness.settle().await;

	let res = harness
		.service
		.ask(AskRequest { question: "How long to cook pasta?".to_string() })
		.await
		.expect("ask");

	assert_eq!(res.answer, "Boil the pasta.");
	assert_eq!(res.references, vec![pasta, garden]);
	assert_eq!(
		harness.generation.prompts(),
		vec![
			"Given references and question below. Answer the question directly without asking again \
			 with question language\n\nReference 1\nPasta\nBoil for nine minutes.\nReference 2\nGarden\n\
			 Water daily.\n\nQuestion:\nHow long to cook pasta?\n\nYour answer: ..."
				.to_string()
		]
	);

	harness.stop().await;
}

#[tokio::test]
async fn ask_without_indexed_notes_still_prompts() {
	let harness = Harness::start().await;
	let res = harness
		.service
		.ask(AskRequest { question: "Anything?".to_string() })
		.await
		.expect("ask");

	assert!(res.references.is_empty());

	let prompts = harness.generation.prompts();

	assert_eq!(prompts.len(), 1);
	assert!(prompts[0].contains("question language\n\n\n\nQuestion:\nAnything?"));

	harness.stop().await;
}

#[tokio::test]
async fn generation_failure_is_reported() {
	let store = MemoryStore::new(KEYWORDS.len() as u32, VectorMetric::L2);
	let service = QuillService::new(
		Arc::new(store),
		Providers::new(
			Arc::new(KeywordEmbedding::new(&KEYWORDS)),
			Arc::new(RecordingGeneration::failing()),
		),
		IndexingProducer::disabled(),
	);
	let res = service.ask(AskRequest { question: "rust?".to_string() }).await;

	assert!(matches!(res, Err(Error::GenerationUnavailable { .. })));
}

#[tokio::test]
async fn mutations_publish_expected_flags() {
	let publisher = Arc::new(RecordingPublisher::default());
	let (_, service) = offline_service(IndexingProducer::new(publisher.clone()));
	let notebook = service
		.create_notebook(CreateNotebookRequest { name: "Kitchen".to_string(), parent_id: None })
		.await
		.expect("notebook");
	let note_id = service
		.create_note(CreateNoteRequest {
			title: "Pasta".to_string(),
			content: "tomato".to_string(),
			notebook_id: None,
		})
		.await
		.expect("create")
		.note_id;

	service
		.update_note(UpdateNoteRequest {
			note_id,
			title: "Pasta".to_string(),
			content: "tomato basil".to_string(),
		})
		.await
		.expect("update");
	service
		.move_note(MoveNoteRequest { note_id, notebook_id: Some(notebook.notebook_id) })
		.await
		.expect("move");
	service.delete_note(DeleteNoteRequest { note_id }).await.expect("delete");

	assert_eq!(publisher.requests(), vec![(note_id, false), (note_id, true), (note_id, true)]);
}

#[tokio::test]
async fn mutations_succeed_without_publisher() {
	let (store, service) = offline_service(IndexingProducer::disabled());
	let note_id = service
		.create_note(CreateNoteRequest {
			title: "Rust".to_string(),
			content: "ownership".to_string(),
			notebook_id: None,
		})
		.await
		.expect("create")
		.note_id;

	assert!(store.live_embeddings(note_id).await.expect("live").is_empty());

	let res = service.reindex(ReindexRequest { note_ids: vec![note_id], notebook_id: None }).await;

	assert!(matches!(res, Err(Error::Queue { .. })));
}

#[tokio::test]
async fn invalid_mutations_are_rejected() {
	let (_, service) = offline_service(IndexingProducer::disabled());
	let blank = service
		.create_note(CreateNoteRequest {
			title: "  ".to_string(),
			content: "body".to_string(),
			notebook_id: None,
		})
		.await;

	assert!(matches!(blank, Err(Error::InvalidRequest { .. })));

	let missing = service
		.move_note(MoveNoteRequest { note_id: Uuid::new_v4(), notebook_id: None })
		.await;

	assert!(matches!(missing, Err(Error::NotFound { .. })));

	let orphan = service
		.create_note(CreateNoteRequest {
			title: "Orphan".to_string(),
			content: String::new(),
			notebook_id: Some(Uuid::new_v4()),
		})
		.await;

	assert!(matches!(orphan, Err(Error::NotFound { .. })));
}

#[tokio::test]
async fn reindex_publishes_listed_and_notebook_notes_once() {
	let publisher = Arc::new(RecordingPublisher::default());
	let (_, service) = offline_service(IndexingProducer::new(publisher.clone()));
	let notebook_id = service
		.create_notebook(CreateNotebookRequest { name: "Kitchen".to_string(), parent_id: None })
		.await
		.expect("notebook")
		.notebook_id;
	let inside = service
		.create_note(CreateNoteRequest {
			title: "Pasta".to_string(),
			content: String::new(),
			notebook_id: Some(notebook_id),
		})
		.await
		.expect("create")
		.note_id;
	let outside = service
		.create_note(CreateNoteRequest {
			title: "Rust".to_string(),
			content: String::new(),
			notebook_id: None,
		})
		.await
		.expect("create")
		.note_id;
	let res = service
		.reindex(ReindexRequest { note_ids: vec![inside, outside], notebook_id: Some(notebook_id) })
		.await
		.expect("reindex");

	assert_eq!(res.published, 2);
	assert_eq!(&publisher.requests()[2..], &[(inside, true), (outside, true)]);

	let missing =
		service.reindex(ReindexRequest { note_ids: vec![Uuid::new_v4()], notebook_id: None }).await;

	assert!(matches!(missing, Err(Error::NotFound { .. })));
}

#[tokio::test]
async fn renamed_notebook_is_reflected_in_source_text() {
	let mut harness = Harness::start().await;
	let notebook_id = harness
		.service
		.create_notebook(CreateNotebookRequest { name: "Kitchen".to_string(), parent_id: None })
		.await
		.expect("notebook")
		.notebook_id;
	let note_id = harness.note("Herbs", "basil", Some(notebook_id)).await;

	harness.settle().await;

	let res = harness
		.service
		.rename_notebook(RenameNotebookRequest { notebook_id, name: "Garden".to_string() })
		.await
		.expect("rename");

	assert_eq!(res.reindexed, 1);

	harness.published += 1;
	harness.settle().await;

	let live = harness.store.live_embeddings(note_id).await.expect("live");

	assert_eq!(live.len(), 1);
	assert!(live[0].source_text.starts_with("Notebook: Garden\nTitle: Herbs\n"));

	let hits = harness
		.service
		.search(SearchRequest { query: "garden".to_string() })
		.await
		.expect("search");

	assert_eq!(hits.items[0].note_id, note_id);
	assert_eq!(hits.items[0].distance, 0.0);

	harness.stop().await;
}

#[tokio::test]
async fn deleted_notes_leave_search_results() {
	let mut harness = Harness::start().await;
	let notebook_id = harness
		.service
		.create_notebook(CreateNotebookRequest { name: "Scratch".to_string(), parent_id: None })
		.await
		.expect("notebook")
		.notebook_id;
	let kept = harness.note("Rust", "traits", None).await;
	let dropped = harness.note("Rust", "lifetimes", None).await;
	let shelved = harness.note("Rust", "macros", Some(notebook_id)).await;

	harness.settle().await;

	let deleted =
		harness.service.delete_note(DeleteNoteRequest { note_id: dropped }).await.expect("delete");

	assert_eq!(deleted.embeddings_invalidated, 1);

	let cascade = harness
		.service
		.delete_notebook(DeleteNotebookRequest { notebook_id })
		.await
		.expect("delete notebook");

	assert_eq!(cascade.notes_deleted, 1);
	assert_eq!(cascade.embeddings_invalidated, 1);

	let res = harness
		.service
		.search(SearchRequest { query: "rust".to_string() })
		.await
		.expect("search");
	let ids: Vec<Uuid> = res.items.iter().map(|item| item.note_id).collect();

	assert_eq!(ids, vec![kept]);
	assert!(!ids.contains(&shelved));

	harness.stop().await;
}
