use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use quill_storage::{models::Note, vector};

use crate::{Error, QuillService, Result};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchRequest {
	pub query: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchItem {
	pub note_id: Uuid,
	pub title: String,
	pub distance: f32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchResponse {
	pub items: Vec<SearchItem>,
}

pub(crate) struct RankedNote {
	pub(crate) note: Note,
	pub(crate) distance: f32,
}

impl QuillService {
	/// Nearest notes to the query, at most `display_k`, nearest first.
	pub async fn search(&self, req: SearchRequest) -> Result<SearchResponse> {
		let query = req.query.trim();

		if query.is_empty() {
			return Err(Error::InvalidRequest { message: "query must not be empty.".to_string() });
		}

		let ranked = self.retrieve(query).await?;
		let items: Vec<SearchItem> = ranked
			.into_iter()
			.take(self.retrieval.display_k as usize)
			.map(|ranked| SearchItem {
				note_id: ranked.note.note_id,
				title: ranked.note.title,
				distance: ranked.distance,
			})
			.collect();

		tracing::info!(returned = items.len(), "Search completed.");

		Ok(SearchResponse { items })
	}

	/// Candidate notes for `text`, nearest first, skipping notes that vanished since indexing.
	pub(crate) async fn retrieve(&self, text: &str) -> Result<Vec<RankedNote>> {
		let vector = self
			.providers
			.embedding
			.embed(text)
			.await
			.map_err(|err| Error::EmbeddingUnavailable { message: err.to_string() })?;

		vector::validate_vector_dim(&vector, self.vectors.dim())
			.map_err(|err| Error::EmbeddingUnavailable { message: err.to_string() })?;

		let neighbors = self.vectors.find_nearest(&vector, self.retrieval.candidate_k).await?;
		let ids: Vec<Uuid> = neighbors.iter().map(|neighbor| neighbor.note_id).collect();
		let mut notes: HashMap<Uuid, Note> = self
			.notes
			.get_notes_by_ids(&ids)
			.await?
			.into_iter()
			.map(|note| (note.note_id, note))
			.collect();
		let ranked: Vec<RankedNote> = neighbors
			.into_iter()
			.filter_map(|neighbor| {
				notes.remove(&neighbor.note_id).filter(|note| !note.is_deleted).map(|note| RankedNote {
					note,
					distance: neighbor.distance,
				})
			})
			.collect();

		tracing::debug!(candidates = ids.len(), kept = ranked.len(), "Retrieved candidate notes.");

		Ok(ranked)
	}
}
