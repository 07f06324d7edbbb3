use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, QuillService, Result, prompt};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AskRequest {
	pub question: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AskResponse {
	pub answer: String,
	/// Notes passed to the model as references, in reference order.
	pub references: Vec<Uuid>,
}

impl QuillService {
	pub async fn ask(&self, req: AskRequest) -> Result<AskResponse> {
		let question = req.question.trim();

		if question.is_empty() {
			return Err(Error::InvalidRequest { message: "question must not be empty.".to_string() });
		}

		let ranked = self.retrieve(question).await?;
		let notes: Vec<_> = ranked.iter().map(|ranked| &ranked.note).collect();
		let references = prompt::build_references(&notes);
		let prompt = prompt::build_prompt(&references, question);
		let answer = self
			.providers
			.generation
			.generate(&prompt)
			.await
			.map_err(|err| Error::GenerationUnavailable { message: err.to_string() })?;

		tracing::info!(references = notes.len(), "Question answered.");

		Ok(AskResponse { answer, references: notes.iter().map(|note| note.note_id).collect() })
	}
}
