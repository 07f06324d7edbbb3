use uuid::Uuid;

use quill_queue::Disposition;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Malformed indexing request: {message}")]
	MalformedPayload { message: String },
	#[error("Note {note_id} does not exist.")]
	NoteNotFound { note_id: Uuid },
	#[error("Embedding dimension {actual} does not match configured dimension {expected}.")]
	DimensionMismatch { expected: u32, actual: usize },
	#[error("Embedding value at index {index} is not finite.")]
	NonFiniteVector { index: usize },
	#[error("Failed to render source text: {message}")]
	SourceText { message: String },
	#[error("Worker task failed: {message}")]
	Join { message: String },
	#[error(transparent)]
	Embedding(#[from] quill_providers::Error),
	#[error(transparent)]
	Storage(#[from] quill_storage::Error),
	#[error(transparent)]
	Channel(#[from] quill_queue::Error),
}
impl Error {
	/// Whether a message that failed with this error is worth delivering again.
	pub fn disposition(&self) -> Disposition {
		match self {
			Self::MalformedPayload { .. }
			| Self::NoteNotFound { .. }
			| Self::DimensionMismatch { .. }
			| Self::NonFiniteVector { .. }
			| Self::SourceText { .. } => Disposition::DeadLetter,
			Self::Embedding(err) if !err.is_transient() => Disposition::DeadLetter,
			Self::Storage(quill_storage::Error::InvalidArgument(_)) => Disposition::DeadLetter,
			Self::Embedding(_) | Self::Storage(_) | Self::Channel(_) | Self::Join { .. } =>
				Disposition::Retry,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn terminal_errors_dead_letter() {
		let not_found = Error::NoteNotFound { note_id: Uuid::nil() };
		let credentials = Error::Embedding(quill_providers::Error::InvalidCredentials {
			provider_id: "p".to_string(),
			status: 401,
		});

		assert_eq!(not_found.disposition(), Disposition::DeadLetter);
		assert_eq!(credentials.disposition(), Disposition::DeadLetter);
		assert_eq!(
			Error::DimensionMismatch { expected: 3, actual: 2 }.disposition(),
			Disposition::DeadLetter
		);
	}

	#[test]
	fn unusable_vectors_dead_letter() {
		let rejected = Error::Storage(quill_storage::Error::InvalidArgument(
			"Embedding contains a non-finite value.".to_string(),
		));

		assert_eq!(Error::NonFiniteVector { index: 0 }.disposition(), Disposition::DeadLetter);
		assert_eq!(rejected.disposition(), Disposition::DeadLetter);
	}

	#[test]
	fn outages_retry() {
		let outage = Error::Embedding(quill_providers::Error::ModelUnavailable {
			provider_id: "p".to_string(),
			message: "503".to_string(),
		});
		let storage = Error::Storage(quill_storage::Error::Conflict("busy".to_string()));

		assert_eq!(outage.disposition(), Disposition::Retry);
		assert_eq!(storage.disposition(), Disposition::Retry);
	}
}
