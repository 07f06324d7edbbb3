pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Conflict: {message}")]
	Conflict { message: String },
	#[error("Embedding unavailable: {message}")]
	EmbeddingUnavailable { message: String },
	#[error("Generation unavailable: {message}")]
	GenerationUnavailable { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Queue error: {message}")]
	Queue { message: String },
}
impl From<quill_storage::Error> for Error {
	fn from(err: quill_storage::Error) -> Self {
		match err {
			quill_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			quill_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			quill_storage::Error::NotFound(message) => Self::NotFound { message },
			quill_storage::Error::Conflict(message) => Self::Conflict { message },
		}
	}
}

impl From<quill_queue::Error> for Error {
	fn from(err: quill_queue::Error) -> Self {
		Self::Queue { message: err.to_string() }
	}
}
