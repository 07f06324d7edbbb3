pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Message channel is unavailable: {message}")]
	ChannelUnavailable { message: String },
	#[error("Message channel is closed.")]
	Closed,
	#[error("Malformed payload: {message}")]
	MalformedPayload { message: String },
	#[error(transparent)]
	Storage(#[from] quill_storage::Error),
}
