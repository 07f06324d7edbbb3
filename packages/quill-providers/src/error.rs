pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// The model endpoint rejected the configured credentials.
	#[error("Invalid credentials for provider {provider_id}: HTTP {status}.")]
	InvalidCredentials { provider_id: String, status: u16 },
	/// The model endpoint could not be reached, timed out, or returned a failure status.
	#[error("Model unavailable for provider {provider_id}: {message}")]
	ModelUnavailable { provider_id: String, message: String },
	#[error("{message}")]
	InvalidResponse { message: String },
	#[error("{message}")]
	InvalidConfig { message: String },
}
impl Error {
	pub fn is_transient(&self) -> bool {
		matches!(self, Self::ModelUnavailable { .. })
	}
}
