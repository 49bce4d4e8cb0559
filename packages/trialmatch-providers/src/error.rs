pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	InvalidHeaderName(#[from] reqwest::header::InvalidHeaderName),
	#[error(transparent)]
	InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),
	#[error("Rate limited by the provider.")]
	RateLimited { retry_after_secs: Option<u64> },
	#[error("Provider returned HTTP status {status}.")]
	Http { status: u16 },
	#[error("Provider response is missing message content.")]
	MissingContent,
	#[error("{message}")]
	InvalidConfig { message: String },
}
impl Error {
	/// Rate limits and transport failures share one retry budget; anything
	/// else is permanent for the call.
	pub fn is_retryable(&self) -> bool {
		match self {
			Self::RateLimited { .. } | Self::Reqwest(_) => true,
			Self::Http { status } => *status >= 500,
			_ => false,
		}
	}
}
