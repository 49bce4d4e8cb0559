use uuid::Uuid;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Caller-facing taxonomy. Per-candidate scoring failures never appear here;
/// they are absorbed into zero-score results by the scoring engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Registry unavailable: {message}")]
	RegistryUnavailable { message: String },
	#[error("Patient {patient_id} was not found.")]
	PatientNotFound { patient_id: Uuid },
	#[error("A matching run is already in progress for patient {patient_id}.")]
	MatchingInProgress { patient_id: Uuid },
	#[error("Persistence failure: {message}")]
	PersistenceFailure { message: String },
	#[error("Matching run exceeded its deadline.")]
	DeadlineExceeded,
	#[error("Matching run was cancelled by the caller.")]
	Cancelled,
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
}
impl From<trialmatch_storage::Error> for Error {
	fn from(err: trialmatch_storage::Error) -> Self {
		match err {
			trialmatch_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			other => Self::PersistenceFailure { message: other.to_string() },
		}
	}
}
