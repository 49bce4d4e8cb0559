use std::sync::Arc;

use axum::{
	Json, Router,
	extract::{Path, State},
	http::StatusCode,
	response::{
		IntoResponse, Response,
		sse::{Event, KeepAlive, Sse},
	},
	routing::{get, post, put},
};
use futures::stream;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use trialmatch_domain::{MatchResult, PatientSummary};
use trialmatch_service::{Error as ServiceError, MatchReport};

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/patients", put(upsert_patient))
		.route("/v1/matching/runs", post(run_matching))
		.route("/v1/matching/stream/{patient_id}", get(stream_matching))
		.route("/v1/matches/{patient_id}", get(list_matches))
		.with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn upsert_patient(
	State(state): State<AppState>,
	Json(payload): Json<PatientSummary>,
) -> Result<StatusCode, ApiError> {
	state.service.upsert_patient(&payload).await?;

	Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct RunRequest {
	patient_id: Uuid,
}

async fn run_matching(
	State(state): State<AppState>,
	Json(payload): Json<RunRequest>,
) -> Result<Json<MatchReport>, ApiError> {
	let report = state.service.run_matching(payload.patient_id).await?;

	Ok(Json(report))
}

/// Progress events as SSE. The run is cancelled when the client disconnects,
/// since dropping the receiver closes the channel.
async fn stream_matching(
	State(state): State<AppState>,
	Path(patient_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
	let receiver = Arc::clone(&state.service).run_matching_streaming(patient_id)?;
	let stream = stream::unfold(receiver, |mut receiver| async move {
		let event = receiver.recv().await?;

		Some((Event::default().json_data(&event), receiver))
	});

	Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn list_matches(
	State(state): State<AppState>,
	Path(patient_id): Path<Uuid>,
) -> Result<Json<Vec<MatchResult>>, ApiError> {
	let matches = state.service.matches(patient_id).await?;

	Ok(Json(matches))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: &'static str,
	message: String,
}
impl From<ServiceError> for ApiError {
	fn from(err: ServiceError) -> Self {
		let (status, error_code) = match &err {
			ServiceError::InvalidRequest { .. } => (StatusCode::BAD_REQUEST, "invalid_request"),
			ServiceError::PatientNotFound { .. } => (StatusCode::NOT_FOUND, "patient_not_found"),
			ServiceError::MatchingInProgress { .. } =>
				(StatusCode::CONFLICT, "matching_in_progress"),
			ServiceError::RegistryUnavailable { .. } =>
				(StatusCode::BAD_GATEWAY, "registry_unavailable"),
			ServiceError::DeadlineExceeded =>
				(StatusCode::GATEWAY_TIMEOUT, "deadline_exceeded"),
			ServiceError::PersistenceFailure { .. } | ServiceError::Cancelled =>
				(StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
		};

		Self { status, error_code, message: err.to_string() }
	}
}
impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body =
			ErrorBody { error_code: self.error_code.to_string(), message: self.message };

		(self.status, Json(body)).into_response()
	}
}
