use axum::{
	body::{self, Body},
	http::{Request, StatusCode},
};
use tower::util::ServiceExt;
use uuid::Uuid;

use trialmatch_api::{routes, state::AppState};
use trialmatch_config::Config;
use trialmatch_testkit::TestDatabase;

fn test_config(dsn: &str) -> Config {
	serde_json::from_value(serde_json::json!({
		"service": {
			"http_bind": "127.0.0.1:0",
			"log_level": "info",
			"results_url_base": "https://app.example.com/matches"
		},
		"storage": {
			"postgres": { "dsn": dsn, "pool_max_conns": 2 }
		},
		"registry": { "api_base": "http://127.0.0.1:1" },
		"reasoning": {
			"api_base": "http://127.0.0.1:1",
			"api_key": "test-key",
			"model": "test-model"
		}
	}))
	.expect("Config must deserialize.")
}

async fn test_db() -> Option<TestDatabase> {
	let base_dsn = match trialmatch_testkit::env_dsn() {
		Some(value) => value,
		None => {
			eprintln!("Skipping HTTP tests; set TRIALMATCH_PG_DSN to run this test.");

			return None;
		},
	};

	Some(TestDatabase::new(&base_dsn).await.expect("Failed to create test database."))
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set TRIALMATCH_PG_DSN to run."]
async fn health_ok() {
	let Some(test_db) = test_db().await else {
		return;
	};
	let state = AppState::new(test_config(test_db.dsn()))
		.await
		.expect("Failed to initialize app state.");
	let app = routes::router(state);
	let response = app
		.oneshot(
			Request::builder()
				.uri("/health")
				.body(Body::empty())
				.expect("Failed to build request."),
		)
		.await
		.expect("Failed to call /health.");

	assert_eq!(response.status(), StatusCode::OK);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set TRIALMATCH_PG_DSN to run."]
async fn a_run_for_an_unknown_patient_is_a_not_found_error() {
	let Some(test_db) = test_db().await else {
		return;
	};
	let state = AppState::new(test_config(test_db.dsn()))
		.await
		.expect("Failed to initialize app state.");
	let app = routes::router(state);
	let payload = serde_json::json!({ "patient_id": Uuid::new_v4() });
	let response = app
		.oneshot(
			Request::builder()
				.method("POST")
				.uri("/v1/matching/runs")
				.header("content-type", "application/json")
				.body(Body::from(payload.to_string()))
				.expect("Failed to build request."),
		)
		.await
		.expect("Failed to call run_matching.");

	assert_eq!(response.status(), StatusCode::NOT_FOUND);

	let bytes = body::to_bytes(response.into_body(), usize::MAX)
		.await
		.expect("Failed to read response body.");
	let json: serde_json::Value = serde_json::from_slice(&bytes).expect("Failed to parse body.");

	assert_eq!(json["error_code"], "patient_not_found");

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set TRIALMATCH_PG_DSN to run."]
async fn upserting_a_patient_exposes_an_empty_match_list() {
	let Some(test_db) = test_db().await else {
		return;
	};
	let state = AppState::new(test_config(test_db.dsn()))
		.await
		.expect("Failed to initialize app state.");
	let app = routes::router(state);
	let patient_id = Uuid::new_v4();
	let payload = serde_json::json!({
		"patient_id": patient_id,
		"age": 52,
		"sex": "female",
		"conditions": ["Papillary Thyroid Carcinoma"]
	});
	let response = app
		.clone()
		.oneshot(
			Request::builder()
				.method("PUT")
				.uri("/v1/patients")
				.header("content-type", "application/json")
				.body(Body::from(payload.to_string()))
				.expect("Failed to build request."),
		)
		.await
		.expect("Failed to call upsert_patient.");

	assert_eq!(response.status(), StatusCode::NO_CONTENT);

	let response = app
		.oneshot(
			Request::builder()
				.uri(format!("/v1/matches/{patient_id}"))
				.body(Body::empty())
				.expect("Failed to build request."),
		)
		.await
		.expect("Failed to call list_matches.");

	assert_eq!(response.status(), StatusCode::OK);

	let bytes = body::to_bytes(response.into_body(), usize::MAX)
		.await
		.expect("Failed to read response body.");
	let json: serde_json::Value = serde_json::from_slice(&bytes).expect("Failed to parse body.");

	assert_eq!(json, serde_json::json!([]));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
