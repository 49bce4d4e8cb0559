use sqlx::QueryBuilder;
use uuid::Uuid;

use trialmatch_domain::{MatchResult, PatientSummary, TrialCandidate};

use crate::{
	Result,
	db::Db,
	models::{MatchRow, PatientRow, TrialRow},
};

pub async fn upsert_patient(db: &Db, patient: &PatientSummary) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO patients (
	patient_id,
	age,
	age_bracket,
	sex,
	smoking_status,
	state,
	conditions,
	ai_conditions,
	extracted_conditions,
	clinical,
	updated_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, now())
ON CONFLICT (patient_id) DO UPDATE
SET
	age = EXCLUDED.age,
	age_bracket = EXCLUDED.age_bracket,
	sex = EXCLUDED.sex,
	smoking_status = EXCLUDED.smoking_status,
	state = EXCLUDED.state,
	conditions = EXCLUDED.conditions,
	ai_conditions = EXCLUDED.ai_conditions,
	extracted_conditions = EXCLUDED.extracted_conditions,
	clinical = EXCLUDED.clinical,
	updated_at = now()",
	)
	.bind(patient.patient_id)
	.bind(patient.age)
	.bind(patient.age_bracket.as_deref())
	.bind(patient.sex.as_deref())
	.bind(patient.smoking_status.as_deref())
	.bind(patient.state.as_deref())
	.bind(serde_json::to_value(&patient.conditions)?)
	.bind(serde_json::to_value(&patient.ai_conditions)?)
	.bind(serde_json::to_value(&patient.extracted_conditions)?)
	.bind(patient.clinical.as_ref().map(serde_json::to_value).transpose()?)
	.execute(&db.pool)
	.await?;

	Ok(())
}

pub async fn get_patient(db: &Db, patient_id: Uuid) -> Result<Option<PatientSummary>> {
	let row: Option<PatientRow> = sqlx::query_as(
		"\
SELECT patient_id, age, age_bracket, sex, smoking_status, state, conditions, ai_conditions,
	extracted_conditions, clinical
FROM patients
WHERE patient_id = $1",
	)
	.bind(patient_id)
	.fetch_optional(&db.pool)
	.await?;

	row.map(PatientRow::into_summary).transpose()
}

pub async fn upsert_trial(db: &Db, candidate: &TrialCandidate) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO trials (
	registry_id,
	title,
	status,
	conditions,
	eligibility_summary,
	url,
	contact_name,
	contact_email,
	screening,
	retrieved_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
ON CONFLICT (registry_id) DO UPDATE
SET
	title = EXCLUDED.title,
	status = EXCLUDED.status,
	conditions = EXCLUDED.conditions,
	eligibility_summary = EXCLUDED.eligibility_summary,
	url = EXCLUDED.url,
	contact_name = EXCLUDED.contact_name,
	contact_email = EXCLUDED.contact_email,
	screening = EXCLUDED.screening,
	retrieved_at = EXCLUDED.retrieved_at",
	)
	.bind(candidate.registry_id.as_str())
	.bind(candidate.title.as_str())
	.bind(candidate.status.as_str())
	.bind(serde_json::to_value(&candidate.conditions)?)
	.bind(candidate.eligibility_summary.as_str())
	.bind(candidate.url.as_str())
	.bind(candidate.contact_name.as_deref())
	.bind(candidate.contact_email.as_deref())
	.bind(serde_json::to_value(&candidate.screening)?)
	.bind(candidate.retrieved_at)
	.execute(&db.pool)
	.await?;

	Ok(())
}

pub async fn get_trial(db: &Db, registry_id: &str) -> Result<Option<TrialCandidate>> {
	let row: Option<TrialRow> = sqlx::query_as(
		"\
SELECT registry_id, title, status, conditions, eligibility_summary, url, contact_name,
	contact_email, screening, retrieved_at
FROM trials
WHERE registry_id = $1",
	)
	.bind(registry_id)
	.fetch_optional(&db.pool)
	.await?;

	row.map(TrialRow::into_candidate).transpose()
}

pub async fn all_trials(db: &Db) -> Result<Vec<TrialCandidate>> {
	let rows: Vec<TrialRow> = sqlx::query_as(
		"\
SELECT registry_id, title, status, conditions, eligibility_summary, url, contact_name,
	contact_email, screening, retrieved_at
FROM trials
ORDER BY registry_id",
	)
	.fetch_all(&db.pool)
	.await?;

	rows.into_iter().map(TrialRow::into_candidate).collect()
}

pub async fn delete_all_trials(db: &Db) -> Result<()> {
	sqlx::query("DELETE FROM trials").execute(&db.pool).await?;

	Ok(())
}

/// Replaces the persisted match set for one patient in a single transaction.
/// A per-patient advisory transaction lock backstops the in-process
/// single-flight guard across processes. An empty set still deletes, so a run
/// that finds no acceptable matches clears stale rows.
pub async fn replace_matches(db: &Db, patient_id: Uuid, results: &[MatchResult]) -> Result<()> {
	if results.iter().any(|result| result.patient_id != patient_id) {
		return Err(crate::Error::InvalidArgument(
			"Replacement set contains results for another patient.".to_string(),
		));
	}

	let mut tx = db.pool.begin().await?;

	sqlx::query("SELECT pg_advisory_xact_lock($1)")
		.bind(patient_lock_key(patient_id))
		.execute(&mut *tx)
		.await?;
	sqlx::query("DELETE FROM trial_matches WHERE patient_id = $1")
		.bind(patient_id)
		.execute(&mut *tx)
		.await?;

	if !results.is_empty() {
		let mut builder = QueryBuilder::new(
			"INSERT INTO trial_matches (match_id, patient_id, registry_id, confidence_score, explanation, rank, created_at) ",
		);

		builder.push_values(results.iter().enumerate(), |mut row, (rank, result)| {
			row.push_bind(result.id)
				.push_bind(result.patient_id)
				.push_bind(result.registry_id.as_str())
				.push_bind(result.confidence_score)
				.push_bind(result.explanation.as_str())
				.push_bind(rank as i32)
				.push_bind(result.created_at);
		});
		builder.build().execute(&mut *tx).await?;
	}

	tx.commit().await?;

	Ok(())
}

/// Matches in ranked order: score descending, retrieval order on ties. The
/// rank column records the order the writer persisted.
pub async fn list_matches(db: &Db, patient_id: Uuid) -> Result<Vec<MatchResult>> {
	let rows: Vec<MatchRow> = sqlx::query_as(
		"\
SELECT match_id, patient_id, registry_id, confidence_score, explanation, created_at
FROM trial_matches
WHERE patient_id = $1
ORDER BY rank",
	)
	.bind(patient_id)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows.into_iter().map(MatchRow::into_result).collect())
}

fn patient_lock_key(patient_id: Uuid) -> i64 {
	let bytes = patient_id.as_bytes();

	i64::from_be_bytes([
		bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
	])
}
