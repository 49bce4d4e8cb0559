use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use trialmatch_domain::{MatchResult, PatientSummary, TrialCandidate};

use crate::Result;

#[derive(Debug, sqlx::FromRow)]
pub struct PatientRow {
	pub patient_id: Uuid,
	pub age: Option<i32>,
	pub age_bracket: Option<String>,
	pub sex: Option<String>,
	pub smoking_status: Option<String>,
	pub state: Option<String>,
	pub conditions: Value,
	pub ai_conditions: Option<Value>,
	pub extracted_conditions: Option<Value>,
	pub clinical: Option<Value>,
}
impl PatientRow {
	pub fn into_summary(self) -> Result<PatientSummary> {
		Ok(PatientSummary {
			patient_id: self.patient_id,
			age: self.age,
			age_bracket: self.age_bracket,
			sex: self.sex,
			smoking_status: self.smoking_status,
			state: self.state,
			conditions: serde_json::from_value(self.conditions)?,
			ai_conditions: self
				.ai_conditions
				.map(serde_json::from_value)
				.transpose()?
				.unwrap_or_default(),
			extracted_conditions: self
				.extracted_conditions
				.map(serde_json::from_value)
				.transpose()?
				.unwrap_or_default(),
			clinical: self.clinical.map(serde_json::from_value).transpose()?,
		})
	}
}

#[derive(Debug, sqlx::FromRow)]
pub struct TrialRow {
	pub registry_id: String,
	pub title: String,
	pub status: String,
	pub conditions: Value,
	pub eligibility_summary: String,
	pub url: String,
	pub contact_name: Option<String>,
	pub contact_email: Option<String>,
	pub screening: Option<Value>,
	pub retrieved_at: OffsetDateTime,
}
impl TrialRow {
	pub fn into_candidate(self) -> Result<TrialCandidate> {
		Ok(TrialCandidate {
			registry_id: self.registry_id,
			title: self.title,
			status: self.status,
			conditions: serde_json::from_value(self.conditions)?,
			eligibility_summary: self.eligibility_summary,
			url: self.url,
			contact_name: self.contact_name,
			contact_email: self.contact_email,
			screening: self
				.screening
				.map(serde_json::from_value)
				.transpose()?
				.unwrap_or_default(),
			retrieved_at: self.retrieved_at,
		})
	}
}

#[derive(Debug, sqlx::FromRow)]
pub struct MatchRow {
	pub match_id: Uuid,
	pub patient_id: Uuid,
	pub registry_id: String,
	pub confidence_score: i32,
	pub explanation: String,
	pub created_at: OffsetDateTime,
}
impl MatchRow {
	pub fn into_result(self) -> MatchResult {
		MatchResult {
			id: self.match_id,
			patient_id: self.patient_id,
			registry_id: self.registry_id,
			confidence_score: self.confidence_score,
			explanation: self.explanation,
			created_at: self.created_at,
		}
	}
}
