use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

static REGISTRY_ID: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"^NCT\d{8}$").expect("Registry id pattern must compile."));

/// A registry identifier is "NCT" followed by exactly eight digits.
pub fn is_registry_id(candidate: &str) -> bool {
	REGISTRY_ID.is_match(candidate)
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SexRestriction {
	Female,
	Male,
}

/// Structured eligibility fields captured at normalization time so the scoring
/// step can screen deterministically before calling the reasoning service.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ScreeningCriteria {
	pub min_age_years: Option<i32>,
	pub max_age_years: Option<i32>,
	pub sex: Option<SexRestriction>,
	pub healthy_volunteers: bool,
}

/// One trial retrieved from the external registry, normalized into the shape
/// the rest of the pipeline consumes. Read-only during a matching run.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TrialCandidate {
	pub registry_id: String,
	pub title: String,
	pub status: String,
	#[serde(default)]
	pub conditions: Vec<String>,
	pub eligibility_summary: String,
	pub url: String,
	pub contact_name: Option<String>,
	pub contact_email: Option<String>,
	#[serde(default)]
	pub screening: ScreeningCriteria,
	pub retrieved_at: OffsetDateTime,
}
