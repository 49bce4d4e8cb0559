use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Patient attributes visible to the matching core. Name and contact data never
/// enter this type; the scoring prompt is built from it verbatim.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PatientSummary {
	pub patient_id: Uuid,
	pub age: Option<i32>,
	/// Free-text bracket such as "60-69", used when the exact age is withheld.
	pub age_bracket: Option<String>,
	pub sex: Option<String>,
	pub smoking_status: Option<String>,
	pub state: Option<String>,
	#[serde(default)]
	pub conditions: Vec<String>,
	/// AI-normalized search terms derived from the profile, if any.
	#[serde(default)]
	pub ai_conditions: Vec<String>,
	/// Terms extracted from uploaded documents, if any.
	#[serde(default)]
	pub extracted_conditions: Vec<String>,
	pub clinical: Option<ClinicalAttributes>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ClinicalAttributes {
	pub cancer_type: Option<String>,
	pub cancer_stage: Option<String>,
	#[serde(default)]
	pub biomarkers: Vec<String>,
	#[serde(default)]
	pub prior_treatments: Vec<String>,
}
impl PatientSummary {
	pub fn new(patient_id: Uuid) -> Self {
		Self {
			patient_id,
			age: None,
			age_bracket: None,
			sex: None,
			smoking_status: None,
			state: None,
			conditions: Vec::new(),
			ai_conditions: Vec::new(),
			extracted_conditions: Vec::new(),
			clinical: None,
		}
	}
}
