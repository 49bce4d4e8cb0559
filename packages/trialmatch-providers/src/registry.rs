use std::{sync::LazyLock, time::Duration};

use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use time::OffsetDateTime;

use trialmatch_config::Registry;
use trialmatch_domain::{
	RegistryQuery, ScreeningCriteria, SexRestriction, TrialCandidate, is_registry_id,
};

use crate::{Error, Result};

/// Summary used when the raw criteria text carries no inclusion marker.
pub const ELIGIBILITY_FALLBACK: &str = "See the registry listing for full eligibility criteria.";

const INCLUSION_LINES: usize = 3;

static INCLUSION_MARKER: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"(?i)inclusion criteria:?").expect("Inclusion marker pattern must compile.")
});
static AGE_TEXT: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"(?i)^(\d+)\s+(year|month|week|day|hour|minute)s?$")
		.expect("Age text pattern must compile.")
});

/// Executes one query against the registry's v2 study search and normalizes
/// every well-formed record. A non-success response is a single failure for
/// the call; retry policy belongs to the caller.
pub async fn search(cfg: &Registry, query: &RegistryQuery) -> Result<Vec<TrialCandidate>> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let mut request = client
		.get(&url)
		.query(&[("filter.overallStatus", "RECRUITING"), ("format", "json")])
		.query(&[("pageSize", query.page_size)]);

	if let Some(expression) = query.condition_expression() {
		request = request.query(&[("query.cond", expression)]);
	}

	let response = request.send().await?;
	let status = response.status();

	if !status.is_success() {
		return Err(Error::Http { status: status.as_u16() });
	}

	let page: StudyPage = response.json().await?;
	let retrieved_at = OffsetDateTime::now_utc();
	let total = page.studies.len();
	let candidates =
		page.studies.into_iter().filter_map(|study| normalize(study, retrieved_at)).collect::<Vec<_>>();

	if candidates.len() < total {
		tracing::debug!(
			skipped = total - candidates.len(),
			"Skipped registry records without a valid registry id."
		);
	}

	Ok(candidates)
}

#[derive(Debug, Default, Deserialize)]
struct StudyPage {
	#[serde(default)]
	studies: Vec<Study>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Study {
	#[serde(default)]
	protocol_section: ProtocolSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProtocolSection {
	#[serde(default)]
	identification_module: IdentificationModule,
	#[serde(default)]
	status_module: StatusModule,
	#[serde(default)]
	conditions_module: ConditionsModule,
	#[serde(default)]
	eligibility_module: EligibilityModule,
	#[serde(default)]
	contacts_locations_module: ContactsLocationsModule,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentificationModule {
	nct_id: Option<String>,
	brief_title: Option<String>,
	official_title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusModule {
	overall_status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ConditionsModule {
	#[serde(default)]
	conditions: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EligibilityModule {
	eligibility_criteria: Option<String>,
	sex: Option<String>,
	minimum_age: Option<String>,
	maximum_age: Option<String>,
	#[serde(default)]
	healthy_volunteers: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContactsLocationsModule {
	#[serde(default)]
	central_contacts: Vec<Contact>,
}

#[derive(Debug, Default, Deserialize)]
struct Contact {
	name: Option<String>,
	email: Option<String>,
}

fn normalize(study: Study, retrieved_at: OffsetDateTime) -> Option<TrialCandidate> {
	let protocol = study.protocol_section;
	let registry_id = protocol.identification_module.nct_id?;

	if !is_registry_id(&registry_id) {
		return None;
	}

	let title = protocol
		.identification_module
		.brief_title
		.or(protocol.identification_module.official_title)
		.unwrap_or_else(|| "Untitled study".to_string());
	let status = protocol
		.status_module
		.overall_status
		.map(|status| status.to_lowercase())
		.unwrap_or_else(|| "unknown".to_string());
	let screening = screening_criteria(&protocol.eligibility_module);
	let eligibility_summary = eligibility_summary(&protocol.eligibility_module, &screening);
	let contact = protocol
		.contacts_locations_module
		.central_contacts
		.into_iter()
		.find(|contact| contact.name.is_some() || contact.email.is_some());
	let (contact_name, contact_email) =
		contact.map(|contact| (contact.name, contact.email)).unwrap_or((None, None));
	let url = format!("https://clinicaltrials.gov/study/{registry_id}");

	Some(TrialCandidate {
		registry_id,
		title,
		status,
		conditions: protocol.conditions_module.conditions,
		eligibility_summary,
		url,
		contact_name,
		contact_email,
		screening,
		retrieved_at,
	})
}

fn screening_criteria(eligibility: &EligibilityModule) -> ScreeningCriteria {
	ScreeningCriteria {
		min_age_years: eligibility.minimum_age.as_deref().and_then(parse_age_years),
		max_age_years: eligibility.maximum_age.as_deref().and_then(parse_age_years),
		sex: eligibility.sex.as_deref().and_then(parse_sex_restriction),
		healthy_volunteers: eligibility.healthy_volunteers,
	}
}

/// Parses registry age strings such as "18 Years" or "6 Months" into whole
/// years, flooring sub-year units to zero.
fn parse_age_years(raw: &str) -> Option<i32> {
	let captures = AGE_TEXT.captures(raw.trim())?;
	let amount: i32 = captures.get(1)?.as_str().parse().ok()?;
	let unit = captures.get(2)?.as_str().to_lowercase();

	match unit.as_str() {
		"year" => Some(amount),
		"month" => Some(amount / 12),
		_ => Some(0),
	}
}

fn parse_sex_restriction(raw: &str) -> Option<SexRestriction> {
	match raw.trim().to_uppercase().as_str() {
		"FEMALE" => Some(SexRestriction::Female),
		"MALE" => Some(SexRestriction::Male),
		_ => None,
	}
}

fn eligibility_summary(eligibility: &EligibilityModule, screening: &ScreeningCriteria) -> String {
	let mut parts = Vec::new();

	match (eligibility.minimum_age.as_deref(), eligibility.maximum_age.as_deref()) {
		(Some(min), Some(max)) => parts.push(format!("Age range: {min} to {max}.")),
		(Some(min), None) => parts.push(format!("Minimum age: {min}.")),
		(None, Some(max)) => parts.push(format!("Maximum age: {max}.")),
		(None, None) => {},
	}

	match screening.sex {
		Some(SexRestriction::Female) => parts.push("Sex: Female.".to_string()),
		Some(SexRestriction::Male) => parts.push("Sex: Male.".to_string()),
		None => {},
	}

	if screening.healthy_volunteers {
		parts.push("Accepts healthy volunteers.".to_string());
	}

	match eligibility.eligibility_criteria.as_deref().and_then(inclusion_lines) {
		Some(lines) => parts.push(lines),
		None => parts.push(ELIGIBILITY_FALLBACK.to_string()),
	}

	parts.join("\n")
}

/// The first three non-empty lines following the inclusion-criteria marker.
fn inclusion_lines(criteria: &str) -> Option<String> {
	let marker = INCLUSION_MARKER.find(criteria)?;
	let rest = &criteria[marker.end()..];
	let lines = rest
		.lines()
		.map(str::trim)
		.filter(|line| !line.is_empty())
		.take(INCLUSION_LINES)
		.collect::<Vec<_>>();

	if lines.is_empty() {
		return None;
	}

	Some(lines.join("\n"))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn study_json(nct_id: &str) -> serde_json::Value {
		serde_json::json!({
			"protocolSection": {
				"identificationModule": {
					"nctId": nct_id,
					"briefTitle": "A Study of Something"
				},
				"statusModule": { "overallStatus": "RECRUITING" },
				"conditionsModule": { "conditions": ["Papillary Thyroid Carcinoma"] },
				"eligibilityModule": {
					"eligibilityCriteria": "Inclusion Criteria:\n\n* Adults with confirmed diagnosis\n* ECOG 0-1\n* Measurable disease\n* No prior systemic therapy\n\nExclusion Criteria:\n\n* Pregnancy",
					"sex": "ALL",
					"minimumAge": "18 Years",
					"maximumAge": "75 Years",
					"healthyVolunteers": false
				},
				"contactsLocationsModule": {
					"centralContacts": [
						{ "role": "CONTACT" },
						{ "name": "Study Coordinator", "email": "coordinator@example.org" }
					]
				}
			}
		})
	}

	fn parse_study(json: serde_json::Value) -> Study {
		serde_json::from_value(json).expect("Study JSON must deserialize.")
	}

	#[test]
	fn normalizes_a_complete_study_record() {
		let study = parse_study(study_json("NCT01234567"));
		let candidate =
			normalize(study, OffsetDateTime::UNIX_EPOCH).expect("Candidate must normalize.");

		assert_eq!(candidate.registry_id, "NCT01234567");
		assert_eq!(candidate.title, "A Study of Something");
		assert_eq!(candidate.status, "recruiting");
		assert_eq!(candidate.conditions, vec!["Papillary Thyroid Carcinoma"]);
		assert_eq!(candidate.url, "https://clinicaltrials.gov/study/NCT01234567");
		assert_eq!(candidate.contact_name.as_deref(), Some("Study Coordinator"));
		assert_eq!(candidate.contact_email.as_deref(), Some("coordinator@example.org"));
		assert_eq!(candidate.screening.min_age_years, Some(18));
		assert_eq!(candidate.screening.max_age_years, Some(75));
		assert_eq!(candidate.screening.sex, None);
		assert!(!candidate.screening.healthy_volunteers);
	}

	#[test]
	fn summary_takes_three_inclusion_lines_after_the_marker() {
		let study = parse_study(study_json("NCT01234567"));
		let candidate =
			normalize(study, OffsetDateTime::UNIX_EPOCH).expect("Candidate must normalize.");

		assert!(candidate.eligibility_summary.contains("Age range: 18 Years to 75 Years."));
		assert!(candidate.eligibility_summary.contains("* Adults with confirmed diagnosis"));
		assert!(candidate.eligibility_summary.contains("* ECOG 0-1"));
		assert!(candidate.eligibility_summary.contains("* Measurable disease"));
		assert!(!candidate.eligibility_summary.contains("No prior systemic therapy"));
		assert!(!candidate.eligibility_summary.contains("Pregnancy"));
	}

	#[test]
	fn summary_falls_back_when_no_inclusion_marker_exists() {
		let mut json = study_json("NCT01234567");

		json["protocolSection"]["eligibilityModule"]["eligibilityCriteria"] =
			serde_json::json!("Participants must be enrolled at a partner site.");

		let candidate = normalize(parse_study(json), OffsetDateTime::UNIX_EPOCH)
			.expect("Candidate must normalize.");

		assert!(candidate.eligibility_summary.contains(ELIGIBILITY_FALLBACK));
	}

	#[test]
	fn sex_restriction_appears_in_summary_only_when_restricted() {
		let mut json = study_json("NCT01234567");

		json["protocolSection"]["eligibilityModule"]["sex"] = serde_json::json!("FEMALE");

		let candidate = normalize(parse_study(json), OffsetDateTime::UNIX_EPOCH)
			.expect("Candidate must normalize.");

		assert_eq!(candidate.screening.sex, Some(SexRestriction::Female));
		assert!(candidate.eligibility_summary.contains("Sex: Female."));
	}

	#[test]
	fn records_without_a_valid_registry_id_are_skipped() {
		assert!(normalize(parse_study(study_json("NCT123")), OffsetDateTime::UNIX_EPOCH).is_none());

		let mut json = study_json("NCT01234567");

		json["protocolSection"]["identificationModule"]["nctId"] = serde_json::Value::Null;

		assert!(normalize(parse_study(json), OffsetDateTime::UNIX_EPOCH).is_none());
	}

	#[test]
	fn age_strings_parse_into_whole_years() {
		assert_eq!(parse_age_years("18 Years"), Some(18));
		assert_eq!(parse_age_years("1 Year"), Some(1));
		assert_eq!(parse_age_years("6 Months"), Some(0));
		assert_eq!(parse_age_years("30 Months"), Some(2));
		assert_eq!(parse_age_years("12 Weeks"), Some(0));
		assert_eq!(parse_age_years("N/A"), None);
	}

	#[test]
	fn missing_modules_still_normalize_with_defaults() {
		let json = serde_json::json!({
			"protocolSection": {
				"identificationModule": { "nctId": "NCT00000001" }
			}
		});
		let candidate = normalize(parse_study(json), OffsetDateTime::UNIX_EPOCH)
			.expect("Candidate must normalize.");

		assert_eq!(candidate.title, "Untitled study");
		assert_eq!(candidate.status, "unknown");
		assert!(candidate.conditions.is_empty());
		assert_eq!(candidate.eligibility_summary, ELIGIBILITY_FALLBACK);
		assert_eq!(candidate.contact_name, None);
	}
}
