use std::{collections::HashSet, sync::LazyLock};

use regex::Regex;

use crate::patient::PatientSummary;

static ONCOLOGY_TERM: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"(?i)\b(cancer|carcinoma|tumor|lymphoma|leukemia|melanoma|sarcoma)\b")
		.expect("Oncology lexicon pattern must compile.")
});

/// Union of profile conditions, AI-normalized terms, and document-extracted
/// terms. Case-insensitive de-duplication, first-seen order preserved.
pub fn combined_conditions(patient: &PatientSummary) -> Vec<String> {
	let mut seen = HashSet::new();
	let mut combined = Vec::new();

	for condition in patient
		.conditions
		.iter()
		.chain(patient.ai_conditions.iter())
		.chain(patient.extracted_conditions.iter())
	{
		let trimmed = condition.trim();

		if trimmed.is_empty() {
			continue;
		}
		if seen.insert(trimmed.to_lowercase()) {
			combined.push(trimmed.to_string());
		}
	}

	combined
}

/// Re-sorts conditions so the most specific diagnostic terms come first:
/// oncology-lexicon matches before non-matches, longer strings before shorter
/// within each group, otherwise retaining input order.
pub fn prioritized(conditions: &[String]) -> Vec<String> {
	let mut ordered = conditions.to_vec();

	ordered.sort_by_key(|condition| {
		let oncology = ONCOLOGY_TERM.is_match(condition);

		(std::cmp::Reverse(oncology), std::cmp::Reverse(condition.len()))
	});

	ordered
}
