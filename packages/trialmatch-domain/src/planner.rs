use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::trial::TrialCandidate;

/// How many prioritized conditions the expansion query ORs together.
pub const EXPANSION_CONDITIONS: usize = 3;

/// One registry search. Every query is scoped to currently-recruiting studies;
/// an empty condition list means no condition filter at all.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RegistryQuery {
	pub conditions: Vec<String>,
	pub page_size: u32,
}
impl RegistryQuery {
	/// The condition expression the registry expects, ORing multiple terms.
	pub fn condition_expression(&self) -> Option<String> {
		if self.conditions.is_empty() {
			return None;
		}

		Some(self.conditions.join(" OR "))
	}
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct QueryPlan {
	pub primary: RegistryQuery,
	pub expansion: Option<RegistryQuery>,
}

/// Plans the registry retrieval for an already-prioritized condition list.
/// The first condition becomes the primary filter; an expansion query over the
/// top three conditions is planned whenever there is more than one term to
/// fall back on.
pub fn plan(conditions: &[String], page_size: u32) -> QueryPlan {
	let Some(primary_condition) = conditions.first() else {
		return QueryPlan {
			primary: RegistryQuery { conditions: Vec::new(), page_size },
			expansion: None,
		};
	};
	let primary =
		RegistryQuery { conditions: vec![primary_condition.clone()], page_size };
	let expansion = (conditions.len() > 1).then(|| RegistryQuery {
		conditions: conditions.iter().take(EXPANSION_CONDITIONS).cloned().collect(),
		page_size,
	});

	QueryPlan { primary, expansion }
}

/// The expansion query is executed only when the primary under-returns.
pub fn should_expand(primary_count: usize, page_size: u32, min_results: u32) -> bool {
	primary_count < min_results as usize || primary_count < page_size as usize
}

/// Merges expansion results behind primary results. Primary matches win on
/// duplicate registry ids; the combined set is capped at `cap`.
pub fn merge_candidates(
	primary: Vec<TrialCandidate>,
	expansion: Vec<TrialCandidate>,
	cap: usize,
) -> Vec<TrialCandidate> {
	let mut seen: HashSet<String> = HashSet::new();
	let mut merged = Vec::new();

	for candidate in primary.into_iter().chain(expansion) {
		if merged.len() >= cap {
			break;
		}
		if seen.insert(candidate.registry_id.clone()) {
			merged.push(candidate);
		}
	}

	merged
}

#[cfg(test)]
mod tests {
	use time::OffsetDateTime;

	use super::*;
	use crate::trial::ScreeningCriteria;

	fn candidate(registry_id: &str, title: &str) -> TrialCandidate {
		TrialCandidate {
			registry_id: registry_id.to_string(),
			title: title.to_string(),
			status: "recruiting".to_string(),
			conditions: Vec::new(),
			eligibility_summary: String::new(),
			url: format!("https://clinicaltrials.gov/study/{registry_id}"),
			contact_name: None,
			contact_email: None,
			screening: ScreeningCriteria::default(),
			retrieved_at: OffsetDateTime::UNIX_EPOCH,
		}
	}

	fn terms(values: &[&str]) -> Vec<String> {
		values.iter().map(|s| s.to_string()).collect()
	}

	#[test]
	fn empty_condition_list_plans_an_unfiltered_recruiting_query() {
		let plan = plan(&[], 30);

		assert!(plan.primary.conditions.is_empty());
		assert_eq!(plan.primary.condition_expression(), None);
		assert!(plan.expansion.is_none());
	}

	#[test]
	fn first_prioritized_condition_becomes_the_primary_filter() {
		let plan = plan(&terms(&["Papillary Thyroid Carcinoma", "Hashimoto's Thyroiditis"]), 30);

		assert_eq!(plan.primary.conditions, terms(&["Papillary Thyroid Carcinoma"]));
	}

	#[test]
	fn expansion_ors_the_top_three_conditions() {
		let plan = plan(&terms(&["A Condition", "B Condition", "C Condition", "D Condition"]), 30);
		let expansion = plan.expansion.expect("Expansion query must be planned.");

		assert_eq!(
			expansion.condition_expression().as_deref(),
			Some("A Condition OR B Condition OR C Condition")
		);
	}

	#[test]
	fn single_condition_plans_no_expansion() {
		let plan = plan(&terms(&["Asthma"]), 30);

		assert!(plan.expansion.is_none());
	}

	#[test]
	fn expansion_runs_only_when_the_primary_under_returns() {
		assert!(should_expand(3, 30, 10));
		assert!(should_expand(12, 30, 10));
		assert!(!should_expand(30, 30, 10));
		assert!(!should_expand(45, 30, 10));
	}

	#[test]
	fn merge_prefers_primary_results_and_caps_the_total() {
		let primary = vec![candidate("NCT00000001", "primary one"), candidate("NCT00000002", "primary two")];
		let expansion = vec![
			candidate("NCT00000002", "expansion duplicate"),
			candidate("NCT00000003", "expansion three"),
			candidate("NCT00000004", "expansion four"),
		];
		let merged = merge_candidates(primary, expansion, 3);

		assert_eq!(merged.len(), 3);
		assert_eq!(merged[0].registry_id, "NCT00000001");
		assert_eq!(merged[1].registry_id, "NCT00000002");
		assert_eq!(merged[1].title, "primary two");
		assert_eq!(merged[2].registry_id, "NCT00000003");
	}
}
