pub mod conditions;
pub mod matching;
pub mod patient;
pub mod planner;
pub mod trial;

pub use conditions::{combined_conditions, prioritized};
pub use matching::{MatchResult, ScoreBand, clamp_score, rank};
pub use patient::{ClinicalAttributes, PatientSummary};
pub use planner::{QueryPlan, RegistryQuery, merge_candidates, plan, should_expand};
pub use trial::{ScreeningCriteria, SexRestriction, TrialCandidate, is_registry_id};
