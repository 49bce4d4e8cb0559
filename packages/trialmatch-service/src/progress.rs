use serde::{Deserialize, Serialize};
use uuid::Uuid;

use trialmatch_domain::MatchResult;

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchOutcome {
	Matched,
	/// Retrieval succeeded but returned zero trials. Not an error; the run
	/// still clears the patient's stale match set.
	NoCandidates,
}

/// Terminal result of one matching run.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MatchReport {
	pub patient_id: Uuid,
	pub outcome: MatchOutcome,
	/// Candidates considered by the scoring step.
	pub candidates: usize,
	/// Results at or above the acceptance threshold, persisted for the patient.
	pub accepted: usize,
	pub matches: Vec<MatchResult>,
}

/// Pipeline milestones emitted per run, in order. Transient; the transport
/// layer forwards them verbatim, so the wire shape is pinned here.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
	RetrievalStarted {
		conditions: Vec<String>,
	},
	RetrievalCandidateFound {
		registry_id: String,
		title: String,
		status: String,
		index: usize,
		total: usize,
	},
	RetrievalComplete {
		count: usize,
	},
	ScoringStarted {
		total: usize,
	},
	ScoringCandidate {
		registry_id: String,
		title: String,
		score: i32,
		explanation: String,
		index: usize,
		total: usize,
	},
	ScoringComplete {
		accepted: usize,
	},
	Completed {
		report: MatchReport,
	},
	Failed {
		message: String,
	},
}
impl ProgressEvent {
	pub fn is_terminal(&self) -> bool {
		matches!(self, Self::Completed { .. } | Self::Failed { .. })
	}
}
