use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Matches below this score are disqualified; at and above they are reported.
pub const DEFAULT_MIN_SCORE: i32 = 40;

/// Clamps a raw reasoning-service score into the valid 0-100 range.
pub fn clamp_score(raw: i64) -> i32 {
	raw.clamp(0, 100) as i32
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreBand {
	Strong,
	Good,
	Moderate,
	Possible,
	Poor,
}
impl ScoreBand {
	pub fn of(score: i32) -> Self {
		match score {
			85..=100 => Self::Strong,
			70..=84 => Self::Good,
			55..=69 => Self::Moderate,
			40..=54 => Self::Possible,
			_ => Self::Poor,
		}
	}
}

/// One scored (patient, trial) pair. At most one row per pair exists in the
/// persisted store; a matching run replaces the whole prior set.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MatchResult {
	pub id: Uuid,
	pub patient_id: Uuid,
	pub registry_id: String,
	pub confidence_score: i32,
	pub explanation: String,
	pub created_at: OffsetDateTime,
}
impl MatchResult {
	/// Builds a result with a clamped score and a deterministic id derived
	/// from the (patient, trial, creation time) composite.
	pub fn new(
		patient_id: Uuid,
		registry_id: &str,
		raw_score: i64,
		explanation: String,
		created_at: OffsetDateTime,
	) -> Self {
		let composite =
			format!("{patient_id}:{registry_id}:{}", created_at.unix_timestamp_nanos());
		let id = Uuid::new_v5(&Uuid::NAMESPACE_OID, composite.as_bytes());

		Self {
			id,
			patient_id,
			registry_id: registry_id.to_string(),
			confidence_score: clamp_score(raw_score),
			explanation,
			created_at,
		}
	}

	pub fn band(&self) -> ScoreBand {
		ScoreBand::of(self.confidence_score)
	}
}

/// Filters to the acceptance threshold and sorts descending by score. The
/// sort is stable, so tied scores retain retrieval order.
pub fn rank(results: Vec<MatchResult>, min_score: i32) -> Vec<MatchResult> {
	let mut ranked =
		results.into_iter().filter(|result| result.confidence_score >= min_score).collect::<Vec<_>>();

	ranked.sort_by(|a, b| b.confidence_score.cmp(&a.confidence_score));

	ranked
}
