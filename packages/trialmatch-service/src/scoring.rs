use std::{sync::LazyLock, time::Duration};

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use trialmatch_config::Reasoning;
use trialmatch_domain::{PatientSummary, SexRestriction, TrialCandidate, clamp_score};
use trialmatch_providers::Error as ProviderError;

use crate::{ReasoningProvider, Sleeper, backoff::BackoffPolicy};

/// Explanation recorded when a pair cannot be evaluated. A malformed or
/// exhausted reasoning call must never abort the pipeline.
pub const PROCESSING_ERROR_EXPLANATION: &str =
	"Unable to evaluate this trial because of a processing error.";

const NO_EXPLANATION: &str = "No explanation provided.";

static SCORE_FIELD: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r#""score"\s*:\s*(-?\d+)"#).expect("Score field pattern must compile.")
});
static REASONING_FIELD: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r#""reasoning"\s*:\s*"((?:[^"\\]|\\.)*)""#)
		.expect("Reasoning field pattern must compile.")
});

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ScoredReply {
	pub score: i32,
	pub explanation: String,
}

#[derive(Debug, Deserialize)]
struct RawReply {
	score: i64,
	#[serde(default)]
	reasoning: String,
}

pub struct ScoringContext<'a> {
	pub reasoning: &'a dyn ReasoningProvider,
	pub sleeper: &'a dyn Sleeper,
	pub cfg: &'a Reasoning,
	pub policy: BackoffPolicy,
}

/// Scores one (patient, trial) pair. Infallible by design: the deterministic
/// screen short-circuits machine-checkable disqualifications, the backoff
/// policy covers transient provider failures, and anything unrecoverable
/// becomes the zero-score processing-error reply.
pub async fn score_pair(
	ctx: &ScoringContext<'_>,
	patient: &PatientSummary,
	trial: &TrialCandidate,
) -> ScoredReply {
	if let Some(reply) = screen(patient, trial) {
		tracing::debug!(
			registry_id = %trial.registry_id,
			"Deterministic screen disqualified the pair."
		);

		return reply;
	}

	let messages = prompt_messages(patient, trial);
	let mut attempt = 0u32;

	loop {
		match ctx.reasoning.complete(ctx.cfg, &messages).await {
			Ok(raw) =>
				return parse_reply(&raw).unwrap_or_else(|| {
					tracing::warn!(
						registry_id = %trial.registry_id,
						"Reasoning reply was unparsable; recording a processing error."
					);

					processing_error_reply()
				}),
			Err(err) if err.is_retryable() && attempt < ctx.policy.max_retries => {
				let hint = match &err {
					ProviderError::RateLimited { retry_after_secs: Some(secs) } =>
						Some(Duration::from_secs(*secs)),
					_ => None,
				};
				let delay = ctx.policy.delay(attempt, hint);

				tracing::debug!(
					registry_id = %trial.registry_id,
					attempt,
					delay_ms = delay.as_millis() as u64,
					"Reasoning call failed transiently; backing off."
				);
				ctx.sleeper.sleep(delay).await;

				attempt += 1;
			},
			Err(err) => {
				tracing::warn!(
					registry_id = %trial.registry_id,
					error = %err,
					"Reasoning call failed permanently; recording a processing error."
				);

				return processing_error_reply();
			},
		}
	}
}

pub fn processing_error_reply() -> ScoredReply {
	ScoredReply { score: 0, explanation: PROCESSING_ERROR_EXPLANATION.to_string() }
}

/// Machine-checkable half of the hard-disqualification rule. The reasoning
/// prompt still carries the full rule for the cases code cannot verify, but
/// an age or sex contradiction here never reaches the service at all.
pub fn screen(patient: &PatientSummary, trial: &TrialCandidate) -> Option<ScoredReply> {
	if let (Some(age), Some(min)) = (patient.age, trial.screening.min_age_years)
		&& age < min
	{
		return Some(ScoredReply {
			score: 0,
			explanation: format!(
				"Patient age {age} is below the trial's minimum age of {min} years."
			),
		});
	}
	if let (Some(age), Some(max)) = (patient.age, trial.screening.max_age_years)
		&& age > max
	{
		return Some(ScoredReply {
			score: 0,
			explanation: format!(
				"Patient age {age} is above the trial's maximum age of {max} years."
			),
		});
	}
	if let (Some(sex), Some(restriction)) = (patient.sex.as_deref(), trial.screening.sex) {
		let allowed = match restriction {
			SexRestriction::Female => sex.eq_ignore_ascii_case("female"),
			SexRestriction::Male => sex.eq_ignore_ascii_case("male"),
		};

		if !allowed {
			return Some(ScoredReply {
				score: 0,
				explanation: "Patient sex does not match the trial's sex restriction.".to_string(),
			});
		}
	}

	None
}

/// System and user messages for one pair. Patient attributes are limited to
/// the sanitized clinical set; name and contact data never enter the prompt.
pub fn prompt_messages(patient: &PatientSummary, trial: &TrialCandidate) -> Vec<Value> {
	let system = "\
You are a clinical trial matching assistant. Score how well the patient fits the trial \
from 0 to 100.

Hard disqualifications, score must be 0:
- The patient's age is outside the trial's stated age range.
- The patient's sex does not match a stated sex restriction.
- The patient's condition is unrelated to the trial's target condition.
- The trial requires healthy volunteers but the patient has significant conditions.

Score bands: 85-100 strong match, 70-84 good match, 55-69 moderate match, \
40-54 possible match, 0-39 poor match or disqualified.

Respond with JSON only, exactly: {\"score\": <integer>, \"reasoning\": \"<short explanation>\"}";
	let user = format!(
		"Patient:\n{}\n\nTrial:\n{}",
		patient_block(patient),
		trial_block(trial)
	);

	vec![
		serde_json::json!({ "role": "system", "content": system }),
		serde_json::json!({ "role": "user", "content": user }),
	]
}

fn patient_block(patient: &PatientSummary) -> String {
	let mut lines = Vec::new();

	match (patient.age, patient.age_bracket.as_deref()) {
		(Some(age), _) => lines.push(format!("Age: {age}")),
		(None, Some(bracket)) => lines.push(format!("Age bracket: {bracket}")),
		(None, None) => {},
	}
	if let Some(sex) = patient.sex.as_deref() {
		lines.push(format!("Sex: {sex}"));
	}
	if let Some(smoking) = patient.smoking_status.as_deref() {
		lines.push(format!("Smoking status: {smoking}"));
	}
	if !patient.conditions.is_empty() {
		lines.push(format!("Conditions: {}", patient.conditions.join(", ")));
	}
	if !patient.ai_conditions.is_empty() {
		lines.push(format!("Normalized conditions: {}", patient.ai_conditions.join(", ")));
	}
	if let Some(clinical) = patient.clinical.as_ref() {
		if let Some(cancer_type) = clinical.cancer_type.as_deref() {
			lines.push(format!("Cancer type: {cancer_type}"));
		}
		if let Some(stage) = clinical.cancer_stage.as_deref() {
			lines.push(format!("Cancer stage: {stage}"));
		}
		if !clinical.prior_treatments.is_empty() {
			lines.push(format!("Prior treatments: {}", clinical.prior_treatments.join(", ")));
		}
		if !clinical.biomarkers.is_empty() {
			lines.push(format!("Biomarkers: {}", clinical.biomarkers.join(", ")));
		}
	}
	if lines.is_empty() {
		lines.push("No clinical attributes on file.".to_string());
	}

	lines.join("\n")
}

fn trial_block(trial: &TrialCandidate) -> String {
	let mut lines = vec![
		format!("Id: {}", trial.registry_id),
		format!("Title: {}", trial.title),
		format!("Status: {}", trial.status),
	];

	if !trial.conditions.is_empty() {
		lines.push(format!("Conditions: {}", trial.conditions.join(", ")));
	}

	lines.push(format!("Eligibility: {}", trial.eligibility_summary));

	lines.join("\n")
}

/// Parses a reasoning reply, most structured first: direct JSON, then the
/// outermost brace-delimited substring, then field-level regex extraction
/// from raw text. Returns `None` only when no score can be recovered at all.
pub fn parse_reply(raw: &str) -> Option<ScoredReply> {
	if let Ok(reply) = serde_json::from_str::<RawReply>(raw) {
		return Some(scored(reply));
	}

	if let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}'))
		&& start < end
		&& let Ok(reply) = serde_json::from_str::<RawReply>(&raw[start..=end])
	{
		return Some(scored(reply));
	}

	let score: i64 = SCORE_FIELD.captures(raw)?.get(1)?.as_str().parse().ok()?;
	let explanation = REASONING_FIELD
		.captures(raw)
		.and_then(|captures| captures.get(1))
		.map(|m| unescape(m.as_str()))
		.filter(|text| !text.trim().is_empty())
		.unwrap_or_else(|| NO_EXPLANATION.to_string());

	Some(ScoredReply { score: clamp_score(score), explanation })
}

fn scored(reply: RawReply) -> ScoredReply {
	let explanation = if reply.reasoning.trim().is_empty() {
		NO_EXPLANATION.to_string()
	} else {
		reply.reasoning
	};

	ScoredReply { score: clamp_score(reply.score), explanation }
}

fn unescape(raw: &str) -> String {
	raw.replace("\\\"", "\"").replace("\\n", "\n").replace("\\\\", "\\")
}

#[cfg(test)]
mod tests {
	use std::sync::{Arc, Mutex};

	use time::OffsetDateTime;
	use uuid::Uuid;

	use trialmatch_domain::ScreeningCriteria;
	use trialmatch_providers::Result as ProviderResult;

	use super::*;
	use crate::BoxFuture;

	#[test]
	fn well_formed_json_passes_through_unchanged() {
		let reply = parse_reply(r#"{"score": 92, "reasoning": "strong match"}"#)
			.expect("Reply must parse.");

		assert_eq!(reply, ScoredReply { score: 92, explanation: "strong match".to_string() });
	}

	#[test]
	fn out_of_range_scores_are_clamped() {
		let high = parse_reply(r#"{"score": 137, "reasoning": "x"}"#).expect("Reply must parse.");
		let low = parse_reply(r#"{"score": -5, "reasoning": "x"}"#).expect("Reply must parse.");

		assert_eq!(high.score, 100);
		assert_eq!(low.score, 0);
	}

	#[test]
	fn json_embedded_in_prose_is_recovered() {
		let raw = "Here is my assessment:\n{\"score\": 64, \"reasoning\": \"partial overlap\"}\nLet me know if you need more.";
		let reply = parse_reply(raw).expect("Reply must parse.");

		assert_eq!(reply.score, 64);
		assert_eq!(reply.explanation, "partial overlap");
	}

	#[test]
	fn regex_extraction_recovers_fields_from_broken_json() {
		let raw = r#"sure! "score": 77, and my "reasoning": "age and condition align" overall"#;
		let reply = parse_reply(raw).expect("Reply must parse.");

		assert_eq!(reply.score, 77);
		assert_eq!(reply.explanation, "age and condition align");
	}

	#[test]
	fn score_without_reasoning_gets_a_placeholder_explanation() {
		let reply = parse_reply(r#"{"score": 50}"#).expect("Reply must parse.");

		assert_eq!(reply.score, 50);
		assert_eq!(reply.explanation, NO_EXPLANATION);
	}

	#[test]
	fn freeform_text_with_no_score_is_unparsable() {
		assert_eq!(parse_reply("This trial looks like a reasonable fit overall."), None);
		assert_eq!(parse_reply(""), None);
	}

	fn patient(age: Option<i32>, sex: Option<&str>) -> PatientSummary {
		let mut patient = PatientSummary::new(Uuid::new_v4());

		patient.age = age;
		patient.sex = sex.map(str::to_string);
		patient.conditions = vec!["Papillary Thyroid Carcinoma".to_string()];
		patient
	}

	fn trial(screening: ScreeningCriteria) -> TrialCandidate {
		TrialCandidate {
			registry_id: "NCT01234567".to_string(),
			title: "A Study of Something".to_string(),
			status: "recruiting".to_string(),
			conditions: vec!["Thyroid Cancer".to_string()],
			eligibility_summary: "Age range: 18 Years to 75 Years.".to_string(),
			url: "https://clinicaltrials.gov/study/NCT01234567".to_string(),
			contact_name: None,
			contact_email: None,
			screening,
			retrieved_at: OffsetDateTime::UNIX_EPOCH,
		}
	}

	#[test]
	fn screen_disqualifies_age_outside_the_structured_range() {
		let trial = trial(ScreeningCriteria {
			min_age_years: Some(18),
			max_age_years: Some(65),
			sex: None,
			healthy_volunteers: false,
		});

		let below = screen(&patient(Some(16), None), &trial).expect("Must disqualify.");
		let above = screen(&patient(Some(80), None), &trial).expect("Must disqualify.");

		assert_eq!(below.score, 0);
		assert!(below.explanation.contains("below"));
		assert_eq!(above.score, 0);
		assert!(above.explanation.contains("above"));
		assert!(screen(&patient(Some(40), None), &trial).is_none());
	}

	#[test]
	fn screen_disqualifies_a_sex_contradiction() {
		let trial = trial(ScreeningCriteria {
			min_age_years: None,
			max_age_years: None,
			sex: Some(SexRestriction::Female),
			healthy_volunteers: false,
		});

		assert!(screen(&patient(None, Some("male")), &trial).is_some());
		assert!(screen(&patient(None, Some("Female")), &trial).is_none());
	}

	#[test]
	fn screen_passes_when_attributes_are_unknown() {
		let trial = trial(ScreeningCriteria {
			min_age_years: Some(18),
			max_age_years: Some(65),
			sex: Some(SexRestriction::Female),
			healthy_volunteers: false,
		});

		assert!(screen(&patient(None, None), &trial).is_none());
	}

	#[test]
	fn prompt_embeds_sanitized_patient_and_trial_attributes() {
		let mut patient = patient(Some(52), Some("female"));

		patient.smoking_status = Some("never".to_string());

		let trial = trial(ScreeningCriteria::default());
		let messages = prompt_messages(&patient, &trial);

		assert_eq!(messages.len(), 2);

		let system = messages[0]["content"].as_str().expect("System content must be text.");
		let user = messages[1]["content"].as_str().expect("User content must be text.");

		assert!(system.contains("score must be 0"));
		assert!(user.contains("Age: 52"));
		assert!(user.contains("Papillary Thyroid Carcinoma"));
		assert!(user.contains("Id: NCT01234567"));
		assert!(user.contains("Eligibility:"));
	}

	struct ScriptedReasoning {
		replies: Mutex<Vec<ProviderResult<String>>>,
		calls: Arc<Mutex<u32>>,
	}
	impl ReasoningProvider for ScriptedReasoning {
		fn complete<'a>(
			&'a self,
			_cfg: &'a Reasoning,
			_messages: &'a [Value],
		) -> BoxFuture<'a, ProviderResult<String>> {
			let mut replies = self.replies.lock().unwrap_or_else(|err| err.into_inner());
			let reply = replies.remove(0);

			*self.calls.lock().unwrap_or_else(|err| err.into_inner()) += 1;

			Box::pin(async move { reply })
		}
	}

	struct RecordingSleeper {
		slept: Arc<Mutex<Vec<Duration>>>,
	}
	impl Sleeper for RecordingSleeper {
		fn sleep(&self, duration: Duration) -> BoxFuture<'_, ()> {
			self.slept.lock().unwrap_or_else(|err| err.into_inner()).push(duration);

			Box::pin(async {})
		}
	}

	fn reasoning_cfg() -> Reasoning {
		serde_json::from_value(serde_json::json!({
			"api_base": "https://reasoning.invalid",
			"api_key": "test-key",
			"model": "test-model",
		}))
		.expect("Reasoning config must deserialize.")
	}

	async fn run_score_pair(
		replies: Vec<ProviderResult<String>>,
	) -> (ScoredReply, u32, Vec<Duration>) {
		let calls = Arc::new(Mutex::new(0));
		let slept = Arc::new(Mutex::new(Vec::new()));
		let provider = ScriptedReasoning { replies: Mutex::new(replies), calls: Arc::clone(&calls) };
		let sleeper = RecordingSleeper { slept: Arc::clone(&slept) };
		let cfg = reasoning_cfg();
		let ctx = ScoringContext {
			reasoning: &provider,
			sleeper: &sleeper,
			cfg: &cfg,
			policy: BackoffPolicy::from_config(&cfg),
		};
		let reply =
			score_pair(&ctx, &patient(Some(40), None), &trial(ScreeningCriteria::default())).await;
		let call_count = *calls.lock().unwrap_or_else(|err| err.into_inner());
		let delays = slept.lock().unwrap_or_else(|err| err.into_inner()).clone();

		(reply, call_count, delays)
	}

	#[tokio::test]
	async fn rate_limits_retry_with_the_server_hint() {
		let (reply, calls, delays) = run_score_pair(vec![
			Err(ProviderError::RateLimited { retry_after_secs: Some(2) }),
			Ok(r#"{"score": 88, "reasoning": "fits"}"#.to_string()),
		])
		.await;

		assert_eq!(reply.score, 88);
		assert_eq!(calls, 2);
		assert_eq!(delays, vec![Duration::from_secs(2)]);
	}

	#[tokio::test]
	async fn transient_failures_back_off_exponentially_until_exhausted() {
		let (reply, calls, delays) = run_score_pair(vec![
			Err(ProviderError::Http { status: 503 }),
			Err(ProviderError::RateLimited { retry_after_secs: None }),
			Err(ProviderError::Http { status: 502 }),
			Err(ProviderError::Http { status: 500 }),
		])
		.await;

		assert_eq!(reply, processing_error_reply());
		assert_eq!(calls, 4);
		assert_eq!(
			delays,
			vec![
				Duration::from_millis(500),
				Duration::from_millis(1_000),
				Duration::from_millis(2_000),
			]
		);
	}

	#[tokio::test]
	async fn permanent_failures_do_not_retry() {
		let (reply, calls, delays) =
			run_score_pair(vec![Err(ProviderError::Http { status: 401 })]).await;

		assert_eq!(reply, processing_error_reply());
		assert_eq!(calls, 1);
		assert!(delays.is_empty());
	}

	#[tokio::test]
	async fn unparsable_replies_become_processing_errors_without_retrying() {
		let (reply, calls, _) =
			run_score_pair(vec![Ok("no structured payload here".to_string())]).await;

		assert_eq!(reply, processing_error_reply());
		assert_eq!(calls, 1);
	}

	#[tokio::test]
	async fn screened_pairs_never_call_the_reasoning_service() {
		let calls = Arc::new(Mutex::new(0));
		let provider = ScriptedReasoning { replies: Mutex::new(Vec::new()), calls: Arc::clone(&calls) };
		let sleeper = RecordingSleeper { slept: Arc::new(Mutex::new(Vec::new())) };
		let cfg = reasoning_cfg();
		let ctx = ScoringContext {
			reasoning: &provider,
			sleeper: &sleeper,
			cfg: &cfg,
			policy: BackoffPolicy::from_config(&cfg),
		};
		let screening = ScreeningCriteria {
			min_age_years: Some(18),
			max_age_years: Some(65),
			sex: None,
			healthy_volunteers: false,
		};
		let reply = score_pair(&ctx, &patient(Some(16), None), &trial(screening)).await;

		assert_eq!(reply.score, 0);
		assert_eq!(*calls.lock().unwrap_or_else(|err| err.into_inner()), 0);
	}
}
