use std::{sync::Arc, time::Duration};

use futures::future;
use time::OffsetDateTime;
use tokio::{sync::mpsc, time::Instant};
use uuid::Uuid;

use trialmatch_domain::{
	MatchResult, PatientSummary, TrialCandidate, combined_conditions, planner, prioritized, rank,
};

use crate::{
	Error, MatchService, Result,
	backoff::BackoffPolicy,
	progress::{MatchOutcome, MatchReport, ProgressEvent},
	scoring::{self, ScoringContext},
};

/// Buffered progress events between the orchestrator and the transport drain.
const PROGRESS_CHANNEL_CAPACITY: usize = 32;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeliveryMode {
	/// Concurrent scoring groups; only the final ranked report is delivered.
	Batch,
	/// Strictly sequential scoring with a progress event per candidate.
	Incremental,
}

type EventSender = Option<mpsc::Sender<ProgressEvent>>;

impl MatchService {
	/// Runs one matching run to completion and returns the ranked report.
	pub async fn run_matching(&self, patient_id: Uuid) -> Result<MatchReport> {
		let _permit = self.inflight.acquire(patient_id)?;

		self.run_pipeline(patient_id, DeliveryMode::Batch, &None).await
	}

	/// Starts a streaming matching run. Events arrive until a terminal
	/// `Completed` or `Failed`; dropping the receiver cancels the run, and a
	/// cancelled run performs no write.
	pub fn run_matching_streaming(
		self: Arc<Self>,
		patient_id: Uuid,
	) -> Result<mpsc::Receiver<ProgressEvent>> {
		let permit = self.inflight.acquire(patient_id)?;
		let (sender, receiver) = mpsc::channel(PROGRESS_CHANNEL_CAPACITY);
		let service = self;

		tokio::spawn(async move {
			let _permit = permit;
			let events = Some(sender.clone());

			match service.run_pipeline(patient_id, DeliveryMode::Incremental, &events).await {
				Ok(report) => {
					let _ = sender.send(ProgressEvent::Completed { report }).await;
				},
				Err(Error::Cancelled) => {
					tracing::debug!(%patient_id, "Matching run cancelled by the caller.");
				},
				Err(err) => {
					tracing::warn!(%patient_id, error = %err, "Matching run failed.");

					let _ = sender.send(ProgressEvent::Failed { message: err.to_string() }).await;
				},
			}
		});

		Ok(receiver)
	}

	async fn run_pipeline(
		&self,
		patient_id: Uuid,
		mode: DeliveryMode,
		events: &EventSender,
	) -> Result<MatchReport> {
		let started = Instant::now();
		let deadline = Duration::from_secs(self.cfg.matching.run_deadline_secs);
		let patient = self
			.stores
			.profiles
			.patient(patient_id)
			.await?
			.ok_or(Error::PatientNotFound { patient_id })?;
		let conditions = prioritized(&combined_conditions(&patient));

		tracing::info!(
			%patient_id,
			?mode,
			conditions = conditions.len(),
			"Matching run started; retrieving candidates."
		);
		emit(events, ProgressEvent::RetrievalStarted { conditions: conditions.clone() }).await?;

		let candidates = self.retrieve_candidates(&conditions, events).await?;

		emit(events, ProgressEvent::RetrievalComplete { count: candidates.len() }).await?;
		check_deadline(started, deadline)?;

		if candidates.is_empty() {
			// Nothing to score; the stale match set is still cleared. The
			// scoring events stay paired so consumers see a regular sequence.
			check_cancelled(events)?;
			self.stores.matches.replace(patient_id, &[]).await?;
			emit(events, ProgressEvent::ScoringStarted { total: 0 }).await?;
			emit(events, ProgressEvent::ScoringComplete { accepted: 0 }).await?;
			self.notify_finished(patient_id, 0).await;
			tracing::info!(%patient_id, "Matching run found no candidates.");

			return Ok(MatchReport {
				patient_id,
				outcome: MatchOutcome::NoCandidates,
				candidates: 0,
				accepted: 0,
				matches: Vec::new(),
			});
		}

		tracing::debug!(%patient_id, candidates = candidates.len(), "Scoring candidates.");
		emit(events, ProgressEvent::ScoringStarted { total: candidates.len() }).await?;

		let results = match mode {
			DeliveryMode::Batch =>
				self.score_batched(&patient, &candidates, started, deadline).await?,
			DeliveryMode::Incremental =>
				self.score_sequential(&patient, &candidates, events, started, deadline).await?,
		};
		let ranked = rank(results, self.cfg.matching.min_score);

		check_deadline(started, deadline)?;
		check_cancelled(events)?;
		tracing::debug!(%patient_id, accepted = ranked.len(), "Persisting ranked matches.");
		self.stores.matches.replace(patient_id, &ranked).await?;
		emit(events, ProgressEvent::ScoringComplete { accepted: ranked.len() }).await?;
		self.notify_finished(patient_id, ranked.len()).await;
		tracing::info!(
			%patient_id,
			candidates = candidates.len(),
			accepted = ranked.len(),
			"Matching run complete."
		);

		Ok(MatchReport {
			patient_id,
			outcome: MatchOutcome::Matched,
			candidates: candidates.len(),
			accepted: ranked.len(),
			matches: ranked,
		})
	}

	/// Primary query first; the expansion query only when the primary
	/// under-returns, and only best-effort. Retrieved candidates are upserted
	/// into the trial store as they arrive; only the match replace is
	/// integrity-critical.
	async fn retrieve_candidates(
		&self,
		conditions: &[String],
		events: &EventSender,
	) -> Result<Vec<TrialCandidate>> {
		let cfg = &self.cfg.registry;
		let plan = planner::plan(conditions, cfg.page_size);
		let mut merged = self
			.providers
			.registry
			.search(cfg, &plan.primary)
			.await
			.map_err(|err| Error::RegistryUnavailable { message: err.to_string() })?;

		if let Some(expansion) = plan.expansion
			&& planner::should_expand(merged.len(), cfg.page_size, cfg.expansion_min_results)
		{
			match self.providers.registry.search(cfg, &expansion).await {
				Ok(extra) =>
					merged = planner::merge_candidates(merged, extra, cfg.page_size as usize),
				Err(err) => {
					tracing::warn!(
						error = %err,
						"Expansion query failed; keeping primary results."
					);
				},
			}
		}

		for candidate in &merged {
			if let Err(err) = self.stores.trials.upsert(candidate).await {
				tracing::warn!(
					registry_id = %candidate.registry_id,
					error = %err,
					"Trial upsert failed; continuing the run."
				);
			}
		}

		let total = merged.len();

		for (index, candidate) in merged.iter().enumerate() {
			emit(
				events,
				ProgressEvent::RetrievalCandidateFound {
					registry_id: candidate.registry_id.clone(),
					title: candidate.title.clone(),
					status: candidate.status.clone(),
					index,
					total,
				},
			)
			.await?;
		}

		Ok(merged)
	}

	/// Fixed-size concurrent groups with an order-preserving join and a pause
	/// between groups to stay inside external rate limits.
	async fn score_batched(
		&self,
		patient: &PatientSummary,
		candidates: &[TrialCandidate],
		started: Instant,
		deadline: Duration,
	) -> Result<Vec<MatchResult>> {
		let concurrency = self.cfg.matching.batch_concurrency.max(1) as usize;
		let pause = Duration::from_millis(self.cfg.matching.batch_pause_ms);
		let ctx = self.scoring_context();
		let created_at = OffsetDateTime::now_utc();
		let mut results = Vec::with_capacity(candidates.len());

		for (group_index, group) in candidates.chunks(concurrency).enumerate() {
			if group_index > 0 && !pause.is_zero() {
				self.providers.sleeper.sleep(pause).await;
			}

			check_deadline(started, deadline)?;

			let replies = future::join_all(
				group.iter().map(|trial| scoring::score_pair(&ctx, patient, trial)),
			)
			.await;

			for (trial, reply) in group.iter().zip(replies) {
				results.push(MatchResult::new(
					patient.patient_id,
					&trial.registry_id,
					reply.score as i64,
					reply.explanation,
					created_at,
				));
			}
		}

		Ok(results)
	}

	/// Strictly sequential scoring; the per-candidate event goes out after
	/// every call, win or lose, in retrieval order.
	async fn score_sequential(
		&self,
		patient: &PatientSummary,
		candidates: &[TrialCandidate],
		events: &EventSender,
		started: Instant,
		deadline: Duration,
	) -> Result<Vec<MatchResult>> {
		let pause = Duration::from_millis(self.cfg.matching.sequential_pause_ms);
		let ctx = self.scoring_context();
		let created_at = OffsetDateTime::now_utc();
		let total = candidates.len();
		let mut results = Vec::with_capacity(total);

		for (index, trial) in candidates.iter().enumerate() {
			if index > 0 && !pause.is_zero() {
				self.providers.sleeper.sleep(pause).await;
			}

			check_deadline(started, deadline)?;
			check_cancelled(events)?;

			let reply = scoring::score_pair(&ctx, patient, trial).await;

			emit(
				events,
				ProgressEvent::ScoringCandidate {
					registry_id: trial.registry_id.clone(),
					title: trial.title.clone(),
					score: reply.score,
					explanation: reply.explanation.clone(),
					index,
					total,
				},
			)
			.await?;
			results.push(MatchResult::new(
				patient.patient_id,
				&trial.registry_id,
				reply.score as i64,
				reply.explanation,
				created_at,
			));
		}

		Ok(results)
	}

	fn scoring_context(&self) -> ScoringContext<'_> {
		ScoringContext {
			reasoning: self.providers.reasoning.as_ref(),
			sleeper: self.providers.sleeper.as_ref(),
			cfg: &self.cfg.reasoning,
			policy: BackoffPolicy::from_config(&self.cfg.reasoning),
		}
	}

	async fn notify_finished(&self, patient_id: Uuid, accepted: usize) {
		let results_url = format!("{}/{patient_id}", self.cfg.service.results_url_base);

		if let Err(err) = self
			.providers
			.notifications
			.matching_finished(patient_id, accepted, &results_url)
			.await
		{
			tracing::warn!(%patient_id, error = %err, "Notification delivery failed.");
		}
	}
}

async fn emit(events: &EventSender, event: ProgressEvent) -> Result<()> {
	let Some(sender) = events else {
		return Ok(());
	};

	sender.send(event).await.map_err(|_| Error::Cancelled)
}

fn check_cancelled(events: &EventSender) -> Result<()> {
	if events.as_ref().is_some_and(mpsc::Sender::is_closed) {
		return Err(Error::Cancelled);
	}

	Ok(())
}

fn check_deadline(started: Instant, deadline: Duration) -> Result<()> {
	if started.elapsed() >= deadline {
		return Err(Error::DeadlineExceeded);
	}

	Ok(())
}
