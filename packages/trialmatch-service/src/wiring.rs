use std::{sync::Arc, time::Duration};

use serde_json::Value;
use uuid::Uuid;

use trialmatch_config::{Reasoning, Registry};
use trialmatch_domain::{MatchResult, PatientSummary, RegistryQuery, TrialCandidate};
use trialmatch_storage::{db::Db, queries};

use crate::{
	BoxFuture, Error, MatchStore, NotificationSink, ProfileStore, Providers, RegistryProvider,
	ReasoningProvider, Result, Sleeper, Stores, TrialStore,
};

pub struct PgProfileStore {
	db: Arc<Db>,
}
impl ProfileStore for PgProfileStore {
	fn patient(&self, patient_id: Uuid) -> BoxFuture<'_, Result<Option<PatientSummary>>> {
		Box::pin(async move {
			queries::get_patient(&self.db, patient_id).await.map_err(Error::from)
		})
	}

	fn upsert<'a>(&'a self, patient: &'a PatientSummary) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move { queries::upsert_patient(&self.db, patient).await.map_err(Error::from) })
	}
}

pub struct PgTrialStore {
	db: Arc<Db>,
}
impl TrialStore for PgTrialStore {
	fn upsert<'a>(&'a self, candidate: &'a TrialCandidate) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move { queries::upsert_trial(&self.db, candidate).await.map_err(Error::from) })
	}

	fn all(&self) -> BoxFuture<'_, Result<Vec<TrialCandidate>>> {
		Box::pin(async move { queries::all_trials(&self.db).await.map_err(Error::from) })
	}

	fn get<'a>(&'a self, registry_id: &'a str) -> BoxFuture<'a, Result<Option<TrialCandidate>>> {
		Box::pin(async move { queries::get_trial(&self.db, registry_id).await.map_err(Error::from) })
	}

	fn delete_all(&self) -> BoxFuture<'_, Result<()>> {
		Box::pin(async move { queries::delete_all_trials(&self.db).await.map_err(Error::from) })
	}
}

pub struct PgMatchStore {
	db: Arc<Db>,
}
impl MatchStore for PgMatchStore {
	fn replace<'a>(
		&'a self,
		patient_id: Uuid,
		results: &'a [MatchResult],
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			queries::replace_matches(&self.db, patient_id, results).await.map_err(Error::from)
		})
	}

	fn matches(&self, patient_id: Uuid) -> BoxFuture<'_, Result<Vec<MatchResult>>> {
		Box::pin(async move { queries::list_matches(&self.db, patient_id).await.map_err(Error::from) })
	}
}

impl Stores {
	pub fn postgres(db: Arc<Db>) -> Self {
		Self {
			profiles: Arc::new(PgProfileStore { db: Arc::clone(&db) }),
			trials: Arc::new(PgTrialStore { db: Arc::clone(&db) }),
			matches: Arc::new(PgMatchStore { db }),
		}
	}
}

pub struct HttpRegistryProvider;
impl RegistryProvider for HttpRegistryProvider {
	fn search<'a>(
		&'a self,
		cfg: &'a Registry,
		query: &'a RegistryQuery,
	) -> BoxFuture<'a, trialmatch_providers::Result<Vec<TrialCandidate>>> {
		Box::pin(trialmatch_providers::registry::search(cfg, query))
	}
}

pub struct HttpReasoningProvider;
impl ReasoningProvider for HttpReasoningProvider {
	fn complete<'a>(
		&'a self,
		cfg: &'a Reasoning,
		messages: &'a [Value],
	) -> BoxFuture<'a, trialmatch_providers::Result<String>> {
		Box::pin(trialmatch_providers::reasoning::complete(cfg, messages))
	}
}

/// Logs the finished event. Outbound email/push delivery is a deployment
/// concern wired in behind the same seam.
pub struct TracingNotificationSink;
impl NotificationSink for TracingNotificationSink {
	fn matching_finished<'a>(
		&'a self,
		patient_id: Uuid,
		accepted: usize,
		results_url: &'a str,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			tracing::info!(%patient_id, accepted, results_url, "Matching finished.");

			Ok(())
		})
	}
}

pub struct TokioSleeper;
impl Sleeper for TokioSleeper {
	fn sleep(&self, duration: Duration) -> BoxFuture<'_, ()> {
		Box::pin(tokio::time::sleep(duration))
	}
}

impl Providers {
	/// Live HTTP providers plus the tracing sink and real clock.
	pub fn live() -> Self {
		Self {
			registry: Arc::new(HttpRegistryProvider),
			reasoning: Arc::new(HttpReasoningProvider),
			notifications: Arc::new(TracingNotificationSink),
			sleeper: Arc::new(TokioSleeper),
		}
	}
}
