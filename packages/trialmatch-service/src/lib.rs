pub mod backoff;
pub mod matching;
pub mod progress;
pub mod scoring;
pub mod singleflight;
pub mod wiring;

mod error;

pub use error::{Error, Result};
pub use matching::DeliveryMode;
pub use progress::{MatchOutcome, MatchReport, ProgressEvent};

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use serde_json::Value;
use uuid::Uuid;

use trialmatch_config::{Config, Reasoning, Registry};
use trialmatch_domain::{MatchResult, PatientSummary, RegistryQuery, TrialCandidate};

use crate::singleflight::SingleFlight;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait ProfileStore
where
	Self: Send + Sync,
{
	fn patient(&self, patient_id: Uuid) -> BoxFuture<'_, Result<Option<PatientSummary>>>;

	fn upsert<'a>(&'a self, patient: &'a PatientSummary) -> BoxFuture<'a, Result<()>>;
}

pub trait TrialStore
where
	Self: Send + Sync,
{
	fn upsert<'a>(&'a self, candidate: &'a TrialCandidate) -> BoxFuture<'a, Result<()>>;

	fn all(&self) -> BoxFuture<'_, Result<Vec<TrialCandidate>>>;

	fn get<'a>(&'a self, registry_id: &'a str) -> BoxFuture<'a, Result<Option<TrialCandidate>>>;

	fn delete_all(&self) -> BoxFuture<'_, Result<()>>;
}

pub trait MatchStore
where
	Self: Send + Sync,
{
	fn replace<'a>(
		&'a self,
		patient_id: Uuid,
		results: &'a [MatchResult],
	) -> BoxFuture<'a, Result<()>>;

	fn matches(&self, patient_id: Uuid) -> BoxFuture<'_, Result<Vec<MatchResult>>>;
}

pub trait RegistryProvider
where
	Self: Send + Sync,
{
	fn search<'a>(
		&'a self,
		cfg: &'a Registry,
		query: &'a RegistryQuery,
	) -> BoxFuture<'a, trialmatch_providers::Result<Vec<TrialCandidate>>>;
}

pub trait ReasoningProvider
where
	Self: Send + Sync,
{
	fn complete<'a>(
		&'a self,
		cfg: &'a Reasoning,
		messages: &'a [Value],
	) -> BoxFuture<'a, trialmatch_providers::Result<String>>;
}

/// Fire-and-forget. Receives only a count and a results URL; medical content
/// never leaves the pipeline through this seam.
pub trait NotificationSink
where
	Self: Send + Sync,
{
	fn matching_finished<'a>(
		&'a self,
		patient_id: Uuid,
		accepted: usize,
		results_url: &'a str,
	) -> BoxFuture<'a, Result<()>>;
}

pub trait Sleeper
where
	Self: Send + Sync,
{
	fn sleep(&self, duration: Duration) -> BoxFuture<'_, ()>;
}

#[derive(Clone)]
pub struct Stores {
	pub profiles: Arc<dyn ProfileStore>,
	pub trials: Arc<dyn TrialStore>,
	pub matches: Arc<dyn MatchStore>,
}

#[derive(Clone)]
pub struct Providers {
	pub registry: Arc<dyn RegistryProvider>,
	pub reasoning: Arc<dyn ReasoningProvider>,
	pub notifications: Arc<dyn NotificationSink>,
	pub sleeper: Arc<dyn Sleeper>,
}

pub struct MatchService {
	pub cfg: Config,
	pub stores: Stores,
	pub providers: Providers,
	pub(crate) inflight: SingleFlight,
}
impl MatchService {
	pub fn new(cfg: Config, stores: Stores, providers: Providers) -> Self {
		Self { cfg, stores, providers, inflight: SingleFlight::new() }
	}

	pub async fn matches(&self, patient_id: Uuid) -> Result<Vec<MatchResult>> {
		self.stores.matches.matches(patient_id).await
	}

	pub async fn upsert_patient(&self, patient: &PatientSummary) -> Result<()> {
		self.stores.profiles.upsert(patient).await
	}
}
