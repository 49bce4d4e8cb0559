use std::sync::Arc;

use trialmatch_service::{MatchService, Providers, Stores};
use trialmatch_storage::db::Db;

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<MatchService>,
}
impl AppState {
	pub async fn new(config: trialmatch_config::Config) -> color_eyre::Result<Self> {
		let db = Arc::new(Db::connect(&config.storage.postgres).await?);

		db.ensure_schema().await?;

		let stores = Stores::postgres(db);
		let service = MatchService::new(config, stores, Providers::live());

		Ok(Self { service: Arc::new(service) })
	}
}
