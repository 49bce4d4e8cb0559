use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub registry: Registry,
	pub reasoning: Reasoning,
	#[serde(default)]
	pub matching: Matching,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
	/// Base URL the notification sink appends a patient id to.
	pub results_url_base: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Registry {
	pub api_base: String,
	#[serde(default = "default_registry_path")]
	pub path: String,
	#[serde(default = "default_page_size")]
	pub page_size: u32,
	/// Primary result counts below this trigger the expansion query.
	#[serde(default = "default_expansion_min_results")]
	pub expansion_min_results: u32,
	#[serde(default = "default_registry_timeout_ms")]
	pub timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct Reasoning {
	pub api_base: String,
	pub api_key: String,
	#[serde(default = "default_reasoning_path")]
	pub path: String,
	pub model: String,
	#[serde(default = "default_temperature")]
	pub temperature: f32,
	#[serde(default = "default_reasoning_timeout_ms")]
	pub timeout_ms: u64,
	#[serde(default = "default_max_retries")]
	pub max_retries: u32,
	#[serde(default = "default_backoff_base_ms")]
	pub backoff_base_ms: u64,
	#[serde(default = "default_backoff_cap_ms")]
	pub backoff_cap_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct Matching {
	#[serde(default = "default_min_score")]
	pub min_score: i32,
	#[serde(default = "default_batch_concurrency")]
	pub batch_concurrency: u32,
	#[serde(default = "default_batch_pause_ms")]
	pub batch_pause_ms: u64,
	#[serde(default = "default_sequential_pause_ms")]
	pub sequential_pause_ms: u64,
	#[serde(default = "default_run_deadline_secs")]
	pub run_deadline_secs: u64,
}
impl Default for Matching {
	fn default() -> Self {
		Self {
			min_score: default_min_score(),
			batch_concurrency: default_batch_concurrency(),
			batch_pause_ms: default_batch_pause_ms(),
			sequential_pause_ms: default_sequential_pause_ms(),
			run_deadline_secs: default_run_deadline_secs(),
		}
	}
}

fn default_registry_path() -> String {
	"/studies".to_string()
}

fn default_page_size() -> u32 {
	30
}

fn default_expansion_min_results() -> u32 {
	10
}

fn default_registry_timeout_ms() -> u64 {
	15_000
}

fn default_reasoning_path() -> String {
	"/chat/completions".to_string()
}

fn default_temperature() -> f32 {
	0.2
}

fn default_reasoning_timeout_ms() -> u64 {
	30_000
}

fn default_max_retries() -> u32 {
	3
}

fn default_backoff_base_ms() -> u64 {
	500
}

fn default_backoff_cap_ms() -> u64 {
	30_000
}

fn default_min_score() -> i32 {
	40
}

fn default_batch_concurrency() -> u32 {
	5
}

fn default_batch_pause_ms() -> u64 {
	1_000
}

fn default_sequential_pause_ms() -> u64 {
	300
}

fn default_run_deadline_secs() -> u64 {
	300
}
