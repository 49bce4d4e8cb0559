mod error;
mod types;

pub use error::{Error, Result};
pub use types::{Config, Matching, Postgres, Reasoning, Registry, Service, Storage};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}
	if cfg.service.results_url_base.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.results_url_base must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.registry.api_base.trim().is_empty() {
		return Err(Error::Validation {
			message: "registry.api_base must be non-empty.".to_string(),
		});
	}
	if cfg.registry.page_size == 0 {
		return Err(Error::Validation {
			message: "registry.page_size must be greater than zero.".to_string(),
		});
	}
	if cfg.registry.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "registry.timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.reasoning.api_key.trim().is_empty() {
		return Err(Error::Validation {
			message: "reasoning.api_key must be non-empty.".to_string(),
		});
	}
	if cfg.reasoning.model.trim().is_empty() {
		return Err(Error::Validation {
			message: "reasoning.model must be non-empty.".to_string(),
		});
	}
	if cfg.reasoning.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "reasoning.timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.reasoning.backoff_base_ms == 0 {
		return Err(Error::Validation {
			message: "reasoning.backoff_base_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.reasoning.backoff_cap_ms < cfg.reasoning.backoff_base_ms {
		return Err(Error::Validation {
			message: "reasoning.backoff_cap_ms must be at least reasoning.backoff_base_ms."
				.to_string(),
		});
	}
	if !(0..=100).contains(&cfg.matching.min_score) {
		return Err(Error::Validation {
			message: "matching.min_score must be in the range 0-100.".to_string(),
		});
	}
	if cfg.matching.batch_concurrency == 0 {
		return Err(Error::Validation {
			message: "matching.batch_concurrency must be greater than zero.".to_string(),
		});
	}
	if cfg.matching.run_deadline_secs == 0 {
		return Err(Error::Validation {
			message: "matching.run_deadline_secs must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	truncate_trailing_slashes(&mut cfg.registry.api_base);
	truncate_trailing_slashes(&mut cfg.reasoning.api_base);
	truncate_trailing_slashes(&mut cfg.service.results_url_base);
}

fn truncate_trailing_slashes(value: &mut String) {
	while value.ends_with('/') {
		value.pop();
	}
}
