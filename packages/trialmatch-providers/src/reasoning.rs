use std::time::Duration;

use reqwest::{Client, StatusCode, header::RETRY_AFTER};
use serde_json::Value;

use trialmatch_config::Reasoning;

use crate::{Error, Result};

/// One chat-completion call against the reasoning service. Performs exactly
/// one attempt; the scoring engine owns the retry/backoff schedule. A 429 is
/// surfaced as `RateLimited` with the server-suggested wait when present.
pub async fn complete(cfg: &Reasoning, messages: &[Value]) -> Result<String> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"temperature": cfg.temperature,
		"messages": messages,
	});
	let response = client
		.post(&url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let status = response.status();

	if status == StatusCode::TOO_MANY_REQUESTS {
		let retry_after_secs = response
			.headers()
			.get(RETRY_AFTER)
			.and_then(|value| value.to_str().ok())
			.and_then(|value| value.trim().parse::<u64>().ok());

		return Err(Error::RateLimited { retry_after_secs });
	}
	if !status.is_success() {
		return Err(Error::Http { status: status.as_u16() });
	}

	let json: Value = response.json().await?;

	extract_content(&json).ok_or(Error::MissingContent)
}

fn extract_content(json: &Value) -> Option<String> {
	json.get("choices")
		.and_then(Value::as_array)
		.and_then(|choices| choices.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|message| message.get("content"))
		.and_then(Value::as_str)
		.map(str::to_string)
}
