use std::time::Duration;

use trialmatch_config::Reasoning;

/// Retry schedule for reasoning-service calls: base delay doubling per
/// attempt, capped, with a server-suggested wait taking precedence over the
/// computed delay. Sleeping goes through the injected `Sleeper`, so the
/// schedule is testable without real delays.
#[derive(Clone, Copy, Debug)]
pub struct BackoffPolicy {
	pub max_retries: u32,
	pub base_delay: Duration,
	pub max_delay: Duration,
}
impl BackoffPolicy {
	pub fn from_config(cfg: &Reasoning) -> Self {
		Self {
			max_retries: cfg.max_retries,
			base_delay: Duration::from_millis(cfg.backoff_base_ms),
			max_delay: Duration::from_millis(cfg.backoff_cap_ms),
		}
	}

	/// Delay before retry number `attempt` (zero-based).
	pub fn delay(&self, attempt: u32, server_hint: Option<Duration>) -> Duration {
		if let Some(hint) = server_hint {
			return hint.min(self.max_delay);
		}

		let base_ms = self.base_delay.as_millis() as u64;
		let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
		let delay_ms = base_ms.saturating_mul(factor);

		Duration::from_millis(delay_ms).min(self.max_delay)
	}
}
