use std::time::Duration;

const MAX_ERROR_CHARS: usize = 1_024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
	pub max_attempts: u32,
	pub base_backoff_ms: u64,
	pub max_backoff_ms: u64,
}
impl RetryPolicy {
	pub fn from_config(cfg: &quill_config::Queue) -> Self {
		Self {
			max_attempts: cfg.max_attempts,
			base_backoff_ms: cfg.base_backoff_ms,
			max_backoff_ms: cfg.max_backoff_ms,
		}
	}

	/// `base * 2^(attempt - 1)`, capped at the maximum.
	pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
		let exp = attempt.max(1).saturating_sub(1).min(16);
		let base = self.base_backoff_ms.saturating_mul(1_u64 << exp);

		Duration::from_millis(base.min(self.max_backoff_ms))
	}

	pub fn is_exhausted(&self, attempts: u32) -> bool {
		attempts >= self.max_attempts
	}
}

/// Redacts credentials and bounds the length of error text stored with a message.
pub fn sanitize_error(text: &str) -> String {
	let mut parts = Vec::new();
	let mut redact_next = false;

	for raw in text.split_whitespace() {
		let mut word = raw.to_string();

		if redact_next {
			word = "[REDACTED]".to_string();
			redact_next = false;
		}
		if raw.eq_ignore_ascii_case("bearer") {
			redact_next = true;
		}

		let lowered = raw.to_ascii_lowercase();

		for key in ["api_key", "apikey", "password", "secret", "token"] {
			if lowered.contains(key) && (lowered.contains('=') || lowered.contains(':')) {
				let sep = if raw.contains('=') { '=' } else { ':' };
				let prefix = raw.split(sep).next().unwrap_or(raw);

				word = format!("{prefix}{sep}[REDACTED]");

				break;
			}
		}

		parts.push(word);
	}

	let mut out = parts.join(" ");

	if out.chars().count() > MAX_ERROR_CHARS {
		out = out.chars().take(MAX_ERROR_CHARS).collect();
		out.push_str("...");
	}

	out
}

#[cfg(test)]
mod tests {
	use super::*;

	fn policy() -> RetryPolicy {
		RetryPolicy { max_attempts: 3, base_backoff_ms: 500, max_backoff_ms: 30_000 }
	}

	#[test]
	fn backoff_doubles_and_caps() {
		let policy = policy();

		assert_eq!(policy.backoff_for_attempt(0), Duration::from_millis(500));
		assert_eq!(policy.backoff_for_attempt(1), Duration::from_millis(500));
		assert_eq!(policy.backoff_for_attempt(2), Duration::from_millis(1_000));
		assert_eq!(policy.backoff_for_attempt(4), Duration::from_millis(4_000));
		assert_eq!(policy.backoff_for_attempt(12), Duration::from_millis(30_000));
		assert_eq!(policy.backoff_for_attempt(u32::MAX), Duration::from_millis(30_000));
	}

	#[test]
	fn exhaustion_starts_at_max_attempts() {
		let policy = policy();

		assert!(!policy.is_exhausted(2));
		assert!(policy.is_exhausted(3));
	}

	#[test]
	fn sanitize_redacts_credentials() {
		let out = sanitize_error("request failed: Bearer abc123 api_key=xyz password:hunter2");

		assert!(!out.contains("abc123"));
		assert!(!out.contains("xyz"));
		assert!(!out.contains("hunter2"));
		assert!(out.contains("api_key=[REDACTED]"));
		assert!(out.contains("password:[REDACTED]"));
	}

	#[test]
	fn sanitize_truncates_long_text() {
		let out = sanitize_error(&"x".repeat(2_000));

		assert_eq!(out.chars().count(), MAX_ERROR_CHARS + 3);
		assert!(out.ends_with("..."));
	}
}
