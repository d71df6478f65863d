//! Reconnect policy and supervisor.
//!
//! The supervisor owns the attempt counter and the single pending retry wait.
//! It does not connect anything itself: the bridge asks it what to do after a
//! loss or failed attempt, arms a wait, and performs the attempt when the wait
//! elapses uncancelled.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Linear backoff with a cap and a bounded number of attempts.
///
/// Attempt `n` (1-based) waits `min(step * n, max_delay)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconnectPolicy {
	pub max_attempts: u32,
	pub step_secs: u64,
	pub max_delay_secs: u64,
}

impl Default for ReconnectPolicy {
	fn default() -> Self {
		Self {
			max_attempts: 5,
			step_secs: 5,
			max_delay_secs: 30,
		}
	}
}

impl ReconnectPolicy {
	/// Delay before attempt `attempt`, or `None` once the budget is spent.
	pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
		if attempt == 0 || attempt > self.max_attempts {
			return None;
		}
		let secs = self.step_secs.saturating_mul(u64::from(attempt));
		Some(Duration::from_secs(secs.min(self.max_delay_secs)))
	}

	/// Every delay the policy will ever produce, in order.
	pub fn schedule(&self) -> impl Iterator<Item = Duration> + '_ {
		(1..=self.max_attempts).filter_map(|attempt| self.delay_for(attempt))
	}
}

/// What to do after a loss or a failed connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
	/// Wait `delay`, then make attempt number `attempt`.
	Retry { attempt: u32, delay: Duration },
	/// The budget is spent; stay disconnected until the caller connects.
	Exhausted { attempts: u32 },
	/// Auto-reconnect is off.
	Disabled,
}

/// Tracks consecutive reconnect attempts and the pending wait.
#[derive(Debug)]
pub struct ReconnectSupervisor {
	policy: ReconnectPolicy,
	attempt: AtomicU32,
	enabled: AtomicBool,
	pending: Mutex<Option<CancellationToken>>,
}

impl ReconnectSupervisor {
	pub fn new(policy: ReconnectPolicy, enabled: bool) -> Self {
		Self {
			policy,
			attempt: AtomicU32::new(0),
			enabled: AtomicBool::new(enabled),
			pending: Mutex::new(None),
		}
	}

	pub fn policy(&self) -> &ReconnectPolicy {
		&self.policy
	}

	pub fn is_enabled(&self) -> bool {
		self.enabled.load(Ordering::Acquire)
	}

	pub fn enable(&self) {
		self.enabled.store(true, Ordering::Release);
	}

	/// Turns auto-reconnect off and cancels any pending wait.
	pub fn disable(&self) {
		self.enabled.store(false, Ordering::Release);
		self.cancel_pending();
	}

	/// Number of consecutive reconnect attempts made so far.
	pub fn attempt(&self) -> u32 {
		self.attempt.load(Ordering::Acquire)
	}

	pub fn reset(&self) {
		self.attempt.store(0, Ordering::Release);
	}

	/// Decides the next step after a loss or failure, consuming one attempt
	/// from the budget when a retry is granted.
	pub fn next_step(&self) -> RetryDecision {
		if !self.is_enabled() {
			return RetryDecision::Disabled;
		}
		let attempt = self.attempt.fetch_add(1, Ordering::AcqRel) + 1;
		match self.policy.delay_for(attempt) {
			Some(delay) => RetryDecision::Retry { attempt, delay },
			None => RetryDecision::Exhausted {
				attempts: attempt - 1,
			},
		}
	}

	/// Registers a new pending wait, cancelling any previous one.
	pub fn arm(&self) -> CancellationToken {
		let token = CancellationToken::new();
		if let Some(previous) = self.pending.lock().replace(token.clone()) {
			previous.cancel();
		}
		token
	}

	/// Cancels the pending wait, if any.
	pub fn cancel_pending(&self) {
		if let Some(token) = self.pending.lock().take() {
			debug!(target: "scenelink::reconnect", "cancelling pending reconnect");
			token.cancel();
		}
	}

	/// Whether a wait is armed and not yet cancelled.
	pub fn has_pending(&self) -> bool {
		self.pending
			.lock()
			.as_ref()
			.is_some_and(|token| !token.is_cancelled())
	}

	/// Sleeps for `delay` unless `token` is cancelled first. Returns true when
	/// the full delay elapsed.
	pub async fn wait(delay: Duration, token: &CancellationToken) -> bool {
		tokio::select! {
			biased;
			_ = token.cancelled() => false,
			_ = tokio::time::sleep(delay) => !token.is_cancelled(),
		}
	}
}
