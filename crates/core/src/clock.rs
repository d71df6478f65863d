//! Wall-clock source for `connected_since` and uptime.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync {
	fn now(&self) -> SystemTime;
}

/// The system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> SystemTime {
		SystemTime::now()
	}
}

/// A clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
	now: Arc<Mutex<SystemTime>>,
}

impl ManualClock {
	pub fn new(start: SystemTime) -> Self {
		Self {
			now: Arc::new(Mutex::new(start)),
		}
	}

	pub fn advance(&self, by: Duration) {
		let mut now = self.now.lock();
		*now += by;
	}

	pub fn set(&self, to: SystemTime) {
		*self.now.lock() = to;
	}
}

impl Default for ManualClock {
	fn default() -> Self {
		Self::new(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000))
	}
}

impl Clock for ManualClock {
	fn now(&self) -> SystemTime {
		*self.now.lock()
	}
}
