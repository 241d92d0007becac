// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of [`RefreshMetrics`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RefreshSnapshot {
	/// Exchanges started.
	pub attempts: u64,
	/// Exchanges that produced a new token.
	pub successes: u64,
	/// Exchanges that failed.
	pub failures: u64,
	/// Requests that waited behind an in-flight exchange.
	pub queued: u64,
}
impl RefreshSnapshot {
	/// Exchanges that have started without recording a result yet.
	pub fn in_flight(&self) -> u64 {
		self.attempts.saturating_sub(self.successes + self.failures)
	}
}

/// Shared counters for refresh exchanges.
#[derive(Debug, Default)]
pub struct RefreshMetrics([AtomicU64; 4]);
impl RefreshMetrics {
	/// Returns the number of refresh exchanges started.
	pub fn attempts(&self) -> u64 {
		self.get(RefreshCounter::Attempts)
	}

	/// Returns the number of exchanges that produced a new token.
	pub fn successes(&self) -> u64 {
		self.get(RefreshCounter::Successes)
	}

	/// Returns the number of exchanges that failed.
	pub fn failures(&self) -> u64 {
		self.get(RefreshCounter::Failures)
	}

	/// Returns the number of requests that waited behind an in-flight exchange.
	pub fn queued(&self) -> u64 {
		self.get(RefreshCounter::Queued)
	}

	/// Copies every counter at once.
	pub fn snapshot(&self) -> RefreshSnapshot {
		RefreshSnapshot {
			attempts: self.attempts(),
			successes: self.successes(),
			failures: self.failures(),
			queued: self.queued(),
		}
	}

	pub(crate) fn bump(&self, counter: RefreshCounter) {
		self.0[counter as usize].fetch_add(1, Ordering::Relaxed);
	}

	fn get(&self, counter: RefreshCounter) -> u64 {
		self.0[counter as usize].load(Ordering::Relaxed)
	}
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum RefreshCounter {
	Attempts,
	Successes,
	Failures,
	Queued,
}
