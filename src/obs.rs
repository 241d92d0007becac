//! Optional observability helpers for session calls.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `bearer_session.call` with the `call` (kind)
//!   and `stage` (call site) fields, plus events when a refresh starts, queues, or settles.
//! - Enable `metrics` to increment the `bearer_session_call_total` counter for every
//!   attempt/success/failure/queued outcome, labeled by `call` + `outcome`.

mod tracing;

pub use tracing::*;

// self
use crate::_prelude::*;

/// Counter incremented once per recorded [`CallOutcome`].
pub const CALL_COUNTER: &str = "bearer_session_call_total";

/// Session call kinds observed by the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallKind {
	/// Regular API request issued by a consumer.
	Request,
	/// Shared refresh exchange.
	Refresh,
	/// Credential sign-in.
	SignIn,
}
impl CallKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CallKind::Request => "request",
			CallKind::Refresh => "refresh",
			CallKind::SignIn => "sign_in",
		}
	}
}
impl Display for CallKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallOutcome {
	/// Entry to a session helper.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
	/// Request joined the pending queue behind an in-flight refresh.
	Queued,
}
impl CallOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CallOutcome::Attempt => "attempt",
			CallOutcome::Success => "success",
			CallOutcome::Failure => "failure",
			CallOutcome::Queued => "queued",
		}
	}
}
impl Display for CallOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Bumps [`CALL_COUNTER`] for `kind` and `outcome`; a no-op unless `metrics` is enabled.
pub fn record_call_outcome(kind: CallKind, outcome: CallOutcome) {
	#[cfg(feature = "metrics")]
	metrics::counter!(CALL_COUNTER, "call" => kind.as_str(), "outcome" => outcome.as_str())
		.increment(1);

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn labels_are_stable() {
		assert_eq!(CallKind::SignIn.to_string(), "sign_in");
		assert_eq!(CallOutcome::Queued.as_str(), "queued");

		record_call_outcome(CallKind::Refresh, CallOutcome::Queued);
	}
}
