// self
use crate::{_prelude::*, obs::CallKind};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedCall<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedCall<F> = F;

/// A span builder used by session calls.
#[derive(Clone, Debug)]
pub struct CallSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl CallSpan {
	/// Creates a new span tagged with the provided call kind + stage.
	pub fn new(kind: CallKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("bearer_session.call", call = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedCall<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Refresh lifecycle points worth a log line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshEvent<'a> {
	/// A 401 started a new refresh exchange.
	Started,
	/// A 401 joined the pending queue behind the in-flight refresh.
	Queued {
		/// Position-stable ticket assigned at enqueue time.
		ticket: u64,
		/// Queue length after the push.
		depth: usize,
	},
	/// The exchange settled and the queue was drained.
	Settled {
		/// Whether a new token was obtained.
		success: bool,
		/// How many queued requests were settled.
		drained: usize,
	},
	/// Clearing the stored token after a failed refresh failed too.
	ClearFailed {
		/// Rendered storage error.
		reason: &'a str,
	},
}

/// Emits `event` through `tracing` (when enabled).
pub fn record_refresh_event(event: RefreshEvent<'_>) {
	#[cfg(feature = "tracing")]
	{
		match event {
			RefreshEvent::Started => tracing::debug!("access token rejected, starting refresh"),
			RefreshEvent::Queued { ticket, depth } =>
				tracing::debug!(ticket, depth, "refresh in flight, request queued"),
			RefreshEvent::Settled { success: true, drained } =>
				tracing::debug!(drained, "refresh succeeded"),
			RefreshEvent::Settled { success: false, drained } =>
				tracing::warn!(drained, "refresh failed, credential cleared"),
			RefreshEvent::ClearFailed { reason } =>
				tracing::error!(reason, "failed to clear access token after refresh failure"),
		}
	}

	#[cfg(not(feature = "tracing"))]
	{
		let _ = event;
	}
}
