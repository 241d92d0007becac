//! Single-flight refresh exchange and the FIFO queue of requests waiting on it.
//!
//! The first request to see a `401` while no refresh is running becomes the leader: it flips
//! the in-flight flag and performs the exchange. Every later `401` enqueues a oneshot waiter
//! instead. Checking the flag and enqueuing happen in one critical section, and the flag is
//! cleared in the same critical section that drains the queue, so no waiter can slip in
//! between a drain and the reset.

// std
use std::collections::VecDeque;
// crates.io
use futures::channel::oneshot;
// self
use crate::{
	_prelude::*,
	api::ApiError,
	auth::AccessToken,
	error::RefreshError,
	http::{ACCEPT, ApiRequest, HttpTransport, Method},
	obs::{self, CallKind, CallOutcome, CallSpan, RefreshEvent},
	session::{JSON, Session, metrics::RefreshCounter},
};

type RefreshOutcome = Result<AccessToken, RefreshError>;
type Waiter = oneshot::Sender<RefreshOutcome>;

/// Refresh flag plus the queue of deferred completions.
#[derive(Debug, Default)]
pub(crate) struct RefreshState {
	in_flight: bool,
	next_ticket: u64,
	queue: VecDeque<(u64, Waiter)>,
}
impl RefreshState {
	pub(crate) fn in_flight(&self) -> bool {
		self.in_flight
	}

	pub(crate) fn pending(&self) -> usize {
		self.queue.len()
	}

	/// Claims the refresh when none is running; otherwise queues a waiter.
	fn join(&mut self) -> Role {
		if !self.in_flight {
			self.in_flight = true;

			return Role::Leader;
		}

		let (sender, receiver) = oneshot::channel();
		let ticket = self.next_ticket;

		self.next_ticket += 1;
		self.queue.push_back((ticket, sender));

		Role::Follower { ticket, depth: self.queue.len(), receiver }
	}

	/// Settles every queued waiter in enqueue order while keeping the flag set.
	fn settle_pending(&mut self, outcome: &RefreshOutcome) -> usize {
		let mut drained = 0;

		while let Some((_ticket, waiter)) = self.queue.pop_front() {
			// A dropped receiver means its caller went away; nothing left to deliver.
			let _ = waiter.send(outcome.clone());

			drained += 1;
		}

		drained
	}

	/// Drains the queue and clears the flag in one step.
	fn settle(&mut self, outcome: &RefreshOutcome) -> usize {
		let drained = self.settle_pending(outcome);

		self.in_flight = false;

		drained
	}
}

enum Role {
	Leader,
	Follower { ticket: u64, depth: usize, receiver: oneshot::Receiver<RefreshOutcome> },
}

/// Leadership over the in-flight refresh; releases it with [`RefreshError::Abandoned`] when
/// dropped unsettled.
struct RefreshLease {
	state: Arc<Mutex<RefreshState>>,
	settled: bool,
}
impl RefreshLease {
	fn new(state: Arc<Mutex<RefreshState>>) -> Self {
		Self { state, settled: false }
	}

	fn reject_pending(&self, err: &RefreshError) -> usize {
		self.state.lock().settle_pending(&Err(err.clone()))
	}

	fn settle(mut self, outcome: &RefreshOutcome) -> usize {
		self.settled = true;

		self.state.lock().settle(outcome)
	}
}
impl Drop for RefreshLease {
	fn drop(&mut self) {
		if !self.settled {
			self.state.lock().settle(&Err(RefreshError::Abandoned));
		}
	}
}

impl<T> Session<T>
where
	T: ?Sized + HttpTransport,
{
	/// Returns a fresh token, either by leading the refresh or by waiting on it.
	pub(super) async fn refreshed_token(&self) -> RefreshOutcome {
		let role = self.refresh.lock().join();

		match role {
			Role::Leader => self.lead_refresh().await,
			Role::Follower { ticket, depth, receiver } => {
				self.refresh_metrics.bump(RefreshCounter::Queued);
				obs::record_call_outcome(CallKind::Refresh, CallOutcome::Queued);
				obs::record_refresh_event(RefreshEvent::Queued { ticket, depth });

				receiver.await.unwrap_or(Err(RefreshError::Abandoned))
			},
		}
	}

	async fn lead_refresh(&self) -> RefreshOutcome {
		const KIND: CallKind = CallKind::Refresh;

		let lease = RefreshLease::new(self.refresh.clone());
		let span = CallSpan::new(KIND, "lead_refresh");

		obs::record_call_outcome(KIND, CallOutcome::Attempt);
		obs::record_refresh_event(RefreshEvent::Started);
		self.refresh_metrics.bump(RefreshCounter::Attempts);

		let exchanged = span
			.instrument(async {
				let token = self.exchange_refresh().await?;

				self.store
					.save(&self.config.token_key, token.expose().to_owned())
					.await
					.map_err(RefreshError::Storage)?;

				Ok::<_, RefreshError>(token)
			})
			.await;

		match exchanged {
			Ok(token) => {
				let outcome = Ok(token);
				let drained = lease.settle(&outcome);

				self.refresh_metrics.bump(RefreshCounter::Successes);
				obs::record_call_outcome(KIND, CallOutcome::Success);
				obs::record_refresh_event(RefreshEvent::Settled { success: true, drained });

				outcome
			},
			Err(err) => {
				let mut drained = lease.reject_pending(&err);

				if let Err(clear) = self.store.remove(&self.config.token_key).await {
					obs::record_refresh_event(RefreshEvent::ClearFailed {
						reason: &clear.to_string(),
					});
				}

				let outcome = Err(err);

				drained += lease.settle(&outcome);

				self.refresh_metrics.bump(RefreshCounter::Failures);
				obs::record_call_outcome(KIND, CallOutcome::Failure);
				obs::record_refresh_event(RefreshEvent::Settled { success: false, drained });

				outcome
			},
		}
	}

	/// Trades the out-of-band refresh credential for a new access token.
	async fn exchange_refresh(&self) -> RefreshOutcome {
		let url = self
			.config
			.refresh_url()
			.map_err(|err| RefreshError::Config { message: err.to_string() })?;
		let request = ApiRequest {
			method: Method::Post,
			url,
			headers: BTreeMap::from([(ACCEPT.to_owned(), JSON.to_owned())]),
			body: None,
		};
		let response = self.transport.send(request).await?;

		if !response.is_success() {
			return Err(RefreshError::Rejected(ApiError::from_response(&response)));
		}

		let body: serde_json::Value = serde_json::from_slice(&response.body).map_err(|err| {
			RefreshError::MalformedResponse { message: format!("body is not JSON ({err})") }
		})?;

		AccessToken::from_json_field(&body, &self.config.token_field).ok_or_else(|| {
			RefreshError::MalformedResponse {
				message: format!("missing `{}` token field", self.config.token_field),
			}
		})
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::task::Context;
	// crates.io
	use futures::{
		FutureExt,
		task::{self, ArcWake},
	};
	// self
	use super::*;

	fn follower(role: Role) -> (u64, oneshot::Receiver<RefreshOutcome>) {
		match role {
			Role::Follower { ticket, receiver, .. } => (ticket, receiver),
			Role::Leader => panic!("Expected a follower role while a refresh is in flight."),
		}
	}

	#[test]
	fn first_join_leads_and_later_joins_queue_in_order() {
		let mut state = RefreshState::default();

		assert!(matches!(state.join(), Role::Leader));
		assert!(state.in_flight());

		let tickets: Vec<u64> = (0..3).map(|_| follower(state.join()).0).collect();

		assert_eq!(tickets, vec![0, 1, 2]);
		assert_eq!(state.pending(), 3);
		assert_eq!(state.queue.iter().map(|(ticket, _)| *ticket).collect::<Vec<_>>(), tickets);
	}

	#[test]
	fn settle_resolves_every_waiter_then_clears_flag() {
		let mut state = RefreshState::default();
		let _ = state.join();
		let (_, mut first) = follower(state.join());
		let (_, mut second) = follower(state.join());
		let drained = state.settle(&Ok(AccessToken::new("xyz789")));

		assert_eq!(drained, 2);
		assert!(!state.in_flight());
		assert_eq!(state.pending(), 0);

		for receiver in [&mut first, &mut second] {
			let token = receiver
				.now_or_never()
				.expect("Waiter should be settled synchronously.")
				.expect("Sender should not be dropped.")
				.expect("Waiter should receive the new token.");

			assert_eq!(token.expose(), "xyz789");
		}
	}

	struct WakeLog {
		ticket: u64,
		log: Arc<Mutex<Vec<u64>>>,
	}
	impl ArcWake for WakeLog {
		fn wake_by_ref(arc_self: &Arc<Self>) {
			arc_self.log.lock().push(arc_self.ticket);
		}
	}

	#[test]
	fn waiters_are_woken_in_enqueue_order() {
		let mut state = RefreshState::default();
		let log = Arc::new(Mutex::new(Vec::new()));
		let _ = state.join();
		let mut waiters: Vec<_> = (0..3).map(|_| follower(state.join())).collect();

		// Register in reverse so wake order cannot simply mirror registration order.
		for (ticket, receiver) in waiters.iter_mut().rev() {
			let waker = task::waker(Arc::new(WakeLog { ticket: *ticket, log: log.clone() }));

			assert!(receiver.poll_unpin(&mut Context::from_waker(&waker)).is_pending());
		}

		assert_eq!(state.settle(&Ok(AccessToken::new("xyz789"))), 3);
		assert_eq!(*log.lock(), vec![0, 1, 2]);
	}

	#[test]
	fn settle_pending_keeps_flag_until_final_settle() {
		let mut state = RefreshState::default();
		let _ = state.join();
		let (_, early) = follower(state.join());

		assert_eq!(state.settle_pending(&Err(RefreshError::Abandoned)), 1);
		assert!(state.in_flight());

		let (_, late) = follower(state.join());

		assert_eq!(state.settle(&Err(RefreshError::Abandoned)), 1);
		assert!(!state.in_flight());

		for receiver in [early, late] {
			let outcome = receiver.now_or_never().expect("Waiter should be settled.");

			assert!(matches!(outcome, Ok(Err(RefreshError::Abandoned))));
		}
	}

	#[test]
	fn dropped_receivers_are_skipped() {
		let mut state = RefreshState::default();
		let _ = state.join();

		drop(follower(state.join()));

		assert_eq!(state.settle(&Ok(AccessToken::new("t"))), 1);
	}

	#[test]
	fn dropped_lease_releases_waiters_as_abandoned() {
		let state = Arc::new(Mutex::new(RefreshState::default()));
		let _ = state.lock().join();
		let (_, receiver) = follower(state.lock().join());

		drop(RefreshLease::new(state.clone()));

		assert!(!state.lock().in_flight());
		assert!(matches!(
			receiver.now_or_never(),
			Some(Ok(Err(RefreshError::Abandoned)))
		));
	}
}
