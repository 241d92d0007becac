// std
use std::{
	io,
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration as StdDuration,
};
// crates.io
use futures::{channel::oneshot, future};
use parking_lot::Mutex;
use serde_json::{Value, json};
// self
use bearer_session::{
	auth::AccessToken,
	config::SessionConfig,
	error::{Error, RefreshError, TransportError},
	http::{ApiRequest, ApiResponse, HttpTransport, TransportFuture},
	request::OutboundRequest,
	session::{RefreshSnapshot, Session},
	store::{MemoryStore, TokenStore},
};

const TOKEN_KEY: &str = SessionConfig::DEFAULT_TOKEN_KEY;

#[derive(Clone, Copy, Debug)]
enum RefreshScript {
	Token(&'static str),
	NetworkDown,
}

/// Resource endpoints accept only `Bearer <valid>`; `/public/*` accepts anything.
/// The refresh endpoint optionally blocks on a gate until the test releases it.
struct ScriptedTransport {
	valid: &'static str,
	refresh_default: RefreshScript,
	refresh_gate: Mutex<Option<oneshot::Receiver<RefreshScript>>>,
	refresh_calls: AtomicUsize,
	log: Mutex<Vec<(String, Option<String>)>>,
}
impl ScriptedTransport {
	fn new(valid: &'static str, refresh_default: RefreshScript) -> Self {
		Self {
			valid,
			refresh_default,
			refresh_gate: Mutex::new(None),
			refresh_calls: AtomicUsize::new(0),
			log: Mutex::new(Vec::new()),
		}
	}

	fn gated(valid: &'static str) -> (Self, oneshot::Sender<RefreshScript>) {
		let (sender, receiver) = oneshot::channel();
		let transport = Self::new(valid, RefreshScript::NetworkDown);

		*transport.refresh_gate.lock() = Some(receiver);

		(transport, sender)
	}

	fn refresh_calls(&self) -> usize {
		self.refresh_calls.load(Ordering::SeqCst)
	}

	fn log(&self) -> Vec<(String, Option<String>)> {
		self.log.lock().clone()
	}
}
impl HttpTransport for ScriptedTransport {
	fn send(&self, request: ApiRequest) -> TransportFuture<'_> {
		Box::pin(async move {
			let path = request.url.path().trim_start_matches("/api").to_owned();

			if path == "/auth/refresh" {
				self.refresh_calls.fetch_add(1, Ordering::SeqCst);

				let gate = self.refresh_gate.lock().take();
				let script = match gate {
					Some(receiver) => receiver.await.unwrap_or(RefreshScript::NetworkDown),
					None => self.refresh_default,
				};

				return match script {
					RefreshScript::Token(token) => Ok(json_response(200, json!({ "accessToken": token }))),
					RefreshScript::NetworkDown => Err(TransportError::Io(io::Error::new(
						io::ErrorKind::ConnectionRefused,
						"connection refused",
					))),
				};
			}

			let authorization = request.authorization().map(str::to_owned);

			self.log.lock().push((path.clone(), authorization.clone()));

			let expected = format!("Bearer {}", self.valid);

			if path.starts_with("/public") || authorization.as_deref() == Some(expected.as_str()) {
				Ok(json_response(200, json!({ "path": path, "success": true })))
			} else {
				Ok(json_response(401, json!({ "message": "jwt expired" })))
			}
		})
	}
}

fn json_response(status: u16, body: Value) -> ApiResponse {
	ApiResponse {
		status,
		headers: [("content-type".to_owned(), "application/json".to_owned())].into(),
		body: serde_json::to_vec(&body).expect("Fixture body should serialize."),
	}
}

fn build_session(transport: ScriptedTransport) -> (Session<ScriptedTransport>, Arc<MemoryStore>) {
	let store = Arc::new(MemoryStore::default());
	let config =
		SessionConfig::new("https://cms.example.com/api").expect("Failed to build test config.");
	let dyn_store: Arc<dyn TokenStore> = store.clone();

	(Session::with_transport(config, dyn_store, transport), store)
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
	tokio::time::timeout(StdDuration::from_secs(5), async {
		while !condition() {
			tokio::task::yield_now().await;
		}
	})
	.await
	.expect("Condition should hold before the timeout.");
}

#[tokio::test]
async fn concurrent_requests_without_token_send_no_authorization() {
	let (session, _store) = build_session(ScriptedTransport::new("unused", RefreshScript::NetworkDown));
	let requests = (0..5).map(|i| session.send(OutboundRequest::get(format!("/public/{i}"))));
	let responses = future::join_all(requests).await;

	assert!(responses.iter().all(Result::is_ok));
	assert_eq!(session.transport.log().len(), 5);
	assert!(session.transport.log().iter().all(|(_, auth)| auth.is_none()));
	assert_eq!(session.transport.refresh_calls(), 0);
}

#[tokio::test]
async fn concurrent_requests_carry_the_stored_token() {
	let (session, store) = build_session(ScriptedTransport::new("abc123", RefreshScript::NetworkDown));

	store.insert(TOKEN_KEY, "abc123");

	let requests =
		(0..5).map(|i| session.fetch::<Value>(OutboundRequest::get(format!("/services/{i}"))));
	let responses = future::join_all(requests).await;

	assert!(responses.iter().all(Result::is_ok));
	assert!(
		session.transport.log().iter().all(|(_, auth)| auth.as_deref() == Some("Bearer abc123"))
	);
	assert_eq!(session.transport.refresh_calls(), 0);
}

#[tokio::test]
async fn overlapping_unauthorized_responses_share_one_refresh() {
	let (transport, release) = ScriptedTransport::gated("xyz789");
	let (session, store) = build_session(transport);

	store.insert(TOKEN_KEY, "abc123");

	let leader = {
		let session = session.clone();

		tokio::spawn(async move { session.get::<Value>("/foo").await })
	};

	wait_until(|| session.is_refreshing()).await;

	let followers: Vec<_> = ["/sliders", "/galleries", "/settings"]
		.into_iter()
		.map(|path| {
			let session = session.clone();

			tokio::spawn(async move { session.get::<Value>(path).await })
		})
		.collect();

	wait_until(|| session.pending_requests() == 3).await;

	assert_eq!(session.transport.refresh_calls(), 1);
	assert!(session.is_refreshing());

	release.send(RefreshScript::Token("xyz789")).expect("Refresh gate should still be open.");

	let body = leader.await.expect("Leader task should not panic.").expect("Leader should succeed.");

	assert_eq!(body, json!({ "path": "/foo", "success": true }));

	for (handle, path) in followers.into_iter().zip(["/sliders", "/galleries", "/settings"]) {
		let body =
			handle.await.expect("Follower task should not panic.").expect("Follower should succeed.");

		assert_eq!(body["path"], path);
	}

	let log = session.transport.log();
	let replays: Vec<_> = log
		.iter()
		.filter(|(_, auth)| auth.as_deref() == Some("Bearer xyz789"))
		.map(|(path, _)| path.as_str())
		.collect();

	assert_eq!(log.len(), 8);
	// The leader replays first, then the waiters in the order they queued.
	assert_eq!(replays, ["/foo", "/sliders", "/galleries", "/settings"]);
	assert_eq!(session.transport.refresh_calls(), 1);
	assert_eq!(store.get(TOKEN_KEY).as_deref(), Some("xyz789"));
	assert_eq!(session.refresh_metrics.snapshot(), RefreshSnapshot {
		attempts: 1,
		successes: 1,
		failures: 0,
		queued: 3,
	});
	assert!(!session.is_refreshing());
	assert_eq!(session.pending_requests(), 0);
}

#[tokio::test]
async fn refresh_network_failure_rejects_leader_and_queue_with_same_error() {
	let (transport, release) = ScriptedTransport::gated("never-valid");
	let (session, store) = build_session(transport);

	store.insert(TOKEN_KEY, "abc123");

	let a = {
		let session = session.clone();

		tokio::spawn(async move { session.get::<Value>("/a").await })
	};

	wait_until(|| session.is_refreshing()).await;

	let b = {
		let session = session.clone();

		tokio::spawn(async move { session.get::<Value>("/b").await })
	};

	wait_until(|| session.pending_requests() == 1).await;
	release.send(RefreshScript::NetworkDown).expect("Refresh gate should still be open.");

	let err_a = a.await.expect("Task A should not panic.").expect_err("A should fail.");
	let err_b = b.await.expect("Task B should not panic.").expect_err("B should fail.");

	match (&err_a, &err_b) {
		(
			Error::Refresh(RefreshError::Transport(first)),
			Error::Refresh(RefreshError::Transport(second)),
		) => assert!(Arc::ptr_eq(first, second)),
		other => panic!("Unexpected error variants: {other:?}."),
	}

	assert_eq!(store.get(TOKEN_KEY), None);
	assert_eq!(session.transport.log().len(), 2, "No request should be replayed.");
	assert_eq!(session.refresh_metrics.failures(), 1);
	assert!(!session.is_refreshing());
}

#[tokio::test]
async fn malformed_refresh_response_fails_request() {
	let (session, store) =
		build_session(ScriptedTransport::new("never-valid", RefreshScript::Token("   ")));

	store.insert(TOKEN_KEY, "abc123");

	let err = session
		.get::<Value>("/contacts")
		.await
		.expect_err("A blank refreshed token should be treated as a refresh failure.");

	assert!(matches!(err, Error::Refresh(RefreshError::MalformedResponse { .. })));
	assert_eq!(err.user_message("Failed to load inquiries"), "Failed to load inquiries");
	assert_eq!(store.get(TOKEN_KEY), None);
}

#[tokio::test]
async fn dropped_leader_releases_queued_requests() {
	let (transport, _release) = ScriptedTransport::gated("xyz789");
	let (session, store) = build_session(transport);

	store.insert(TOKEN_KEY, "abc123");

	let leader = {
		let session = session.clone();

		tokio::spawn(async move { session.get::<Value>("/foo").await })
	};

	wait_until(|| session.is_refreshing()).await;

	let follower = {
		let session = session.clone();

		tokio::spawn(async move { session.get::<Value>("/bar").await })
	};

	wait_until(|| session.pending_requests() == 1).await;
	leader.abort();

	assert!(leader.await.expect_err("Leader should be cancelled.").is_cancelled());

	let err = follower.await.expect("Follower task should not panic.").expect_err("Follower should fail.");

	assert!(matches!(err, Error::Refresh(RefreshError::Abandoned)));
	assert!(!session.is_refreshing());

	session
		.set_access_token(Some(AccessToken::new("xyz789")))
		.await
		.expect("Token should be stored.");

	let body: Value = session.get("/baz").await.expect("Session should recover after abandonment.");

	assert_eq!(body["success"], true);
}
