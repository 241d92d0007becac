//! Demonstrates plugging an in-process [`HttpTransport`] into a [`Session`].
//!
//! 1. Implement [`HttpTransport`] so requests are answered without touching the network.
//! 2. Seed the [`MemoryStore`] with an access token the "server" no longer accepts.
//! 3. Fire several requests at once; only one refresh exchange runs.
//! 4. Log out and observe that the next request carries no `Authorization` header.

// std
use std::sync::{
	Arc,
	atomic::{AtomicU32, Ordering},
};
// crates.io
use color_eyre::Result;
use futures::future;
use parking_lot::Mutex;
use serde_json::{Value, json};
// self
use bearer_session::{
	config::SessionConfig,
	error::TransportError,
	http::{ApiRequest, ApiResponse, HttpTransport, TransportFuture},
	session::Session,
	store::{MemoryStore, TokenStore},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let store = Arc::new(MemoryStore::default());
	let config = SessionConfig::new("https://cms.example.com/api")?;
	let session = Session::with_transport(
		config,
		Arc::clone(&store) as Arc<dyn TokenStore>,
		RotatingTransport::default(),
	);

	store.insert(SessionConfig::DEFAULT_TOKEN_KEY, "expired-0");

	let paths = ["/categories", "/sliders", "/settings"];
	let bodies = future::try_join_all(paths.map(|path| session.get::<Value>(path))).await?;

	for body in &bodies {
		println!("{} answered with {}.", body["path"], body["token"]);
	}

	println!(
		"Refresh exchanges: {}; requests that waited on one: {}.",
		session.refresh_metrics.attempts(),
		session.refresh_metrics.queued(),
	);

	session.logout().await?;

	let anonymous: Value = session.get("/public/about").await?;

	println!("After logout the server saw token {}.", anonymous["token"]);

	Ok(())
}

/// Accepts only the most recently issued token; every refresh issues a new one.
#[derive(Debug, Default)]
struct RotatingTransport {
	generation: AtomicU32,
	valid: Mutex<Option<String>>,
}
impl RotatingTransport {
	fn answer(&self, request: &ApiRequest) -> ApiResponse {
		let path = request.url.path().trim_start_matches("/api");

		if path == "/auth/refresh" {
			let token = format!("fresh-{}", self.generation.fetch_add(1, Ordering::SeqCst) + 1);

			*self.valid.lock() = Some(token.clone());

			return respond(200, json!({ "accessToken": token }));
		}

		let token = request.authorization().and_then(|value| value.strip_prefix("Bearer "));
		let accepted = path.starts_with("/public")
			|| matches!((token, self.valid.lock().as_deref()), (Some(sent), Some(valid)) if sent == valid);

		if accepted {
			respond(200, json!({ "path": path, "token": token }))
		} else {
			respond(401, json!({ "message": "jwt expired" }))
		}
	}
}
impl HttpTransport for RotatingTransport {
	fn send(&self, request: ApiRequest) -> TransportFuture<'_> {
		Box::pin(async move { Ok::<_, TransportError>(self.answer(&request)) })
	}
}

fn respond(status: u16, body: Value) -> ApiResponse {
	ApiResponse {
		status,
		headers: Default::default(),
		body: serde_json::to_vec(&body).unwrap_or_default(),
	}
}
