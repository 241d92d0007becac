//! Authenticated request client with transparent access-token refresh.
//!
//! [`Session`] attaches `Authorization: Bearer <token>` to every request, reading the token
//! from its [`TokenStore`] on each call. When a response comes back `401` and the request has
//! not been retried yet, the session either starts the single shared refresh exchange or
//! queues behind the one already in flight, then replays the request once with the new
//! token. A failed refresh clears the stored token and fails every waiting request with the
//! same [`RefreshError`](crate::error::RefreshError).

mod metrics;
mod refresh;

pub use metrics::{RefreshMetrics, RefreshSnapshot};

// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	api::ApiError,
	auth::AccessToken,
	config::SessionConfig,
	http::{ACCEPT, AUTHORIZATION, ApiRequest, ApiResponse, CONTENT_TYPE, HttpTransport},
	obs::{self, CallKind, CallOutcome, CallSpan},
	request::OutboundRequest,
	store::TokenStore,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;
use refresh::RefreshState;

#[cfg(feature = "reqwest")]
/// Session specialized for the crate's default reqwest transport.
pub type ReqwestSession = Session<ReqwestTransport>;

const UNAUTHORIZED: u16 = 401;
const JSON: &str = "application/json";

/// Owns the credential store handle, the refresh flag, and the pending request queue.
///
/// Clones share all state, so one logical session can be handed to every feature module
/// and used from any executor thread.
pub struct Session<T>
where
	T: ?Sized + HttpTransport,
{
	/// Transport used for every outbound request, including refresh exchanges.
	pub transport: Arc<T>,
	/// Credential storage holding the access token.
	pub store: Arc<dyn TokenStore>,
	/// Base URL, storage key, and refresh endpoint settings.
	pub config: Arc<SessionConfig>,
	/// Shared counters for refresh outcomes.
	pub refresh_metrics: Arc<RefreshMetrics>,
	refresh: Arc<Mutex<RefreshState>>,
}
impl<T> Session<T>
where
	T: ?Sized + HttpTransport,
{
	/// Creates a session that reuses the caller-provided transport.
	pub fn with_transport(
		config: SessionConfig,
		store: Arc<dyn TokenStore>,
		transport: impl Into<Arc<T>>,
	) -> Self {
		Self {
			transport: transport.into(),
			store,
			config: Arc::new(config),
			refresh_metrics: Default::default(),
			refresh: Default::default(),
		}
	}

	/// Reads the current access token from storage.
	pub async fn access_token(&self) -> Result<Option<AccessToken>> {
		let raw = self.store.load(&self.config.token_key).await?;

		Ok(raw.filter(|value| !value.is_empty()).map(AccessToken::new))
	}

	/// Stores `token`, or clears the stored token when `None`.
	///
	/// The change is visible to the next request; nothing caches the header value.
	pub async fn set_access_token(&self, token: Option<AccessToken>) -> Result<()> {
		match token {
			Some(token) => self.store.save(&self.config.token_key, token.into_inner()).await?,
			None => self.store.remove(&self.config.token_key).await?,
		}

		Ok(())
	}

	/// Clears the stored token. Purely local; no network call is made.
	pub async fn logout(&self) -> Result<()> {
		self.set_access_token(None).await
	}

	/// Whether a refresh exchange is currently in flight.
	pub fn is_refreshing(&self) -> bool {
		self.refresh.lock().in_flight()
	}

	/// Number of requests waiting on the in-flight refresh.
	pub fn pending_requests(&self) -> usize {
		self.refresh.lock().pending()
	}

	/// Sends `request` and returns the raw response.
	///
	/// 2xx responses are returned as-is; any other status becomes [`Error::Api`] after the
	/// refresh protocol had its one chance to recover a `401`.
	pub async fn send(&self, request: OutboundRequest) -> Result<ApiResponse> {
		const KIND: CallKind = CallKind::Request;

		let span = CallSpan::new(KIND, "send");

		obs::record_call_outcome(KIND, CallOutcome::Attempt);

		let result = span.instrument(self.send_with_recovery(request)).await;

		match &result {
			Ok(_) => obs::record_call_outcome(KIND, CallOutcome::Success),
			Err(_) => obs::record_call_outcome(KIND, CallOutcome::Failure),
		}

		result
	}

	/// Sends `request` and decodes the JSON response body into `R`.
	pub async fn fetch<R>(&self, request: OutboundRequest) -> Result<R>
	where
		R: DeserializeOwned,
	{
		self.send(request).await?.json()
	}

	/// `GET path`, decoding the JSON response.
	pub async fn get<R>(&self, path: &str) -> Result<R>
	where
		R: DeserializeOwned,
	{
		self.fetch(OutboundRequest::get(path)).await
	}

	/// `POST path` with a JSON body, decoding the JSON response.
	pub async fn post<B, R>(&self, path: &str, body: &B) -> Result<R>
	where
		B: ?Sized + Serialize,
		R: DeserializeOwned,
	{
		self.fetch(OutboundRequest::post(path).json(body)?).await
	}

	/// `PUT path` with a JSON body, decoding the JSON response.
	pub async fn put<B, R>(&self, path: &str, body: &B) -> Result<R>
	where
		B: ?Sized + Serialize,
		R: DeserializeOwned,
	{
		self.fetch(OutboundRequest::put(path).json(body)?).await
	}

	/// `PATCH path` with a JSON body, decoding the JSON response.
	pub async fn patch<B, R>(&self, path: &str, body: &B) -> Result<R>
	where
		B: ?Sized + Serialize,
		R: DeserializeOwned,
	{
		self.fetch(OutboundRequest::patch(path).json(body)?).await
	}

	/// `DELETE path`, decoding the JSON response (an empty body decodes as `null`).
	pub async fn delete<R>(&self, path: &str) -> Result<R>
	where
		R: DeserializeOwned,
	{
		self.fetch(OutboundRequest::delete(path)).await
	}

	/// Posts `credentials` to `path`, stores the returned token, and returns it.
	///
	/// The request skips the refresh protocol: a `401` here means the credentials were
	/// rejected and is returned as [`Error::Api`].
	pub async fn sign_in<B>(&self, path: &str, credentials: &B) -> Result<AccessToken>
	where
		B: ?Sized + Serialize,
	{
		const KIND: CallKind = CallKind::SignIn;

		let span = CallSpan::new(KIND, "sign_in");

		obs::record_call_outcome(KIND, CallOutcome::Attempt);

		let request = OutboundRequest::post(path).json(credentials)?.skip_refresh();
		let result = span
			.instrument(async move {
				let body: serde_json::Value = self.send_with_recovery(request).await?.json()?;
				let token = AccessToken::from_json_field(&body, &self.config.token_field)
					.ok_or_else(|| Error::MissingAccessToken {
						field: self.config.token_field.clone(),
					})?;

				self.set_access_token(Some(token.clone())).await?;

				Ok(token)
			})
			.await;

		match &result {
			Ok(_) => obs::record_call_outcome(KIND, CallOutcome::Success),
			Err(_) => obs::record_call_outcome(KIND, CallOutcome::Failure),
		}

		result
	}

	async fn send_with_recovery(&self, mut request: OutboundRequest) -> Result<ApiResponse> {
		let token = self.access_token().await?;
		let response = self.dispatch(&request, token.as_ref()).await?;

		if response.status != UNAUTHORIZED || request.is_retried() {
			return pass_through(response);
		}

		request.mark_retried();

		let token = self.refreshed_token().await?;
		let response = self.dispatch(&request, Some(&token)).await?;

		pass_through(response)
	}

	async fn dispatch(
		&self,
		request: &OutboundRequest,
		token: Option<&AccessToken>,
	) -> Result<ApiResponse> {
		let api_request = self.build_request(request, token)?;

		Ok(self.transport.send(api_request).await?)
	}

	fn build_request(
		&self,
		request: &OutboundRequest,
		token: Option<&AccessToken>,
	) -> Result<ApiRequest> {
		let url = self.config.resolve(&request.path, &request.query)?;
		let mut headers = BTreeMap::from([(ACCEPT.to_owned(), JSON.to_owned())]);

		for (name, value) in &request.headers {
			if !is_valid_header(name, value) {
				return Err(crate::error::ConfigError::InvalidHeader { name: name.clone() }.into());
			}

			headers.insert(name.to_ascii_lowercase(), value.clone());
		}

		let body = match &request.body {
			Some(value) => {
				headers.entry(CONTENT_TYPE.to_owned()).or_insert_with(|| JSON.to_owned());

				Some(serde_json::to_vec(value).map_err(Error::Encode)?)
			},
			None => None,
		};

		if let Some(token) = token {
			headers.insert(AUTHORIZATION.to_owned(), token.bearer());
		}

		Ok(ApiRequest { method: request.method, url, headers, body })
	}
}
#[cfg(feature = "reqwest")]
impl Session<ReqwestTransport> {
	/// Creates a new session backed by a cookie-aware reqwest transport.
	pub fn new(config: SessionConfig, store: Arc<dyn TokenStore>) -> Result<Self> {
		Ok(Self::with_transport(config, store, ReqwestTransport::new()?))
	}
}
impl<T> Clone for Session<T>
where
	T: ?Sized + HttpTransport,
{
	fn clone(&self) -> Self {
		Self {
			transport: self.transport.clone(),
			store: self.store.clone(),
			config: self.config.clone(),
			refresh_metrics: self.refresh_metrics.clone(),
			refresh: self.refresh.clone(),
		}
	}
}
impl<T> Debug for Session<T>
where
	T: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Session")
			.field("config", &self.config)
			.field("refreshing", &self.is_refreshing())
			.field("pending_requests", &self.pending_requests())
			.finish()
	}
}

fn pass_through(response: ApiResponse) -> Result<ApiResponse> {
	if response.is_success() { Ok(response) } else { Err(ApiError::from_response(&response).into()) }
}

fn is_valid_header(name: &str, value: &str) -> bool {
	!name.is_empty()
		&& name.bytes().all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b))
		&& !value.bytes().any(|b| matches!(b, b'\r' | b'\n' | b'\0'))
}
