//! Transport primitives for API calls.
//!
//! The module exposes [`HttpTransport`] alongside the wire-level [`ApiRequest`] and
//! [`ApiResponse`] types so downstream crates can plug in custom HTTP stacks without losing
//! the session's refresh protocol. A transport only moves bytes: it never inspects status
//! codes and never retries, so a 401 reaches the session untouched.

// std
#[cfg(feature = "reqwest")] use std::ops::Deref;
// crates.io
use serde::de::DeserializeOwned;
use time::format_description::well_known::Rfc2822;
// self
use crate::_prelude::*;

/// Boxed future returned by [`HttpTransport::send`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<ApiResponse, crate::error::TransportError>> + 'a + Send>>;

/// Abstraction over HTTP stacks capable of executing session requests.
///
/// Implementations must be `Send + Sync + 'static` so a single transport can be shared by
/// every clone of a session, and the returned future must be `Send` so session futures can
/// hop executors.
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Sends `request` and resolves with whatever response the server produced.
	///
	/// Only failures where no response arrived are reported as errors; non-success statuses
	/// are successful transport outcomes.
	fn send(&self, request: ApiRequest) -> TransportFuture<'_>;
}

/// HTTP verbs used by admin API consumers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
	/// `GET`
	Get,
	/// `POST`
	Post,
	/// `PUT`
	Put,
	/// `PATCH`
	Patch,
	/// `DELETE`
	Delete,
}
impl Method {
	/// Returns the canonical upper-case verb.
	pub const fn as_str(self) -> &'static str {
		match self {
			Method::Get => "GET",
			Method::Post => "POST",
			Method::Put => "PUT",
			Method::Patch => "PATCH",
			Method::Delete => "DELETE",
		}
	}
}
impl Display for Method {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
#[cfg(feature = "reqwest")]
impl From<Method> for reqwest::Method {
	fn from(method: Method) -> Self {
		match method {
			Method::Get => reqwest::Method::GET,
			Method::Post => reqwest::Method::POST,
			Method::Put => reqwest::Method::PUT,
			Method::Patch => reqwest::Method::PATCH,
			Method::Delete => reqwest::Method::DELETE,
		}
	}
}

/// Fully resolved request handed to a transport.
#[derive(Clone, Debug)]
pub struct ApiRequest {
	/// HTTP verb.
	pub method: Method,
	/// Absolute URL including query parameters.
	pub url: Url,
	/// Header map keyed by lower-case header name.
	pub headers: BTreeMap<String, String>,
	/// Encoded body, if any.
	pub body: Option<Vec<u8>>,
}
impl ApiRequest {
	/// Returns the header value for `name`, matched case-insensitively.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
	}

	/// Returns the `Authorization` header value, if present.
	pub fn authorization(&self) -> Option<&str> {
		self.header(AUTHORIZATION)
	}
}

/// Raw response as received from the transport.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApiResponse {
	/// HTTP status code.
	pub status: u16,
	/// Header map keyed by lower-case header name.
	pub headers: BTreeMap<String, String>,
	/// Raw body bytes.
	pub body: Vec<u8>,
}
impl ApiResponse {
	/// Whether the status is in the 2xx range.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Returns the header value for `name`, matched case-insensitively.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
	}

	/// Decodes the body as JSON. An empty body decodes as `null`.
	pub fn json<T>(&self) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let bytes: &[u8] = if self.body.iter().all(u8::is_ascii_whitespace) {
			b"null"
		} else {
			&self.body
		};
		let mut de = serde_json::Deserializer::from_slice(bytes);

		serde_path_to_error::deserialize(&mut de)
			.map_err(|source| Error::Decode { status: self.status, source })
	}

	/// Parses the `Retry-After` header as either delta seconds or an RFC 2822 date.
	pub fn retry_after(&self) -> Option<Duration> {
		parse_retry_after(self.header(RETRY_AFTER)?)
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// The default client keeps a cookie store because the refresh exchange identifies the
/// refresh credential through a cookie set at sign-in. Redirects are not followed so a
/// redirect to a sign-in page surfaces as a response instead of a silent `200`.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Builds the default transport with a cookie store and no redirect following.
	pub fn new() -> Result<Self, crate::error::ConfigError> {
		let client = ReqwestClient::builder()
			.cookie_store(true)
			.redirect(reqwest::redirect::Policy::none())
			.build()?;

		Ok(Self(client))
	}

	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestTransport {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestTransport {
	fn send(&self, request: ApiRequest) -> TransportFuture<'_> {
		let client = self.0.clone();

		Box::pin(async move {
			let mut builder = client.request(request.method.into(), request.url);

			for (name, value) in &request.headers {
				builder = builder.header(name.as_str(), value.as_str());
			}
			if let Some(body) = request.body {
				builder = builder.body(body);
			}

			let response = builder.send().await?;
			let status = response.status().as_u16();
			let headers = response
				.headers()
				.iter()
				.filter_map(|(name, value)| {
					value.to_str().ok().map(|v| (name.as_str().to_owned(), v.to_owned()))
				})
				.collect();
			let body = response.bytes().await?.to_vec();

			Ok(ApiResponse { status, headers, body })
		})
	}
}

pub(crate) const AUTHORIZATION: &str = "authorization";
pub(crate) const CONTENT_TYPE: &str = "content-type";
pub(crate) const ACCEPT: &str = "accept";
const RETRY_AFTER: &str = "retry-after";

fn parse_retry_after(raw: &str) -> Option<Duration> {
	let raw = raw.trim();

	if let Ok(secs) = raw.parse::<u64>() {
		return Some(Duration::seconds(i64::try_from(secs).ok()?));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}
