//! Session-level error types shared across requests, refresh exchanges, and stores.

// self
use crate::{_prelude::*, api::ApiError};

/// Session-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical session error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS); no response reached the client.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// The API answered with a non-success status.
	#[error(transparent)]
	Api(#[from] ApiError),
	/// The refresh exchange failed and the stored credential was cleared.
	#[error(transparent)]
	Refresh(#[from] RefreshError),

	/// Request body could not be serialized.
	#[error("Request body could not be serialized.")]
	Encode(#[source] serde_json::Error),
	/// Successful response body did not match the expected shape.
	#[error("Response body with status {status} could not be decoded.")]
	Decode {
		/// HTTP status code of the response.
		status: u16,
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Sign-in response did not carry an access token.
	#[error("Response is missing the `{field}` access token field.")]
	MissingAccessToken {
		/// Configured token field path.
		field: String,
	},
}
impl Error {
	/// Collapses the error into one human-readable line.
	///
	/// Precedence: the structured API message, then the transport-level message, then
	/// `fallback` supplied by the call site.
	pub fn user_message(&self, fallback: &str) -> String {
		match self {
			Self::Api(api) | Self::Refresh(RefreshError::Rejected(api)) => api.display_message(),
			Self::Transport(err) => err.to_string(),
			Self::Refresh(RefreshError::Transport(err)) => err.to_string(),
			_ => fallback.to_owned(),
		}
	}

	/// Returns the HTTP status associated with the failure, if any.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Api(api) | Self::Refresh(RefreshError::Rejected(api)) => Some(api.status),
			Self::Decode { status, .. } => Some(*status),
			_ => None,
		}
	}
}

/// Configuration and validation failures raised by the session.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Request path is not relative to the base URL.
	#[error("Request path `{path}` must be relative to the base URL.")]
	AbsolutePath {
		/// Offending path.
		path: String,
	},
	/// Header name or value cannot be sent.
	#[error("Header `{name}` is invalid.")]
	InvalidHeader {
		/// Offending header name.
		name: String,
	},
	/// Session configuration failed validation.
	#[error(transparent)]
	Session(#[from] crate::config::SessionConfigError),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the API.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the API.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

/// Failure of the shared refresh exchange.
///
/// Cloneable so one failure can be delivered to the triggering request and every queued
/// request.
#[derive(Clone, Debug, ThisError)]
pub enum RefreshError {
	/// Refresh endpoint answered with a non-success status.
	#[error("Refresh endpoint rejected the session: {0}")]
	Rejected(ApiError),
	/// Refresh exchange never received a response.
	#[error("Refresh exchange failed: {0}")]
	Transport(Arc<TransportError>),
	/// Refresh endpoint answered 2xx without a usable token.
	#[error("Refresh response is malformed: {message}.")]
	MalformedResponse {
		/// Description of what was missing.
		message: String,
	},
	/// New token could not be persisted.
	#[error("Refreshed token could not be stored: {0}")]
	Storage(crate::store::StoreError),
	/// Refresh request could not be built.
	#[error("Refresh request could not be built: {message}.")]
	Config {
		/// Rendered configuration failure.
		message: String,
	},
	/// The request leading the refresh was dropped before the exchange settled.
	#[error("Refresh exchange was abandoned before it settled.")]
	Abandoned,
}
impl From<TransportError> for RefreshError {
	fn from(e: TransportError) -> Self {
		Self::Transport(Arc::new(e))
	}
}
