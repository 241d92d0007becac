//! Session configuration: base URL, credential storage key, and refresh endpoint.

pub mod builder;

pub use builder::*;

// std
use std::env;
// self
use crate::{_prelude::*, error::ConfigError};

/// Immutable settings shared by every clone of a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
	/// Base URL every relative request path is appended to.
	pub base_url: Url,
	/// Key under which the access token is persisted.
	pub token_key: String,
	/// Relative path of the refresh exchange.
	pub refresh_path: String,
	/// Dot-separated path of the token inside refresh and sign-in responses.
	pub token_field: String,
}
impl SessionConfig {
	/// Default storage key for the access token.
	pub const DEFAULT_TOKEN_KEY: &str = "accessToken";
	/// Default refresh endpoint path.
	pub const DEFAULT_REFRESH_PATH: &str = "/auth/refresh";
	/// Default response field carrying the token.
	pub const DEFAULT_TOKEN_FIELD: &str = "accessToken";
	/// Environment variable holding the base URL.
	pub const ENV_BASE_URL: &str = "API_BASE_URL";
	/// Environment variable overriding the storage key.
	pub const ENV_TOKEN_KEY: &str = "API_TOKEN_KEY";
	/// Environment variable overriding the refresh path.
	pub const ENV_REFRESH_PATH: &str = "API_REFRESH_PATH";
	/// Environment variable overriding the token field.
	pub const ENV_TOKEN_FIELD: &str = "API_TOKEN_FIELD";

	/// Creates a new builder for the provided base URL.
	pub fn builder(base_url: Url) -> SessionConfigBuilder {
		SessionConfigBuilder::new(base_url)
	}

	/// Parses `base_url` and builds a config with default settings.
	pub fn new(base_url: &str) -> Result<Self, SessionConfigError> {
		let base_url =
			Url::parse(base_url).map_err(|source| SessionConfigError::InvalidBaseUrl { source })?;

		Self::builder(base_url).build()
	}

	/// Reads the configuration from process environment variables.
	pub fn from_env() -> Result<Self, SessionConfigError> {
		Self::from_lookup(|name| env::var(name).ok())
	}

	/// Reads the configuration through `lookup`, which maps variable names to values.
	pub fn from_lookup<F>(lookup: F) -> Result<Self, SessionConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let raw = lookup(Self::ENV_BASE_URL)
			.filter(|value| !value.trim().is_empty())
			.ok_or(SessionConfigError::MissingVar { name: Self::ENV_BASE_URL })?;
		let base_url = Url::parse(raw.trim())
			.map_err(|source| SessionConfigError::InvalidBaseUrl { source })?;
		let mut builder = Self::builder(base_url);

		if let Some(key) = lookup(Self::ENV_TOKEN_KEY) {
			builder = builder.token_key(key);
		}
		if let Some(path) = lookup(Self::ENV_REFRESH_PATH) {
			builder = builder.refresh_path(path);
		}
		if let Some(field) = lookup(Self::ENV_TOKEN_FIELD) {
			builder = builder.token_field(field);
		}

		builder.build()
	}

	/// Resolves a relative request path (plus query pairs) against the base URL.
	///
	/// The path is appended to the base URL's own path, so `/categories` under
	/// `https://host/api/` becomes `https://host/api/categories`.
	pub fn resolve(&self, path: &str, query: &[(String, String)]) -> Result<Url, ConfigError> {
		if is_absolute(path) {
			return Err(ConfigError::AbsolutePath { path: path.to_owned() });
		}

		let (path_part, inline_query) = match path.split_once('?') {
			Some((p, q)) => (p, Some(q)),
			None => (path, None),
		};
		let mut url = self.base_url.clone();
		let joined = format!(
			"{}/{}",
			self.base_url.path().trim_end_matches('/'),
			path_part.trim_start_matches('/')
		);

		url.set_path(&joined);
		url.set_query(inline_query);
		url.set_fragment(None);

		if !query.is_empty() {
			url.query_pairs_mut().extend_pairs(query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
		}

		Ok(url)
	}

	/// Resolves the refresh endpoint URL.
	pub fn refresh_url(&self) -> Result<Url, ConfigError> {
		self.resolve(&self.refresh_path, &[])
	}
}

pub(crate) fn is_absolute(path: &str) -> bool {
	path.starts_with("//") || Url::parse(path).is_ok()
}
