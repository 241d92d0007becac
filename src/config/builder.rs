//! Builder for [`SessionConfig`] values.

// self
use crate::{
	_prelude::*,
	config::{SessionConfig, is_absolute},
};

/// Errors raised while constructing or validating session configuration.
#[derive(Debug, PartialEq, Eq, ThisError)]
pub enum SessionConfigError {
	/// Required environment variable is unset or blank.
	#[error("Environment variable {name} is not set.")]
	MissingVar {
		/// Variable name.
		name: &'static str,
	},
	/// Base URL cannot be parsed.
	#[error("Base URL is invalid.")]
	InvalidBaseUrl {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Base URL must use HTTP or HTTPS.
	#[error("Base URL must use http or https: {url}.")]
	UnsupportedScheme {
		/// Base URL that failed validation.
		url: String,
	},
	/// Base URL cannot carry a relative path (e.g. `mailto:`), or carries a query/fragment.
	#[error("Base URL cannot act as a base for relative paths: {url}.")]
	NotABase {
		/// Base URL that failed validation.
		url: String,
	},
	/// Refresh path must be relative to the base URL.
	#[error("Refresh path must be relative: {path}.")]
	AbsoluteRefreshPath {
		/// Path that failed validation.
		path: String,
	},
	/// A required text setting is empty.
	#[error("The {setting} setting must not be empty.")]
	EmptySetting {
		/// Which setting failed validation.
		setting: &'static str,
	},
}

/// Builder for [`SessionConfig`] values.
#[derive(Debug)]
pub struct SessionConfigBuilder {
	/// Base URL for every request.
	pub base_url: Url,
	/// Storage key for the access token.
	pub token_key: String,
	/// Relative refresh endpoint path.
	pub refresh_path: String,
	/// Token field path inside refresh and sign-in responses.
	pub token_field: String,
}
impl SessionConfigBuilder {
	/// Creates a new builder seeded with defaults.
	pub fn new(base_url: Url) -> Self {
		Self {
			base_url,
			token_key: SessionConfig::DEFAULT_TOKEN_KEY.into(),
			refresh_path: SessionConfig::DEFAULT_REFRESH_PATH.into(),
			token_field: SessionConfig::DEFAULT_TOKEN_FIELD.into(),
		}
	}

	/// Overrides the storage key for the access token.
	pub fn token_key(mut self, key: impl Into<String>) -> Self {
		self.token_key = key.into();

		self
	}

	/// Overrides the refresh endpoint path.
	pub fn refresh_path(mut self, path: impl Into<String>) -> Self {
		self.refresh_path = path.into();

		self
	}

	/// Overrides the token field path.
	pub fn token_field(mut self, field: impl Into<String>) -> Self {
		self.token_field = field.into();

		self
	}

	/// Validates and produces a [`SessionConfig`].
	pub fn build(self) -> Result<SessionConfig, SessionConfigError> {
		self.validate()?;

		let Self { base_url, token_key, refresh_path, token_field } = self;

		Ok(SessionConfig {
			base_url,
			token_key: token_key.trim().to_owned(),
			refresh_path: refresh_path.trim().to_owned(),
			token_field: token_field.trim().to_owned(),
		})
	}

	fn validate(&self) -> Result<(), SessionConfigError> {
		if !matches!(self.base_url.scheme(), "http" | "https") {
			return Err(SessionConfigError::UnsupportedScheme { url: self.base_url.to_string() });
		}
		if self.base_url.cannot_be_a_base()
			|| self.base_url.query().is_some()
			|| self.base_url.fragment().is_some()
		{
			return Err(SessionConfigError::NotABase { url: self.base_url.to_string() });
		}

		for (setting, value) in [
			("token_key", &self.token_key),
			("refresh_path", &self.refresh_path),
			("token_field", &self.token_field),
		] {
			if value.trim().is_empty() {
				return Err(SessionConfigError::EmptySetting { setting });
			}
		}

		if is_absolute(self.refresh_path.trim()) {
			return Err(SessionConfigError::AbsoluteRefreshPath { path: self.refresh_path.clone() });
		}
		if self.token_field.split('.').any(str::is_empty) {
			return Err(SessionConfigError::EmptySetting { setting: "token_field segment" });
		}

		Ok(())
	}
}
