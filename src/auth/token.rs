//! Redacted access-token wrapper and token extraction from JSON bodies.

// self
use crate::_prelude::*;

/// Bearer credential sent with each request; redacted in `Debug` and `Display`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);
impl AccessToken {
	/// Wraps a new token string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Renders the `Authorization` header value.
	pub fn bearer(&self) -> String {
		format!("Bearer {}", self.0)
	}

	/// Consumes the wrapper and returns the raw token.
	pub fn into_inner(self) -> String {
		self.0
	}

	/// Finds a non-empty string token at `field` inside `body`.
	///
	/// `field` is a dot-separated path such as `accessToken` or `data.accessToken`.
	pub fn from_json_field(body: &serde_json::Value, field: &str) -> Option<Self> {
		field
			.split('.')
			.try_fold(body, |node, segment| node.get(segment))
			.and_then(serde_json::Value::as_str)
			.map(str::trim)
			.filter(|token| !token.is_empty())
			.map(Self::new)
	}
}
impl AsRef<str> for AccessToken {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for AccessToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("AccessToken").field(&"<redacted>").finish()
	}
}
impl Display for AccessToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}
