//! Caller-facing request description consumed by [`Session::send`](crate::session::Session::send).

// self
use crate::{_prelude::*, http::Method};

/// Method, relative path, query, headers, and JSON body of one logical request.
///
/// The request also carries a private retried marker: the session flips it before it
/// recovers from a 401, so one logical request is retried at most once.
#[derive(Clone, Debug, PartialEq)]
pub struct OutboundRequest {
	/// HTTP verb.
	pub method: Method,
	/// Path relative to the configured base URL.
	pub path: String,
	/// Query pairs appended after any inline query in `path`.
	pub query: Vec<(String, String)>,
	/// Extra headers keyed by lower-case name.
	pub headers: BTreeMap<String, String>,
	/// JSON body, if any.
	pub body: Option<serde_json::Value>,
	retried: bool,
}
impl OutboundRequest {
	/// Creates a request for `method` against `path`.
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		Self {
			method,
			path: path.into(),
			query: Vec::new(),
			headers: BTreeMap::new(),
			body: None,
			retried: false,
		}
	}

	/// Shorthand for a `GET` request.
	pub fn get(path: impl Into<String>) -> Self {
		Self::new(Method::Get, path)
	}

	/// Shorthand for a `POST` request.
	pub fn post(path: impl Into<String>) -> Self {
		Self::new(Method::Post, path)
	}

	/// Shorthand for a `PUT` request.
	pub fn put(path: impl Into<String>) -> Self {
		Self::new(Method::Put, path)
	}

	/// Shorthand for a `PATCH` request.
	pub fn patch(path: impl Into<String>) -> Self {
		Self::new(Method::Patch, path)
	}

	/// Shorthand for a `DELETE` request.
	pub fn delete(path: impl Into<String>) -> Self {
		Self::new(Method::Delete, path)
	}

	/// Serializes `body` as the JSON payload.
	pub fn json<B>(mut self, body: &B) -> Result<Self>
	where
		B: ?Sized + Serialize,
	{
		self.body = Some(serde_json::to_value(body).map_err(Error::Encode)?);

		Ok(self)
	}

	/// Appends one query pair.
	pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
		self.query.push((key.into(), value.to_string()));

		self
	}

	/// Sets one header; names are stored lower-case.
	pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
		self.headers.insert(name.as_ref().to_ascii_lowercase(), value.into());

		self
	}

	/// Opts the request out of automatic refresh, so a 401 is returned as-is.
	///
	/// Sign-in and similar credential-checking calls use this: their 401 means "wrong
	/// credentials", not "expired token".
	pub fn skip_refresh(mut self) -> Self {
		self.retried = true;

		self
	}

	/// Whether the request already used its one automatic retry.
	pub fn is_retried(&self) -> bool {
		self.retried
	}

	pub(crate) fn mark_retried(&mut self) {
		self.retried = true;
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;

	#[test]
	fn builder_helpers_fill_fields() {
		#[derive(Serialize)]
		struct NewSlider<'a> {
			title: &'a str,
			order: u32,
		}

		let request = OutboundRequest::post("/sliders")
			.json(&NewSlider { title: "Spring sale", order: 2 })
			.expect("Slider body should serialize.")
			.query("draft", true)
			.header("X-Request-Id", "r-1");

		assert_eq!(request.method, Method::Post);
		assert_eq!(request.body, Some(json!({ "title": "Spring sale", "order": 2 })));
		assert_eq!(request.query, vec![("draft".to_owned(), "true".to_owned())]);
		assert_eq!(request.headers.get("x-request-id").map(String::as_str), Some("r-1"));
		assert!(!request.is_retried());
	}

	#[test]
	fn retried_marker_is_one_way() {
		let mut request = OutboundRequest::get("/settings");

		request.mark_retried();

		assert!(request.is_retried());
		assert!(OutboundRequest::post("/auth/login").skip_refresh().is_retried());
	}
}
