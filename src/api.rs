//! Structured API error bodies returned by non-success responses.

// crates.io
use serde_json::Value;
// self
use crate::{_prelude::*, http::ApiResponse};

/// Non-success response carrying the server's machine-readable message and field errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiError {
	/// HTTP status code.
	pub status: u16,
	/// Server-supplied message, when the body carried one.
	pub message: Option<String>,
	/// Field-level validation errors, in server order.
	pub errors: Vec<FieldError>,
	/// Retry-After hint from upstream, if supplied.
	pub retry_after: Option<Duration>,
}
impl ApiError {
	/// Builds an error from a non-success response, tolerating non-JSON bodies.
	///
	/// Each field is read on its own, so an unexpected shape in one (say an `errors` map
	/// instead of a list) never hides the message carried by another.
	pub fn from_response(response: &ApiResponse) -> Self {
		let body = serde_json::from_slice::<Value>(&response.body).unwrap_or(Value::Null);
		let message = ["message", "error", "msg"]
			.into_iter()
			.find_map(|key| body.get(key).and_then(message_text));

		Self {
			status: response.status,
			message,
			errors: body.get("errors").map(field_errors).unwrap_or_default(),
			retry_after: response.retry_after(),
		}
	}

	/// Returns the server message or, without one, the generic status line.
	pub fn display_message(&self) -> String {
		match &self.message {
			Some(message) => message.clone(),
			None => format!("Request failed with status code {}", self.status),
		}
	}

	/// Whether the server rejected the credential.
	pub fn is_unauthorized(&self) -> bool {
		self.status == 401
	}
}
impl Display for ApiError {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "API request failed with status {}: {}", self.status, self.display_message())
	}
}
impl StdError for ApiError {}

/// One field-level validation error.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldError {
	/// Offending field, when the server names one.
	pub field: Option<String>,
	/// Human-readable description.
	pub message: String,
}
impl From<RawFieldError> for FieldError {
	fn from(raw: RawFieldError) -> Self {
		match raw {
			RawFieldError::Text(message) => Self { field: None, message },
			RawFieldError::Detail { field, message } => Self { field, message },
		}
	}
}

/// Reads a message given as a string or as a list of strings (joined with `; `).
fn message_text(value: &Value) -> Option<String> {
	let text = match value {
		Value::String(text) => text.trim().to_owned(),
		Value::Array(items) => items
			.iter()
			.filter_map(Value::as_str)
			.map(str::trim)
			.filter(|text| !text.is_empty())
			.collect::<Vec<_>>()
			.join("; "),
		_ => return None,
	};

	if text.is_empty() { None } else { Some(text) }
}

/// Accepts a list of strings or detail objects, or a `field -> message` map.
fn field_errors(value: &Value) -> Vec<FieldError> {
	match value {
		Value::Array(items) => items
			.iter()
			.filter_map(|raw| RawFieldError::deserialize(raw).ok())
			.map(FieldError::from)
			.collect(),
		Value::Object(fields) => fields
			.iter()
			.filter_map(|(field, raw)| {
				message_text(raw).map(|message| FieldError { field: Some(field.clone()), message })
			})
			.collect(),
		_ => Vec::new(),
	}
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawFieldError {
	Text(String),
	Detail {
		#[serde(default, alias = "path", alias = "param")]
		field: Option<String>,
		#[serde(alias = "msg")]
		message: String,
	},
}
