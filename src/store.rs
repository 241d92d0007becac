//! Credential storage contracts and built-in key-value store implementations.
//!
//! The session persists exactly one value, the access token, under a configured key.
//! Hosts that already own a persistent key-value store (keychain, settings database,
//! browser storage bridge) implement [`TokenStore`] over it; [`MemoryStore`] and
//! [`FileStore`] cover tests and lightweight deployments.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::_prelude::*;

/// Boxed future returned by [`TokenStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Host-provided persistent key-value store holding plain string values.
pub trait TokenStore
where
	Self: Send + Sync,
{
	/// Fetches the value stored under `key`, if present.
	fn load<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>>;

	/// Persists or replaces the value stored under `key`.
	fn save<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, ()>;

	/// Removes `key`; removing a missing key succeeds.
	fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;
}

/// Error type produced by [`TokenStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
