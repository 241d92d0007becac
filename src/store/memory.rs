//! Thread-safe in-memory [`TokenStore`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	store::{StoreError, StoreFuture, TokenStore},
};

type StoreMap = Arc<RwLock<HashMap<String, String>>>;

/// Thread-safe storage backend that keeps values in-process for tests and demos.
///
/// Clones share the same map, so a test can keep one handle to inspect what the session
/// persisted.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(StoreMap);
impl MemoryStore {
	/// Returns the value under `key` without going through the async contract.
	pub fn get(&self, key: &str) -> Option<String> {
		self.0.read().get(key).cloned()
	}

	/// Seeds `key` synchronously.
	pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
		self.0.write().insert(key.into(), value.into());
	}

	fn save_now(map: StoreMap, key: String, value: String) -> Result<(), StoreError> {
		map.write().insert(key, value);

		Ok(())
	}

	fn remove_now(map: StoreMap, key: &str) -> Result<(), StoreError> {
		map.write().remove(key);

		Ok(())
	}
}
impl TokenStore for MemoryStore {
	fn load<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
		let map = self.0.clone();

		Box::pin(async move { Ok(map.read().get(key).cloned()) })
	}

	fn save<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, ()> {
		let map = self.0.clone();
		let key = key.to_owned();

		Box::pin(async move { Self::save_now(map, key, value) })
	}

	fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
		let map = self.0.clone();

		Box::pin(async move { Self::remove_now(map, key) })
	}
}
