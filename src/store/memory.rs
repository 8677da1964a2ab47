//! Thread-safe in-memory [`ConfigStore`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	store::{ConfigStore, StoreFuture},
};

type StoreMap = Arc<RwLock<BTreeMap<String, serde_json::Value>>>;

/// Storage backend that keeps records in-process for tests and demos.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(StoreMap);
impl MemoryStore {
	/// Number of stored records.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}

	fn list_now(map: &StoreMap, prefix: &str) -> Vec<String> {
		map.read().keys().filter(|key| key.starts_with(prefix)).cloned().collect()
	}
}
impl ConfigStore for MemoryStore {
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<serde_json::Value>> {
		let map = self.0.clone();

		Box::pin(async move { Ok(map.read().get(key).cloned()) })
	}

	fn put<'a>(&'a self, key: &'a str, record: serde_json::Value) -> StoreFuture<'a, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			map.write().insert(key.to_owned(), record);

			Ok(())
		})
	}

	fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			map.write().remove(key);

			Ok(())
		})
	}

	fn list<'a>(&'a self, prefix: &'a str) -> StoreFuture<'a, Vec<String>> {
		let map = self.0.clone();

		Box::pin(async move { Ok(Self::list_now(&map, prefix)) })
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn put_get_list_delete() {
		let store = MemoryStore::default();

		store.put("roles/b", serde_json::json!({"username": "b"})).await.expect("Put should succeed.");
		store.put("roles/a", serde_json::json!({"username": "a"})).await.expect("Put should succeed.");
		store.put("config/admin", serde_json::json!({})).await.expect("Put should succeed.");

		assert_eq!(
			store.list("roles/").await.expect("List should succeed."),
			vec!["roles/a".to_string(), "roles/b".to_string()]
		);
		assert_eq!(
			store.get("roles/a").await.expect("Get should succeed."),
			Some(serde_json::json!({"username": "a"}))
		);

		store.delete("roles/a").await.expect("Delete should succeed.");
		store.delete("roles/missing").await.expect("Deleting a missing key is not an error.");

		assert_eq!(store.get("roles/a").await.expect("Get should succeed."), None);
		assert_eq!(store.len(), 2);
	}
}
