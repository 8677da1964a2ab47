//! Repository contract for configuration records plus built-in implementations.
//!
//! The engine keeps three record kinds, each a JSON document under a string key: the admin
//! configuration (`config/admin`), user-token defaults (`config/user_token` and
//! `config/user_token/<username>`), and roles (`roles/<name>`). [`ConfigStore`] is the only
//! seam between the engine and whatever persists those documents.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::{RoleName, Username},
};

/// Boxed future returned by [`ConfigStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Key-value repository holding JSON configuration records.
pub trait ConfigStore
where
	Self: Send + Sync,
{
	/// Fetches the record stored under `key`, if present.
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<serde_json::Value>>;

	/// Persists or replaces the record under `key`.
	fn put<'a>(&'a self, key: &'a str, record: serde_json::Value) -> StoreFuture<'a, ()>;

	/// Removes the record under `key`; missing keys are not an error.
	fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;

	/// Lists keys that start with `prefix`, in lexical order.
	fn list<'a>(&'a self, prefix: &'a str) -> StoreFuture<'a, Vec<String>>;
}
impl dyn ConfigStore {
	/// Fetches and decodes the record under `key`.
	pub async fn get_json<T>(&self, key: &StoreKey) -> Result<Option<T>, StoreError>
	where
		T: DeserializeOwned,
	{
		let path = key.path();

		match self.get(&path).await? {
			Some(value) => serde_json::from_value(value).map(Some).map_err(|e| {
				StoreError::Serialization { message: format!("Failed to decode {path}: {e}") }
			}),
			None => Ok(None),
		}
	}

	/// Encodes and stores `record` under `key`.
	pub async fn put_json<T>(&self, key: &StoreKey, record: &T) -> Result<(), StoreError>
	where
		T: Serialize,
	{
		let path = key.path();
		let value = serde_json::to_value(record).map_err(|e| StoreError::Serialization {
			message: format!("Failed to encode {path}: {e}"),
		})?;

		self.put(&path, value).await
	}

	/// Removes the record under `key`.
	pub async fn delete_key(&self, key: &StoreKey) -> Result<(), StoreError> {
		self.delete(&key.path()).await
	}
}

/// Error type produced by [`ConfigStore`] implementations.
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

/// Typed location of a configuration record.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum StoreKey {
	/// Admin configuration.
	AdminConfig,
	/// User-token defaults; `None` addresses the global record.
	UserTokenConfig(Option<Username>),
	/// Role definition.
	Role(RoleName),
}
impl StoreKey {
	/// Prefix shared by every role key.
	pub const ROLE_PREFIX: &'static str = "roles/";

	/// String path of the record.
	pub fn path(&self) -> String {
		match self {
			StoreKey::AdminConfig => "config/admin".into(),
			StoreKey::UserTokenConfig(None) => "config/user_token".into(),
			StoreKey::UserTokenConfig(Some(username)) => format!("config/user_token/{username}"),
			StoreKey::Role(name) => format!("{}{name}", Self::ROLE_PREFIX),
		}
	}
}
impl Display for StoreKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.path())
	}
}
