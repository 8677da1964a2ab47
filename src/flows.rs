//! Engine operations: version gating, issuance, introspection, revocation, and the two stateful
//! workflows (admin rotation and delegated refresh).

pub mod entities;
pub mod lease;
pub mod refresh;
pub mod rotate;

mod gate;
mod introspect;
mod issue;
mod revoke;
mod usage;

pub use entities::*;
pub use lease::*;
pub use refresh::*;
pub use rotate::*;

// std
use std::collections::HashMap;
// crates.io
use async_lock::{Mutex as AsyncMutex, RwLock as AsyncRwLock};
// self
use crate::{
	_prelude::*,
	config::AdminConfiguration,
	http::TokenHttpClient,
	settings::EngineSettings,
	store::{ConfigStore, StoreKey},
	upstream::{TransportErrorMapper, UpstreamClient},
	version::VersionGate,
};
#[cfg(feature = "reqwest")]
use crate::{http::ReqwestHttpClient, upstream::ReqwestTransportErrorMapper};

#[cfg(feature = "reqwest")]
/// Broker specialized for the crate's default reqwest transport stack.
pub type ReqwestBroker = Broker<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Issues, rotates, and revokes Artifactory access tokens for one backend.
///
/// The broker owns the HTTP client, configuration repository, version cache, and settings so
/// individual operations only carry their own parameters. Two independent async read/write
/// locks guard the stored records: the config lock covers the admin credential (rotation and
/// admin writes take it exclusively, issuance shares it) and the entity lock covers roles and
/// user-token records. Refreshes of one user-token record are additionally serialized by a
/// per-record guard so a stored refresh token is exchanged at most once.
pub struct Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// HTTP client wrapper used for every outbound Artifactory request.
	pub http_client: Arc<C>,
	/// Mapper applied to transport-layer errors before surfacing them to callers.
	pub transport_mapper: Arc<M>,
	/// Repository holding admin, user-token, and role records.
	pub store: Arc<dyn ConfigStore>,
	/// Engine-wide settings.
	pub settings: Arc<EngineSettings>,
	/// Cache of the version reported by the configured upstream.
	pub version_gate: Arc<VersionGate>,
	/// Shared counters for delegated refresh outcomes.
	pub refresh_metrics: Arc<RefreshMetrics>,
	config_lock: Arc<AsyncRwLock<()>>,
	entity_lock: Arc<AsyncRwLock<()>>,
	flow_guards: Arc<Mutex<HashMap<StoreKey, Arc<AsyncMutex<()>>>>>,
}
impl<C, M> Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a broker that reuses the caller-provided transport + mapper pair.
	pub fn with_http_client(
		store: Arc<dyn ConfigStore>,
		settings: EngineSettings,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Self {
		Self {
			http_client: http_client.into(),
			transport_mapper: mapper.into(),
			store,
			settings: Arc::new(settings),
			version_gate: Default::default(),
			refresh_metrics: Default::default(),
			config_lock: Default::default(),
			entity_lock: Default::default(),
			flow_guards: Default::default(),
		}
	}

	pub(crate) fn upstream(&self) -> UpstreamClient<'_, C, M> {
		UpstreamClient::new(
			self.http_client.as_ref(),
			self.transport_mapper.as_ref(),
			&self.settings.product_id,
		)
	}

	/// Single-flight guard for the record stored under `key`.
	pub(crate) fn flow_guard(&self, key: &StoreKey) -> Arc<AsyncMutex<()>> {
		let mut guards = self.flow_guards.lock();

		guards.entry(key.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
	}

	/// Loads the admin configuration or fails with [`Error::ConfigurationMissing`].
	pub(crate) async fn admin_configuration(&self) -> Result<AdminConfiguration> {
		self.store.get_json(&StoreKey::AdminConfig).await?.ok_or(Error::ConfigurationMissing)
	}
}
#[cfg(feature = "reqwest")]
impl Broker<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a new broker backed by the crate's reqwest transport.
	///
	/// The transport refuses redirects so bearer credentials never leave the configured host.
	pub fn new(store: Arc<dyn ConfigStore>, settings: EngineSettings) -> Result<Self> {
		Ok(Self::with_http_client(
			store,
			settings,
			ReqwestHttpClient::build(false)?,
			Arc::new(ReqwestTransportErrorMapper),
		))
	}
}
impl<C, M> Clone for Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn clone(&self) -> Self {
		Self {
			http_client: Arc::clone(&self.http_client),
			transport_mapper: Arc::clone(&self.transport_mapper),
			store: Arc::clone(&self.store),
			settings: Arc::clone(&self.settings),
			version_gate: Arc::clone(&self.version_gate),
			refresh_metrics: Arc::clone(&self.refresh_metrics),
			config_lock: Arc::clone(&self.config_lock),
			entity_lock: Arc::clone(&self.entity_lock),
			flow_guards: Arc::clone(&self.flow_guards),
		}
	}
}
impl<C, M> Debug for Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Broker")
			.field("settings", &self.settings)
			.field("version_gate", &self.version_gate)
			.finish()
	}
}
