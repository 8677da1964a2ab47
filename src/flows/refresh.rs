//! Delegated refresh: recover from an expired user-token credential exactly once.
//!
//! When an issuance made with a delegated credential fails with [`Error::TokenExpired`] and the
//! record holding that credential also stores a refresh token, the broker exchanges the refresh
//! token, persists the new pair into the same record, and retries the issuance a single time.
//! A second failure is returned as is; the refresh token is never retried. Refreshes of one record
//! are serialized, and a caller that waited behind another refresh reuses its result.

mod metrics;

pub use metrics::RefreshMetrics;

// self
use crate::{
	_prelude::*,
	auth::{IssuanceRequest, IssuanceResponse},
	config::{Credentials, UserTokenConfiguration},
	error::ConfigError,
	flows::Broker,
	http::TokenHttpClient,
	obs,
	store::StoreKey,
	upstream::TransportErrorMapper,
};

/// Delegated credential together with the record it was loaded from.
#[derive(Clone, Debug)]
pub struct DelegatedCredential {
	/// Record the configuration was loaded from; refreshed tokens are written back here.
	pub key: StoreKey,
	/// Stored user-token configuration.
	pub config: UserTokenConfiguration,
	/// Endpoint and bearer used for issuance.
	pub credentials: Credentials,
}
impl DelegatedCredential {
	/// Returns `true` when the record owns its bearer and stores a refresh token for it.
	pub fn can_refresh(&self) -> bool {
		!self.config.access_token.is_empty() && self.config.refresh_token().is_some()
	}
}

impl<C, M> Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Issues `request` with a delegated credential, refreshing it once if it expired.
	///
	/// On a successful refresh `delegated` carries the new tokens, which are already persisted.
	pub async fn issue_with_refresh(
		&self,
		delegated: &mut DelegatedCredential,
		request: &IssuanceRequest,
	) -> Result<IssuanceResponse> {
		match self.exchange(&delegated.credentials, request).await {
			Err(Error::TokenExpired) if delegated.can_refresh() => (),
			other => return other,
		}

		obs::info_event!("Delegated access token expired; attempting a single refresh");

		self.refresh_metrics.record_attempt();

		if let Err(e) = self.refresh_delegated(delegated).await {
			self.refresh_metrics.record_failure();

			obs::warn_event!("Failed to refresh the delegated access token: {e}");

			return Err(e);
		}

		self.refresh_metrics.record_success();

		self.exchange(&delegated.credentials, request).await
	}

	async fn refresh_delegated(&self, delegated: &mut DelegatedCredential) -> Result<()> {
		let guard = self.flow_guard(&delegated.key);
		let _singleflight = guard.lock().await;
		let expired = delegated.credentials.access_token.clone();
		let current: UserTokenConfiguration = {
			let _entities = self.entity_lock.read().await;

			self.store.get_json(&delegated.key).await?.ok_or(Error::TokenExpired)?
		};

		// Another caller refreshed (or replaced) the credential while this one waited.
		if !current.access_token.is_empty() && current.access_token != expired {
			obs::debug_event!("Delegated access token under {} was already replaced", delegated.key);

			delegated.credentials.access_token = current.access_token.clone();
			delegated.config = current;

			return Ok(());
		}

		let refresh_token =
			current.refresh_token().cloned().ok_or(ConfigError::MissingRefreshToken)?;
		let refreshed = self.refresh(&delegated.credentials, &refresh_token).await?;
		let config = {
			let _entities = self.entity_lock.write().await;
			// Only the token pair is written; other fields may have changed during the exchange.
			let mut latest: UserTokenConfiguration =
				self.store.get_json(&delegated.key).await?.unwrap_or(current);

			latest.access_token = refreshed.access_token.clone();

			if let Some(next) = refreshed.refresh_token() {
				latest.refresh_token = next.clone();
			}

			self.store.put_json(&delegated.key, &latest).await?;

			latest
		};

		delegated.credentials.access_token = refreshed.access_token;
		delegated.config = config;

		Ok(())
	}
}
