//! Lease issuance for roles and user tokens, plus lease renewal and revocation.
//!
//! A [`Lease`] is what the surrounding secrets layer hands to its client: the issued token,
//! its effective TTL window, and a [`LeaseInternal`] record that is kept server side so the
//! token can be revoked later.

// self
use crate::{
	_prelude::*,
	auth::{
		GrantType, IssuanceRequest, IssuanceResponse, RoleName, TokenClaims, TokenScope,
		TokenSecret, Username,
	},
	config::{Credentials, RoleDefinition, UserTokenConfiguration, duration_secs},
	error::ConfigError,
	flows::{Broker, DelegatedCredential},
	http::TokenHttpClient,
	obs::{self, Operation},
	store::StoreKey,
	ttl::{self, TtlLayer, TtlResolution, TtlSources, TtlWarning},
	upstream::TransportErrorMapper,
};

/// Server-side state needed to revoke a leased token.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseInternal {
	/// Issued access token.
	pub access_token: TokenSecret,
	/// Issued refresh token, if any.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub refresh_token: Option<TokenSecret>,
	/// Upstream token id; absent when the legacy API did not report one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub token_id: Option<String>,
	/// Subject the token was minted for.
	pub username: String,
	/// Lease TTL granted at issuance.
	#[serde(default, with = "duration_secs")]
	pub ttl: Duration,
	/// Lease expiry as a unix timestamp; absent for unbounded leases.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub expires_at: Option<i64>,
}
impl LeaseInternal {
	/// TTL a renewal at `now` may grant.
	///
	/// Never exceeds the time left on the lease. A positive `increment` caps it, otherwise the
	/// lease's own TTL does.
	pub fn renewal_ttl(&self, increment: Duration, now: OffsetDateTime) -> Duration {
		let remaining = self
			.expires_at
			.map(|at| Duration::seconds(at.saturating_sub(now.unix_timestamp())).max(Duration::ZERO));
		let cap = if increment.is_positive() { increment } else { self.ttl };

		match remaining {
			Some(remaining) if !cap.is_positive() || remaining < cap => remaining,
			_ => cap,
		}
	}
}

/// Outcome of [`Broker::renew_lease`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Renewal {
	/// TTL granted by this renewal.
	pub ttl: Duration,
	/// Revocation state carrying the refreshed tokens.
	pub internal: LeaseInternal,
}

/// Issued token together with its lease window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lease {
	/// Normalized upstream response.
	pub response: IssuanceResponse,
	/// Effective lease TTL.
	pub ttl: Duration,
	/// Effective maximum lease TTL; zero means unbounded.
	pub max_ttl: Duration,
	/// Whether the token can be renewed through its refresh token.
	pub renewable: bool,
	/// TTL clamps applied while resolving the window.
	pub warnings: Vec<TtlWarning>,
	/// Revocation state.
	pub internal: LeaseInternal,
}
impl Lease {
	fn new(response: IssuanceResponse, username: String, resolution: TtlResolution) -> Self {
		let internal = LeaseInternal {
			access_token: response.access_token.clone(),
			refresh_token: response.refresh_token().cloned(),
			token_id: response.token_id().map(str::to_owned),
			username,
			ttl: resolution.ttl,
			expires_at: expiry(OffsetDateTime::now_utc(), resolution.ttl),
		};

		Self {
			renewable: internal.refresh_token.is_some(),
			ttl: resolution.ttl,
			max_ttl: resolution.max_ttl,
			warnings: resolution.warnings,
			response,
			internal,
		}
	}
}

/// Per-request overrides for [`Broker::issue_user_token`].
///
/// Unset fields fall back to the stored user-token configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserTokenRequest {
	/// Group scope override (`applied-permissions/groups:<name>[,<name>...]`).
	pub scope: Option<String>,
	/// Token description.
	pub description: Option<String>,
	/// Request a refresh token.
	pub refreshable: Option<bool>,
	/// Audience.
	pub audience: Option<String>,
	/// Request a reference token.
	pub include_reference_token: Option<bool>,
	/// Bounded-lifetime opt-in.
	pub use_expiring_tokens: Option<bool>,
	/// `force_revocable` choice.
	pub force_revocable: Option<bool>,
	/// Requested TTL and maximum TTL.
	pub ttl: TtlLayer,
}

impl<C, M> Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Issues a token from the stored role `name`, authenticated with the admin credential.
	pub async fn issue_role_token(&self, name: &RoleName, overrides: TtlLayer) -> Result<Lease> {
		obs::observe(Operation::RoleToken, "issue_role_token", async {
			let _config = self.config_lock.read().await;
			let admin = self.admin_configuration().await?;
			let role: RoleDefinition = {
				let _entities = self.entity_lock.read().await;

				self.store
					.get_json(&StoreKey::Role(name.clone()))
					.await?
					.ok_or_else(|| Error::RoleNotFound { name: name.to_string() })?
			};
			let resolution = self.resolve_ttl(overrides, role.ttl_layer(), admin.ttl_layer());
			let request = IssuanceRequest {
				grant_type: role.grant_type,
				username: role.username.clone(),
				scope: role.scope.clone(),
				audience: role.audience.clone(),
				description: role.description.clone(),
				refreshable: role.refreshable,
				include_reference_token: role.include_reference_token,
				ttl: resolution.ttl,
				max_ttl: resolution.max_ttl,
				use_expiring_tokens: admin.use_expiring_tokens,
				force_revocable: admin.force_revocable,
				refresh_token: None,
				access_token: None,
			};
			let credentials = admin.credentials();
			let response = self.exchange(&credentials, &request).await?;

			self.spawn_usage_report(&credentials, "issue_role_token");

			Ok(Lease::new(response, role.username, resolution))
		})
		.await
	}

	/// Issues a token for `username` using the stored user-token configuration.
	///
	/// The scope defaults to `applied-permissions/user`; an override must name groups and is
	/// validated before any upstream call. When the delegated credential has expired and a
	/// refresh token is stored, it is refreshed once and the issuance retried.
	pub async fn issue_user_token(
		&self,
		username: &Username,
		request: UserTokenRequest,
	) -> Result<Lease> {
		obs::observe(Operation::UserToken, "issue_user_token", async {
			let scope = match request.scope {
				Some(scope) => TokenScope::group_override(scope)?,
				None => TokenScope::user(),
			};
			let _config = self.config_lock.read().await;
			let admin = self.admin_configuration().await?;
			let (key, config) = {
				let _entities = self.entity_lock.read().await;

				self.user_token_record(Some(username)).await?
			};
			let credentials = if config.access_token.is_empty() {
				admin.credentials()
			} else {
				Credentials::new(admin.url.clone(), config.access_token.clone())
			};
			let resolution = self.resolve_ttl(request.ttl, config.ttl_layer(), admin.ttl_layer());
			let issuance = IssuanceRequest {
				grant_type: GrantType::ClientCredentials,
				username: username.to_string(),
				scope,
				audience: request.audience.unwrap_or_else(|| config.audience.clone()),
				description: request
					.description
					.unwrap_or_else(|| config.default_description.clone()),
				refreshable: request.refreshable.unwrap_or(config.refreshable),
				include_reference_token: request
					.include_reference_token
					.unwrap_or(config.include_reference_token),
				ttl: resolution.ttl,
				max_ttl: resolution.max_ttl,
				use_expiring_tokens: request.use_expiring_tokens.unwrap_or(config.use_expiring_tokens),
				force_revocable: request.force_revocable.or(config.force_revocable),
				refresh_token: None,
				access_token: None,
			};
			let mut delegated = DelegatedCredential { key, config, credentials };
			let response = self.issue_with_refresh(&mut delegated, &issuance).await?;

			self.spawn_usage_report(&admin.credentials(), "issue_user_token");

			Ok(Lease::new(response, issuance.username, resolution))
		})
		.await
	}

	/// Renews a lease by exchanging its refresh token, authenticated with the admin credential.
	///
	/// The granted TTL follows [`LeaseInternal::renewal_ttl`]. Tokens the upstream does not
	/// rotate are carried over from `internal`.
	pub async fn renew_lease(&self, internal: &LeaseInternal, increment: Duration) -> Result<Renewal> {
		obs::observe(Operation::Renew, "renew_lease", async {
			let _config = self.config_lock.read().await;
			let admin = self.admin_configuration().await?;
			let refresh_token = internal
				.refresh_token
				.as_ref()
				.filter(|token| !token.is_empty())
				.ok_or(Error::LeaseNotRenewable)?;
			let now = OffsetDateTime::now_utc();
			let ttl = internal.renewal_ttl(increment, now);
			let request = IssuanceRequest {
				access_token: Some(internal.access_token.clone()),
				..IssuanceRequest::refresh(refresh_token.clone())
			};
			let response = self.exchange(&admin.credentials(), &request).await?;

			obs::debug_event!("Renewed lease for {} for {}s", internal.username, ttl.whole_seconds());

			Ok(Renewal {
				ttl,
				internal: LeaseInternal {
					refresh_token: response
						.refresh_token()
						.cloned()
						.or_else(|| internal.refresh_token.clone()),
					token_id: response
						.token_id()
						.map(str::to_owned)
						.or_else(|| internal.token_id.clone()),
					access_token: response.access_token,
					username: internal.username.clone(),
					ttl: internal.ttl,
					expires_at: expiry(now, ttl),
				},
			})
		})
		.await
	}

	/// Revokes the token behind a lease using the admin credential.
	///
	/// When the lease lacks a token id (legacy API) it is recovered from the token's claims.
	pub async fn revoke_lease(&self, internal: &LeaseInternal) -> Result<()> {
		let _config = self.config_lock.read().await;
		let admin = self.admin_configuration().await?;
		let token_id = match internal.token_id.as_deref().filter(|id| !id.is_empty()) {
			Some(id) => id.to_owned(),
			None => TokenClaims::decode_unverified(internal.access_token.expose())?.token_id,
		};

		if token_id.is_empty() {
			return Err(ConfigError::MissingTokenId.into());
		}

		self.revoke(&admin.credentials(), &token_id).await
	}

	/// Loads the user-token record for `username`, falling back to the global record.
	///
	/// Returns the key the record was found under (the per-user key when neither exists).
	pub(crate) async fn user_token_record(
		&self,
		username: Option<&Username>,
	) -> Result<(StoreKey, UserTokenConfiguration)> {
		if let Some(username) = username {
			let key = StoreKey::UserTokenConfig(Some(username.clone()));

			if let Some(config) = self.store.get_json(&key).await? {
				return Ok((key, config));
			}
		}

		let global = StoreKey::UserTokenConfig(None);

		match self.store.get_json(&global).await? {
			Some(config) => Ok((global, config)),
			None => Ok((StoreKey::UserTokenConfig(username.cloned()), Default::default())),
		}
	}

	fn resolve_ttl(&self, request: TtlLayer, entity: TtlLayer, backend: TtlLayer) -> TtlResolution {
		let resolution =
			ttl::resolve(&TtlSources { request, entity, backend, system: self.settings.system_ttl });

		for warning in &resolution.warnings {
			obs::warn_event!("{warning}");
		}

		resolution
	}
}

fn expiry(now: OffsetDateTime, ttl: Duration) -> Option<i64> {
	ttl.is_positive().then(|| (now + ttl).unix_timestamp())
}
