//! Storage-backed management of the admin record, user-token defaults, and roles.

// self
use crate::{
	_prelude::*,
	auth::{RoleName, TokenClaims, Username},
	config::{
		AdminConfigurationUpdate, RoleDefinition, UserTokenConfiguration,
		UserTokenConfigurationUpdate,
	},
	error::ConfigError,
	flows::Broker,
	http::TokenHttpClient,
	obs::{self, Operation},
	store::StoreKey,
	upstream::TransportErrorMapper,
	version::Capability,
};

/// Read view of the admin record; the token itself is never returned.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AdminSummary {
	/// Artifactory base URL.
	pub url: Url,
	/// SHA-256 hex digest of the admin token.
	pub access_token_sha256: String,
	/// Version cached for the upstream, if probed.
	pub version: Option<String>,
	/// Claims of the admin token, when it decodes.
	pub token: Option<TokenClaims>,
	/// Bounded-lifetime opt-in; only reported when the upstream supports such tokens.
	pub use_expiring_tokens: Option<bool>,
	/// Revoke the admin token when the record is deleted.
	pub revoke_on_delete: bool,
	/// Backend default lease TTL.
	pub default_ttl: Duration,
	/// Backend maximum lease TTL.
	pub max_ttl: Duration,
}

/// Read view of a user-token record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UserTokenSummary {
	/// SHA-256 hex digest of the delegated token.
	pub access_token_sha256: String,
	/// SHA-256 hex digest of the refresh token.
	pub refresh_token_sha256: String,
	/// Audience.
	pub audience: String,
	/// Refreshable flag.
	pub refreshable: bool,
	/// Reference token flag.
	pub include_reference_token: bool,
	/// Bounded-lifetime opt-in.
	pub use_expiring_tokens: bool,
	/// Default lease TTL.
	pub default_ttl: Duration,
	/// Maximum lease TTL.
	pub max_ttl: Duration,
	/// Default description.
	pub default_description: String,
	/// Claims of the delegated token, when it decodes.
	pub token: Option<TokenClaims>,
}

impl<C, M> Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates or updates the admin record.
	///
	/// The upstream version is probed with the resulting credential before anything is stored,
	/// so an unreachable host or a rejected token leaves the previous record in place.
	pub async fn configure_admin(&self, update: AdminConfigurationUpdate) -> Result<()> {
		obs::observe(Operation::Configure, "configure_admin", async {
			let _config = self.config_lock.write().await;
			let current = self.store.get_json(&StoreKey::AdminConfig).await?;
			let config = update.apply(current)?;
			let credentials = config.credentials();

			self.version_gate.reset();
			self.reported_version(&credentials).await?;
			self.store.put_json(&StoreKey::AdminConfig, &config).await?;
			self.spawn_usage_report(&credentials, "configure_admin");

			Ok(())
		})
		.await
	}

	/// Summarizes the admin record.
	pub async fn admin_summary(&self) -> Result<AdminSummary> {
		let _config = self.config_lock.read().await;
		let admin = self.admin_configuration().await?;
		let credentials = admin.credentials();
		let token = match self.introspect_with(&credentials, &admin.access_token, true).await {
			Ok(claims) => Some(claims),
			Err(e) => {
				obs::warn_event!("Failed to decode the admin token: {e}");

				None
			},
		};
		let use_expiring_tokens = self
			.supports(&credentials, Capability::ForceRevocable)
			.await
			.unwrap_or(false)
			.then_some(admin.use_expiring_tokens);

		self.spawn_usage_report(&credentials, "admin_summary");

		Ok(AdminSummary {
			version: self.version_gate.cached(&admin.url),
			access_token_sha256: admin.access_token.sha256_hex(),
			url: admin.url,
			token,
			use_expiring_tokens,
			revoke_on_delete: admin.revoke_on_delete,
			default_ttl: admin.default_ttl,
			max_ttl: admin.max_ttl,
		})
	}

	/// Deletes the admin record, revoking its token first when `revoke_on_delete` is set.
	///
	/// A failed revocation aborts the delete.
	pub async fn delete_admin(&self) -> Result<()> {
		obs::observe(Operation::Configure, "delete_admin", async {
			let _config = self.config_lock.write().await;
			let admin = self.admin_configuration().await?;
			let credentials = admin.credentials();

			if admin.revoke_on_delete {
				let claims = TokenClaims::decode_unverified(admin.access_token.expose())?;

				self.revoke(&credentials, &claims.token_id).await?;
			}

			self.spawn_usage_report(&credentials, "delete_admin");
			self.store.delete_key(&StoreKey::AdminConfig).await?;
			self.version_gate.reset();

			Ok(())
		})
		.await
	}

	/// Creates or updates user-token defaults, globally or for one user.
	///
	/// A per-user record starts from the global one. The bearer defaults to the admin token and
	/// the bounded-lifetime opt-in to the admin setting when the update leaves them unset.
	pub async fn configure_user_token(
		&self,
		username: Option<&Username>,
		update: UserTokenConfigurationUpdate,
	) -> Result<()> {
		obs::observe(Operation::Configure, "configure_user_token", async {
			let _config = self.config_lock.read().await;
			let admin = self.admin_configuration().await?;
			let _entities = self.entity_lock.write().await;
			let (_, mut config) = self.user_token_record(username).await?;

			if update.access_token.is_none() {
				config.access_token = admin.access_token.clone();
			}
			if update.use_expiring_tokens.is_none() {
				config.use_expiring_tokens = admin.use_expiring_tokens;
			}

			update.apply(&mut config);

			if config.default_ttl.is_negative() || config.max_ttl.is_negative() {
				return Err(ConfigError::InvalidTtl.into());
			}

			self.store
				.put_json(&StoreKey::UserTokenConfig(username.cloned()), &config)
				.await?;
			self.spawn_usage_report(&admin.credentials(), "configure_user_token");

			Ok(())
		})
		.await
	}

	/// Summarizes the user-token record for `username` (or the global record).
	pub async fn user_token_summary(&self, username: Option<&Username>) -> Result<UserTokenSummary> {
		let _config = self.config_lock.read().await;
		let admin = self.admin_configuration().await?;
		let config: UserTokenConfiguration = {
			let _entities = self.entity_lock.read().await;

			self.user_token_record(username).await?.1
		};
		let token = if config.access_token.is_empty() {
			None
		} else {
			match self.introspect_with(&admin.credentials(), &config.access_token, true).await {
				Ok(claims) => Some(claims),
				Err(e) => {
					obs::warn_event!("Failed to decode the user token: {e}");

					None
				},
			}
		};

		self.spawn_usage_report(&admin.credentials(), "user_token_summary");

		Ok(UserTokenSummary {
			access_token_sha256: config.access_token.sha256_hex(),
			refresh_token_sha256: config.refresh_token.sha256_hex(),
			audience: config.audience,
			refreshable: config.refreshable,
			include_reference_token: config.include_reference_token,
			use_expiring_tokens: config.use_expiring_tokens,
			default_ttl: config.default_ttl,
			max_ttl: config.max_ttl,
			default_description: config.default_description,
			token,
		})
	}

	/// Validates and stores a role.
	///
	/// TTLs are checked against the admin record's `max_ttl` when one is configured.
	pub async fn put_role(&self, name: &RoleName, role: RoleDefinition) -> Result<()> {
		obs::observe(Operation::Configure, "put_role", async {
			let _config = self.config_lock.read().await;
			let backend_max_ttl = match self.admin_configuration().await {
				Ok(admin) => admin.max_ttl,
				Err(Error::ConfigurationMissing) => Duration::ZERO,
				Err(e) => return Err(e),
			};

			role.validate(backend_max_ttl)?;

			let _entities = self.entity_lock.write().await;

			self.store.put_json(&StoreKey::Role(name.clone()), &role).await?;

			Ok(())
		})
		.await
	}

	/// Fetches a stored role.
	pub async fn role(&self, name: &RoleName) -> Result<RoleDefinition> {
		let _entities = self.entity_lock.read().await;

		self.store
			.get_json(&StoreKey::Role(name.clone()))
			.await?
			.ok_or_else(|| Error::RoleNotFound { name: name.to_string() })
	}

	/// Lists stored role names in lexical order.
	pub async fn list_roles(&self) -> Result<Vec<RoleName>> {
		let _entities = self.entity_lock.read().await;
		let keys = self.store.list(StoreKey::ROLE_PREFIX).await?;

		keys.iter()
			.filter_map(|key| key.strip_prefix(StoreKey::ROLE_PREFIX))
			.map(|name| RoleName::new(name).map_err(|e| ConfigError::from(e).into()))
			.collect()
	}

	/// Deletes a role; deleting an unknown role is not an error.
	pub async fn delete_role(&self, name: &RoleName) -> Result<()> {
		let _entities = self.entity_lock.write().await;

		Ok(self.store.delete_key(&StoreKey::Role(name.clone())).await?)
	}
}
