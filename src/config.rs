//! Durable configuration records: admin credential, user-token defaults, and roles.
//!
//! Records are stored as JSON through [`ConfigStore`](crate::store::ConfigStore). Durations are
//! written as whole seconds so records stay readable by hand.

// self
use crate::{
	_prelude::*,
	auth::{GrantType, TokenScope, TokenSecret},
	error::ConfigError,
	ttl::TtlLayer,
};

/// Serde helper that writes [`Duration`] values as whole seconds.
pub mod duration_secs {
	// crates.io
	use serde::{Deserializer, Serializer};
	// self
	use crate::_prelude::*;

	/// Serializes `value` as whole seconds.
	pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_i64(value.whole_seconds())
	}

	/// Deserializes whole seconds into a [`Duration`].
	pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
	where
		D: Deserializer<'de>,
	{
		i64::deserialize(deserializer).map(Duration::seconds)
	}
}

/// Endpoint and bearer credential for one upstream call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
	/// Artifactory base URL; request paths replace its path.
	pub url: Url,
	/// Bearer token.
	pub access_token: TokenSecret,
}
impl Credentials {
	/// Pairs a base URL with a bearer token.
	pub fn new(url: Url, access_token: impl Into<TokenSecret>) -> Self {
		Self { url, access_token: access_token.into() }
	}
}

/// Engine's own privileged credential and backend-wide defaults.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminConfiguration {
	/// Admin bearer token.
	pub access_token: TokenSecret,
	/// Artifactory base URL.
	pub url: Url,
	/// Issue bounded-lifetime tokens when the upstream supports them.
	#[serde(default)]
	pub use_expiring_tokens: bool,
	/// Explicit `force_revocable` choice for bounded tokens.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub force_revocable: Option<bool>,
	/// Backend default lease TTL.
	#[serde(default, with = "duration_secs")]
	pub default_ttl: Duration,
	/// Backend maximum lease TTL.
	#[serde(default, with = "duration_secs")]
	pub max_ttl: Duration,
	/// Revoke the admin token when the configuration is deleted.
	#[serde(default)]
	pub revoke_on_delete: bool,
}
impl AdminConfiguration {
	/// Creates a configuration with defaults for every optional field.
	pub fn new(url: Url, access_token: impl Into<TokenSecret>) -> Self {
		Self {
			access_token: access_token.into(),
			url,
			use_expiring_tokens: false,
			force_revocable: None,
			default_ttl: Duration::ZERO,
			max_ttl: Duration::ZERO,
			revoke_on_delete: false,
		}
	}

	/// Credentials for calls made with the admin token.
	pub fn credentials(&self) -> Credentials {
		Credentials::new(self.url.clone(), self.access_token.clone())
	}

	/// Backend TTL layer.
	pub fn ttl_layer(&self) -> TtlLayer {
		TtlLayer::new(self.default_ttl, self.max_ttl)
	}
}

/// Partial update applied by [`Broker::configure_admin`](crate::flows::Broker::configure_admin).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AdminConfigurationUpdate {
	/// New admin token.
	pub access_token: Option<TokenSecret>,
	/// New base URL; changing it without a new token clears the stored token.
	pub url: Option<Url>,
	/// Bounded-lifetime opt-in.
	pub use_expiring_tokens: Option<bool>,
	/// `force_revocable` choice.
	pub force_revocable: Option<bool>,
	/// Backend default lease TTL.
	pub default_ttl: Option<Duration>,
	/// Backend maximum lease TTL.
	pub max_ttl: Option<Duration>,
	/// Revoke-on-delete flag.
	pub revoke_on_delete: Option<bool>,
}

impl AdminConfigurationUpdate {
	/// Merges the update into `current`, producing the record to persist.
	///
	/// A URL change clears the stored token unless the same update carries a new one, so a
	/// credential is never replayed against a different host.
	pub fn apply(
		self,
		current: Option<AdminConfiguration>,
	) -> Result<AdminConfiguration, ConfigError> {
		let mut config = match (current, self.url) {
			(Some(mut config), Some(url)) => {
				if config.url != url {
					config.access_token = TokenSecret::default();
				}

				config.url = url;

				config
			},
			(Some(config), None) => config,
			(None, Some(url)) => AdminConfiguration::new(url, TokenSecret::default()),
			(None, None) => return Err(ConfigError::MissingUrl),
		};

		if let Some(value) = self.access_token {
			config.access_token = value;
		}
		if let Some(value) = self.use_expiring_tokens {
			config.use_expiring_tokens = value;
		}
		if let Some(value) = self.force_revocable {
			config.force_revocable = Some(value);
		}
		if let Some(value) = self.default_ttl {
			config.default_ttl = value;
		}
		if let Some(value) = self.max_ttl {
			config.max_ttl = value;
		}
		if let Some(value) = self.revoke_on_delete {
			config.revoke_on_delete = value;
		}

		if config.access_token.is_empty() {
			return Err(ConfigError::EmptyAccessToken);
		}
		if config.default_ttl.is_negative() || config.max_ttl.is_negative() {
			return Err(ConfigError::InvalidTtl);
		}

		Ok(config)
	}
}

/// Defaults for user tokens, stored globally or per user.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTokenConfiguration {
	/// Delegated bearer token; the admin token is used when empty.
	#[serde(default)]
	pub access_token: TokenSecret,
	/// Refresh token paired with `access_token`.
	#[serde(default)]
	pub refresh_token: TokenSecret,
	/// Audience for issued tokens.
	#[serde(default)]
	pub audience: String,
	/// Request refreshable tokens.
	#[serde(default)]
	pub refreshable: bool,
	/// Request reference tokens.
	#[serde(default)]
	pub include_reference_token: bool,
	/// Issue bounded-lifetime tokens when supported.
	#[serde(default)]
	pub use_expiring_tokens: bool,
	/// Explicit `force_revocable` choice.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub force_revocable: Option<bool>,
	/// Default lease TTL.
	#[serde(default, with = "duration_secs")]
	pub default_ttl: Duration,
	/// Maximum lease TTL.
	#[serde(default, with = "duration_secs")]
	pub max_ttl: Duration,
	/// Description applied when the request sets none.
	#[serde(default)]
	pub default_description: String,
}
impl UserTokenConfiguration {
	/// Entity TTL layer.
	pub fn ttl_layer(&self) -> TtlLayer {
		TtlLayer::new(self.default_ttl, self.max_ttl)
	}

	/// Stored refresh token, if any.
	pub fn refresh_token(&self) -> Option<&TokenSecret> {
		Some(&self.refresh_token).filter(|secret| !secret.is_empty())
	}
}

/// Partial update applied by
/// [`Broker::configure_user_token`](crate::flows::Broker::configure_user_token).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserTokenConfigurationUpdate {
	/// Delegated bearer token.
	pub access_token: Option<TokenSecret>,
	/// Refresh token.
	pub refresh_token: Option<TokenSecret>,
	/// Audience.
	pub audience: Option<String>,
	/// Refreshable flag.
	pub refreshable: Option<bool>,
	/// Reference token flag.
	pub include_reference_token: Option<bool>,
	/// Bounded-lifetime opt-in.
	pub use_expiring_tokens: Option<bool>,
	/// `force_revocable` choice.
	pub force_revocable: Option<bool>,
	/// Default lease TTL.
	pub default_ttl: Option<Duration>,
	/// Maximum lease TTL.
	pub max_ttl: Option<Duration>,
	/// Default description.
	pub default_description: Option<String>,
}
impl UserTokenConfigurationUpdate {
	/// Applies every present field to `config`.
	pub fn apply(self, config: &mut UserTokenConfiguration) {
		if let Some(value) = self.access_token {
			config.access_token = value;
		}
		if let Some(value) = self.refresh_token {
			config.refresh_token = value;
		}
		if let Some(value) = self.audience {
			config.audience = value;
		}
		if let Some(value) = self.refreshable {
			config.refreshable = value;
		}
		if let Some(value) = self.include_reference_token {
			config.include_reference_token = value;
		}
		if let Some(value) = self.use_expiring_tokens {
			config.use_expiring_tokens = value;
		}
		if let Some(value) = self.force_revocable {
			config.force_revocable = Some(value);
		}
		if let Some(value) = self.default_ttl {
			config.default_ttl = value;
		}
		if let Some(value) = self.max_ttl {
			config.max_ttl = value;
		}
		if let Some(value) = self.default_description {
			config.default_description = value;
		}
	}
}

/// Stored role: the template for tokens issued through `issue_role_token`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDefinition {
	/// Grant type; `client_credentials` unless stated otherwise.
	#[serde(default)]
	pub grant_type: GrantType,
	/// Subject the token is minted for.
	pub username: String,
	/// Token scope.
	pub scope: TokenScope,
	/// Audience.
	#[serde(default)]
	pub audience: String,
	/// Description.
	#[serde(default)]
	pub description: String,
	/// Request refreshable tokens.
	#[serde(default)]
	pub refreshable: bool,
	/// Request reference tokens.
	#[serde(default)]
	pub include_reference_token: bool,
	/// Default lease TTL.
	#[serde(default, with = "duration_secs")]
	pub default_ttl: Duration,
	/// Maximum lease TTL.
	#[serde(default, with = "duration_secs")]
	pub max_ttl: Duration,
}
impl RoleDefinition {
	/// Entity TTL layer.
	pub fn ttl_layer(&self) -> TtlLayer {
		TtlLayer::new(self.default_ttl, self.max_ttl)
	}

	/// Checks field presence and TTL ordering against the backend ceiling.
	///
	/// A zero `backend_max_ttl` places no ceiling on the role.
	pub fn validate(&self, backend_max_ttl: Duration) -> Result<(), ConfigError> {
		let invalid = |reason: &str| ConfigError::InvalidRole { reason: reason.into() };

		if self.scope.is_empty() {
			return Err(invalid("scope is required"));
		}
		if self.username.trim().is_empty() {
			return Err(invalid("username is required"));
		}
		if self.default_ttl.is_negative() || self.max_ttl.is_negative() {
			return Err(invalid("ttl values cannot be negative"));
		}
		if self.max_ttl.is_positive() && self.default_ttl > self.max_ttl {
			return Err(invalid("default_ttl cannot be greater than max_ttl"));
		}
		if backend_max_ttl.is_positive() {
			if self.max_ttl > backend_max_ttl {
				return Err(invalid("max_ttl cannot be greater than the backend max_ttl"));
			}
			if self.default_ttl > backend_max_ttl {
				return Err(invalid("default_ttl cannot be greater than the backend max_ttl"));
			}
		}

		Ok(())
	}
}
