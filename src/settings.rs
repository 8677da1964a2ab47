//! Engine-wide settings and their validating builder.

// self
use crate::{_prelude::*, ttl::TtlLayer};

/// Product identifier sent as `User-Agent` and in usage reports.
pub const DEFAULT_PRODUCT_ID: &str = concat!("artifactory-broker/", env!("CARGO_PKG_VERSION"));
/// Subject used for rotated admin tokens when the current token names none.
pub const DEFAULT_ROTATION_USERNAME: &str = "admin-artifactory-broker";
/// Description attached to rotated admin tokens.
pub const DEFAULT_ROTATION_DESCRIPTION: &str = "Rotated access token for artifactory-broker";

/// Errors raised while validating [`EngineSettings`].
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum EngineSettingsError {
	/// Product identifier must be non-empty printable ASCII.
	#[error("Product identifier must be non-empty printable ASCII.")]
	InvalidProductId,
	/// System TTLs cannot be negative.
	#[error("System TTL values cannot be negative.")]
	NegativeSystemTtl,
	/// System default TTL exceeds the system maximum.
	#[error("System default TTL cannot exceed the system maximum TTL.")]
	SystemTtlInverted,
	/// Rotation subject must not be blank.
	#[error("Rotation username cannot be blank.")]
	BlankRotationUsername,
}

/// Engine-wide settings shared by every operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineSettings {
	/// Identifier sent as `User-Agent` and in usage reports.
	pub product_id: String,
	/// Host default and maximum lease TTL.
	pub system_ttl: TtlLayer,
	/// Send fire-and-forget usage reports.
	pub usage_reporting: bool,
	/// Fallback subject for rotated admin tokens.
	pub rotation_username: String,
	/// Description attached to rotated admin tokens.
	pub rotation_description: String,
}
impl EngineSettings {
	/// Starts a builder seeded with defaults.
	pub fn builder() -> EngineSettingsBuilder {
		EngineSettingsBuilder::default()
	}
}
impl Default for EngineSettings {
	fn default() -> Self {
		Self {
			product_id: DEFAULT_PRODUCT_ID.into(),
			system_ttl: TtlLayer::default(),
			usage_reporting: true,
			rotation_username: DEFAULT_ROTATION_USERNAME.into(),
			rotation_description: DEFAULT_ROTATION_DESCRIPTION.into(),
		}
	}
}

/// Builder for [`EngineSettings`].
#[derive(Debug, Default)]
pub struct EngineSettingsBuilder {
	settings: EngineSettings,
}
impl EngineSettingsBuilder {
	/// Overrides the product identifier.
	pub fn product_id(mut self, product_id: impl Into<String>) -> Self {
		self.settings.product_id = product_id.into();

		self
	}

	/// Sets the host default lease TTL.
	pub fn system_default_ttl(mut self, ttl: Duration) -> Self {
		self.settings.system_ttl.ttl = ttl;

		self
	}

	/// Sets the host maximum lease TTL.
	pub fn system_max_ttl(mut self, max_ttl: Duration) -> Self {
		self.settings.system_ttl.max_ttl = max_ttl;

		self
	}

	/// Enables or disables usage reports.
	pub fn usage_reporting(mut self, enabled: bool) -> Self {
		self.settings.usage_reporting = enabled;

		self
	}

	/// Overrides the fallback subject for rotated admin tokens.
	pub fn rotation_username(mut self, username: impl Into<String>) -> Self {
		self.settings.rotation_username = username.into();

		self
	}

	/// Overrides the description attached to rotated admin tokens.
	pub fn rotation_description(mut self, description: impl Into<String>) -> Self {
		self.settings.rotation_description = description.into();

		self
	}

	/// Validates and returns the settings.
	pub fn build(self) -> Result<EngineSettings, EngineSettingsError> {
		let settings = self.settings;
		let product_id = settings.product_id.as_str();

		if product_id.is_empty() || !product_id.chars().all(|c| c.is_ascii_graphic()) {
			return Err(EngineSettingsError::InvalidProductId);
		}

		let TtlLayer { ttl, max_ttl } = settings.system_ttl;

		if ttl.is_negative() || max_ttl.is_negative() {
			return Err(EngineSettingsError::NegativeSystemTtl);
		}
		if max_ttl.is_positive() && ttl > max_ttl {
			return Err(EngineSettingsError::SystemTtlInverted);
		}
		if settings.rotation_username.trim().is_empty() {
			return Err(EngineSettingsError::BlankRotationUsername);
		}

		Ok(settings)
	}
}
