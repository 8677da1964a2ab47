//! Version probing and capability checks.

// self
use crate::{
	_prelude::*,
	config::Credentials,
	flows::Broker,
	http::TokenHttpClient,
	obs::{self, Operation},
	upstream::{TransportErrorMapper, VERSION_PATH},
	version::{self, Capability},
};

#[derive(Debug, Deserialize)]
struct SystemVersion {
	version: String,
	#[serde(default)]
	revision: String,
}

impl<C, M> Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Version reported by the configured upstream, probing it when nothing is cached.
	pub async fn upstream_version(&self) -> Result<String> {
		obs::observe(Operation::VersionProbe, "upstream_version", async {
			let admin = self.admin_configuration().await?;

			self.reported_version(&admin.credentials()).await
		})
		.await
	}

	/// Version reported by `credentials.url`, served from the gate cache when possible.
	pub async fn reported_version(&self, credentials: &Credentials) -> Result<String> {
		if let Some(version) = self.version_gate.cached(&credentials.url) {
			return Ok(version);
		}

		let response = self
			.upstream()
			.get(Operation::VersionProbe, credentials, VERSION_PATH)
			.await?
			.ensure_success()?;
		let SystemVersion { version, revision } = response.json()?;

		obs::debug_event!("Artifactory reported version {version} (revision {revision})");

		self.version_gate.remember(&credentials.url, version.clone());

		Ok(version)
	}

	/// Answers whether the upstream behind `credentials` provides `capability`.
	pub async fn supports(&self, credentials: &Credentials, capability: Capability) -> Result<bool> {
		let reported = self.reported_version(credentials).await?;

		Ok(version::supports(capability, &reported)?)
	}

	/// Picks the JSON token API unless the upstream is known to predate it.
	///
	/// A failed probe selects the newer API. Only the request shape depends on this answer.
	pub async fn uses_new_token_api(&self, credentials: &Credentials) -> bool {
		match self.supports(credentials, Capability::NewAccessApi).await {
			Ok(supported) => supported,
			Err(e) => {
				obs::warn_event!(
					"Failed to check the Artifactory version; defaulting to the new token API: {e}"
				);

				true
			},
		}
	}

	/// Fails with [`Error::VersionIncompatible`] when `capability` is unavailable.
	pub(crate) async fn require(
		&self,
		credentials: &Credentials,
		capability: Capability,
	) -> Result<()> {
		let reported = self.reported_version(credentials).await?;

		if version::supports(capability, &reported)? {
			Ok(())
		} else {
			Err(Error::VersionIncompatible {
				capability,
				required: capability.threshold(),
				reported,
			})
		}
	}
}
