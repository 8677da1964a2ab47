//! Capability thresholds for the Artifactory token API generations.
//!
//! Artifactory changed its token surface several times. [`Capability`] names the three changes
//! the engine cares about and [`supports`] answers whether a reported version carries one of
//! them. Comparison uses full semantic-version ordering, so `7.3.0` sorts below `7.21.1`.
//!
//! [`VersionGate`] remembers the version reported by the configured upstream so the probe
//! endpoint is called at most once per base URL until the gate is reset.

// std
use std::cmp::Ordering;
// crates.io
use semver::Version;
// self
use crate::_prelude::*;

/// Upstream features gated on a minimum Artifactory release.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
	/// JSON token API under `/access/api/v1/tokens`.
	NewAccessApi,
	/// Root certificate endpoint used for signature verification.
	RootCertificate,
	/// Bounded-lifetime tokens carrying `force_revocable`.
	ForceRevocable,
}
impl Capability {
	/// Every known capability, in threshold order.
	pub const ALL: [Capability; 3] =
		[Capability::RootCertificate, Capability::NewAccessApi, Capability::ForceRevocable];

	/// Minimum release providing the capability (inclusive).
	pub fn threshold(self) -> ArtifactoryVersion {
		let (major, minor, patch) = self.threshold_parts();

		ArtifactoryVersion(Version::new(major, minor, patch))
	}

	const fn threshold_parts(self) -> (u64, u64, u64) {
		match self {
			Capability::RootCertificate => (7, 12, 0),
			Capability::NewAccessApi => (7, 21, 1),
			Capability::ForceRevocable => (7, 50, 3),
		}
	}

	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Capability::NewAccessApi => "new_access_api",
			Capability::RootCertificate => "root_certificate",
			Capability::ForceRevocable => "force_revocable",
		}
	}
}
impl Display for Capability {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Error returned when a version string is not a semantic version.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Version `{version}` is not a valid semantic version.")]
pub struct VersionParseError {
	/// The rejected input.
	pub version: String,
}

/// Parsed Artifactory release.
///
/// Parsing is lenient in the ways Artifactory itself is: a leading `v` is ignored and missing
/// minor or patch components default to zero (`7.21` reads as `7.21.0`).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ArtifactoryVersion(Version);
impl ArtifactoryVersion {
	/// Parses a reported version string.
	pub fn parse(raw: &str) -> Result<Self, VersionParseError> {
		let invalid = || VersionParseError { version: raw.to_owned() };
		let trimmed = raw.trim();
		let trimmed = trimmed.strip_prefix(['v', 'V']).unwrap_or(trimmed);
		let split_at = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
		let (core, suffix) = trimmed.split_at(split_at);
		let mut parts = [0_u64; 3];
		let mut count = 0;

		for piece in core.split('.') {
			if count == parts.len() {
				return Err(invalid());
			}

			parts[count] = piece.parse().map_err(|_| invalid())?;
			count += 1;
		}

		let normalized = format!("{}.{}.{}{suffix}", parts[0], parts[1], parts[2]);

		Version::parse(&normalized).map(Self).map_err(|_| invalid())
	}

	/// Returns `true` when this release provides `capability`.
	pub fn supports(&self, capability: Capability) -> bool {
		*self >= capability.threshold()
	}
}
impl PartialOrd for ArtifactoryVersion {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}
impl Ord for ArtifactoryVersion {
	fn cmp(&self, other: &Self) -> Ordering {
		self.0.cmp(&other.0)
	}
}
impl Display for ArtifactoryVersion {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		Display::fmt(&self.0, f)
	}
}
impl FromStr for ArtifactoryVersion {
	type Err = VersionParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse(s)
	}
}

/// Answers whether `reported` meets the threshold for `capability`.
pub fn supports(capability: Capability, reported: &str) -> Result<bool, VersionParseError> {
	Ok(ArtifactoryVersion::parse(reported)?.supports(capability))
}

/// Cache for the version reported by the configured upstream.
///
/// The gate holds no HTTP state of its own; the engine probes the version endpoint and records
/// the answer here keyed by the base URL it probed.
#[derive(Debug, Default)]
pub struct VersionGate {
	cached: RwLock<Option<(Url, String)>>,
}
impl VersionGate {
	/// Returns the cached version for `base`, if one was recorded.
	pub fn cached(&self, base: &Url) -> Option<String> {
		self.cached
			.read()
			.as_ref()
			.filter(|(url, _)| url == base)
			.map(|(_, version)| version.clone())
	}

	/// Records the version reported by `base`.
	pub fn remember(&self, base: &Url, version: impl Into<String>) {
		*self.cached.write() = Some((base.clone(), version.into()));
	}

	/// Drops the cached version so the next lookup probes again.
	pub fn reset(&self) {
		self.cached.write().take();
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn comparison_is_semantic_not_lexicographic() {
		assert!(supports(Capability::NewAccessApi, "7.21.1").expect("Version should parse."));
		assert!(!supports(Capability::NewAccessApi, "7.9.0").expect("Version should parse."));
		assert!(!supports(Capability::NewAccessApi, "7.3.0").expect("Version should parse."));
		assert!(supports(Capability::NewAccessApi, "7.100.0").expect("Version should parse."));
	}

	#[test]
	fn thresholds_are_inclusive() {
		for capability in Capability::ALL {
			assert!(
				supports(capability, &capability.threshold().to_string())
					.expect("Threshold should parse."),
				"{capability} must accept its own threshold."
			);
		}

		assert!(!supports(Capability::ForceRevocable, "7.50.2").expect("Version should parse."));
		assert!(supports(Capability::RootCertificate, "7.12.0").expect("Version should parse."));
		assert!(!supports(Capability::RootCertificate, "7.11.9").expect("Version should parse."));
	}

	#[test]
	fn thresholds_render_as_release_strings() {
		assert_eq!(Capability::RootCertificate.threshold().to_string(), "7.12.0");
		assert_eq!(Capability::NewAccessApi.threshold().to_string(), "7.21.1");
		assert_eq!(Capability::ForceRevocable.threshold().to_string(), "7.50.3");
	}

	#[test]
	fn lenient_parsing_pads_and_strips() {
		assert_eq!(
			ArtifactoryVersion::parse("v7.21").expect("Short version should parse.").to_string(),
			"7.21.0"
		);
		assert_eq!(
			ArtifactoryVersion::parse(" 7.55.10 ").expect("Padded version should parse.").to_string(),
			"7.55.10"
		);
		assert!(
			ArtifactoryVersion::parse("7.50.3-rc1").expect("Pre-release should parse.")
				< ArtifactoryVersion::parse("7.50.3").expect("Release should parse.")
		);
	}

	#[test]
	fn garbage_is_rejected() {
		let err = supports(Capability::NewAccessApi, "latest").expect_err("Garbage must fail.");

		assert_eq!(err.version, "latest");
		assert!(ArtifactoryVersion::parse("").is_err());
		assert!(ArtifactoryVersion::parse("7.1.2.3").is_err());
		assert!(ArtifactoryVersion::parse("7..1").is_err());
	}

	#[test]
	fn gate_cache_is_keyed_by_base_url() {
		let gate = VersionGate::default();
		let primary = Url::parse("https://art.example.com").expect("URL fixture should parse.");
		let other = Url::parse("https://other.example.com").expect("URL fixture should parse.");

		assert!(gate.cached(&primary).is_none());

		gate.remember(&primary, "7.21.1");

		assert_eq!(gate.cached(&primary).as_deref(), Some("7.21.1"));
		assert!(gate.cached(&other).is_none());
		assert!(
			!supports(Capability::ForceRevocable, &gate.cached(&primary).unwrap_or_default())
				.expect("Cached version should parse.")
		);

		gate.reset();

		assert!(gate.cached(&primary).is_none());
	}
}
