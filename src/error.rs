//! Engine-level error types shared across flows, upstream calls, and stores.

// self
use crate::{
	_prelude::*,
	version::{ArtifactoryVersion, Capability},
};

/// Engine-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical engine error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Reported upstream version could not be parsed.
	#[error(transparent)]
	Version(#[from] crate::version::VersionParseError),

	/// No admin credential has been stored yet.
	#[error("Backend is not configured.")]
	ConfigurationMissing,
	/// Upstream is older than the release that introduced a capability.
	#[error("Artifactory {reported} does not support {capability}; {required} or newer is required.")]
	VersionIncompatible {
		/// Capability that was requested.
		capability: Capability,
		/// Minimum release providing the capability.
		required: ArtifactoryVersion,
		/// Version reported by the upstream.
		reported: String,
	},
	/// Upstream rejected the bearer credential because it expired.
	#[error("Access token has expired.")]
	TokenExpired,
	/// Upstream answered with a non-success status.
	#[error("Artifactory rejected the request with HTTP {status}: {message}.")]
	UpstreamRejected {
		/// HTTP status code.
		status: u16,
		/// Joined upstream error messages or the raw body.
		message: String,
	},
	/// Upstream answered with a body that could not be decoded.
	#[error("Artifactory returned a malformed response.")]
	MalformedResponse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Client-supplied scope failed validation.
	#[error("Provided scope `{scope}` is invalid.")]
	InvalidScope {
		/// The rejected scope string.
		scope: String,
	},
	/// Access token could not be decoded or verified.
	#[error("Access token is invalid: {reason}.")]
	InvalidToken {
		/// Decoder or verifier reason.
		reason: String,
	},
	/// Root certificate could not be decoded.
	#[error("Root certificate is invalid: {reason}.")]
	InvalidCertificate {
		/// Decoder reason.
		reason: String,
	},
	/// Lease carries no refresh token.
	#[error("Lease cannot be renewed.")]
	LeaseNotRenewable,
	/// Named role does not exist.
	#[error("Role `{name}` does not exist.")]
	RoleNotFound {
		/// Requested role name.
		name: String,
	},
}
impl Error {
	/// Returns `true` when the upstream reported an expired bearer credential.
	pub fn is_token_expired(&self) -> bool {
		matches!(self, Self::TokenExpired)
	}
}

/// Configuration and validation failures raised by the engine.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Request body could not be serialized.
	#[error("Request body could not be serialized.")]
	RequestEncode(#[from] serde_json::Error),
	/// Admin configuration was written without a base URL.
	#[error("Artifactory URL is required.")]
	MissingUrl,
	/// An upstream call was attempted without a bearer credential.
	#[error("Empty access token not allowed.")]
	EmptyAccessToken,
	/// `client_credentials` grant was requested without a subject.
	#[error("Empty username not allowed for the client_credentials grant.")]
	MissingUsername,
	/// Refresh grant was requested without a refresh token.
	#[error("No refresh token supplied.")]
	MissingRefreshToken,
	/// TTL values cannot be negative.
	#[error("TTL values cannot be negative.")]
	InvalidTtl,
	/// Token id could not be determined for a revocation.
	#[error("Token id is required to revoke an access token.")]
	MissingTokenId,
	/// Role definition failed validation.
	#[error("Role definition is invalid: {reason}.")]
	InvalidRole {
		/// Validation failure.
		reason: String,
	},
	/// Engine settings failed validation.
	#[error(transparent)]
	InvalidSettings(#[from] crate::settings::EngineSettingsError),
	/// Identifier failed validation.
	#[error(transparent)]
	InvalidIdentifier(#[from] crate::auth::IdentifierError),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling Artifactory.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling Artifactory.")]
	Io(#[from] std::io::Error),
	/// HTTP client failed without a structured cause.
	#[error("HTTP client error occurred while calling Artifactory: {message}.")]
	Other {
		/// Client-supplied description.
		message: String,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn version_incompatible_names_capability_and_versions() {
		let err = Error::VersionIncompatible {
			capability: Capability::RootCertificate,
			required: Capability::RootCertificate.threshold(),
			reported: "7.11.2".into(),
		};

		assert_eq!(
			err.to_string(),
			"Artifactory 7.11.2 does not support root_certificate; 7.12.0 or newer is required."
		);
	}

	#[test]
	fn token_expired_is_distinguished() {
		assert!(Error::TokenExpired.is_token_expired());
		assert!(!Error::ConfigurationMissing.is_token_expired());
	}
}
