//! Issuance request and normalized response shapes.

// self
use crate::{
	_prelude::*,
	auth::{TokenScope, TokenSecret},
};

/// Grant types understood by the Artifactory token endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
	/// Mint a token for `username`.
	#[default]
	ClientCredentials,
	/// Exchange a refresh token.
	RefreshToken,
}
impl GrantType {
	/// Wire label.
	pub const fn as_str(self) -> &'static str {
		match self {
			GrantType::ClientCredentials => "client_credentials",
			GrantType::RefreshToken => "refresh_token",
		}
	}
}
impl Display for GrantType {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Parameters for one issuance or refresh exchange.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IssuanceRequest {
	/// Grant type sent upstream.
	pub grant_type: GrantType,
	/// Subject identity; required for `client_credentials`.
	pub username: String,
	/// Requested scope.
	pub scope: TokenScope,
	/// Optional audience.
	pub audience: String,
	/// Optional token description (new API only).
	pub description: String,
	/// Ask for a refresh token.
	pub refreshable: bool,
	/// Ask for a reference token (new API only).
	pub include_reference_token: bool,
	/// Resolved lease TTL.
	pub ttl: Duration,
	/// Resolved maximum lease TTL.
	pub max_ttl: Duration,
	/// Opt in to bounded-lifetime tokens.
	pub use_expiring_tokens: bool,
	/// Explicit `force_revocable` choice; defaults to `true` for bounded tokens.
	pub force_revocable: Option<bool>,
	/// Refresh token; required for the `refresh_token` grant.
	pub refresh_token: Option<TokenSecret>,
	/// Token being refreshed, sent by the legacy refresh form; defaults to the bearer.
	pub access_token: Option<TokenSecret>,
}
impl IssuanceRequest {
	/// Starts a `client_credentials` request for `username` with `scope`.
	pub fn client_credentials(username: impl Into<String>, scope: impl Into<TokenScope>) -> Self {
		Self { username: username.into(), scope: scope.into(), ..Default::default() }
	}

	/// Starts a `refresh_token` exchange.
	pub fn refresh(refresh_token: impl Into<TokenSecret>) -> Self {
		Self {
			grant_type: GrantType::RefreshToken,
			refresh_token: Some(refresh_token.into()),
			..Default::default()
		}
	}
}

/// Normalized token endpoint response.
///
/// Both token API generations answer with the same field names; the legacy API omits
/// `token_id` and `reference_token`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuanceResponse {
	/// Issued access token.
	pub access_token: TokenSecret,
	/// Refresh token, when requested.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub refresh_token: Option<TokenSecret>,
	/// Reference token, when requested.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reference_token: Option<TokenSecret>,
	/// Upstream token id.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub token_id: Option<String>,
	/// Granted scope.
	#[serde(default)]
	pub scope: String,
	/// Lifetime in seconds; zero for non-expiring tokens.
	#[serde(default)]
	pub expires_in: i64,
	/// Token type label.
	#[serde(default)]
	pub token_type: String,
}
impl IssuanceResponse {
	/// Refresh token, ignoring the empty string some releases send.
	pub fn refresh_token(&self) -> Option<&TokenSecret> {
		self.refresh_token.as_ref().filter(|secret| !secret.is_empty())
	}

	/// Token id, ignoring the empty string.
	pub fn token_id(&self) -> Option<&str> {
		self.token_id.as_deref().filter(|id| !id.is_empty())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn legacy_response_without_token_id_decodes() {
		let response: IssuanceResponse = serde_json::from_str(
			r#"{"access_token":"abc","expires_in":0,"scope":"api:*","token_type":"Bearer","refresh_token":""}"#,
		)
		.expect("Legacy response should decode.");

		assert_eq!(response.access_token.expose(), "abc");
		assert_eq!(response.token_id(), None);
		assert_eq!(response.refresh_token(), None);
	}

	#[test]
	fn client_credentials_request_defaults() {
		let request = IssuanceRequest::client_credentials("ci", "applied-permissions/user");

		assert_eq!(request.grant_type, GrantType::ClientCredentials);
		assert_eq!(request.scope.as_str(), "applied-permissions/user");
		assert_eq!(request.ttl, Duration::ZERO);
		assert_eq!(request.force_revocable, None);

		let refresh = IssuanceRequest::refresh("rt");

		assert_eq!(refresh.grant_type, GrantType::RefreshToken);
		assert!(refresh.username.is_empty());
	}
}
