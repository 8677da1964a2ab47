//! Token creation and refresh exchanges for both token API generations.
//!
//! The legacy API (`/artifactory/api/security/token`) takes a form with a fixed field list; the
//! JSON API (`/access/api/v1/tokens`, 7.21.1+) adds description, reference tokens, and
//! `force_revocable`. Tokens are minted non-expiring (`expires_in = 0`) unless the caller opted
//! in to bounded lifetimes, the upstream is 7.50.3 or newer, and the resolved TTL is positive:
//! older releases cannot reliably revoke a token that carries its own expiry.

// self
use crate::{
	_prelude::*,
	auth::{GrantType, IssuanceRequest, IssuanceResponse, TokenSecret},
	config::Credentials,
	error::ConfigError,
	flows::Broker,
	http::TokenHttpClient,
	obs::{self, Operation},
	upstream::{LEGACY_TOKEN_PATH, TOKENS_PATH, TransportErrorMapper, UpstreamResponse},
	version::Capability,
};

#[derive(Debug, Serialize)]
struct AccessTokenBody<'a> {
	grant_type: &'static str,
	#[serde(skip_serializing_if = "str::is_empty")]
	username: &'a str,
	#[serde(skip_serializing_if = "str::is_empty")]
	scope: &'a str,
	expires_in: i64,
	#[serde(skip_serializing_if = "is_false")]
	refreshable: bool,
	#[serde(skip_serializing_if = "str::is_empty")]
	description: &'a str,
	#[serde(skip_serializing_if = "str::is_empty")]
	audience: &'a str,
	#[serde(skip_serializing_if = "is_false")]
	force_revocable: bool,
	#[serde(skip_serializing_if = "is_false")]
	include_reference_token: bool,
	#[serde(skip_serializing_if = "str::is_empty")]
	refresh_token: &'a str,
}

/// Lifetime fields negotiated for one request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Lifetime {
	expires_in: i64,
	force_revocable: bool,
}

impl<C, M> Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Mints a token described by `request`, authenticated with `credentials`.
	///
	/// An expired bearer credential surfaces as [`Error::TokenExpired`] so callers holding a
	/// refresh token can recover.
	pub async fn issue(
		&self,
		credentials: &Credentials,
		request: &IssuanceRequest,
	) -> Result<IssuanceResponse> {
		obs::observe(Operation::Issue, "issue", self.exchange(credentials, request)).await
	}

	/// Exchanges `refresh_token` for a new access/refresh token pair.
	pub async fn refresh(
		&self,
		credentials: &Credentials,
		refresh_token: &TokenSecret,
	) -> Result<IssuanceResponse> {
		let request = IssuanceRequest::refresh(refresh_token.clone());

		obs::observe(Operation::Refresh, "refresh", self.exchange(credentials, &request)).await
	}

	pub(crate) async fn exchange(
		&self,
		credentials: &Credentials,
		request: &IssuanceRequest,
	) -> Result<IssuanceResponse> {
		let refresh_token = match request.grant_type {
			GrantType::ClientCredentials => {
				if request.username.trim().is_empty() {
					return Err(ConfigError::MissingUsername.into());
				}

				None
			},
			GrantType::RefreshToken => Some(
				request
					.refresh_token
					.as_ref()
					.filter(|token| !token.is_empty())
					.ok_or(ConfigError::MissingRefreshToken)?,
			),
		};
		let lifetime = match request.grant_type {
			GrantType::ClientCredentials => self.negotiate_lifetime(credentials, request).await?,
			GrantType::RefreshToken => Lifetime::default(),
		};
		let operation = match request.grant_type {
			GrantType::ClientCredentials => Operation::Issue,
			GrantType::RefreshToken => Operation::Refresh,
		};
		let response = if self.uses_new_token_api(credentials).await {
			let body = AccessTokenBody {
				grant_type: request.grant_type.as_str(),
				username: &request.username,
				scope: request.scope.as_str(),
				expires_in: lifetime.expires_in,
				refreshable: request.refreshable,
				description: &request.description,
				audience: &request.audience,
				force_revocable: lifetime.force_revocable,
				include_reference_token: request.include_reference_token,
				refresh_token: refresh_token.map(TokenSecret::expose).unwrap_or_default(),
			};

			self.upstream().post_json(operation, credentials, TOKENS_PATH, &body).await?
		} else {
			let fields = legacy_fields(credentials, request, lifetime, refresh_token);

			self.upstream().post_form(operation, credentials, LEGACY_TOKEN_PATH, &fields).await?
		};

		decode_issued(response)
	}

	async fn negotiate_lifetime(
		&self,
		credentials: &Credentials,
		request: &IssuanceRequest,
	) -> Result<Lifetime> {
		if !request.use_expiring_tokens || !request.ttl.is_positive() {
			return Ok(Lifetime::default());
		}
		if !self.supports(credentials, Capability::ForceRevocable).await? {
			obs::debug_event!(
				"Artifactory predates {}; issuing a non-expiring token",
				Capability::ForceRevocable.threshold()
			);

			return Ok(Lifetime::default());
		}

		Ok(Lifetime {
			expires_in: request.ttl.whole_seconds(),
			force_revocable: request.force_revocable.unwrap_or(true),
		})
	}
}

fn legacy_fields(
	credentials: &Credentials,
	request: &IssuanceRequest,
	lifetime: Lifetime,
	refresh_token: Option<&TokenSecret>,
) -> Vec<(&'static str, String)> {
	match refresh_token {
		Some(refresh_token) => vec![
			("grant_type", GrantType::RefreshToken.as_str().to_owned()),
			("refresh_token", refresh_token.expose().to_owned()),
			(
				"access_token",
				request.access_token.as_ref().unwrap_or(&credentials.access_token).expose().to_owned(),
			),
		],
		None => vec![
			("grant_type", GrantType::ClientCredentials.as_str().to_owned()),
			("username", request.username.clone()),
			("scope", request.scope.as_str().to_owned()),
			("expires_in", lifetime.expires_in.to_string()),
			("refreshable", request.refreshable.to_string()),
			("audience", request.audience.clone()),
		],
	}
}

fn decode_issued(response: UpstreamResponse) -> Result<IssuanceResponse> {
	let issued: IssuanceResponse = response.ensure_success()?.json()?;

	if issued.access_token.is_empty() {
		return Err(Error::InvalidToken { reason: "upstream returned an empty access token".into() });
	}

	Ok(issued)
}

fn is_false(value: &bool) -> bool {
	!*value
}
