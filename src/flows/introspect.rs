//! Token introspection and liveness checks.

// self
use crate::{
	_prelude::*,
	auth::{TokenClaims, TokenSecret, token::root_cert::RootCertificate},
	config::Credentials,
	flows::Broker,
	http::TokenHttpClient,
	obs::{self, Operation},
	upstream::{ROOT_CERT_PATH, TOKEN_ME_PATH, TransportErrorMapper},
	version::Capability,
};

impl<C, M> Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Decodes `token` into [`TokenClaims`].
	///
	/// With `validate` unset the claims are read without any network access. Otherwise the
	/// signature is checked against the root certificate of the configured upstream; an
	/// upstream too old to publish that certificate degrades to unverified decoding with a
	/// warning, while any other failure to obtain it is returned.
	pub async fn introspect(&self, token: &TokenSecret, validate: bool) -> Result<TokenClaims> {
		obs::observe(Operation::Introspect, "introspect", async {
			if !validate {
				return TokenClaims::decode_unverified(token.expose());
			}

			let admin = self.admin_configuration().await?;

			self.introspect_with(&admin.credentials(), token, true).await
		})
		.await
	}

	pub(crate) async fn introspect_with(
		&self,
		credentials: &Credentials,
		token: &TokenSecret,
		validate: bool,
	) -> Result<TokenClaims> {
		if !validate {
			return TokenClaims::decode_unverified(token.expose());
		}

		match self.root_certificate(credentials).await {
			Ok(root) => TokenClaims::decode_verified(token.expose(), &root),
			Err(Error::VersionIncompatible { reported, .. }) => {
				obs::warn_event!(
					"Artifactory {reported} cannot publish its root certificate; token signature is not verified"
				);

				TokenClaims::decode_unverified(token.expose())
			},
			Err(e) => Err(e),
		}
	}

	/// Fetches the Access root certificate used to verify token signatures.
	pub async fn root_certificate(&self, credentials: &Credentials) -> Result<RootCertificate> {
		self.require(credentials, Capability::RootCertificate).await?;

		let response = self
			.upstream()
			.get(Operation::RootCertificate, credentials, ROOT_CERT_PATH)
			.await?
			.ensure_success()?;

		RootCertificate::from_base64_der(&response.text())
	}

	/// Asks the upstream whether the bearer token in `credentials` is still accepted.
	///
	/// An expired token surfaces as [`Error::TokenExpired`].
	pub async fn check_token(&self, credentials: &Credentials) -> Result<()> {
		obs::observe(Operation::TokenCheck, "check_token", async {
			self.upstream()
				.get(Operation::TokenCheck, credentials, TOKEN_ME_PATH)
				.await?
				.ensure_success()
				.map(|_| ())
		})
		.await
	}
}
