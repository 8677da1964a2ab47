// self
use crate::{
	_prelude::*,
	config::Credentials,
	error::ConfigError,
	flows::Broker,
	http::TokenHttpClient,
	obs::{self, Operation},
	upstream::{LEGACY_REVOKE_PATH, TOKENS_PATH, TransportErrorMapper},
};

impl<C, M> Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Revokes the token identified by `token_id`.
	///
	/// A token the upstream no longer knows (HTTP 404) counts as revoked. Every other
	/// non-success answer is returned as an error.
	pub async fn revoke(&self, credentials: &Credentials, token_id: &str) -> Result<()> {
		obs::observe(Operation::Revoke, "revoke", async {
			if token_id.is_empty() {
				return Err(ConfigError::MissingTokenId.into());
			}

			let response = if self.uses_new_token_api(credentials).await {
				let path = format!("{TOKENS_PATH}/{token_id}");

				self.upstream().delete(Operation::Revoke, credentials, &path).await?
			} else {
				let fields = [("token_id", token_id.to_owned())];

				self.upstream()
					.post_form(Operation::Revoke, credentials, LEGACY_REVOKE_PATH, &fields)
					.await?
			};

			if response.status == 404 {
				obs::debug_event!("Token {token_id} is already gone upstream");

				return Ok(());
			}

			response.ensure_success().map(|_| ())
		})
		.await
	}
}
