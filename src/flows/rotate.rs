//! Rotation of the engine's own admin credential.
//!
//! The rotation walks `Idle → Introspecting → Issuing → Persisted → OldRevoked`. The new token
//! is written to the admin record before the old one is revoked, so a failed revocation leaves
//! the engine running on the new credential with the old one still live. That case is reported
//! through [`RotationOutcome::stale_revoke_error`] rather than as a failed rotation. Any failure
//! before `Persisted` leaves the stored record untouched.

// self
use crate::{
	_prelude::*,
	auth::{IssuanceRequest, TokenScope},
	config::Credentials,
	error::ConfigError,
	flows::Broker,
	http::TokenHttpClient,
	obs::{self, Operation},
	store::StoreKey,
	upstream::TransportErrorMapper,
};

/// Steps of a rotation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationStage {
	/// Not started.
	Idle,
	/// Decoding the current credential.
	Introspecting,
	/// Minting the replacement.
	Issuing,
	/// Replacement stored; old credential still live.
	Persisted,
	/// Old credential revoked.
	OldRevoked,
	/// Aborted before the replacement was stored.
	Failed,
}
impl RotationStage {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			RotationStage::Idle => "idle",
			RotationStage::Introspecting => "introspecting",
			RotationStage::Issuing => "issuing",
			RotationStage::Persisted => "persisted",
			RotationStage::OldRevoked => "old_revoked",
			RotationStage::Failed => "failed",
		}
	}
}
impl Display for RotationStage {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Optional overrides for [`Broker::rotate_admin`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RotateRequest {
	/// Subject for the new token; defaults to the subject of the current one.
	pub username: Option<String>,
	/// Description for the new token.
	pub description: Option<String>,
}

/// Result of a rotation that reached `Persisted`.
#[derive(Debug)]
pub struct RotationOutcome {
	/// Final stage: `OldRevoked`, or `Persisted` when the old token could not be revoked.
	pub stage: RotationStage,
	/// Token id of the new credential, when the upstream reported one.
	pub token_id: Option<String>,
	/// Token id of the replaced credential.
	pub previous_token_id: String,
	/// Revocation failure for the replaced credential, which must be cleaned up by hand.
	pub stale_revoke_error: Option<Error>,
}
impl RotationOutcome {
	/// Returns `true` when the old credential was revoked.
	pub fn is_clean(&self) -> bool {
		self.stage == RotationStage::OldRevoked
	}
}

impl<C, M> Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Replaces the stored admin token with a freshly minted one and revokes the old token.
	pub async fn rotate_admin(&self, request: RotateRequest) -> Result<RotationOutcome> {
		obs::observe(Operation::Rotate, "rotate_admin", async {
			let _config = self.config_lock.write().await;
			let mut stage = RotationStage::Idle;
			let result = self.rotate_locked(request, &mut stage).await;

			if let Err(e) = &result {
				let failed_at = stage;

				advance(&mut stage, RotationStage::Failed);
				obs::warn_event!("Admin token rotation failed while {failed_at}: {e}");
			}

			result
		})
		.await
	}

	async fn rotate_locked(
		&self,
		request: RotateRequest,
		stage: &mut RotationStage,
	) -> Result<RotationOutcome> {
		let admin = self.admin_configuration().await?;

		if admin.access_token.is_empty() {
			return Err(ConfigError::EmptyAccessToken.into());
		}

		let credentials = admin.credentials();

		advance(stage, RotationStage::Introspecting);

		let claims = self.introspect_with(&credentials, &admin.access_token, true).await?;
		let username = request
			.username
			.filter(|name| !name.trim().is_empty())
			.or_else(|| Some(claims.username.clone()).filter(|name| !name.is_empty()))
			.unwrap_or_else(|| self.settings.rotation_username.clone());

		advance(stage, RotationStage::Issuing);

		let issuance = IssuanceRequest {
			description: request
				.description
				.unwrap_or_else(|| self.settings.rotation_description.clone()),
			..IssuanceRequest::client_credentials(username, TokenScope::new(claims.scope.clone()))
		};
		let response = self.exchange(&credentials, &issuance).await?;
		let mut rotated = admin.clone();

		rotated.access_token = response.access_token.clone();
		rotated.revoke_on_delete = true;

		self.store.put_json(&StoreKey::AdminConfig, &rotated).await?;

		advance(stage, RotationStage::Persisted);

		obs::info_event!("Stored rotated admin token; revoking token {}", claims.token_id);

		let revoke_with = Credentials::new(admin.url.clone(), response.access_token.clone());
		let stale_revoke_error = match self.revoke(&revoke_with, &claims.token_id).await {
			Ok(()) => {
				advance(stage, RotationStage::OldRevoked);

				None
			},
			Err(e) => {
				obs::warn_event!(
					"Rotated admin token is live but token {} could not be revoked: {e}",
					claims.token_id
				);

				Some(e)
			},
		};

		self.spawn_usage_report(&rotated.credentials(), "rotate_admin");

		Ok(RotationOutcome {
			stage: *stage,
			token_id: response.token_id().map(str::to_owned),
			previous_token_id: claims.token_id,
			stale_revoke_error,
		})
	}
}

fn advance(stage: &mut RotationStage, next: RotationStage) {
	obs::debug_event!("Admin rotation {stage} -> {next}");

	*stage = next;
}
