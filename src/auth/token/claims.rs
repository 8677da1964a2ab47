//! Claims decoded from Artifactory access tokens.
//!
//! Artifactory tokens are RS256 JWTs. The engine reads four claims: `jti` (token id), `sub`
//! (`<issuer>/users/<username>`), `scp` (scope), and the optional `exp`. Depending on the
//! producer, `exp` arrives as an integer, a float, or a quoted number; [`NumericClaim`] folds all
//! three into whole seconds.

// crates.io
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
// self
use crate::{_prelude::*, auth::token::root_cert::RootCertificate};

/// Structured view of an access token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
	/// Upstream token id (`jti`).
	pub token_id: String,
	/// Username derived from `sub`; empty when the subject carries none.
	pub username: String,
	/// Granted scope (`scp`).
	pub scope: String,
	/// Expiry as a Unix timestamp; absent on non-expiring tokens.
	pub expires_at: Option<i64>,
}
impl TokenClaims {
	/// Decodes `token` without checking its signature.
	///
	/// The header must still declare RS256.
	pub fn decode_unverified(token: &str) -> Result<Self> {
		ensure_rs256(token)?;

		let mut validation = base_validation();

		validation.insecure_disable_signature_validation();

		let data =
			jsonwebtoken::decode::<RawClaims>(token, &DecodingKey::from_secret(&[]), &validation)
				.map_err(invalid_token)?;

		data.claims.try_into()
	}

	/// Decodes `token` after verifying its RS256 signature against `root`.
	pub fn decode_verified(token: &str, root: &RootCertificate) -> Result<Self> {
		ensure_rs256(token)?;

		let key = DecodingKey::from_rsa_der(root.public_key_der());
		let data = jsonwebtoken::decode::<RawClaims>(token, &key, &base_validation())
			.map_err(invalid_token)?;

		data.claims.try_into()
	}

	/// Expiry as an [`OffsetDateTime`], when present and representable.
	pub fn expires_at_datetime(&self) -> Option<OffsetDateTime> {
		self.expires_at.and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
	}
}

/// JSON number-shaped claim that may be encoded as an integer, float, or string.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum NumericClaim {
	/// Plain JSON integer.
	Integer(i64),
	/// JSON float such as `1700000000.0`.
	Float(f64),
	/// Quoted decimal such as `"1700000000"`.
	Text(String),
}
impl NumericClaim {
	/// Coerces the claim into whole seconds, truncating any fraction.
	pub fn to_unix_seconds(&self) -> Option<i64> {
		match self {
			NumericClaim::Integer(value) => Some(*value),
			NumericClaim::Float(value) => float_seconds(*value),
			NumericClaim::Text(value) => {
				let value = value.trim();

				value
					.parse::<i64>()
					.ok()
					.or_else(|| value.parse::<f64>().ok().and_then(float_seconds))
			},
		}
	}
}

/// Extracts the username from a `sub` claim.
///
/// Everything after the second `/` is the username, so `jfac@xyz/users/admin/extra` yields
/// `admin/extra`.
pub fn username_from_subject(subject: &str) -> String {
	subject.splitn(3, '/').nth(2).unwrap_or_default().to_owned()
}

#[derive(Deserialize)]
struct RawClaims {
	jti: Option<String>,
	sub: Option<String>,
	scp: Option<String>,
	exp: Option<NumericClaim>,
}
impl TryFrom<RawClaims> for TokenClaims {
	type Error = Error;

	fn try_from(raw: RawClaims) -> Result<Self> {
		let token_id =
			raw.jti.ok_or_else(|| Error::InvalidToken { reason: "missing jti claim".into() })?;
		let subject =
			raw.sub.ok_or_else(|| Error::InvalidToken { reason: "missing sub claim".into() })?;
		let expires_at = match raw.exp {
			Some(exp) => Some(exp.to_unix_seconds().ok_or_else(|| Error::InvalidToken {
				reason: format!("exp claim {exp:?} is not a timestamp"),
			})?),
			None => None,
		};

		Ok(Self {
			token_id,
			username: username_from_subject(&subject),
			scope: raw.scp.unwrap_or_default(),
			expires_at,
		})
	}
}

fn ensure_rs256(token: &str) -> Result<()> {
	let header = jsonwebtoken::decode_header(token).map_err(invalid_token)?;

	if header.alg == Algorithm::RS256 {
		Ok(())
	} else {
		Err(Error::InvalidToken {
			reason: format!("unsupported signing algorithm {:?}", header.alg),
		})
	}
}

fn base_validation() -> Validation {
	let mut validation = Validation::new(Algorithm::RS256);

	// Expiry is judged by the upstream, not the local clock.
	validation.validate_exp = false;
	validation.validate_aud = false;
	validation.required_spec_claims.clear();

	validation
}

fn invalid_token(err: jsonwebtoken::errors::Error) -> Error {
	Error::InvalidToken { reason: err.to_string() }
}

fn float_seconds(value: f64) -> Option<i64> {
	// i64::MAX is not exactly representable; stay within the f64-safe integer range.
	const LIMIT: f64 = 9_007_199_254_740_992.0;

	(value.is_finite() && value.abs() < LIMIT).then(|| value.trunc() as i64)
}

#[cfg(test)]
mod tests {
	// crates.io
	use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
	// self
	use super::*;

	fn unsigned_token(alg: &str, payload: &str) -> String {
		let header = URL_SAFE_NO_PAD.encode(format!("{{\"alg\":\"{alg}\",\"typ\":\"JWT\"}}"));
		let payload = URL_SAFE_NO_PAD.encode(payload);

		format!("{header}.{payload}.c2lnbmF0dXJl")
	}

	#[test]
	fn username_keeps_segments_after_the_second_slash() {
		assert_eq!(username_from_subject("jfac@xyz/users/admin/extra"), "admin/extra");
		assert_eq!(username_from_subject("jfac@xyz/users/admin"), "admin");
		assert_eq!(username_from_subject("jfac@xyz/users"), "");
		assert_eq!(username_from_subject(""), "");
	}

	#[test]
	fn numeric_claims_coerce_to_whole_seconds() {
		let parse = |raw: &str| -> Option<i64> {
			serde_json::from_str::<NumericClaim>(raw)
				.expect("Numeric claim fixture should deserialize.")
				.to_unix_seconds()
		};

		assert_eq!(parse("1700000000"), Some(1_700_000_000));
		assert_eq!(parse("1700000000.0"), Some(1_700_000_000));
		assert_eq!(parse("1.7e9"), Some(1_700_000_000));
		assert_eq!(parse("\"1700000000\""), Some(1_700_000_000));
		assert_eq!(parse("\"1700000000.75\""), Some(1_700_000_000));
		assert_eq!(parse("\"soon\""), None);
	}

	#[test]
	fn unverified_decode_extracts_claims() {
		let token = unsigned_token(
			"RS256",
			r#"{"jti":"tok-1","sub":"jfac@xyz/users/admin/extra","scp":"applied-permissions/admin","exp":1700000000.0}"#,
		);
		let claims = TokenClaims::decode_unverified(&token).expect("Token should decode.");

		assert_eq!(claims.token_id, "tok-1");
		assert_eq!(claims.username, "admin/extra");
		assert_eq!(claims.scope, "applied-permissions/admin");
		assert_eq!(claims.expires_at, Some(1_700_000_000));
		assert_eq!(
			claims.expires_at_datetime().map(OffsetDateTime::unix_timestamp),
			Some(1_700_000_000)
		);
	}

	#[test]
	fn non_expiring_tokens_have_no_expiry() {
		let token = unsigned_token("RS256", r#"{"jti":"tok-2","sub":"jfac@xyz/users/ci"}"#);
		let claims = TokenClaims::decode_unverified(&token).expect("Token should decode.");

		assert_eq!(claims.expires_at, None);
		assert_eq!(claims.scope, "");
	}

	#[test]
	fn other_algorithms_are_rejected() {
		let token = unsigned_token("HS256", r#"{"jti":"tok-3","sub":"jfac@xyz/users/ci"}"#);
		let err = TokenClaims::decode_unverified(&token).expect_err("HS256 must be rejected.");

		assert!(matches!(err, Error::InvalidToken { ref reason } if reason.contains("HS256")));
	}

	#[test]
	fn missing_token_id_is_rejected() {
		let token = unsigned_token("RS256", r#"{"sub":"jfac@xyz/users/ci"}"#);

		assert!(matches!(
			TokenClaims::decode_unverified(&token),
			Err(Error::InvalidToken { .. })
		));
		assert!(TokenClaims::decode_unverified("not-a-jwt").is_err());
	}
}
