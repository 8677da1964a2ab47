//! Access root certificate used to verify token signatures.

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD};
use x509_parser::{parse_x509_certificate, public_key::PublicKey};
// self
use crate::_prelude::*;

/// RSA public key taken from the upstream's access root certificate.
///
/// Only the key material is kept; the certificate itself is never persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct RootCertificate {
	subject: String,
	public_key_der: Vec<u8>,
}
impl RootCertificate {
	/// Parses the base64-encoded DER body returned by `/access/api/v1/cert/root`.
	pub fn from_base64_der(body: &str) -> Result<Self> {
		let compact: String = body.chars().filter(|c| !c.is_whitespace()).collect();
		let der = STANDARD
			.decode(compact.as_bytes())
			.map_err(|e| Error::InvalidCertificate { reason: format!("invalid base64: {e}") })?;

		Self::from_der(&der)
	}

	/// Parses a DER-encoded X.509 certificate carrying an RSA key.
	pub fn from_der(der: &[u8]) -> Result<Self> {
		let (_, cert) = parse_x509_certificate(der)
			.map_err(|e| Error::InvalidCertificate { reason: e.to_string() })?;
		let spki = cert.public_key();

		match spki.parsed() {
			Ok(PublicKey::RSA(_)) => Ok(Self {
				subject: cert.subject().to_string(),
				public_key_der: spki.subject_public_key.data.to_vec(),
			}),
			Ok(_) => Err(Error::InvalidCertificate {
				reason: "certificate does not carry an RSA public key".into(),
			}),
			Err(e) => Err(Error::InvalidCertificate { reason: e.to_string() }),
		}
	}

	/// Certificate subject, for diagnostics.
	pub fn subject(&self) -> &str {
		&self.subject
	}

	/// PKCS#1 `RSAPublicKey` DER bytes.
	pub fn public_key_der(&self) -> &[u8] {
		&self.public_key_der
	}
}
impl Debug for RootCertificate {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RootCertificate").field("subject", &self.subject).finish_non_exhaustive()
	}
}
