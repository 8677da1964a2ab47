//! Artifactory REST plumbing shared by every engine operation.
//!
//! [`UpstreamClient`] builds authenticated requests (bearer token, product `User-Agent`),
//! dispatches them through a [`TokenHttpClient`] handle, and hands back the raw status + body.
//! Non-success answers are classified by [`UpstreamResponse::into_error`], which is where the
//! distinguished [`Error::TokenExpired`] kind is recognized.

// crates.io
use oauth2::{
	AsyncHttpClient, HttpClientError,
	http::{
		Method, Request,
		header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT},
	},
};
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	config::Credentials,
	error::{ConfigError, TransportError},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
	obs::Operation,
};

/// Legacy version probe.
pub const VERSION_PATH: &str = "/artifactory/api/system/version";
/// Token self-introspection.
pub const TOKEN_ME_PATH: &str = "/access/api/v1/tokens/me";
/// Root certificate download.
pub const ROOT_CERT_PATH: &str = "/access/api/v1/cert/root";
/// Legacy token creation.
pub const LEGACY_TOKEN_PATH: &str = "/artifactory/api/security/token";
/// Legacy token revocation.
pub const LEGACY_REVOKE_PATH: &str = "/artifactory/api/security/token/revoke";
/// Access token API.
pub const TOKENS_PATH: &str = "/access/api/v1/tokens";
/// Usage telemetry.
pub const USAGE_PATH: &str = "/artifactory/api/system/usage";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const JSON_CONTENT_TYPE: &str = "application/json";
const EXPIRED_MESSAGES: [&str; 2] = ["Invalid token, expired", "Token failed verification: expired"];

/// Maps HTTP transport failures into engine [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into an engine error.
	fn map_transport_error(
		&self,
		operation: Operation,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		operation: Operation,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) => map_reqwest_error(operation, *inner),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => TransportError::Io(inner).into(),
			HttpClientError::Other(message) => map_generic_transport_error(meta, message),
			_ => map_generic_transport_error(meta, "unknown failure"),
		}
	}
}

/// Raw upstream answer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpstreamResponse {
	/// HTTP status code.
	pub status: u16,
	/// Response body.
	pub body: Vec<u8>,
}
impl UpstreamResponse {
	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Body as lossy UTF-8.
	pub fn text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}

	/// Decodes the body as JSON, keeping the failing path on error.
	pub fn json<T>(&self) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let mut deserializer = serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|source| Error::MalformedResponse { source, status: Some(self.status) })
	}

	/// Passes 2xx answers through and classifies everything else.
	pub fn ensure_success(self) -> Result<Self> {
		if self.is_success() { Ok(self) } else { Err(self.into_error()) }
	}

	/// Classifies a non-success answer.
	///
	/// A 401 whose message reports an expired credential becomes [`Error::TokenExpired`];
	/// everything else is [`Error::UpstreamRejected`] carrying the joined upstream messages
	/// (or the raw body when it is not an Artifactory error document).
	pub fn into_error(self) -> Error {
		let message = match serde_json::from_slice::<ArtifactoryErrorBody>(&self.body) {
			Ok(body) if !body.errors.is_empty() => body.joined_messages(),
			_ => self.text().trim().to_owned(),
		};

		if self.status == 401 && is_expired_message(&message) {
			return Error::TokenExpired;
		}

		Error::UpstreamRejected { status: self.status, message }
	}
}

/// Error document returned by Artifactory and Access.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ArtifactoryErrorBody {
	/// Individual errors.
	#[serde(default)]
	pub errors: Vec<ArtifactoryErrorEntry>,
}
impl ArtifactoryErrorBody {
	/// Messages joined with `, `.
	pub fn joined_messages(&self) -> String {
		self.errors
			.iter()
			.map(|entry| entry.message.as_str())
			.filter(|message| !message.is_empty())
			.collect::<Vec<_>>()
			.join(", ")
	}
}

/// One entry of [`ArtifactoryErrorBody`].
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ArtifactoryErrorEntry {
	/// Error code; Access sends a string, Artifactory a number.
	#[serde(default)]
	pub code: serde_json::Value,
	/// Message.
	#[serde(default)]
	pub message: String,
	/// Optional detail.
	#[serde(default)]
	pub detail: String,
}

/// Returns `true` when `message` reports an expired bearer credential.
pub fn is_expired_message(message: &str) -> bool {
	EXPIRED_MESSAGES.iter().any(|pattern| message.contains(pattern))
}

/// Authenticated request builder bound to one transport + mapper pair.
pub(crate) struct UpstreamClient<'a, C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	http_client: &'a C,
	mapper: &'a M,
	product_id: &'a str,
}
impl<'a, C, M> UpstreamClient<'a, C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	pub(crate) fn new(http_client: &'a C, mapper: &'a M, product_id: &'a str) -> Self {
		Self { http_client, mapper, product_id }
	}

	pub(crate) async fn get(
		&self,
		operation: Operation,
		credentials: &Credentials,
		path: &str,
	) -> Result<UpstreamResponse> {
		self.send(operation, credentials, Method::GET, path, None, Vec::new()).await
	}

	pub(crate) async fn delete(
		&self,
		operation: Operation,
		credentials: &Credentials,
		path: &str,
	) -> Result<UpstreamResponse> {
		self.send(operation, credentials, Method::DELETE, path, None, Vec::new()).await
	}

	pub(crate) async fn post_form(
		&self,
		operation: Operation,
		credentials: &Credentials,
		path: &str,
		fields: &[(&str, String)],
	) -> Result<UpstreamResponse> {
		let body = url::form_urlencoded::Serializer::new(String::new())
			.extend_pairs(fields.iter().map(|(key, value)| (*key, value.as_str())))
			.finish();

		self.send(
			operation,
			credentials,
			Method::POST,
			path,
			Some(FORM_CONTENT_TYPE),
			body.into_bytes(),
		)
		.await
	}

	pub(crate) async fn post_json<T>(
		&self,
		operation: Operation,
		credentials: &Credentials,
		path: &str,
		body: &T,
	) -> Result<UpstreamResponse>
	where
		T: ?Sized + Serialize,
	{
		let body = serde_json::to_vec(body).map_err(ConfigError::from)?;

		self.send(operation, credentials, Method::POST, path, Some(JSON_CONTENT_TYPE), body).await
	}

	async fn send(
		&self,
		operation: Operation,
		credentials: &Credentials,
		method: Method,
		path: &str,
		content_type: Option<&str>,
		body: Vec<u8>,
	) -> Result<UpstreamResponse> {
		if credentials.access_token.is_empty() {
			return Err(ConfigError::EmptyAccessToken.into());
		}

		let url = endpoint(&credentials.url, path);
		let mut builder = Request::builder()
			.method(method)
			.uri(url.as_str())
			.header(AUTHORIZATION, format!("Bearer {}", credentials.access_token.expose()))
			.header(USER_AGENT, self.product_id);

		if let Some(content_type) = content_type {
			builder = builder.header(CONTENT_TYPE, content_type);
		}

		let request = builder.body(body).map_err(ConfigError::from)?;
		let slot = ResponseMetadataSlot::default();
		let handle = self.http_client.with_metadata(slot.clone());
		let response = handle.call(request).await.map_err(|err| {
			self.mapper.map_transport_error(operation, slot.take().as_ref(), err)
		})?;

		Ok(UpstreamResponse { status: response.status().as_u16(), body: response.into_body() })
	}
}

/// Replaces the path of `base` with `path`, dropping any query or fragment.
pub fn endpoint(base: &Url, path: &str) -> Url {
	let mut url = base.clone();

	url.set_path(path);
	url.set_query(None);
	url.set_fragment(None);

	url
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(operation: Operation, err: ReqwestError) -> Error {
	if err.is_builder() {
		return ConfigError::from(err).into();
	}

	crate::obs::debug_event!("{operation} transport failure: {err}");

	TransportError::from(err).into()
}

#[cfg(feature = "reqwest")]
fn map_generic_transport_error(meta: Option<&ResponseMetadata>, message: impl Display) -> Error {
	let message = match meta.and_then(|value| value.status) {
		Some(status) => format!("{message} (HTTP {status})"),
		None => message.to_string(),
	};

	TransportError::Other { message }.into()
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn response(status: u16, body: &str) -> UpstreamResponse {
		UpstreamResponse { status, body: body.as_bytes().to_vec() }
	}

	#[test]
	fn expired_token_requires_unauthorized_status_and_message() {
		let body = r#"{"errors":[{"code":"UNAUTHORIZED","message":"Invalid token, expired"}]}"#;

		assert!(response(401, body).into_error().is_token_expired());
		assert!(!response(403, body).into_error().is_token_expired());
		assert!(
			response(401, r#"{"errors":[{"code":401,"message":"Token failed verification: expired"}]}"#)
				.into_error()
				.is_token_expired()
		);
		assert!(!response(401, "Bad credentials").into_error().is_token_expired());
	}

	#[test]
	fn rejection_joins_upstream_messages() {
		let err = response(
			400,
			r#"{"errors":[{"code":"BAD_REQUEST","message":"first"},{"code":"X","message":"second"}]}"#,
		)
		.into_error();

		assert!(matches!(
			err,
			Error::UpstreamRejected { status: 400, ref message } if message == "first, second"
		));

		let raw = response(502, "  upstream down \n").into_error();

		assert!(matches!(
			raw,
			Error::UpstreamRejected { status: 502, ref message } if message == "upstream down"
		));
	}

	#[test]
	fn json_decode_failure_keeps_status_and_path() {
		let err = response(200, r#"{"version":7}"#)
			.json::<BTreeMap<String, String>>()
			.expect_err("Numeric version should fail to decode.");

		match err {
			Error::MalformedResponse { source, status } => {
				assert_eq!(status, Some(200));
				assert_eq!(source.path().to_string(), "version");
			},
			other => panic!("Unexpected error: {other:?}."),
		}
	}

	#[test]
	fn endpoint_replaces_base_path() {
		let base = Url::parse("https://art.example.com/artifactory/?x=1")
			.expect("Base URL fixture should parse.");

		assert_eq!(
			endpoint(&base, TOKENS_PATH).as_str(),
			"https://art.example.com/access/api/v1/tokens"
		);
	}
}
