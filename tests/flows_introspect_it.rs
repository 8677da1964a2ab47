#![cfg(feature = "reqwest")]

mod common;

// crates.io
use httpmock::prelude::*;
// self
use artifactory_broker::{
	auth::TokenSecret,
	error::Error,
	upstream::{ROOT_CERT_PATH, TOKEN_ME_PATH},
};
use common::*;

async fn mock_root_cert(server: &MockServer) -> httpmock::Mock<'_> {
	server
		.mock_async(|when, then| {
			when.method(GET).path(ROOT_CERT_PATH);
			then.status(200).header("content-type", "text/plain").body(ROOT_CERT);
		})
		.await
}

#[tokio::test]
async fn introspection_verifies_signature_against_root_certificate() {
	let server = MockServer::start_async().await;
	let (broker, store) = build_broker();

	seed_admin(&store, &server, |_| ()).await;

	let _version = mock_version(&server, "7.55.0").await;
	let cert = mock_root_cert(&server).await;
	let token = TokenSecret::new(sign_token(SIGNING_KEY, "tok-7", "alice", "applied-permissions/user"));
	let claims = broker.introspect(&token, true).await.expect("Signed token should verify.");

	assert_eq!(claims.token_id, "tok-7");
	assert_eq!(claims.username, "alice");
	assert_eq!(claims.scope, "applied-permissions/user");

	cert.assert_async().await;
}

#[tokio::test]
async fn introspection_rejects_tokens_signed_by_another_key() {
	let server = MockServer::start_async().await;
	let (broker, store) = build_broker();

	seed_admin(&store, &server, |_| ()).await;

	let _version = mock_version(&server, "7.55.0").await;
	let _cert = mock_root_cert(&server).await;
	let token = TokenSecret::new(sign_token(FOREIGN_KEY, "tok-8", "mallory", "applied-permissions/admin"));
	let err = broker.introspect(&token, true).await.expect_err("Foreign signature must be rejected.");

	assert!(matches!(err, Error::InvalidToken { .. }));
}

#[tokio::test]
async fn introspection_degrades_when_upstream_predates_root_certificate() {
	let server = MockServer::start_async().await;
	let (broker, store) = build_broker();

	seed_admin(&store, &server, |_| ()).await;

	let _version = mock_version(&server, "7.10.2").await;
	let cert = mock_root_cert(&server).await;
	let token = TokenSecret::new(sign_token(FOREIGN_KEY, "tok-9", "bob", "applied-permissions/user"));
	let claims =
		broker.introspect(&token, true).await.expect("Old upstreams fall back to unverified decoding.");

	assert_eq!(claims.token_id, "tok-9");
	assert_eq!(claims.username, "bob");

	cert.assert_calls_async(0).await;
}

#[tokio::test]
async fn introspection_fails_closed_when_certificate_fetch_fails() {
	let server = MockServer::start_async().await;
	let (broker, store) = build_broker();

	seed_admin(&store, &server, |_| ()).await;

	let _version = mock_version(&server, "7.55.0").await;
	let _cert = server
		.mock_async(|when, then| {
			when.method(GET).path(ROOT_CERT_PATH);
			then.status(500).body("boom");
		})
		.await;
	let token = TokenSecret::new(admin_token());
	let err = broker
		.introspect(&token, true)
		.await
		.expect_err("Certificate failures must not fall back to unverified decoding.");

	assert!(matches!(err, Error::UpstreamRejected { status: 500, .. }));
}

#[tokio::test]
async fn unverified_introspection_needs_no_configuration() {
	let (broker, _store) = build_broker();
	let token = TokenSecret::new(sign_token(FOREIGN_KEY, "tok-10", "carol", "applied-permissions/user"));
	let claims = broker.introspect(&token, false).await.expect("Unverified decoding should succeed.");

	assert_eq!(claims.token_id, "tok-10");
	assert_eq!(claims.username, "carol");
}

#[tokio::test]
async fn token_check_classifies_expired_credentials() {
	let server = MockServer::start_async().await;
	let (broker, store) = build_broker();
	let admin = seed_admin(&store, &server, |_| ()).await;
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path(TOKEN_ME_PATH).header_exists("authorization");
			then.status(401).header("content-type", "application/json").body(
				"{\"errors\":[{\"code\":\"UNAUTHORIZED\",\"message\":\"Invalid token, expired\"}]}",
			);
		})
		.await;
	let err = broker
		.check_token(&admin.credentials())
		.await
		.expect_err("Expired credential should be reported.");

	assert!(err.is_token_expired());

	mock.assert_async().await;
}

#[tokio::test]
async fn token_check_accepts_live_credentials() {
	let server = MockServer::start_async().await;
	let (broker, store) = build_broker();
	let admin = seed_admin(&store, &server, |_| ()).await;
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path(TOKEN_ME_PATH);
			then.status(200).header("content-type", "application/json").body("{}");
		})
		.await;

	broker.check_token(&admin.credentials()).await.expect("Live credential should be accepted.");

	mock.assert_async().await;
}
