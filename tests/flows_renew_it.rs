#![cfg(feature = "reqwest")]

mod common;

// crates.io
use httpmock::prelude::*;
use time::{Duration, OffsetDateTime};
// self
use artifactory_broker::{
	auth::TokenSecret,
	error::Error,
	flows::LeaseInternal,
	upstream::{LEGACY_TOKEN_PATH, TOKENS_PATH},
};
use common::*;

fn renewable_lease(expires_in: i64) -> LeaseInternal {
	LeaseInternal {
		access_token: TokenSecret::new("lease-at"),
		refresh_token: Some(TokenSecret::new("lease-rt")),
		token_id: Some("lease-1".into()),
		username: "ci".into(),
		ttl: Duration::HOUR,
		expires_at: Some(OffsetDateTime::now_utc().unix_timestamp() + expires_in),
	}
}

#[tokio::test]
async fn renewal_refreshes_with_admin_credential_and_caps_ttl() {
	let server = MockServer::start_async().await;
	let (broker, store) = build_broker();

	seed_admin(&store, &server, |_| ()).await;

	let _version = mock_version(&server, "7.55.0").await;
	let bearer = format!("Bearer {}", admin_token());
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST)
				.path(TOKENS_PATH)
				.header("authorization", bearer)
				.body_includes("\"grant_type\":\"refresh_token\"")
				.body_includes("\"refresh_token\":\"lease-rt\"");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"lease-at-2\",\"refresh_token\":\"lease-rt-2\",\"token_id\":\"lease-2\",\"expires_in\":600}",
			);
		})
		.await;
	let renewal = broker
		.renew_lease(&renewable_lease(600), Duration::HOUR)
		.await
		.expect("Renewable lease should renew.");

	refresh.assert_async().await;

	assert!(renewal.ttl <= Duration::seconds(600));
	assert!(renewal.ttl >= Duration::seconds(590));
	assert_eq!(renewal.internal.access_token.expose(), "lease-at-2");
	assert_eq!(renewal.internal.refresh_token.as_ref().map(TokenSecret::expose), Some("lease-rt-2"));
	assert_eq!(renewal.internal.token_id.as_deref(), Some("lease-2"));
	assert_eq!(renewal.internal.username, "ci");
	assert_eq!(renewal.internal.ttl, Duration::HOUR);
	assert!(renewal.internal.expires_at.is_some());
}

#[tokio::test]
async fn legacy_renewal_sends_the_leased_access_token() {
	let server = MockServer::start_async().await;
	let (broker, store) = build_broker();

	seed_admin(&store, &server, |_| ()).await;

	let _version = mock_version(&server, "7.18.1").await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST)
				.path(LEGACY_TOKEN_PATH)
				.form_urlencoded_tuple("grant_type", "refresh_token")
				.form_urlencoded_tuple("refresh_token", "lease-rt")
				.form_urlencoded_tuple("access_token", "lease-at");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"lease-at-2\",\"expires_in\":0}");
		})
		.await;
	let renewal = broker
		.renew_lease(&renewable_lease(7_200), Duration::ZERO)
		.await
		.expect("Legacy renewal should succeed.");

	refresh.assert_async().await;

	assert_eq!(renewal.ttl, Duration::HOUR);
	assert_eq!(renewal.internal.access_token.expose(), "lease-at-2");
	assert_eq!(renewal.internal.refresh_token.as_ref().map(TokenSecret::expose), Some("lease-rt"));
	assert_eq!(renewal.internal.token_id.as_deref(), Some("lease-1"));
}

#[tokio::test]
async fn lease_without_refresh_token_is_not_renewable() {
	let server = MockServer::start_async().await;
	let (broker, store) = build_broker();

	seed_admin(&store, &server, |_| ()).await;

	let version = mock_version(&server, "7.55.0").await;
	let upstream = server
		.mock_async(|when, then| {
			when.method(POST);
			then.status(200);
		})
		.await;
	let internal = LeaseInternal { refresh_token: None, ..renewable_lease(600) };
	let err = broker
		.renew_lease(&internal, Duration::HOUR)
		.await
		.expect_err("A lease without a refresh token must not renew.");

	assert!(matches!(err, Error::LeaseNotRenewable));

	version.assert_calls_async(0).await;
	upstream.assert_calls_async(0).await;
}

#[tokio::test]
async fn renewal_requires_admin_configuration() {
	let (broker, _store) = build_broker();
	let err = broker
		.renew_lease(&renewable_lease(600), Duration::HOUR)
		.await
		.expect_err("Renewal without an admin record must fail.");

	assert!(matches!(err, Error::ConfigurationMissing));
}
