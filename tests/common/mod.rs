#![allow(dead_code)]

// std
use std::sync::Arc;
// crates.io
use httpmock::prelude::*;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
// self
use artifactory_broker::{
	config::AdminConfiguration,
	flows::{Broker, ReqwestBroker},
	http::ReqwestHttpClient,
	reqwest::{Client as ReqwestClient, redirect::Policy},
	settings::EngineSettings,
	store::{ConfigStore, MemoryStore, StoreKey},
	upstream::{ReqwestTransportErrorMapper, VERSION_PATH},
	url::Url,
};

pub const SIGNING_KEY: &[u8] = include_bytes!("../fixtures/signing_key.pem");
pub const FOREIGN_KEY: &[u8] = include_bytes!("../fixtures/foreign_key.pem");
pub const ROOT_CERT: &str = include_str!("../fixtures/root_cert.b64");

pub const ADMIN_TOKEN_ID: &str = "admin-token-id";

/// Builds a reqwest transport that trusts the self-signed certificates served by `httpmock`.
///
/// Redirects stay disabled as in the production client.
pub fn test_reqwest_http_client() -> ReqwestHttpClient {
	let client = ReqwestClient::builder()
		.redirect(Policy::none())
		.danger_accept_invalid_certs(true)
		.danger_accept_invalid_hostnames(true)
		.build()
		.expect("Failed to build insecure Reqwest client for tests.");

	ReqwestHttpClient::with_client(client)
}

/// Builds a broker over an in-memory store with usage reporting disabled.
pub fn build_broker() -> (ReqwestBroker, Arc<dyn ConfigStore>) {
	let store: Arc<dyn ConfigStore> = Arc::new(MemoryStore::default());
	let settings = EngineSettings::builder()
		.usage_reporting(false)
		.build()
		.expect("Test settings should build successfully.");
	let broker: ReqwestBroker = Broker::with_http_client(
		store.clone(),
		settings,
		test_reqwest_http_client(),
		ReqwestTransportErrorMapper,
	);

	(broker, store)
}

pub fn base_url(server: &MockServer) -> Url {
	Url::parse(&server.base_url()).expect("Mock server URL should parse successfully.")
}

/// Signs an RS256 token carrying the claims Artifactory puts into access tokens.
pub fn sign_token(key: &[u8], token_id: &str, username: &str, scope: &str) -> String {
	let claims = serde_json::json!({
		"jti": token_id,
		"sub": format!("jfac@01h0000000/users/{username}"),
		"scp": scope,
		"exp": 4_102_444_800_i64,
	});
	let key = EncodingKey::from_rsa_pem(key).expect("Fixture signing key should parse.");

	jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)
		.expect("Fixture token should sign successfully.")
}

pub fn admin_token() -> String {
	sign_token(SIGNING_KEY, ADMIN_TOKEN_ID, "admin", "applied-permissions/admin")
}

/// Stores an admin record pointing at `server` and returns it.
pub async fn seed_admin(
	store: &Arc<dyn ConfigStore>,
	server: &MockServer,
	customize: impl FnOnce(&mut AdminConfiguration),
) -> AdminConfiguration {
	let mut admin = AdminConfiguration::new(base_url(server), admin_token());

	customize(&mut admin);

	store
		.put_json(&StoreKey::AdminConfig, &admin)
		.await
		.expect("Admin record should be stored successfully.");

	admin
}

pub async fn stored_admin(store: &Arc<dyn ConfigStore>) -> AdminConfiguration {
	store
		.get_json(&StoreKey::AdminConfig)
		.await
		.expect("Admin record lookup should succeed.")
		.expect("Admin record should be present.")
}

pub async fn mock_version<'a>(server: &'a MockServer, version: &str) -> httpmock::Mock<'a> {
	let body = serde_json::json!({ "version": version, "revision": "70000000" });

	server
		.mock_async(move |when, then| {
			when.method(GET).path(VERSION_PATH);
			then.status(200).json_body(body);
		})
		.await
}
