// std
use std::{
	future::Future,
	pin::Pin,
	sync::{Arc, Mutex},
};
// crates.io
use oauth2::{
	AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse,
	http::{
		HeaderName, StatusCode,
		header::{AUTHORIZATION, USER_AGENT},
	},
};
// self
use artifactory_broker::{
	auth::{IssuanceRequest, Username},
	config::{AdminConfiguration, UserTokenConfiguration},
	error::{Error, TransportError},
	flows::{Broker, UserTokenRequest},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
	obs::Operation,
	settings::{DEFAULT_PRODUCT_ID, EngineSettings},
	store::{ConfigStore, MemoryStore, StoreKey},
	upstream::{LEGACY_TOKEN_PATH, TOKENS_PATH, TransportErrorMapper, VERSION_PATH},
	url::Url,
};

const EXPIRED_BODY: &str =
	"{\"errors\":[{\"code\":\"UNAUTHORIZED\",\"message\":\"Invalid token, expired\"}]}";

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct ScriptedError(String);

#[derive(Clone, Debug)]
struct Recorded {
	path: String,
	authorization: String,
	user_agent: String,
	body: String,
}

type Responder = dyn Fn(&Recorded) -> Result<(u16, String), String> + Send + Sync;

/// Transport that answers from a closure and records every request.
#[derive(Clone)]
struct ScriptedClient {
	requests: Arc<Mutex<Vec<Recorded>>>,
	responder: Arc<Responder>,
}
impl ScriptedClient {
	fn new(
		responder: impl Fn(&Recorded) -> Result<(u16, String), String> + 'static + Send + Sync,
	) -> Self {
		Self { requests: Default::default(), responder: Arc::new(responder) }
	}

	fn requests(&self) -> Vec<Recorded> {
		self.requests.lock().expect("Request log lock should not be poisoned.").clone()
	}
}
impl TokenHttpClient for ScriptedClient {
	type Handle = ScriptedHandle;
	type TransportError = ScriptedError;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		ScriptedHandle { client: self.clone(), slot }
	}
}

struct ScriptedHandle {
	client: ScriptedClient,
	slot: ResponseMetadataSlot,
}
impl<'c> AsyncHttpClient<'c> for ScriptedHandle {
	type Error = HttpClientError<ScriptedError>;
	type Future = Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		Box::pin(async move {
			self.slot.take();

			let header = |name: HeaderName| {
				request
					.headers()
					.get(name)
					.and_then(|value| value.to_str().ok())
					.unwrap_or_default()
					.to_owned()
			};
			let recorded = Recorded {
				path: request.uri().path().to_owned(),
				authorization: header(AUTHORIZATION),
				user_agent: header(USER_AGENT),
				body: String::from_utf8_lossy(request.body()).into_owned(),
			};

			self.client
				.requests
				.lock()
				.expect("Request log lock should not be poisoned.")
				.push(recorded.clone());

			let (status, body) = (self.client.responder)(&recorded).map_err(HttpClientError::Other)?;

			self.slot.store(ResponseMetadata { status: Some(status) });

			let mut response = HttpResponse::new(body.into_bytes());

			*response.status_mut() =
				StatusCode::from_u16(status).map_err(|e| HttpClientError::Other(e.to_string()))?;

			Ok(response)
		})
	}
}

struct ScriptedMapper;
impl TransportErrorMapper<ScriptedError> for ScriptedMapper {
	fn map_transport_error(
		&self,
		operation: Operation,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<ScriptedError>,
	) -> Error {
		assert!(metadata.is_none(), "Failed calls never record a status.");

		TransportError::Other { message: format!("{operation}: {error}") }.into()
	}
}

type ScriptedBroker = Broker<ScriptedClient, ScriptedMapper>;

fn base_url() -> Url {
	Url::parse("https://art.example.com").expect("Base URL fixture should parse.")
}

async fn build_broker(client: &ScriptedClient) -> (ScriptedBroker, Arc<dyn ConfigStore>) {
	let store: Arc<dyn ConfigStore> = Arc::new(MemoryStore::default());
	let settings = EngineSettings::builder()
		.usage_reporting(false)
		.build()
		.expect("Test settings should build successfully.");

	store
		.put_json(&StoreKey::AdminConfig, &AdminConfiguration::new(base_url(), "admin-bearer"))
		.await
		.expect("Admin record should be stored successfully.");

	(Broker::with_http_client(store.clone(), settings, client.clone(), ScriptedMapper), store)
}

fn version_body(version: &str) -> String {
	format!("{{\"version\":\"{version}\",\"revision\":\"1\"}}")
}

#[tokio::test]
async fn refresh_is_attempted_once_when_the_retry_also_expires() {
	let client = ScriptedClient::new(|request| match request.path.as_str() {
		VERSION_PATH => Ok((200, version_body("7.55.0"))),
		TOKENS_PATH if request.body.contains("\"grant_type\":\"refresh_token\"") => Ok((
			200,
			"{\"access_token\":\"delegated-new\",\"refresh_token\":\"rt-2\"}".to_owned(),
		)),
		TOKENS_PATH => Ok((401, EXPIRED_BODY.to_owned())),
		other => Err(format!("unexpected path {other}")),
	});
	let (broker, store) = build_broker(&client).await;
	let alice = Username::new("alice").expect("Username fixture should be valid.");
	let delegated = UserTokenConfiguration {
		access_token: "delegated-old".into(),
		refresh_token: "rt-1".into(),
		..Default::default()
	};

	store
		.put_json(&StoreKey::UserTokenConfig(None), &delegated)
		.await
		.expect("User token record should be stored successfully.");

	let err = broker
		.issue_user_token(&alice, UserTokenRequest::default())
		.await
		.expect_err("A second expiry must be returned to the caller.");

	assert!(err.is_token_expired());

	let requests = client.requests();
	let issuances: Vec<_> = requests
		.iter()
		.filter(|request| request.body.contains("\"grant_type\":\"client_credentials\""))
		.collect();
	let refreshes = requests
		.iter()
		.filter(|request| request.body.contains("\"grant_type\":\"refresh_token\""))
		.count();

	assert_eq!(issuances.len(), 2);
	assert_eq!(issuances[0].authorization, "Bearer delegated-old");
	assert_eq!(issuances[1].authorization, "Bearer delegated-new");
	assert_eq!(refreshes, 1);
	assert_eq!(broker.refresh_metrics.attempts(), 1);
	assert_eq!(broker.refresh_metrics.successes(), 1);

	// The global record owned the credential, so the refreshed pair lands there.
	let stored: UserTokenConfiguration = store
		.get_json(&StoreKey::UserTokenConfig(None))
		.await
		.expect("User token lookup should succeed.")
		.expect("User token record should be present.");

	assert_eq!(stored.access_token.expose(), "delegated-new");
	assert_eq!(stored.refresh_token.expose(), "rt-2");
}

#[tokio::test]
async fn failed_version_probe_selects_the_new_token_api() {
	let client = ScriptedClient::new(|request| match request.path.as_str() {
		VERSION_PATH => Err("connection reset".to_owned()),
		TOKENS_PATH => Ok((200, "{\"access_token\":\"minted\",\"token_id\":\"tok-1\"}".to_owned())),
		LEGACY_TOKEN_PATH => Ok((200, "{\"access_token\":\"legacy\"}".to_owned())),
		other => Err(format!("unexpected path {other}")),
	});
	let (broker, _store) = build_broker(&client).await;
	let admin = AdminConfiguration::new(base_url(), "admin-bearer");
	let issued = broker
		.issue(&admin.credentials(), &IssuanceRequest::client_credentials("ci", "api:*"))
		.await
		.expect("Issuance should proceed despite the failed probe.");

	assert_eq!(issued.access_token.expose(), "minted");

	let requests = client.requests();

	assert!(requests.iter().all(|request| request.authorization == "Bearer admin-bearer"));
	assert!(requests.iter().all(|request| request.user_agent == DEFAULT_PRODUCT_ID));
	assert!(requests.iter().any(|request| request.path == TOKENS_PATH));
	assert!(requests.iter().all(|request| request.path != LEGACY_TOKEN_PATH));
}

#[tokio::test]
async fn transport_failures_go_through_the_mapper() {
	let client = ScriptedClient::new(|_| Err("connection refused".to_owned()));
	let (broker, _store) = build_broker(&client).await;
	let admin = AdminConfiguration::new(base_url(), "admin-bearer");
	let err = broker
		.check_token(&admin.credentials())
		.await
		.expect_err("A transport failure should be reported.");

	match err {
		Error::Transport(TransportError::Other { message }) => {
			assert!(message.starts_with("token_check"), "Unexpected message: {message}");
			assert!(message.contains("connection refused"));
		},
		other => panic!("Unexpected error: {other:?}"),
	}
}

#[tokio::test]
async fn empty_bearer_is_rejected_before_dispatch() {
	let client = ScriptedClient::new(|_| Ok((200, "{}".to_owned())));
	let (broker, _store) = build_broker(&client).await;
	let admin = AdminConfiguration::new(base_url(), "");

	broker.check_token(&admin.credentials()).await.expect_err("An empty bearer must be refused.");

	assert!(client.requests().is_empty());
}
