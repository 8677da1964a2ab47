//! Fire-and-forget usage telemetry.

// self
use crate::{
	_prelude::*,
	config::Credentials,
	flows::Broker,
	http::TokenHttpClient,
	obs::{self, Operation},
	upstream::{TransportErrorMapper, USAGE_PATH, UpstreamClient},
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UsageReport<'a> {
	product_id: &'a str,
	features: [UsageFeature<'a>; 1],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UsageFeature<'a> {
	feature_id: &'a str,
}

impl<C, M> Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Reports one use of `feature_id` to the upstream and waits for the answer.
	pub async fn send_usage(&self, credentials: &Credentials, feature_id: &str) -> Result<()> {
		send_usage(&self.upstream(), &self.settings.product_id, credentials, feature_id).await
	}

	/// Dispatches a usage report on a detached task.
	///
	/// Does nothing when reporting is disabled, the credential is empty, or no tokio runtime is
	/// running. Failures are logged and never reach the caller.
	pub(crate) fn spawn_usage_report(&self, credentials: &Credentials, feature_id: &'static str) {
		if !self.settings.usage_reporting || credentials.access_token.is_empty() {
			return;
		}

		let Ok(runtime) = tokio::runtime::Handle::try_current() else {
			obs::debug_event!("No async runtime available; skipping usage report");

			return;
		};
		let http_client = Arc::clone(&self.http_client);
		let mapper = Arc::clone(&self.transport_mapper);
		let settings = Arc::clone(&self.settings);
		let credentials = credentials.clone();
		let task: Pin<Box<dyn Future<Output = ()> + Send>> = Box::pin(async move {
			let upstream =
				UpstreamClient::new(http_client.as_ref(), mapper.as_ref(), &settings.product_id);

			if let Err(e) =
				send_usage(&upstream, &settings.product_id, &credentials, feature_id).await
			{
				obs::warn_event!("Failed to send usage report for {feature_id}: {e}");
			}
		});

		runtime.spawn(task);
	}
}

async fn send_usage<C, M>(
	upstream: &UpstreamClient<'_, C, M>,
	product_id: &str,
	credentials: &Credentials,
	feature_id: &str,
) -> Result<()>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	let report = UsageReport { product_id, features: [UsageFeature { feature_id }] };

	upstream
		.post_json(Operation::Usage, credentials, USAGE_PATH, &report)
		.await?
		.ensure_success()
		.map(|_| ())
}
