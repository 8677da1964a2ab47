//! Optional observability helpers for engine operations.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit spans named `artifactory_broker.operation` with the `operation` and
//!   `stage` fields, plus warning/debug events at the decision points (fail-open version probes,
//!   degraded introspection, TTL clamps, refresh attempts, revocation failures).
//! - Enable `metrics` to increment the `artifactory_broker_operation_total` counter for every
//!   attempt/success/failure, labeled by `operation` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Engine operations observed by spans and counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
	/// Version probe against the upstream.
	VersionProbe,
	/// Root certificate fetch.
	RootCertificate,
	/// Token liveness check (`tokens/me`).
	TokenCheck,
	/// Token introspection.
	Introspect,
	/// Token issuance.
	Issue,
	/// Refresh-token exchange.
	Refresh,
	/// Token revocation.
	Revoke,
	/// Lease renewal.
	Renew,
	/// Admin credential rotation.
	Rotate,
	/// Role-based lease issuance.
	RoleToken,
	/// User token lease issuance.
	UserToken,
	/// Usage report.
	Usage,
	/// Configuration or role write.
	Configure,
}
impl Operation {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Operation::VersionProbe => "version_probe",
			Operation::RootCertificate => "root_certificate",
			Operation::TokenCheck => "token_check",
			Operation::Introspect => "introspect",
			Operation::Issue => "issue",
			Operation::Refresh => "refresh",
			Operation::Revoke => "revoke",
			Operation::Renew => "renew",
			Operation::Rotate => "rotate",
			Operation::RoleToken => "role_token",
			Operation::UserToken => "user_token",
			Operation::Usage => "usage",
			Operation::Configure => "configure",
		}
	}
}
impl Display for Operation {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationOutcome {
	/// Entry to an engine operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl OperationOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OperationOutcome::Attempt => "attempt",
			OperationOutcome::Success => "success",
			OperationOutcome::Failure => "failure",
		}
	}
}
impl Display for OperationOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Runs `fut` inside an operation span and records attempt/success/failure counters.
pub(crate) async fn observe<T, Fut>(operation: Operation, stage: &'static str, fut: Fut) -> Result<T>
where
	Fut: Future<Output = Result<T>>,
{
	let span = OperationSpan::new(operation, stage);

	record_operation_outcome(operation, OperationOutcome::Attempt);

	let result = span.instrument(fut).await;

	match &result {
		Ok(_) => record_operation_outcome(operation, OperationOutcome::Success),
		Err(_) => record_operation_outcome(operation, OperationOutcome::Failure),
	}

	result
}

macro_rules! warn_event {
	($($arg:tt)+) => {{
		#[cfg(feature = "tracing")]
		::tracing::warn!($($arg)+);
		#[cfg(not(feature = "tracing"))]
		let _ = format_args!($($arg)+);
	}};
}
macro_rules! info_event {
	($($arg:tt)+) => {{
		#[cfg(feature = "tracing")]
		::tracing::info!($($arg)+);
		#[cfg(not(feature = "tracing"))]
		let _ = format_args!($($arg)+);
	}};
}
macro_rules! debug_event {
	($($arg:tt)+) => {{
		#[cfg(feature = "tracing")]
		::tracing::debug!($($arg)+);
		#[cfg(not(feature = "tracing"))]
		let _ = format_args!($($arg)+);
	}};
}
pub(crate) use {debug_event, info_event, warn_event};
