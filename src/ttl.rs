//! Layered lease TTL resolution.
//!
//! Every issuance draws its `ttl` and `max_ttl` from four layers: the request itself, the entity
//! (role or user-token configuration), the admin configuration, and the system defaults of the
//! host. [`resolve`] picks the first positive value per field in that order, then clamps the
//! result against every stricter ceiling. Zero means "unset" on every layer; negative inputs are
//! read as zero.

// self
use crate::_prelude::*;

/// Default and maximum TTL offered by one layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TtlLayer {
	/// Default TTL (`ttl` on the request layer).
	pub ttl: Duration,
	/// Maximum TTL.
	pub max_ttl: Duration,
}
impl TtlLayer {
	/// Creates a layer from a default and a maximum.
	pub fn new(ttl: Duration, max_ttl: Duration) -> Self {
		Self { ttl, max_ttl }
	}

	fn normalized(self) -> Self {
		Self { ttl: non_negative(self.ttl), max_ttl: non_negative(self.max_ttl) }
	}
}

/// Candidate TTL sources in priority order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TtlSources {
	/// Per-request override.
	pub request: TtlLayer,
	/// Role or user-token configuration.
	pub entity: TtlLayer,
	/// Admin configuration.
	pub backend: TtlLayer,
	/// Host defaults; `max_ttl` is the hardest ceiling.
	pub system: TtlLayer,
}

/// Reason a resolved value was lowered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TtlWarning {
	/// `max_ttl` exceeded the system ceiling.
	MaxTtlLoweredToSystem,
	/// `max_ttl` exceeded the admin configuration ceiling.
	MaxTtlLoweredToBackend,
	/// `max_ttl` exceeded the entity ceiling.
	MaxTtlLoweredToEntity,
	/// `ttl` exceeded the effective `max_ttl`.
	TtlLoweredToMaxTtl,
}
impl TtlWarning {
	/// Human-readable warning text.
	pub const fn message(self) -> &'static str {
		match self {
			TtlWarning::MaxTtlLoweredToSystem => "max_ttl lowered to system max_ttl",
			TtlWarning::MaxTtlLoweredToBackend => "max_ttl lowered to backend max_ttl",
			TtlWarning::MaxTtlLoweredToEntity => "max_ttl lowered to entity max_ttl",
			TtlWarning::TtlLoweredToMaxTtl => "ttl lowered to max_ttl",
		}
	}
}
impl Display for TtlWarning {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.message())
	}
}

/// Effective lease window produced by [`resolve`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TtlResolution {
	/// Effective TTL; never greater than a positive `max_ttl`.
	pub ttl: Duration,
	/// Effective maximum TTL; zero means unbounded.
	pub max_ttl: Duration,
	/// One entry per clamp that was applied.
	pub warnings: Vec<TtlWarning>,
}

/// Resolves the effective `ttl` and `max_ttl` for an issuance.
pub fn resolve(sources: &TtlSources) -> TtlResolution {
	let request = sources.request.normalized();
	let entity = sources.entity.normalized();
	let backend = sources.backend.normalized();
	let system = sources.system.normalized();
	let mut warnings = Vec::new();
	let mut max_ttl =
		first_positive([request.max_ttl, entity.max_ttl, backend.max_ttl, system.max_ttl]);

	for (ceiling, warning) in [
		(system.max_ttl, TtlWarning::MaxTtlLoweredToSystem),
		(backend.max_ttl, TtlWarning::MaxTtlLoweredToBackend),
		(entity.max_ttl, TtlWarning::MaxTtlLoweredToEntity),
	] {
		if ceiling.is_positive() && max_ttl > ceiling {
			max_ttl = ceiling;

			warnings.push(warning);
		}
	}

	let mut ttl = first_positive([request.ttl, entity.ttl, backend.ttl, system.ttl]);

	if max_ttl.is_positive() && ttl > max_ttl {
		ttl = max_ttl;

		warnings.push(TtlWarning::TtlLoweredToMaxTtl);
	}

	TtlResolution { ttl, max_ttl, warnings }
}

fn first_positive<const N: usize>(candidates: [Duration; N]) -> Duration {
	candidates.into_iter().find(|value| value.is_positive()).unwrap_or(Duration::ZERO)
}

fn non_negative(value: Duration) -> Duration {
	if value.is_negative() { Duration::ZERO } else { value }
}
