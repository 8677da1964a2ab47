//! Artifactory token scopes.
//!
//! Scopes are opaque strings to the engine except for one rule: a caller-supplied override on a
//! user token must name one or more groups (`applied-permissions/groups:<name>[,<name>...]`).

// std
use std::sync::LazyLock;
// crates.io
use regex::Regex;
// self
use crate::_prelude::*;

/// Scope granted to user tokens when the caller does not override it.
pub const USER_SCOPE: &str = "applied-permissions/user";

const GROUP_SCOPE_PATTERN: &str = r"^applied-permissions/groups:[^,]+(,[^,]+)*$";

static GROUP_SCOPE: LazyLock<Option<Regex>> =
	LazyLock::new(|| Regex::new(GROUP_SCOPE_PATTERN).ok());

/// Scope string sent to and returned from the token endpoint.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenScope(String);
impl TokenScope {
	/// Wraps a scope without validation.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Default scope for user tokens.
	pub fn user() -> Self {
		Self::new(USER_SCOPE)
	}

	/// Validates a caller-supplied group scope override.
	pub fn group_override(value: impl Into<String>) -> Result<Self> {
		let value = value.into();

		if is_group_scope(&value) {
			Ok(Self(value))
		} else {
			Err(Error::InvalidScope { scope: value })
		}
	}

	/// Returns the raw scope string.
	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Returns `true` when no scope is set.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}
impl AsRef<str> for TokenScope {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl Display for TokenScope {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}
impl From<&str> for TokenScope {
	fn from(value: &str) -> Self {
		Self::new(value)
	}
}
impl From<String> for TokenScope {
	fn from(value: String) -> Self {
		Self(value)
	}
}

/// Returns `true` when `scope` names one or more groups.
pub fn is_group_scope(scope: &str) -> bool {
	GROUP_SCOPE.as_ref().is_some_and(|pattern| pattern.is_match(scope))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn group_scopes_are_accepted() {
		assert!(is_group_scope("applied-permissions/groups:readers"));
		assert!(is_group_scope("applied-permissions/groups:readers,deployers"));
		assert!(is_group_scope("applied-permissions/groups:\"release team\""));
	}

	#[test]
	fn other_scopes_are_rejected() {
		for scope in [
			"",
			"applied-permissions/user",
			"applied-permissions/admin",
			"applied-permissions/groups:",
			"applied-permissions/groups:readers,",
			"applied-permissions/groups:,readers",
			"prefix applied-permissions/groups:readers",
		] {
			assert!(!is_group_scope(scope), "Scope `{scope}` must be rejected.");
		}
	}

	#[test]
	fn group_override_reports_rejected_scope() {
		let err = TokenScope::group_override("applied-permissions/admin")
			.expect_err("Admin scope must not pass the group check.");

		assert!(matches!(err, Error::InvalidScope { ref scope } if scope == "applied-permissions/admin"));
		assert_eq!(TokenScope::user().as_str(), USER_SCOPE);
	}
}
