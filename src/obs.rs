//! Optional observability helpers for token resolution.
//!
//! # Feature Flags
//!
//! - Enable `tracing` (on by default) to emit spans named `token_store_resolver.resolve` with a
//!   `mode` field, per-call spans named `token_store_resolver.call` carrying the `stage`, and a
//!   `warn` event for each terminal failure.
//! - Enable `metrics` to increment the `token_store_resolver_resolution_total` counter for every
//!   attempt/success/failure, labeled by `mode` + `outcome` + `kind`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Resolution stages, in the order the orchestrator runs them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
	/// Reading and checking the caller's configuration.
	Configure,
	/// Locator shape validation.
	Validate,
	/// Subject extraction from the user credential.
	Identity,
	/// Acquiring the store-scoped bearer credential.
	StoreAuthentication,
	/// `GET` of the token record.
	Query,
	/// `PUT` of a new token record.
	Create,
}
impl Stage {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Stage::Configure => "configure",
			Stage::Validate => "validate",
			Stage::Identity => "identity",
			Stage::StoreAuthentication => "store_authentication",
			Stage::Query => "query",
			Stage::Create => "create",
		}
	}
}
impl Display for Stage {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
	/// Entry to the orchestrator.
	Attempt,
	/// An access token was returned.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl Outcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Outcome::Attempt => "attempt",
			Outcome::Success => "success",
			Outcome::Failure => "failure",
		}
	}
}
impl Display for Outcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
