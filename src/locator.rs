//! Resource locator validation for both access modes.
//!
//! A locator addresses either a single named token
//! (`https://<store>/services/<service>/tokens/<name>`, service-identity mode) or a service
//! whose per-user tokens are derived at resolution time (`https://<store>/services/<service>`,
//! user-delegated mode). Validation is pure; a successful check yields a parsed
//! [`TokenLocator`] so later stages never re-parse the string.

// self
use crate::{_prelude::*, error::ConfigError};

const SCHEME_PREFIX: &str = "https://";
const SERVICES_SEGMENT: &str = "services";
const TOKENS_SEGMENT: &str = "tokens";

/// Declares which resolution path applies to a reference.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessMode {
	/// The caller's own workload identity reads a single named token.
	#[default]
	#[serde(rename = "service-identity", alias = "msi")]
	ServiceIdentity,
	/// A per-user token path is derived from a presented user credential.
	#[serde(rename = "user-delegated", alias = "user")]
	UserDelegated,
}
impl AccessMode {
	/// Returns a stable label suitable for configuration, span, or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			AccessMode::ServiceIdentity => "service-identity",
			AccessMode::UserDelegated => "user-delegated",
		}
	}

	/// Returns the locator shape this mode expects, for error messages.
	pub const fn expected_shape(self) -> &'static str {
		match self {
			AccessMode::ServiceIdentity =>
				"https://{token-store}/services/{service-name}/tokens/{token-name}",
			AccessMode::UserDelegated => "https://{token-store}/services/{service-name}",
		}
	}
}
impl Display for AccessMode {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for AccessMode {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"service-identity" | "msi" => Ok(AccessMode::ServiceIdentity),
			"user-delegated" | "user" => Ok(AccessMode::UserDelegated),
			_ => Err(ConfigError::UnsupportedAccessMode { value: s.to_owned() }),
		}
	}
}

/// Locator shape failures.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum LocatorError {
	/// The locator does not have the shape required by the access mode.
	#[error("When using the {mode} access mode the locator must have the form \"{expected}\"; got `{locator}`.", expected = .mode.expected_shape())]
	ShapeMismatch {
		/// Declared access mode.
		mode: AccessMode,
		/// Offending locator.
		locator: String,
	},
	/// The locator points at a host outside the configured token-store domain.
	#[error("Token store host `{host}` does not end with the required suffix `{suffix}`.")]
	ForeignStore {
		/// Host found in the locator.
		host: String,
		/// Suffix required by the policy.
		suffix: String,
	},
}

/// Parsed, validated resource locator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenLocator {
	raw: String,
	url: Url,
	mode: AccessMode,
	service: String,
	token_name: Option<String>,
}
impl TokenLocator {
	/// Returns the locator exactly as supplied.
	pub fn as_str(&self) -> &str {
		&self.raw
	}

	/// Returns the parsed locator URL.
	pub fn url(&self) -> &Url {
		&self.url
	}

	/// Returns the access mode the locator was validated for.
	pub fn mode(&self) -> AccessMode {
		self.mode
	}

	/// Returns the service segment.
	pub fn service(&self) -> &str {
		&self.service
	}

	/// Returns the trailing token-name segment (service-identity locators only).
	pub fn token_name(&self) -> Option<&str> {
		self.token_name.as_deref()
	}

	/// Returns the token store root (scheme + authority, no trailing slash).
	///
	/// Store-scoped bearer credentials are requested for this resource.
	pub fn store_root(&self) -> String {
		self.url.origin().ascii_serialization()
	}
}

/// Validation policy applied to locators.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LocatorPolicy {
	/// When set, the store host must end with this suffix (for example `.tokenstore.azure.net`).
	pub required_host_suffix: Option<String>,
}
impl LocatorPolicy {
	/// Restricts locators to stores whose host ends with `suffix`.
	pub fn with_required_host_suffix(mut self, suffix: impl Into<String>) -> Self {
		self.required_host_suffix = Some(suffix.into());

		self
	}

	/// Checks `locator` against the shape required by `mode`.
	pub fn validate(&self, locator: &str, mode: AccessMode) -> Result<TokenLocator, LocatorError> {
		let mismatch = || LocatorError::ShapeMismatch { mode, locator: locator.to_owned() };
		let rest = locator.strip_prefix(SCHEME_PREFIX).ok_or_else(mismatch)?;
		let segments = rest.split('/').collect::<Vec<_>>();
		let (store, service, token_name) = match (mode, segments.as_slice()) {
			(AccessMode::ServiceIdentity, [store, SERVICES_SEGMENT, service, TOKENS_SEGMENT, name]) =>
				(*store, *service, Some(*name)),
			(AccessMode::UserDelegated, [store, SERVICES_SEGMENT, service]) =>
				(*store, *service, None),
			_ => return Err(mismatch()),
		};

		if !is_store_segment(store)
			|| !is_name_segment(service)
			|| !token_name.is_none_or(is_name_segment)
		{
			return Err(mismatch());
		}

		let url = Url::parse(locator).map_err(|_| mismatch())?;

		if let Some(suffix) = self.required_host_suffix.as_deref() {
			let host = url.host_str().unwrap_or_default();

			if !host.to_ascii_lowercase().ends_with(&suffix.to_ascii_lowercase()) {
				return Err(LocatorError::ForeignStore {
					host: host.to_owned(),
					suffix: suffix.to_owned(),
				});
			}
		}

		Ok(TokenLocator {
			raw: locator.to_owned(),
			url,
			mode,
			service: service.to_owned(),
			token_name: token_name.map(str::to_owned),
		})
	}
}

/// Checks `locator` against the shape required by `mode` using the default policy.
pub fn validate(locator: &str, mode: AccessMode) -> Result<TokenLocator, LocatorError> {
	LocatorPolicy::default().validate(locator, mode)
}

// `.` and `..` would be normalized away by URL parsing and move the token address.
fn is_name_segment(segment: &str) -> bool {
	!matches!(segment, "" | "." | "..")
		&& segment.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

// `host` or `host:port`.
fn is_store_segment(segment: &str) -> bool {
	match segment.split_once(':') {
		Some((host, port)) =>
			is_name_segment(host) && !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()),
		None => is_name_segment(segment),
	}
}
