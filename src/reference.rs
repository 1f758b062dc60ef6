//! Inbound token reference supplied by the host binding.

// self
use crate::{
	_prelude::*, error::ConfigError, identity::IdentityProvider, locator::AccessMode,
};

/// Immutable input to one resolution.
///
/// Deserializes from the host's declared configuration:
///
/// ```json
/// { "resourceLocator": "https://demo.tokenstore.azure.net/services/dropbox",
///   "accessMode": "user-delegated", "identityProvider": "primary-directory" }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenReference {
	/// Full token locator (service identity) or service-level locator (user delegation).
	pub resource_locator: String,
	/// Resolution path; defaults to service identity.
	#[serde(default)]
	pub access_mode: AccessMode,
	/// Provider whose credential keys the per-user token; required for user delegation.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub identity_provider: Option<IdentityProvider>,
}
impl TokenReference {
	/// References a single named token read with the caller's own workload identity.
	pub fn service_identity(resource_locator: impl Into<String>) -> Self {
		Self {
			resource_locator: resource_locator.into(),
			access_mode: AccessMode::ServiceIdentity,
			identity_provider: None,
		}
	}

	/// References the per-user token of a service, keyed by a `provider` credential.
	pub fn user_delegated(resource_locator: impl Into<String>, provider: IdentityProvider) -> Self {
		Self {
			resource_locator: resource_locator.into(),
			access_mode: AccessMode::UserDelegated,
			identity_provider: Some(provider),
		}
	}

	/// Builds a reference from raw configuration strings.
	///
	/// `provider` is ignored in service-identity mode.
	pub fn parse(
		resource_locator: impl Into<String>,
		access_mode: &str,
		provider: Option<&str>,
	) -> Result<Self, ConfigError> {
		let access_mode = access_mode.parse::<AccessMode>()?;
		let identity_provider = match (access_mode, provider) {
			(AccessMode::UserDelegated, Some(raw)) => Some(raw.parse::<IdentityProvider>()?),
			_ => None,
		};
		let reference =
			Self { resource_locator: resource_locator.into(), access_mode, identity_provider };

		reference.check()?;

		Ok(reference)
	}

	/// Enforces the access-mode/provider invariant.
	pub fn check(&self) -> Result<(), ConfigError> {
		self.required_provider().map(|_| ())
	}

	/// Returns the provider for user delegation, or `None` for service identity.
	pub fn required_provider(&self) -> Result<Option<IdentityProvider>, ConfigError> {
		match (self.access_mode, self.identity_provider) {
			(AccessMode::ServiceIdentity, _) => Ok(None),
			(AccessMode::UserDelegated, Some(provider)) => Ok(Some(provider)),
			(AccessMode::UserDelegated, None) => Err(ConfigError::MissingIdentityProvider),
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn deserializes_host_configuration() {
		let reference: TokenReference = serde_json::from_str(
			r#"{"resourceLocator":"https://s.example/services/svc","accessMode":"user","identityProvider":"aad"}"#,
		)
		.expect("Host configuration should deserialize.");

		assert_eq!(
			reference,
			TokenReference::user_delegated(
				"https://s.example/services/svc",
				IdentityProvider::PrimaryDirectory
			)
		);

		let defaulted: TokenReference =
			serde_json::from_str(r#"{"resourceLocator":"https://s.example/services/svc/tokens/t"}"#)
				.expect("Access mode should default.");

		assert_eq!(defaulted.access_mode, AccessMode::ServiceIdentity);
		assert!(defaulted.check().is_ok());
	}

	#[test]
	fn user_delegation_requires_provider() {
		let reference = TokenReference {
			resource_locator: "https://s.example/services/svc".into(),
			access_mode: AccessMode::UserDelegated,
			identity_provider: None,
		};

		assert!(matches!(reference.check(), Err(ConfigError::MissingIdentityProvider)));
		assert!(matches!(
			TokenReference::parse("https://s.example/services/svc", "user-delegated", None),
			Err(ConfigError::MissingIdentityProvider)
		));
	}

	#[test]
	fn parse_reports_unsupported_values() {
		assert!(matches!(
			TokenReference::parse("https://s.example/services/svc", "user", Some("myspace")),
			Err(ConfigError::UnsupportedProvider { .. })
		));
		assert!(matches!(
			TokenReference::parse("https://s.example/services/svc", "robot", None),
			Err(ConfigError::UnsupportedAccessMode { .. })
		));

		let reference =
			TokenReference::parse("https://s.example/services/svc/tokens/t", "msi", Some("bogus"))
				.expect("Provider is ignored under service identity.");

		assert_eq!(reference.identity_provider, None);
	}
}
