//! Token path resolution.

// self
use crate::{
	_prelude::*, error::ConfigError, identity::SubjectIdentity, locator::TokenLocator,
};

const TOKENS_SEGMENT: &str = "tokens";
const LOGIN_SEGMENT: &str = "login";

/// Fully-qualified address of a token record plus the name to provision it under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenTarget {
	/// URL the token record is read from and created at.
	pub token_url: Url,
	/// Display name used if the record has to be created.
	pub display_name: String,
}
impl TokenTarget {
	/// Derives the token address for `locator`.
	///
	/// A full token locator is used unchanged and named after its trailing segment. A
	/// service-level locator is extended with `/tokens/{subject_id}` and named after the
	/// identity's display name, falling back to the subject id.
	pub fn resolve(
		locator: &TokenLocator,
		identity: Option<&SubjectIdentity>,
	) -> Result<Self, ConfigError> {
		if let Some(name) = locator.token_name() {
			return Ok(Self { token_url: locator.url().clone(), display_name: name.to_owned() });
		}

		let identity = identity.ok_or(ConfigError::MissingIdentity)?;

		// URL path setters drop dot segments, which would leave the token address at `/tokens`.
		if matches!(identity.subject_id.as_str(), "." | "..") {
			return Err(ConfigError::UnaddressableSubject { subject: identity.subject_id.clone() });
		}

		let mut token_url = locator.url().clone();

		token_url
			.path_segments_mut()
			.map_err(|_| ConfigError::InvalidTokenUrl {
				url: locator.as_str().to_owned(),
				source: url::ParseError::RelativeUrlWithCannotBeABaseBase,
			})?
			.pop_if_empty()
			.extend([TOKENS_SEGMENT, identity.subject_id.as_str()]);

		let display_name =
			identity.display_name.clone().unwrap_or_else(|| identity.subject_id.clone());

		Ok(Self { token_url, display_name })
	}

	/// Returns where the end user completes login for this token.
	pub fn login_url(&self) -> String {
		format!("{}/{LOGIN_SEGMENT}", self.token_url.as_str().trim_end_matches('/'))
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::locator::{self, AccessMode};

	#[test]
	fn full_token_locator_is_used_unchanged() {
		let locator = locator::validate(
			"https://store.example/services/svc/tokens/shared-token",
			AccessMode::ServiceIdentity,
		)
		.expect("Token locator fixture should validate.");
		let target = TokenTarget::resolve(&locator, None).expect("Token locator should resolve.");

		assert_eq!(target.token_url.as_str(), "https://store.example/services/svc/tokens/shared-token");
		assert_eq!(target.display_name, "shared-token");
		assert_eq!(target.login_url(), "https://store.example/services/svc/tokens/shared-token/login");
	}

	#[test]
	fn service_locator_appends_subject() {
		let locator = locator::validate("https://store.example/services/svc", AccessMode::UserDelegated)
			.expect("Service locator fixture should validate.");
		let identity = SubjectIdentity::new("t1-o1");
		let target =
			TokenTarget::resolve(&locator, Some(&identity)).expect("Service locator should resolve.");

		assert_eq!(target.token_url.as_str(), "https://store.example/services/svc/tokens/t1-o1");
		assert_eq!(target.display_name, "t1-o1");

		let named = identity.with_display_name("ada@contoso.example");
		let target =
			TokenTarget::resolve(&locator, Some(&named)).expect("Service locator should resolve.");

		assert_eq!(target.display_name, "ada@contoso.example");
	}

	#[test]
	fn service_locator_without_identity_is_misconfigured() {
		let locator = locator::validate("https://store.example/services/svc", AccessMode::UserDelegated)
			.expect("Service locator fixture should validate.");

		assert!(matches!(TokenTarget::resolve(&locator, None), Err(ConfigError::MissingIdentity)));
	}

	#[test]
	fn subject_ids_are_percent_encoded_as_one_segment() {
		let locator = locator::validate("https://store.example/services/svc", AccessMode::UserDelegated)
			.expect("Service locator fixture should validate.");
		let target = TokenTarget::resolve(&locator, Some(&SubjectIdentity::new("a/b c")))
			.expect("Odd subject ids should still resolve.");

		assert_eq!(target.token_url.as_str(), "https://store.example/services/svc/tokens/a%2Fb%20c");
	}

	#[test]
	fn dot_subject_ids_are_rejected() {
		let locator = locator::validate("https://store.example/services/svc", AccessMode::UserDelegated)
			.expect("Service locator fixture should validate.");

		for subject in [".", ".."] {
			assert!(matches!(
				TokenTarget::resolve(&locator, Some(&SubjectIdentity::new(subject))),
				Err(ConfigError::UnaddressableSubject { .. })
			));
		}
	}
}
