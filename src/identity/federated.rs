//! Federated ID token extractor (social provider B).

// self
use crate::{
	_prelude::*,
	identity::{
		CredentialError, ExtractFuture, IdentityProvider, SubjectExtractor, SubjectIdentity,
		claims::ClaimSet,
	},
	secret::Credential,
};

const SUBJECT_CLAIM: &str = "sub";
const EMAIL_CLAIM: &str = "email";

/// Reads the `sub` claim (and `email` for display) from a federated ID token.
#[derive(Clone, Copy, Debug, Default)]
pub struct FederatedExtractor;
impl FederatedExtractor {
	/// Synchronous core of [`SubjectExtractor::extract`].
	pub fn extract_claims(&self, credential: &Credential) -> Result<SubjectIdentity, CredentialError> {
		let provider = IdentityProvider::SocialB;
		let claims = ClaimSet::decode(provider, credential)?;
		let subject =
			claims.string(SUBJECT_CLAIM).ok_or(CredentialError::MissingSubject { provider })?;
		let identity = SubjectIdentity::new(subject);

		Ok(match claims.string(EMAIL_CLAIM) {
			Some(email) => identity.with_display_name(email),
			None => identity,
		})
	}
}
impl SubjectExtractor for FederatedExtractor {
	fn provider(&self) -> IdentityProvider {
		IdentityProvider::SocialB
	}

	fn extract<'a>(&'a self, credential: &'a Credential) -> ExtractFuture<'a> {
		Box::pin(async move { self.extract_claims(credential).map_err(Error::from) })
	}
}
