//! Primary directory extractor.
//!
//! The subject id is the tenant-qualified composite `{tid}-{oid}`, so users with the same object
//! id in different tenants never share a token record. Changing this convention changes which
//! remote record every existing user resolves to.

// self
use crate::{
	_prelude::*,
	identity::{
		CredentialError, ExtractFuture, IdentityProvider, SubjectExtractor, SubjectIdentity,
		claims::ClaimSet,
	},
	secret::Credential,
};

const TENANT_CLAIM: &str = "tid";
const OBJECT_CLAIM: &str = "oid";
const UPN_CLAIM: &str = "upn";

/// Reads tenant, object, and user-principal-name claims from a directory ID token.
#[derive(Clone, Copy, Debug, Default)]
pub struct DirectoryExtractor;
impl DirectoryExtractor {
	/// Synchronous core of [`SubjectExtractor::extract`].
	pub fn extract_claims(&self, credential: &Credential) -> Result<SubjectIdentity, CredentialError> {
		let claims = ClaimSet::decode(IdentityProvider::PrimaryDirectory, credential)?;
		let tenant = claims.string(TENANT_CLAIM).ok_or(CredentialError::MissingTenantId)?;
		let object = claims.string(OBJECT_CLAIM).ok_or(CredentialError::MissingObjectId)?;
		let identity = SubjectIdentity::new(format!("{tenant}-{object}"));

		Ok(match claims.string(UPN_CLAIM) {
			Some(upn) => identity.with_display_name(upn),
			None => identity,
		})
	}
}
impl SubjectExtractor for DirectoryExtractor {
	fn provider(&self) -> IdentityProvider {
		IdentityProvider::PrimaryDirectory
	}

	fn extract<'a>(&'a self, credential: &'a Credential) -> ExtractFuture<'a> {
		Box::pin(async move { self.extract_claims(credential).map_err(Error::from) })
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;
	use crate::identity::claims::unsigned_token;

	#[test]
	fn subject_is_tenant_qualified() {
		let credential =
			unsigned_token(json!({ "tid": "t1", "oid": "o1", "upn": "ada@contoso.example" }));
		let identity = DirectoryExtractor
			.extract_claims(&credential)
			.expect("Directory token with both claims should extract.");

		assert_eq!(identity.subject_id, "t1-o1");
		assert_eq!(identity.display_name.as_deref(), Some("ada@contoso.example"));
	}

	#[test]
	fn missing_claims_are_distinguished() {
		let no_tenant = unsigned_token(json!({ "oid": "o1" }));
		let no_object = unsigned_token(json!({ "tid": "t1" }));
		let tenant_err = DirectoryExtractor
			.extract_claims(&no_tenant)
			.expect_err("Missing tenant must fail.");
		let object_err = DirectoryExtractor
			.extract_claims(&no_object)
			.expect_err("Missing object must fail.");

		assert_eq!(tenant_err, CredentialError::MissingTenantId);
		assert_eq!(object_err, CredentialError::MissingObjectId);
		assert!(tenant_err.to_string().contains("tenant id"));
		assert!(object_err.to_string().contains("object id"));
	}

	#[tokio::test]
	async fn trait_extract_wraps_credential_errors() {
		let credential = Credential::new("not-a-token");
		let err = DirectoryExtractor
			.extract(&credential)
			.await
			.expect_err("Opaque credentials must fail.");

		assert!(matches!(err, Error::Credential(CredentialError::Unreadable { .. })));
	}
}
