//! Unverified decoding of compact signed-claims tokens (`header.payload.signature`).
//!
//! Signatures are not checked here; the host that accepted the credential is trusted to have
//! done so. Only the payload is read.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::{Map, Value};
// self
use crate::{
	_prelude::*,
	identity::{CredentialError, IdentityProvider},
	secret::Credential,
};

/// Claims payload of a compact token.
#[derive(Clone, Debug, PartialEq)]
pub struct ClaimSet(Map<String, Value>);
impl ClaimSet {
	/// Decodes the payload of `credential` without verifying its signature.
	pub fn decode(provider: IdentityProvider, credential: &Credential) -> Result<Self, CredentialError> {
		let unreadable = |reason: &str| CredentialError::Unreadable { provider, reason: reason.into() };
		let mut parts = credential.expose().trim().split('.');
		let (Some(header), Some(payload), Some(_signature), None) =
			(parts.next(), parts.next(), parts.next(), parts.next())
		else {
			return Err(unreadable("expected three dot-separated segments"));
		};

		if header.is_empty() || payload.is_empty() {
			return Err(unreadable("empty header or payload segment"));
		}

		let bytes = URL_SAFE_NO_PAD
			.decode(payload.trim_end_matches('='))
			.map_err(|_| unreadable("payload is not base64url"))?;

		match serde_json::from_slice::<Value>(&bytes) {
			Ok(Value::Object(map)) => Ok(Self(map)),
			Ok(_) => Err(unreadable("payload is not a JSON object")),
			Err(_) => Err(unreadable("payload is not valid JSON")),
		}
	}

	/// Returns a non-empty string claim, if present.
	///
	/// Numeric claims are rendered as their decimal text so numeric subject identifiers still
	/// key a record.
	pub fn string(&self, name: &str) -> Option<String> {
		match self.0.get(name)? {
			Value::String(value) if !value.trim().is_empty() => Some(value.trim().to_owned()),
			Value::Number(value) => Some(value.to_string()),
			_ => None,
		}
	}
}

#[cfg(test)]
pub(crate) fn unsigned_token(claims: Value) -> Credential {
	let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
	let payload = URL_SAFE_NO_PAD.encode(claims.to_string());

	Credential::new(format!("{header}.{payload}.c2lnbmF0dXJl"))
}
