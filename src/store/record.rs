//! Remote token record model.
//!
//! The store reports a record's authentication state through optional nested fields. They are
//! folded into [`TokenState`] on deserialization so callers match on a sum type instead of
//! probing for missing fields.

// self
use crate::{_prelude::*, secret::TokenSecret};

/// Token record as returned by the store.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(from = "WireRecord")]
pub struct TokenRecord {
	/// Record name (the trailing token segment).
	pub name: Option<String>,
	/// Display name given at creation.
	pub display_name: Option<String>,
	/// Canonical token URI reported by the store.
	pub token_uri: Option<String>,
	/// Login URI reported by the store.
	pub login_uri: Option<String>,
	/// Authentication state.
	pub state: TokenState,
}
impl TokenRecord {
	/// Parses a record body, reporting the path of any malformed field.
	pub fn from_json(body: &str) -> Result<Self, serde_path_to_error::Error<serde_json::Error>> {
		let mut de = serde_json::Deserializer::from_str(body);

		serde_path_to_error::deserialize(&mut de)
	}

	/// Returns the access token when the record is authenticated.
	pub fn access_token(&self) -> Option<&TokenSecret> {
		match &self.state {
			TokenState::Authenticated { access_token, .. } => Some(access_token),
			TokenState::Unauthenticated { .. } => None,
		}
	}
}

/// Whether the end user has completed login for a record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenState {
	/// A usable access token is present.
	Authenticated {
		/// Access token for the downstream service.
		access_token: TokenSecret,
		/// Remaining lifetime reported by the store.
		expires_in: Option<Duration>,
	},
	/// No access token is available yet.
	Unauthenticated {
		/// Raw state label reported by the store.
		state: Option<String>,
		/// Store-reported reason, when present.
		error: Option<StatusError>,
	},
}

/// Error attached to an unauthenticated record's status.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusError {
	/// Machine-readable code.
	#[serde(default)]
	pub code: Option<String>,
	/// Human-readable message.
	#[serde(default)]
	pub message: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRecord {
	#[serde(default)]
	name: Option<String>,
	#[serde(default)]
	display_name: Option<String>,
	#[serde(default)]
	token_uri: Option<String>,
	#[serde(default)]
	login_uri: Option<String>,
	#[serde(default)]
	value: Option<WireValue>,
	#[serde(default)]
	status: Option<WireStatus>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireValue {
	#[serde(default)]
	access_token: Option<String>,
	#[serde(default, alias = "expiresIn")]
	expires_in_seconds: Option<i64>,
}

#[derive(Deserialize)]
struct WireStatus {
	#[serde(default)]
	state: Option<String>,
	#[serde(default)]
	error: Option<StatusError>,
}

impl From<WireRecord> for TokenRecord {
	fn from(wire: WireRecord) -> Self {
		let access = wire.value.and_then(|value| {
			let token = value.access_token.filter(|token| !token.is_empty())?;

			Some((token, value.expires_in_seconds))
		});
		let state = match access {
			Some((token, expires_in)) => TokenState::Authenticated {
				access_token: TokenSecret::new(token),
				expires_in: expires_in.map(Duration::seconds),
			},
			None => {
				let status = wire.status.unwrap_or(WireStatus { state: None, error: None });

				TokenState::Unauthenticated { state: status.state, error: status.error }
			},
		};

		Self {
			name: wire.name,
			display_name: wire.display_name,
			token_uri: wire.token_uri,
			login_uri: wire.login_uri,
			state,
		}
	}
}
