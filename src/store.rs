//! Token store client: authenticate to the store, query a token record, create it when absent.
//!
//! One call walks a short state machine:
//!
//! 1. acquire a bearer credential scoped to the store root with the caller's workload identity;
//! 2. `GET {tokenUrl}`, which either yields the access token, reports an unauthenticated record,
//!    falls through to creation on `404`, or fails;
//! 3. `PUT {tokenUrl}` with `{"displayName": ...}`, which always ends in an error because the end
//!    user still has to log in.
//!
//! Nothing is retried. Concurrent callers racing to create the same record each receive whatever
//! the store answers their own `PUT`.

pub mod credential;
pub mod record;

pub use credential::{
	CachedCredentialProvider, CredentialFuture, CredentialSourceError, ManagedIdentityEndpoint,
	ManagedIdentityProvider, StaticCredentialProvider, StoreCredential, StoreCredentialProvider,
};
pub use record::{StatusError, TokenRecord, TokenState};

// self
use crate::{
	_prelude::*,
	error::ErrorKind,
	http::{self, CallGuard, ReqwestHttpClient},
	obs::{self, ResolveSpan, Stage},
	path::TokenTarget,
	secret::{AccessToken, TokenSecret},
};

/// Terminal failures of the token store protocol.
#[derive(Debug, ThisError)]
pub enum StoreError {
	/// No store-scoped bearer credential could be obtained.
	#[error("Could not obtain a token store credential for `{resource}`.")]
	AuthenticationFailed {
		/// Store root the credential was requested for.
		resource: String,
		/// Underlying credential source failure.
		#[source]
		source: CredentialSourceError,
	},
	/// The token query returned an unexpected status.
	#[error("Token store query for {token_url} failed with status {status}: {body}")]
	QueryFailed {
		/// Queried token URL.
		token_url: String,
		/// HTTP status returned by the store.
		status: u16,
		/// Preview of the response body.
		body: String,
	},
	/// The token query succeeded but the record could not be parsed.
	#[error("Token store returned a malformed record for {token_url}.")]
	MalformedRecord {
		/// Queried token URL.
		token_url: String,
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// The record exists but the end user has not logged in.
	#[error(
		"Token {token_url} exists but is not logged in{detail}. Navigate to {login_url} to log in.",
		detail = detail_suffix(.message)
	)]
	NotLoggedIn {
		/// Queried token URL.
		token_url: String,
		/// Where the end user completes login.
		login_url: String,
		/// Store-reported status message, when present.
		message: Option<String>,
	},
	/// The record did not exist and was just created; the end user must log in.
	#[error(
		"Specified token does not exist. A new token with display name `{display_name}` was created at {token_url}. Navigate to {login_url} to log in. Store responded with status {status}: {body}"
	)]
	CreatedPendingLogin {
		/// Created token URL.
		token_url: String,
		/// Where the end user completes login.
		login_url: String,
		/// Display name the record was created with.
		display_name: String,
		/// HTTP status returned by the store.
		status: u16,
		/// Preview of the response body.
		body: String,
	},
	/// The store refused to create the record.
	#[error(
		"Specified token does not exist and could not be created for display name `{display_name}`. Make sure the workload identity has get and/or create permission on the token store {store_root}. Store responded with status {status}: {body}"
	)]
	CreateForbidden {
		/// Store root the record was created under.
		store_root: String,
		/// Display name the record was going to use.
		display_name: String,
		/// HTTP status returned by the store.
		status: u16,
		/// Preview of the response body.
		body: String,
	},
	/// Creation failed for any other reason, including a conflicting concurrent create.
	#[error(
		"Failed to create token `{display_name}` at {token_url}; store responded with status {status}: {body}"
	)]
	CreateFailed {
		/// Token URL the record was going to live at.
		token_url: String,
		/// Display name the record was going to use.
		display_name: String,
		/// HTTP status returned by the store.
		status: u16,
		/// Preview of the response body.
		body: String,
	},
}
impl StoreError {
	/// Returns the flat error category for this failure.
	pub fn kind(&self) -> ErrorKind {
		match self {
			Self::AuthenticationFailed { .. } => ErrorKind::AuthenticationFailed,
			Self::QueryFailed { .. } | Self::MalformedRecord { .. } => ErrorKind::StoreQueryFailed,
			Self::NotLoggedIn { .. } => ErrorKind::TokenNotLoggedIn,
			Self::CreatedPendingLogin { .. } => ErrorKind::TokenCreatedPendingLogin,
			Self::CreateForbidden { .. } => ErrorKind::CreateForbidden,
			Self::CreateFailed { .. } => ErrorKind::CreateFailed,
		}
	}

	/// Returns the protocol stage that produced this failure.
	pub fn stage(&self) -> Stage {
		match self {
			Self::AuthenticationFailed { .. } => Stage::StoreAuthentication,
			Self::QueryFailed { .. } | Self::MalformedRecord { .. } | Self::NotLoggedIn { .. } =>
				Stage::Query,
			Self::CreatedPendingLogin { .. }
			| Self::CreateForbidden { .. }
			| Self::CreateFailed { .. } => Stage::Create,
		}
	}
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateTokenBody<'a> {
	display_name: &'a str,
}

/// Client for the remote token store's get-or-create protocol.
#[derive(Clone)]
pub struct TokenStoreClient {
	http_client: ReqwestHttpClient,
	credentials: Arc<dyn StoreCredentialProvider>,
}
impl TokenStoreClient {
	/// Creates a client that authenticates with `credentials`.
	pub fn new(http_client: ReqwestHttpClient, credentials: Arc<dyn StoreCredentialProvider>) -> Self {
		Self { http_client, credentials }
	}

	/// Returns the access token held by `target`, creating the record if it does not exist.
	///
	/// `store_root` is the scheme + authority of the store and scopes the bearer credential.
	pub async fn get_or_create(&self, target: &TokenTarget, store_root: &str) -> Result<AccessToken> {
		self.get_or_create_guarded(target, store_root, &CallGuard::unbounded()).await
	}

	/// Same as [`TokenStoreClient::get_or_create`], with every call bounded by `guard`.
	pub async fn get_or_create_guarded(
		&self,
		target: &TokenTarget,
		store_root: &str,
		guard: &CallGuard,
	) -> Result<AccessToken> {
		let bearer = guard.run(Stage::StoreAuthentication, self.authenticate(store_root)).await?;

		if let Some(token) = guard.run(Stage::Query, self.query(target, &bearer)).await? {
			return Ok(token);
		}

		let terminal = guard.run(Stage::Create, self.create(target, store_root, &bearer)).await?;

		Err(terminal.into())
	}

	async fn authenticate(&self, store_root: &str) -> Result<TokenSecret> {
		let credential = self.credentials.acquire(store_root).await.map_err(|source| {
			StoreError::AuthenticationFailed { resource: store_root.to_owned(), source }
		})?;

		Ok(credential.secret)
	}

	// `None` means the record does not exist yet.
	async fn query(&self, target: &TokenTarget, bearer: &TokenSecret) -> Result<Option<AccessToken>> {
		let stage = Stage::Query;
		let token_url = &target.token_url;
		let request = self.http_client.get(token_url.clone()).bearer_auth(bearer.expose());
		let response = ResolveSpan::call(stage, token_url.as_str())
			.instrument(self.http_client.send(stage, request))
			.await?;
		let status = response.status();

		obs::trace_status(stage, status.as_u16());

		if status == StatusCode::NOT_FOUND {
			return Ok(None);
		}

		let body = http::read_body(stage, response).await?;

		if !status.is_success() {
			return Err(StoreError::QueryFailed {
				token_url: token_url.to_string(),
				status: status.as_u16(),
				body: http::preview(body),
			}
			.into());
		}

		let record = TokenRecord::from_json(&body).map_err(|source| StoreError::MalformedRecord {
			token_url: token_url.to_string(),
			source,
		})?;

		match record.state {
			TokenState::Authenticated { access_token, .. } => Ok(Some(access_token)),
			TokenState::Unauthenticated { error, .. } => Err(StoreError::NotLoggedIn {
				token_url: token_url.to_string(),
				login_url: target.login_url(),
				message: error.and_then(|e| e.message).filter(|m| !m.trim().is_empty()),
			}
			.into()),
		}
	}

	// Every create outcome is terminal, so success is also returned as a `StoreError`.
	async fn create(
		&self,
		target: &TokenTarget,
		store_root: &str,
		bearer: &TokenSecret,
	) -> Result<StoreError> {
		let stage = Stage::Create;
		let token_url = &target.token_url;
		let request = self
			.http_client
			.put(token_url.clone())
			.bearer_auth(bearer.expose())
			.json(&CreateTokenBody { display_name: &target.display_name });
		let response = ResolveSpan::call(stage, token_url.as_str())
			.instrument(self.http_client.send(stage, request))
			.await?;
		let status = response.status();

		obs::trace_status(stage, status.as_u16());

		let body = http::preview(http::read_body(stage, response).await?);
		let display_name = target.display_name.clone();

		Ok(match status {
			s if s.is_success() => {
				let login_url = target.login_url();

				obs::trace_record_created(token_url.as_str(), &login_url);

				StoreError::CreatedPendingLogin {
					token_url: token_url.to_string(),
					login_url,
					display_name,
					status: s.as_u16(),
					body,
				}
			},
			StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::CreateForbidden {
				store_root: store_root.to_owned(),
				display_name,
				status: status.as_u16(),
				body,
			},
			_ => StoreError::CreateFailed {
				token_url: token_url.to_string(),
				display_name,
				status: status.as_u16(),
				body,
			},
		})
	}
}
impl Debug for TokenStoreClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenStoreClient").field("http_client", &self.http_client).finish_non_exhaustive()
	}
}

fn detail_suffix(message: &Option<String>) -> String {
	message.as_deref().map(|m| format!(" ({m})")).unwrap_or_default()
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn store_errors_report_kind_and_stage() {
		let pending = StoreError::CreatedPendingLogin {
			token_url: "https://s/services/svc/tokens/t1".into(),
			login_url: "https://s/services/svc/tokens/t1/login".into(),
			display_name: "Ada".into(),
			status: 201,
			body: "{}".into(),
		};

		assert_eq!(pending.kind(), ErrorKind::TokenCreatedPendingLogin);
		assert_eq!(pending.stage(), Stage::Create);
		assert!(pending.to_string().contains("Navigate to https://s/services/svc/tokens/t1/login"));

		let err: Error = StoreError::QueryFailed {
			token_url: "https://s/services/svc/tokens/t1".into(),
			status: 401,
			body: "denied".into(),
		}
		.into();

		assert_eq!(err.kind(), ErrorKind::StoreQueryFailed);
		assert_eq!(err.stage(), Stage::Query);
	}

	#[test]
	fn not_logged_in_message_includes_store_detail() {
		let with_detail = StoreError::NotLoggedIn {
			token_url: "https://s/services/svc/tokens/t1".into(),
			login_url: "https://s/services/svc/tokens/t1/login".into(),
			message: Some("Login required".into()),
		};

		assert_eq!(
			with_detail.to_string(),
			"Token https://s/services/svc/tokens/t1 exists but is not logged in (Login required). Navigate to https://s/services/svc/tokens/t1/login to log in."
		);

		let bare = StoreError::NotLoggedIn {
			token_url: "https://s/t".into(),
			login_url: "https://s/t/login".into(),
			message: None,
		};

		assert!(bare.to_string().contains("is not logged in. Navigate"));
	}

	#[test]
	fn forbidden_create_names_store_and_permissions() {
		let err = StoreError::CreateForbidden {
			store_root: "https://demo.tokenstore.azure.net".into(),
			display_name: "Ada".into(),
			status: 403,
			body: "forbidden".into(),
		};
		let message = err.to_string();

		assert_eq!(err.kind(), ErrorKind::CreateForbidden);
		assert!(message.contains("get and/or create permission"));
		assert!(message.contains("https://demo.tokenstore.azure.net"));
	}

	#[test]
	fn create_body_uses_camel_case() {
		assert_eq!(
			serde_json::to_string(&CreateTokenBody { display_name: "Ada" })
				.expect("Create body should serialize."),
			r#"{"displayName":"Ada"}"#
		);
	}
}
