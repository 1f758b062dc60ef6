//! Resolver-level error types shared across the validator, extractors, and token store client.

// self
use crate::{
	_prelude::*, identity::CredentialError, locator::LocatorError, obs::Stage, store::StoreError,
};

/// Resolver-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical resolver error exposed by public APIs.
///
/// Every variant is terminal; nothing in this crate retries on the caller's behalf.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Caller configuration is wrong (access mode, provider, missing credential).
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Resource locator does not match the shape required by the access mode.
	#[error(transparent)]
	Format(#[from] LocatorError),
	/// User credential could not be read or was rejected by its provider.
	#[error(transparent)]
	Credential(#[from] CredentialError),
	/// Token store protocol reached a terminal failure state.
	#[error(transparent)]
	Store(#[from] StoreError),
	/// Network failure (DNS, TCP, TLS) on an outbound call.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Caller aborted the resolution or its deadline elapsed.
	#[error("Token resolution was canceled during the {stage} stage ({cause}).")]
	Canceled {
		/// Stage whose in-flight call was aborted.
		stage: Stage,
		/// Why the call was aborted.
		cause: CancelCause,
	},
}
impl Error {
	/// Returns the flat error category for this failure.
	pub fn kind(&self) -> ErrorKind {
		match self {
			Self::Config(_) => ErrorKind::Configuration,
			Self::Format(_) => ErrorKind::Format,
			Self::Credential(_) => ErrorKind::Credential,
			Self::Store(e) => e.kind(),
			Self::Transport(_) => ErrorKind::Transport,
			Self::Canceled { .. } => ErrorKind::Canceled,
		}
	}

	/// Returns the stage that produced this failure.
	pub fn stage(&self) -> Stage {
		match self {
			Self::Config(_) => Stage::Configure,
			Self::Format(_) => Stage::Validate,
			Self::Credential(_) => Stage::Identity,
			Self::Store(e) => e.stage(),
			Self::Transport(TransportError::Network { stage, .. }) => *stage,
			Self::Canceled { stage, .. } => *stage,
		}
	}
}

/// Flat failure taxonomy surfaced to callers alongside the human-readable message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
	/// Bad access-mode/provider combination or unsupported provider.
	Configuration,
	/// Locator shape mismatch.
	Format,
	/// Missing/unreadable claims or a provider-rejected credential.
	Credential,
	/// Store-scoped bearer credential could not be obtained.
	AuthenticationFailed,
	/// Unexpected status or body from the token query.
	StoreQueryFailed,
	/// Token record exists but the end user has not logged in.
	TokenNotLoggedIn,
	/// Token record was just created; the end user must log in.
	TokenCreatedPendingLogin,
	/// Store refused to provision the record.
	CreateForbidden,
	/// Provisioning failed for any other reason.
	CreateFailed,
	/// Caller aborted the resolution.
	Canceled,
	/// Network failure on an outbound call.
	Transport,
}
impl ErrorKind {
	/// Returns a stable label suitable for span, log, or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Configuration => "configuration",
			Self::Format => "format",
			Self::Credential => "credential",
			Self::AuthenticationFailed => "authentication_failed",
			Self::StoreQueryFailed => "store_query_failed",
			Self::TokenNotLoggedIn => "token_not_logged_in",
			Self::TokenCreatedPendingLogin => "token_created_pending_login",
			Self::CreateForbidden => "create_forbidden",
			Self::CreateFailed => "create_failed",
			Self::Canceled => "canceled",
			Self::Transport => "transport",
		}
	}
}
impl Display for ErrorKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Reason an in-flight call was aborted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelCause {
	/// The caller's cancellation token fired.
	Requested,
	/// The per-resolution deadline elapsed.
	DeadlineElapsed,
}
impl Display for CancelCause {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Requested => f.write_str("cancellation requested"),
			Self::DeadlineElapsed => f.write_str("deadline elapsed"),
		}
	}
}

/// Configuration failures raised before any network call is made.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// Access mode string is not recognized.
	#[error("Unsupported access mode `{value}`; expected \"service-identity\" or \"user-delegated\".")]
	UnsupportedAccessMode {
		/// Raw value supplied by the caller.
		value: String,
	},
	/// Identity provider string is not recognized.
	#[error(
		"Unsupported identity provider `{value}`; expected \"primary-directory\", \"social-a\", or \"social-b\"."
	)]
	UnsupportedProvider {
		/// Raw value supplied by the caller.
		value: String,
	},
	/// User-delegated mode was requested without naming a provider.
	#[error("The user-delegated access mode requires an identity provider.")]
	MissingIdentityProvider,
	/// User-delegated mode was requested without a credential.
	#[error("The user-delegated access mode requires a {provider} credential.")]
	MissingCredential {
		/// Provider whose credential was expected.
		provider: crate::identity::IdentityProvider,
	},
	/// The inbound request carried no credential header for the provider.
	#[error(
		"Cannot find a user credential in the `{header}` header. Verify that this endpoint is protected by the {provider} identity provider."
	)]
	MissingCredentialHeader {
		/// Provider whose credential was expected.
		provider: crate::identity::IdentityProvider,
		/// Header that was inspected.
		header: &'static str,
	},
	/// Path resolution for a service-level locator needs a subject identity.
	#[error("A service-level locator needs a subject identity to derive the token path.")]
	MissingIdentity,
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// A configured endpoint could not be parsed.
	#[error("The {endpoint} endpoint is not a valid URL.")]
	InvalidEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Endpoints must use HTTPS.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// The subject id cannot be used as a token path segment.
	#[error("Subject id `{subject}` cannot address a token record.")]
	UnaddressableSubject {
		/// Subject id reported by the identity provider.
		subject: String,
	},
	/// A derived token URL could not be built.
	#[error("Token URL `{url}` could not be built.")]
	InvalidTokenUrl {
		/// Offending URL text.
		url: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred during the {stage} stage.")]
	Network {
		/// Stage whose outbound call failed.
		stage: Stage,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error raised while running `stage`.
	pub fn network(stage: Stage, src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { stage, source: Box::new(src) }
	}
}
