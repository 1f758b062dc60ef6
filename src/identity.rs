//! Subject extraction from identity-provider credentials.
//!
//! Each supported [`IdentityProvider`] is served by one [`SubjectExtractor`]. Two of them decode
//! self-contained signed-claims tokens locally (signature trust is delegated to whatever issued
//! the credential to the host); the third asks the provider's own identity API who the bearer is.
//! [`IdentityExtractors`] maps the closed provider set onto its extractors.

pub mod claims;
pub mod directory;
pub mod federated;
pub mod graph;

pub use directory::DirectoryExtractor;
pub use federated::FederatedExtractor;
pub use graph::GraphLookupExtractor;

// crates.io
use reqwest::header::HeaderMap;
// self
use crate::{_prelude::*, error::ConfigError, http::ReqwestHttpClient, secret::Credential};

/// Boxed future returned by [`SubjectExtractor::extract`].
pub type ExtractFuture<'a> = Pin<Box<dyn Future<Output = Result<SubjectIdentity>> + 'a + Send>>;

/// Identity providers whose credentials can key a per-user token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdentityProvider {
	/// Organizational directory issuing signed ID tokens with tenant + object claims.
	#[serde(rename = "primary-directory", alias = "aad")]
	PrimaryDirectory,
	/// Social provider issuing opaque access tokens validated through its identity API.
	#[serde(rename = "social-a", alias = "facebook")]
	SocialA,
	/// Social provider issuing signed federated ID tokens.
	#[serde(rename = "social-b", alias = "google")]
	SocialB,
}
impl IdentityProvider {
	/// Every supported provider.
	pub const ALL: [IdentityProvider; 3] =
		[IdentityProvider::PrimaryDirectory, IdentityProvider::SocialA, IdentityProvider::SocialB];

	/// Returns a stable label suitable for configuration or log fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			IdentityProvider::PrimaryDirectory => "primary-directory",
			IdentityProvider::SocialA => "social-a",
			IdentityProvider::SocialB => "social-b",
		}
	}

	/// Returns the inbound request header the host reads this provider's credential from.
	pub const fn credential_header(self) -> &'static str {
		match self {
			IdentityProvider::PrimaryDirectory => "X-MS-TOKEN-AAD-ID-TOKEN",
			IdentityProvider::SocialA => "X-MS-TOKEN-FACEBOOK-ACCESS-TOKEN",
			IdentityProvider::SocialB => "X-MS-TOKEN-GOOGLE-ID-TOKEN",
		}
	}
}
impl Display for IdentityProvider {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for IdentityProvider {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"primary-directory" | "aad" => Ok(IdentityProvider::PrimaryDirectory),
			"social-a" | "facebook" => Ok(IdentityProvider::SocialA),
			"social-b" | "google" => Ok(IdentityProvider::SocialB),
			_ => Err(ConfigError::UnsupportedProvider { value: s.to_owned() }),
		}
	}
}

impl Credential {
	/// Reads `provider`'s credential from inbound request headers.
	pub fn from_headers(provider: IdentityProvider, headers: &HeaderMap) -> Result<Self, ConfigError> {
		let header = provider.credential_header();

		headers
			.get(header)
			.and_then(|value| value.to_str().ok())
			.map(str::trim)
			.filter(|value| !value.is_empty())
			.map(Credential::new)
			.ok_or(ConfigError::MissingCredentialHeader { provider, header })
	}
}

/// Stable subject derived from a credential; lives for one resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubjectIdentity {
	/// Identifier that keys the per-user token record.
	pub subject_id: String,
	/// Human-readable name used when a record has to be created.
	pub display_name: Option<String>,
}
impl SubjectIdentity {
	/// Creates an identity without a display name.
	pub fn new(subject_id: impl Into<String>) -> Self {
		Self { subject_id: subject_id.into(), display_name: None }
	}

	/// Attaches a display name.
	pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
		self.display_name = Some(display_name.into());

		self
	}
}

/// Credential failures raised while extracting a subject.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum CredentialError {
	/// The credential is not a readable signed-claims token.
	#[error("The {provider} credential cannot be read as a signed-claims token: {reason}.")]
	Unreadable {
		/// Provider whose credential was presented.
		provider: IdentityProvider,
		/// What made the token unreadable.
		reason: String,
	},
	/// The directory token has no tenant claim.
	#[error("Primary directory token error: cannot read tenant id.")]
	MissingTenantId,
	/// The directory token has no object claim.
	#[error("Primary directory token error: cannot read object id.")]
	MissingObjectId,
	/// The credential carries no subject identifier.
	#[error("Could not read the user id from the {provider} credential.")]
	MissingSubject {
		/// Provider whose credential was presented.
		provider: IdentityProvider,
	},
	/// The provider refused the credential.
	#[error("The {provider} identity provider rejected the credential: {reason}.")]
	Rejected {
		/// Provider whose credential was presented.
		provider: IdentityProvider,
		/// HTTP status returned by the provider, when available.
		status: Option<u16>,
		/// Provider-supplied rejection reason.
		reason: String,
	},
}

/// Capability shared by every provider-specific extractor.
pub trait SubjectExtractor
where
	Self: Send + Sync,
{
	/// Provider this extractor serves.
	fn provider(&self) -> IdentityProvider;

	/// Derives the subject identity carried by `credential`.
	fn extract<'a>(&'a self, credential: &'a Credential) -> ExtractFuture<'a>;
}

/// One extractor per supported provider.
#[derive(Clone, Debug)]
pub struct IdentityExtractors {
	directory: DirectoryExtractor,
	federated: FederatedExtractor,
	graph: GraphLookupExtractor,
}
impl IdentityExtractors {
	/// Builds the registry; `graph_endpoint` is the SocialA identity API base URL.
	pub fn new(http_client: ReqwestHttpClient, graph_endpoint: Url) -> Self {
		Self {
			directory: DirectoryExtractor,
			federated: FederatedExtractor,
			graph: GraphLookupExtractor::new(http_client, graph_endpoint),
		}
	}

	/// Returns the extractor serving `provider`.
	pub fn get(&self, provider: IdentityProvider) -> &dyn SubjectExtractor {
		match provider {
			IdentityProvider::PrimaryDirectory => &self.directory,
			IdentityProvider::SocialA => &self.graph,
			IdentityProvider::SocialB => &self.federated,
		}
	}

	/// Derives the subject identity from `credential` using `provider`'s extractor.
	pub async fn extract(
		&self,
		provider: IdentityProvider,
		credential: &Credential,
	) -> Result<SubjectIdentity> {
		self.get(provider).extract(credential).await
	}
}
