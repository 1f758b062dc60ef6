//! End-to-end token resolution.
//!
//! [`Resolver::resolve_token`] validates the locator, derives the per-user token path when the
//! reference is user-delegated, and runs the token store's get-or-create protocol. Each call is
//! independent; the resolver holds configuration only, so one instance can serve any number of
//! concurrent resolutions.

// crates.io
use reqwest::header::HeaderMap;
use tokio_util::sync::CancellationToken;
// self
use crate::{
	_prelude::*,
	error::ConfigError,
	http::{CallGuard, ReqwestHttpClient},
	identity::{IdentityExtractors, graph::DEFAULT_GRAPH_ENDPOINT},
	locator::{AccessMode, LocatorPolicy},
	obs::{self, Outcome, ResolveSpan, Stage},
	path::TokenTarget,
	reference::TokenReference,
	secret::{AccessToken, Credential},
	store::{
		CachedCredentialProvider, ManagedIdentityProvider, StoreCredentialProvider, TokenStoreClient,
	},
};

/// Per-call cancellation and deadline settings.
#[derive(Clone, Debug, Default)]
pub struct ResolveOptions {
	/// Aborts the in-flight call when fired.
	pub cancel: Option<CancellationToken>,
	/// Bounds the whole resolution; overrides the resolver's default timeout.
	pub timeout: Option<std::time::Duration>,
}
impl ResolveOptions {
	/// Attaches a cancellation token.
	pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
		self.cancel = Some(token);

		self
	}

	/// Bounds the resolution by `timeout`.
	pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
		self.timeout = Some(timeout);

		self
	}
}

/// Resolves [`TokenReference`]s into access tokens.
#[derive(Clone, Debug)]
pub struct Resolver {
	policy: LocatorPolicy,
	extractors: IdentityExtractors,
	store: TokenStoreClient,
	default_timeout: Option<std::time::Duration>,
}
impl Resolver {
	/// Starts configuring a resolver.
	pub fn builder() -> ResolverBuilder {
		ResolverBuilder::default()
	}

	/// Resolves `reference`, using `credential` to key the per-user token in user-delegated mode.
	pub async fn resolve_token(
		&self,
		reference: &TokenReference,
		credential: Option<&Credential>,
	) -> Result<AccessToken> {
		self.resolve_token_with(reference, credential, ResolveOptions::default()).await
	}

	/// Same as [`Resolver::resolve_token`], bounded by `options`.
	pub async fn resolve_token_with(
		&self,
		reference: &TokenReference,
		credential: Option<&Credential>,
		options: ResolveOptions,
	) -> Result<AccessToken> {
		self.resolve_instrumented(reference, CredentialSource::Given(credential), options).await
	}

	/// Resolves `reference`, reading the user credential from the inbound request headers.
	///
	/// The header is chosen by the reference's identity provider; see
	/// [`IdentityProvider::credential_header`](crate::identity::IdentityProvider::credential_header).
	pub async fn resolve_token_from_headers(
		&self,
		reference: &TokenReference,
		headers: &HeaderMap,
		options: ResolveOptions,
	) -> Result<AccessToken> {
		self.resolve_instrumented(reference, CredentialSource::Headers(headers), options).await
	}

	async fn resolve_instrumented(
		&self,
		reference: &TokenReference,
		source: CredentialSource<'_>,
		options: ResolveOptions,
	) -> Result<AccessToken> {
		let mode = reference.access_mode;
		let span = ResolveSpan::new(mode);
		let guard = CallGuard::new(options.cancel, options.timeout.or(self.default_timeout));

		span.instrument(async {
			obs::record_resolution(mode, Outcome::Attempt, None);

			observe(mode, self.run(reference, source, &guard).await)
		})
		.await
	}

	async fn run(
		&self,
		reference: &TokenReference,
		source: CredentialSource<'_>,
		guard: &CallGuard,
	) -> Result<AccessToken> {
		let provider = reference.required_provider()?;
		let locator = self.policy.validate(&reference.resource_locator, reference.access_mode)?;
		let identity = match provider {
			Some(provider) => {
				let from_headers;
				let credential = match source {
					CredentialSource::Given(credential) => credential,
					CredentialSource::Headers(headers) => {
						from_headers = Credential::from_headers(provider, headers)?;

						Some(&from_headers)
					},
				};
				let credential = credential
					.filter(|credential| !credential.expose().trim().is_empty())
					.ok_or(ConfigError::MissingCredential { provider })?;

				Some(guard.run(Stage::Identity, self.extractors.extract(provider, credential)).await?)
			},
			None => None,
		};
		let target = TokenTarget::resolve(&locator, identity.as_ref())?;

		self.store.get_or_create_guarded(&target, &locator.store_root(), guard).await
	}
}

// Where the user credential comes from; header lookup waits until the provider is known.
#[derive(Clone, Copy)]
enum CredentialSource<'a> {
	Given(Option<&'a Credential>),
	Headers(&'a HeaderMap),
}

fn observe(mode: AccessMode, result: Result<AccessToken>) -> Result<AccessToken> {
	match &result {
		Ok(_) => obs::record_resolution(mode, Outcome::Success, None),
		Err(e) => {
			obs::trace_failure(e);
			obs::record_resolution(mode, Outcome::Failure, Some(e.kind()));
		},
	}

	result
}

/// Builder for [`Resolver`] values.
#[derive(Default)]
pub struct ResolverBuilder {
	http_client: Option<ReqwestClient>,
	credentials: Option<Arc<dyn StoreCredentialProvider>>,
	graph_endpoint: Option<Url>,
	policy: LocatorPolicy,
	default_timeout: Option<std::time::Duration>,
	cache_store_credentials: bool,
}
impl ResolverBuilder {
	/// Uses `client` for every outbound call.
	pub fn http_client(mut self, client: ReqwestClient) -> Self {
		self.http_client = Some(client);

		self
	}

	/// Overrides how store-scoped bearer credentials are obtained.
	///
	/// Defaults to [`ManagedIdentityProvider::from_env`].
	pub fn credential_provider(mut self, provider: Arc<dyn StoreCredentialProvider>) -> Self {
		self.credentials = Some(provider);

		self
	}

	/// Overrides the SocialA identity API base URL (must use HTTPS).
	pub fn graph_endpoint(mut self, url: Url) -> Self {
		self.graph_endpoint = Some(url);

		self
	}

	/// Rejects locators whose store host does not end with `suffix`.
	pub fn required_host_suffix(mut self, suffix: impl Into<String>) -> Self {
		self.policy = self.policy.with_required_host_suffix(suffix);

		self
	}

	/// Bounds every resolution that does not set its own timeout.
	pub fn default_timeout(mut self, timeout: std::time::Duration) -> Self {
		self.default_timeout = Some(timeout);

		self
	}

	/// Reuses store credentials until shortly before they expire.
	pub fn cache_store_credentials(mut self, enabled: bool) -> Self {
		self.cache_store_credentials = enabled;

		self
	}

	/// Validates the configuration and builds the resolver.
	pub fn build(self) -> Result<Resolver, ConfigError> {
		let client = match self.http_client {
			Some(client) => client,
			None => ReqwestClient::builder().build()?,
		};
		let http_client = ReqwestHttpClient::with_client(client);
		let graph_endpoint = match self.graph_endpoint {
			Some(url) => url,
			None => Url::parse(DEFAULT_GRAPH_ENDPOINT).map_err(|source| {
				ConfigError::InvalidEndpoint { endpoint: "identity lookup", source }
			})?,
		};

		if graph_endpoint.scheme() != "https" {
			return Err(ConfigError::InsecureEndpoint {
				endpoint: "identity lookup",
				url: graph_endpoint.to_string(),
			});
		}

		let credentials: Arc<dyn StoreCredentialProvider> = match self.credentials {
			Some(provider) => provider,
			None => Arc::new(ManagedIdentityProvider::from_env(http_client.clone())?),
		};
		let credentials: Arc<dyn StoreCredentialProvider> = if self.cache_store_credentials {
			Arc::new(CachedCredentialProvider::new(credentials))
		} else {
			credentials
		};

		Ok(Resolver {
			policy: self.policy,
			extractors: IdentityExtractors::new(http_client.clone(), graph_endpoint),
			store: TokenStoreClient::new(http_client, credentials),
			default_timeout: self.default_timeout,
		})
	}
}
impl Debug for ResolverBuilder {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ResolverBuilder")
			.field("credential_provider_set", &self.credentials.is_some())
			.field("graph_endpoint", &self.graph_endpoint)
			.field("policy", &self.policy)
			.field("default_timeout", &self.default_timeout)
			.field("cache_store_credentials", &self.cache_store_credentials)
			.finish()
	}
}
