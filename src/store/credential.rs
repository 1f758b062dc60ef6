//! Store-scoped bearer credentials obtained with the caller's own workload identity.

// self
use crate::{
	_prelude::*,
	error::{BoxError, ConfigError},
	http::{self, ReqwestHttpClient},
	secret::TokenSecret,
};

/// Instance metadata token endpoint used when no app-hosting endpoint is advertised.
pub const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

const APP_SERVICE_API_VERSION: &str = "2019-08-01";
const IMDS_API_VERSION: &str = "2018-02-01";

/// Boxed future returned by [`StoreCredentialProvider::acquire`].
pub type CredentialFuture<'a> =
	Pin<Box<dyn Future<Output = Result<StoreCredential, CredentialSourceError>> + 'a + Send>>;

/// Source of bearer credentials scoped to a token store.
pub trait StoreCredentialProvider
where
	Self: Send + Sync,
{
	/// Obtains a bearer credential for `resource` (the store root URL).
	fn acquire<'a>(&'a self, resource: &'a str) -> CredentialFuture<'a>;
}

/// Bearer credential for a token store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreCredential {
	/// Bearer value sent to the store.
	pub secret: TokenSecret,
	/// Expiry reported by the issuer, when known.
	pub expires_at: Option<OffsetDateTime>,
}
impl StoreCredential {
	/// Returns `true` if the credential is still usable `skew` from `now`.
	pub fn is_fresh_at(&self, now: OffsetDateTime, skew: Duration) -> bool {
		self.expires_at.is_some_and(|expires_at| expires_at - skew > now)
	}
}

/// Failures raised while obtaining a store-scoped credential.
#[derive(Debug, ThisError)]
pub enum CredentialSourceError {
	/// The identity endpoint could not be reached.
	#[error("Managed identity endpoint could not be reached.")]
	Transport {
		/// Underlying transport failure.
		#[source]
		source: BoxError,
	},
	/// The identity endpoint refused to issue a credential.
	#[error("Managed identity endpoint returned status {status}: {body}")]
	Rejected {
		/// HTTP status returned by the endpoint.
		status: u16,
		/// Preview of the response body.
		body: String,
	},
	/// The identity endpoint returned an unreadable body.
	#[error("Managed identity endpoint returned malformed JSON.")]
	Malformed {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
}

/// Provider that always returns the same credential; useful for local development and tests.
#[derive(Clone, Debug)]
pub struct StaticCredentialProvider(TokenSecret);
impl StaticCredentialProvider {
	/// Wraps a fixed bearer value.
	pub fn new(secret: impl Into<String>) -> Self {
		Self(TokenSecret::new(secret))
	}
}
impl StoreCredentialProvider for StaticCredentialProvider {
	fn acquire<'a>(&'a self, _resource: &'a str) -> CredentialFuture<'a> {
		let credential = StoreCredential { secret: self.0.clone(), expires_at: None };

		Box::pin(async move { Ok(credential) })
	}
}

/// Where the managed identity token endpoint lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ManagedIdentityEndpoint {
	/// App-hosting identity endpoint advertised through `IDENTITY_ENDPOINT`/`IDENTITY_HEADER`.
	AppService {
		/// Token endpoint.
		endpoint: Url,
		/// Value for the `X-IDENTITY-HEADER` request header.
		header: TokenSecret,
	},
	/// Link-local instance metadata service.
	InstanceMetadata {
		/// Token endpoint.
		endpoint: Url,
	},
}
impl ManagedIdentityEndpoint {
	/// Returns the instance metadata endpoint.
	pub fn instance_metadata() -> Result<Self, ConfigError> {
		Ok(Self::InstanceMetadata { endpoint: parse_endpoint(IMDS_ENDPOINT)? })
	}
}

/// Reads store-scoped credentials from the hosting environment's managed identity.
#[derive(Clone, Debug)]
pub struct ManagedIdentityProvider {
	http_client: ReqwestHttpClient,
	endpoint: ManagedIdentityEndpoint,
	client_id: Option<String>,
}
impl ManagedIdentityProvider {
	/// Creates a provider for an explicit endpoint.
	pub fn new(http_client: ReqwestHttpClient, endpoint: ManagedIdentityEndpoint) -> Self {
		Self { http_client, endpoint, client_id: None }
	}

	/// Detects the endpoint from the process environment.
	pub fn from_env(http_client: ReqwestHttpClient) -> Result<Self, ConfigError> {
		Self::from_vars(http_client, |name| std::env::var(name).ok())
	}

	/// Detects the endpoint from `var`, which looks up environment-style variables.
	///
	/// `IDENTITY_ENDPOINT` + `IDENTITY_HEADER` select the app-hosting endpoint; otherwise the
	/// instance metadata service is used. `AZURE_CLIENT_ID` selects a user-assigned identity.
	pub fn from_vars(
		http_client: ReqwestHttpClient,
		var: impl Fn(&str) -> Option<String>,
	) -> Result<Self, ConfigError> {
		let endpoint = match (var("IDENTITY_ENDPOINT"), var("IDENTITY_HEADER")) {
			(Some(endpoint), Some(header)) => ManagedIdentityEndpoint::AppService {
				endpoint: parse_endpoint(&endpoint)?,
				header: TokenSecret::new(header),
			},
			_ => ManagedIdentityEndpoint::instance_metadata()?,
		};
		let provider = Self::new(http_client, endpoint);

		Ok(match var("AZURE_CLIENT_ID").filter(|id| !id.is_empty()) {
			Some(client_id) => provider.with_client_id(client_id),
			None => provider,
		})
	}

	/// Requests credentials for a user-assigned identity.
	pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
		self.client_id = Some(client_id.into());

		self
	}

	/// Returns the configured endpoint.
	pub fn endpoint(&self) -> &ManagedIdentityEndpoint {
		&self.endpoint
	}

	fn request(&self, resource: &str) -> reqwest::RequestBuilder {
		let (url, api_version) = match &self.endpoint {
			ManagedIdentityEndpoint::AppService { endpoint, .. } =>
				(endpoint, APP_SERVICE_API_VERSION),
			ManagedIdentityEndpoint::InstanceMetadata { endpoint } =>
				(endpoint, IMDS_API_VERSION),
		};
		let mut query = vec![("api-version", api_version), ("resource", resource)];

		if let Some(client_id) = self.client_id.as_deref() {
			query.push(("client_id", client_id));
		}

		let request = self.http_client.get(url.clone()).query(&query);

		match &self.endpoint {
			ManagedIdentityEndpoint::AppService { header, .. } =>
				request.header("X-IDENTITY-HEADER", header.expose()),
			ManagedIdentityEndpoint::InstanceMetadata { .. } => request.header("Metadata", "true"),
		}
	}

	async fn fetch(&self, resource: &str) -> Result<StoreCredential, CredentialSourceError> {
		let transport = |e: ReqwestError| CredentialSourceError::Transport { source: Box::new(e) };
		let response = self.request(resource).send().await.map_err(transport)?;
		let status = response.status();
		let body = response.text().await.map_err(transport)?;

		if !status.is_success() {
			return Err(CredentialSourceError::Rejected {
				status: status.as_u16(),
				body: http::preview(body),
			});
		}

		let mut de = serde_json::Deserializer::from_str(&body);
		let token: IdentityTokenResponse = serde_path_to_error::deserialize(&mut de)
			.map_err(|source| CredentialSourceError::Malformed { source })?;

		Ok(StoreCredential {
			secret: TokenSecret::new(token.access_token),
			expires_at: token.expires_on.as_ref().and_then(parse_expires_on),
		})
	}
}
impl StoreCredentialProvider for ManagedIdentityProvider {
	fn acquire<'a>(&'a self, resource: &'a str) -> CredentialFuture<'a> {
		Box::pin(self.fetch(resource))
	}
}

#[derive(Deserialize)]
struct IdentityTokenResponse {
	access_token: String,
	#[serde(default)]
	expires_on: Option<serde_json::Value>,
}

/// Reuses credentials per resource until shortly before they expire.
///
/// Credentials without a reported expiry are never cached.
pub struct CachedCredentialProvider {
	inner: Arc<dyn StoreCredentialProvider>,
	entries: RwLock<HashMap<String, StoreCredential>>,
	refresh_skew: Duration,
}
impl CachedCredentialProvider {
	const DEFAULT_REFRESH_SKEW: Duration = Duration::minutes(5);

	/// Wraps `inner` with the default five-minute refresh skew.
	pub fn new(inner: Arc<dyn StoreCredentialProvider>) -> Self {
		Self { inner, entries: Default::default(), refresh_skew: Self::DEFAULT_REFRESH_SKEW }
	}

	/// Overrides how long before expiry a cached credential is replaced.
	pub fn with_refresh_skew(mut self, skew: Duration) -> Self {
		self.refresh_skew = if skew.is_negative() { Duration::ZERO } else { skew };

		self
	}

	fn cached(&self, resource: &str, now: OffsetDateTime) -> Option<StoreCredential> {
		self.entries
			.read()
			.get(resource)
			.filter(|credential| credential.is_fresh_at(now, self.refresh_skew))
			.cloned()
	}

	async fn acquire_cached(&self, resource: &str) -> Result<StoreCredential, CredentialSourceError> {
		if let Some(credential) = self.cached(resource, OffsetDateTime::now_utc()) {
			return Ok(credential);
		}

		let credential = self.inner.acquire(resource).await?;

		if credential.is_fresh_at(OffsetDateTime::now_utc(), self.refresh_skew) {
			self.entries.write().insert(resource.to_owned(), credential.clone());
		}

		Ok(credential)
	}
}
impl StoreCredentialProvider for CachedCredentialProvider {
	fn acquire<'a>(&'a self, resource: &'a str) -> CredentialFuture<'a> {
		Box::pin(self.acquire_cached(resource))
	}
}
impl Debug for CachedCredentialProvider {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CachedCredentialProvider")
			.field("cached_resources", &self.entries.read().len())
			.field("refresh_skew", &self.refresh_skew)
			.finish()
	}
}

fn parse_endpoint(raw: &str) -> Result<Url, ConfigError> {
	Url::parse(raw)
		.map_err(|source| ConfigError::InvalidEndpoint { endpoint: "managed identity", source })
}

// Unix seconds, as a JSON number or a numeric string.
fn parse_expires_on(value: &serde_json::Value) -> Option<OffsetDateTime> {
	let secs = match value {
		serde_json::Value::Number(n) => n.as_i64()?,
		serde_json::Value::String(s) => s.trim().parse::<i64>().ok()?,
		_ => return None,
	};

	OffsetDateTime::from_unix_timestamp(secs).ok()
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// self
	use super::*;

	struct CountingProvider {
		calls: AtomicUsize,
		ttl: Option<Duration>,
	}
	impl StoreCredentialProvider for CountingProvider {
		fn acquire<'a>(&'a self, resource: &'a str) -> CredentialFuture<'a> {
			let n = self.calls.fetch_add(1, Ordering::SeqCst);
			let credential = StoreCredential {
				secret: TokenSecret::new(format!("{resource}#{n}")),
				expires_at: self.ttl.map(|ttl| OffsetDateTime::now_utc() + ttl),
			};

			Box::pin(async move { Ok(credential) })
		}
	}

	#[test]
	fn expires_on_accepts_numbers_and_strings() {
		assert_eq!(
			parse_expires_on(&serde_json::json!("1586984735")).map(|t| t.unix_timestamp()),
			Some(1_586_984_735)
		);
		assert_eq!(
			parse_expires_on(&serde_json::json!(1586984735)).map(|t| t.unix_timestamp()),
			Some(1_586_984_735)
		);
		assert_eq!(parse_expires_on(&serde_json::json!("04/16/2020 20:25:35 +00:00")), None);
	}

	#[test]
	fn env_detection_prefers_app_service_endpoint() {
		let vars = HashMap::from([
			("IDENTITY_ENDPOINT", "http://127.0.0.1:41741/msi/token/"),
			("IDENTITY_HEADER", "header-secret"),
			("AZURE_CLIENT_ID", "user-assigned"),
		]);
		let provider = ManagedIdentityProvider::from_vars(ReqwestHttpClient::default(), |name| {
			vars.get(name).map(|value| value.to_string())
		})
		.expect("App service variables should configure the provider.");

		assert!(matches!(provider.endpoint(), ManagedIdentityEndpoint::AppService { .. }));
		assert_eq!(provider.client_id.as_deref(), Some("user-assigned"));

		let fallback =
			ManagedIdentityProvider::from_vars(ReqwestHttpClient::default(), |_| None)
				.expect("Instance metadata should be the fallback.");

		assert!(matches!(fallback.endpoint(), ManagedIdentityEndpoint::InstanceMetadata { .. }));
	}

	#[tokio::test]
	async fn cache_reuses_fresh_credentials_per_resource() {
		let inner = Arc::new(CountingProvider { calls: AtomicUsize::new(0), ttl: Some(Duration::hours(1)) });
		let cache = CachedCredentialProvider::new(inner.clone());
		let first = cache.acquire("https://a.example").await.expect("First acquire should succeed.");
		let second = cache.acquire("https://a.example").await.expect("Second acquire should succeed.");
		let other = cache.acquire("https://b.example").await.expect("Other resource should succeed.");

		assert_eq!(first, second);
		assert_ne!(first.secret, other.secret);
		assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn cache_skips_credentials_without_usable_expiry() {
		let inner = Arc::new(CountingProvider { calls: AtomicUsize::new(0), ttl: None });
		let cache = CachedCredentialProvider::new(inner.clone());

		cache.acquire("https://a.example").await.expect("First acquire should succeed.");
		cache.acquire("https://a.example").await.expect("Second acquire should succeed.");

		assert_eq!(inner.calls.load(Ordering::SeqCst), 2);

		let short = Arc::new(CountingProvider {
			calls: AtomicUsize::new(0),
			ttl: Some(Duration::minutes(1)),
		});
		let cache = CachedCredentialProvider::new(short.clone());

		cache.acquire("https://a.example").await.expect("First acquire should succeed.");
		cache.acquire("https://a.example").await.expect("Second acquire should succeed.");

		assert_eq!(short.calls.load(Ordering::SeqCst), 2, "Expiry inside the skew is not cached.");
	}
}
