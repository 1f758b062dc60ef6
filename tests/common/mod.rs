//! Fixtures shared by the integration tests.

#![allow(dead_code)]

// std
use std::sync::Arc;
// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use httpmock::MockServer;
use serde_json::Value;
// self
use token_store_resolver::{
	reqwest::Client,
	resolver::{Resolver, ResolverBuilder},
	secret::Credential,
	store::StaticCredentialProvider,
	url::Url,
};

/// Bearer every mock store expects.
pub const STORE_BEARER: &str = "store-bearer";

/// Builds a reqwest client that accepts the self-signed certificates produced by `httpmock`.
pub fn test_reqwest_client() -> Client {
	Client::builder()
		.danger_accept_invalid_certs(true)
		.danger_accept_invalid_hostnames(true)
		.build()
		.expect("Failed to build insecure Reqwest client for tests.")
}

/// Resolver builder wired to the test client and a static store credential.
pub fn test_resolver_builder() -> ResolverBuilder {
	Resolver::builder()
		.http_client(test_reqwest_client())
		.credential_provider(Arc::new(StaticCredentialProvider::new(STORE_BEARER)))
}

/// Resolver whose SocialA lookups go to `graph`.
pub fn build_test_resolver(graph: Option<&MockServer>) -> Resolver {
	let builder = match graph {
		Some(server) => test_resolver_builder().graph_endpoint(
			Url::parse(&server.base_url()).expect("Mock identity endpoint should parse."),
		),
		None => test_resolver_builder(),
	};

	builder.build().expect("Test resolver should build.")
}

/// Service-level locator on `server`.
pub fn service_locator(server: &MockServer, service: &str) -> String {
	server.url(format!("/services/{service}"))
}

/// Full token locator on `server`.
pub fn token_locator(server: &MockServer, service: &str, token: &str) -> String {
	server.url(format!("/services/{service}/tokens/{token}"))
}

/// Encodes `claims` as an unsigned compact token with a placeholder signature.
pub fn unsigned_token(claims: Value) -> Credential {
	let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
	let payload = URL_SAFE_NO_PAD.encode(claims.to_string());

	Credential::new(format!("{header}.{payload}.c2lnbmF0dXJl"))
}
