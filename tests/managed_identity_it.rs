mod common;

// std
use std::sync::Arc;
// crates.io
use httpmock::prelude::*;
use time::OffsetDateTime;
// self
use common::*;
use token_store_resolver::{
	error::{Error, ErrorKind},
	http::ReqwestHttpClient,
	obs::Stage,
	reference::TokenReference,
	secret::TokenSecret,
	store::{
		CredentialSourceError, ManagedIdentityEndpoint, ManagedIdentityProvider, StoreError,
		StoreCredentialProvider,
	},
	url::Url,
};

const IDENTITY_HEADER: &str = "identity-header-secret";

fn app_service_provider(identity: &MockServer) -> ManagedIdentityProvider {
	ManagedIdentityProvider::new(
		ReqwestHttpClient::with_client(test_reqwest_client()),
		ManagedIdentityEndpoint::AppService {
			endpoint: Url::parse(&identity.url("/msi/token"))
				.expect("Mock identity endpoint should parse."),
			header: TokenSecret::new(IDENTITY_HEADER),
		},
	)
}

fn expires_in_an_hour() -> String {
	(OffsetDateTime::now_utc().unix_timestamp() + 3600).to_string()
}

#[tokio::test]
async fn app_service_endpoint_issues_store_scoped_credential() {
	let identity = MockServer::start_async().await;
	let expires_on = expires_in_an_hour();
	let token = identity
		.mock_async(|when, then| {
			when.method(GET)
				.path("/msi/token")
				.query_param("api-version", "2019-08-01")
				.query_param("resource", "https://demo.tokenstore.azure.net")
				.query_param("client_id", "user-assigned")
				.header("x-identity-header", IDENTITY_HEADER);
			then.status(200).header("content-type", "application/json").body(format!(
				r#"{{"access_token":"store-scoped","expires_on":"{expires_on}","resource":"https://demo.tokenstore.azure.net","token_type":"Bearer"}}"#
			));
		})
		.await;
	let credential = app_service_provider(&identity)
		.with_client_id("user-assigned")
		.acquire("https://demo.tokenstore.azure.net")
		.await
		.expect("Identity endpoint should issue a credential.");

	assert_eq!(credential.secret.expose(), "store-scoped");
	assert_eq!(
		credential.expires_at.map(|t| t.unix_timestamp().to_string()),
		Some(expires_on)
	);

	token.assert_calls_async(1).await;
}

#[tokio::test]
async fn instance_metadata_endpoint_sends_metadata_header() {
	let identity = MockServer::start_async().await;
	let expires_on = expires_in_an_hour();
	let token = identity
		.mock_async(|when, then| {
			when.method(GET)
				.path("/metadata/identity/oauth2/token")
				.query_param("api-version", "2018-02-01")
				.query_param("resource", "https://demo.tokenstore.azure.net")
				.header("metadata", "true");
			then.status(200).header("content-type", "application/json").body(format!(
				r#"{{"access_token":"vm-scoped","expires_on":"{expires_on}","token_type":"Bearer"}}"#
			));
		})
		.await;
	let provider = ManagedIdentityProvider::new(
		ReqwestHttpClient::with_client(test_reqwest_client()),
		ManagedIdentityEndpoint::InstanceMetadata {
			endpoint: Url::parse(&identity.url("/metadata/identity/oauth2/token"))
				.expect("Mock metadata endpoint should parse."),
		},
	);
	let credential = provider
		.acquire("https://demo.tokenstore.azure.net")
		.await
		.expect("Metadata endpoint should issue a credential.");

	assert_eq!(credential.secret.expose(), "vm-scoped");

	token.assert_calls_async(1).await;
}

#[tokio::test]
async fn identity_endpoint_rejection_becomes_authentication_failure() {
	let identity = MockServer::start_async().await;
	let store = MockServer::start_async().await;
	let _token = identity
		.mock_async(|when, then| {
			when.method(GET).path("/msi/token");
			then.status(400).body(r#"{"error":"invalid_resource"}"#);
		})
		.await;
	let query = store
		.mock_async(|when, then| {
			when.method(GET);
			then.status(200);
		})
		.await;
	let resolver = test_resolver_builder()
		.credential_provider(Arc::new(app_service_provider(&identity)))
		.build()
		.expect("Resolver with managed identity should build.");
	let err = resolver
		.resolve_token(
			&TokenReference::service_identity(token_locator(&store, "dropbox", "shared")),
			None,
		)
		.await
		.expect_err("Store authentication failure must be terminal.");

	assert_eq!(err.kind(), ErrorKind::AuthenticationFailed);
	assert_eq!(err.stage(), Stage::StoreAuthentication);
	assert!(matches!(
		&err,
		Error::Store(StoreError::AuthenticationFailed {
			source: CredentialSourceError::Rejected { status: 400, .. },
			..
		})
	));

	query.assert_calls_async(0).await;
}

#[tokio::test]
async fn cached_store_credentials_are_reused_across_resolutions() {
	let identity = MockServer::start_async().await;
	let store = MockServer::start_async().await;
	let expires_on = expires_in_an_hour();
	let token = identity
		.mock_async(|when, then| {
			when.method(GET).path("/msi/token").query_param("resource", store.base_url());
			then.status(200)
				.header("content-type", "application/json")
				.body(format!(r#"{{"access_token":"store-scoped","expires_on":{expires_on}}}"#));
		})
		.await;
	let query = store
		.mock_async(|when, then| {
			when.method(GET)
				.path("/services/dropbox/tokens/shared")
				.header("authorization", "Bearer store-scoped");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"value":{"accessToken":"downstream"}}"#);
		})
		.await;
	let resolver = test_resolver_builder()
		.credential_provider(Arc::new(app_service_provider(&identity)))
		.cache_store_credentials(true)
		.build()
		.expect("Resolver with cached credentials should build.");
	let reference = TokenReference::service_identity(token_locator(&store, "dropbox", "shared"));

	for _ in 0..2 {
		let access = resolver
			.resolve_token(&reference, None)
			.await
			.expect("Logged-in record should resolve.");

		assert_eq!(access.expose(), "downstream");
	}

	token.assert_calls_async(1).await;
	query.assert_calls_async(2).await;
}
