//! Resolves one token reference and prints the outcome.
//!
//! With `TOKEN_STORE_LOCATOR` set, the reference is read from the environment and resolved
//! against the real store using the host's managed identity:
//!
//! - `TOKEN_STORE_LOCATOR`: resource locator
//! - `TOKEN_STORE_ACCESS_MODE`: `service-identity` (default) or `user-delegated`
//! - `TOKEN_STORE_PROVIDER`: identity provider for user delegation
//! - `TOKEN_STORE_CREDENTIAL`: raw user credential for user delegation
//!
//! Without it, a local mock store walks through the create-then-login path.

// std
use std::{env, sync::Arc};
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use tracing_subscriber::EnvFilter;
// self
use token_store_resolver::{
	error::{self, Error},
	reference::TokenReference,
	reqwest::Client,
	resolver::{ResolveOptions, Resolver},
	secret::{AccessToken, Credential},
	store::StaticCredentialProvider,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;
	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
		)
		.init();

	match env::var("TOKEN_STORE_LOCATOR") {
		Ok(locator) => resolve_from_env(locator).await,
		Err(_) => resolve_against_mock().await,
	}
}

async fn resolve_from_env(locator: String) -> Result<()> {
	let mode = env::var("TOKEN_STORE_ACCESS_MODE").unwrap_or_else(|_| "service-identity".into());
	let provider = env::var("TOKEN_STORE_PROVIDER").ok();
	let credential = env::var("TOKEN_STORE_CREDENTIAL").ok().map(Credential::new);
	let reference = TokenReference::parse(locator, &mode, provider.as_deref())?;
	let resolver =
		Resolver::builder().default_timeout(std::time::Duration::from_secs(30)).build()?;

	report(resolver.resolve_token(&reference, credential.as_ref()).await);

	Ok(())
}

async fn resolve_against_mock() -> Result<()> {
	let server = MockServer::start_async().await;
	let token_path = "/services/dropbox/tokens/shared";
	let _missing = server
		.mock_async(|when, then| {
			when.method(GET).path(token_path);
			then.status(404);
		})
		.await;
	let _create = server
		.mock_async(|when, then| {
			when.method(PUT).path(token_path).json_body(serde_json::json!({ "displayName": "shared" }));
			then.status(201).header("content-type", "application/json").body("{\"name\":\"shared\"}");
		})
		.await;
	let resolver = Resolver::builder()
		.http_client(
			Client::builder()
				.danger_accept_invalid_certs(true)
				.danger_accept_invalid_hostnames(true)
				.build()?,
		)
		.credential_provider(Arc::new(StaticCredentialProvider::new("demo-store-bearer")))
		.build()?;
	let reference = TokenReference::service_identity(server.url(token_path));

	report(resolver.resolve_token(&reference, None).await);

	// A second store where the end user has already logged in.
	let logged_in = MockServer::start_async().await;
	let _authenticated = logged_in
		.mock_async(|when, then| {
			when.method(GET).path(token_path);
			then.status(200).header("content-type", "application/json").body(
				"{\"name\":\"shared\",\"value\":{\"accessToken\":\"demo-access\",\"expiresInSeconds\":3600}}",
			);
		})
		.await;
	let reference = TokenReference::service_identity(logged_in.url(token_path));

	report(resolver.resolve_token_with(&reference, None, ResolveOptions::default()).await);

	Ok(())
}

fn report(result: error::Result<AccessToken>) {
	match result {
		Ok(token) => println!("Resolved access token: {token} ({} bytes).", token.expose().len()),
		Err(e) => print_error(&e),
	}
}

fn print_error(e: &Error) {
	println!("Resolution failed [{} during {}]: {e}", e.kind(), e.stage());
}
