//! Resolve token-store service handles into usable access tokens, deriving per-user token paths
//! from identity-provider credentials and provisioning missing token records on demand.
//!
//! ```no_run
//! use token_store_resolver::{reference::TokenReference, resolver::Resolver};
//!
//! # async fn run() -> token_store_resolver::error::Result<()> {
//! let resolver = Resolver::builder().build()?;
//! let reference = TokenReference::service_identity(
//! 	"https://demo.tokenstore.azure.net/services/dropbox/tokens/shared",
//! );
//! let token = resolver.resolve_token(&reference, None).await?;
//!
//! println!("resolved {token}");
//! # Ok(())
//! # }
//! ```

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod error;
pub mod http;
pub mod identity;
pub mod locator;
pub mod obs;
pub mod path;
pub mod reference;
pub mod resolver;
pub mod secret;
pub mod store;

mod _prelude {
	pub use std::{
		collections::HashMap,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::RwLock;
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError, StatusCode};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use reqwest;
pub use tokio_util::sync::CancellationToken;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _, tracing_subscriber as _};
