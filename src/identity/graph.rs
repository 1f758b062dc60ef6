//! Social provider A extractor.
//!
//! Access tokens from this provider are opaque, so the subject is resolved by asking the
//! provider's identity API (`GET {endpoint}/me?fields=id,name`) on behalf of the bearer.

// self
use crate::{
	_prelude::*,
	http::{self, ReqwestHttpClient},
	identity::{CredentialError, ExtractFuture, IdentityProvider, SubjectExtractor, SubjectIdentity},
	obs::{ResolveSpan, Stage},
	secret::Credential,
};

/// Default identity API base URL.
pub const DEFAULT_GRAPH_ENDPOINT: &str = "https://graph.facebook.com";

const PROVIDER: IdentityProvider = IdentityProvider::SocialA;
const DISPLAY_NAME_PREFIX: &str = "Facebook: ";

#[derive(Debug, Deserialize)]
struct MeResponse {
	#[serde(default)]
	id: Option<String>,
	#[serde(default)]
	name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
	error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
	message: String,
	#[serde(rename = "type", default)]
	kind: Option<String>,
}

/// Resolves the bearer of an opaque access token through the provider's identity API.
#[derive(Clone, Debug)]
pub struct GraphLookupExtractor {
	http_client: ReqwestHttpClient,
	endpoint: Url,
}
impl GraphLookupExtractor {
	/// Creates an extractor that calls the identity API rooted at `endpoint`.
	pub fn new(http_client: ReqwestHttpClient, endpoint: Url) -> Self {
		Self { http_client, endpoint }
	}

	/// Returns the identity API base URL.
	pub fn endpoint(&self) -> &Url {
		&self.endpoint
	}

	fn me_url(&self) -> Url {
		let mut url = self.endpoint.clone();

		if let Ok(mut segments) = url.path_segments_mut() {
			segments.pop_if_empty().push("me");
		}

		url.query_pairs_mut().clear().append_pair("fields", "id,name");

		url
	}

	async fn lookup(&self, credential: &Credential) -> Result<SubjectIdentity> {
		let stage = Stage::Identity;
		let url = self.me_url();
		let request = self.http_client.get(url.clone()).bearer_auth(credential.expose());
		let response = ResolveSpan::call(stage, url.as_str())
			.instrument(self.http_client.send(stage, request))
			.await?;
		let status = response.status();
		let body = http::read_body(stage, response).await?;

		if !status.is_success() {
			return Err(CredentialError::Rejected {
				provider: PROVIDER,
				status: Some(status.as_u16()),
				reason: rejection_reason(body),
			}
			.into());
		}

		let me = serde_json::from_str::<MeResponse>(&body).map_err(|e| {
			Error::from(CredentialError::Rejected {
				provider: PROVIDER,
				status: Some(status.as_u16()),
				reason: format!("identity response could not be parsed: {e}"),
			})
		})?;
		let subject = me
			.id
			.filter(|id| !id.trim().is_empty())
			.ok_or(CredentialError::MissingSubject { provider: PROVIDER })?;
		let identity = SubjectIdentity::new(subject);

		Ok(match me.name {
			Some(name) => identity.with_display_name(format!("{DISPLAY_NAME_PREFIX}{name}")),
			None => identity,
		})
	}
}
impl SubjectExtractor for GraphLookupExtractor {
	fn provider(&self) -> IdentityProvider {
		PROVIDER
	}

	fn extract<'a>(&'a self, credential: &'a Credential) -> ExtractFuture<'a> {
		Box::pin(self.lookup(credential))
	}
}

fn rejection_reason(body: String) -> String {
	match serde_json::from_str::<ErrorEnvelope>(&body) {
		Ok(ErrorEnvelope { error: ErrorBody { message, kind: Some(kind) } }) =>
			format!("{kind}: {message}"),
		Ok(ErrorEnvelope { error: ErrorBody { message, kind: None } }) => message,
		Err(_) => http::preview(body),
	}
}
