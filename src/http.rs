//! Transport primitives shared by the token store client and the identity lookups.
//!
//! Every outbound call runs through a [`CallGuard`], which races the request against the
//! caller's [`CancellationToken`] and the per-resolution deadline. When either fires, the
//! in-flight request future is dropped (aborting the connection) and the call yields
//! [`Error::Canceled`] tagged with the stage that was running.

// std
use std::ops::Deref;
// crates.io
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
// self
use crate::{
	_prelude::*,
	error::{CancelCause, TransportError},
	obs::Stage,
};

const BODY_PREVIEW_LIMIT: usize = 256;

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
#[derive(Clone, Debug, Default)]
pub struct ReqwestHttpClient(pub ReqwestClient);
impl ReqwestHttpClient {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	/// Sends `request`, attributing network failures to `stage`.
	pub(crate) async fn send(
		&self,
		stage: Stage,
		request: reqwest::RequestBuilder,
	) -> Result<reqwest::Response> {
		request.send().await.map_err(|e| TransportError::network(stage, e).into())
	}
}
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

/// Reads a response body as text, attributing failures to `stage`.
pub(crate) async fn read_body(stage: Stage, response: reqwest::Response) -> Result<String> {
	response.text().await.map_err(|e| TransportError::network(stage, e).into())
}

/// Cancellation and deadline state for one resolution.
///
/// The deadline is fixed when the guard is created, so it bounds the whole chain of calls
/// rather than each call separately.
#[derive(Clone, Debug, Default)]
pub struct CallGuard {
	cancel: Option<CancellationToken>,
	deadline: Option<Instant>,
}
impl CallGuard {
	/// Guard that never cancels.
	pub fn unbounded() -> Self {
		Self::default()
	}

	/// Creates a guard from an optional cancellation token and an optional timeout, starting the
	/// timeout clock now.
	pub fn new(cancel: Option<CancellationToken>, timeout: Option<std::time::Duration>) -> Self {
		Self { cancel, deadline: timeout.map(|timeout| Instant::now() + timeout) }
	}

	/// Returns `true` if the caller already asked to cancel.
	pub fn is_canceled(&self) -> bool {
		self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
	}

	/// Runs `fut` unless the cancellation token fires or the deadline elapses first.
	pub async fn run<F, T>(&self, stage: Stage, fut: F) -> Result<T>
	where
		F: Future<Output = Result<T>>,
	{
		let canceled = async {
			match self.cancel.as_ref() {
				Some(token) => token.cancelled().await,
				None => std::future::pending().await,
			}
		};
		let bounded = async {
			match self.deadline {
				Some(deadline) => match tokio::time::timeout_at(deadline, fut).await {
					Ok(result) => result,
					Err(_) => Err(Error::Canceled { stage, cause: CancelCause::DeadlineElapsed }),
				},
				None => fut.await,
			}
		};

		tokio::select! {
			biased;
			_ = canceled => Err(Error::Canceled { stage, cause: CancelCause::Requested }),
			result = bounded => result,
		}
	}
}

/// Truncates a remote body so it can be quoted in error messages.
pub(crate) fn preview(body: String) -> String {
	if body.chars().count() <= BODY_PREVIEW_LIMIT {
		return body;
	}

	let mut buf = String::new();

	for (idx, ch) in body.chars().enumerate() {
		if idx >= BODY_PREVIEW_LIMIT {
			buf.push('…');

			break;
		}
		buf.push(ch);
	}

	buf
}
