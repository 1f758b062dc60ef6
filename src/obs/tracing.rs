// self
use crate::{_prelude::*, locator::AccessMode, obs::Stage};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedResolve<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedResolve<F> = F;

/// A span builder used by the orchestrator and the outbound calls it makes.
#[derive(Clone, Debug)]
pub struct ResolveSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl ResolveSpan {
	/// Creates the top-level span for one resolution.
	pub fn new(mode: AccessMode) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("token_store_resolver.resolve", mode = mode.as_str());

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = mode;

			Self {}
		}
	}

	/// Creates a span for a single outbound call made during `stage`.
	pub fn call(stage: Stage, url: &str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span =
				tracing::debug_span!("token_store_resolver.call", stage = stage.as_str(), url);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (stage, url);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedResolve<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Emits a `warn` event describing a terminal resolution failure.
pub fn trace_failure(err: &Error) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(
			kind = err.kind().as_str(),
			stage = err.stage().as_str(),
			error = %err,
			"Token resolution failed."
		);
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = err;
	}
}

/// Emits an `info` event after a token record has been provisioned.
pub fn trace_record_created(token_url: &str, login_url: &str) {
	#[cfg(feature = "tracing")]
	{
		tracing::info!(token_url, login_url, "Token record created; waiting for the user to log in.");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (token_url, login_url);
	}
}

/// Emits a `debug` event with the HTTP status observed during `stage`.
pub fn trace_status(stage: Stage, status: u16) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(stage = stage.as_str(), status, "Token store responded.");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (stage, status);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn helpers_accept_any_feature_set() {
		let err = Error::Canceled { stage: Stage::Create, cause: crate::error::CancelCause::Requested };

		trace_failure(&err);
		trace_record_created("https://store/services/s/tokens/t", "https://store/services/s/tokens/t/login");
		trace_status(Stage::Query, 404);
	}

	#[tokio::test]
	async fn instrument_wraps_future() {
		let span = ResolveSpan::new(AccessMode::ServiceIdentity);
		let value = span.instrument(async { 42 }).await;

		assert_eq!(value, 42);

		let call = ResolveSpan::call(Stage::Query, "https://store.example/services/svc/tokens/t");

		assert_eq!(call.instrument(async { "done" }).await, "done");
	}
}
