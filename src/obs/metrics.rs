// self
use crate::{error::ErrorKind, locator::AccessMode, obs::Outcome};

/// Records a resolution outcome via the global metrics recorder (when enabled).
///
/// `kind` is only meaningful for [`Outcome::Failure`]; other outcomes are labeled `none`.
pub fn record_resolution(mode: AccessMode, outcome: Outcome, kind: Option<ErrorKind>) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"token_store_resolver_resolution_total",
			"mode" => mode.as_str(),
			"outcome" => outcome.as_str(),
			"kind" => kind.map_or("none", ErrorKind::as_str)
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (mode, outcome, kind);
	}
}
