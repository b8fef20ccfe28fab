//! Observability helpers: flow spans, optional flow counters, and subscriber installation.
//!
//! # Feature Flags
//!
//! - Spans named `sunat_relay.flow` carry the `flow` (upstream call) and `stage` (call site)
//!   fields and are always emitted.
//! - Enable `metrics` to increment the `sunat_relay_flow_total` counter for every
//!   attempt/cache hit/success/failure, labeled by `flow` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// crates.io
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
// self
use crate::_prelude::*;

/// Filter applied when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_LOG_FILTER: &str = "sunat_relay=info,tower_http=info";

/// Upstream calls observed by the relay.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// SUNAT client-credentials token exchange.
	SunatToken,
	/// Google service-account token exchange used by the Firestore store.
	ServiceAccountToken,
	/// SUNAT comprobante validation call.
	ComprobanteValidation,
	/// Feedback document insert.
	FeedbackInsert,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::SunatToken => "sunat_token",
			FlowKind::ServiceAccountToken => "service_account_token",
			FlowKind::ComprobanteValidation => "comprobante_validation",
			FlowKind::FeedbackInsert => "feedback_insert",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a relay helper.
	Attempt,
	/// Answered from the token cache without network access.
	CacheHit,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::CacheHit => "cache_hit",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Installs the global `fmt` subscriber filtered by `RUST_LOG`.
///
/// Returns `false` when a global subscriber was already installed.
pub fn init_tracing() -> bool {
	let filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

	tracing_subscriber::registry()
		.with(filter)
		.with(tracing_subscriber::fmt::layer())
		.try_init()
		.is_ok()
}
