//! Observability helpers for broker operations.
//!
//! - Spans named `token_broker.op` carry the `op` (operation) and `stage` (call site) fields.
//! - Enable the `metrics` feature to increment the `token_broker_op_total` counter for every
//!   attempt/success/failure, labeled by `op` + `outcome`, the `token_broker_event_total`
//!   counter for every [`BrokerEvent`], and to use [`FacadeMetricsSink`].
//! - [`MetricsSink`] is the delivery boundary for the `TokenRefreshCount` and `BrokerLatencyMs`
//!   observations; delivery failures are logged and never reach callers.

mod metrics;
mod sink;
mod tracing;

pub use self::{metrics::*, sink::*, tracing::*};

// self
use crate::_prelude::*;

/// Broker operations observed by spans and counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
	/// [`Broker::get_token`](crate::broker::Broker::get_token).
	GetToken,
	/// Lock-holder path: fetch, save, cache update.
	Refresh,
	/// [`Broker::handle`](crate::broker::Broker::handle).
	Handle,
}
impl OpKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpKind::GetToken => "get_token",
			OpKind::Refresh => "refresh",
			OpKind::Handle => "handle",
		}
	}
}
impl Display for OpKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpOutcome {
	/// Entry to a broker operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl OpOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpOutcome::Attempt => "attempt",
			OpOutcome::Success => "success",
			OpOutcome::Failure => "failure",
		}
	}
}
impl Display for OpOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
