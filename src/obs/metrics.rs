//! Counters published through the global `metrics` recorder when the `metrics` feature is on.

// self
use crate::obs::{OpKind, OpOutcome};

/// How a broker call progressed; mirrors the counters kept by
/// [`BrokerStats`](crate::broker::BrokerStats).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BrokerEvent {
	/// Answered from the local cache.
	CacheHit,
	/// Adopted a token another broker stored.
	StoreHit,
	/// Fetched a new token while holding the refresh lock.
	Refresh,
	/// Served from the grace window during a store outage.
	Fallback,
	/// Started polling a lock held elsewhere.
	LockWait,
	/// Returned an error to the caller.
	Failure,
}
impl BrokerEvent {
	/// Returns the value of the `event` label.
	pub const fn as_str(self) -> &'static str {
		match self {
			BrokerEvent::CacheHit => "cache_hit",
			BrokerEvent::StoreHit => "store_hit",
			BrokerEvent::Refresh => "refresh",
			BrokerEvent::Fallback => "fallback",
			BrokerEvent::LockWait => "lock_wait",
			BrokerEvent::Failure => "failure",
		}
	}
}

/// Increments `token_broker_op_total`, labeled by `op` and `outcome`.
pub fn record_op_outcome(kind: OpKind, outcome: OpOutcome) {
	#[cfg(feature = "metrics")]
	metrics::counter!(
		"token_broker_op_total",
		"op" => kind.as_str(),
		"outcome" => outcome.as_str()
	)
	.increment(1);

	#[cfg(not(feature = "metrics"))]
	let _ = (kind, outcome);
}

/// Increments `token_broker_event_total`, labeled by `event`.
pub fn record_broker_event(event: BrokerEvent) {
	#[cfg(feature = "metrics")]
	metrics::counter!("token_broker_event_total", "event" => event.as_str()).increment(1);

	#[cfg(not(feature = "metrics"))]
	let _ = event;
}
