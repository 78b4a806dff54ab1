// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::obs::{self, BrokerEvent};

/// Thread-safe counters describing how [`Broker::get_token`](super::Broker::get_token) calls
/// were served.
#[derive(Debug, Default)]
pub struct BrokerStats {
	cache_hits: AtomicU64,
	store_hits: AtomicU64,
	refreshes: AtomicU64,
	fallbacks: AtomicU64,
	lock_waits: AtomicU64,
	failures: AtomicU64,
}
impl BrokerStats {
	/// Calls answered from the local cache.
	pub fn cache_hits(&self) -> u64 {
		self.cache_hits.load(Ordering::Relaxed)
	}

	/// Calls that adopted a token another broker had already stored.
	pub fn store_hits(&self) -> u64 {
		self.store_hits.load(Ordering::Relaxed)
	}

	/// Successful fetches performed by this broker while holding the lock.
	pub fn refreshes(&self) -> u64 {
		self.refreshes.load(Ordering::Relaxed)
	}

	/// Calls answered from the grace window because the store was unreachable.
	pub fn fallbacks(&self) -> u64 {
		self.fallbacks.load(Ordering::Relaxed)
	}

	/// Calls that found the lock held elsewhere and started polling.
	pub fn lock_waits(&self) -> u64 {
		self.lock_waits.load(Ordering::Relaxed)
	}

	/// Calls that returned an error.
	pub fn failures(&self) -> u64 {
		self.failures.load(Ordering::Relaxed)
	}

	pub(crate) fn record_cache_hit(&self) {
		self.cache_hits.fetch_add(1, Ordering::Relaxed);
		obs::record_broker_event(BrokerEvent::CacheHit);
	}

	pub(crate) fn record_store_hit(&self) {
		self.store_hits.fetch_add(1, Ordering::Relaxed);
		obs::record_broker_event(BrokerEvent::StoreHit);
	}

	pub(crate) fn record_refresh(&self) {
		self.refreshes.fetch_add(1, Ordering::Relaxed);
		obs::record_broker_event(BrokerEvent::Refresh);
	}

	pub(crate) fn record_fallback(&self) {
		self.fallbacks.fetch_add(1, Ordering::Relaxed);
		obs::record_broker_event(BrokerEvent::Fallback);
	}

	pub(crate) fn record_lock_wait(&self) {
		self.lock_waits.fetch_add(1, Ordering::Relaxed);
		obs::record_broker_event(BrokerEvent::LockWait);
	}

	pub(crate) fn record_failure(&self) {
		self.failures.fetch_add(1, Ordering::Relaxed);
		obs::record_broker_event(BrokerEvent::Failure);
	}
}
