//! Storage contract for the shared token record and built-in store implementations.
//!
//! A [`TokenStore`] holds one [`TokenRecord`] per [`PartitionKey`] and exposes exactly four
//! operations. `try_lock` is the distributed mutex: it is a conditional write that reports
//! contention as [`LockOutcome::Contended`] and reserves [`StoreError`] for genuine failures,
//! so brokers can tell "someone else is refreshing" apart from "the store is down".

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	auth::{PartitionKey, TokenRecord, TokenSecret},
};

/// Boxed future returned by every [`TokenStore`] operation.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Shared record backend used to coordinate brokers across processes.
///
/// Each operation must be atomic with respect to the others for the same key: readers observe
/// either the previous or the new record, never a partial write.
pub trait TokenStore
where
	Self: Send + Sync,
{
	/// Reads the record; a missing record yields [`TokenRecord::default`].
	fn get<'a>(&'a self, key: &'a PartitionKey) -> StoreFuture<'a, TokenRecord>;

	/// Sets the refresh flag only if it is clear (or stale per `request`).
	fn try_lock<'a>(
		&'a self,
		key: &'a PartitionKey,
		request: LockRequest,
	) -> StoreFuture<'a, LockOutcome>;

	/// Writes a new token and expiry, clearing the refresh flag.
	fn save<'a>(
		&'a self,
		key: &'a PartitionKey,
		token: &'a TokenSecret,
		expires_at: OffsetDateTime,
	) -> StoreFuture<'a, ()>;

	/// Clears the refresh flag unconditionally.
	fn unlock<'a>(&'a self, key: &'a PartitionKey) -> StoreFuture<'a, ()>;
}

/// Parameters for a [`TokenStore::try_lock`] attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LockRequest {
	/// Instant stamped into `LockedAt` when the lock is acquired.
	pub requested_at: OffsetDateTime,
	/// Age after which an existing lock may be taken over; `None` never takes over.
	pub stale_after: Option<Duration>,
}
impl LockRequest {
	/// Creates a request stamped with the current clock and no takeover.
	pub fn now() -> Self {
		Self { requested_at: OffsetDateTime::now_utc(), stale_after: None }
	}

	/// Allows taking over locks older than `stale_after`.
	pub fn with_stale_after(mut self, stale_after: Option<Duration>) -> Self {
		self.stale_after = stale_after;

		self
	}

	/// Evaluates the conditional-write predicate against the current record.
	pub fn permits(&self, current: Option<&TokenRecord>) -> bool {
		match current {
			None => true,
			Some(record) if !record.refreshing => true,
			Some(record) => self
				.stale_after
				.is_some_and(|bound| record.lock_is_stale(self.requested_at, bound)),
		}
	}
}

/// Result of a [`TokenStore::try_lock`] attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockOutcome {
	/// The caller now owns the refresh flag.
	Acquired,
	/// Another broker owns the refresh flag.
	Contended,
}
impl LockOutcome {
	/// Returns `true` for [`LockOutcome::Acquired`].
	pub fn is_acquired(self) -> bool {
		matches!(self, Self::Acquired)
	}
}

/// Error type produced by [`TokenStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

#[cfg(test)]
mod tests {
	// std
	use std::error::Error as StdError;
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn store_error_converts_into_broker_error_with_source() {
		let store_error = StoreError::Backend { message: "database unreachable".into() };
		let broker_error: Error = store_error.clone().into();

		assert!(matches!(broker_error, Error::Storage(_)));
		assert!(broker_error.to_string().contains("database unreachable"));

		let source = StdError::source(&broker_error)
			.expect("Broker error should expose the original store error as its source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}

	#[test]
	fn lock_request_respects_flag_and_staleness() {
		let now = macros::datetime!(2025-01-01 00:10 UTC);
		let request = LockRequest { requested_at: now, stale_after: None };
		let mut held = TokenRecord::default();

		held.lock(now - Duration::minutes(5));

		assert!(request.permits(None));
		assert!(request.permits(Some(&TokenRecord::default())));
		assert!(!request.permits(Some(&held)));
		assert!(request.with_stale_after(Some(Duration::minutes(1))).permits(Some(&held)));
		assert!(!request.with_stale_after(Some(Duration::minutes(10))).permits(Some(&held)));
	}

	#[test]
	fn lock_outcome_can_be_serialized() {
		let payload = serde_json::to_string(&LockOutcome::Contended)
			.expect("LockOutcome should serialize to JSON.");

		assert_eq!(payload, "\"Contended\"");
		assert!(!LockOutcome::Contended.is_acquired());
		assert!(LockOutcome::Acquired.is_acquired());
	}
}
