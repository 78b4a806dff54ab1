//! Thread-safe in-memory [`TokenStore`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	auth::{PartitionKey, TokenRecord, TokenSecret},
	store::{LockOutcome, LockRequest, StoreError, StoreFuture, TokenStore},
};

type StoreMap = Arc<RwLock<HashMap<PartitionKey, TokenRecord>>>;

/// Thread-safe storage backend that keeps records in-process.
///
/// Clones share the same map, so several brokers built from clones of one store coordinate
/// exactly like brokers sharing a remote table.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(StoreMap);
impl MemoryStore {
	/// Returns a copy of the stored record, if any.
	pub fn snapshot(&self, key: &PartitionKey) -> Option<TokenRecord> {
		self.0.read().get(key).cloned()
	}

	/// Replaces the stored record wholesale; handy for seeding fixtures.
	pub fn insert(&self, key: PartitionKey, record: TokenRecord) {
		self.0.write().insert(key, record);
	}

	fn try_lock_now(map: StoreMap, key: PartitionKey, request: LockRequest) -> LockOutcome {
		let mut guard = map.write();

		if !request.permits(guard.get(&key)) {
			return LockOutcome::Contended;
		}

		guard.entry(key).or_default().lock(request.requested_at);

		LockOutcome::Acquired
	}

	fn save_now(map: StoreMap, key: PartitionKey, token: TokenSecret, expires_at: OffsetDateTime) {
		map.write().insert(key, TokenRecord::issued(token, expires_at));
	}

	fn unlock_now(map: StoreMap, key: PartitionKey) {
		if let Some(record) = map.write().get_mut(&key) {
			record.unlock();
		}
	}
}
impl TokenStore for MemoryStore {
	fn get<'a>(&'a self, key: &'a PartitionKey) -> StoreFuture<'a, TokenRecord> {
		let map = self.0.clone();

		Box::pin(async move { Ok(map.read().get(key).cloned().unwrap_or_default()) })
	}

	fn try_lock<'a>(
		&'a self,
		key: &'a PartitionKey,
		request: LockRequest,
	) -> StoreFuture<'a, LockOutcome> {
		let map = self.0.clone();
		let key = key.to_owned();

		Box::pin(async move { Ok(Self::try_lock_now(map, key, request)) })
	}

	fn save<'a>(
		&'a self,
		key: &'a PartitionKey,
		token: &'a TokenSecret,
		expires_at: OffsetDateTime,
	) -> StoreFuture<'a, ()> {
		let map = self.0.clone();
		let key = key.to_owned();
		let token = token.to_owned();

		Box::pin(async move {
			Self::save_now(map, key, token, expires_at);

			Ok(())
		})
	}

	fn unlock<'a>(&'a self, key: &'a PartitionKey) -> StoreFuture<'a, ()> {
		let map = self.0.clone();
		let key = key.to_owned();

		Box::pin(async move {
			Self::unlock_now(map, key);

			Ok(())
		})
	}
}
