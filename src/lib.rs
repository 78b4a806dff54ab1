//! Shared bearer-token broker: one cached access token for a fleet of concurrent callers,
//! single-flight refresh over a conditional-write store, grace-window fallback, and credential
//! rotation on authorization failure.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod broker;
pub mod config;
pub mod error;
pub mod fetch;
pub mod http;
pub mod obs;
pub mod store;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::{CredentialSet, PartitionKey, TokenRecord, TokenSecret},
		store::{LockOutcome, LockRequest, MemoryStore, StoreError, StoreFuture, TokenStore},
	};
	#[cfg(feature = "reqwest")]
	use crate::{broker::Broker, config::BrokerConfig, http::ReqwestHttpClient};

	#[cfg(feature = "reqwest")]
	/// Broker type alias used by reqwest-backed integration tests.
	pub type ReqwestTestBroker = Broker<ReqwestHttpClient>;

	/// Partition key shared by test brokers.
	pub fn test_partition_key() -> PartitionKey {
		PartitionKey::new("test-app#dev").expect("Test partition key should be valid.")
	}

	/// Password-grant credential set used across integration tests.
	pub fn test_credentials() -> CredentialSet {
		CredentialSet::password_grant("client-id", "client-secret", "api-user", "api-password")
	}

	/// Constructs a [`Broker`] that talks to `token_url` and shares `store`.
	#[cfg(feature = "reqwest")]
	pub fn build_test_broker(
		token_url: &str,
		store: Arc<dyn TokenStore>,
		config: BrokerConfig,
	) -> ReqwestTestBroker {
		let endpoint = Url::parse(token_url).expect("Test token endpoint should parse.");

		Broker::new(store, test_partition_key(), endpoint, test_credentials())
			.expect("Test broker should build.")
			.with_config(config)
			.expect("Test broker config should validate.")
	}

	/// Constructs a [`Broker`] backed by a fresh [`MemoryStore`] and returns both.
	#[cfg(feature = "reqwest")]
	pub fn build_memory_test_broker(
		token_url: &str,
		config: BrokerConfig,
	) -> (ReqwestTestBroker, Arc<MemoryStore>) {
		let backend = Arc::new(MemoryStore::default());
		let broker = build_test_broker(token_url, backend.clone(), config);

		(broker, backend)
	}

	/// Store wrapper that can be switched into a failing state to simulate outages.
	#[derive(Debug, Default)]
	pub struct FlakyStore {
		/// Healthy backend used while the store is up.
		pub inner: MemoryStore,
		down: Mutex<bool>,
		save_down: Mutex<bool>,
	}
	impl FlakyStore {
		/// Wraps an existing memory store.
		pub fn new(inner: MemoryStore) -> Self {
			Self { inner, down: Mutex::new(false), save_down: Mutex::new(false) }
		}

		/// Makes every operation fail (or succeed again).
		pub fn set_down(&self, down: bool) {
			*self.down.lock() = down;
		}

		/// Makes only [`TokenStore::save`] fail.
		pub fn set_save_down(&self, down: bool) {
			*self.save_down.lock() = down;
		}

		fn check(&self) -> Result<(), StoreError> {
			if *self.down.lock() {
				Err(StoreError::Backend { message: "store unreachable".into() })
			} else {
				Ok(())
			}
		}
	}
	impl TokenStore for FlakyStore {
		fn get<'a>(&'a self, key: &'a PartitionKey) -> StoreFuture<'a, TokenRecord> {
			Box::pin(async move {
				self.check()?;

				self.inner.get(key).await
			})
		}

		fn try_lock<'a>(
			&'a self,
			key: &'a PartitionKey,
			request: LockRequest,
		) -> StoreFuture<'a, LockOutcome> {
			Box::pin(async move {
				self.check()?;

				self.inner.try_lock(key, request).await
			})
		}

		fn save<'a>(
			&'a self,
			key: &'a PartitionKey,
			token: &'a TokenSecret,
			expires_at: OffsetDateTime,
		) -> StoreFuture<'a, ()> {
			Box::pin(async move {
				self.check()?;

				if *self.save_down.lock() {
					return Err(StoreError::Backend { message: "save rejected".into() });
				}

				self.inner.save(key, token, expires_at).await
			})
		}

		fn unlock<'a>(&'a self, key: &'a PartitionKey) -> StoreFuture<'a, ()> {
			Box::pin(async move {
				self.check()?;

				self.inner.unlock(key).await
			})
		}
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _, token_broker as _};
