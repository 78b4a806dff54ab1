//! The token broker: local cache, store-coordinated refresh, and the request entrypoint.

mod get_token;
mod handler;
mod stats;

pub use handler::*;
pub use stats::BrokerStats;

// self
use crate::{
	_prelude::*,
	auth::{CredentialSet, LocalToken, PartitionKey},
	config::BrokerConfig,
	fetch::TokenFetcher,
	http::TokenHttpClient,
	obs::{MetricsSink, NoopMetricsSink},
	store::TokenStore,
};
#[cfg(feature = "reqwest")]
use crate::{config::BrokerSettings, http::ReqwestHttpClient};

#[cfg(feature = "reqwest")]
/// Broker specialized for the crate's default reqwest transport.
pub type ReqwestBroker = Broker<ReqwestHttpClient>;

/// Hands out one shared bearer token to every caller of [`Broker::get_token`].
///
/// A broker owns the in-memory copy of the token, the fetcher that talks to the authorization
/// endpoint, the shared [`TokenStore`] handle, and the metrics sink. Cloning a broker yields
/// another handle to the same cache and single-flight guard; constructing a second broker over
/// the same store models a second instance in the fleet, coordinated only through the store's
/// refresh lock.
pub struct Broker<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// Shared record backend.
	pub store: Arc<dyn TokenStore>,
	/// Key of the shared record.
	pub partition_key: PartitionKey,
	/// Credential exchange with the authorization endpoint.
	pub fetcher: Arc<TokenFetcher<C>>,
	/// Destination for `TokenRefreshCount` and `BrokerLatencyMs`.
	pub metrics_sink: Arc<dyn MetricsSink>,
	/// Lock-free counters describing how tokens were served.
	pub stats: Arc<BrokerStats>,
	config: BrokerConfig,
	cache: Arc<Mutex<Option<LocalToken>>>,
	refresh_guard: Arc<AsyncMutex<()>>,
}
impl<C> Broker<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// Creates a broker that reuses the caller-provided transport.
	pub fn with_http_client(
		store: Arc<dyn TokenStore>,
		partition_key: PartitionKey,
		endpoint: Url,
		credentials: CredentialSet,
		http_client: impl Into<Arc<C>>,
	) -> Self {
		Self {
			store,
			partition_key,
			fetcher: Arc::new(TokenFetcher::new(endpoint, http_client, credentials)),
			metrics_sink: Arc::new(NoopMetricsSink),
			stats: Default::default(),
			config: BrokerConfig::default(),
			cache: Default::default(),
			refresh_guard: Default::default(),
		}
	}

	/// Replaces the timing policy after validating it.
	pub fn with_config(mut self, config: BrokerConfig) -> Result<Self> {
		config.validate()?;

		self.config = config;

		Ok(self)
	}

	/// Replaces the metrics sink.
	pub fn with_metrics_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
		self.metrics_sink = sink;

		self
	}

	/// Active timing policy.
	pub fn config(&self) -> &BrokerConfig {
		&self.config
	}

	/// Returns a copy of the local cache entry, fresh or not.
	pub fn cached_token(&self) -> Option<LocalToken> {
		self.cache.lock().clone()
	}

	/// Returns a copy of the fetcher's credential set, including its rotation marker.
	pub fn credentials(&self) -> CredentialSet {
		self.fetcher.credentials()
	}

	/// Seeds or replaces the local cache entry.
	pub fn prime_cache(&self, entry: LocalToken) {
		*self.cache.lock() = Some(entry);
	}
}
#[cfg(feature = "reqwest")]
impl Broker<ReqwestHttpClient> {
	/// Creates a broker with its own redirect-free reqwest transport.
	pub fn new(
		store: Arc<dyn TokenStore>,
		partition_key: PartitionKey,
		endpoint: Url,
		credentials: CredentialSet,
	) -> Result<Self> {
		let http_client = ReqwestHttpClient::new()?;

		Ok(Self::with_http_client(store, partition_key, endpoint, credentials, http_client))
	}

	/// Creates a broker from deployment settings.
	pub fn from_settings(settings: BrokerSettings, store: Arc<dyn TokenStore>) -> Result<Self> {
		Self::new(store, settings.partition_key, settings.token_url, settings.credentials)?
			.with_config(settings.config)
	}
}
impl<C> Clone for Broker<C>
where
	C: ?Sized + TokenHttpClient,
{
	fn clone(&self) -> Self {
		Self {
			store: self.store.clone(),
			partition_key: self.partition_key.clone(),
			fetcher: self.fetcher.clone(),
			metrics_sink: self.metrics_sink.clone(),
			stats: self.stats.clone(),
			config: self.config,
			cache: self.cache.clone(),
			refresh_guard: self.refresh_guard.clone(),
		}
	}
}
impl<C> Debug for Broker<C>
where
	C: ?Sized + TokenHttpClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Broker")
			.field("partition_key", &self.partition_key)
			.field("fetcher", &self.fetcher)
			.field("config", &self.config)
			.field("cached", &self.cache.lock().is_some())
			.finish()
	}
}
