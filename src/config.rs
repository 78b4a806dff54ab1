//! Broker tuning knobs and the environment-driven deployment settings.

// std
use std::env;
// self
use crate::{
	_prelude::*,
	auth::{CredentialSet, PartitionKey},
	error::ConfigError,
};

/// Timing policy for caching, degraded serving, and lock contention.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BrokerConfig {
	/// How long a freshly fetched token is served before the store is consulted again.
	pub cache_ttl: Duration,
	/// Total lifetime of a cached token while the store is unreachable.
	///
	/// The fallback window beyond expiry is `grace_ttl - cache_ttl`.
	pub grace_ttl: Duration,
	/// Number of store polls while another broker holds the refresh lock.
	pub poll_attempts: u32,
	/// Sleep between two polls.
	pub poll_interval: Duration,
	/// Age after which a held refresh lock may be taken over; `None` disables takeover.
	pub lock_stale_after: Option<Duration>,
}
impl BrokerConfig {
	/// Default cache validity.
	pub const DEFAULT_CACHE_TTL: Duration = Duration::minutes(5);
	/// Default total lifetime while degraded.
	pub const DEFAULT_GRACE_TTL: Duration = Duration::minutes(15);
	/// Default poll count under contention.
	pub const DEFAULT_POLL_ATTEMPTS: u32 = 10;
	/// Default poll spacing under contention.
	pub const DEFAULT_POLL_INTERVAL: Duration = Duration::milliseconds(50);
	/// Longest accepted value for any timing knob, the poll budget included.
	pub const MAX_DURATION: Duration = Duration::days(366);

	/// Overrides the cache TTL.
	pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
		self.cache_ttl = ttl;

		self
	}

	/// Overrides the grace TTL.
	pub fn with_grace_ttl(mut self, ttl: Duration) -> Self {
		self.grace_ttl = ttl;

		self
	}

	/// Overrides the contention poll budget.
	pub fn with_poll(mut self, attempts: u32, interval: Duration) -> Self {
		self.poll_attempts = attempts;
		self.poll_interval = interval;

		self
	}

	/// Enables takeover of refresh locks older than `bound`.
	pub fn with_lock_stale_after(mut self, bound: Option<Duration>) -> Self {
		self.lock_stale_after = bound;

		self
	}

	/// Extra time a stale token may be served past its expiry while the store is down.
	pub fn grace_extension(&self) -> Duration {
		self.grace_ttl.saturating_sub(self.cache_ttl)
	}

	/// Upper bound on the time spent polling a contended lock, saturating at [`Duration::MAX`].
	pub fn poll_budget(&self) -> Duration {
		i32::try_from(self.poll_attempts)
			.ok()
			.and_then(|attempts| self.poll_interval.checked_mul(attempts))
			.unwrap_or(Duration::MAX)
	}

	/// Checks the invariants the broker relies on.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if !self.cache_ttl.is_positive() {
			return Err(ConfigError::NonPositiveDuration { field: "cache_ttl" });
		}
		if self.grace_ttl < self.cache_ttl {
			return Err(ConfigError::GraceShorterThanCache {
				cache: self.cache_ttl,
				grace: self.grace_ttl,
			});
		}
		if self.poll_attempts == 0 {
			return Err(ConfigError::EmptyPollBudget);
		}
		if !self.poll_interval.is_positive() {
			return Err(ConfigError::NonPositiveDuration { field: "poll_interval" });
		}
		if self.lock_stale_after.is_some_and(|bound| !bound.is_positive()) {
			return Err(ConfigError::NonPositiveDuration { field: "lock_stale_after" });
		}

		let bounded = [
			("cache_ttl", self.cache_ttl),
			("grace_ttl", self.grace_ttl),
			("poll_budget", self.poll_budget()),
			("lock_stale_after", self.lock_stale_after.unwrap_or(Duration::ZERO)),
		];

		for (field, value) in bounded {
			if value > Self::MAX_DURATION {
				return Err(ConfigError::DurationOutOfRange { field });
			}
		}

		Ok(())
	}
}
impl Default for BrokerConfig {
	fn default() -> Self {
		Self {
			cache_ttl: Self::DEFAULT_CACHE_TTL,
			grace_ttl: Self::DEFAULT_GRACE_TTL,
			poll_attempts: Self::DEFAULT_POLL_ATTEMPTS,
			poll_interval: Self::DEFAULT_POLL_INTERVAL,
			lock_stale_after: None,
		}
	}
}

/// Everything a deployment needs to construct a broker, usually read from the environment.
#[derive(Clone, Debug)]
pub struct BrokerSettings {
	/// Shared table name; file-backed deployments use it as the file stem.
	pub table: String,
	/// Key of the shared record.
	pub partition_key: PartitionKey,
	/// Token endpoint.
	pub token_url: Url,
	/// Credentials submitted to the endpoint.
	pub credentials: CredentialSet,
	/// Timing policy.
	pub config: BrokerConfig,
}
impl BrokerSettings {
	/// Default table name when `AUTH_TABLE` is unset.
	pub const DEFAULT_TABLE: &'static str = "SfAuthToken";

	/// Reads settings from the process environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| env::var(name).ok())
	}

	/// Reads settings through `lookup`, treating empty values as unset.
	///
	/// Recognized variables: `AUTH_TABLE`, `APP_ID`, `ENV`, `SF_TOKEN_URL`, `SF_CLIENT_ID`,
	/// `SF_CLIENT_SECRET`, `SF_USERNAME`, `SF_PASSWORD`, the rotation alternates
	/// `SF_CLIENT_SECRET_ALT` and `SF_PASSWORD_ALT`, and the timing overrides
	/// `BROKER_CACHE_TTL_SECS`, `BROKER_GRACE_TTL_SECS`, `BROKER_POLL_ATTEMPTS`,
	/// `BROKER_POLL_INTERVAL_MS`, `BROKER_LOCK_STALE_SECS`.
	pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let get = |name: &str| lookup(name).filter(|value| !value.is_empty());
		let require = |name: &'static str| get(name).ok_or(ConfigError::MissingVariable { name });
		let table = get("AUTH_TABLE").unwrap_or_else(|| Self::DEFAULT_TABLE.into());
		let partition_key = PartitionKey::from_parts(&require("APP_ID")?, &require("ENV")?)?;
		let token_url = Url::parse(&require("SF_TOKEN_URL")?)
			.map_err(|source| ConfigError::InvalidEndpoint { source })?;
		let mut credentials = CredentialSet::password_grant(
			require("SF_CLIENT_ID")?,
			require("SF_CLIENT_SECRET")?,
			require("SF_USERNAME")?,
			require("SF_PASSWORD")?,
		);

		if let Some(alternate) = get("SF_CLIENT_SECRET_ALT") {
			credentials = credentials.with_alternate("client_secret", alternate);
		}
		if let Some(alternate) = get("SF_PASSWORD_ALT") {
			credentials = credentials.with_alternate("password", alternate);
		}

		let mut config = BrokerConfig::default();

		if let Some(secs) = parse_var::<i64>(&get, "BROKER_CACHE_TTL_SECS")? {
			config.cache_ttl = Duration::seconds(secs);
		}
		if let Some(secs) = parse_var::<i64>(&get, "BROKER_GRACE_TTL_SECS")? {
			config.grace_ttl = Duration::seconds(secs);
		}
		if let Some(attempts) = parse_var::<u32>(&get, "BROKER_POLL_ATTEMPTS")? {
			config.poll_attempts = attempts;
		}
		if let Some(millis) = parse_var::<i64>(&get, "BROKER_POLL_INTERVAL_MS")? {
			config.poll_interval = Duration::milliseconds(millis);
		}
		if let Some(secs) = parse_var::<i64>(&get, "BROKER_LOCK_STALE_SECS")? {
			config.lock_stale_after = Some(Duration::seconds(secs));
		}

		config.validate()?;

		Ok(Self { table, partition_key, token_url, credentials, config })
	}
}

fn parse_var<T>(
	get: &impl Fn(&str) -> Option<String>,
	name: &'static str,
) -> Result<Option<T>, ConfigError>
where
	T: FromStr,
{
	match get(name) {
		Some(value) => value
			.trim()
			.parse()
			.map(Some)
			.map_err(|_| ConfigError::InvalidVariable { name, value }),
		None => Ok(None),
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
		let map: HashMap<String, String> =
			pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect();

		move |name| map.get(name).cloned()
	}

	const BASE: &[(&str, &str)] = &[
		("APP_ID", "billing"),
		("ENV", "prod"),
		("SF_TOKEN_URL", "https://login.example.com/services/oauth2/token"),
		("SF_CLIENT_ID", "id"),
		("SF_CLIENT_SECRET", "secret"),
		("SF_USERNAME", "user"),
		("SF_PASSWORD", "pass"),
	];

	#[test]
	fn defaults_match_documented_policy() {
		let config = BrokerConfig::default();

		assert_eq!(config.cache_ttl, Duration::minutes(5));
		assert_eq!(config.grace_extension(), Duration::minutes(10));
		assert_eq!(config.poll_budget(), Duration::milliseconds(500));
		config.validate().expect("Default config should validate.");
	}

	#[test]
	fn validation_rejects_inconsistent_values() {
		let base = BrokerConfig::default();

		assert!(matches!(
			base.with_grace_ttl(Duration::minutes(1)).validate(),
			Err(ConfigError::GraceShorterThanCache { .. })
		));
		assert!(matches!(
			base.with_poll(0, Duration::milliseconds(10)).validate(),
			Err(ConfigError::EmptyPollBudget)
		));
		assert!(matches!(
			base.with_poll(3, Duration::ZERO).validate(),
			Err(ConfigError::NonPositiveDuration { field: "poll_interval" })
		));
		assert!(matches!(
			base.with_lock_stale_after(Some(Duration::ZERO)).validate(),
			Err(ConfigError::NonPositiveDuration { field: "lock_stale_after" })
		));
	}

	#[test]
	fn validation_rejects_unbounded_durations() {
		let base = BrokerConfig::default();

		assert!(matches!(
			base.with_poll(u32::MAX, Duration::seconds(i64::MAX)).validate(),
			Err(ConfigError::DurationOutOfRange { field: "poll_budget" })
		));
		assert!(matches!(
			base.with_lock_stale_after(Some(Duration::days(400))).validate(),
			Err(ConfigError::DurationOutOfRange { field: "lock_stale_after" })
		));
		assert_eq!(
			base.with_poll(u32::MAX, Duration::seconds(i64::MAX)).poll_budget(),
			Duration::MAX
		);

		let mut pairs = BASE.to_vec();

		pairs.push(("BROKER_CACHE_TTL_SECS", "9000000000000"));
		pairs.push(("BROKER_GRACE_TTL_SECS", "9000000000000"));

		let err = BrokerSettings::from_lookup(lookup(&pairs))
			.expect_err("A TTL past the calendar range should be rejected.");

		assert!(matches!(err, ConfigError::DurationOutOfRange { field: "cache_ttl" }));
	}

	#[test]
	fn settings_load_from_lookup() {
		let mut pairs = BASE.to_vec();

		pairs.push(("SF_CLIENT_SECRET_ALT", "secret-next"));
		pairs.push(("BROKER_POLL_ATTEMPTS", "4"));
		pairs.push(("BROKER_LOCK_STALE_SECS", "30"));

		let settings =
			BrokerSettings::from_lookup(lookup(&pairs)).expect("Settings should load from lookup.");

		assert_eq!(settings.table, BrokerSettings::DEFAULT_TABLE);
		assert_eq!(settings.partition_key.as_ref(), "billing#prod");
		assert_eq!(settings.credentials.field("grant_type"), Some("password"));
		assert_eq!(settings.config.poll_attempts, 4);
		assert_eq!(settings.config.lock_stale_after, Some(Duration::seconds(30)));

		let mut rotated = settings.credentials.clone();

		rotated.rotate();

		assert_eq!(rotated.field("client_secret"), Some("secret-next"));
	}

	#[test]
	fn settings_report_missing_and_invalid_variables() {
		let missing = BrokerSettings::from_lookup(lookup(&BASE[1..]))
			.expect_err("APP_ID should be required.");

		assert!(matches!(missing, ConfigError::MissingVariable { name: "APP_ID" }));

		let mut pairs = BASE.to_vec();

		pairs.push(("BROKER_POLL_INTERVAL_MS", "fast"));

		let invalid = BrokerSettings::from_lookup(lookup(&pairs))
			.expect_err("Non-numeric interval should be rejected.");

		assert!(matches!(
			invalid,
			ConfigError::InvalidVariable { name: "BROKER_POLL_INTERVAL_MS", .. }
		));
	}
}
