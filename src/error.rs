//! Broker-level error types shared across the broker, fetcher, and stores.

// self
use crate::_prelude::*;

/// Broker-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical broker error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Token endpoint answered with something other than a usable token.
	#[error(transparent)]
	Protocol(#[from] ProtocolError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// Another broker held the refresh lock for the whole poll budget.
	#[error("Timed out waiting for another broker to refresh the token after {attempts} polls.")]
	LockTimeout {
		/// Number of store polls performed.
		attempts: u32,
		/// Total time spent waiting.
		waited: Duration,
	},
	/// The detached refresh task stopped before reporting back, usually at runtime shutdown.
	#[error("Token refresh task was cancelled before it completed.")]
	RefreshAborted,
	/// Token endpoint rejected the credentials, including the rotated set.
	#[error("Token endpoint rejected the credentials: {reason}.")]
	Unauthorized {
		/// Broker-supplied reason string.
		reason: String,
	},
}

/// Configuration and validation failures raised by the broker.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Token endpoint is not a valid URL.
	#[error("Token endpoint URL is invalid.")]
	InvalidEndpoint {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Partition key failed validation.
	#[error("Partition key is invalid.")]
	InvalidPartitionKey(#[from] crate::auth::IdentifierError),
	/// A required environment variable is missing or empty.
	#[error("Environment variable `{name}` is not set.")]
	MissingVariable {
		/// Variable name.
		name: &'static str,
	},
	/// An environment variable holds a value that cannot be parsed.
	#[error("Environment variable `{name}` has an invalid value: {value}.")]
	InvalidVariable {
		/// Variable name.
		name: &'static str,
		/// Raw value that failed to parse.
		value: String,
	},
	/// Grace window is shorter than the cache window.
	#[error("The grace TTL ({grace:?}) must not be shorter than the cache TTL ({cache:?}).")]
	GraceShorterThanCache {
		/// Configured cache TTL.
		cache: Duration,
		/// Configured grace TTL.
		grace: Duration,
	},
	/// A duration that must be positive is zero or negative.
	#[error("The {field} duration must be positive.")]
	NonPositiveDuration {
		/// Offending configuration field.
		field: &'static str,
	},
	/// Lock contention would never be polled.
	#[error("The poll budget must allow at least one attempt.")]
	EmptyPollBudget,
	/// A duration is too large to be added to the current time.
	#[error("The {field} duration exceeds the supported range.")]
	DurationOutOfRange {
		/// Offending configuration field.
		field: &'static str,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Token endpoint responses that cannot be turned into a token.
#[derive(Debug, ThisError)]
pub enum ProtocolError {
	/// Provider returned a non-success status other than 401.
	#[error("Token endpoint returned HTTP {status}.")]
	UnexpectedStatus {
		/// HTTP status code.
		status: u16,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Token endpoint responded with malformed JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	TokenResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code.
		status: u16,
	},
	/// Token endpoint returned an empty `access_token`.
	#[error("Token endpoint response is missing access_token.")]
	MissingAccessToken,
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the token endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the token endpoint.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn lock_timeout_reports_attempts() {
		let err = Error::LockTimeout { attempts: 10, waited: Duration::milliseconds(500) };

		assert!(err.to_string().contains("10 polls"));
		assert!(err.to_string().contains("Timed out"));
	}

	#[test]
	fn protocol_error_is_transparent() {
		let err: Error = ProtocolError::UnexpectedStatus { status: 503, retry_after: None }.into();

		assert_eq!(err.to_string(), "Token endpoint returned HTTP 503.");
	}
}
