//! Delivery of the `TokenRefreshCount` and `BrokerLatencyMs` observations.

// self
use crate::_prelude::*;

/// Boxed future returned by [`MetricsSink::emit`].
pub type MetricsFuture<'a> = Pin<Box<dyn Future<Output = Result<(), MetricsError>> + 'a + Send>>;

/// Named observations emitted by the broker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MetricName {
	/// One per successful fetch from the token endpoint.
	TokenRefreshCount,
	/// Wall time of one handled request, in milliseconds.
	BrokerLatencyMs,
}
impl MetricName {
	/// Namespace the observations are published under.
	pub const NAMESPACE: &'static str = "TokenBroker";

	/// Returns the published metric name.
	pub const fn as_str(self) -> &'static str {
		match self {
			MetricName::TokenRefreshCount => "TokenRefreshCount",
			MetricName::BrokerLatencyMs => "BrokerLatencyMs",
		}
	}
}
impl Display for MetricName {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// One observation handed to a [`MetricsSink`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Metric {
	/// Metric name.
	pub name: MetricName,
	/// Observed value.
	pub value: f64,
}
impl Metric {
	/// A single refresh.
	pub fn refresh() -> Self {
		Self { name: MetricName::TokenRefreshCount, value: 1.0 }
	}

	/// Request latency.
	pub fn latency(elapsed: Duration) -> Self {
		Self { name: MetricName::BrokerLatencyMs, value: elapsed.whole_milliseconds() as f64 }
	}
}

/// Error reported by a [`MetricsSink`] that failed to deliver an observation.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum MetricsError {
	/// Backend rejected or dropped the observation.
	#[error("Metric delivery failed: {message}.")]
	Delivery {
		/// Human-readable error payload.
		message: String,
	},
}

/// Destination for broker observations (CloudWatch, StatsD, a test recorder, ...).
pub trait MetricsSink
where
	Self: Send + Sync,
{
	/// Delivers one observation.
	fn emit(&self, metric: Metric) -> MetricsFuture<'_>;
}

/// Sink that drops every observation.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMetricsSink;
impl MetricsSink for NoopMetricsSink {
	fn emit(&self, _metric: Metric) -> MetricsFuture<'_> {
		Box::pin(async { Ok(()) })
	}
}

/// Sink forwarding to the global `metrics` recorder.
///
/// `TokenRefreshCount` becomes the `token_broker_refresh_total` counter and `BrokerLatencyMs`
/// the `token_broker_latency_ms` histogram, both labeled with the namespace.
#[cfg(feature = "metrics")]
#[derive(Clone, Copy, Debug, Default)]
pub struct FacadeMetricsSink;
#[cfg(feature = "metrics")]
impl MetricsSink for FacadeMetricsSink {
	fn emit(&self, metric: Metric) -> MetricsFuture<'_> {
		match metric.name {
			MetricName::TokenRefreshCount => metrics::counter!(
				"token_broker_refresh_total",
				"namespace" => MetricName::NAMESPACE
			)
			.increment(metric.value as u64),
			MetricName::BrokerLatencyMs => metrics::histogram!(
				"token_broker_latency_ms",
				"namespace" => MetricName::NAMESPACE
			)
			.record(metric.value),
		}

		Box::pin(async { Ok(()) })
	}
}

/// Emits `metric`, logging instead of propagating delivery failures.
pub async fn emit_logged(sink: &dyn MetricsSink, metric: Metric) {
	if let Err(err) = sink.emit(metric).await {
		tracing::warn!(metric = %metric.name, error = %err, "metric delivery failed");
	}
}
