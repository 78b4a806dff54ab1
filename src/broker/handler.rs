//! Transport-agnostic request entrypoint wrapping [`Broker::get_token`].

// std
use std::time::Instant;
// self
use crate::{
	_prelude::*,
	broker::Broker,
	http::TokenHttpClient,
	obs::{self, Metric, OpKind, OpOutcome, OpSpan},
};

#[derive(Serialize)]
struct TokenBody<'a> {
	token: &'a str,
}

/// Response produced by [`Broker::handle`], ready to be written by any HTTP server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandlerResponse {
	/// HTTP status code.
	pub status: u16,
	/// `Content-Type` header value, present only alongside a body.
	pub content_type: Option<&'static str>,
	/// Serialized JSON body; failures carry none.
	pub body: Option<String>,
}
impl HandlerResponse {
	/// Content type of successful responses.
	pub const JSON: &'static str = "application/json";

	/// `200 OK` carrying `{"token":"<value>"}`.
	pub fn ok(body: String) -> Self {
		Self { status: 200, content_type: Some(Self::JSON), body: Some(body) }
	}

	/// Bare `500 Internal Server Error`.
	pub fn internal_error() -> Self {
		Self { status: 500, content_type: None, body: None }
	}

	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}
}

impl<C> Broker<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// Serves one inbound request.
	///
	/// The latency of the whole call is emitted as `BrokerLatencyMs` whatever the outcome. Errors
	/// are logged and collapse into [`HandlerResponse::internal_error`]; callers never learn which
	/// failure occurred.
	pub async fn handle(&self) -> HandlerResponse {
		const KIND: OpKind = OpKind::Handle;

		let span = OpSpan::new(KIND, "handle");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		span.instrument(async {
			let started = Instant::now();
			let result = self.get_token().await;
			let elapsed = Duration::try_from(started.elapsed()).unwrap_or(Duration::MAX);

			obs::emit_logged(self.metrics_sink.as_ref(), Metric::latency(elapsed)).await;

			let response = match result {
				Ok(token) => match serde_json::to_string(&TokenBody { token: token.expose() }) {
					Ok(body) => HandlerResponse::ok(body),
					Err(err) => {
						tracing::error!(error = %err, "failed to encode token response");

						HandlerResponse::internal_error()
					},
				},
				Err(err) => {
					tracing::error!(key = %self.partition_key, error = %err, "get token failed");

					HandlerResponse::internal_error()
				},
			};

			obs::record_op_outcome(
				KIND,
				if response.is_success() { OpOutcome::Success } else { OpOutcome::Failure },
			);

			response
		})
		.await
	}
}
