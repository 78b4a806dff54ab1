//! Transport primitives for the credential exchange.
//!
//! The module exposes [`TokenHttpClient`], the broker's only dependency on an HTTP stack, and
//! [`TokenHttpResponse`], the status/body pair the fetcher classifies. Custom transports (test
//! doubles, signed proxies) implement the trait and are handed to
//! [`Broker::with_http_client`](crate::broker::Broker::with_http_client).

// std
#[cfg(feature = "reqwest")] use std::ops::Deref;
// crates.io
#[cfg(feature = "reqwest")]
use reqwest::{
	header::{HeaderMap, RETRY_AFTER},
	redirect::Policy,
};
#[cfg(feature = "reqwest")] use time::format_description::well_known::Rfc2822;
// self
use crate::{_prelude::*, error::TransportError};
#[cfg(feature = "reqwest")] use crate::error::ConfigError;

/// Boxed future returned by [`TokenHttpClient::post_form`].
pub type HttpFuture<'a> =
	Pin<Box<dyn Future<Output = Result<TokenHttpResponse, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP transports capable of submitting a form-encoded credential exchange.
///
/// Implementations must be `Send + Sync + 'static` so one transport can be shared by every
/// broker clone, and the returned future must own whatever it borrows from `self` for the
/// lifetime `'a`. Only transport failures are errors; every HTTP status, including 401 and
/// 5xx, is returned as a [`TokenHttpResponse`] for the fetcher to classify.
pub trait TokenHttpClient
where
	Self: 'static + Send + Sync,
{
	/// POSTs `form` as `application/x-www-form-urlencoded` to `endpoint`.
	fn post_form<'a>(&'a self, endpoint: &'a Url, form: &'a [(String, String)]) -> HttpFuture<'a>;
}

/// Status, retry hint, and raw body of a token endpoint response.
#[derive(Clone, Debug, Default)]
pub struct TokenHttpResponse {
	/// HTTP status code.
	pub status: u16,
	/// Retry-After hint expressed as a relative duration.
	pub retry_after: Option<Duration>,
	/// Raw response body.
	pub body: Vec<u8>,
}
impl TokenHttpResponse {
	/// Builds a response without a retry hint.
	pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
		Self { status, retry_after: None, body: body.into() }
	}

	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Returns `true` for HTTP 401.
	pub fn is_unauthorized(&self) -> bool {
		self.status == 401
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// Token requests should not follow redirects: the endpoint is expected to answer directly.
/// [`ReqwestHttpClient::new`] disables redirects; configure any custom client passed to
/// [`ReqwestHttpClient::with_client`] the same way.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Builds a client that never follows redirects.
	pub fn new() -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder().redirect(Policy::none()).build()?;

		Ok(Self(client))
	}

	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl TokenHttpClient for ReqwestHttpClient {
	fn post_form<'a>(&'a self, endpoint: &'a Url, form: &'a [(String, String)]) -> HttpFuture<'a> {
		Box::pin(async move {
			let response = self.0.post(endpoint.clone()).form(form).send().await?;
			let status = response.status().as_u16();
			let retry_after = parse_retry_after(response.headers());
			let body = response.bytes().await?.to_vec();

			Ok(TokenHttpResponse { status, retry_after, body })
		})
	}
}

#[cfg(feature = "reqwest")]
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let value = headers.get(RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<i64>() {
		return Some(Duration::seconds(secs));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}

#[cfg(all(test, feature = "reqwest"))]
mod tests {
	// crates.io
	use reqwest::header::HeaderValue;
	// self
	use super::*;

	#[test]
	fn retry_after_accepts_seconds() {
		let mut headers = HeaderMap::new();

		headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));

		assert_eq!(parse_retry_after(&headers), Some(Duration::seconds(7)));
	}

	#[test]
	fn retry_after_ignores_past_dates_and_garbage() {
		let mut headers = HeaderMap::new();

		headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));

		assert_eq!(parse_retry_after(&headers), None);

		headers.insert(RETRY_AFTER, HeaderValue::from_static("soon"));

		assert_eq!(parse_retry_after(&headers), None);
	}

	#[test]
	fn response_classification() {
		assert!(TokenHttpResponse::new(204, Vec::new()).is_success());
		assert!(TokenHttpResponse::new(401, Vec::new()).is_unauthorized());
		assert!(!TokenHttpResponse::new(302, Vec::new()).is_success());
	}
}
