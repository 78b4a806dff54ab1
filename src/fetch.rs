//! Credential exchange against the authorization endpoint with one-shot rotation.
//!
//! [`TokenFetcher::fetch`] submits the current [`CredentialSet`] as a form. A 401 rotates the set
//! and retries once; a second 401 within the same call is terminal, as is any other non-2xx
//! status. The rotated state persists on the fetcher, so the next call starts from the
//! credentials that last worked.

// self
use crate::{
	_prelude::*,
	auth::{CredentialSet, TokenSecret},
	error::ProtocolError,
	http::{TokenHttpClient, TokenHttpResponse},
};

#[derive(Deserialize)]
struct AccessTokenResponse {
	access_token: String,
}

/// Exchanges a credential set for a bearer token over a [`TokenHttpClient`].
pub struct TokenFetcher<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// Token endpoint receiving the form POST.
	pub endpoint: Url,
	http_client: Arc<C>,
	credentials: Mutex<CredentialSet>,
}
impl<C> TokenFetcher<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// Creates a fetcher for `endpoint` using the provided transport and credentials.
	pub fn new(endpoint: Url, http_client: impl Into<Arc<C>>, credentials: CredentialSet) -> Self {
		Self { endpoint, http_client: http_client.into(), credentials: Mutex::new(credentials) }
	}

	/// Returns a copy of the credential set, including its rotation marker.
	pub fn credentials(&self) -> CredentialSet {
		self.credentials.lock().clone()
	}

	/// Performs the exchange, rotating credentials at most once.
	pub async fn fetch(&self) -> Result<TokenSecret> {
		let mut rotated = false;

		loop {
			let form = self.credentials.lock().form();
			let response = self.http_client.post_form(&self.endpoint, &form).await?;

			if response.is_unauthorized() {
				if rotated {
					return Err(Error::Unauthorized {
						reason: "rotated credentials were rejected with HTTP 401".into(),
					});
				}

				tracing::warn!(
					endpoint = %self.endpoint,
					"token endpoint returned 401, rotating credentials"
				);
				self.credentials.lock().rotate();

				rotated = true;

				continue;
			}
			if !response.is_success() {
				return Err(ProtocolError::UnexpectedStatus {
					status: response.status,
					retry_after: response.retry_after,
				}
				.into());
			}

			return parse_access_token(&response);
		}
	}
}
impl<C> Debug for TokenFetcher<C>
where
	C: ?Sized + TokenHttpClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenFetcher")
			.field("endpoint", &self.endpoint.as_str())
			.field("credentials", &*self.credentials.lock())
			.finish()
	}
}

fn parse_access_token(response: &TokenHttpResponse) -> Result<TokenSecret> {
	let mut de = serde_json::Deserializer::from_slice(&response.body);
	let parsed: AccessTokenResponse = serde_path_to_error::deserialize(&mut de)
		.map_err(|source| ProtocolError::TokenResponseParse { source, status: response.status })?;

	if parsed.access_token.is_empty() {
		return Err(ProtocolError::MissingAccessToken.into());
	}

	Ok(TokenSecret::new(parsed.access_token))
}
