//! Token resolution: local cache, shared record, distributed lock, and degraded serving.
//!
//! [`Broker::get_token`] walks the following ladder and stops at the first rung that yields a
//! token:
//!
//! 1. A fresh local cache entry.
//! 2. A usable shared record (non-empty, unexpired, not being refreshed), adopted into the
//!    cache with the record's own expiry.
//! 3. The refresh lock: the winner fetches, saves, and caches; losers poll the store until the
//!    winner's token appears or the poll budget runs out.
//!
//! A store read failure skips the ladder entirely and serves the cached token if it is still
//! inside the grace window (`expiry + grace_ttl - cache_ttl`).

// self
use crate::{
	_prelude::*,
	auth::{LocalToken, TokenSecret},
	broker::Broker,
	error::ConfigError,
	http::TokenHttpClient,
	obs::{self, Metric, OpKind, OpOutcome, OpSpan},
	store::{LockOutcome, LockRequest, StoreError},
};

impl<C> Broker<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// Returns a valid bearer token, refreshing it through the shared store when needed.
	///
	/// Concurrent calls on the same broker are serialized after the cache check, so at most one
	/// of them reaches the store at a time; the rest re-check the cache once it finishes. When the
	/// refresh lock is held by another broker the serialization ends and every waiting call polls
	/// the store within its own poll budget.
	/// Dropping the returned future while this broker holds the refresh lock does not abort the
	/// refresh: it runs to completion on a detached task so the lock is always saved or released.
	pub async fn get_token(&self) -> Result<TokenSecret> {
		const KIND: OpKind = OpKind::GetToken;

		let span = OpSpan::new(KIND, "get_token");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span.instrument(self.resolve_token()).await;

		match &result {
			Ok(_) => obs::record_op_outcome(KIND, OpOutcome::Success),
			Err(_) => {
				self.stats.record_failure();
				obs::record_op_outcome(KIND, OpOutcome::Failure);
			},
		}

		result
	}

	async fn resolve_token(&self) -> Result<TokenSecret> {
		if let Some(token) = self.fresh_cached() {
			return Ok(token);
		}

		let singleflight = self.refresh_guard.lock().await;

		if let Some(token) = self.fresh_cached() {
			return Ok(token);
		}

		let record = match self.store.get(&self.partition_key).await {
			Ok(record) => record,
			Err(err) => return self.serve_degraded(err),
		};
		let now = OffsetDateTime::now_utc();

		if let (Some(token), Some(expires_at)) = (record.usable_at(now), record.expires_at) {
			self.stats.record_store_hit();
			tracing::debug!(key = %self.partition_key, "adopted stored token");

			return Ok(self.adopt(token.clone(), expires_at));
		}

		let request = LockRequest::now().with_stale_after(self.config.lock_stale_after);

		if record.refreshing && request.permits(Some(&record)) {
			tracing::warn!(
				key = %self.partition_key,
				locked_at = ?record.locked_at,
				"taking over stale refresh lock"
			);
		}

		match self.store.try_lock(&self.partition_key, request).await? {
			LockOutcome::Acquired => self.refresh_detached().await,
			LockOutcome::Contended => {
				// Pollers share the wait instead of queueing behind each other.
				drop(singleflight);

				self.wait_for_refresh().await
			},
		}
	}

	fn fresh_cached(&self) -> Option<TokenSecret> {
		let now = OffsetDateTime::now_utc();
		let token = self
			.cache
			.lock()
			.as_ref()
			.filter(|entry| entry.is_fresh_at(now))
			.map(|entry| entry.token.clone())?;

		self.stats.record_cache_hit();

		Some(token)
	}

	fn adopt(&self, token: TokenSecret, expires_at: OffsetDateTime) -> TokenSecret {
		*self.cache.lock() = Some(LocalToken::new(token.clone(), expires_at));

		token
	}

	fn serve_degraded(&self, err: StoreError) -> Result<TokenSecret> {
		let now = OffsetDateTime::now_utc();
		let extension = self.config.grace_extension();
		let fallback = self
			.cache
			.lock()
			.as_ref()
			.filter(|entry| entry.is_within_grace_at(now, extension))
			.map(|entry| entry.token.clone());

		match fallback {
			Some(token) => {
				self.stats.record_fallback();
				tracing::warn!(
					key = %self.partition_key,
					error = %err,
					"store read failed, serving cached token within grace window"
				);

				Ok(token)
			},
			None => {
				tracing::error!(key = %self.partition_key, error = %err, "store read failed");

				Err(err.into())
			},
		}
	}

	async fn wait_for_refresh(&self) -> Result<TokenSecret> {
		self.stats.record_lock_wait();
		tracing::debug!(
			key = %self.partition_key,
			attempts = self.config.poll_attempts,
			"refresh lock held elsewhere, polling store"
		);

		for attempt in 1..=self.config.poll_attempts {
			tokio::time::sleep(self.config.poll_interval.unsigned_abs()).await;

			let record = match self.store.get(&self.partition_key).await {
				Ok(record) => record,
				Err(err) => {
					tracing::debug!(attempt, error = %err, "store poll failed");

					continue;
				},
			};

			if let (Some(token), Some(expires_at)) =
				(record.usable_at(OffsetDateTime::now_utc()), record.expires_at)
			{
				self.stats.record_store_hit();

				return Ok(self.adopt(token.clone(), expires_at));
			}
		}

		Err(Error::LockTimeout {
			attempts: self.config.poll_attempts,
			waited: self.config.poll_budget(),
		})
	}

	async fn refresh_detached(&self) -> Result<TokenSecret> {
		let broker = self.clone();

		match tokio::spawn(async move { broker.refresh_locked().await }).await {
			Ok(result) => result,
			Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
			Err(_) => Err(Error::RefreshAborted),
		}
	}

	async fn release_lock(&self) {
		if let Err(err) = self.store.unlock(&self.partition_key).await {
			tracing::error!(
				key = %self.partition_key,
				error = %err,
				"failed to release refresh lock"
			);
		}
	}

	async fn refresh_locked(&self) -> Result<TokenSecret> {
		const KIND: OpKind = OpKind::Refresh;

		let span = OpSpan::new(KIND, "refresh_locked");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span
			.instrument(async {
				let token = match self.fetcher.fetch().await {
					Ok(token) => token,
					Err(err) => {
						self.release_lock().await;
						tracing::error!(
							key = %self.partition_key,
							error = %err,
							"token fetch failed"
						);

						return Err(err);
					},
				};
				let Some(expires_at) = OffsetDateTime::now_utc().checked_add(self.config.cache_ttl)
				else {
					self.release_lock().await;

					return Err(ConfigError::DurationOutOfRange { field: "cache_ttl" }.into());
				};

				if let Err(err) = self.store.save(&self.partition_key, &token, expires_at).await {
					tracing::warn!(
						key = %self.partition_key,
						error = %err,
						"failed to persist refreshed token, serving it anyway"
					);

					if let Err(err) = self.store.unlock(&self.partition_key).await {
						tracing::warn!(
							key = %self.partition_key,
							error = %err,
							"failed to release refresh lock after save failure"
						);
					}
				}

				self.adopt(token.clone(), expires_at);
				self.stats.record_refresh();
				obs::emit_logged(self.metrics_sink.as_ref(), Metric::refresh()).await;
				tracing::info!(key = %self.partition_key, %expires_at, "token refreshed");

				Ok(token)
			})
			.await;

		obs::record_op_outcome(
			KIND,
			if result.is_ok() { OpOutcome::Success } else { OpOutcome::Failure },
		);

		result
	}
}
