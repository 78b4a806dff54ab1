//! Shared token record persisted by stores and the per-broker local cache entry.

// self
use crate::{_prelude::*, auth::token::secret::TokenSecret};

/// Lifecycle status of a shared record at a given instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordStatus {
	/// No token has been stored yet.
	Empty,
	/// Some broker instance holds the refresh lock.
	Refreshing,
	/// The stored token is past its expiry instant.
	Expired,
	/// The stored token may be handed out.
	Active,
}

/// Authoritative record shared by every broker instance through a [`TokenStore`].
///
/// Field names match the store boundary (`Token`, `ExpiresAt`, `Refreshing`, `LockedAt`), with
/// instants encoded as integer epoch seconds. A missing record is equivalent to
/// [`TokenRecord::default`].
///
/// [`TokenStore`]: crate::store::TokenStore
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
	/// Bearer token; empty until the first successful refresh.
	#[serde(rename = "Token", default)]
	pub token: TokenSecret,
	/// Instant after which the token must not be used.
	#[serde(rename = "ExpiresAt", default, with = "time::serde::timestamp::option")]
	pub expires_at: Option<OffsetDateTime>,
	/// Distributed refresh lock flag.
	#[serde(rename = "Refreshing", default)]
	pub refreshing: bool,
	/// Instant the current refresh lock was taken, if known.
	#[serde(
		rename = "LockedAt",
		default,
		with = "time::serde::timestamp::option",
		skip_serializing_if = "Option::is_none"
	)]
	pub locked_at: Option<OffsetDateTime>,
}
impl TokenRecord {
	/// Builds an unlocked record holding `token` until `expires_at`.
	pub fn issued(token: TokenSecret, expires_at: OffsetDateTime) -> Self {
		Self { token, expires_at: Some(expires_at), refreshing: false, locked_at: None }
	}

	/// Computes the record status at `instant`.
	pub fn status_at(&self, instant: OffsetDateTime) -> RecordStatus {
		if self.refreshing {
			return RecordStatus::Refreshing;
		}
		if self.token.is_empty() {
			return RecordStatus::Empty;
		}

		match self.expires_at {
			Some(expires_at) if instant < expires_at => RecordStatus::Active,
			_ => RecordStatus::Expired,
		}
	}

	/// Returns the token when it is present, unexpired, and not being refreshed.
	pub fn usable_at(&self, instant: OffsetDateTime) -> Option<&TokenSecret> {
		matches!(self.status_at(instant), RecordStatus::Active).then_some(&self.token)
	}

	/// Returns `true` when the refresh lock is held and older than `stale_after`.
	///
	/// Locks without a `LockedAt` stamp are never considered stale.
	pub fn lock_is_stale(&self, instant: OffsetDateTime, stale_after: Duration) -> bool {
		self.refreshing
			&& self.locked_at.is_some_and(|locked_at| instant - locked_at >= stale_after)
	}

	/// Sets the refresh flag, stamping the acquisition instant.
	pub fn lock(&mut self, instant: OffsetDateTime) {
		self.refreshing = true;
		self.locked_at = Some(instant);
	}

	/// Clears the refresh flag.
	pub fn unlock(&mut self) {
		self.refreshing = false;
		self.locked_at = None;
	}
}
impl Debug for TokenRecord {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenRecord")
			.field("token", &self.token)
			.field("expires_at", &self.expires_at)
			.field("refreshing", &self.refreshing)
			.field("locked_at", &self.locked_at)
			.finish()
	}
}

/// In-process copy of the most recent token a broker obtained or adopted.
#[derive(Clone, PartialEq, Eq)]
pub struct LocalToken {
	/// Cached bearer token.
	pub token: TokenSecret,
	/// Expiry copied from the shared record or computed at refresh time.
	pub expires_at: OffsetDateTime,
}
impl LocalToken {
	/// Creates a cache entry.
	pub fn new(token: TokenSecret, expires_at: OffsetDateTime) -> Self {
		Self { token, expires_at }
	}

	/// Returns `true` while the entry may be served without consulting the store.
	pub fn is_fresh_at(&self, instant: OffsetDateTime) -> bool {
		!self.token.is_empty() && instant < self.expires_at
	}

	/// Returns `true` while the entry may be served because the store is unreachable.
	pub fn is_within_grace_at(&self, instant: OffsetDateTime, extension: Duration) -> bool {
		!self.token.is_empty()
			&& self.expires_at.checked_add(extension).is_none_or(|deadline| instant < deadline)
	}
}
impl Debug for LocalToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LocalToken")
			.field("token", &self.token)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn status_transitions_cover_all_states() {
		let expires = macros::datetime!(2025-01-01 01:00 UTC);
		let mut record = TokenRecord::default();

		assert_eq!(record.status_at(macros::datetime!(2025-01-01 00:00 UTC)), RecordStatus::Empty);

		record = TokenRecord::issued(TokenSecret::new("t1"), expires);

		assert_eq!(record.status_at(macros::datetime!(2025-01-01 00:30 UTC)), RecordStatus::Active);
		assert_eq!(record.status_at(expires), RecordStatus::Expired);

		record.lock(macros::datetime!(2025-01-01 00:40 UTC));

		assert_eq!(
			record.status_at(macros::datetime!(2025-01-01 00:45 UTC)),
			RecordStatus::Refreshing
		);
		assert!(record.usable_at(macros::datetime!(2025-01-01 00:45 UTC)).is_none());

		record.unlock();

		assert_eq!(
			record.usable_at(macros::datetime!(2025-01-01 00:45 UTC)).map(TokenSecret::expose),
			Some("t1")
		);
	}

	#[test]
	fn stale_lock_requires_stamp_and_age() {
		let locked = macros::datetime!(2025-01-01 00:00 UTC);
		let mut record = TokenRecord::default();

		record.lock(locked);

		assert!(!record.lock_is_stale(locked + Duration::seconds(29), Duration::seconds(30)));
		assert!(record.lock_is_stale(locked + Duration::seconds(30), Duration::seconds(30)));

		record.locked_at = None;

		assert!(!record.lock_is_stale(locked + Duration::hours(1), Duration::seconds(30)));
	}

	#[test]
	fn serializes_with_store_field_names() {
		let record = TokenRecord::issued(
			TokenSecret::new("t1"),
			macros::datetime!(2025-01-01 00:05 UTC),
		);
		let json = serde_json::to_value(&record).expect("Record should serialize.");

		assert_eq!(
			json,
			serde_json::json!({ "Token": "t1", "ExpiresAt": 1_735_689_900, "Refreshing": false })
		);

		let partial: TokenRecord = serde_json::from_str("{\"Refreshing\":true}")
			.expect("Lock-only record should deserialize.");

		assert!(partial.token.is_empty());
		assert!(partial.refreshing);
	}

	#[test]
	fn local_token_grace_extends_expiry() {
		let expires = macros::datetime!(2025-01-01 00:05 UTC);
		let local = LocalToken::new(TokenSecret::new("cached"), expires);
		let six_minutes_later = expires + Duration::minutes(1);

		assert!(!local.is_fresh_at(six_minutes_later));
		assert!(local.is_within_grace_at(six_minutes_later, Duration::minutes(10)));
		assert!(!local.is_within_grace_at(expires + Duration::minutes(10), Duration::minutes(10)));
		assert!(local.is_within_grace_at(six_minutes_later, Duration::MAX));
	}
}
