//! Partition key addressing one shared token record.

// std
use std::{borrow::Borrow, ops::Deref};
// self
use crate::_prelude::*;

const IDENTIFIER_MAX_LEN: usize = 128;

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// Kind of identifier.
		kind: &'static str,
	},
	/// The identifier contains whitespace characters.
	#[error("{kind} identifier contains whitespace.")]
	ContainsWhitespace {
		/// Kind of identifier.
		kind: &'static str,
	},
	/// The identifier exceeded the allowed character count.
	#[error("{kind} identifier exceeds {max} characters.")]
	TooLong {
		/// Kind of identifier.
		kind: &'static str,
		/// Maximum permitted character count.
		max: usize,
	},
}

/// Opaque key selecting the shared record every broker instance of one deployment uses.
///
/// Deployments conventionally derive it from an application id and an environment name
/// (see [`PartitionKey::from_parts`]); the broker never interprets its contents.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PartitionKey(String);
impl PartitionKey {
	const KIND: &'static str = "Partition";

	/// Creates a new key after validation.
	pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
		let view = value.as_ref();

		validate_view(Self::KIND, view)?;

		Ok(Self(view.to_owned()))
	}

	/// Joins an application id and environment as `<app>#<env>`.
	pub fn from_parts(app_id: &str, env: &str) -> Result<Self, IdentifierError> {
		Self::new(format!("{app_id}#{env}"))
	}
}
impl Deref for PartitionKey {
	type Target = str;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
impl AsRef<str> for PartitionKey {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl From<PartitionKey> for String {
	fn from(value: PartitionKey) -> Self {
		value.0
	}
}
impl TryFrom<String> for PartitionKey {
	type Error = IdentifierError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		validate_view(Self::KIND, &value)?;

		Ok(Self(value))
	}
}
impl Borrow<str> for PartitionKey {
	fn borrow(&self) -> &str {
		&self.0
	}
}
impl Debug for PartitionKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "Partition({})", self.0)
	}
}
impl Display for PartitionKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}
impl FromStr for PartitionKey {
	type Err = IdentifierError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::new(s)
	}
}

fn validate_view(kind: &'static str, view: &str) -> Result<(), IdentifierError> {
	if view.is_empty() {
		return Err(IdentifierError::Empty { kind });
	}
	if view.chars().any(char::is_whitespace) {
		return Err(IdentifierError::ContainsWhitespace { kind });
	}
	if view.len() > IDENTIFIER_MAX_LEN {
		return Err(IdentifierError::TooLong { kind, max: IDENTIFIER_MAX_LEN });
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn partition_keys_validate() {
		assert!(PartitionKey::new("").is_err());
		assert!(PartitionKey::new("app #dev").is_err());
		assert!(PartitionKey::new("a".repeat(IDENTIFIER_MAX_LEN + 1)).is_err());

		let key = PartitionKey::new("a".repeat(IDENTIFIER_MAX_LEN))
			.expect("Exact length should succeed.");

		assert_eq!(key.len(), IDENTIFIER_MAX_LEN);
	}

	#[test]
	fn from_parts_joins_with_hash() {
		let key = PartitionKey::from_parts("billing", "prod")
			.expect("Partition key fixture should be valid.");

		assert_eq!(key.as_ref(), "billing#prod");
		assert_eq!(format!("{key:?}"), "Partition(billing#prod)");
	}

	#[test]
	fn serde_enforces_validation() {
		let key: PartitionKey =
			serde_json::from_str("\"app#env\"").expect("Key should deserialize successfully.");

		assert_eq!(&*key, "app#env");
		assert!(serde_json::from_str::<PartitionKey>("\"with space\"").is_err());
	}

	#[test]
	fn borrow_supports_fast_lookup() {
		let map: HashMap<PartitionKey, u8> = HashMap::from_iter([(
			PartitionKey::new("app#env").expect("Key used for lookup should be valid."),
			7_u8,
		)]);

		assert_eq!(map.get("app#env"), Some(&7));
	}
}
