//! Credential set submitted to the authorization endpoint, with one-shot rotation support.

// self
use crate::_prelude::*;

/// Form fields exchanged for a bearer token, plus optional alternates used on rotation.
///
/// Rotation swaps every field that has an alternate with that alternate, so a deployment that
/// rolls a client secret or password can keep both the old and new values configured. Fields
/// without an alternate are resubmitted unchanged.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CredentialSet {
	fields: BTreeMap<String, String>,
	alternates: BTreeMap<String, String>,
	rotations: u32,
}
impl CredentialSet {
	/// Creates an empty credential set.
	pub fn new() -> Self {
		Self::default()
	}

	/// Builds the resource-owner password grant used by the token endpoint.
	pub fn password_grant(
		client_id: impl Into<String>,
		client_secret: impl Into<String>,
		username: impl Into<String>,
		password: impl Into<String>,
	) -> Self {
		Self::new()
			.with_field("grant_type", "password")
			.with_field("client_id", client_id)
			.with_field("client_secret", client_secret)
			.with_field("username", username)
			.with_field("password", password)
	}

	/// Sets or replaces a form field.
	pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.fields.insert(name.into(), value.into());

		self
	}

	/// Registers the value a field takes after a rotation.
	pub fn with_alternate(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.alternates.insert(name.into(), value.into());

		self
	}

	/// Returns the current value of a field.
	pub fn field(&self, name: &str) -> Option<&str> {
		self.fields.get(name).map(String::as_str)
	}

	/// Returns the form pairs in a stable order.
	pub fn form(&self) -> Vec<(String, String)> {
		self.fields.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
	}

	/// Swaps every field that has an alternate and records the rotation.
	pub fn rotate(&mut self) {
		for (name, alternate) in self.alternates.iter_mut() {
			match self.fields.get_mut(name) {
				Some(current) => std::mem::swap(current, alternate),
				None => {
					self.fields.insert(name.clone(), std::mem::take(alternate));
				},
			}
		}

		self.rotations += 1;
	}

	/// Returns `true` once at least one rotation happened.
	pub fn is_rotated(&self) -> bool {
		self.rotations > 0
	}

	/// Number of rotations applied over the set's lifetime.
	pub fn rotations(&self) -> u32 {
		self.rotations
	}
}
impl Debug for CredentialSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CredentialSet")
			.field("fields", &self.fields.keys().collect::<Vec<_>>())
			.field("alternates", &self.alternates.keys().collect::<Vec<_>>())
			.field("rotations", &self.rotations)
			.finish()
	}
}
