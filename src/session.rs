//! Unlocked vault session
//!
//! Holds the master password for as long as the vault is unlocked. Keys are
//! derived per record from its own salt, so the session never caches one.

use std::fmt;
use zeroize::Zeroizing;

use crate::crypto::{derive_key, EncryptionKey, KdfParams, SALT_LEN};
use crate::error::{CryptoError, VaultError};

#[derive(Clone)]
pub struct Session {
	password: Option<Zeroizing<String>>,
	params: KdfParams,
}

impl Session {
	/// Start a session; the password is checked for emptiness only
	pub fn new(password: &str, params: KdfParams) -> Result<Self, VaultError> {
		if password.is_empty() {
			return Err(CryptoError::InvalidInput { message: "password must not be empty".into() }.into());
		}
		params.validate()?;
		Ok(Session { password: Some(Zeroizing::new(password.to_string())), params })
	}

	pub fn params(&self) -> &KdfParams {
		&self.params
	}

	pub fn is_locked(&self) -> bool {
		self.password.is_none()
	}

	/// Forget the password; later key derivations fail with `Locked`
	pub fn lock(&mut self) {
		self.password = None;
	}

	/// Derive the key for one record's salt
	pub fn key_for(&self, salt: &[u8; SALT_LEN]) -> Result<EncryptionKey, VaultError> {
		let password = self.password.as_ref().ok_or(VaultError::Locked)?;
		Ok(derive_key(password, salt, &self.params)?)
	}
}

impl fmt::Debug for Session {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Session")
			.field("locked", &self.is_locked())
			.field("params", &self.params)
			.finish()
	}
}


// vim: ts=4
