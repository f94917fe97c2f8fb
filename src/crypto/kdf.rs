//! Password-based key derivation
//!
//! Keys are derived with Argon2id. Cost parameters are grouped into numbered
//! versions; a vault pins the version it was created with so that changing
//! defaults later never silently re-keys existing records.

use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroizing;

use crate::error::CryptoError;

/// Derived key length in bytes (AES-256)
pub const KEY_LEN: usize = 32;

/// Per-record salt length in bytes
pub const SALT_LEN: usize = 16;

const MIN_MEM_COST_KIB: u32 = 8 * 1024;

/// Parameter set identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum KdfVersion {
	#[default]
	V1,
	/// Caller-chosen costs (tests, tuning)
	Custom,
}

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct KdfParams {
	pub version: KdfVersion,

	/// Memory cost in KiB
	pub mem_cost_kib: u32,

	/// Number of passes
	pub time_cost: u32,

	/// Number of lanes
	pub parallelism: u32,
}

impl KdfParams {
	/// First parameter set: 19 MiB, 2 passes, 1 lane
	pub const V1: KdfParams =
		KdfParams { version: KdfVersion::V1, mem_cost_kib: 19 * 1024, time_cost: 2, parallelism: 1 };

	/// Custom parameters; still subject to `validate`
	pub fn custom(mem_cost_kib: u32, time_cost: u32, parallelism: u32) -> Self {
		KdfParams { version: KdfVersion::Custom, mem_cost_kib, time_cost, parallelism }
	}

	/// Check parameters are within acceptable ranges
	pub fn validate(&self) -> Result<(), CryptoError> {
		if self.mem_cost_kib < MIN_MEM_COST_KIB {
			return Err(CryptoError::KdfFailed {
				message: format!("memory cost too low (minimum {} KiB)", MIN_MEM_COST_KIB),
			});
		}
		if self.time_cost < 1 {
			return Err(CryptoError::KdfFailed { message: "time cost must be at least 1".into() });
		}
		if self.parallelism < 1 {
			return Err(CryptoError::KdfFailed { message: "parallelism must be at least 1".into() });
		}
		Ok(())
	}
}

impl Default for KdfParams {
	fn default() -> Self {
		KdfParams::V1
	}
}

/// 256-bit symmetric key, zeroed on drop
#[derive(Clone)]
pub struct EncryptionKey {
	bytes: Zeroizing<[u8; KEY_LEN]>,
}

impl EncryptionKey {
	pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
		EncryptionKey { bytes: Zeroizing::new(bytes) }
	}

	pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
		&self.bytes
	}
}

impl fmt::Debug for EncryptionKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("EncryptionKey(..)")
	}
}

/// Derive a key from a password and a per-record salt
///
/// Deterministic for a given (password, salt, params) triple.
pub fn derive_key(
	password: &str,
	salt: &[u8; SALT_LEN],
	params: &KdfParams,
) -> Result<EncryptionKey, CryptoError> {
	if password.is_empty() {
		return Err(CryptoError::InvalidInput { message: "password must not be empty".into() });
	}
	params.validate()?;

	let argon_params =
		Params::new(params.mem_cost_kib, params.time_cost, params.parallelism, Some(KEY_LEN))
			.map_err(|e| CryptoError::KdfFailed { message: e.to_string() })?;
	let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

	let mut out = Zeroizing::new([0u8; KEY_LEN]);
	argon2
		.hash_password_into(password.as_bytes(), salt, &mut out[..])
		.map_err(|e| CryptoError::KdfFailed { message: e.to_string() })?;

	Ok(EncryptionKey { bytes: out })
}

/// Fresh random salt from the OS RNG
pub fn generate_salt() -> [u8; SALT_LEN] {
	let mut salt = [0u8; SALT_LEN];
	OsRng.fill_bytes(&mut salt);
	salt
}

#[cfg(test)]
mod tests {
	use super::*;

	fn fast() -> KdfParams {
		KdfParams::custom(MIN_MEM_COST_KIB, 1, 1)
	}

	#[test]
	fn test_v1_defaults_validate() {
		let params = KdfParams::default();
		assert_eq!(params, KdfParams::V1);
		assert!(params.validate().is_ok());
	}

	#[test]
	fn test_validation_rejects_weak_params() {
		assert!(KdfParams::custom(1024, 1, 1).validate().is_err());
		assert!(KdfParams::custom(MIN_MEM_COST_KIB, 0, 1).validate().is_err());
		assert!(KdfParams::custom(MIN_MEM_COST_KIB, 1, 0).validate().is_err());
	}

	#[test]
	fn test_derive_is_deterministic() {
		let salt = [3u8; SALT_LEN];
		let k1 = derive_key("hunter2", &salt, &fast()).unwrap();
		let k2 = derive_key("hunter2", &salt, &fast()).unwrap();
		assert_eq!(k1.as_bytes(), k2.as_bytes());

		let k3 = derive_key("hunter3", &salt, &fast()).unwrap();
		assert_ne!(k1.as_bytes(), k3.as_bytes());

		let k4 = derive_key("hunter2", &[4u8; SALT_LEN], &fast()).unwrap();
		assert_ne!(k1.as_bytes(), k4.as_bytes());
	}

	#[test]
	fn test_empty_password_rejected() {
		let err = derive_key("", &[0u8; SALT_LEN], &fast()).unwrap_err();
		assert!(matches!(err, CryptoError::InvalidInput { .. }));
	}

	#[test]
	fn test_salts_are_random() {
		assert_ne!(generate_salt(), generate_salt());
	}

	#[test]
	fn test_key_debug_hides_material() {
		let key = EncryptionKey::from_bytes([0xAB; KEY_LEN]);
		assert_eq!(format!("{:?}", key), "EncryptionKey(..)");
	}
}

// vim: ts=4
