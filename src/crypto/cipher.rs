//! AES-256-GCM sealing of record payloads
//!
//! Every call to `encrypt` draws a fresh 96-bit IV from the OS RNG. The GCM
//! tag stays appended to the ciphertext, so a mismatched key, IV or any
//! flipped bit surfaces as `AuthenticationFailure` on decrypt.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};

use super::kdf::EncryptionKey;
use crate::error::CryptoError;

/// IV length in bytes
pub const IV_LEN: usize = 12;

/// Output of a single encryption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
	pub iv: [u8; IV_LEN],
	pub ciphertext: Vec<u8>,
}

/// Encrypt a UTF-8 plaintext under `key`
pub fn encrypt(plaintext: &str, key: &EncryptionKey) -> Result<Sealed, CryptoError> {
	let cipher = Aes256Gcm::new(key.as_bytes().into());
	let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

	let ciphertext = cipher
		.encrypt(&nonce, plaintext.as_bytes())
		.map_err(|e| CryptoError::InvalidInput { message: e.to_string() })?;

	let mut iv = [0u8; IV_LEN];
	iv.copy_from_slice(&nonce);
	Ok(Sealed { iv, ciphertext })
}

/// Encrypt raw bytes that must hold UTF-8 text
pub fn encrypt_bytes(plaintext: &[u8], key: &EncryptionKey) -> Result<Sealed, CryptoError> {
	let text = std::str::from_utf8(plaintext).map_err(|_| CryptoError::InvalidInput {
		message: "plaintext must be a UTF-8 string".into(),
	})?;
	encrypt(text, key)
}

/// Decrypt and authenticate a ciphertext produced by `encrypt`
pub fn decrypt(ciphertext: &[u8], iv: &[u8], key: &EncryptionKey) -> Result<String, CryptoError> {
	if iv.len() != IV_LEN {
		return Err(CryptoError::AuthenticationFailure);
	}

	let cipher = Aes256Gcm::new(key.as_bytes().into());
	let plaintext = cipher
		.decrypt(Nonce::from_slice(iv), ciphertext)
		.map_err(|_| CryptoError::AuthenticationFailure)?;

	String::from_utf8(plaintext).map_err(|_| CryptoError::AuthenticationFailure)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::crypto::kdf::KEY_LEN;

	fn key(byte: u8) -> EncryptionKey {
		EncryptionKey::from_bytes([byte; KEY_LEN])
	}

	#[test]
	fn test_roundtrip() {
		let k = key(1);
		let sealed = encrypt("{\"title\":\"bank\"}", &k).unwrap();
		assert_eq!(decrypt(&sealed.ciphertext, &sealed.iv, &k).unwrap(), "{\"title\":\"bank\"}");
	}

	#[test]
	fn test_fresh_iv_per_call() {
		let k = key(1);
		let a = encrypt("same", &k).unwrap();
		let b = encrypt("same", &k).unwrap();
		assert_ne!(a.iv, b.iv);
		assert_ne!(a.ciphertext, b.ciphertext);
	}

	#[test]
	fn test_wrong_key_fails() {
		let sealed = encrypt("secret", &key(1)).unwrap();
		assert_eq!(
			decrypt(&sealed.ciphertext, &sealed.iv, &key(2)),
			Err(CryptoError::AuthenticationFailure)
		);
	}

	#[test]
	fn test_short_iv_is_auth_failure() {
		let k = key(1);
		let sealed = encrypt("secret", &k).unwrap();
		assert_eq!(
			decrypt(&sealed.ciphertext, &sealed.iv[..8], &k),
			Err(CryptoError::AuthenticationFailure)
		);
	}

	#[test]
	fn test_non_utf8_bytes_rejected() {
		let err = encrypt_bytes(&[0xff, 0xfe], &key(1)).unwrap_err();
		assert!(matches!(err, CryptoError::InvalidInput { .. }));
	}

	#[test]
	fn test_empty_plaintext_roundtrips() {
		let k = key(9);
		let sealed = encrypt("", &k).unwrap();
		assert_eq!(decrypt(&sealed.ciphertext, &sealed.iv, &k).unwrap(), "");
	}
}

// vim: ts=4
