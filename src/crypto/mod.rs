//! Client-side encryption layer
//!
//! - Argon2id key derivation with versioned, fixed cost parameters
//! - AES-256-GCM sealing with a fresh 96-bit IV per call
//! - Random salt and password generation from the OS RNG

pub mod cipher;
pub mod kdf;
pub mod password;

pub use cipher::{decrypt, encrypt, encrypt_bytes, Sealed, IV_LEN};
pub use kdf::{derive_key, generate_salt, EncryptionKey, KdfParams, KdfVersion, KEY_LEN, SALT_LEN};
pub use password::{generate_password, GeneratorOptions};

// vim: ts=4
