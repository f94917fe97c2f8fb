//! Error types for vault operations

use std::error::Error;
use std::fmt;
use std::io;

use crate::types::Table;

/// Main error type for vault operations
#[derive(Debug)]
pub enum VaultError {
	/// Codec error (nested)
	Codec(CodecError),

	/// Crypto error (nested)
	Crypto(CryptoError),

	/// Local store error (nested)
	Store(StoreError),

	/// Remote store error (nested)
	Remote(RemoteError),

	/// Configuration error (nested)
	Config(ConfigError),

	/// Payload could not be (de)serialised
	Payload { message: String },

	/// Another reconciliation pass is already running
	SyncInProgress { message: String },

	/// The vault is locked (no session)
	Locked,

	/// No open conflict exists for this record
	NoSuchConflict { table: Table, id: String },

	/// I/O error
	Io(io::Error),
}

impl fmt::Display for VaultError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			VaultError::Codec(e) => write!(f, "Codec error: {}", e),
			VaultError::Crypto(e) => write!(f, "Crypto error: {}", e),
			VaultError::Store(e) => write!(f, "Store error: {}", e),
			VaultError::Remote(e) => write!(f, "Remote error: {}", e),
			VaultError::Config(e) => write!(f, "Config error: {}", e),
			VaultError::Payload { message } => write!(f, "Invalid payload: {}", message),
			VaultError::SyncInProgress { message } => {
				write!(f, "Sync already in progress: {}", message)
			}
			VaultError::Locked => write!(f, "Vault is locked"),
			VaultError::NoSuchConflict { table, id } => {
				write!(f, "No open conflict for {} record {}", table, id)
			}
			VaultError::Io(e) => write!(f, "I/O error: {}", e),
		}
	}
}

impl Error for VaultError {}

impl From<io::Error> for VaultError {
	fn from(e: io::Error) -> Self {
		VaultError::Io(e)
	}
}

impl From<CodecError> for VaultError {
	fn from(e: CodecError) -> Self {
		VaultError::Codec(e)
	}
}

impl From<CryptoError> for VaultError {
	fn from(e: CryptoError) -> Self {
		VaultError::Crypto(e)
	}
}

impl From<StoreError> for VaultError {
	fn from(e: StoreError) -> Self {
		match e {
			StoreError::LockHeld { message } => VaultError::SyncInProgress { message },
			other => VaultError::Store(other),
		}
	}
}

impl From<RemoteError> for VaultError {
	fn from(e: RemoteError) -> Self {
		VaultError::Remote(e)
	}
}

impl From<ConfigError> for VaultError {
	fn from(e: ConfigError) -> Self {
		VaultError::Config(e)
	}
}

impl From<serde_json::Error> for VaultError {
	fn from(e: serde_json::Error) -> Self {
		VaultError::Payload { message: e.to_string() }
	}
}

/// Text encoding errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
	/// Input is not valid base64
	InvalidBase64 { message: String },

	/// Decoded value has the wrong length
	InvalidLength { expected: usize, actual: usize },
}

impl fmt::Display for CodecError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			CodecError::InvalidBase64 { message } => write!(f, "Invalid base64: {}", message),
			CodecError::InvalidLength { expected, actual } => {
				write!(f, "Invalid length: expected {} bytes, got {}", expected, actual)
			}
		}
	}
}

impl Error for CodecError {}

impl From<base64::DecodeError> for CodecError {
	fn from(e: base64::DecodeError) -> Self {
		CodecError::InvalidBase64 { message: e.to_string() }
	}
}

/// Encryption layer errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
	/// Malformed plaintext or parameters
	InvalidInput { message: String },

	/// Ciphertext, IV and key do not match
	AuthenticationFailure,

	/// Key derivation failed
	KdfFailed { message: String },
}

impl fmt::Display for CryptoError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			CryptoError::InvalidInput { message } => write!(f, "Invalid input: {}", message),
			CryptoError::AuthenticationFailure => {
				write!(f, "Authentication failed: wrong key or tampered data")
			}
			CryptoError::KdfFailed { message } => write!(f, "Key derivation failed: {}", message),
		}
	}
}

impl Error for CryptoError {}

/// Local store errors
#[derive(Debug)]
pub enum StoreError {
	/// Underlying database failure
	Database { message: String },

	/// Stored value could not be decoded
	Corrupted { message: String },

	/// Record with this id already exists
	AlreadyExists { table: Table, id: String },

	/// Record with this id does not exist
	NotFound { table: Table, id: String },

	/// Sync lock is held by another live process
	LockHeld { message: String },
}

impl fmt::Display for StoreError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			StoreError::Database { message } => write!(f, "Database error: {}", message),
			StoreError::Corrupted { message } => write!(f, "Stored value corrupted: {}", message),
			StoreError::AlreadyExists { table, id } => {
				write!(f, "Record {} already exists in {}", id, table)
			}
			StoreError::NotFound { table, id } => {
				write!(f, "Record {} not found in {}", id, table)
			}
			StoreError::LockHeld { message } => write!(f, "Lock held: {}", message),
		}
	}
}

impl Error for StoreError {}

macro_rules! store_error_from_redb {
	($($ty:ty),* $(,)?) => {
		$(
			impl From<$ty> for StoreError {
				fn from(e: $ty) -> Self {
					StoreError::Database { message: e.to_string() }
				}
			}
		)*
	};
}

store_error_from_redb!(
	redb::Error,
	redb::DatabaseError,
	redb::TransactionError,
	redb::TableError,
	redb::StorageError,
	redb::CommitError,
);

impl From<json5::Error> for StoreError {
	fn from(e: json5::Error) -> Self {
		StoreError::Corrupted { message: e.to_string() }
	}
}

impl From<std::str::Utf8Error> for StoreError {
	fn from(e: std::str::Utf8Error) -> Self {
		StoreError::Corrupted { message: e.to_string() }
	}
}

/// Remote backing store errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
	/// Network or backend failure
	Transport { message: String },

	/// Backend refused the operation
	Rejected { message: String },

	/// Target record does not exist remotely
	NotFound { id: String },

	/// Record id is already taken remotely
	AlreadyExists { id: String },
}

impl RemoteError {
	/// Whether retrying the same operation later may succeed
	pub fn is_transient(&self) -> bool {
		matches!(self, RemoteError::Transport { .. })
	}
}

impl fmt::Display for RemoteError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			RemoteError::Transport { message } => write!(f, "Transport failure: {}", message),
			RemoteError::Rejected { message } => write!(f, "Rejected: {}", message),
			RemoteError::NotFound { id } => write!(f, "Remote record {} not found", id),
			RemoteError::AlreadyExists { id } => write!(f, "Remote record {} already exists", id),
		}
	}
}

impl Error for RemoteError {}

impl From<StoreError> for RemoteError {
	fn from(e: StoreError) -> Self {
		match e {
			StoreError::AlreadyExists { id, .. } => RemoteError::AlreadyExists { id },
			StoreError::NotFound { id, .. } => RemoteError::NotFound { id },
			other => RemoteError::Transport { message: other.to_string() },
		}
	}
}

/// Configuration errors
#[derive(Debug)]
pub enum ConfigError {
	/// Config file could not be read
	ReadFailed { path: String, source: io::Error },

	/// Config file could not be parsed
	ParseFailed { path: String, message: String },

	/// A value is out of range or inconsistent
	Invalid { message: String },
}

impl fmt::Display for ConfigError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ConfigError::ReadFailed { path, source } => {
				write!(f, "Failed to read config {}: {}", path, source)
			}
			ConfigError::ParseFailed { path, message } => {
				write!(f, "Failed to parse config {}: {}", path, message)
			}
			ConfigError::Invalid { message } => write!(f, "Invalid configuration: {}", message),
		}
	}
}

impl Error for ConfigError {}


// vim: ts=4
