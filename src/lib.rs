//! # vaultsync - offline-first encrypted record vault
//!
//! Records (logins, passwords, notes and the folder structure) are encrypted
//! on the device with AES-256-GCM under Argon2id keys derived from the master
//! password and a per-record salt. Every local change is logged as a
//! transaction; a reconciliation pass later pushes the log to a remote store,
//! pulls changes made by other devices and reports conflicts instead of
//! overwriting anything silently.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vaultsync::{Config, FileRemote, Vault};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load(None)?;
//!     let vault = Vault::open(&config)?;
//!     let remote = Arc::new(FileRemote::open(&config.remote_path())?);
//!     let report = vault.reconciler(remote).run().await?;
//!     println!("{} pushed, {} pulled", report.pushed(), report.pulled());
//!     Ok(())
//! }
//! ```

pub mod callbacks;
pub mod codec;
pub mod config;
pub mod conflict;
pub mod crypto;
pub mod entry;
pub mod error;
pub mod logging;
pub mod remote;
pub mod session;
pub mod store;
pub mod sync;
pub mod types;
pub mod vault;

// Re-export commonly used types and functions
pub use callbacks::{SyncEvent, SyncProgressCallback};
pub use config::Config;
pub use conflict::{Conflict, ConflictReason};
pub use entry::{Decrypted, DecryptedEntry, EntryKind, EntryPayload};
pub use error::{CodecError, ConfigError, CryptoError, RemoteError, StoreError, VaultError};
pub use remote::{FileRemote, MemoryRemote, RemoteStore};
pub use session::Session;
pub use store::LocalStore;
pub use sync::{Reconciler, SyncError, SyncErrorKind, SyncReport, SyncSettings, TableReport};
pub use types::{Action, Record, Table, Transaction};
pub use vault::{Keep, Vault};

// vim: ts=4
