//! Remote backing store
//!
//! The reconciler treats the remote as the source of truth for changes made
//! by other devices. It only ever lists a whole table and writes single
//! records; resolving simultaneous remote writes is the backend's business.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::RemoteError;
use crate::types::{Record, RecordUpdate, Table};

pub mod file;
pub mod memory;

pub use file::FileRemote;
pub use memory::MemoryRemote;

/// Result type for remote operations
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Per-table record operations offered by a remote backend
#[async_trait]
pub trait RemoteStore: Send + Sync {
	/// Every record currently stored in `table`
	async fn list(&self, table: Table) -> RemoteResult<Vec<Record>>;

	/// Store a new record; fails `AlreadyExists` if the id is taken
	async fn insert(&self, table: Table, record: &Record) -> RemoteResult<()>;

	/// Replace the encrypted payload of an existing record
	async fn update(&self, table: Table, id: Uuid, update: &RecordUpdate) -> RemoteResult<()>;

	/// Remove a record; fails `NotFound` if absent
	async fn delete(&self, table: Table, id: Uuid) -> RemoteResult<()>;
}

// vim: ts=4
