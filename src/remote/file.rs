//! Remote kept in a redb file on a shared directory or mounted drive

use async_trait::async_trait;
use redb::{ReadableDatabase, ReadableTable, TableDefinition};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use super::{RemoteResult, RemoteStore};
use crate::error::{RemoteError, StoreError};
use crate::logging::*;
use crate::types::{Record, RecordUpdate, Table};

const ENTRIES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("remote_entries");
const STRUCTURE_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("remote_structure");

/// Database file name inside the remote directory
pub const REMOTE_DB_FILE: &str = "remote.db";

fn record_table(table: Table) -> TableDefinition<'static, &'static str, &'static [u8]> {
	match table {
		Table::Entries => ENTRIES_TABLE,
		Table::Structure => STRUCTURE_TABLE,
	}
}

fn encode(record: &Record) -> Result<Vec<u8>, StoreError> {
	Ok(json5::to_string(record)?.into_bytes())
}

fn decode(bytes: &[u8]) -> Result<Record, StoreError> {
	Ok(json5::from_str(std::str::from_utf8(bytes)?)?)
}

#[derive(Clone)]
pub struct FileRemote {
	db: Arc<redb::Database>,
	path: PathBuf,
}

impl FileRemote {
	/// Open or create the remote database under `dir`
	pub fn open(dir: &Path) -> Result<Self, RemoteError> {
		std::fs::create_dir_all(dir).map_err(|e| RemoteError::Transport {
			message: format!("cannot create {}: {}", dir.display(), e),
		})?;
		let path = dir.join(REMOTE_DB_FILE);
		let db = redb::Database::create(&path).map_err(StoreError::from)?;
		{
			let write_txn = db.begin_write().map_err(StoreError::from)?;
			write_txn.open_table(ENTRIES_TABLE).map_err(StoreError::from)?;
			write_txn.open_table(STRUCTURE_TABLE).map_err(StoreError::from)?;
			write_txn.commit().map_err(StoreError::from)?;
		}
		debug!("Opened file remote at {}", path.display());
		Ok(FileRemote { db: Arc::new(db), path })
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Run a blocking database closure off the async runtime
	async fn blocking<T, F>(&self, f: F) -> RemoteResult<T>
	where
		T: Send + 'static,
		F: FnOnce(&redb::Database) -> RemoteResult<T> + Send + 'static,
	{
		let db = Arc::clone(&self.db);
		tokio::task::spawn_blocking(move || f(&db))
			.await
			.map_err(|e| RemoteError::Transport { message: e.to_string() })?
	}
}

#[async_trait]
impl RemoteStore for FileRemote {
	async fn list(&self, table: Table) -> RemoteResult<Vec<Record>> {
		self.blocking(move |db| {
			let read_txn = db.begin_read().map_err(StoreError::from)?;
			let t = read_txn.open_table(record_table(table)).map_err(StoreError::from)?;
			let mut records = Vec::new();
			for item in t.iter().map_err(StoreError::from)? {
				let (_, value) = item.map_err(StoreError::from)?;
				records.push(decode(value.value())?);
			}
			Ok(records)
		})
		.await
	}

	async fn insert(&self, table: Table, record: &Record) -> RemoteResult<()> {
		let record = record.clone();
		self.blocking(move |db| {
			let key = record.id.to_string();
			let bytes = encode(&record)?;
			let write_txn = db.begin_write().map_err(StoreError::from)?;
			{
				let mut t = write_txn.open_table(record_table(table)).map_err(StoreError::from)?;
				if t.get(key.as_str()).map_err(StoreError::from)?.is_some() {
					return Err(RemoteError::AlreadyExists { id: key });
				}
				t.insert(key.as_str(), bytes.as_slice()).map_err(StoreError::from)?;
			}
			write_txn.commit().map_err(StoreError::from)?;
			Ok(())
		})
		.await
	}

	async fn update(&self, table: Table, id: Uuid, update: &RecordUpdate) -> RemoteResult<()> {
		let update = update.clone();
		self.blocking(move |db| {
			let key = id.to_string();
			let write_txn = db.begin_write().map_err(StoreError::from)?;
			{
				let mut t = write_txn.open_table(record_table(table)).map_err(StoreError::from)?;
				let mut record = match t.get(key.as_str()).map_err(StoreError::from)? {
					Some(existing) => decode(existing.value())?,
					None => return Err(RemoteError::NotFound { id: key }),
				};
				record.apply_update(&update);
				let bytes = encode(&record)?;
				t.insert(key.as_str(), bytes.as_slice()).map_err(StoreError::from)?;
			}
			write_txn.commit().map_err(StoreError::from)?;
			Ok(())
		})
		.await
	}

	async fn delete(&self, table: Table, id: Uuid) -> RemoteResult<()> {
		self.blocking(move |db| {
			let key = id.to_string();
			let write_txn = db.begin_write().map_err(StoreError::from)?;
			{
				let mut t = write_txn.open_table(record_table(table)).map_err(StoreError::from)?;
				let removed = t.remove(key.as_str()).map_err(StoreError::from)?;
				if removed.is_none() {
					return Err(RemoteError::NotFound { id: key });
				}
			}
			write_txn.commit().map_err(StoreError::from)?;
			Ok(())
		})
		.await
	}
}


// vim: ts=4
