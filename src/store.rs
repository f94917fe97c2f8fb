//! Local embedded store
//!
//! Typed CRUD over the `entries` and `structure` record tables, plus the
//! `metadata` slot and the `transactions` log. Every logged mutation writes
//! the record and appends its transaction in the same redb write transaction.
//! Also keeps the open-conflict list and a cross-process sync lock.

use redb::{ReadableDatabase, ReadableTable, TableDefinition};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::conflict::Conflict;
use crate::crypto::KdfParams;
use crate::error::StoreError;
use crate::logging::*;
use crate::types::{epoch, Action, LoggedTransaction, Record, Table, Timestamp, Transaction};

/// Key: record id, Value: serialised Record
const ENTRIES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("entries");
const STRUCTURE_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("structure");

/// Key: metadata name, Value: serialised value
const METADATA_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("metadata");

/// Key: log sequence number, Value: serialised Transaction
const TRANSACTIONS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("transactions");

/// Key: "table:id", Value: serialised Conflict
const CONFLICTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("conflicts");

/// Key: lock name, Value: serialised LockInfo
const SYNC_LOCK_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("sync_lock");

const LAST_SYNCED_AT_KEY: &str = "last_synced_at";
const OWNER_ID_KEY: &str = "owner_id";
const KDF_PARAMS_KEY: &str = "kdf_params";
const REMOTE_IDS_KEY_PREFIX: &str = "remote_ids.";
const SYNC_LOCK_KEY: &str = "sync";

/// Locks older than this are considered abandoned
const MAX_LOCK_AGE_SECS: u64 = 24 * 60 * 60;

fn record_table(table: Table) -> TableDefinition<'static, &'static str, &'static [u8]> {
	match table {
		Table::Entries => ENTRIES_TABLE,
		Table::Structure => STRUCTURE_TABLE,
	}
}

fn conflict_key(table: Table, id: &Uuid) -> String {
	format!("{}:{}", table, id)
}

fn to_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
	Ok(json5::to_string(value)?.into_bytes())
}

fn from_bytes<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
	Ok(json5::from_str(std::str::from_utf8(bytes)?)?)
}

/// Owner of an active reconciliation pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
	#[serde(rename = "pid")]
	pub pid: u32,
	/// Unix timestamp when the lock was taken
	#[serde(rename = "str")]
	pub started: u64,
}

impl LockInfo {
	/// Holder process is gone
	pub fn is_stale(&self) -> bool {
		self.pid != std::process::id() && !is_process_alive(self.pid)
	}

	pub fn is_too_old(&self) -> bool {
		match SystemTime::now().duration_since(UNIX_EPOCH) {
			Ok(now) => now.as_secs().saturating_sub(self.started) > MAX_LOCK_AGE_SECS,
			Err(_) => false,
		}
	}
}

#[cfg(target_os = "linux")]
fn is_process_alive(pid: u32) -> bool {
	path::Path::new(&format!("/proc/{}", pid)).exists()
}

#[cfg(not(target_os = "linux"))]
fn is_process_alive(_pid: u32) -> bool {
	// Can't tell cheaply; rely on the age limit
	true
}

/// Releases the sync lock when dropped
pub struct SyncLockGuard {
	db: Arc<redb::Database>,
	released: bool,
}

impl std::fmt::Debug for SyncLockGuard {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SyncLockGuard").field("released", &self.released).finish()
	}
}

impl SyncLockGuard {
	fn release(&mut self) -> Result<(), StoreError> {
		if self.released {
			return Ok(());
		}
		let write_txn = self.db.begin_write()?;
		{
			let mut table = write_txn.open_table(SYNC_LOCK_TABLE)?;
			table.remove(SYNC_LOCK_KEY)?;
		}
		write_txn.commit()?;
		self.released = true;
		Ok(())
	}
}

impl Drop for SyncLockGuard {
	fn drop(&mut self) {
		if let Err(e) = self.release() {
			warn!("Failed to release sync lock: {}", e);
		}
	}
}

/// Per-device store backed by a redb database
pub struct LocalStore {
	db: Arc<redb::Database>,
	db_path: path::PathBuf,
}

impl LocalStore {
	/// Open or create the store, ensuring every table exists
	pub fn open(db_path: &path::Path) -> Result<Self, StoreError> {
		if let Some(parent) = db_path.parent() {
			if !parent.as_os_str().is_empty() && !parent.exists() {
				std::fs::create_dir_all(parent)
					.map_err(|e| StoreError::Database { message: e.to_string() })?;
			}
		}
		let db = redb::Database::create(db_path)?;
		{
			let write_txn = db.begin_write()?;
			let _ = write_txn.open_table(ENTRIES_TABLE)?;
			let _ = write_txn.open_table(STRUCTURE_TABLE)?;
			let _ = write_txn.open_table(METADATA_TABLE)?;
			let _ = write_txn.open_table(TRANSACTIONS_TABLE)?;
			let _ = write_txn.open_table(CONFLICTS_TABLE)?;
			let _ = write_txn.open_table(SYNC_LOCK_TABLE)?;
			write_txn.commit()?;
		}
		debug!("Opened local store at {}", db_path.display());
		Ok(LocalStore { db: Arc::new(db), db_path: db_path.to_path_buf() })
	}

	pub fn path(&self) -> &path::Path {
		&self.db_path
	}

	// === Records ===

	pub fn get(&self, table: Table, id: &Uuid) -> Result<Option<Record>, StoreError> {
		let read_txn = self.db.begin_read()?;
		let t = read_txn.open_table(record_table(table))?;
		match t.get(id.to_string().as_str())? {
			Some(entry) => Ok(Some(from_bytes(entry.value())?)),
			None => Ok(None),
		}
	}

	pub fn list(&self, table: Table) -> Result<Vec<Record>, StoreError> {
		let read_txn = self.db.begin_read()?;
		let t = read_txn.open_table(record_table(table))?;
		let mut records = Vec::new();
		for item in t.iter()? {
			let (_, value) = item?;
			records.push(from_bytes(value.value())?);
		}
		Ok(records)
	}

	/// Insert a new record and log an `insert` transaction
	pub fn insert(&self, table: Table, record: &Record) -> Result<(), StoreError> {
		self.write_logged(table, record.id, Some(record), Action::Insert, Some(false))
	}

	/// Replace an existing record and log an `update` transaction
	pub fn update(&self, table: Table, record: &Record) -> Result<(), StoreError> {
		self.write_logged(table, record.id, Some(record), Action::Update, Some(true))
	}

	/// Delete a record and log a `delete` transaction
	pub fn remove(&self, table: Table, id: &Uuid) -> Result<(), StoreError> {
		self.write_logged(table, *id, None, Action::Delete, Some(true))
	}

	/// Log `action` for `id` whatever its local state, writing `record` if
	/// given or removing the id otherwise
	///
	/// Used to re-issue a transaction after a conflict has been resolved.
	pub fn reissue(
		&self,
		table: Table,
		id: Uuid,
		record: Option<&Record>,
		action: Action,
	) -> Result<(), StoreError> {
		self.write_logged(table, id, record, action, None)
	}

	fn write_logged(
		&self,
		table: Table,
		id: Uuid,
		record: Option<&Record>,
		action: Action,
		must_exist: Option<bool>,
	) -> Result<(), StoreError> {
		let key = id.to_string();
		let record_bytes = record.map(to_bytes).transpose()?;
		let txn_bytes = to_bytes(&Transaction::new(id, table, action))?;

		let write_txn = self.db.begin_write()?;
		{
			let mut t = write_txn.open_table(record_table(table))?;
			let exists = t.get(key.as_str())?.is_some();
			match must_exist {
				Some(true) if !exists => {
					return Err(StoreError::NotFound { table, id: key });
				}
				Some(false) if exists => {
					return Err(StoreError::AlreadyExists { table, id: key });
				}
				_ => {}
			}
			match &record_bytes {
				Some(bytes) => {
					t.insert(key.as_str(), bytes.as_slice())?;
				}
				None => {
					t.remove(key.as_str())?;
				}
			}

			let mut log = write_txn.open_table(TRANSACTIONS_TABLE)?;
			let next_seq = match log.last()? {
				Some((seq, _)) => seq.value() + 1,
				None => 1,
			};
			log.insert(next_seq, txn_bytes.as_slice())?;
		}
		write_txn.commit()?;

		debug!("Logged {} of {} record {}", action, table, id);
		Ok(())
	}

	/// Store a record received from the remote without logging it
	pub fn apply_pulled(&self, table: Table, record: &Record) -> Result<(), StoreError> {
		let bytes = to_bytes(record)?;
		let write_txn = self.db.begin_write()?;
		{
			let mut t = write_txn.open_table(record_table(table))?;
			t.insert(record.id.to_string().as_str(), bytes.as_slice())?;
		}
		write_txn.commit()?;
		Ok(())
	}

	/// Drop a record without logging it; returns whether it existed
	pub fn discard_pulled(&self, table: Table, id: &Uuid) -> Result<bool, StoreError> {
		let write_txn = self.db.begin_write()?;
		let existed = {
			let mut t = write_txn.open_table(record_table(table))?;
			let removed = t.remove(id.to_string().as_str())?;
			removed.is_some()
		};
		write_txn.commit()?;
		Ok(existed)
	}

	/// Wipe a record table without logging (administrative reset)
	pub fn clear(&self, table: Table) -> Result<(), StoreError> {
		let write_txn = self.db.begin_write()?;
		{
			let mut t = write_txn.open_table(record_table(table))?;
			let mut keys_to_remove = Vec::new();
			for item in t.iter()? {
				let (key, _) = item?;
				keys_to_remove.push(key.value().to_string());
			}
			for key in keys_to_remove {
				t.remove(key.as_str())?;
			}
		}
		write_txn.commit()?;
		info!("Cleared local {} table", table);
		Ok(())
	}

	// === Metadata ===

	fn get_meta<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
		let read_txn = self.db.begin_read()?;
		let t = read_txn.open_table(METADATA_TABLE)?;
		match t.get(key)? {
			Some(entry) => Ok(Some(from_bytes(entry.value())?)),
			None => Ok(None),
		}
	}

	fn set_meta<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
		let bytes = to_bytes(value)?;
		let write_txn = self.db.begin_write()?;
		{
			let mut t = write_txn.open_table(METADATA_TABLE)?;
			t.insert(key, bytes.as_slice())?;
		}
		write_txn.commit()?;
		Ok(())
	}

	/// End of the previous successful pass; the epoch if never synced
	pub fn last_synced_at(&self) -> Result<Timestamp, StoreError> {
		Ok(self.get_meta(LAST_SYNCED_AT_KEY)?.unwrap_or_else(epoch))
	}

	pub fn set_last_synced_at(&self, at: Timestamp) -> Result<(), StoreError> {
		self.set_meta(LAST_SYNCED_AT_KEY, &at)
	}

	pub fn owner_id(&self) -> Result<Option<Uuid>, StoreError> {
		self.get_meta(OWNER_ID_KEY)
	}

	pub fn set_owner_id(&self, owner_id: Uuid) -> Result<(), StoreError> {
		self.set_meta(OWNER_ID_KEY, &owner_id)
	}

	pub fn kdf_params(&self) -> Result<Option<KdfParams>, StoreError> {
		self.get_meta(KDF_PARAMS_KEY)
	}

	pub fn set_kdf_params(&self, params: &KdfParams) -> Result<(), StoreError> {
		self.set_meta(KDF_PARAMS_KEY, params)
	}

	/// Ids the remote held for `table` at the end of the previous pass
	pub fn remote_ids(&self, table: Table) -> Result<HashSet<Uuid>, StoreError> {
		let key = format!("{}{}", REMOTE_IDS_KEY_PREFIX, table);
		Ok(self.get_meta::<Vec<Uuid>>(&key)?.unwrap_or_default().into_iter().collect())
	}

	pub fn set_remote_ids(&self, table: Table, ids: &HashSet<Uuid>) -> Result<(), StoreError> {
		let key = format!("{}{}", REMOTE_IDS_KEY_PREFIX, table);
		let mut sorted: Vec<&Uuid> = ids.iter().collect();
		sorted.sort();
		self.set_meta(&key, &sorted)
	}

	// === Transaction log ===

	/// Pending transactions in log order
	pub fn transactions(&self) -> Result<Vec<LoggedTransaction>, StoreError> {
		let read_txn = self.db.begin_read()?;
		let t = read_txn.open_table(TRANSACTIONS_TABLE)?;
		let mut logged = Vec::new();
		for item in t.iter()? {
			let (seq, value) = item?;
			logged.push(LoggedTransaction { seq: seq.value(), transaction: from_bytes(value.value())? });
		}
		Ok(logged)
	}

	pub fn clear_transactions(&self) -> Result<(), StoreError> {
		let seqs: Vec<u64> = self.transactions()?.iter().map(|t| t.seq).collect();
		self.settle_transactions(&seqs)
	}

	/// Remove the given log entries; entries appended since are kept
	pub fn settle_transactions(&self, seqs: &[u64]) -> Result<(), StoreError> {
		if seqs.is_empty() {
			return Ok(());
		}
		let write_txn = self.db.begin_write()?;
		{
			let mut t = write_txn.open_table(TRANSACTIONS_TABLE)?;
			for seq in seqs {
				t.remove(*seq)?;
			}
		}
		write_txn.commit()?;
		Ok(())
	}

	// === Open conflicts ===

	/// Remember a reported conflict, replacing any earlier one for the same record
	pub fn record_conflict(&self, conflict: &Conflict) -> Result<(), StoreError> {
		let bytes = to_bytes(conflict)?;
		let write_txn = self.db.begin_write()?;
		{
			let mut t = write_txn.open_table(CONFLICTS_TABLE)?;
			t.insert(conflict_key(conflict.table, &conflict.id).as_str(), bytes.as_slice())?;
		}
		write_txn.commit()?;
		Ok(())
	}

	pub fn open_conflict(&self, table: Table, id: &Uuid) -> Result<Option<Conflict>, StoreError> {
		let read_txn = self.db.begin_read()?;
		let t = read_txn.open_table(CONFLICTS_TABLE)?;
		match t.get(conflict_key(table, id).as_str())? {
			Some(entry) => Ok(Some(from_bytes(entry.value())?)),
			None => Ok(None),
		}
	}

	pub fn open_conflicts(&self) -> Result<Vec<Conflict>, StoreError> {
		let read_txn = self.db.begin_read()?;
		let t = read_txn.open_table(CONFLICTS_TABLE)?;
		let mut conflicts = Vec::new();
		for item in t.iter()? {
			let (_, value) = item?;
			conflicts.push(from_bytes(value.value())?);
		}
		Ok(conflicts)
	}

	/// Forget a conflict; returns whether one was open
	pub fn dismiss_conflict(&self, table: Table, id: &Uuid) -> Result<bool, StoreError> {
		let write_txn = self.db.begin_write()?;
		let existed = {
			let mut t = write_txn.open_table(CONFLICTS_TABLE)?;
			let removed = t.remove(conflict_key(table, id).as_str())?;
			removed.is_some()
		};
		write_txn.commit()?;
		Ok(existed)
	}

	// === Sync lock ===

	/// Take the single-flight sync lock
	///
	/// Fails with `LockHeld` while another live process holds it. Stale locks
	/// are cleaned up first.
	pub fn acquire_sync_lock(&self) -> Result<SyncLockGuard, StoreError> {
		self.cleanup_stale_locks()?;

		let write_txn = self.db.begin_write()?;
		{
			let mut t = write_txn.open_table(SYNC_LOCK_TABLE)?;
			if let Some(existing) = t.get(SYNC_LOCK_KEY)? {
				let holder: LockInfo = from_bytes(existing.value())?;
				return Err(StoreError::LockHeld {
					message: format!("sync started by pid {} at {}", holder.pid, holder.started),
				});
			}

			let started = SystemTime::now()
				.duration_since(UNIX_EPOCH)
				.map(|d| d.as_secs())
				.unwrap_or_default();
			let lock_info = LockInfo { pid: std::process::id(), started };
			let bytes = to_bytes(&lock_info)?;
			t.insert(SYNC_LOCK_KEY, bytes.as_slice())?;
		}
		write_txn.commit()?;

		Ok(SyncLockGuard { db: Arc::clone(&self.db), released: false })
	}

	pub fn is_sync_locked(&self) -> Result<bool, StoreError> {
		let read_txn = self.db.begin_read()?;
		let t = read_txn.open_table(SYNC_LOCK_TABLE)?;
		Ok(t.get(SYNC_LOCK_KEY)?.is_some())
	}

	/// Remove locks left behind by dead processes or older than a day
	pub fn cleanup_stale_locks(&self) -> Result<u32, StoreError> {
		let stale = {
			let read_txn = self.db.begin_read()?;
			let t = read_txn.open_table(SYNC_LOCK_TABLE)?;
			match t.get(SYNC_LOCK_KEY)? {
				Some(entry) => match from_bytes::<LockInfo>(entry.value()) {
					Ok(info) => info.is_stale() || info.is_too_old(),
					Err(_) => true,
				},
				None => false,
			}
		};

		if !stale {
			return Ok(0);
		}

		let write_txn = self.db.begin_write()?;
		{
			let mut t = write_txn.open_table(SYNC_LOCK_TABLE)?;
			t.remove(SYNC_LOCK_KEY)?;
		}
		write_txn.commit()?;
		warn!("Removed stale sync lock");
		Ok(1)
	}
}


// vim: ts=4
