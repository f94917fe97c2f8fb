//! In-process remote
//!
//! Keeps every table in memory. Failures can be injected per table listing
//! or per record write to exercise the reconciler's error paths.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{RemoteResult, RemoteStore};
use crate::error::RemoteError;
use crate::types::{Record, RecordUpdate, Table};

#[derive(Default)]
struct Failures {
	listings: HashSet<Table>,
	writes: HashMap<Uuid, RemoteError>,
}

#[derive(Default)]
pub struct MemoryRemote {
	tables: RwLock<HashMap<Table, BTreeMap<Uuid, Record>>>,
	failures: RwLock<Failures>,
	writes: AtomicUsize,
}

impl MemoryRemote {
	pub fn new() -> Self {
		Self::default()
	}

	/// Put a record directly, as another device would; not counted as a write
	pub async fn seed(&self, table: Table, record: Record) {
		self.tables.write().await.entry(table).or_default().insert(record.id, record);
	}

	/// Drop a record directly, as another device would
	pub async fn unseed(&self, table: Table, id: &Uuid) -> Option<Record> {
		self.tables.write().await.get_mut(&table).and_then(|t| t.remove(id))
	}

	pub async fn get(&self, table: Table, id: &Uuid) -> Option<Record> {
		self.tables.read().await.get(&table).and_then(|t| t.get(id).cloned())
	}

	pub async fn list_len(&self, table: Table) -> usize {
		self.tables.read().await.get(&table).map_or(0, |t| t.len())
	}

	/// Successful writes issued through the `RemoteStore` interface
	pub fn write_count(&self) -> usize {
		self.writes.load(Ordering::SeqCst)
	}

	/// Make `list(table)` fail with a transport error
	pub async fn fail_listing(&self, table: Table) {
		self.failures.write().await.listings.insert(table);
	}

	/// Make every write to `id` fail with `error`
	pub async fn fail_writes_for(&self, id: Uuid, error: RemoteError) {
		self.failures.write().await.writes.insert(id, error);
	}

	pub async fn clear_failures(&self) {
		let mut failures = self.failures.write().await;
		failures.listings.clear();
		failures.writes.clear();
	}

	async fn check_write(&self, id: &Uuid) -> RemoteResult<()> {
		match self.failures.read().await.writes.get(id) {
			Some(error) => Err(error.clone()),
			None => Ok(()),
		}
	}
}

#[async_trait]
impl RemoteStore for MemoryRemote {
	async fn list(&self, table: Table) -> RemoteResult<Vec<Record>> {
		if self.failures.read().await.listings.contains(&table) {
			return Err(RemoteError::Transport { message: format!("listing {} failed", table) });
		}
		Ok(self
			.tables
			.read()
			.await
			.get(&table)
			.map(|t| t.values().cloned().collect())
			.unwrap_or_default())
	}

	async fn insert(&self, table: Table, record: &Record) -> RemoteResult<()> {
		self.check_write(&record.id).await?;
		let mut tables = self.tables.write().await;
		let t = tables.entry(table).or_default();
		if t.contains_key(&record.id) {
			return Err(RemoteError::AlreadyExists { id: record.id.to_string() });
		}
		t.insert(record.id, record.clone());
		self.writes.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}

	async fn update(&self, table: Table, id: Uuid, update: &RecordUpdate) -> RemoteResult<()> {
		self.check_write(&id).await?;
		let mut tables = self.tables.write().await;
		let record = tables
			.get_mut(&table)
			.and_then(|t| t.get_mut(&id))
			.ok_or_else(|| RemoteError::NotFound { id: id.to_string() })?;
		record.apply_update(update);
		self.writes.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}

	async fn delete(&self, table: Table, id: Uuid) -> RemoteResult<()> {
		self.check_write(&id).await?;
		let mut tables = self.tables.write().await;
		tables
			.get_mut(&table)
			.and_then(|t| t.remove(&id))
			.ok_or_else(|| RemoteError::NotFound { id: id.to_string() })?;
		self.writes.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}
}


// vim: ts=4
