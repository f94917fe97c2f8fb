//! Reconciliation of the local store with the remote
//!
//! One pass visits every synced table with the same `last_synced_at` snapshot:
//!
//! 1. list the remote table, the local table and the table's pending log
//! 2. fold the log per id and push each op to the remote concurrently
//! 3. reconcile remote records no op touched: pull new ones, take newer
//!    remote copies, report local copies that are ahead without a logged change.
//!    Records with an open conflict are left for the resolution workflow.
//! 4. remove local records the remote held on the previous pass but no longer
//!    lists. Records the remote never acknowledged stay.
//!
//! Per-record problems are collected into the report. Only a failed listing
//! aborts a table; `last_synced_at` then stays put so its log is replayed.
//! The same holds when a remote write failed transiently and was kept.

pub mod operations;
pub mod report;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::callbacks::{SyncEvent, SyncProgressCallback};
use crate::conflict::{Conflict, ConflictReason};
use crate::error::VaultError;
use crate::logging::*;
use crate::remote::RemoteStore;
use crate::store::LocalStore;
use crate::types::{Action, LoggedTransaction, Record, Table, Timestamp};

pub use self::operations::{fold, Folded, PendingOp};
pub use self::report::{SyncError, SyncErrorKind, SyncReport, TableFailure, TableReport};

use self::operations::OpContext;

/// Tuning for reconciliation passes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncSettings {
	/// Remote writes in flight at once per table
	pub parallel_operations: usize,

	/// Remove local records another device deleted remotely
	pub propagate_remote_deletes: bool,
}

impl Default for SyncSettings {
	fn default() -> Self {
		SyncSettings { parallel_operations: 8, propagate_remote_deletes: true }
	}
}

pub struct Reconciler {
	store: Arc<LocalStore>,
	remote: Arc<dyn RemoteStore>,
	settings: SyncSettings,
	callback: Option<Arc<dyn SyncProgressCallback>>,
	running: Mutex<()>,
}

impl Reconciler {
	pub fn new(store: Arc<LocalStore>, remote: Arc<dyn RemoteStore>, settings: SyncSettings) -> Self {
		Reconciler { store, remote, settings, callback: None, running: Mutex::new(()) }
	}

	pub fn with_callback(mut self, callback: Arc<dyn SyncProgressCallback>) -> Self {
		self.callback = Some(callback);
		self
	}

	fn emit(&self, event: SyncEvent) {
		if let Some(callback) = &self.callback {
			callback.on_event(event);
		}
	}

	/// Run one full pass
	///
	/// Fails with `SyncInProgress` if another pass is running in this process
	/// or holds the store's sync lock.
	pub async fn run(&self) -> Result<SyncReport, VaultError> {
		let _running = self.running.try_lock().map_err(|_| VaultError::SyncInProgress {
			message: "a pass is already running in this process".into(),
		})?;
		let _lock = self.store.acquire_sync_lock()?;

		let started_at = Utc::now();
		let previous = self.store.last_synced_at()?;
		let pending = self.store.transactions()?;
		info!("Sync started: {} pending transactions, last synced at {}", pending.len(), previous);

		let mut report = SyncReport::new(started_at, previous);
		for table in Table::SYNCED {
			let transactions: Vec<LoggedTransaction> =
				pending.iter().filter(|t| t.transaction.table == table).copied().collect();

			match self.sync_table(table, previous, &transactions).await {
				Ok(table_report) => {
					self.emit(SyncEvent::TableFinished {
						table,
						errors: table_report.errors.len(),
						conflicts: table_report.conflicts.len(),
					});
					report.tables.push(table_report);
				}
				Err(e) => {
					warn!("Sync of {} failed: {}", table, e);
					self.emit(SyncEvent::TableFailed { table, message: e.to_string() });
					report.failures.push(TableFailure { table, message: e.to_string() });
				}
			}
		}

		// Kept transactions must not look stale on the retry
		if report.failures.is_empty() && report.retained() == 0 {
			self.store.set_last_synced_at(started_at)?;
			report.advanced = true;
		}

		info!(
			"Sync finished: {} pushed, {} pulled, {} errors, {} conflicts, {} failed tables",
			report.pushed(),
			report.pulled(),
			report.errors().count(),
			report.conflicts().count(),
			report.failures.len()
		);
		Ok(report)
	}

	async fn sync_table(
		&self,
		table: Table,
		last_synced_at: Timestamp,
		transactions: &[LoggedTransaction],
	) -> Result<TableReport, VaultError> {
		info!("Syncing {} ({} pending transactions)", table, transactions.len());
		self.emit(SyncEvent::TableStarted { table, pending: transactions.len() });

		let remote_records = self.remote.list(table).await?;
		self.emit(SyncEvent::RemoteListed { table, records: remote_records.len() });
		let local_records = self.store.list(table)?;

		let remote: HashMap<Uuid, Record> = remote_records.into_iter().map(|r| (r.id, r)).collect();
		let seen_remotely = self.store.remote_ids(table)?;
		let mut remote_ids: HashSet<Uuid> = remote.keys().copied().collect();
		let local: HashMap<Uuid, Record> = local_records.into_iter().map(|r| (r.id, r)).collect();
		let open: HashMap<Uuid, Conflict> = self
			.store
			.open_conflicts()?
			.into_iter()
			.filter(|c| c.table == table)
			.map(|c| (c.id, c))
			.collect();

		let mut report = TableReport::new(table);
		let folded = fold(transactions);
		let touched: HashSet<Uuid> = folded.ops.iter().map(|op| op.id).collect();

		// Step 2: push logged changes
		let ctx = OpContext { remote: self.remote.as_ref(), table, last_synced_at };
		let parallel = self.settings.parallel_operations.max(1);
		let outcomes: Vec<_> = stream::iter(folded.ops)
			.map(|op| {
				let (l, r) = (local.get(&op.id), remote.get(&op.id));
				ctx.apply(op, l, r)
			})
			.buffered(parallel)
			.collect()
			.await;

		let mut settled: Vec<u64> = folded.cancelled_seqs;
		for outcome in outcomes {
			if outcome.settle {
				settled.extend_from_slice(&outcome.op.seqs);
			}
			if outcome.transient {
				report.retained += 1;
			}
			if outcome.pushed {
				match outcome.op.action {
					Action::Delete => remote_ids.remove(&outcome.op.id),
					Action::Insert | Action::Update => remote_ids.insert(outcome.op.id),
				};
				report.pushed += 1;
				self.emit(SyncEvent::Pushed { table, id: outcome.op.id, action: outcome.op.action });
			}
			if let Some(error) = outcome.error {
				report.errors.push(error);
			}
			if let Some(conflict) = outcome.conflict {
				self.report_conflict(&mut report, conflict);
			}
		}
		self.store.settle_transactions(&settled)?;

		// Step 3: records no transaction touched; open conflicts pin their record
		for (id, remote_record) in &remote {
			if touched.contains(id) {
				continue;
			}
			match open.get(id) {
				Some(existing) => self.refresh_conflict(&mut report, existing, local.get(id), remote_record),
				None => self.reconcile_untouched(&mut report, local.get(id), remote_record),
			}
		}

		// Step 4: only ids the remote acknowledged before can have been deleted there
		if self.settings.propagate_remote_deletes {
			for (id, local_record) in &local {
				if touched.contains(id) || remote.contains_key(id) || open.contains_key(id) {
					continue;
				}
				if seen_remotely.contains(id) {
					self.remove_deleted_remotely(&mut report, local_record);
				}
			}
		}
		self.store.set_remote_ids(table, &remote_ids)?;

		info!(
			"Synced {}: {} pushed, {} pulled, {} removed, {} errors, {} conflicts",
			table,
			report.pushed,
			report.pulled,
			report.removed_locally,
			report.errors.len(),
			report.conflicts.len()
		);
		Ok(report)
	}

	fn reconcile_untouched(&self, report: &mut TableReport, local: Option<&Record>, remote: &Record) {
		let table = report.table;
		match local {
			Some(local) if local == remote => {}
			Some(local) if remote.updated_at < local.updated_at => {
				if let Some(conflict) = Conflict::new(
					table,
					ConflictReason::Outdated,
					Some(local.clone()),
					Some(remote.clone()),
				) {
					report.errors.push(SyncError::new(
						SyncErrorKind::Outdated,
						table,
						None,
						remote.id,
						"local copy is newer than remote but no change was logged",
					));
					self.report_conflict(report, conflict);
				}
			}
			_ => {
				if let Err(e) = self.store.apply_pulled(table, remote) {
					warn!("Failed to store pulled {} {}: {}", table, remote.id, e);
					report.errors.push(SyncError::new(
						SyncErrorKind::Local,
						table,
						None,
						remote.id,
						e.to_string(),
					));
					return;
				}
				debug!("Pulled {} {}", table, remote.id);
				report.pulled += 1;
				self.emit(SyncEvent::Pulled { table, id: remote.id, removed: false });
			}
		}
	}

	/// Re-check a record held by an open conflict
	///
	/// Identical sides are not reported again. The conflict is dropped once
	/// both sides agree, and re-reported with the current sides when either
	/// changed since it was recorded.
	fn refresh_conflict(
		&self,
		report: &mut TableReport,
		existing: &Conflict,
		local: Option<&Record>,
		remote: &Record,
	) {
		let table = report.table;
		if local == Some(remote) {
			debug!("Conflict for {} {} settled elsewhere", table, remote.id);
			if let Err(e) = self.store.dismiss_conflict(table, &remote.id) {
				warn!("Failed to clear conflict for {} {}: {}", table, remote.id, e);
			}
			return;
		}

		let current = match Conflict::new(table, existing.reason, local.cloned(), Some(remote.clone())) {
			Some(current) => current,
			None => return,
		};
		if current.fingerprint() == existing.fingerprint() {
			debug!("Conflict for {} {} already open", table, remote.id);
			return;
		}

		report.errors.push(SyncError::new(
			existing.reason.into(),
			table,
			None,
			remote.id,
			"record changed again while its conflict was open",
		));
		self.report_conflict(report, current);
	}

	fn remove_deleted_remotely(&self, report: &mut TableReport, local: &Record) {
		let table = report.table;
		match self.store.discard_pulled(table, &local.id) {
			Ok(_) => {
				debug!("Removed {} {} deleted on another device", table, local.id);
				report.removed_locally += 1;
				self.emit(SyncEvent::Pulled { table, id: local.id, removed: true });
			}
			Err(e) => {
				warn!("Failed to remove {} {}: {}", table, local.id, e);
				report.errors.push(SyncError::new(SyncErrorKind::Local, table, None, local.id, e.to_string()));
			}
		}
	}

	fn report_conflict(&self, report: &mut TableReport, conflict: Conflict) {
		if let Err(e) = self.store.record_conflict(&conflict) {
			warn!("Failed to persist conflict {}: {}", conflict, e);
		}
		self.emit(SyncEvent::ConflictDetected(conflict.clone()));
		report.conflicts.push(conflict);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::remote::MemoryRemote;
	use tempfile::TempDir;

	fn setup(tmp: &TempDir) -> (Arc<LocalStore>, Arc<MemoryRemote>) {
		let store = Arc::new(LocalStore::open(&tmp.path().join("vault.db")).unwrap());
		(store, Arc::new(MemoryRemote::new()))
	}

	#[tokio::test]
	async fn test_empty_pass_advances_metadata() {
		let tmp = TempDir::new().unwrap();
		let (store, remote) = setup(&tmp);
		let reconciler = Reconciler::new(store.clone(), remote, SyncSettings::default());

		let report = reconciler.run().await.unwrap();
		assert!(report.is_clean());
		assert!(report.advanced);
		assert_eq!(store.last_synced_at().unwrap(), report.started_at);
		assert_eq!(report.tables.len(), 2);
		assert!(!store.is_sync_locked().unwrap());
	}

	#[tokio::test]
	async fn test_lock_held_elsewhere_is_rejected() {
		let tmp = TempDir::new().unwrap();
		let (store, remote) = setup(&tmp);
		let reconciler = Reconciler::new(store.clone(), remote, SyncSettings::default());

		let _guard = store.acquire_sync_lock().unwrap();
		assert!(matches!(reconciler.run().await, Err(VaultError::SyncInProgress { .. })));
	}

	#[tokio::test]
	async fn test_events_emitted_per_table() {
		let tmp = TempDir::new().unwrap();
		let (store, remote) = setup(&tmp);
		let events = Arc::new(std::sync::Mutex::new(Vec::new()));
		let sink = events.clone();
		let reconciler = Reconciler::new(store, remote, SyncSettings::default()).with_callback(Arc::new(
			move |event: SyncEvent| {
				if let SyncEvent::TableFinished { table, .. } = event {
					sink.lock().unwrap().push(table);
				}
			},
		));

		reconciler.run().await.unwrap();
		assert_eq!(*events.lock().unwrap(), vec![Table::Entries, Table::Structure]);
	}
}

// vim: ts=4
