//! Resolving reported conflicts and syncing the chosen side

use chrono::{TimeZone, Utc};
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

use vaultsync::crypto::KdfParams;
use vaultsync::types::Timestamp;
use vaultsync::{
	Action, Config, ConflictReason, Keep, MemoryRemote, Record, Table, Vault, VaultError,
};

fn at(secs: i64) -> Timestamp {
	Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

fn record(id: Uuid, updated: Timestamp, payload: u8) -> Record {
	Record {
		id,
		owner_id: Uuid::nil(),
		ciphertext: vec![payload; 24],
		salt: vec![payload; 16],
		iv: vec![payload; 12],
		created_at: at(0),
		updated_at: updated,
	}
}

fn open_vault(tmp: &TempDir) -> Vault {
	let config = Config {
		data_dir: tmp.path().to_path_buf(),
		kdf: KdfParams::custom(8192, 1, 1),
		..Config::default()
	};
	Vault::open(&config).unwrap()
}

/// Local E1 inserted while another device already pushed its own E1
async fn insert_conflict(vault: &Vault, remote: &Arc<MemoryRemote>) -> (Record, Record) {
	let id = Uuid::new_v4();
	let local = record(id, at(10), 1);
	let theirs = record(id, at(20), 2);
	vault.store().insert(Table::Entries, &local).unwrap();
	remote.seed(Table::Entries, theirs.clone()).await;

	let report = vault.reconciler(remote.clone()).run().await.unwrap();
	assert_eq!(report.conflicts().count(), 1);
	assert_eq!(vault.conflicts().unwrap().len(), 1);
	(local, theirs)
}

/// Local delete of a record another device changed after our last sync
async fn delete_conflict(vault: &Vault, remote: &Arc<MemoryRemote>) -> Record {
	let id = Uuid::new_v4();
	vault.store().apply_pulled(Table::Entries, &record(id, at(10), 1)).unwrap();
	vault.store().set_last_synced_at(at(50)).unwrap();
	vault.store().remove(Table::Entries, &id).unwrap();
	let theirs = record(id, at(80), 2);
	remote.seed(Table::Entries, theirs.clone()).await;

	let report = vault.reconciler(remote.clone()).run().await.unwrap();
	let conflicts: Vec<_> = report.conflicts().collect();
	assert_eq!(conflicts.len(), 1);
	assert_eq!(conflicts[0].reason, ConflictReason::Outdated);
	theirs
}

// ============================================================================
// Keep local
// ============================================================================

#[tokio::test]
async fn test_keep_local_pushes_local_copy() {
	let tmp = TempDir::new().unwrap();
	let vault = open_vault(&tmp);
	let remote = Arc::new(MemoryRemote::new());
	let (local, _) = insert_conflict(&vault, &remote).await;

	vault.resolve_conflict(Table::Entries, local.id, Keep::Local).unwrap();
	assert!(vault.conflicts().unwrap().is_empty());

	let pending = vault.store().transactions().unwrap();
	assert_eq!(pending.len(), 1);
	assert_eq!(pending[0].transaction.action, Action::Update);
	let restamped = vault.store().get(Table::Entries, &local.id).unwrap().unwrap();
	assert!(restamped.updated_at > local.updated_at);
	assert_eq!(restamped.ciphertext, local.ciphertext);

	let report = vault.reconciler(remote.clone()).run().await.unwrap();
	assert!(report.is_clean());
	assert_eq!(report.pushed(), 1);
	let pushed = remote.get(Table::Entries, &local.id).await.unwrap();
	assert_eq!(pushed.ciphertext, local.ciphertext);
	assert_eq!(pushed.updated_at, restamped.updated_at);

	assert!(vault.reconciler(remote.clone()).run().await.unwrap().is_clean());
}

#[tokio::test]
async fn test_keep_local_absence_pushes_delete() {
	let tmp = TempDir::new().unwrap();
	let vault = open_vault(&tmp);
	let remote = Arc::new(MemoryRemote::new());
	let theirs = delete_conflict(&vault, &remote).await;

	vault.resolve_conflict(Table::Entries, theirs.id, Keep::Local).unwrap();
	let pending = vault.store().transactions().unwrap();
	assert_eq!(pending.len(), 1);
	assert_eq!(pending[0].transaction.action, Action::Delete);

	let report = vault.reconciler(remote.clone()).run().await.unwrap();
	assert!(report.is_clean());
	assert!(remote.get(Table::Entries, &theirs.id).await.is_none());
}

#[tokio::test]
async fn test_keep_local_for_missing_remote_reinserts() {
	let tmp = TempDir::new().unwrap();
	let vault = open_vault(&tmp);
	let remote = Arc::new(MemoryRemote::new());
	let local = record(Uuid::new_v4(), at(10), 1);
	vault.store().apply_pulled(Table::Structure, &local).unwrap();
	vault.store().update(Table::Structure, &local).unwrap();

	let report = vault.reconciler(remote.clone()).run().await.unwrap();
	assert_eq!(report.conflicts().next().unwrap().reason, ConflictReason::NotFound);

	vault.resolve_conflict(Table::Structure, local.id, Keep::Local).unwrap();
	assert_eq!(vault.store().transactions().unwrap()[0].transaction.action, Action::Insert);

	let report = vault.reconciler(remote.clone()).run().await.unwrap();
	assert!(report.is_clean());
	assert_eq!(remote.get(Table::Structure, &local.id).await.unwrap().ciphertext, local.ciphertext);
}

// ============================================================================
// Keep remote
// ============================================================================

#[tokio::test]
async fn test_keep_remote_adopts_remote_copy() {
	let tmp = TempDir::new().unwrap();
	let vault = open_vault(&tmp);
	let remote = Arc::new(MemoryRemote::new());
	let (local, theirs) = insert_conflict(&vault, &remote).await;
	let writes = remote.write_count();

	vault.resolve_conflict(Table::Entries, local.id, Keep::Remote).unwrap();
	assert_eq!(vault.store().get(Table::Entries, &local.id).unwrap(), Some(theirs.clone()));
	assert!(vault.store().transactions().unwrap().is_empty());
	assert!(vault.conflicts().unwrap().is_empty());

	let report = vault.reconciler(remote.clone()).run().await.unwrap();
	assert!(report.is_clean());
	assert_eq!(remote.write_count(), writes);
	assert_eq!(remote.get(Table::Entries, &local.id).await, Some(theirs));
}

#[tokio::test]
async fn test_keep_remote_restores_deleted_record() {
	let tmp = TempDir::new().unwrap();
	let vault = open_vault(&tmp);
	let remote = Arc::new(MemoryRemote::new());
	let theirs = delete_conflict(&vault, &remote).await;

	vault.resolve_conflict(Table::Entries, theirs.id, Keep::Remote).unwrap();
	assert_eq!(vault.store().get(Table::Entries, &theirs.id).unwrap(), Some(theirs.clone()));

	let report = vault.reconciler(remote.clone()).run().await.unwrap();
	assert!(report.is_clean());
	assert_eq!(remote.write_count(), 0);
}

#[tokio::test]
async fn test_keep_remote_drops_pending_changes_for_id() {
	let tmp = TempDir::new().unwrap();
	let vault = open_vault(&tmp);
	let remote = Arc::new(MemoryRemote::new());
	let (local, theirs) = insert_conflict(&vault, &remote).await;

	// Edited again locally before resolving
	vault.store().update(Table::Entries, &record(local.id, at(30), 5)).unwrap();
	let other = record(Uuid::new_v4(), at(30), 6);
	vault.store().insert(Table::Entries, &other).unwrap();

	vault.resolve_conflict(Table::Entries, local.id, Keep::Remote).unwrap();
	let pending = vault.store().transactions().unwrap();
	assert_eq!(pending.len(), 1);
	assert_eq!(pending[0].transaction.id, other.id);
	assert_eq!(vault.store().get(Table::Entries, &local.id).unwrap(), Some(theirs));
}

#[tokio::test]
async fn test_resolving_twice_fails() {
	let tmp = TempDir::new().unwrap();
	let vault = open_vault(&tmp);
	let remote = Arc::new(MemoryRemote::new());
	let (local, _) = insert_conflict(&vault, &remote).await;

	vault.resolve_conflict(Table::Entries, local.id, Keep::Remote).unwrap();
	assert!(matches!(
		vault.resolve_conflict(Table::Entries, local.id, Keep::Remote),
		Err(VaultError::NoSuchConflict { .. })
	));
}

// vim: ts=4
