//! Vault facade
//!
//! Ties the local store, the session and the reconciler together for
//! embedding callers and the CLI.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::Config;
use crate::conflict::Conflict;
use crate::crypto::KdfParams;
use crate::entry::{self, Decrypted, EntryPayload};
use crate::error::{StoreError, VaultError};
use crate::logging::*;
use crate::remote::RemoteStore;
use crate::session::Session;
use crate::store::LocalStore;
use crate::sync::{Reconciler, SyncSettings};
use crate::types::{Action, Record, Table};

/// Side to keep when resolving a conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keep {
	/// Re-issue the local state so the next pass pushes it
	Local,
	/// Adopt the remote copy locally without logging
	Remote,
}

impl std::str::FromStr for Keep {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"local" => Ok(Keep::Local),
			"remote" => Ok(Keep::Remote),
			_ => Err(format!("Unknown side: {} (expected local or remote)", s)),
		}
	}
}

pub struct Vault {
	store: Arc<LocalStore>,
	owner_id: Uuid,
	kdf: KdfParams,
	settings: SyncSettings,
}

impl Vault {
	/// Open the profile's store, creating it on first use
	///
	/// A new vault pins a fresh owner id and the configured KDF parameters;
	/// an existing one keeps what it was created with.
	pub fn open(config: &Config) -> Result<Vault, VaultError> {
		let store = LocalStore::open(&config.db_path())?;

		let owner_id = match store.owner_id()? {
			Some(id) => id,
			None => {
				let id = Uuid::new_v4();
				store.set_owner_id(id)?;
				info!("Created vault {} at {}", id, store.path().display());
				id
			}
		};

		let kdf = match store.kdf_params()? {
			Some(params) => {
				if params != config.kdf {
					debug!("Vault keeps its pinned KDF parameters over the configured ones");
				}
				params
			}
			None => {
				store.set_kdf_params(&config.kdf)?;
				config.kdf
			}
		};

		Ok(Vault { store: Arc::new(store), owner_id, kdf, settings: config.sync.clone() })
	}

	pub fn store(&self) -> &Arc<LocalStore> {
		&self.store
	}

	pub fn owner_id(&self) -> Uuid {
		self.owner_id
	}

	pub fn kdf_params(&self) -> &KdfParams {
		&self.kdf
	}

	pub fn unlock(&self, password: &str) -> Result<Session, VaultError> {
		Session::new(password, self.kdf)
	}

	/// Reconciler for this vault against `remote`
	pub fn reconciler(&self, remote: Arc<dyn RemoteStore>) -> Reconciler {
		Reconciler::new(Arc::clone(&self.store), remote, self.settings.clone())
	}

	// === Entries ===

	pub fn add_entry(&self, session: &Session, payload: &EntryPayload) -> Result<Uuid, VaultError> {
		let record = entry::seal_payload(session, self.owner_id, Uuid::new_v4(), payload)?;
		self.store.insert(Table::Entries, &record)?;
		debug!("Added entry {}", record.id);
		Ok(record.id)
	}

	pub fn update_entry(
		&self,
		session: &Session,
		id: Uuid,
		payload: &EntryPayload,
	) -> Result<(), VaultError> {
		let mut record = self.existing(Table::Entries, &id)?;
		entry::reseal(session, &mut record, payload)?;
		self.store.update(Table::Entries, &record)?;
		Ok(())
	}

	/// Decrypt a single entry
	pub fn entry(&self, session: &Session, id: Uuid) -> Result<EntryPayload, VaultError> {
		let record = self.existing(Table::Entries, &id)?;
		entry::open(session, &record)
	}

	pub fn delete_entry(&self, id: Uuid) -> Result<(), VaultError> {
		self.store.remove(Table::Entries, &id)?;
		Ok(())
	}

	/// Decrypt every local entry; unreadable ones are listed separately
	pub async fn entries(&self, session: &Session) -> Result<Decrypted, VaultError> {
		let records = self.store.list(Table::Entries)?;
		Ok(entry::open_entries(session, records).await)
	}

	// === Structure ===

	/// Store a structure document under `id`, inserting or updating as needed
	pub fn save_structure<T: Serialize>(
		&self,
		session: &Session,
		id: Uuid,
		value: &T,
	) -> Result<(), VaultError> {
		match self.store.get(Table::Structure, &id)? {
			Some(mut record) => {
				entry::reseal(session, &mut record, value)?;
				self.store.update(Table::Structure, &record)?;
			}
			None => {
				let record = entry::seal(session, self.owner_id, id, value)?;
				self.store.insert(Table::Structure, &record)?;
			}
		}
		Ok(())
	}

	pub fn structure<T: DeserializeOwned>(
		&self,
		session: &Session,
		id: Uuid,
	) -> Result<Option<T>, VaultError> {
		match self.store.get(Table::Structure, &id)? {
			Some(record) => Ok(Some(entry::open(session, &record)?)),
			None => Ok(None),
		}
	}

	// === Conflicts ===

	pub fn conflicts(&self) -> Result<Vec<Conflict>, VaultError> {
		Ok(self.store.open_conflicts()?)
	}

	/// Settle an open conflict
	///
	/// Keeping the local side restamps the local record (or the absence of
	/// one) and logs it again; the next pass pushes it. Keeping the remote
	/// side writes the remote copy locally, drops pending transactions for
	/// the id and logs nothing.
	pub fn resolve_conflict(&self, table: Table, id: Uuid, keep: Keep) -> Result<(), VaultError> {
		let conflict = self
			.store
			.open_conflict(table, &id)?
			.ok_or_else(|| VaultError::NoSuchConflict { table, id: id.to_string() })?;

		match keep {
			Keep::Local => match self.store.get(table, &id)? {
				Some(mut record) => {
					let now = Utc::now();
					record.updated_at = if now > record.updated_at {
						now
					} else {
						record.updated_at + chrono::Duration::milliseconds(1)
					};
					let action =
						if conflict.remote.is_some() { Action::Update } else { Action::Insert };
					self.store.reissue(table, id, Some(&record), action)?;
				}
				None => self.store.reissue(table, id, None, Action::Delete)?,
			},
			Keep::Remote => {
				match &conflict.remote {
					Some(remote) => self.store.apply_pulled(table, remote)?,
					None => {
						self.store.discard_pulled(table, &id)?;
					}
				}
				let pending: Vec<u64> = self
					.store
					.transactions()?
					.iter()
					.filter(|t| t.transaction.table == table && t.transaction.id == id)
					.map(|t| t.seq)
					.collect();
				self.store.settle_transactions(&pending)?;
			}
		}

		self.store.dismiss_conflict(table, &id)?;
		info!("Resolved conflict for {} {} keeping {:?}", table, id, keep);
		Ok(())
	}

	fn existing(&self, table: Table, id: &Uuid) -> Result<Record, VaultError> {
		self.store
			.get(table, id)?
			.ok_or_else(|| StoreError::NotFound { table, id: id.to_string() }.into())
	}
}


// vim: ts=4
