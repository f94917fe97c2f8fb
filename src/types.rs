//! Core record and transaction types shared by the store, remote and reconciler

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Timestamp type used on records and metadata (serialised as ISO-8601)
pub type Timestamp = DateTime<Utc>;

/// The Unix epoch, used when no sync has happened yet
pub fn epoch() -> Timestamp {
	Utc.timestamp_opt(0, 0).single().unwrap_or_default()
}

/// Record tables that take part in synchronisation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
	Entries,
	Structure,
}

impl Table {
	/// Tables in the order a reconciliation pass visits them
	pub const SYNCED: [Table; 2] = [Table::Entries, Table::Structure];

	pub fn as_str(&self) -> &'static str {
		match self {
			Table::Entries => "entries",
			Table::Structure => "structure",
		}
	}
}

impl fmt::Display for Table {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Table {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"entries" | "entry" => Ok(Table::Entries),
			"structure" => Ok(Table::Structure),
			_ => Err(format!("Unknown table: {}", s)),
		}
	}
}

/// Kind of local mutation recorded in the transaction log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
	Insert,
	Update,
	Delete,
}

impl fmt::Display for Action {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Action::Insert => f.write_str("insert"),
			Action::Update => f.write_str("update"),
			Action::Delete => f.write_str("delete"),
		}
	}
}

/// A logged, not yet synchronised local mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
	pub id: Uuid,
	pub table: Table,
	pub action: Action,
}

impl Transaction {
	pub fn new(id: Uuid, table: Table, action: Action) -> Self {
		Transaction { id, table, action }
	}
}

/// Transaction together with its position in the local log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoggedTransaction {
	pub seq: u64,
	pub transaction: Transaction,
}

/// An encrypted unit of user data with its salt, IV and timestamps
///
/// Byte fields travel as base64 text, timestamps as ISO-8601.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
	pub id: Uuid,
	pub owner_id: Uuid,
	#[serde(with = "crate::codec::base64_bytes")]
	pub ciphertext: Vec<u8>,
	#[serde(with = "crate::codec::base64_bytes")]
	pub salt: Vec<u8>,
	#[serde(with = "crate::codec::base64_bytes")]
	pub iv: Vec<u8>,
	pub created_at: Timestamp,
	pub updated_at: Timestamp,
}

impl Record {
	/// The mutable part of the record, as pushed on update
	pub fn payload_update(&self) -> RecordUpdate {
		RecordUpdate {
			ciphertext: self.ciphertext.clone(),
			salt: self.salt.clone(),
			iv: self.iv.clone(),
			updated_at: self.updated_at,
		}
	}

	/// Replace the encrypted payload, leaving identity and creation time alone
	pub fn apply_update(&mut self, update: &RecordUpdate) {
		self.ciphertext = update.ciphertext.clone();
		self.salt = update.salt.clone();
		self.iv = update.iv.clone();
		self.updated_at = update.updated_at;
	}
}

/// Fields replaced on a remote update; id, owner and creation time are immutable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordUpdate {
	#[serde(with = "crate::codec::base64_bytes")]
	pub ciphertext: Vec<u8>,
	#[serde(with = "crate::codec::base64_bytes")]
	pub salt: Vec<u8>,
	#[serde(with = "crate::codec::base64_bytes")]
	pub iv: Vec<u8>,
	pub updated_at: Timestamp,
}


// vim: ts=4
