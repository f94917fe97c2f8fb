//! Results of a reconciliation pass

use std::fmt;
use uuid::Uuid;

use crate::conflict::{Conflict, ConflictReason};
use crate::types::{Action, Table, Timestamp};

/// What went wrong with one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncErrorKind {
	/// Insert of an id the remote already has
	AlreadyExists,

	/// Update or delete of an id the remote does not have
	NotFound,

	/// Change predates the last sync, or local is ahead without a logged change
	Outdated,

	/// Delete logged while the record is still stored locally
	StillPresentLocally,

	/// Insert or update logged for a record missing from the local store
	MissingLocal,

	/// Remote write failed
	Remote,

	/// Local write failed
	Local,
}

impl From<ConflictReason> for SyncErrorKind {
	fn from(reason: ConflictReason) -> Self {
		match reason {
			ConflictReason::AlreadyExists => SyncErrorKind::AlreadyExists,
			ConflictReason::NotFound => SyncErrorKind::NotFound,
			ConflictReason::Outdated => SyncErrorKind::Outdated,
			ConflictReason::StillPresentLocally => SyncErrorKind::StillPresentLocally,
		}
	}
}

impl fmt::Display for SyncErrorKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			SyncErrorKind::AlreadyExists => "AlreadyExists",
			SyncErrorKind::NotFound => "NotFound",
			SyncErrorKind::Outdated => "Outdated",
			SyncErrorKind::StillPresentLocally => "StillPresentLocally",
			SyncErrorKind::MissingLocal => "MissingLocal",
			SyncErrorKind::Remote => "Remote",
			SyncErrorKind::Local => "Local",
		};
		f.write_str(name)
	}
}

/// One failed per-record operation; never aborts the table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncError {
	pub kind: SyncErrorKind,
	pub table: Table,
	/// `None` for records reconciled without a logged transaction
	pub action: Option<Action>,
	pub record_id: Uuid,
	pub message: String,
}

impl SyncError {
	pub fn new(
		kind: SyncErrorKind,
		table: Table,
		action: Option<Action>,
		record_id: Uuid,
		message: impl Into<String>,
	) -> Self {
		SyncError { kind, table, action, record_id, message: message.into() }
	}
}

impl fmt::Display for SyncError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.action {
			Some(action) => write!(
				f,
				"{} {} of {} {}: {}",
				self.kind, action, self.table, self.record_id, self.message
			),
			None => write!(f, "{} {} {}: {}", self.kind, self.table, self.record_id, self.message),
		}
	}
}

/// Outcome of one table's reconciliation
#[derive(Debug, Clone)]
pub struct TableReport {
	pub table: Table,
	/// Transactions written to the remote
	pub pushed: usize,
	/// Remote records copied into the local store
	pub pulled: usize,
	/// Local records removed because another device deleted them
	pub removed_locally: usize,
	/// Transactions kept for retry after a transient remote failure
	pub retained: usize,
	pub errors: Vec<SyncError>,
	pub conflicts: Vec<Conflict>,
}

impl TableReport {
	pub fn new(table: Table) -> Self {
		TableReport {
			table,
			pushed: 0,
			pulled: 0,
			removed_locally: 0,
			retained: 0,
			errors: Vec::new(),
			conflicts: Vec::new(),
		}
	}
}

/// A table whose pass was aborted outright
#[derive(Debug, Clone)]
pub struct TableFailure {
	pub table: Table,
	pub message: String,
}

/// Outcome of a full reconciliation pass
#[derive(Debug, Clone)]
pub struct SyncReport {
	pub started_at: Timestamp,
	pub previous_synced_at: Timestamp,
	pub tables: Vec<TableReport>,
	pub failures: Vec<TableFailure>,
	/// Whether `last_synced_at` was moved to `started_at`; not when a table
	/// failed or a transaction was kept for retry
	pub advanced: bool,
}

impl SyncReport {
	pub fn new(started_at: Timestamp, previous_synced_at: Timestamp) -> Self {
		SyncReport { started_at, previous_synced_at, tables: Vec::new(), failures: Vec::new(), advanced: false }
	}

	pub fn table(&self, table: Table) -> Option<&TableReport> {
		self.tables.iter().find(|t| t.table == table)
	}

	pub fn errors(&self) -> impl Iterator<Item = &SyncError> {
		self.tables.iter().flat_map(|t| t.errors.iter())
	}

	pub fn conflicts(&self) -> impl Iterator<Item = &Conflict> {
		self.tables.iter().flat_map(|t| t.conflicts.iter())
	}

	pub fn pushed(&self) -> usize {
		self.tables.iter().map(|t| t.pushed).sum()
	}

	pub fn pulled(&self) -> usize {
		self.tables.iter().map(|t| t.pulled).sum()
	}

	pub fn retained(&self) -> usize {
		self.tables.iter().map(|t| t.retained).sum()
	}

	/// No errors, conflicts or failed tables
	pub fn is_clean(&self) -> bool {
		self.failures.is_empty() && self.errors().next().is_none() && self.conflicts().next().is_none()
	}
}

// vim: ts=4
