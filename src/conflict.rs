//! Conflict detection results
//!
//! A conflict is a divergence between the local and remote copy of one record
//! that the reconciler refuses to settle on its own.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::logging::*;
use crate::types::{Record, Table, Timestamp};

/// Why local and remote could not be reconciled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConflictReason {
	/// Local insert, but the id is already taken remotely
	AlreadyExists,

	/// Local update of a record the remote does not have
	NotFound,

	/// The other side changed after the last sync
	Outdated,

	/// A delete was logged but the record is still in the local store
	StillPresentLocally,
}

impl fmt::Display for ConflictReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ConflictReason::AlreadyExists => f.write_str("already exists remotely"),
			ConflictReason::NotFound => f.write_str("missing remotely"),
			ConflictReason::Outdated => f.write_str("outdated"),
			ConflictReason::StillPresentLocally => f.write_str("deleted but still present locally"),
		}
	}
}

/// Local and remote versions of a record that diverged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
	pub id: Uuid,
	pub table: Table,
	pub reason: ConflictReason,
	pub local: Option<Record>,
	pub remote: Option<Record>,
}

/// Identity used to recognise a conflict that has already been reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConflictFingerprint {
	pub table: Table,
	pub id: Uuid,
	pub local_updated_at: Option<Timestamp>,
	pub remote_updated_at: Option<Timestamp>,
}

impl Conflict {
	/// Build a conflict from the two sides
	///
	/// Returns `None` when both sides are absent; there is nothing to compare
	/// and the caller has hit an internal inconsistency.
	pub fn new(
		table: Table,
		reason: ConflictReason,
		local: Option<Record>,
		remote: Option<Record>,
	) -> Option<Conflict> {
		let id = match (&local, &remote) {
			(Some(l), _) => l.id,
			(None, Some(r)) => r.id,
			(None, None) => {
				error!("Refusing to build {} conflict in {} with both sides missing", reason, table);
				return None;
			}
		};
		Some(Conflict { id, table, reason, local, remote })
	}

	pub fn fingerprint(&self) -> ConflictFingerprint {
		ConflictFingerprint {
			table: self.table,
			id: self.id,
			local_updated_at: self.local.as_ref().map(|r| r.updated_at),
			remote_updated_at: self.remote.as_ref().map(|r| r.updated_at),
		}
	}
}

impl fmt::Display for Conflict {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} {}: {}", self.table, self.id, self.reason)
	}
}


// vim: ts=4
