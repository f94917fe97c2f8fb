//! Folding the transaction log and applying one pending change to the remote

use std::collections::HashMap;
use uuid::Uuid;

use super::report::{SyncError, SyncErrorKind};
use crate::conflict::{Conflict, ConflictReason};
use crate::error::RemoteError;
use crate::logging::*;
use crate::remote::RemoteStore;
use crate::types::{Action, LoggedTransaction, Record, Table, Timestamp};

/// Net effect of every logged transaction for one id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOp {
	pub id: Uuid,
	pub action: Action,
	/// Log entries folded into this op; settled together
	pub seqs: Vec<u64>,
}

/// Transactions of one table after folding
#[derive(Debug, Default)]
pub struct Folded {
	/// In order of each id's first appearance in the log
	pub ops: Vec<PendingOp>,
	/// Ids whose transactions cancel out (insert then delete)
	pub cancelled: Vec<Uuid>,
	/// Log entries of the cancelled ids
	pub cancelled_seqs: Vec<u64>,
}

fn combine(previous: Option<Action>, next: Action) -> Option<Action> {
	match (previous, next) {
		(Some(Action::Insert), Action::Update) => Some(Action::Insert),
		(Some(Action::Insert), Action::Delete) => None,
		(Some(Action::Delete), Action::Insert) => Some(Action::Update),
		(Some(Action::Delete), Action::Update) => Some(Action::Update),
		(_, next) => Some(next),
	}
}

/// Reduce the log to at most one pending action per id, in log order
pub fn fold(transactions: &[LoggedTransaction]) -> Folded {
	let mut order: Vec<Uuid> = Vec::new();
	let mut state: HashMap<Uuid, (Option<Action>, Vec<u64>)> = HashMap::new();

	for logged in transactions {
		let txn = &logged.transaction;
		match state.get_mut(&txn.id) {
			Some((action, seqs)) => {
				*action = combine(*action, txn.action);
				seqs.push(logged.seq);
			}
			None => {
				order.push(txn.id);
				state.insert(txn.id, (Some(txn.action), vec![logged.seq]));
			}
		}
	}

	let mut folded = Folded::default();
	for id in order {
		if let Some((action, seqs)) = state.remove(&id) {
			match action {
				Some(action) => folded.ops.push(PendingOp { id, action, seqs }),
				None => {
					folded.cancelled.push(id);
					folded.cancelled_seqs.extend(seqs);
				}
			}
		}
	}
	folded
}

/// Result of applying one pending op
#[derive(Debug)]
pub struct OpOutcome {
	pub op: PendingOp,
	/// Remove the op's log entries after this pass
	pub settle: bool,
	/// Kept because the remote write may succeed on retry
	pub transient: bool,
	pub pushed: bool,
	pub error: Option<SyncError>,
	pub conflict: Option<Conflict>,
}

impl OpOutcome {
	fn pushed(op: PendingOp) -> Self {
		OpOutcome { op, settle: true, transient: false, pushed: true, error: None, conflict: None }
	}

	fn error(op: PendingOp, table: Table, kind: SyncErrorKind, message: String) -> Self {
		let error = SyncError::new(kind, table, Some(op.action), op.id, message);
		OpOutcome {
			op,
			settle: true,
			transient: false,
			pushed: false,
			error: Some(error),
			conflict: None,
		}
	}

	/// A conflict always comes with an error of the matching kind
	fn conflict(
		op: PendingOp,
		table: Table,
		reason: ConflictReason,
		local: Option<&Record>,
		remote: Option<&Record>,
		message: String,
	) -> Self {
		let conflict = Conflict::new(table, reason, local.cloned(), remote.cloned());
		let mut outcome = Self::error(op, table, reason.into(), message);
		outcome.conflict = conflict;
		outcome
	}
}

/// Shared inputs for every op of one table
pub struct OpContext<'a> {
	pub remote: &'a dyn RemoteStore,
	pub table: Table,
	pub last_synced_at: Timestamp,
}

impl OpContext<'_> {
	/// Decide and perform the remote write for `op`
	pub async fn apply(&self, op: PendingOp, local: Option<&Record>, remote: Option<&Record>) -> OpOutcome {
		match op.action {
			Action::Insert => self.apply_insert(op, local, remote).await,
			Action::Update => self.apply_update(op, local, remote).await,
			Action::Delete => self.apply_delete(op, local, remote).await,
		}
	}

	async fn apply_insert(
		&self,
		op: PendingOp,
		local: Option<&Record>,
		remote: Option<&Record>,
	) -> OpOutcome {
		let table = self.table;
		let local = match local {
			Some(local) => local,
			None => {
				return OpOutcome::error(
					op,
					table,
					SyncErrorKind::MissingLocal,
					"inserted record is missing from the local store".into(),
				)
			}
		};

		if remote.is_some() {
			debug!("Insert of {} {} conflicts with existing remote record", table, op.id);
			return OpOutcome::conflict(
				op,
				table,
				ConflictReason::AlreadyExists,
				Some(local),
				remote,
				"record already exists remotely".into(),
			);
		}

		if local.updated_at < self.last_synced_at {
			return OpOutcome::error(
				op,
				table,
				SyncErrorKind::Outdated,
				format!(
					"insert made at {} predates last sync at {}",
					local.updated_at, self.last_synced_at
				),
			);
		}

		match self.remote.insert(table, local).await {
			Ok(()) => {
				debug!("Pushed insert of {} {}", table, op.id);
				OpOutcome::pushed(op)
			}
			Err(RemoteError::AlreadyExists { .. }) => OpOutcome::conflict(
				op,
				table,
				ConflictReason::AlreadyExists,
				Some(local),
				None,
				"record appeared remotely during sync".into(),
			),
			Err(e) => Self::write_failed(op, table, e),
		}
	}

	async fn apply_update(
		&self,
		op: PendingOp,
		local: Option<&Record>,
		remote: Option<&Record>,
	) -> OpOutcome {
		let table = self.table;
		let local = match local {
			Some(local) => local,
			None => {
				return OpOutcome::error(
					op,
					table,
					SyncErrorKind::MissingLocal,
					"updated record is missing from the local store".into(),
				)
			}
		};

		if remote.is_none() {
			return OpOutcome::conflict(
				op,
				table,
				ConflictReason::NotFound,
				Some(local),
				None,
				"record does not exist remotely".into(),
			);
		}

		if local.updated_at < self.last_synced_at {
			debug!("Update of {} {} is stale", table, op.id);
			return OpOutcome::conflict(
				op,
				table,
				ConflictReason::Outdated,
				Some(local),
				remote,
				format!(
					"update made at {} predates last sync at {}",
					local.updated_at, self.last_synced_at
				),
			);
		}

		match self.remote.update(table, op.id, &local.payload_update()).await {
			Ok(()) => {
				debug!("Pushed update of {} {}", table, op.id);
				OpOutcome::pushed(op)
			}
			Err(RemoteError::NotFound { .. }) => OpOutcome::conflict(
				op,
				table,
				ConflictReason::NotFound,
				Some(local),
				None,
				"record vanished remotely during sync".into(),
			),
			Err(e) => Self::write_failed(op, table, e),
		}
	}

	async fn apply_delete(
		&self,
		op: PendingOp,
		local: Option<&Record>,
		remote: Option<&Record>,
	) -> OpOutcome {
		let table = self.table;

		if local.is_some() {
			warn!("Delete of {} {} logged but record still present locally", table, op.id);
			return OpOutcome::conflict(
				op,
				table,
				ConflictReason::StillPresentLocally,
				local,
				remote,
				"deleted record is still present locally".into(),
			);
		}

		let remote = match remote {
			Some(remote) => remote,
			None => {
				return OpOutcome::error(
					op,
					table,
					SyncErrorKind::NotFound,
					"record does not exist remotely".into(),
				)
			}
		};

		if remote.updated_at > self.last_synced_at {
			debug!("Delete of {} {} would discard a newer remote change", table, op.id);
			return OpOutcome::conflict(
				op,
				table,
				ConflictReason::Outdated,
				None,
				Some(remote),
				format!("remote changed at {} after last sync at {}", remote.updated_at, self.last_synced_at),
			);
		}

		match self.remote.delete(table, op.id).await {
			Ok(()) => {
				debug!("Pushed delete of {} {}", table, op.id);
				OpOutcome::pushed(op)
			}
			Err(RemoteError::NotFound { .. }) => OpOutcome::error(
				op,
				table,
				SyncErrorKind::NotFound,
				"record vanished remotely during sync".into(),
			),
			Err(e) => Self::write_failed(op, table, e),
		}
	}

	/// Transient failures keep the op in the log for the next pass
	fn write_failed(op: PendingOp, table: Table, error: RemoteError) -> OpOutcome {
		warn!("Remote {} of {} {} failed: {}", op.action, table, op.id, error);
		let transient = error.is_transient();
		let mut outcome = OpOutcome::error(op, table, SyncErrorKind::Remote, error.to_string());
		if transient {
			outcome.settle = false;
			outcome.transient = true;
		}
		outcome
	}
}


// vim: ts=4
