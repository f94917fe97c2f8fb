//! Callback trait for sync progress reporting

use uuid::Uuid;

use crate::conflict::Conflict;
use crate::types::{Action, Table};

/// Events emitted during a reconciliation pass
#[derive(Debug, Clone)]
pub enum SyncEvent {
	/// A table's reconciliation is starting
	TableStarted { table: Table, pending: usize },

	/// Remote listing fetched
	RemoteListed { table: Table, records: usize },

	/// A local transaction was written to the remote
	Pushed { table: Table, id: Uuid, action: Action },

	/// A remote record was copied into (or removed from) the local store
	Pulled { table: Table, id: Uuid, removed: bool },

	ConflictDetected(Conflict),

	/// The table's pass was aborted
	TableFailed { table: Table, message: String },

	TableFinished { table: Table, errors: usize, conflicts: usize },
}

/// Trait for receiving sync events as a unified callback
pub trait SyncProgressCallback: Send + Sync {
	/// Called for all sync events
	fn on_event(&self, _event: SyncEvent) {}
}

impl<T: Fn(SyncEvent) + Send + Sync> SyncProgressCallback for T {
	fn on_event(&self, event: SyncEvent) {
		self(event);
	}
}

/// Callback that ignores every event
pub struct NoProgressCallback;

impl SyncProgressCallback for NoProgressCallback {}


// vim: ts=4
