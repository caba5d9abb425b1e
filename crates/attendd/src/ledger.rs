//! Task ledger: maps in-flight work to its originating connection and
//! keeps a per-connection outstanding-task counter.
//!
//! Invariant: every registration is matched by exactly one terminal
//! `complete`, and each connection's counter equals the number of ledger
//! entries referencing it. The counter clamps at zero so a late completion
//! racing with disconnect bookkeeping can never drive it negative.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::{ConnectionId, TaskId};

#[derive(Default)]
struct LedgerState {
    tasks: HashMap<TaskId, ConnectionId>,
    pending: HashMap<ConnectionId, usize>,
}

#[derive(Default)]
pub struct TaskLedger {
    // Held only for map mutation, never across I/O.
    state: Mutex<LedgerState>,
}

impl TaskLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task for a connection unless the connection already has
    /// `max_pending` outstanding tasks. Check and increment happen under
    /// one lock so concurrent submissions cannot overshoot the cap.
    ///
    /// Returns the connection's pending count on rejection.
    pub fn try_register(
        &self,
        task_id: TaskId,
        connection_id: ConnectionId,
        max_pending: usize,
    ) -> Result<(), usize> {
        let mut state = self.lock();
        let pending = state.pending.get(&connection_id).copied().unwrap_or(0);
        if pending >= max_pending {
            return Err(pending);
        }
        state.tasks.insert(task_id, connection_id);
        *state.pending.entry(connection_id).or_insert(0) += 1;
        Ok(())
    }

    /// Remove a task exactly once, returning the connection that submitted
    /// it. A second call for the same task returns `None` and leaves the
    /// counters untouched.
    pub fn complete(&self, task_id: TaskId) -> Option<ConnectionId> {
        let mut state = self.lock();
        let connection_id = state.tasks.remove(&task_id)?;
        if let Some(count) = state.pending.get_mut(&connection_id) {
            *count = count.saturating_sub(1);
        }
        Some(connection_id)
    }

    pub fn pending_count(&self, connection_id: ConnectionId) -> usize {
        self.lock().pending.get(&connection_id).copied().unwrap_or(0)
    }

    /// Drop a disconnected connection's counter. Tasks it still has in
    /// flight stay registered until their own completion path runs.
    pub fn remove_connection(&self, connection_id: ConnectionId) {
        self.lock().pending.remove(&connection_id);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        // A poisoned ledger lock means a panic while holding it; the maps
        // are still structurally sound, so keep serving.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn ids(n: usize) -> Vec<Uuid> {
        (0..n).map(|_| Uuid::new_v4()).collect()
    }

    #[test]
    fn counter_tracks_registrations() {
        let ledger = TaskLedger::new();
        let conn = Uuid::new_v4();
        let tasks = ids(3);

        for (i, t) in tasks.iter().enumerate() {
            ledger.try_register(*t, conn, 10).unwrap();
            assert_eq!(ledger.pending_count(conn), i + 1);
        }
        for (i, t) in tasks.iter().enumerate() {
            assert_eq!(ledger.complete(*t), Some(conn));
            assert_eq!(ledger.pending_count(conn), tasks.len() - i - 1);
        }
    }

    #[test]
    fn complete_is_exactly_once() {
        let ledger = TaskLedger::new();
        let conn = Uuid::new_v4();
        let task = Uuid::new_v4();

        ledger.try_register(task, conn, 2).unwrap();
        assert_eq!(ledger.complete(task), Some(conn));
        // Double complete: no connection returned, counter not driven negative.
        assert_eq!(ledger.complete(task), None);
        assert_eq!(ledger.pending_count(conn), 0);
    }

    #[test]
    fn cap_rejects_at_limit() {
        let ledger = TaskLedger::new();
        let conn = Uuid::new_v4();
        let tasks = ids(3);

        ledger.try_register(tasks[0], conn, 2).unwrap();
        ledger.try_register(tasks[1], conn, 2).unwrap();
        assert_eq!(ledger.try_register(tasks[2], conn, 2), Err(2));

        ledger.complete(tasks[0]);
        ledger.try_register(tasks[2], conn, 2).unwrap();
    }

    #[test]
    fn counters_are_per_connection() {
        let ledger = TaskLedger::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let tasks = ids(2);

        ledger.try_register(tasks[0], a, 2).unwrap();
        ledger.try_register(tasks[1], b, 2).unwrap();
        assert_eq!(ledger.pending_count(a), 1);
        assert_eq!(ledger.pending_count(b), 1);

        ledger.complete(tasks[0]);
        assert_eq!(ledger.pending_count(a), 0);
        assert_eq!(ledger.pending_count(b), 1);
    }

    #[test]
    fn disconnect_then_late_completion() {
        let ledger = TaskLedger::new();
        let conn = Uuid::new_v4();
        let task = Uuid::new_v4();

        ledger.try_register(task, conn, 2).unwrap();
        ledger.remove_connection(conn);
        assert_eq!(ledger.pending_count(conn), 0);
        // The in-flight task still resolves to its connection once.
        assert_eq!(ledger.complete(task), Some(conn));
        assert_eq!(ledger.pending_count(conn), 0);
    }

    #[test]
    fn counter_never_negative_under_interleaving() {
        let ledger = TaskLedger::new();
        let conn = Uuid::new_v4();
        let tasks = ids(4);

        ledger.try_register(tasks[0], conn, 10).unwrap();
        ledger.try_register(tasks[1], conn, 10).unwrap();
        ledger.complete(tasks[0]);
        ledger.complete(tasks[0]);
        ledger.try_register(tasks[2], conn, 10).unwrap();
        ledger.complete(tasks[1]);
        ledger.complete(tasks[2]);
        ledger.complete(tasks[3]);
        assert_eq!(ledger.pending_count(conn), 0);
    }
}
