// src/sched/roots.rs

//! Root association, keyed by bind generation.
//!
//! Every bind opens one generation. Usually it has exactly one root; a root
//! that joins a subgraph that is still running is added to that generation
//! instead of opening its own.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::types::TaskId;

#[derive(Debug, Default)]
struct RootEntry {
    roots: Vec<TaskId>,
    /// A structural change may have invalidated the cached counters.
    dirty: bool,
    /// Roots enqueued and not yet finalized.
    running: usize,
    /// Incremented each time `running` leaves zero.
    cycle: u64,
}

/// Scheduler-owned table of bind generations.
///
/// The lock is a leaf: callers may hold task locks but never acquire one
/// while holding it.
#[derive(Debug, Default)]
pub(crate) struct RootTable {
    entries: Mutex<HashMap<u64, RootEntry>>,
}

impl RootTable {
    pub fn open(&self, generation: u64, root: TaskId) {
        self.entries.lock().insert(
            generation,
            RootEntry {
                roots: vec![root],
                ..RootEntry::default()
            },
        );
    }

    /// Add `root` to a running generation it was bound into.
    ///
    /// Shared counters now include the new root's acknowledgements, so the
    /// generation can no longer be reused as-is.
    pub fn join(&self, generation: u64, root: TaskId) {
        if let Some(entry) = self.entries.lock().get_mut(&generation) {
            if !entry.roots.contains(&root) {
                entry.roots.push(root);
            }
            entry.dirty = true;
        }
    }

    /// Keep a running generation running. Fails if it already stopped.
    pub fn pin(&self, generation: u64) -> bool {
        match self.entries.lock().get_mut(&generation) {
            Some(entry) if entry.running > 0 => {
                entry.running += 1;
                true
            }
            _ => false,
        }
    }

    /// A root of `generation` was enqueued.
    pub fn start(&self, generation: u64) {
        if let Some(entry) = self.entries.lock().get_mut(&generation) {
            if entry.running == 0 {
                entry.cycle += 1;
            }
            entry.running += 1;
        }
    }

    /// A root of `generation` was finalized, or a pin was dropped.
    pub fn finish(&self, generation: u64) {
        if let Some(entry) = self.entries.lock().get_mut(&generation) {
            entry.running = entry.running.saturating_sub(1);
        }
    }

    pub fn is_running(&self, generation: u64) -> bool {
        self.entries
            .lock()
            .get(&generation)
            .is_some_and(|e| e.running > 0)
    }

    pub fn cycle(&self, generation: u64) -> Option<u64> {
        self.entries.lock().get(&generation).map(|e| e.cycle)
    }

    pub fn first_root(&self, generation: u64) -> Option<TaskId> {
        self.entries
            .lock()
            .get(&generation)
            .and_then(|e| e.roots.first().cloned())
    }

    pub fn is_root(&self, generation: u64, id: &TaskId) -> bool {
        self.entries
            .lock()
            .get(&generation)
            .is_some_and(|e| e.roots.contains(id))
    }

    /// `id` can be enqueued again without rebinding.
    pub fn is_clean_root(&self, generation: u64, id: &TaskId) -> bool {
        self.entries
            .lock()
            .get(&generation)
            .is_some_and(|e| !e.dirty && e.roots.contains(id))
    }

    pub fn mark_dirty(&self, generation: u64) {
        if let Some(entry) = self.entries.lock().get_mut(&generation) {
            entry.dirty = true;
        }
    }

    /// `id` left `generation`. A departing root drops out of the entry and
    /// the entry closes with its last root; any other member dirties it.
    pub fn release(&self, generation: u64, id: &TaskId) {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(&generation) else {
            return;
        };
        entry.dirty = true;
        entry.roots.retain(|r| r != id);
        if entry.roots.is_empty() && entry.running == 0 {
            entries.remove(&generation);
        }
    }

    /// Forget a generation whose bind failed.
    pub fn close(&self, generation: u64) {
        self.entries.lock().remove(&generation);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_advances_only_when_running_leaves_zero() {
        let table = RootTable::default();
        table.open(1, TaskId::from("x"));
        assert_eq!(table.cycle(1), Some(0));

        table.start(1);
        assert!(table.pin(1));
        assert_eq!(table.cycle(1), Some(1));

        table.finish(1);
        table.finish(1);
        assert!(!table.is_running(1));
        assert!(!table.pin(1));

        table.start(1);
        assert_eq!(table.cycle(1), Some(2));
    }

    #[test]
    fn joining_dirties_the_generation() {
        let table = RootTable::default();
        table.open(3, TaskId::from("x"));
        assert!(table.is_clean_root(3, &TaskId::from("x")));

        table.join(3, TaskId::from("y"));
        assert!(table.is_root(3, &TaskId::from("y")));
        assert!(!table.is_clean_root(3, &TaskId::from("x")));
        assert_eq!(table.first_root(3), Some(TaskId::from("x")));
    }

    #[test]
    fn entry_closes_with_its_last_root() {
        let table = RootTable::default();
        table.open(1, TaskId::from("x"));
        table.release(1, &TaskId::from("member"));
        assert_eq!(table.len(), 1);
        table.release(1, &TaskId::from("x"));
        assert_eq!(table.len(), 0);
    }
}
