//! In-memory bookkeeping for borrowed panes.
//!
//! The registry is owned by the cockpit's control loop and mutated only
//! there; asynchronous passes return results and the loop applies them.
//! A pane id appears in at most one entry at a time.

use gmx_core::PaneRole;
use std::collections::{BTreeMap, HashMap};

/// One tracked tmux pane and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaneHandle {
    /// Opaque pane id issued by tmux (e.g. `%12`).
    pub pane_id: String,
    pub role: PaneRole,
    pub task_id: String,
    /// Session the pane is returned to on teardown; grid members always
    /// carry one.
    pub origin_session: Option<String>,
    /// Stable window id inside the origin session, when known.
    pub origin_window: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PaneRegistry {
    slots: BTreeMap<usize, PaneHandle>,
    extras: HashMap<String, Vec<PaneHandle>>,
}

impl PaneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handle` at a grid slot, displacing any entry that already
    /// carries the same pane id.
    pub fn put(&mut self, slot: usize, handle: PaneHandle) {
        self.evict(&handle.pane_id);
        self.slots.insert(slot, handle);
    }

    /// Register an extra pane under its owning task.
    pub fn put_extra(&mut self, handle: PaneHandle) {
        self.evict(&handle.pane_id);
        self.extras
            .entry(handle.task_id.clone())
            .or_default()
            .push(handle);
    }

    pub fn get(&self, slot: usize) -> Option<&PaneHandle> {
        self.slots.get(&slot)
    }

    /// Every handle owned by `task_id`, grid members first.
    pub fn task_handles(&self, task_id: &str) -> Vec<&PaneHandle> {
        let mut handles: Vec<&PaneHandle> = self
            .slots
            .values()
            .filter(|handle| handle.task_id == task_id)
            .collect();
        if let Some(extras) = self.extras.get(task_id) {
            handles.extend(extras.iter());
        }
        handles
    }

    pub fn remove(&mut self, handle: &PaneHandle) {
        self.evict(&handle.pane_id);
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.extras.clear();
    }

    /// Occupied grid slots in slot order.
    pub fn slots(&self) -> impl Iterator<Item = (usize, &PaneHandle)> {
        self.slots.iter().map(|(slot, handle)| (*slot, handle))
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty() && self.extras.values().all(Vec::is_empty)
    }

    fn evict(&mut self, pane_id: &str) {
        self.slots.retain(|_, handle| handle.pane_id != pane_id);
        for extras in self.extras.values_mut() {
            extras.retain(|handle| handle.pane_id != pane_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(pane: &str, task: &str, role: PaneRole) -> PaneHandle {
        PaneHandle {
            pane_id: pane.to_string(),
            role,
            task_id: task.to_string(),
            origin_session: Some(format!("gmx-{task}")),
            origin_window: None,
        }
    }

    #[test]
    fn put_then_remove_leaves_slot_absent() {
        let mut registry = PaneRegistry::new();
        let h = handle("%1", "1", PaneRole::GridMember);
        registry.put(0, h.clone());
        assert_eq!(registry.get(0), Some(&h));

        registry.remove(&h);
        assert!(registry.get(0).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn task_handles_never_returns_removed_handles() {
        let mut registry = PaneRegistry::new();
        let grid = handle("%1", "1", PaneRole::GridMember);
        let shell = handle("%2", "1", PaneRole::ExtraShell);
        registry.put(0, grid.clone());
        registry.put_extra(shell.clone());
        assert_eq!(registry.task_handles("1").len(), 2);

        registry.remove(&shell);
        let remaining = registry.task_handles("1");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].pane_id, "%1");
    }

    #[test]
    fn pane_id_is_unique_across_entries() {
        let mut registry = PaneRegistry::new();
        registry.put(0, handle("%1", "1", PaneRole::GridMember));
        // Same external pane re-registered at a new slot after a refresh.
        registry.put(3, handle("%1", "1", PaneRole::GridMember));

        assert!(registry.get(0).is_none());
        assert!(registry.get(3).is_some());
        assert_eq!(registry.slot_count(), 1);
    }

    #[test]
    fn clear_empties_both_tables() {
        let mut registry = PaneRegistry::new();
        registry.put(0, handle("%1", "1", PaneRole::GridMember));
        registry.put(1, handle("%2", "2", PaneRole::GridMember));
        registry.put_extra(handle("%3", "2", PaneRole::ExtraAgent));

        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.task_handles("2").is_empty());
    }

    #[test]
    fn slots_iterate_in_slot_order() {
        let mut registry = PaneRegistry::new();
        registry.put(2, handle("%3", "3", PaneRole::GridMember));
        registry.put(0, handle("%1", "1", PaneRole::GridMember));
        registry.put(1, handle("%2", "2", PaneRole::GridMember));

        let order: Vec<usize> = registry.slots().map(|(slot, _)| slot).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }
}
