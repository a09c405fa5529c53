//! Directional selection over the tiled grid.
//!
//! Cursor transitions are pure and happen on the control loop; the matching
//! focus forward runs as its own unit of work and is best-effort: the
//! visual cursor advances even when tmux refuses the focus call.

use crate::gateway::Gateway;
use crate::registry::PaneRegistry;
use gmx_core::cursor::GridCursor;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Move {
    Left,
    Right,
    Up,
    Down,
    /// 1-based slot shortcut.
    Ordinal(usize),
}

/// Grid selection state owned by the control loop.
#[derive(Debug, Clone, Copy)]
pub struct Selection {
    cursor: GridCursor,
}

impl Selection {
    pub fn new(len: usize, cols: usize) -> Self {
        Self {
            cursor: GridCursor::new(len, cols),
        }
    }

    pub fn selected(&self) -> Option<usize> {
        self.cursor.selected()
    }

    /// Clamp into a refreshed layout.
    pub fn resize(&mut self, len: usize, cols: usize) {
        self.cursor.resize(len, cols);
    }

    /// Apply a move; returns the new slot index when a transition happened.
    pub fn apply(&mut self, mv: Move) -> Option<usize> {
        let moved = match mv {
            Move::Left => self.cursor.left(),
            Move::Right => self.cursor.right(),
            Move::Up => self.cursor.up(),
            Move::Down => self.cursor.down(),
            Move::Ordinal(ordinal) => self.cursor.select_ordinal(ordinal),
        };
        if moved {
            self.cursor.selected()
        } else {
            None
        }
    }
}

/// Pane to forward focus to for `slot`, if that slot acquired one. Slots
/// that failed acquisition have no handle, so focus falls through to a
/// no-op.
pub fn focus_target(registry: &PaneRegistry, slot: usize) -> Option<String> {
    registry.get(slot).map(|handle| handle.pane_id.clone())
}

/// Forward focus to a pane. Failures are swallowed; selection already
/// moved on the control loop.
pub async fn forward_focus(gateway: Gateway, pane_id: String) {
    if let Err(err) = gateway.focus_pane(&pane_id).await {
        debug!(pane = %pane_id, error = %err, "focus forward failed");
    }
}
