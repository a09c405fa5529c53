//! Grid tiling: borrow each active task's pane into the cockpit window.
//!
//! The pass is strictly sequential (tmux commands against one session do
//! not parallelize safely) and a failed slot never aborts the rest. The
//! only fatal error is not knowing which pane is home: without that, no
//! layout mutation is safe.

use crate::gateway::{Gateway, MuxError, SplitDirection};
use crate::registry::PaneHandle;
use gmx_core::{grid, PaneRole, Task};
use tracing::{debug, warn};

/// Height kept for the cockpit's own pane while the grid is up.
pub const HOME_STRIP_PCT: u32 = 10;
/// Share of the remaining space handed to the first joined pane.
pub const GRID_FILL_PCT: u32 = 90;
/// Hard cap for pane border titles.
pub const TITLE_MAX: usize = 24;

/// Result of one tiling pass. Slots line up with the task list given to
/// [`tile_tasks`]; a `None` slot failed acquisition and renders as
/// unavailable.
#[derive(Debug, Clone)]
pub struct TiledGrid {
    pub home_pane: String,
    pub cols: usize,
    pub rows: usize,
    pub slots: Vec<Option<PaneHandle>>,
}

impl TiledGrid {
    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}

/// Tile `tasks` into a fresh grid. Each pass replaces the previous one
/// wholesale; existing panes are re-joined, never duplicated.
pub async fn tile_tasks(gateway: &Gateway, tasks: &[Task]) -> Result<TiledGrid, MuxError> {
    let (cols, rows) = grid::dimensions(tasks.len());
    let home_pane = gateway.current_pane().await?;

    if tasks.is_empty() {
        return Ok(TiledGrid {
            home_pane,
            cols,
            rows,
            slots: Vec::new(),
        });
    }

    if let Err(err) = gateway.resize_pane_height(&home_pane, HOME_STRIP_PCT).await {
        warn!(error = %err, "could not shrink cockpit pane");
    }

    let mut slots: Vec<Option<PaneHandle>> = Vec::with_capacity(tasks.len());
    for (index, task) in tasks.iter().enumerate() {
        let acquired = if index == 0 {
            acquire_anchor(gateway, task, &home_pane).await
        } else {
            acquire_slot(gateway, task, index, cols, &slots).await
        };
        match acquired {
            Ok(handle) => {
                if let Err(err) = gateway
                    .set_pane_title(&handle.pane_id, &pane_title(task))
                    .await
                {
                    debug!(task = %task.id, error = %err, "pane title not set");
                }
                slots.push(Some(handle));
            }
            Err(err) => {
                warn!(task = %task.id, error = %err, "pane unavailable, slot skipped");
                slots.push(None);
            }
        }
    }

    if let Err(err) = gateway.focus_pane(&home_pane).await {
        debug!(error = %err, "could not re-focus cockpit pane");
    }
    if let Err(err) = gateway.set_border_titles(true).await {
        warn!(error = %err, "pane border titles not enabled");
    }

    Ok(TiledGrid {
        home_pane,
        cols,
        rows,
        slots,
    })
}

/// Slot 0: join the first task's pane below the cockpit strip, taking most
/// of the window.
async fn acquire_anchor(
    gateway: &Gateway,
    task: &Task,
    home_pane: &str,
) -> Result<PaneHandle, MuxError> {
    let source = source_pane(gateway, task).await?;
    gateway
        .join_pane(
            SplitDirection::Vertical,
            Some(GRID_FILL_PCT),
            &source,
            home_pane,
        )
        .await?;
    Ok(grid_handle(task, source))
}

/// Slots 1..N: join next to the row/column-derived neighbor, falling back
/// to slot 0 when the neighbor never materialized.
async fn acquire_slot(
    gateway: &Gateway,
    task: &Task,
    index: usize,
    cols: usize,
    slots: &[Option<PaneHandle>],
) -> Result<PaneHandle, MuxError> {
    let slot = grid::slot_at(index, cols);
    let (direction, neighbor) = if slot.col == 0 {
        (
            SplitDirection::Vertical,
            grid::row_start(slot.row - 1, cols),
        )
    } else {
        (SplitDirection::Horizontal, index - 1)
    };

    let target = match slots.get(neighbor).and_then(Option::as_ref) {
        Some(handle) => handle.pane_id.clone(),
        None => {
            // Neighbor never joined; lean on slot 0 so the task still lands
            // somewhere visible.
            let anchor = slots
                .first()
                .and_then(Option::as_ref)
                .ok_or_else(|| MuxError::MissingPane {
                    target: format!("slot {neighbor}"),
                })?;
            debug!(task = %task.id, slot = index, "split target missing, using first slot");
            anchor.pane_id.clone()
        }
    };

    let source = source_pane(gateway, task).await?;
    gateway
        .join_pane(direction, None, &source, &target)
        .await?;
    Ok(grid_handle(task, source))
}

/// First pane of the task's source window. The stable window id wins;
/// a named-session lookup covers tasks recorded before window ids existed.
async fn source_pane(gateway: &Gateway, task: &Task) -> Result<String, MuxError> {
    if let Some(window) = task.window.as_deref() {
        match gateway.list_panes(window).await {
            Ok(panes) if !panes.is_empty() => return Ok(panes[0].clone()),
            Ok(_) => debug!(task = %task.id, window = %window, "window has no panes"),
            Err(err) => debug!(task = %task.id, window = %window, error = %err, "window lookup failed"),
        }
    }
    let target = format!("{}:", task.session);
    let panes = gateway.list_panes(&target).await?;
    panes
        .into_iter()
        .next()
        .ok_or_else(|| MuxError::MissingPane { target })
}

fn grid_handle(task: &Task, pane_id: String) -> PaneHandle {
    PaneHandle {
        pane_id,
        role: PaneRole::GridMember,
        task_id: task.id.clone(),
        origin_session: Some(task.session.clone()),
        origin_window: task.window.clone(),
    }
}

/// Border title for a grid member: task id plus as much of the title as
/// fits.
pub fn pane_title(task: &Task) -> String {
    ellipsize(&format!("{} {}", task.id, task.title), TITLE_MAX)
}

fn ellipsize(input: &str, max: usize) -> String {
    if input.chars().count() <= max {
        return input.to_string();
    }
    if max <= 3 {
        return "...".chars().take(max).collect();
    }
    let prefix: String = input.chars().take(max - 3).collect();
    format!("{prefix}...")
}
