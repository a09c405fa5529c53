//! Reversing a tiling pass: every borrowed pane goes home.
//!
//! Mirrors tile's error policy: resolving the cockpit's own pane is the
//! single fatal step; per-pane probe and break failures are logged and the
//! pass keeps going. The caller clears the registry once the pass returns,
//! success or not, so no entry outlives the grid.

use crate::gateway::{Gateway, MuxError};
use crate::registry::PaneRegistry;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeardownReport {
    /// Panes returned to their origin session.
    pub broken: usize,
    /// Panes skipped: already gone, the cockpit's own, or without a
    /// recorded origin.
    pub skipped: usize,
    /// Break commands that failed.
    pub failed: usize,
}

/// Return every grid member to its origin session, then restore the
/// cockpit pane and window options.
pub async fn release_grid(
    gateway: &Gateway,
    registry: &PaneRegistry,
) -> Result<TeardownReport, MuxError> {
    let home_pane = gateway.current_pane().await?;
    let mut report = TeardownReport::default();

    for (slot, handle) in registry.slots() {
        if handle.pane_id == home_pane {
            report.skipped += 1;
            continue;
        }
        let Some(session) = handle.origin_session.as_deref() else {
            debug!(slot, pane = %handle.pane_id, "no origin session recorded");
            report.skipped += 1;
            continue;
        };
        if !gateway.pane_alive(&handle.pane_id).await {
            debug!(slot, pane = %handle.pane_id, "pane already gone");
            report.skipped += 1;
            continue;
        }
        match gateway.break_pane(&handle.pane_id, session).await {
            Ok(()) => report.broken += 1,
            Err(err) => {
                warn!(
                    task = %handle.task_id,
                    pane = %handle.pane_id,
                    error = %err,
                    "pane not returned to origin"
                );
                report.failed += 1;
            }
        }
    }

    if let Err(err) = gateway.resize_pane_height(&home_pane, 100).await {
        debug!(error = %err, "cockpit pane not restored to full size");
    }
    if let Err(err) = gateway.set_border_titles(false).await {
        debug!(error = %err, "pane border titles not disabled");
    }

    Ok(report)
}
