//! Extra panes for the detail view: one shell or one more interactive
//! agent split off a task's primary agent pane.
//!
//! Records go through the durable pane store so an extra pane opened in a
//! previous cockpit run is still enumerated and cleaned up after a restart.

use crate::gateway::{Gateway, MuxError, SplitDirection};
use crate::registry::PaneHandle;
use crate::teardown::TeardownReport;
use gmx_core::{PaneRole, Task};
use gmx_storage::{PaneRecord, Store};
use tracing::{debug, warn};

/// Default width share for a task shell pane.
pub const SHELL_WIDTH_PCT: u32 = 30;

/// Split a shell off the task's primary agent pane, seed it with the task
/// context, and record it durably.
pub async fn open_shell_pane(
    gateway: &Gateway,
    store: &Store,
    task: &Task,
    width_pct: u32,
) -> Result<PaneHandle, MuxError> {
    let anchor = primary_pane(task)?;
    let pane_id = gateway
        .split_pane(SplitDirection::Horizontal, Some(width_pct), anchor, None, None)
        .await?;
    let title = format!("{} shell", task.id);
    if let Err(err) = gateway.set_pane_title(&pane_id, &title).await {
        debug!(task = %task.id, error = %err, "shell pane title not set");
    }
    gateway.send_text(&pane_id, &shell_setup(task)).await?;
    store.record_pane(&task.id, &pane_id, PaneRole::ExtraShell, &title)?;
    Ok(extra_handle(task, pane_id, PaneRole::ExtraShell))
}

/// Split a second interactive agent below the task's primary agent pane,
/// started with the same command as the primary agent.
pub async fn open_agent_pane(
    gateway: &Gateway,
    store: &Store,
    task: &Task,
) -> Result<PaneHandle, MuxError> {
    let anchor = primary_pane(task)?;
    let pane_id = gateway
        .split_pane(SplitDirection::Vertical, None, anchor, None, None)
        .await?;
    let title = format!("{} agent", task.id);
    if let Err(err) = gateway.set_pane_title(&pane_id, &title).await {
        debug!(task = %task.id, error = %err, "agent pane title not set");
    }
    if task.agent_command.is_empty() {
        debug!(task = %task.id, "no agent command recorded, pane left at a shell");
    } else {
        gateway.send_text(&pane_id, &task.agent_command).await?;
    }
    store.record_pane(&task.id, &pane_id, PaneRole::ExtraAgent, &title)?;
    Ok(extra_handle(task, pane_id, PaneRole::ExtraAgent))
}

/// Everything attached to a task: the two primary panes recorded on the
/// task row plus every durably stored extra pane.
pub fn all_task_panes(store: &Store, task: &Task) -> Result<Vec<PaneRecord>, MuxError> {
    let mut panes = Vec::new();
    if let Some(agent_pane) = task.agent_pane.as_deref() {
        panes.push(PaneRecord {
            pane_id: agent_pane.to_string(),
            task_id: task.id.clone(),
            role: PaneRole::PrimaryAgent,
            title: format!("{} agent", task.id),
            created_at: task.created_at,
        });
    }
    if let Some(shell_pane) = task.shell_pane.as_deref() {
        panes.push(PaneRecord {
            pane_id: shell_pane.to_string(),
            task_id: task.id.clone(),
            role: PaneRole::PrimaryShell,
            title: format!("{} shell", task.id),
            created_at: task.created_at,
        });
    }
    for record in store.panes_for_task(&task.id)? {
        if record.role.is_extra() {
            panes.push(record);
        }
    }
    Ok(panes)
}

/// Break every stored extra pane back out to the task's session. Primary
/// panes are never touched. Stale records are dropped either way.
pub async fn break_extra_panes(
    gateway: &Gateway,
    store: &Store,
    task: &Task,
) -> Result<TeardownReport, MuxError> {
    let mut report = TeardownReport::default();
    for record in store.panes_for_task(&task.id)? {
        if !record.role.is_extra() {
            continue;
        }
        if !gateway.pane_alive(&record.pane_id).await {
            debug!(task = %task.id, pane = %record.pane_id, "extra pane already gone");
            store.remove_pane(&record.pane_id)?;
            report.skipped += 1;
            continue;
        }
        match gateway.break_pane(&record.pane_id, &task.session).await {
            Ok(()) => {
                store.remove_pane(&record.pane_id)?;
                report.broken += 1;
            }
            Err(err) => {
                warn!(
                    task = %task.id,
                    pane = %record.pane_id,
                    error = %err,
                    "extra pane not broken away"
                );
                report.failed += 1;
            }
        }
    }
    Ok(report)
}

fn primary_pane(task: &Task) -> Result<&str, MuxError> {
    task.agent_pane
        .as_deref()
        .ok_or_else(|| MuxError::MissingPane {
            target: format!("task {} agent pane", task.id),
        })
}

/// Export the task context into a fresh shell, then clear the banner noise.
fn shell_setup(task: &Task) -> String {
    format!(
        "export GMX_TASK_ID={} GMX_TASK_TITLE={} GMX_TASK_SESSION={}; clear",
        shell_quote(&task.id),
        shell_quote(&task.title),
        shell_quote(&task.session),
    )
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

fn extra_handle(task: &Task, pane_id: String, role: PaneRole) -> PaneHandle {
    PaneHandle {
        pane_id,
        role,
        task_id: task.id.clone(),
        origin_session: Some(task.session.clone()),
        origin_window: task.window.clone(),
    }
}
