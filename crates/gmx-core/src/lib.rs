use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

pub mod cursor;
pub mod grid;

/// A background agent task. Owned and mutated by the store; the pane
/// subsystem only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub status: TaskStatus,
    /// tmux session the task's agent runs in.
    pub session: String,
    /// Stable tmux window id (e.g. "@3") inside that session, when known.
    #[serde(default)]
    pub window: Option<String>,
    /// Pane running the task's primary agent.
    #[serde(default)]
    pub agent_pane: Option<String>,
    /// Pane running the task's primary shell, when one was opened.
    #[serde(default)]
    pub shell_pane: Option<String>,
    /// Command line used to start the primary agent.
    #[serde(default)]
    pub agent_command: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

impl Task {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Queued,
    Processing,
    Done,
    Failed,
    Cancelled,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Queued
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Processing => "processing",
            TaskStatus::Done => "done",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// Active tasks are the ones that own a live terminal session.
    pub fn is_active(&self) -> bool {
        matches!(self, TaskStatus::Queued | TaskStatus::Processing)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Done | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_lowercase();
        match normalized.as_str() {
            "queued" | "pending" => Ok(TaskStatus::Queued),
            "processing" | "in-progress" | "in_progress" => Ok(TaskStatus::Processing),
            "done" => Ok(TaskStatus::Done),
            "failed" | "error" => Ok(TaskStatus::Failed),
            "cancelled" | "canceled" => Ok(TaskStatus::Cancelled),
            other => Err(format!("Unknown status: {other}")),
        }
    }
}

/// What a tracked pane is for. String forms exist only at the storage
/// boundary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum PaneRole {
    /// Pane joined into the tiled grid view.
    GridMember,
    /// Pane running the task's primary agent.
    PrimaryAgent,
    /// Pane running the task's primary shell.
    PrimaryShell,
    /// Additional shell split off the primary agent pane.
    ExtraShell,
    /// Additional interactive agent split off the primary agent pane.
    ExtraAgent,
}

impl PaneRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaneRole::GridMember => "grid-member",
            PaneRole::PrimaryAgent => "primary-agent",
            PaneRole::PrimaryShell => "primary-shell",
            PaneRole::ExtraShell => "extra-shell",
            PaneRole::ExtraAgent => "extra-agent",
        }
    }

    /// Extra panes are the ones created on demand and broken away during
    /// detail-view cleanup; primary panes are never bulk-removed.
    pub fn is_extra(&self) -> bool {
        matches!(self, PaneRole::ExtraShell | PaneRole::ExtraAgent)
    }
}

impl fmt::Display for PaneRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaneRole {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_lowercase();
        match normalized.as_str() {
            "grid-member" | "grid" => Ok(PaneRole::GridMember),
            "primary-agent" | "agent" => Ok(PaneRole::PrimaryAgent),
            "primary-shell" => Ok(PaneRole::PrimaryShell),
            "extra-shell" | "shell" => Ok(PaneRole::ExtraShell),
            "extra-agent" => Ok(PaneRole::ExtraAgent),
            other => Err(format!("Unknown pane role: {other}")),
        }
    }
}
