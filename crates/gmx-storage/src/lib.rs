use chrono::{DateTime, Utc};
use gmx_core::{PaneRole, Task, TaskStatus};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

pub const SCHEMA_VERSION: i64 = 1;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("timestamp parse error: {0}")]
    Timestamp(String),
    #[error("invalid {column} value: {value}")]
    Field { column: &'static str, value: String },
    #[error("unsupported schema version {found}, max supported {supported}")]
    UnsupportedSchemaVersion { found: i64, supported: i64 },
}

/// A durably recorded pane attached to a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaneRecord {
    pub pane_id: String,
    pub task_id: String,
    pub role: PaneRole,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// SQLite-backed store for tasks and their recorded panes.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn schema_version(&self) -> Result<i64, StorageError> {
        Ok(self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?)
    }

    pub fn migrate(&self) -> Result<(), StorageError> {
        let current = self.schema_version()?;
        if current > SCHEMA_VERSION {
            return Err(StorageError::UnsupportedSchemaVersion {
                found: current,
                supported: SCHEMA_VERSION,
            });
        }

        if current < 1 {
            let sql = include_str!("../migrations/0001_init.sql");
            self.conn.execute_batch(sql)?;
            self.conn
                .execute("PRAGMA user_version = 1", [])
                .map(|_| ())?;
        }

        Ok(())
    }

    // -----------------------------------------------------------------------
    // Tasks
    // -----------------------------------------------------------------------

    pub fn insert_task(&self, task: &Task) -> Result<(), StorageError> {
        let extra_json = serde_json::to_string(&task.extra)
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        self.conn.execute(
            "
            INSERT INTO tasks (
                id, title, status, session, window,
                agent_pane, shell_pane, agent_command, extra_json,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ",
            params![
                task.id,
                task.title,
                task.status.as_str(),
                task.session,
                task.window,
                task.agent_pane,
                task.shell_pane,
                task.agent_command,
                extra_json,
                task.created_at.to_rfc3339(),
                task.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_task(&self, id: &str) -> Result<Option<Task>, StorageError> {
        self.conn
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                params![id],
                task_from_row,
            )
            .optional()?
            .transpose()
    }

    /// Tasks filtered by status, ordered by numeric id where possible so the
    /// grid slot order is stable across refreshes.
    pub fn list_tasks(&self, status: Option<TaskStatus>) -> Result<Vec<Task>, StorageError> {
        let mut stmt = self.conn.prepare(&format!(
            "
            SELECT {TASK_COLUMNS} FROM tasks
            WHERE (?1 IS NULL OR status = ?1)
            ORDER BY CAST(id AS INTEGER), id
            "
        ))?;
        let rows = stmt.query_map(params![status.map(|s| s.as_str())], task_from_row)?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row??);
        }
        Ok(tasks)
    }

    /// The tasks that currently own a live terminal session.
    pub fn active_tasks(&self) -> Result<Vec<Task>, StorageError> {
        let mut stmt = self.conn.prepare(&format!(
            "
            SELECT {TASK_COLUMNS} FROM tasks
            WHERE status IN ('queued', 'processing')
            ORDER BY CAST(id AS INTEGER), id
            "
        ))?;
        let rows = stmt.query_map([], task_from_row)?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row??);
        }
        Ok(tasks)
    }

    pub fn update_status(&self, id: &str, status: TaskStatus) -> Result<bool, StorageError> {
        let changes = self.conn.execute(
            "UPDATE tasks SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, status.as_str(), Utc::now().to_rfc3339()],
        )?;
        Ok(changes > 0)
    }

    pub fn set_primary_panes(
        &self,
        id: &str,
        agent_pane: Option<&str>,
        shell_pane: Option<&str>,
    ) -> Result<bool, StorageError> {
        let changes = self.conn.execute(
            "UPDATE tasks SET agent_pane = ?2, shell_pane = ?3, updated_at = ?4 WHERE id = ?1",
            params![id, agent_pane, shell_pane, Utc::now().to_rfc3339()],
        )?;
        Ok(changes > 0)
    }

    /// Next free short id. Ids are store-assigned decimal strings.
    pub fn next_task_id(&self) -> Result<String, StorageError> {
        let max: Option<i64> = self.conn.query_row(
            "SELECT MAX(CAST(id AS INTEGER)) FROM tasks WHERE id GLOB '[0-9]*'",
            [],
            |row| row.get(0),
        )?;
        Ok((max.unwrap_or(0) + 1).to_string())
    }

    // -----------------------------------------------------------------------
    // Recorded panes
    // -----------------------------------------------------------------------

    pub fn record_pane(
        &self,
        task_id: &str,
        pane_id: &str,
        role: PaneRole,
        title: &str,
    ) -> Result<(), StorageError> {
        self.conn.execute(
            "
            INSERT INTO task_panes (pane_id, task_id, role, title, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(pane_id) DO UPDATE SET
                task_id=excluded.task_id,
                role=excluded.role,
                title=excluded.title
            ",
            params![
                pane_id,
                task_id,
                role.as_str(),
                title,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn panes_for_task(&self, task_id: &str) -> Result<Vec<PaneRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT pane_id, task_id, role, title, created_at
            FROM task_panes WHERE task_id = ?1
            ORDER BY created_at, pane_id
            ",
        )?;
        let rows = stmt.query_map(params![task_id], pane_from_row)?;
        let mut panes = Vec::new();
        for row in rows {
            panes.push(row??);
        }
        Ok(panes)
    }

    pub fn remove_pane(&self, pane_id: &str) -> Result<bool, StorageError> {
        let changes = self
            .conn
            .execute("DELETE FROM task_panes WHERE pane_id = ?1", params![pane_id])?;
        Ok(changes > 0)
    }
}

const TASK_COLUMNS: &str = "id, title, status, session, window, agent_pane, shell_pane, \
     agent_command, extra_json, created_at, updated_at";

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Result<Task, StorageError>> {
    let id: String = row.get(0)?;
    let title: String = row.get(1)?;
    let status: String = row.get(2)?;
    let session: String = row.get(3)?;
    let window: Option<String> = row.get(4)?;
    let agent_pane: Option<String> = row.get(5)?;
    let shell_pane: Option<String> = row.get(6)?;
    let agent_command: String = row.get(7)?;
    let extra_json: String = row.get(8)?;
    let created_at: String = row.get(9)?;
    let updated_at: String = row.get(10)?;

    Ok(build_task(
        id,
        title,
        status,
        session,
        window,
        agent_pane,
        shell_pane,
        agent_command,
        extra_json,
        created_at,
        updated_at,
    ))
}

#[allow(clippy::too_many_arguments)]
fn build_task(
    id: String,
    title: String,
    status: String,
    session: String,
    window: Option<String>,
    agent_pane: Option<String>,
    shell_pane: Option<String>,
    agent_command: String,
    extra_json: String,
    created_at: String,
    updated_at: String,
) -> Result<Task, StorageError> {
    let status = TaskStatus::from_str(&status).map_err(|_| StorageError::Field {
        column: "status",
        value: status,
    })?;
    let extra = serde_json::from_str(&extra_json)
        .map_err(|err| StorageError::Serialization(err.to_string()))?;
    Ok(Task {
        id,
        title,
        status,
        session,
        window,
        agent_pane,
        shell_pane,
        agent_command,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
        extra,
    })
}

fn pane_from_row(row: &Row<'_>) -> rusqlite::Result<Result<PaneRecord, StorageError>> {
    let pane_id: String = row.get(0)?;
    let task_id: String = row.get(1)?;
    let role: String = row.get(2)?;
    let title: String = row.get(3)?;
    let created_at: String = row.get(4)?;

    Ok((|| {
        let role = PaneRole::from_str(&role).map_err(|_| StorageError::Field {
            column: "role",
            value: role,
        })?;
        Ok(PaneRecord {
            pane_id,
            task_id,
            role,
            title,
            created_at: parse_ts(&created_at)?,
        })
    })())
}

fn parse_ts(value: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|err| StorageError::Timestamp(format!("{value}: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn task(id: &str, title: &str, status: TaskStatus) -> Task {
        let now = Utc::now();
        Task {
            id: id.to_string(),
            title: title.to_string(),
            status,
            session: format!("gmx-{id}"),
            window: Some(format!("@{id}")),
            agent_pane: Some(format!("%{id}0")),
            shell_pane: None,
            agent_command: "claude".to_string(),
            created_at: now,
            updated_at: now,
            extra: HashMap::new(),
        }
    }

    #[test]
    fn migrate_is_idempotent() {
        let db = Store::open_in_memory().expect("open db");
        db.migrate().expect("second migrate");
        assert_eq!(db.schema_version().expect("version"), SCHEMA_VERSION);
    }

    #[test]
    fn open_on_disk_creates_and_reopens() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tasks.db");
        {
            let db = Store::open(&path).expect("open db");
            db.insert_task(&task("1", "first", TaskStatus::Queued))
                .expect("insert");
        }
        let db = Store::open(&path).expect("reopen db");
        let loaded = db.get_task("1").expect("query").expect("present");
        assert_eq!(loaded.title, "first");
    }

    #[test]
    fn task_roundtrip_preserves_fields() {
        let db = Store::open_in_memory().expect("open db");
        let t = task("7", "wire up parser", TaskStatus::Processing);
        db.insert_task(&t).expect("insert");

        let loaded = db.get_task("7").expect("query").expect("present");
        assert_eq!(loaded.id, "7");
        assert_eq!(loaded.title, "wire up parser");
        assert_eq!(loaded.status, TaskStatus::Processing);
        assert_eq!(loaded.session, "gmx-7");
        assert_eq!(loaded.window.as_deref(), Some("@7"));
        assert_eq!(loaded.agent_pane.as_deref(), Some("%70"));
        assert_eq!(loaded.agent_command, "claude");
    }

    #[test]
    fn active_list_keeps_numeric_id_order_and_filters_terminal() {
        let db = Store::open_in_memory().expect("open db");
        db.insert_task(&task("10", "ten", TaskStatus::Queued))
            .expect("insert");
        db.insert_task(&task("2", "two", TaskStatus::Processing))
            .expect("insert");
        db.insert_task(&task("3", "three", TaskStatus::Done))
            .expect("insert");

        let active = db.active_tasks().expect("active");
        let ids: Vec<&str> = active.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "10"]);
    }

    #[test]
    fn status_update_touches_updated_at() {
        let db = Store::open_in_memory().expect("open db");
        db.insert_task(&task("1", "first", TaskStatus::Queued))
            .expect("insert");
        assert!(db.update_status("1", TaskStatus::Done).expect("update"));
        let loaded = db.get_task("1").expect("query").expect("present");
        assert_eq!(loaded.status, TaskStatus::Done);
        assert!(!db.update_status("missing", TaskStatus::Done).expect("noop"));
    }

    #[test]
    fn next_task_id_skips_used_numbers() {
        let db = Store::open_in_memory().expect("open db");
        assert_eq!(db.next_task_id().expect("first id"), "1");
        db.insert_task(&task("1", "a", TaskStatus::Queued))
            .expect("insert");
        db.insert_task(&task("4", "b", TaskStatus::Queued))
            .expect("insert");
        assert_eq!(db.next_task_id().expect("next id"), "5");
    }

    #[test]
    fn pane_records_roundtrip_and_remove() {
        let db = Store::open_in_memory().expect("open db");
        db.insert_task(&task("1", "first", TaskStatus::Queued))
            .expect("insert");

        db.record_pane("1", "%21", PaneRole::ExtraShell, "1 shell")
            .expect("record shell");
        db.record_pane("1", "%22", PaneRole::ExtraAgent, "1 agent")
            .expect("record agent");

        let panes = db.panes_for_task("1").expect("list");
        assert_eq!(panes.len(), 2);
        assert_eq!(panes[0].pane_id, "%21");
        assert_eq!(panes[0].role, PaneRole::ExtraShell);
        assert_eq!(panes[1].role, PaneRole::ExtraAgent);

        assert!(db.remove_pane("%21").expect("remove"));
        let panes = db.panes_for_task("1").expect("list again");
        assert_eq!(panes.len(), 1);
        assert_eq!(panes[0].pane_id, "%22");
        assert!(!db.remove_pane("%21").expect("already gone"));
    }

    #[test]
    fn recording_same_pane_twice_updates_in_place() {
        let db = Store::open_in_memory().expect("open db");
        db.insert_task(&task("1", "first", TaskStatus::Queued))
            .expect("insert");

        db.record_pane("1", "%21", PaneRole::ExtraShell, "old title")
            .expect("record");
        db.record_pane("1", "%21", PaneRole::ExtraShell, "new title")
            .expect("re-record");

        let panes = db.panes_for_task("1").expect("list");
        assert_eq!(panes.len(), 1);
        assert_eq!(panes[0].title, "new title");
    }

    #[test]
    fn unknown_status_surfaces_as_field_error() {
        let db = Store::open_in_memory().expect("open db");
        db.insert_task(&task("1", "first", TaskStatus::Queued))
            .expect("insert");
        db.conn
            .execute("UPDATE tasks SET status = 'bogus' WHERE id = '1'", [])
            .expect("corrupt row");
        match db.get_task("1") {
            Err(StorageError::Field { column, .. }) => assert_eq!(column, "status"),
            other => panic!("expected field error, got {other:?}"),
        }
    }
}
