use crossterm::event::{KeyCode, KeyEvent};
use gmx_core::Task;
use gmx_mux::nav::{self, Move, Selection};
use gmx_mux::teardown::TeardownReport;
use gmx_mux::{extra, gateway, teardown, tile, Gateway, PaneHandle, PaneRegistry, TiledGrid};
use gmx_storage::{PaneRecord, Store, StorageError};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub const SPINNER_FRAMES: [&str; 4] = ["|", "/", "-", "\\"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Tasks,
    Grid,
    Detail,
}

/// Grid metadata owned by the control loop; the pane registry lives on the
/// [`App`] and is only mutated there.
pub struct GridMeta {
    pub home_pane: String,
    pub cols: usize,
    pub rows: usize,
    pub selection: Selection,
    /// Task list snapshot the grid was tiled from, in slot order.
    pub tasks: Vec<Task>,
}

pub struct DetailMeta {
    pub task: Task,
    pub panes: Vec<PaneRecord>,
}

/// Completion messages from spawned multiplexer passes. Tiling results
/// carry the pass generation so a refresh or view exit can discard results
/// that refer to slots which no longer exist.
pub enum MuxEvent {
    GridReady {
        generation: u64,
        tiled: TiledGrid,
        tasks: Vec<Task>,
    },
    GridFailed {
        generation: u64,
        message: String,
    },
    GridReleased(TeardownReport),
    GridReleaseFailed(String),
    ExtraPaneOpened(PaneHandle),
    ExtraPaneFailed(String),
    ExtrasBroken(TeardownReport),
}

#[derive(Clone, Debug)]
pub struct Config {
    pub db_path: PathBuf,
    pub shell_pane_pct: u32,
}

pub struct App {
    pub config: Config,
    pub store: Store,
    pub gateway: Gateway,
    pub view: View,
    pub tasks: Vec<Task>,
    pub list_index: usize,
    pub registry: PaneRegistry,
    pub grid: Option<GridMeta>,
    pub detail: Option<DetailMeta>,
    /// Label of the pass in flight, if any; drives the spinner.
    pub busy: Option<&'static str>,
    pub spinner_frame: usize,
    pub status_note: Option<String>,
    pub should_quit: bool,
    /// Bumped whenever tiling results would no longer fit the current view;
    /// stale completions are dropped on arrival.
    generation: u64,
    events_tx: mpsc::Sender<MuxEvent>,
}

impl App {
    pub fn new(
        config: Config,
        store: Store,
        gateway: Gateway,
        events_tx: mpsc::Sender<MuxEvent>,
    ) -> Self {
        Self {
            config,
            store,
            gateway,
            view: View::Tasks,
            tasks: Vec::new(),
            list_index: 0,
            registry: PaneRegistry::new(),
            grid: None,
            detail: None,
            busy: None,
            spinner_frame: 0,
            status_note: None,
            should_quit: false,
            generation: 0,
            events_tx,
        }
    }

    pub fn reload_tasks(&mut self) {
        match self.store.list_tasks(None) {
            Ok(tasks) => {
                self.tasks = tasks;
                if self.list_index >= self.tasks.len() {
                    self.list_index = self.tasks.len().saturating_sub(1);
                }
            }
            Err(err) => self.note(format!("task reload failed: {err}")),
        }
    }

    pub fn selected_task(&self) -> Option<&Task> {
        self.tasks.get(self.list_index)
    }

    pub fn tick(&mut self) {
        if self.busy.is_some() {
            self.spinner_frame = (self.spinner_frame + 1) % SPINNER_FRAMES.len();
        }
    }

    pub fn spinner(&self) -> Option<String> {
        self.busy
            .map(|label| format!("{} {label}", SPINNER_FRAMES[self.spinner_frame]))
    }

    pub fn note(&mut self, message: impl Into<String>) {
        self.status_note = Some(message.into());
    }

    // -----------------------------------------------------------------------
    // Input
    // -----------------------------------------------------------------------

    pub fn handle_key(&mut self, key: KeyEvent) {
        match self.view {
            View::Tasks => self.handle_tasks_key(key),
            View::Grid => self.handle_grid_key(key),
            View::Detail => self.handle_detail_key(key),
        }
    }

    fn handle_tasks_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('j') | KeyCode::Down => {
                if self.list_index + 1 < self.tasks.len() {
                    self.list_index += 1;
                }
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.list_index = self.list_index.saturating_sub(1);
            }
            KeyCode::Char('r') => {
                self.reload_tasks();
                self.note("tasks reloaded");
            }
            KeyCode::Char('g') => self.open_grid(),
            KeyCode::Enter => self.open_detail(),
            _ => {}
        }
    }

    fn handle_grid_key(&mut self, key: KeyEvent) {
        if self.busy.is_some() {
            // A pass is in flight; leaving the view is still allowed and
            // simply discards the in-flight results.
            if matches!(key.code, KeyCode::Char('q') | KeyCode::Esc) {
                self.close_grid();
            }
            return;
        }
        let mv = match key.code {
            KeyCode::Char('h') | KeyCode::Left => Some(Move::Left),
            KeyCode::Char('l') | KeyCode::Right => Some(Move::Right),
            KeyCode::Char('k') | KeyCode::Up => Some(Move::Up),
            KeyCode::Char('j') | KeyCode::Down => Some(Move::Down),
            KeyCode::Char(ch @ '1'..='9') => {
                Some(Move::Ordinal(ch.to_digit(10).unwrap_or(0) as usize))
            }
            KeyCode::Char('r') => {
                self.open_grid();
                None
            }
            KeyCode::Char('q') | KeyCode::Esc => {
                self.close_grid();
                None
            }
            _ => None,
        };
        if let Some(mv) = mv {
            self.move_grid_selection(mv);
        }
    }

    fn handle_detail_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => {
                self.detail = None;
                self.view = View::Tasks;
            }
            KeyCode::Char('s') => self.open_shell_pane(),
            KeyCode::Char('a') => self.open_agent_pane(),
            KeyCode::Char('x') => self.break_extra_panes(),
            _ => {}
        }
    }

    // -----------------------------------------------------------------------
    // Grid view
    // -----------------------------------------------------------------------

    /// Tile the active tasks; also serves as the refresh path, replacing the
    /// previous pass wholesale when it completes.
    pub fn open_grid(&mut self) {
        if self.busy.is_some() {
            return;
        }
        let active = match self.store.active_tasks() {
            Ok(tasks) => tasks,
            Err(err) => {
                self.note(format!("active tasks unavailable: {err}"));
                return;
            }
        };
        if active.is_empty() {
            self.note("no active tasks to tile");
            return;
        }
        self.generation += 1;
        let generation = self.generation;
        self.busy = Some("tiling panes");
        self.view = View::Grid;
        let gateway = self.gateway.clone();
        let events_tx = self.events_tx.clone();
        tokio::spawn(async move {
            let pass = tokio::time::timeout(
                gateway::BULK_TIMEOUT,
                tile::tile_tasks(&gateway, &active),
            )
            .await;
            let event = match pass {
                Ok(Ok(tiled)) => MuxEvent::GridReady {
                    generation,
                    tiled,
                    tasks: active,
                },
                Ok(Err(err)) => MuxEvent::GridFailed {
                    generation,
                    message: err.to_string(),
                },
                Err(_) => MuxEvent::GridFailed {
                    generation,
                    message: "tiling pass timed out".to_string(),
                },
            };
            let _ = events_tx.send(event).await;
        });
    }

    fn close_grid(&mut self) {
        if self.busy == Some("restoring panes") {
            return;
        }
        // Any tiling still in flight is stale from here on.
        self.generation += 1;
        self.busy = Some("restoring panes");
        let gateway = self.gateway.clone();
        let events_tx = self.events_tx.clone();
        let registry = self.registry.clone();
        tokio::spawn(async move {
            let pass = tokio::time::timeout(
                gateway::BULK_TIMEOUT,
                teardown::release_grid(&gateway, &registry),
            )
            .await;
            let event = match pass {
                Ok(Ok(report)) => MuxEvent::GridReleased(report),
                Ok(Err(err)) => MuxEvent::GridReleaseFailed(err.to_string()),
                Err(_) => MuxEvent::GridReleaseFailed("release pass timed out".to_string()),
            };
            let _ = events_tx.send(event).await;
        });
    }

    fn move_grid_selection(&mut self, mv: Move) {
        let Some(grid) = self.grid.as_mut() else {
            return;
        };
        let Some(slot) = grid.selection.apply(mv) else {
            return;
        };
        // Best-effort focus forward; the cursor has already moved.
        if let Some(pane_id) = nav::focus_target(&self.registry, slot) {
            tokio::spawn(nav::forward_focus(self.gateway.clone(), pane_id));
        }
    }

    // -----------------------------------------------------------------------
    // Detail view
    // -----------------------------------------------------------------------

    fn open_detail(&mut self) {
        let Some(task) = self.selected_task().cloned() else {
            return;
        };
        match extra::all_task_panes(&self.store, &task) {
            Ok(panes) => {
                self.detail = Some(DetailMeta { task, panes });
                self.view = View::Detail;
            }
            Err(err) => self.note(format!("pane listing failed: {err}")),
        }
    }

    fn refresh_detail_panes(&mut self) {
        let Some(task) = self.detail.as_ref().map(|d| d.task.clone()) else {
            return;
        };
        match extra::all_task_panes(&self.store, &task) {
            Ok(panes) => {
                if let Some(detail) = self.detail.as_mut() {
                    detail.panes = panes;
                }
            }
            Err(err) => self.note(format!("pane listing failed: {err}")),
        }
    }

    fn open_shell_pane(&mut self) {
        let Some(task) = self.detail.as_ref().map(|d| d.task.clone()) else {
            return;
        };
        if self.busy.is_some() {
            return;
        }
        self.busy = Some("opening shell pane");
        let gateway = self.gateway.clone();
        let events_tx = self.events_tx.clone();
        let db_path = self.config.db_path.clone();
        let width_pct = self.config.shell_pane_pct;
        tokio::spawn(async move {
            let event = match open_extra(
                gateway, db_path, task, width_pct, ExtraKind::Shell,
            )
            .await
            {
                Ok(handle) => MuxEvent::ExtraPaneOpened(handle),
                Err(err) => MuxEvent::ExtraPaneFailed(err.to_string()),
            };
            let _ = events_tx.send(event).await;
        });
    }

    fn open_agent_pane(&mut self) {
        let Some(task) = self.detail.as_ref().map(|d| d.task.clone()) else {
            return;
        };
        if self.busy.is_some() {
            return;
        }
        self.busy = Some("opening agent pane");
        let gateway = self.gateway.clone();
        let events_tx = self.events_tx.clone();
        let db_path = self.config.db_path.clone();
        tokio::spawn(async move {
            let event = match open_extra(gateway, db_path, task, 0, ExtraKind::Agent).await {
                Ok(handle) => MuxEvent::ExtraPaneOpened(handle),
                Err(err) => MuxEvent::ExtraPaneFailed(err.to_string()),
            };
            let _ = events_tx.send(event).await;
        });
    }

    fn break_extra_panes(&mut self) {
        let Some(task) = self.detail.as_ref().map(|d| d.task.clone()) else {
            return;
        };
        if self.busy.is_some() {
            return;
        }
        self.busy = Some("breaking extra panes");
        let gateway = self.gateway.clone();
        let events_tx = self.events_tx.clone();
        let db_path = self.config.db_path.clone();
        tokio::spawn(async move {
            let event = match break_extras(gateway, db_path, task).await {
                Ok(report) => MuxEvent::ExtrasBroken(report),
                Err(err) => MuxEvent::ExtraPaneFailed(err.to_string()),
            };
            let _ = events_tx.send(event).await;
        });
    }

    // -----------------------------------------------------------------------
    // Completion messages
    // -----------------------------------------------------------------------

    pub fn apply_mux_event(&mut self, event: MuxEvent) {
        match event {
            MuxEvent::GridReady {
                generation,
                tiled,
                tasks,
            } => {
                if generation != self.generation {
                    debug!(generation, "stale tiling pass discarded");
                    return;
                }
                self.apply_grid_ready(tiled, tasks);
            }
            MuxEvent::GridFailed {
                generation,
                message,
            } => {
                if generation != self.generation {
                    debug!(generation, "stale tiling failure discarded");
                    return;
                }
                self.busy = None;
                self.view = View::Tasks;
                self.note(format!("grid setup failed: {message}"));
            }
            MuxEvent::GridReleased(report) => {
                self.busy = None;
                self.registry.clear();
                self.grid = None;
                self.view = View::Tasks;
                self.note(format!(
                    "grid closed: {} returned, {} skipped, {} failed",
                    report.broken, report.skipped, report.failed
                ));
            }
            MuxEvent::GridReleaseFailed(message) => {
                // The pass could not even start; drop the stale entries so
                // nothing references panes we no longer control.
                self.busy = None;
                self.registry.clear();
                self.grid = None;
                self.view = View::Tasks;
                warn!(error = %message, "grid release failed");
                self.note(format!("grid release failed: {message}"));
            }
            MuxEvent::ExtraPaneOpened(handle) => {
                self.busy = None;
                self.note(format!("pane {} opened", handle.pane_id));
                self.registry.put_extra(handle);
                self.refresh_detail_panes();
            }
            MuxEvent::ExtraPaneFailed(message) => {
                self.busy = None;
                self.note(format!("pane operation failed: {message}"));
            }
            MuxEvent::ExtrasBroken(report) => {
                self.busy = None;
                self.note(format!(
                    "extra panes: {} returned, {} skipped, {} failed",
                    report.broken, report.skipped, report.failed
                ));
                self.refresh_detail_panes();
            }
        }
    }

    fn apply_grid_ready(&mut self, tiled: TiledGrid, tasks: Vec<Task>) {
        self.busy = None;
        self.registry.clear();
        for (slot, handle) in tiled.slots.iter().enumerate() {
            if let Some(handle) = handle.clone() {
                self.registry.put(slot, handle);
            }
        }

        let len = tiled.slots.len();
        let selection = match self.grid.take() {
            Some(mut previous) => {
                previous.selection.resize(len, tiled.cols);
                previous.selection
            }
            None => Selection::new(len, tiled.cols),
        };

        let occupied = tiled.occupied();
        self.grid = Some(GridMeta {
            home_pane: tiled.home_pane,
            cols: tiled.cols,
            rows: tiled.rows,
            selection,
            tasks,
        });
        self.view = View::Grid;
        self.note(format!("grid up: {occupied}/{len} panes"));
    }
}

enum ExtraKind {
    Shell,
    Agent,
}

/// Extra-pane work runs off the control loop; it opens its own store
/// connection so the loop's connection stays single-threaded.
async fn open_extra(
    gateway: Gateway,
    db_path: PathBuf,
    task: Task,
    width_pct: u32,
    kind: ExtraKind,
) -> Result<PaneHandle, gmx_mux::MuxError> {
    let store = open_store(db_path)?;
    match kind {
        ExtraKind::Shell => extra::open_shell_pane(&gateway, &store, &task, width_pct).await,
        ExtraKind::Agent => extra::open_agent_pane(&gateway, &store, &task).await,
    }
}

async fn break_extras(
    gateway: Gateway,
    db_path: PathBuf,
    task: Task,
) -> Result<TeardownReport, gmx_mux::MuxError> {
    let store = open_store(db_path)?;
    extra::break_extra_panes(&gateway, &store, &task).await
}

fn open_store(db_path: PathBuf) -> Result<Store, StorageError> {
    Store::open(db_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use gmx_core::{PaneRole, TaskStatus};
    use std::collections::HashMap;

    fn test_task(id: &str, status: TaskStatus) -> Task {
        let now = Utc::now();
        Task {
            id: id.to_string(),
            title: format!("task {id}"),
            status,
            session: format!("gmx-{id}"),
            window: None,
            agent_pane: Some(format!("%{id}0")),
            shell_pane: None,
            agent_command: String::new(),
            created_at: now,
            updated_at: now,
            extra: HashMap::new(),
        }
    }

    fn test_app() -> App {
        let (tx, _rx) = mpsc::channel(4);
        let store = Store::open_in_memory().expect("open store");
        let config = Config {
            db_path: PathBuf::from(":memory:"),
            shell_pane_pct: 30,
        };
        App::new(config, store, Gateway::new(), tx)
    }

    fn handle(pane: &str, task: &str) -> PaneHandle {
        PaneHandle {
            pane_id: pane.to_string(),
            role: PaneRole::GridMember,
            task_id: task.to_string(),
            origin_session: Some(format!("gmx-{task}")),
            origin_window: None,
        }
    }

    fn tiled(panes: &[Option<&str>], cols: usize, rows: usize) -> TiledGrid {
        TiledGrid {
            home_pane: "%0".to_string(),
            cols,
            rows,
            slots: panes
                .iter()
                .enumerate()
                .map(|(i, pane)| pane.map(|p| handle(p, &format!("{}", i + 1))))
                .collect(),
        }
    }

    #[test]
    fn grid_ready_populates_registry_and_selection() {
        let mut app = test_app();
        let tasks: Vec<Task> = (1..=4)
            .map(|i| test_task(&i.to_string(), TaskStatus::Processing))
            .collect();

        app.apply_mux_event(MuxEvent::GridReady {
            generation: 0,
            tiled: tiled(&[Some("%11"), Some("%21"), None, Some("%41")], 2, 2),
            tasks,
        });

        assert_eq!(app.view, View::Grid);
        assert!(app.busy.is_none());
        assert_eq!(app.registry.slot_count(), 3);
        assert!(app.registry.get(2).is_none());
        let grid = app.grid.as_ref().expect("grid");
        assert_eq!(grid.selection.selected(), Some(0));
        assert_eq!((grid.cols, grid.rows), (2, 2));
    }

    #[test]
    fn refresh_replaces_registry_wholesale_and_clamps_selection() {
        let mut app = test_app();
        let four: Vec<Task> = (1..=4)
            .map(|i| test_task(&i.to_string(), TaskStatus::Processing))
            .collect();
        app.apply_mux_event(MuxEvent::GridReady {
            generation: 0,
            tiled: tiled(&[Some("%11"), Some("%21"), Some("%31"), Some("%41")], 2, 2),
            tasks: four,
        });

        // Move to the last slot, then shrink to two tasks.
        let grid = app.grid.as_mut().expect("grid");
        grid.selection.apply(Move::Ordinal(4));
        assert_eq!(grid.selection.selected(), Some(3));

        let two: Vec<Task> = (1..=2)
            .map(|i| test_task(&i.to_string(), TaskStatus::Processing))
            .collect();
        app.apply_mux_event(MuxEvent::GridReady {
            generation: 0,
            tiled: tiled(&[Some("%11"), Some("%21")], 2, 1),
            tasks: two,
        });

        assert_eq!(app.registry.slot_count(), 2);
        let grid = app.grid.as_ref().expect("grid");
        assert_eq!(grid.selection.selected(), Some(1));
    }

    #[test]
    fn grid_release_clears_registry_even_after_failures() {
        let mut app = test_app();
        app.apply_mux_event(MuxEvent::GridReady {
            generation: 0,
            tiled: tiled(&[Some("%11"), Some("%21")], 2, 1),
            tasks: vec![
                test_task("1", TaskStatus::Processing),
                test_task("2", TaskStatus::Processing),
            ],
        });

        app.apply_mux_event(MuxEvent::GridReleased(TeardownReport {
            broken: 1,
            skipped: 0,
            failed: 1,
        }));

        assert!(app.registry.is_empty());
        assert!(app.grid.is_none());
        assert_eq!(app.view, View::Tasks);
        assert!(app
            .status_note
            .as_deref()
            .expect("note")
            .contains("1 failed"));
    }

    #[test]
    fn grid_failure_returns_to_task_list() {
        let mut app = test_app();
        app.view = View::Grid;
        app.busy = Some("tiling panes");
        app.apply_mux_event(MuxEvent::GridFailed {
            generation: 0,
            message: "no server".to_string(),
        });
        assert_eq!(app.view, View::Tasks);
        assert!(app.busy.is_none());
        assert!(app.registry.is_empty());
    }

    #[test]
    fn stale_tiling_results_are_discarded() {
        let mut app = test_app();
        // A result from a pass that predates the latest refresh/exit.
        app.apply_mux_event(MuxEvent::GridReady {
            generation: 7,
            tiled: tiled(&[Some("%11")], 1, 1),
            tasks: vec![test_task("1", TaskStatus::Processing)],
        });
        assert!(app.grid.is_none());
        assert!(app.registry.is_empty());
        assert_eq!(app.view, View::Tasks);
    }

    #[test]
    fn spinner_only_advances_while_busy() {
        let mut app = test_app();
        app.tick();
        assert_eq!(app.spinner_frame, 0);
        assert!(app.spinner().is_none());

        app.busy = Some("tiling panes");
        app.tick();
        assert_eq!(app.spinner_frame, 1);
        let spinner = app.spinner().expect("spinner");
        assert!(spinner.ends_with("tiling panes"));
    }

    #[test]
    fn list_navigation_stays_in_bounds() {
        let mut app = test_app();
        app.tasks = vec![
            test_task("1", TaskStatus::Queued),
            test_task("2", TaskStatus::Queued),
        ];
        app.handle_key(KeyEvent::from(KeyCode::Char('k')));
        assert_eq!(app.list_index, 0);
        app.handle_key(KeyEvent::from(KeyCode::Char('j')));
        app.handle_key(KeyEvent::from(KeyCode::Char('j')));
        assert_eq!(app.list_index, 1);
    }

    #[test]
    fn quit_only_from_task_list() {
        let mut app = test_app();
        app.view = View::Detail;
        app.detail = Some(DetailMeta {
            task: test_task("1", TaskStatus::Queued),
            panes: Vec::new(),
        });
        app.handle_key(KeyEvent::from(KeyCode::Char('q')));
        assert!(!app.should_quit);
        assert_eq!(app.view, View::Tasks);

        app.handle_key(KeyEvent::from(KeyCode::Char('q')));
        assert!(app.should_quit);
    }

    #[test]
    fn extra_pane_completion_lands_in_registry() {
        let mut app = test_app();
        app.busy = Some("opening shell pane");
        let extra = PaneHandle {
            pane_id: "%42".to_string(),
            role: PaneRole::ExtraShell,
            task_id: "1".to_string(),
            origin_session: Some("gmx-1".to_string()),
            origin_window: None,
        };
        app.apply_mux_event(MuxEvent::ExtraPaneOpened(extra));
        assert!(app.busy.is_none());
        assert_eq!(app.registry.task_handles("1").len(), 1);
    }
}
