mod state;
mod theme;
mod ui;

use crossterm::{
    event::{Event, EventStream, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures_util::StreamExt;
use gmx_mux::Gateway;
use gmx_storage::Store;
use ratatui::{backend::CrosstermBackend, Terminal};
use serde::Deserialize;
use state::{App, Config};
use std::{error::Error, io, path::PathBuf, time::Duration};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

const SPINNER_TICK_MS: u64 = 100;
const EVENT_QUEUE_CAPACITY: usize = 16;

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    db_path: Option<PathBuf>,
    #[serde(default)]
    shell_pane_pct: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = load_config();
    init_logging();

    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = Store::open(&config.db_path)?;

    let (events_tx, mut events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
    let mut app = App::new(config, store, Gateway::new(), events_tx);
    app.reload_tasks();

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    let mut events = EventStream::new();
    let mut spinner_ticker =
        tokio::time::interval(Duration::from_millis(SPINNER_TICK_MS));

    loop {
        terminal.draw(|frame| ui::render(frame, &app))?;
        tokio::select! {
            _ = spinner_ticker.tick() => {
                app.tick();
            }
            Some(event) = events_rx.recv() => {
                app.apply_mux_event(event);
            }
            maybe_event = events.next() => {
                if let Some(Ok(Event::Key(key))) = maybe_event {
                    if key.kind == KeyEventKind::Press {
                        app.handle_key(key);
                    }
                }
            }
        }
        if app.should_quit {
            break;
        }
    }

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

fn load_config() -> Config {
    let file = load_file_config();
    let db_path = resolve_db_path(&file);
    let shell_pane_pct = std::env::var("GMX_SHELL_PANE_PCT")
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .or(file.shell_pane_pct)
        .unwrap_or(gmx_mux::extra::SHELL_WIDTH_PCT)
        .clamp(10, 90);
    Config {
        db_path,
        shell_pane_pct,
    }
}

fn load_file_config() -> FileConfig {
    let Some(config_dir) = dirs::config_dir() else {
        return FileConfig::default();
    };
    let path = config_dir.join("gridmux/config.toml");
    let Ok(raw) = std::fs::read_to_string(&path) else {
        return FileConfig::default();
    };
    match toml::from_str(&raw) {
        Ok(parsed) => parsed,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "config file ignored");
            FileConfig::default()
        }
    }
}

fn resolve_db_path(file: &FileConfig) -> PathBuf {
    if let Ok(value) = std::env::var("GMX_DB") {
        if !value.trim().is_empty() {
            return PathBuf::from(value);
        }
    }
    if let Some(path) = file.db_path.clone() {
        return path;
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gridmux/tasks.db")
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_enabled = matches!(
        std::env::var("GMX_LOG_STDOUT").ok().as_deref(),
        Some("1") | Some("true") | Some("TRUE") | Some("yes") | Some("YES")
    );
    if stdout_enabled {
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::sink)
            .try_init();
    }
}
