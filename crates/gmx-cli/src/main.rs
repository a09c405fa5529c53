use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use gmx_core::{Task, TaskStatus};
use gmx_storage::Store;
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gmx")]
#[command(about = "gridmux task CLI", long_about = None)]
struct Cli {
    /// Path to the task database (defaults to the cockpit's).
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage tasks
    Task {
        #[command(subcommand)]
        action: TaskCommands,
    },
    /// List the panes recorded for a task
    Panes { task_id: String },
}

#[derive(Subcommand)]
enum TaskCommands {
    /// Register a task whose agent runs in an existing tmux session
    Add {
        title: String,
        /// tmux session the task's agent runs in
        #[arg(long)]
        session: String,
        /// Stable tmux window id (e.g. @3)
        #[arg(long)]
        window: Option<String>,
        /// Pane running the task's agent (e.g. %12)
        #[arg(long)]
        agent_pane: Option<String>,
        /// Command used to start the agent
        #[arg(long, default_value = "")]
        agent_command: String,
    },
    /// List tasks, optionally filtered by status
    List {
        #[arg(long)]
        status: Option<TaskStatus>,
    },
    /// Mark a task as processing
    Start { id: String },
    /// Mark a task as done
    Done { id: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db);
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let store = Store::open(&db_path)
        .with_context(|| format!("opening task database {}", db_path.display()))?;

    match cli.command {
        Commands::Task { action } => match action {
            TaskCommands::Add {
                title,
                session,
                window,
                agent_pane,
                agent_command,
            } => {
                let now = Utc::now();
                let task = Task {
                    id: store.next_task_id()?,
                    title,
                    status: TaskStatus::Queued,
                    session,
                    window,
                    agent_pane,
                    shell_pane: None,
                    agent_command,
                    created_at: now,
                    updated_at: now,
                    extra: HashMap::new(),
                };
                store.insert_task(&task).context("inserting task")?;
                println!("added task {} ({})", task.id, task.title);
            }
            TaskCommands::List { status } => {
                let tasks = store.list_tasks(status)?;
                if tasks.is_empty() {
                    println!("no tasks");
                    return Ok(());
                }
                for task in tasks {
                    println!(
                        "{:>4}  {:<12} {}  ({})",
                        task.id,
                        task.status.to_string(),
                        task.title,
                        task.session
                    );
                }
            }
            TaskCommands::Start { id } => set_status(&store, &id, TaskStatus::Processing)?,
            TaskCommands::Done { id } => set_status(&store, &id, TaskStatus::Done)?,
        },
        Commands::Panes { task_id } => {
            let panes = store.panes_for_task(&task_id)?;
            if panes.is_empty() {
                println!("no recorded panes for task {task_id}");
                return Ok(());
            }
            for pane in panes {
                println!("{:<8} {:<14} {}", pane.pane_id, pane.role.to_string(), pane.title);
            }
        }
    }

    Ok(())
}

fn set_status(store: &Store, id: &str, status: TaskStatus) -> Result<()> {
    if store.update_status(id, status)? {
        println!("task {id} -> {status}");
    } else {
        println!("no task with id {id}");
    }
    Ok(())
}

fn resolve_db_path(flag: Option<PathBuf>) -> PathBuf {
    if let Some(path) = flag {
        return path;
    }
    if let Ok(value) = std::env::var("GMX_DB") {
        if !value.trim().is_empty() {
            return PathBuf::from(value);
        }
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gridmux/tasks.db")
}
