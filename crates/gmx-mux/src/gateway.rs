//! Single choke point for tmux invocations.
//!
//! Every command carries a caller-supplied timeout and reports failure as a
//! recoverable [`MuxError`]: a dead tmux server, a slow command, or a bad
//! target must never take the cockpit down. The process transport sits
//! behind a trait so policy can be exercised without a live tmux.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Focus forwarding and other cosmetic calls.
pub const FOCUS_TIMEOUT: Duration = Duration::from_millis(500);
/// Existence/liveness probes.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
/// Single pane create/move/destroy operations.
pub const PANE_OP_TIMEOUT: Duration = Duration::from_secs(5);
/// Whole-grid setup and teardown passes.
pub const BULK_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum MuxError {
    #[error("tmux could not be started: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("tmux {command} exited with status {code:?}: {stderr}")]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("tmux {command} timed out after {timeout:?}")]
    TimedOut { command: String, timeout: Duration },
    #[error("no usable pane for target {target}")]
    MissingPane { target: String },
    #[error(transparent)]
    Storage(#[from] gmx_storage::StorageError),
}

/// Split orientation. Horizontal puts panes side by side, vertical stacks
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitDirection {
    Horizontal,
    Vertical,
}

impl SplitDirection {
    pub fn flag(&self) -> &'static str {
        match self {
            SplitDirection::Horizontal => "-h",
            SplitDirection::Vertical => "-v",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Runs one tmux invocation to completion. Implemented by the real process
/// transport and by scripted test doubles.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn run(&self, args: &[String]) -> std::io::Result<CommandOutput>;
}

/// Spawns the `tmux` binary.
pub struct TmuxTransport;

#[async_trait]
impl Transport for TmuxTransport {
    async fn run(&self, args: &[String]) -> std::io::Result<CommandOutput> {
        let output = tokio::process::Command::new("tmux")
            .args(args)
            .kill_on_drop(true)
            .output()
            .await?;
        Ok(CommandOutput {
            code: output.status.code(),
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[derive(Clone)]
pub struct Gateway {
    transport: Arc<dyn Transport>,
}

impl Default for Gateway {
    fn default() -> Self {
        Self::new()
    }
}

impl Gateway {
    pub fn new() -> Self {
        Self::with_transport(Arc::new(TmuxTransport))
    }

    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Run one tmux command, trimming captured stdout. The timeout is a hard
    /// bound; an overrun abandons the invocation and reports `TimedOut`.
    pub async fn run(&self, args: &[&str], timeout: Duration) -> Result<String, MuxError> {
        let owned: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();
        let command = owned.first().cloned().unwrap_or_default();
        debug!(command = %owned.join(" "), "tmux");
        match tokio::time::timeout(timeout, self.transport.run(&owned)).await {
            Err(_) => Err(MuxError::TimedOut { command, timeout }),
            Ok(Err(err)) => Err(MuxError::Spawn(err)),
            Ok(Ok(output)) if !output.success => Err(MuxError::Failed {
                command,
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            }),
            Ok(Ok(output)) => Ok(output.stdout.trim_end().to_string()),
        }
    }

    /// Pane id of the pane this process runs in.
    pub async fn current_pane(&self) -> Result<String, MuxError> {
        let id = self
            .run(&["display-message", "-p", "#{pane_id}"], PROBE_TIMEOUT)
            .await?;
        if id.is_empty() {
            return Err(MuxError::MissingPane {
                target: "current".to_string(),
            });
        }
        Ok(id)
    }

    /// Pane ids of `target` (a window or `session:` target), top to bottom.
    pub async fn list_panes(&self, target: &str) -> Result<Vec<String>, MuxError> {
        let out = self
            .run(
                &["list-panes", "-t", target, "-F", "#{pane_id}"],
                PROBE_TIMEOUT,
            )
            .await?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Move an existing pane next to `target`. `size_pct` sizes the joined
    /// pane as a percentage of the split.
    pub async fn join_pane(
        &self,
        direction: SplitDirection,
        size_pct: Option<u32>,
        source: &str,
        target: &str,
    ) -> Result<(), MuxError> {
        let size;
        let mut args = vec!["join-pane", direction.flag()];
        if let Some(pct) = size_pct {
            size = format!("{pct}%");
            args.push("-l");
            args.push(&size);
        }
        args.extend_from_slice(&["-s", source, "-t", target]);
        self.run(&args, PANE_OP_TIMEOUT).await.map(|_| ())
    }

    /// Split a new pane off `target` and return its id.
    pub async fn split_pane(
        &self,
        direction: SplitDirection,
        size_pct: Option<u32>,
        target: &str,
        cwd: Option<&str>,
        command: Option<&str>,
    ) -> Result<String, MuxError> {
        let size;
        let mut args = vec!["split-window", direction.flag()];
        if let Some(pct) = size_pct {
            size = format!("{pct}%");
            args.push("-l");
            args.push(&size);
        }
        args.extend_from_slice(&["-t", target]);
        if let Some(dir) = cwd {
            args.extend_from_slice(&["-c", dir]);
        }
        args.extend_from_slice(&["-P", "-F", "#{pane_id}"]);
        if let Some(cmd) = command {
            args.push(cmd);
        }
        let id = self.run(&args, PANE_OP_TIMEOUT).await?;
        if id.is_empty() {
            return Err(MuxError::MissingPane {
                target: target.to_string(),
            });
        }
        Ok(id)
    }

    pub async fn set_pane_title(&self, pane: &str, title: &str) -> Result<(), MuxError> {
        self.run(&["select-pane", "-t", pane, "-T", title], FOCUS_TIMEOUT)
            .await
            .map(|_| ())
    }

    pub async fn focus_pane(&self, pane: &str) -> Result<(), MuxError> {
        self.run(&["select-pane", "-t", pane], FOCUS_TIMEOUT)
            .await
            .map(|_| ())
    }

    /// Resize a pane to a percentage of the window height.
    pub async fn resize_pane_height(&self, pane: &str, pct: u32) -> Result<(), MuxError> {
        let size = format!("{pct}%");
        self.run(&["resize-pane", "-t", pane, "-y", &size], PANE_OP_TIMEOUT)
            .await
            .map(|_| ())
    }

    /// Detach a pane into a fresh window of `session` without following it.
    pub async fn break_pane(&self, pane: &str, session: &str) -> Result<(), MuxError> {
        let target = format!("{session}:");
        self.run(
            &["break-pane", "-d", "-s", pane, "-t", &target],
            PANE_OP_TIMEOUT,
        )
        .await
        .map(|_| ())
    }

    /// Best-effort probe: a pane that cannot be resolved within the probe
    /// timeout counts as gone.
    pub async fn pane_alive(&self, pane: &str) -> bool {
        match self
            .run(
                &["display-message", "-t", pane, "-p", "#{pane_id}"],
                PROBE_TIMEOUT,
            )
            .await
        {
            Ok(id) => !id.is_empty(),
            Err(err) => {
                debug!(pane = %pane, error = %err, "pane probe failed");
                false
            }
        }
    }

    pub async fn session_exists(&self, session: &str) -> bool {
        let target = format!("={session}");
        self.run(&["has-session", "-t", &target], PROBE_TIMEOUT)
            .await
            .is_ok()
    }

    /// Type `text` into a pane and press enter.
    pub async fn send_text(&self, pane: &str, text: &str) -> Result<(), MuxError> {
        self.run(&["send-keys", "-t", pane, text, "Enter"], PANE_OP_TIMEOUT)
            .await
            .map(|_| ())
    }

    /// Toggle per-pane title borders on the cockpit's window.
    pub async fn set_border_titles(&self, on: bool) -> Result<(), MuxError> {
        let value = if on { "top" } else { "off" };
        self.run(&["set-option", "-w", "pane-border-status", value], FOCUS_TIMEOUT)
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    pub(crate) enum Reply {
        Out(String),
        Fail(String),
        Hang,
    }

    /// Transport double that replays canned replies per tmux subcommand and
    /// records every invocation.
    #[derive(Default)]
    pub(crate) struct ScriptedTransport {
        replies: Mutex<HashMap<String, VecDeque<Reply>>>,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl ScriptedTransport {
        pub(crate) fn push(&self, subcommand: &str, reply: Reply) {
            self.replies
                .lock()
                .unwrap()
                .entry(subcommand.to_string())
                .or_default()
                .push_back(reply);
        }

        pub(crate) fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }

        pub(crate) fn calls_for(&self, subcommand: &str) -> Vec<Vec<String>> {
            self.calls()
                .into_iter()
                .filter(|call| call.first().map(String::as_str) == Some(subcommand))
                .collect()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn run(&self, args: &[String]) -> std::io::Result<CommandOutput> {
            self.calls.lock().unwrap().push(args.to_vec());
            let reply = args.first().and_then(|subcommand| {
                self.replies
                    .lock()
                    .unwrap()
                    .get_mut(subcommand)
                    .and_then(VecDeque::pop_front)
            });
            match reply {
                None => Ok(CommandOutput {
                    code: Some(0),
                    success: true,
                    stdout: String::new(),
                    stderr: String::new(),
                }),
                Some(Reply::Out(stdout)) => Ok(CommandOutput {
                    code: Some(0),
                    success: true,
                    stdout,
                    stderr: String::new(),
                }),
                Some(Reply::Fail(stderr)) => Ok(CommandOutput {
                    code: Some(1),
                    success: false,
                    stdout: String::new(),
                    stderr,
                }),
                Some(Reply::Hang) => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(CommandOutput {
                        code: Some(0),
                        success: true,
                        stdout: String::new(),
                        stderr: String::new(),
                    })
                }
            }
        }
    }

    pub(crate) fn scripted() -> (Gateway, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::default());
        (Gateway::with_transport(transport.clone()), transport)
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{scripted, Reply};
    use super::*;

    #[tokio::test]
    async fn stdout_is_trimmed() {
        let (gateway, transport) = scripted();
        transport.push("display-message", Reply::Out("%4\n".to_string()));
        let pane = gateway.current_pane().await.expect("pane id");
        assert_eq!(pane, "%4");
    }

    #[tokio::test]
    async fn nonzero_exit_maps_to_recoverable_failure() {
        let (gateway, transport) = scripted();
        transport.push(
            "join-pane",
            Reply::Fail("can't find pane: %99".to_string()),
        );
        let err = gateway
            .join_pane(SplitDirection::Horizontal, None, "%99", "%0")
            .await
            .expect_err("must fail");
        match err {
            MuxError::Failed { command, stderr, .. } => {
                assert_eq!(command, "join-pane");
                assert!(stderr.contains("%99"));
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_command_times_out() {
        let (gateway, transport) = scripted();
        transport.push("has-session", Reply::Hang);
        // has-session maps any error to "absent".
        assert!(!gateway.session_exists("gmx-1").await);

        transport.push("select-pane", Reply::Hang);
        let err = gateway.focus_pane("%3").await.expect_err("must time out");
        assert!(matches!(err, MuxError::TimedOut { .. }));
    }

    #[tokio::test]
    async fn list_panes_splits_lines() {
        let (gateway, transport) = scripted();
        transport.push("list-panes", Reply::Out("%1\n%2\n\n%3\n".to_string()));
        let panes = gateway.list_panes("@2").await.expect("panes");
        assert_eq!(panes, vec!["%1", "%2", "%3"]);
    }

    #[tokio::test]
    async fn split_pane_builds_expected_argv_and_returns_id() {
        let (gateway, transport) = scripted();
        transport.push("split-window", Reply::Out("%31".to_string()));
        let id = gateway
            .split_pane(
                SplitDirection::Horizontal,
                Some(30),
                "%10",
                None,
                Some("claude"),
            )
            .await
            .expect("new pane");
        assert_eq!(id, "%31");

        let call = &transport.calls_for("split-window")[0];
        let argv: Vec<&str> = call.iter().map(String::as_str).collect();
        assert_eq!(
            argv,
            vec![
                "split-window",
                "-h",
                "-l",
                "30%",
                "-t",
                "%10",
                "-P",
                "-F",
                "#{pane_id}",
                "claude",
            ]
        );
    }

    #[tokio::test]
    async fn break_pane_targets_origin_session() {
        let (gateway, transport) = scripted();
        gateway.break_pane("%7", "gmx-3").await.expect("break");
        let call = &transport.calls_for("break-pane")[0];
        let argv: Vec<&str> = call.iter().map(String::as_str).collect();
        assert_eq!(argv, vec!["break-pane", "-d", "-s", "%7", "-t", "gmx-3:"]);
    }

    #[tokio::test]
    async fn dead_pane_probe_is_false_not_error() {
        let (gateway, transport) = scripted();
        transport.push(
            "display-message",
            Reply::Fail("can't find pane".to_string()),
        );
        assert!(!gateway.pane_alive("%9").await);
    }
}
