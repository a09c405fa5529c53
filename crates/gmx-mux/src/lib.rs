//! Multi-pane terminal orchestration over tmux.
//!
//! Active tasks each run their agent in an isolated tmux session. This crate
//! borrows those panes into a tiled grid inside the cockpit's own window,
//! forwards selection focus, returns every pane to its origin on teardown,
//! and manages the per-task extra panes of the detail view. All tmux access
//! is funneled through [`gateway::Gateway`] so timeout and failure policy
//! live in one place.

pub mod extra;
pub mod gateway;
pub mod nav;
pub mod registry;
pub mod teardown;
pub mod tile;

pub use gateway::{Gateway, MuxError, SplitDirection, Transport};
pub use registry::{PaneHandle, PaneRegistry};
pub use teardown::TeardownReport;
pub use tile::TiledGrid;
