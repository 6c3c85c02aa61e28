//! Long-lived chat messages kept in sync with the poller.

pub mod handle;
pub mod status;
pub mod summary;

pub use handle::{ExternalMessageHandle, UpdateOutcome};
pub use status::{
    RunningReport, StatusBoard, StatusHeader, render_running, render_stopped, stamp_heartbeat,
};
pub use summary::{SummaryBoard, render_summary_lines};
