use std::path::PathBuf;

use qbot_core::RunOptions;
use tracing::{info, warn};

use crate::tool::Tool;
use crate::worklog::WorkLog;

/// Per-run state of one queue.
#[derive(Clone, Debug)]
pub struct QueueState {
    pub name: String,
    pub log_dir: PathBuf,
    /// Incremented once per loop iteration by `should_continue_work_queue`.
    pub iterations: u32,
}

/// Handed by `&mut` to every delegate call.
pub struct RunContext {
    pub tool: Tool,
    pub options: RunOptions,
    pub state: QueueState,
    queue_log: Option<WorkLog>,
    item_log: Option<WorkLog>,
}

impl RunContext {
    pub fn new(tool: Tool, options: RunOptions, name: &str, log_dir: PathBuf) -> Self {
        Self {
            tool,
            options,
            state: QueueState {
                name: name.to_string(),
                log_dir,
                iterations: 0,
            },
            queue_log: None,
            item_log: None,
        }
    }

    /// Log a line to tracing, the queue log and the current work item log.
    pub fn log(&self, line: &str) {
        info!(queue = %self.state.name, "{}", line);
        for log in [&self.queue_log, &self.item_log].into_iter().flatten() {
            if let Err(e) = log.append(line) {
                warn!(path = %log.path().display(), "could not write log line: {e:#}");
            }
        }
    }

    pub(crate) fn set_queue_log(&mut self, log: Option<WorkLog>) {
        self.queue_log = log;
    }

    pub(crate) fn set_item_log(&mut self, log: Option<WorkLog>) {
        self.item_log = log;
    }
}
