use std::path::PathBuf;
use std::time::Duration;

use qbot_core::{QueueError, RunOptions};

use crate::context::RunContext;

/// Default pause when the queue is empty or an item is vetoed.
pub const DEFAULT_IDLE_BACKOFF: Duration = Duration::from_secs(2 * 60);

/// What the engine should do after a delegate looked at a script failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ErrorDisposition {
    /// Reported by the delegate; move on to the next item.
    Handled,
    /// Process the same item again right away with these options. Honoured once per item.
    RetryNow(RunOptions),
    /// Report through `handle_unexpected_error`.
    Unexpected,
}

/// Per-flavor behavior plugged into [`crate::QueueEngine`].
pub trait QueueDelegate {
    type Item;

    fn queue_name(&self) -> &str;

    fn queue_log_path(&self, ctx: &RunContext) -> PathBuf {
        ctx.state.log_dir.join(format!("{}.log", self.queue_name()))
    }

    /// Per-item log file, if this flavor keeps one.
    fn work_item_log_path(&self, _ctx: &RunContext, _item: &Self::Item) -> Option<PathBuf> {
        None
    }

    fn begin_work_queue(&mut self, ctx: &mut RunContext) -> Result<(), QueueError>;

    fn should_continue_work_queue(&mut self, ctx: &mut RunContext) -> bool {
        ctx.state.iterations += 1;
        match ctx.options.iteration_cap() {
            Some(cap) => ctx.state.iterations <= cap,
            None => true,
        }
    }

    fn next_work_item(&mut self, ctx: &mut RunContext) -> Result<Option<Self::Item>, QueueError>;

    fn should_proceed_with_work_item(&mut self, ctx: &mut RunContext, item: &Self::Item) -> Result<bool, QueueError>;

    /// `Ok(false)` is a soft failure: the item will be seen again later.
    fn process_work_item(&mut self, ctx: &mut RunContext, item: &Self::Item) -> Result<bool, QueueError>;

    /// Called for script failures that were not already reported by a lower layer.
    fn handle_script_error(
        &mut self,
        _ctx: &mut RunContext,
        _item: &Self::Item,
        _error: &QueueError,
    ) -> Result<ErrorDisposition, QueueError> {
        Ok(ErrorDisposition::Unexpected)
    }

    fn handle_unexpected_error(&mut self, ctx: &mut RunContext, item: &Self::Item, message: &str) -> Result<(), QueueError>;

    fn stop_work_queue(&mut self, ctx: &mut RunContext, reason: &str) -> Result<(), QueueError> {
        let message = format!("Stopping Queue, reason: {}", reason);
        ctx.tool.status.update_status(self.queue_name(), &message, None, None)?;
        Ok(())
    }

    fn idle_backoff(&self) -> Duration {
        DEFAULT_IDLE_BACKOFF
    }
}
