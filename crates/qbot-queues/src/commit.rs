use std::path::PathBuf;
use std::time::Duration;

use qbot_core::{Patch, QueueError, ScriptError, StatusId};
use qbot_engine::{ErrorDisposition, QueueDelegate, RunContext};
use qbot_tracker::CommitterValidator;

use crate::common::{begin_queue, cc_watchers, did_fail, did_pass, did_retry, update_status, QueueSettings};
use crate::task::TaskRunner;

pub const COMMIT_QUEUE_NAME: &str = "commit-queue";

/// Output kept in rejection comments; the full log sits behind the results link.
const BUG_COMMENT_OUTPUT_LIMIT: usize = 500;

const CHECKOUT_OUT_OF_DATE_MESSAGE: &str =
    "Tests passed, but commit failed (checkout out of date).  Updating, then landing without building or re-running tests.";

/// Builds, tests and lands patches handed out by the status server.
pub struct CommitQueue<T: TaskRunner> {
    task: T,
    settings: QueueSettings,
    validator: Option<CommitterValidator>,
}

impl<T: TaskRunner> CommitQueue<T> {
    pub fn new(task: T, settings: QueueSettings) -> Self {
        Self {
            task,
            settings,
            validator: None,
        }
    }

    fn validator(&mut self, ctx: &RunContext) -> &CommitterValidator {
        let settings = &self.settings;
        self.validator.get_or_insert_with(|| {
            CommitterValidator::new(ctx.tool.tracker.clone(), &settings.committers, &settings.reviewers)
        })
    }

    fn error_message_for_bug(&self, ctx: &RunContext, status_id: Option<&StatusId>, error: &ScriptError) -> String {
        let message = error.message_with_output(Some(BUG_COMMENT_OUTPUT_LIMIT));
        match status_id {
            Some(id) if !error.output.is_empty() => {
                format!("{}\nFull output: {}", message, ctx.tool.status.results_url_for_status(id))
            }
            _ => message,
        }
    }
}

impl<T: TaskRunner> QueueDelegate for CommitQueue<T> {
    type Item = Patch;

    fn queue_name(&self) -> &str {
        COMMIT_QUEUE_NAME
    }

    fn work_item_log_path(&self, ctx: &RunContext, item: &Patch) -> Option<PathBuf> {
        Some(ctx.state.log_dir.join(format!("{}.log", item.bug_id)))
    }

    fn begin_work_queue(&mut self, ctx: &mut RunContext) -> Result<(), QueueError> {
        begin_queue(ctx, COMMIT_QUEUE_NAME)?;
        self.validator(ctx);
        Ok(())
    }

    fn next_work_item(&mut self, ctx: &mut RunContext) -> Result<Option<Patch>, QueueError> {
        let Some(id) = ctx.tool.status.next_work_item(COMMIT_QUEUE_NAME)? else {
            return Ok(None);
        };
        Ok(Some(ctx.tool.tracker.fetch_attachment(&id)?))
    }

    fn should_proceed_with_work_item(&mut self, ctx: &mut RunContext, patch: &Patch) -> Result<bool, QueueError> {
        update_status(ctx, COMMIT_QUEUE_NAME, &format!("Processing {}", patch.kind_label()), Some(patch), None)?;
        Ok(true)
    }

    fn process_work_item(&mut self, ctx: &mut RunContext, patch: &Patch) -> Result<bool, QueueError> {
        cc_watchers(ctx, patch, &self.settings.watchers);
        match self.task.run(ctx, patch) {
            Ok(true) => {
                did_pass(ctx, COMMIT_QUEUE_NAME, patch)?;
                Ok(true)
            }
            Ok(false) => {
                did_retry(ctx, COMMIT_QUEUE_NAME, patch)?;
                Ok(false)
            }
            Err(QueueError::Script(e)) => {
                let message = self.error_message_for_bug(ctx, self.task.failure_status_id(), &e);
                self.validator(ctx).reject_patch_from_commit_queue(patch, Some(&message))?;
                did_fail(ctx, COMMIT_QUEUE_NAME, patch)?;
                Ok(false)
            }
            Err(other) => Err(other),
        }
    }

    fn handle_script_error(&mut self, ctx: &mut RunContext, patch: &Patch, error: &QueueError) -> Result<ErrorDisposition, QueueError> {
        if let QueueError::CheckoutNeedsUpdate(_) = error {
            update_status(ctx, COMMIT_QUEUE_NAME, CHECKOUT_OUT_OF_DATE_MESSAGE, Some(patch), None)?;
            return Ok(ErrorDisposition::RetryNow(ctx.options.land_after_update()));
        }
        ctx.log(&error.to_string());
        Ok(ErrorDisposition::Handled)
    }

    fn handle_unexpected_error(&mut self, ctx: &mut RunContext, patch: &Patch, message: &str) -> Result<(), QueueError> {
        self.validator(ctx).reject_patch_from_commit_queue(patch, Some(message))?;
        Ok(())
    }

    fn idle_backoff(&self) -> Duration {
        self.settings.idle_backoff
    }
}
