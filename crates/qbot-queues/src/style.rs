use std::time::Duration;

use qbot_core::{Patch, QueueError, ScriptError};
use qbot_engine::{ErrorDisposition, RunContext};

use crate::common::{update_status, update_status_for_script_error, QueueSettings};
use crate::review::Reviewer;

pub const STYLE_QUEUE_NAME: &str = "style-queue";

/// Output quoted in the bug comment.
const STYLE_COMMENT_OUTPUT_LIMIT: usize = 3 * 1024;

/// Runs `check-style` on each patch up for review.
pub struct StyleQueue {
    settings: QueueSettings,
}

impl StyleQueue {
    pub fn new(settings: QueueSettings) -> Self {
        Self { settings }
    }
}

impl Reviewer for StyleQueue {
    fn name(&self) -> &str {
        STYLE_QUEUE_NAME
    }

    fn should_proceed(&mut self, ctx: &mut RunContext, patch: &Patch) -> Result<bool, QueueError> {
        update_status(ctx, STYLE_QUEUE_NAME, "Checking style", Some(patch), None)?;
        Ok(true)
    }

    fn review_patch(&mut self, ctx: &mut RunContext, patch: &Patch) -> Result<bool, QueueError> {
        let args = self.settings.webkit_patch_args(
            "check-style",
            &[
                "--force-clean",
                "--non-interactive",
                "--parent-command=style-queue",
                patch.id.as_str(),
            ],
        );
        ctx.tool
            .executive
            .run_and_throw_if_fail(&args, Some(ctx.tool.checkout_root.as_path()))?;
        Ok(true)
    }

    /// A style failure is fatal for this run: record it, tell the bug, stop.
    fn handle_script_error(&mut self, ctx: &mut RunContext, patch: &Patch, error: &ScriptError) -> Result<ErrorDisposition, QueueError> {
        let is_svn_apply = error.command_name() == "svn-apply";
        update_status_for_script_error(ctx, STYLE_QUEUE_NAME, error, patch, is_svn_apply, self.settings.upload_limit)?;

        let message = format!(
            "Attachment {} did not pass {}:\n\n{}\n\nIf any of these errors are false positives, please file a bug against check-webkit-style.",
            patch.id,
            STYLE_QUEUE_NAME,
            error.message_with_output(Some(STYLE_COMMENT_OUTPUT_LIMIT))
        );
        ctx.tool.tracker.post_comment(&patch.bug_id, &message, &self.settings.watchers)?;

        Err(QueueError::Terminate {
            exit_code: 1,
            reason: format!("{} failed on attachment {}", error.command_name(), patch.id),
        })
    }

    fn idle_backoff(&self) -> Duration {
        self.settings.idle_backoff
    }
}
