use std::path::PathBuf;
use std::time::Duration;

use qbot_core::{Patch, QueueError, HANDLED_ERROR_CODE};
use qbot_engine::{ErrorDisposition, QueueDelegate, RunContext};

use crate::common::{begin_queue, did_fail, did_pass, update_status, update_status_for_script_error, QueueSettings};

pub const RIETVELD_UPLOAD_QUEUE_NAME: &str = "rietveld-upload-queue";

/// Mirrors patches flagged `in-rietveld?` to the code review site.
pub struct RietveldUploadQueue {
    settings: QueueSettings,
}

impl RietveldUploadQueue {
    pub fn new(settings: QueueSettings) -> Self {
        Self { settings }
    }

    fn reject_patch(&self, ctx: &RunContext, patch: &Patch) -> Result<(), QueueError> {
        ctx.tool.tracker.set_flag(&patch.id, "in-rietveld", "-")?;
        Ok(())
    }
}

impl QueueDelegate for RietveldUploadQueue {
    type Item = Patch;

    fn queue_name(&self) -> &str {
        RIETVELD_UPLOAD_QUEUE_NAME
    }

    fn work_item_log_path(&self, ctx: &RunContext, item: &Patch) -> Option<PathBuf> {
        Some(ctx.state.log_dir.join(format!("{}.log", item.bug_id)))
    }

    fn begin_work_queue(&mut self, ctx: &mut RunContext) -> Result<(), QueueError> {
        begin_queue(ctx, RIETVELD_UPLOAD_QUEUE_NAME)
    }

    fn next_work_item(&mut self, ctx: &mut RunContext) -> Result<Option<Patch>, QueueError> {
        let ids = ctx.tool.tracker.fetch_pending_ids_for_queue(RIETVELD_UPLOAD_QUEUE_NAME)?;
        let Some(id) = ids.first() else {
            update_status(ctx, RIETVELD_UPLOAD_QUEUE_NAME, "Empty queue", None, None)?;
            return Ok(None);
        };
        Ok(Some(ctx.tool.tracker.fetch_attachment(id)?))
    }

    fn should_proceed_with_work_item(&mut self, ctx: &mut RunContext, patch: &Patch) -> Result<bool, QueueError> {
        update_status(ctx, RIETVELD_UPLOAD_QUEUE_NAME, "Uploading patch", Some(patch), None)?;
        Ok(true)
    }

    fn process_work_item(&mut self, ctx: &mut RunContext, patch: &Patch) -> Result<bool, QueueError> {
        let args = self.settings.webkit_patch_args(
            "post-attachment-to-rietveld",
            &[
                "--force-clean",
                "--non-interactive",
                "--parent-command=rietveld-upload-queue",
                patch.id.as_str(),
            ],
        );
        match ctx.tool.executive.run_and_throw_if_fail(&args, Some(ctx.tool.checkout_root.as_path())) {
            Ok(_) => {
                did_pass(ctx, RIETVELD_UPLOAD_QUEUE_NAME, patch)?;
                Ok(true)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn handle_script_error(&mut self, ctx: &mut RunContext, patch: &Patch, error: &QueueError) -> Result<ErrorDisposition, QueueError> {
        let Some(script_error) = error.script_error() else {
            return Ok(ErrorDisposition::Unexpected);
        };
        ctx.log(&script_error.message_with_output(None));
        update_status_for_script_error(
            ctx,
            RIETVELD_UPLOAD_QUEUE_NAME,
            script_error,
            patch,
            false,
            self.settings.upload_limit,
        )?;
        if script_error.exit_code != HANDLED_ERROR_CODE {
            did_fail(ctx, RIETVELD_UPLOAD_QUEUE_NAME, patch)?;
        }
        self.reject_patch(ctx, patch)?;
        Ok(ErrorDisposition::Handled)
    }

    fn handle_unexpected_error(&mut self, ctx: &mut RunContext, patch: &Patch, message: &str) -> Result<(), QueueError> {
        ctx.log(message);
        self.reject_patch(ctx, patch)
    }

    fn idle_backoff(&self) -> Duration {
        self.settings.idle_backoff
    }
}
