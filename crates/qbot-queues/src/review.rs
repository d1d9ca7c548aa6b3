use std::path::PathBuf;
use std::time::Duration;

use qbot_collection::PatchCollection;
use qbot_core::{is_terminal_status, Patch, QueueError, ScriptError, HANDLED_ERROR_CODE};
use qbot_engine::{ErrorDisposition, QueueDelegate, RunContext};

use crate::common::{begin_queue, did_fail, did_pass, did_retry};

/// The part of a review queue that differs per flavor.
pub trait Reviewer {
    fn name(&self) -> &str;

    fn should_proceed(&mut self, _ctx: &mut RunContext, _patch: &Patch) -> Result<bool, QueueError> {
        Ok(true)
    }

    /// `Ok(false)` leaves the patch pending without a verdict.
    fn review_patch(&mut self, ctx: &mut RunContext, patch: &Patch) -> Result<bool, QueueError>;

    fn handle_script_error(&mut self, _ctx: &mut RunContext, _patch: &Patch, _error: &ScriptError) -> Result<ErrorDisposition, QueueError> {
        Ok(ErrorDisposition::Unexpected)
    }

    fn idle_backoff(&self) -> Duration;
}

/// Review queue fed from the tracker through a persisted [`PatchCollection`].
pub struct ReviewQueue<R: Reviewer> {
    reviewer: R,
    collection_path: PathBuf,
    collection: Option<PatchCollection>,
}

impl<R: Reviewer> ReviewQueue<R> {
    pub fn new(reviewer: R, collection_path: PathBuf) -> Self {
        Self {
            reviewer,
            collection_path,
            collection: None,
        }
    }

    pub fn reviewer(&self) -> &R {
        &self.reviewer
    }

    fn collection(&mut self) -> anyhow::Result<&mut PatchCollection> {
        if self.collection.is_none() {
            self.collection = Some(PatchCollection::open(&self.collection_path, self.reviewer.name())?);
        }
        self.collection
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("patch collection not opened"))
    }
}

impl<R: Reviewer> QueueDelegate for ReviewQueue<R> {
    type Item = Patch;

    fn queue_name(&self) -> &str {
        self.reviewer.name()
    }

    fn work_item_log_path(&self, ctx: &RunContext, item: &Patch) -> Option<PathBuf> {
        Some(ctx.state.log_dir.join(format!("{}.log", item.bug_id)))
    }

    fn begin_work_queue(&mut self, ctx: &mut RunContext) -> Result<(), QueueError> {
        let name = self.reviewer.name().to_string();
        begin_queue(ctx, &name)?;
        self.collection()?;
        Ok(())
    }

    fn next_work_item(&mut self, ctx: &mut RunContext) -> Result<Option<Patch>, QueueError> {
        let tracker = ctx.tool.tracker.clone();
        let status = ctx.tool.status.clone();
        let collection = self.collection()?;
        collection.refresh(tracker.as_ref(), status.as_ref())?;
        let Some(id) = collection.next() else {
            return Ok(None);
        };
        Ok(Some(tracker.fetch_attachment(&id)?))
    }

    fn should_proceed_with_work_item(&mut self, ctx: &mut RunContext, patch: &Patch) -> Result<bool, QueueError> {
        self.reviewer.should_proceed(ctx, patch)
    }

    fn process_work_item(&mut self, ctx: &mut RunContext, patch: &Patch) -> Result<bool, QueueError> {
        let name = self.reviewer.name().to_string();
        match self.reviewer.review_patch(ctx, patch) {
            Ok(true) => {
                did_pass(ctx, &name, patch)?;
                Ok(true)
            }
            Ok(false) => {
                did_retry(ctx, &name, patch)?;
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// The reviewer records the failure first; the patch then ends on a
    /// terminal status so later passes skip it.
    fn handle_script_error(&mut self, ctx: &mut RunContext, patch: &Patch, error: &QueueError) -> Result<ErrorDisposition, QueueError> {
        let Some(script_error) = error.script_error() else {
            return Ok(ErrorDisposition::Unexpected);
        };
        let disposition = self.reviewer.handle_script_error(ctx, patch, script_error);
        if script_error.exit_code != HANDLED_ERROR_CODE {
            let name = self.reviewer.name().to_string();
            let latest = ctx.tool.status.patch_status(&name, &patch.id)?;
            if !latest.as_deref().map(is_terminal_status).unwrap_or(false) {
                did_fail(ctx, &name, patch)?;
            }
        }
        disposition
    }

    fn handle_unexpected_error(&mut self, ctx: &mut RunContext, _patch: &Patch, message: &str) -> Result<(), QueueError> {
        ctx.log(message);
        Ok(())
    }

    fn idle_backoff(&self) -> Duration {
        self.reviewer.idle_backoff()
    }
}
