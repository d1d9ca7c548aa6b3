use qbot_core::{log_from_script_error_for_upload, Patch, QueueError, ScriptError, StatusId};
use qbot_engine::RunContext;

use crate::common::update_status;

/// Runs the ordered steps for one patch.
///
/// `Ok(false)` means the failure is not the patch's fault (the tree is broken)
/// and the patch should be retried later.
pub trait TaskRunner {
    fn run(&mut self, ctx: &mut RunContext, patch: &Patch) -> Result<bool, QueueError>;

    /// Status holding the log of the step that failed last.
    fn failure_status_id(&self) -> Option<&StatusId>;
}

/// Command lines for each commit-queue step. `{patch}` and `{bug}` are
/// substituted with the current attachment and bug ids.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepCommands {
    pub clean: Vec<String>,
    pub update: Vec<String>,
    pub apply: Vec<String>,
    pub build: Vec<String>,
    pub test: Vec<String>,
    pub land: Vec<String>,
}

impl StepCommands {
    pub fn webkit_patch(program: &str) -> Self {
        let cmd = |args: &[&str]| {
            let mut v = vec![program.to_string()];
            v.extend(args.iter().map(|a| a.to_string()));
            v
        };
        Self {
            clean: cmd(&["clean"]),
            update: cmd(&["update"]),
            apply: cmd(&["apply-attachment", "--no-update", "--non-interactive", "{patch}"]),
            build: cmd(&["build", "--no-clean", "--no-update", "--build-style=both"]),
            test: cmd(&["build-and-test", "--no-clean", "--no-update", "--test", "--non-interactive"]),
            land: cmd(&[
                "land-attachment",
                "--force-clean",
                "--ignore-builders",
                "--non-interactive",
                "--parent-command=commit-queue",
                "{patch}",
            ]),
        }
    }
}

impl Default for StepCommands {
    fn default() -> Self {
        Self::webkit_patch("webkit-patch")
    }
}

fn expand(template: &[String], patch: &Patch) -> Vec<String> {
    template
        .iter()
        .map(|a| a.replace("{patch}", patch.id.as_str()).replace("{bug}", patch.bug_id.as_str()))
        .collect()
}

/// Land failures mentioning this are the checkout falling behind, not the patch.
const OUT_OF_DATE_MARKER: &str = "out of date";

/// clean, update, apply, build, test, land.
pub struct CommitQueueTask {
    queue: String,
    commands: StepCommands,
    upload_limit: usize,
    failure_status_id: Option<StatusId>,
}

impl CommitQueueTask {
    pub fn new(queue: &str, commands: StepCommands, upload_limit: usize) -> Self {
        Self {
            queue: queue.to_string(),
            commands,
            upload_limit,
            failure_status_id: None,
        }
    }

    fn run_step(
        &mut self,
        ctx: &RunContext,
        patch: &Patch,
        template: &[String],
        success: &str,
        failure: &str,
    ) -> Result<Result<(), ScriptError>, QueueError> {
        let args = expand(template, patch);
        match ctx.tool.executive.run_and_throw_if_fail(&args, Some(ctx.tool.checkout_root.as_path())) {
            Ok(_) => {
                update_status(ctx, &self.queue, success, Some(patch), None)?;
                Ok(Ok(()))
            }
            Err(e) => {
                let log = log_from_script_error_for_upload(&e, Some(self.upload_limit));
                let id = update_status(ctx, &self.queue, failure, Some(patch), Some(&log))?;
                self.failure_status_id = Some(id);
                Ok(Err(e))
            }
        }
    }

    fn clean(&mut self, ctx: &RunContext, patch: &Patch) -> Result<Result<(), ScriptError>, QueueError> {
        let cmd = self.commands.clean.clone();
        self.run_step(ctx, patch, &cmd, "Cleaned working directory", "Unable to clean working directory")
    }

    fn update(&mut self, ctx: &RunContext, patch: &Patch) -> Result<Result<(), ScriptError>, QueueError> {
        let cmd = self.commands.update.clone();
        self.run_step(ctx, patch, &cmd, "Updated working directory", "Unable to update working directory")
    }

    fn apply(&mut self, ctx: &RunContext, patch: &Patch) -> Result<Result<(), ScriptError>, QueueError> {
        let cmd = self.commands.apply.clone();
        self.run_step(ctx, patch, &cmd, "Applied patch", "Patch does not apply")
    }

    fn build(&mut self, ctx: &RunContext, patch: &Patch, success: &str, failure: &str) -> Result<Result<(), ScriptError>, QueueError> {
        let cmd = self.commands.build.clone();
        self.run_step(ctx, patch, &cmd, success, failure)
    }

    fn test(&mut self, ctx: &RunContext, patch: &Patch, success: &str, failure: &str) -> Result<Result<(), ScriptError>, QueueError> {
        let cmd = self.commands.test.clone();
        self.run_step(ctx, patch, &cmd, success, failure)
    }

    fn land(&mut self, ctx: &RunContext, patch: &Patch) -> Result<Result<(), ScriptError>, QueueError> {
        let cmd = self.commands.land.clone();
        self.run_step(ctx, patch, &cmd, "Landed patch", "Unable to land patch")
    }

    /// Does tip of tree build on its own? Reverts the patch first.
    fn build_without_patch(&mut self, ctx: &RunContext, patch: &Patch) -> Result<bool, QueueError> {
        if self.clean(ctx, patch)?.is_err() {
            return Ok(false);
        }
        Ok(self
            .build(ctx, patch, "Able to build without patch", "Unable to build without patch")?
            .is_ok())
    }

    fn test_without_patch(&mut self, ctx: &RunContext, patch: &Patch) -> Result<bool, QueueError> {
        if !self.build_without_patch(ctx, patch)? {
            return Ok(false);
        }
        Ok(self
            .test(ctx, patch, "Able to pass tests without patch", "Unable to pass tests without patch (tree is red?)")?
            .is_ok())
    }
}

impl TaskRunner for CommitQueueTask {
    fn run(&mut self, ctx: &mut RunContext, patch: &Patch) -> Result<bool, QueueError> {
        self.failure_status_id = None;
        let options = ctx.options.clone();

        if self.clean(ctx, patch)?.is_err() {
            return Ok(false);
        }
        if options.update && self.update(ctx, patch)?.is_err() {
            return Ok(false);
        }
        if let Err(e) = self.apply(ctx, patch)? {
            return Err(e.into());
        }

        if options.build {
            if let Err(e) = self.build(ctx, patch, "Built patch", "Patch does not build")? {
                if !self.build_without_patch(ctx, patch)? {
                    return Ok(false);
                }
                return Err(e.into());
            }
        }

        if options.test {
            let first = self.test(ctx, patch, "Passed tests", "Patch does not pass tests")?;
            if first.is_err() {
                // One re-run to filter out flaky tests.
                if let Err(e) = self.test(ctx, patch, "Passed tests", "Patch does not pass tests")? {
                    if !self.test_without_patch(ctx, patch)? {
                        return Ok(false);
                    }
                    return Err(e.into());
                }
            }
        }

        match self.land(ctx, patch)? {
            Ok(()) => Ok(true),
            Err(e) if e.output.contains(OUT_OF_DATE_MARKER) => Err(QueueError::CheckoutNeedsUpdate(e)),
            Err(e) => Err(e.into()),
        }
    }

    fn failure_status_id(&self) -> Option<&StatusId> {
        self.failure_status_id.as_ref()
    }
}
