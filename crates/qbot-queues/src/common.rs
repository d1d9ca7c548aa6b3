use std::time::Duration;

use qbot_core::{
    log_from_script_error_for_upload, Outcome, Patch, QueueError, ScriptError, StatusId, DEFAULT_UPLOAD_LIMIT,
};
use qbot_engine::{RunContext, DEFAULT_IDLE_BACKOFF};

/// Knobs shared by every queue flavor.
#[derive(Clone, Debug)]
pub struct QueueSettings {
    /// Program used for the per-patch subcommands (`check-style`, `post-attachment-to-rietveld`, ...).
    pub webkit_patch: String,
    /// Addresses CC'd on bugs the queues touch.
    pub watchers: Vec<String>,
    pub upload_limit: usize,
    pub idle_backoff: Duration,
    pub feeder_sleep: Duration,
    /// Empty means anyone with a known name may set the flag.
    pub committers: Vec<String>,
    pub reviewers: Vec<String>,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            webkit_patch: "webkit-patch".to_string(),
            watchers: vec![],
            upload_limit: DEFAULT_UPLOAD_LIMIT,
            idle_backoff: DEFAULT_IDLE_BACKOFF,
            feeder_sleep: Duration::from_secs(30),
            committers: vec![],
            reviewers: vec![],
        }
    }
}

impl QueueSettings {
    /// `webkit-patch <subcommand> <args...>`
    pub fn webkit_patch_args(&self, subcommand: &str, args: &[&str]) -> Vec<String> {
        let mut out = vec![self.webkit_patch.clone(), subcommand.to_string()];
        out.extend(args.iter().map(|a| a.to_string()));
        out
    }
}

pub const CONFIRM_PROMPT: &str = "Are you sure?  Type \"yes\" to continue: ";

/// Caution line, optional confirmation, then `Starting Queue`.
pub fn begin_queue(ctx: &mut RunContext, queue: &str) -> Result<(), QueueError> {
    ctx.log(&format!(
        "CAUTION: {} will discard all local changes in \"{}\"",
        queue,
        ctx.tool.checkout_root.display()
    ));
    if ctx.options.confirm && !ctx.tool.user.confirm(CONFIRM_PROMPT)? {
        return Err(QueueError::Declined);
    }
    ctx.log(&format!("Running {}.", queue));
    update_status(ctx, queue, "Starting Queue", None, None)?;
    Ok(())
}

pub fn update_status(
    ctx: &RunContext,
    queue: &str,
    message: &str,
    patch: Option<&Patch>,
    results: Option<&[u8]>,
) -> anyhow::Result<StatusId> {
    ctx.log(message);
    ctx.tool.status.update_status(queue, message, patch, results)
}

pub fn record_outcome(ctx: &RunContext, queue: &str, patch: &Patch, outcome: &Outcome) -> anyhow::Result<StatusId> {
    update_status(ctx, queue, &outcome.status_message(), Some(patch), None)
}

pub fn did_pass(ctx: &RunContext, queue: &str, patch: &Patch) -> anyhow::Result<StatusId> {
    record_outcome(ctx, queue, patch, &Outcome::Pass)
}

pub fn did_fail(ctx: &RunContext, queue: &str, patch: &Patch) -> anyhow::Result<StatusId> {
    record_outcome(ctx, queue, patch, &Outcome::Fail)
}

pub fn did_retry(ctx: &RunContext, queue: &str, patch: &Patch) -> anyhow::Result<StatusId> {
    record_outcome(ctx, queue, patch, &Outcome::Retry)
}

pub fn did_error(ctx: &RunContext, queue: &str, patch: &Patch, reason: &str) -> anyhow::Result<StatusId> {
    record_outcome(ctx, queue, patch, &Outcome::Error(reason.to_string()))
}

/// Status carrying the failure message and the truncated log.
pub fn update_status_for_script_error(
    ctx: &RunContext,
    queue: &str,
    error: &ScriptError,
    patch: &Patch,
    is_error: bool,
    upload_limit: usize,
) -> anyhow::Result<StatusId> {
    let message = if is_error {
        Outcome::Error(error.message()).status_message()
    } else {
        error.message()
    };
    let log = log_from_script_error_for_upload(error, Some(upload_limit));
    update_status(ctx, queue, &message, Some(patch), Some(&log))
}

/// CC `watchers` on the bug; a tracker refusal is only logged.
pub fn cc_watchers(ctx: &RunContext, patch: &Patch, watchers: &[String]) {
    if watchers.is_empty() {
        return;
    }
    if let Err(e) = ctx.tool.tracker.add_cc(&patch.bug_id, watchers) {
        tracing::warn!(bug = %patch.bug_id, "failed to CC watchers: {e:#}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qbot_core::RunOptions;
    use qbot_engine::testing::{ScriptedUser, TestTool};

    fn ctx(t: &TestTool, confirm: bool) -> RunContext {
        let options = RunOptions {
            confirm,
            ..RunOptions::default()
        };
        RunContext::new(t.tool.clone(), options, "style-queue", std::env::temp_dir())
    }

    #[test]
    fn declining_stops_before_starting() {
        let t = TestTool::with_user(std::env::temp_dir(), ScriptedUser::answering("n"));
        let mut c = ctx(&t, true);
        assert!(matches!(begin_queue(&mut c, "style-queue"), Err(QueueError::Declined)));
        assert!(t.status.messages_for("style-queue").is_empty());
    }

    #[test]
    fn only_literal_yes_starts_the_queue() {
        let t = TestTool::with_user(std::env::temp_dir(), ScriptedUser::answering("y"));
        let mut c = ctx(&t, true);
        assert!(matches!(begin_queue(&mut c, "style-queue"), Err(QueueError::Declined)));
        assert_eq!(t.user.prompts(), vec![CONFIRM_PROMPT.to_string()]);

        let t = TestTool::new(std::env::temp_dir());
        let mut c = ctx(&t, true);
        begin_queue(&mut c, "style-queue").unwrap();
        assert_eq!(t.status.messages_for("style-queue"), vec!["Starting Queue".to_string()]);
    }

    #[test]
    fn no_confirm_skips_the_prompt() {
        let t = TestTool::new(std::env::temp_dir());
        let mut c = ctx(&t, false);
        begin_queue(&mut c, "style-queue").unwrap();
        assert!(t.user.prompts().is_empty());
        assert_eq!(t.status.messages_for("style-queue"), vec!["Starting Queue".to_string()]);
    }

    #[test]
    fn script_error_status_carries_log_tail() {
        let t = TestTool::new(std::env::temp_dir());
        let c = ctx(&t, false);
        let err = ScriptError::new(vec!["svn-apply".into()], 1, "x".repeat(100));
        let patch = Patch::new("3", "4");
        update_status_for_script_error(&c, "style-queue", &err, &patch, true, 10).unwrap();

        let updates = t.status.updates();
        let last = updates.last().unwrap();
        assert_eq!(last.message, "Error: Failed to run \"svn-apply\" exit_code: 1");
        assert_eq!(last.results.as_deref(), Some("x".repeat(10).as_bytes()));
    }

    #[test]
    fn outcome_helpers_write_terminal_statuses() {
        let t = TestTool::new(std::env::temp_dir());
        let c = ctx(&t, false);
        let patch = Patch::new("3", "4");
        did_pass(&c, "q", &patch).unwrap();
        did_retry(&c, "q", &patch).unwrap();
        did_error(&c, "q", &patch, "no checkout").unwrap();
        assert_eq!(t.status.messages_for("q"), vec!["Pass", "Retry", "Error: no checkout"]);
    }
}
