use anyhow::Result;
use qbot_core::{BugId, Patch, PatchId};

/// The bug tracker holding bugs, attachments and their flags.
pub trait Tracker: Send + Sync {
    fn fetch_attachment(&self, id: &PatchId) -> Result<Patch>;

    /// Attachments currently waiting on `queue`, in tracker order.
    fn fetch_pending_ids_for_queue(&self, queue: &str) -> Result<Vec<PatchId>>;

    fn post_comment(&self, bug_id: &BugId, text: &str, cc: &[String]) -> Result<()>;

    fn set_flag(&self, id: &PatchId, flag: &str, value: &str) -> Result<()>;

    fn add_cc(&self, bug_id: &BugId, cc: &[String]) -> Result<()>;
}

/// The flag and value that put an attachment into `queue`.
pub fn pending_flag_for_queue(queue: &str) -> Option<(&'static str, &'static str)> {
    match queue {
        "commit-queue" => Some(("commit-queue", "+")),
        "rietveld-upload-queue" => Some(("in-rietveld", "?")),
        "style-queue" => Some(("review", "?")),
        _ => None,
    }
}
