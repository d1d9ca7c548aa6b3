use qbot_core::{Patch, PatchId, StatusId};

/// The status server: sole source of truth for per-patch queue status.
pub trait StatusReporter: Send + Sync {
    /// Record `message` for `queue` (and `patch`, if any), optionally with a log blob.
    fn update_status(&self, queue: &str, message: &str, patch: Option<&Patch>, results: Option<&[u8]>) -> anyhow::Result<StatusId>;

    /// The next patch the server wants `queue` to work on.
    fn next_work_item(&self, queue: &str) -> anyhow::Result<Option<PatchId>>;

    /// Replace the pending list for `queue` (used by feeders).
    fn update_work_items(&self, queue: &str, ids: &[PatchId]) -> anyhow::Result<()>;

    /// Latest status recorded for `patch_id` in `queue`.
    fn patch_status(&self, queue: &str, patch_id: &PatchId) -> anyhow::Result<Option<String>>;

    fn results_url_for_status(&self, status_id: &StatusId) -> String;
}
