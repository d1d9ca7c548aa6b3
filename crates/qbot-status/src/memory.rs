use std::collections::HashMap;
use std::sync::Mutex;

use qbot_core::{is_terminal_status, Patch, PatchId, StatusId};

use crate::traits::StatusReporter;

/// One recorded status update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusRecord {
    pub id: StatusId,
    pub queue: String,
    pub message: String,
    pub patch_id: Option<PatchId>,
    pub results: Option<Vec<u8>>,
}

/// In-memory status server for tests. Not durable.
#[derive(Default)]
pub struct InMemoryStatusReporter {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    updates: Vec<StatusRecord>,
    work_items: HashMap<String, Vec<PatchId>>,
    latest: HashMap<(String, PatchId), String>,
}

impl InMemoryStatusReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every update in the order it was written.
    pub fn updates(&self) -> Vec<StatusRecord> {
        self.inner.lock().unwrap().updates.clone()
    }

    /// Messages written for `queue`, oldest first.
    pub fn messages_for(&self, queue: &str) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner.updates.iter().filter(|u| u.queue == queue).map(|u| u.message.clone()).collect()
    }

    pub fn work_items(&self, queue: &str) -> Vec<PatchId> {
        let inner = self.inner.lock().unwrap();
        inner.work_items.get(queue).cloned().unwrap_or_default()
    }
}

impl StatusReporter for InMemoryStatusReporter {
    fn update_status(&self, queue: &str, message: &str, patch: Option<&Patch>, results: Option<&[u8]>) -> anyhow::Result<StatusId> {
        let mut inner = self.inner.lock().unwrap();
        let id = StatusId::from_str((inner.updates.len() + 1).to_string());
        let patch_id = patch.map(|p| p.id.clone());
        if let Some(pid) = &patch_id {
            inner.latest.insert((queue.to_string(), pid.clone()), message.to_string());
        }
        inner.updates.push(StatusRecord {
            id: id.clone(),
            queue: queue.to_string(),
            message: message.to_string(),
            patch_id,
            results: results.map(|r| r.to_vec()),
        });
        Ok(id)
    }

    fn next_work_item(&self, queue: &str) -> anyhow::Result<Option<PatchId>> {
        let inner = self.inner.lock().unwrap();
        let Some(items) = inner.work_items.get(queue) else {
            return Ok(None);
        };
        let next = items.iter().find(|id| {
            inner
                .latest
                .get(&(queue.to_string(), (*id).clone()))
                .map(|s| !is_terminal_status(s))
                .unwrap_or(true)
        });
        Ok(next.cloned())
    }

    fn update_work_items(&self, queue: &str, ids: &[PatchId]) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.work_items.insert(queue.to_string(), ids.to_vec());
        Ok(())
    }

    fn patch_status(&self, queue: &str, patch_id: &PatchId) -> anyhow::Result<Option<String>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.latest.get(&(queue.to_string(), patch_id.clone())).cloned())
    }

    fn results_url_for_status(&self, status_id: &StatusId) -> String {
        format!("memory://results/{}", status_id.as_str())
    }
}
