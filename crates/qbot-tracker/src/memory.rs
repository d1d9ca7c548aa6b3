use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use qbot_core::{BugId, Patch, PatchId};

use crate::traits::Tracker;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Comment {
    pub bug_id: BugId,
    pub text: String,
    pub cc: Vec<String>,
}

/// In-memory tracker for tests. Pending lists are set directly.
#[derive(Default)]
pub struct InMemoryTracker {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    attachments: HashMap<PatchId, Patch>,
    pending: HashMap<String, Vec<PatchId>>,
    comments: Vec<Comment>,
    flags: Vec<(PatchId, String, String)>,
    cc: Vec<(BugId, Vec<String>)>,
}

impl InMemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_attachment(&self, patch: Patch) {
        let mut inner = self.inner.lock().unwrap();
        inner.attachments.insert(patch.id.clone(), patch);
    }

    pub fn set_pending(&self, queue: &str, ids: &[&str]) {
        let mut inner = self.inner.lock().unwrap();
        inner.pending.insert(queue.to_string(), ids.iter().map(|s| PatchId::from_str(*s)).collect());
    }

    pub fn comments(&self) -> Vec<Comment> {
        self.inner.lock().unwrap().comments.clone()
    }

    pub fn flags(&self) -> Vec<(PatchId, String, String)> {
        self.inner.lock().unwrap().flags.clone()
    }

    pub fn cc_requests(&self) -> Vec<(BugId, Vec<String>)> {
        self.inner.lock().unwrap().cc.clone()
    }
}

impl Tracker for InMemoryTracker {
    fn fetch_attachment(&self, id: &PatchId) -> Result<Patch> {
        let inner = self.inner.lock().unwrap();
        inner.attachments.get(id).cloned().ok_or_else(|| anyhow!("attachment {} not found", id))
    }

    fn fetch_pending_ids_for_queue(&self, queue: &str) -> Result<Vec<PatchId>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.pending.get(queue).cloned().unwrap_or_default())
    }

    fn post_comment(&self, bug_id: &BugId, text: &str, cc: &[String]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.comments.push(Comment {
            bug_id: bug_id.clone(),
            text: text.to_string(),
            cc: cc.to_vec(),
        });
        Ok(())
    }

    fn set_flag(&self, id: &PatchId, flag: &str, value: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.flags.push((id.clone(), flag.to_string(), value.to_string()));
        Ok(())
    }

    fn add_cc(&self, bug_id: &BugId, cc: &[String]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.cc.push((bug_id.clone(), cc.to_vec()));
        Ok(())
    }
}
