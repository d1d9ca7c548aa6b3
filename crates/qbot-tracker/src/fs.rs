use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use qbot_core::{BugId, Patch, PatchId};
use serde::{Deserialize, Serialize};

use crate::traits::{pending_flag_for_queue, Tracker};

/// On-disk form of one attachment: the patch plus its flags.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AttachmentRecord {
    #[serde(flatten)]
    pub patch: Patch,
    #[serde(default)]
    pub flags: BTreeMap<String, String>,
}

/// Tracker backed by a directory:
/// `attachments/<id>.json` holds records, `comments/<bug>.md` collects comments.
#[derive(Clone)]
pub struct FsTracker {
    pub root: PathBuf,
}

impl FsTracker {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn attachment_path(&self, id: &PatchId) -> PathBuf {
        self.root.join("attachments").join(format!("{}.json", id.as_str()))
    }

    fn comments_path(&self, bug_id: &BugId) -> PathBuf {
        self.root.join("comments").join(format!("{}.md", bug_id.as_str()))
    }

    pub fn put_attachment(&self, record: &AttachmentRecord) -> Result<()> {
        let path = self.attachment_path(&record.patch.id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        let bytes = serde_json::to_vec_pretty(record)?;
        std::fs::write(&path, bytes).with_context(|| format!("write attachment {}", path.display()))?;
        Ok(())
    }

    pub fn load_attachment(&self, id: &PatchId) -> Result<AttachmentRecord> {
        let path = self.attachment_path(id);
        read_record(&path)
    }

    fn append_to_bug(&self, bug_id: &BugId, text: &str) -> Result<()> {
        let path = self.comments_path(bug_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open {}", path.display()))?;
        writeln!(f, "{}", text)?;
        Ok(())
    }
}

fn read_record(path: &Path) -> Result<AttachmentRecord> {
    let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let record: AttachmentRecord = serde_json::from_str(&s).with_context(|| format!("parse {}", path.display()))?;
    Ok(record)
}

/// Numeric ids sort numerically, anything else after them by name.
fn id_sort_key(id: &PatchId) -> (u64, String) {
    (id.as_str().parse::<u64>().unwrap_or(u64::MAX), id.as_str().to_string())
}

impl Tracker for FsTracker {
    fn fetch_attachment(&self, id: &PatchId) -> Result<Patch> {
        Ok(self.load_attachment(id)?.patch)
    }

    fn fetch_pending_ids_for_queue(&self, queue: &str) -> Result<Vec<PatchId>> {
        let Some((flag, value)) = pending_flag_for_queue(queue) else {
            return Ok(vec![]);
        };
        let dir = self.root.join("attachments");
        if !dir.exists() {
            return Ok(vec![]);
        }
        let mut ids = vec![];
        for entry in std::fs::read_dir(&dir).with_context(|| format!("list {}", dir.display()))? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_record(&path) {
                Ok(record) if record.flags.get(flag).map(String::as_str) == Some(value) => ids.push(record.patch.id),
                Ok(_) => {}
                Err(e) => tracing::warn!(path = %path.display(), "skipping unreadable attachment: {e:#}"),
            }
        }
        ids.sort_by_key(id_sort_key);
        Ok(ids)
    }

    fn post_comment(&self, bug_id: &BugId, text: &str, cc: &[String]) -> Result<()> {
        let mut entry = String::from("---\n");
        if !cc.is_empty() {
            entry.push_str(&format!("CC: {}\n", cc.join(", ")));
        }
        entry.push_str(text);
        self.append_to_bug(bug_id, &entry)
    }

    fn set_flag(&self, id: &PatchId, flag: &str, value: &str) -> Result<()> {
        let mut record = self.load_attachment(id)?;
        record.flags.insert(flag.to_string(), value.to_string());
        self.put_attachment(&record)
    }

    fn add_cc(&self, bug_id: &BugId, cc: &[String]) -> Result<()> {
        if cc.is_empty() {
            return Ok(());
        }
        self.append_to_bug(bug_id, &format!("CC: {}", cc.join(", ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(id: &str, flag: &str, value: &str) -> AttachmentRecord {
        let mut flags = BTreeMap::new();
        flags.insert(flag.to_string(), value.to_string());
        AttachmentRecord {
            patch: Patch::new(id, "500"),
            flags,
        }
    }

    #[test]
    fn pending_ids_follow_flags_in_numeric_order() {
        let dir = tempdir().unwrap();
        let tracker = FsTracker::new(dir.path().to_path_buf());
        tracker.put_attachment(&record("10", "review", "?")).unwrap();
        tracker.put_attachment(&record("9", "review", "?")).unwrap();
        tracker.put_attachment(&record("11", "review", "+")).unwrap();
        tracker.put_attachment(&record("12", "commit-queue", "+")).unwrap();

        let style = tracker.fetch_pending_ids_for_queue("style-queue").unwrap();
        assert_eq!(style, vec![PatchId::from_str("9"), PatchId::from_str("10")]);
        let commit = tracker.fetch_pending_ids_for_queue("commit-queue").unwrap();
        assert_eq!(commit, vec![PatchId::from_str("12")]);
        assert!(tracker.fetch_pending_ids_for_queue("unknown-queue").unwrap().is_empty());
    }

    #[test]
    fn set_flag_removes_from_queue() {
        let dir = tempdir().unwrap();
        let tracker = FsTracker::new(dir.path().to_path_buf());
        tracker.put_attachment(&record("7", "in-rietveld", "?")).unwrap();
        assert_eq!(tracker.fetch_pending_ids_for_queue("rietveld-upload-queue").unwrap().len(), 1);

        tracker.set_flag(&PatchId::from_str("7"), "in-rietveld", "-").unwrap();
        assert!(tracker.fetch_pending_ids_for_queue("rietveld-upload-queue").unwrap().is_empty());
        assert_eq!(tracker.fetch_attachment(&PatchId::from_str("7")).unwrap().bug_id.as_str(), "500");
    }

    #[test]
    fn comments_are_appended_per_bug() {
        let dir = tempdir().unwrap();
        let tracker = FsTracker::new(dir.path().to_path_buf());
        let bug = BugId::from_str("500");
        tracker.post_comment(&bug, "first", &[]).unwrap();
        tracker.post_comment(&bug, "second", &["watcher@example.com".to_string()]).unwrap();

        let body = std::fs::read_to_string(dir.path().join("comments").join("500.md")).unwrap();
        assert!(body.contains("first"));
        assert!(body.contains("CC: watcher@example.com\nsecond"));
    }

    #[test]
    fn missing_attachment_is_an_error() {
        let dir = tempdir().unwrap();
        let tracker = FsTracker::new(dir.path().to_path_buf());
        assert!(tracker.fetch_attachment(&PatchId::from_str("404")).is_err());
    }
}
