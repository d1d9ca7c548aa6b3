use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use qbot_core::{is_terminal_status, PatchId};
use qbot_status::StatusReporter;
use qbot_tracker::Tracker;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionEntry {
    pub patch_id: PatchId,
    #[serde(default)]
    pub status: Option<String>,
    /// Insertion order; never reused.
    pub seq: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct PersistedCollection {
    #[serde(default)]
    next_seq: u64,
    #[serde(default)]
    entries: Vec<CollectionEntry>,
}

/// Locally persisted, ordered set of patches a review queue still has to look at.
///
/// Ids keep their position across refreshes, so the oldest pending patch is
/// always served first.
pub struct PatchCollection {
    name: String,
    path: PathBuf,
    state: PersistedCollection,
}

impl PatchCollection {
    /// Load the collection stored at `path`, or start empty if nothing is there yet.
    pub fn open(path: &Path, name: &str) -> Result<Self> {
        let state = if path.exists() {
            let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
            serde_json::from_str(&s).with_context(|| format!("parse patch collection {}", path.display()))?
        } else {
            PersistedCollection::default()
        };
        Ok(Self {
            name: name.to_string(),
            path: path.to_path_buf(),
            state,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entries(&self) -> &[CollectionEntry] {
        &self.state.entries
    }

    pub fn ids(&self) -> Vec<PatchId> {
        self.state.entries.iter().map(|e| e.patch_id.clone()).collect()
    }

    /// Reconcile against the tracker's pending list and the status server.
    ///
    /// A failed tracker read leaves the collection untouched.
    pub fn refresh(&mut self, tracker: &dyn Tracker, status: &dyn StatusReporter) -> Result<()> {
        let reported = match tracker.fetch_pending_ids_for_queue(&self.name) {
            Ok(ids) => ids,
            Err(e) => {
                warn!(queue = %self.name, "tracker refresh failed, keeping current patches: {e:#}");
                return Ok(());
            }
        };

        let mut seen = HashSet::new();
        let mut fresh_status = Vec::with_capacity(reported.len());
        for id in reported {
            if !seen.insert(id.clone()) {
                continue;
            }
            let s = match status.patch_status(&self.name, &id) {
                Ok(s) => s,
                Err(e) => {
                    warn!(queue = %self.name, patch = %id, "status lookup failed: {e:#}");
                    None
                }
            };
            fresh_status.push((id, s));
        }

        let lookup = |id: &PatchId| fresh_status.iter().find(|(p, _)| p == id).map(|(_, s)| s.clone());
        let mut entries: Vec<CollectionEntry> = self
            .state
            .entries
            .iter()
            .filter_map(|e| {
                lookup(&e.patch_id).map(|s| CollectionEntry {
                    status: s.or_else(|| e.status.clone()),
                    ..e.clone()
                })
            })
            .filter(|e| !entry_is_terminal(e))
            .collect();

        let known: HashSet<PatchId> = self.state.entries.iter().map(|e| e.patch_id.clone()).collect();
        for (id, s) in &fresh_status {
            if known.contains(id) || s.as_deref().map(is_terminal_status).unwrap_or(false) {
                continue;
            }
            debug!(queue = %self.name, patch = %id, "tracking new patch");
            entries.push(CollectionEntry {
                patch_id: id.clone(),
                status: s.clone(),
                seq: self.state.next_seq,
            });
            self.state.next_seq += 1;
        }

        self.state.entries = entries;
        self.save()
    }

    /// First tracked patch that still needs work.
    pub fn next(&self) -> Option<PatchId> {
        self.state
            .entries
            .iter()
            .find(|e| !entry_is_terminal(e))
            .map(|e| e.patch_id.clone())
    }

    fn save(&self) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
        let bytes = serde_json::to_vec_pretty(&self.state)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir).with_context(|| format!("temp file in {}", dir.display()))?;
        tmp.write_all(&bytes)?;
        tmp.persist(&self.path)
            .with_context(|| format!("persist {}", self.path.display()))?;
        Ok(())
    }
}

fn entry_is_terminal(e: &CollectionEntry) -> bool {
    e.status.as_deref().map(is_terminal_status).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use qbot_status::InMemoryStatusReporter;
    use qbot_tracker::InMemoryTracker;
    use tempfile::tempdir;

    #[test]
    fn missing_file_opens_empty() {
        let dir = tempdir().unwrap();
        let c = PatchCollection::open(&dir.path().join("none.json"), "style-queue").unwrap();
        assert!(c.entries().is_empty());
        assert_eq!(c.next(), None);
    }

    #[test]
    fn duplicate_ids_in_response_are_tracked_once() {
        let dir = tempdir().unwrap();
        let tracker = InMemoryTracker::new();
        let status = InMemoryStatusReporter::new();
        tracker.set_pending("style-queue", &["4", "4", "5"]);
        let mut c = PatchCollection::open(&dir.path().join("c.json"), "style-queue").unwrap();
        c.refresh(&tracker, &status).unwrap();
        assert_eq!(c.ids(), vec![PatchId::from_str("4"), PatchId::from_str("5")]);
    }
}
