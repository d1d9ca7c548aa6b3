use anyhow::anyhow;
use qbot_collection::PatchCollection;
use qbot_core::{BugId, Patch, PatchId};
use qbot_status::{InMemoryStatusReporter, StatusReporter};
use qbot_tracker::{InMemoryTracker, Tracker};
use tempfile::tempdir;

const QUEUE: &str = "style-queue";

fn ids(raw: &[&str]) -> Vec<PatchId> {
    raw.iter().map(|s| PatchId::from_str(*s)).collect()
}

fn set_status(status: &InMemoryStatusReporter, id: &str, message: &str) {
    let patch = Patch::new(id, "1");
    status.update_status(QUEUE, message, Some(&patch), None).unwrap();
}

#[test]
fn refresh_twice_with_same_response_is_idempotent() {
    let dir = tempdir().unwrap();
    let tracker = InMemoryTracker::new();
    let status = InMemoryStatusReporter::new();
    tracker.set_pending(QUEUE, &["3", "1", "2"]);

    let mut c = PatchCollection::open(&dir.path().join("c.json"), QUEUE).unwrap();
    c.refresh(&tracker, &status).unwrap();
    let first = c.entries().to_vec();
    c.refresh(&tracker, &status).unwrap();
    assert_eq!(c.entries(), first.as_slice());
    assert_eq!(c.ids(), ids(&["3", "1", "2"]));
}

#[test]
fn existing_ids_keep_position_and_new_ones_append() {
    let dir = tempdir().unwrap();
    let tracker = InMemoryTracker::new();
    let status = InMemoryStatusReporter::new();
    let mut c = PatchCollection::open(&dir.path().join("c.json"), QUEUE).unwrap();

    tracker.set_pending(QUEUE, &["10", "11"]);
    c.refresh(&tracker, &status).unwrap();
    tracker.set_pending(QUEUE, &["12", "11", "10"]);
    c.refresh(&tracker, &status).unwrap();

    assert_eq!(c.ids(), ids(&["10", "11", "12"]));
    assert_eq!(c.next(), Some(PatchId::from_str("10")));
}

#[test]
fn missing_fresh_status_keeps_cached_one() {
    let dir = tempdir().unwrap();
    let tracker = InMemoryTracker::new();
    let status = InMemoryStatusReporter::new();
    tracker.set_pending(QUEUE, &["5"]);
    set_status(&status, "5", "Checking style");

    let mut c = PatchCollection::open(&dir.path().join("c.json"), QUEUE).unwrap();
    c.refresh(&tracker, &status).unwrap();
    assert_eq!(c.entries()[0].status.as_deref(), Some("Checking style"));

    c.refresh(&tracker, &InMemoryStatusReporter::new()).unwrap();
    assert_eq!(c.entries()[0].status.as_deref(), Some("Checking style"));
    assert_eq!(c.ids(), ids(&["5"]));
}

#[test]
fn terminal_ids_are_dropped_and_never_served() {
    let dir = tempdir().unwrap();
    let tracker = InMemoryTracker::new();
    let status = InMemoryStatusReporter::new();
    let mut c = PatchCollection::open(&dir.path().join("c.json"), QUEUE).unwrap();

    tracker.set_pending(QUEUE, &["1", "2", "3", "4"]);
    c.refresh(&tracker, &status).unwrap();

    set_status(&status, "1", "Pass");
    set_status(&status, "2", "Error: could not apply");
    set_status(&status, "3", "Checking style");
    c.refresh(&tracker, &status).unwrap();

    assert_eq!(c.ids(), ids(&["3", "4"]));
    assert_eq!(c.next(), Some(PatchId::from_str("3")));

    set_status(&status, "3", "Fail");
    set_status(&status, "4", "Pass");
    c.refresh(&tracker, &status).unwrap();
    assert_eq!(c.next(), None);
}

#[test]
fn ids_absent_from_tracker_are_dropped() {
    let dir = tempdir().unwrap();
    let tracker = InMemoryTracker::new();
    let status = InMemoryStatusReporter::new();
    let mut c = PatchCollection::open(&dir.path().join("c.json"), QUEUE).unwrap();

    tracker.set_pending(QUEUE, &["1", "2"]);
    c.refresh(&tracker, &status).unwrap();
    tracker.set_pending(QUEUE, &["2"]);
    c.refresh(&tracker, &status).unwrap();
    assert_eq!(c.ids(), ids(&["2"]));
}

#[test]
fn state_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("c.json");
    let tracker = InMemoryTracker::new();
    let status = InMemoryStatusReporter::new();

    {
        let mut c = PatchCollection::open(&path, QUEUE).unwrap();
        tracker.set_pending(QUEUE, &["7", "8"]);
        c.refresh(&tracker, &status).unwrap();
    }

    let mut c = PatchCollection::open(&path, QUEUE).unwrap();
    assert_eq!(c.ids(), ids(&["7", "8"]));

    // 9 is newer than the reopened entries even though it is listed first.
    tracker.set_pending(QUEUE, &["9", "8", "7"]);
    c.refresh(&tracker, &status).unwrap();
    assert_eq!(c.ids(), ids(&["7", "8", "9"]));
    assert!(c.entries()[2].seq > c.entries()[1].seq);
}

struct BrokenTracker;

impl Tracker for BrokenTracker {
    fn fetch_attachment(&self, id: &PatchId) -> anyhow::Result<Patch> {
        Err(anyhow!("no attachment {id}"))
    }
    fn fetch_pending_ids_for_queue(&self, _queue: &str) -> anyhow::Result<Vec<PatchId>> {
        Err(anyhow!("tracker unavailable"))
    }
    fn post_comment(&self, _bug_id: &BugId, _text: &str, _cc: &[String]) -> anyhow::Result<()> {
        Ok(())
    }
    fn set_flag(&self, _id: &PatchId, _flag: &str, _value: &str) -> anyhow::Result<()> {
        Ok(())
    }
    fn add_cc(&self, _bug_id: &BugId, _cc: &[String]) -> anyhow::Result<()> {
        Ok(())
    }
}

#[test]
fn tracker_failure_keeps_current_patches() {
    let dir = tempdir().unwrap();
    let tracker = InMemoryTracker::new();
    let status = InMemoryStatusReporter::new();
    let mut c = PatchCollection::open(&dir.path().join("c.json"), QUEUE).unwrap();
    tracker.set_pending(QUEUE, &["5"]);
    c.refresh(&tracker, &status).unwrap();

    c.refresh(&BrokenTracker, &status).unwrap();
    assert_eq!(c.ids(), ids(&["5"]));
}
