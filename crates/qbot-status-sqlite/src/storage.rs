use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use qbot_core::{is_terminal_status, Patch, PatchId, StatusId};
use qbot_status::StatusReporter;
use rusqlite::{params, Connection, OptionalExtension};

/// Local status server backed by a SQLite file.
pub struct SqliteStatusStore {
    conn: Mutex<Connection>,
    results_base: String,
}

impl SqliteStatusStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(db_path).with_context(|| format!("open sqlite db {}", db_path.display()))?;
        let init_sql = include_str!("../migrations/0001_init.sql");
        conn.execute_batch(init_sql)?;
        Ok(Self {
            conn: Mutex::new(conn),
            results_base: format!("file://{}", db_path.display()),
        })
    }

    /// Stored log blob for a status update, if one was attached.
    pub fn results_for(&self, status_id: &StatusId) -> Result<Option<Vec<u8>>> {
        let conn = self.conn.lock().unwrap();
        let blob: Option<Option<Vec<u8>>> = conn
            .query_row("SELECT results FROM statuses WHERE id=?1", params![status_id.0], |r| r.get(0))
            .optional()?;
        Ok(blob.flatten())
    }

    fn latest_status(conn: &Connection, queue: &str, patch_id: &PatchId) -> Result<Option<String>> {
        let message = conn
            .query_row(
                "SELECT message FROM statuses WHERE queue=?1 AND patch_id=?2 ORDER BY seq DESC LIMIT 1",
                params![queue, patch_id.0],
                |r| r.get(0),
            )
            .optional()?;
        Ok(message)
    }
}

impl StatusReporter for SqliteStatusStore {
    fn update_status(&self, queue: &str, message: &str, patch: Option<&Patch>, results: Option<&[u8]>) -> Result<StatusId> {
        let conn = self.conn.lock().unwrap();
        let id = StatusId::new();
        conn.execute(
            "INSERT INTO statuses(id, queue, patch_id, bug_id, message, results, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id.0,
                queue,
                patch.map(|p| p.id.0.clone()),
                patch.map(|p| p.bug_id.0.clone()),
                message,
                results,
                now_unix()
            ],
        )
        .with_context(|| format!("record status for {}", queue))?;
        tracing::debug!(queue, message, status_id = %id, "status updated");
        Ok(id)
    }

    fn next_work_item(&self, queue: &str) -> Result<Option<PatchId>> {
        let conn = self.conn.lock().unwrap();
        let mut ids = vec![];
        {
            let mut stmt = conn.prepare("SELECT patch_id FROM work_items WHERE queue=?1 ORDER BY position")?;
            let rows = stmt.query_map(params![queue], |r| Ok(PatchId::from_str(r.get::<_, String>(0)?)))?;
            for row in rows {
                ids.push(row?);
            }
        }
        for id in ids {
            match Self::latest_status(&conn, queue, &id)? {
                Some(status) if is_terminal_status(&status) => continue,
                _ => return Ok(Some(id)),
            }
        }
        Ok(None)
    }

    fn update_work_items(&self, queue: &str, ids: &[PatchId]) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        tx.execute("DELETE FROM work_items WHERE queue=?1", params![queue])?;
        for (position, id) in ids.iter().enumerate() {
            tx.execute(
                "INSERT OR IGNORE INTO work_items(queue, position, patch_id) VALUES (?1, ?2, ?3)",
                params![queue, position as i64, id.0],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn patch_status(&self, queue: &str, patch_id: &PatchId) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        Self::latest_status(&conn, queue, patch_id)
    }

    fn results_url_for_status(&self, status_id: &StatusId) -> String {
        format!("{}#results/{}", self.results_base, status_id.as_str())
    }
}

pub fn now_unix() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn sqlite_open_and_migrate() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("status.db");
        let _ = SqliteStatusStore::open(&db_path).unwrap();
        // reopening runs the idempotent schema again
        let _ = SqliteStatusStore::open(&db_path).unwrap();
    }

    #[test]
    fn status_and_results_round_trip() {
        let dir = tempdir().unwrap();
        let store = SqliteStatusStore::open(&dir.path().join("status.db")).unwrap();
        let patch = Patch::new("42", "7");

        store.update_status("style-queue", "Checking style", Some(&patch), None).unwrap();
        let id = store.update_status("style-queue", "Fail", Some(&patch), Some(b"tail of log")).unwrap();

        assert_eq!(store.patch_status("style-queue", &patch.id).unwrap().as_deref(), Some("Fail"));
        assert_eq!(store.patch_status("commit-queue", &patch.id).unwrap(), None);
        assert_eq!(store.results_for(&id).unwrap().as_deref(), Some(&b"tail of log"[..]));
        assert!(store.results_url_for_status(&id).ends_with(id.as_str()));
    }

    #[test]
    fn next_work_item_follows_feeder_order_and_skips_terminal() {
        let dir = tempdir().unwrap();
        let store = SqliteStatusStore::open(&dir.path().join("status.db")).unwrap();
        let ids: Vec<PatchId> = ["3", "1", "2"].iter().map(|s| PatchId::from_str(*s)).collect();
        store.update_work_items("commit-queue", &ids).unwrap();

        assert_eq!(store.next_work_item("commit-queue").unwrap(), Some(PatchId::from_str("3")));
        store.update_status("commit-queue", "Error: bad", Some(&Patch::new("3", "1")), None).unwrap();
        assert_eq!(store.next_work_item("commit-queue").unwrap(), Some(PatchId::from_str("1")));

        store.update_work_items("commit-queue", &[]).unwrap();
        assert_eq!(store.next_work_item("commit-queue").unwrap(), None);
    }
}
