use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Append-only plain text log, one line per entry.
#[derive(Clone, Debug)]
pub struct WorkLog {
    path: PathBuf,
}

impl WorkLog {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open log {}", path.display()))?;
        Ok(Self { path: path.to_path_buf() })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, line: &str) -> Result<()> {
        let mut f = std::fs::OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(f, "{}", line)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn appends_lines_in_order() {
        let dir = tempdir().unwrap();
        let log = WorkLog::open(&dir.path().join("logs").join("42.log")).unwrap();
        log.append("one").unwrap();
        log.append("two").unwrap();
        assert_eq!(std::fs::read_to_string(log.path()).unwrap(), "one\ntwo\n");
    }
}
