use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use qbot_core::RunOptions;
use qbot_engine::{ProcessExecutive, QueueDelegate, QueueEngine, RunSummary, StdinUser, ThreadSleeper, Tool};
use qbot_queues::{
    CommitQueue, CommitQueueFeeder, CommitQueueTask, Feeder, FeederQueue, ReviewQueue, RietveldUploadQueue, StyleQueue,
    COMMIT_QUEUE_NAME, STYLE_QUEUE_NAME,
};
use qbot_status_sqlite::SqliteStatusStore;
use qbot_tracker::FsTracker;
use tracing::info;

use crate::Config;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueKind {
    Commit,
    Style,
    RietveldUpload,
    Feeder,
}

/// A repo with its configuration and the collaborators the queues run against.
pub struct QueueRunner {
    pub repo_root: PathBuf,
    pub cfg: Config,
    pub tool: Tool,
}

impl QueueRunner {
    /// Load (or create) the config and wire the local adapters.
    pub fn open(repo_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self> {
        let cfg_path = config_path.unwrap_or_else(|| Config::config_path(&repo_root));
        let cfg = if cfg_path.exists() {
            Config::load_from(&cfg_path)?
        } else {
            let cfg = Config::default_for_repo();
            cfg.save_to(&cfg_path)?;
            cfg
        };

        let status = SqliteStatusStore::open(&cfg.resolve(&repo_root, &cfg.paths.status_db))?;
        let tracker = FsTracker::new(cfg.resolve(&repo_root, &cfg.paths.tracker_root));
        let tool = Tool {
            status: Arc::new(status),
            tracker: Arc::new(tracker),
            executive: Arc::new(ProcessExecutive),
            user: Arc::new(StdinUser),
            sleeper: Arc::new(ThreadSleeper),
            checkout_root: cfg.resolve(&repo_root, &cfg.paths.checkout_root),
        };

        Ok(Self { repo_root, cfg, tool })
    }

    /// Create `.qbot/`, the default config and the status database.
    pub fn init_repo(repo_root: &Path) -> Result<()> {
        let cfg_path = Config::config_path(repo_root);
        if !cfg_path.exists() {
            Config::default_for_repo().save_to(&cfg_path)?;
        }
        let cfg = Config::load_from(&cfg_path)?;
        std::fs::create_dir_all(cfg.resolve(repo_root, &cfg.paths.tracker_root).join("attachments")).ok();
        std::fs::create_dir_all(cfg.resolve(repo_root, &cfg.paths.log_root)).ok();
        let _ = SqliteStatusStore::open(&cfg.resolve(repo_root, &cfg.paths.status_db))?;
        Ok(())
    }

    pub fn log_root(&self) -> PathBuf {
        self.cfg.resolve(&self.repo_root, &self.cfg.paths.log_root)
    }

    pub fn run_queue(&self, kind: QueueKind, options: RunOptions) -> RunSummary {
        let settings = self.cfg.queue_settings();
        match kind {
            QueueKind::Commit => {
                let task = CommitQueueTask::new(COMMIT_QUEUE_NAME, self.cfg.step_commands(), settings.upload_limit);
                self.drive(CommitQueue::new(task, settings), options)
            }
            QueueKind::Style => {
                let collection = self.log_root().join(format!("{}-patches.json", STYLE_QUEUE_NAME));
                self.drive(ReviewQueue::new(StyleQueue::new(settings), collection), options)
            }
            QueueKind::RietveldUpload => self.drive(RietveldUploadQueue::new(settings), options),
            QueueKind::Feeder => {
                let feeders: Vec<Box<dyn Feeder>> = vec![Box::new(CommitQueueFeeder::new(COMMIT_QUEUE_NAME, &settings))];
                self.drive(FeederQueue::new(feeders, &settings), options)
            }
        }
    }

    fn drive<D: QueueDelegate>(&self, delegate: D, options: RunOptions) -> RunSummary {
        info!(queue = delegate.queue_name(), "starting");
        let mut engine = QueueEngine::new(delegate, self.tool.clone(), options, self.log_root());
        let summary = engine.run();
        info!(state = ?summary.state, exit_code = summary.exit_code, iterations = summary.iterations, "queue stopped");
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qbot_core::Patch;
    use qbot_engine::EngineState;
    use qbot_status::StatusReporter;
    use qbot_tracker::AttachmentRecord;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    #[test]
    fn init_creates_config_and_database() {
        let dir = tempdir().unwrap();
        QueueRunner::init_repo(dir.path()).unwrap();
        assert!(Config::config_path(dir.path()).exists());
        assert!(dir.path().join(".qbot").join("status.db").exists());
        assert!(dir.path().join(".qbot").join("tracker").join("attachments").is_dir());
    }

    #[test]
    fn rietveld_queue_runs_against_local_adapters() {
        let dir = tempdir().unwrap();
        QueueRunner::init_repo(dir.path()).unwrap();

        let mut cfg = Config::load_from(&Config::config_path(dir.path())).unwrap();
        cfg.queue.webkit_patch = "true".to_string();
        cfg.save_to(&Config::config_path(dir.path())).unwrap();

        let runner = QueueRunner::open(dir.path().to_path_buf(), None).unwrap();
        let tracker = FsTracker::new(dir.path().join(".qbot").join("tracker"));
        let mut flags = BTreeMap::new();
        flags.insert("in-rietveld".to_string(), "?".to_string());
        tracker
            .put_attachment(&AttachmentRecord {
                patch: Patch::new("21", "210"),
                flags,
            })
            .unwrap();

        let options = RunOptions {
            confirm: false,
            iterations: Some(1),
            ..RunOptions::default()
        };
        let summary = runner.run_queue(QueueKind::RietveldUpload, options);
        assert_eq!(summary.state, EngineState::StoppedByIterationCap);
        assert_eq!(summary.exit_code, 0);

        let status = runner
            .tool
            .status
            .patch_status("rietveld-upload-queue", &qbot_core::PatchId::from_str("21"))
            .unwrap();
        assert_eq!(status.as_deref(), Some("Pass"));
        assert!(runner.log_root().join("210.log").exists());
    }
}
