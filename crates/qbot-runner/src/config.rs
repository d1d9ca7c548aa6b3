use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use qbot_core::DEFAULT_UPLOAD_LIMIT;
use qbot_queues::{QueueSettings, StepCommands};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub commands: CommandsConfig,
    #[serde(default)]
    pub people: PeopleConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub status_db: String,
    pub tracker_root: String,
    pub log_root: String,
    /// Working copy the steps run in.
    pub checkout_root: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            status_db: ".qbot/status.db".to_string(),
            tracker_root: ".qbot/tracker".to_string(),
            log_root: ".qbot/logs".to_string(),
            checkout_root: ".".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub webkit_patch: String,
    pub watchers: Vec<String>,
    pub idle_sleep_seconds: u64,
    pub feeder_sleep_seconds: u64,
    pub upload_limit_bytes: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            webkit_patch: "webkit-patch".to_string(),
            watchers: vec![],
            idle_sleep_seconds: 120,
            feeder_sleep_seconds: 30,
            upload_limit_bytes: DEFAULT_UPLOAD_LIMIT,
        }
    }
}

/// Commit-queue step command lines; `{patch}` / `{bug}` are substituted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    pub clean: Vec<String>,
    pub update: Vec<String>,
    pub apply: Vec<String>,
    pub build: Vec<String>,
    pub test: Vec<String>,
    pub land: Vec<String>,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        let s = StepCommands::default();
        Self {
            clean: s.clean,
            update: s.update,
            apply: s.apply,
            build: s.build,
            test: s.test,
            land: s.land,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeopleConfig {
    pub committers: Vec<String>,
    pub reviewers: Vec<String>,
}

impl Config {
    pub fn default_for_repo() -> Self {
        Self {
            paths: PathsConfig::default(),
            queue: QueueConfig::default(),
            commands: CommandsConfig::default(),
            people: PeopleConfig::default(),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let cfg: Config = toml::from_str(&s).with_context(|| format!("parse {}", path.display()))?;
        Ok(cfg)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let s = toml::to_string_pretty(self).with_context(|| "serialize toml")?;
        std::fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    pub fn config_path(repo_root: &Path) -> PathBuf {
        repo_root.join(".qbot").join("qbot.toml")
    }

    /// `~` is expanded; relative paths hang off `repo_root`.
    pub fn resolve(&self, repo_root: &Path, raw: &str) -> PathBuf {
        let expanded = PathBuf::from(shellexpand::tilde(raw).to_string());
        if expanded.is_absolute() {
            expanded
        } else {
            repo_root.join(expanded)
        }
    }

    pub fn queue_settings(&self) -> QueueSettings {
        QueueSettings {
            webkit_patch: self.queue.webkit_patch.clone(),
            watchers: self.queue.watchers.clone(),
            upload_limit: self.queue.upload_limit_bytes,
            idle_backoff: Duration::from_secs(self.queue.idle_sleep_seconds),
            feeder_sleep: Duration::from_secs(self.queue.feeder_sleep_seconds),
            committers: self.people.committers.clone(),
            reviewers: self.people.reviewers.clone(),
        }
    }

    pub fn step_commands(&self) -> StepCommands {
        StepCommands {
            clean: self.commands.clean.clone(),
            update: self.commands.update.clone(),
            apply: self.commands.apply.clone(),
            build: self.commands.build.clone(),
            test: self.commands.test.clone(),
            land: self.commands.land.clone(),
        }
    }
}
