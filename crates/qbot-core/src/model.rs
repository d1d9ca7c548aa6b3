use serde::{Deserialize, Serialize};

use crate::ids::{BugId, PatchId};

/// An attachment on a bug, as handed out by the tracker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    pub id: PatchId,
    pub bug_id: BugId,
    #[serde(default)]
    pub is_rollout: bool,
    #[serde(default)]
    pub text: String,
    /// Who set the commit flag, when known.
    #[serde(default)]
    pub committer: Option<String>,
    #[serde(default)]
    pub reviewer: Option<String>,
}

impl Patch {
    pub fn new(id: impl Into<String>, bug_id: impl Into<String>) -> Self {
        Self {
            id: PatchId::from_str(id),
            bug_id: BugId::from_str(bug_id),
            is_rollout: false,
            text: String::new(),
            committer: None,
            reviewer: None,
        }
    }

    pub fn rollout(mut self) -> Self {
        self.is_rollout = true;
        self
    }

    /// Human label used in progress statuses.
    pub fn kind_label(&self) -> &'static str {
        if self.is_rollout {
            "rollout patch"
        } else {
            "patch"
        }
    }
}

/// Options for one run of a queue. `build`, `test` and `update` steer the
/// commit task and may be adjusted for a single immediate re-attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunOptions {
    pub confirm: bool,
    pub iterations: Option<u32>,
    pub build: bool,
    pub test: bool,
    pub update: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            confirm: true,
            iterations: None,
            build: true,
            test: true,
            update: true,
        }
    }
}

impl RunOptions {
    /// Iteration limit; zero means unlimited.
    pub fn iteration_cap(&self) -> Option<u32> {
        self.iterations.filter(|cap| *cap > 0)
    }

    /// Options for landing an already-tested patch on a freshly updated checkout.
    pub fn land_after_update(&self) -> Self {
        Self {
            build: false,
            test: false,
            update: true,
            ..self.clone()
        }
    }
}
