use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use qbot_core::Patch;

use crate::traits::Tracker;

/// Checks who set the review/commit flags and rejects patches from the
/// queues when the setter is not allowed to.
pub struct CommitterValidator {
    tracker: Arc<dyn Tracker>,
    committers: HashSet<String>,
    reviewers: HashSet<String>,
}

impl CommitterValidator {
    /// Empty lists accept any setter that is known.
    pub fn new(tracker: Arc<dyn Tracker>, committers: &[String], reviewers: &[String]) -> Self {
        Self {
            tracker,
            committers: committers.iter().cloned().collect(),
            reviewers: reviewers.iter().cloned().collect(),
        }
    }

    pub fn reject_patch_from_commit_queue(&self, patch: &Patch, additional_comment: Option<&str>) -> Result<()> {
        let comment = format!("Rejecting patch {} from commit-queue.", patch.id);
        self.reject(patch, "commit-queue", comment, additional_comment)
    }

    pub fn reject_patch_from_review_queue(&self, patch: &Patch, additional_comment: Option<&str>) -> Result<()> {
        let comment = format!("Rejecting patch {} from review queue.", patch.id);
        self.reject(patch, "review", comment, additional_comment)
    }

    fn reject(&self, patch: &Patch, flag: &str, comment: String, additional_comment: Option<&str>) -> Result<()> {
        tracing::info!(patch = %patch.id, flag, "rejecting patch");
        self.tracker.set_flag(&patch.id, flag, "-")?;
        let text = match additional_comment {
            Some(extra) => format!("{}\n\n{}", comment, extra),
            None => comment,
        };
        self.tracker.post_comment(&patch.bug_id, &text, &[])
    }

    fn permission_message(setter: Option<&str>, flag: &str, list: &str) -> String {
        let setter = setter.unwrap_or("an unknown user");
        format!(
            "{} does not have {} permissions according to the {} list.\n\n- If you do not have {} rights please read the contribution guidelines.\n- If you have {} rights please correct the error in the list.",
            setter, flag, list, flag, flag
        )
    }

    fn allowed(setter: Option<&str>, list: &HashSet<String>) -> bool {
        match setter {
            Some(s) => list.is_empty() || list.contains(s),
            None => false,
        }
    }

    /// Keep only patches whose reviewer and committer are valid, rejecting the rest.
    pub fn patches_after_rejecting_invalid_committers_and_reviewers(&self, patches: Vec<Patch>) -> Result<Vec<Patch>> {
        let mut validated = vec![];
        for patch in patches {
            if patch.reviewer.is_some() && !Self::allowed(patch.reviewer.as_deref(), &self.reviewers) {
                let msg = Self::permission_message(patch.reviewer.as_deref(), "reviewer", "reviewers");
                self.reject_patch_from_review_queue(&patch, Some(&msg))?;
                continue;
            }
            if !Self::allowed(patch.committer.as_deref(), &self.committers) {
                let msg = Self::permission_message(patch.committer.as_deref(), "committer", "committers");
                self.reject_patch_from_commit_queue(&patch, Some(&msg))?;
                continue;
            }
            validated.push(patch);
        }
        Ok(validated)
    }
}
