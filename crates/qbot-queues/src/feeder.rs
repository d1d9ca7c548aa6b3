use std::time::Duration;

use qbot_core::{Patch, QueueError};
use qbot_engine::{QueueDelegate, RunContext};
use qbot_tracker::CommitterValidator;
use tracing::warn;

use crate::common::{begin_queue, QueueSettings};

pub const FEEDER_QUEUE_NAME: &str = "feeder-queue";

/// Publishes work lists for other queues.
pub trait Feeder {
    fn feed(&mut self, ctx: &mut RunContext) -> Result<(), QueueError>;
}

/// The feeder queue has nothing to fetch; every tick is the same synthetic item.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeederTick;

pub struct FeederQueue {
    feeders: Vec<Box<dyn Feeder>>,
    sleep: Duration,
    idle_backoff: Duration,
}

impl FeederQueue {
    pub fn new(feeders: Vec<Box<dyn Feeder>>, settings: &QueueSettings) -> Self {
        Self {
            feeders,
            sleep: settings.feeder_sleep,
            idle_backoff: settings.idle_backoff,
        }
    }
}

impl QueueDelegate for FeederQueue {
    type Item = FeederTick;

    fn queue_name(&self) -> &str {
        FEEDER_QUEUE_NAME
    }

    fn begin_work_queue(&mut self, ctx: &mut RunContext) -> Result<(), QueueError> {
        begin_queue(ctx, FEEDER_QUEUE_NAME)
    }

    fn next_work_item(&mut self, _ctx: &mut RunContext) -> Result<Option<FeederTick>, QueueError> {
        Ok(Some(FeederTick))
    }

    fn should_proceed_with_work_item(&mut self, _ctx: &mut RunContext, _item: &FeederTick) -> Result<bool, QueueError> {
        Ok(true)
    }

    fn process_work_item(&mut self, ctx: &mut RunContext, _item: &FeederTick) -> Result<bool, QueueError> {
        for feeder in self.feeders.iter_mut() {
            feeder.feed(ctx)?;
        }
        ctx.log(&format!("Sleeping for {} seconds.", self.sleep.as_secs()));
        ctx.tool.sleeper.sleep(self.sleep);
        Ok(true)
    }

    fn handle_unexpected_error(&mut self, ctx: &mut RunContext, _item: &FeederTick, message: &str) -> Result<(), QueueError> {
        ctx.log(message);
        Ok(())
    }

    fn idle_backoff(&self) -> Duration {
        self.idle_backoff
    }
}

/// Feeds the commit queue: validated patches with `commit-queue+`, rollouts first.
pub struct CommitQueueFeeder {
    queue: String,
    committers: Vec<String>,
    reviewers: Vec<String>,
}

impl CommitQueueFeeder {
    pub fn new(queue: &str, settings: &QueueSettings) -> Self {
        Self {
            queue: queue.to_string(),
            committers: settings.committers.clone(),
            reviewers: settings.reviewers.clone(),
        }
    }
}

/// Rollouts jump the line; otherwise tracker order is kept.
pub fn order_for_commit_queue(mut patches: Vec<Patch>) -> Vec<Patch> {
    patches.sort_by_key(|p| !p.is_rollout);
    patches
}

impl Feeder for CommitQueueFeeder {
    fn feed(&mut self, ctx: &mut RunContext) -> Result<(), QueueError> {
        let ids = ctx.tool.tracker.fetch_pending_ids_for_queue(&self.queue)?;
        let mut patches = Vec::with_capacity(ids.len());
        for id in ids {
            match ctx.tool.tracker.fetch_attachment(&id) {
                Ok(p) => patches.push(p),
                Err(e) => warn!(patch = %id, "skipping attachment that could not be fetched: {e:#}"),
            }
        }

        let validator = CommitterValidator::new(ctx.tool.tracker.clone(), &self.committers, &self.reviewers);
        let patches = validator.patches_after_rejecting_invalid_committers_and_reviewers(patches)?;
        let ordered: Vec<_> = order_for_commit_queue(patches).into_iter().map(|p| p.id).collect();

        if ordered.is_empty() {
            ctx.log(&format!("Feeding {}: no items", self.queue));
        } else {
            let listed: Vec<&str> = ordered.iter().map(|id| id.as_str()).collect();
            ctx.log(&format!("Feeding {} items {}", self.queue, listed.join(", ")));
        }
        ctx.tool.status.update_work_items(&self.queue, &ordered)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rollouts_first_keeping_relative_order() {
        let patches = vec![
            Patch::new("1", "10"),
            Patch::new("2", "20").rollout(),
            Patch::new("3", "30"),
            Patch::new("4", "40").rollout(),
        ];
        let ids: Vec<String> = order_for_commit_queue(patches).into_iter().map(|p| p.id.0).collect();
        assert_eq!(ids, vec!["2", "4", "1", "3"]);
    }
}
