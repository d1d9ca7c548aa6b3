use std::path::PathBuf;

use qbot_core::{QueueError, RunOptions, HANDLED_ERROR_CODE};
use tracing::{error, warn};

use crate::context::RunContext;
use crate::delegate::{ErrorDisposition, QueueDelegate};
use crate::tool::Tool;
use crate::worklog::WorkLog;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    NotStarted,
    Running,
    StoppedNormally,
    StoppedByError,
    StoppedByIterationCap,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub state: EngineState,
    pub exit_code: i32,
    pub iterations: u32,
}

enum Flow {
    Continue,
    Stop { state: EngineState, exit_code: i32, reason: String },
}

/// The polling loop shared by every queue flavor.
pub struct QueueEngine<D: QueueDelegate> {
    delegate: D,
    ctx: RunContext,
    state: EngineState,
}

impl<D: QueueDelegate> QueueEngine<D> {
    pub fn new(delegate: D, tool: Tool, options: RunOptions, log_dir: PathBuf) -> Self {
        let ctx = RunContext::new(tool, options, delegate.queue_name(), log_dir);
        Self {
            delegate,
            ctx,
            state: EngineState::NotStarted,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn delegate(&self) -> &D {
        &self.delegate
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Drive the queue until the delegate stops it, an iteration cap is hit or
    /// a fatal error occurs.
    pub fn run(&mut self) -> RunSummary {
        let queue_log = match WorkLog::open(&self.delegate.queue_log_path(&self.ctx)) {
            Ok(log) => Some(log),
            Err(e) => {
                warn!("could not open queue log: {e:#}");
                None
            }
        };
        self.ctx.set_queue_log(queue_log);
        self.state = EngineState::Running;

        if let Err(e) = self.delegate.begin_work_queue(&mut self.ctx) {
            let (exit_code, reason) = match &e {
                QueueError::Terminate { exit_code, reason } => (*exit_code, reason.clone()),
                other => (1, describe(other)),
            };
            return self.stop(EngineState::StoppedByError, exit_code, &reason);
        }

        loop {
            if !self.delegate.should_continue_work_queue(&mut self.ctx) {
                let state = if self.ctx.options.iteration_cap().is_some() {
                    EngineState::StoppedByIterationCap
                } else {
                    EngineState::StoppedNormally
                };
                return self.stop(state, 0, "Delegate terminated queue.");
            }

            let item = match self.delegate.next_work_item(&mut self.ctx) {
                Ok(Some(item)) => item,
                Ok(None) => {
                    self.ctx.log("No work item.");
                    self.idle();
                    continue;
                }
                Err(e) => match self.preparation_failed(e) {
                    Flow::Continue => continue,
                    Flow::Stop { state, exit_code, reason } => return self.stop(state, exit_code, &reason),
                },
            };

            match self.delegate.should_proceed_with_work_item(&mut self.ctx, &item) {
                Ok(true) => {}
                Ok(false) => {
                    self.ctx.log("Not proceeding with work item.");
                    self.idle();
                    continue;
                }
                Err(e) => match self.preparation_failed(e) {
                    Flow::Continue => continue,
                    Flow::Stop { state, exit_code, reason } => return self.stop(state, exit_code, &reason),
                },
            }

            let item_log = self
                .delegate
                .work_item_log_path(&self.ctx, &item)
                .and_then(|path| match WorkLog::open(&path) {
                    Ok(log) => Some(log),
                    Err(e) => {
                        warn!("could not open work item log: {e:#}");
                        None
                    }
                });
            self.ctx.set_item_log(item_log);
            let flow = self.process(&item);
            self.ctx.set_item_log(None);

            if let Flow::Stop { state, exit_code, reason } = flow {
                return self.stop(state, exit_code, &reason);
            }
        }
    }

    fn process(&mut self, item: &D::Item) -> Flow {
        let saved_options = self.ctx.options.clone();
        let mut retried = false;
        let flow = loop {
            let err = match self.delegate.process_work_item(&mut self.ctx, item) {
                Ok(true) => break Flow::Continue,
                Ok(false) => {
                    self.ctx.log("Unable to process work item.");
                    break Flow::Continue;
                }
                Err(e) => e,
            };

            let Some(script_error) = err.script_error().cloned() else {
                break self.preparation_failed(err);
            };
            if matches!(err, QueueError::Script(_)) && script_error.exit_code == HANDLED_ERROR_CODE {
                // Reported already by whoever raised it.
                break Flow::Continue;
            }

            let disposition = match self.delegate.handle_script_error(&mut self.ctx, item, &err) {
                Ok(d) => d,
                Err(QueueError::Terminate { exit_code, reason }) => {
                    break Flow::Stop {
                        state: EngineState::StoppedByError,
                        exit_code,
                        reason,
                    }
                }
                Err(e) => {
                    error!("error while handling script failure: {}", describe(&e));
                    break Flow::Continue;
                }
            };

            match disposition {
                ErrorDisposition::Handled => break Flow::Continue,
                ErrorDisposition::RetryNow(options) if !retried => {
                    retried = true;
                    self.ctx.log("Retrying work item with adjusted options.");
                    self.ctx.options = options;
                }
                ErrorDisposition::RetryNow(_) | ErrorDisposition::Unexpected => {
                    let message = format!(
                        "Unexpected failure when processing patch!  Please file a bug against webkit-patch.\n{}",
                        script_error.message_with_output(None)
                    );
                    self.ctx.log(&message);
                    if let Err(e) = self.delegate.handle_unexpected_error(&mut self.ctx, item, &message) {
                        error!("error while handling unexpected failure: {}", describe(&e));
                    }
                    break Flow::Continue;
                }
            }
        };
        self.ctx.options = saved_options;
        flow
    }

    /// Failures outside of script steps: fatal ones stop the queue, the rest
    /// are logged and waited out.
    fn preparation_failed(&mut self, err: QueueError) -> Flow {
        match err {
            QueueError::Terminate { exit_code, reason } => Flow::Stop {
                state: EngineState::StoppedByError,
                exit_code,
                reason,
            },
            QueueError::Declined => Flow::Stop {
                state: EngineState::StoppedByError,
                exit_code: 1,
                reason: QueueError::Declined.to_string(),
            },
            other => {
                self.ctx.log(&format!("Exception while preparing queue: {}", describe(&other)));
                self.idle();
                Flow::Continue
            }
        }
    }

    fn idle(&mut self) {
        let backoff = self.delegate.idle_backoff();
        if backoff.is_zero() {
            return;
        }
        self.ctx.log(&format!("Sleeping for {} seconds.", backoff.as_secs()));
        self.ctx.tool.sleeper.sleep(backoff);
    }

    fn stop(&mut self, state: EngineState, exit_code: i32, reason: &str) -> RunSummary {
        if let Err(e) = self.delegate.stop_work_queue(&mut self.ctx, reason) {
            warn!("could not record queue stop: {}", describe(&e));
        }
        self.ctx.log(&format!("Stopping queue: {}", reason));
        self.state = state;
        RunSummary {
            state,
            exit_code,
            iterations: self.ctx.state.iterations,
        }
    }
}

/// Error text including the anyhow context chain.
fn describe(err: &QueueError) -> String {
    match err {
        QueueError::Other(e) => format!("{e:#}"),
        other => other.to_string(),
    }
}
