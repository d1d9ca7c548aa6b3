//! Recording collaborators for exercising queues without processes, terminals or clocks.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use qbot_core::ScriptError;
use qbot_status::InMemoryStatusReporter;
use qbot_tracker::InMemoryTracker;

use crate::tool::{Executive, Sleeper, Tool, User};

#[derive(Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

struct FailureRule {
    pattern: String,
    error: ScriptError,
    remaining: Option<usize>,
}

/// Succeeds with empty output unless a failure rule matches the command line.
#[derive(Default)]
pub struct ScriptedExecutive {
    calls: Mutex<Vec<Vec<String>>>,
    rules: Mutex<Vec<FailureRule>>,
}

impl ScriptedExecutive {
    /// Fail every command whose joined arguments contain `pattern`.
    pub fn fail_when(&self, pattern: &str, error: ScriptError) {
        self.push_rule(pattern, error, None);
    }

    /// Fail the next `times` commands containing `pattern`.
    pub fn fail_times(&self, pattern: &str, times: usize, error: ScriptError) {
        self.push_rule(pattern, error, Some(times));
    }

    fn push_rule(&self, pattern: &str, error: ScriptError, remaining: Option<usize>) {
        self.rules.lock().unwrap().push(FailureRule {
            pattern: pattern.to_string(),
            error,
            remaining,
        });
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_matching(&self, pattern: &str) -> usize {
        self.calls().iter().filter(|c| c.join(" ").contains(pattern)).count()
    }
}

impl Executive for ScriptedExecutive {
    fn run_and_throw_if_fail(&self, args: &[String], _cwd: Option<&Path>) -> Result<String, ScriptError> {
        self.calls.lock().unwrap().push(args.to_vec());
        let line = args.join(" ");
        let mut rules = self.rules.lock().unwrap();
        for rule in rules.iter_mut() {
            if !line.contains(&rule.pattern) || rule.remaining == Some(0) {
                continue;
            }
            if let Some(n) = rule.remaining.as_mut() {
                *n -= 1;
            }
            return Err(rule.error.clone());
        }
        Ok(String::new())
    }
}

/// Answers every prompt with a fixed reply and remembers the questions.
pub struct ScriptedUser {
    answer: String,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedUser {
    pub fn answering(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            prompts: Mutex::new(vec![]),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl User for ScriptedUser {
    fn prompt(&self, message: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(message.to_string());
        Ok(self.answer.clone())
    }
}

/// A [`Tool`] wired to in-memory collaborators, with typed handles kept for assertions.
pub struct TestTool {
    pub tool: Tool,
    pub status: Arc<InMemoryStatusReporter>,
    pub tracker: Arc<InMemoryTracker>,
    pub executive: Arc<ScriptedExecutive>,
    pub user: Arc<ScriptedUser>,
    pub sleeper: Arc<RecordingSleeper>,
}

impl TestTool {
    pub fn new(checkout_root: PathBuf) -> Self {
        Self::with_user(checkout_root, ScriptedUser::answering("yes"))
    }

    pub fn with_user(checkout_root: PathBuf, user: ScriptedUser) -> Self {
        let status = Arc::new(InMemoryStatusReporter::new());
        let tracker = Arc::new(InMemoryTracker::new());
        let executive = Arc::new(ScriptedExecutive::default());
        let user = Arc::new(user);
        let sleeper = Arc::new(RecordingSleeper::default());
        let tool = Tool {
            status: status.clone(),
            tracker: tracker.clone(),
            executive: executive.clone(),
            user: user.clone(),
            sleeper: sleeper.clone(),
            checkout_root,
        };
        Self {
            tool,
            status,
            tracker,
            executive,
            user,
            sleeper,
        }
    }
}
