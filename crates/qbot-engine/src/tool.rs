use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use qbot_core::ScriptError;
use qbot_status::StatusReporter;
use qbot_tracker::Tracker;

/// Runs step programs. A non-zero exit becomes a [`ScriptError`] carrying the output.
pub trait Executive: Send + Sync {
    fn run_and_throw_if_fail(&self, args: &[String], cwd: Option<&Path>) -> Result<String, ScriptError>;
}

pub trait User: Send + Sync {
    fn prompt(&self, message: &str) -> Result<String>;

    /// Only a literal `yes` confirms.
    fn confirm(&self, message: &str) -> Result<bool> {
        let answer = self.prompt(message)?;
        Ok(answer.trim() == "yes")
    }
}

pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Everything a queue talks to, bundled for the delegates.
#[derive(Clone)]
pub struct Tool {
    pub status: Arc<dyn StatusReporter>,
    pub tracker: Arc<dyn Tracker>,
    pub executive: Arc<dyn Executive>,
    pub user: Arc<dyn User>,
    pub sleeper: Arc<dyn Sleeper>,
    pub checkout_root: PathBuf,
}

/// Subprocess executive. stdout and stderr are captured together.
pub struct ProcessExecutive;

/// Exit code reported when the program could not be started at all.
const SPAWN_FAILED_EXIT_CODE: i32 = 127;

impl Executive for ProcessExecutive {
    fn run_and_throw_if_fail(&self, args: &[String], cwd: Option<&Path>) -> Result<String, ScriptError> {
        let cwd_label = cwd.map(|p| p.display().to_string());
        let fail = |code: i32, output: String| {
            let err = ScriptError::new(args.to_vec(), code, output);
            match &cwd_label {
                Some(c) => err.with_cwd(c.clone()),
                None => err,
            }
        };

        let Some((program, rest)) = args.split_first() else {
            return Err(fail(SPAWN_FAILED_EXIT_CODE, "empty command line".to_string()));
        };
        let mut cmd = Command::new(program);
        cmd.args(rest);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        tracing::debug!(command = %args.join(" "), "running");
        let out = cmd
            .output()
            .map_err(|e| fail(SPAWN_FAILED_EXIT_CODE, format!("could not start {}: {}", program, e)))?;

        let mut output = String::from_utf8_lossy(&out.stdout).to_string();
        output.push_str(&String::from_utf8_lossy(&out.stderr));
        if !out.status.success() {
            return Err(fail(out.status.code().unwrap_or(-1), output));
        }
        Ok(output)
    }
}

/// Prompts on stdout and reads one line from stdin.
pub struct StdinUser;

impl User for StdinUser {
    fn prompt(&self, message: &str) -> Result<String> {
        let mut stdout = std::io::stdout();
        stdout.write_all(message.as_bytes())?;
        stdout.flush()?;
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line).context("read answer from stdin")?;
        Ok(line.trim_end().to_string())
    }
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
