use std::path::Path;

use thiserror::Error;

/// Exit code meaning a lower layer already reported the failure.
pub const HANDLED_ERROR_CODE: i32 = 2;

/// Upload size cap for failure logs. Large uploads time out on the status server.
pub const DEFAULT_UPLOAD_LIMIT: usize = 512 * 1024;

/// A failed step: the command line, its exit code and captured output.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{}", self.message())]
pub struct ScriptError {
    pub script_args: Vec<String>,
    pub exit_code: i32,
    pub output: String,
    pub cwd: Option<String>,
    message: Option<String>,
}

impl ScriptError {
    pub fn new(script_args: Vec<String>, exit_code: i32, output: impl Into<String>) -> Self {
        Self {
            script_args,
            exit_code,
            output: output.into(),
            cwd: None,
            message: None,
        }
    }

    pub fn with_cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn message(&self) -> String {
        if let Some(m) = &self.message {
            return m.clone();
        }
        let mut m = format!("Failed to run \"{}\"", self.script_args.join(" "));
        if self.exit_code != 0 {
            m.push_str(&format!(" exit_code: {}", self.exit_code));
        }
        if let Some(cwd) = &self.cwd {
            m.push_str(&format!(" cwd: {}", cwd));
        }
        m
    }

    /// Basename of the program that failed, e.g. `svn-apply`.
    pub fn command_name(&self) -> &str {
        let Some(program) = self.script_args.first() else {
            return "";
        };
        Path::new(program)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(program)
    }

    pub fn message_with_output(&self, output_limit: Option<usize>) -> String {
        if self.output.is_empty() {
            return self.message();
        }
        match output_limit {
            Some(limit) if self.output.len() > limit => format!(
                "{}\nLast {} characters of output:\n{}",
                self.message(),
                limit,
                tail_utf8(&self.output, limit)
            ),
            _ => format!("{}\n{}", self.message(), self.output),
        }
    }
}

/// Keep at most the last `limit` bytes of `text`, cut on a char boundary.
pub fn tail_utf8(text: &str, limit: usize) -> &str {
    if text.len() <= limit {
        return text;
    }
    let mut start = text.len() - limit;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}

/// UTF-8 log blob for the status server: the tail of the full message.
pub fn log_from_script_error_for_upload(error: &ScriptError, output_limit: Option<usize>) -> Vec<u8> {
    let limit = output_limit.unwrap_or(DEFAULT_UPLOAD_LIMIT);
    let full = error.message_with_output(None);
    tail_utf8(&full, limit).as_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(a: &[&str]) -> Vec<String> {
        a.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn message_mentions_args_and_exit_code() {
        let e = ScriptError::new(args(&["make", "all"]), 3, "").with_cwd("/src");
        assert_eq!(e.to_string(), "Failed to run \"make all\" exit_code: 3 cwd: /src");
        assert_eq!(e.message_with_output(None), e.to_string());
    }

    #[test]
    fn custom_message_wins() {
        let e = ScriptError::new(args(&["x"]), 1, "out").with_message("patch does not apply");
        assert_eq!(e.message_with_output(Some(500)), "patch does not apply\nout");
    }

    #[test]
    fn command_name_is_basename() {
        let e = ScriptError::new(args(&["/usr/local/bin/svn-apply", "--force"]), 1, "");
        assert_eq!(e.command_name(), "svn-apply");
        assert_eq!(ScriptError::new(vec![], 1, "").command_name(), "");
    }

    #[test]
    fn message_with_output_truncates_from_the_front() {
        let e = ScriptError::new(args(&["t"]), 1, "0123456789");
        let m = e.message_with_output(Some(4));
        assert!(m.ends_with("Last 4 characters of output:\n6789"));
    }

    #[test]
    fn upload_log_keeps_exact_tail() {
        let output: String = (0..1024 * 1024).map(|i| (b'a' + (i % 26) as u8) as char).collect();
        let e = ScriptError::new(args(&["run-tests"]), 1, output.clone());
        let blob = log_from_script_error_for_upload(&e, None);
        assert_eq!(blob.len(), 512 * 1024);
        assert_eq!(blob.as_slice(), &output.as_bytes()[output.len() - 512 * 1024..]);
        assert!(std::str::from_utf8(&blob).is_ok());
    }

    #[test]
    fn upload_log_stays_valid_utf8() {
        let e = ScriptError::new(args(&["t"]), 1, "é".repeat(100));
        let blob = log_from_script_error_for_upload(&e, Some(7));
        assert_eq!(blob.len(), 6);
        assert_eq!(std::str::from_utf8(&blob).unwrap(), "ééé");
    }

    #[test]
    fn small_output_is_not_truncated() {
        let e = ScriptError::new(args(&["t"]), 1, "short");
        let blob = log_from_script_error_for_upload(&e, None);
        assert_eq!(String::from_utf8(blob).unwrap(), "Failed to run \"t\" exit_code: 1\nshort");
    }
}
