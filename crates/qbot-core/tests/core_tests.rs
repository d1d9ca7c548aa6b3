use qbot_core::{
    is_terminal_status, log_from_script_error_for_upload, Outcome, Patch, PatchId, QueueError, RunOptions, ScriptError,
    StatusId, DEFAULT_UPLOAD_LIMIT, HANDLED_ERROR_CODE,
};

#[test]
fn test_terminal_statuses() {
    for s in ["Pass", "Fail", "Error: could not apply", "Error:"] {
        assert!(is_terminal_status(s), "{s} should be terminal");
    }
}

#[test]
fn test_progress_statuses_are_not_terminal() {
    for s in [
        "Retry",
        "Starting Queue",
        "Processing patch",
        "Processing rollout patch",
        "Uploading patch",
        "Checking style",
        "Empty queue",
        "Stopping Queue, reason: User declined.",
        "error: lowercase is not an error status",
    ] {
        assert!(!is_terminal_status(s), "{s} should not be terminal");
    }
}

#[test]
fn test_outcome_terminality_matches_status() {
    assert!(Outcome::Pass.is_terminal());
    assert!(Outcome::Fail.is_terminal());
    assert!(Outcome::Error("boom".into()).is_terminal());
    assert!(!Outcome::Retry.is_terminal());
}

#[test]
fn test_one_mib_output_uploads_last_512_kib() {
    let output: String = "0123456789abcdef".repeat(64 * 1024);
    assert_eq!(output.len(), 1024 * 1024);
    let err = ScriptError::new(vec!["run-webkit-tests".into()], 1, output.clone());

    let blob = log_from_script_error_for_upload(&err, None);
    assert_eq!(blob.len(), DEFAULT_UPLOAD_LIMIT);
    assert_eq!(blob.as_slice(), &output.as_bytes()[output.len() - DEFAULT_UPLOAD_LIMIT..]);
    assert!(std::str::from_utf8(&blob).is_ok());
}

#[test]
fn test_status_id_new_is_unique() {
    assert_ne!(StatusId::new(), StatusId::new());
    assert_eq!(PatchId::from_str("42").as_str(), "42");
}

#[test]
fn test_queue_error_exposes_script_error() {
    let script = ScriptError::new(vec!["/usr/bin/svn-apply".into()], HANDLED_ERROR_CODE, "");
    let err: QueueError = script.clone().into();
    assert_eq!(err.script_error(), Some(&script));
    assert_eq!(err.script_error().unwrap().command_name(), "svn-apply");
    assert!(QueueError::Declined.script_error().is_none());
    assert_eq!(QueueError::Declined.to_string(), "User declined.");
}

#[test]
fn test_patch_serde_defaults() {
    let patch: Patch = serde_json::from_str(r#"{"id":"7","bug_id":"70"}"#).unwrap();
    assert_eq!(patch, Patch::new("7", "70"));
    assert_eq!(RunOptions::default().iterations, None);
}
