pub mod config;
pub mod runner;

pub use config::*;
pub use runner::*;

#[cfg(test)]
mod config_tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_config_round_trips_through_toml() {
        let dir = tempdir().unwrap();
        let path = Config::config_path(dir.path());
        let cfg = Config::default_for_repo();
        cfg.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, cfg);
        assert_eq!(loaded.queue.idle_sleep_seconds, 120);
        assert_eq!(loaded.queue.feeder_sleep_seconds, 30);
        assert_eq!(loaded.queue.upload_limit_bytes, 512 * 1024);
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("qbot.toml");
        std::fs::write(&path, "[queue]\nwatchers = [\"a@example.com\"]\n").unwrap();

        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg.queue.watchers, vec!["a@example.com".to_string()]);
        assert_eq!(cfg.queue.webkit_patch, "webkit-patch");
        assert_eq!(cfg.step_commands(), qbot_queues::StepCommands::default());
    }

    #[test]
    fn relative_paths_resolve_against_repo_root() {
        let cfg = Config::default_for_repo();
        let root = std::path::Path::new("/srv/checkout");
        assert_eq!(cfg.resolve(root, ".qbot/status.db"), root.join(".qbot/status.db"));
        assert_eq!(cfg.resolve(root, "/var/qbot"), std::path::PathBuf::from("/var/qbot"));
    }

    #[test]
    fn queue_settings_carry_config_values() {
        let mut cfg = Config::default_for_repo();
        cfg.queue.idle_sleep_seconds = 5;
        cfg.people.committers = vec!["c@example.com".to_string()];
        let settings = cfg.queue_settings();
        assert_eq!(settings.idle_backoff, std::time::Duration::from_secs(5));
        assert_eq!(settings.committers, vec!["c@example.com".to_string()]);
    }
}
