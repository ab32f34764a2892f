use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn seowiz_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_seowiz"))
}

fn run_seowiz(args: &[&str]) -> Output {
    Command::new(seowiz_binary())
        .args(args)
        .env_remove("SEOWIZ_SITE_ID")
        .output()
        .expect("Failed to execute seowiz command")
}

fn run_seowiz_with_env(args: &[&str], env_vars: Vec<(&str, &str)>) -> Output {
    let mut cmd = Command::new(seowiz_binary());
    cmd.args(args).env_remove("SEOWIZ_SITE_ID");
    for (key, value) in env_vars {
        cmd.env(key, value);
    }
    cmd.output().expect("Failed to execute seowiz command")
}

/// Run against an isolated snapshot directory and an API nobody listens on.
fn run_isolated(args: &[&str], snapshots: &Path) -> Output {
    let dir = snapshots.to_string_lossy().to_string();
    run_seowiz_with_env(
        args,
        vec![
            ("SEOWIZ_STORAGE__SNAPSHOT_DIR", dir.as_str()),
            ("SEOWIZ_API_URL", "http://127.0.0.1:9"),
            ("SEOWIZ_LOG_LEVEL", "error"),
            ("NO_COLOR", "1"),
        ],
    )
}

fn output_to_string(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr_to_string(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

mod version_command_tests {
    use super::*;

    #[test]
    fn test_version_command_basic() {
        let output = run_seowiz(&["version"]);
        let stdout = output_to_string(&output);

        assert!(output.status.success(), "version command should succeed");
        assert!(stdout.contains("seowiz"), "output should contain 'seowiz'");
        assert!(stdout.contains("0.1.0"), "output should contain version number");
    }

    #[test]
    fn test_version_command_detailed() {
        let output = run_seowiz(&["version", "--detailed"]);
        let stdout = output_to_string(&output);

        assert!(output.status.success(), "version --detailed should succeed");
        assert!(stdout.contains("Version"));
        assert!(stdout.contains("Apache-2.0"));
        assert!(stdout.contains("Parallel Analysis"), "should list phases");
    }
}

mod help_command_tests {
    use super::*;

    #[test]
    fn test_help_lists_commands() {
        let output = run_seowiz(&["--help"]);
        let stdout = output_to_string(&output);

        assert!(output.status.success(), "--help should succeed");
        for command in ["run", "retry", "restart", "skip", "status", "steps", "config"] {
            assert!(stdout.contains(command), "help should mention {}", command);
        }
    }

    #[test]
    fn test_run_requires_site() {
        let output = run_seowiz(&["run"]);
        assert!(!output.status.success());
        assert!(stderr_to_string(&output).contains("--site"));
    }
}

mod invalid_command_tests {
    use super::*;

    #[test]
    fn test_invalid_command() {
        let output = run_seowiz(&["nonexistent-command"]);
        assert!(!output.status.success(), "invalid command should fail");
    }
}

mod steps_command_tests {
    use super::*;

    #[test]
    fn test_steps_lists_catalog() {
        let output = run_seowiz(&["steps"]);
        let stdout = output_to_string(&output);

        assert!(output.status.success());
        assert!(stdout.contains("business-profile"));
        assert!(stdout.contains("crawl-sitemap"));
        assert!(stdout.contains("generate-report"));
    }

    #[test]
    fn test_steps_json_filtered_by_phase() {
        let output = run_seowiz(&["steps", "--phase", "analysis", "--format", "json"]);
        assert!(output.status.success());

        let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        let rows = rows.as_array().unwrap();
        assert_eq!(rows.len(), 16);
        assert!(rows.iter().all(|r| r["parallel"] == true));
        assert_eq!(rows[0]["index"], 7);
    }

    #[test]
    fn test_steps_unknown_phase_fails() {
        let output = run_seowiz(&["steps", "--phase", "marketing"]);
        assert!(!output.status.success());
        assert!(stderr_to_string(&output).contains("unknown phase"));
    }
}

mod config_command_tests {
    use super::*;

    #[test]
    fn test_config_json_reflects_env() {
        let dir = tempfile::tempdir().unwrap();
        let output = run_seowiz_with_env(
            &["config", "--format", "json"],
            vec![
                ("SEOWIZ_API_URL", "https://seo.example.com"),
                ("SEOWIZ_API_KEY", "sk-test-abcdef123456"),
                (
                    "SEOWIZ_STORAGE__SNAPSHOT_DIR",
                    dir.path().to_str().unwrap(),
                ),
            ],
        );
        assert!(output.status.success(), "{}", stderr_to_string(&output));

        let config: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(config["api"]["base_url"], "https://seo.example.com");
        assert_eq!(config["api"]["api_key"], "sk-t****3456");
        assert_eq!(config["progress"]["parallel_start"], 40);
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        let output = run_seowiz_with_env(&["config"], vec![("SEOWIZ_API_URL", "ftp://nope")]);
        assert!(!output.status.success());
        assert!(stderr_to_string(&output).contains("E1002"));
    }
}

mod run_lifecycle_tests {
    use super::*;

    #[test]
    fn test_status_without_runs() {
        let dir = tempfile::tempdir().unwrap();
        let output = run_isolated(&["status"], dir.path());

        assert!(output.status.success());
        assert!(output_to_string(&output).contains("No saved runs"));
    }

    #[test]
    fn test_status_unknown_site_fails() {
        let dir = tempfile::tempdir().unwrap();
        let output = run_isolated(&["status", "--site", "ghost"], dir.path());

        assert!(!output.status.success());
        assert!(stderr_to_string(&output).contains("E4005"));
    }

    #[test]
    fn test_unreachable_api_halts_and_saves_snapshot() {
        let dir = tempfile::tempdir().unwrap();

        let output = run_isolated(&["run", "--site", "acme"], dir.path());
        assert!(!output.status.success(), "run should fail without an API");
        let stdout = output_to_string(&output);
        assert!(stdout.contains("Setup halted"));
        assert!(stdout.contains("seowiz retry --site acme"));

        let status = run_isolated(&["status", "--site", "acme", "--format", "json"], dir.path());
        assert!(status.status.success());
        let state: serde_json::Value = serde_json::from_slice(&status.stdout).unwrap();
        assert_eq!(state["site_id"], "acme");
        assert_eq!(state["is_running"], false);
        assert_eq!(state["failed_step"]["id"], "business-profile");
        assert_eq!(state["failed_step"]["step_index"], 0);
        assert_eq!(state["progress"], 0);
    }

    #[test]
    fn test_retry_without_snapshot_fails() {
        let dir = tempfile::tempdir().unwrap();
        let output = run_isolated(&["retry", "--site", "nobody"], dir.path());
        assert!(!output.status.success());
    }

    #[test]
    fn test_json_run_streams_events() {
        let dir = tempfile::tempdir().unwrap();
        let output = run_isolated(&["run", "--site", "acme", "--format", "json"], dir.path());
        assert!(!output.status.success());

        let events: Vec<serde_json::Value> = output_to_string(&output)
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect();
        assert!(events.iter().any(|e| e["type"] == "phase_started"));
        assert!(events
            .iter()
            .any(|e| e["type"] == "run_finished" && e["completed"] == false));
    }
}
