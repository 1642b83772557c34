use std::env;
use std::sync::{Mutex, OnceLock};

use herald_cli::commands::{doctor, migrate};
use serde_json::Value;

const VALID_ENV: &[(&str, &str)] = &[
    ("HERALD_SLACK_CLIENT_ID", "1234567890.0987654321"),
    ("HERALD_SLACK_CLIENT_SECRET", "client-secret-test"),
    ("HERALD_SLACK_SIGNING_SECRET", "signing-secret-test"),
    ("HERALD_SLACK_PUBLIC_HOST", "https://herald.test"),
    ("HERALD_DATABASE_URL", "sqlite::memory:"),
];

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(VALID_ENV, || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_without_credentials() {
    with_env(&[], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn doctor_reports_pass_with_valid_env() {
    with_env(VALID_ENV, || {
        let output = doctor::run(true);
        let payload: Value =
            serde_json::from_str(&output).expect("doctor --json output should be valid JSON");

        assert_eq!(payload["overall_status"], "pass");
        let checks = payload["checks"].as_array().expect("checks array");
        assert!(checks
            .iter()
            .any(|check| check["name"] == "install_store_readiness" && check["status"] == "pass"));
    });
}

#[test]
fn doctor_reports_failure_without_credentials() {
    with_env(&[], || {
        let output = doctor::run(true);
        let payload: Value =
            serde_json::from_str(&output).expect("doctor --json output should be valid JSON");

        assert_eq!(payload["overall_status"], "fail");
        let checks = payload["checks"].as_array().expect("checks array");
        assert!(checks
            .iter()
            .any(|check| check["name"] == "config_validation" && check["status"] == "fail"));
    });
}

#[test]
fn doctor_human_output_lists_each_check() {
    with_env(VALID_ENV, || {
        let output = doctor::run(false);

        assert!(output.contains("doctor: all readiness checks passed"));
        assert!(output.contains("config_validation"));
        assert!(output.contains("slack_credential_readiness"));
        assert!(output.contains("install_store_readiness"));
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "HERALD_DATABASE_URL",
        "HERALD_DATABASE_MAX_CONNECTIONS",
        "HERALD_DATABASE_TIMEOUT_SECS",
        "HERALD_SLACK_CLIENT_ID",
        "HERALD_SLACK_CLIENT_SECRET",
        "HERALD_SLACK_SIGNING_SECRET",
        "HERALD_SLACK_PUBLIC_HOST",
        "HERALD_SLACK_BOT_SCOPES",
        "HERALD_SLACK_USER_SCOPES",
        "HERALD_SERVER_BIND_ADDRESS",
        "HERALD_SERVER_PORT",
        "HERALD_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "HERALD_LOGGING_LEVEL",
        "HERALD_LOGGING_FORMAT",
        "HERALD_LOG_LEVEL",
        "HERALD_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
