use std::env;
use std::sync::{Mutex, OnceLock};

use agendai_cli::commands::{config, doctor, migrate, start};
use serde_json::Value;

const VALID_ENV: &[(&str, &str)] = &[
    ("AGENDAI_CHANNEL_ACCESS_TOKEN", "EAAG-test"),
    ("AGENDAI_CHANNEL_VERIFY_TOKEN", "verify-me"),
    ("AGENDAI_CHANNEL_PHONE_NUMBER_ID", "5511000000"),
    ("AGENDAI_DATABASE_URL", "sqlite::memory:"),
];

#[test]
fn start_returns_success_with_valid_env() {
    with_env(VALID_ENV, || {
        let result = start::run();
        assert_eq!(result.exit_code, 0, "expected successful start preflight");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "start");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn start_returns_config_failure_without_tokens() {
    with_env(&[], || {
        let result = start::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "start");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

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
fn config_renders_redacted_effective_values() {
    with_env(VALID_ENV, || {
        let output = config::run();

        assert!(output.contains("effective config"));
        assert!(output.contains("channel.access_token = EAAG-***"));
        assert!(output.contains("source: env (AGENDAI_CHANNEL_ACCESS_TOKEN)"));
        assert!(output.contains("reminders.lead_minutes = 10 (source: default)"));
        assert!(!output.contains("EAAG-test"));
    });
}

#[test]
fn config_reports_validation_failure_without_tokens() {
    with_env(&[], || {
        let output = config::run();
        assert!(output.contains("config validation failed"));
    });
}

#[test]
fn doctor_json_reports_pass_with_valid_env() {
    with_env(VALID_ENV, || {
        let output = doctor::run(true);
        let payload = parse_payload(&output);

        assert_eq!(payload["overall_status"], "pass");
        let checks = payload["checks"].as_array().expect("checks array");
        assert!(checks.iter().any(|check| check["name"] == "config_validation"
            && check["status"] == "pass"));
        assert!(checks.iter().any(|check| check["name"] == "database_connectivity"
            && check["status"] == "pass"));
        assert!(checks.iter().any(|check| check["name"] == "webhook_signature"
            && check["status"] == "skipped"));
    });
}

#[test]
fn doctor_json_reports_failure_and_skips_downstream_checks() {
    with_env(&[], || {
        let output = doctor::run(true);
        let payload = parse_payload(&output);

        assert_eq!(payload["overall_status"], "fail");
        let checks = payload["checks"].as_array().expect("checks array");
        assert!(checks.iter().any(|check| check["name"] == "config_validation"
            && check["status"] == "fail"));
        assert!(checks.iter().any(|check| check["name"] == "database_connectivity"
            && check["status"] == "skipped"));
    });
}

#[test]
fn doctor_human_output_lists_each_check() {
    with_env(VALID_ENV, || {
        let output = doctor::run(false);

        assert!(output.starts_with("doctor: all readiness checks passed"));
        assert!(output.contains("- [ok] config_validation"));
        assert!(output.contains("- [ok] database_connectivity"));
        assert!(output.contains("- [skip] webhook_signature"));
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
        "AGENDAI_DATABASE_URL",
        "AGENDAI_DATABASE_MAX_CONNECTIONS",
        "AGENDAI_DATABASE_TIMEOUT_SECS",
        "AGENDAI_CHANNEL_ACCESS_TOKEN",
        "AGENDAI_CHANNEL_VERIFY_TOKEN",
        "AGENDAI_CHANNEL_PHONE_NUMBER_ID",
        "AGENDAI_CHANNEL_API_BASE",
        "AGENDAI_LLM_PROVIDER",
        "AGENDAI_LLM_API_KEY",
        "AGENDAI_LLM_BASE_URL",
        "AGENDAI_LLM_MODEL",
        "AGENDAI_LLM_TIMEOUT_SECS",
        "AGENDAI_CALENDAR_API_BASE",
        "AGENDAI_KNOWLEDGE_ENABLED",
        "AGENDAI_KNOWLEDGE_API_BASE",
        "AGENDAI_WEBHOOK_SECRET",
        "AGENDAI_RATE_LIMIT_ORIGIN_CEILING",
        "AGENDAI_RATE_LIMIT_SENDER_CEILING",
        "AGENDAI_RATE_LIMIT_WINDOW_SECS",
        "AGENDAI_REMINDER_LEAD_MINUTES",
        "AGENDAI_REMINDER_POLL_SECS",
        "AGENDAI_SERVER_BIND_ADDRESS",
        "AGENDAI_SERVER_PORT",
        "AGENDAI_SERVER_HEALTH_CHECK_PORT",
        "AGENDAI_LOGGING_LEVEL",
        "AGENDAI_LOGGING_FORMAT",
        "AGENDAI_LOG_LEVEL",
        "AGENDAI_LOG_FORMAT",
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
