use std::env;
use std::sync::{Mutex, OnceLock};

use serde_json::Value;
use warden_cli::commands::{config, doctor, migrate, plan, validate, whois};

#[test]
fn migrate_returns_success_with_in_memory_database() {
    with_env(&[("WARDEN_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_reports_config_failure_for_unknown_mode() {
    with_env(&[("WARDEN_PIPELINE_MODE", "sometimes")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn validate_accepts_a_plain_give() {
    let result = validate::run("give Steve dirt 64", false);
    assert_eq!(result.exit_code, 0);

    let payload = parse_payload(&result.output);
    assert_eq!(payload["command"], "validate");
    assert_eq!(payload["data"]["ok"], true);
}

#[test]
fn validate_rejects_operator_grants() {
    let result = validate::run("/op Steve", false);
    assert_eq!(result.exit_code, 1);

    let payload = parse_payload(&result.output);
    assert_eq!(payload["error_class"], "rejected");
    assert_eq!(payload["message"], "dangerous pattern: operator status change");
}

#[test]
fn simulate_flags_unknown_commands_that_validation_allows() {
    assert_eq!(validate::run("fly Steve", false).exit_code, 0);

    let result = validate::run("fly Steve", true);
    assert_eq!(result.exit_code, 1);
    let payload = parse_payload(&result.output);
    assert_eq!(payload["message"], "unknown command `fly`");
}

#[test]
fn whois_reports_configured_owner_and_default_player() {
    with_env(&[("WARDEN_PERMISSIONS_OWNERS", "Steve")], || {
        let owner = parse_payload(&whois::run("Steve").output);
        assert_eq!(owner["data"]["role"], "owner");
        assert_eq!(owner["data"]["capabilities"], serde_json::json!(["*"]));

        let stranger = parse_payload(&whois::run("Herobrine").output);
        assert_eq!(stranger["data"]["role"], "player");
        assert_eq!(stranger["data"]["capabilities"], serde_json::json!([]));
        assert_eq!(stranger["data"]["min_confidence"], 1.0);
    });
}

#[test]
fn whois_rejects_blank_actor() {
    let result = whois::run("  ");
    assert_eq!(result.exit_code, 2);
    assert_eq!(parse_payload(&result.output)["error_class"], "invalid_input");
}

#[test]
fn plan_simulates_rule_matched_request_without_dispatch() {
    with_env(&[("WARDEN_PERMISSIONS_OWNERS", "Steve")], || {
        let result = plan::run("Steve", "give me 64 dirt");
        assert_eq!(result.exit_code, 0, "unexpected output: {}", result.output);

        let payload = parse_payload(&result.output);
        let report = &payload["data"];
        assert_eq!(report["mode"], "dry_run");
        assert_eq!(report["role"], "owner");
        assert_eq!(report["intents"][0]["outcome"], "simulated");
        assert_eq!(report["intents"][0]["commands"][0]["command"], "give Steve dirt 64");
        assert_eq!(report["intents"][0]["commands"][0]["status"], "simulated");
    });
}

#[test]
fn plan_reports_ignored_prefix_as_skipped() {
    with_env(&[], || {
        let payload = parse_payload(&plan::run("Steve", "/home").output);
        assert_eq!(payload["status"], "ok");
        assert!(payload["data"]["skipped"].is_string());
        assert_eq!(payload["data"]["intents"], serde_json::json!([]));
    });
}

#[test]
fn doctor_warns_but_passes_without_model_key() {
    with_env(&[("WARDEN_DATABASE_URL", "sqlite::memory:")], || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 0, "unexpected output: {}", result.output);

        let report = parse_payload(&result.output);
        assert_eq!(report["overall_status"], "warn");
        let statuses: Vec<(&str, &str)> = report["checks"]
            .as_array()
            .expect("checks array")
            .iter()
            .map(|check| {
                (
                    check["name"].as_str().unwrap_or_default(),
                    check["status"].as_str().unwrap_or_default(),
                )
            })
            .collect();
        assert_eq!(
            statuses,
            vec![
                ("config_validation", "pass"),
                ("llm_credentials", "warn"),
                ("pattern_tables", "pass"),
                ("audit_store", "pass"),
            ]
        );
    });
}

#[test]
fn doctor_fails_when_config_is_invalid() {
    with_env(&[("WARDEN_AUDIT_RETENTION", "0")], || {
        let result = doctor::run(false);
        assert_eq!(result.exit_code, 1);
        assert!(result.output.starts_with("doctor: one or more readiness checks failed"));
        assert!(result.output.contains("- [skip] audit_store"));
    });
}

#[test]
fn config_attributes_env_sources_and_redacts_key() {
    with_env(
        &[("WARDEN_PIPELINE_MODE", "dry-run"), ("WARDEN_LLM_API_KEY", "gsk_supersecretvalue")],
        || {
            let output = config::run();
            assert!(output.contains("- pipeline.mode = dry_run (source: env (WARDEN_PIPELINE_MODE))"));
            assert!(output.contains("- llm.api_key = gsk_*** (source: env (WARDEN_LLM_API_KEY))"));
            assert!(output.contains("- audit.retention = 1000 (source: default)"));
            assert!(!output.contains("supersecretvalue"));
        },
    );
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard = match ENV_LOCK.get_or_init(|| Mutex::new(())).lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };

    let keys = [
        "WARDEN_DATABASE_URL",
        "WARDEN_DATABASE_MAX_CONNECTIONS",
        "WARDEN_DATABASE_TIMEOUT_SECS",
        "WARDEN_LLM_PROVIDER",
        "WARDEN_LLM_API_KEY",
        "GROQ_API_KEY",
        "WARDEN_LLM_BASE_URL",
        "WARDEN_LLM_MODEL",
        "WARDEN_PIPELINE_MODE",
        "WARDEN_PIPELINE_IGNORE_PREFIXES",
        "WARDEN_AUDIT_RETENTION",
        "WARDEN_EXECUTOR_KIND",
        "WARDEN_EXECUTOR_PATH",
        "WARDEN_PERMISSIONS_OWNERS",
        "WARDEN_PERMISSIONS_ADMINS",
        "WARDEN_LOGGING_LEVEL",
        "WARDEN_LOG_LEVEL",
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
