use serde::Serialize;
use warden_core::config::{AppConfig, LlmProvider, LoadOptions};
use warden_core::validation::Simulator;
use warden_db::{connect, migrations};

use crate::commands::{current_thread_runtime, CommandResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Warn,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn new(name: &'static str, status: CheckStatus, details: impl Into<String>) -> Self {
        Self { name, status, details: details.into() }
    }

    fn skipped(name: &'static str) -> Self {
        Self::new(name, CheckStatus::Skipped, "skipped because configuration did not load")
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Fail { 1 } else { 0 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::new(
                "config_validation",
                CheckStatus::Pass,
                format!("configuration loaded; pipeline mode `{}`", config.pipeline.mode.as_str()),
            ));
            checks.push(check_llm_credentials(&config));
            checks.push(check_pattern_tables());
            checks.push(check_audit_store(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::new("config_validation", CheckStatus::Fail, error.to_string()));
            checks.push(DoctorCheck::skipped("llm_credentials"));
            checks.push(check_pattern_tables());
            checks.push(DoctorCheck::skipped("audit_store"));
        }
    }

    let failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let warned = checks.iter().any(|check| check.status == CheckStatus::Warn);
    let (overall_status, summary) = if failed {
        (CheckStatus::Fail, "doctor: one or more readiness checks failed")
    } else if warned {
        (CheckStatus::Warn, "doctor: ready with warnings")
    } else {
        (CheckStatus::Pass, "doctor: all readiness checks passed")
    };

    DoctorReport { overall_status, summary: summary.to_string(), checks }
}

/// A missing key only disables the model fallback; deterministic rules
/// keep working, so this never fails the report.
fn check_llm_credentials(config: &AppConfig) -> DoctorCheck {
    let provider = config.llm.provider.as_str();
    if config.has_llm_api_key() {
        return DoctorCheck::new(
            "llm_credentials",
            CheckStatus::Pass,
            format!("{provider} key present for model `{}`", config.llm.model),
        );
    }

    if config.llm.provider == LlmProvider::Ollama {
        return match &config.llm.base_url {
            Some(base_url) => DoctorCheck::new(
                "llm_credentials",
                CheckStatus::Pass,
                format!("ollama needs no key; using `{base_url}`"),
            ),
            None => DoctorCheck::new(
                "llm_credentials",
                CheckStatus::Warn,
                "ollama selected without llm.base_url; model fallback disabled",
            ),
        };
    }

    DoctorCheck::new(
        "llm_credentials",
        CheckStatus::Warn,
        format!("no {provider} api key; only rule-matched requests will resolve"),
    )
}

fn check_pattern_tables() -> DoctorCheck {
    match Simulator::new() {
        Ok(_) => DoctorCheck::new(
            "pattern_tables",
            CheckStatus::Pass,
            "dangerous-pattern table compiled",
        ),
        Err(error) => DoctorCheck::new("pattern_tables", CheckStatus::Fail, error.to_string()),
    }
}

fn check_audit_store(config: &AppConfig) -> DoctorCheck {
    let runtime = match current_thread_runtime("doctor") {
        Ok(runtime) => runtime,
        Err(failure) => {
            return DoctorCheck::new("audit_store", CheckStatus::Fail, failure.output);
        }
    };

    let result = runtime.block_on(async {
        let pool = connect(&config.database)
            .await
            .map_err(|error| format!("failed to connect to database: {error}"))?;
        let outcome = migrations::run_pending(&pool)
            .await
            .map_err(|error| format!("database reachable but migrations failed: {error}"));
        pool.close().await;
        outcome
    });

    match result {
        Ok(()) => DoctorCheck::new(
            "audit_store",
            CheckStatus::Pass,
            format!("connected and migrated using `{}`", config.database.url),
        ),
        Err(error) => DoctorCheck::new("audit_store", CheckStatus::Fail, error),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Warn => "warn",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
