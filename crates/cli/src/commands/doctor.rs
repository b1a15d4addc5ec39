use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use switchboard_agent::{load_system_prompt, CompletionClient, OpenAiChatClient};
use switchboard_core::config::{AppConfig, LoadOptions};
use switchboard_functions::build_registry;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
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
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str, reason: &str) -> Self {
        Self { name, status: CheckStatus::Skipped, details: format!("skipped because {reason}") }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(options: LoadOptions, json_output: bool) -> String {
    let report = build_report(options);

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
            )
        });
    }

    render_human(&report)
}

fn build_report(options: LoadOptions) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(options) {
        Ok(config) => {
            checks.push(DoctorCheck::pass("config_validation", "configuration loaded and validated"));
            check_runtime(&config, &mut checks);
        }
        Err(error) => {
            checks.push(DoctorCheck::fail("config_validation", error.to_string()));
            for name in ["completion_client", "function_registry", "system_prompt"] {
                checks.push(DoctorCheck::skipped(name, "configuration did not load"));
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_runtime(config: &AppConfig, checks: &mut Vec<DoctorCheck>) {
    let client: Arc<dyn CompletionClient> =
        match OpenAiChatClient::from_config(&config.llm, config.sampling) {
            Ok(client) => {
                checks.push(DoctorCheck::pass(
                    "completion_client",
                    format!("{} via {}", config.llm.provider.as_str(), client.endpoint()),
                ));
                Arc::new(client)
            }
            Err(error) => {
                checks.push(DoctorCheck::fail("completion_client", error.to_string()));
                checks.push(DoctorCheck::skipped("function_registry", "no completion client"));
                checks.push(system_prompt_check(config));
                return;
            }
        };

    checks.push(match build_registry(config, client) {
        Ok(registry) if registry.is_empty() => {
            DoctorCheck::pass("function_registry", "no back-ends configured; chat runs without functions")
        }
        Ok(registry) => DoctorCheck::pass(
            "function_registry",
            format!("{} functions: {}", registry.len(), registry.names().collect::<Vec<_>>().join(", ")),
        ),
        Err(error) => DoctorCheck::fail("function_registry", error.to_string()),
    });
    checks.push(system_prompt_check(config));
}

fn system_prompt_check(config: &AppConfig) -> DoctorCheck {
    match load_system_prompt(config.session.system_prompt_path.as_deref(), Utc::now()) {
        Ok(prompt) => DoctorCheck::pass("system_prompt", format!("{} characters", prompt.chars().count())),
        Err(error) => DoctorCheck::fail("system_prompt", error.to_string()),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}
