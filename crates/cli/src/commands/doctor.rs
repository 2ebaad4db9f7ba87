use secrecy::ExposeSecret;
use serde::Serialize;

use agendai_core::config::{AppConfig, LoadOptions};
use agendai_db::connect_with_settings;

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

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_channel_tokens(&config));
            checks.push(check_signature_secret(&config));
            checks.push(check_database_connectivity(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["channel_token_readiness", "webhook_signature", "database_connectivity"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_usable =
        checks.iter().all(|check| check.status != CheckStatus::Fail);
    let overall_status = if all_usable { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_usable {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_channel_tokens(config: &AppConfig) -> DoctorCheck {
    let access_present = !config.channel.access_token.expose_secret().trim().is_empty();
    let verify_present = !config.channel.verify_token.expose_secret().trim().is_empty();

    if access_present && verify_present {
        DoctorCheck {
            name: "channel_token_readiness",
            status: CheckStatus::Pass,
            details: "access and verify tokens are present".to_string(),
        }
    } else {
        DoctorCheck {
            name: "channel_token_readiness",
            status: CheckStatus::Fail,
            details: "one or both channel tokens are empty".to_string(),
        }
    }
}

/// A missing webhook secret is legal but worth surfacing: the gate accepts
/// unsigned deliveries in that mode.
fn check_signature_secret(config: &AppConfig) -> DoctorCheck {
    match &config.security.webhook_secret {
        Some(secret) if !secret.expose_secret().trim().is_empty() => DoctorCheck {
            name: "webhook_signature",
            status: CheckStatus::Pass,
            details: "webhook secret configured; deliveries will be verified".to_string(),
        },
        _ => DoctorCheck {
            name: "webhook_signature",
            status: CheckStatus::Skipped,
            details: "no webhook secret configured; signature verification is disabled".to_string(),
        },
    }
}

fn check_database_connectivity(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| format!("failed to connect to database: {error}"))?;

        pool.close().await;
        Ok::<(), String>(())
    });

    match result {
        Ok(()) => DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Pass,
            details: format!("connected using `{}`", config.database.url),
        },
        Err(error) => {
            DoctorCheck { name: "database_connectivity", status: CheckStatus::Fail, details: error }
        }
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

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

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
