use coachline_core::config::{AppConfig, LlmProvider, LoadOptions};
use coachline_core::prompt::CoachingProfile;
use coachline_db::{connect_with_config, BlobStore, SqlBlobStore};
use secrecy::ExposeSecret;
use serde::Serialize;

use crate::commands::{block_on_runtime, escape_json};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
pub struct DoctorCheck {
    pub name: &'static str,
    pub status: CheckStatus,
    pub details: String,
}

#[derive(Debug, Serialize)]
pub struct DoctorReport {
    pub overall_status: CheckStatus,
    pub summary: String,
    pub checks: Vec<DoctorCheck>,
}

const DEPENDENT_CHECKS: [&str; 3] = ["coaching_profile", "backend_settings", "blob_store"];

pub fn run(json_output: bool) -> String {
    let report =
        build_report(AppConfig::load(LoadOptions::default()).map_err(|error| error.to_string()));

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

pub fn build_report(config: Result<AppConfig, String>) -> DoctorReport {
    let mut checks = Vec::new();

    match config {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_profile(&config));
            checks.push(check_backend_settings(&config));
            checks.push(check_blob_store(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error,
            });
            checks.extend(DEPENDENT_CHECKS.into_iter().map(|name| DoctorCheck {
                name,
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            }));
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

fn check_profile(config: &AppConfig) -> DoctorCheck {
    let Some(path) = &config.profile.path else {
        return DoctorCheck {
            name: "coaching_profile",
            status: CheckStatus::Pass,
            details: "using built-in coaching profile".to_string(),
        };
    };

    match CoachingProfile::load(path) {
        Ok(profile) => DoctorCheck {
            name: "coaching_profile",
            status: CheckStatus::Pass,
            details: format!(
                "loaded `{}` with {} exemplar turn(s)",
                path.display(),
                profile.exemplars().len()
            ),
        },
        Err(error) => DoctorCheck {
            name: "coaching_profile",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn check_backend_settings(config: &AppConfig) -> DoctorCheck {
    let has_key = config
        .llm
        .api_key
        .as_ref()
        .is_some_and(|key| !key.expose_secret().trim().is_empty());
    let auth = match (config.llm.provider, has_key) {
        (_, true) => "bearer key configured",
        (LlmProvider::Ollama, false) => "no key (local provider)",
        (LlmProvider::OpenAi, false) => "no key",
    };

    DoctorCheck {
        name: "backend_settings",
        status: CheckStatus::Pass,
        details: format!(
            "{:?} model `{}` at {} ({auth}, temperature {})",
            config.llm.provider,
            config.llm.model,
            config.llm.effective_base_url(),
            config.llm.temperature
        ),
    }
}

fn check_blob_store(config: &AppConfig) -> DoctorCheck {
    let runtime = match block_on_runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "blob_store",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| format!("failed to connect to database: {error}"))?;
        let ping = SqlBlobStore::new(pool.clone()).ping().await;
        pool.close().await;
        ping.map_err(|error| {
            format!("telemetry_blob table is not usable ({error}); run `coachline migrate`")
        })
    });

    match result {
        Ok(()) => DoctorCheck {
            name: "blob_store",
            status: CheckStatus::Pass,
            details: format!("telemetry_blob reachable using `{}`", config.database.url),
        },
        Err(error) => DoctorCheck { name: "blob_store", status: CheckStatus::Fail, details: error },
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
