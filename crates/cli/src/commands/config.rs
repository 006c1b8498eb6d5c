use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use coachline_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

struct Field {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    render(&config, detect_config_path().as_deref())
}

pub fn render(config: &AppConfig, config_file_path: Option<&Path>) -> String {
    let config_file_doc = load_config_file_doc(config_file_path);

    let mut lines = vec![
        "effective config (source precedence: override > env > file > default):".to_string()
    ];
    for field in fields(config) {
        let source =
            field_source(field.key, field.env_keys, config_file_doc.as_ref(), config_file_path);
        lines.push(format!("- {} = {} (source: {source})", field.key, field.value));
    }

    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    vec![
        Field {
            key: "database.url",
            value: config.database.url.clone(),
            env_keys: &["COACHLINE_DATABASE_URL"],
        },
        Field {
            key: "database.max_connections",
            value: config.database.max_connections.to_string(),
            env_keys: &["COACHLINE_DATABASE_MAX_CONNECTIONS"],
        },
        Field {
            key: "database.timeout_secs",
            value: config.database.timeout_secs.to_string(),
            env_keys: &["COACHLINE_DATABASE_TIMEOUT_SECS"],
        },
        Field {
            key: "llm.provider",
            value: format!("{:?}", config.llm.provider),
            env_keys: &["COACHLINE_LLM_PROVIDER"],
        },
        Field {
            key: "llm.model",
            value: config.llm.model.clone(),
            env_keys: &["COACHLINE_LLM_MODEL", "OPENAI_MODEL"],
        },
        Field {
            key: "llm.base_url",
            value: config.llm.effective_base_url().to_string(),
            env_keys: &["COACHLINE_LLM_BASE_URL"],
        },
        Field {
            key: "llm.api_key",
            value: redact_secret(config.llm.api_key.as_ref().map(|key| key.expose_secret())),
            env_keys: &["COACHLINE_LLM_API_KEY", "OPENAI_API_KEY"],
        },
        Field {
            key: "llm.temperature",
            value: config.llm.temperature.to_string(),
            env_keys: &["COACHLINE_LLM_TEMPERATURE"],
        },
        Field {
            key: "llm.timeout_secs",
            value: config.llm.timeout_secs.to_string(),
            env_keys: &["COACHLINE_LLM_TIMEOUT_SECS"],
        },
        Field {
            key: "review.discipline",
            value: format!("{:?}", config.review.discipline),
            env_keys: &["COACHLINE_REVIEW_DISCIPLINE"],
        },
        Field {
            key: "telemetry.enabled",
            value: config.telemetry.enabled.to_string(),
            env_keys: &["COACHLINE_TELEMETRY_ENABLED"],
        },
        Field {
            key: "telemetry.environment",
            value: config.telemetry.environment.clone(),
            env_keys: &["COACHLINE_TELEMETRY_ENVIRONMENT"],
        },
        Field {
            key: "telemetry.verbose",
            value: config.telemetry.verbose.to_string(),
            env_keys: &["COACHLINE_TELEMETRY_VERBOSE", "COACHLINE_VERBOSE_LOGGING"],
        },
        Field {
            key: "telemetry.redact_pii",
            value: config.telemetry.redact_pii.to_string(),
            env_keys: &["COACHLINE_TELEMETRY_REDACT_PII", "COACHLINE_REDACT_PII"],
        },
        Field {
            key: "profile.path",
            value: config
                .profile
                .path
                .as_ref()
                .map_or_else(|| "<builtin>".to_string(), |path| path.display().to_string()),
            env_keys: &["COACHLINE_PROFILE_PATH"],
        },
        Field {
            key: "server.bind_address",
            value: config.server.bind_address.clone(),
            env_keys: &["COACHLINE_SERVER_BIND_ADDRESS"],
        },
        Field {
            key: "server.port",
            value: config.server.port.to_string(),
            env_keys: &["COACHLINE_SERVER_PORT"],
        },
        Field {
            key: "server.graceful_shutdown_secs",
            value: config.server.graceful_shutdown_secs.to_string(),
            env_keys: &["COACHLINE_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        },
        Field {
            key: "logging.level",
            value: config.logging.level.clone(),
            env_keys: &["COACHLINE_LOGGING_LEVEL", "COACHLINE_LOG_LEVEL"],
        },
        Field {
            key: "logging.format",
            value: format!("{:?}", config.logging.format),
            env_keys: &["COACHLINE_LOGGING_FORMAT", "COACHLINE_LOG_FORMAT"],
        },
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("coachline.toml"), PathBuf::from("config/coachline.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    let from_env = env_keys
        .iter()
        .find(|key| env::var(key).map(|value| !value.trim().is_empty()).unwrap_or(false));
    if let Some(env_key) = from_env {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

/// Keeps a short prefix (`sk-`) so operators can tell which key family is loaded.
fn redact_secret(secret: Option<&str>) -> String {
    let Some(secret) = secret.map(str::trim) else {
        return "<unset>".to_string();
    };
    if secret.is_empty() {
        return "<empty>".to_string();
    }
    if let Some((prefix, _)) = secret.split_once('-') {
        return format!("{prefix}-***");
    }
    "<redacted>".to_string()
}
