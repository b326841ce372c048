use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use quorum_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key_path, value, env_keys) in effective_values(&config) {
        let source =
            field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(key_path, &value, source));
    }

    lines.join("\n")
}

/// (key path, rendered value, env variables that can set it) for every field.
fn effective_values(config: &AppConfig) -> [(&'static str, String, &'static [&'static str]); 8] {
    [
        ("database.url", config.database.url.clone(), &["QUORUM_DATABASE_URL"]),
        (
            "database.max_connections",
            config.database.max_connections.to_string(),
            &["QUORUM_DATABASE_MAX_CONNECTIONS"],
        ),
        (
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            &["QUORUM_DATABASE_TIMEOUT_SECS"],
        ),
        (
            "approvals.generic_approver_role",
            config.approvals.generic_approver_role.clone(),
            &["QUORUM_APPROVALS_GENERIC_APPROVER_ROLE"],
        ),
        (
            "approvals.approve_permission",
            config.approvals.approve_permission.clone(),
            &["QUORUM_APPROVALS_APPROVE_PERMISSION"],
        ),
        (
            "approvals.notify_approvers",
            config.approvals.notify_approvers.to_string(),
            &["QUORUM_APPROVALS_NOTIFY_APPROVERS"],
        ),
        (
            "logging.level",
            config.logging.level.clone(),
            &["QUORUM_LOGGING_LEVEL", "QUORUM_LOG_LEVEL"],
        ),
        (
            "logging.format",
            format!("{:?}", config.logging.format),
            &["QUORUM_LOGGING_FORMAT", "QUORUM_LOG_FORMAT"],
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    ["quorum.toml", "config/quorum.toml"].into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
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

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
