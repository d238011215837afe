use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use marketrank_core::config::{AnonymousInteractionPolicy, AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in effective_values(&config) {
        let source = field_source(
            field.key_path,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key_path, &field.value, source));
    }

    lines.join("\n")
}

struct ConfigField {
    key_path: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

fn field(key_path: &'static str, value: String, env_keys: &'static [&'static str]) -> ConfigField {
    ConfigField { key_path, value, env_keys }
}

fn effective_values(config: &AppConfig) -> Vec<ConfigField> {
    let recommendations = &config.recommendations;
    let anonymous = match recommendations.anonymous_interactions {
        AnonymousInteractionPolicy::Record => "record",
        AnonymousInteractionPolicy::Drop => "drop",
    };

    vec![
        field("database.url", config.database.url.clone(), &["MARKETRANK_DATABASE_URL"]),
        field(
            "database.max_connections",
            config.database.max_connections.to_string(),
            &["MARKETRANK_DATABASE_MAX_CONNECTIONS"],
        ),
        field(
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            &["MARKETRANK_DATABASE_TIMEOUT_SECS"],
        ),
        field(
            "server.bind_address",
            config.server.bind_address.clone(),
            &["MARKETRANK_SERVER_BIND_ADDRESS"],
        ),
        field("server.port", config.server.port.to_string(), &["MARKETRANK_SERVER_PORT"]),
        field(
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            &["MARKETRANK_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        ),
        field(
            "recommendations.default_limit",
            recommendations.default_limit.to_string(),
            &["MARKETRANK_RECOMMENDATIONS_DEFAULT_LIMIT"],
        ),
        field(
            "recommendations.max_limit",
            recommendations.max_limit.to_string(),
            &["MARKETRANK_RECOMMENDATIONS_MAX_LIMIT"],
        ),
        field(
            "recommendations.collaborative_weight",
            recommendations.collaborative_weight.to_string(),
            &["MARKETRANK_RECOMMENDATIONS_COLLABORATIVE_WEIGHT"],
        ),
        field(
            "recommendations.content_weight",
            recommendations.content_weight.to_string(),
            &["MARKETRANK_RECOMMENDATIONS_CONTENT_WEIGHT"],
        ),
        field(
            "recommendations.trending_weight",
            recommendations.trending_weight.to_string(),
            &["MARKETRANK_RECOMMENDATIONS_TRENDING_WEIGHT"],
        ),
        field(
            "recommendations.anonymous_interactions",
            anonymous.to_string(),
            &["MARKETRANK_RECOMMENDATIONS_ANONYMOUS_INTERACTIONS"],
        ),
        field(
            "logging.level",
            config.logging.level.clone(),
            &["MARKETRANK_LOGGING_LEVEL", "MARKETRANK_LOG_LEVEL"],
        ),
        field(
            "logging.format",
            format!("{:?}", config.logging.format).to_ascii_lowercase(),
            &["MARKETRANK_LOGGING_FORMAT", "MARKETRANK_LOG_FORMAT"],
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    ["marketrank.toml", "config/marketrank.toml"]
        .into_iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
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
