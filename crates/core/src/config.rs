use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub recommendations: RecommendationConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct RecommendationConfig {
    pub default_limit: usize,
    pub max_limit: usize,
    pub collaborative_weight: f64,
    pub content_weight: f64,
    pub trending_weight: f64,
    pub anonymous_interactions: AnonymousInteractionPolicy,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

/// What the recording endpoint does with events from callers without an actor id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnonymousInteractionPolicy {
    Record,
    Drop,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub database_max_connections: Option<u32>,
    pub log_level: Option<String>,
    pub server_port: Option<u16>,
    pub default_limit: Option<usize>,
    pub anonymous_interactions: Option<AnonymousInteractionPolicy>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://marketrank.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            recommendations: RecommendationConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            default_limit: crate::recommendations::DEFAULT_LIMIT,
            max_limit: crate::recommendations::MAX_LIMIT,
            collaborative_weight: crate::recommendations::DEFAULT_FUSION_WEIGHTS.collaborative,
            content_weight: crate::recommendations::DEFAULT_FUSION_WEIGHTS.content,
            trending_weight: crate::recommendations::DEFAULT_FUSION_WEIGHTS.trending,
            anonymous_interactions: AnonymousInteractionPolicy::Record,
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl std::str::FromStr for AnonymousInteractionPolicy {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "record" => Ok(Self::Record),
            "drop" => Ok(Self::Drop),
            other => Err(ConfigError::Validation(format!(
                "unsupported anonymous interaction policy `{other}` (expected record|drop)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from("marketrank.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(recommendations) = patch.recommendations {
            if let Some(default_limit) = recommendations.default_limit {
                self.recommendations.default_limit = default_limit;
            }
            if let Some(max_limit) = recommendations.max_limit {
                self.recommendations.max_limit = max_limit;
            }
            if let Some(weight) = recommendations.collaborative_weight {
                self.recommendations.collaborative_weight = weight;
            }
            if let Some(weight) = recommendations.content_weight {
                self.recommendations.content_weight = weight;
            }
            if let Some(weight) = recommendations.trending_weight {
                self.recommendations.trending_weight = weight;
            }
            if let Some(policy) = recommendations.anonymous_interactions {
                self.recommendations.anonymous_interactions = policy;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("MARKETRANK_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("MARKETRANK_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_env("MARKETRANK_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("MARKETRANK_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_env("MARKETRANK_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("MARKETRANK_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("MARKETRANK_SERVER_PORT") {
            self.server.port = parse_env("MARKETRANK_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("MARKETRANK_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_env("MARKETRANK_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("MARKETRANK_RECOMMENDATIONS_DEFAULT_LIMIT") {
            self.recommendations.default_limit =
                parse_env("MARKETRANK_RECOMMENDATIONS_DEFAULT_LIMIT", &value)?;
        }
        if let Some(value) = read_env("MARKETRANK_RECOMMENDATIONS_MAX_LIMIT") {
            self.recommendations.max_limit =
                parse_env("MARKETRANK_RECOMMENDATIONS_MAX_LIMIT", &value)?;
        }
        if let Some(value) = read_env("MARKETRANK_RECOMMENDATIONS_COLLABORATIVE_WEIGHT") {
            self.recommendations.collaborative_weight =
                parse_env("MARKETRANK_RECOMMENDATIONS_COLLABORATIVE_WEIGHT", &value)?;
        }
        if let Some(value) = read_env("MARKETRANK_RECOMMENDATIONS_CONTENT_WEIGHT") {
            self.recommendations.content_weight =
                parse_env("MARKETRANK_RECOMMENDATIONS_CONTENT_WEIGHT", &value)?;
        }
        if let Some(value) = read_env("MARKETRANK_RECOMMENDATIONS_TRENDING_WEIGHT") {
            self.recommendations.trending_weight =
                parse_env("MARKETRANK_RECOMMENDATIONS_TRENDING_WEIGHT", &value)?;
        }
        if let Some(value) = read_env("MARKETRANK_RECOMMENDATIONS_ANONYMOUS_INTERACTIONS") {
            self.recommendations.anonymous_interactions = value.parse()?;
        }

        let log_level =
            read_env("MARKETRANK_LOGGING_LEVEL").or_else(|| read_env("MARKETRANK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("MARKETRANK_LOGGING_FORMAT").or_else(|| read_env("MARKETRANK_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(max_connections) = overrides.database_max_connections {
            self.database.max_connections = max_connections;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(default_limit) = overrides.default_limit {
            self.recommendations.default_limit = default_limit;
        }
        if let Some(policy) = overrides.anonymous_interactions {
            self.recommendations.anonymous_interactions = policy;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_recommendations(&self.recommendations)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("marketrank.toml"), PathBuf::from("config/marketrank.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_recommendations(recommendations: &RecommendationConfig) -> Result<(), ConfigError> {
    if recommendations.max_limit == 0 || recommendations.max_limit > 1000 {
        return Err(ConfigError::Validation(
            "recommendations.max_limit must be in range 1..=1000".to_string(),
        ));
    }

    if recommendations.default_limit == 0
        || recommendations.default_limit > recommendations.max_limit
    {
        return Err(ConfigError::Validation(
            "recommendations.default_limit must be in range 1..=recommendations.max_limit"
                .to_string(),
        ));
    }

    let weights = [
        ("collaborative_weight", recommendations.collaborative_weight),
        ("content_weight", recommendations.content_weight),
        ("trending_weight", recommendations.trending_weight),
    ];
    for (name, weight) in weights {
        if !weight.is_finite() || weight < 0.0 {
            return Err(ConfigError::Validation(format!(
                "recommendations.{name} must be a finite, non-negative number"
            )));
        }
    }
    if weights.iter().all(|(_, weight)| *weight == 0.0) {
        return Err(ConfigError::Validation(
            "at least one recommendations fusion weight must be positive".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    recommendations: Option<RecommendationsPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RecommendationsPatch {
    default_limit: Option<usize>,
    max_limit: Option<usize>,
    collaborative_weight: Option<f64>,
    content_weight: Option<f64>,
    trending_weight: Option<f64>,
    anonymous_interactions: Option<AnonymousInteractionPolicy>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use tempfile::TempDir;

    use super::{
        AnonymousInteractionPolicy, AppConfig, ConfigError, ConfigOverrides, LoadOptions,
        LogFormat,
    };

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_are_valid_and_match_fusion_weights() -> Result<(), String> {
        let config = AppConfig::default();
        config.validate().map_err(|err| format!("defaults should validate: {err}"))?;

        ensure(config.recommendations.default_limit == 10, "default limit should be 10")?;
        ensure(
            (config.recommendations.collaborative_weight - 0.4).abs() < f64::EPSILON,
            "collaborative weight should default to 0.4",
        )?;
        ensure(
            (config.recommendations.trending_weight - 0.2).abs() < f64::EPSILON,
            "trending weight should default to 0.2",
        )?;
        ensure(
            matches!(config.logging.format, LogFormat::Compact),
            "default logging format should be compact",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_MARKETRANK_DB", "sqlite://from-env-interpolation.db");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("marketrank.toml");
            fs::write(
                &path,
                r#"
[database]
url = "${TEST_MARKETRANK_DB}"

[recommendations]
anonymous_interactions = "drop"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-env-interpolation.db",
                "database url should be interpolated from environment",
            )?;
            ensure(
                config.recommendations.anonymous_interactions == AnonymousInteractionPolicy::Drop,
                "anonymous policy should be read from file",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_MARKETRANK_DB"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("MARKETRANK_LOG_LEVEL", "warn");
        env::set_var("MARKETRANK_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "json logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["MARKETRANK_LOG_LEVEL", "MARKETRANK_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("MARKETRANK_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("MARKETRANK_RECOMMENDATIONS_TRENDING_WEIGHT", "0.3");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("marketrank.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[recommendations]
default_limit = 12
trending_weight = 0.1

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.recommendations.default_limit == 12, "file default limit should apply")?;
            ensure(
                (config.recommendations.trending_weight - 0.3).abs() < f64::EPSILON,
                "env trending weight should win over file",
            )?;
            Ok(())
        })();

        clear_vars(&["MARKETRANK_DATABASE_URL", "MARKETRANK_RECOMMENDATIONS_TRENDING_WEIGHT"]);
        result
    }

    #[test]
    fn invalid_env_override_reports_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("MARKETRANK_SERVER_PORT", "not-a-port");

        let result = (|| -> Result<(), String> {
            match AppConfig::load(LoadOptions::default()) {
                Ok(_) => Err("expected env override failure".to_string()),
                Err(ConfigError::InvalidEnvOverride { key, .. }) => {
                    ensure(key == "MARKETRANK_SERVER_PORT", "error should name the env key")
                }
                Err(other) => Err(format!("unexpected error: {other}")),
            }
        })();

        clear_vars(&["MARKETRANK_SERVER_PORT"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions {
                overrides: ConfigOverrides {
                    default_limit: Some(0),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            }) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message)
                    if message.contains("recommendations.default_limit")
            );
            ensure(has_message, "validation failure should mention recommendations.default_limit")
        })();

        result
    }

    #[test]
    fn all_zero_weights_are_rejected() {
        let mut config = AppConfig::default();
        config.recommendations.collaborative_weight = 0.0;
        config.recommendations.content_weight = 0.0;
        config.recommendations.trending_weight = 0.0;

        let error = config.validate().expect_err("zero weights must fail");
        assert!(error.to_string().contains("fusion weight"));
    }

    #[test]
    fn non_sqlite_database_url_is_rejected() {
        let mut config = AppConfig::default();
        config.database.url = "postgres://localhost/marketrank".to_string();

        let error = config.validate().expect_err("postgres url must fail");
        assert!(error.to_string().contains("database.url"));
    }
}
