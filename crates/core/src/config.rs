use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CLARIFICATION_THRESHOLD: f64 = 0.7;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub classifier: ClassifierConfig,
    pub safety: SafetyConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClassifierConfig {
    /// Confidence below this routes the worker to a clarification question.
    pub clarification_threshold: f64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SafetyConfig {
    /// Operator rule table; the built-in table is used when unset.
    pub rules_path: Option<PathBuf>,
    pub audit_actor: String,
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

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub clarification_threshold: Option<f64>,
    pub rules_path: Option<PathBuf>,
    pub audit_actor: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
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
            classifier: ClassifierConfig::default(),
            safety: SafetyConfig { rules_path: None, audit_actor: "safety-guardrails".to_string() },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self { clarification_threshold: DEFAULT_CLARIFICATION_THRESHOLD }
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

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("shopfloor.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(classifier) = patch.classifier {
            if let Some(threshold) = classifier.clarification_threshold {
                self.classifier.clarification_threshold = threshold;
            }
        }

        if let Some(safety) = patch.safety {
            if let Some(rules_path) = safety.rules_path {
                self.safety.rules_path = Some(rules_path);
            }
            if let Some(audit_actor) = safety.audit_actor {
                self.safety.audit_actor = audit_actor;
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
        if let Some(value) = read_env("SHOPFLOOR_CLASSIFIER_CLARIFICATION_THRESHOLD") {
            self.classifier.clarification_threshold =
                parse_f64("SHOPFLOOR_CLASSIFIER_CLARIFICATION_THRESHOLD", &value)?;
        }

        if let Some(value) = read_env("SHOPFLOOR_SAFETY_RULES_PATH") {
            self.safety.rules_path = Some(PathBuf::from(value));
        }
        if let Some(value) = read_env("SHOPFLOOR_SAFETY_AUDIT_ACTOR") {
            self.safety.audit_actor = value;
        }

        let log_level =
            read_env("SHOPFLOOR_LOGGING_LEVEL").or_else(|| read_env("SHOPFLOOR_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("SHOPFLOOR_LOGGING_FORMAT").or_else(|| read_env("SHOPFLOOR_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(threshold) = overrides.clarification_threshold {
            self.classifier.clarification_threshold = threshold;
        }
        if let Some(rules_path) = overrides.rules_path {
            self.safety.rules_path = Some(rules_path);
        }
        if let Some(audit_actor) = overrides.audit_actor {
            self.safety.audit_actor = audit_actor;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_classifier(&self.classifier)?;
        validate_safety(&self.safety)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// Config file candidates probed when no explicit path is given.
pub fn default_config_paths() -> [PathBuf; 2] {
    [PathBuf::from("shopfloor.toml"), PathBuf::from("config/shopfloor.toml")]
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    default_config_paths().into_iter().find(|path| path.exists())
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

fn validate_classifier(classifier: &ClassifierConfig) -> Result<(), ConfigError> {
    let threshold = classifier.clarification_threshold;
    if !threshold.is_finite() || threshold <= 0.0 || threshold > 1.0 {
        return Err(ConfigError::Validation(
            "classifier.clarification_threshold must be in range (0, 1]".to_string(),
        ));
    }
    Ok(())
}

fn validate_safety(safety: &SafetyConfig) -> Result<(), ConfigError> {
    if let Some(path) = &safety.rules_path {
        if path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "safety.rules_path must not be empty when set".to_string(),
            ));
        }
    }

    if safety.audit_actor.trim().is_empty() {
        return Err(ConfigError::Validation("safety.audit_actor must not be empty".to_string()));
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

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.trim().parse::<f64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    classifier: Option<ClassifierPatch>,
    safety: Option<SafetyPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct ClassifierPatch {
    clarification_threshold: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct SafetyPatch {
    rules_path: Option<PathBuf>,
    audit_actor: Option<String>,
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
    use std::path::PathBuf;
    use std::sync::{Mutex, OnceLock};

    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

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
    fn defaults_validate_without_file_or_env() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions {
            config_path: Some(PathBuf::from("does-not-exist/shopfloor.toml")),
            ..LoadOptions::default()
        })
        .map_err(|err| format!("config load failed: {err}"))?;

        ensure(
            (config.classifier.clarification_threshold - 0.7).abs() < f64::EPSILON,
            "default clarification threshold should be 0.7",
        )?;
        ensure(config.safety.rules_path.is_none(), "built-in rules should be the default")?;
        ensure(
            matches!(config.logging.format, LogFormat::Compact),
            "default logging format should be compact",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_SHOPFLOOR_RULES_DIR", "/etc/shopfloor");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("shopfloor.toml");
            fs::write(
                &path,
                r#"
[safety]
rules_path = "${TEST_SHOPFLOOR_RULES_DIR}/rules.toml"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.safety.rules_path == Some(PathBuf::from("/etc/shopfloor/rules.toml")),
                "rules path should be interpolated from environment",
            )
        })();

        clear_vars(&["TEST_SHOPFLOOR_RULES_DIR"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SHOPFLOOR_LOG_LEVEL", "warn");
        env::set_var("SHOPFLOOR_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )
        })();

        clear_vars(&["SHOPFLOOR_LOG_LEVEL", "SHOPFLOOR_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SHOPFLOOR_CLASSIFIER_CLARIFICATION_THRESHOLD", "0.6");
        env::set_var("SHOPFLOOR_SAFETY_AUDIT_ACTOR", "env-actor");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("shopfloor.toml");
            fs::write(
                &path,
                r#"
[classifier]
clarification_threshold = 0.8

[safety]
audit_actor = "file-actor"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    clarification_threshold: Some(0.75),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                (config.classifier.clarification_threshold - 0.75).abs() < f64::EPSILON,
                "override threshold should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.safety.audit_actor == "env-actor",
                "env audit actor should win over file and defaults",
            )
        })();

        clear_vars(&[
            "SHOPFLOOR_CLASSIFIER_CLARIFICATION_THRESHOLD",
            "SHOPFLOOR_SAFETY_AUDIT_ACTOR",
        ]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let error = match AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                clarification_threshold: Some(1.5),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }) {
            Ok(_) => return Err("expected validation failure but config load succeeded".to_string()),
            Err(error) => error,
        };

        let has_message = matches!(
            error,
            ConfigError::Validation(ref message) if message.contains("clarification_threshold")
        );
        ensure(has_message, "validation failure should mention clarification_threshold")
    }

    #[test]
    fn unparseable_env_threshold_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SHOPFLOOR_CLASSIFIER_CLARIFICATION_THRESHOLD", "high");
        let result = match AppConfig::load(LoadOptions::default()) {
            Err(ConfigError::InvalidEnvOverride { key, .. }) => ensure(
                key == "SHOPFLOOR_CLASSIFIER_CLARIFICATION_THRESHOLD",
                "error should name the offending variable",
            ),
            Err(other) => Err(format!("unexpected error: {other}")),
            Ok(_) => Err("expected env override failure".to_string()),
        };

        clear_vars(&["SHOPFLOOR_CLASSIFIER_CLARIFICATION_THRESHOLD"]);
        result
    }

    #[test]
    fn require_file_reports_missing_path() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let missing = PathBuf::from("missing-dir/shopfloor.toml");
        match AppConfig::load(LoadOptions {
            config_path: Some(missing.clone()),
            require_file: true,
            ..LoadOptions::default()
        }) {
            Err(ConfigError::MissingConfigFile(path)) => {
                ensure(path == missing, "missing file error should echo the requested path")
            }
            Err(other) => Err(format!("unexpected error: {other}")),
            Ok(_) => Err("expected missing config file failure".to_string()),
        }
    }
}
