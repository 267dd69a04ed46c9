use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use shopfloor_core::config::{default_config_paths, AppConfig, LoadOptions};
use toml::Value;

use crate::commands::CommandResult;

struct Field {
    key_path: &'static str,
    env_keys: &'static [&'static str],
    overridden: bool,
    value: String,
}

pub fn run(options: &LoadOptions) -> CommandResult {
    let config = match AppConfig::load(options.clone()) {
        Ok(config) => config,
        Err(error) => return CommandResult::config_failure("config", &error),
    };

    let overrides = &options.overrides;
    let config_file_path = detect_config_path(options.config_path.as_deref());
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let fields = [
        Field {
            key_path: "classifier.clarification_threshold",
            env_keys: &["SHOPFLOOR_CLASSIFIER_CLARIFICATION_THRESHOLD"],
            overridden: overrides.clarification_threshold.is_some(),
            value: config.classifier.clarification_threshold.to_string(),
        },
        Field {
            key_path: "safety.rules_path",
            env_keys: &["SHOPFLOOR_SAFETY_RULES_PATH"],
            overridden: overrides.rules_path.is_some(),
            value: config
                .safety
                .rules_path
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "<builtin>".to_string()),
        },
        Field {
            key_path: "safety.audit_actor",
            env_keys: &["SHOPFLOOR_SAFETY_AUDIT_ACTOR"],
            overridden: overrides.audit_actor.is_some(),
            value: config.safety.audit_actor.clone(),
        },
        Field {
            key_path: "logging.level",
            env_keys: &["SHOPFLOOR_LOGGING_LEVEL", "SHOPFLOOR_LOG_LEVEL"],
            overridden: overrides.log_level.is_some(),
            value: config.logging.level.clone(),
        },
        Field {
            key_path: "logging.format",
            env_keys: &["SHOPFLOOR_LOGGING_FORMAT", "SHOPFLOOR_LOG_FORMAT"],
            overridden: overrides.log_format.is_some(),
            value: format!("{:?}", config.logging.format).to_lowercase(),
        },
    ];

    let mut lines =
        vec!["effective config (source precedence: flag > env > file > default):".to_string()];
    for field in &fields {
        if field.overridden {
            lines.push(render_line(field.key_path, &field.value, "flag".to_string()));
            continue;
        }
        let source = field_source(
            field.key_path,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key_path, &field.value, source));
    }

    CommandResult { exit_code: 0, output: lines.join("\n") }
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }
    default_config_paths().into_iter().find(|path| path.exists())
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
