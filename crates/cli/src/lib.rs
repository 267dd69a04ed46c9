pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use shopfloor_core::config::{AppConfig, ConfigOverrides, LoadOptions, LogFormat};
use tracing_subscriber::EnvFilter;

use crate::commands::sanitize::SanitizeArgs;

#[derive(Debug, Parser)]
#[command(
    name = "shopfloor",
    about = "Shopfloor query routing CLI",
    long_about = "Classify worker utterances, evaluate safety verdicts and inspect the safety rule table.",
    after_help = "Examples:\n  shopfloor classify \"show me press 03 changeover\"\n  shopfloor check --query \"what's my shift OEE\" --response \"Line 02 OEE 78.3%\"\n  shopfloor doctor --json"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Config file to load instead of shopfloor.toml")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Override classifier.clarification_threshold")]
    clarification_threshold: Option<f64>,
    #[arg(long, global = true, help = "Override safety.rules_path")]
    rules_path: Option<PathBuf>,
    #[arg(long, global = true, help = "Override logging.level")]
    log_level: Option<String>,
    #[arg(long, global = true, help = "Override logging.format (compact|pretty|json)")]
    log_format: Option<LogFormat>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Classify an utterance into an intent with extracted entities")]
    Classify {
        text: String,
        #[arg(long, help = "BCP 47 language tag of the utterance")]
        language: Option<String>,
    },
    #[command(about = "Evaluate the safety verdict for a query and draft response")]
    Check {
        #[arg(long)]
        query: String,
        #[arg(long)]
        response: String,
    },
    #[command(about = "Append the disclaimer and citation for a safety topic to a response")]
    Sanitize {
        #[arg(long)]
        response: String,
        #[arg(long)]
        topic: Option<String>,
        #[arg(long, help = "Evaluate this query first and sanitize for its verdict")]
        query: Option<String>,
        #[arg(long, help = "Treat the response as requiring confirmation")]
        confirm: bool,
    },
    #[command(about = "Apply the delivery contract to an externally produced draft")]
    Gate {
        #[arg(long)]
        query: String,
        #[arg(long)]
        draft: String,
    },
    #[command(about = "Summarize the active safety rule table")]
    Rules,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate configuration and safety rule table readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

impl Cli {
    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            config_path: self.config.clone(),
            require_file: self.config.is_some(),
            overrides: ConfigOverrides {
                clarification_threshold: self.clarification_threshold,
                rules_path: self.rules_path.clone(),
                audit_actor: None,
                log_level: self.log_level.clone(),
                log_format: self.log_format,
            },
        }
    }
}

/// Filter for the configured level; falls back to `info` on an unparsable directive.
pub fn log_filter(config: &AppConfig) -> EnvFilter {
    EnvFilter::try_new(config.logging.level.trim().to_ascii_lowercase())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the stderr subscriber so stdout carries only command output.
pub fn init_logging(config: &AppConfig) {
    use shopfloor_core::config::LogFormat::*;

    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(log_filter(config))
        .with_writer(std::io::stderr);

    let _ = match config.logging.format {
        Compact => builder.compact().try_init(),
        Pretty => builder.pretty().try_init(),
        Json => builder.json().try_init(),
    };
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = cli.load_options();

    if let Ok(config) = AppConfig::load(options.clone()) {
        init_logging(&config);
    }

    let result = match cli.command {
        Command::Classify { text, language } => {
            commands::classify::run(&options, &text, language.as_deref())
        }
        Command::Check { query, response } => commands::check::run(&options, &query, &response),
        Command::Sanitize { response, topic, query, confirm } => {
            commands::sanitize::run(&options, &SanitizeArgs { response, topic, query, confirm })
        }
        Command::Gate { query, draft } => commands::gate::run(&options, &query, &draft),
        Command::Rules => commands::rules::run(&options),
        Command::Config => commands::config::run(&options),
        Command::Doctor { json } => commands::doctor::run(&options, json),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

#[cfg(test)]
mod tests {
    use shopfloor_core::config::AppConfig;
    use tracing::level_filters::LevelFilter;

    use super::log_filter;

    #[test]
    fn log_filter_follows_configured_level() {
        let mut config = AppConfig::default();
        assert_eq!(log_filter(&config).max_level_hint(), Some(LevelFilter::INFO));

        config.logging.level = "DEBUG".to_string();
        assert_eq!(log_filter(&config).max_level_hint(), Some(LevelFilter::DEBUG));
    }
}
