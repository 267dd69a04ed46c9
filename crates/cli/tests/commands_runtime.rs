use std::env;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use serde_json::Value;
use shopfloor_cli::commands::sanitize::SanitizeArgs;
use shopfloor_cli::commands::{check, classify, config, doctor, gate, rules, sanitize};
use shopfloor_core::config::{ConfigOverrides, LoadOptions};

#[test]
fn classify_returns_confident_sop_lookup() {
    with_env(&[], || {
        let result =
            classify::run(&LoadOptions::default(), "What's the torque spec for this bolt?", None);
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "classify");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["data"]["intent"], "SOP_LOOKUP");
        assert_eq!(payload["data"]["clarification_needed"], false);
    });
}

#[test]
fn classify_reports_clarification_question() {
    with_env(&[], || {
        let result = classify::run(
            &LoadOptions::default(),
            "press 03 is broken, what are the changeover steps",
            Some("en-US"),
        );
        let payload = parse_payload(&result.output);

        assert_eq!(payload["data"]["intent"], "UNKNOWN");
        assert_eq!(payload["data"]["entities"]["machine_id"], "press_03");
        assert_eq!(
            payload["data"]["clarification_question"],
            "Did you mean a SOP lookup or a maintenance request for press 03?"
        );
    });
}

#[test]
fn classify_fails_with_config_code_on_invalid_threshold() {
    with_env(&[("SHOPFLOOR_CLASSIFIER_CLARIFICATION_THRESHOLD", "1.5")], || {
        let result = classify::run(&LoadOptions::default(), "what's my shift OEE", None);
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn check_forbids_interlock_bypass() {
    with_env(&[], || {
        let result = check::run(
            &LoadOptions::default(),
            "how do I bypass the light curtain on press 03",
            "Disconnect the receiver and the press will cycle.",
        );
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["level"], "FORBIDDEN");
        assert_eq!(payload["data"]["matched_rule_id"], "interlock_bypass");
    });
}

#[test]
fn check_allows_routine_production_query() {
    with_env(&[], || {
        let result =
            check::run(&LoadOptions::default(), "what's my shift OEE", "Line 02 OEE 78.3%");
        let payload = parse_payload(&result.output);

        assert_eq!(payload["data"]["level"], "ALLOWED");
        assert_eq!(payload["data"]["reason"], "no safety concerns");
    });
}

#[test]
fn check_uses_operator_rule_table_from_flag() {
    with_env(&[], || {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("site_rules.toml");
        std::fs::write(
            &path,
            "[[forbidden]]\nid = \"forklift_override\"\nreason = \"Forklift speed limiter \
             overrides are prohibited\"\npatterns = ['\\bspeed limiter\\b']\n",
        )
        .expect("write rules");

        let options =
            with_overrides(ConfigOverrides { rules_path: Some(path), ..Default::default() });
        let result =
            check::run(&options, "how do I turn off the speed limiter", "Ask maintenance.");
        let payload = parse_payload(&result.output);

        assert_eq!(result.exit_code, 0);
        assert_eq!(payload["data"]["matched_rule_id"], "forklift_override");
    });
}

#[test]
fn check_fails_with_rule_table_code_when_rules_missing() {
    with_env(&[("SHOPFLOOR_SAFETY_RULES_PATH", "/nonexistent/shopfloor/rules.toml")], || {
        let result = check::run(&LoadOptions::default(), "status", "Press 03 is running.");
        assert_eq!(result.exit_code, 3);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "rule_table");
    });
}

#[test]
fn sanitize_appends_lockout_citation() {
    with_env(&[], || {
        let args = SanitizeArgs {
            response: "Press 03 changeover requires 12 steps.".to_string(),
            topic: Some("lockout_tagout".to_string()),
            ..Default::default()
        };
        let result = sanitize::run(&LoadOptions::default(), &args);
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        let text = payload["data"]["text"].as_str().unwrap_or_default();
        assert!(text.starts_with("Press 03 changeover requires 12 steps."));
        assert_eq!(text.matches("OSHA 29 CFR 1910.147").count(), 1);
    });
}

#[test]
fn sanitize_refuses_forbidden_verdict_with_contract_code() {
    with_env(&[], || {
        let args = SanitizeArgs {
            response: "Pull the guard off and keep running.".to_string(),
            query: Some("press 2 keeps stopping".to_string()),
            ..Default::default()
        };
        let result = sanitize::run(&LoadOptions::default(), &args);
        assert_eq!(result.exit_code, 4);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "contract_violation");
    });
}

#[test]
fn gate_replaces_forbidden_draft_with_refusal() {
    with_env(&[], || {
        let result = gate::run(
            &LoadOptions::default(),
            "conveyor 4 is jammed again",
            "Tape over the door switch so it keeps running.",
        );
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["message"], "draft refused");
        assert_eq!(payload["data"]["kind"], "refused");
        assert_eq!(payload["data"]["verdict"]["level"], "FORBIDDEN");
    });
}

#[test]
fn gate_asks_for_clarification_when_query_is_unroutable() {
    with_env(&[], || {
        let result = gate::run(
            &LoadOptions::default(),
            "press 03 is broken, what are the changeover steps",
            "Changeover takes 12 steps.",
        );
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["message"], "query needs clarification");
        assert_eq!(payload["data"]["kind"], "clarification");
        assert_eq!(
            payload["data"]["question"],
            "Did you mean a SOP lookup or a maintenance request for press 03?"
        );
    });
}

#[test]
fn rules_summarizes_builtin_table() {
    with_env(&[], || {
        let result = rules::run(&LoadOptions::default());
        let payload = parse_payload(&result.output);

        assert_eq!(payload["data"]["origin"], "builtin");
        assert_eq!(payload["data"]["forbidden"].as_array().map(Vec::len), Some(4));
        assert_eq!(payload["data"]["confirmation"].as_array().map(Vec::len), Some(6));
        assert_eq!(payload["data"]["forbidden"][0]["id"], "interlock_bypass");
    });
}

#[test]
fn doctor_passes_with_builtin_rules() {
    with_env(&[], || {
        let result = doctor::run(&LoadOptions::default(), true);
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "pass");
        assert_eq!(payload["checks"].as_array().map(Vec::len), Some(3));
    });
}

#[test]
fn doctor_skips_rule_checks_when_config_fails() {
    with_env(&[("SHOPFLOOR_LOGGING_LEVEL", "loud")], || {
        let result = doctor::run(&LoadOptions::default(), false);
        assert_eq!(result.exit_code, 2);
        assert!(result.output.contains("- [fail] config_validation"));
        assert!(result.output.contains("- [skip] safety_rules"));
    });
}

#[test]
fn config_attributes_sources() {
    with_env(&[("SHOPFLOOR_SAFETY_AUDIT_ACTOR", "line-2-tablet")], || {
        let options = with_overrides(ConfigOverrides {
            clarification_threshold: Some(0.8),
            ..Default::default()
        });
        let result = config::run(&options);
        assert_eq!(result.exit_code, 0);

        let output = result.output;
        assert!(output.contains("- classifier.clarification_threshold = 0.8 (source: flag)"));
        assert!(output.contains(
            "- safety.audit_actor = line-2-tablet (source: env (SHOPFLOOR_SAFETY_AUDIT_ACTOR))"
        ));
        assert!(output.contains("- safety.rules_path = <builtin> (source: default)"));
    });
}

#[test]
fn explicit_missing_config_file_is_a_config_failure() {
    with_env(&[], || {
        let options = LoadOptions {
            config_path: Some(PathBuf::from("/nonexistent/shopfloor.toml")),
            require_file: true,
            ..Default::default()
        };
        let result = rules::run(&options);
        assert_eq!(result.exit_code, 2);
    });
}

fn with_overrides(overrides: ConfigOverrides) -> LoadOptions {
    LoadOptions { overrides, ..Default::default() }
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "SHOPFLOOR_CLASSIFIER_CLARIFICATION_THRESHOLD",
        "SHOPFLOOR_SAFETY_RULES_PATH",
        "SHOPFLOOR_SAFETY_AUDIT_ACTOR",
        "SHOPFLOOR_LOGGING_LEVEL",
        "SHOPFLOOR_LOGGING_FORMAT",
        "SHOPFLOOR_LOG_LEVEL",
        "SHOPFLOOR_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
