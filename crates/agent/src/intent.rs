use std::cmp::Ordering;

use shopfloor_core::config::ClassifierConfig;
use shopfloor_core::domain::intent::{
    Entities, EntityKey, Intent, IntentCandidate, IntentResult, Utterance,
};
use tracing::debug;

use crate::extraction::{spoken_entity, EntityExtractor};
use crate::text::{contains_phrase, normalize, pad, tokenize};

pub const GENERIC_CLARIFICATION: &str = "Sorry, I didn't catch what you need. Are you asking \
about a SOP, production status, a maintenance request, a quality defect or a safety question?";

const FILLER_WORDS: [&str; 16] = [
    "um", "umm", "uh", "uhh", "er", "erm", "ah", "hmm", "hey", "okay", "ok", "please",
    "basically", "actually", "literally", "kinda",
];

#[derive(Clone, Copy, Debug)]
struct Trigger {
    phrase: &'static str,
    weight: f64,
}

const fn trigger(phrase: &'static str, weight: f64) -> Trigger {
    Trigger { phrase, weight }
}

const SOP_TRIGGERS: &[Trigger] = &[
    trigger("sop", 2.0),
    trigger("procedure", 2.0),
    trigger("instructions", 2.0),
    trigger("work instruction", 2.0),
    trigger("changeover", 2.0),
    trigger("steps", 1.5),
    trigger("setup", 1.5),
    trigger("set up", 1.0),
    trigger("torque", 1.5),
    trigger("torque spec", 1.0),
    trigger("how to", 1.0),
    trigger("how do i", 1.0),
    trigger("guide", 1.0),
    trigger("show me", 0.5),
];

const PRODUCTION_TRIGGERS: &[Trigger] = &[
    trigger("oee", 2.5),
    trigger("downtime", 2.0),
    trigger("cycle time", 2.0),
    trigger("throughput", 2.0),
    trigger("status", 1.5),
    trigger("output", 1.5),
    trigger("running", 1.0),
    trigger("how many", 1.0),
    trigger("production", 1.0),
    trigger("rate", 1.0),
    trigger("target", 1.0),
];

const MAINTENANCE_TRIGGERS: &[Trigger] = &[
    trigger("maintenance", 2.0),
    trigger("repair", 2.0),
    trigger("broken", 2.0),
    trigger("not working", 2.0),
    trigger("overheating", 2.0),
    trigger("broke", 1.5),
    trigger("leak", 1.5),
    trigger("leaking", 1.5),
    trigger("vibration", 1.5),
    trigger("bearing", 1.5),
    trigger("jam", 1.5),
    trigger("jammed", 1.5),
    trigger("fault", 1.5),
    trigger("error code", 1.5),
    trigger("work order", 1.5),
    trigger("technician", 1.5),
    trigger("fix", 1.5),
    trigger("seal", 1.0),
    trigger("motor", 1.0),
    trigger("noise", 1.0),
    trigger("issue", 0.5),
    trigger("problem", 0.5),
];

const QUALITY_TRIGGERS: &[Trigger] = &[
    trigger("defect", 2.5),
    trigger("defects", 2.5),
    trigger("out of spec", 2.5),
    trigger("out of tolerance", 2.5),
    trigger("quality", 2.0),
    trigger("ncr", 2.0),
    trigger("nonconformance", 2.0),
    trigger("reject", 1.5),
    trigger("rejected", 1.5),
    trigger("rejects", 1.5),
    trigger("scrap", 1.5),
    trigger("inspect", 1.5),
    trigger("inspection", 1.5),
    trigger("tolerance", 1.5),
    trigger("burr", 1.5),
    trigger("burrs", 1.5),
    trigger("crack", 1.5),
    trigger("cracked", 1.5),
    trigger("dimension", 1.0),
];

const SAFETY_TRIGGERS: &[Trigger] = &[
    trigger("ppe", 2.5),
    trigger("personal protective", 2.5),
    trigger("lockout", 2.5),
    trigger("tagout", 2.5),
    trigger("loto", 2.5),
    trigger("safety", 2.0),
    trigger("hazard", 2.0),
    trigger("light curtain", 2.0),
    trigger("interlock", 2.0),
    trigger("e-stop", 2.0),
    trigger("emergency stop", 2.0),
    trigger("sds", 2.0),
    trigger("injury", 2.0),
    trigger("injured", 2.0),
    trigger("safe", 1.5),
    trigger("danger", 1.5),
    trigger("guard", 1.5),
    trigger("bypass", 1.5),
    trigger("gloves", 1.0),
    trigger("goggles", 1.0),
];

fn triggers(intent: Intent) -> &'static [Trigger] {
    match intent {
        Intent::SopLookup => SOP_TRIGGERS,
        Intent::ProductionStatus => PRODUCTION_TRIGGERS,
        Intent::MaintenanceRequest => MAINTENANCE_TRIGGERS,
        Intent::QualityDefect => QUALITY_TRIGGERS,
        Intent::SafetyQuery => SAFETY_TRIGGERS,
        Intent::Unknown => &[],
    }
}

/// Extra score an intent earns from the entities found in the utterance.
fn entity_evidence(intent: Intent, entities: &Entities, has_keyword_evidence: bool) -> f64 {
    let has = |key: EntityKey| entities.contains_key(&key);
    match intent {
        Intent::QualityDefect if has(EntityKey::PartNumber) || has(EntityKey::LotId) => 1.5,
        Intent::SopLookup | Intent::MaintenanceRequest
            if has_keyword_evidence && has(EntityKey::MachineId) =>
        {
            1.0
        }
        Intent::ProductionStatus if has_keyword_evidence && has(EntityKey::Shift) => 0.5,
        _ => 0.0,
    }
}

#[derive(Clone, Debug)]
struct IntentScore {
    intent: Intent,
    score: f64,
    matched_terms: Vec<&'static str>,
}

#[derive(Clone, Debug)]
pub struct IntentClassifier {
    extractor: EntityExtractor,
    clarification_threshold: f64,
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new(&ClassifierConfig::default())
    }
}

impl IntentClassifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        Self {
            extractor: EntityExtractor::new(),
            clarification_threshold: config.clarification_threshold,
        }
    }

    pub fn clarification_threshold(&self) -> f64 {
        self.clarification_threshold
    }

    pub fn classify(&self, text: &str) -> IntentResult {
        self.classify_utterance(&Utterance::new(text))
    }

    /// Classifies against the English trigger tables. Non-English speech is expected to
    /// arrive translated; tagged untranslated text usually ends in a clarification.
    pub fn classify_utterance(&self, utterance: &Utterance) -> IntentResult {
        if !utterance.is_english() {
            debug!(
                event_name = "intent.untranslated_input",
                language = utterance.language().unwrap_or("unknown"),
                "classifying non-English utterance against English trigger tables"
            );
        }

        let normalized_text = normalize(utterance.text());
        let tokens = strip_fillers(tokenize(&normalized_text));
        let entities = self.extractor.extract_tokens(&tokens);

        let ranked = rank(score_intents(&tokens, &entities));
        let total = ranked.iter().map(|entry| entry.score).sum::<f64>();

        let Some(winner) = ranked.first() else {
            return self.finish(
                IntentResult {
                    intent: Intent::Unknown,
                    confidence: 0.0,
                    entities,
                    clarification_needed: true,
                    clarification_question: Some(GENERIC_CLARIFICATION.to_string()),
                    candidates: Vec::new(),
                },
                tokens.len(),
            );
        };

        let confidence = (winner.score / total).clamp(0.0, 1.0);
        let candidates = ranked
            .iter()
            .map(|entry| IntentCandidate { intent: entry.intent, score: entry.score })
            .collect::<Vec<_>>();

        let result = if confidence < self.clarification_threshold {
            IntentResult {
                intent: Intent::Unknown,
                confidence,
                clarification_needed: true,
                clarification_question: Some(clarification_question(&ranked, &entities)),
                entities,
                candidates,
            }
        } else {
            IntentResult {
                intent: winner.intent,
                confidence,
                entities,
                clarification_needed: false,
                clarification_question: None,
                candidates,
            }
        };

        self.finish(result, tokens.len())
    }

    fn finish(&self, result: IntentResult, token_count: usize) -> IntentResult {
        debug!(
            event_name = "intent.classified",
            intent = %result.intent,
            confidence = result.confidence,
            clarification_needed = result.clarification_needed,
            entity_count = result.entities.len(),
            token_count,
            "utterance classified"
        );
        result
    }
}

fn strip_fillers(tokens: Vec<&str>) -> Vec<&str> {
    let mut kept = Vec::with_capacity(tokens.len());
    let mut index = 0;
    while index < tokens.len() {
        if tokens[index] == "you" && tokens.get(index + 1) == Some(&"know") {
            index += 2;
            continue;
        }
        if !FILLER_WORDS.contains(&tokens[index]) {
            kept.push(tokens[index]);
        }
        index += 1;
    }
    kept
}

fn score_intents(tokens: &[&str], entities: &Entities) -> Vec<IntentScore> {
    let padded = pad(&tokens.join(" "));

    Intent::PRIORITY
        .iter()
        .map(|&intent| {
            let mut score = 0.0;
            let mut matched_terms = Vec::new();
            for trigger in triggers(intent) {
                if contains_phrase(&padded, trigger.phrase) {
                    score += trigger.weight;
                    matched_terms.push(trigger.phrase);
                }
            }
            score += entity_evidence(intent, entities, score > 0.0);
            IntentScore { intent, score, matched_terms }
        })
        .collect()
}

/// Non-zero scores, best first; equal scores fall back to the safety-first priority.
fn rank(mut scores: Vec<IntentScore>) -> Vec<IntentScore> {
    scores.retain(|entry| entry.score > 0.0);
    scores.sort_by(|left, right| match right.score.total_cmp(&left.score) {
        Ordering::Equal => left.intent.priority_rank().cmp(&right.intent.priority_rank()),
        other => other,
    });
    scores
}

fn clarification_question(ranked: &[IntentScore], entities: &Entities) -> String {
    let options = match ranked {
        [first, second, ..] => {
            format!("{} or {}", first.intent.spoken_label(), second.intent.spoken_label())
        }
        [only] => only.intent.spoken_label().to_string(),
        [] => return GENERIC_CLARIFICATION.to_string(),
    };

    if let Some(subject) = question_subject(entities) {
        return format!("Did you mean {options} for {subject}?");
    }

    let mut echoed = Vec::new();
    for entry in ranked.iter().take(2) {
        if let Some(term) = entry.matched_terms.first() {
            if !echoed.contains(term) {
                echoed.push(*term);
            }
        }
    }

    if echoed.is_empty() {
        return format!("Did you mean {options}?");
    }

    let quoted = echoed.iter().map(|term| format!("\"{term}\"")).collect::<Vec<_>>();
    format!("Did you mean {options}? You mentioned {}.", quoted.join(" and "))
}

fn question_subject(entities: &Entities) -> Option<String> {
    [EntityKey::MachineId, EntityKey::PartNumber, EntityKey::LotId]
        .into_iter()
        .find_map(|key| entities.get(&key).map(|value| spoken_entity(key, value)))
}
