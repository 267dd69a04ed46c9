//! Entity extraction over normalized utterances.
//!
//! Each entity key owns a small token-window pattern library. A value is only taken
//! when a recognized keyword introduces it; bare numbers are never guessed at, since
//! a wrong machine or part silently changes which data the answering agent reads.

use shopfloor_core::domain::intent::{Entities, EntityKey};

use crate::text::{normalize, tokenize};

const MACHINE_KINDS: [&str; 15] = [
    "press",
    "line",
    "machine",
    "pump",
    "motor",
    "compressor",
    "robot",
    "cell",
    "oven",
    "lathe",
    "mill",
    "conveyor",
    "station",
    "mixer",
    "extruder",
];

const NUMBER_MARKERS: [&str; 3] = ["no", "number", "num"];
const ID_MARKERS: [&str; 4] = ["id", "no", "number", "num"];
const SHIFT_NOUN_LEADS: [&str; 9] =
    ["on", "for", "during", "this", "last", "next", "from", "of", "in"];

#[derive(Clone, Debug, Default)]
pub struct EntityExtractor;

impl EntityExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, text: &str) -> Entities {
        let normalized_text = normalize(text);
        let tokens = tokenize(&normalized_text);
        self.extract_tokens(&tokens)
    }

    /// Extraction over already-normalized tokens.
    pub fn extract_tokens(&self, tokens: &[&str]) -> Entities {
        let mut entities = Entities::new();

        let extractors: [(EntityKey, fn(&[&str]) -> Option<String>); 5] = [
            (EntityKey::MachineId, extract_machine_id),
            (EntityKey::PartNumber, extract_part_number),
            (EntityKey::Shift, extract_shift),
            (EntityKey::EmployeeId, extract_employee_id),
            (EntityKey::LotId, extract_lot_id),
        ];

        for (key, extractor) in extractors {
            if let Some(value) = extractor(tokens) {
                entities.insert(key, value);
            }
        }

        entities
    }
}

/// Spoken form of an entity value, e.g. `press_03` -> `press 03`.
pub fn spoken_entity(key: EntityKey, value: &str) -> String {
    match key {
        EntityKey::MachineId => value.replace('_', " "),
        EntityKey::PartNumber => format!("part {value}"),
        EntityKey::LotId => format!("lot {value}"),
        EntityKey::EmployeeId => format!("employee {value}"),
        EntityKey::Shift => match value.strip_prefix("shift_") {
            Some(label) => format!("shift {label}"),
            None => format!("{value} shift"),
        },
    }
}

fn extract_machine_id(tokens: &[&str]) -> Option<String> {
    for (index, token) in tokens.iter().enumerate() {
        if let Some(kind) = MACHINE_KINDS.iter().find(|kind| **kind == *token) {
            let number = value_after(tokens, index + 1, &NUMBER_MARKERS).and_then(unit_number);
            if let Some(number) = number {
                return Some(format!("{kind}_{number:02}"));
            }
            continue;
        }

        if let Some(fused) = fused_machine_id(token) {
            return Some(fused);
        }
    }
    None
}

fn fused_machine_id(token: &str) -> Option<String> {
    MACHINE_KINDS.iter().find_map(|kind| {
        let number = token.strip_prefix(kind).and_then(unit_number)?;
        Some(format!("{kind}_{number:02}"))
    })
}

fn unit_number(token: &str) -> Option<u32> {
    let plausible = (1..=4).contains(&token.len()) && token.chars().all(|c| c.is_ascii_digit());
    if !plausible {
        return None;
    }
    token.parse::<u32>().ok()
}

fn extract_part_number(tokens: &[&str]) -> Option<String> {
    for (index, token) in tokens.iter().enumerate() {
        let value_index = match *token {
            "part" | "pn" | "component" => index + 1,
            "p" if tokens.get(index + 1) == Some(&"n") => index + 2,
            _ => continue,
        };

        if let Some(value) = value_after(tokens, value_index, &NUMBER_MARKERS) {
            if is_part_token(value) {
                return Some(value.to_ascii_uppercase());
            }
        }
    }
    None
}

fn is_part_token(token: &str) -> bool {
    let digits = token.chars().filter(|c| c.is_ascii_digit()).count();
    digits >= 3 && token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn extract_lot_id(tokens: &[&str]) -> Option<String> {
    for (index, token) in tokens.iter().enumerate() {
        if !matches!(*token, "lot" | "batch") {
            continue;
        }

        // "a lot" and "a batch" are quantities, not identifiers.
        if index.checked_sub(1).and_then(|prev| tokens.get(prev)) == Some(&"a") {
            continue;
        }

        if let Some(value) = value_after(tokens, index + 1, &ID_MARKERS) {
            if is_lot_token(value) {
                return Some(value.to_ascii_uppercase());
            }
        }
    }
    None
}

fn is_lot_token(token: &str) -> bool {
    let has_digit = token.chars().any(|c| c.is_ascii_digit());
    let well_formed = token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    token.len() >= 2 && has_digit && well_formed
}

fn extract_employee_id(tokens: &[&str]) -> Option<String> {
    for (index, token) in tokens.iter().enumerate() {
        if !matches!(*token, "employee" | "emp" | "badge" | "operator") {
            continue;
        }

        if let Some(value) = value_after(tokens, index + 1, &ID_MARKERS) {
            if value.len() >= 3 && value.chars().all(|c| c.is_ascii_digit()) {
                return Some(value.to_string());
            }
        }
    }
    None
}

fn extract_shift(tokens: &[&str]) -> Option<String> {
    for (index, token) in tokens.iter().enumerate() {
        if *token != "shift" {
            continue;
        }

        let previous = index.checked_sub(1).and_then(|prev| tokens.get(prev));
        if let Some(name) = previous.and_then(|t| shift_name(t)) {
            return Some(name);
        }

        if let Some(label) = tokens.get(index + 1).and_then(|t| shift_label(t)) {
            if names_a_shift(tokens, index) {
                return Some(label);
            }
        }
    }
    None
}

fn shift_name(token: &str) -> Option<String> {
    let name = match token {
        "first" | "1st" => "shift_1",
        "second" | "2nd" => "shift_2",
        "third" | "3rd" => "shift_3",
        "day" | "night" | "swing" | "graveyard" | "morning" | "afternoon" | "evening" => token,
        _ => return None,
    };
    Some(name.to_string())
}

/// A trailing label after `shift` only counts when `shift` reads as a noun: the label
/// closes the utterance, or `shift` follows a preposition or determiner. This keeps
/// "shift a pallet" from becoming `shift_a`.
fn names_a_shift(tokens: &[&str], shift_index: usize) -> bool {
    if shift_index + 2 == tokens.len() {
        return true;
    }
    let previous = shift_index.checked_sub(1).and_then(|prev| tokens.get(prev));
    previous.is_some_and(|token| SHIFT_NOUN_LEADS.contains(token))
}

fn shift_label(token: &str) -> Option<String> {
    matches!(token, "a" | "b" | "c" | "1" | "2" | "3").then(|| format!("shift_{token}"))
}

/// Token at `index`, skipping one optional marker word such as `number`.
fn value_after<'a>(tokens: &[&'a str], index: usize, markers: &[&str]) -> Option<&'a str> {
    let mut position = index;
    if tokens.get(position).is_some_and(|token| markers.contains(token)) {
        position += 1;
    }
    tokens.get(position).copied()
}
