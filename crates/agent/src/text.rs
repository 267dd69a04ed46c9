//! Text normalization shared by extraction, classification and rule matching.

/// Lower-cases, drops apostrophes, keeps hyphens only between word characters and
/// turns every other non-alphanumeric character into a single space.
pub fn normalize(text: &str) -> String {
    let chars = text.chars().collect::<Vec<_>>();
    let mut cleaned = String::with_capacity(text.len());

    for (index, character) in chars.iter().copied().enumerate() {
        if character.is_alphanumeric() {
            cleaned.extend(character.to_lowercase());
        } else if matches!(character, '\'' | '\u{2019}') {
            continue;
        } else if character == '-'
            && index.checked_sub(1).is_some_and(|prev| is_word_char(chars.get(prev)))
            && is_word_char(chars.get(index + 1))
        {
            cleaned.push('-');
        } else {
            cleaned.push(' ');
        }
    }

    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_word_char(character: Option<&char>) -> bool {
    character.is_some_and(|c| c.is_alphanumeric())
}

pub fn tokenize(normalized: &str) -> Vec<&str> {
    normalized.split_whitespace().collect()
}

/// Whole-word phrase match against space-padded normalized text.
pub fn contains_phrase(padded: &str, phrase: &str) -> bool {
    padded.contains(&format!(" {phrase} "))
}

pub fn pad(normalized: &str) -> String {
    format!(" {normalized} ")
}

/// Control characters other than ordinary whitespace mark a garbled transcript.
pub fn has_control_characters(text: &str) -> bool {
    text.chars().any(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t'))
}
