//! Regex extraction of confidence scores, reasoning blocks and final answers
//! from free-form model text.

use once_cell::sync::Lazy;
use regex::Regex;

static CONFIDENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Confidence:\s*([0-1]?\.\d+)").unwrap());

static REASONING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"Reasoning:\s*(.+)").unwrap());

static ANSWER_LETTER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Answer:\s*\(?([A-J])\)?").unwrap());

static ANSWER_KEYWORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Answer:\s*(yes|no|maybe)").unwrap());

static STANDALONE_LETTER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b([A-J])\b").unwrap());

static NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"-?\d+\.?\d*").unwrap());

/// Self-reported confidence score, e.g. `Confidence: 0.95`.
pub fn confidence(text: &str) -> Option<f64> {
    CONFIDENCE_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// First `Reasoning:` line, trimmed.
pub fn reasoning(text: &str) -> Option<String> {
    REASONING_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// Option letter for an `n_options`-way multiple-choice question.
///
/// Prefers the structured `Answer: X` form; falls back to the LAST
/// standalone letter in range anywhere in the text, because models tend to
/// repeat option letters while reasoning before committing to one.
pub fn answer_letter(text: &str, n_options: usize) -> Option<char> {
    debug_assert!((2..=10).contains(&n_options));
    let last_valid = (b'A' + n_options as u8 - 1) as char;

    if let Some(caps) = ANSWER_LETTER_RE.captures(text) {
        if let Some(ch) = caps[1].chars().next().map(|c| c.to_ascii_uppercase()) {
            if ('A'..=last_valid).contains(&ch) {
                return Some(ch);
            }
        }
    }

    let upper = text.to_uppercase();
    let mut found = None;
    for caps in STANDALONE_LETTER_RE.captures_iter(&upper) {
        if let Some(ch) = caps[1].chars().next() {
            if ('A'..=last_valid).contains(&ch) {
                found = Some(ch);
            }
        }
    }
    found
}

/// yes/no/maybe verdict. The fallback substring search checks `yes` before
/// `no` before `maybe` ("no" is a substring of too many words to go first).
pub fn answer_keyword(text: &str) -> Option<&'static str> {
    if let Some(caps) = ANSWER_KEYWORD_RE.captures(text) {
        return match caps[1].to_lowercase().as_str() {
            "yes" => Some("yes"),
            "no" => Some("no"),
            _ => Some("maybe"),
        };
    }

    let lower = text.to_lowercase();
    if lower.contains("yes") {
        return Some("yes");
    }
    if lower.contains("no") {
        return Some("no");
    }
    if lower.contains("maybe") {
        return Some("maybe");
    }
    None
}

/// LAST digit in range for an index-answer question (HellaSwag style).
pub fn option_index(text: &str, n_options: usize) -> Option<usize> {
    text.chars()
        .filter_map(|c| c.to_digit(10))
        .map(|d| d as usize)
        .filter(|d| *d < n_options)
        .last()
}

/// Final numeric answer in GSM8K style: take the text after the last `####`
/// marker if present, strip thousands separators, return the last number.
pub fn final_number(text: &str) -> Option<String> {
    let tail = text.rsplit("####").next().unwrap_or(text);
    let cleaned = tail.replace(',', "");
    NUMBER_RE
        .find_iter(&cleaned)
        .last()
        .map(|m| m.as_str().to_string())
}

/// Canonical rendering so `24,000`, `24000.0` and `24000` compare equal.
pub fn normalize_number(raw: &str) -> Option<String> {
    let value: f64 = raw.trim().replace(',', "").parse().ok()?;
    Some(format!("{}", value))
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Answer(String),
    Refusal,
}

/// Safe-mode parse: the confidence gate is applied BEFORE answer extraction,
/// and a reply that fails extraction counts as a refusal rather than a guess.
pub fn gate<F>(text: &str, threshold: f64, extract: F) -> (Verdict, f64)
where
    F: Fn(&str) -> Option<String>,
{
    if text.is_empty() {
        return (Verdict::Refusal, 0.0);
    }

    let score = confidence(text).unwrap_or(0.0);
    if score < threshold {
        return (Verdict::Refusal, score);
    }

    match extract(text) {
        Some(answer) => (Verdict::Answer(answer), score),
        None => (Verdict::Refusal, score),
    }
}
