//! Text cleaning and OCR misread corrections.
//!
//! Runs on every raw detection before rejoining and merging, so the merge
//! pass compares cleaned text only.

use crate::model::RawDetection;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// "Half 111,420", "Hal64,800": the yen sign read as a word
static YEN_AS_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:Half|Halt|Hali|Haf|Hal)\s*(\d)").expect("static regex"));

/// "Y64,800": the yen sign read as a Latin Y in front of a grouped number
static YEN_AS_Y: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bY\s?(\d{1,3}(?:[,.]\d{3})+)\b").expect("static regex"));

/// Yen has no minor unit, so a dot inside a yen amount is a misread comma
static YEN_DECIMAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"¥(\d{1,3}(?:\.\d{3})+)\b").expect("static regex"));

/// Digit groups containing O/o/I/l where a digit belongs
static CONFUSED_DIGITS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[0-9OoIl]{1,3}(?:,[0-9OoIl]{3})+\b").expect("static regex")
});

static SPACE_AFTER_CURRENCY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([$¥€£₩₹])\s+(\d)").expect("static regex"));

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

/// Characters engines emit at box edges from borders and rules
const EDGE_ARTIFACTS: &[char] = &['|', '_', '~', '`', '•', '·', '¦'];

/// Punctuation that OCR tends to double up
const COLLAPSIBLE: &[char] = &[',', '.', ':', ';'];

/// Clean one piece of OCR text. Returns an empty string when nothing useful
/// remains.
pub fn clean_text(text: &str) -> String {
    let folded = fold_characters(text);
    let collapsed = collapse_punctuation(&folded);

    let corrected = YEN_AS_WORD.replace_all(&collapsed, "¥$1");
    let corrected = YEN_AS_Y.replace_all(&corrected, "¥$1");
    let corrected = YEN_DECIMAL.replace_all(&corrected, |caps: &Captures| {
        format!("¥{}", caps[1].replace('.', ","))
    });
    let corrected = CONFUSED_DIGITS.replace_all(&corrected, |caps: &Captures| {
        let group = &caps[0];
        if group.chars().any(|c| c.is_ascii_digit()) {
            fix_digit_confusion(group)
        } else {
            group.to_string()
        }
    });
    let corrected = SPACE_AFTER_CURRENCY.replace_all(&corrected, "$1$2");
    let corrected = WHITESPACE.replace_all(&corrected, " ");

    corrected
        .trim_matches(|c: char| c.is_whitespace() || EDGE_ARTIFACTS.contains(&c))
        .to_string()
}

/// Clean a detection's text, dropping it if nothing is left
pub fn clean_detection(mut detection: RawDetection) -> Option<RawDetection> {
    let cleaned = clean_text(&detection.text);
    if cleaned.is_empty() {
        return None;
    }
    detection.text = cleaned;
    Some(detection)
}

/// Full-width ASCII to ASCII, control and zero-width characters out
fn fold_characters(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '\u{200b}'..='\u{200d}' | '\u{feff}'))
        .map(|c| match c {
            '\u{ff01}'..='\u{ff5e}' => char::from_u32(c as u32 - 0xfee0).unwrap_or(c),
            '\u{3000}' => ' ',
            '\u{ffe5}' => '¥',
            '\u{ffe6}' => '₩',
            c if c.is_control() => ' ',
            c => c,
        })
        .collect()
}

fn collapse_punctuation(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev: Option<char> = None;
    for c in text.chars() {
        if COLLAPSIBLE.contains(&c) && prev == Some(c) {
            continue;
        }
        out.push(c);
        prev = Some(c);
    }
    out
}

fn fix_digit_confusion(group: &str) -> String {
    group
        .chars()
        .map(|c| match c {
            'O' | 'o' => '0',
            'I' | 'l' => '1',
            c => c,
        })
        .collect()
}
