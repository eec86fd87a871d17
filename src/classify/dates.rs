//! Date recognition for the deadline field

use super::vocabulary::Vocabulary;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static ISO_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{4})[/.-](\d{1,2})[/.-](\d{1,2})\b").expect("static regex")
});

/// DD/MM/YYYY or MM/DD/YYYY; either order is accepted as long as it is a valid date
static NUMERIC_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,2})[/.-](\d{1,2})[/.-](\d{4})\b").expect("static regex")
});

/// 2024年3月12日 and 2024년 3월 12일
static CJK_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{4})\s*[年년]\s*(\d{1,2})\s*[月월]\s*(\d{1,2})\s*[日일]").expect("static regex")
});

/// March 12, 2024
static MONTH_FIRST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\p{L}+)\.?\s+(\d{1,2})(?:st|nd|rd|th)?,?\s+(\d{4})\b").expect("static regex")
});

/// 12 March 2024, 12. März 2024, 3 de mayo de 2024
static DAY_FIRST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})(?:er|\.)?\s+(?:de\s+)?(\p{L}+)\.?\s+(?:de\s+)?(\d{4})\b")
        .expect("static regex")
});

static DAYS_LEFT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d{1,3})\s*days?\s*(?:to go|left|remaining)\b|残り\s*(\d{1,3})\s*日|(\d{1,3})\s*일\s*남음")
        .expect("static regex")
});

#[derive(Debug, Clone, PartialEq)]
pub struct DateMatch {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

fn number(caps: &Captures, i: usize) -> Option<u32> {
    caps.get(i)?.as_str().parse().ok()
}

fn valid(month: u32, day: u32) -> bool {
    (1..=12).contains(&month) && (1..=31).contains(&day)
}

fn to_match(caps: &Captures) -> Option<DateMatch> {
    let whole = caps.get(0)?;
    Some(DateMatch {
        text: whole.as_str().trim().to_string(),
        start: whole.start(),
        end: whole.end(),
    })
}

/// First calendar date written in `text`, in any accepted format
pub fn find_date(text: &str, vocabulary: &Vocabulary) -> Option<DateMatch> {
    let mut found: Vec<DateMatch> = Vec::new();

    for caps in ISO_DATE.captures_iter(text).chain(CJK_DATE.captures_iter(text)) {
        if let (Some(month), Some(day)) = (number(&caps, 2), number(&caps, 3)) {
            if valid(month, day) {
                found.extend(to_match(&caps));
            }
        }
    }

    for caps in NUMERIC_DATE.captures_iter(text) {
        if let (Some(a), Some(b)) = (number(&caps, 1), number(&caps, 2)) {
            if valid(a, b) || valid(b, a) {
                found.extend(to_match(&caps));
            }
        }
    }

    for caps in MONTH_FIRST.captures_iter(text) {
        let month = caps.get(1).and_then(|m| vocabulary.month(m.as_str()));
        if let (Some(month), Some(day)) = (month, number(&caps, 2)) {
            if valid(month, day) {
                found.extend(to_match(&caps));
            }
        }
    }

    for caps in DAY_FIRST.captures_iter(text) {
        let month = caps.get(2).and_then(|m| vocabulary.month(m.as_str()));
        if let (Some(month), Some(day)) = (month, number(&caps, 1)) {
            if valid(month, day) {
                found.extend(to_match(&caps));
            }
        }
    }

    found.into_iter().min_by_key(|m| m.start)
}

/// "14 days to go" style countdowns
pub fn find_days_left(text: &str) -> Option<DateMatch> {
    DAYS_LEFT.captures(text).and_then(|caps| to_match(&caps))
}
