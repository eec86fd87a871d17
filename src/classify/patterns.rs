//! Regex rules for amounts, percentages and supporter counts.
//!
//! Currency markers and supporter keywords come from the vocabulary, so the
//! alternations are compiled once per classifier rather than as statics.

use super::vocabulary::{contains_keyword, fold_case, Vocabulary};
use crate::error::ExtractError;
use crate::model::MatchStrength;
use once_cell::sync::Lazy;
use regex::Regex;

/// Digits of a monetary figure: grouped with separators, or a plain run,
/// with an optional minor unit
const NUMBER: &str = r"\d{1,3}(?:[,.]\d{3})+(?:\.\d{1,2})?|\d+(?:\.\d{1,2})?";

static PERCENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,5}(?:[.,]\d{1,2})?)\s?%").expect("static regex"));

static WELL_FORMED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\d{1,3}(?:,\d{3})+|\d{1,3}(?:\.\d{3})+|\d{1,4})(?:[.,]\d{1,2})?$")
        .expect("static regex")
});

static BARE_COUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,3}(?:,\d{3})+$|^\d+$").expect("static regex"));

/// A currency amount found inside a span's text
#[derive(Debug, Clone, PartialEq)]
pub struct AmountMatch {
    /// Marker and digits as written, e.g. "$15,000" or "1,200円"
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub marker: String,
    pub strength: MatchStrength,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PercentMatch {
    pub text: String,
    pub start: usize,
    pub end: usize,
    /// "48% OFF": a price reduction, not an achievement rate
    pub discount: bool,
}

pub struct Patterns {
    amount_prefix: Regex,
    amount_suffix: Regex,
    supporters_after: Regex,
    supporters_before: Regex,
    discount_keywords: Vec<String>,
}

/// Regex alternation of literal terms, longest first so "NT$" wins over "$"
fn alternation(terms: impl IntoIterator<Item = impl AsRef<str>>) -> String {
    let mut terms: Vec<String> = terms
        .into_iter()
        .map(|t| t.as_ref().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    terms.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then(a.cmp(b)));
    terms.dedup();
    terms
        .iter()
        .map(|t| regex::escape(t))
        .collect::<Vec<_>>()
        .join("|")
}

fn compile(pattern: &str) -> Result<Regex, ExtractError> {
    Regex::new(pattern)
        .map_err(|e| ExtractError::ConfigError(format!("vocabulary produced a bad pattern: {}", e)))
}

impl Patterns {
    pub fn new(vocabulary: &Vocabulary) -> Result<Self, ExtractError> {
        let markers = alternation(vocabulary.currencies.iter().map(|c| c.symbol.as_str()));
        let prefixes = alternation(
            vocabulary
                .currencies
                .iter()
                .filter(|c| !c.suffix_only)
                .map(|c| c.symbol.as_str()),
        );
        let supporters = alternation(&vocabulary.supporter_keywords);
        if prefixes.is_empty() || supporters.is_empty() {
            return Err(ExtractError::ConfigError(
                "vocabulary needs currency markers and supporter keywords".to_string(),
            ));
        }

        Ok(Self {
            amount_prefix: compile(&format!(r"(?i)(?P<marker>{})\s?(?P<number>{})", prefixes, NUMBER))?,
            amount_suffix: compile(&format!(r"(?i)(?P<number>{})\s?(?P<marker>{})", NUMBER, markers))?,
            supporters_after: compile(&format!(
                r"(?i)(?P<count>\d{{1,3}}(?:,\d{{3}})+|\d+)\s?(?:{})",
                supporters
            ))?,
            supporters_before: compile(&format!(
                r"(?i)(?:{})\s*[:：]?\s*(?P<count>\d{{1,3}}(?:,\d{{3}})+|\d+)",
                supporters
            ))?,
            discount_keywords: vocabulary.discount_keywords.clone(),
        })
    }

    /// Currency amounts in `text`, excluding anything inside a percentage
    pub fn amounts(&self, text: &str) -> Vec<AmountMatch> {
        let percents = percentages_in(text, &[]);
        let mut found: Vec<AmountMatch> = Vec::new();

        for (regex, marker_first) in [(&self.amount_prefix, true), (&self.amount_suffix, false)] {
            for caps in regex.captures_iter(text) {
                let (Some(whole), Some(marker), Some(number)) =
                    (caps.get(0), caps.name("marker"), caps.name("number"))
                else {
                    continue;
                };
                // alphabetic codes need a word boundary on their outer side
                let outer_ok = if marker_first {
                    !text[..whole.start()].chars().next_back().is_some_and(char::is_alphabetic)
                        || !marker.as_str().chars().all(|c| c.is_ascii_alphabetic())
                } else {
                    !text[whole.end()..].chars().next().is_some_and(char::is_alphabetic)
                        || !marker.as_str().chars().all(|c| c.is_ascii_alphabetic())
                };
                let overlaps_percent = percents
                    .iter()
                    .any(|p| whole.start() < p.end && p.start < whole.end());
                let overlaps_found = found
                    .iter()
                    .any(|a| whole.start() < a.end && a.start < whole.end());
                if !outer_ok || overlaps_percent || overlaps_found {
                    continue;
                }
                if number.as_str().chars().all(|c| c == '0' || !c.is_ascii_digit()) {
                    continue;
                }

                found.push(AmountMatch {
                    text: whole.as_str().to_string(),
                    start: whole.start(),
                    end: whole.end(),
                    marker: marker.as_str().to_string(),
                    strength: if WELL_FORMED.is_match(number.as_str()) {
                        MatchStrength::Exact
                    } else {
                        MatchStrength::Partial
                    },
                });
            }
        }

        found.sort_by_key(|a| a.start);
        found
    }

    /// Percentages in `text`, with discounts flagged
    pub fn percentages(&self, text: &str) -> Vec<PercentMatch> {
        percentages_in(text, &self.discount_keywords)
    }

    /// Supporter count in `text` when a supporter keyword sits next to it
    pub fn supporters(&self, text: &str) -> Option<(String, usize, usize)> {
        self.supporters_after
            .captures(text)
            .or_else(|| self.supporters_before.captures(text))
            .and_then(|caps| caps.name("count"))
            .map(|m| (m.as_str().to_string(), m.start(), m.end()))
    }

    /// Whether the whole text is a plain count such as "1,036"
    pub fn is_bare_count(text: &str) -> bool {
        BARE_COUNT.is_match(text.trim())
    }
}

fn percentages_in(text: &str, discount_keywords: &[String]) -> Vec<PercentMatch> {
    PERCENT
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let number = caps.get(1)?;
            let after = fold_case(text[whole.end()..].trim_start());
            let discount = discount_keywords
                .iter()
                .any(|kw| after.starts_with(&fold_case(kw)) && contains_keyword(&after, kw));
            Some(PercentMatch {
                text: format!("{}%", number.as_str()),
                start: whole.start(),
                end: whole.end(),
                discount,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns() -> Patterns {
        Patterns::new(&Vocabulary::default()).unwrap()
    }

    fn amount_texts(text: &str) -> Vec<String> {
        patterns().amounts(text).into_iter().map(|a| a.text).collect()
    }

    #[test]
    fn test_prefix_and_suffix_amounts() {
        assert_eq!(amount_texts("Goal: $15,000"), vec!["$15,000"]);
        assert_eq!(amount_texts("支援総額 1,234,000円"), vec!["1,234,000円"]);
        assert_eq!(amount_texts("NT$120,000 of NT$50,000"), vec!["NT$120,000", "NT$50,000"]);
        assert_eq!(amount_texts("€ 3.200 raised"), vec!["€ 3.200"]);
    }

    #[test]
    fn test_word_currencies_follow_the_number() {
        let p = patterns();
        let found = p.amounts("Total support 1,234,000 yen");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].text, "1,234,000 yen");
        assert_eq!(found[0].marker, "yen");
        assert_eq!(amount_texts("raised 2,500 dollars"), vec!["2,500 dollars"]);
        assert!(amount_texts("we won 3 awards").is_empty());
        assert!(amount_texts("1,200 yenta").is_empty());
    }

    #[test]
    fn test_percent_is_not_an_amount() {
        assert!(amount_texts("150%").is_empty());
        assert!(amount_texts("150% funded").is_empty());
    }

    #[test]
    fn test_codes_need_word_boundaries() {
        assert!(amount_texts("SUSD12").is_empty());
        assert_eq!(amount_texts("USD 1,200"), vec!["USD 1,200"]);
    }

    #[test]
    fn test_unseparated_long_amount_is_partial() {
        let found = patterns().amounts("$265400");
        assert_eq!(found[0].strength, MatchStrength::Partial);
        let found = patterns().amounts("$265,400");
        assert_eq!(found[0].strength, MatchStrength::Exact);
    }

    #[test]
    fn test_discount_percentages_flagged() {
        let p = patterns();
        assert!(p.percentages("48% OFF")[0].discount);
        assert!(!p.percentages("150% funded")[0].discount);
        assert!(!p.percentages("20% offered")[0].discount);
    }

    #[test]
    fn test_supporter_counts() {
        let p = patterns();
        assert_eq!(p.supporters("1,036 backers").map(|s| s.0), Some("1,036".to_string()));
        assert_eq!(p.supporters("Backers: 88").map(|s| s.0), Some("88".to_string()));
        assert_eq!(p.supporters("1,036人が支援").map(|s| s.0), Some("1,036".to_string()));
        assert_eq!(p.supporters("Save The Ocean"), None);
        assert!(Patterns::is_bare_count("1,036"));
        assert!(!Patterns::is_bare_count("$1,036"));
    }
}
