//! Keyword data the classifier matches against.
//!
//! Nothing locale- or platform-specific is hard-coded in the rules; it all
//! lives here and can be replaced from a TOML file.

use crate::error::ExtractError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformName {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusTerm {
    pub status: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencySymbol {
    pub symbol: String,
    pub code: String,
    /// Symbol shared by several currencies ("$", "¥")
    #[serde(default)]
    pub ambiguous: bool,
    /// Word forms such as "yen" only ever follow the number
    #[serde(default)]
    pub suffix_only: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vocabulary {
    pub platforms: Vec<PlatformName>,
    /// Checked in order; the first status with a matching keyword wins
    pub statuses: Vec<StatusTerm>,
    pub goal_keywords: Vec<String>,
    pub current_keywords: Vec<String>,
    pub supporter_keywords: Vec<String>,
    pub deadline_keywords: Vec<String>,
    pub start_keywords: Vec<String>,
    pub discount_keywords: Vec<String>,
    /// Currency markers; prefixes and suffixes share the table
    pub currencies: Vec<CurrencySymbol>,
    /// Lowercased month name or abbreviation to month number
    pub months: BTreeMap<String, u32>,
    /// UI boilerplate never chosen as a title
    pub title_denylist: Vec<String>,
    pub organization_suffixes: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn platform(name: &str, aliases: &[&str]) -> PlatformName {
    PlatformName {
        name: name.to_string(),
        aliases: strings(aliases),
    }
}

fn status(status: &str, keywords: &[&str]) -> StatusTerm {
    StatusTerm {
        status: status.to_string(),
        keywords: strings(keywords),
    }
}

fn currency(symbol: &str, code: &str, ambiguous: bool) -> CurrencySymbol {
    CurrencySymbol {
        symbol: symbol.to_string(),
        code: code.to_string(),
        ambiguous,
        suffix_only: false,
    }
}

fn currency_word(word: &str, code: &str, ambiguous: bool) -> CurrencySymbol {
    CurrencySymbol {
        suffix_only: true,
        ..currency(word, code, ambiguous)
    }
}

const MONTHS_EN: [&str; 12] = [
    "january", "february", "march", "april", "may", "june", "july", "august", "september",
    "october", "november", "december",
];
const MONTHS_FR: [&str; 12] = [
    "janvier", "février", "mars", "avril", "mai", "juin", "juillet", "août", "septembre",
    "octobre", "novembre", "décembre",
];
const MONTHS_DE: [&str; 12] = [
    "januar", "februar", "märz", "april", "mai", "juni", "juli", "august", "september",
    "oktober", "november", "dezember",
];
const MONTHS_ES: [&str; 12] = [
    "enero", "febrero", "marzo", "abril", "mayo", "junio", "julio", "agosto", "septiembre",
    "octubre", "noviembre", "diciembre",
];

fn default_months() -> BTreeMap<String, u32> {
    let mut months = BTreeMap::new();
    for table in [MONTHS_EN, MONTHS_FR, MONTHS_DE, MONTHS_ES] {
        for (i, name) in table.iter().enumerate() {
            months.insert(name.to_string(), i as u32 + 1);
        }
    }
    for (i, name) in MONTHS_EN.iter().enumerate() {
        months.insert(name.chars().take(3).collect(), i as u32 + 1);
    }
    months.insert("sept".to_string(), 9);
    // accent-less spellings OCR tends to produce
    months.insert("fevrier".to_string(), 2);
    months.insert("aout".to_string(), 8);
    months.insert("decembre".to_string(), 12);
    months.insert("maerz".to_string(), 3);
    months
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self {
            platforms: vec![
                platform("Kickstarter", &[]),
                platform("Indiegogo", &["indie gogo"]),
                platform("GoFundMe", &["go fund me"]),
                platform("Makuake", &["マクアケ"]),
                platform("CAMPFIRE", &["キャンプファイヤー"]),
                platform("READYFOR", &["レディーフォー"]),
                platform("GREEN FUNDING", &["greenfunding"]),
                platform("Wadiz", &["와디즈"]),
                platform("Tumblbug", &["텀블벅"]),
                platform("zeczec", &["嘖嘖"]),
                platform("flyingV", &["flying v"]),
                platform("Patreon", &[]),
                platform("Wefunder", &[]),
                platform("SeedInvest", &[]),
                platform("FundRazr", &[]),
                platform("Crowd Supply", &["crowdsupply"]),
                platform("Ulule", &[]),
            ],
            statuses: vec![
                status("funded", &["successfully funded", "funded", "successful", "goal reached", "目標達成", "達成", "成功", "펀딩 성공"]),
                status("cancelled", &["cancelled", "canceled", "unsuccessful", "suspended", "中止", "취소"]),
                status("ended", &["ended", "closed", "finished", "終了", "已結束", "结束", "종료"]),
                status("live", &["live", "active", "ongoing", "in progress", "進行中", "募集中", "진행중"]),
            ],
            goal_keywords: strings(&[
                "goal", "target", "funding goal", "目標金額", "目標", "目标", "목표", "objectif",
                "ziel", "objetivo",
            ]),
            current_keywords: strings(&[
                "raised", "pledged", "funded", "collected", "current", "支援総額", "現在",
                "现在", "集まっている金額", "已籌", "已筹", "모인금액", "모금액", "collectés",
                "récoltés", "gesammelt", "recaudado",
            ]),
            supporter_keywords: strings(&[
                "backers", "backer", "supporters", "supporter", "funders", "contributors",
                "donors", "donations", "支援者", "支持者", "サポーター", "人", "명", "서포터",
                "contributeurs", "unterstützer", "patrocinadores",
            ]),
            deadline_keywords: strings(&[
                "ends", "ending", "end", "deadline", "closes", "until", "終了日", "締切", "截止",
                "結束", "结束", "마감",
            ]),
            start_keywords: strings(&[
                "launched", "launch", "started", "starts", "start", "began", "開始", "开始",
                "시작",
            ]),
            discount_keywords: strings(&["off", "discount", "割引", "할인", "折"]),
            currencies: vec![
                currency("NT$", "TWD", false),
                currency("HK$", "HKD", false),
                currency("US$", "USD", false),
                currency("S$", "SGD", false),
                currency("$", "USD", true),
                currency("¥", "JPY", true),
                currency("円", "JPY", false),
                currency("€", "EUR", false),
                currency("£", "GBP", false),
                currency("₩", "KRW", false),
                currency("원", "KRW", false),
                currency("₹", "INR", false),
                currency("元", "CNY", false),
                currency("USD", "USD", false),
                currency("JPY", "JPY", false),
                currency("EUR", "EUR", false),
                currency("GBP", "GBP", false),
                currency("KRW", "KRW", false),
                currency("TWD", "TWD", false),
                currency("CNY", "CNY", false),
                currency("HKD", "HKD", false),
                currency("SGD", "SGD", false),
                currency("INR", "INR", false),
                currency_word("yen", "JPY", false),
                currency_word("won", "KRW", false),
                currency_word("yuan", "CNY", false),
                currency_word("rmb", "CNY", false),
                currency_word("euros", "EUR", false),
                currency_word("euro", "EUR", false),
                currency_word("pounds", "GBP", false),
                currency_word("rupees", "INR", false),
                currency_word("dollars", "USD", true),
                currency_word("dollar", "USD", true),
            ],
            months: default_months(),
            title_denylist: strings(&[
                "back this project", "back it", "support this project", "support", "share",
                "follow", "log in", "login", "sign up", "sign in", "menu", "home", "search",
                "remind me", "campaign", "story", "faq", "updates", "comments", "community",
                "rewards", "pledge", "select this reward", "learn more", "see more",
                "read more", "funding period", "all or nothing", "flexible goal",
                "プロジェクトを支援する", "支援する", "シェア", "ログイン", "후원하기",
            ]),
            organization_suffixes: strings(&[
                "inc", "inc.", "llc", "ltd", "ltd.", "co., ltd.", "corp", "corp.",
                "corporation", "gmbh", "s.a.", "sas", "pty ltd", "株式会社", "有限会社",
                "合同会社", "有限公司", "股份有限公司", "주식회사", "(주)",
            ]),
        }
    }
}

impl Vocabulary {
    /// Load a vocabulary from TOML; missing tables keep their defaults
    pub fn load(path: &Path) -> Result<Self, ExtractError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ExtractError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content).map_err(|e| {
            ExtractError::ConfigError(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    pub fn currency(&self, marker: &str) -> Option<&CurrencySymbol> {
        self.currencies
            .iter()
            .find(|c| c.symbol.eq_ignore_ascii_case(marker))
    }

    pub fn month(&self, name: &str) -> Option<u32> {
        self.months
            .get(fold_case(name.trim_end_matches('.')).as_str())
            .copied()
    }

    /// Every classification keyword, for recognizing label-only spans
    pub fn all_keywords(&self) -> impl Iterator<Item = &str> {
        self.goal_keywords
            .iter()
            .chain(&self.current_keywords)
            .chain(&self.supporter_keywords)
            .chain(&self.deadline_keywords)
            .chain(&self.start_keywords)
            .chain(self.statuses.iter().flat_map(|s| &s.keywords))
            .map(String::as_str)
    }
}

/// Lowercase without changing byte offsets, so match positions found in the
/// folded text index the original text too
pub fn fold_case(text: &str) -> String {
    text.chars()
        .map(|c| {
            let mut lower = c.to_lowercase();
            match (lower.next(), lower.next()) {
                (Some(l), None) if l.len_utf8() == c.len_utf8() => l,
                _ => c,
            }
        })
        .collect()
}

/// Byte ranges of `keyword` in already folded `text`. Keywords made of
/// letters must sit on word boundaries; CJK keywords match anywhere.
pub fn keyword_matches(folded: &str, keyword: &str) -> Vec<(usize, usize)> {
    let keyword = fold_case(keyword);
    if keyword.is_empty() {
        return Vec::new();
    }
    let bounded = keyword.chars().all(|c| c.is_ascii() || is_latin_letter(c));

    folded
        .match_indices(keyword.as_str())
        .map(|(start, m)| (start, start + m.len()))
        .filter(|&(start, end)| {
            if !bounded {
                return true;
            }
            let before = folded[..start].chars().next_back();
            let after = folded[end..].chars().next();
            !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
        })
        .collect()
}

fn is_latin_letter(c: char) -> bool {
    matches!(c, 'À'..='ɏ')
}

pub fn contains_keyword(folded: &str, keyword: &str) -> bool {
    !keyword_matches(folded, keyword).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_keyword_boundaries() {
        assert!(contains_keyword("now live!", "live"));
        assert!(!contains_keyword("free delivery", "live"));
        assert!(contains_keyword("1,036人が支援", "人"));
        assert!(!contains_keyword("currency", "current"));
    }

    #[test]
    fn test_month_tables() {
        let vocab = Vocabulary::default();
        assert_eq!(vocab.month("March"), Some(3));
        assert_eq!(vocab.month("Sep."), Some(9));
        assert_eq!(vocab.month("décembre"), Some(12));
        assert_eq!(vocab.month("März"), Some(3));
        assert_eq!(vocab.month("mayo"), Some(5));
        assert_eq!(vocab.month("backers"), None);
    }

    #[test]
    fn test_fold_case_keeps_offsets() {
        let text = "GOAL: ¥1,200 İ";
        assert_eq!(fold_case(text).len(), text.len());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[[platforms]]\nname = \"Kibidango\"\naliases = [\"きびだんご\"]"
        )
        .unwrap();

        let vocab = Vocabulary::load(file.path()).unwrap();
        assert_eq!(vocab.platforms.len(), 1);
        assert_eq!(vocab.platforms[0].name, "Kibidango");
        assert_eq!(vocab.goal_keywords, Vocabulary::default().goal_keywords);
    }
}
