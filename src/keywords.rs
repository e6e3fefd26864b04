//! Keyword tables for the base SQL grammar and the ClickHouse dialect.
//!
//! Both tables are built once on first use and are read-only afterwards.

use std::collections::HashMap;
use std::time::Duration;

use once_cell::sync::Lazy;

use crate::token::TokenKind;

/// Lowercase spellings mapped to token kinds, plus the multi-word hints the
/// lexer uses to match keywords such as `GROUP BY`.
#[derive(Debug, Clone)]
pub struct KeywordTable {
    words: HashMap<&'static str, TokenKind>,
    /// first word -> total number of words in the longest keyword it starts
    spaced: HashMap<&'static str, usize>,
}

impl KeywordTable {
    pub fn new() -> Self {
        Self { words: HashMap::new(), spaced: HashMap::new() }
    }

    /// Registers a keyword. Multi-word spellings (single spaces) also register a
    /// spaced hint for their first word.
    pub fn insert(&mut self, spelling: &'static str, kind: TokenKind) -> &mut Self {
        let count = spelling.split(' ').count();
        if count > 1 {
            if let Some(first) = spelling.split(' ').next() {
                let hint = self.spaced.entry(first).or_insert(0);
                *hint = (*hint).max(count);
            }
        }
        self.words.insert(spelling, kind);
        self
    }

    /// Looks up an already-lowercased spelling.
    pub fn get(&self, spelling: &str) -> Option<TokenKind> {
        self.words.get(spelling).copied()
    }

    /// Number of words the longest keyword starting with `first` spans.
    pub fn spaced_hint(&self, first: &str) -> Option<usize> {
        self.spaced.get(first).copied()
    }
}

impl Default for KeywordTable {
    fn default() -> Self {
        Self::new()
    }
}

fn base_sql_keywords() -> KeywordTable {
    let mut table = KeywordTable::new();
    table
        .insert("with", TokenKind::With)
        .insert("select", TokenKind::Select)
        .insert("insert", TokenKind::Insert)
        .insert("update", TokenKind::Update)
        .insert("delete", TokenKind::Delete)
        .insert("truncate", TokenKind::Truncate)
        .insert("alter", TokenKind::Alter)
        .insert("create", TokenKind::Create)
        .insert("from", TokenKind::From)
        .insert("join", TokenKind::Join)
        .insert("where", TokenKind::Where)
        .insert("between", TokenKind::Between)
        .insert("group by", TokenKind::GroupBy)
        .insert("order by", TokenKind::OrderBy)
        .insert("limit", TokenKind::Limit)
        .insert("having", TokenKind::Having)
        .insert("union", TokenKind::Union)
        .insert("into outfile", TokenKind::IntoOutfile)
        .insert("null", TokenKind::Null)
        .insert("nan", TokenKind::NaN)
        .insert("as", TokenKind::As)
        .insert("and", TokenKind::LogicalAnd)
        .insert("or", TokenKind::LogicalOr)
        .insert("not", TokenKind::Inequality)
        .insert("now()", TokenKind::NowFunc)
        .insert("count", TokenKind::Count)
        .insert("asc", TokenKind::Asc)
        .insert("desc", TokenKind::Desc);
    table
}

/// The base SQL keyword table.
pub static SQL_KEYWORDS: Lazy<KeywordTable> = Lazy::new(base_sql_keywords);

/// The base SQL table extended with ClickHouse spellings.
pub static CLICKHOUSE_KEYWORDS: Lazy<KeywordTable> = Lazy::new(|| {
    let mut table = base_sql_keywords();
    table
        .insert("prewhere", TokenKind::PreWhere)
        .insert("format", TokenKind::Format)
        .insert("settings", TokenKind::Settings)
        .insert("with totals", TokenKind::WithTotals)
        .insert("union all", TokenKind::Union)
        .insert("interval", TokenKind::Interval)
        .insert("week", TokenKind::Week)
        .insert("day", TokenKind::Day)
        .insert("hour", TokenKind::Hour)
        .insert("minute", TokenKind::Minute)
        .insert("second", TokenKind::Second)
        .insert("intdiv", TokenKind::IntDiv)
        .insert("toint32", TokenKind::ToInt32)
        .insert("touint32", TokenKind::ToInt32)
        .insert("tostartofinterval", TokenKind::ToStartOfInterval)
        .insert("todate", TokenKind::ToDateFunc)
        .insert("todatetime", TokenKind::ToDateFunc);
    for (name, _) in TO_START_OF_STEPS {
        table.insert(name, TokenKind::ToStartOf);
    }
    table
});

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// Bucket width of each `toStartOf*` function, keyed by lowercase name.
const TO_START_OF_STEPS: [(&str, u64); 9] = [
    ("tomonday", 7 * DAY),
    ("tostartofweek", 7 * DAY),
    ("tostartofday", DAY),
    ("tostartofhour", HOUR),
    ("tostartofminute", MINUTE),
    ("tostartoffiveminute", 5 * MINUTE),
    ("tostartoffiveminutes", 5 * MINUTE),
    ("tostartoftenminutes", 10 * MINUTE),
    ("tostartoffifteenminutes", 15 * MINUTE),
];

/// Step implied by a `toStartOf*` function name (case-insensitive).
pub fn to_start_of_step(name: &str) -> Option<Duration> {
    let lowered = name.to_ascii_lowercase();
    TO_START_OF_STEPS
        .iter()
        .find(|(n, _)| *n == lowered)
        .map(|(_, secs)| Duration::from_secs(*secs))
}

/// Duration of one `INTERVAL` unit.
pub fn interval_unit(kind: TokenKind) -> Option<Duration> {
    let secs = match kind {
        TokenKind::Week => 7 * DAY,
        TokenKind::Day => DAY,
        TokenKind::Hour => HOUR,
        TokenKind::Minute => MINUTE,
        TokenKind::Second => 1,
        _ => return None,
    };
    Some(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spaced_hints_are_derived_from_multi_word_keywords() {
        assert_eq!(SQL_KEYWORDS.spaced_hint("group"), Some(2));
        assert_eq!(SQL_KEYWORDS.spaced_hint("into"), Some(2));
        assert_eq!(SQL_KEYWORDS.spaced_hint("with"), None);
        assert_eq!(CLICKHOUSE_KEYWORDS.spaced_hint("with"), Some(2));
        assert_eq!(CLICKHOUSE_KEYWORDS.spaced_hint("union"), Some(2));
    }

    #[test]
    fn test_dialect_table_extends_base() {
        assert_eq!(CLICKHOUSE_KEYWORDS.get("select"), Some(TokenKind::Select));
        assert_eq!(CLICKHOUSE_KEYWORDS.get("prewhere"), Some(TokenKind::PreWhere));
        assert_eq!(SQL_KEYWORDS.get("prewhere"), None);
        assert_eq!(CLICKHOUSE_KEYWORDS.get("tostartoffiveminute"), Some(TokenKind::ToStartOf));
    }

    #[test]
    fn test_step_tables() {
        assert_eq!(to_start_of_step("toStartOfFiveMinute"), Some(Duration::from_secs(300)));
        assert_eq!(to_start_of_step("toMonday"), Some(Duration::from_secs(604_800)));
        assert_eq!(to_start_of_step("toStartOfYear"), None);
        assert_eq!(interval_unit(TokenKind::Hour), Some(Duration::from_secs(3600)));
        assert_eq!(interval_unit(TokenKind::Identifier), None);
    }
}
