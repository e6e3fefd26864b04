//! States shared by every SQL dialect, and the field-list splitters they use.

use crate::error::ErrorKind;
use crate::parser::{DecisionPoint, DecisionSet, Field, Parser, RunState, StateFn};
use crate::token::{Token, TokenKind};

pub const FIND_VERB: StateFn = StateFn::new("FindVerb", find_verb);
pub const AT_SELECT: StateFn = StateFn::new("AtSelect", at_select);
pub const AT_FROM: StateFn = StateFn::new("AtFrom", at_from);
pub const AT_JOIN: StateFn = StateFn::new("AtJoin", at_join);
pub const AT_WHERE: StateFn = StateFn::new("AtWhere", at_where);
pub const AT_GROUP_BY: StateFn = StateFn::new("AtGroupBy", at_group_by);
pub const AT_HAVING: StateFn = StateFn::new("AtHaving", at_having);
pub const AT_ORDER_BY: StateFn = StateFn::new("AtOrderBy", at_order_by);
pub const AT_LIMIT: StateFn = StateFn::new("AtLimit", at_limit);
pub const UNSUPPORTED_KEYWORD: StateFn = StateFn::new("UnsupportedKeyword", unsupported_keyword);
pub const UNSUPPORTED_VERB: StateFn = StateFn::new("UnsupportedVerb", unsupported_verb);
pub const UNSUPPORTED_CLAUSE: StateFn = StateFn::new("UnsupportedClause", unsupported_clause);
pub const UNEXPECTED_TOKEN: StateFn = StateFn::new("UnexpectedToken", unexpected_token);

pub(crate) fn find_verb_decisions() -> DecisionSet {
    DecisionSet::from([
        (TokenKind::Space, FIND_VERB),
        (TokenKind::Comment, FIND_VERB),
        (TokenKind::Select, AT_SELECT),
        (TokenKind::With, UNSUPPORTED_CLAUSE),
        (TokenKind::Insert, UNSUPPORTED_VERB),
        (TokenKind::Update, UNSUPPORTED_VERB),
        (TokenKind::Delete, UNSUPPORTED_VERB),
        (TokenKind::Truncate, UNSUPPORTED_VERB),
        (TokenKind::Alter, UNSUPPORTED_VERB),
        (TokenKind::Create, UNSUPPORTED_VERB),
    ])
}

pub(crate) fn select_query_keywords() -> DecisionSet {
    DecisionSet::from([
        (TokenKind::From, AT_FROM),
        (TokenKind::Join, AT_JOIN),
        (TokenKind::Where, AT_WHERE),
        (TokenKind::GroupBy, AT_GROUP_BY),
        (TokenKind::Having, AT_HAVING),
        (TokenKind::OrderBy, AT_ORDER_BY),
        (TokenKind::Limit, AT_LIMIT),
        (TokenKind::Union, UNSUPPORTED_KEYWORD),
        (TokenKind::IntoOutfile, UNSUPPORTED_KEYWORD),
    ])
}

pub type KindCheck = fn(TokenKind) -> bool;

/// How a clause body is cut into fields.
#[derive(Clone, Copy)]
pub struct Splitter {
    pub is_delimiter: KindCheck,
    pub is_breakable: KindCheck,
    pub is_continuable: KindCheck,
    /// emit each delimiter as a field of its own instead of dropping it
    pub isolate_delimiter: bool,
}

/// Comma separated expressions, ending at the next clause keyword.
pub const FIELD_LIST: Splitter = Splitter {
    is_delimiter: is_comma,
    is_breakable: TokenKind::is_non_verb_primary_keyword,
    is_continuable: TokenKind::is_space_or_comment,
    isolate_delimiter: false,
};

/// Predicates interleaved with their AND/OR conjunctions.
pub const PREDICATE_LIST: Splitter = Splitter {
    is_delimiter: TokenKind::is_logical_operator,
    is_breakable: is_where_breakable,
    is_continuable: TokenKind::is_space_or_comment,
    isolate_delimiter: true,
};

fn is_comma(kind: TokenKind) -> bool {
    kind == TokenKind::Comma
}

fn is_where_breakable(kind: TokenKind) -> bool {
    kind != TokenKind::Between && kind.is_non_verb_primary_keyword()
}

/// Reads one field. Delimiters and clause keywords only count at parenthesis
/// depth 0. Returns the field and whether a delimiter ended it.
pub fn get_field<'a>(rs: &mut RunState<'a>, splitter: Splitter) -> (Field<'a>, bool) {
    let mut parts = Vec::with_capacity(16);
    let mut depth = 0i32;
    let mut read = 0usize;
    loop {
        let upcoming = rs.peek();
        if read > 0 && depth == 0 && (splitter.is_delimiter)(upcoming.kind) {
            if !splitter.isolate_delimiter {
                rs.next();
            }
            return (parts, true);
        }
        let token = rs.next();
        read += 1;
        if splitter.isolate_delimiter && read == 1 && (splitter.is_delimiter)(token.kind) {
            return (vec![token], true);
        }
        if token.kind.is_breakable() {
            return (parts, false);
        }
        if (splitter.is_continuable)(token.kind) {
            continue;
        }
        match token.kind {
            TokenKind::LeftParen => depth += 1,
            TokenKind::RightParen => depth -= 1,
            _ => {}
        }
        if depth == 0 && (splitter.is_breakable)(token.kind) {
            return (parts, (splitter.is_delimiter)(token.kind));
        }
        parts.push(token);
    }
}

/// Reads fields until the clause ends. The current token must be `allowed`.
pub fn get_field_list<'a>(
    rs: &mut RunState<'a>,
    allowed: TokenKind,
    not_at: ErrorKind,
    splitter: Splitter,
) -> Vec<Field<'a>> {
    if rs.current().kind != allowed {
        rs.fail(not_at);
        return Vec::new();
    }
    let mut fields = Vec::with_capacity(8);
    loop {
        let (parts, more) = get_field(rs, splitter);
        if parts.is_empty() {
            break;
        }
        fields.push(parts);
        if !more {
            break;
        }
    }
    fields
}

/// Flat list of column tokens, as in GROUP BY. Only names and positional
/// numbers are kept; the list ends at the next clause keyword or `;`.
pub fn get_columns_list<'a>(rs: &mut RunState<'a>) -> Vec<Token<'a>> {
    let mut columns = Vec::new();
    loop {
        let token = rs.next();
        if token.kind.is_breakable() || token.kind.is_primary_keyword() || is_terminator(&token) {
            break;
        }
        if matches!(token.kind, TokenKind::Identifier | TokenKind::Number) {
            columns.push(token);
        }
    }
    columns
}

/// The `;` that ends a statement.
pub fn is_terminator(token: &Token<'_>) -> bool {
    token.kind == TokenKind::Char && token.text == ";"
}

/// Rejoins `x BETWEEN a` with the `AND` and `b` fields the predicate splitter
/// cut it into.
pub fn merge_between_groups(fields: Vec<Field<'_>>) -> Vec<Field<'_>> {
    let mut merged = Vec::with_capacity(fields.len());
    let mut iter = fields.into_iter().peekable();
    while let Some(mut field) = iter.next() {
        let joined_by_and = iter
            .peek()
            .is_some_and(|next| next.len() == 1 && next[0].kind == TokenKind::LogicalAnd);
        if joined_by_and && has_top_level_between(&field) {
            if let Some(and) = iter.next() {
                field.extend(and);
            }
            if let Some(upper) = iter.next() {
                field.extend(upper);
            }
        }
        merged.push(field);
    }
    merged
}

fn has_top_level_between(field: &[Token<'_>]) -> bool {
    let mut depth = 0i32;
    for token in field {
        match token.kind {
            TokenKind::LeftParen => depth += 1,
            TokenKind::RightParen => depth -= 1,
            TokenKind::Between if depth == 0 => return true,
            _ => {}
        }
    }
    false
}

fn find_verb(p: &Parser, rs: &mut RunState<'_>) -> Option<StateFn> {
    rs.next();
    rs.next_state(Some(UNEXPECTED_TOKEN), p.decisions(DecisionPoint::FindVerb))
}

fn at_select(p: &Parser, rs: &mut RunState<'_>) -> Option<StateFn> {
    if rs.current().kind != TokenKind::Select {
        rs.fail(ErrorKind::NotAtSelect);
        return None;
    }
    rs.results_mut().verb = Some(TokenKind::Select);
    let fields = get_field_list(rs, TokenKind::Select, ErrorKind::NotAtSelect, FIELD_LIST);
    rs.results_mut().select_tokens = fields;
    if rs.error().is_some() {
        return None;
    }
    if rs.current().kind != TokenKind::From {
        rs.fail(ErrorKind::NotAtFrom);
        return None;
    }
    rs.next_state(None, p.decisions(DecisionPoint::SelectQueryKeywords))
}

fn at_from(p: &Parser, rs: &mut RunState<'_>) -> Option<StateFn> {
    get_field_list(rs, TokenKind::From, ErrorKind::NotAtFrom, FIELD_LIST);
    rs.next_state(None, p.decisions(DecisionPoint::SelectQueryKeywords))
}

fn at_join(p: &Parser, rs: &mut RunState<'_>) -> Option<StateFn> {
    get_field_list(rs, TokenKind::Join, ErrorKind::UnexpectedToken, FIELD_LIST);
    rs.next_state(None, p.decisions(DecisionPoint::SelectQueryKeywords))
}

fn at_where(p: &Parser, rs: &mut RunState<'_>) -> Option<StateFn> {
    let fields = get_field_list(rs, TokenKind::Where, ErrorKind::NotAtWhere, PREDICATE_LIST);
    rs.results_mut().where_tokens = Some(merge_between_groups(fields));
    rs.next_state(None, p.decisions(DecisionPoint::SelectQueryKeywords))
}

fn at_group_by(p: &Parser, rs: &mut RunState<'_>) -> Option<StateFn> {
    if rs.current().kind != TokenKind::GroupBy {
        rs.fail(ErrorKind::NotAtGroupBy);
        return None;
    }
    let columns = get_columns_list(rs);
    rs.results_mut().group_by_tokens = Some(columns);
    rs.next_state(None, p.decisions(DecisionPoint::SelectQueryKeywords))
}

fn at_having(p: &Parser, rs: &mut RunState<'_>) -> Option<StateFn> {
    get_field_list(rs, TokenKind::Having, ErrorKind::UnexpectedToken, PREDICATE_LIST);
    rs.next_state(None, p.decisions(DecisionPoint::SelectQueryKeywords))
}

fn at_order_by(p: &Parser, rs: &mut RunState<'_>) -> Option<StateFn> {
    get_field_list(rs, TokenKind::OrderBy, ErrorKind::UnexpectedToken, FIELD_LIST);
    rs.next_state(None, p.decisions(DecisionPoint::SelectQueryKeywords))
}

fn at_limit(p: &Parser, rs: &mut RunState<'_>) -> Option<StateFn> {
    get_field_list(rs, TokenKind::Limit, ErrorKind::UnexpectedToken, FIELD_LIST);
    rs.next_state(None, p.decisions(DecisionPoint::SelectQueryKeywords))
}

fn unsupported_keyword(_: &Parser, rs: &mut RunState<'_>) -> Option<StateFn> {
    rs.fail(ErrorKind::UnsupportedKeyword);
    None
}

fn unsupported_verb(_: &Parser, rs: &mut RunState<'_>) -> Option<StateFn> {
    rs.fail(ErrorKind::UnsupportedVerb);
    None
}

fn unsupported_clause(_: &Parser, rs: &mut RunState<'_>) -> Option<StateFn> {
    rs.fail(ErrorKind::UnsupportedClause);
    None
}

fn unexpected_token(_: &Parser, rs: &mut RunState<'_>) -> Option<StateFn> {
    rs.fail(ErrorKind::UnexpectedToken);
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keywords::CLICKHOUSE_KEYWORDS;
    use crate::lexer::Lexer;

    fn texts(fields: &[Field<'_>]) -> Vec<Vec<String>> {
        fields
            .iter()
            .map(|f| f.iter().map(|t| t.text.to_string()).collect())
            .collect()
    }

    /// Positions the run state on the first token and splits what follows.
    fn split(input: &str, splitter: Splitter) -> Vec<Vec<String>> {
        let tokens: Vec<_> = Lexer::with_keywords(input, &CLICKHOUSE_KEYWORDS).collect();
        let mut rs = RunState::new(&tokens);
        let first = rs.next();
        texts(&get_field_list(&mut rs, first.kind, ErrorKind::UnexpectedToken, splitter))
    }

    #[test]
    fn test_field_list_respects_parens() {
        let fields = split("SELECT intDiv(a, 60) * 60 AS t, count() FROM x", FIELD_LIST);
        assert_eq!(
            fields,
            vec![
                vec!["intDiv", "(", "a", ",", "60", ")", "*", "60", "AS", "t"],
                vec!["count", "(", ")"],
            ]
        );
    }

    #[test]
    fn test_predicate_list_isolates_conjunctions() {
        let fields = split("WHERE a = 1 AND (b = 2 OR c = 3) OR d < 4 GROUP BY a", PREDICATE_LIST);
        assert_eq!(
            fields,
            vec![
                vec!["a", "=", "1"],
                vec!["AND"],
                vec!["(", "b", "=", "2", "OR", "c", "=", "3", ")"],
                vec!["OR"],
                vec!["d", "<", "4"],
            ]
        );
    }

    #[test]
    fn test_between_is_merged_with_its_upper_bound() {
        let tokens: Vec<_> =
            Lexer::with_keywords("WHERE x BETWEEN 1 AND 2 AND y = 3", &CLICKHOUSE_KEYWORDS).collect();
        let mut rs = RunState::new(&tokens);
        rs.next();
        let fields = get_field_list(&mut rs, TokenKind::Where, ErrorKind::NotAtWhere, PREDICATE_LIST);
        assert_eq!(fields.len(), 5);
        let merged = merge_between_groups(fields);
        assert_eq!(
            texts(&merged),
            vec![
                vec!["x", "BETWEEN", "1", "AND", "2"],
                vec!["AND"],
                vec!["y", "=", "3"],
            ]
        );
    }

    #[test]
    fn test_columns_list_skips_modifiers() {
        let tokens: Vec<_> =
            Lexer::with_keywords("GROUP BY t, (host) WITH TOTALS ORDER BY t", &CLICKHOUSE_KEYWORDS).collect();
        let mut rs = RunState::new(&tokens);
        rs.next();
        let columns: Vec<_> = get_columns_list(&mut rs).iter().map(|t| t.text).collect();
        assert_eq!(columns, vec!["t", "host"]);
        assert_eq!(rs.current().kind, TokenKind::OrderBy);
    }

    #[test]
    fn test_columns_list_ends_at_terminator_and_settings() {
        let tokens: Vec<_> = Lexer::with_keywords("GROUP BY t, host; -- done", &CLICKHOUSE_KEYWORDS).collect();
        let mut rs = RunState::new(&tokens);
        rs.next();
        let columns: Vec<_> = get_columns_list(&mut rs).iter().map(|t| t.text).collect();
        assert_eq!(columns, vec!["t", "host"]);
        assert!(is_terminator(&rs.current()));

        let tokens: Vec<_> =
            Lexer::with_keywords("GROUP BY t SETTINGS max_threads = 1", &CLICKHOUSE_KEYWORDS).collect();
        let mut rs = RunState::new(&tokens);
        rs.next();
        let columns: Vec<_> = get_columns_list(&mut rs).iter().map(|t| t.text).collect();
        assert_eq!(columns, vec!["t"]);
        assert_eq!(rs.current().kind, TokenKind::Settings);
    }

    #[test]
    fn test_field_list_requires_allowed_keyword() {
        let tokens: Vec<_> = Lexer::new("FROM t").collect();
        let mut rs = RunState::new(&tokens);
        rs.next();
        let fields = get_field_list(&mut rs, TokenKind::Where, ErrorKind::NotAtWhere, PREDICATE_LIST);
        assert!(fields.is_empty());
        assert_eq!(rs.error(), Some(&ErrorKind::NotAtWhere));
    }
}
