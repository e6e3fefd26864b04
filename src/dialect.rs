//! ClickHouse dialect: extra states, the compiled parser graph and the
//! top-level analysis entry point.
//!
//! ## Flow
//!
//! ```text
//! parse(statement)
//!   ├─ Lexer::with_keywords(statement, CLICKHOUSE_KEYWORDS)
//!   ├─ PARSER.run()                      FindVerb ─▶ AtWith ─▶ FindVerb ─▶ AtSelect ─▶ ...
//!   │                                    ... ─▶ AtPreWhere / AtWhere / ... ─▶ AtSettings ─▶ AtFormat ─▶ TrailingComments
//!   ├─ no verb                 ─▶ NotTimeRangeQuery
//!   ├─ LIMIT                   ─▶ LimitUnsupported
//!   ├─ FORMAT <name>           ─▶ <$FORMAT$>
//!   ├─ parse_group_by_tokens   ─▶ tag fields
//!   ├─ parse_select_tokens     ─▶ step, timestamp field, client time unit
//!   ├─ parse_where_tokens      ─▶ extent, <$RANGE$>, <$TS1$>, <$TS2$>
//!   └─ Template::render        ─▶ TimeRangeQuery.statement
//! ```

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use tracing::debug;

use crate::error::{ErrorKind, ParseError};
use crate::extract::{
    backfill_tolerance, parse_group_by_tokens, parse_select_tokens, parse_where_tokens, parse_with_tokens,
};
use crate::keywords::CLICKHOUSE_KEYWORDS;
use crate::lexer::Lexer;
use crate::model::{OutputFormat, RequestOptions, TimeRangeQuery};
use crate::parser::{DecisionPoint, Dialect, ParseResults, Parser, RunState, StateFn};
use crate::select::{get_field_list, is_terminator, merge_between_groups, FIELD_LIST, FIND_VERB, PREDICATE_LIST};
use crate::template::{Template, FORMAT};
use crate::token::{Token, TokenKind};

pub const AT_WITH: StateFn = StateFn::new("AtWith", at_with);
pub const AT_PRE_WHERE: StateFn = StateFn::new("AtPreWhere", at_pre_where);
pub const AT_SETTINGS: StateFn = StateFn::new("AtSettings", at_settings);
pub const AT_FORMAT: StateFn = StateFn::new("AtFormat", at_format);
pub const TRAILING_COMMENTS: StateFn = StateFn::new("TrailingComments", trailing_comments);

static PARSER: Lazy<Parser> = Lazy::new(|| {
    Parser::builder(Dialect::ClickHouse)
        .with_decisions(DecisionPoint::FindVerb, [(TokenKind::With, Some(AT_WITH))])
        .with_decisions(
            DecisionPoint::SelectQueryKeywords,
            [
                (TokenKind::PreWhere, Some(AT_PRE_WHERE)),
                (TokenKind::Settings, Some(AT_SETTINGS)),
                (TokenKind::Format, Some(AT_FORMAT)),
            ],
        )
        .build()
});

/// The compiled ClickHouse parser graph, shared by every parse.
pub fn parser() -> &'static Parser {
    &PARSER
}

fn require_clickhouse(p: &Parser, rs: &mut RunState<'_>) -> bool {
    if p.dialect() != Dialect::ClickHouse {
        rs.fail(ErrorKind::UnsupportedParser);
        return false;
    }
    true
}

fn at_with(p: &Parser, rs: &mut RunState<'_>) -> Option<StateFn> {
    if !require_clickhouse(p, rs) {
        return None;
    }
    if rs.current().kind != TokenKind::With {
        rs.fail(ErrorKind::NotAtWith);
        return None;
    }
    let mut tokens = Vec::with_capacity(16);
    let mut depth = 0i32;
    loop {
        if depth == 0 && rs.peek().kind.is_verb() {
            break;
        }
        let token = rs.next();
        if token.kind.is_breakable() {
            return None;
        }
        match token.kind {
            TokenKind::Space | TokenKind::Comment => continue,
            TokenKind::LeftParen => depth += 1,
            TokenKind::RightParen => depth -= 1,
            _ => {}
        }
        tokens.push(token);
    }
    match parse_with_tokens(&tokens) {
        Ok(vars) => {
            rs.results_mut().with_vars = vars;
            Some(FIND_VERB)
        }
        Err(err) => {
            rs.fail(err.kind);
            None
        }
    }
}

fn at_pre_where(p: &Parser, rs: &mut RunState<'_>) -> Option<StateFn> {
    if !require_clickhouse(p, rs) {
        return None;
    }
    let fields = get_field_list(rs, TokenKind::PreWhere, ErrorKind::NotAtPreWhere, PREDICATE_LIST);
    rs.results_mut().pre_where_tokens = Some(merge_between_groups(fields));
    rs.next_state(None, p.decisions(DecisionPoint::SelectQueryKeywords))
}

/// Query-level settings do not change the result rows; they are read through.
fn at_settings(p: &Parser, rs: &mut RunState<'_>) -> Option<StateFn> {
    if !require_clickhouse(p, rs) {
        return None;
    }
    get_field_list(rs, TokenKind::Settings, ErrorKind::UnexpectedToken, FIELD_LIST);
    rs.next_state(None, p.decisions(DecisionPoint::SelectQueryKeywords))
}

fn at_format(p: &Parser, rs: &mut RunState<'_>) -> Option<StateFn> {
    if !require_clickhouse(p, rs) {
        return None;
    }
    let name = loop {
        let token = rs.next();
        if token.kind.is_breakable() {
            return None;
        }
        if token.kind.is_primary_keyword() {
            rs.fail(ErrorKind::UnexpectedToken);
            return None;
        }
        if !token.kind.is_space_or_comment() {
            break token;
        }
    };
    match OutputFormat::from_name(name.text) {
        Some(format) => {
            rs.results_mut().format = Some((format, name));
            Some(TRAILING_COMMENTS)
        }
        None => {
            rs.fail(ErrorKind::UnsupportedOutputFormat);
            None
        }
    }
}

/// Only comments, whitespace and `;` may follow the format name.
fn trailing_comments(_: &Parser, rs: &mut RunState<'_>) -> Option<StateFn> {
    loop {
        let token = rs.next();
        if token.kind.is_breakable() {
            return None;
        }
        if !token.kind.is_space_or_comment() && !is_terminator(&token) {
            rs.fail(ErrorKind::UnexpectedToken);
            return None;
        }
    }
}

/// Analyzes a ClickHouse statement.
///
/// On success returns the time-range descriptor with its templated statement,
/// the response options, and whether the statement may be object cached. A
/// failed analysis carries the same flag in [`ParseError::can_object_cache`].
pub fn parse(statement: &str) -> Result<(TimeRangeQuery, RequestOptions, bool), ParseError> {
    parse_at(statement, Utc::now())
}

/// [`parse`] with an explicit value for `now()` and open-ended ranges.
pub fn parse_at(
    statement: &str,
    now: DateTime<Utc>,
) -> Result<(TimeRangeQuery, RequestOptions, bool), ParseError> {
    let tokens: Vec<Token<'_>> = Lexer::with_keywords(statement, &CLICKHOUSE_KEYWORDS).collect();
    let mut rs = RunState::new(&tokens);
    let outcome = PARSER.run(&mut rs);
    let current = rs.current();
    let results = rs.into_results();

    let Some(verb) = results.verb else {
        return Err(match outcome {
            Err(kind @ ErrorKind::InvalidWithClause) => ParseError::at(kind, &current),
            _ => ParseError::new(ErrorKind::NotTimeRangeQuery),
        });
    };
    let can_object_cache = verb == TokenKind::Select;

    let analyzed = outcome
        .map_err(|kind| ParseError::at(kind, &current))
        .and_then(|()| analyze(statement, &tokens, &results, now));
    // LIMIT is rejected whatever else went wrong, even past where the run stopped
    let analyzed = if has_top_level_limit(&tokens) {
        Err(ParseError::new(ErrorKind::LimitUnsupported))
    } else {
        analyzed
    };

    match analyzed {
        Ok((trq, ro)) => {
            debug!(
                step = ?trq.step,
                start = %trq.extent.start,
                end = %trq.extent.end,
                field = %trq.timestamp_field.name,
                tags = trq.tag_fields.len(),
                "analyzed time range query"
            );
            Ok((trq, ro, can_object_cache))
        }
        Err(err) => {
            debug!(error = %err, can_object_cache, "statement is not a cacheable time range query");
            Err(err.object_cacheable(can_object_cache))
        }
    }
}

fn has_top_level_limit(tokens: &[Token<'_>]) -> bool {
    let mut depth = 0i32;
    tokens.iter().any(|token| {
        match token.kind {
            TokenKind::LeftParen => depth += 1,
            TokenKind::RightParen => depth -= 1,
            _ => {}
        }
        depth == 0 && token.kind == TokenKind::Limit
    })
}

fn analyze(
    statement: &str,
    tokens: &[Token<'_>],
    results: &ParseResults<'_>,
    now: DateTime<Utc>,
) -> Result<(TimeRangeQuery, RequestOptions), ParseError> {
    let mut trq = TimeRangeQuery::default();
    let mut ro = RequestOptions::default();
    let mut template = Template::new();

    if let Some((format, token)) = results.format {
        ro.output_format = format;
        template.replace(token.span, FORMAT);
    }
    parse_group_by_tokens(results, &mut trq)?;
    parse_select_tokens(results, statement, &mut trq, &mut ro)?;
    parse_where_tokens(results, &mut trq, &ro, &mut template, now)?;

    trq.statement = template.render(statement);
    if let Some(tolerance) = backfill_tolerance(tokens) {
        trq.backfill_tolerance = tolerance;
    }
    Ok((trq, ro))
}
