//! Clause extractors.
//!
//! Each extractor reads one token group out of [`ParseResults`] and fills in
//! part of the [`TimeRangeQuery`]. Replacements for the templated statement
//! are recorded as span edits; the statement itself is never touched here.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{ErrorKind, ParseError};
use crate::eval::{get_int, solve_math_expression, token_to_time, TimeLiteral};
use crate::keywords::{interval_unit, to_start_of_step};
use crate::model::{Extent, FieldDefinition, RequestOptions, TimeFormat, TimeRangeQuery};
use crate::parser::{Field, ParseResults, WithVars};
use crate::template::{Template, RANGE, TS1, TS2};
use crate::token::{Token, TokenKind};

const BACKFILL_DIRECTIVE: &str = "backfill-tolerance:";

/// Builds the WITH variable table from `value AS name [, value AS name ...]`.
/// Spaces and comments must already be removed.
pub fn parse_with_tokens<'a>(tokens: &[Token<'a>]) -> Result<WithVars<'a>, ParseError> {
    let mut vars = WithVars::default();
    let Some(last) = tokens.last() else {
        return Ok(vars);
    };
    // one group of 3, plus 4 for every further `, value AS name`
    if (tokens.len() + 1) % 4 != 0 {
        return Err(ParseError::at(ErrorKind::InvalidWithClause, last));
    }
    for group in tokens.chunks(4) {
        let (value, as_keyword, name) = (group[0], group[1], group[2]);
        if as_keyword.kind != TokenKind::As {
            return Err(ParseError::at(ErrorKind::InvalidWithClause, &as_keyword));
        }
        if name.kind != TokenKind::Identifier {
            return Err(ParseError::at(ErrorKind::InvalidWithClause, &name));
        }
        if let Some(separator) = group.get(3) {
            if separator.kind != TokenKind::Comma {
                return Err(ParseError::at(ErrorKind::InvalidWithClause, separator));
            }
        }
        vars.insert(name.text, value);
    }
    Ok(vars)
}

/// Every GROUP BY column becomes a tag field, in source order.
pub fn parse_group_by_tokens(results: &ParseResults<'_>, trq: &mut TimeRangeQuery) -> Result<(), ParseError> {
    let columns = match &results.group_by_tokens {
        Some(columns) if !columns.is_empty() => columns,
        _ => return Err(ParseError::new(ErrorKind::InvalidGroupByClause)),
    };
    trq.tag_fields = columns.iter().map(|t| FieldDefinition::named(t.text)).collect();
    Ok(())
}

/// Left-to-right scan state for one SELECT field.
#[derive(Debug, Default)]
struct FieldScan<'a> {
    prev: Option<TokenKind>,
    found: bool,
    is_time_series: bool,
    in_interval: bool,
    interval: Option<i64>,
    expect_base_field: bool,
    is_int_div: bool,
    need_step: bool,
    divisor: Option<i64>,
    check_multiplier: bool,
    expect_alias: bool,
    alias: Option<&'a str>,
}

impl<'a> FieldScan<'a> {
    /// Feeds one significant token. Returns `false` once the field needs no
    /// further tokens.
    fn feed(
        &mut self,
        t: Token<'a>,
        trq: &mut TimeRangeQuery,
        ro: &mut RequestOptions,
    ) -> Result<bool, ParseError> {
        let prev = self.prev.replace(t.kind);

        // toStartOfInterval(<field>, INTERVAL <n> <unit>)
        if self.in_interval {
            if !self.is_time_series {
                ro.base_timestamp_field_name = t.text.to_string();
                self.is_time_series = true;
            }
            match prev {
                Some(TokenKind::Interval) => self.interval = Some(positive_int(&t)?),
                Some(TokenKind::Number) => {
                    if let Some(n) = self.interval {
                        let unit = interval_unit(t.kind)
                            .ok_or_else(|| ParseError::at(ErrorKind::StepParse, &t))?;
                        trq.step = scaled(unit, n, &t)?;
                        self.in_interval = false;
                        self.check_multiplier = true;
                        self.found = true;
                    }
                }
                _ => {}
            }
            return Ok(true);
        }

        if self.is_time_series {
            if t.kind == TokenKind::As {
                self.expect_alias = true;
                return Ok(true);
            }
            if self.expect_alias {
                self.alias = Some(t.text);
                return Ok(false);
            }
            if self.check_multiplier && prev == Some(TokenKind::Multiply) && t.kind == TokenKind::Number {
                let format = TimeFormat::from_multiplier(get_int(&t)?)
                    .ok_or_else(|| ParseError::at(ErrorKind::UnsupportedOutputFormat, &t))?;
                ro.time_format = format;
                trq.timestamp_field.provider_format_1 = format;
                self.check_multiplier = false;
            }
            if self.need_step {
                match prev {
                    Some(TokenKind::Comma) => self.divisor = Some(positive_int(&t)?),
                    Some(TokenKind::Multiply) => {
                        let n = positive_int(&t)?;
                        if self.divisor != Some(n) {
                            return Err(ParseError::at(ErrorKind::StepParse, &t));
                        }
                        trq.step = scaled(Duration::from_secs(1), n, &t)?;
                        self.need_step = false;
                        self.check_multiplier = true;
                    }
                    _ => {}
                }
            }
            if self.expect_base_field {
                ro.base_timestamp_field_name = t.text.to_string();
                self.expect_base_field = false;
                self.need_step = self.is_int_div;
                self.check_multiplier = !self.need_step;
            }
        }

        if t.kind == TokenKind::ToStartOfInterval {
            self.in_interval = true;
            return Ok(true);
        }
        let after_int_div = prev == Some(TokenKind::IntDiv) && t.kind == TokenKind::ToInt32;
        let to_start_of = matches!(prev, None | Some(TokenKind::ToInt32)) && t.kind == TokenKind::ToStartOf;
        if after_int_div || to_start_of {
            self.is_time_series = true;
            self.found = true;
            self.is_int_div = after_int_div;
            self.expect_base_field = true;
            if to_start_of {
                trq.step = to_start_of_step(t.text)
                    .ok_or_else(|| ParseError::at(ErrorKind::UnsupportedToStartOfFunc, &t))?;
            }
        }
        Ok(true)
    }
}

fn positive_int(token: &Token<'_>) -> Result<i64, ParseError> {
    let n = get_int(token)?;
    if n <= 0 {
        return Err(ParseError::at(ErrorKind::StepParse, token));
    }
    Ok(n)
}

fn scaled(unit: Duration, n: i64, token: &Token<'_>) -> Result<Duration, ParseError> {
    u32::try_from(n)
        .ok()
        .and_then(|n| unit.checked_mul(n))
        .ok_or_else(|| ParseError::at(ErrorKind::StepParse, token))
}

fn is_select_noise(kind: TokenKind) -> bool {
    kind.is_space_or_comment() || matches!(kind, TokenKind::LeftParen | TokenKind::RightParen)
}

/// Finds the bucketed timestamp column in the SELECT list and derives the
/// step, base field, timestamp name and client time unit from it.
pub fn parse_select_tokens(
    results: &ParseResults<'_>,
    statement: &str,
    trq: &mut TimeRangeQuery,
    ro: &mut RequestOptions,
) -> Result<(), ParseError> {
    let mut found = false;
    for field in &results.select_tokens {
        let (Some(first), Some(last)) = (field.first(), field.last()) else {
            continue;
        };
        let mut scan = FieldScan::default();
        for raw in field.iter().filter(|t| !is_select_noise(t.kind)) {
            // WITH variables are substituted on a copy
            let t = results.with_vars.resolve(raw);
            if !scan.feed(t, trq, ro)? {
                break;
            }
        }
        found |= scan.found;
        if scan.is_time_series {
            trq.timestamp_field.name = match scan.alias {
                Some(alias) => alias.to_string(),
                None => statement
                    .get(first.span.start..last.span.end)
                    .unwrap_or_default()
                    .to_string(),
            };
        }
    }
    if !found {
        return Err(ParseError::new(ErrorKind::MissingTimeseries));
    }
    if trq.step.is_zero() {
        return Err(ParseError::new(ErrorKind::StepParse));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
struct Bound<'a> {
    literal: TimeLiteral,
    /// the literal as written, for TS placeholder matching
    token: Token<'a>,
}

#[derive(Debug, Default)]
struct Predicate<'a> {
    between: bool,
    lower: Option<Bound<'a>>,
    upper: Option<Bound<'a>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    Field,
    Comparator,
    Value,
    Conjunction,
    UpperValue,
    Nothing,
}

fn is_predicate_noise(kind: TokenKind) -> bool {
    is_select_noise(kind) || kind == TokenKind::ToDateFunc
}

/// Reads a time literal and any `+`/`-` offsets after it.
fn read_bound<'a>(
    tokens: &[Token<'a>],
    literal: Token<'a>,
    comparator: TokenKind,
    step: Duration,
    with_vars: &WithVars<'a>,
    now: DateTime<Utc>,
) -> Result<(Bound<'a>, usize), ParseError> {
    let time = token_to_time(&literal, now)?;
    let (value, last) = solve_math_expression(tokens, Some(time.value), with_vars)?;
    let time = time.with_value(value);
    // strict comparators exclude the literal's own bucket
    let time = match comparator {
        TokenKind::GreaterThan => time.shifted(step, true),
        TokenKind::LessThan => time.shifted(step, false),
        _ => time,
    };
    Ok((Bound { literal: time, token: literal }, last))
}

/// Runs the bound scan over one predicate. `Ok(None)` means the predicate
/// does not constrain the timestamp field.
fn scan_predicate<'a>(
    field: &[Token<'a>],
    names: &[&str; 2],
    step: Duration,
    with_vars: &WithVars<'a>,
    now: DateTime<Utc>,
) -> Result<Option<Predicate<'a>>, ParseError> {
    let mut expect = Expect::Field;
    let mut comparator = TokenKind::Between;
    let mut predicate = Predicate::default();
    let mut i = 0;
    while i < field.len() {
        let raw = field[i];
        if is_predicate_noise(raw.kind) {
            i += 1;
            continue;
        }
        if raw.kind.is_breakable() {
            break;
        }
        let t = with_vars.resolve(&raw);
        match expect {
            Expect::Field => {
                if !names.contains(&t.text) {
                    return Ok(None);
                }
                expect = Expect::Comparator;
            }
            Expect::Comparator => {
                if t.kind != TokenKind::Between && !t.kind.is_greater_or_less_than() {
                    return Err(ParseError::at(ErrorKind::UnexpectedToken, &raw));
                }
                comparator = t.kind;
                predicate.between = t.kind == TokenKind::Between;
                expect = Expect::Value;
            }
            Expect::Value => {
                let (bound, last) = read_bound(&field[i..], t, comparator, step, with_vars, now)?;
                let is_lower = matches!(
                    comparator,
                    TokenKind::Between | TokenKind::GreaterThan | TokenKind::GreaterThanOrEqual
                );
                if is_lower {
                    predicate.lower = Some(bound);
                } else {
                    predicate.upper = Some(bound);
                }
                i += last;
                expect = if predicate.between { Expect::Conjunction } else { Expect::Nothing };
            }
            Expect::Conjunction => {
                if t.kind != TokenKind::LogicalAnd {
                    return Err(ParseError::at(ErrorKind::UnexpectedToken, &raw));
                }
                expect = Expect::UpperValue;
            }
            Expect::UpperValue => {
                let (bound, last) = read_bound(&field[i..], t, TokenKind::Between, step, with_vars, now)?;
                predicate.upper = Some(bound);
                i += last;
                expect = Expect::Nothing;
            }
            Expect::Nothing => return Err(ParseError::at(ErrorKind::UnexpectedToken, &raw)),
        }
        i += 1;
    }
    match expect {
        Expect::Field => Ok(None),
        Expect::Comparator | Expect::Value => Err(match field.last() {
            Some(last) => ParseError::at(ErrorKind::TimerangeParse, last),
            None => ParseError::new(ErrorKind::TimerangeParse),
        }),
        _ => Ok(Some(predicate)),
    }
}

/// PREWHERE predicates, a joining `AND`, then WHERE predicates.
fn predicate_groups<'a>(results: &ParseResults<'a>) -> Option<Vec<Field<'a>>> {
    let pre_where = results.pre_where_tokens.as_ref().filter(|p| !p.is_empty());
    let where_tokens = results.where_tokens.as_ref();
    if pre_where.is_none() && where_tokens.is_none() {
        return None;
    }
    let mut groups = Vec::new();
    if let Some(pre_where) = pre_where {
        groups.extend(pre_where.iter().cloned());
    }
    if let Some(where_tokens) = where_tokens.filter(|w| !w.is_empty()) {
        if !groups.is_empty() {
            groups.push(vec![Token::synthetic(TokenKind::LogicalAnd, "AND")]);
        }
        groups.extend(where_tokens.iter().cloned());
    }
    Some(groups)
}

fn to_datetime(bound: &Bound<'_>) -> Result<DateTime<Utc>, ParseError> {
    bound
        .literal
        .to_datetime()
        .ok_or_else(|| ParseError::at(ErrorKind::TimerangeParse, &bound.token))
}

/// Derives the extent from the predicates on the timestamp field and records
/// the RANGE and TS edits. Must run after [`parse_select_tokens`].
pub fn parse_where_tokens<'a>(
    results: &ParseResults<'a>,
    trq: &mut TimeRangeQuery,
    ro: &RequestOptions,
    template: &mut Template,
    now: DateTime<Utc>,
) -> Result<(), ParseError> {
    let groups = predicate_groups(results).ok_or_else(|| ParseError::new(ErrorKind::NotTimeRangeQuery))?;
    // predicates interleaved with conjunctions
    if groups.len() % 2 == 0 {
        return Err(ParseError::new(ErrorKind::TimerangeParse));
    }

    let alias = trq.timestamp_field.name.clone();
    let names = [ro.base_timestamp_field_name.as_str(), alias.as_str()];
    let mut lower: Option<Bound<'a>> = None;
    let mut upper: Option<Bound<'a>> = None;

    for (n, field) in groups.iter().enumerate().step_by(2) {
        let Some(predicate) = scan_predicate(field, &names, trq.step, &results.with_vars, now)? else {
            continue;
        };
        if predicate.between && predicate.upper.is_none() {
            return Err(match field.last() {
                Some(last) => ParseError::at(ErrorKind::NoUpperBound, last),
                None => ParseError::new(ErrorKind::NoUpperBound),
            });
        }
        for neighbour in [n.checked_sub(1), n.checked_add(1)].into_iter().flatten() {
            if let Some(conjunction) = groups.get(neighbour).and_then(|g| g.first()) {
                if conjunction.kind == TokenKind::LogicalOr {
                    return Err(ParseError::at(ErrorKind::TimerangeParse, conjunction));
                }
            }
        }
        if let (Some(first), Some(last)) = (field.first(), field.last()) {
            template.replace(first.span.to(&last.span), RANGE);
        }
        lower = predicate.lower.or(lower);
        upper = predicate.upper.or(upper);
    }

    let lower = lower.ok_or_else(|| ParseError::new(ErrorKind::NoLowerBound))?;
    let start = to_datetime(&lower)?;
    let end = match &upper {
        Some(upper) => to_datetime(upper)?,
        None => now,
    };
    if start > end {
        return Err(ParseError::at(ErrorKind::TimerangeParse, &lower.token));
    }
    trq.extent = Extent::new(start, end);
    trq.timestamp_field.provider_format_2 = lower.literal.unit;

    // the same bounds on a partition column, e.g. `date >= toDate(1516665600)`
    let literals: Vec<(&str, &'static str)> = [Some((lower.token, TS1)), upper.map(|u| (u.token, TS2))]
        .into_iter()
        .flatten()
        .filter(|(token, _)| matches!(token.kind, TokenKind::Number | TokenKind::String))
        .map(|(token, placeholder)| (token.text, placeholder))
        .collect();
    for token in groups.iter().flat_map(|group| date_range_literals(group)) {
        if template.covers(&token.span) {
            continue;
        }
        if let Some((_, placeholder)) = literals.iter().find(|(text, _)| *text == token.text) {
            template.replace(token.span, *placeholder);
        }
    }
    Ok(())
}

/// Literals wrapped in `toDate(...)`/`toDateTime(...)` inside a range
/// predicate. Other predicates keep their literals even when they happen to
/// equal a bound.
fn date_range_literals<'g, 'a>(group: &'g [Token<'a>]) -> impl Iterator<Item = &'g Token<'a>> + 'g {
    let is_range = group
        .iter()
        .any(|t| t.kind == TokenKind::Between || t.kind.is_greater_or_less_than());
    group.windows(3).filter_map(move |w| {
        let wrapped = w[0].kind == TokenKind::ToDateFunc && w[1].kind == TokenKind::LeftParen;
        let literal = matches!(w[2].kind, TokenKind::Number | TokenKind::String);
        (is_range && wrapped && literal).then_some(&w[2])
    })
}

/// Reads a `backfill-tolerance:<seconds>` directive from the statement's comments.
pub fn backfill_tolerance(tokens: &[Token<'_>]) -> Option<Duration> {
    tokens
        .iter()
        .filter(|t| t.kind == TokenKind::Comment)
        .find_map(|t| {
            let (_, rest) = t.text.split_once(BACKFILL_DIRECTIVE)?;
            let digits = rest.split(|c: char| !c.is_ascii_digit()).next()?;
            digits.parse::<u64>().ok().map(Duration::from_secs)
        })
}
