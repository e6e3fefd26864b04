//! Integer arithmetic and time-literal coercion over token slices.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::error::{ErrorKind, ParseError};
use crate::model::TimeFormat;
use crate::parser::WithVars;
use crate::token::{Token, TokenKind};

/// Integer literals above this are taken to be epoch milliseconds.
const MAX_EPOCH_SECONDS: i64 = 9_999_999_999;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn get_int(token: &Token<'_>) -> Result<i64, ParseError> {
    token
        .text
        .parse::<i64>()
        .map_err(|e| ParseError::at(ErrorKind::InvalidInteger(e), token))
}

/// Evaluates `value (+|-) value ...` from the start of `tokens`.
///
/// When `seed` is given, the first token is taken to already be evaluated to
/// that value. Values are integer literals or WITH variables resolving to one.
/// Evaluation stops before the first breakable token or logical operator.
///
/// Returns the value and the index of the last token that belongs to the
/// expression.
pub fn solve_math_expression<'a>(
    tokens: &[Token<'a>],
    seed: Option<i64>,
    with_vars: &WithVars<'a>,
) -> Result<(i64, usize), ParseError> {
    let mut value = 0i64;
    let mut pending = None;
    let mut expect_value = true;
    let mut last = tokens.len().saturating_sub(1);

    for (i, raw) in tokens.iter().enumerate() {
        if i == 0 {
            if let Some(seed) = seed {
                value = seed;
                expect_value = false;
                continue;
            }
        }
        let token = with_vars.resolve(raw);
        if token.kind.is_breakable() || token.kind.is_logical_operator() {
            last = i.saturating_sub(1);
            break;
        }
        if token.kind.is_space_or_comment()
            || matches!(token.kind, TokenKind::LeftParen | TokenKind::RightParen)
        {
            continue;
        }
        if expect_value {
            if token.kind != TokenKind::Number {
                return Err(ParseError::at(ErrorKind::UnexpectedToken, &token));
            }
            let n = get_int(&token)?;
            let next = match pending.take() {
                Some(TokenKind::Minus) => value.checked_sub(n),
                _ => value.checked_add(n),
            };
            value = next.ok_or_else(|| ParseError::at(ErrorKind::TimerangeParse, &token))?;
            expect_value = false;
        } else {
            if !token.kind.is_add_or_subtract() {
                return Err(ParseError::at(ErrorKind::UnexpectedToken, &token));
            }
            pending = Some(token.kind);
            expect_value = true;
        }
    }

    if expect_value {
        // nothing evaluated, or a dangling operator
        return Err(match tokens.get(last) {
            Some(token) => ParseError::at(ErrorKind::UnexpectedToken, token),
            None => ParseError::new(ErrorKind::UnexpectedToken),
        });
    }
    Ok((value, last))
}

/// An epoch timestamp in the unit it was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeLiteral {
    pub value: i64,
    pub unit: TimeFormat,
}

impl TimeLiteral {
    pub fn seconds(value: i64) -> Self {
        Self { value, unit: TimeFormat::Seconds }
    }

    pub fn with_value(self, value: i64) -> Self {
        Self { value, ..self }
    }

    /// Moves the literal by one `step`, forward or backward.
    pub fn shifted(self, step: Duration, forward: bool) -> Self {
        let delta = (step.as_nanos() as i128 / self.unit.nanos_per_unit()) as i64;
        let value = if forward {
            self.value.saturating_add(delta)
        } else {
            self.value.saturating_sub(delta)
        };
        self.with_value(value)
    }

    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        let nanos = i128::from(self.value) * self.unit.nanos_per_unit();
        let secs = i64::try_from(nanos.div_euclid(1_000_000_000)).ok()?;
        let subsec = nanos.rem_euclid(1_000_000_000) as u32;
        DateTime::from_timestamp(secs, subsec)
    }
}

/// Reads a time bound: an epoch number, a quoted `'YYYY-MM-DD HH:MM:SS'` or
/// `'YYYY-MM-DD'` string (UTC), or `now()`.
pub fn token_to_time(token: &Token<'_>, now: DateTime<Utc>) -> Result<TimeLiteral, ParseError> {
    match token.kind {
        TokenKind::Number => {
            let value = get_int(token)?;
            let unit = if value > MAX_EPOCH_SECONDS {
                TimeFormat::Milliseconds
            } else {
                TimeFormat::Seconds
            };
            Ok(TimeLiteral { value, unit })
        }
        TokenKind::String => {
            let text = unquote(token.text);
            let parsed = match text.len() {
                19 => NaiveDateTime::parse_from_str(text, DATETIME_FORMAT).ok(),
                10 => NaiveDate::parse_from_str(text, DATE_FORMAT)
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0)),
                _ => return Err(ParseError::at(ErrorKind::InvalidInputLength, token)),
            };
            parsed
                .map(|dt| TimeLiteral::seconds(dt.and_utc().timestamp()))
                .ok_or_else(|| ParseError::at(ErrorKind::InvalidTimeLiteral, token))
        }
        TokenKind::NowFunc => Ok(TimeLiteral::seconds(now.timestamp())),
        _ => Err(ParseError::at(ErrorKind::UnexpectedToken, token)),
    }
}

/// Expresses `at` as an epoch value in `unit`, rounding down, or up when
/// `round_up` is set and `at` falls between two units.
pub fn epoch_in(at: &DateTime<Utc>, unit: TimeFormat, round_up: bool) -> i64 {
    let nanos = i128::from(at.timestamp()) * 1_000_000_000 + i128::from(at.timestamp_subsec_nanos());
    let per = unit.nanos_per_unit();
    let mut value = nanos.div_euclid(per);
    if round_up && nanos.rem_euclid(per) != 0 {
        value += 1;
    }
    value as i64
}

fn unquote(text: &str) -> &str {
    text.strip_prefix('\'')
        .and_then(|t| t.strip_suffix('\''))
        .unwrap_or(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Span;

    fn tok(kind: TokenKind, text: &str) -> Token<'_> {
        Token::new(kind, text, Span::default())
    }

    fn vars<'a>(pairs: &[(&'a str, Token<'a>)]) -> WithVars<'a> {
        let mut vars = WithVars::default();
        for (name, value) in pairs {
            vars.insert(*name, *value);
        }
        vars
    }

    #[test]
    fn test_solve_with_variable() {
        let tokens = [
            tok(TokenKind::Identifier, "x"),
            tok(TokenKind::Plus, "+"),
            tok(TokenKind::Number, "10"),
        ];
        let with_vars = vars(&[("x", tok(TokenKind::Number, "5"))]);
        assert_eq!(solve_math_expression(&tokens, None, &with_vars).unwrap(), (15, 2));
    }

    #[test]
    fn test_solve_rejects_multiplication() {
        let tokens = [
            tok(TokenKind::Number, "5"),
            tok(TokenKind::Multiply, "*"),
            tok(TokenKind::Number, "10"),
        ];
        let err = solve_math_expression(&tokens, None, &WithVars::default()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnexpectedToken);
        assert_eq!(err.token.as_deref(), Some("*"));
    }

    #[test]
    fn test_solve_rejects_non_numbers() {
        let tokens = [
            tok(TokenKind::Identifier, "notnum"),
            tok(TokenKind::Plus, "+"),
            tok(TokenKind::Number, "10"),
        ];
        let err = solve_math_expression(&tokens, None, &WithVars::default()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnexpectedToken);
        assert_eq!(err.token.as_deref(), Some("notnum"));
    }

    #[test]
    fn test_solve_from_seed_stops_at_conjunction() {
        let tokens = [
            tok(TokenKind::NowFunc, "now()"),
            tok(TokenKind::Space, " "),
            tok(TokenKind::Minus, "-"),
            tok(TokenKind::Number, "600"),
            tok(TokenKind::RightParen, ")"),
            tok(TokenKind::LogicalAnd, "AND"),
            tok(TokenKind::Number, "1"),
        ];
        let (value, last) = solve_math_expression(&tokens, Some(1000), &WithVars::default()).unwrap();
        assert_eq!(value, 400);
        assert_eq!(last, 4);
    }

    #[test]
    fn test_solve_dangling_operator() {
        let tokens = [tok(TokenKind::Number, "5"), tok(TokenKind::Minus, "-")];
        let err = solve_math_expression(&tokens, None, &WithVars::default()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnexpectedToken);
    }

    #[test]
    fn test_get_int() {
        assert_eq!(get_int(&tok(TokenKind::Number, "60")).unwrap(), 60);
        let err = get_int(&tok(TokenKind::Number, "1.5")).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::InvalidInteger(_)));
    }

    #[test]
    fn test_token_to_time() {
        let now = DateTime::from_timestamp(1_600_000_000, 0).unwrap();
        assert_eq!(
            token_to_time(&tok(TokenKind::Number, "1589904000"), now).unwrap(),
            TimeLiteral::seconds(1_589_904_000)
        );
        assert_eq!(
            token_to_time(&tok(TokenKind::Number, "1589904000000"), now).unwrap().unit,
            TimeFormat::Milliseconds
        );
        assert_eq!(
            token_to_time(&tok(TokenKind::String, "'2020-05-30 11:00:00'"), now).unwrap(),
            TimeLiteral::seconds(1_590_836_400)
        );
        assert_eq!(
            token_to_time(&tok(TokenKind::String, "'2020-05-30'"), now).unwrap(),
            TimeLiteral::seconds(1_590_796_800)
        );
        assert_eq!(
            token_to_time(&tok(TokenKind::NowFunc, "now()"), now).unwrap(),
            TimeLiteral::seconds(1_600_000_000)
        );
        assert_eq!(
            token_to_time(&tok(TokenKind::String, "'yesterday'"), now).unwrap_err().kind,
            ErrorKind::InvalidInputLength
        );
        assert_eq!(
            token_to_time(&tok(TokenKind::String, "'not-a-day'"), now).unwrap_err().kind,
            ErrorKind::InvalidInputLength
        );
        assert_eq!(
            token_to_time(&tok(TokenKind::String, "'2020-13-45'"), now).unwrap_err().kind,
            ErrorKind::InvalidTimeLiteral
        );
        assert_eq!(
            token_to_time(&tok(TokenKind::Identifier, "x"), now).unwrap_err().kind,
            ErrorKind::UnexpectedToken
        );
    }

    #[test]
    fn test_shift_respects_unit() {
        let step = Duration::from_secs(60);
        assert_eq!(TimeLiteral::seconds(100).shifted(step, true).value, 160);
        let ms = TimeLiteral { value: 100_000, unit: TimeFormat::Milliseconds };
        assert_eq!(ms.shifted(step, false).value, 40_000);
        assert_eq!(
            ms.to_datetime().unwrap(),
            DateTime::from_timestamp(100, 0).unwrap()
        );
    }

    #[test]
    fn test_epoch_in() {
        let at = DateTime::from_timestamp(1_589_904_000, 250_000_000).unwrap();
        assert_eq!(epoch_in(&at, TimeFormat::Seconds, false), 1_589_904_000);
        assert_eq!(epoch_in(&at, TimeFormat::Seconds, true), 1_589_904_001);
        assert_eq!(epoch_in(&at, TimeFormat::Milliseconds, true), 1_589_904_000_250);
        let whole = DateTime::from_timestamp(10, 0).unwrap();
        assert_eq!(epoch_in(&whole, TimeFormat::Seconds, true), 10);
    }
}
