//! Errors raised while analyzing a statement.

use std::fmt;
use std::num::ParseIntError;

use thiserror::Error;

use crate::token::{LexError, Span, Token};

/// How the proxy should react to an analysis failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The statement is fine but is not a time-range query.
    Classification,
    /// The statement uses a construct the analyzer refuses to split.
    Unsupported,
    /// A recognized pattern had the wrong shape.
    Malformed,
    /// Parser wiring bug.
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    #[error("not a time range query")]
    NotTimeRangeQuery,
    #[error("no matching time value column found")]
    MissingTimeseries,
    #[error("limit clauses are not supported")]
    LimitUnsupported,
    #[error("unsupported output format requested")]
    UnsupportedOutputFormat,
    #[error("unsupported toStartOf function")]
    UnsupportedToStartOfFunc,
    #[error("invalid WITH expression list")]
    InvalidWithClause,
    #[error("unable to parse timeseries step")]
    StepParse,
    #[error("unable to parse time range")]
    TimerangeParse,
    #[error("no lower bound provided for time range")]
    NoLowerBound,
    #[error("no upper bound provided for time range")]
    NoUpperBound,
    #[error("invalid integer: {0}")]
    InvalidInteger(#[from] ParseIntError),
    #[error("invalid input length for time literal")]
    InvalidInputLength,
    #[error("invalid time literal")]
    InvalidTimeLiteral,
    #[error("unexpected token")]
    UnexpectedToken,
    #[error("unsupported parser type for this state")]
    UnsupportedParser,
    #[error("unsupported verb")]
    UnsupportedVerb,
    #[error("unsupported clause")]
    UnsupportedClause,
    #[error("unsupported keyword")]
    UnsupportedKeyword,
    #[error("invalid keyword order")]
    InvalidKeywordOrder,
    #[error("invalid GROUP BY clause")]
    InvalidGroupByClause,
    #[error("expected SELECT")]
    NotAtSelect,
    #[error("expected FROM")]
    NotAtFrom,
    #[error("expected WHERE")]
    NotAtWhere,
    #[error("expected PREWHERE")]
    NotAtPreWhere,
    #[error("expected GROUP BY")]
    NotAtGroupBy,
    #[error("expected WITH")]
    NotAtWith,
    #[error("lexer error: {0}")]
    Lex(LexError),
    #[error("missing URL parameter: {0}")]
    MissingQueryParam(String),
}

impl ErrorKind {
    pub fn class(&self) -> ErrorClass {
        match self {
            ErrorKind::NotTimeRangeQuery | ErrorKind::MissingTimeseries => ErrorClass::Classification,
            ErrorKind::LimitUnsupported
            | ErrorKind::UnsupportedOutputFormat
            | ErrorKind::UnsupportedToStartOfFunc
            | ErrorKind::InvalidWithClause
            | ErrorKind::UnsupportedVerb
            | ErrorKind::UnsupportedClause
            | ErrorKind::UnsupportedKeyword => ErrorClass::Unsupported,
            ErrorKind::UnsupportedParser => ErrorClass::Internal,
            _ => ErrorClass::Malformed,
        }
    }
}

/// An analysis failure, positioned at the offending token when one is known.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub kind: ErrorKind,
    pub span: Option<Span>,
    pub token: Option<String>,
    can_object_cache: bool,
}

impl ParseError {
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind, span: None, token: None, can_object_cache: false }
    }

    pub fn at(kind: ErrorKind, token: &Token<'_>) -> Self {
        // synthetic tokens have no place in the statement
        let span = (!token.span.is_empty()).then_some(token.span);
        Self { kind, span, token: Some(token.text.to_string()), can_object_cache: false }
    }

    pub(crate) fn object_cacheable(mut self, can_object_cache: bool) -> Self {
        self.can_object_cache = can_object_cache;
        self
    }

    /// True when the statement was a SELECT, so the caller may still cache the
    /// response as an opaque object.
    pub fn can_object_cache(&self) -> bool {
        self.can_object_cache
    }

    pub fn class(&self) -> ErrorClass {
        self.kind.class()
    }
}

impl From<ErrorKind> for ParseError {
    fn from(kind: ErrorKind) -> Self {
        ParseError::new(kind)
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.span, &self.token) {
            (Some(span), Some(token)) => write!(f, "{} at byte {} ('{}')", self.kind, span.start, token),
            (None, Some(token)) => write!(f, "{} ('{}')", self.kind, token),
            _ => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenKind;

    #[test]
    fn test_display_includes_position() {
        let token = Token::new(TokenKind::Limit, "LIMIT", Span::new(42, 47));
        let err = ParseError::at(ErrorKind::LimitUnsupported, &token);
        assert_eq!(err.to_string(), "limit clauses are not supported at byte 42 ('LIMIT')");
        assert_eq!(err.span, Some(Span::new(42, 47)));
    }

    #[test]
    fn test_synthetic_token_has_no_position() {
        let token = Token::synthetic(TokenKind::LogicalAnd, "AND");
        let err = ParseError::at(ErrorKind::TimerangeParse, &token);
        assert_eq!(err.span, None);
        assert_eq!(err.to_string(), "unable to parse time range ('AND')");
    }

    #[test]
    fn test_classes() {
        assert_eq!(ErrorKind::MissingTimeseries.class(), ErrorClass::Classification);
        assert_eq!(ErrorKind::LimitUnsupported.class(), ErrorClass::Unsupported);
        assert_eq!(ErrorKind::NoUpperBound.class(), ErrorClass::Malformed);
        assert_eq!(ErrorKind::UnsupportedParser.class(), ErrorClass::Internal);
        let err: ParseError = "x".parse::<i64>().map_err(ErrorKind::from).unwrap_err().into();
        assert_eq!(err.class(), ErrorClass::Malformed);
        assert!(!err.can_object_cache());
    }
}
