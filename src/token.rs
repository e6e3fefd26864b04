//! The token definition for the ClickHouse SQL dialect.

use std::fmt;

/// A token is a single unit of the statement, with a specific kind and location.
///
/// `text` always borrows the exact bytes of `span` from the statement, so the
/// analyzer can slice or splice the original text using nothing but tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    pub span: Span,
}

impl<'a> Token<'a> {
    pub fn new(kind: TokenKind, text: &'a str, span: Span) -> Self {
        Self { kind, text, span }
    }

    /// A token that does not come from the statement (empty span).
    pub fn synthetic(kind: TokenKind, text: &'a str) -> Self {
        Self { kind, text, span: Span::default() }
    }
}

/// Why the lexer gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LexError {
    UnterminatedString,
    UnterminatedIdentifier,
    UnclosedComment,
    InvalidCharacter,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            LexError::UnterminatedString => "unterminated quoted string",
            LexError::UnterminatedIdentifier => "unterminated quoted identifier",
            LexError::UnclosedComment => "unclosed block comment",
            LexError::InvalidCharacter => "invalid character",
        };
        f.write_str(msg)
    }
}

/// The kind of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Special
    Error(LexError),
    Eof,

    // Generic lexemes
    Space,
    Comment,
    Char,
    Identifier,
    Number,
    String,
    Bool,
    Comma,        // ,
    LeftParen,    // (
    RightParen,   // )
    Equals,       // = or ==
    NotEqual,     // != or <>
    Inequality,   // NOT
    LessThan,     // <
    LessThanOrEqual,
    GreaterThan,  // >
    GreaterThanOrEqual,
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    LogicalAnd,
    LogicalOr,

    // SQL verbs
    With,
    Select,
    Insert,
    Update,
    Delete,
    Truncate,
    Alter,
    Create,

    // SQL clause keywords
    From,
    Join,
    Where,
    Between,
    GroupBy,
    Having,
    OrderBy,
    Union,
    Limit,
    IntoOutfile,

    // Other SQL keywords
    Null,
    NaN,
    As,
    Asc,
    Desc,
    NowFunc, // now()
    Count,

    // ClickHouse
    PreWhere,
    Format,
    Settings,
    WithTotals,
    Interval,
    Week,
    Day,
    Hour,
    Minute,
    Second,
    IntDiv,
    ToInt32,           // toInt32 / toUInt32
    ToStartOf,         // toStartOfDay, toMonday, ...
    ToStartOfInterval,
    ToDateFunc,        // toDate / toDateTime
}

/// Clause keywords in the order they may appear in a statement. A kind's
/// position here is its rank; kinds not listed have no ordering constraint.
const KEYWORD_ORDER: &[TokenKind] = &[
    TokenKind::With,
    TokenKind::Select,
    TokenKind::Insert,
    TokenKind::Update,
    TokenKind::Delete,
    TokenKind::Truncate,
    TokenKind::Alter,
    TokenKind::Create,
    TokenKind::From,
    TokenKind::Join,
    TokenKind::PreWhere,
    TokenKind::Where,
    TokenKind::Between,
    TokenKind::GroupBy,
    TokenKind::Having,
    TokenKind::OrderBy,
    TokenKind::Union,
    TokenKind::Limit,
    TokenKind::Settings,
    TokenKind::IntoOutfile,
    TokenKind::Format,
];

impl TokenKind {
    /// Position of the kind in the clause ordering table.
    pub fn rank(self) -> Option<usize> {
        KEYWORD_ORDER.iter().position(|k| *k == self)
    }

    /// EOF and lexer errors end every token loop.
    pub fn is_breakable(self) -> bool {
        matches!(self, TokenKind::Eof | TokenKind::Error(_))
    }

    pub fn is_verb(self) -> bool {
        matches!(
            self,
            TokenKind::With
                | TokenKind::Select
                | TokenKind::Insert
                | TokenKind::Update
                | TokenKind::Delete
                | TokenKind::Truncate
                | TokenKind::Alter
                | TokenKind::Create
        )
    }

    pub fn is_non_verb_primary_keyword(self) -> bool {
        matches!(
            self,
            TokenKind::From
                | TokenKind::Join
                | TokenKind::PreWhere
                | TokenKind::Where
                | TokenKind::Between
                | TokenKind::GroupBy
                | TokenKind::Having
                | TokenKind::OrderBy
                | TokenKind::Union
                | TokenKind::Limit
                | TokenKind::Settings
                | TokenKind::IntoOutfile
                | TokenKind::Format
        )
    }

    pub fn is_primary_keyword(self) -> bool {
        self.is_verb() || self.is_non_verb_primary_keyword()
    }

    pub fn is_logical_operator(self) -> bool {
        matches!(self, TokenKind::LogicalAnd | TokenKind::LogicalOr)
    }

    pub fn is_greater_or_less_than(self) -> bool {
        matches!(
            self,
            TokenKind::LessThan
                | TokenKind::LessThanOrEqual
                | TokenKind::GreaterThan
                | TokenKind::GreaterThanOrEqual
        )
    }

    pub fn is_add_or_subtract(self) -> bool {
        matches!(self, TokenKind::Plus | TokenKind::Minus)
    }

    /// Tokens that carry no meaning inside an expression.
    pub fn is_space_or_comment(self) -> bool {
        matches!(self, TokenKind::Space | TokenKind::Comment)
    }
}

/// Reports whether keyword `a` is allowed to appear before keyword `b`.
/// Kinds without a rank never constrain each other.
pub fn precedes(a: TokenKind, b: TokenKind) -> bool {
    match (a.rank(), b.rank()) {
        (Some(ra), Some(rb)) => ra < rb,
        _ => true,
    }
}

/// Represents a span in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Span {
    /// The starting byte offset.
    pub start: usize,
    /// The ending byte offset.
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Smallest span covering both.
    pub fn to(&self, other: &Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }
}
