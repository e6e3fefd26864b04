//! 通用的 SQL 状态机驱动
//!
//! ## 运行流程
//!
//! ```text
//! Parser::run()
//!   └─ entry 状态 (FindVerb)
//!        ├─ 每个状态消费 token，把分组结果写入 ParseResults
//!        ├─ 返回 Some(下一个状态) → 继续
//!        └─ 返回 None → 结束（RunState 中记录的第一个错误即为结果）
//!
//! RunState::next_state(default, decisions)
//!   ├─ 当前 token 的类型在决策表中 → 检查关键字顺序 → 对应状态
//!   └─ 否则 → default
//! ```
//!
//! 决策表按 [`DecisionPoint`] 命名。方言通过 [`ParserBuilder::with_decisions`]
//! 在不修改共享状态的前提下增加或删除分支。

use std::collections::HashMap;
use std::fmt;

use tracing::trace;

use crate::error::ErrorKind;
use crate::model::OutputFormat;
use crate::select;
use crate::token::{precedes, Span, Token, TokenKind};

/// 一个具名状态：消费 token 并返回下一个状态，`None` 表示结束
#[derive(Clone, Copy)]
pub struct StateFn {
    name: &'static str,
    func: fn(&Parser, &mut RunState<'_>) -> Option<StateFn>,
}

impl StateFn {
    pub const fn new(name: &'static str, func: fn(&Parser, &mut RunState<'_>) -> Option<StateFn>) -> Self {
        Self { name, func }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for StateFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateFn({})", self.name)
    }
}

/// token 类型 → 下一个状态
pub type DecisionSet = HashMap<TokenKind, StateFn>;

/// 可由方言扩展的决策点
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecisionPoint {
    /// 寻找语句动词
    FindVerb,
    /// 一个子句的字段列表结束后，决定进入哪个子句
    SelectQueryKeywords,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sql,
    ClickHouse,
}

/// 编译好的状态图，构建后只读，可在线程间共享
#[derive(Debug)]
pub struct Parser {
    dialect: Dialect,
    entry: StateFn,
    find_verb: DecisionSet,
    select_keywords: DecisionSet,
}

impl Parser {
    /// 以基础 SQL 决策表为起点
    pub fn builder(dialect: Dialect) -> ParserBuilder {
        ParserBuilder {
            parser: Parser {
                dialect,
                entry: select::FIND_VERB,
                find_verb: select::find_verb_decisions(),
                select_keywords: select::select_query_keywords(),
            },
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn decisions(&self, point: DecisionPoint) -> &DecisionSet {
        match point {
            DecisionPoint::FindVerb => &self.find_verb,
            DecisionPoint::SelectQueryKeywords => &self.select_keywords,
        }
    }

    /// 从入口状态开始运行，直到某个状态返回 `None`
    pub fn run(&self, rs: &mut RunState<'_>) -> Result<(), ErrorKind> {
        let mut state = Some(self.entry);
        while let Some(current) = state {
            trace!(state = current.name, token = rs.current().text, "enter state");
            state = (current.func)(self, rs);
        }
        match &rs.error {
            Some(kind) => Err(kind.clone()),
            None => Ok(()),
        }
    }
}

pub struct ParserBuilder {
    parser: Parser,
}

impl ParserBuilder {
    /// 在指定决策点上增加分支；值为 `None` 时删除该分支
    pub fn with_decisions<I>(mut self, point: DecisionPoint, decisions: I) -> Self
    where
        I: IntoIterator<Item = (TokenKind, Option<StateFn>)>,
    {
        let set = match point {
            DecisionPoint::FindVerb => &mut self.parser.find_verb,
            DecisionPoint::SelectQueryKeywords => &mut self.parser.select_keywords,
        };
        for (kind, state) in decisions {
            match state {
                Some(state) => {
                    set.insert(kind, state);
                }
                None => {
                    set.remove(&kind);
                }
            }
        }
        self
    }

    pub fn build(self) -> Parser {
        self.parser
    }
}

/// WITH 子句定义的变量：名称 → 定义它的 token
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WithVars<'a> {
    vars: HashMap<&'a str, Token<'a>>,
}

impl<'a> WithVars<'a> {
    pub fn insert(&mut self, name: &'a str, value: Token<'a>) {
        self.vars.insert(name, value);
    }

    pub fn get(&self, name: &str) -> Option<&Token<'a>> {
        self.vars.get(name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// 标识符若是 WITH 变量则返回其定义的副本，否则原样返回
    pub fn resolve(&self, token: &Token<'a>) -> Token<'a> {
        if token.kind == TokenKind::Identifier {
            if let Some(value) = self.vars.get(token.text) {
                return *value;
            }
        }
        *token
    }
}

/// 一个字段：去掉空白和注释后的 token 序列
pub type Field<'a> = Vec<Token<'a>>;

/// 状态机收集到的各子句 token 分组
#[derive(Debug, Clone, Default)]
pub struct ParseResults<'a> {
    pub verb: Option<TokenKind>,
    pub select_tokens: Vec<Field<'a>>,
    pub pre_where_tokens: Option<Vec<Field<'a>>>,
    pub where_tokens: Option<Vec<Field<'a>>>,
    pub group_by_tokens: Option<Vec<Token<'a>>>,
    pub with_vars: WithVars<'a>,
    /// FORMAT 子句指定的格式及其 token
    pub format: Option<(OutputFormat, Token<'a>)>,
}

/// 单次解析的运行状态
pub struct RunState<'a> {
    tokens: &'a [Token<'a>],
    /// 下一个要读取的 token 下标
    position: usize,
    current: Token<'a>,
    last_keyword: Option<TokenKind>,
    error: Option<ErrorKind>,
    results: ParseResults<'a>,
    eof: Token<'a>,
}

impl<'a> RunState<'a> {
    pub fn new(tokens: &'a [Token<'a>]) -> Self {
        let end = tokens.last().map_or(0, |t| t.span.end);
        let eof = Token::new(TokenKind::Eof, "", Span::new(end, end));
        Self {
            tokens,
            position: 0,
            current: Token::new(TokenKind::Space, "", Span::default()),
            last_keyword: None,
            error: None,
            results: ParseResults::default(),
            eof,
        }
    }

    /// 返回下一个 token，不推进位置；越界时返回 EOF
    pub fn peek(&self) -> Token<'a> {
        self.tokens.get(self.position).copied().unwrap_or(self.eof)
    }

    /// 推进位置并返回新的当前 token；遇到词法错误时记录错误
    pub fn next(&mut self) -> Token<'a> {
        let token = self.peek();
        if self.position < self.tokens.len() {
            self.position += 1;
        }
        if let TokenKind::Error(err) = token.kind {
            self.fail(ErrorKind::Lex(err));
        }
        self.current = token;
        token
    }

    pub fn current(&self) -> Token<'a> {
        self.current
    }

    /// 记录错误，只保留第一个
    pub fn fail(&mut self, kind: ErrorKind) {
        if self.error.is_none() {
            self.error = Some(kind);
        }
    }

    pub fn error(&self) -> Option<&ErrorKind> {
        self.error.as_ref()
    }

    pub fn results(&self) -> &ParseResults<'a> {
        &self.results
    }

    pub fn results_mut(&mut self) -> &mut ParseResults<'a> {
        &mut self.results
    }

    pub fn into_results(self) -> ParseResults<'a> {
        self.results
    }

    /// 按当前 token 查决策表；命中的关键字必须出现在上一个关键字之后
    pub fn next_state(&mut self, default: Option<StateFn>, decisions: &DecisionSet) -> Option<StateFn> {
        if self.error.is_some() {
            return None;
        }
        let kind = self.current.kind;
        let Some(next) = decisions.get(&kind) else {
            return default;
        };
        if kind.rank().is_some() {
            if let Some(last) = self.last_keyword {
                if !precedes(last, kind) {
                    self.fail(ErrorKind::InvalidKeywordOrder);
                    return None;
                }
            }
            self.last_keyword = Some(kind);
        }
        Some(*next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn run_sql(input: &str) -> (Result<(), ErrorKind>, Option<TokenKind>) {
        let tokens: Vec<_> = Lexer::new(input).collect();
        let parser = Parser::builder(Dialect::Sql).build();
        let mut rs = RunState::new(&tokens);
        let outcome = parser.run(&mut rs);
        (outcome, rs.results().verb)
    }

    #[test]
    fn test_peek_and_next_past_end() {
        let tokens: Vec<_> = Lexer::new("a").collect();
        let mut rs = RunState::new(&tokens);
        assert_eq!(rs.next().kind, TokenKind::Identifier);
        assert_eq!(rs.next().kind, TokenKind::Eof);
        assert_eq!(rs.next().kind, TokenKind::Eof);
        assert_eq!(rs.peek().span, Span::new(1, 1));
    }

    #[test]
    fn test_first_error_wins() {
        let tokens: Vec<Token> = Vec::new();
        let mut rs = RunState::new(&tokens);
        rs.fail(ErrorKind::NotAtFrom);
        rs.fail(ErrorKind::StepParse);
        assert_eq!(rs.error(), Some(&ErrorKind::NotAtFrom));
    }

    #[test]
    fn test_lex_error_is_recorded() {
        let tokens: Vec<_> = Lexer::new("SELECT 'oops").collect();
        let parser = Parser::builder(Dialect::Sql).build();
        let mut rs = RunState::new(&tokens);
        let outcome = parser.run(&mut rs);
        assert!(matches!(outcome, Err(ErrorKind::Lex(_))));
    }

    #[test]
    fn test_base_sql_collects_clauses() {
        let tokens: Vec<_> = Lexer::new("SELECT a, b FROM t WHERE a = 1 AND b > 2 ORDER BY a").collect();
        let parser = Parser::builder(Dialect::Sql).build();
        let mut rs = RunState::new(&tokens);
        parser.run(&mut rs).unwrap();
        // FROM and ORDER BY are read through but not kept
        assert_eq!(rs.current().kind, TokenKind::Eof);
        let results = rs.into_results();
        assert_eq!(results.verb, Some(TokenKind::Select));
        assert_eq!(results.select_tokens.len(), 2);
        let where_tokens = results.where_tokens.unwrap();
        assert_eq!(where_tokens.len(), 3);
        assert_eq!(where_tokens[1][0].kind, TokenKind::LogicalAnd);
        assert!(results.group_by_tokens.is_none());
    }

    #[test]
    fn test_keyword_order_is_enforced() {
        let (outcome, _) = run_sql("SELECT a FROM t GROUP BY a WHERE a > 1");
        assert_eq!(outcome, Err(ErrorKind::InvalidKeywordOrder));
    }

    #[test]
    fn test_unsupported_verbs_and_clauses() {
        let (outcome, verb) = run_sql("INSERT INTO t VALUES (1)");
        assert_eq!(outcome, Err(ErrorKind::UnsupportedVerb));
        assert_eq!(verb, None);

        // the base grammar knows no WITH handling
        let (outcome, _) = run_sql("WITH 1 AS a SELECT a FROM t");
        assert_eq!(outcome, Err(ErrorKind::UnsupportedClause));

        let (outcome, verb) = run_sql("SELECT a FROM t UNION SELECT b FROM u");
        assert_eq!(outcome, Err(ErrorKind::UnsupportedKeyword));
        assert_eq!(verb, Some(TokenKind::Select));
    }

    #[test]
    fn test_empty_statement() {
        let (outcome, verb) = run_sql("   ");
        assert_eq!(outcome, Err(ErrorKind::UnexpectedToken));
        assert_eq!(verb, None);
    }

    #[test]
    fn test_with_decisions_can_remove_branches() {
        let tokens: Vec<_> = Lexer::new("SELECT a FROM t WHERE a > 1").collect();
        let parser = Parser::builder(Dialect::Sql)
            .with_decisions(DecisionPoint::SelectQueryKeywords, [(TokenKind::Where, None)])
            .build();
        assert!(!parser.decisions(DecisionPoint::SelectQueryKeywords).contains_key(&TokenKind::Where));
        let mut rs = RunState::new(&tokens);
        parser.run(&mut rs).unwrap();
        assert!(rs.results().where_tokens.is_none());
    }

    #[test]
    fn test_with_vars_resolve() {
        let value = Token::new(TokenKind::Number, "3600", Span::new(5, 9));
        let mut vars = WithVars::default();
        vars.insert("x", value);
        let ident = Token::new(TokenKind::Identifier, "x", Span::new(40, 41));
        assert_eq!(vars.resolve(&ident), value);
        let other = Token::new(TokenKind::Identifier, "y", Span::new(42, 43));
        assert_eq!(vars.resolve(&other), other);
        assert_eq!(vars.len(), 1);
    }
}
