//! SQL 词法分析器
//!
//! 每个 token 都保留它在原始语句中的字节区间，包括空白和注释，
//! 因此把所有 token 的文本依次拼接即可还原输入。

use crate::keywords::{KeywordTable, SQL_KEYWORDS};
use crate::token::{LexError, Span, Token, TokenKind};

pub struct Lexer<'a> {
    input: &'a str,
    /// 输入字符串中的当前位置（字节索引）
    position: usize,
    keywords: &'a KeywordTable,
    /// 已经产出 EOF 或错误 token
    finished: bool,
}

impl<'a> Lexer<'a> {
    /// 使用基础 SQL 关键字表
    pub fn new(input: &'a str) -> Self {
        Self::with_keywords(input, &SQL_KEYWORDS)
    }

    /// 使用指定方言的关键字表
    pub fn with_keywords(input: &'a str, keywords: &'a KeywordTable) -> Self {
        Lexer { input, position: 0, keywords, finished: false }
    }

    /// 返回当前位置的字符，不推进位置
    fn peek(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    /// 返回下一个位置的字符，不推进位置
    fn peek_next(&self) -> Option<char> {
        self.input[self.position..].chars().nth(1)
    }

    /// 推进位置一个字符并返回该字符
    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if let Some(c) = c {
            self.position += c.len_utf8();
        }
        c
    }

    fn token(&self, kind: TokenKind, start: usize) -> Token<'a> {
        Token::new(kind, &self.input[start..self.position], Span::new(start, self.position))
    }

    /// 跳过空白字符
    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else {
                break;
            }
        }
    }

    /// 跳到行尾（不消费换行符）
    fn skip_line(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }

    /// 读取块注释，开始的 `/*` 已经被消费
    fn read_block_comment(&mut self) -> TokenKind {
        loop {
            match self.bump() {
                None => return TokenKind::Error(LexError::UnclosedComment),
                Some('*') if self.peek() == Some('/') => {
                    self.bump();
                    return TokenKind::Comment;
                }
                Some(_) => {}
            }
        }
    }

    /// 读取单引号字符串，支持 `\'` 和 `''` 转义
    /// 注意：开始的引号已经被调用者消费
    fn read_string(&mut self) -> TokenKind {
        loop {
            match self.bump() {
                None => return TokenKind::Error(LexError::UnterminatedString),
                Some('\\') => {
                    self.bump();
                }
                Some('\'') => {
                    if self.peek() == Some('\'') {
                        self.bump();
                    } else {
                        return TokenKind::String;
                    }
                }
                Some(_) => {}
            }
        }
    }

    /// 读取双引号或反引号包围的标识符
    fn read_quoted_identifier(&mut self, quote: char) -> TokenKind {
        loop {
            match self.bump() {
                None => return TokenKind::Error(LexError::UnterminatedIdentifier),
                Some(c) if c == quote => return TokenKind::Identifier,
                Some(_) => {}
            }
        }
    }

    /// 读取数字字面量（整数、小数、科学计数法）
    fn read_number(&mut self) -> TokenKind {
        self.eat_digits();
        if self.peek() == Some('.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
            self.eat_digits();
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            let rest = &self.input[self.position + 1..];
            let rest = rest.strip_prefix(['+', '-']).unwrap_or(rest);
            if rest.starts_with(|c: char| c.is_ascii_digit()) {
                self.bump();
                if matches!(self.peek(), Some('+') | Some('-')) {
                    self.bump();
                }
                self.eat_digits();
            }
        }
        TokenKind::Number
    }

    fn eat_digits(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
    }

    /// 读取标识符或关键字
    /// 标识符可以包含字母、数字、下划线和点
    fn read_word(&mut self, start: usize) -> Token<'a> {
        while self.peek().is_some_and(is_identifier_char) {
            self.bump();
        }
        let lowered = self.input[start..self.position].to_ascii_lowercase();

        // 形如 now() 的无参函数关键字
        if self.input[self.position..].starts_with("()") {
            if let Some(kind) = self.keywords.get(&format!("{lowered}()")) {
                self.position += 2;
                return self.token(kind, start);
            }
        }

        // 多词关键字，例如 GROUP BY、UNION ALL，尽量匹配最长的
        if let Some(words) = self.keywords.spaced_hint(&lowered) {
            if let Some((kind, end)) = self.match_spaced_keyword(&lowered, words) {
                self.position = end;
                return self.token(kind, start);
            }
        }

        let kind = match self.keywords.get(&lowered) {
            Some(kind) => kind,
            None if lowered == "true" || lowered == "false" => TokenKind::Bool,
            None => TokenKind::Identifier,
        };
        self.token(kind, start)
    }

    /// 从当前位置向后尝试拼接最多 `words - 1` 个单词
    fn match_spaced_keyword(&self, first: &str, words: usize) -> Option<(TokenKind, usize)> {
        let mut candidate = first.to_string();
        let mut cursor = self.position;
        let mut best = None;
        for _ in 1..words {
            let rest = &self.input[cursor..];
            let gap = rest.len() - rest.trim_start().len();
            if gap == 0 {
                break;
            }
            let word_start = cursor + gap;
            let word_len = self.input[word_start..]
                .find(|c: char| !is_identifier_char(c))
                .unwrap_or(self.input.len() - word_start);
            if word_len == 0 {
                break;
            }
            cursor = word_start + word_len;
            candidate.push(' ');
            candidate.push_str(&self.input[word_start..cursor].to_ascii_lowercase());
            if let Some(kind) = self.keywords.get(&candidate) {
                best = Some((kind, cursor));
            }
        }
        best
    }
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.'
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let start = self.position;

        let Some(c) = self.bump() else {
            // 到达输入末尾
            self.finished = true;
            return Some(self.token(TokenKind::Eof, start));
        };

        let kind = match c {
            c if c.is_whitespace() => {
                self.skip_whitespace();
                TokenKind::Space
            }
            '(' => TokenKind::LeftParen,
            ')' => TokenKind::RightParen,
            ',' => TokenKind::Comma,
            '+' => TokenKind::Plus,
            '*' => TokenKind::Multiply,
            '%' => TokenKind::Modulo,
            '-' => {
                if self.peek() == Some('-') {
                    self.skip_line();
                    TokenKind::Comment
                } else {
                    TokenKind::Minus
                }
            }
            '/' => match self.peek() {
                Some('/') => {
                    self.skip_line();
                    TokenKind::Comment
                }
                Some('*') => {
                    self.bump();
                    self.read_block_comment()
                }
                _ => TokenKind::Divide,
            },
            '=' => {
                if self.peek() == Some('=') {
                    self.bump();
                }
                TokenKind::Equals
            }
            '!' => {
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::NotEqual
                } else {
                    TokenKind::Error(LexError::InvalidCharacter)
                }
            }
            '<' => match self.peek() {
                Some('=') => {
                    self.bump();
                    TokenKind::LessThanOrEqual
                }
                Some('>') => {
                    self.bump();
                    TokenKind::NotEqual
                }
                _ => TokenKind::LessThan,
            },
            '>' => {
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::GreaterThanOrEqual
                } else {
                    TokenKind::GreaterThan
                }
            }
            '\'' => self.read_string(),
            '"' | '`' => self.read_quoted_identifier(c),
            c if c.is_ascii_digit() => self.read_number(),
            c if c.is_alphabetic() || c == '_' => return Some(self.read_word(start)),
            c if c.is_ascii_graphic() => TokenKind::Char,
            _ => TokenKind::Error(LexError::InvalidCharacter),
        };
        if matches!(kind, TokenKind::Error(_)) {
            self.finished = true;
        }
        Some(self.token(kind, start))
    }
}
