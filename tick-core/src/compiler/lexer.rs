//! Lexical analysis for Tick source.
//!
//! One-pass scan over the source bytes with a single cursor and
//! line/column tracking. Unknown bytes and unterminated strings become
//! `TokenKind::Error` tokens; the caller decides whether to stop.

use super::token::{Token, TokenKind};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use tracing::trace;

static KEYWORDS: Lazy<HashMap<&'static str, TokenKind>> = Lazy::new(|| {
    HashMap::from([
        ("event", TokenKind::Event),
        ("signal", TokenKind::Signal),
        ("process", TokenKind::Process),
        ("class", TokenKind::Class),
        ("func", TokenKind::Func),
        ("var", TokenKind::Var),
        ("const", TokenKind::Const),
        ("if", TokenKind::If),
        ("else", TokenKind::Else),
        ("while", TokenKind::While),
        ("for", TokenKind::For),
        ("return", TokenKind::Return),
        ("break", TokenKind::Break),
        ("true", TokenKind::True),
        ("false", TokenKind::False),
        ("this", TokenKind::This),
        ("new", TokenKind::New),
        ("import", TokenKind::Import),
        ("from", TokenKind::From),
        ("int", TokenKind::IntType),
        ("bool", TokenKind::BoolType),
        ("float", TokenKind::FloatType),
        ("double", TokenKind::DoubleType),
        ("string", TokenKind::StringType),
    ])
});

pub struct Lexer<'src> {
    source: &'src [u8],
    current: usize,
    line: usize,
    column: usize,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            source: source.as_bytes(),
            current: 0,
            line: 1,
            column: 1,
        }
    }

    /// Scan the whole source. The final token is always `Eof`.
    pub fn tokenize(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                break;
            }
        }
        trace!(target: "tick::lexer", count = tokens.len(), "tokenized source");
        tokens
    }

    fn next_token(&mut self) -> Token {
        self.skip_whitespace_and_comments();

        let line = self.line;
        let column = self.column;

        if self.is_at_end() {
            return Token::new(TokenKind::Eof, "", line, column);
        }

        let c = self.advance();
        let tok = |kind: TokenKind, lexeme: &str| Token::new(kind, lexeme, line, column);

        match c {
            b'(' => tok(TokenKind::LParen, "("),
            b')' => tok(TokenKind::RParen, ")"),
            b'{' => tok(TokenKind::LBrace, "{"),
            b'}' => tok(TokenKind::RBrace, "}"),
            b'[' => tok(TokenKind::LBracket, "["),
            b']' => tok(TokenKind::RBracket, "]"),
            b',' => tok(TokenKind::Comma, ","),
            b';' => tok(TokenKind::Semicolon, ";"),
            b':' => tok(TokenKind::Colon, ":"),
            b'.' => tok(TokenKind::Dot, "."),
            b'@' => tok(TokenKind::At, "@"),
            b'+' => {
                if self.match_byte(b'+') {
                    tok(TokenKind::Increment, "++")
                } else if self.match_byte(b'=') {
                    tok(TokenKind::PlusAssign, "+=")
                } else {
                    tok(TokenKind::Plus, "+")
                }
            }
            b'-' => {
                if self.match_byte(b'-') {
                    tok(TokenKind::Decrement, "--")
                } else if self.match_byte(b'=') {
                    tok(TokenKind::MinusAssign, "-=")
                } else if self.match_byte(b'>') {
                    tok(TokenKind::Arrow, "->")
                } else {
                    tok(TokenKind::Minus, "-")
                }
            }
            b'*' => {
                if self.match_byte(b'=') {
                    tok(TokenKind::StarAssign, "*=")
                } else {
                    tok(TokenKind::Star, "*")
                }
            }
            b'/' => {
                if self.match_byte(b'=') {
                    tok(TokenKind::SlashAssign, "/=")
                } else {
                    tok(TokenKind::Slash, "/")
                }
            }
            b'%' => {
                if self.match_byte(b'=') {
                    tok(TokenKind::PercentAssign, "%=")
                } else {
                    tok(TokenKind::Percent, "%")
                }
            }
            b'=' => {
                if self.match_byte(b'=') {
                    tok(TokenKind::Eq, "==")
                } else {
                    tok(TokenKind::Assign, "=")
                }
            }
            b'!' => {
                if self.match_byte(b'=') {
                    tok(TokenKind::Ne, "!=")
                } else {
                    tok(TokenKind::Not, "!")
                }
            }
            b'<' => {
                if self.match_byte(b'=') {
                    tok(TokenKind::Le, "<=")
                } else {
                    tok(TokenKind::Lt, "<")
                }
            }
            b'>' => {
                if self.match_byte(b'=') {
                    tok(TokenKind::Ge, ">=")
                } else {
                    tok(TokenKind::Gt, ">")
                }
            }
            b'&' => {
                if self.match_byte(b'&') {
                    tok(TokenKind::AndAnd, "&&")
                } else {
                    Token::new(TokenKind::Error, "&", line, column)
                }
            }
            b'|' => {
                if self.match_byte(b'|') {
                    tok(TokenKind::OrOr, "||")
                } else {
                    Token::new(TokenKind::Error, "|", line, column)
                }
            }
            b'"' => self.scan_string(line, column),
            b'0'..=b'9' => {
                self.current -= 1;
                self.column -= 1;
                self.scan_number(line, column)
            }
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                self.current -= 1;
                self.column -= 1;
                self.scan_identifier(line, column)
            }
            other => Token::new(
                TokenKind::Error,
                (other as char).to_string(),
                line,
                column,
            ),
        }
    }

    fn scan_number(&mut self, line: usize, column: usize) -> Token {
        let mut digits = String::new();
        while !self.is_at_end() && self.peek().is_ascii_digit() {
            digits.push(self.advance() as char);
        }

        if self.peek() == b'.' && self.peek_next().is_ascii_digit() {
            digits.push(self.advance() as char);
            while !self.is_at_end() && self.peek().is_ascii_digit() {
                digits.push(self.advance() as char);
            }
            if self.peek() == b'f' {
                self.advance();
                return Token::new(TokenKind::FloatLit, digits, line, column);
            }
            return Token::new(TokenKind::DoubleLit, digits, line, column);
        }

        Token::new(TokenKind::Integer, digits, line, column)
    }

    fn scan_string(&mut self, line: usize, column: usize) -> Token {
        let mut value = String::new();
        while !self.is_at_end() && self.peek() != b'"' {
            if self.peek() == b'\\' {
                self.advance();
                let escaped = match self.peek() {
                    b'n' => '\n',
                    b't' => '\t',
                    b'r' => '\r',
                    b'"' => '"',
                    b'\\' => '\\',
                    other => other as char,
                };
                value.push(escaped);
                if !self.is_at_end() {
                    self.advance();
                }
            } else {
                value.push(self.advance() as char);
            }
        }

        if self.is_at_end() {
            return Token::new(TokenKind::Error, "Unterminated string", line, column);
        }

        self.advance(); // closing quote
        Token::new(TokenKind::Str, value, line, column)
    }

    fn scan_identifier(&mut self, line: usize, column: usize) -> Token {
        let mut ident = String::new();
        while !self.is_at_end() && Self::is_identifier_continue(self.peek()) {
            ident.push(self.advance() as char);
        }

        let kind = KEYWORDS
            .get(ident.as_str())
            .copied()
            .unwrap_or(TokenKind::Identifier);
        Token::new(kind, ident, line, column)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                b' ' | b'\t' | b'\r' | b'\n' => {
                    self.advance();
                }
                b'/' if self.peek_next() == b'/' => {
                    while !self.is_at_end() && self.peek() != b'\n' {
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn is_identifier_continue(c: u8) -> bool {
        c.is_ascii_alphanumeric() || c == b'_'
    }

    fn peek(&self) -> u8 {
        if self.is_at_end() {
            0
        } else {
            self.source[self.current]
        }
    }

    fn peek_next(&self) -> u8 {
        if self.current + 1 >= self.source.len() {
            0
        } else {
            self.source[self.current + 1]
        }
    }

    fn advance(&mut self) -> u8 {
        let c = self.source[self.current];
        self.current += 1;
        if c == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        c
    }

    fn match_byte(&mut self, expected: u8) -> bool {
        if self.peek() == expected {
            self.advance();
            true
        } else {
            false
        }
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src).tokenize().iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_empty_source() {
        assert_eq!(kinds(""), vec![TokenKind::Eof]);
    }

    #[test]
    fn test_keywords_and_identifiers() {
        let tokens = Lexer::new("event tick process worker counter").tokenize();
        assert_eq!(tokens[0].kind, TokenKind::Event);
        assert_eq!(tokens[1].kind, TokenKind::Identifier);
        assert_eq!(tokens[1].lexeme, "tick");
        assert_eq!(tokens[2].kind, TokenKind::Process);
        assert_eq!(tokens[4].kind, TokenKind::Identifier);
    }

    #[test]
    fn test_two_char_operators() {
        assert_eq!(
            kinds("== != <= >= && || -> += -= *= /= %= ++ --"),
            vec![
                TokenKind::Eq,
                TokenKind::Ne,
                TokenKind::Le,
                TokenKind::Ge,
                TokenKind::AndAnd,
                TokenKind::OrOr,
                TokenKind::Arrow,
                TokenKind::PlusAssign,
                TokenKind::MinusAssign,
                TokenKind::StarAssign,
                TokenKind::SlashAssign,
                TokenKind::PercentAssign,
                TokenKind::Increment,
                TokenKind::Decrement,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_single_char_fallback() {
        assert_eq!(
            kinds("= ! < > + - * / %"),
            vec![
                TokenKind::Assign,
                TokenKind::Not,
                TokenKind::Lt,
                TokenKind::Gt,
                TokenKind::Plus,
                TokenKind::Minus,
                TokenKind::Star,
                TokenKind::Slash,
                TokenKind::Percent,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_integer_literal() {
        let tokens = Lexer::new("12345").tokenize();
        assert_eq!(tokens[0].kind, TokenKind::Integer);
        assert_eq!(tokens[0].lexeme, "12345");
    }

    #[test]
    fn test_float_and_double_literals() {
        let tokens = Lexer::new("1.5f 2.75").tokenize();
        assert_eq!(tokens[0].kind, TokenKind::FloatLit);
        assert_eq!(tokens[0].lexeme, "1.5");
        assert_eq!(tokens[1].kind, TokenKind::DoubleLit);
        assert_eq!(tokens[1].lexeme, "2.75");
    }

    #[test]
    fn test_integer_then_dot_is_not_float() {
        // `5.recv` style member access on an integer is nonsense, but the
        // lexer must not eat the dot unless a digit follows.
        assert_eq!(
            kinds("5.x"),
            vec![
                TokenKind::Integer,
                TokenKind::Dot,
                TokenKind::Identifier,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_string_literal_with_escapes() {
        let tokens = Lexer::new(r#""a\tb\n""#).tokenize();
        assert_eq!(tokens[0].kind, TokenKind::Str);
        assert_eq!(tokens[0].lexeme, "a\tb\n");
    }

    #[test]
    fn test_unterminated_string() {
        let tokens = Lexer::new("\"oops").tokenize();
        assert_eq!(tokens[0].kind, TokenKind::Error);
    }

    #[test]
    fn test_unknown_byte() {
        let tokens = Lexer::new("#").tokenize();
        assert_eq!(tokens[0].kind, TokenKind::Error);
        assert_eq!(tokens[0].lexeme, "#");
    }

    #[test]
    fn test_line_comment() {
        assert_eq!(
            kinds("1 // everything after is ignored\n2"),
            vec![TokenKind::Integer, TokenKind::Integer, TokenKind::Eof]
        );
    }

    #[test]
    fn test_line_and_column_tracking() {
        let tokens = Lexer::new("a\n  b").tokenize();
        assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
        assert_eq!((tokens[1].line, tokens[1].column), (2, 3));
    }

    #[test]
    fn test_process_attachment_syntax() {
        assert_eq!(
            kinds("@tick process worker { }"),
            vec![
                TokenKind::At,
                TokenKind::Identifier,
                TokenKind::Process,
                TokenKind::Identifier,
                TokenKind::LBrace,
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_signal_arity_syntax() {
        assert_eq!(
            kinds("signal r[4]: int;"),
            vec![
                TokenKind::Signal,
                TokenKind::Identifier,
                TokenKind::LBracket,
                TokenKind::Integer,
                TokenKind::RBracket,
                TokenKind::Colon,
                TokenKind::IntType,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }
}
