use super::{NumberValue, Span};
use crate::diagnostics::{codes, Diagnostic, DiagnosticHandler};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Name(String),
    Number(NumberValue),
    String(String),
    /// Text of a `---@` annotation line, starting at the `@`
    Doc(String),

    And,
    Break,
    Do,
    Else,
    Elseif,
    End,
    False,
    For,
    Function,
    Goto,
    If,
    In,
    Local,
    Nil,
    Not,
    Or,
    Repeat,
    Return,
    Then,
    True,
    Until,
    While,

    Plus,
    Minus,
    Star,
    Slash,
    DoubleSlash,
    Percent,
    Caret,
    Hash,
    Ampersand,
    Tilde,
    Pipe,
    ShiftLeft,
    ShiftRight,
    Concat,
    Dots,
    EqEq,
    NotEq,
    LessEq,
    GreaterEq,
    Less,
    Greater,
    Assign,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    DoubleColon,
    Semicolon,
    Colon,
    Comma,
    Dot,

    Eof,
}

impl TokenKind {
    fn keyword(word: &str) -> Option<TokenKind> {
        let kind = match word {
            "and" => TokenKind::And,
            "break" => TokenKind::Break,
            "do" => TokenKind::Do,
            "else" => TokenKind::Else,
            "elseif" => TokenKind::Elseif,
            "end" => TokenKind::End,
            "false" => TokenKind::False,
            "for" => TokenKind::For,
            "function" => TokenKind::Function,
            "goto" => TokenKind::Goto,
            "if" => TokenKind::If,
            "in" => TokenKind::In,
            "local" => TokenKind::Local,
            "nil" => TokenKind::Nil,
            "not" => TokenKind::Not,
            "or" => TokenKind::Or,
            "repeat" => TokenKind::Repeat,
            "return" => TokenKind::Return,
            "then" => TokenKind::Then,
            "true" => TokenKind::True,
            "until" => TokenKind::Until,
            "while" => TokenKind::While,
            _ => return None,
        };
        Some(kind)
    }

    /// Human readable form used in parse diagnostics
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Name(name) => format!("identifier '{}'", name),
            TokenKind::Number(_) => "number".to_string(),
            TokenKind::String(_) => "string".to_string(),
            TokenKind::Doc(_) => "annotation".to_string(),
            TokenKind::Eof => "end of file".to_string(),
            other => format!("'{}'", other.symbol()),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            TokenKind::And => "and",
            TokenKind::Break => "break",
            TokenKind::Do => "do",
            TokenKind::Else => "else",
            TokenKind::Elseif => "elseif",
            TokenKind::End => "end",
            TokenKind::False => "false",
            TokenKind::For => "for",
            TokenKind::Function => "function",
            TokenKind::Goto => "goto",
            TokenKind::If => "if",
            TokenKind::In => "in",
            TokenKind::Local => "local",
            TokenKind::Nil => "nil",
            TokenKind::Not => "not",
            TokenKind::Or => "or",
            TokenKind::Repeat => "repeat",
            TokenKind::Return => "return",
            TokenKind::Then => "then",
            TokenKind::True => "true",
            TokenKind::Until => "until",
            TokenKind::While => "while",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::DoubleSlash => "//",
            TokenKind::Percent => "%",
            TokenKind::Caret => "^",
            TokenKind::Hash => "#",
            TokenKind::Ampersand => "&",
            TokenKind::Tilde => "~",
            TokenKind::Pipe => "|",
            TokenKind::ShiftLeft => "<<",
            TokenKind::ShiftRight => ">>",
            TokenKind::Concat => "..",
            TokenKind::Dots => "...",
            TokenKind::EqEq => "==",
            TokenKind::NotEq => "~=",
            TokenKind::LessEq => "<=",
            TokenKind::GreaterEq => ">=",
            TokenKind::Less => "<",
            TokenKind::Greater => ">",
            TokenKind::Assign => "=",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::DoubleColon => "::",
            TokenKind::Semicolon => ";",
            TokenKind::Colon => ":",
            TokenKind::Comma => ",",
            TokenKind::Dot => ".",
            TokenKind::Name(_)
            | TokenKind::Number(_)
            | TokenKind::String(_)
            | TokenKind::Doc(_)
            | TokenKind::Eof => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

/// Converts Lua source into tokens. Problems are reported to the handler and
/// lexing continues, so the token stream always ends with [`TokenKind::Eof`].
pub struct Lexer<'src> {
    source: &'src str,
    bytes: &'src [u8],
    pos: usize,
    line: u32,
    line_start: usize,
    handler: Arc<dyn DiagnosticHandler>,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str, handler: Arc<dyn DiagnosticHandler>) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            line: 1,
            line_start: 0,
            handler,
        }
    }

    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                break;
            }
        }
        tokens
    }

    fn peek(&self) -> u8 {
        self.bytes.get(self.pos).copied().unwrap_or(0)
    }

    fn peek_at(&self, offset: usize) -> u8 {
        self.bytes.get(self.pos + offset).copied().unwrap_or(0)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn bump(&mut self) -> u8 {
        let byte = self.peek();
        self.pos += 1;
        if byte == b'\n' {
            self.line += 1;
            self.line_start = self.pos;
        }
        byte
    }

    fn span_from(&self, start: usize, line: u32, column: u32) -> Span {
        Span::new(start as u32, self.pos as u32, line, column)
    }

    fn report(&self, start: usize, line: u32, column: u32, diagnostic_code: crate::diagnostics::DiagnosticCode, message: String) {
        self.handler.report(Diagnostic::error_with_code(
            self.span_from(start, line, column),
            diagnostic_code,
            message,
        ));
    }

    fn next_token(&mut self) -> Token {
        loop {
            self.skip_whitespace();
            let start = self.pos;
            let line = self.line;
            let column = (self.pos - self.line_start) as u32 + 1;

            if self.at_end() {
                return Token {
                    kind: TokenKind::Eof,
                    span: self.span_from(start, line, column),
                };
            }

            if self.peek() == b'-' && self.peek_at(1) == b'-' {
                if let Some(doc) = self.comment() {
                    let doc_start = start + 3;
                    let span = Span::new(doc_start as u32, self.pos as u32, line, column + 3);
                    return Token {
                        kind: TokenKind::Doc(doc),
                        span,
                    };
                }
                continue;
            }

            let kind = self.scan(start, line, column);
            if let Some(kind) = kind {
                return Token {
                    kind,
                    span: self.span_from(start, line, column),
                };
            }
        }
    }

    fn skip_whitespace(&mut self) {
        while !self.at_end() && self.peek().is_ascii_whitespace() {
            self.bump();
        }
    }

    /// Consumes a comment; returns the annotation text for `---@` lines
    fn comment(&mut self) -> Option<String> {
        let start = self.pos;
        let line = self.line;
        let column = (self.pos - self.line_start) as u32 + 1;
        self.bump();
        self.bump();

        if self.peek() == b'[' {
            if let Some(level) = self.long_bracket_level() {
                if self.long_string(level).is_none() {
                    self.report(
                        start,
                        line,
                        column,
                        codes::UNTERMINATED_COMMENT,
                        "unterminated long comment".to_string(),
                    );
                }
                return None;
            }
        }

        let is_doc = self.peek() == b'-' && self.peek_at(1) == b'@';
        if is_doc {
            self.bump();
        }
        let text_start = self.pos;
        while !self.at_end() && self.peek() != b'\n' {
            self.bump();
        }
        if is_doc {
            Some(self.source[text_start..self.pos].trim_end().to_string())
        } else {
            None
        }
    }

    /// If positioned at `[` followed by `=`* and `[`, returns the level
    fn long_bracket_level(&self) -> Option<usize> {
        if self.peek() != b'[' {
            return None;
        }
        let mut level = 0;
        while self.peek_at(1 + level) == b'=' {
            level += 1;
        }
        if self.peek_at(1 + level) == b'[' {
            Some(level)
        } else {
            None
        }
    }

    fn long_string(&mut self, level: usize) -> Option<String> {
        for _ in 0..level + 2 {
            self.bump();
        }
        if self.peek() == b'\r' {
            self.bump();
        }
        if self.peek() == b'\n' {
            self.bump();
        }
        let content_start = self.pos;
        while !self.at_end() {
            if self.peek() == b']' {
                let mut equals = 0;
                while self.peek_at(1 + equals) == b'=' {
                    equals += 1;
                }
                if equals == level && self.peek_at(1 + equals) == b']' {
                    let content = self.source[content_start..self.pos].to_string();
                    for _ in 0..level + 2 {
                        self.bump();
                    }
                    return Some(content);
                }
            }
            self.bump();
        }
        None
    }

    fn scan(&mut self, start: usize, line: u32, column: u32) -> Option<TokenKind> {
        let byte = self.peek();

        if byte.is_ascii_alphabetic() || byte == b'_' {
            while self.peek().is_ascii_alphanumeric() || self.peek() == b'_' {
                self.bump();
            }
            let word = &self.source[start..self.pos];
            return Some(
                TokenKind::keyword(word).unwrap_or_else(|| TokenKind::Name(word.to_string())),
            );
        }

        if byte.is_ascii_digit() || (byte == b'.' && self.peek_at(1).is_ascii_digit()) {
            return Some(self.number(start, line, column));
        }

        if byte == b'"' || byte == b'\'' {
            return Some(self.quoted_string(start, line, column));
        }

        if byte == b'[' {
            if let Some(level) = self.long_bracket_level() {
                return match self.long_string(level) {
                    Some(content) => Some(TokenKind::String(content)),
                    None => {
                        self.report(
                            start,
                            line,
                            column,
                            codes::UNTERMINATED_STRING,
                            "unterminated long string".to_string(),
                        );
                        Some(TokenKind::String(String::new()))
                    }
                };
            }
        }

        self.bump();
        let kind = match byte {
            b'+' => TokenKind::Plus,
            b'-' => TokenKind::Minus,
            b'*' => TokenKind::Star,
            b'/' => self.follow(b'/', TokenKind::DoubleSlash, TokenKind::Slash),
            b'%' => TokenKind::Percent,
            b'^' => TokenKind::Caret,
            b'#' => TokenKind::Hash,
            b'&' => TokenKind::Ampersand,
            b'~' => self.follow(b'=', TokenKind::NotEq, TokenKind::Tilde),
            b'|' => TokenKind::Pipe,
            b'<' => match self.peek() {
                b'<' => {
                    self.bump();
                    TokenKind::ShiftLeft
                }
                b'=' => {
                    self.bump();
                    TokenKind::LessEq
                }
                _ => TokenKind::Less,
            },
            b'>' => match self.peek() {
                b'>' => {
                    self.bump();
                    TokenKind::ShiftRight
                }
                b'=' => {
                    self.bump();
                    TokenKind::GreaterEq
                }
                _ => TokenKind::Greater,
            },
            b'=' => self.follow(b'=', TokenKind::EqEq, TokenKind::Assign),
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b'{' => TokenKind::LBrace,
            b'}' => TokenKind::RBrace,
            b'[' => TokenKind::LBracket,
            b']' => TokenKind::RBracket,
            b';' => TokenKind::Semicolon,
            b':' => self.follow(b':', TokenKind::DoubleColon, TokenKind::Colon),
            b',' => TokenKind::Comma,
            b'.' => {
                if self.peek() == b'.' {
                    self.bump();
                    self.follow(b'.', TokenKind::Dots, TokenKind::Concat)
                } else {
                    TokenKind::Dot
                }
            }
            _ => {
                // skip the rest of a multi-byte character
                while !self.at_end() && (self.peek() & 0xC0) == 0x80 {
                    self.bump();
                }
                let text = &self.source[start..self.pos];
                self.report(
                    start,
                    line,
                    column,
                    codes::UNEXPECTED_CHARACTER,
                    format!("unexpected character '{}'", text),
                );
                return None;
            }
        };
        Some(kind)
    }

    fn follow(&mut self, expected: u8, matched: TokenKind, otherwise: TokenKind) -> TokenKind {
        if self.peek() == expected {
            self.bump();
            matched
        } else {
            otherwise
        }
    }

    fn number(&mut self, start: usize, line: u32, column: u32) -> TokenKind {
        let is_hex = self.peek() == b'0' && matches!(self.peek_at(1), b'x' | b'X');
        let mut is_float = false;
        if is_hex {
            self.bump();
            self.bump();
            while self.peek().is_ascii_hexdigit() || self.peek() == b'.' {
                if self.bump() == b'.' {
                    is_float = true;
                }
            }
            if matches!(self.peek(), b'p' | b'P') {
                is_float = true;
                self.bump();
                if matches!(self.peek(), b'+' | b'-') {
                    self.bump();
                }
                while self.peek().is_ascii_digit() {
                    self.bump();
                }
            }
        } else {
            while self.peek().is_ascii_digit() || self.peek() == b'.' {
                if self.bump() == b'.' {
                    is_float = true;
                }
            }
            if matches!(self.peek(), b'e' | b'E') {
                is_float = true;
                self.bump();
                if matches!(self.peek(), b'+' | b'-') {
                    self.bump();
                }
                while self.peek().is_ascii_digit() {
                    self.bump();
                }
            }
        }

        let text = &self.source[start..self.pos];
        let value = if is_hex && !is_float {
            // hexadecimal integers wrap around like the reference interpreter
            text[2..]
                .chars()
                .try_fold(0i64, |acc, c| {
                    c.to_digit(16)
                        .map(|d| acc.wrapping_mul(16).wrapping_add(d as i64))
                })
                .map(NumberValue::Integer)
        } else if is_hex {
            parse_hex_float(&text[2..]).map(NumberValue::Float)
        } else if is_float {
            text.parse::<f64>().ok().map(NumberValue::Float)
        } else {
            text.parse::<i64>()
                .map(NumberValue::Integer)
                .or_else(|_| text.parse::<f64>().map(NumberValue::Float))
                .ok()
        };

        match value {
            Some(value) => TokenKind::Number(value),
            None => {
                self.report(
                    start,
                    line,
                    column,
                    codes::INVALID_NUMBER,
                    format!("malformed number '{}'", text),
                );
                TokenKind::Number(NumberValue::Integer(0))
            }
        }
    }

    fn quoted_string(&mut self, start: usize, line: u32, column: u32) -> TokenKind {
        let quote = self.bump();
        let mut out: Vec<u8> = Vec::new();
        loop {
            if self.at_end() || self.peek() == b'\n' {
                self.report(
                    start,
                    line,
                    column,
                    codes::UNTERMINATED_STRING,
                    "unterminated string".to_string(),
                );
                break;
            }
            let byte = self.bump();
            if byte == quote {
                break;
            }
            if byte != b'\\' {
                out.push(byte);
                continue;
            }
            let escaped = self.bump();
            match escaped {
                b'n' => out.push(b'\n'),
                b't' => out.push(b'\t'),
                b'r' => out.push(b'\r'),
                b'a' => out.push(0x07),
                b'b' => out.push(0x08),
                b'f' => out.push(0x0C),
                b'v' => out.push(0x0B),
                b'\\' | b'"' | b'\'' | b'\n' => out.push(escaped),
                b'z' => self.skip_whitespace(),
                b'x' => {
                    let mut value = 0u8;
                    for _ in 0..2 {
                        if let Some(d) = (self.peek() as char).to_digit(16) {
                            self.bump();
                            value = value.wrapping_mul(16).wrapping_add(d as u8);
                        }
                    }
                    out.push(value);
                }
                b'u' => {
                    let mut code = 0u32;
                    if self.peek() == b'{' {
                        self.bump();
                        while let Some(d) = (self.peek() as char).to_digit(16) {
                            self.bump();
                            code = code.saturating_mul(16).saturating_add(d);
                        }
                        if self.peek() == b'}' {
                            self.bump();
                        }
                    }
                    let ch = char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER);
                    let mut buf = [0u8; 4];
                    out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                }
                b'0'..=b'9' => {
                    let mut value = (escaped - b'0') as u32;
                    for _ in 0..2 {
                        if self.peek().is_ascii_digit() {
                            value = value * 10 + (self.bump() - b'0') as u32;
                        }
                    }
                    out.push(value.min(255) as u8);
                }
                other => out.push(other),
            }
        }
        TokenKind::String(String::from_utf8_lossy(&out).into_owned())
    }
}

fn parse_hex_float(digits: &str) -> Option<f64> {
    let (mantissa, exponent) = match digits.find(['p', 'P']) {
        Some(index) => (&digits[..index], digits[index + 1..].parse::<i32>().ok()?),
        None => (digits, 0),
    };
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    let mut value = 0f64;
    for c in int_part.chars() {
        value = value * 16.0 + c.to_digit(16)? as f64;
    }
    let mut scale = 1.0 / 16.0;
    for c in frac_part.chars() {
        value += c.to_digit(16)? as f64 * scale;
        scale /= 16.0;
    }
    Some(value * 2f64.powi(exponent))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingDiagnosticHandler;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let handler = Arc::new(CollectingDiagnosticHandler::new());
        Lexer::new(source, handler)
            .tokenize()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("1 2.5 0x10 1e2"),
            vec![
                TokenKind::Number(NumberValue::Integer(1)),
                TokenKind::Number(NumberValue::Float(2.5)),
                TokenKind::Number(NumberValue::Integer(16)),
                TokenKind::Number(NumberValue::Float(100.0)),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_strings_and_escapes() {
        assert_eq!(
            kinds(r#"'a\nb' "q\"" [[long]]"#),
            vec![
                TokenKind::String("a\nb".to_string()),
                TokenKind::String("q\"".to_string()),
                TokenKind::String("long".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_doc_comments_are_tokens_and_plain_comments_are_skipped() {
        let tokens = kinds("-- plain\n---@class Foo\n--[[ block ]] x");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Doc("@class Foo".to_string()),
                TokenKind::Name("x".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("a ~= b .. c ... // :: <="),
            vec![
                TokenKind::Name("a".to_string()),
                TokenKind::NotEq,
                TokenKind::Name("b".to_string()),
                TokenKind::Concat,
                TokenKind::Name("c".to_string()),
                TokenKind::Dots,
                TokenKind::DoubleSlash,
                TokenKind::DoubleColon,
                TokenKind::LessEq,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_unexpected_character_is_reported_and_skipped() {
        let handler = Arc::new(CollectingDiagnosticHandler::new());
        let tokens = Lexer::new("a $ b", handler.clone()).tokenize();
        assert_eq!(tokens.len(), 3);
        assert_eq!(handler.error_count(), 1);
    }
}
