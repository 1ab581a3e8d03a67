//! Lexer.

use crate::coerce::parse_radix_digits;
use crate::error::{Result, VmError};

use super::token::{Span, Token, TokenKind};

pub struct Lexer<'a> {
    source: &'a str,
    /// Current byte position.
    pos: usize,
    /// Current line (1-based).
    line: usize,
    /// Current column (1-based, in characters).
    column: usize,
    token_start: usize,
    token_line: usize,
    token_column: usize,
    /// A line terminator was skipped before the current token.
    newline_before: bool,
    /// Whether a `/` at this point starts a regular expression.
    regexp_allowed: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Lexer {
            source,
            pos: 0,
            line: 1,
            column: 1,
            token_start: 0,
            token_line: 1,
            token_column: 1,
            newline_before: false,
            regexp_allowed: true,
        }
    }

    /// Tokenize the entire source.
    pub fn tokenize(&mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let is_eof = token.is_eof();
            self.regexp_allowed = token.kind.allows_regexp_after();
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }

    pub fn next_token(&mut self) -> Result<Token> {
        self.newline_before = false;
        self.skip_whitespace_and_comments()?;

        self.token_start = self.pos;
        self.token_line = self.line;
        self.token_column = self.column;

        if self.is_eof() {
            return Ok(self.make_token(TokenKind::Eof));
        }

        let ch = self.current();
        if ch.is_ascii_digit() || (ch == '.' && self.peek().is_ascii_digit()) {
            return self.scan_number();
        }
        if ch == '"' || ch == '\'' {
            return self.scan_string(ch);
        }
        if ch == '`' {
            return self.scan_template();
        }
        if is_id_start(ch) || ch == '\\' {
            return self.scan_identifier();
        }
        if ch == '/' && self.regexp_allowed {
            return self.scan_regexp();
        }
        self.scan_punctuator()
    }

    fn error(&self, message: impl Into<String>) -> VmError {
        VmError::compile(message, self.token_line, self.token_column)
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<()> {
        loop {
            while !self.is_eof() && is_whitespace(self.current()) {
                self.advance();
            }

            if self.current() == '/' && self.peek() == '/' {
                while !self.is_eof() && !is_line_terminator(self.current()) {
                    self.advance();
                }
                continue;
            }

            if self.current() == '/' && self.peek() == '*' {
                self.token_line = self.line;
                self.token_column = self.column;
                self.advance();
                self.advance();
                loop {
                    if self.is_eof() {
                        return Err(self.error("Unterminated comment"));
                    }
                    if self.current() == '*' && self.peek() == '/' {
                        self.advance();
                        self.advance();
                        break;
                    }
                    self.advance();
                }
                continue;
            }

            return Ok(());
        }
    }

    fn scan_number(&mut self) -> Result<Token> {
        let start = self.pos;

        if self.current() == '0' {
            let radix = match self.peek() {
                'x' | 'X' => Some(16),
                'o' | 'O' => Some(8),
                'b' | 'B' => Some(2),
                _ => None,
            };
            if let Some(radix) = radix {
                self.advance();
                self.advance();
                let digits_start = self.pos;
                while !self.is_eof() && self.current().is_digit(radix) {
                    self.advance();
                }
                let value = parse_radix_digits(&self.source[digits_start..self.pos], radix)
                    .ok_or_else(|| self.error("Invalid or unexpected token"))?;
                return self.finish_number(value);
            }
        }

        while !self.is_eof() && self.current().is_ascii_digit() {
            self.advance();
        }
        if self.current() == '.' {
            self.advance();
            while !self.is_eof() && self.current().is_ascii_digit() {
                self.advance();
            }
        }
        if matches!(self.current(), 'e' | 'E') {
            self.advance();
            if matches!(self.current(), '+' | '-') {
                self.advance();
            }
            if !self.current().is_ascii_digit() {
                return Err(self.error("Invalid or unexpected token"));
            }
            while !self.is_eof() && self.current().is_ascii_digit() {
                self.advance();
            }
        }
        if self.current() == 'n' {
            return Err(self.error("BigInt literals are not supported"));
        }

        let text = &self.source[start..self.pos];
        let value = text
            .parse::<f64>()
            .map_err(|_| self.error("Invalid or unexpected token"))?;
        self.finish_number(value)
    }

    fn finish_number(&mut self, value: f64) -> Result<Token> {
        // `3in x` and `1x` are errors: a literal may not run into a name.
        if is_id_start(self.current()) {
            return Err(self.error("Invalid or unexpected token"));
        }
        Ok(self.make_token(TokenKind::Number(value)))
    }

    fn scan_string(&mut self, quote: char) -> Result<Token> {
        self.advance();
        let mut value = String::new();

        loop {
            if self.is_eof() || is_line_terminator(self.current()) {
                return Err(self.error("Invalid or unexpected token"));
            }
            let ch = self.current();
            if ch == quote {
                break;
            }
            if ch == '\\' {
                self.advance();
                self.scan_escape(&mut value)?;
            } else {
                value.push(ch);
                self.advance();
            }
        }

        self.advance();
        Ok(self.make_token(TokenKind::String(value)))
    }

    /// Escape sequence after a backslash, shared by strings and templates.
    fn scan_escape(&mut self, value: &mut String) -> Result<()> {
        let ch = self.current();
        match ch {
            'n' => value.push('\n'),
            'r' => value.push('\r'),
            't' => value.push('\t'),
            'b' => value.push('\u{8}'),
            'f' => value.push('\u{c}'),
            'v' => value.push('\u{b}'),
            '0' if !self.peek().is_ascii_digit() => value.push('\0'),
            'x' => {
                self.advance();
                let code = self.scan_hex_digits(2)?;
                value.push(char::from_u32(code).unwrap_or('\u{FFFD}'));
                return Ok(());
            }
            'u' => {
                self.advance();
                let code = self.scan_unicode_escape()?;
                value.push(code);
                return Ok(());
            }
            '\r' => {
                self.advance();
                if self.current() == '\n' {
                    self.advance();
                }
                return Ok(());
            }
            '\n' | '\u{2028}' | '\u{2029}' => {}
            '\0' if self.is_eof() => return Err(self.error("Invalid or unexpected token")),
            other => value.push(other),
        }
        self.advance();
        Ok(())
    }

    /// `XXXX` or `{X...}` after `\u`. Surrogate pairs written as two escapes
    /// are joined; a lone surrogate becomes U+FFFD.
    fn scan_unicode_escape(&mut self) -> Result<char> {
        let code = if self.current() == '{' {
            self.advance();
            let start = self.pos;
            while !self.is_eof() && self.current() != '}' {
                self.advance();
            }
            let code = u32::from_str_radix(&self.source[start..self.pos], 16)
                .map_err(|_| self.error("Invalid Unicode escape sequence"))?;
            self.advance();
            code
        } else {
            self.scan_hex_digits(4)?
        };

        if (0xD800..0xDC00).contains(&code)
            && self.current() == '\\'
            && self.peek() == 'u'
        {
            let rest = &self.source[self.pos + 2..];
            if let Some(low) = rest
                .get(..4)
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .filter(|low| (0xDC00..0xE000).contains(low))
            {
                for _ in 0..6 {
                    self.advance();
                }
                let combined = 0x10000 + ((code - 0xD800) << 10) + (low - 0xDC00);
                return Ok(char::from_u32(combined).unwrap_or('\u{FFFD}'));
            }
        }
        Ok(char::from_u32(code).unwrap_or('\u{FFFD}'))
    }

    /// Template literals without substitutions read as plain strings.
    fn scan_template(&mut self) -> Result<Token> {
        self.advance();
        let mut value = String::new();

        loop {
            if self.is_eof() {
                return Err(self.error("Unterminated template literal"));
            }
            match self.current() {
                '`' => break,
                '$' if self.peek() == '{' => {
                    return Err(self.error("Template substitutions are not supported"));
                }
                '\\' => {
                    self.advance();
                    self.scan_escape(&mut value)?;
                }
                ch => {
                    value.push(ch);
                    self.advance();
                }
            }
        }

        self.advance();
        Ok(self.make_token(TokenKind::String(value)))
    }

    fn scan_identifier(&mut self) -> Result<Token> {
        let mut text = String::new();
        let mut escaped = false;
        while !self.is_eof() {
            let ch = self.current();
            if ch == '\\' {
                self.advance();
                if self.current() != 'u' {
                    return Err(self.error("Invalid or unexpected token"));
                }
                self.advance();
                text.push(self.scan_unicode_escape()?);
                escaped = true;
            } else if is_id_continue(ch) {
                text.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        let kind = match TokenKind::keyword_from_str(&text) {
            Some(_) if escaped => {
                return Err(self.error("Keyword must not contain escaped characters"))
            }
            Some(keyword) => keyword,
            None => TokenKind::Identifier(text),
        };
        Ok(self.make_token(kind))
    }

    fn scan_regexp(&mut self) -> Result<Token> {
        self.advance();
        let start = self.pos;
        let mut in_class = false;
        loop {
            if self.is_eof() || is_line_terminator(self.current()) {
                return Err(self.error("Invalid regular expression: missing /"));
            }
            match self.current() {
                '\\' => {
                    self.advance();
                    if self.is_eof() || is_line_terminator(self.current()) {
                        return Err(self.error("Invalid regular expression: missing /"));
                    }
                }
                '[' => in_class = true,
                ']' => in_class = false,
                '/' if !in_class => break,
                _ => {}
            }
            self.advance();
        }
        let pattern = self.source[start..self.pos].to_string();
        self.advance();

        let flags_start = self.pos;
        while !self.is_eof() && is_id_continue(self.current()) {
            self.advance();
        }
        let flags = self.source[flags_start..self.pos].to_string();
        Ok(self.make_token(TokenKind::RegExp { pattern, flags }))
    }

    fn scan_punctuator(&mut self) -> Result<Token> {
        let ch = self.current();
        self.advance();

        let kind = match ch {
            '{' => TokenKind::LeftBrace,
            '}' => TokenKind::RightBrace,
            '(' => TokenKind::LeftParen,
            ')' => TokenKind::RightParen,
            '[' => TokenKind::LeftBracket,
            ']' => TokenKind::RightBracket,
            ';' => TokenKind::Semicolon,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '~' => TokenKind::Tilde,

            '.' => {
                if self.current() == '.' && self.peek() == '.' {
                    self.advance();
                    self.advance();
                    TokenKind::Ellipsis
                } else {
                    TokenKind::Dot
                }
            }

            '?' => {
                if self.eat('?') {
                    if self.eat('=') {
                        TokenKind::QuestionQuestionAssign
                    } else {
                        TokenKind::QuestionQuestion
                    }
                } else {
                    TokenKind::Question
                }
            }

            '<' => {
                if self.eat('=') {
                    TokenKind::LessEqual
                } else if self.eat('<') {
                    if self.eat('=') {
                        TokenKind::LeftShiftAssign
                    } else {
                        TokenKind::LeftShift
                    }
                } else {
                    TokenKind::LessThan
                }
            }

            '>' => {
                if self.eat('=') {
                    TokenKind::GreaterEqual
                } else if self.eat('>') {
                    if self.eat('>') {
                        if self.eat('=') {
                            TokenKind::UnsignedRightShiftAssign
                        } else {
                            TokenKind::UnsignedRightShift
                        }
                    } else if self.eat('=') {
                        TokenKind::RightShiftAssign
                    } else {
                        TokenKind::RightShift
                    }
                } else {
                    TokenKind::GreaterThan
                }
            }

            '=' => {
                if self.eat('=') {
                    if self.eat('=') {
                        TokenKind::StrictEqual
                    } else {
                        TokenKind::Equal
                    }
                } else if self.eat('>') {
                    TokenKind::Arrow
                } else {
                    TokenKind::Assign
                }
            }

            '!' => {
                if self.eat('=') {
                    if self.eat('=') {
                        TokenKind::StrictNotEqual
                    } else {
                        TokenKind::NotEqual
                    }
                } else {
                    TokenKind::Bang
                }
            }

            '+' => {
                if self.eat('+') {
                    TokenKind::PlusPlus
                } else if self.eat('=') {
                    TokenKind::PlusAssign
                } else {
                    TokenKind::Plus
                }
            }

            '-' => {
                if self.eat('-') {
                    TokenKind::MinusMinus
                } else if self.eat('=') {
                    TokenKind::MinusAssign
                } else {
                    TokenKind::Minus
                }
            }

            '*' => {
                if self.eat('*') {
                    if self.eat('=') {
                        TokenKind::StarStarAssign
                    } else {
                        TokenKind::StarStar
                    }
                } else if self.eat('=') {
                    TokenKind::StarAssign
                } else {
                    TokenKind::Star
                }
            }

            '/' => {
                if self.eat('=') {
                    TokenKind::SlashAssign
                } else {
                    TokenKind::Slash
                }
            }

            '%' => {
                if self.eat('=') {
                    TokenKind::PercentAssign
                } else {
                    TokenKind::Percent
                }
            }

            '&' => {
                if self.eat('&') {
                    if self.eat('=') {
                        TokenKind::AmpersandAmpersandAssign
                    } else {
                        TokenKind::AmpersandAmpersand
                    }
                } else if self.eat('=') {
                    TokenKind::AmpersandAssign
                } else {
                    TokenKind::Ampersand
                }
            }

            '|' => {
                if self.eat('|') {
                    if self.eat('=') {
                        TokenKind::PipePipeAssign
                    } else {
                        TokenKind::PipePipe
                    }
                } else if self.eat('=') {
                    TokenKind::PipeAssign
                } else {
                    TokenKind::Pipe
                }
            }

            '^' => {
                if self.eat('=') {
                    TokenKind::CaretAssign
                } else {
                    TokenKind::Caret
                }
            }

            other => {
                return Err(self.error(format!("Invalid or unexpected token '{}'", other)));
            }
        };

        Ok(self.make_token(kind))
    }

    fn scan_hex_digits(&mut self, count: usize) -> Result<u32> {
        let mut value: u32 = 0;
        for _ in 0..count {
            let Some(digit) = self.current().to_digit(16) else {
                return Err(self.error("Invalid hexadecimal escape sequence"));
            };
            value = value * 16 + digit;
            self.advance();
        }
        Ok(value)
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.source.len()
    }

    fn current(&self) -> char {
        self.source[self.pos..].chars().next().unwrap_or('\0')
    }

    fn peek(&self) -> char {
        let mut chars = self.source[self.pos..].chars();
        chars.next();
        chars.next().unwrap_or('\0')
    }

    fn eat(&mut self, expected: char) -> bool {
        if !self.is_eof() && self.current() == expected {
            self.advance();
            true
        } else {
            false
        }
    }

    fn advance(&mut self) {
        let ch = self.current();
        if self.is_eof() {
            return;
        }
        self.pos += ch.len_utf8();
        if is_line_terminator(ch) {
            // \r\n counts as one line break.
            if !(ch == '\r' && self.current() == '\n') {
                self.line += 1;
                self.column = 1;
            }
            self.newline_before = true;
        } else {
            self.column += 1;
        }
    }

    fn make_token(&self, kind: TokenKind) -> Token {
        Token::new(
            kind,
            Span::new(self.token_start, self.pos, self.token_line, self.token_column),
            self.newline_before,
        )
    }
}

fn is_line_terminator(ch: char) -> bool {
    matches!(ch, '\n' | '\r' | '\u{2028}' | '\u{2029}')
}

fn is_whitespace(ch: char) -> bool {
    matches!(ch, '\u{FEFF}' | '\u{A0}') || ch.is_whitespace()
}

fn is_id_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_' || ch == '$'
}

fn is_id_continue(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '$' || ch == '\u{200C}' || ch == '\u{200D}'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn numbers_in_every_radix() {
        assert_eq!(
            kinds("0xff 0o17 0b101 1.5e3 .25"),
            vec![
                TokenKind::Number(255.0),
                TokenKind::Number(15.0),
                TokenKind::Number(5.0),
                TokenKind::Number(1500.0),
                TokenKind::Number(0.25),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn slash_is_division_after_operands() {
        assert_eq!(
            kinds("a / b"),
            vec![
                TokenKind::Identifier("a".into()),
                TokenKind::Slash,
                TokenKind::Identifier("b".into()),
                TokenKind::Eof,
            ]
        );
        assert_eq!(
            kinds("x = /a[/]b/gi"),
            vec![
                TokenKind::Identifier("x".into()),
                TokenKind::Assign,
                TokenKind::RegExp {
                    pattern: "a[/]b".into(),
                    flags: "gi".into()
                },
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn string_escapes_and_non_ascii_text() {
        assert_eq!(
            kinds(r"'\x41B\u{43}😀é'"),
            vec![TokenKind::String("ABC\u{1F600}é".into()), TokenKind::Eof]
        );
    }

    #[test]
    fn newline_flag_and_positions() {
        let tokens = Lexer::new("a\n  /* x\n */ b").tokenize().unwrap();
        assert!(!tokens[0].newline_before);
        assert!(tokens[1].newline_before);
        assert_eq!((tokens[1].span.line, tokens[1].span.column), (3, 5));
    }

    #[test]
    fn errors_carry_location() {
        match Lexer::new("var s = 'abc\n';").tokenize() {
            Err(VmError::Compile { line, column, .. }) => assert_eq!((line, column), (1, 9)),
            other => panic!("unexpected {:?}", other),
        }
        assert!(Lexer::new("1n").tokenize().is_err());
        assert!(Lexer::new("`a${b}`").tokenize().is_err());
    }

    #[test]
    fn plain_template_reads_as_string() {
        assert_eq!(
            kinds("`hi\\n`"),
            vec![TokenKind::String("hi\n".into()), TokenKind::Eof]
        );
    }
}
