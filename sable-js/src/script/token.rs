//! Token definitions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Source location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    /// Start byte offset.
    pub start: usize,
    /// End byte offset.
    pub end: usize,
    /// Line number (1-based).
    pub line: usize,
    /// Column number (1-based).
    pub column: usize,
}

impl Span {
    pub fn new(start: usize, end: usize, line: usize, column: usize) -> Self {
        Span {
            start,
            end,
            line,
            column,
        }
    }

    /// Span covering both; position information comes from `self`.
    pub fn merge(self, other: Span) -> Self {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            line: self.line,
            column: self.column,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    Number(f64),
    String(String),
    RegExp { pattern: String, flags: String },
    True,
    False,
    Null,

    Identifier(String),

    // Keywords
    Break,
    Case,
    Catch,
    Class,
    Const,
    Continue,
    Debugger,
    Default,
    Delete,
    Do,
    Else,
    Enum,
    Export,
    Extends,
    Finally,
    For,
    Function,
    If,
    Import,
    In,
    Instanceof,
    Let,
    New,
    Return,
    Super,
    Switch,
    This,
    Throw,
    Try,
    Typeof,
    Var,
    Void,
    While,
    With,
    Yield,

    // Punctuators
    LeftBrace,
    RightBrace,
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    Dot,
    Ellipsis,
    Semicolon,
    Comma,
    LessThan,
    GreaterThan,
    LessEqual,
    GreaterEqual,
    Equal,
    NotEqual,
    StrictEqual,
    StrictNotEqual,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    StarStar,
    PlusPlus,
    MinusMinus,
    LeftShift,
    RightShift,
    UnsignedRightShift,
    Ampersand,
    Pipe,
    Caret,
    Bang,
    Tilde,
    AmpersandAmpersand,
    PipePipe,
    QuestionQuestion,
    Question,
    Colon,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    StarStarAssign,
    LeftShiftAssign,
    RightShiftAssign,
    UnsignedRightShiftAssign,
    AmpersandAssign,
    PipeAssign,
    CaretAssign,
    AmpersandAmpersandAssign,
    PipePipeAssign,
    QuestionQuestionAssign,
    Arrow,

    Eof,
}

impl TokenKind {
    /// Check if this is an assignment operator.
    pub fn is_assignment(&self) -> bool {
        matches!(
            self,
            TokenKind::Assign
                | TokenKind::PlusAssign
                | TokenKind::MinusAssign
                | TokenKind::StarAssign
                | TokenKind::SlashAssign
                | TokenKind::PercentAssign
                | TokenKind::StarStarAssign
                | TokenKind::LeftShiftAssign
                | TokenKind::RightShiftAssign
                | TokenKind::UnsignedRightShiftAssign
                | TokenKind::AmpersandAssign
                | TokenKind::PipeAssign
                | TokenKind::CaretAssign
                | TokenKind::AmpersandAmpersandAssign
                | TokenKind::PipePipeAssign
                | TokenKind::QuestionQuestionAssign
        )
    }

    /// Whether a `/` after this token starts a regular expression literal
    /// rather than a division.
    pub fn allows_regexp_after(&self) -> bool {
        !matches!(
            self,
            TokenKind::Number(_)
                | TokenKind::String(_)
                | TokenKind::RegExp { .. }
                | TokenKind::Identifier(_)
                | TokenKind::True
                | TokenKind::False
                | TokenKind::Null
                | TokenKind::This
                | TokenKind::Super
                | TokenKind::RightParen
                | TokenKind::RightBracket
                | TokenKind::RightBrace
                | TokenKind::PlusPlus
                | TokenKind::MinusMinus
        )
    }

    pub fn keyword_from_str(s: &str) -> Option<TokenKind> {
        KEYWORDS
            .iter()
            .find(|(text, _)| *text == s)
            .map(|(_, kind)| kind.clone())
    }

    /// Identifier text, or the spelling of a keyword. Keywords are valid
    /// property names after `.` and in object literals.
    pub fn property_name(&self) -> Option<String> {
        if let TokenKind::Identifier(name) = self {
            return Some(name.clone());
        }
        KEYWORDS
            .iter()
            .find(|(_, kind)| kind == self)
            .map(|(text, _)| text.to_string())
    }
}

const KEYWORDS: [(&str, TokenKind); 38] = [
    ("break", TokenKind::Break),
    ("case", TokenKind::Case),
    ("catch", TokenKind::Catch),
    ("class", TokenKind::Class),
    ("const", TokenKind::Const),
    ("continue", TokenKind::Continue),
    ("debugger", TokenKind::Debugger),
    ("default", TokenKind::Default),
    ("delete", TokenKind::Delete),
    ("do", TokenKind::Do),
    ("else", TokenKind::Else),
    ("enum", TokenKind::Enum),
    ("export", TokenKind::Export),
    ("extends", TokenKind::Extends),
    ("finally", TokenKind::Finally),
    ("for", TokenKind::For),
    ("function", TokenKind::Function),
    ("if", TokenKind::If),
    ("import", TokenKind::Import),
    ("in", TokenKind::In),
    ("instanceof", TokenKind::Instanceof),
    ("let", TokenKind::Let),
    ("new", TokenKind::New),
    ("return", TokenKind::Return),
    ("super", TokenKind::Super),
    ("switch", TokenKind::Switch),
    ("this", TokenKind::This),
    ("throw", TokenKind::Throw),
    ("try", TokenKind::Try),
    ("typeof", TokenKind::Typeof),
    ("var", TokenKind::Var),
    ("void", TokenKind::Void),
    ("while", TokenKind::While),
    ("with", TokenKind::With),
    ("yield", TokenKind::Yield),
    ("true", TokenKind::True),
    ("false", TokenKind::False),
    ("null", TokenKind::Null),
];

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Number(n) => write!(f, "{}", n),
            TokenKind::String(s) => write!(f, "\"{}\"", s),
            TokenKind::RegExp { pattern, flags } => write!(f, "/{}/{}", pattern, flags),
            TokenKind::Identifier(s) => write!(f, "{}", s),
            TokenKind::LeftBrace => write!(f, "{{"),
            TokenKind::RightBrace => write!(f, "}}"),
            TokenKind::LeftParen => write!(f, "("),
            TokenKind::RightParen => write!(f, ")"),
            TokenKind::LeftBracket => write!(f, "["),
            TokenKind::RightBracket => write!(f, "]"),
            TokenKind::Dot => write!(f, "."),
            TokenKind::Ellipsis => write!(f, "..."),
            TokenKind::Semicolon => write!(f, ";"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::Colon => write!(f, ":"),
            TokenKind::Plus => write!(f, "+"),
            TokenKind::Minus => write!(f, "-"),
            TokenKind::Star => write!(f, "*"),
            TokenKind::Slash => write!(f, "/"),
            TokenKind::Assign => write!(f, "="),
            TokenKind::Arrow => write!(f, "=>"),
            TokenKind::Equal => write!(f, "=="),
            TokenKind::StrictEqual => write!(f, "==="),
            TokenKind::Eof => write!(f, "end of input"),
            _ => match self.property_name() {
                Some(keyword) => f.write_str(&keyword),
                None => write!(f, "{:?}", self),
            },
        }
    }
}

/// A token with source location.
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    /// A line terminator precedes this token. Drives semicolon insertion.
    pub newline_before: bool,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span, newline_before: bool) -> Self {
        Token {
            kind,
            span,
            newline_before,
        }
    }

    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }
}
