//! Token definitions for the Ruby lexer.

/// A span in the source code, representing a range of characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    /// Start byte offset (inclusive)
    pub start: usize,
    /// End byte offset (exclusive)
    pub end: usize,
}

impl Span {
    /// Creates a new span.
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Returns the length of this span in bytes.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Returns true if this span is empty.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// A token produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// The kind of token
    pub kind: TokenKind,
    /// The span in the source code
    pub span: Span,
    /// 1-based line of the first character
    pub line: u32,
    /// 1-based column of the first character
    pub column: u32,
    /// Whether whitespace preceded this token on the same line
    pub spaced: bool,
}

impl Token {
    /// Creates a new token.
    pub fn new(kind: TokenKind, span: Span, line: u32, column: u32, spaced: bool) -> Self {
        Self {
            kind,
            span,
            line,
            column,
            spaced,
        }
    }
}

/// One piece of a double-quoted string literal.
#[derive(Debug, Clone, PartialEq)]
pub enum StrSegment {
    /// Literal text with escapes already applied
    Text(String),
    /// Raw source of an `#{...}` interpolation
    Code {
        /// The embedded source
        source: String,
        /// Line the interpolation starts on
        line: u32,
    },
}

/// The different kinds of tokens in Ruby.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    /// Integer literal
    Integer(i64),
    /// String literal, split at interpolations
    String(Vec<StrSegment>),
    /// Symbol literal (`:name`)
    Symbol(String),
    /// Hash label (`name:`)
    Label(String),

    // Names
    /// Identifier (local variable or method name)
    Identifier(String),
    /// Constant (capitalized identifier)
    Constant(String),
    /// Instance variable (`@name`)
    InstanceVar(String),
    /// Global variable (`$name`)
    GlobalVar(String),

    // Keywords
    Alias,
    And,
    Begin,
    Break,
    Case,
    Class,
    Def,
    Defined,
    Do,
    Else,
    Elsif,
    End,
    Ensure,
    False,
    For,
    If,
    In,
    Module,
    Next,
    Nil,
    Not,
    Or,
    Redo,
    Rescue,
    Retry,
    Return,
    SelfKw,
    Super,
    Then,
    True,
    Undef,
    Unless,
    Until,
    When,
    While,
    Yield,

    // Punctuation
    /// {
    LeftBrace,
    /// }
    RightBrace,
    /// (
    LeftParen,
    /// )
    RightParen,
    /// [
    LeftBracket,
    /// ]
    RightBracket,
    /// .
    Dot,
    /// ..
    DotDot,
    /// ,
    Comma,
    /// ;
    Semicolon,
    /// :
    Colon,
    /// ::
    ColonColon,
    /// ?
    Question,
    /// =>
    FatArrow,
    /// ->
    Arrow,
    /// Line break
    Newline,

    // Operators
    /// +
    Plus,
    /// -
    Minus,
    /// *
    Star,
    /// **
    StarStar,
    /// /
    Slash,
    /// %
    Percent,
    /// =
    Equal,
    /// ==
    EqualEqual,
    /// ===
    EqualEqualEqual,
    /// !=
    BangEqual,
    /// =~
    Match,
    /// !
    Bang,
    /// <
    LessThan,
    /// <=
    LessThanEqual,
    /// >
    GreaterThan,
    /// >=
    GreaterThanEqual,
    /// <=>
    Spaceship,
    /// <<
    ShiftLeft,
    /// >>
    ShiftRight,
    /// &
    Ampersand,
    /// &&
    AmpersandAmpersand,
    /// |
    Pipe,
    /// ||
    PipePipe,
    /// ^
    Caret,
    /// ~
    Tilde,
    /// Compound assignment such as `+=` or `||=`; holds the operator
    OpAssign(String),

    // Special
    /// End of file
    Eof,
    /// Invalid token, with a description
    Invalid(String),
}

impl TokenKind {
    /// Returns the keyword for a reserved word, if it is one.
    pub fn keyword(word: &str) -> Option<TokenKind> {
        let kind = match word {
            "alias" => TokenKind::Alias,
            "and" => TokenKind::And,
            "begin" => TokenKind::Begin,
            "break" => TokenKind::Break,
            "case" => TokenKind::Case,
            "class" => TokenKind::Class,
            "def" => TokenKind::Def,
            "defined?" => TokenKind::Defined,
            "do" => TokenKind::Do,
            "else" => TokenKind::Else,
            "elsif" => TokenKind::Elsif,
            "end" => TokenKind::End,
            "ensure" => TokenKind::Ensure,
            "false" => TokenKind::False,
            "for" => TokenKind::For,
            "if" => TokenKind::If,
            "in" => TokenKind::In,
            "module" => TokenKind::Module,
            "next" => TokenKind::Next,
            "nil" => TokenKind::Nil,
            "not" => TokenKind::Not,
            "or" => TokenKind::Or,
            "redo" => TokenKind::Redo,
            "rescue" => TokenKind::Rescue,
            "retry" => TokenKind::Retry,
            "return" => TokenKind::Return,
            "self" => TokenKind::SelfKw,
            "super" => TokenKind::Super,
            "then" => TokenKind::Then,
            "true" => TokenKind::True,
            "undef" => TokenKind::Undef,
            "unless" => TokenKind::Unless,
            "until" => TokenKind::Until,
            "when" => TokenKind::When,
            "while" => TokenKind::While,
            "yield" => TokenKind::Yield,
            _ => return None,
        };
        Some(kind)
    }

    /// Returns the source spelling of a keyword token, if this is one.
    ///
    /// Used where Ruby lets keywords act as method names (`foo.class`).
    pub fn keyword_name(&self) -> Option<&'static str> {
        let name = match self {
            TokenKind::Alias => "alias",
            TokenKind::And => "and",
            TokenKind::Begin => "begin",
            TokenKind::Break => "break",
            TokenKind::Case => "case",
            TokenKind::Class => "class",
            TokenKind::Def => "def",
            TokenKind::Do => "do",
            TokenKind::Else => "else",
            TokenKind::Elsif => "elsif",
            TokenKind::End => "end",
            TokenKind::Ensure => "ensure",
            TokenKind::False => "false",
            TokenKind::For => "for",
            TokenKind::If => "if",
            TokenKind::In => "in",
            TokenKind::Module => "module",
            TokenKind::Next => "next",
            TokenKind::Nil => "nil",
            TokenKind::Not => "not",
            TokenKind::Or => "or",
            TokenKind::Redo => "redo",
            TokenKind::Rescue => "rescue",
            TokenKind::Retry => "retry",
            TokenKind::Return => "return",
            TokenKind::SelfKw => "self",
            TokenKind::Super => "super",
            TokenKind::Then => "then",
            TokenKind::True => "true",
            TokenKind::Undef => "undef",
            TokenKind::Unless => "unless",
            TokenKind::Until => "until",
            TokenKind::When => "when",
            TokenKind::While => "while",
            TokenKind::Yield => "yield",
            _ => return None,
        };
        Some(name)
    }

    /// Returns the method name an operator token dispatches to, if any.
    pub fn operator_method(&self) -> Option<&'static str> {
        let name = match self {
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::StarStar => "**",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::EqualEqual => "==",
            TokenKind::EqualEqualEqual => "===",
            TokenKind::BangEqual => "!=",
            TokenKind::Match => "=~",
            TokenKind::Bang => "!",
            TokenKind::LessThan => "<",
            TokenKind::LessThanEqual => "<=",
            TokenKind::GreaterThan => ">",
            TokenKind::GreaterThanEqual => ">=",
            TokenKind::Spaceship => "<=>",
            TokenKind::ShiftLeft => "<<",
            TokenKind::ShiftRight => ">>",
            TokenKind::Ampersand => "&",
            TokenKind::Pipe => "|",
            TokenKind::Caret => "^",
            TokenKind::Tilde => "~",
            _ => return None,
        };
        Some(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_lookup() {
        assert_eq!(TokenKind::keyword("def"), Some(TokenKind::Def));
        assert_eq!(TokenKind::keyword("self"), Some(TokenKind::SelfKw));
        assert_eq!(TokenKind::keyword("puts"), None);
    }

    #[test]
    fn test_keyword_name_round_trip() {
        for word in ["class", "end", "if", "yield", "nil"] {
            let kind = TokenKind::keyword(word).unwrap();
            assert_eq!(kind.keyword_name(), Some(word));
        }
    }

    #[test]
    fn test_operator_method() {
        assert_eq!(TokenKind::Spaceship.operator_method(), Some("<=>"));
        assert_eq!(TokenKind::ShiftLeft.operator_method(), Some("<<"));
        assert_eq!(TokenKind::Comma.operator_method(), None);
    }

    #[test]
    fn test_span() {
        let span = Span::new(3, 8);
        assert_eq!(span.len(), 5);
        assert!(!span.is_empty());
        assert!(Span::new(4, 4).is_empty());
    }
}
