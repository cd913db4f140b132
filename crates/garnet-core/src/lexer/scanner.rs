//! The scanner that produces tokens from source text.

use super::{Span, StrSegment, Token, TokenKind};

/// A scanner that tokenizes Ruby source code.
pub struct Scanner<'a> {
    source: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    current_pos: usize,
    line: u32,
    column: u32,
    /// Whether the last emitted token was a newline (collapses blank lines)
    after_newline: bool,
}

impl<'a> Scanner<'a> {
    /// Creates a new scanner for the given source code.
    pub fn new(source: &'a str) -> Self {
        Self::with_line(source, 1)
    }

    /// Creates a scanner whose first line is numbered `line`.
    ///
    /// Used for re-scanning the source of string interpolations.
    pub fn with_line(source: &'a str, line: u32) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
            current_pos: 0,
            line,
            column: 1,
            after_newline: true,
        }
    }

    /// Returns the next token from the source.
    pub fn next_token(&mut self) -> Token {
        loop {
            let spaced = self.skip_whitespace_and_comments() || self.after_newline;

            let start = self.current_pos;
            let (line, column) = (self.line, self.column);

            let Some((_pos, ch)) = self.advance() else {
                return Token::new(TokenKind::Eof, Span::new(start, start), line, column, spaced);
            };

            if ch == '\n' {
                if self.after_newline {
                    continue;
                }
                self.after_newline = true;
                return Token::new(
                    TokenKind::Newline,
                    Span::new(start, self.current_pos),
                    line,
                    column,
                    spaced,
                );
            }

            let kind = match ch {
                '(' => TokenKind::LeftParen,
                ')' => TokenKind::RightParen,
                '[' => TokenKind::LeftBracket,
                ']' => TokenKind::RightBracket,
                '{' => TokenKind::LeftBrace,
                '}' => TokenKind::RightBrace,
                ',' => TokenKind::Comma,
                ';' => TokenKind::Semicolon,
                '?' => TokenKind::Question,
                '~' => TokenKind::Tilde,

                '.' => self.scan_dot(),
                ':' => self.scan_colon(),
                '+' => self.scan_with_assign(TokenKind::Plus, "+"),
                '-' => self.scan_minus(),
                '*' => self.scan_star(),
                '/' => self.scan_with_assign(TokenKind::Slash, "/"),
                '%' => self.scan_with_assign(TokenKind::Percent, "%"),
                '^' => self.scan_with_assign(TokenKind::Caret, "^"),
                '=' => self.scan_equal(),
                '!' => self.scan_bang(),
                '<' => self.scan_less_than(),
                '>' => self.scan_greater_than(),
                '&' => self.scan_ampersand(),
                '|' => self.scan_pipe(),

                '"' => self.scan_double_quoted(),
                '\'' => self.scan_single_quoted(),

                '@' => self.scan_instance_variable(),
                '$' => self.scan_global_variable(),

                '0'..='9' => self.scan_number(ch),

                _ if is_id_start(ch) => self.scan_identifier(ch),

                _ => TokenKind::Invalid(format!("unexpected character '{}'", ch)),
            };

            self.after_newline = false;
            return Token::new(kind, Span::new(start, self.current_pos), line, column, spaced);
        }
    }

    fn advance(&mut self) -> Option<(usize, char)> {
        let result = self.chars.next();
        if let Some((pos, ch)) = result {
            self.current_pos = pos + ch.len_utf8();
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        result
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, ch)| *ch)
    }

    fn peek_next(&self) -> Option<char> {
        let mut iter = self.chars.clone();
        iter.next();
        iter.next().map(|(_, ch)| ch)
    }

    fn at_line_start(&self) -> bool {
        self.current_pos == 0 || self.source[..self.current_pos].ends_with('\n')
    }

    /// Skips blanks, comments and line continuations. Returns whether anything
    /// was skipped.
    fn skip_whitespace_and_comments(&mut self) -> bool {
        let mut skipped = false;
        loop {
            match self.peek() {
                Some(' ' | '\t' | '\r') => {
                    self.advance();
                    skipped = true;
                }
                Some('\\') if self.peek_next() == Some('\n') => {
                    self.advance();
                    self.advance();
                    skipped = true;
                }
                Some('#') => {
                    while let Some(ch) = self.peek() {
                        if ch == '\n' {
                            break;
                        }
                        self.advance();
                    }
                    skipped = true;
                }
                Some('=') if self.at_line_start() && self.source[self.current_pos..].starts_with("=begin") => {
                    self.skip_block_comment();
                    skipped = true;
                }
                _ => break,
            }
        }
        skipped
    }

    fn skip_block_comment(&mut self) {
        while self.peek().is_some() {
            if self.at_line_start() && self.source[self.current_pos..].starts_with("=end") {
                while let Some(ch) = self.peek() {
                    if ch == '\n' {
                        break;
                    }
                    self.advance();
                }
                return;
            }
            self.advance();
        }
    }

    fn scan_with_assign(&mut self, plain: TokenKind, op: &str) -> TokenKind {
        if self.peek() == Some('=') {
            self.advance();
            TokenKind::OpAssign(op.to_string())
        } else {
            plain
        }
    }

    fn scan_dot(&mut self) -> TokenKind {
        if self.peek() == Some('.') {
            self.advance();
            TokenKind::DotDot
        } else {
            TokenKind::Dot
        }
    }

    fn scan_colon(&mut self) -> TokenKind {
        match self.peek() {
            Some(':') => {
                self.advance();
                TokenKind::ColonColon
            }
            Some('"') => {
                self.advance();
                match self.scan_double_quoted() {
                    TokenKind::String(segments) => {
                        let mut name = String::new();
                        for segment in segments {
                            match segment {
                                StrSegment::Text(text) => name.push_str(&text),
                                StrSegment::Code { .. } => {
                                    return TokenKind::Invalid(
                                        "interpolated symbols are not supported".into(),
                                    );
                                }
                            }
                        }
                        TokenKind::Symbol(name)
                    }
                    other => other,
                }
            }
            Some(ch) if is_id_start(ch) => {
                let mut name = String::new();
                while let Some(ch) = self.peek() {
                    if is_id_continue(ch) {
                        name.push(ch);
                        self.advance();
                    } else {
                        break;
                    }
                }
                if let Some(suffix @ ('?' | '!' | '=')) = self.peek() {
                    if self.peek_next() != Some('=') || suffix != '=' {
                        name.push(suffix);
                        self.advance();
                    }
                }
                TokenKind::Symbol(name)
            }
            Some('@') => {
                self.advance();
                match self.scan_instance_variable() {
                    TokenKind::InstanceVar(name) => TokenKind::Symbol(name),
                    other => other,
                }
            }
            Some(_) => match self.scan_operator_symbol() {
                Some(name) => TokenKind::Symbol(name),
                None => TokenKind::Colon,
            },
            None => TokenKind::Colon,
        }
    }

    fn scan_operator_symbol(&mut self) -> Option<String> {
        const OPERATORS: &[&str] = &[
            "[]=", "[]", "<=>", "===", "==", "=~", "!=", "<<", ">>", "<=", ">=", "**", "+@",
            "-@", "+", "-", "*", "/", "%", "<", ">", "!", "&", "|", "^", "~",
        ];
        let rest = &self.source[self.current_pos..];
        let op = OPERATORS.iter().find(|op| rest.starts_with(**op))?;
        for _ in 0..op.chars().count() {
            self.advance();
        }
        Some((*op).to_string())
    }

    fn scan_minus(&mut self) -> TokenKind {
        match self.peek() {
            Some('>') => {
                self.advance();
                TokenKind::Arrow
            }
            Some('=') => {
                self.advance();
                TokenKind::OpAssign("-".into())
            }
            _ => TokenKind::Minus,
        }
    }

    fn scan_star(&mut self) -> TokenKind {
        if self.peek() == Some('*') {
            self.advance();
            self.scan_with_assign(TokenKind::StarStar, "**")
        } else {
            self.scan_with_assign(TokenKind::Star, "*")
        }
    }

    fn scan_equal(&mut self) -> TokenKind {
        match self.peek() {
            Some('=') => {
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                    TokenKind::EqualEqualEqual
                } else {
                    TokenKind::EqualEqual
                }
            }
            Some('~') => {
                self.advance();
                TokenKind::Match
            }
            Some('>') => {
                self.advance();
                TokenKind::FatArrow
            }
            _ => TokenKind::Equal,
        }
    }

    fn scan_bang(&mut self) -> TokenKind {
        if self.peek() == Some('=') {
            self.advance();
            TokenKind::BangEqual
        } else {
            TokenKind::Bang
        }
    }

    fn scan_less_than(&mut self) -> TokenKind {
        match self.peek() {
            Some('=') => {
                self.advance();
                if self.peek() == Some('>') {
                    self.advance();
                    TokenKind::Spaceship
                } else {
                    TokenKind::LessThanEqual
                }
            }
            Some('<') => {
                self.advance();
                self.scan_with_assign(TokenKind::ShiftLeft, "<<")
            }
            _ => TokenKind::LessThan,
        }
    }

    fn scan_greater_than(&mut self) -> TokenKind {
        match self.peek() {
            Some('=') => {
                self.advance();
                TokenKind::GreaterThanEqual
            }
            Some('>') => {
                self.advance();
                self.scan_with_assign(TokenKind::ShiftRight, ">>")
            }
            _ => TokenKind::GreaterThan,
        }
    }

    fn scan_ampersand(&mut self) -> TokenKind {
        if self.peek() == Some('&') {
            self.advance();
            self.scan_with_assign(TokenKind::AmpersandAmpersand, "&&")
        } else {
            self.scan_with_assign(TokenKind::Ampersand, "&")
        }
    }

    fn scan_pipe(&mut self) -> TokenKind {
        if self.peek() == Some('|') {
            self.advance();
            self.scan_with_assign(TokenKind::PipePipe, "||")
        } else {
            self.scan_with_assign(TokenKind::Pipe, "|")
        }
    }

    fn scan_single_quoted(&mut self) -> TokenKind {
        let mut value = String::new();

        loop {
            match self.advance() {
                None => return TokenKind::Invalid("unterminated string meets end of file".into()),
                Some((_, '\'')) => break,
                Some((_, '\\')) => match self.peek() {
                    Some(escaped @ ('\\' | '\'')) => {
                        self.advance();
                        value.push(escaped);
                    }
                    _ => value.push('\\'),
                },
                Some((_, ch)) => value.push(ch),
            }
        }

        TokenKind::String(vec![StrSegment::Text(value)])
    }

    fn scan_double_quoted(&mut self) -> TokenKind {
        let mut segments = Vec::new();
        let mut value = String::new();

        loop {
            match self.advance() {
                None => return TokenKind::Invalid("unterminated string meets end of file".into()),
                Some((_, '"')) => break,
                Some((_, '\\')) => {
                    if let Some((_, escaped)) = self.advance() {
                        match escaped {
                            'n' => value.push('\n'),
                            'r' => value.push('\r'),
                            't' => value.push('\t'),
                            's' => value.push(' '),
                            '0' => value.push('\0'),
                            'e' => value.push('\u{1b}'),
                            '\n' => {}
                            _ => value.push(escaped),
                        }
                    }
                }
                Some((_, '#')) if self.peek() == Some('{') => {
                    let line = self.line;
                    self.advance();
                    let Some(source) = self.scan_interpolation() else {
                        return TokenKind::Invalid("unterminated string interpolation".into());
                    };
                    if !value.is_empty() {
                        segments.push(StrSegment::Text(std::mem::take(&mut value)));
                    }
                    segments.push(StrSegment::Code { source, line });
                }
                Some((_, ch)) => value.push(ch),
            }
        }

        if !value.is_empty() || segments.is_empty() {
            segments.push(StrSegment::Text(value));
        }
        TokenKind::String(segments)
    }

    /// Collects the raw source of `#{ ... }`, honoring nested braces and
    /// quoted strings. The opening brace has already been consumed.
    fn scan_interpolation(&mut self) -> Option<String> {
        let start = self.current_pos;
        let mut depth = 1usize;
        let mut quote: Option<char> = None;

        while let Some((pos, ch)) = self.advance() {
            match quote {
                Some(q) if ch == q => quote = None,
                Some(_) if ch == '\\' => {
                    self.advance();
                }
                Some(_) => {}
                None => match ch {
                    '"' | '\'' => quote = Some(ch),
                    '{' => depth += 1,
                    '}' => {
                        depth -= 1;
                        if depth == 0 {
                            return Some(self.source[start..pos].to_string());
                        }
                    }
                    _ => {}
                },
            }
        }
        None
    }

    fn scan_instance_variable(&mut self) -> TokenKind {
        if self.peek() == Some('@') {
            return TokenKind::Invalid("class variables are not supported".into());
        }
        let mut name = String::from("@");
        while let Some(ch) = self.peek() {
            if is_id_continue(ch) {
                name.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        if name.len() == 1 {
            TokenKind::Invalid("'@' without identifiers is not allowed as an instance variable name".into())
        } else {
            TokenKind::InstanceVar(name)
        }
    }

    fn scan_global_variable(&mut self) -> TokenKind {
        let mut name = String::from("$");
        match self.peek() {
            Some(special @ ('!' | '0' | ':' | '~')) => {
                self.advance();
                name.push(special);
            }
            _ => {
                while let Some(ch) = self.peek() {
                    if is_id_continue(ch) {
                        name.push(ch);
                        self.advance();
                    } else {
                        break;
                    }
                }
            }
        }
        if name.len() == 1 {
            TokenKind::Invalid("'$' without identifiers is not allowed as a global variable name".into())
        } else {
            TokenKind::GlobalVar(name)
        }
    }

    fn scan_number(&mut self, first: char) -> TokenKind {
        if first == '0' {
            match self.peek() {
                Some('x' | 'X') => return self.scan_radix_number(16),
                Some('o' | 'O') => return self.scan_radix_number(8),
                Some('b' | 'B') => return self.scan_radix_number(2),
                _ => {}
            }
        }

        let mut value = String::from(first);
        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() || ch == '_' {
                if ch != '_' {
                    value.push(ch);
                }
                self.advance();
            } else {
                break;
            }
        }

        if self.peek() == Some('.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            return TokenKind::Invalid("floating point literals are not supported".into());
        }

        match value.parse::<i64>() {
            Ok(n) => TokenKind::Integer(n),
            Err(_) => TokenKind::Invalid(format!("integer literal {} is out of range", value)),
        }
    }

    fn scan_radix_number(&mut self, radix: u32) -> TokenKind {
        self.advance(); // consume the radix marker
        let mut value = String::new();

        while let Some(ch) = self.peek() {
            if ch.is_digit(radix) || ch == '_' {
                if ch != '_' {
                    value.push(ch);
                }
                self.advance();
            } else {
                break;
            }
        }

        match i64::from_str_radix(&value, radix) {
            Ok(n) => TokenKind::Integer(n),
            Err(_) => TokenKind::Invalid(format!("numeric literal without digits or out of range: {}", value)),
        }
    }

    fn scan_identifier(&mut self, first: char) -> TokenKind {
        let mut name = String::from(first);

        while let Some(ch) = self.peek() {
            if is_id_continue(ch) {
                name.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        // Predicate and bang method names
        if let Some(suffix @ ('?' | '!')) = self.peek() {
            if self.peek_next() != Some('=') {
                name.push(suffix);
                self.advance();
            }
        }

        // Hash labels (`key: value`)
        if self.peek() == Some(':') && self.peek_next() != Some(':') && !name.ends_with('?') {
            self.advance();
            return TokenKind::Label(name);
        }

        if let Some(keyword) = TokenKind::keyword(&name) {
            return keyword;
        }

        if first.is_uppercase() {
            TokenKind::Constant(name)
        } else {
            TokenKind::Identifier(name)
        }
    }
}

/// Checks if a character can start an identifier.
fn is_id_start(ch: char) -> bool {
    ch == '_' || unicode_xid::UnicodeXID::is_xid_start(ch)
}

/// Checks if a character can continue an identifier.
fn is_id_continue(ch: char) -> bool {
    ch == '_' || unicode_xid::UnicodeXID::is_xid_continue(ch)
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        let token = self.next_token();
        if token.kind == TokenKind::Eof {
            None
        } else {
            Some(token)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Scanner::new(source).map(|t| t.kind).collect()
    }

    #[test]
    fn test_simple_tokens() {
        let mut scanner = Scanner::new("{ } ( )");
        assert!(matches!(scanner.next_token().kind, TokenKind::LeftBrace));
        assert!(matches!(scanner.next_token().kind, TokenKind::RightBrace));
        assert!(matches!(scanner.next_token().kind, TokenKind::LeftParen));
        assert!(matches!(scanner.next_token().kind, TokenKind::RightParen));
    }

    #[test]
    fn test_integers() {
        let mut scanner = Scanner::new("42 1_000 0xff 0b1010 0o17");
        assert!(matches!(scanner.next_token().kind, TokenKind::Integer(42)));
        assert!(matches!(scanner.next_token().kind, TokenKind::Integer(1000)));
        assert!(matches!(scanner.next_token().kind, TokenKind::Integer(255)));
        assert!(matches!(scanner.next_token().kind, TokenKind::Integer(10)));
        assert!(matches!(scanner.next_token().kind, TokenKind::Integer(15)));
    }

    #[test]
    fn test_float_rejected() {
        assert!(matches!(kinds("1.5")[0], TokenKind::Invalid(_)));
        // A method call on an integer is not a float
        assert_eq!(
            kinds("1.succ"),
            vec![
                TokenKind::Integer(1),
                TokenKind::Dot,
                TokenKind::Identifier("succ".into())
            ]
        );
    }

    #[test]
    fn test_strings() {
        let tokens = kinds(r#""hello" 'wor\'ld'"#);
        assert_eq!(tokens[0], TokenKind::String(vec![StrSegment::Text("hello".into())]));
        assert_eq!(tokens[1], TokenKind::String(vec![StrSegment::Text("wor'ld".into())]));
    }

    #[test]
    fn test_interpolation_segments() {
        let tokens = kinds(r#""a #{b + "}"} c""#);
        assert_eq!(
            tokens[0],
            TokenKind::String(vec![
                StrSegment::Text("a ".into()),
                StrSegment::Code {
                    source: r#"b + "}""#.into(),
                    line: 1
                },
                StrSegment::Text(" c".into()),
            ])
        );
    }

    #[test]
    fn test_names() {
        assert_eq!(
            kinds("foo Bar @baz $qux empty? save!"),
            vec![
                TokenKind::Identifier("foo".into()),
                TokenKind::Constant("Bar".into()),
                TokenKind::InstanceVar("@baz".into()),
                TokenKind::GlobalVar("$qux".into()),
                TokenKind::Identifier("empty?".into()),
                TokenKind::Identifier("save!".into()),
            ]
        );
    }

    #[test]
    fn test_bang_equal_after_identifier() {
        assert_eq!(
            kinds("a!=b"),
            vec![
                TokenKind::Identifier("a".into()),
                TokenKind::BangEqual,
                TokenKind::Identifier("b".into()),
            ]
        );
    }

    #[test]
    fn test_symbols_and_labels() {
        assert_eq!(
            kinds(":name :<=> :\"two words\" key: Foo::Bar"),
            vec![
                TokenKind::Symbol("name".into()),
                TokenKind::Symbol("<=>".into()),
                TokenKind::Symbol("two words".into()),
                TokenKind::Label("key".into()),
                TokenKind::Constant("Foo".into()),
                TokenKind::ColonColon,
                TokenKind::Constant("Bar".into()),
            ]
        );
    }

    #[test]
    fn test_instance_variable_symbols() {
        assert_eq!(
            kinds("get(:@count)"),
            vec![
                TokenKind::Identifier("get".into()),
                TokenKind::LeftParen,
                TokenKind::Symbol("@count".into()),
                TokenKind::RightParen,
            ]
        );
        assert!(matches!(kinds(":@@shared")[0], TokenKind::Invalid(_)));
    }

    #[test]
    fn test_keywords() {
        assert_eq!(
            kinds("def end self defined?"),
            vec![TokenKind::Def, TokenKind::End, TokenKind::SelfKw, TokenKind::Defined]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("a += 1 ||= <=> ** -> =>"),
            vec![
                TokenKind::Identifier("a".into()),
                TokenKind::OpAssign("+".into()),
                TokenKind::Integer(1),
                TokenKind::OpAssign("||".into()),
                TokenKind::Spaceship,
                TokenKind::StarStar,
                TokenKind::Arrow,
                TokenKind::FatArrow,
            ]
        );
    }

    #[test]
    fn test_blank_lines_collapse() {
        assert_eq!(
            kinds("a\n\n\nb\n"),
            vec![
                TokenKind::Identifier("a".into()),
                TokenKind::Newline,
                TokenKind::Identifier("b".into()),
                TokenKind::Newline,
            ]
        );
    }

    #[test]
    fn test_line_continuation() {
        assert_eq!(
            kinds("a \\\n+ b"),
            vec![
                TokenKind::Identifier("a".into()),
                TokenKind::Plus,
                TokenKind::Identifier("b".into()),
            ]
        );
    }

    #[test]
    fn test_comments() {
        assert_eq!(
            kinds("1 # comment\n=begin\nignored\n=end\n2"),
            vec![TokenKind::Integer(1), TokenKind::Newline, TokenKind::Integer(2)]
        );
    }

    #[test]
    fn test_positions_and_spacing() {
        let tokens: Vec<Token> = Scanner::new("puts [1]\na[0]").collect();
        let bracket = &tokens[1];
        assert_eq!(bracket.kind, TokenKind::LeftBracket);
        assert!(bracket.spaced);
        assert_eq!((bracket.line, bracket.column), (1, 6));

        let index = tokens.iter().rev().find(|t| t.kind == TokenKind::LeftBracket).unwrap();
        assert!(!index.spaced);
        assert_eq!(index.line, 2);
    }
}
