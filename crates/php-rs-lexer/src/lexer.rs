//! PHP Lexer implementation
//!
//! Reference: php-src/Zend/zend_language_scanner.l

use crate::{Span, Token};

/// Lexer state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// INITIAL state - before <?php or in HTML passthrough
    Initial,
    /// ST_IN_SCRIPTING - inside PHP code
    InScripting,
}

const THREE_CHAR_OPS: &[(&str, Token)] = &[
    ("===", Token::IsIdentical),
    ("!==", Token::IsNotIdentical),
    ("<=>", Token::Spaceship),
    ("...", Token::Ellipsis),
    ("??=", Token::CoalesceEqual),
    ("?->", Token::NullsafeObjectOperator),
];

const TWO_CHAR_OPS: &[(&str, Token)] = &[
    ("==", Token::IsEqual),
    ("!=", Token::IsNotEqual),
    ("<>", Token::IsNotEqual),
    ("<=", Token::IsSmallerOrEqual),
    (">=", Token::IsGreaterOrEqual),
    ("++", Token::Inc),
    ("--", Token::Dec),
    ("+=", Token::PlusEqual),
    ("-=", Token::MinusEqual),
    ("*=", Token::MulEqual),
    ("/=", Token::DivEqual),
    (".=", Token::ConcatEqual),
    ("%=", Token::ModEqual),
    ("&&", Token::BooleanAnd),
    ("||", Token::BooleanOr),
    ("**", Token::Pow),
    ("??", Token::Coalesce),
    ("->", Token::ObjectOperator),
    ("=>", Token::DoubleArrow),
    ("::", Token::PaamayimNekudotayim),
];

const CASTS: &[(&str, Token)] = &[
    ("int", Token::IntCast),
    ("integer", Token::IntCast),
    ("float", Token::DoubleCast),
    ("double", Token::DoubleCast),
    ("string", Token::StringCast),
    ("array", Token::ArrayCast),
    ("bool", Token::BoolCast),
    ("boolean", Token::BoolCast),
];

/// PHP Lexer
pub struct Lexer<'src> {
    /// Source code being tokenized
    source: &'src str,
    /// Current byte position
    pos: usize,
    /// Current line number (1-indexed)
    line: usize,
    /// Current column (1-indexed, byte offset within line)
    column: usize,
    /// Current lexer state
    state: State,
}

impl<'src> Lexer<'src> {
    /// Create a lexer for a file: text is inline HTML until the first `<?php`.
    pub fn new(source: &'src str) -> Self {
        Self {
            source,
            pos: 0,
            line: 1,
            column: 1,
            state: State::Initial,
        }
    }

    /// Create a lexer that starts inside PHP code, the way `eval()` and the
    /// embed SAPI compile strings.
    pub fn new_scripting(source: &'src str) -> Self {
        Self {
            state: State::InScripting,
            ..Self::new(source)
        }
    }

    /// The source being tokenized.
    pub fn source(&self) -> &'src str {
        self.source
    }

    fn peek(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.source[self.pos..].chars().nth(offset)
    }

    /// Peek at the next N bytes; empty if the slice would split a character.
    fn peek_str(&self, n: usize) -> &'src str {
        let end = (self.pos + n).min(self.source.len());
        if !self.source.is_char_boundary(end) {
            return "";
        }
        &self.source[self.pos..end]
    }

    fn consume(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();

        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }

        Some(ch)
    }

    /// Consume N characters (only used on ASCII sequences already peeked).
    fn consume_bytes(&mut self, n: usize) {
        for _ in 0..n {
            if self.consume().is_none() {
                break;
            }
        }
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.source.len()
    }

    /// Scan the next token. Returns `None` at end of input.
    pub fn next_token(&mut self) -> Option<(Token, Span)> {
        match self.state {
            State::Initial => self.scan_initial(),
            State::InScripting => self.scan_scripting(),
        }
    }

    /// Scan in INITIAL state - looking for <?php or <?=
    fn scan_initial(&mut self) -> Option<(Token, Span)> {
        if self.is_eof() {
            return None;
        }

        let start = (self.pos, self.line, self.column);

        if self.peek_str(5).eq_ignore_ascii_case("<?php")
            && self.peek_at(5).is_none_or(|ch| ch.is_whitespace())
        {
            self.consume_bytes(5);
            if self.peek().is_some_and(|ch| ch.is_whitespace()) {
                self.consume();
            }
            self.state = State::InScripting;
            return Some((Token::OpenTag, self.span_from(start)));
        }

        if self.peek_str(3) == "<?=" {
            self.consume_bytes(3);
            self.state = State::InScripting;
            return Some((Token::OpenTagWithEcho, self.span_from(start)));
        }

        // Inline HTML runs up to the next opening tag.
        while !self.is_eof() {
            if self.peek_str(5).eq_ignore_ascii_case("<?php") || self.peek_str(3) == "<?=" {
                break;
            }
            self.consume();
        }
        Some((Token::InlineHtml, self.span_from(start)))
    }

    fn span_from(&self, start: (usize, usize, usize)) -> Span {
        Span::new(start.0, self.pos, start.1, start.2)
    }

    /// Skip whitespace and comments. Returns false if a `?>` was reached.
    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(ch) if ch.is_whitespace() => {
                    self.consume();
                }
                Some('#') if self.peek_at(1) != Some('[') => self.skip_line_comment(),
                Some('/') if self.peek_at(1) == Some('/') => self.skip_line_comment(),
                Some('/') if self.peek_at(1) == Some('*') => {
                    self.consume_bytes(2);
                    while !self.is_eof() && self.peek_str(2) != "*/" {
                        self.consume();
                    }
                    self.consume_bytes(2);
                }
                _ => return,
            }
        }
    }

    /// Line comments end at a newline or just before `?>`.
    fn skip_line_comment(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == '\n' || self.peek_str(2) == "?>" {
                break;
            }
            self.consume();
        }
    }

    /// Scan in ST_IN_SCRIPTING state - inside PHP code
    fn scan_scripting(&mut self) -> Option<(Token, Span)> {
        self.skip_trivia();

        if self.is_eof() {
            return None;
        }

        let start = (self.pos, self.line, self.column);

        if self.peek_str(2) == "?>" {
            self.consume_bytes(2);
            if self.peek() == Some('\n') {
                self.consume();
            }
            self.state = State::Initial;
            return Some((Token::CloseTag, self.span_from(start)));
        }

        if let Some(token) = self.scan_cast() {
            return Some((token, self.span_from(start)));
        }

        for (text, token) in THREE_CHAR_OPS {
            if self.peek_str(3) == *text {
                self.consume_bytes(3);
                return Some((*token, self.span_from(start)));
            }
        }
        for (text, token) in TWO_CHAR_OPS {
            if self.peek_str(2) == *text {
                self.consume_bytes(2);
                return Some((*token, self.span_from(start)));
            }
        }

        let ch = self.peek()?;
        let token = match ch {
            '\'' => self.scan_single_quoted(),
            '"' => self.scan_double_quoted(),
            '$' => self.scan_variable(),
            '0'..='9' => self.scan_number(),
            '.' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => self.scan_number(),
            _ if is_ident_start(ch) => self.scan_identifier(),
            '\\' if self.peek_at(1).is_some_and(is_ident_start) => self.scan_identifier(),
            _ => {
                self.consume();
                match ch {
                    ';' => Token::Semicolon,
                    ',' => Token::Comma,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '{' => Token::LBrace,
                    '}' => Token::RBrace,
                    '[' => Token::LBracket,
                    ']' => Token::RBracket,
                    '=' => Token::Assign,
                    '.' => Token::Dot,
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' => Token::Star,
                    '/' => Token::Slash,
                    '%' => Token::Percent,
                    '<' => Token::Less,
                    '>' => Token::Greater,
                    '!' => Token::Bang,
                    '?' => Token::Question,
                    ':' => Token::Colon,
                    '&' => Token::Ampersand,
                    '|' => Token::Bar,
                    '^' => Token::Caret,
                    '~' => Token::Tilde,
                    '@' => Token::At,
                    _ => Token::BadCharacter,
                }
            }
        };

        Some((token, self.span_from(start)))
    }

    /// `(int)`, `( string )` and friends. Leaves the position untouched when
    /// the parenthesis does not open a cast.
    fn scan_cast(&mut self) -> Option<Token> {
        if self.peek() != Some('(') {
            return None;
        }
        let rest = &self.source[self.pos + 1..];
        let inner_len = rest.find(')')?;
        let inner = rest[..inner_len].trim_matches(|c| c == ' ' || c == '\t');
        let token = CASTS
            .iter()
            .find(|(name, _)| inner.eq_ignore_ascii_case(name))
            .map(|(_, token)| *token)?;
        self.consume_bytes(inner_len + 2);
        Some(token)
    }

    fn scan_single_quoted(&mut self) -> Token {
        self.consume();
        while let Some(ch) = self.consume() {
            match ch {
                '\\' => {
                    self.consume();
                }
                '\'' => return Token::ConstantEncapsedString,
                _ => {}
            }
        }
        Token::BadCharacter
    }

    fn scan_double_quoted(&mut self) -> Token {
        self.consume();
        let mut interpolates = false;
        while let Some(ch) = self.consume() {
            match ch {
                '\\' => {
                    self.consume();
                }
                '$' if self.peek().is_some_and(is_ident_start) => interpolates = true,
                '"' => {
                    return if interpolates {
                        Token::EncapsedAndWhitespace
                    } else {
                        Token::ConstantEncapsedString
                    };
                }
                _ => {}
            }
        }
        Token::BadCharacter
    }

    fn scan_variable(&mut self) -> Token {
        self.consume();
        if !self.peek().is_some_and(is_ident_start) {
            return Token::BadCharacter;
        }
        while self.peek().is_some_and(is_ident_char) {
            self.consume();
        }
        Token::Variable
    }

    fn scan_number(&mut self) -> Token {
        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x') | Some('X')) {
            self.consume_bytes(2);
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit() || c == '_') {
                self.consume();
            }
            return Token::LNumber;
        }

        let mut is_float = false;
        while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '_') {
            self.consume();
        }
        if self.peek() == Some('.') && self.peek_at(1).is_none_or(|c| c.is_ascii_digit() || !is_ident_start(c)) {
            // `1.` is a float, but `1..2` is not.
            if self.peek_at(1) != Some('.') {
                is_float = true;
                self.consume();
                while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '_') {
                    self.consume();
                }
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            let sign = matches!(self.peek_at(1), Some('+') | Some('-'));
            let digit_at = if sign { 2 } else { 1 };
            if self.peek_at(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                self.consume_bytes(digit_at);
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.consume();
                }
            }
        }

        if is_float {
            Token::DNumber
        } else {
            Token::LNumber
        }
    }

    fn scan_identifier(&mut self) -> Token {
        let start = self.pos;
        loop {
            if self.peek() == Some('\\') && self.peek_at(1).is_some_and(is_ident_start) {
                self.consume();
            }
            if !self.peek().is_some_and(is_ident_start) {
                break;
            }
            while self.peek().is_some_and(is_ident_char) {
                self.consume();
            }
            if self.peek() != Some('\\') {
                break;
            }
        }
        Token::keyword(&self.source[start..self.pos]).unwrap_or(Token::String)
    }
}

fn is_ident_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_' || !ch.is_ascii()
}

fn is_ident_char(ch: char) -> bool {
    is_ident_start(ch) || ch.is_ascii_digit()
}
