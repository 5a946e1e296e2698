//! Token definitions for the embeddable PHP subset
//!
//! Names follow php-src/Zend/zend_language_parser.y where a T_* token exists;
//! single-character punctuation gets its own variant.

/// Represents a token type in PHP source code.
///
/// Tokens carry no payload: the text is recovered from the source through
/// the accompanying [`Span`](crate::Span).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Token {
    // Literals
    /// Integer literal (T_LNUMBER)
    LNumber,
    /// Floating-point literal (T_DNUMBER)
    DNumber,
    /// Identifier (T_STRING)
    String,
    /// Variable starting with $ (T_VARIABLE)
    Variable,
    /// Inline HTML outside of <?php tags (T_INLINE_HTML)
    InlineHtml,
    /// Single-quoted string, or double-quoted without interpolation
    /// (T_CONSTANT_ENCAPSED_STRING)
    ConstantEncapsedString,
    /// Double-quoted string that may contain `$var` interpolation
    /// (T_ENCAPSED_AND_WHITESPACE)
    EncapsedAndWhitespace,

    // Keywords
    /// 'echo' keyword (T_ECHO)
    Echo,
    /// 'print' keyword (T_PRINT)
    Print,
    /// 'if' keyword (T_IF)
    If,
    /// 'elseif' keyword (T_ELSEIF)
    Elseif,
    /// 'else' keyword (T_ELSE)
    Else,
    /// 'while' keyword (T_WHILE)
    While,
    /// 'for' keyword (T_FOR)
    For,
    /// 'foreach' keyword (T_FOREACH)
    Foreach,
    /// 'as' keyword (T_AS)
    As,
    /// 'break' keyword (T_BREAK)
    Break,
    /// 'continue' keyword (T_CONTINUE)
    Continue,
    /// 'function' keyword (T_FUNCTION)
    Function,
    /// 'fn' keyword for arrow functions (T_FN)
    Fn,
    /// 'use' keyword (T_USE)
    Use,
    /// 'return' keyword (T_RETURN)
    Return,
    /// 'new' keyword (T_NEW)
    New,
    /// 'instanceof' keyword (T_INSTANCEOF)
    Instanceof,
    /// 'try' keyword (T_TRY)
    Try,
    /// 'catch' keyword (T_CATCH)
    Catch,
    /// 'finally' keyword (T_FINALLY)
    Finally,
    /// 'throw' keyword (T_THROW)
    Throw,
    /// 'exit' or 'die' keyword (T_EXIT)
    Exit,
    /// 'global' keyword (T_GLOBAL)
    Global,
    /// 'isset' keyword (T_ISSET)
    Isset,
    /// 'empty' keyword (T_EMPTY)
    Empty,
    /// 'unset' keyword (T_UNSET)
    Unset,
    /// 'array' keyword (T_ARRAY)
    Array,
    /// 'and' keyword (T_LOGICAL_AND)
    LogicalAnd,
    /// 'or' keyword (T_LOGICAL_OR)
    LogicalOr,
    /// 'xor' keyword (T_LOGICAL_XOR)
    LogicalXor,
    /// __LINE__ magic constant (T_LINE)
    Line,

    // Compound assignment operators
    /// += operator (T_PLUS_EQUAL)
    PlusEqual,
    /// -= operator (T_MINUS_EQUAL)
    MinusEqual,
    /// *= operator (T_MUL_EQUAL)
    MulEqual,
    /// /= operator (T_DIV_EQUAL)
    DivEqual,
    /// .= operator (T_CONCAT_EQUAL)
    ConcatEqual,
    /// %= operator (T_MOD_EQUAL)
    ModEqual,
    /// ??= operator (T_COALESCE_EQUAL)
    CoalesceEqual,

    // Boolean and comparison operators
    /// || operator (T_BOOLEAN_OR)
    BooleanOr,
    /// && operator (T_BOOLEAN_AND)
    BooleanAnd,
    /// == operator (T_IS_EQUAL)
    IsEqual,
    /// != or <> operator (T_IS_NOT_EQUAL)
    IsNotEqual,
    /// === operator (T_IS_IDENTICAL)
    IsIdentical,
    /// !== operator (T_IS_NOT_IDENTICAL)
    IsNotIdentical,
    /// <= operator (T_IS_SMALLER_OR_EQUAL)
    IsSmallerOrEqual,
    /// >= operator (T_IS_GREATER_OR_EQUAL)
    IsGreaterOrEqual,
    /// <=> spaceship operator (T_SPACESHIP)
    Spaceship,

    /// ++ operator (T_INC)
    Inc,
    /// -- operator (T_DEC)
    Dec,

    // Cast operators
    /// (int) cast (T_INT_CAST)
    IntCast,
    /// (float) or (double) cast (T_DOUBLE_CAST)
    DoubleCast,
    /// (string) cast (T_STRING_CAST)
    StringCast,
    /// (array) cast (T_ARRAY_CAST)
    ArrayCast,
    /// (bool) cast (T_BOOL_CAST)
    BoolCast,

    /// -> object operator (T_OBJECT_OPERATOR)
    ObjectOperator,
    /// ?-> nullsafe object operator (T_NULLSAFE_OBJECT_OPERATOR)
    NullsafeObjectOperator,
    /// => double arrow (T_DOUBLE_ARROW)
    DoubleArrow,
    /// :: operator (T_PAAMAYIM_NEKUDOTAYIM)
    PaamayimNekudotayim,
    /// ... ellipsis (T_ELLIPSIS)
    Ellipsis,
    /// ?? null coalesce operator (T_COALESCE)
    Coalesce,
    /// ** power operator (T_POW)
    Pow,

    // PHP tags
    /// <?php open tag (T_OPEN_TAG)
    OpenTag,
    /// <?= open tag with echo (T_OPEN_TAG_WITH_ECHO)
    OpenTagWithEcho,
    /// ?> close tag (T_CLOSE_TAG)
    CloseTag,

    // Punctuation
    /// ;
    Semicolon,
    /// ,
    Comma,
    /// (
    LParen,
    /// )
    RParen,
    /// {
    LBrace,
    /// }
    RBrace,
    /// [
    LBracket,
    /// ]
    RBracket,
    /// =
    Assign,
    /// .
    Dot,
    /// +
    Plus,
    /// -
    Minus,
    /// *
    Star,
    /// /
    Slash,
    /// %
    Percent,
    /// <
    Less,
    /// >
    Greater,
    /// !
    Bang,
    /// ?
    Question,
    /// :
    Colon,
    /// &
    Ampersand,
    /// |
    Bar,
    /// ^
    Caret,
    /// ~
    Tilde,
    /// @
    At,

    /// End of file (END)
    End,
    /// Invalid character or unterminated literal (T_BAD_CHARACTER)
    BadCharacter,
}

impl Token {
    /// Looks up a reserved word. PHP keywords are case-insensitive.
    pub fn keyword(text: &str) -> Option<Token> {
        let token = match text.to_ascii_lowercase().as_str() {
            "and" => Token::LogicalAnd,
            "array" => Token::Array,
            "as" => Token::As,
            "break" => Token::Break,
            "catch" => Token::Catch,
            "continue" => Token::Continue,
            "die" | "exit" => Token::Exit,
            "echo" => Token::Echo,
            "else" => Token::Else,
            "elseif" => Token::Elseif,
            "empty" => Token::Empty,
            "finally" => Token::Finally,
            "fn" => Token::Fn,
            "for" => Token::For,
            "foreach" => Token::Foreach,
            "function" => Token::Function,
            "global" => Token::Global,
            "if" => Token::If,
            "instanceof" => Token::Instanceof,
            "isset" => Token::Isset,
            "new" => Token::New,
            "or" => Token::LogicalOr,
            "print" => Token::Print,
            "return" => Token::Return,
            "throw" => Token::Throw,
            "try" => Token::Try,
            "unset" => Token::Unset,
            "use" => Token::Use,
            "while" => Token::While,
            "xor" => Token::LogicalXor,
            "__line__" => Token::Line,
            _ => return None,
        };
        Some(token)
    }
}
