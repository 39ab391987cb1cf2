//! hexpat-lexer — lexical analysis for the hexpat pattern language.
//!
//! Translates source text into an ordered token stream with line numbers
//! (`spec` §4.2): whitespace separates tokens, line breaks only affect line
//! accounting, integer/float/char/string literals are recognized with their
//! escapes, and operators are matched by maximal munch (`<<=` before `<<`
//! before `<`). The lexer never looks back into the source once a token has
//! been emitted.
//!
//! The final token of every stream is always [`TokenKind::Eof`].

#![deny(missing_docs)]

use core::fmt;

use hexpat_core::{Pos, SourceId, Span, Spanned};

/* ─────────────────────────── Keywords & value types ─────────────────────────── */

/// Reserved words of the pattern language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Keyword {
    /// `struct`
    Struct,
    /// `union`
    Union,
    /// `enum`
    Enum,
    /// `bitfield`
    Bitfield,
    /// `using`
    Using,
    /// `fn`
    Fn,
    /// `return`
    Return,
    /// `break`
    Break,
    /// `continue`
    Continue,
    /// `if`
    If,
    /// `else`
    Else,
    /// `while`
    While,
    /// `for`
    For,
    /// `namespace`
    Namespace,
    /// `le` — force little-endian on the following type.
    LittleEndian,
    /// `be` — force big-endian on the following type.
    BigEndian,
    /// `true`
    True,
    /// `false`
    False,
}

fn keyword_of(s: &str) -> Option<Keyword> {
    Some(match s {
        "struct" => Keyword::Struct,
        "union" => Keyword::Union,
        "enum" => Keyword::Enum,
        "bitfield" => Keyword::Bitfield,
        "using" => Keyword::Using,
        "fn" => Keyword::Fn,
        "return" => Keyword::Return,
        "break" => Keyword::Break,
        "continue" => Keyword::Continue,
        "if" => Keyword::If,
        "else" => Keyword::Else,
        "while" => Keyword::While,
        "for" => Keyword::For,
        "namespace" => Keyword::Namespace,
        "le" => Keyword::LittleEndian,
        "be" => Keyword::BigEndian,
        "true" => Keyword::True,
        "false" => Keyword::False,
        _ => return None,
    })
}

/// The closed set of builtin value types (`spec` §3.2). Size and signedness
/// class are recoverable directly from the variant, without a lookup table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ValueType {
    /// `u8`
    Unsigned8,
    /// `u16`
    Unsigned16,
    /// `u32`
    Unsigned32,
    /// `u64`
    Unsigned64,
    /// `u128`
    Unsigned128,
    /// `s8`
    Signed8,
    /// `s16`
    Signed16,
    /// `s32`
    Signed32,
    /// `s64`
    Signed64,
    /// `s128`
    Signed128,
    /// `float` (32-bit IEEE-754)
    Float,
    /// `double` (64-bit IEEE-754)
    Double,
    /// `char` (1-byte ASCII)
    Character,
    /// `char16` (2-byte)
    Character16,
    /// `bool`
    Boolean,
    /// `str` (length-prefixed in the AST, byte-run in memory)
    String,
    /// `padding` — reserved bytes, never read.
    Padding,
    /// A not-yet-resolved named type, resolved against the type registry
    /// during evaluation.
    CustomType,
    /// `auto` — inferred from the initializer.
    Auto,
}

/// Signedness class of a [`ValueType`], used by the evaluator's promotion
/// rules (`spec` §4.4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signedness {
    /// Unsigned integer.
    Unsigned,
    /// Signed integer.
    Signed,
    /// IEEE-754 floating point.
    FloatingPoint,
    /// Not a numeric type (bool, char, string, padding, custom, auto).
    NotNumeric,
}

/// A wildcard family used by the parser's lookahead to accept any value type
/// in that family (`spec` §3.1: `Any | Unsigned | Signed | FloatingPoint |
/// Integer`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueTypeClass {
    /// Matches every value type.
    Any,
    /// Matches any unsigned integer width.
    Unsigned,
    /// Matches any signed integer width.
    Signed,
    /// Matches `float` or `double`.
    FloatingPoint,
    /// Matches any signed or unsigned integer width.
    Integer,
}

impl ValueType {
    /// Size in bytes. `0` for types without a fixed byte size
    /// (`CustomType`, `Auto`, `String`, `Padding` without a declared length).
    #[must_use]
    pub const fn size(self) -> u32 {
        match self {
            ValueType::Unsigned8 | ValueType::Signed8 | ValueType::Character | ValueType::Boolean => 1,
            ValueType::Unsigned16 | ValueType::Signed16 | ValueType::Character16 => 2,
            ValueType::Unsigned32 | ValueType::Signed32 | ValueType::Float => 4,
            ValueType::Unsigned64 | ValueType::Signed64 | ValueType::Double => 8,
            ValueType::Unsigned128 | ValueType::Signed128 => 16,
            ValueType::String | ValueType::Padding | ValueType::CustomType | ValueType::Auto => 0,
        }
    }

    /// Signedness class recoverable from the variant alone.
    #[must_use]
    pub const fn signedness(self) -> Signedness {
        match self {
            ValueType::Unsigned8
            | ValueType::Unsigned16
            | ValueType::Unsigned32
            | ValueType::Unsigned64
            | ValueType::Unsigned128 => Signedness::Unsigned,
            ValueType::Signed8
            | ValueType::Signed16
            | ValueType::Signed32
            | ValueType::Signed64
            | ValueType::Signed128 => Signedness::Signed,
            ValueType::Float | ValueType::Double => Signedness::FloatingPoint,
            ValueType::Character
            | ValueType::Character16
            | ValueType::Boolean
            | ValueType::String
            | ValueType::Padding
            | ValueType::CustomType
            | ValueType::Auto => Signedness::NotNumeric,
        }
    }

    /// Whether this value type belongs to `class`.
    #[must_use]
    pub const fn in_class(self, class: ValueTypeClass) -> bool {
        match class {
            ValueTypeClass::Any => true,
            ValueTypeClass::Unsigned => matches!(self.signedness(), Signedness::Unsigned),
            ValueTypeClass::Signed => matches!(self.signedness(), Signedness::Signed),
            ValueTypeClass::FloatingPoint => matches!(self.signedness(), Signedness::FloatingPoint),
            ValueTypeClass::Integer => {
                matches!(self.signedness(), Signedness::Unsigned | Signedness::Signed)
            },
        }
    }

    fn builtin_of(s: &str) -> Option<ValueType> {
        Some(match s {
            "u8" => ValueType::Unsigned8,
            "u16" => ValueType::Unsigned16,
            "u32" => ValueType::Unsigned32,
            "u64" => ValueType::Unsigned64,
            "u128" => ValueType::Unsigned128,
            "s8" => ValueType::Signed8,
            "s16" => ValueType::Signed16,
            "s32" => ValueType::Signed32,
            "s64" => ValueType::Signed64,
            "s128" => ValueType::Signed128,
            "float" => ValueType::Float,
            "double" => ValueType::Double,
            "char" => ValueType::Character,
            "char16" => ValueType::Character16,
            "bool" => ValueType::Boolean,
            "str" => ValueType::String,
            "padding" => ValueType::Padding,
            "auto" => ValueType::Auto,
            _ => return None,
        })
    }
}

/* ─────────────────────────── Operators & separators ─────────────────────────── */

/// Operator tokens, lexed by maximal munch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Operator {
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `%`
    Percent,
    /// `=`
    Assign,
    /// `==`
    EqEq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `<<`
    Shl,
    /// `>>`
    Shr,
    /// `&&`
    AndAnd,
    /// `||`
    OrOr,
    /// `^^` (logical xor)
    XorXor,
    /// `&`
    Amp,
    /// `|`
    Pipe,
    /// `^`
    Caret,
    /// `~`
    Tilde,
    /// `!`
    Bang,
    /// `?`
    Question,
    /// `:`
    Colon,
    /// `::`
    PathSep,
    /// `.`
    Dot,
    /// `@`
    At,
}

/// Separator tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Separator {
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `[[` — attribute list open.
    AttrOpen,
    /// `]]` — attribute list close.
    AttrClose,
    /// `,`
    Comma,
    /// `;` — end of expression/statement.
    Semi,
}

/// An integer literal suffix selecting width/signedness (`spec` §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum IntSuffix {
    /// No suffix.
    #[default]
    None,
    /// `U`
    Unsigned,
    /// `L`
    Long,
    /// `UL`
    UnsignedLong,
    /// `LL`
    LongLong,
    /// `ULL`
    UnsignedLongLong,
}

impl IntSuffix {
    /// The value type a literal with this suffix defaults to.
    #[must_use]
    pub const fn implied_type(self) -> ValueType {
        match self {
            IntSuffix::None => ValueType::Signed32,
            IntSuffix::Unsigned => ValueType::Unsigned32,
            IntSuffix::Long => ValueType::Signed64,
            IntSuffix::UnsignedLong => ValueType::Unsigned64,
            IntSuffix::LongLong => ValueType::Signed64,
            IntSuffix::UnsignedLongLong => ValueType::Unsigned64,
        }
    }
}

/// An integer literal: a 128-bit value plus its optional width/sign suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IntLiteral {
    /// The literal's numeric value.
    pub value: i128,
    /// The suffix that was attached, if any.
    pub suffix: IntSuffix,
}

/// The kind and payload of a single token (`spec` §3.1).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TokenKind {
    /// A reserved word.
    Keyword(Keyword),
    /// A builtin value-type name.
    ValueType(ValueType),
    /// `[A-Za-z_][A-Za-z0-9_]*`, not a keyword or value type.
    Identifier(String),
    /// An integer literal.
    Integer(IntLiteral),
    /// A floating-point literal.
    Float(f64),
    /// A character literal.
    Character(char),
    /// A string literal (already escape-decoded).
    String(String),
    /// An operator.
    Operator(Operator),
    /// A separator.
    Separator(Separator),
    /// `$` — the current byte offset.
    Dollar,
    /// The final token of every stream.
    Eof,
}

/// A token together with its source line.
pub type Token = Spanned<TokenKind>;

/// A lightweight pattern used by the parser's lookahead (`try_consume`) to
/// accept a family of tokens without comparing full payloads — the
/// equivalent of the reference's token-equality-against-wildcards (`spec`
/// §3.1), expressed as an explicit matcher instead of operator overloading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPattern {
    /// Exactly this keyword.
    Keyword(Keyword),
    /// Exactly this operator.
    Operator(Operator),
    /// Exactly this separator.
    Separator(Separator),
    /// Any value type in this family.
    ValueType(ValueTypeClass),
    /// Any identifier.
    AnyIdentifier,
    /// Any integer literal.
    AnyInteger,
    /// Any float literal.
    AnyFloat,
    /// Any string literal.
    AnyString,
    /// Any character literal.
    AnyCharacter,
    /// `$`.
    Dollar,
    /// End of the stream.
    Eof,
}

impl TokenKind {
    /// Whether this token matches `pattern` (`spec` §3.1's match-and-consume
    /// predicate).
    #[must_use]
    pub fn matches(&self, pattern: TokenPattern) -> bool {
        match (self, pattern) {
            (TokenKind::Keyword(a), TokenPattern::Keyword(b)) => *a == b,
            (TokenKind::Operator(a), TokenPattern::Operator(b)) => *a == b,
            (TokenKind::Separator(a), TokenPattern::Separator(b)) => *a == b,
            (TokenKind::ValueType(a), TokenPattern::ValueType(class)) => a.in_class(class),
            (TokenKind::Identifier(_), TokenPattern::AnyIdentifier) => true,
            (TokenKind::Integer(_), TokenPattern::AnyInteger) => true,
            (TokenKind::Float(_), TokenPattern::AnyFloat) => true,
            (TokenKind::String(_), TokenPattern::AnyString) => true,
            (TokenKind::Character(_), TokenPattern::AnyCharacter) => true,
            (TokenKind::Dollar, TokenPattern::Dollar) => true,
            (TokenKind::Eof, TokenPattern::Eof) => true,
            _ => false,
        }
    }
}

/* ─────────────────────────── Errors ─────────────────────────── */

/// The kind of a lexical error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LexErrorKind {
    /// An unexpected character was found outside any literal.
    #[error("unexpected character {0:?}")]
    UnexpectedChar(char),
    /// A `/* ... */` comment was never closed.
    #[error("unterminated block comment")]
    UnterminatedBlockComment,
    /// A `"..."` string was never closed.
    #[error("unterminated string literal")]
    UnterminatedString,
    /// A `'...'` character literal was never closed.
    #[error("unterminated character literal")]
    UnterminatedCharacter,
    /// A newline appeared inside a string literal.
    #[error("string literal contains an unescaped newline")]
    NewlineInString,
    /// A `\x`/`\u` (or unknown) escape sequence was malformed.
    #[error("invalid escape sequence")]
    InvalidEscape,
    /// A numeric literal could not be parsed (bad digit for its base, etc).
    #[error("invalid numeric literal")]
    InvalidNumber,
    /// A numeric literal doesn't fit in 128 bits.
    #[error("integer literal out of range")]
    IntegerOverflow,
    /// A character literal held zero or more than one scalar value.
    #[error("character literal must contain exactly one character")]
    InvalidCharLiteral,
}

/// A lexical error with its source line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} (line {line})")]
pub struct LexError {
    /// Line the error occurred on.
    pub line: u32,
    /// What went wrong.
    pub kind: LexErrorKind,
}

impl From<LexError> for hexpat_core::Diagnostic {
    fn from(e: LexError) -> Self {
        hexpat_core::Diagnostic::new(hexpat_core::ErrorKind::Lex, e.line, e.kind.to_string())
    }
}

type LResult<T> = Result<T, LexError>;

/* ─────────────────────────── Lexer ─────────────────────────── */

/// Streaming lexer over a `&str`.
pub struct Lexer<'a> {
    src: &'a str,
    off: usize,
    line: u32,
    source: SourceId,
}

impl<'a> Lexer<'a> {
    /// Builds a lexer over `src`, reporting line numbers against `source`.
    #[must_use]
    pub fn new(src: &'a str, source: SourceId) -> Self {
        Self { src, off: 0, line: 1, source }
    }

    /// Tokenizes the entire source, always ending with [`TokenKind::Eof`].
    ///
    /// # Errors
    /// Returns the first lexical error encountered.
    pub fn tokenize(mut self) -> LResult<Vec<Token>> {
        let mut out = Vec::new();
        loop {
            let tok = self.next_token()?;
            let is_eof = matches!(tok.value, TokenKind::Eof);
            out.push(tok);
            if is_eof {
                break;
            }
        }
        Ok(out)
    }

    fn next_token(&mut self) -> LResult<Token> {
        self.skip_ws_and_comments()?;
        let line = self.line;
        if self.is_eof() {
            return Ok(Spanned::new(TokenKind::Eof, self.span(line)));
        }

        let c = self.peek_char().unwrap();

        let kind = if is_ident_start(c) {
            self.lex_ident()
        } else if c.is_ascii_digit() {
            self.lex_number(line)?
        } else if c == '"' {
            self.lex_string(line)?
        } else if c == '\'' {
            self.lex_char(line)?
        } else {
            self.lex_operator(line)?
        };

        Ok(Spanned::new(kind, self.span(line)))
    }

    fn span(&self, line: u32) -> Span {
        Span::single(self.source, Pos(line))
    }

    fn err(&self, line: u32, kind: LexErrorKind) -> LexError {
        LexError { line, kind }
    }

    #[inline]
    fn is_eof(&self) -> bool {
        self.off >= self.src.len()
    }

    #[inline]
    fn rest(&self) -> &'a str {
        &self.src[self.off..]
    }

    #[inline]
    fn peek_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    #[inline]
    fn peek_char2(&self) -> Option<char> {
        let mut it = self.rest().chars();
        it.next();
        it.next()
    }

    fn bump_char(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.off += c.len_utf8();
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek_char() == Some(c) {
            self.bump_char();
            true
        } else {
            false
        }
    }

    fn skip_ws_and_comments(&mut self) -> LResult<()> {
        loop {
            while let Some(c) = self.peek_char() {
                if c.is_whitespace() {
                    self.bump_char();
                } else {
                    break;
                }
            }
            if self.peek_char() == Some('/') && self.peek_char2() == Some('/') {
                while let Some(c) = self.peek_char() {
                    if c == '\n' {
                        break;
                    }
                    self.bump_char();
                }
                continue;
            }
            if self.peek_char() == Some('/') && self.peek_char2() == Some('*') {
                let start_line = self.line;
                self.bump_char();
                self.bump_char();
                let mut depth = 1u32;
                loop {
                    if self.is_eof() {
                        return Err(self.err(start_line, LexErrorKind::UnterminatedBlockComment));
                    }
                    if self.peek_char() == Some('/') && self.peek_char2() == Some('*') {
                        self.bump_char();
                        self.bump_char();
                        depth += 1;
                        continue;
                    }
                    if self.peek_char() == Some('*') && self.peek_char2() == Some('/') {
                        self.bump_char();
                        self.bump_char();
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                        continue;
                    }
                    self.bump_char();
                }
                continue;
            }
            break;
        }
        Ok(())
    }

    fn lex_ident(&mut self) -> TokenKind {
        let start = self.off;
        while let Some(c) = self.peek_char() {
            if is_ident_continue(c) {
                self.bump_char();
            } else {
                break;
            }
        }
        let s = &self.src[start..self.off];
        if let Some(kw) = keyword_of(s) {
            TokenKind::Keyword(kw)
        } else if let Some(vt) = ValueType::builtin_of(s) {
            TokenKind::ValueType(vt)
        } else {
            TokenKind::Identifier(s.to_string())
        }
    }

    fn lex_number(&mut self, line: u32) -> LResult<TokenKind> {
        let mut radix = 10u32;
        if self.peek_char() == Some('0') {
            match self.peek_char2() {
                Some('x' | 'X') => {
                    radix = 16;
                    self.bump_char();
                    self.bump_char();
                },
                Some('b' | 'B') => {
                    radix = 2;
                    self.bump_char();
                    self.bump_char();
                },
                Some('o' | 'O') => {
                    radix = 8;
                    self.bump_char();
                    self.bump_char();
                },
                _ => {},
            }
        }

        let digits_start = self.off;
        let mut is_float = false;
        while let Some(c) = self.peek_char() {
            if c == '_' || c.is_digit(radix) {
                self.bump_char();
            } else {
                break;
            }
        }
        if radix == 10 {
            if self.peek_char() == Some('.') && self.peek_char2().is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                self.bump_char();
                while let Some(c) = self.peek_char() {
                    if c.is_ascii_digit() || c == '_' {
                        self.bump_char();
                    } else {
                        break;
                    }
                }
            }
            if matches!(self.peek_char(), Some('e' | 'E')) {
                let save = self.off;
                self.bump_char();
                if matches!(self.peek_char(), Some('+' | '-')) {
                    self.bump_char();
                }
                if self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
                    is_float = true;
                    while let Some(c) = self.peek_char() {
                        if c.is_ascii_digit() {
                            self.bump_char();
                        } else {
                            break;
                        }
                    }
                } else {
                    self.off = save;
                }
            }
        }

        let digits_end = self.off;
        if digits_end == digits_start {
            return Err(self.err(line, LexErrorKind::InvalidNumber));
        }

        if is_float {
            let mantissa_end = self.off;
            if self.peek_char() == Some('f') || self.peek_char() == Some('F') {
                self.bump_char();
            }
            let text: String = self.src[digits_start..mantissa_end].chars().filter(|c| *c != '_').collect();
            let value: f64 = text.parse().map_err(|_| self.err(line, LexErrorKind::InvalidNumber))?;
            return Ok(TokenKind::Float(value));
        }

        let digits: String = self.src[digits_start..digits_end].chars().filter(|c| *c != '_').collect();
        if digits.is_empty() {
            return Err(self.err(line, LexErrorKind::InvalidNumber));
        }
        let value = i128::from_str_radix(&digits, radix).map_err(|_| self.err(line, LexErrorKind::IntegerOverflow))?;

        let suffix = self.lex_int_suffix(line)?;
        Ok(TokenKind::Integer(IntLiteral { value, suffix }))
    }

    fn lex_int_suffix(&mut self, line: u32) -> LResult<IntSuffix> {
        let mut saw_u = false;
        let mut l_count = 0u32;
        loop {
            match self.peek_char() {
                Some('u' | 'U') if !saw_u => {
                    saw_u = true;
                    self.bump_char();
                },
                Some('l' | 'L') if l_count < 2 => {
                    l_count += 1;
                    self.bump_char();
                },
                _ => break,
            }
        }
        Ok(match (saw_u, l_count) {
            (false, 0) => IntSuffix::None,
            (true, 0) => IntSuffix::Unsigned,
            (false, 1) => IntSuffix::Long,
            (true, 1) => IntSuffix::UnsignedLong,
            (false, 2) => IntSuffix::LongLong,
            (true, 2) => IntSuffix::UnsignedLongLong,
            _ => return Err(self.err(line, LexErrorKind::InvalidNumber)),
        })
    }

    fn lex_escape(&mut self, line: u32) -> LResult<char> {
        match self.bump_char() {
            Some('n') => Ok('\n'),
            Some('r') => Ok('\r'),
            Some('t') => Ok('\t'),
            Some('\\') => Ok('\\'),
            Some('\'') => Ok('\''),
            Some('"') => Ok('"'),
            Some('0') => Ok('\0'),
            Some('x') => {
                let mut v: u32 = 0;
                for _ in 0..2 {
                    let d = self.peek_char().and_then(|c| c.to_digit(16)).ok_or_else(|| self.err(line, LexErrorKind::InvalidEscape))?;
                    v = v * 16 + d;
                    self.bump_char();
                }
                char::from_u32(v).ok_or_else(|| self.err(line, LexErrorKind::InvalidEscape))
            },
            Some('u') => {
                let mut v: u32 = 0;
                for _ in 0..4 {
                    let d = self.peek_char().and_then(|c| c.to_digit(16)).ok_or_else(|| self.err(line, LexErrorKind::InvalidEscape))?;
                    v = v * 16 + d;
                    self.bump_char();
                }
                char::from_u32(v).ok_or_else(|| self.err(line, LexErrorKind::InvalidEscape))
            },
            _ => Err(self.err(line, LexErrorKind::InvalidEscape)),
        }
    }

    fn lex_string(&mut self, line: u32) -> LResult<TokenKind> {
        self.bump_char();
        let mut out = String::new();
        loop {
            match self.peek_char() {
                None => return Err(self.err(line, LexErrorKind::UnterminatedString)),
                Some('"') => {
                    self.bump_char();
                    break;
                },
                Some('\n') => return Err(self.err(line, LexErrorKind::NewlineInString)),
                Some('\\') => {
                    self.bump_char();
                    out.push(self.lex_escape(line)?);
                },
                Some(c) => {
                    self.bump_char();
                    out.push(c);
                },
            }
        }
        Ok(TokenKind::String(out))
    }

    fn lex_char(&mut self, line: u32) -> LResult<TokenKind> {
        self.bump_char();
        let value = match self.peek_char() {
            None => return Err(self.err(line, LexErrorKind::UnterminatedCharacter)),
            Some('\\') => {
                self.bump_char();
                self.lex_escape(line)?
            },
            Some('\'') => return Err(self.err(line, LexErrorKind::InvalidCharLiteral)),
            Some(c) => {
                self.bump_char();
                c
            },
        };
        if self.peek_char() != Some('\'') {
            return Err(self.err(line, LexErrorKind::UnterminatedCharacter));
        }
        self.bump_char();
        Ok(TokenKind::Character(value))
    }

    fn lex_operator(&mut self, line: u32) -> LResult<TokenKind> {
        let c = self.bump_char().unwrap();
        use Operator::{
            Amp, Assign, At, Bang, Caret, Colon, Dot, EqEq, Ge, Gt, Le, Lt, Minus, Ne, OrOr, AndAnd,
            Pipe, Plus, Question, Shl, Shr, Slash, Star, Tilde, PathSep, Percent, XorXor,
        };
        use Separator::{AttrClose, AttrOpen, Comma, LBrace, LBracket, LParen, RBrace, RBracket, RParen, Semi};

        Ok(match c {
            '(' => TokenKind::Separator(LParen),
            ')' => TokenKind::Separator(RParen),
            '{' => TokenKind::Separator(LBrace),
            '}' => TokenKind::Separator(RBrace),
            '[' => {
                if self.eat('[') {
                    TokenKind::Separator(AttrOpen)
                } else {
                    TokenKind::Separator(LBracket)
                }
            },
            ']' => {
                if self.eat(']') {
                    TokenKind::Separator(AttrClose)
                } else {
                    TokenKind::Separator(RBracket)
                }
            },
            ',' => TokenKind::Separator(Comma),
            ';' => TokenKind::Separator(Semi),
            '$' => TokenKind::Dollar,
            '@' => TokenKind::Operator(At),
            '?' => TokenKind::Operator(Question),
            '~' => TokenKind::Operator(Tilde),
            '.' => TokenKind::Operator(Dot),
            ':' => {
                if self.eat(':') {
                    TokenKind::Operator(PathSep)
                } else {
                    TokenKind::Operator(Colon)
                }
            },
            '+' => TokenKind::Operator(Plus),
            '-' => TokenKind::Operator(Minus),
            '*' => TokenKind::Operator(Star),
            '/' => TokenKind::Operator(Slash),
            '%' => TokenKind::Operator(Percent),
            '=' => {
                if self.eat('=') {
                    TokenKind::Operator(EqEq)
                } else {
                    TokenKind::Operator(Assign)
                }
            },
            '!' => {
                if self.eat('=') {
                    TokenKind::Operator(Ne)
                } else {
                    TokenKind::Operator(Bang)
                }
            },
            '<' => {
                if self.eat('<') {
                    TokenKind::Operator(Shl)
                } else if self.eat('=') {
                    TokenKind::Operator(Le)
                } else {
                    TokenKind::Operator(Lt)
                }
            },
            '>' => {
                if self.eat('>') {
                    TokenKind::Operator(Shr)
                } else if self.eat('=') {
                    TokenKind::Operator(Ge)
                } else {
                    TokenKind::Operator(Gt)
                }
            },
            '&' => {
                if self.eat('&') {
                    TokenKind::Operator(AndAnd)
                } else {
                    TokenKind::Operator(Amp)
                }
            },
            '|' => {
                if self.eat('|') {
                    TokenKind::Operator(OrOr)
                } else {
                    TokenKind::Operator(Pipe)
                }
            },
            '^' => {
                if self.eat('^') {
                    TokenKind::Operator(XorXor)
                } else {
                    TokenKind::Operator(Caret)
                }
            },
            other => return Err(self.err(line, LexErrorKind::UnexpectedChar(other))),
        })
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> Vec<TokenKind> {
        Lexer::new(src, SourceId(0)).tokenize().unwrap().into_iter().map(|t| t.value).collect()
    }

    #[test]
    fn keywords_and_value_types() {
        let toks = lex("struct u32 bitfield");
        assert_eq!(
            toks,
            vec![
                TokenKind::Keyword(Keyword::Struct),
                TokenKind::ValueType(ValueType::Unsigned32),
                TokenKind::Keyword(Keyword::Bitfield),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn maximal_munch_operators() {
        let toks = lex("<<= << < <=");
        // `<<=` isn't a defined operator, so it decomposes as `<<` then `=`.
        assert_eq!(
            toks,
            vec![
                TokenKind::Operator(Operator::Shl),
                TokenKind::Operator(Operator::Assign),
                TokenKind::Operator(Operator::Shl),
                TokenKind::Operator(Operator::Lt),
                TokenKind::Operator(Operator::Le),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn integer_literal_bases_and_suffix() {
        let toks = lex("0x1F 0b101 0o17 42U 7LL");
        assert_eq!(
            toks,
            vec![
                TokenKind::Integer(IntLiteral { value: 0x1F, suffix: IntSuffix::None }),
                TokenKind::Integer(IntLiteral { value: 0b101, suffix: IntSuffix::None }),
                TokenKind::Integer(IntLiteral { value: 0o17, suffix: IntSuffix::None }),
                TokenKind::Integer(IntLiteral { value: 42, suffix: IntSuffix::Unsigned }),
                TokenKind::Integer(IntLiteral { value: 7, suffix: IntSuffix::LongLong }),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn float_literal_with_exponent() {
        let toks = lex("1.5e-3f");
        assert_eq!(toks, vec![TokenKind::Float(1.5e-3), TokenKind::Eof]);
    }

    #[test]
    fn string_escape_and_newline_error() {
        let toks = lex(r#""a\tb\x41""#);
        assert_eq!(toks, vec![TokenKind::String("a\tbA".to_string()), TokenKind::Eof]);

        let err = Lexer::new("\"a\nb\"", SourceId(0)).tokenize().unwrap_err();
        assert_eq!(err.kind, LexErrorKind::NewlineInString);
    }

    #[test]
    fn attribute_brackets_lex_as_one_token() {
        let toks = lex("[[hidden]]");
        assert_eq!(
            toks,
            vec![
                TokenKind::Separator(Separator::AttrOpen),
                TokenKind::Identifier("hidden".to_string()),
                TokenKind::Separator(Separator::AttrClose),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn unterminated_block_comment_reports_error() {
        let err = Lexer::new("/* never closed", SourceId(0)).tokenize().unwrap_err();
        assert_eq!(err.kind, LexErrorKind::UnterminatedBlockComment);
    }

    #[test]
    fn line_numbers_track_newlines_through_comments() {
        let toks = Lexer::new("u8 a;\n/* line2\nline3 */\nu8 b;", SourceId(0)).tokenize().unwrap();
        // `b`'s identifier token should be on line 4.
        let b_line = toks
            .iter()
            .find(|t| matches!(&t.value, TokenKind::Identifier(s) if s == "b"))
            .unwrap()
            .span
            .start
            .0;
        assert_eq!(b_line, 4);
    }

    proptest::proptest! {
        #[test]
        fn decimal_integers_roundtrip(n in 0i64..=i64::MAX) {
            let src = n.to_string();
            let toks = lex(&src);
            if let TokenKind::Integer(lit) = &toks[0] {
                proptest::prop_assert_eq!(lit.value, i128::from(n));
            } else {
                panic!("expected integer token");
            }
        }
    }
}
