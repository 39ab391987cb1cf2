//! hexpat-parser — recursive-descent parser turning a token stream into a
//! [`hexpat_ast::Program`] (`spec` §4.3).
//!
//! The grammar is the usual hand-written recursive-descent shape: one
//! function per production, a `try_consume` helper that advances only on
//! success so alternatives can be tried without backtracking state, and a
//! precedence-climbing expression parser for the binary operator ladder.
//! Casts are disambiguated from parenthesized grouping by peeking at what
//! follows `(` — a value-type keyword or a name already known to be a type.

#![deny(missing_docs)]

use std::collections::HashSet;

use hexpat_ast::{
    ArraySize, Attribute, BinaryOp, EnumVariant, Literal, Node, Param, PathSegment, Program, TypeRef,
    TypeRefKind, UnaryOp,
};
use hexpat_core::{Endianness, ErrorKind, Pos, SourceId, Span};
use hexpat_lexer::{Keyword, Operator, Separator, Token, TokenKind, TokenPattern, ValueType, ValueTypeClass};

/// What went wrong while parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseErrorKind {
    /// The current token isn't one of the productions that can start here.
    #[error("unexpected token: expected {expected}, found {found}")]
    UnexpectedToken {
        /// What the grammar allowed at this point.
        expected: String,
        /// What was actually found.
        found: String,
    },
    /// A bare identifier was used as a type but never declared.
    #[error("unknown type {0:?}")]
    UnknownTypeInContext(String),
    /// `@ offset` was written on a declaration inside a function body.
    #[error("'@' placement is only valid on pattern declarations, not locals")]
    OffsetOnLocalVariable,
    /// An array's size clause was neither a constant-ish expression nor
    /// `while( ... )`.
    #[error("invalid array size")]
    InvalidArraySize,
    /// A type, struct/union/enum/bitfield, or function name collided with
    /// one already declared in the same scope.
    #[error("redefinition of {0:?}")]
    Redefinition(String),
    /// An attribute didn't match the fixed set's expected shape (e.g.
    /// `color()` with no argument).
    #[error("malformed attribute: {0}")]
    MalformedAttribute(String),
}

/// A parse error with its source line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} (line {line})")]
pub struct ParseError {
    /// Line the error occurred on.
    pub line: u32,
    /// What went wrong.
    pub kind: ParseErrorKind,
}

impl From<ParseError> for hexpat_core::Diagnostic {
    fn from(e: ParseError) -> Self {
        hexpat_core::Diagnostic::new(ErrorKind::Parse, e.line, e.kind.to_string())
    }
}

type PResult<T> = Result<T, ParseError>;

/// Parses a full program from a token stream already produced by
/// `hexpat-lexer`.
///
/// # Errors
/// See [`ParseErrorKind`].
pub fn parse(tokens: &[Token], source: SourceId) -> PResult<Program> {
    let mut parser = Parser::new(tokens, source);
    let items = parser.parse_items_until(TokenPattern::Eof)?;
    Ok(Program { items })
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    source: SourceId,
    known_types: HashSet<String>,
    known_functions: HashSet<String>,
    in_function_body: bool,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token], source: SourceId) -> Self {
        Self {
            tokens,
            pos: 0,
            source,
            known_types: HashSet::new(),
            known_functions: HashSet::new(),
            in_function_body: false,
        }
    }

    /* ───────────────────────── token-stream primitives ───────────────────────── */

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn cur_line(&self) -> u32 {
        self.peek().span.start.0
    }

    fn span_here(&self) -> Span {
        Span::single(self.source, Pos(self.cur_line()))
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, pattern: TokenPattern) -> bool {
        self.peek().value.matches(pattern)
    }

    fn try_consume(&mut self, pattern: TokenPattern) -> Option<Token> {
        if self.check(pattern) {
            Some(self.advance())
        } else {
            None
        }
    }

    fn error(&self, kind: ParseErrorKind) -> ParseError {
        ParseError { line: self.cur_line(), kind }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        self.error(ParseErrorKind::UnexpectedToken { expected: expected.to_string(), found: self.peek().value.to_string() })
    }

    fn expect(&mut self, pattern: TokenPattern, expected: &str) -> PResult<Token> {
        self.try_consume(pattern).ok_or_else(|| self.unexpected(expected))
    }

    fn expect_sep(&mut self, sep: Separator) -> PResult<Token> {
        self.expect(TokenPattern::Separator(sep), &format!("{sep:?}"))
    }

    fn expect_op(&mut self, op: Operator) -> PResult<Token> {
        self.expect(TokenPattern::Operator(op), &format!("{op:?}"))
    }

    fn expect_keyword(&mut self, kw: Keyword) -> PResult<Token> {
        self.expect(TokenPattern::Keyword(kw), &format!("{kw:?}"))
    }

    fn expect_identifier(&mut self) -> PResult<String> {
        match &self.peek().value {
            TokenKind::Identifier(s) => {
                let s = s.clone();
                self.advance();
                Ok(s)
            },
            _ => Err(self.unexpected("an identifier")),
        }
    }

    fn declare_type(&mut self, name: &str) -> PResult<()> {
        if !self.known_types.insert(name.to_string()) {
            return Err(self.error(ParseErrorKind::Redefinition(name.to_string())));
        }
        Ok(())
    }

    /* ───────────────────────── top-level dispatch ───────────────────────── */

    fn parse_items_until(&mut self, stop: TokenPattern) -> PResult<Vec<Node>> {
        let mut items = Vec::new();
        while !self.check(stop) {
            items.push(self.parse_body_item()?);
        }
        Ok(items)
    }

    fn looks_like_type_start(&self) -> bool {
        match &self.peek().value {
            TokenKind::ValueType(_) => true,
            TokenKind::Keyword(Keyword::LittleEndian | Keyword::BigEndian) => true,
            TokenKind::Identifier(name) => self.known_types.contains(name),
            _ => false,
        }
    }

    fn parse_body_item(&mut self) -> PResult<Node> {
        match &self.peek().value {
            TokenKind::Keyword(Keyword::Struct) => self.parse_struct(),
            TokenKind::Keyword(Keyword::Union) => self.parse_union(),
            TokenKind::Keyword(Keyword::Enum) => self.parse_enum(),
            TokenKind::Keyword(Keyword::Bitfield) => self.parse_bitfield(),
            TokenKind::Keyword(Keyword::Using) => self.parse_type_alias(),
            TokenKind::Keyword(Keyword::Fn) => self.parse_function(),
            TokenKind::Keyword(Keyword::Namespace) => self.parse_namespace(),
            TokenKind::Keyword(Keyword::If) => self.parse_if(),
            TokenKind::Keyword(Keyword::While) => self.parse_while(),
            TokenKind::Keyword(Keyword::For) => self.parse_for(),
            TokenKind::Keyword(Keyword::Return) => self.parse_return(),
            TokenKind::Keyword(Keyword::Break) => {
                let span = self.span_here();
                self.advance();
                self.expect_sep(Separator::Semi)?;
                Ok(Node::Break(span))
            },
            TokenKind::Keyword(Keyword::Continue) => {
                let span = self.span_here();
                self.advance();
                self.expect_sep(Separator::Semi)?;
                Ok(Node::Continue(span))
            },
            TokenKind::Separator(Separator::LBrace) => {
                self.advance();
                let body = self.parse_items_until(TokenPattern::Separator(Separator::RBrace))?;
                self.expect_sep(Separator::RBrace)?;
                Ok(Node::Compound(body))
            },
            _ if self.looks_like_type_start() => self.parse_decl(),
            _ => self.parse_expr_or_assign_stmt(),
        }
    }

    /* ───────────────────────── declarations ───────────────────────── */

    fn parse_decl(&mut self) -> PResult<Node> {
        let span = self.span_here();
        let ty = self.parse_type()?;

        if self.try_consume(TokenPattern::Operator(Operator::Star)).is_some() {
            let name = self.expect_identifier()?;
            self.expect_op(Operator::Colon)?;
            let pointer_size = self.expect_builtin_int()?;
            let placement = self.parse_optional_placement()?;
            let attributes = self.parse_optional_attributes()?;
            self.expect_sep(Separator::Semi)?;
            return Ok(Node::PointerVariableDecl { name, ty, pointer_size, placement, attributes, span });
        }

        let name = self.expect_identifier()?;

        if self.try_consume(TokenPattern::Separator(Separator::LBracket)).is_some() {
            let size = self.parse_array_size()?;
            self.expect_sep(Separator::RBracket)?;
            let placement = self.parse_optional_placement()?;
            let attributes = self.parse_optional_attributes()?;
            self.expect_sep(Separator::Semi)?;
            return Ok(Node::ArrayVariableDecl { name, ty, size, placement, attributes, span });
        }

        let placement = self.parse_optional_placement()?;
        let attributes = self.parse_optional_attributes()?;
        self.expect_sep(Separator::Semi)?;
        Ok(Node::VariableDecl { name, ty, placement, attributes, span })
    }

    fn parse_array_size(&mut self) -> PResult<ArraySize> {
        if self.check(TokenPattern::Separator(Separator::RBracket)) {
            return Ok(ArraySize::ZeroTerminated);
        }
        if self.try_consume(TokenPattern::Keyword(Keyword::While)).is_some() {
            self.expect_sep(Separator::LParen)?;
            let cond = self.parse_expr()?;
            self.expect_sep(Separator::RParen)?;
            return Ok(ArraySize::While(Box::new(cond)));
        }
        let expr = self.parse_expr()?;
        if !matches!(expr, Node::Literal { .. } | Node::RValue { .. } | Node::Binary { .. } | Node::Unary { .. }) {
            return Err(self.error(ParseErrorKind::InvalidArraySize));
        }
        Ok(ArraySize::Fixed(Box::new(expr)))
    }

    fn parse_optional_placement(&mut self) -> PResult<Option<Box<Node>>> {
        if self.try_consume(TokenPattern::Operator(Operator::At)).is_some() {
            if self.in_function_body {
                return Err(self.error(ParseErrorKind::OffsetOnLocalVariable));
            }
            let expr = self.parse_expr()?;
            Ok(Some(Box::new(expr)))
        } else {
            Ok(None)
        }
    }

    fn parse_optional_attributes(&mut self) -> PResult<Vec<Attribute>> {
        if self.try_consume(TokenPattern::Separator(Separator::AttrOpen)).is_none() {
            return Ok(Vec::new());
        }
        let mut attrs = Vec::new();
        loop {
            attrs.push(self.parse_one_attribute()?);
            if self.try_consume(TokenPattern::Separator(Separator::Comma)).is_none() {
                break;
            }
        }
        self.expect_sep(Separator::AttrClose)?;
        Ok(attrs)
    }

    fn parse_one_attribute(&mut self) -> PResult<Attribute> {
        let name = self.expect_identifier()?;
        let mut args = Vec::new();
        if self.try_consume(TokenPattern::Separator(Separator::LParen)).is_some() {
            if !self.check(TokenPattern::Separator(Separator::RParen)) {
                loop {
                    args.push(self.parse_attribute_arg()?);
                    if self.try_consume(TokenPattern::Separator(Separator::Comma)).is_none() {
                        break;
                    }
                }
            }
            self.expect_sep(Separator::RParen)?;
        }
        build_attribute(&name, args).map_err(|msg| self.error(ParseErrorKind::MalformedAttribute(msg)))
    }

    fn parse_attribute_arg(&mut self) -> PResult<String> {
        match &self.peek().value {
            TokenKind::String(s) => {
                let s = s.clone();
                self.advance();
                Ok(s)
            },
            TokenKind::Identifier(s) => {
                let s = s.clone();
                self.advance();
                Ok(s)
            },
            _ => Err(self.error(ParseErrorKind::MalformedAttribute("expected a string or identifier argument".to_string()))),
        }
    }

    fn expect_builtin_int(&mut self) -> PResult<ValueType> {
        match &self.peek().value {
            TokenKind::ValueType(vt) if vt.in_class(ValueTypeClass::Integer) => {
                let vt = *vt;
                self.advance();
                Ok(vt)
            },
            _ => Err(self.unexpected("an integer value type")),
        }
    }

    fn parse_type(&mut self) -> PResult<TypeRef> {
        let span = self.span_here();
        let endian = if self.try_consume(TokenPattern::Keyword(Keyword::LittleEndian)).is_some() {
            Some(Endianness::Little)
        } else if self.try_consume(TokenPattern::Keyword(Keyword::BigEndian)).is_some() {
            Some(Endianness::Big)
        } else {
            None
        };

        let kind = match &self.peek().value {
            TokenKind::ValueType(vt) => {
                let vt = *vt;
                self.advance();
                TypeRefKind::Builtin(vt)
            },
            TokenKind::Identifier(_) => {
                let mut path = vec![self.expect_identifier()?];
                while self.try_consume(TokenPattern::Operator(Operator::PathSep)).is_some() {
                    path.push(self.expect_identifier()?);
                }
                if path.len() == 1 && !self.known_types.contains(&path[0]) {
                    return Err(self.error(ParseErrorKind::UnknownTypeInContext(path[0].clone())));
                }
                let args = if self.try_consume(TokenPattern::Operator(Operator::Lt)).is_some() {
                    let mut args = vec![self.parse_type()?];
                    while self.try_consume(TokenPattern::Separator(Separator::Comma)).is_some() {
                        args.push(self.parse_type()?);
                    }
                    self.expect_op(Operator::Gt)?;
                    args
                } else {
                    Vec::new()
                };
                TypeRefKind::Named { path, args }
            },
            _ => return Err(self.unexpected("a type")),
        };

        Ok(TypeRef { endian, kind, span })
    }

    fn parse_struct(&mut self) -> PResult<Node> {
        let span = self.span_here();
        self.expect_keyword(Keyword::Struct)?;
        let name = self.expect_identifier()?;
        self.declare_type(&name)?;
        let parent = if self.try_consume(TokenPattern::Operator(Operator::Colon)).is_some() {
            Some(self.expect_identifier()?)
        } else {
            None
        };
        self.expect_sep(Separator::LBrace)?;
        let body = self.parse_items_until(TokenPattern::Separator(Separator::RBrace))?;
        self.expect_sep(Separator::RBrace)?;
        let attributes = self.parse_optional_attributes()?;
        self.expect_sep(Separator::Semi)?;
        Ok(Node::Struct { name, parent, body, attributes, span })
    }

    fn parse_union(&mut self) -> PResult<Node> {
        let span = self.span_here();
        self.expect_keyword(Keyword::Union)?;
        let name = self.expect_identifier()?;
        self.declare_type(&name)?;
        self.expect_sep(Separator::LBrace)?;
        let body = self.parse_items_until(TokenPattern::Separator(Separator::RBrace))?;
        self.expect_sep(Separator::RBrace)?;
        let attributes = self.parse_optional_attributes()?;
        self.expect_sep(Separator::Semi)?;
        Ok(Node::Union { name, body, attributes, span })
    }

    fn parse_enum(&mut self) -> PResult<Node> {
        let span = self.span_here();
        self.expect_keyword(Keyword::Enum)?;
        let name = self.expect_identifier()?;
        self.declare_type(&name)?;
        self.expect_op(Operator::Colon)?;
        let underlying = self.parse_type()?;
        self.expect_sep(Separator::LBrace)?;
        let mut variants = Vec::new();
        while !self.check(TokenPattern::Separator(Separator::RBrace)) {
            let vspan = self.span_here();
            let vname = self.expect_identifier()?;
            let value = if self.try_consume(TokenPattern::Operator(Operator::Assign)).is_some() {
                Some(Box::new(self.parse_expr()?))
            } else {
                None
            };
            variants.push(EnumVariant { name: vname, value, span: vspan });
            if self.try_consume(TokenPattern::Separator(Separator::Comma)).is_none() {
                break;
            }
        }
        self.expect_sep(Separator::RBrace)?;
        self.expect_sep(Separator::Semi)?;
        Ok(Node::Enum { name, underlying, variants, span })
    }

    fn parse_bitfield(&mut self) -> PResult<Node> {
        let span = self.span_here();
        self.expect_keyword(Keyword::Bitfield)?;
        let name = self.expect_identifier()?;
        self.declare_type(&name)?;
        self.expect_sep(Separator::LBrace)?;
        let mut fields = Vec::new();
        while !self.check(TokenPattern::Separator(Separator::RBrace)) {
            let fspan = self.span_here();
            let fname = self.expect_identifier()?;
            self.expect_op(Operator::Colon)?;
            let bits = self.parse_expr()?;
            self.expect_sep(Separator::Semi)?;
            fields.push(Node::BitfieldField { name: fname, bits: Box::new(bits), span: fspan });
        }
        self.expect_sep(Separator::RBrace)?;
        let attributes = self.parse_optional_attributes()?;
        self.expect_sep(Separator::Semi)?;
        Ok(Node::Bitfield { name, fields, attributes, span })
    }

    fn parse_type_alias(&mut self) -> PResult<Node> {
        let span = self.span_here();
        self.expect_keyword(Keyword::Using)?;
        let name = self.expect_identifier()?;
        self.declare_type(&name)?;
        self.expect_op(Operator::Assign)?;
        let ty = self.parse_type()?;
        self.expect_sep(Separator::Semi)?;
        Ok(Node::TypeDecl { name, ty, attributes: Vec::new(), span })
    }

    fn parse_function(&mut self) -> PResult<Node> {
        let span = self.span_here();
        self.expect_keyword(Keyword::Fn)?;
        let name = self.expect_identifier()?;
        if !self.known_functions.insert(name.clone()) {
            return Err(self.error(ParseErrorKind::Redefinition(name)));
        }
        self.expect_sep(Separator::LParen)?;
        let mut params = Vec::new();
        let mut is_variadic = false;
        if !self.check(TokenPattern::Separator(Separator::RParen)) {
            loop {
                if self.check(TokenPattern::Operator(Operator::Dot))
                    && self.peek_at(1).value.matches(TokenPattern::Operator(Operator::Dot))
                    && self.peek_at(2).value.matches(TokenPattern::Operator(Operator::Dot))
                {
                    self.advance();
                    self.advance();
                    self.advance();
                    is_variadic = true;
                    break;
                }
                let ty = self.parse_type()?;
                let pname = self.expect_identifier()?;
                params.push(Param { name: pname, ty });
                if self.try_consume(TokenPattern::Separator(Separator::Comma)).is_none() {
                    break;
                }
            }
        }
        self.expect_sep(Separator::RParen)?;
        self.expect_sep(Separator::LBrace)?;
        let was_in_body = std::mem::replace(&mut self.in_function_body, true);
        let body = self.parse_items_until(TokenPattern::Separator(Separator::RBrace));
        self.in_function_body = was_in_body;
        let body = body?;
        self.expect_sep(Separator::RBrace)?;
        Ok(Node::FunctionDefinition { name, params, is_variadic, body, span })
    }

    fn parse_namespace(&mut self) -> PResult<Node> {
        let span = self.span_here();
        self.expect_keyword(Keyword::Namespace)?;
        let mut path = vec![self.expect_identifier()?];
        while self.try_consume(TokenPattern::Operator(Operator::PathSep)).is_some() {
            path.push(self.expect_identifier()?);
        }
        self.expect_sep(Separator::LBrace)?;
        let body = self.parse_items_until(TokenPattern::Separator(Separator::RBrace))?;
        self.expect_sep(Separator::RBrace)?;
        Ok(Node::Namespace { path, body, span })
    }

    /* ───────────────────────── statements ───────────────────────── */

    fn parse_if(&mut self) -> PResult<Node> {
        let span = self.span_here();
        self.expect_keyword(Keyword::If)?;
        self.expect_sep(Separator::LParen)?;
        let cond = self.parse_expr()?;
        self.expect_sep(Separator::RParen)?;
        self.expect_sep(Separator::LBrace)?;
        let then_branch = self.parse_items_until(TokenPattern::Separator(Separator::RBrace))?;
        self.expect_sep(Separator::RBrace)?;
        let else_branch = if self.try_consume(TokenPattern::Keyword(Keyword::Else)).is_some() {
            if self.check(TokenPattern::Keyword(Keyword::If)) {
                vec![self.parse_if()?]
            } else {
                self.expect_sep(Separator::LBrace)?;
                let b = self.parse_items_until(TokenPattern::Separator(Separator::RBrace))?;
                self.expect_sep(Separator::RBrace)?;
                b
            }
        } else {
            Vec::new()
        };
        Ok(Node::If { cond: Box::new(cond), then_branch, else_branch, span })
    }

    fn parse_while(&mut self) -> PResult<Node> {
        let span = self.span_here();
        self.expect_keyword(Keyword::While)?;
        self.expect_sep(Separator::LParen)?;
        let cond = self.parse_expr()?;
        self.expect_sep(Separator::RParen)?;
        self.expect_sep(Separator::LBrace)?;
        let body = self.parse_items_until(TokenPattern::Separator(Separator::RBrace))?;
        self.expect_sep(Separator::RBrace)?;
        Ok(Node::While { cond: Box::new(cond), body, span })
    }

    fn parse_for(&mut self) -> PResult<Node> {
        let span = self.span_here();
        self.expect_keyword(Keyword::For)?;
        self.expect_sep(Separator::LParen)?;
        let init = self.parse_for_clause()?;
        self.expect_sep(Separator::Comma)?;
        let cond = self.parse_expr()?;
        self.expect_sep(Separator::Comma)?;
        let post = self.parse_for_clause()?;
        self.expect_sep(Separator::RParen)?;
        self.expect_sep(Separator::LBrace)?;
        let body = self.parse_items_until(TokenPattern::Separator(Separator::RBrace))?;
        self.expect_sep(Separator::RBrace)?;
        Ok(Node::For { init: Box::new(init), cond: Box::new(cond), post: Box::new(post), body, span })
    }

    /// A `for (...)` init/post clause: a typed local with an inline
    /// initializer, or a bare assignment — neither terminated by `;`.
    fn parse_for_clause(&mut self) -> PResult<Node> {
        let span = self.span_here();
        if self.looks_like_type_start() {
            let ty = self.parse_type()?;
            let name = self.expect_identifier()?;
            if self.try_consume(TokenPattern::Operator(Operator::Assign)).is_some() {
                let value = self.parse_expr()?;
                let decl = Node::VariableDecl { name: name.clone(), ty, placement: None, attributes: Vec::new(), span };
                let assign = Node::Assign {
                    target: Box::new(Node::RValue { path: vec![PathSegment::Field(name)], span }),
                    value: Box::new(value),
                    span,
                };
                Ok(Node::Compound(vec![decl, assign]))
            } else {
                Ok(Node::VariableDecl { name, ty, placement: None, attributes: Vec::new(), span })
            }
        } else {
            let target = self.parse_expr()?;
            if self.try_consume(TokenPattern::Operator(Operator::Assign)).is_some() {
                let value = self.parse_expr()?;
                Ok(Node::Assign { target: Box::new(target), value: Box::new(value), span })
            } else {
                Ok(target)
            }
        }
    }

    fn parse_return(&mut self) -> PResult<Node> {
        let span = self.span_here();
        self.expect_keyword(Keyword::Return)?;
        let value = if self.check(TokenPattern::Separator(Separator::Semi)) {
            None
        } else {
            Some(Box::new(self.parse_expr()?))
        };
        self.expect_sep(Separator::Semi)?;
        Ok(Node::Return { value, span })
    }

    fn parse_expr_or_assign_stmt(&mut self) -> PResult<Node> {
        let span = self.span_here();
        let expr = self.parse_expr()?;
        let result = if self.try_consume(TokenPattern::Operator(Operator::Assign)).is_some() {
            let value = self.parse_expr()?;
            Node::Assign { target: Box::new(expr), value: Box::new(value), span }
        } else {
            expr
        };
        self.expect_sep(Separator::Semi)?;
        Ok(result)
    }

    /* ───────────────────────── expressions ───────────────────────── */

    fn parse_expr(&mut self) -> PResult<Node> {
        self.parse_ternary()
    }

    fn parse_ternary(&mut self) -> PResult<Node> {
        let span = self.span_here();
        let cond = self.parse_binary(1)?;
        if self.try_consume(TokenPattern::Operator(Operator::Question)).is_some() {
            let then_branch = self.parse_expr()?;
            self.expect_op(Operator::Colon)?;
            let else_branch = self.parse_ternary()?;
            Ok(Node::Ternary { cond: Box::new(cond), then_branch: Box::new(then_branch), else_branch: Box::new(else_branch), span })
        } else {
            Ok(cond)
        }
    }

    /// Precedence climbing over the ladder in `spec` §4.3 (low to high):
    /// logical or/xor/and, bitwise or/xor/and, equality, relational, shift,
    /// additive, multiplicative.
    fn parse_binary(&mut self, min_prec: u8) -> PResult<Node> {
        let mut lhs = self.parse_unary()?;
        loop {
            let span = self.span_here();
            let Some((op, prec)) = self.peek_binary_op() else { break };
            if prec < min_prec {
                break;
            }
            self.advance();
            let rhs = self.parse_binary(prec + 1)?;
            lhs = Node::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), span };
        }
        Ok(lhs)
    }

    fn peek_binary_op(&self) -> Option<(BinaryOp, u8)> {
        let TokenKind::Operator(op) = &self.peek().value else { return None };
        Some(match op {
            Operator::OrOr => (BinaryOp::LogicalOr, 1),
            Operator::XorXor => (BinaryOp::LogicalXor, 2),
            Operator::AndAnd => (BinaryOp::LogicalAnd, 3),
            Operator::Pipe => (BinaryOp::BitOr, 4),
            Operator::Caret => (BinaryOp::BitXor, 5),
            Operator::Amp => (BinaryOp::BitAnd, 6),
            Operator::EqEq => (BinaryOp::Eq, 7),
            Operator::Ne => (BinaryOp::Ne, 7),
            Operator::Lt => (BinaryOp::Lt, 8),
            Operator::Le => (BinaryOp::Le, 8),
            Operator::Gt => (BinaryOp::Gt, 8),
            Operator::Ge => (BinaryOp::Ge, 8),
            Operator::Shl => (BinaryOp::Shl, 9),
            Operator::Shr => (BinaryOp::Shr, 9),
            Operator::Plus => (BinaryOp::Add, 10),
            Operator::Minus => (BinaryOp::Sub, 10),
            Operator::Star => (BinaryOp::Mul, 11),
            Operator::Slash => (BinaryOp::Div, 11),
            Operator::Percent => (BinaryOp::Mod, 11),
            _ => return None,
        })
    }

    fn parse_unary(&mut self) -> PResult<Node> {
        let span = self.span_here();
        let op = match &self.peek().value {
            TokenKind::Operator(Operator::Minus) => Some(UnaryOp::Neg),
            TokenKind::Operator(Operator::Plus) => Some(UnaryOp::Pos),
            TokenKind::Operator(Operator::Bang) => Some(UnaryOp::Not),
            TokenKind::Operator(Operator::Tilde) => Some(UnaryOp::BitNot),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let expr = self.parse_unary()?;
            return Ok(Node::Unary { op, expr: Box::new(expr), span });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> PResult<Node> {
        let mut expr = self.parse_primary()?;
        loop {
            let span = self.span_here();
            if self.try_consume(TokenPattern::Operator(Operator::Dot)).is_some() {
                let field = self.expect_identifier()?;
                expr = match expr {
                    Node::RValue { mut path, .. } => {
                        path.push(PathSegment::Field(field));
                        Node::RValue { path, span }
                    },
                    other => return Err(self.unexpected_node("a field access target", &other)),
                };
                continue;
            }
            if self.try_consume(TokenPattern::Separator(Separator::LBracket)).is_some() {
                let index = self.parse_expr()?;
                self.expect_sep(Separator::RBracket)?;
                expr = match expr {
                    Node::RValue { mut path, .. } => {
                        path.push(PathSegment::Index(Box::new(index)));
                        Node::RValue { path, span }
                    },
                    other => return Err(self.unexpected_node("an index access target", &other)),
                };
                continue;
            }
            break;
        }
        Ok(expr)
    }

    fn unexpected_node(&self, expected: &str, found: &Node) -> ParseError {
        self.error(ParseErrorKind::UnexpectedToken { expected: expected.to_string(), found: format!("{found:?}") })
    }

    fn parse_primary(&mut self) -> PResult<Node> {
        let span = self.span_here();
        match self.peek().value.clone() {
            TokenKind::Integer(lit) => {
                self.advance();
                Ok(Node::Literal { value: Literal::Integer(lit.value), span })
            },
            TokenKind::Float(f) => {
                self.advance();
                Ok(Node::Literal { value: Literal::Float(f), span })
            },
            TokenKind::Character(c) => {
                self.advance();
                Ok(Node::Literal { value: Literal::Character(c), span })
            },
            TokenKind::String(s) => {
                self.advance();
                Ok(Node::Literal { value: Literal::String(s), span })
            },
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                Ok(Node::Literal { value: Literal::Boolean(true), span })
            },
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                Ok(Node::Literal { value: Literal::Boolean(false), span })
            },
            TokenKind::Dollar => {
                self.advance();
                Ok(Node::RValue { path: vec![PathSegment::Field("$".to_string())], span })
            },
            TokenKind::Separator(Separator::LParen) => self.parse_paren_or_cast(span),
            TokenKind::Identifier(name) => {
                self.advance();
                let mut path_names = vec![name];
                while self.try_consume(TokenPattern::Operator(Operator::PathSep)).is_some() {
                    path_names.push(self.expect_identifier()?);
                }
                if self.check(TokenPattern::Separator(Separator::LParen)) {
                    self.advance();
                    let args = self.parse_call_args()?;
                    Ok(Node::FunctionCall { path: path_names, args, span })
                } else if path_names.len() > 1 {
                    Ok(Node::ScopeResolution { path: path_names, span })
                } else {
                    Ok(Node::RValue { path: vec![PathSegment::Field(path_names.into_iter().next().unwrap())], span })
                }
            },
            _ => Err(self.unexpected("an expression")),
        }
    }

    fn parse_paren_or_cast(&mut self, span: Span) -> PResult<Node> {
        if self.looks_like_cast_start() {
            self.advance();
            let ty = self.parse_type()?;
            self.expect_sep(Separator::RParen)?;
            let expr = self.parse_unary()?;
            return Ok(Node::Cast { ty, expr: Box::new(expr), span });
        }
        self.advance();
        let inner = self.parse_expr()?;
        self.expect_sep(Separator::RParen)?;
        Ok(inner)
    }

    fn looks_like_cast_start(&self) -> bool {
        match &self.peek_at(1).value {
            TokenKind::ValueType(_) => true,
            TokenKind::Keyword(Keyword::LittleEndian | Keyword::BigEndian) => true,
            TokenKind::Identifier(name) => self.known_types.contains(name),
            _ => false,
        }
    }

    fn parse_call_args(&mut self) -> PResult<Vec<Node>> {
        let mut args = Vec::new();
        if !self.check(TokenPattern::Separator(Separator::RParen)) {
            loop {
                args.push(self.parse_expr()?);
                if self.try_consume(TokenPattern::Separator(Separator::Comma)).is_none() {
                    break;
                }
            }
        }
        self.expect_sep(Separator::RParen)?;
        Ok(args)
    }
}

fn build_attribute(name: &str, mut args: Vec<String>) -> Result<Attribute, String> {
    fn one(mut args: Vec<String>, attr: &str) -> Result<String, String> {
        if args.len() != 1 {
            return Err(format!("{attr}(...) takes exactly one argument"));
        }
        Ok(args.remove(0))
    }

    Ok(match name {
        "color" => Attribute::Color(one(args, "color")?),
        "name" => Attribute::Name(one(args, "name")?),
        "comment" => Attribute::Comment(one(args, "comment")?),
        "format" => Attribute::Format(one(args, "format")?),
        "transform" => Attribute::Transform(one(args, "transform")?),
        "pointer_base" => Attribute::PointerBase(one(args, "pointer_base")?),
        "hidden" if args.is_empty() => Attribute::Hidden,
        "inline" if args.is_empty() => Attribute::Inline,
        "sealed" if args.is_empty() => Attribute::Sealed,
        "no_unique_address" if args.is_empty() => Attribute::NoUniqueAddress,
        "export" if args.is_empty() => Attribute::Export,
        _ => Attribute::Unknown { name: name.to_string(), args: std::mem::take(&mut args) },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hexpat_lexer::Lexer;

    fn parse_src(src: &str) -> PResult<Program> {
        let tokens = Lexer::new(src, SourceId(0)).tokenize().unwrap();
        parse(&tokens, SourceId(0))
    }

    #[test]
    fn struct_with_fields_and_placement() {
        let program = parse_src("struct H { u32 a; u32 b; char name[4]; }; H hdr @ 0x00;").unwrap();
        assert_eq!(program.items.len(), 2);
        assert!(matches!(program.items[0], Node::Struct { .. }));
        assert!(matches!(program.items[1], Node::VariableDecl { .. }));
    }

    #[test]
    fn dynamic_array_with_while_clause() {
        let program = parse_src("u8 bytes[while($ < 4)] @ 0x00;").unwrap();
        let Node::ArrayVariableDecl { size, .. } = &program.items[0] else { panic!("expected array decl") };
        assert!(matches!(size, ArraySize::While(_)));
    }

    #[test]
    fn bitfield_declares_fields() {
        let program = parse_src("bitfield F { lo : 4; hi : 4; }; F f @ 0x00;").unwrap();
        let Node::Bitfield { fields, .. } = &program.items[0] else { panic!("expected bitfield") };
        assert_eq!(fields.len(), 2);
    }

    #[test]
    fn pointer_declaration() {
        let program = parse_src("u32 *p : u32 @ 0x00;").unwrap();
        assert!(matches!(program.items[0], Node::PointerVariableDecl { .. }));
    }

    #[test]
    fn unknown_type_is_rejected() {
        let err = parse_src("Foo x;").unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::UnknownTypeInContext(_)));
    }

    #[test]
    fn duplicate_struct_name_is_a_redefinition() {
        let err = parse_src("struct H { u8 a; }; struct H { u8 b; };").unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::Redefinition(_)));
    }

    #[test]
    fn offset_on_local_is_rejected() {
        let err = parse_src("fn f() { u8 a @ 0x00; }").unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::OffsetOnLocalVariable));
    }

    #[test]
    fn expression_precedence_matches_ladder() {
        let program = parse_src("u8 a @ (1 + 2 * 3 == 7 ? 0 : 1);").unwrap();
        let Node::VariableDecl { placement: Some(expr), .. } = &program.items[0] else { panic!() };
        assert!(matches!(**expr, Node::Ternary { .. }));
    }

    #[test]
    fn cast_requires_a_known_type() {
        let program = parse_src("u8 a @ (u32)4;").unwrap();
        let Node::VariableDecl { placement: Some(expr), .. } = &program.items[0] else { panic!() };
        assert!(matches!(**expr, Node::Cast { .. }));
    }

    #[test]
    fn function_with_variadic_params() {
        let program = parse_src("fn log(str fmt, ...) { return; }").unwrap();
        let Node::FunctionDefinition { params, is_variadic, .. } = &program.items[0] else { panic!() };
        assert_eq!(params.len(), 1);
        assert!(is_variadic);
    }
}
