//! hexpat-ast — the syntax tree the parser builds and the evaluator walks
//! (`spec` §3.3).
//!
//! A single closed [`Node`] enum stands in for the reference's inheritance
//! hierarchy (`ASTNode` and its subclasses) — every production is a variant,
//! every variant owns its children outright (`Box`/`Vec`, never `Rc`), and
//! `#[derive(Clone)]` already gives the deep-copy-with-no-shared-state
//! semantics that template instantiation and array-element duplication rely
//! on: cloning a `Node` always walks its owned children down to the leaves.

#![deny(missing_docs)]

use hexpat_core::Span;
use hexpat_lexer::ValueType;

/// A literal value as written in source.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Literal {
    /// An integer literal, already range-checked by the lexer.
    Integer(i128),
    /// A floating-point literal.
    Float(f64),
    /// `true`/`false`.
    Boolean(bool),
    /// A character literal.
    Character(char),
    /// A string literal.
    String(String),
}

/// Unary prefix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum UnaryOp {
    /// `-x`
    Neg,
    /// `+x` (no-op numerically, kept for round-tripping source)
    Pos,
    /// `!x`
    Not,
    /// `~x`
    BitNot,
}

/// Binary infix operators, ordered here by their precedence tier
/// (`spec` §4.3) though the enum itself carries no ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Mod,
    /// `==`
    Eq,
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
    /// `&`
    BitAnd,
    /// `|`
    BitOr,
    /// `^`
    BitXor,
    /// `&&`
    LogicalAnd,
    /// `||`
    LogicalOr,
    /// `^^`
    LogicalXor,
}

/// One segment of a name path used by [`Node::RValue`] and
/// [`Node::ScopeResolution`]: a field/variable name, or an index expression
/// applied to the value named so far. The reserved names `parent` and
/// `this` are ordinary identifier segments here — the evaluator, not the
/// AST, gives them their scope-walking meaning (`spec` §4.4.3).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PathSegment {
    /// `.name` / the leading name itself.
    Field(String),
    /// `[expr]`
    Index(Box<Node>),
}

/// How an array's length is determined (`spec` §4.3's `ArraySuffix`).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ArraySize {
    /// `[ expr ]` — a fixed element count.
    Fixed(Box<Node>),
    /// `[ while( expr ) ]` — grows until `expr` is false.
    While(Box<Node>),
    /// `[]` — grows until an all-zero element is read.
    ZeroTerminated,
}

/// What a `Type` production resolves to (`spec` §4.3).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TypeRefKind {
    /// A builtin value type (`u32`, `str`, `padding`, ...).
    Builtin(ValueType),
    /// A user-defined type, optionally with `<...>` template arguments.
    Named {
        /// Possibly namespace-qualified name.
        path: Vec<String>,
        /// Template arguments, if any.
        args: Vec<TypeRef>,
    },
}

/// A type reference: an optional forced endianness plus what it names.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TypeRef {
    /// `le`/`be` prefix, if written.
    pub endian: Option<hexpat_core::Endianness>,
    /// What the type names.
    pub kind: TypeRefKind,
    /// Source location of the type reference itself.
    pub span: Span,
}

/// One recognised language-level attribute (`spec` §6.4). Unknown names are
/// kept as `Unknown` so the evaluator can warn instead of failing to parse.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Attribute {
    /// `color("#RRGGBB")`
    Color(String),
    /// `name("...")`
    Name(String),
    /// `comment("...")`
    Comment(String),
    /// `format(fn_name)`
    Format(String),
    /// `transform(fn_name)`
    Transform(String),
    /// `hidden`
    Hidden,
    /// `inline`
    Inline,
    /// `sealed`
    Sealed,
    /// `no_unique_address`
    NoUniqueAddress,
    /// `export`
    Export,
    /// `pointer_base(fn_name)`
    PointerBase(String),
    /// Anything not in the fixed set above — a warning, not a parse error.
    Unknown {
        /// The attribute's bare name.
        name: String,
        /// Its parenthesized arguments, if any, as raw text.
        args: Vec<String>,
    },
}

/// One `Name [ '=' expr ]` arm of an `enum` body.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EnumVariant {
    /// The variant's name.
    pub name: String,
    /// Its explicit value, if written; otherwise it continues from the
    /// previous variant (`spec` §4.3).
    pub value: Option<Box<Node>>,
    /// Where this variant was declared.
    pub span: Span,
}

/// One typed parameter of a [`Node::FunctionDefinition`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Param {
    /// Parameter name.
    pub name: String,
    /// Parameter type (`auto` is permitted, `spec` §4.3).
    pub ty: TypeRef,
}

/// Every syntactic construct in the language, parser output and evaluator
/// input alike (`spec` §3.3).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Node {
    /// A literal value.
    Literal {
        /// The literal itself.
        value: Literal,
        /// Source location.
        span: Span,
    },
    /// A name path, optionally indexed (`a.b[i].c`).
    RValue {
        /// The path's segments, outermost first.
        path: Vec<PathSegment>,
        /// Source location.
        span: Span,
    },
    /// A prefix unary expression.
    Unary {
        /// The operator.
        op: UnaryOp,
        /// Its operand.
        expr: Box<Node>,
        /// Source location.
        span: Span,
    },
    /// An infix binary expression.
    Binary {
        /// The operator.
        op: BinaryOp,
        /// Left operand.
        lhs: Box<Node>,
        /// Right operand.
        rhs: Box<Node>,
        /// Source location.
        span: Span,
    },
    /// `cond ? then_branch : else_branch`, right-associative.
    Ternary {
        /// Condition.
        cond: Box<Node>,
        /// Taken when `cond` is truthy.
        then_branch: Box<Node>,
        /// Taken otherwise.
        else_branch: Box<Node>,
        /// Source location.
        span: Span,
    },
    /// `(Type) expr`.
    Cast {
        /// Target type.
        ty: TypeRef,
        /// Expression being cast.
        expr: Box<Node>,
        /// Source location.
        span: Span,
    },
    /// `Namespace::Name`, used where a type or constant is referenced by its
    /// fully-qualified path rather than looked up lexically.
    ScopeResolution {
        /// The qualified path.
        path: Vec<String>,
        /// Source location.
        span: Span,
    },
    /// `using Name = Type;`
    TypeDecl {
        /// The alias being introduced.
        name: String,
        /// What it aliases.
        ty: TypeRef,
        /// Attributes attached to the alias.
        attributes: Vec<Attribute>,
        /// Source location.
        span: Span,
    },
    /// A bare reference to a builtin value type used as an expression
    /// context (e.g. the operand of a cast or a function's return type).
    BuiltinTypeRef {
        /// The value type.
        value_type: ValueType,
        /// Source location.
        span: Span,
    },
    /// `Type name [ '@' offset_expr ] [ '[[' attrs ']]' ] ';'`.
    VariableDecl {
        /// Variable name.
        name: String,
        /// Declared type.
        ty: TypeRef,
        /// `@ offset_expr`, if present.
        placement: Option<Box<Node>>,
        /// Attached attributes.
        attributes: Vec<Attribute>,
        /// Source location.
        span: Span,
    },
    /// `Type name [ ArraySuffix ] [ '@' offset_expr ] [ '[[' attrs ']]' ] ';'`.
    ArrayVariableDecl {
        /// Variable name.
        name: String,
        /// Element type.
        ty: TypeRef,
        /// How the element count is determined.
        size: ArraySize,
        /// `@ offset_expr`, if present.
        placement: Option<Box<Node>>,
        /// Attached attributes.
        attributes: Vec<Attribute>,
        /// Source location.
        span: Span,
    },
    /// `Type *name : PointerSize [ '@' offset_expr ] ';'`.
    PointerVariableDecl {
        /// Variable name.
        name: String,
        /// Pointee type.
        ty: TypeRef,
        /// The integer width used to read the pointer's own value.
        pointer_size: ValueType,
        /// `@ offset_expr`, if present.
        placement: Option<Box<Node>>,
        /// Attached attributes.
        attributes: Vec<Attribute>,
        /// Source location.
        span: Span,
    },
    /// `struct Name [ ':' Parent ] '{' body '}' ';'`.
    Struct {
        /// Struct name.
        name: String,
        /// Inherited struct, if any.
        parent: Option<String>,
        /// Member declarations and nested control flow.
        body: Vec<Node>,
        /// Attached attributes.
        attributes: Vec<Attribute>,
        /// Source location.
        span: Span,
    },
    /// `union Name '{' body '}' ';'`.
    Union {
        /// Union name.
        name: String,
        /// Member declarations.
        body: Vec<Node>,
        /// Attached attributes.
        attributes: Vec<Attribute>,
        /// Source location.
        span: Span,
    },
    /// `enum Name ':' UnderlyingType '{' ... '}' ';'`.
    Enum {
        /// Enum name.
        name: String,
        /// The integer type backing the enum.
        underlying: TypeRef,
        /// Declared variants in source order.
        variants: Vec<EnumVariant>,
        /// Source location.
        span: Span,
    },
    /// `bitfield Name '{' ( Ident ':' bit_count ';' )* '}' ';'`.
    Bitfield {
        /// Bitfield name.
        name: String,
        /// Field declarations, in byte-layout order.
        fields: Vec<Node>,
        /// Attached attributes.
        attributes: Vec<Attribute>,
        /// Source location.
        span: Span,
    },
    /// One `Ident ':' bit_count ';'` member of a [`Node::Bitfield`].
    BitfieldField {
        /// Field name.
        name: String,
        /// Bit width expression.
        bits: Box<Node>,
        /// Source location.
        span: Span,
    },
    /// `fn Name '(' params ')' '{' body '}'`.
    FunctionDefinition {
        /// Function name.
        name: String,
        /// Typed parameters.
        params: Vec<Param>,
        /// Whether the parameter list ends in `...`.
        is_variadic: bool,
        /// Function body.
        body: Vec<Node>,
        /// Source location.
        span: Span,
    },
    /// A call expression/statement.
    FunctionCall {
        /// Possibly namespace-qualified function name.
        path: Vec<String>,
        /// Argument expressions.
        args: Vec<Node>,
        /// Source location.
        span: Span,
    },
    /// `target = value;` — assignment is its own statement form, not part
    /// of the expression precedence ladder (`spec` §4.3).
    Assign {
        /// The assignment target (an `RValue`).
        target: Box<Node>,
        /// The value expression.
        value: Box<Node>,
        /// Source location.
        span: Span,
    },
    /// `if (cond) { ... } [ else { ... } ]`.
    If {
        /// Condition.
        cond: Box<Node>,
        /// Taken when `cond` is truthy.
        then_branch: Vec<Node>,
        /// Taken otherwise; empty when there's no `else`.
        else_branch: Vec<Node>,
        /// Source location.
        span: Span,
    },
    /// `while (cond) { ... }`.
    While {
        /// Condition, re-evaluated each iteration.
        cond: Box<Node>,
        /// Loop body.
        body: Vec<Node>,
        /// Source location.
        span: Span,
    },
    /// `for (init, cond, post) { ... }`.
    For {
        /// Executed once before the first iteration.
        init: Box<Node>,
        /// Re-evaluated before each iteration.
        cond: Box<Node>,
        /// Executed after each iteration.
        post: Box<Node>,
        /// Loop body.
        body: Vec<Node>,
        /// Source location.
        span: Span,
    },
    /// `return [ expr ];`.
    Return {
        /// The returned value, if any.
        value: Option<Box<Node>>,
        /// Source location.
        span: Span,
    },
    /// `break;`.
    Break(Span),
    /// `continue;`.
    Continue(Span),
    /// `namespace Path { ... }`.
    Namespace {
        /// The (possibly dotted) namespace path.
        path: Vec<String>,
        /// Declarations inside the namespace.
        body: Vec<Node>,
        /// Source location.
        span: Span,
    },
    /// A brace-delimited statement list used where the grammar admits a
    /// block without an enclosing construct of its own.
    Compound(Vec<Node>),
}

impl Node {
    /// This node's source location. `Compound` reports the join of its
    /// children's spans (or [`Span::none`] when empty).
    #[must_use]
    pub fn span(&self) -> Span {
        match self {
            Node::Literal { span, .. }
            | Node::RValue { span, .. }
            | Node::Unary { span, .. }
            | Node::Binary { span, .. }
            | Node::Ternary { span, .. }
            | Node::Cast { span, .. }
            | Node::ScopeResolution { span, .. }
            | Node::TypeDecl { span, .. }
            | Node::BuiltinTypeRef { span, .. }
            | Node::VariableDecl { span, .. }
            | Node::ArrayVariableDecl { span, .. }
            | Node::PointerVariableDecl { span, .. }
            | Node::Struct { span, .. }
            | Node::Union { span, .. }
            | Node::Enum { span, .. }
            | Node::Bitfield { span, .. }
            | Node::BitfieldField { span, .. }
            | Node::FunctionDefinition { span, .. }
            | Node::FunctionCall { span, .. }
            | Node::Assign { span, .. }
            | Node::If { span, .. }
            | Node::While { span, .. }
            | Node::For { span, .. }
            | Node::Return { span, .. }
            | Node::Namespace { span, .. }
            | Node::Break(span)
            | Node::Continue(span) => *span,
            Node::Compound(children) => {
                children.iter().map(Node::span).reduce(Span::join).unwrap_or_else(Span::none)
            },
        }
    }

    /// True for the declaration forms that introduce a named type
    /// (`struct`/`union`/`enum`/`bitfield`/`using`), used by the evaluator
    /// to populate the type registry in one pass before evaluating bodies.
    #[must_use]
    pub const fn is_type_decl(&self) -> bool {
        matches!(
            self,
            Node::Struct { .. }
                | Node::Union { .. }
                | Node::Enum { .. }
                | Node::Bitfield { .. }
                | Node::TypeDecl { .. }
        )
    }
}

/// A full program: the top-level declarations in source order.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Program {
    /// Top-level items.
    pub items: Vec<Node>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use hexpat_core::{Pos, SourceId};

    fn span() -> Span {
        Span::single(SourceId(0), Pos(1))
    }

    #[test]
    fn clone_is_fully_independent() {
        let original = Node::Struct {
            name: "H".to_string(),
            parent: None,
            body: vec![Node::VariableDecl {
                name: "a".to_string(),
                ty: TypeRef { endian: None, kind: TypeRefKind::Builtin(ValueType::Unsigned32), span: span() },
                placement: None,
                attributes: vec![],
                span: span(),
            }],
            attributes: vec![],
            span: span(),
        };
        let mut clone = original.clone();
        if let Node::Struct { body, .. } = &mut clone {
            if let Node::VariableDecl { name, .. } = &mut body[0] {
                name.push_str("_renamed");
            }
        }
        let Node::Struct { body, .. } = &original else { unreachable!() };
        let Node::VariableDecl { name, .. } = &body[0] else { unreachable!() };
        assert_eq!(name, "a");
    }

    #[test]
    fn compound_span_joins_children() {
        let a = Node::Break(Span::single(SourceId(0), Pos(2)));
        let b = Node::Continue(Span::single(SourceId(0), Pos(5)));
        let joined = Node::Compound(vec![a, b]).span();
        assert_eq!(joined.start, Pos(2));
        assert_eq!(joined.end, Pos(5));
    }

    #[test]
    fn empty_compound_has_no_span() {
        assert_eq!(Node::Compound(vec![]).span(), Span::none());
    }
}
