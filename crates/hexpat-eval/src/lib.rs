//! hexpat-eval — walks a [`hexpat_ast::Program`] against a byte source and
//! produces a [`hexpat_pattern::Pattern`] forest (`spec` §4.4).
//!
//! The evaluator owns three registries (types, functions, sections), a
//! scope stack for name resolution, a read cursor, and a handful of
//! resource counters that turn runaway patterns (unbounded recursion,
//! unbounded array growth, too many patterns) into a [`Diagnostic`] instead
//! of a stack overflow or an out-of-memory abort.

#![deny(missing_docs)]

use std::fmt;

use hexpat_ast::{ArraySize, Attribute, Literal, Node, PathSegment, Program, TypeRef, TypeRefKind};
use hexpat_core::{ByteSource, ByteSourceError, Diagnostic, Endianness, ErrorKind};
use hexpat_lexer::{Signedness, ValueType};
use hexpat_pattern::{Color, Pattern, PatternKind, PatternMeta};

mod builtins;
mod value;

pub use value::Value;

/* ─────────────────────────── Configuration ─────────────────────────── */

/// Whether a dangerous built-in function may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// Always run it.
    Allow,
    /// Always refuse it.
    Deny,
    /// Ask [`EvalHooks::dangerous_gate`], which must answer synchronously.
    Ask,
}

/// Caps and defaults an evaluator run is configured with (`spec` §4.4.6).
#[derive(Debug, Clone)]
pub struct EvalConfig {
    /// Endianness inherited by declarations with no explicit `le`/`be`.
    pub default_endian: Endianness,
    /// Maximum number of patterns a single run may create.
    pub pattern_limit: u64,
    /// Maximum element count for a single dynamic/zero-terminated array.
    pub array_limit: u64,
    /// Maximum nested type-instantiation depth.
    pub recursion_limit: u32,
    /// Policy applied to builtins the registry marks as dangerous.
    pub dangerous_functions: Permission,
    /// Value passed to `main`'s single parameter, if it declares one.
    pub main_argument: Option<Value>,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            default_endian: Endianness::Native,
            pattern_limit: 100_000,
            array_limit: 100_000,
            recursion_limit: 128,
            dangerous_functions: Permission::Ask,
            main_argument: None,
        }
    }
}

/// Severity-tagged message emitted by `std::print`/`std::assert` and similar
/// built-ins, collected alongside the pattern forest rather than interrupting
/// it (`spec` §7: only fatal errors abort the run).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMessage {
    /// Where it came from.
    pub level: LogLevel,
    /// The message text.
    pub message: String,
}

/// Level of a [`LogMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// `std::print`.
    Info,
    /// A failed `std::assert`.
    Warn,
}

/// Host callback invoked once per `std::print`/`std::assert`. Kept as a
/// trait so this crate never links a logging backend directly — a host
/// (`hexpat-cli`) bridges this to whatever it actually logs through.
pub trait Logger {
    /// Receives one message as it's produced.
    fn log(&self, message: &LogMessage);
}

/// A [`Logger`] that discards everything, for callers that only want the
/// pattern forest.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogger;

impl Logger for NullLogger {
    fn log(&self, _message: &LogMessage) {}
}

/// Resolves an `Ask` [`Permission`] to a concrete decision, synchronously.
pub trait DangerousFunctionGate {
    /// Called once per dangerous call when the policy is `Ask`.
    fn allow(&self, function_name: &str) -> bool;
}

/// A gate that always refuses, the safe default when the host doesn't wire
/// one up.
#[derive(Debug, Default, Clone, Copy)]
pub struct DenyAll;

impl DangerousFunctionGate for DenyAll {
    fn allow(&self, _function_name: &str) -> bool {
        false
    }
}

/// Host hooks threaded through a run: logging, the dangerous-function gate,
/// and a cooperative abort flag (`spec` §6.2).
pub struct EvalHooks<'a> {
    /// Receives `std::print`/`std::assert` output.
    pub logger: &'a dyn Logger,
    /// Resolves `Permission::Ask` for dangerous built-ins.
    pub dangerous_gate: &'a dyn DangerousFunctionGate,
    /// Polled between pattern creations; `true` aborts the run with
    /// [`ErrorKind::Aborted`].
    pub abort: &'a dyn Fn() -> bool,
}

impl Default for EvalHooks<'static> {
    fn default() -> Self {
        Self { logger: &NullLogger, dangerous_gate: &DenyAll, abort: &|| false }
    }
}

/* ─────────────────────────── Errors ─────────────────────────── */

/// What went wrong while evaluating.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EvalErrorKind {
    /// A named type wasn't found in the registry.
    #[error("unknown type '{0}'")]
    UnknownType(String),
    /// A named function wasn't found in the registry.
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    /// A name path didn't resolve against any scope.
    #[error("unresolved name '{0}'")]
    UnresolvedName(String),
    /// `parent` used with no enclosing scope.
    #[error("'parent' has no enclosing scope here")]
    NoParentScope,
    /// `this` used outside a struct/union/bitfield body.
    #[error("'this' has no enclosing struct here")]
    NoEnclosingStruct,
    /// Indexed a value that isn't an array or string.
    #[error("value is not indexable")]
    NotIndexable,
    /// Indexed out of bounds.
    #[error("index {index} out of bounds (length {len})")]
    IndexOutOfBounds {
        /// Requested index.
        index: i128,
        /// Actual length.
        len: usize,
    },
    /// Accessed a field of a value that isn't a struct.
    #[error("value has no field '{0}'")]
    NoSuchField(String),
    /// Division or modulo by zero.
    #[error("division by zero")]
    DivisionByZero,
    /// Shift amount exceeded the operand width.
    #[error("shift amount {0} is out of range")]
    ShiftOverflow(u32),
    /// Operands weren't compatible with the operator.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    /// An array declared with a negative size expression.
    #[error("array size evaluated to a negative number")]
    NegativeArraySize,
    /// `pattern_limit` exceeded.
    #[error("pattern limit ({0}) exceeded")]
    PatternLimitExceeded(u64),
    /// `array_limit` exceeded while growing a `while`/zero-terminated array
    /// or running a loop.
    #[error("array/loop limit ({0}) exceeded")]
    ArrayLimitExceeded(u64),
    /// `recursion_limit` exceeded while instantiating nested types.
    #[error("recursion limit ({0}) exceeded")]
    RecursionLimitExceeded(u32),
    /// The host's abort flag was observed between pattern creations.
    #[error("evaluation aborted by host")]
    Aborted,
    /// The byte source refused a read.
    #[error(transparent)]
    ByteSource(#[from] ByteSourceError),
    /// A dangerous built-in was refused by policy or the gate.
    #[error("'{0}' was denied by the dangerous-function policy")]
    DangerousFunctionDenied(String),
    /// A construct isn't supported by this evaluator (documented gaps —
    /// deep assignment targets, function-local pattern placement, and
    /// namespace-qualified type lookups beyond the last path segment).
    #[error("unsupported construct: {0}")]
    Unsupported(String),
}

/// An [`EvalErrorKind`] at a source line, convertible to a [`Diagnostic`].
#[derive(Debug, Clone)]
pub struct EvalError {
    /// Source line the failure occurred at, or `0` if none.
    pub line: u32,
    /// What went wrong.
    pub kind: EvalErrorKind,
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.kind)
    }
}

impl std::error::Error for EvalError {}

impl From<EvalError> for Diagnostic {
    fn from(e: EvalError) -> Self {
        let kind = match &e.kind {
            EvalErrorKind::UnknownType(_) | EvalErrorKind::UnknownFunction(_) => ErrorKind::TypeResolution,
            EvalErrorKind::PatternLimitExceeded(_)
            | EvalErrorKind::ArrayLimitExceeded(_)
            | EvalErrorKind::RecursionLimitExceeded(_) => ErrorKind::LimitExceeded,
            EvalErrorKind::Aborted => ErrorKind::Aborted,
            EvalErrorKind::ByteSource(_) => ErrorKind::Io,
            _ => ErrorKind::Evaluation,
        };
        Diagnostic::new(kind, e.line, e.kind.to_string())
    }
}

/* ─────────────────────────── Scope ─────────────────────────── */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlFlow {
    None,
    Break,
    Continue,
    Return,
}

enum LoopSignal {
    Continue,
    Break,
    PropagateReturn,
}

struct Scope {
    /// Name/value pairs in declaration order; searched most-recent-first
    /// (`spec` §4.4.3).
    vars: Vec<(String, Value)>,
    /// Whether this frame represents a struct/union/bitfield body, making
    /// `this` meaningful inside it.
    is_struct_like: bool,
}

impl Scope {
    fn new(is_struct_like: bool) -> Self {
        Self { vars: Vec::new(), is_struct_like }
    }

    fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.vars.push((name.into(), value));
    }

    fn find(&self, name: &str) -> Option<&Value> {
        self.vars.iter().rev().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    fn find_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.vars.iter_mut().rev().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

/* ─────────────────────────── Evaluator ─────────────────────────── */

/// Outcome of a successful run: the pattern forest, `main`'s return value if
/// it ran, and any non-fatal log messages collected along the way.
#[derive(Debug, Clone)]
pub struct EvalOutcome {
    /// Top-level patterns in source order.
    pub patterns: Vec<Pattern>,
    /// `main`'s return value, if the program defined one (`spec` §4.4.5).
    pub main_result: Option<Value>,
    /// `std::print`/`std::assert` output, in emission order.
    pub log: Vec<LogMessage>,
}

/// Walks `program` against `source`, producing an [`EvalOutcome`] or the
/// first fatal [`EvalError`] encountered. Uses default (no-op) hooks; see
/// [`evaluate_with_hooks`] to wire up logging, a dangerous-function gate, or
/// a cancellation flag.
///
/// # Errors
/// Returns `Err` if a type/function can't be resolved, a resource cap is
/// exceeded, the byte source refuses a read, or the host's abort flag is
/// observed.
pub fn evaluate(program: &Program, source: &dyn ByteSource, config: EvalConfig) -> Result<EvalOutcome, EvalError> {
    evaluate_with_hooks(program, source, config, &EvalHooks::default())
}

/// As [`evaluate`], but with host hooks supplied explicitly.
///
/// # Errors
/// See [`evaluate`].
pub fn evaluate_with_hooks(
    program: &Program,
    source: &dyn ByteSource,
    config: EvalConfig,
    hooks: &EvalHooks<'_>,
) -> Result<EvalOutcome, EvalError> {
    let mut eval = Evaluator::new(source, config, hooks);
    let mut patterns = Vec::new();
    eval.exec_block(&program.items, &mut patterns)?;
    let main_result = eval.run_main()?;
    Ok(EvalOutcome { patterns, main_result, log: eval.log })
}

struct Evaluator<'a> {
    source: &'a dyn ByteSource,
    config: EvalConfig,
    hooks: &'a EvalHooks<'a>,
    types: Vec<(String, Node)>,
    functions: Vec<(String, Node)>,
    scopes: Vec<Scope>,
    cursor: u64,
    pattern_count: u64,
    depth: u32,
    control_flow: ControlFlow,
    return_value: Option<Value>,
    log: Vec<LogMessage>,
}

impl<'a> Evaluator<'a> {
    fn new(source: &'a dyn ByteSource, config: EvalConfig, hooks: &'a EvalHooks<'a>) -> Self {
        let cursor = source.base_address();
        Self {
            source,
            config,
            hooks,
            types: Vec::new(),
            functions: Vec::new(),
            scopes: vec![Scope::new(false)],
            cursor,
            pattern_count: 0,
            depth: 0,
            control_flow: ControlFlow::None,
            return_value: None,
            log: Vec::new(),
        }
    }

    fn err(&self, line: u32, kind: EvalErrorKind) -> EvalError {
        EvalError { line, kind }
    }

    fn check_abort(&self, line: u32) -> Result<(), EvalError> {
        if (self.hooks.abort)() {
            return Err(self.err(line, EvalErrorKind::Aborted));
        }
        Ok(())
    }

    fn charge_pattern(&mut self, line: u32) -> Result<(), EvalError> {
        self.check_abort(line)?;
        self.pattern_count += 1;
        if self.pattern_count > self.config.pattern_limit {
            return Err(self.err(line, EvalErrorKind::PatternLimitExceeded(self.config.pattern_limit)));
        }
        Ok(())
    }

    fn enter_instantiation(&mut self, line: u32) -> Result<(), EvalError> {
        self.depth += 1;
        if self.depth > self.config.recursion_limit {
            return Err(self.err(line, EvalErrorKind::RecursionLimitExceeded(self.config.recursion_limit)));
        }
        Ok(())
    }

    fn leave_instantiation(&mut self) {
        self.depth -= 1;
    }

    fn run_main(&mut self) -> Result<Option<Value>, EvalError> {
        if !self.functions.iter().any(|(n, _)| n == "main") {
            return Ok(None);
        }
        // `$` inside `main` reads from the start of the source, not wherever
        // the last top-level placement happened to leave the cursor.
        self.cursor = self.source.base_address();
        let args = self.config.main_argument.clone().into_iter().collect::<Vec<_>>();
        let value = self.call_function("main", args, 0)?;
        Ok(Some(value))
    }

    /* ───────────── top-level / statement execution ───────────── */

    fn exec_block(&mut self, body: &[Node], out: &mut Vec<Pattern>) -> Result<(), EvalError> {
        for item in body {
            self.exec_item(item, out)?;
            if self.control_flow != ControlFlow::None {
                break;
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_lines)]
    fn exec_item(&mut self, item: &Node, out: &mut Vec<Pattern>) -> Result<(), EvalError> {
        match item {
            Node::Struct { name, .. }
            | Node::Union { name, .. }
            | Node::Enum { name, .. }
            | Node::Bitfield { name, .. }
            | Node::TypeDecl { name, .. } => {
                self.types.push((name.clone(), item.clone()));
                Ok(())
            },
            Node::FunctionDefinition { name, .. } => {
                self.functions.push((name.clone(), item.clone()));
                Ok(())
            },
            Node::VariableDecl { name, ty, placement, attributes, span } => {
                let line = span.start.0;
                let pattern = self.create_variable(name, ty, placement.as_deref(), attributes, line)?;
                let value = value::from_pattern(&pattern);
                self.current_scope_mut().bind(name.clone(), value);
                out.push(pattern);
                Ok(())
            },
            Node::ArrayVariableDecl { name, ty, size, placement, attributes, span } => {
                let line = span.start.0;
                let (pattern, value) = self.create_array(name, ty, size, placement.as_deref(), attributes, line)?;
                self.current_scope_mut().bind(name.clone(), value);
                out.push(pattern);
                Ok(())
            },
            Node::PointerVariableDecl { name, ty, pointer_size, placement, attributes, span } => {
                let line = span.start.0;
                let pattern = self.create_pointer(name, ty, *pointer_size, placement.as_deref(), attributes, line)?;
                let value = value::from_pattern(&pattern);
                self.current_scope_mut().bind(name.clone(), value);
                out.push(pattern);
                Ok(())
            },
            Node::Assign { target, value, span } => {
                let line = span.start.0;
                let new_value = self.eval_expr(value)?;
                self.assign(target, new_value, line)
            },
            Node::If { cond, then_branch, else_branch, span } => {
                let line = span.start.0;
                if self.eval_expr(cond)?.truthy(line)? {
                    self.exec_block(then_branch, out)
                } else {
                    self.exec_block(else_branch, out)
                }
            },
            Node::While { cond, body, span } => {
                let line = span.start.0;
                let mut iterations = 0u64;
                loop {
                    if !self.eval_expr(cond)?.truthy(line)? {
                        break;
                    }
                    iterations += 1;
                    if iterations > self.config.array_limit {
                        return Err(self.err(line, EvalErrorKind::ArrayLimitExceeded(self.config.array_limit)));
                    }
                    self.check_abort(line)?;
                    match self.exec_loop_body(body, out)? {
                        LoopSignal::Break => break,
                        LoopSignal::PropagateReturn => return Ok(()),
                        LoopSignal::Continue => {},
                    }
                }
                Ok(())
            },
            Node::For { init, cond, post, body, span } => {
                let line = span.start.0;
                self.exec_item(init, out)?;
                let mut iterations = 0u64;
                loop {
                    if !self.eval_expr(cond)?.truthy(line)? {
                        break;
                    }
                    iterations += 1;
                    if iterations > self.config.array_limit {
                        return Err(self.err(line, EvalErrorKind::ArrayLimitExceeded(self.config.array_limit)));
                    }
                    self.check_abort(line)?;
                    match self.exec_loop_body(body, out)? {
                        LoopSignal::Break => break,
                        LoopSignal::PropagateReturn => return Ok(()),
                        LoopSignal::Continue => {},
                    }
                    self.exec_item(post, out)?;
                }
                Ok(())
            },
            Node::Return { value, span } => {
                self.return_value =
                    value.as_ref().map(|v| self.eval_expr(v)).transpose()?.or(Some(Value::Void));
                self.control_flow = ControlFlow::Return;
                let _ = span;
                Ok(())
            },
            Node::Break(_) => {
                self.control_flow = ControlFlow::Break;
                Ok(())
            },
            Node::Continue(_) => {
                self.control_flow = ControlFlow::Continue;
                Ok(())
            },
            Node::Namespace { body, .. } | Node::Compound(body) => self.exec_block(body, out),
            Node::FunctionCall { path, args, span } => {
                let line = span.start.0;
                let args = self.eval_args(args)?;
                self.call_function(path.last().map_or("", String::as_str), args, line)?;
                Ok(())
            },
            other => Err(self.err(other.span().start.0, EvalErrorKind::Unsupported(format!("{other:?}")))),
        }
    }

    fn exec_loop_body(&mut self, body: &[Node], out: &mut Vec<Pattern>) -> Result<LoopSignal, EvalError> {
        self.exec_block(body, out)?;
        match self.control_flow {
            ControlFlow::Break => {
                self.control_flow = ControlFlow::None;
                Ok(LoopSignal::Break)
            },
            ControlFlow::Continue => {
                self.control_flow = ControlFlow::None;
                Ok(LoopSignal::Continue)
            },
            ControlFlow::Return => Ok(LoopSignal::PropagateReturn),
            ControlFlow::None => Ok(LoopSignal::Continue),
        }
    }

    fn current_scope_mut(&mut self) -> &mut Scope {
        self.scopes.last_mut().expect("at least one scope frame always exists")
    }

    fn eval_args(&mut self, args: &[Node]) -> Result<Vec<Value>, EvalError> {
        args.iter().map(|a| self.eval_expr(a)).collect()
    }

    /* ───────────── assignment ───────────── */

    fn assign(&mut self, target: &Node, new_value: Value, line: u32) -> Result<(), EvalError> {
        let Node::RValue { path, .. } = target else {
            return Err(self.err(line, EvalErrorKind::Unsupported("assignment target must be a name".into())));
        };
        match path.as_slice() {
            [PathSegment::Field(name)] => {
                for scope in self.scopes.iter_mut().rev() {
                    if let Some(slot) = scope.find_mut(name) {
                        *slot = new_value;
                        return Ok(());
                    }
                }
                Err(self.err(line, EvalErrorKind::UnresolvedName(name.clone())))
            },
            [PathSegment::Field(name), PathSegment::Field(field)] => {
                for scope in self.scopes.iter_mut().rev() {
                    if let Some(Value::Struct(fields)) = scope.find_mut(name) {
                        if let Some(slot) = fields.iter_mut().find(|(n, _)| n == field) {
                            slot.1 = new_value;
                            return Ok(());
                        }
                        return Err(self.err(line, EvalErrorKind::NoSuchField(field.clone())));
                    }
                }
                Err(self.err(line, EvalErrorKind::UnresolvedName(name.clone())))
            },
            [PathSegment::Field(name), PathSegment::Index(index_expr)] => {
                let index = self.eval_expr(index_expr)?.as_index(line)?;
                for scope in self.scopes.iter_mut().rev() {
                    if let Some(Value::Array(elems)) = scope.find_mut(name) {
                        let slot = elems
                            .get_mut(index)
                            .ok_or(self.err(line, EvalErrorKind::IndexOutOfBounds { index: index as i128, len: elems.len() }))?;
                        *slot = new_value;
                        return Ok(());
                    }
                }
                Err(self.err(line, EvalErrorKind::UnresolvedName(name.clone())))
            },
            _ => Err(self.err(line, EvalErrorKind::Unsupported("assignment target deeper than one field/index".into()))),
        }
    }

    /* ───────────── name resolution (`spec` §4.4.3) ───────────── */

    fn lookup_var(&self, name: &str) -> Option<Value> {
        self.scopes.iter().rev().find_map(|scope| scope.find(name).cloned())
    }

    fn resolve_rvalue(&mut self, path: &[PathSegment], line: u32) -> Result<Value, EvalError> {
        let mut segs = path.iter();
        let first = segs.next().ok_or_else(|| self.err(line, EvalErrorKind::UnresolvedName(String::new())))?;
        let mut current = match first {
            PathSegment::Field(name) if name == "$" => Value::Unsigned(u128::from(self.cursor)),
            PathSegment::Field(name) if name == "parent" => {
                let parent_idx = self
                    .scopes
                    .len()
                    .checked_sub(2)
                    .ok_or_else(|| self.err(line, EvalErrorKind::NoParentScope))?;
                Value::Struct(self.scopes[parent_idx].vars.clone())
            },
            PathSegment::Field(name) if name == "this" => {
                let frame = self
                    .scopes
                    .iter()
                    .rev()
                    .find(|s| s.is_struct_like)
                    .ok_or_else(|| self.err(line, EvalErrorKind::NoEnclosingStruct))?;
                Value::Struct(frame.vars.clone())
            },
            PathSegment::Field(name) => {
                self.lookup_var(name).ok_or_else(|| self.err(line, EvalErrorKind::UnresolvedName(name.clone())))?
            },
            PathSegment::Index(_) => {
                return Err(self.err(line, EvalErrorKind::Unsupported("index with no base name".into())));
            },
        };
        for seg in segs {
            current = match seg {
                PathSegment::Field(name) => current.field(name, line)?,
                PathSegment::Index(expr) => {
                    let idx = self.eval_expr(expr)?.as_index(line)?;
                    current.index(idx, line)?
                },
            };
        }
        Ok(current)
    }

    /* ───────────── expressions (`spec` §4.3/§4.4.4) ───────────── */

    fn eval_expr(&mut self, node: &Node) -> Result<Value, EvalError> {
        let line = node.span().start.0;
        match node {
            Node::Literal { value, .. } => Ok(match value {
                Literal::Integer(i) => Value::Signed(*i),
                Literal::Float(f) => Value::Float(*f),
                Literal::Boolean(b) => Value::Boolean(*b),
                Literal::Character(c) => Value::Character(*c),
                Literal::String(s) => Value::String(s.clone()),
            }),
            Node::RValue { path, .. } => self.resolve_rvalue(path, line),
            Node::Unary { op, expr, .. } => {
                let v = self.eval_expr(expr)?;
                v.apply_unary(*op, line)
            },
            Node::Binary { op, lhs, rhs, .. } => {
                let l = self.eval_expr(lhs)?;
                let r = self.eval_expr(rhs)?;
                value::binary_op(*op, l, r, line)
            },
            Node::Ternary { cond, then_branch, else_branch, .. } => {
                if self.eval_expr(cond)?.truthy(line)? {
                    self.eval_expr(then_branch)
                } else {
                    self.eval_expr(else_branch)
                }
            },
            Node::Cast { ty, expr, .. } => {
                let v = self.eval_expr(expr)?;
                value::cast(v, ty, line)
            },
            Node::ScopeResolution { path, .. } => self.resolve_enum_variant(path, line),
            Node::FunctionCall { path, args, .. } => {
                let args = self.eval_args(args)?;
                self.call_function(path.last().map_or("", String::as_str), args, line)
            },
            Node::BuiltinTypeRef { .. } => Ok(Value::Void),
            other => Err(self.err(line, EvalErrorKind::Unsupported(format!("{other:?} is not an expression")))),
        }
    }

    fn resolve_enum_variant(&mut self, path: &[String], line: u32) -> Result<Value, EvalError> {
        let [type_name, variant_name] = path else {
            return Err(self.err(line, EvalErrorKind::Unsupported("scope resolution needs Type::Variant".into())));
        };
        let Some((_, Node::Enum { variants, underlying, .. })) =
            self.types.iter().find(|(n, _)| n == type_name).cloned()
        else {
            return Err(self.err(line, EvalErrorKind::UnknownType(type_name.clone())));
        };
        let signed = matches!(value::value_type_of(&underlying).signedness(), Signedness::Signed);
        let mut running = 0i128;
        for variant in &variants {
            if let Some(expr) = &variant.value {
                running = self.eval_expr(expr)?.as_i128(line)?;
            }
            if variant.name == *variant_name {
                return Ok(if signed { Value::Signed(running) } else { Value::Unsigned(running as u128) });
            }
            running += 1;
        }
        Err(self.err(line, EvalErrorKind::UnresolvedName(format!("{type_name}::{variant_name}"))))
    }

    /* ───────────── functions (`spec` §4.4.5) ───────────── */

    fn call_function(&mut self, name: &str, args: Vec<Value>, line: u32) -> Result<Value, EvalError> {
        if let Some(result) = builtins::call(self, name, &args, line)? {
            return Ok(result);
        }
        let Some((_, def)) = self.functions.iter().find(|(n, _)| n == name).cloned() else {
            return Err(self.err(line, EvalErrorKind::UnknownFunction(name.to_string())));
        };
        let Node::FunctionDefinition { params, body, .. } = def else { unreachable!("registry only holds FunctionDefinition nodes") };

        self.enter_instantiation(line)?;
        let mut frame = Scope::new(false);
        for (i, param) in params.iter().enumerate() {
            let value = args.get(i).cloned().unwrap_or(Value::Void);
            frame.bind(param.name.clone(), value);
        }
        self.scopes.push(frame);
        let mut discarded = Vec::new();
        let result = self.exec_block(&body, &mut discarded);
        self.scopes.pop();
        self.leave_instantiation();
        result?;

        let ret = self.return_value.take().unwrap_or(Value::Void);
        self.control_flow = ControlFlow::None;
        Ok(ret)
    }

    /* ───────────── pattern construction (`spec` §4.4.1/§4.4.2) ───────────── */

    fn resolved_endian(&self, ty: &TypeRef) -> Endianness {
        ty.endian.unwrap_or(self.config.default_endian)
    }

    fn with_placement<T>(
        &mut self,
        placement: Option<&Node>,
        at_global_scope: bool,
        f: impl FnOnce(&mut Self) -> Result<T, EvalError>,
    ) -> Result<T, EvalError> {
        let saved = self.cursor;
        if let Some(expr) = placement {
            let line = expr.span().start.0;
            self.cursor = self.eval_expr(expr)?.as_u64(line)?;
        }
        let result = f(self)?;
        if placement.is_some() && !at_global_scope {
            self.cursor = saved;
        }
        Ok(result)
    }

    fn at_global_scope(&self) -> bool {
        self.scopes.len() == 1
    }

    fn create_variable(
        &mut self,
        name: &str,
        ty: &TypeRef,
        placement: Option<&Node>,
        attributes: &[Attribute],
        line: u32,
    ) -> Result<Pattern, EvalError> {
        let at_global = self.at_global_scope();
        self.with_placement(placement, at_global, |this| {
            this.charge_pattern(line)?;
            let mut pattern = this.instantiate_type(ty, name, line)?;
            apply_attributes(&mut pattern, attributes);
            Ok(pattern)
        })
    }

    fn create_pointer(
        &mut self,
        name: &str,
        ty: &TypeRef,
        pointer_size: ValueType,
        placement: Option<&Node>,
        attributes: &[Attribute],
        line: u32,
    ) -> Result<Pattern, EvalError> {
        let at_global = self.at_global_scope();
        self.with_placement(placement, at_global, |this| {
            this.charge_pattern(line)?;
            let own_offset = this.cursor;
            let endian = this.config.default_endian;
            let address = this.read_unsigned(this.cursor, pointer_size.size() as usize, endian, line)? as u64;
            this.cursor += u64::from(pointer_size.size());

            let saved = this.cursor;
            this.cursor = address;
            let pointee = this.instantiate_type(ty, "*", line)?;
            this.cursor = saved;

            let mut meta = PatternMeta::new(own_offset, u64::from(pointer_size.size()), name, "pointer");
            meta.endianness = Some(endian);
            let mut pattern = Pattern::new(meta, PatternKind::Pointer { address, pointee: Box::new(pointee) });
            apply_attributes(&mut pattern, attributes);
            Ok(pattern)
        })
    }

    /// Dispatches a [`TypeRef`] to its scalar or named instantiation,
    /// advancing `self.cursor` by the bytes it consumes.
    fn instantiate_type(&mut self, ty: &TypeRef, name: &str, line: u32) -> Result<Pattern, EvalError> {
        match &ty.kind {
            TypeRefKind::Builtin(vt) => self.instantiate_scalar(*vt, name, self.resolved_endian(ty), line),
            TypeRefKind::Named { path, .. } => {
                let type_name = path.last().cloned().unwrap_or_default();
                self.enter_instantiation(line)?;
                let result = self.instantiate_named(&type_name, name, self.resolved_endian(ty), line);
                self.leave_instantiation();
                result
            },
        }
    }

    fn instantiate_scalar(&mut self, vt: ValueType, name: &str, endian: Endianness, line: u32) -> Result<Pattern, EvalError> {
        let offset = self.cursor;
        let resolved = endian.resolved();
        let (kind, size) = match vt {
            ValueType::Unsigned8
            | ValueType::Unsigned16
            | ValueType::Unsigned32
            | ValueType::Unsigned64
            | ValueType::Unsigned128 => {
                let size = vt.size() as usize;
                let v = self.read_unsigned(offset, size, endian, line)?;
                (PatternKind::Unsigned(v), size)
            },
            ValueType::Signed8 | ValueType::Signed16 | ValueType::Signed32 | ValueType::Signed64 | ValueType::Signed128 => {
                let size = vt.size() as usize;
                let u = self.read_unsigned(offset, size, endian, line)?;
                (PatternKind::Signed(sign_extend(u, size)), size)
            },
            ValueType::Float => {
                let mut buf = [0u8; 4];
                self.read_bytes(offset, &mut buf, line)?;
                resolved.fixup(&mut buf);
                (PatternKind::Float(f64::from(f32::from_le_bytes(buf))), 4)
            },
            ValueType::Double => {
                let mut buf = [0u8; 8];
                self.read_bytes(offset, &mut buf, line)?;
                resolved.fixup(&mut buf);
                (PatternKind::Float(f64::from_le_bytes(buf)), 8)
            },
            ValueType::Boolean => {
                let mut buf = [0u8; 1];
                self.read_bytes(offset, &mut buf, line)?;
                (PatternKind::Boolean(buf[0] != 0), 1)
            },
            ValueType::Character => {
                let mut buf = [0u8; 1];
                self.read_bytes(offset, &mut buf, line)?;
                (PatternKind::Character(buf[0] as char), 1)
            },
            ValueType::Character16 => {
                let mut buf = [0u8; 2];
                self.read_bytes(offset, &mut buf, line)?;
                resolved.fixup(&mut buf);
                let code = u16::from_le_bytes(buf);
                (PatternKind::WideCharacter(char::from_u32(u32::from(code)).unwrap_or('\u{FFFD}')), 2)
            },
            ValueType::String => {
                let s = self.read_c_string(offset, line)?;
                let size = s.len() + 1;
                (PatternKind::String(s), size)
            },
            ValueType::Padding => (PatternKind::Padding, 0),
            ValueType::CustomType | ValueType::Auto => {
                return Err(self.err(line, EvalErrorKind::UnknownType(format!("{vt:?}"))));
            },
        };
        self.cursor += size as u64;
        let meta = PatternMeta::new(offset, size as u64, name, builtin_type_name(vt));
        Ok(Pattern::new(meta, kind))
    }

    fn instantiate_named(&mut self, type_name: &str, name: &str, endian: Endianness, line: u32) -> Result<Pattern, EvalError> {
        let Some((_, def)) = self.types.iter().find(|(n, _)| n == type_name).cloned() else {
            return Err(self.err(line, EvalErrorKind::UnknownType(type_name.to_string())));
        };
        match def {
            Node::Struct { body, attributes, .. } => self.instantiate_struct(name, type_name, &body, &attributes, line),
            Node::Union { body, attributes, .. } => self.instantiate_union(name, type_name, &body, &attributes, line),
            Node::Bitfield { fields, attributes, .. } => self.instantiate_bitfield(name, type_name, &fields, &attributes, endian, line),
            Node::Enum { underlying, variants, .. } => self.instantiate_enum(name, type_name, &underlying, &variants, endian, line),
            Node::TypeDecl { ty, .. } => self.instantiate_type(&ty, name, line),
            _ => unreachable!("registry only holds type-declaration nodes"),
        }
    }

    fn instantiate_struct(
        &mut self,
        name: &str,
        type_name: &str,
        body: &[Node],
        attributes: &[Attribute],
        line: u32,
    ) -> Result<Pattern, EvalError> {
        self.charge_pattern(line)?;
        let offset = self.cursor;
        self.scopes.push(Scope::new(true));
        let mut children = Vec::new();
        let result = self.exec_block(body, &mut children);
        self.scopes.pop();
        result?;
        let size = self.cursor - offset;
        let mut pattern =
            Pattern::new(PatternMeta::new(offset, size, name, type_name), PatternKind::Struct { children });
        apply_attributes(&mut pattern, attributes);
        Ok(pattern)
    }

    fn instantiate_union(
        &mut self,
        name: &str,
        type_name: &str,
        body: &[Node],
        attributes: &[Attribute],
        line: u32,
    ) -> Result<Pattern, EvalError> {
        self.charge_pattern(line)?;
        let offset = self.cursor;
        self.scopes.push(Scope::new(true));
        let mut children = Vec::new();
        let mut widest = 0u64;
        for item in body {
            self.cursor = offset;
            self.exec_item(item, &mut children)?;
            widest = widest.max(self.cursor - offset);
        }
        self.scopes.pop();
        self.cursor = offset + widest;
        let mut pattern =
            Pattern::new(PatternMeta::new(offset, widest, name, type_name), PatternKind::Union { children });
        apply_attributes(&mut pattern, attributes);
        Ok(pattern)
    }

    fn instantiate_bitfield(
        &mut self,
        name: &str,
        type_name: &str,
        fields: &[Node],
        attributes: &[Attribute],
        endian: Endianness,
        line: u32,
    ) -> Result<Pattern, EvalError> {
        self.charge_pattern(line)?;
        let total_bits: u32 = fields
            .iter()
            .map(|f| {
                let Node::BitfieldField { bits, .. } = f else { return Ok(0u32) };
                Ok(self.eval_expr(bits)?.as_u64(line)? as u32)
            })
            .collect::<Result<Vec<_>, EvalError>>()?
            .into_iter()
            .sum();
        let byte_size = u64::from(total_bits.div_ceil(8));

        let offset = self.cursor;
        let mut buf = vec![0u8; byte_size as usize];
        self.read_bytes(offset, &mut buf, line)?;
        endian.resolved().fixup(&mut buf);
        let mut backing: u128 = 0;
        for &b in &buf {
            backing = (backing << 8) | u128::from(b);
        }

        self.scopes.push(Scope::new(true));
        let mut children = Vec::with_capacity(fields.len());
        let mut bit_offset = 0u32;
        for f in fields {
            let Node::BitfieldField { name: field_name, bits, .. } = f else { continue };
            self.charge_pattern(line)?;
            let width = self.eval_expr(bits)?.as_u64(line)? as u32;
            let mask: u128 = if width >= 128 { u128::MAX } else { (1u128 << width) - 1 };
            let value = (backing >> bit_offset) & mask;
            self.current_scope_mut().bind(field_name.clone(), Value::Unsigned(value));
            children.push(Pattern::new(
                PatternMeta::new(offset, 0, field_name.clone(), "bit"),
                PatternKind::BitfieldField { bit_offset, bit_size: width, value },
            ));
            bit_offset += width;
        }
        self.scopes.pop();
        self.cursor += byte_size;

        let mut pattern =
            Pattern::new(PatternMeta::new(offset, byte_size, name, type_name), PatternKind::Bitfield { children });
        apply_attributes(&mut pattern, attributes);
        Ok(pattern)
    }

    fn instantiate_enum(
        &mut self,
        name: &str,
        type_name: &str,
        underlying: &TypeRef,
        variants: &[hexpat_ast::EnumVariant],
        endian: Endianness,
        line: u32,
    ) -> Result<Pattern, EvalError> {
        self.charge_pattern(line)?;
        let vt = value::value_type_of(underlying);
        let offset = self.cursor;
        let size = vt.size() as usize;
        let signed = matches!(vt.signedness(), Signedness::Signed);
        let u = self.read_unsigned(offset, size, endian, line)?;
        self.cursor += size as u64;
        let signed_value = if signed { sign_extend(u, size) } else { u as i128 };

        let mut running = 0i128;
        let mut variant_name = None;
        for variant in variants {
            if let Some(expr) = &variant.value {
                running = self.eval_expr(expr)?.as_i128(line)?;
            }
            if running == signed_value {
                variant_name = Some(variant.name.clone());
            }
            running += 1;
        }
        Ok(Pattern::new(
            PatternMeta::new(offset, size as u64, name, type_name),
            PatternKind::Enum { value: signed_value, variant_name },
        ))
    }

    /* ───────────── arrays (`spec` §4.4.2) ───────────── */

    fn create_array(
        &mut self,
        name: &str,
        ty: &TypeRef,
        size: &ArraySize,
        placement: Option<&Node>,
        attributes: &[Attribute],
        line: u32,
    ) -> Result<(Pattern, Value), EvalError> {
        let at_global = self.at_global_scope();
        self.with_placement(placement, at_global, |this| this.create_array_inner(name, ty, size, attributes, line))
    }

    fn create_array_inner(
        &mut self,
        name: &str,
        ty: &TypeRef,
        size: &ArraySize,
        attributes: &[Attribute],
        line: u32,
    ) -> Result<(Pattern, Value), EvalError> {
        let offset = self.cursor;

        if let (TypeRefKind::Builtin(ValueType::Character), ArraySize::Fixed(count_expr)) = (&ty.kind, size) {
            let count = self.eval_fixed_count(count_expr, line)?;
            let mut buf = vec![0u8; count];
            self.read_bytes(offset, &mut buf, line)?;
            self.cursor += count as u64;
            self.charge_pattern(line)?;
            let text = String::from_utf8_lossy(&buf).trim_end_matches('\0').to_string();
            let value = Value::String(text.clone());
            let mut pattern =
                Pattern::new(PatternMeta::new(offset, count as u64, name, "char"), PatternKind::String(text));
            apply_attributes(&mut pattern, attributes);
            return Ok((pattern, value));
        }

        if let (TypeRefKind::Builtin(ValueType::Character), ArraySize::ZeroTerminated) = (&ty.kind, size) {
            let text = self.read_c_string(offset, line)?;
            let total = text.len() as u64 + 1;
            self.cursor += total;
            self.charge_pattern(line)?;
            let value = Value::String(text.clone());
            let mut pattern = Pattern::new(PatternMeta::new(offset, total, name, "char"), PatternKind::String(text));
            apply_attributes(&mut pattern, attributes);
            return Ok((pattern, value));
        }

        if let (TypeRefKind::Builtin(ValueType::Padding), ArraySize::Fixed(count_expr)) = (&ty.kind, size) {
            let count = self.eval_fixed_count(count_expr, line)?;
            self.cursor += count as u64;
            self.charge_pattern(line)?;
            let mut pattern = Pattern::new(PatternMeta::new(offset, count as u64, name, "padding"), PatternKind::Padding);
            apply_attributes(&mut pattern, attributes);
            return Ok((pattern, Value::Void));
        }

        if let (TypeRefKind::Builtin(ValueType::Character16), ArraySize::Fixed(count_expr)) = (&ty.kind, size) {
            let count = self.eval_fixed_count(count_expr, line)?;
            let resolved = self.resolved_endian(ty).resolved();
            let mut chars = Vec::with_capacity(count);
            let mut cursor = offset;
            for _ in 0..count {
                let mut buf = [0u8; 2];
                self.read_bytes(cursor, &mut buf, line)?;
                resolved.fixup(&mut buf);
                let code = u16::from_le_bytes(buf);
                chars.push(char::from_u32(u32::from(code)).unwrap_or('\u{FFFD}'));
                cursor += 2;
            }
            let total = count as u64 * 2;
            self.cursor += total;
            self.charge_pattern(line)?;
            let text: String = chars.into_iter().collect::<String>().trim_end_matches('\0').to_string();
            let value = Value::String(text.clone());
            let mut pattern = Pattern::new(PatternMeta::new(offset, total, name, "char16"), PatternKind::WideString(text));
            apply_attributes(&mut pattern, attributes);
            return Ok((pattern, value));
        }

        if let (TypeRefKind::Builtin(ValueType::Character16), ArraySize::ZeroTerminated) = (&ty.kind, size) {
            let endian = self.resolved_endian(ty);
            let (text, total) = self.read_c_wstring(offset, endian, line)?;
            self.cursor += total;
            self.charge_pattern(line)?;
            let value = Value::String(text.clone());
            let mut pattern = Pattern::new(PatternMeta::new(offset, total, name, "char16"), PatternKind::WideString(text));
            apply_attributes(&mut pattern, attributes);
            return Ok((pattern, value));
        }

        let is_scalar = matches!(ty.kind, TypeRefKind::Builtin(_));
        let mut elements = Vec::new();
        let mut values = Vec::new();

        match size {
            ArraySize::Fixed(count_expr) => {
                let count = self.eval_fixed_count(count_expr, line)?;
                for i in 0..count {
                    self.charge_pattern(line)?;
                    let elem = self.instantiate_type(ty, &i.to_string(), line)?;
                    values.push(value::from_pattern(&elem));
                    elements.push(elem);
                }
            },
            ArraySize::While(cond) => {
                let mut i = 0u64;
                loop {
                    if !self.eval_expr(cond)?.truthy(line)? {
                        break;
                    }
                    if i >= self.config.array_limit {
                        return Err(self.err(line, EvalErrorKind::ArrayLimitExceeded(self.config.array_limit)));
                    }
                    self.charge_pattern(line)?;
                    let elem = self.instantiate_type(ty, &i.to_string(), line)?;
                    values.push(value::from_pattern(&elem));
                    elements.push(elem);
                    i += 1;
                }
            },
            ArraySize::ZeroTerminated => {
                let mut i = 0u64;
                loop {
                    if i >= self.config.array_limit {
                        return Err(self.err(line, EvalErrorKind::ArrayLimitExceeded(self.config.array_limit)));
                    }
                    self.charge_pattern(line)?;
                    let elem = self.instantiate_type(ty, &i.to_string(), line)?;
                    let is_zero = elem.numeric_value() == 0.0;
                    values.push(value::from_pattern(&elem));
                    elements.push(elem);
                    i += 1;
                    if is_zero {
                        break;
                    }
                }
            },
        }

        let total_size: u64 = elements.iter().map(|p| p.meta.size).sum();
        let kind = if is_scalar && matches!(size, ArraySize::Fixed(_)) {
            let template = elements.into_iter().next().unwrap_or_else(|| {
                Pattern::new(PatternMeta::new(offset, 0, "0", "?"), PatternKind::Padding)
            });
            PatternKind::StaticArray { count: values.len() as u64, template: Box::new(template) }
        } else {
            PatternKind::DynamicArray { children: elements }
        };
        let type_name = value::type_ref_name(ty);
        let mut pattern = Pattern::new(PatternMeta::new(offset, total_size, name, type_name), kind);
        apply_attributes(&mut pattern, attributes);
        Ok((pattern, Value::Array(values)))
    }

    fn eval_fixed_count(&mut self, expr: &Node, line: u32) -> Result<usize, EvalError> {
        let n = self.eval_expr(expr)?.as_i128(line)?;
        if n < 0 {
            return Err(self.err(line, EvalErrorKind::NegativeArraySize));
        }
        if n as u64 > self.config.array_limit {
            return Err(self.err(line, EvalErrorKind::ArrayLimitExceeded(self.config.array_limit)));
        }
        Ok(n as usize)
    }

    /* ───────────── byte reads ───────────── */

    fn read_bytes(&self, offset: u64, buf: &mut [u8], line: u32) -> Result<(), EvalError> {
        self.source.read(offset, buf).map_err(|e| self.err(line, EvalErrorKind::ByteSource(e)))
    }

    fn read_unsigned(&self, offset: u64, size: usize, endian: Endianness, line: u32) -> Result<u128, EvalError> {
        let mut buf = [0u8; 16];
        self.read_bytes(offset, &mut buf[..size], line)?;
        endian.resolved().fixup(&mut buf[..size]);
        let mut v: u128 = 0;
        for &b in buf[..size].iter().rev() {
            v = (v << 8) | u128::from(b);
        }
        Ok(v)
    }

    fn read_c_string(&self, offset: u64, line: u32) -> Result<String, EvalError> {
        let mut bytes = Vec::new();
        let mut cursor = offset;
        loop {
            if cursor - offset > self.config.array_limit {
                return Err(self.err(line, EvalErrorKind::ArrayLimitExceeded(self.config.array_limit)));
            }
            let mut b = [0u8];
            self.read_bytes(cursor, &mut b, line)?;
            if b[0] == 0 {
                break;
            }
            bytes.push(b[0]);
            cursor += 1;
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Reads wide characters from `offset` until an all-zero element,
    /// returning the decoded text and the total byte count including the
    /// terminator.
    fn read_c_wstring(&self, offset: u64, endian: Endianness, line: u32) -> Result<(String, u64), EvalError> {
        let resolved = endian.resolved();
        let mut text = String::new();
        let mut cursor = offset;
        loop {
            if cursor - offset > self.config.array_limit * 2 {
                return Err(self.err(line, EvalErrorKind::ArrayLimitExceeded(self.config.array_limit)));
            }
            let mut buf = [0u8; 2];
            self.read_bytes(cursor, &mut buf, line)?;
            resolved.fixup(&mut buf);
            let code = u16::from_le_bytes(buf);
            cursor += 2;
            if code == 0 {
                break;
            }
            text.push(char::from_u32(u32::from(code)).unwrap_or('\u{FFFD}'));
        }
        Ok((text, cursor - offset))
    }
}

fn sign_extend(value: u128, size: usize) -> i128 {
    let bits = size * 8;
    if bits >= 128 {
        return value as i128;
    }
    let shift = 128 - bits;
    ((value << shift) as i128) >> shift
}

fn builtin_type_name(vt: ValueType) -> &'static str {
    match vt {
        ValueType::Unsigned8 => "u8",
        ValueType::Unsigned16 => "u16",
        ValueType::Unsigned32 => "u32",
        ValueType::Unsigned64 => "u64",
        ValueType::Unsigned128 => "u128",
        ValueType::Signed8 => "s8",
        ValueType::Signed16 => "s16",
        ValueType::Signed32 => "s32",
        ValueType::Signed64 => "s64",
        ValueType::Signed128 => "s128",
        ValueType::Float => "float",
        ValueType::Double => "double",
        ValueType::Character => "char",
        ValueType::Character16 => "char16",
        ValueType::Boolean => "bool",
        ValueType::String => "str",
        ValueType::Padding => "padding",
        ValueType::CustomType => "?",
        ValueType::Auto => "auto",
    }
}

fn apply_attributes(pattern: &mut Pattern, attributes: &[Attribute]) {
    for attr in attributes {
        match attr {
            Attribute::Color(hex) => {
                if let Ok(v) = u32::from_str_radix(hex.trim_start_matches('#'), 16) {
                    pattern.meta.color = Color(v);
                }
            },
            Attribute::Name(n) => pattern.meta.display_name = n.clone(),
            Attribute::Comment(c) => pattern.meta.comment = Some(c.clone()),
            Attribute::Format(f) => pattern.meta.formatter_fn = Some(f.clone()),
            Attribute::Transform(f) => pattern.meta.transform_fn = Some(f.clone()),
            Attribute::Hidden => pattern.meta.hidden = true,
            Attribute::Inline => pattern.meta.inlined = true,
            Attribute::Sealed => pattern.meta.sealed = true,
            Attribute::NoUniqueAddress | Attribute::Export | Attribute::PointerBase(_) | Attribute::Unknown { .. } => {},
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hexpat_core::SliceSource;
    use hexpat_lexer::Lexer;
    use hexpat_parser::parse;

    const B: [u8; 16] = [0x01, 0, 0, 0, 0x02, 0, 0, 0, b'A', b'B', b'C', 0, 0xFF, 0xFF, 0xFF, 0xFF];

    fn run(src: &str) -> EvalOutcome {
        let tokens = Lexer::new(src, hexpat_core::SourceId(0)).tokenize().expect("lex");
        let program = parse(&tokens, hexpat_core::SourceId(0)).expect("parse");
        let source = SliceSource::new(&B, 0);
        evaluate(&program, &source, EvalConfig::default()).expect("eval")
    }

    #[test]
    fn struct_with_two_fields_reads_in_order() {
        let outcome = run("struct Header { u32 a; u32 b; }; Header h @ 0x00;");
        assert_eq!(outcome.patterns.len(), 1);
        let PatternKind::Struct { children } = &outcome.patterns[0].kind else { panic!("expected struct") };
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].kind, PatternKind::Unsigned(1));
        assert_eq!(children[1].kind, PatternKind::Unsigned(2));
    }

    #[test]
    fn dynamic_array_grows_with_while_condition() {
        let outcome = run(
            "struct S { u32 count; u8 items[while($ < 8 + count)]; }; S s @ 0x00;",
        );
        let PatternKind::Struct { children } = &outcome.patterns[0].kind else { panic!("expected struct") };
        let PatternKind::DynamicArray { children: items } = &children[1].kind else { panic!("expected array") };
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn zero_terminated_string_collapses_into_one_pattern() {
        let outcome = run("char name[] @ 0x08;");
        assert_eq!(outcome.patterns.len(), 1);
        assert_eq!(outcome.patterns[0].kind, PatternKind::String("ABC".to_string()));
    }

    #[test]
    fn zero_terminated_wide_string_collapses_into_one_pattern() {
        let wide: [u8; 8] = [b'H', 0, b'i', 0, 0, 0, 0xFF, 0xFF];
        let tokens = Lexer::new("char16 name[] @ 0x00;", hexpat_core::SourceId(0)).tokenize().expect("lex");
        let program = parse(&tokens, hexpat_core::SourceId(0)).expect("parse");
        let source = SliceSource::new(&wide, 0);
        let outcome = evaluate(&program, &source, EvalConfig::default()).expect("eval");
        assert_eq!(outcome.patterns.len(), 1);
        assert_eq!(outcome.patterns[0].kind, PatternKind::WideString("Hi".to_string()));
        assert_eq!(outcome.patterns[0].meta.size, 6);
    }

    #[test]
    fn fixed_wide_char_array_collapses_and_trims_trailing_nul() {
        let wide: [u8; 8] = [b'H', 0, b'i', 0, 0, 0, 0, 0];
        let tokens = Lexer::new("char16 name[4] @ 0x00;", hexpat_core::SourceId(0)).tokenize().expect("lex");
        let program = parse(&tokens, hexpat_core::SourceId(0)).expect("parse");
        let source = SliceSource::new(&wide, 0);
        let outcome = evaluate(&program, &source, EvalConfig::default()).expect("eval");
        assert_eq!(outcome.patterns[0].kind, PatternKind::WideString("Hi".to_string()));
        assert_eq!(outcome.patterns[0].meta.size, 8);
    }

    #[test]
    fn pointer_reads_address_then_pointee() {
        let outcome = run("struct P { u32 value; }; P *ptr : u32 @ 0x00;");
        let PatternKind::Pointer { address, pointee } = &outcome.patterns[0].kind else { panic!("expected pointer") };
        assert_eq!(*address, 1);
        assert!(matches!(pointee.kind, PatternKind::Struct { .. }));
    }

    #[test]
    fn enum_variant_name_resolves_from_matching_value() {
        let outcome = run("enum Kind : u32 { First = 1, Second = 2 }; Kind k @ 0x00;");
        let PatternKind::Enum { variant_name, .. } = &outcome.patterns[0].kind else { panic!("expected enum") };
        assert_eq!(variant_name.as_deref(), Some("First"));
    }

    #[test]
    fn bitfield_fields_sum_to_declared_width() {
        let outcome = run("bitfield Flags { a : 1; b : 3; c : 4; }; Flags f @ 0x00;");
        let PatternKind::Bitfield { children } = &outcome.patterns[0].kind else { panic!("expected bitfield") };
        assert_eq!(children.len(), 3);
        assert_eq!(outcome.patterns[0].meta.size, 1);
    }

    #[test]
    fn pattern_limit_aborts_the_run() {
        let tokens = Lexer::new("u8 a[100] @ 0x00;", hexpat_core::SourceId(0)).tokenize().expect("lex");
        let program = parse(&tokens, hexpat_core::SourceId(0)).expect("parse");
        let source = SliceSource::new(&B, 0);
        let mut config = EvalConfig::default();
        config.pattern_limit = 5;
        let err = evaluate(&program, &source, config).unwrap_err();
        assert!(matches!(err.kind, EvalErrorKind::PatternLimitExceeded(5)));
    }

    #[test]
    fn abort_flag_is_observed_between_pattern_creations() {
        let tokens = Lexer::new("u32 a @ 0x00; u32 b @ 0x04;", hexpat_core::SourceId(0)).tokenize().expect("lex");
        let program = parse(&tokens, hexpat_core::SourceId(0)).expect("parse");
        let source = SliceSource::new(&B, 0);
        let aborted = std::cell::Cell::new(false);
        let hooks = EvalHooks { logger: &NullLogger, dangerous_gate: &DenyAll, abort: &|| aborted.replace(true) };
        let err = evaluate_with_hooks(&program, &source, EvalConfig::default(), &hooks).unwrap_err();
        assert!(matches!(err.kind, EvalErrorKind::Aborted));
    }

    #[test]
    fn endianness_override_reverses_byte_order() {
        let outcome = run("be u32 a @ 0x00;");
        assert_eq!(outcome.patterns[0].kind, PatternKind::Unsigned(0x0100_0000));
    }

    #[test]
    fn main_return_value_is_surfaced() {
        let outcome = run("fn main() { return 1 + 2; }");
        assert_eq!(outcome.main_result, Some(Value::Signed(3)));
    }
}
