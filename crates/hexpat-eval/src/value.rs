//! The evaluator's runtime value: what an expression evaluates to before
//! (or instead of) becoming part of the pattern tree (`spec` §4.4.4).

use hexpat_ast::{BinaryOp, TypeRef, TypeRefKind, UnaryOp};
use hexpat_lexer::{Signedness, ValueType};
use hexpat_pattern::{Pattern, PatternKind};

use crate::{EvalError, EvalErrorKind};

/// A runtime value produced by expression evaluation or bound to a scope
/// variable. Distinct from [`Pattern`]: a `Value` may be transient (a
/// computed expression result) or may mirror an already-created pattern's
/// decoded content for name resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// An unsigned integer (width tracked only at the type-checking layer
    /// above this one; the runtime value is always 128 bits wide).
    Unsigned(u128),
    /// A signed integer, likewise always 128 bits wide at runtime.
    Signed(i128),
    /// `float`/`double`.
    Float(f64),
    /// `bool`.
    Boolean(bool),
    /// `char`/`char16`.
    Character(char),
    /// `str`.
    String(String),
    /// A struct/union/bitfield instance, fields in declaration order.
    Struct(Vec<(String, Value)>),
    /// An array, any of the three `ArraySize` forms.
    Array(Vec<Value>),
    /// The result of a function call or statement with no meaningful value
    /// (e.g. a `padding` declaration).
    Void,
}

impl Value {
    /// Interprets this value as a condition (`spec` §4.3: `if`/`while`
    /// truthiness).
    pub fn truthy(&self, line: u32) -> Result<bool, EvalError> {
        match self {
            Value::Boolean(b) => Ok(*b),
            Value::Unsigned(v) => Ok(*v != 0),
            Value::Signed(v) => Ok(*v != 0),
            Value::Float(v) => Ok(*v != 0.0),
            Value::Character(c) => Ok(*c != '\0'),
            Value::String(s) => Ok(!s.is_empty()),
            Value::Struct(_) | Value::Array(_) | Value::Void => {
                Err(type_mismatch(line, "expected a condition, got a struct/array/void value"))
            },
        }
    }

    /// Widens to a signed 128-bit integer.
    pub fn as_i128(&self, line: u32) -> Result<i128, EvalError> {
        match self {
            Value::Unsigned(v) => Ok(*v as i128),
            Value::Signed(v) => Ok(*v),
            Value::Float(v) => Ok(*v as i128),
            Value::Boolean(b) => Ok(i128::from(*b)),
            Value::Character(c) => Ok(i128::from(*c as u32)),
            _ => Err(type_mismatch(line, "expected a number")),
        }
    }

    /// Widens to an unsigned 128-bit integer.
    pub fn as_u128(&self, line: u32) -> Result<u128, EvalError> {
        Ok(self.as_i128(line)?.max(0) as u128)
    }

    /// Narrows to `u64`, e.g. for a byte offset.
    pub fn as_u64(&self, line: u32) -> Result<u64, EvalError> {
        Ok(self.as_i128(line)?.max(0) as u64)
    }

    /// Converts to `f64` for floating arithmetic and comparisons.
    pub fn as_f64(&self, line: u32) -> Result<f64, EvalError> {
        match self {
            Value::Float(v) => Ok(*v),
            other => Ok(other.as_i128(line)? as f64),
        }
    }

    /// Converts to a non-negative array/string index.
    pub fn as_index(&self, line: u32) -> Result<usize, EvalError> {
        let i = self.as_i128(line)?;
        if i < 0 {
            return Err(EvalError { line, kind: EvalErrorKind::IndexOutOfBounds { index: i, len: 0 } });
        }
        Ok(i as usize)
    }

    /// Looks up `name` on a [`Value::Struct`].
    pub fn field(&self, name: &str, line: u32) -> Result<Value, EvalError> {
        match self {
            Value::Struct(fields) => fields
                .iter()
                .rev()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.clone())
                .ok_or_else(|| EvalError { line, kind: EvalErrorKind::NoSuchField(name.to_string()) }),
            _ => Err(type_mismatch(line, "not a struct")),
        }
    }

    /// Indexes a [`Value::Array`] or character-indexes a [`Value::String`].
    pub fn index(&self, idx: usize, line: u32) -> Result<Value, EvalError> {
        match self {
            Value::Array(items) => items.get(idx).cloned().ok_or_else(|| EvalError {
                line,
                kind: EvalErrorKind::IndexOutOfBounds { index: idx as i128, len: items.len() },
            }),
            Value::String(s) => {
                let chars: Vec<char> = s.chars().collect();
                chars.get(idx).copied().map(Value::Character).ok_or_else(|| EvalError {
                    line,
                    kind: EvalErrorKind::IndexOutOfBounds { index: idx as i128, len: chars.len() },
                })
            },
            _ => Err(EvalError { line, kind: EvalErrorKind::NotIndexable }),
        }
    }

    /// Applies a prefix unary operator (`spec` §4.3).
    pub fn apply_unary(self, op: UnaryOp, line: u32) -> Result<Value, EvalError> {
        match op {
            UnaryOp::Pos => Ok(self),
            UnaryOp::Not => Ok(Value::Boolean(!self.truthy(line)?)),
            UnaryOp::Neg => match self {
                Value::Float(v) => Ok(Value::Float(-v)),
                other => Ok(Value::Signed(-other.as_i128(line)?)),
            },
            UnaryOp::BitNot => match self {
                Value::Unsigned(v) => Ok(Value::Unsigned(!v)),
                other => Ok(Value::Signed(!other.as_i128(line)?)),
            },
        }
    }

    /// Textual rendering for `std::print`/`std::assert` messages.
    #[must_use]
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Unsigned(v) => v.to_string(),
            Value::Signed(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Boolean(v) => v.to_string(),
            Value::Character(c) => c.to_string(),
            Value::String(s) => s.clone(),
            Value::Struct(_) => "<struct>".to_string(),
            Value::Array(items) => format!("[{} elements]", items.len()),
            Value::Void => "<void>".to_string(),
        }
    }
}

fn type_mismatch(line: u32, message: impl Into<String>) -> EvalError {
    EvalError { line, kind: EvalErrorKind::TypeMismatch(message.into()) }
}

fn values_equal(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Boolean(a), Value::Boolean(b)) => a == b,
        (Value::Character(a), Value::Character(b)) => a == b,
        _ => {
            let a = l.as_f64(0).unwrap_or(f64::NAN);
            let b = r.as_f64(0).unwrap_or(f64::NAN);
            (a - b).abs() < f64::EPSILON
        },
    }
}

/// Applies a binary operator with the language's numeric promotion rules:
/// strings only support `+` (concatenation) and `==`/`!=`; otherwise any
/// floating operand promotes both sides to `f64`, else any signed operand
/// promotes both to `i128`, else both are treated as `u128` (`spec` §4.4.4).
/// Division/modulo by zero and shifts of 128 or more bits are reported as
/// diagnostics rather than panicking.
pub fn binary_op(op: BinaryOp, l: Value, r: Value, line: u32) -> Result<Value, EvalError> {
    use BinaryOp::{
        Add, BitAnd, BitOr, BitXor, Div, Eq, Ge, Gt, Le, LogicalAnd, LogicalOr, LogicalXor, Lt, Mod, Mul, Ne, Shl,
        Shr, Sub,
    };

    if matches!(op, Eq | Ne) {
        let eq = values_equal(&l, &r);
        return Ok(Value::Boolean(if op == Eq { eq } else { !eq }));
    }
    if let (Value::String(a), Value::String(b)) = (&l, &r) {
        return match op {
            Add => Ok(Value::String(format!("{a}{b}"))),
            _ => Err(type_mismatch(line, "strings only support '+', '==' and '!='")),
        };
    }
    if matches!(op, LogicalAnd | LogicalOr | LogicalXor) {
        let a = l.truthy(line)?;
        let b = r.truthy(line)?;
        return Ok(Value::Boolean(match op {
            LogicalAnd => a && b,
            LogicalOr => a || b,
            _ => a ^ b,
        }));
    }
    if matches!(l, Value::Float(_)) || matches!(r, Value::Float(_)) {
        let a = l.as_f64(line)?;
        let b = r.as_f64(line)?;
        return Ok(match op {
            Add => Value::Float(a + b),
            Sub => Value::Float(a - b),
            Mul => Value::Float(a * b),
            Div if b == 0.0 => return Err(EvalError { line, kind: EvalErrorKind::DivisionByZero }),
            Div => Value::Float(a / b),
            Mod if b == 0.0 => return Err(EvalError { line, kind: EvalErrorKind::DivisionByZero }),
            Mod => Value::Float(a % b),
            Lt => Value::Boolean(a < b),
            Le => Value::Boolean(a <= b),
            Gt => Value::Boolean(a > b),
            Ge => Value::Boolean(a >= b),
            _ => return Err(type_mismatch(line, "bitwise operators don't apply to floating-point values")),
        });
    }
    if matches!(l, Value::Signed(_)) || matches!(r, Value::Signed(_)) {
        let a = l.as_i128(line)?;
        let b = r.as_i128(line)?;
        return Ok(match op {
            Add => Value::Signed(a.wrapping_add(b)),
            Sub => Value::Signed(a.wrapping_sub(b)),
            Mul => Value::Signed(a.wrapping_mul(b)),
            Div if b == 0 => return Err(EvalError { line, kind: EvalErrorKind::DivisionByZero }),
            Div => Value::Signed(a.wrapping_div(b)),
            Mod if b == 0 => return Err(EvalError { line, kind: EvalErrorKind::DivisionByZero }),
            Mod => Value::Signed(a.wrapping_rem(b)),
            Lt => Value::Boolean(a < b),
            Le => Value::Boolean(a <= b),
            Gt => Value::Boolean(a > b),
            Ge => Value::Boolean(a >= b),
            Shl | Shr => {
                if !(0..128).contains(&b) {
                    return Err(EvalError { line, kind: EvalErrorKind::ShiftOverflow(b as u32) });
                }
                if op == Shl { Value::Signed(a.wrapping_shl(b as u32)) } else { Value::Signed(a.wrapping_shr(b as u32)) }
            },
            BitAnd => Value::Signed(a & b),
            BitOr => Value::Signed(a | b),
            BitXor => Value::Signed(a ^ b),
            _ => unreachable!("Eq/Ne/logical handled above"),
        });
    }
    let a = l.as_u128(line)?;
    let b = r.as_u128(line)?;
    Ok(match op {
        Add => Value::Unsigned(a.wrapping_add(b)),
        Sub => Value::Unsigned(a.wrapping_sub(b)),
        Mul => Value::Unsigned(a.wrapping_mul(b)),
        Div if b == 0 => return Err(EvalError { line, kind: EvalErrorKind::DivisionByZero }),
        Div => Value::Unsigned(a / b),
        Mod if b == 0 => return Err(EvalError { line, kind: EvalErrorKind::DivisionByZero }),
        Mod => Value::Unsigned(a % b),
        Lt => Value::Boolean(a < b),
        Le => Value::Boolean(a <= b),
        Gt => Value::Boolean(a > b),
        Ge => Value::Boolean(a >= b),
        Shl | Shr => {
            if b >= 128 {
                return Err(EvalError { line, kind: EvalErrorKind::ShiftOverflow(b as u32) });
            }
            if op == Shl { Value::Unsigned(a << b) } else { Value::Unsigned(a >> b) }
        },
        BitAnd => Value::Unsigned(a & b),
        BitOr => Value::Unsigned(a | b),
        BitXor => Value::Unsigned(a ^ b),
        _ => unreachable!("Eq/Ne/logical handled above"),
    })
}

/// Casts `v` to `ty`, truncating/sign-extending integers to the target
/// width and reinterpreting otherwise (`spec` §4.4.4). Casting to a named
/// type isn't supported — a cast only ever targets a builtin value type in
/// this language.
pub fn cast(v: Value, ty: &TypeRef, line: u32) -> Result<Value, EvalError> {
    let TypeRefKind::Builtin(vt) = &ty.kind else {
        return Err(EvalError { line, kind: EvalErrorKind::Unsupported("cast to a named type".into()) });
    };
    let width_bits = u32::from(vt.size()) * 8;
    Ok(match vt.signedness() {
        Signedness::Unsigned => Value::Unsigned(mask_to_width(v.as_i128(line)? as u128, width_bits)),
        Signedness::Signed => Value::Signed(sign_extend_width(v.as_i128(line)? as u128, width_bits)),
        Signedness::FloatingPoint => Value::Float(v.as_f64(line)?),
        Signedness::NotNumeric => match vt {
            ValueType::Boolean => Value::Boolean(v.truthy(line)?),
            ValueType::Character => Value::Character(char::from_u32(v.as_i128(line)? as u32).unwrap_or('\0')),
            _ => return Err(EvalError { line, kind: EvalErrorKind::Unsupported(format!("cast to {vt:?}")) }),
        },
    })
}

fn mask_to_width(value: u128, width_bits: u32) -> u128 {
    if width_bits == 0 || width_bits >= 128 { value } else { value & ((1u128 << width_bits) - 1) }
}

fn sign_extend_width(value: u128, width_bits: u32) -> i128 {
    if width_bits == 0 || width_bits >= 128 {
        return value as i128;
    }
    let shift = 128 - width_bits;
    ((value << shift) as i128) >> shift
}

/// The [`ValueType`] a [`TypeRef`] names, for code that only cares about the
/// underlying scalar type (enum/bitfield backing types). Falls back to
/// `Unsigned32` for a named reference — the grammar never actually produces
/// one here, since `enum`/`bitfield` backing types are always builtin.
#[must_use]
pub fn value_type_of(ty: &TypeRef) -> ValueType {
    match &ty.kind {
        TypeRefKind::Builtin(vt) => *vt,
        TypeRefKind::Named { .. } => ValueType::Unsigned32,
    }
}

/// The display name a [`TypeRef`] resolves to.
#[must_use]
pub fn type_ref_name(ty: &TypeRef) -> String {
    match &ty.kind {
        TypeRefKind::Builtin(vt) => crate::builtin_type_name(*vt).to_string(),
        TypeRefKind::Named { path, .. } => path.join("::"),
    }
}

/// Mirrors an already-built [`Pattern`]'s decoded content as a [`Value`], so
/// a struct's earlier fields can be referenced by later ones (`this.count`)
/// and by sibling declarations. A `Pointer` mirrors its pointee rather than
/// its address, so `ptr.field` reads through it transparently, matching the
/// pointer step-through rule for name resolution.
#[must_use]
pub fn from_pattern(pattern: &Pattern) -> Value {
    match &pattern.kind {
        PatternKind::Unsigned(v) => Value::Unsigned(*v),
        PatternKind::Signed(v) => Value::Signed(*v),
        PatternKind::Float(v) => Value::Float(*v),
        PatternKind::Boolean(v) => Value::Boolean(*v),
        PatternKind::Character(c) | PatternKind::WideCharacter(c) => Value::Character(*c),
        PatternKind::String(s) | PatternKind::WideString(s) => Value::String(s.clone()),
        PatternKind::Padding => Value::Void,
        PatternKind::StaticArray { count, .. } => Value::Array(vec![Value::Void; *count as usize]),
        PatternKind::DynamicArray { children } => Value::Array(children.iter().map(from_pattern).collect()),
        PatternKind::Struct { children } | PatternKind::Union { children } | PatternKind::Bitfield { children } => {
            Value::Struct(children.iter().map(|c| (c.meta.display_name.clone(), from_pattern(c))).collect())
        },
        PatternKind::BitfieldField { value, .. } => Value::Unsigned(*value),
        PatternKind::Enum { value, .. } => Value::Signed(*value),
        PatternKind::Pointer { pointee, .. } => from_pattern(pointee),
    }
}
