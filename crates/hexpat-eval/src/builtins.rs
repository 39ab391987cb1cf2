//! A representative slice of the standard built-in function catalogue
//! (`spec` §4.4.5): byte reads, sequence search, alignment arithmetic,
//! base-N encoding, a checksum, logging/assertions, and one function gated
//! by the dangerous-function policy. The registry is a plain match on name,
//! so adding another built-in is a single new arm — section-backed
//! decompression/decoding built-ins are the one documented gap, left for a
//! host that actually needs them.

use crate::{EvalError, EvalErrorKind, Evaluator, LogLevel, LogMessage, Permission, Value};

/// Looks `name` up in the built-in table and runs it, or returns `Ok(None)`
/// so the caller falls back to user-defined functions.
pub(crate) fn call(eval: &mut Evaluator<'_>, name: &str, args: &[Value], line: u32) -> Result<Option<Value>, EvalError> {
    match name {
        "print" => {
            do_print(eval, args);
            Ok(Some(Value::Void))
        },
        "assert" => {
            do_assert(eval, args, line)?;
            Ok(Some(Value::Void))
        },
        "read_unsigned" => Ok(Some(do_read_unsigned(eval, args, line)?)),
        "find_sequence" => Ok(Some(do_find_sequence(eval, args, line)?)),
        "align_up" => Ok(Some(do_align_up(args, line)?)),
        "to_base" => Ok(Some(do_to_base(args, line)?)),
        "crc32" => Ok(Some(do_crc32(eval, args, line)?)),
        "abort_run" => {
            check_dangerous(eval, "abort_run", line)?;
            Err(eval.err(line, EvalErrorKind::Aborted))
        },
        _ => Ok(None),
    }
}

fn check_dangerous(eval: &Evaluator<'_>, name: &str, line: u32) -> Result<(), EvalError> {
    let allowed = match eval.config.dangerous_functions {
        Permission::Allow => true,
        Permission::Deny => false,
        Permission::Ask => eval.hooks.dangerous_gate.allow(name),
    };
    if allowed { Ok(()) } else { Err(eval.err(line, EvalErrorKind::DangerousFunctionDenied(name.to_string()))) }
}

fn do_print(eval: &mut Evaluator<'_>, args: &[Value]) {
    let message = args.iter().map(Value::to_display_string).collect::<Vec<_>>().join(" ");
    let entry = LogMessage { level: LogLevel::Info, message };
    eval.hooks.logger.log(&entry);
    eval.log.push(entry);
}

fn do_assert(eval: &mut Evaluator<'_>, args: &[Value], line: u32) -> Result<(), EvalError> {
    let cond = args.first().ok_or_else(|| eval.err(line, EvalErrorKind::Unsupported("assert needs a condition".into())))?;
    if cond.truthy(line)? {
        return Ok(());
    }
    let message = args.get(1).map(Value::to_display_string).unwrap_or_else(|| "assertion failed".to_string());
    let entry = LogMessage { level: LogLevel::Warn, message };
    eval.hooks.logger.log(&entry);
    eval.log.push(entry);
    Ok(())
}

fn do_read_unsigned(eval: &Evaluator<'_>, args: &[Value], line: u32) -> Result<Value, EvalError> {
    let offset = arg(args, 0, line)?.as_u64(line)?;
    let size = arg(args, 1, line)?.as_u64(line)? as usize;
    if size > 16 {
        return Err(eval.err(line, EvalErrorKind::Unsupported("read_unsigned supports up to 16 bytes".into())));
    }
    let v = eval.read_unsigned(offset, size, eval.config.default_endian, line)?;
    Ok(Value::Unsigned(v))
}

fn do_find_sequence(eval: &Evaluator<'_>, args: &[Value], line: u32) -> Result<Value, EvalError> {
    let start = arg(args, 0, line)?.as_u64(line)?;
    let Value::String(needle) = arg(args, 1, line)? else {
        return Err(eval.err(line, EvalErrorKind::TypeMismatch("find_sequence's second argument must be a string".into())));
    };
    let needle = needle.as_bytes();
    if needle.is_empty() {
        return Ok(Value::Signed(-1));
    }
    let end = eval.source.base_address() + eval.source.actual_size();
    let mut cursor = start;
    let mut window = vec![0u8; needle.len()];
    while cursor + needle.len() as u64 <= end {
        if eval.source.read(cursor, &mut window).is_ok() && window == needle {
            return Ok(Value::Signed(i128::from(cursor)));
        }
        cursor += 1;
    }
    Ok(Value::Signed(-1))
}

fn do_align_up(args: &[Value], line: u32) -> Result<Value, EvalError> {
    let value = arg(args, 0, line)?.as_u64(line)?;
    let align = arg(args, 1, line)?.as_u64(line)?;
    if align == 0 {
        return Err(EvalError { line, kind: EvalErrorKind::DivisionByZero });
    }
    let aligned = value.div_ceil(align) * align;
    Ok(Value::Unsigned(u128::from(aligned)))
}

fn do_to_base(args: &[Value], line: u32) -> Result<Value, EvalError> {
    let mut value = arg(args, 0, line)?.as_i128(line)?;
    let base = arg(args, 1, line)?.as_u64(line)?;
    if !(2..=36).contains(&base) {
        return Err(EvalError { line, kind: EvalErrorKind::Unsupported("to_base supports radix 2..=36".into()) });
    }
    let negative = value < 0;
    if negative {
        value = -value;
    }
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut digits = Vec::new();
    if value == 0 {
        digits.push(b'0');
    }
    let base = base as i128;
    while value > 0 {
        digits.push(DIGITS[(value % base) as usize]);
        value /= base;
    }
    if negative {
        digits.push(b'-');
    }
    digits.reverse();
    Ok(Value::String(String::from_utf8(digits).expect("digit alphabet is ASCII")))
}

fn do_crc32(eval: &Evaluator<'_>, args: &[Value], line: u32) -> Result<Value, EvalError> {
    let offset = arg(args, 0, line)?.as_u64(line)?;
    let len = arg(args, 1, line)?.as_u64(line)? as usize;
    let mut buf = vec![0u8; len];
    eval.read_bytes(offset, &mut buf, line)?;
    Ok(Value::Unsigned(u128::from(crc32fast::hash(&buf))))
}

fn arg<'a>(args: &'a [Value], index: usize, line: u32) -> Result<&'a Value, EvalError> {
    args.get(index)
        .ok_or_else(|| EvalError { line, kind: EvalErrorKind::Unsupported(format!("missing argument {index}")) })
}
