//! hexpat-core — primitives shared by every stage of the hexpat pipeline.
//!
//! Highlights:
//! - `SourceId` / `Pos` / `Span` / `Spanned<T>` for tracking source locations
//!   from preprocessing through evaluation.
//! - `Endianness` — the three-way default used by variable declarations and
//!   the evaluator's byte reads.
//! - `Diagnostic` / `Severity` / `ErrorKind` — the uniform error shape every
//!   stage's own error type converts into (see `spec` §6.5).
//! - `ByteSource` — the trait the evaluator reads through; the core never
//!   assumes a concrete storage backing (file, memory buffer, process).
//!
//! # Features
//! - `std` (default): enables `std::error::Error` impls via `thiserror`.
//! - `serde`: derives `Serialize`/`Deserialize` on the location and
//!   diagnostic types.

#![deny(missing_docs)]
#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

use core::fmt;

#[cfg(feature = "std")]
use std::string::String;

#[cfg(not(feature = "std"))]
use alloc::string::String;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/* ─────────────────────────── Source locations ─────────────────────────── */

/// Identifies a source buffer (the main program, or an `#include`d file).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SourceId(pub u32);

/// A 1-based line number in a `SourceId`'s text. `0` means "no source locus"
/// (see `spec` §7: errors without a line carry `0`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Pos(pub u32);

impl Pos {
    /// No known location.
    pub const NONE: Self = Pos(0);

    /// True if this position carries no source locus.
    #[must_use]
    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

/// A line span `[start, end]` within a single `SourceId`, used to point
/// diagnostics at the range of source text a token/declaration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Span {
    /// Which source buffer this span is in.
    pub source: SourceId,
    /// First line, inclusive.
    pub start: Pos,
    /// Last line, inclusive.
    pub end: Pos,
}

impl Span {
    /// Builds a span covering a single line.
    #[must_use]
    pub const fn single(source: SourceId, line: Pos) -> Self {
        Self { source, start: line, end: line }
    }

    /// Builds a span covering `[start, end]`.
    #[must_use]
    pub const fn new(source: SourceId, start: Pos, end: Pos) -> Self {
        Self { source, start, end }
    }

    /// The span used for synthetic/unknown locations.
    #[must_use]
    pub const fn none() -> Self {
        Self { source: SourceId(0), start: Pos::NONE, end: Pos::NONE }
    }

    /// Joins two spans from the same source into the range that covers both.
    #[must_use]
    pub fn join(self, other: Span) -> Span {
        let start = if self.start.0 == 0 {
            other.start
        } else if other.start.0 == 0 {
            self.start
        } else {
            Pos(self.start.0.min(other.start.0))
        };
        let end = Pos(self.end.0.max(other.end.0));
        Span { source: self.source, start, end }
    }
}

/// Wraps a value together with the span it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Spanned<T> {
    /// The wrapped value.
    pub value: T,
    /// Its location.
    pub span: Span,
}

impl<T> Spanned<T> {
    /// Builds a spanned value.
    pub const fn new(value: T, span: Span) -> Self {
        Self { value, span }
    }

    /// Maps the inner value, keeping the span.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Spanned<U> {
        Spanned { value: f(self.value), span: self.span }
    }
}

/* ─────────────────────────── Endianness ─────────────────────────── */

/// The endianness a read is performed with. `Native` defers to the host's
/// byte order; patterns with no explicit `le`/`be` keyword inherit the
/// evaluator's configured default rather than `Native` directly (`spec` §3.4:
/// "endianness (inherited if unset)").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Endianness {
    /// Least-significant byte first.
    Little,
    /// Most-significant byte first.
    Big,
    /// The host's native byte order.
    Native,
}

impl Endianness {
    /// Resolves `Native` to the byte order of the machine running this code.
    #[must_use]
    pub const fn resolved(self) -> ResolvedEndianness {
        match self {
            Endianness::Little => ResolvedEndianness::Little,
            Endianness::Big => ResolvedEndianness::Big,
            Endianness::Native => {
                if cfg!(target_endian = "big") {
                    ResolvedEndianness::Big
                } else {
                    ResolvedEndianness::Little
                }
            },
        }
    }
}

impl Default for Endianness {
    fn default() -> Self {
        Endianness::Native
    }
}

/// `Endianness` after resolving away `Native`, used by the actual byte-swap
/// logic so it only ever has two cases to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolvedEndianness {
    /// Least-significant byte first.
    Little,
    /// Most-significant byte first.
    Big,
}

impl ResolvedEndianness {
    /// Reorders `bytes` in place if this endianness differs from native.
    pub fn fixup(self, bytes: &mut [u8]) {
        let native_is_big = cfg!(target_endian = "big");
        let want_big = matches!(self, ResolvedEndianness::Big);
        if native_is_big != want_big {
            bytes.reverse();
        }
    }
}

/* ─────────────────────────── Diagnostics ─────────────────────────── */

/// Severity of a `Diagnostic` (`spec` §7: user-level assertions are
/// recoverable, everything else aborts the run).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Severity {
    /// Informational, never aborts a run.
    Info,
    /// Recoverable: logged, evaluation continues.
    Warning,
    /// Fatal for the run.
    Error,
}

/// Coarse category of an error, shared by every pipeline stage (`spec` §6.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ErrorKind {
    /// Failed while resolving `#include`/`#define`/`#pragma`.
    Preprocess,
    /// Failed while tokenizing.
    Lex,
    /// Failed while building the AST.
    Parse,
    /// A named type or function could not be resolved.
    TypeResolution,
    /// Failed while walking the AST against the byte source.
    Evaluation,
    /// A configured resource cap was exceeded.
    LimitExceeded,
    /// The host's abort flag was observed.
    Aborted,
    /// The byte source reported a read failure.
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Preprocess => "preprocess",
            ErrorKind::Lex => "lex",
            ErrorKind::Parse => "parse",
            ErrorKind::TypeResolution => "type resolution",
            ErrorKind::Evaluation => "evaluation",
            ErrorKind::LimitExceeded => "limit exceeded",
            ErrorKind::Aborted => "aborted",
            ErrorKind::Io => "io",
        };
        f.write_str(s)
    }
}

/// A structured error, uniform across every stage (`spec` §6.5):
/// `{ kind, line, message, optional_hint }`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Diagnostic {
    /// The stage/category that raised this error.
    pub kind: ErrorKind,
    /// Source line, or `0` if this error has no locus.
    pub line: u32,
    /// Human-readable message.
    pub message: String,
    /// Optional one-line suggestion for fixing the problem.
    pub hint: Option<String>,
}

impl Diagnostic {
    /// Builds a diagnostic with no hint.
    pub fn new(kind: ErrorKind, line: u32, message: impl Into<String>) -> Self {
        Self { kind, line, message: message.into(), hint: None }
    }

    /// Attaches a hint.
    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line == 0 {
            write!(f, "[{}] {}", self.kind, self.message)?;
        } else {
            write!(f, "[{}] line {}: {}", self.kind, self.line, self.message)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " (hint: {hint})")?;
        }
        Ok(())
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Diagnostic {}

/* ─────────────────────────── Byte source ─────────────────────────── */

/// Errors a `ByteSource` can report from a failed read (`spec` §6.1).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(thiserror::Error))]
pub enum ByteSourceError {
    /// The requested range lies outside `[base_address, base_address + actual_size)`.
    #[cfg_attr(
        feature = "std",
        error("out-of-range read: offset {offset} len {len} (source size {size})")
    )]
    OutOfRange {
        /// Offset requested.
        offset: u64,
        /// Number of bytes requested.
        len: u64,
        /// Size of the source.
        size: u64,
    },
    /// The source is not currently readable (`is_readable()` returned false).
    #[cfg_attr(feature = "std", error("byte source is not readable"))]
    NotReadable,
}

/// Random-access read-only view over a linear address space (`spec` §6.1,
/// component C1). Implemented by the host; the core never writes through it.
pub trait ByteSource {
    /// First valid address, e.g. the load base of a mapped binary.
    fn base_address(&self) -> u64;

    /// Number of valid bytes starting at `base_address()`.
    fn actual_size(&self) -> u64;

    /// Fills `buf` from `offset` (absolute, i.e. including `base_address()`).
    ///
    /// # Errors
    /// Returns `ByteSourceError::OutOfRange` if `[offset, offset + buf.len())`
    /// is not fully contained in the source, or `NotReadable` if the source
    /// has been invalidated.
    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<(), ByteSourceError>;

    /// Whether the source currently accepts reads at all.
    fn is_readable(&self) -> bool {
        true
    }

    /// True if `[offset, offset + len)` lies fully within the valid region.
    fn contains_range(&self, offset: u64, len: u64) -> bool {
        let base = self.base_address();
        let size = self.actual_size();
        offset >= base
            && len <= size
            && offset.saturating_sub(base) <= size - len
    }
}

/// An in-memory `ByteSource`, used by tests and by any host that has already
/// loaded the target bytes into memory.
#[derive(Debug, Clone)]
pub struct SliceSource<'a> {
    base: u64,
    data: &'a [u8],
}

impl<'a> SliceSource<'a> {
    /// Wraps `data`, addressed starting at `base`.
    #[must_use]
    pub fn new(data: &'a [u8], base: u64) -> Self {
        Self { base, data }
    }
}

impl ByteSource for SliceSource<'_> {
    fn base_address(&self) -> u64 {
        self.base
    }

    fn actual_size(&self) -> u64 {
        self.data.len() as u64
    }

    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<(), ByteSourceError> {
        if !self.contains_range(offset, buf.len() as u64) {
            return Err(ByteSourceError::OutOfRange {
                offset,
                len: buf.len() as u64,
                size: self.actual_size(),
            });
        }
        let start = (offset - self.base) as usize;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
        Ok(())
    }
}

/// Convenience re-exports for a quick `use hexpat_core::prelude::*;`.
pub mod prelude {
    pub use super::{
        ByteSource, ByteSourceError, Diagnostic, Endianness, ErrorKind, Pos, ResolvedEndianness,
        Severity, SliceSource, Span, Spanned, SourceId,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_join_widens_range() {
        let a = Span::new(SourceId(0), Pos(2), Pos(2));
        let b = Span::new(SourceId(0), Pos(5), Pos(5));
        let joined = a.join(b);
        assert_eq!(joined.start, Pos(2));
        assert_eq!(joined.end, Pos(5));
    }

    #[test]
    fn slice_source_rejects_out_of_range() {
        let data = [1u8, 2, 3, 4];
        let src = SliceSource::new(&data, 0x1000);
        let mut buf = [0u8; 2];
        assert!(src.read(0x1000, &mut buf).is_ok());
        assert_eq!(buf, [1, 2]);
        assert!(src.read(0x1003, &mut [0u8; 4]).is_err());
        assert!(src.read(0x0FFF, &mut [0u8; 1]).is_err());
    }

    #[test]
    fn resolved_endianness_swaps_on_mismatch() {
        let mut bytes = [1u8, 2, 3, 4];
        ResolvedEndianness::Big.fixup(&mut bytes);
        if cfg!(target_endian = "little") {
            assert_eq!(bytes, [4, 3, 2, 1]);
        } else {
            assert_eq!(bytes, [1, 2, 3, 4]);
        }
    }

    #[test]
    fn diagnostic_display_without_line() {
        let d = Diagnostic::new(ErrorKind::Aborted, 0, "cancelled");
        assert_eq!(d.to_string(), "[aborted] cancelled");
    }
}
