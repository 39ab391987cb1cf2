//! hexpat — the full `preprocess -> lex -> parse -> evaluate` pipeline
//! behind one facade (`spec` §6.3).
//!
//! Each stage lives in its own crate (`hexpat-preprocessor`, `hexpat-lexer`,
//! `hexpat-parser`, `hexpat-eval`) so a host can drop in at any seam —
//! re-lexing cached text, caching a parsed [`Program`] across several
//! evaluations against different byte sources, and so on. This crate wires
//! the default path through all four and converts every stage's own error
//! type into the shared [`Diagnostic`] shape, so a caller that only wants
//! "did it work" never needs to match on which stage failed.
//!
//! ```
//! use hexpat::{evaluate, lex, parse, preprocess, EvalConfig, SliceSource, Defines};
//!
//! let mut defines = Defines::new();
//! let text = preprocess("u8 a @ 0x00;", &mut defines).unwrap().text;
//! let tokens = lex(&text).unwrap();
//! let program = parse(&tokens).unwrap();
//! let data = [7u8];
//! let source = SliceSource::new(&data, 0);
//! let outcome = evaluate(&program, &source, EvalConfig::default()).unwrap();
//! assert_eq!(outcome.patterns.len(), 1);
//! ```

#![deny(missing_docs)]

pub use hexpat_ast::{Node, Program};
pub use hexpat_core::{
    ByteSource, ByteSourceError, Diagnostic, Endianness, ErrorKind, ResolvedEndianness, Severity, SliceSource,
    SourceId, Span,
};
pub use hexpat_eval::{
    DangerousFunctionGate, DenyAll, EvalConfig, EvalHooks, EvalOutcome, LogLevel, LogMessage, Logger, NullLogger,
    Permission, Value,
};
pub use hexpat_lexer::{Token, TokenKind};
pub use hexpat_pattern::{Pattern, PatternKind, PatternMeta};
pub use hexpat_preprocessor::{Defines, IncludeResolver, NoIncludes, Pragma, PreprocessOutput};

/// Preprocesses `text` with no `#include` support (`hexpat_preprocessor::NoIncludes`),
/// reporting line numbers against a single synthetic source.
///
/// Use [`preprocess_with_includes`] for sources that `#include` other files.
///
/// # Errors
/// See [`hexpat_preprocessor::PreprocessErrorKind`].
pub fn preprocess(text: &str, defines: &mut Defines) -> Result<PreprocessOutput, Diagnostic> {
    preprocess_with_includes(text, SourceId(0), &NoIncludes, defines)
}

/// Preprocesses `text` read from `source`, resolving `#include` through `resolver`.
///
/// # Errors
/// See [`hexpat_preprocessor::PreprocessErrorKind`].
pub fn preprocess_with_includes(
    text: &str,
    source: SourceId,
    resolver: &dyn IncludeResolver,
    defines: &mut Defines,
) -> Result<PreprocessOutput, Diagnostic> {
    hexpat_preprocessor::preprocess(text, source, resolver, defines).map_err(Into::into)
}

/// Tokenizes `text`, reporting line numbers against a single synthetic source.
///
/// # Errors
/// See `hexpat_lexer::LexErrorKind`.
pub fn lex(text: &str) -> Result<Vec<Token>, Diagnostic> {
    lex_source(text, SourceId(0))
}

/// Tokenizes `text`, reporting line numbers against `source`.
///
/// # Errors
/// See `hexpat_lexer::LexErrorKind`.
pub fn lex_source(text: &str, source: SourceId) -> Result<Vec<Token>, Diagnostic> {
    hexpat_lexer::Lexer::new(text, source).tokenize().map_err(Into::into)
}

/// Parses `tokens` into a [`Program`], attributing errors to a single synthetic source.
///
/// # Errors
/// See `hexpat_parser::ParseErrorKind`.
pub fn parse(tokens: &[Token]) -> Result<Program, Diagnostic> {
    parse_source(tokens, SourceId(0))
}

/// Parses `tokens` into a [`Program`], attributing errors to `source`.
///
/// # Errors
/// See `hexpat_parser::ParseErrorKind`.
pub fn parse_source(tokens: &[Token], source: SourceId) -> Result<Program, Diagnostic> {
    hexpat_parser::parse(tokens, source).map_err(Into::into)
}

/// Walks `program` against `source` with default (no-op) host hooks.
///
/// # Errors
/// See `hexpat_eval::EvalErrorKind`.
pub fn evaluate(program: &Program, source: &dyn ByteSource, config: EvalConfig) -> Result<EvalOutcome, Diagnostic> {
    hexpat_eval::evaluate(program, source, config).map_err(Into::into)
}

/// Walks `program` against `source` with host hooks supplied explicitly
/// (logging, the dangerous-function gate, and a cancellation flag).
///
/// # Errors
/// See `hexpat_eval::EvalErrorKind`.
pub fn evaluate_with_hooks(
    program: &Program,
    source: &dyn ByteSource,
    config: EvalConfig,
    hooks: &EvalHooks<'_>,
) -> Result<EvalOutcome, Diagnostic> {
    hexpat_eval::evaluate_with_hooks(program, source, config, hooks).map_err(Into::into)
}

/// Runs the full pipeline over `text` with no `#include` support and default
/// host hooks: the one-call path for a host that just wants the pattern
/// forest for a self-contained source.
///
/// # Errors
/// Returns whichever stage's [`Diagnostic`] fires first.
pub fn run(text: &str, source: &dyn ByteSource, config: EvalConfig) -> Result<EvalOutcome, Diagnostic> {
    let mut defines = Defines::new();
    let pre = preprocess(text, &mut defines)?;
    let tokens = lex(&pre.text)?;
    let program = parse(&tokens)?;
    evaluate(&program, source, config)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn full_pipeline_round_trips_on_a_well_formed_source() {
        let data = [1u8, 2, 3];
        let source = SliceSource::new(&data, 0);
        let outcome = run("u8 a @ 0x00; u8 b @ 0x01;", &source, EvalConfig::default()).unwrap();
        assert_eq!(outcome.patterns.len(), 2);
    }

    #[test]
    fn preprocessor_error_surfaces_as_a_preprocess_diagnostic() {
        let mut defines = Defines::new();
        let err = preprocess("#include \"missing.hexpat\"\n", &mut defines).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Preprocess);
    }

    #[test]
    fn lexer_error_surfaces_as_a_lex_diagnostic() {
        let err = lex("u8 a = '';").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Lex);
    }

    #[test]
    fn parser_error_surfaces_as_a_parse_diagnostic() {
        let tokens = lex("u8 a").unwrap();
        let err = parse(&tokens).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Parse);
    }
}
