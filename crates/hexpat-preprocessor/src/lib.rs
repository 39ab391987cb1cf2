//! hexpat-preprocessor — the line-oriented text transform that runs before
//! lexing (`spec` §4.1).
//!
//! Recognises `#include "path"`, `#define NAME replacement`, and `#pragma key
//! value`; strips `//` and `/* */` comments (the latter with nested-comment
//! tolerance, newlines still counted); and emits a line map so later stages
//! can report errors against the user's original line numbers rather than
//! the expanded text.
//!
//! Only whole-token identifier replacement is supported for `#define` — no
//! function-like macros, matching the reference grammar.

#![deny(missing_docs)]

use indexmap::IndexMap;

use hexpat_core::{ErrorKind, SourceId};

const MAX_INCLUDE_DEPTH: usize = 64;
const MAX_MACRO_EXPANSION_DEPTH: usize = 32;

/// One `#pragma key value` directive, exposed to the evaluator unparsed
/// (`spec` §4.1: "opaque key/value pairs").
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Pragma {
    /// The pragma's key, e.g. `endian`.
    pub key: String,
    /// Everything after the key, verbatim.
    pub value: String,
}

/// Resolves `#include` targets to source text, supplied by the host (`spec`
/// §4.1: "resolves against a host-provided include search list").
pub trait IncludeResolver {
    /// Looks up `path` (as written between the quotes/angle-brackets) as seen
    /// from `from`.
    ///
    /// # Errors
    /// Returns a message describing why the include could not be resolved.
    fn resolve(&self, path: &str, from: SourceId) -> Result<(SourceId, String), String>;
}

/// An `IncludeResolver` that never finds anything, for sources known not to
/// use `#include`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoIncludes;

impl IncludeResolver for NoIncludes {
    fn resolve(&self, path: &str, _from: SourceId) -> Result<(SourceId, String), String> {
        Err(format!("includes are not supported by this host (wanted {path:?})"))
    }
}

/// What went wrong while preprocessing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PreprocessErrorKind {
    /// `#include` named a path the resolver could not find.
    #[error("cannot resolve include {0:?}: {1}")]
    UnresolvedInclude(String, String),
    /// An `#include` chain revisited a source it was already inside of.
    #[error("include cycle detected at {0:?}")]
    IncludeCycle(String),
    /// Include nesting went past [`MAX_INCLUDE_DEPTH`].
    #[error("include nesting too deep (limit {MAX_INCLUDE_DEPTH})")]
    IncludeTooDeep,
    /// A `#`-line didn't parse as a recognised directive.
    #[error("malformed preprocessor directive: {0:?}")]
    MalformedDirective(String),
    /// A `/* ... */` comment was never closed.
    #[error("unterminated block comment")]
    UnterminatedBlockComment,
    /// A chain of `#define`s that only ever expand into each other.
    #[error("macro {0:?} did not terminate after {MAX_MACRO_EXPANSION_DEPTH} expansions")]
    MacroRecursionLimit(String),
}

/// A preprocessor error with the original source line it occurred on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} (line {line})")]
pub struct PreprocessError {
    /// Line in the *original* source (not the expanded text).
    pub line: u32,
    /// What went wrong.
    pub kind: PreprocessErrorKind,
}

impl From<PreprocessError> for hexpat_core::Diagnostic {
    fn from(e: PreprocessError) -> Self {
        hexpat_core::Diagnostic::new(ErrorKind::Preprocess, e.line, e.kind.to_string())
    }
}

type PResult<T> = Result<T, PreprocessError>;

/// One output line together with the original `(source, line)` it came from,
/// so later diagnostics can point back at what the user actually wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineMapEntry {
    /// Source buffer this line was read from.
    pub source: SourceId,
    /// 1-based line number within that buffer.
    pub line: u32,
}

/// The result of preprocessing: expanded text, its line map, and any
/// `#pragma`s collected along the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreprocessOutput {
    /// The expanded text, ready for the lexer.
    pub text: String,
    /// `line_map[i]` is where output line `i` (0-based) came from.
    pub line_map: Vec<LineMapEntry>,
    /// Every `#pragma` seen, in source order.
    pub pragmas: Vec<Pragma>,
}

/// Name → replacement text for `#define`s, reusable across calls so a host
/// can seed command-line `-D` definitions (`spec` §6.3).
pub type Defines = IndexMap<String, String>;

/// Runs the full pipeline stage: strips comments, resolves `#include`,
/// collects `#define`/`#pragma`, then substitutes macro identifiers.
///
/// # Errors
/// See [`PreprocessErrorKind`].
pub fn preprocess(
    text: &str,
    source: SourceId,
    resolver: &dyn IncludeResolver,
    defines: &mut Defines,
) -> PResult<PreprocessOutput> {
    let mut pragmas = Vec::new();
    let mut lines = Vec::new();
    let mut line_map = Vec::new();
    let mut stack = vec![source];

    collect(text, source, resolver, defines, &mut pragmas, &mut lines, &mut line_map, &mut stack)?;

    let expanded: Vec<String> =
        lines.iter().zip(line_map.iter()).map(|(l, e)| substitute(l, defines, e.line)).collect::<PResult<_>>()?;

    Ok(PreprocessOutput { text: expanded.join("\n"), line_map, pragmas })
}

#[allow(clippy::too_many_arguments)]
fn collect(
    text: &str,
    source: SourceId,
    resolver: &dyn IncludeResolver,
    defines: &mut Defines,
    pragmas: &mut Vec<Pragma>,
    lines: &mut Vec<String>,
    line_map: &mut Vec<LineMapEntry>,
    stack: &mut Vec<SourceId>,
) -> PResult<()> {
    if stack.len() > MAX_INCLUDE_DEPTH {
        return Err(PreprocessError { line: 0, kind: PreprocessErrorKind::IncludeTooDeep });
    }

    let mut line_no = 0u32;
    let mut chars = StrippedLines::new(text);
    while let Some(raw) = chars.next_line()? {
        line_no += 1;
        let trimmed = raw.trim_start();
        if let Some(rest) = trimmed.strip_prefix('#') {
            handle_directive(rest.trim(), source, line_no, resolver, defines, pragmas, lines, line_map, stack)?;
        } else {
            lines.push(raw.to_string());
            line_map.push(LineMapEntry { source, line: line_no });
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn handle_directive(
    rest: &str,
    source: SourceId,
    line_no: u32,
    resolver: &dyn IncludeResolver,
    defines: &mut Defines,
    pragmas: &mut Vec<Pragma>,
    lines: &mut Vec<String>,
    line_map: &mut Vec<LineMapEntry>,
    stack: &mut Vec<SourceId>,
) -> PResult<()> {
    if let Some(arg) = rest.strip_prefix("include") {
        let path = parse_include_path(arg.trim()).ok_or_else(|| PreprocessError {
            line: line_no,
            kind: PreprocessErrorKind::MalformedDirective(rest.to_string()),
        })?;
        let (included_source, included_text) = resolver
            .resolve(&path, source)
            .map_err(|msg| PreprocessError { line: line_no, kind: PreprocessErrorKind::UnresolvedInclude(path.clone(), msg) })?;
        if stack.contains(&included_source) {
            return Err(PreprocessError { line: line_no, kind: PreprocessErrorKind::IncludeCycle(path) });
        }
        stack.push(included_source);
        collect(&included_text, included_source, resolver, defines, pragmas, lines, line_map, stack)?;
        stack.pop();
        return Ok(());
    }

    if let Some(arg) = rest.strip_prefix("define") {
        let arg = arg.trim();
        let (name, value) = match arg.split_once(char::is_whitespace) {
            Some((n, v)) => (n, v.trim()),
            None if !arg.is_empty() => (arg, ""),
            None => {
                return Err(PreprocessError {
                    line: line_no,
                    kind: PreprocessErrorKind::MalformedDirective(rest.to_string()),
                })
            },
        };
        if !is_ident(name) {
            return Err(PreprocessError {
                line: line_no,
                kind: PreprocessErrorKind::MalformedDirective(rest.to_string()),
            });
        }
        defines.insert(name.to_string(), value.to_string());
        return Ok(());
    }

    if let Some(arg) = rest.strip_prefix("pragma") {
        let arg = arg.trim();
        let (key, value) = arg.split_once(char::is_whitespace).unwrap_or((arg, ""));
        if key.is_empty() {
            return Err(PreprocessError {
                line: line_no,
                kind: PreprocessErrorKind::MalformedDirective(rest.to_string()),
            });
        }
        pragmas.push(Pragma { key: key.to_string(), value: value.trim().to_string() });
        return Ok(());
    }

    Err(PreprocessError { line: line_no, kind: PreprocessErrorKind::MalformedDirective(rest.to_string()) })
}

fn parse_include_path(s: &str) -> Option<String> {
    if let Some(inner) = s.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        return Some(inner.to_string());
    }
    if let Some(inner) = s.strip_prefix('<').and_then(|s| s.strip_suffix('>')) {
        return Some(inner.to_string());
    }
    None
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {},
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Substitutes `#define`d identifiers in `line`, skipping over string/char
/// literal contents so replacement text never corrupts quoted data.
fn substitute(line: &str, defines: &Defines, line_no: u32) -> PResult<String> {
    if defines.is_empty() {
        return Ok(line.to_string());
    }
    let mut out = String::with_capacity(line.len());
    let mut chars = line.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c == '"' || c == '\'' {
            let quote = c;
            out.push(c);
            for (_, c2) in chars.by_ref() {
                out.push(c2);
                if c2 == '\\' {
                    if let Some((_, escaped)) = chars.next() {
                        out.push(escaped);
                    }
                    continue;
                }
                if c2 == quote {
                    break;
                }
            }
            continue;
        }
        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            let mut end = i + c.len_utf8();
            while let Some(&(j, c2)) = chars.peek() {
                if c2.is_ascii_alphanumeric() || c2 == '_' {
                    end = j + c2.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            let word = &line[start..end];
            out.push_str(&expand(word, defines, line_no, 0)?);
            continue;
        }
        out.push(c);
    }
    Ok(out)
}

fn expand(word: &str, defines: &Defines, line_no: u32, depth: usize) -> PResult<String> {
    let Some(replacement) = defines.get(word) else {
        return Ok(word.to_string());
    };
    if depth >= MAX_MACRO_EXPANSION_DEPTH {
        return Err(PreprocessError {
            line: line_no,
            kind: PreprocessErrorKind::MacroRecursionLimit(word.to_string()),
        });
    }
    substitute_at_depth(replacement, defines, line_no, depth + 1)
}

fn substitute_at_depth(line: &str, defines: &Defines, line_no: u32, depth: usize) -> PResult<String> {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            let mut end = i + c.len_utf8();
            while let Some(&(j, c2)) = chars.peek() {
                if c2.is_ascii_alphanumeric() || c2 == '_' {
                    end = j + c2.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            let word = &line[start..end];
            out.push_str(&expand(word, defines, line_no, depth)?);
            continue;
        }
        out.push(c);
    }
    Ok(out)
}

/// Splits text into logical lines with `//` and `/* */` comments already
/// stripped. A block comment's open/close state persists across calls, so a
/// comment spanning several physical lines still yields one `next_line()`
/// call per line (each contributing whatever non-comment text it has), which
/// keeps line numbers accurate without ever mixing newlines into a single
/// returned line (`spec` §4.1).
struct StrippedLines<'a> {
    src: &'a str,
    off: usize,
    block_depth: usize,
}

impl<'a> StrippedLines<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, off: 0, block_depth: 0 }
    }

    fn next_line(&mut self) -> PResult<Option<String>> {
        if self.off >= self.src.len() {
            return Ok(None);
        }
        let mut out = String::new();
        loop {
            if self.off >= self.src.len() {
                if self.block_depth > 0 {
                    return Err(PreprocessError { line: 0, kind: PreprocessErrorKind::UnterminatedBlockComment });
                }
                break;
            }
            let rest = &self.src[self.off..];

            if self.block_depth > 0 {
                if rest.starts_with("/*") {
                    self.block_depth += 1;
                    self.off += 2;
                    continue;
                }
                if rest.starts_with("*/") {
                    self.block_depth -= 1;
                    self.off += 2;
                    continue;
                }
                let c = rest.chars().next().unwrap();
                self.off += c.len_utf8();
                if c == '\n' {
                    break;
                }
                continue;
            }

            if rest.starts_with("//") {
                match rest.find('\n') {
                    Some(p) => self.off += p,
                    None => {
                        self.off = self.src.len();
                        break;
                    },
                }
                continue;
            }
            if rest.starts_with("/*") {
                self.block_depth = 1;
                self.off += 2;
                continue;
            }

            let c = rest.chars().next().unwrap();
            self.off += c.len_utf8();
            if c == '\n' {
                break;
            }
            out.push(c);
        }
        Ok(Some(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(text: &str) -> PreprocessOutput {
        let mut defines = Defines::new();
        preprocess(text, SourceId(0), &NoIncludes, &mut defines).unwrap()
    }

    #[test]
    fn strips_line_and_block_comments() {
        let out = run("u8 a; // trailing\nu8 b; /* inline */ u8 c;");
        assert_eq!(out.text, "u8 a; \nu8 b;  u8 c;");
    }

    #[test]
    fn block_comment_preserves_line_count() {
        let out = run("u8 a;\n/* line2\nline3 */\nu8 d;");
        assert_eq!(out.text.lines().count(), 4);
        assert_eq!(out.line_map.last().unwrap().line, 4);
    }

    #[test]
    fn define_substitutes_whole_identifiers_only() {
        let out = run("#define SIZE 16\nu8 buf[SIZE];\nu8 SIZE2;");
        assert_eq!(out.text, "\nu8 buf[16];\nu8 SIZE2;");
    }

    #[test]
    fn define_does_not_touch_string_contents() {
        let out = run("#define NAME inner\nchar s[] @ \"NAME\";");
        assert_eq!(out.text, "\nchar s[] @ \"NAME\";");
    }

    #[test]
    fn pragma_is_collected_and_removed() {
        let out = run("#pragma endian big\nu8 a;");
        assert_eq!(out.pragmas, vec![Pragma { key: "endian".to_string(), value: "big".to_string() }]);
        assert_eq!(out.text, "\nu8 a;");
    }

    #[test]
    fn unresolved_include_reports_original_line() {
        let mut defines = Defines::new();
        let err = preprocess("u8 a;\n#include \"missing.hexpat\"\n", SourceId(0), &NoIncludes, &mut defines).unwrap_err();
        assert_eq!(err.line, 2);
        assert!(matches!(err.kind, PreprocessErrorKind::UnresolvedInclude(..)));
    }

    struct OneShotInclude;
    impl IncludeResolver for OneShotInclude {
        fn resolve(&self, path: &str, _from: SourceId) -> Result<(SourceId, String), String> {
            if path == "a.hexpat" {
                Ok((SourceId(1), "#include \"a.hexpat\"\n".to_string()))
            } else {
                Err("not found".to_string())
            }
        }
    }

    #[test]
    fn include_cycle_is_rejected() {
        let mut defines = Defines::new();
        let err =
            preprocess("#include \"a.hexpat\"\n", SourceId(0), &OneShotInclude, &mut defines).unwrap_err();
        assert!(matches!(err.kind, PreprocessErrorKind::IncludeCycle(_)));
    }
}
