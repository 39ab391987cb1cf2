//! hexpat-cli — the command-line host for the `hexpat` pipeline.
//!
//! Bridges the core crates' trait-object seams to real I/O: a memory-mapped
//! file as the [`hexpat_core::ByteSource`], a filesystem-backed
//! `#include` resolver, a `log`-backed [`hexpat_eval::Logger`], and a
//! stdin-prompting dangerous-function gate. None of that lives in the core
//! crates themselves, so a GUI host can supply its own versions of all four
//! without dragging this crate's dependencies along.
//!
//! `main.rs` owns argument parsing; this module owns everything that
//! actually touches the filesystem and the pipeline.

#![deny(missing_docs)]

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use hexpat::{
    evaluate_with_hooks, lex, parse, preprocess_with_includes, ByteSource, ByteSourceError, DangerousFunctionGate,
    Defines, DenyAll, EvalConfig, EvalHooks, EvalOutcome, IncludeResolver, LogLevel, LogMessage, Logger, Permission,
    SourceId,
};
use memmap2::Mmap;

/// Everything a run needs, already resolved from argv into plain data
/// (`main.rs`'s job; this crate never parses args itself).
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Path to the `.hexpat` pattern source.
    pub pattern: PathBuf,
    /// Path to the binary data to evaluate the pattern against.
    pub data: PathBuf,
    /// Additional directories searched for `#include "..."` targets, in order.
    pub include_dirs: Vec<PathBuf>,
    /// `NAME=VALUE` pairs seeded as `#define`s before preprocessing.
    pub defines: Vec<(String, String)>,
    /// Evaluator resource caps and default endianness.
    pub config: EvalConfig,
    /// Whether to prompt on stdin for `Permission::Ask` built-ins, instead
    /// of denying them outright.
    pub interactive_dangerous_gate: bool,
}

/// Initializes `env_logger` from `RUST_LOG`, defaulting to `info`.
pub fn init_logger() {
    #[cfg(feature = "trace")]
    {
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init();
    }
}

/// Maps `path` read-only for the duration of the process.
///
/// # Errors
/// Returns an error if the file can't be opened or mapped.
pub fn map_file(path: &Path) -> Result<Mmap> {
    let file = fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    // SAFETY: the mapping is read-only and the file isn't expected to be
    // truncated by another process during the run; a racing truncation
    // would surface as a SIGBUS, not memory corruption we could otherwise
    // guard against from user space.
    #[allow(unsafe_code)]
    let mmap = unsafe { Mmap::map(&file) }.with_context(|| format!("mapping {}", path.display()))?;
    Ok(mmap)
}

/// A [`ByteSource`] over a memory-mapped file, addressed from zero.
pub struct MmapSource(Mmap);

impl MmapSource {
    /// Wraps an already-mapped file.
    #[must_use]
    pub fn new(mmap: Mmap) -> Self {
        Self(mmap)
    }
}

impl ByteSource for MmapSource {
    fn base_address(&self) -> u64 {
        0
    }

    fn actual_size(&self) -> u64 {
        self.0.len() as u64
    }

    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<(), ByteSourceError> {
        if !self.contains_range(offset, buf.len() as u64) {
            return Err(ByteSourceError::OutOfRange { offset, len: buf.len() as u64, size: self.actual_size() });
        }
        let start = offset as usize;
        buf.copy_from_slice(&self.0[start..start + buf.len()]);
        Ok(())
    }
}

/// Resolves `#include "path"` against a list of search directories, the
/// first directory containing a readable file at that relative path wins.
pub struct FsIncludeResolver {
    search_dirs: Vec<PathBuf>,
    next_source: std::cell::Cell<u32>,
}

impl FsIncludeResolver {
    /// Builds a resolver searching `search_dirs` in order.
    #[must_use]
    pub fn new(search_dirs: Vec<PathBuf>) -> Self {
        Self { search_dirs, next_source: std::cell::Cell::new(1) }
    }
}

impl IncludeResolver for FsIncludeResolver {
    fn resolve(&self, path: &str, _from: SourceId) -> Result<(SourceId, String), String> {
        for dir in &self.search_dirs {
            let candidate = dir.join(path);
            if let Ok(text) = fs::read_to_string(&candidate) {
                let id = self.next_source.get();
                self.next_source.set(id + 1);
                return Ok((SourceId(id), text));
            }
        }
        Err(format!("not found in any of {} search director(y/ies)", self.search_dirs.len()))
    }
}

/// Bridges [`LogMessage`]s to the `log` facade, so the evaluator never
/// links a logging backend itself (`spec` "ambient stack").
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvLogBridge;

impl Logger for EnvLogBridge {
    fn log(&self, message: &LogMessage) {
        #[cfg(feature = "trace")]
        match message.level {
            LogLevel::Info => log::info!("{}", message.message),
            LogLevel::Warn => log::warn!("{}", message.message),
        }
        #[cfg(not(feature = "trace"))]
        {
            let _ = message;
        }
    }
}

/// Resolves `Permission::Ask` by printing the function name to stderr and
/// reading a `y`/`n` line from stdin. Anything but `y` denies.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinGate;

impl DangerousFunctionGate for StdinGate {
    fn allow(&self, function_name: &str) -> bool {
        eprint!("hexpat: allow dangerous function `{function_name}`? [y/N] ");
        let _ = io::stderr().flush();
        let mut line = String::new();
        if io::stdin().read_line(&mut line).is_err() {
            return false;
        }
        matches!(line.trim(), "y" | "Y" | "yes")
    }
}

/// Runs the full pipeline described by `opts` and returns the outcome.
///
/// # Errors
/// Returns an error if the files can't be read/mapped, or if any pipeline
/// stage reports a [`hexpat::Diagnostic`].
pub fn run(opts: &RunOptions) -> Result<EvalOutcome> {
    let text = fs::read_to_string(&opts.pattern).with_context(|| format!("reading {}", opts.pattern.display()))?;

    let mut defines = Defines::new();
    for (name, value) in &opts.defines {
        defines.insert(name.clone(), value.clone());
    }

    let mut search_dirs = opts.include_dirs.clone();
    if let Some(parent) = opts.pattern.parent() {
        search_dirs.push(parent.to_path_buf());
    }
    let resolver = FsIncludeResolver::new(search_dirs);
    let pre = preprocess_with_includes(&text, SourceId(0), &resolver, &mut defines)
        .map_err(|d| anyhow::anyhow!("{d}"))?;

    let tokens = lex(&pre.text).map_err(|d| anyhow::anyhow!("{d}"))?;
    let program = parse(&tokens).map_err(|d| anyhow::anyhow!("{d}"))?;

    let mmap = map_file(&opts.data)?;
    let source = MmapSource::new(mmap);

    let logger = EnvLogBridge;
    let gate = StdinGate;
    let deny = DenyAll;
    let dangerous_gate: &dyn DangerousFunctionGate = if opts.interactive_dangerous_gate { &gate } else { &deny };
    let hooks = EvalHooks { logger: &logger, dangerous_gate, abort: &|| false };

    evaluate_with_hooks(&program, &source, opts.config.clone(), &hooks).map_err(|d| anyhow::anyhow!("{d}"))
}

/// Parses a single `NAME=VALUE` CLI argument into a `(name, value)` pair.
///
/// # Errors
/// Returns an error if `s` has no `=`.
pub fn parse_define(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) => Ok((name.to_string(), value.to_string())),
        None => Err(format!("expected NAME=VALUE, got {s:?}")),
    }
}

/// Parses `--endian` into an [`hexpat::Endianness`].
///
/// # Errors
/// Returns an error for any value other than `little`, `big`, or `native`.
pub fn parse_endian(s: &str) -> Result<hexpat::Endianness, String> {
    match s {
        "little" => Ok(hexpat::Endianness::Little),
        "big" => Ok(hexpat::Endianness::Big),
        "native" => Ok(hexpat::Endianness::Native),
        other => Err(format!("expected little|big|native, got {other:?}")),
    }
}

/// Parses `--dangerous` into a [`Permission`].
///
/// # Errors
/// Returns an error for any value other than `allow`, `deny`, or `ask`.
pub fn parse_dangerous(s: &str) -> Result<Permission, String> {
    match s {
        "allow" => Ok(Permission::Allow),
        "deny" => Ok(Permission::Deny),
        "ask" => Ok(Permission::Ask),
        other => Err(format!("expected allow|deny|ask, got {other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parse_define_splits_on_first_equals() {
        assert_eq!(parse_define("SIZE=16").unwrap(), ("SIZE".to_string(), "16".to_string()));
        assert!(parse_define("SIZE").is_err());
    }

    #[test]
    fn fs_include_resolver_reads_from_the_first_matching_directory() {
        let dir = tempfile::tempdir().unwrap();
        let included = dir.path().join("shared.hexpat");
        fs::File::create(&included).unwrap().write_all(b"u8 a;").unwrap();

        let resolver = FsIncludeResolver::new(vec![dir.path().to_path_buf()]);
        let (_id, text) = resolver.resolve("shared.hexpat", SourceId(0)).unwrap();
        assert_eq!(text, "u8 a;");
        assert!(resolver.resolve("missing.hexpat", SourceId(0)).is_err());
    }

    #[test]
    fn run_maps_the_data_file_and_evaluates_the_pattern() {
        let dir = tempfile::tempdir().unwrap();
        let pattern_path = dir.path().join("p.hexpat");
        fs::File::create(&pattern_path).unwrap().write_all(b"u8 a @ 0x00;").unwrap();
        let data_path = dir.path().join("d.bin");
        fs::File::create(&data_path).unwrap().write_all(&[7u8]).unwrap();

        let opts = RunOptions {
            pattern: pattern_path,
            data: data_path,
            include_dirs: Vec::new(),
            defines: Vec::new(),
            config: EvalConfig::default(),
            interactive_dangerous_gate: false,
        };
        let outcome = run(&opts).unwrap();
        assert_eq!(outcome.patterns.len(), 1);
    }
}
