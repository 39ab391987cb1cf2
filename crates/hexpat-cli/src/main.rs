//! `hexpat-cli` — parses arguments, wires up logging, and delegates to
//! `hexpat_cli` (lib) for everything that actually touches the filesystem.

use std::{path::PathBuf, process::ExitCode};

use anyhow::Result;
use clap::Parser;
use hexpat::{EvalConfig, Permission};
use hexpat_cli::{init_logger, parse_dangerous, parse_define, parse_endian, run, RunOptions};

/// Evaluates a hexpat pattern against a binary file and prints the
/// resulting pattern tree.
#[derive(Debug, Parser)]
#[command(name = "hexpat-cli", version, about, long_about = None)]
struct Opt {
    /// Pattern source (`.hexpat`).
    pattern: PathBuf,

    /// Binary data to evaluate the pattern against.
    data: PathBuf,

    /// Additional `#include` search directory; may be repeated.
    #[arg(short = 'I', long = "include-dir")]
    include_dirs: Vec<PathBuf>,

    /// `NAME=VALUE`, seeded as a `#define` before preprocessing; may be repeated.
    #[arg(short = 'D', long = "define", value_parser = parse_define)]
    defines: Vec<(String, String)>,

    /// Endianness inherited by declarations with no explicit `le`/`be`.
    #[arg(long, default_value = "native", value_parser = parse_endian)]
    endian: hexpat::Endianness,

    /// Policy for built-ins the registry marks as dangerous.
    #[arg(long, default_value = "ask", value_parser = parse_dangerous)]
    dangerous: Permission,

    /// When `--dangerous ask` triggers, prompt on stdin instead of denying.
    #[arg(long)]
    interactive: bool,

    /// Maximum number of patterns a single run may create.
    #[arg(long, default_value_t = EvalConfig::default().pattern_limit)]
    pattern_limit: u64,

    /// Maximum element count for a single dynamic/zero-terminated array.
    #[arg(long, default_value_t = EvalConfig::default().array_limit)]
    array_limit: u64,

    /// Maximum nested type-instantiation depth.
    #[arg(long, default_value_t = EvalConfig::default().recursion_limit)]
    recursion_limit: u32,
}

fn main() -> ExitCode {
    if let Err(e) = real_main() {
        eprintln!("error: {e:#}");
        return ExitCode::from(1);
    }
    ExitCode::from(0)
}

fn real_main() -> Result<()> {
    init_logger();
    let opt = Opt::parse();

    let config = EvalConfig {
        default_endian: opt.endian,
        pattern_limit: opt.pattern_limit,
        array_limit: opt.array_limit,
        recursion_limit: opt.recursion_limit,
        dangerous_functions: opt.dangerous,
        main_argument: None,
    };
    let opts = RunOptions {
        pattern: opt.pattern,
        data: opt.data,
        include_dirs: opt.include_dirs,
        defines: opt.defines,
        config,
        interactive_dangerous_gate: opt.interactive,
    };

    let outcome = run(&opts)?;
    for pattern in &outcome.patterns {
        println!("{pattern}");
    }
    if let Some(result) = &outcome.main_result {
        println!("main() -> {result:?}");
    }
    Ok(())
}
