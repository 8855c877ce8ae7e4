//! Filepath: src/cli.rs
//! Command-line interface: clap definitions and command runners.
//!
//! Runners own all disk IO; the library core only sees strings.

use std::{
    fs,
    io::Read,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use owo_colors::OwoColorize;
use rayon::prelude::*;
use serde::Serialize;

use crate::{
    core::{
        apply::{ApplyResult, OperationStatus, PatchApplier},
        context::ContextExtractor,
        error::ParseError,
        index::{IndexResult, StrategyChain, SymbolIndexer},
        patch::{PatchDocument, parse_patch},
        symbols::{Language, Strategy},
    },
    infra::{
        config::{self, Config},
        fs::{FsSource, commit},
    },
};

/// Shared application context for global flags
#[derive(Clone, Debug)]
pub struct AppContext {
    pub quiet: bool,    // global --quiet
    pub verbose: bool,  // global --verbose
    pub no_color: bool, // global --no-color
    pub config: Option<PathBuf>,
}

impl AppContext {
    /// Layered config, honouring `--config` and `--verbose`
    pub fn load_config(&self) -> Result<Config> {
        let mut cfg = config::load_config(self.config.as_deref())?;
        cfg.verbose |= self.verbose;
        Ok(cfg)
    }
}

#[derive(Parser)]
#[command(name = "apatch")]
#[command(about = "Anchor-based patches and task-focused context for code-generation workflows")]
#[command(version, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Debug logging and full suggestion previews
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Only print results and errors
    #[arg(long, short, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Config file to use instead of ./anchorpatch.toml
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

impl Cli {
    pub fn context(&self) -> AppContext {
        AppContext {
            quiet: self.quiet,
            verbose: self.verbose,
            no_color: self.no_color,
            config: self.config.clone(),
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Index symbols in source files
    Symbols(SymbolsArgs),

    /// Extract task-relevant context from a file
    Context(ContextArgs),

    /// Parse and validate a patch without touching files
    Check(CheckArgs),

    /// Apply a patch (dry run unless --write)
    Apply(ApplyArgs),

    /// Initialize configuration file
    Init(InitArgs),
}

#[derive(Args)]
pub struct SymbolsArgs {
    /// Files to index
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Preferred strategy (falls back to the heuristic scanner)
    #[arg(long, value_enum)]
    pub strategy: Option<Strategy>,

    /// Language hint overriding extension detection
    #[arg(long)]
    pub lang: Option<String>,

    /// Emit JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct ContextArgs {
    /// Target file (may not exist yet)
    pub file: PathBuf,

    /// Task description to score symbols against
    #[arg(long, short)]
    pub task: String,

    /// Line budget override
    #[arg(long, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    pub budget: Option<usize>,

    /// Preferred strategy override
    #[arg(long, value_enum)]
    pub strategy: Option<Strategy>,

    /// Emit JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct CheckArgs {
    /// Patch file, or `-` for stdin
    pub patch: PathBuf,

    /// Print the canonical form of the parsed patch
    #[arg(long)]
    pub render: bool,
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Patch file, or `-` for stdin
    pub patch: PathBuf,

    /// Directory patch paths are relative to
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Persist the changes (default is a dry run)
    #[arg(long)]
    pub write: bool,

    /// Let Add/Move replace existing files
    #[arg(long)]
    pub allow_overwrite: bool,

    /// Emit JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct InitArgs {
    /// Directory to initialize config in
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Overwrite existing config file
    #[arg(long)]
    pub force: bool,
}

/// Dispatch a parsed command line
pub fn run(cli: Cli) -> Result<()> {
    let ctx = cli.context();
    match cli.command {
        Commands::Symbols(args) => symbols_run(args, &ctx),
        Commands::Context(args) => context_run(args, &ctx),
        Commands::Check(args) => check_run(args, &ctx),
        Commands::Apply(args) => apply_run(args, &ctx),
        Commands::Init(args) => config::init(args, &ctx).map(|_| ()),
    }
}

#[derive(Serialize)]
struct FileSymbols<'a> {
    path: &'a Path,
    #[serde(flatten)]
    result: IndexResult,
}

pub fn symbols_run(args: SymbolsArgs, ctx: &AppContext) -> Result<()> {
    let cfg = ctx.load_config()?;
    let chain = match args.strategy {
        Some(s) => StrategyChain::new(s, &cfg.extract.fallback),
        None => cfg.strategy_chain(),
    };
    let indexer = SymbolIndexer::new(chain);
    let hint = args.lang.as_deref().map(Language::from_hint);

    // Files are independent; collect keeps input order
    let results: Vec<Result<FileSymbols>> = args
        .files
        .par_iter()
        .map(|path| {
            let content = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
            let lang = hint.unwrap_or_else(|| Language::from_path(path));
            Ok(FileSymbols {
                path: path.as_path(),
                result: indexer.index(&content, lang),
            })
        })
        .collect();
    let files = results.into_iter().collect::<Result<Vec<_>>>()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&files)?);
        return Ok(());
    }

    for f in &files {
        let r = &f.result;
        let degraded = if r.degraded { ", degraded" } else { "" };
        let header = format!("{} ({}, {}{degraded})", f.path.display(), r.language, r.strategy);
        if ctx.no_color {
            println!("{header}");
        } else {
            println!("{}", header.bold());
        }
        for s in &r.symbols {
            println!(
                "  {}{} {}  L{}-{}",
                "  ".repeat(s.depth),
                s.kind,
                s.name,
                s.start_line,
                s.end_line
            );
        }
        if ctx.verbose {
            for e in &r.failures {
                eprintln!("  note: {e}");
            }
        }
    }
    Ok(())
}

pub fn context_run(args: ContextArgs, ctx: &AppContext) -> Result<()> {
    let mut cfg = ctx.load_config()?;
    if let Some(budget) = args.budget {
        cfg.extract.budget_lines = budget;
    }
    if let Some(strategy) = args.strategy {
        cfg.extract.strategy = strategy;
    }

    let content = match fs::read_to_string(&args.file) {
        Ok(s) => Some(s),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", args.file.display())),
    };

    let extractor = ContextExtractor::new(cfg.indexer(), cfg.context_options());
    let extracted = extractor.extract(&args.file.to_string_lossy(), content.as_deref(), &args.task);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&extracted)?);
    } else {
        print!("{extracted}");
    }
    Ok(())
}

pub fn check_run(args: CheckArgs, ctx: &AppContext) -> Result<()> {
    let text = read_patch(&args.patch)?;
    let doc = parse_or_report(&text)?;
    let s = doc.summary();

    if args.render {
        print!("{doc}");
    }
    if !ctx.quiet {
        let ok = if ctx.no_color { "✓".to_string() } else { "✓".green().to_string() };
        println!(
            "{ok} valid patch: {} add, {} update, {} delete, {} move, {} hunks",
            s.adds, s.updates, s.deletes, s.moves, s.hunks
        );
    }
    Ok(())
}

pub fn apply_run(args: ApplyArgs, ctx: &AppContext) -> Result<()> {
    let cfg = ctx.load_config()?;
    let text = read_patch(&args.patch)?;
    let doc = parse_or_report(&text)?;

    let mut options = cfg.apply_options();
    options.allow_overwrite |= args.allow_overwrite;
    let applier = PatchApplier::new(cfg.indexer(), options);
    let source = FsSource::new(&args.root);
    let result = applier.apply(&doc, &source, !args.write);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_outcomes(&result, &doc, ctx);
    }

    if !result.success() {
        bail!("{} of {} operations failed", result.failures().count(), result.outcomes.len());
    }

    if args.write {
        let summary = commit(&source, &result.changes())?;
        if !ctx.quiet && !args.json {
            println!("Wrote {} files, removed {}", summary.written.len(), summary.removed.len());
        }
    } else if !ctx.quiet && !args.json {
        println!("Dry run; pass --write to apply");
    }
    Ok(())
}

fn print_outcomes(result: &ApplyResult, doc: &PatchDocument, ctx: &AppContext) {
    let paint = |s: &str, good: bool| -> String {
        match (ctx.no_color, good) {
            (true, _) => s.to_string(),
            (false, true) => s.green().to_string(),
            (false, false) => s.red().to_string(),
        }
    };

    for (outcome, op) in result.outcomes.iter().zip(&doc.operations) {
        match &outcome.status {
            OperationStatus::Applied(applied) => {
                let target = match &applied.moved_to {
                    Some(to) => format!("{} -> {to}", outcome.path),
                    None => outcome.path.clone(),
                };
                println!("{} {} {target}", paint("✓", true), outcome.kind);
                for (i, (h, hunk)) in applied.hunks.iter().zip(&op.hunks).enumerate() {
                    println!("    hunk {} `{}`: {} at line {}", i + 1, hunk.anchor, h.strategy, h.start_line);
                }
                if result.dry_run && !ctx.quiet {
                    if let Some(diff) = &applied.diff {
                        print!("{diff}");
                    }
                }
            }
            OperationStatus::Failed { message, .. } => {
                println!("{} {} {}: {message}", paint("✗", false), outcome.kind, outcome.path);
                for s in outcome.suggestions() {
                    println!("    candidate lines {}-{} (score {:.2})", s.start_line, s.end_line, s.score);
                    for line in s.preview.lines() {
                        println!("      | {line}");
                    }
                }
            }
        }
    }
}

fn read_patch(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read patch from stdin")?;
        return Ok(buf);
    }
    fs::read_to_string(path).with_context(|| format!("Failed to read patch {}", path.display()))
}

/// Parse, printing a labelled diagnostic on failure
fn parse_or_report(text: &str) -> Result<PatchDocument> {
    parse_patch(text).map_err(|e: ParseError| {
        let line = e.line;
        eprintln!("{:?}", miette::Report::new(e));
        anyhow::anyhow!("invalid patch (line {line})")
    })
}
