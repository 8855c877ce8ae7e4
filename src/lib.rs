//! **anchorpatch** - Anchor-based patch engine and task-focused context extraction
//!
//! Patches locate their hunks by anchor text rather than line numbers, so they
//! survive drift in the target file. Context extraction indexes symbols through
//! a strategy chain (tree-sitter, syn, heuristic scanner) and selects the code
//! most relevant to a task under a line budget.

/// Command-line interface with clap integration
pub mod cli;

/// Core engine - patch format, matching, application, context and retries
pub mod core {
    /// Error taxonomy shared by every stage
    pub mod error;
    pub use error::{ApplyError, MatchError, OperationError, ParseError, WorkflowError};

    /// Symbol model, languages and the extractor interface
    pub mod symbols;
    pub use symbols::{Language, Strategy, Symbol, SymbolExtractor, SymbolKind};

    /// Strategy chain with degradation tracking
    pub mod index;
    pub use index::{IndexResult, StrategyChain, SymbolIndexer};

    /// Patch grammar: parse, validate, render
    pub mod patch;
    pub use patch::{PatchDocument, extract_patch_block, parse_patch, validate_patch};

    /// Hunk location: exact, fuzzy, then anchor-scoped
    pub mod locate;
    pub use locate::{FileText, Locator, MatchStrategy, Suggestion};

    /// Multi-file application over an in-memory overlay
    pub mod apply;
    pub use apply::{ApplyResult, ContentSource, FileChange, PatchApplier};

    /// Keyword scoring and budgeted section selection
    pub mod select;

    /// Skeleton plus relevant sections for one target file
    pub mod context;
    pub use context::{ContextExtractor, ExtractedContext};

    /// Bounded generate/apply loop with feedback
    pub mod workflow;
    pub use workflow::{PatchGenerator, RetryCoordinator, WorkflowReport, WorkflowState};
}

/// Symbol extractors, one per strategy
pub mod parsers {
    /// Tree-sitter grammars for Rust, Python, JS/TS, Go and C++
    pub mod grammar;
    pub use grammar::GrammarExtractor;

    /// Full syn parse for Rust sources
    pub mod syntax_tree;
    pub use syntax_tree::SyntaxTreeExtractor;

    /// Line-oriented scanner that works on anything
    pub mod heuristic;
    pub use heuristic::HeuristicExtractor;

    /// Docstring and comment harvesting for tree-sitter nodes
    pub mod docs;
}

/// Infrastructure - configuration, disk access, logging and helpers
pub mod infra {
    /// Layered configuration with TOML/YAML/JSON files and env overrides
    pub mod config;
    pub use config::{Config, init as config_init, load_config};

    /// Disk-backed content source and verified commits
    pub mod fs;
    pub use fs::{FsSource, commit};

    /// Tracing subscriber setup
    pub mod logging;

    /// CRLF/LF-robust line indexing for O(1) line→byte mapping
    pub mod line_index;
    pub use line_index::NewlineIndex;

    /// Utility functions and helpers for common operations
    pub mod utils;
    // Keep utils private - not part of the public API
}

pub use cli::{AppContext, Cli, Commands};
pub use core::{ApplyResult, ContextExtractor, PatchApplier, RetryCoordinator, SymbolIndexer, parse_patch};
pub use infra::{Config, FsSource, load_config};
