//! Filepath: src/core/context.rs
//! Task-focused context extraction for one file.
//!
//! Combines the symbol indexer and the relevance selector into an
//! `ExtractedContext`: a skeleton of every symbol plus the sections
//! worth showing for the task. Small files are returned whole.

use std::{fmt, path::Path};

use serde::Serialize;
use tracing::{debug, instrument};

use crate::{
    core::{
        index::SymbolIndexer,
        select::{self, ContextMode, RelevantSection, SelectOptions},
        symbols::{Language, Strategy, Symbol, SymbolKind},
    },
    infra::line_index::NewlineIndex,
};

/// One line of the file map
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkeletonEntry {
    pub name: String,
    pub kind: SymbolKind,
    pub depth: usize,
    /// 1-based declaration start line
    pub line: usize,
}

/// Context handed to a patch generator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedContext {
    pub path: String,
    pub language: Language,
    /// None when the file does not exist
    pub strategy: Option<Strategy>,
    pub degraded: bool,
    pub file_exists: bool,
    pub mode: ContextMode,
    /// Every symbol, regardless of relevance
    pub skeleton: Vec<SkeletonEntry>,
    /// Ascending by offset
    pub sections: Vec<RelevantSection>,
    pub total_lines: usize,
    pub selected_lines: usize,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextOptions {
    pub select: SelectOptions,
    /// Files shorter than this many bytes are sent whole
    pub small_file_bytes: usize,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            select: SelectOptions::default(),
            small_file_bytes: 5 * 1024,
        }
    }
}

#[derive(Debug, Default)]
pub struct ContextExtractor {
    indexer: SymbolIndexer,
    options: ContextOptions,
}

impl ContextExtractor {
    pub fn new(indexer: SymbolIndexer, options: ContextOptions) -> Self {
        Self { indexer, options }
    }

    /// Build the context for `path`; `content` is None for a missing file
    #[instrument(level = "debug", skip(self, content, task), fields(exists = content.is_some()))]
    pub fn extract(&self, path: &str, content: Option<&str>, task: &str) -> ExtractedContext {
        let language = Language::from_path(Path::new(path));
        let keywords = select::task_keywords(task);

        let Some(content) = content else {
            return ExtractedContext {
                path: path.to_string(),
                language,
                strategy: None,
                degraded: false,
                file_exists: false,
                mode: ContextMode::NewFile,
                skeleton: Vec::new(),
                sections: Vec::new(),
                total_lines: 0,
                selected_lines: 0,
                keywords,
            };
        };

        let indexed = self.indexer.index(content, language);
        let skeleton = skeleton(&indexed.symbols);
        let index = NewlineIndex::build(content.as_bytes());
        let total_lines = index.line_count();

        let (mode, sections, selected_lines) = if content.len() < self.options.small_file_bytes {
            let sections = (total_lines > 0)
                .then(|| select::section(content, &index, 1, total_lines, 0.0, None, false))
                .into_iter()
                .collect();
            (ContextMode::WholeFile, sections, total_lines)
        } else {
            let sel = select::select(&indexed.symbols, content, &keywords, &self.options.select);
            (sel.mode, sel.sections, sel.selected_lines)
        };

        debug!(?mode, sections = sections.len(), selected_lines, total_lines, "context extracted");
        ExtractedContext {
            path: path.to_string(),
            language,
            strategy: Some(indexed.strategy),
            degraded: indexed.degraded,
            file_exists: true,
            mode,
            skeleton,
            sections,
            total_lines,
            selected_lines,
            keywords,
        }
    }
}

fn skeleton(symbols: &[Symbol]) -> Vec<SkeletonEntry> {
    symbols
        .iter()
        .map(|s| SkeletonEntry {
            name: s.name.clone(),
            kind: s.kind,
            depth: s.depth,
            line: s.start_line,
        })
        .collect()
}

/// Plain-text rendering for prompts and the CLI
impl fmt::Display for ExtractedContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.file_exists {
            return writeln!(f, "# {} (new file)", self.path);
        }

        let strategy = self.strategy.map(Strategy::label).unwrap_or("none");
        let degraded = if self.degraded { ", degraded" } else { "" };
        writeln!(
            f,
            "# {} ({}, {} lines, {strategy}{degraded})",
            self.path, self.language, self.total_lines
        )?;

        writeln!(f, "\n## Skeleton")?;
        if self.skeleton.is_empty() {
            writeln!(f, "(no symbols)")?;
        }
        for e in &self.skeleton {
            writeln!(f, "{}{} {} (line {})", "  ".repeat(e.depth), e.kind, e.name, e.line)?;
        }

        for s in &self.sections {
            let cut = if s.truncated { ", truncated" } else { "" };
            writeln!(f, "\n## Lines {}-{}{cut}", s.start_line, s.end_line)?;
            writeln!(f, "{}", s.text)?;
        }
        Ok(())
    }
}
