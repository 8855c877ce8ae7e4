//! Filepath: src/core/symbols.rs
//! Symbol model shared by every indexing strategy.
//!
//! Strategies emit loose `RawSymbol` records in any order;
//! `SymbolNester::nest` turns them into the ordered, nested
//! `Symbol` list that the selector and the locator consume.
//! Nesting is where the span invariants are enforced: sibling
//! spans never overlap and a child always sits inside its parent.
use std::{fmt, path::Path};

use serde::{Deserialize, Serialize};

use crate::{core::error::ExtractionError, infra::line_index::NewlineIndex};

/// Half-open byte range `[start, end)` into the original content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ByteSpan
{
    pub start: usize,
    pub end: usize,
}

impl ByteSpan
{
    pub fn new(
        start: usize,
        end: usize,
    ) -> Self
    {
        Self { start, end }
    }

    pub fn len(&self) -> usize
    {
        self.end
            .saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool
    {
        self.len() == 0
    }

    /// True when `other` lies entirely inside this span
    pub fn contains(
        &self,
        other: &ByteSpan,
    ) -> bool
    {
        self.start <= other.start && other.end <= self.end
    }

    pub fn contains_offset(
        &self,
        offset: usize,
    ) -> bool
    {
        self.start <= offset && offset < self.end
    }
}

/// Normalized symbol kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind
{
    Function,
    Method,
    /// Classes, structs, enums, traits, interfaces, impl blocks
    Type,
    /// Module-level constant or static
    Constant,
}

impl SymbolKind
{
    pub fn label(self) -> &'static str
    {
        match self
        {
            SymbolKind::Function => "function",
            SymbolKind::Method => "method",
            SymbolKind::Type => "type",
            SymbolKind::Constant => "constant",
        }
    }
}

impl fmt::Display for SymbolKind
{
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result
    {
        f.write_str(self.label())
    }
}

/// Indexed symbol with spans relative to the original content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol
{
    /// Simple declared name
    pub name: String,

    /// Normalized symbol kind
    pub kind: SymbolKind,

    /// Byte span in the original content
    pub span: ByteSpan,

    /// Index of the enclosing symbol in the same list
    pub parent: Option<usize>,

    /// Nesting depth (0 for top-level)
    pub depth: usize,

    /// 1-based inclusive line range
    pub start_line: usize,
    pub end_line: usize,

    /// Trimmed text of the line that declares the name
    pub declaration: String,

    /// Attached documentation (docstring or doc comment)
    pub doc: Option<String>,
}

/// Unordered symbol record produced by a strategy
#[derive(Debug, Clone, PartialEq)]
pub struct RawSymbol
{
    pub name: String,
    pub kind: SymbolKind,
    pub span: ByteSpan,
    /// Byte offset of the name token, when the strategy knows it
    pub name_at: Option<usize>,
    pub doc: Option<String>,
}

impl RawSymbol
{
    pub fn new(
        name: impl Into<String>,
        kind: SymbolKind,
        span: ByteSpan,
    ) -> Self
    {
        Self {
            name: name.into(),
            kind,
            span,
            name_at: None,
            doc: None,
        }
    }

    pub fn with_name_at(
        mut self,
        offset: usize,
    ) -> Self
    {
        self.name_at = Some(offset);
        self
    }

    pub fn with_doc(
        mut self,
        doc: Option<String>,
    ) -> Self
    {
        self.doc = doc.filter(|d| {
            !d.trim()
                .is_empty()
        });
        self
    }
}

/// Source language, detected from a path or a caller hint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language
{
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Tsx,
    Go,
    Cpp,
    /// Anything else; only the heuristic scanner applies
    Unknown,
}

impl Language
{
    /// Detect from the file extension
    pub fn from_path(path: &Path) -> Self
    {
        path.extension()
            .and_then(|e| e.to_str())
            .map(Self::from_extension)
            .unwrap_or(Language::Unknown)
    }

    pub fn from_extension(ext: &str) -> Self
    {
        match ext
            .to_ascii_lowercase()
            .as_str()
        {
            "rs" => Language::Rust,
            "py" | "pyi" => Language::Python,
            "js" | "mjs" | "cjs" | "jsx" => Language::JavaScript,
            "ts" | "mts" | "cts" => Language::TypeScript,
            "tsx" => Language::Tsx,
            "go" => Language::Go,
            "c" | "h" | "cc" | "cpp" | "cxx" | "hpp" | "hh" | "hxx" => Language::Cpp,
            _ => Language::Unknown,
        }
    }

    /// Parse a caller hint such as "python" or "rs"
    pub fn from_hint(hint: &str) -> Self
    {
        match hint
            .trim()
            .to_ascii_lowercase()
            .as_str()
        {
            "rust" => Language::Rust,
            "python" => Language::Python,
            "javascript" => Language::JavaScript,
            "typescript" => Language::TypeScript,
            "go" | "golang" => Language::Go,
            "c++" | "cpp" | "c" => Language::Cpp,
            other => Self::from_extension(other),
        }
    }

    /// Indentation delimits blocks instead of braces
    pub fn is_indent_scoped(self) -> bool
    {
        matches!(self, Language::Python)
    }

    pub fn label(self) -> &'static str
    {
        match self
        {
            Language::Rust => "rust",
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Tsx => "tsx",
            Language::Go => "go",
            Language::Cpp => "cpp",
            Language::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Language
{
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result
    {
        f.write_str(self.label())
    }
}

/// Indexing strategy identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Strategy
{
    /// Tree-sitter grammars, several languages
    Grammar,
    /// `syn` syntax tree, Rust only
    SyntaxTree,
    /// Line patterns with indentation/brace depth, any text
    Heuristic,
}

impl Strategy
{
    pub fn label(self) -> &'static str
    {
        match self
        {
            Strategy::Grammar => "grammar",
            Strategy::SyntaxTree => "syntax_tree",
            Strategy::Heuristic => "heuristic",
        }
    }
}

impl fmt::Display for Strategy
{
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result
    {
        f.write_str(self.label())
    }
}

/// Common interface for every indexing strategy
pub trait SymbolExtractor: Send + Sync
{
    /// Which strategy this extractor implements
    fn strategy(&self) -> Strategy;

    /// Whether the extractor can handle the language at all
    fn supports(
        &self,
        lang: Language,
    ) -> bool;

    /// Produce unordered symbols for `content`
    fn extract(
        &self,
        content: &str,
        lang: Language,
    ) -> Result<Vec<RawSymbol>, ExtractionError>;
}

/// Builds the ordered symbol list from raw records
pub struct SymbolNester;

impl SymbolNester
{
    /// Order by start offset, attach parents, enforce containment
    pub fn nest(
        content: &str,
        mut raw: Vec<RawSymbol>,
    ) -> Vec<Symbol>
    {
        // Drop records that cannot be mapped back to the content
        raw.retain(|r| {
            !r.name
                .is_empty()
                && r.span
                    .start
                    < r.span
                        .end
                && r.span
                    .end
                    <= content.len()
        });

        // Outer symbols before inner ones that start at the same byte
        raw.sort_by(|a, b| {
            a.span
                .start
                .cmp(&b.span.start)
                .then(
                    b.span
                        .end
                        .cmp(&a.span.end),
                )
        });
        raw.dedup_by(|a, b| a.span == b.span && a.name == b.name);

        let index = NewlineIndex::build(content.as_bytes());
        let mut out: Vec<Symbol> = Vec::with_capacity(raw.len());
        let mut stack: Vec<usize> = Vec::new();

        for r in raw
        {
            let mut span = r.span;

            // Close scopes that ended before this symbol
            while let Some(&top) = stack.last()
            {
                if out[top]
                    .span
                    .end
                    <= span.start
                {
                    stack.pop();
                }
                else
                {
                    break;
                }
            }

            let parent = stack
                .last()
                .copied();

            // Clamp partial overlaps into the enclosing scope
            if let Some(p) = parent
            {
                span.end = span
                    .end
                    .min(out[p].span.end);
            }

            // Functions directly inside a type are methods
            let kind = match (r.kind, parent.map(|p| out[p].kind))
            {
                (SymbolKind::Function, Some(SymbolKind::Type)) => SymbolKind::Method,
                (kind, _) => kind,
            };

            let decl_at = r
                .name_at
                .filter(|b| span.contains_offset(*b))
                .unwrap_or(span.start);
            let decl_line = index.line_of_byte(decl_at);

            out.push(Symbol {
                name: r.name,
                kind,
                span,
                parent,
                depth: parent.map_or(0, |p| out[p].depth + 1),
                start_line: index.line_of_byte(span.start),
                end_line: index.last_line_of_span(span.start, span.end),
                declaration: line_text(content, &index, decl_line)
                    .trim()
                    .to_string(),
                doc: r.doc,
            });
            stack.push(out.len() - 1);
        }

        out
    }
}

/// Text of a 1-based line without its terminator
pub fn line_text<'a>(
    content: &'a str,
    index: &NewlineIndex,
    line1: usize,
) -> &'a str
{
    let bytes = content.as_bytes();
    match (index.start_byte_of_line(line1), index.end_byte_of_line(line1, bytes))
    {
        (Some(s), Some(e)) => content
            .get(s..e)
            .unwrap_or(""),
        _ => "",
    }
}
