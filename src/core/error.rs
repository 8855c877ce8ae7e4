//! Filepath: src/core/error.rs
//! Error taxonomy for indexing, parsing, matching, applying and retrying.
//!
//! Only `ApplyError` and `WorkflowError` are meant to end a task; the
//! others carry enough detail for a generator to correct its next patch.

use miette::{Diagnostic, SourceSpan};
use serde::Serialize;
use thiserror::Error;

use crate::{
    core::{
        locate::{MatchStrategy, Suggestion},
        patch::OperationKind,
        symbols::{Language, Strategy},
    },
    infra::line_index::NewlineIndex,
};

/// A strategy could not index the content; recovered by falling back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum ExtractionError {
    #[error("{strategy} strategy does not support {language}")]
    Unsupported { strategy: Strategy, language: Language },

    #[error("{strategy} strategy failed: {message}")]
    Failed { strategy: Strategy, message: String },
}

/// Why a patch text was rejected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(rename_all = "snake_case")]
pub enum ParseFailure {
    #[error("patch does not start with `*** Begin Patch`")]
    MissingBegin,
    #[error("patch is not terminated by `*** End Patch`")]
    MissingEnd,
    #[error("unexpected content after `*** End Patch`")]
    TrailingContent,
    #[error("patch contains no file operations")]
    Empty,
    #[error("unknown patch marker `{0}`")]
    UnknownMarker(String),
    #[error("file operation is missing a target path")]
    MissingPath,
    #[error("move operation must read `<from> -> <to>`")]
    MalformedMove,
    #[error("line is outside of any file block")]
    OrphanLine,
    #[error("update block has no hunks")]
    NoHunks,
    #[error("hunk has no anchor context")]
    NoAnchorContext,
    #[error("content before the first `@@` anchor")]
    MissingAnchor,
    #[error("add-file block contains a removal line")]
    RemovalInAdd,
    #[error("add-file content lines must start with '+'")]
    UntaggedAddLine,
    #[error("{0}-file block carries content")]
    UnexpectedBody(OperationKind),
    #[error("no patch block found in generator output")]
    NoPatchBlock,
    #[error("generator unavailable: {0}")]
    GeneratorUnavailable(String),
}

/// Malformed patch syntax, located by 1-based line number
#[derive(Debug, Clone, Error, Diagnostic)]
#[error("line {line}: {reason}")]
#[diagnostic(code(anchorpatch::parse), help("patches are framed by `*** Begin Patch` / `*** End Patch`"))]
pub struct ParseError {
    pub line: usize,
    pub reason: ParseFailure,
    #[source_code]
    source_text: String,
    #[label("here")]
    at: Option<SourceSpan>,
}

impl ParseError {
    pub fn new(line: usize, reason: ParseFailure) -> Self {
        Self {
            line,
            reason,
            source_text: String::new(),
            at: None,
        }
    }

    /// Attach the patch text so diagnostics can point at the line
    pub fn with_source(mut self, text: &str) -> Self {
        let index = NewlineIndex::build(text.as_bytes());
        self.at = index
            .start_byte_of_line(self.line)
            .zip(index.end_byte_of_line(self.line, text.as_bytes()))
            .map(|(s, e)| SourceSpan::from(s..e));
        self.source_text = text.to_string();
        self
    }
}

impl PartialEq for ParseError {
    fn eq(&self, other: &Self) -> bool {
        self.line == other.line && self.reason == other.reason
    }
}

/// Why a hunk could not be located
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[serde(tag = "failure", rename_all = "snake_case")]
pub enum MatchFailure {
    #[error("context not found")]
    NotFound,
    #[error("context is ambiguous ({candidates} candidates)")]
    Ambiguous { candidates: usize },
    #[error("post-image already present; patch looks applied")]
    AlreadyApplied,
}

/// Hunk could not be located; carries ranked suggestions
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[error("hunk {hunk} (`@@ {anchor} @@`): {failure}")]
pub struct MatchError {
    /// 1-based hunk number within its file operation
    pub hunk: usize,
    pub anchor: String,
    pub failure: MatchFailure,
    /// Strategies attempted, in order
    pub tried: Vec<MatchStrategy>,
    pub suggestions: Vec<Suggestion>,
}

/// Structural mismatch between a patch and the file set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum ApplyError {
    #[error("cannot {op} `{path}`: file already exists")]
    TargetExists { op: OperationKind, path: String },

    #[error("cannot {op} `{path}`: file does not exist")]
    MissingTarget { op: OperationKind, path: String },

    #[error("cannot read `{path}`: {message}")]
    Unreadable { path: String, message: String },
}

/// Failure of a single file operation
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[serde(untagged)]
pub enum OperationError {
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error(transparent)]
    Apply(#[from] ApplyError),
}

impl OperationError {
    pub fn suggestions(&self) -> &[Suggestion] {
        match self {
            OperationError::Match(m) => &m.suggestions,
            OperationError::Apply(_) => &[],
        }
    }
}

/// All attempts were spent without an applicable patch
#[derive(Debug, Clone, PartialEq, Error)]
#[error("no applicable patch after {attempts} attempts")]
pub struct ExhaustedRetriesError {
    pub attempts: usize,
    /// Errors reported by the final attempt
    pub last_errors: Vec<String>,
}

/// Terminal failure of a retry workflow
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    ExhaustedRetries(#[from] ExhaustedRetriesError),

    #[error("attempt {attempt} stopped on a structural mismatch: {error}")]
    Apply { attempt: usize, error: ApplyError },
}
