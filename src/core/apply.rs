//! Filepath: src/core/apply.rs
//! Applies a parsed patch to an in-memory view of the file set.
//!
//! Files are read through a caller-supplied `ContentSource` and edited
//! in an overlay; nothing is written. Every operation runs even after a
//! failure so the caller gets all diagnostics at once, but `changes()`
//! is empty unless every operation applied.

use std::{
    collections::{BTreeMap, HashMap},
    io,
    path::Path,
};

use indexmap::IndexMap;
use serde::Serialize;
use similar::TextDiff;
use tracing::{debug, instrument, warn};

use crate::core::{
    error::{ApplyError, OperationError},
    index::SymbolIndexer,
    locate::{FileText, HunkOutcome, LocateOptions, Locator, Suggestion},
    patch::{FileOperation, OperationKind, PatchDocument},
    symbols::Language,
};

/// Content ID for change detection (xxh64 hash)
pub type ContentId = String;

/// Deterministic content ID using xxh64 with a fixed seed
pub fn content_id(content: &str) -> ContentId {
    format!("{:016x}", xxhash_rust::xxh64::xxh64(content.as_bytes(), 0))
}

/// Read access to the current file set; `Ok(None)` means "absent"
pub trait ContentSource {
    fn load(&self, path: &str) -> io::Result<Option<String>>;
}

impl ContentSource for HashMap<String, String> {
    fn load(&self, path: &str) -> io::Result<Option<String>> {
        Ok(self.get(path).cloned())
    }
}

impl ContentSource for BTreeMap<String, String> {
    fn load(&self, path: &str) -> io::Result<Option<String>> {
        Ok(self.get(path).cloned())
    }
}

/// Applier settings
#[derive(Debug, Clone, Copy)]
pub struct ApplyOptions {
    /// Let Add/Move replace an existing file
    pub allow_overwrite: bool,
    pub suggestion_limit: usize,
    /// Suggestions must score strictly above this
    pub min_similarity: f64,
    pub verbose: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            allow_overwrite: false,
            suggestion_limit: 3,
            min_similarity: 0.0,
            verbose: false,
        }
    }
}

/// Successful operation details
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedOperation {
    /// Per-hunk placement, update operations only
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hunks: Vec<HunkOutcome>,
    /// Content of the target after the operation; None when removed
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moved_to: Option<String>,
    /// Unified diff of the target before and after
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OperationStatus {
    Applied(AppliedOperation),
    Failed { error: OperationError, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationOutcome {
    pub kind: OperationKind,
    pub path: String,
    #[serde(flatten)]
    pub status: OperationStatus,
}

impl OperationOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self.status, OperationStatus::Applied(_))
    }

    pub fn error(&self) -> Option<&OperationError> {
        match &self.status {
            OperationStatus::Failed { error, .. } => Some(error),
            OperationStatus::Applied(_) => None,
        }
    }

    pub fn suggestions(&self) -> &[Suggestion] {
        self.error().map(OperationError::suggestions).unwrap_or(&[])
    }
}

/// State of one touched path
#[derive(Debug, Clone, PartialEq, Serialize)]
struct TrackedFile {
    /// Content ID when first read; None if it did not exist
    before: Option<ContentId>,
    after: Option<String>,
}

/// A write the caller should persist
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum FileChange {
    Write {
        path: String,
        content: String,
        /// Content ID the file must still have; None for new files
        expected: Option<ContentId>,
    },
    Remove {
        path: String,
        expected: Option<ContentId>,
    },
}

impl FileChange {
    pub fn path(&self) -> &str {
        match self {
            FileChange::Write { path, .. } | FileChange::Remove { path, .. } => path,
        }
    }
}

/// Outcome of applying a whole patch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplyResult {
    pub dry_run: bool,
    pub outcomes: Vec<OperationOutcome>,
    #[serde(skip)]
    files: IndexMap<String, TrackedFile>,
}

impl ApplyResult {
    /// Every operation applied
    pub fn success(&self) -> bool {
        self.outcomes.iter().all(OperationOutcome::is_applied)
    }

    pub fn failures(&self) -> impl Iterator<Item = &OperationOutcome> {
        self.outcomes.iter().filter(|o| !o.is_applied())
    }

    /// Error messages of failed operations, prefixed by path
    pub fn error_messages(&self) -> Vec<String> {
        self.failures()
            .filter_map(|o| o.error().map(|e| format!("{}: {e}", o.path)))
            .collect()
    }

    pub fn suggestions(&self) -> Vec<Suggestion> {
        self.failures().flat_map(|o| o.suggestions().iter().cloned()).collect()
    }

    /// Computed content of `path`, whether or not it will be committed
    pub fn final_content(&self, path: &str) -> Option<&str> {
        self.files.get(path).and_then(|f| f.after.as_deref())
    }

    /// Writes to persist; empty for dry runs and failed patches
    pub fn changes(&self) -> Vec<FileChange> {
        if self.dry_run || !self.success() {
            return Vec::new();
        }
        self.files
            .iter()
            .filter_map(|(path, f)| match (&f.before, &f.after) {
                (None, None) => None,
                (Some(_), None) => Some(FileChange::Remove {
                    path: path.clone(),
                    expected: f.before.clone(),
                }),
                (before, Some(after)) => {
                    (before.as_deref() != Some(content_id(after).as_str())).then(|| FileChange::Write {
                        path: path.clone(),
                        content: after.clone(),
                        expected: before.clone(),
                    })
                }
            })
            .collect()
    }
}

/// Patch applier over a content provider
#[derive(Debug, Default)]
pub struct PatchApplier {
    indexer: SymbolIndexer,
    options: ApplyOptions,
}

impl PatchApplier {
    pub fn new(indexer: SymbolIndexer, options: ApplyOptions) -> Self {
        Self { indexer, options }
    }

    pub fn options(&self) -> &ApplyOptions {
        &self.options
    }

    /// Apply every operation in order against `source`
    #[instrument(level = "debug", skip_all, fields(ops = doc.operations.len(), dry_run = dry_run))]
    pub fn apply(&self, doc: &PatchDocument, source: &dyn ContentSource, dry_run: bool) -> ApplyResult {
        let mut session = Session {
            source,
            files: IndexMap::new(),
        };

        let outcomes = doc
            .operations
            .iter()
            .map(|op| {
                let status = match self.apply_operation(op, &mut session) {
                    Ok(applied) => OperationStatus::Applied(applied),
                    Err(error) => {
                        warn!(path = %op.path, kind = %op.kind, %error, "operation failed");
                        OperationStatus::Failed {
                            message: error.to_string(),
                            error,
                        }
                    }
                };
                OperationOutcome {
                    kind: op.kind,
                    path: op.path.clone(),
                    status,
                }
            })
            .collect();

        ApplyResult {
            dry_run,
            outcomes,
            files: session.files,
        }
    }

    fn apply_operation(&self, op: &FileOperation, s: &mut Session<'_>) -> Result<AppliedOperation, OperationError> {
        let path = op.path.as_str();
        let current = s.current(path)?;

        match op.kind {
            OperationKind::Add => {
                if current.is_some() && !self.options.allow_overwrite {
                    return Err(ApplyError::TargetExists { op: op.kind, path: op.path.clone() }.into());
                }
                let content = op.content.clone().unwrap_or_default();
                let diff = unified_diff(path, current.as_deref().unwrap_or(""), &content);
                s.set(path, Some(content.clone()));
                Ok(AppliedOperation {
                    hunks: Vec::new(),
                    content: Some(content),
                    moved_to: None,
                    diff: Some(diff),
                })
            }
            OperationKind::Update => {
                let old = current.ok_or_else(|| missing(op))?;
                let locator = Locator::new(&self.indexer, Language::from_path(Path::new(path)), self.locate_options());

                // All hunks or nothing: the overlay is only touched on success
                let (text, hunks) = locator.apply_hunks(FileText::parse(&old), &op.hunks)?;
                let content = text.render();
                debug!(path, hunks = hunks.len(), "update applied");
                let diff = unified_diff(path, &old, &content);
                s.set(path, Some(content.clone()));
                Ok(AppliedOperation {
                    hunks,
                    content: Some(content),
                    moved_to: None,
                    diff: Some(diff),
                })
            }
            OperationKind::Delete => {
                let old = current.ok_or_else(|| missing(op))?;
                s.set(path, None);
                Ok(AppliedOperation {
                    hunks: Vec::new(),
                    content: None,
                    moved_to: None,
                    diff: Some(unified_diff(path, &old, "")),
                })
            }
            OperationKind::Move => {
                let old = current.ok_or_else(|| missing(op))?;
                let to = op.move_to.clone().unwrap_or_default();
                if s.current(&to)?.is_some() && !self.options.allow_overwrite {
                    return Err(ApplyError::TargetExists { op: op.kind, path: to }.into());
                }
                s.set(path, None);
                s.set(&to, Some(old.clone()));
                Ok(AppliedOperation {
                    hunks: Vec::new(),
                    content: Some(old),
                    moved_to: Some(to),
                    diff: None,
                })
            }
        }
    }

    fn locate_options(&self) -> LocateOptions {
        LocateOptions {
            suggestion_limit: self.options.suggestion_limit,
            min_similarity: self.options.min_similarity,
            verbose: self.options.verbose,
        }
    }
}

fn missing(op: &FileOperation) -> OperationError {
    ApplyError::MissingTarget {
        op: op.kind,
        path: op.path.clone(),
    }
    .into()
}

/// Overlay of edited files on top of the source
struct Session<'a> {
    source: &'a dyn ContentSource,
    files: IndexMap<String, TrackedFile>,
}

impl Session<'_> {
    fn current(&mut self, path: &str) -> Result<Option<String>, OperationError> {
        if let Some(f) = self.files.get(path) {
            return Ok(f.after.clone());
        }
        let loaded = self.source.load(path).map_err(|e| ApplyError::Unreadable {
            path: path.to_string(),
            message: e.to_string(),
        })?;
        self.files.insert(
            path.to_string(),
            TrackedFile {
                before: loaded.as_deref().map(content_id),
                after: loaded.clone(),
            },
        );
        Ok(loaded)
    }

    fn set(&mut self, path: &str, content: Option<String>) {
        match self.files.get_mut(path) {
            Some(f) => f.after = content,
            None => {
                self.files.insert(
                    path.to_string(),
                    TrackedFile {
                        before: None,
                        after: content,
                    },
                );
            }
        }
    }
}

fn unified_diff(path: &str, old: &str, new: &str) -> String {
    TextDiff::from_lines(old, new)
        .unified_diff()
        .context_radius(3)
        .header(&format!("a/{path}"), &format!("b/{path}"))
        .to_string()
}
