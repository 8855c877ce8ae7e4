//! Filepath: src/core/patch.rs
//! Anchor-based patch documents: model, parser and renderer
//!
//! A patch is framed by `*** Begin Patch` / `*** End Patch` and holds one
//! block per file operation. Update blocks carry hunks introduced by an
//! `@@ <anchor> @@` line; anchors are context text, never line numbers.
//! Parsing is purely syntactic and validates structure as it goes.

use std::fmt;

use serde::Serialize;

use crate::core::error::{ParseError, ParseFailure};

const BEGIN: &str = "*** Begin Patch";
const END: &str = "*** End Patch";
const MARKER: &str = "*** ";

/// Kind of file operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Add,
    Update,
    Delete,
    Move,
}

impl OperationKind {
    fn from_marker(word: &str) -> Option<Self> {
        match word {
            "Add File" => Some(OperationKind::Add),
            "Update File" => Some(OperationKind::Update),
            "Delete File" => Some(OperationKind::Delete),
            "Move File" => Some(OperationKind::Move),
            _ => None,
        }
    }

    fn marker(self) -> &'static str {
        match self {
            OperationKind::Add => "Add File",
            OperationKind::Update => "Update File",
            OperationKind::Delete => "Delete File",
            OperationKind::Move => "Move File",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OperationKind::Add => "add",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
            OperationKind::Move => "move",
        })
    }
}

/// Tag of a single hunk line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineTag {
    Context,
    Remove,
    Add,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchLine {
    pub tag: LineTag,
    pub text: String,
}

impl PatchLine {
    pub fn context(text: impl Into<String>) -> Self {
        Self { tag: LineTag::Context, text: text.into() }
    }

    pub fn remove(text: impl Into<String>) -> Self {
        Self { tag: LineTag::Remove, text: text.into() }
    }

    pub fn add(text: impl Into<String>) -> Self {
        Self { tag: LineTag::Add, text: text.into() }
    }
}

/// One localized edit inside an update block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hunk {
    /// Text between the `@@` markers, trimmed
    pub anchor: String,
    pub lines: Vec<PatchLine>,
}

impl Hunk {
    pub fn new(anchor: impl Into<String>, lines: Vec<PatchLine>) -> Self {
        Self { anchor: anchor.into(), lines }
    }

    /// Context and removal lines, in order: the searchable pattern
    pub fn pattern(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter(|l| l.tag != LineTag::Add)
            .map(|l| l.text.as_str())
            .collect()
    }

    /// Context and addition lines, in order: the post-image
    pub fn replacement(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter(|l| l.tag != LineTag::Remove)
            .map(|l| l.text.as_str())
            .collect()
    }

    /// True when the hunk inserts at least one line
    pub fn adds_lines(&self) -> bool {
        self.lines.iter().any(|l| l.tag == LineTag::Add)
    }
}

/// One file block of a patch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileOperation {
    pub kind: OperationKind,
    pub path: String,
    /// Destination for move operations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub move_to: Option<String>,
    /// Update hunks; empty for every other kind
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hunks: Vec<Hunk>,
    /// Full content for add operations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl FileOperation {
    pub fn add(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: OperationKind::Add,
            path: path.into(),
            move_to: None,
            hunks: Vec::new(),
            content: Some(content.into()),
        }
    }

    pub fn update(path: impl Into<String>, hunks: Vec<Hunk>) -> Self {
        Self {
            kind: OperationKind::Update,
            path: path.into(),
            move_to: None,
            hunks,
            content: None,
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            kind: OperationKind::Delete,
            path: path.into(),
            move_to: None,
            hunks: Vec::new(),
            content: None,
        }
    }

    pub fn rename(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            kind: OperationKind::Move,
            path: from.into(),
            move_to: Some(to.into()),
            hunks: Vec::new(),
            content: None,
        }
    }
}

/// Parsed patch: ordered file operations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PatchDocument {
    pub operations: Vec<FileOperation>,
}

/// Per-kind counts returned by `validate_patch`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PatchSummary {
    pub adds: usize,
    pub updates: usize,
    pub deletes: usize,
    pub moves: usize,
    pub hunks: usize,
}

impl PatchDocument {
    pub fn summary(&self) -> PatchSummary {
        let mut s = PatchSummary::default();
        for op in &self.operations {
            match op.kind {
                OperationKind::Add => s.adds += 1,
                OperationKind::Update => s.updates += 1,
                OperationKind::Delete => s.deletes += 1,
                OperationKind::Move => s.moves += 1,
            }
            s.hunks += op.hunks.len();
        }
        s
    }
}

/// Parse patch text into a document, validating structure
pub fn parse_patch(text: &str) -> Result<PatchDocument, ParseError> {
    PatchParser::new(text).run().map_err(|e| e.with_source(text))
}

/// Check that a patch parses; returns its operation counts
pub fn validate_patch(text: &str) -> Result<PatchSummary, ParseError> {
    parse_patch(text).map(|doc| doc.summary())
}

/// Slice the patch block out of free-form generator output.
///
/// Starts at the first `*** Begin Patch` line and ends after the last
/// `*** End Patch` line, dropping prose and code fences around it.
/// Without an end marker the slice runs to the end of the text.
pub fn extract_patch_block(raw: &str) -> Option<&str> {
    let mut begin: Option<usize> = None;
    let mut end: Option<usize> = None;
    let mut offset = 0usize;

    for line in raw.split_inclusive('\n') {
        let trimmed = line.trim();
        if begin.is_none() && trimmed == BEGIN {
            begin = Some(offset + (line.len() - line.trim_start().len()));
        } else if begin.is_some() && trimmed == END {
            end = Some(offset + line.trim_end().len());
        }
        offset += line.len();
    }

    let start = begin?;
    Some(&raw[start..end.unwrap_or(raw.len())])
}

/// Line-oriented parser state
struct PatchParser<'a> {
    lines: Vec<&'a str>,
    i: usize,
}

impl<'a> PatchParser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines().collect(),
            i: 0,
        }
    }

    fn err(&self, at: usize, reason: ParseFailure) -> ParseError {
        ParseError::new(at + 1, reason)
    }

    fn line(&self, at: usize) -> &'a str {
        let line = self.lines[at];
        // Tolerate a BOM on the very first line
        if at == 0 { line.trim_start_matches('\u{FEFF}') } else { line }
    }

    fn is_marker(&self, at: usize) -> bool {
        self.line(at).starts_with(MARKER)
    }

    fn run(mut self) -> Result<PatchDocument, ParseError> {
        // Leading blank lines are harmless
        while self.i < self.lines.len() && self.line(self.i).trim().is_empty() {
            self.i += 1;
        }
        if self.i >= self.lines.len() || self.line(self.i).trim() != BEGIN {
            let at = self.i.min(self.lines.len().saturating_sub(1));
            return Err(self.err(at, ParseFailure::MissingBegin));
        }
        self.i += 1;

        let mut doc = PatchDocument::default();
        loop {
            if self.i >= self.lines.len() {
                return Err(self.err(self.lines.len().saturating_sub(1), ParseFailure::MissingEnd));
            }

            let at = self.i;
            let line = self.line(at).trim_end();

            if line == END {
                self.expect_trailing_blank(at + 1)?;
                if doc.operations.is_empty() {
                    return Err(self.err(at, ParseFailure::Empty));
                }
                return Ok(doc);
            }

            if line.trim().is_empty() {
                self.i += 1;
                continue;
            }

            if !line.starts_with(MARKER) {
                return Err(self.err(at, ParseFailure::OrphanLine));
            }

            let op = self.parse_operation(at, &line[MARKER.len()..])?;
            doc.operations.push(op);
        }
    }

    fn expect_trailing_blank(&self, from: usize) -> Result<(), ParseError> {
        match (from..self.lines.len()).find(|&j| !self.line(j).trim().is_empty()) {
            Some(j) => Err(self.err(j, ParseFailure::TrailingContent)),
            None => Ok(()),
        }
    }

    /// Parse one file block whose header (minus `*** `) is `header`
    fn parse_operation(&mut self, at: usize, header: &str) -> Result<FileOperation, ParseError> {
        let (word, rest) = header.split_once(':').unwrap_or((header, ""));
        let kind = OperationKind::from_marker(word.trim())
            .ok_or_else(|| self.err(at, ParseFailure::UnknownMarker(word.trim().to_string())))?;

        let target = rest.trim();
        if target.is_empty() {
            return Err(self.err(at, ParseFailure::MissingPath));
        }
        self.i += 1;

        match kind {
            OperationKind::Add => {
                let content = self.parse_add_body()?;
                Ok(FileOperation::add(target, content))
            }
            OperationKind::Update => {
                let hunks = self.parse_hunks()?;
                if hunks.is_empty() {
                    return Err(self.err(at, ParseFailure::NoHunks));
                }
                Ok(FileOperation::update(target, hunks))
            }
            OperationKind::Delete => {
                self.expect_empty_body(kind)?;
                Ok(FileOperation::delete(target))
            }
            OperationKind::Move => {
                let (from, to) = target
                    .split_once("->")
                    .map(|(f, t)| (f.trim(), t.trim()))
                    .filter(|(f, t)| !f.is_empty() && !t.is_empty())
                    .ok_or_else(|| self.err(at, ParseFailure::MalformedMove))?;
                self.expect_empty_body(kind)?;
                Ok(FileOperation::rename(from, to))
            }
        }
    }

    /// Add blocks: every content line carries '+'
    fn parse_add_body(&mut self) -> Result<String, ParseError> {
        let mut out: Vec<&str> = Vec::new();
        let mut pending_blank = 0usize;

        while self.i < self.lines.len() && !self.is_marker(self.i) {
            let line = self.line(self.i);
            if let Some(text) = line.strip_prefix('+') {
                // Blank lines between content lines are content too
                out.extend(std::iter::repeat_n("", pending_blank));
                pending_blank = 0;
                out.push(text);
            } else if line.starts_with('-') {
                return Err(self.err(self.i, ParseFailure::RemovalInAdd));
            } else if line.trim().is_empty() {
                pending_blank += 1;
            } else {
                return Err(self.err(self.i, ParseFailure::UntaggedAddLine));
            }
            self.i += 1;
        }

        if out.is_empty() {
            return Ok(String::new());
        }
        let mut content = out.join("\n");
        content.push('\n');
        Ok(content)
    }

    fn expect_empty_body(&mut self, kind: OperationKind) -> Result<(), ParseError> {
        while self.i < self.lines.len() && !self.is_marker(self.i) {
            if !self.line(self.i).trim().is_empty() {
                return Err(self.err(self.i, ParseFailure::UnexpectedBody(kind)));
            }
            self.i += 1;
        }
        Ok(())
    }

    /// Update blocks: `@@ anchor @@` followed by tagged lines
    fn parse_hunks(&mut self) -> Result<Vec<Hunk>, ParseError> {
        let mut hunks = Vec::new();
        // (anchor, lines, header index)
        let mut current: Option<(String, Vec<PatchLine>, usize)> = None;
        let mut pending_blank = 0usize;

        while self.i < self.lines.len() && !self.is_marker(self.i) {
            let line = self.line(self.i);

            if line.starts_with("@@") {
                if let Some(done) = current.take() {
                    hunks.push(self.finish_hunk(done)?);
                }
                pending_blank = 0;
                current = Some((parse_anchor(line), Vec::new(), self.i));
                self.i += 1;
                continue;
            }

            let Some((_, lines, _)) = current.as_mut() else {
                if line.trim().is_empty() {
                    self.i += 1;
                    continue;
                }
                return Err(self.err(self.i, ParseFailure::MissingAnchor));
            };

            if line.is_empty() {
                // Unprefixed blank: context unless it trails the hunk
                pending_blank += 1;
                self.i += 1;
                continue;
            }
            lines.extend(std::iter::repeat_with(|| PatchLine::context("")).take(pending_blank));
            pending_blank = 0;

            let tagged = match line.as_bytes()[0] {
                b'+' => PatchLine::add(&line[1..]),
                b'-' => PatchLine::remove(&line[1..]),
                b' ' => PatchLine::context(&line[1..]),
                _ => PatchLine::context(line),
            };
            lines.push(tagged);
            self.i += 1;
        }

        if let Some(done) = current.take() {
            hunks.push(self.finish_hunk(done)?);
        }
        Ok(hunks)
    }

    fn finish_hunk(&self, (anchor, lines, at): (String, Vec<PatchLine>, usize)) -> Result<Hunk, ParseError> {
        // Pure insertions still need something to anchor on
        if !lines.iter().any(|l| l.tag != LineTag::Add) {
            return Err(self.err(at, ParseFailure::NoAnchorContext));
        }
        Ok(Hunk::new(anchor, lines))
    }
}

/// `@@ def parse_data @@` -> `def parse_data`
fn parse_anchor(line: &str) -> String {
    let rest = line.trim_start_matches("@@").trim();
    rest.strip_suffix("@@").unwrap_or(rest).trim().to_string()
}

impl fmt::Display for PatchDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{BEGIN}")?;
        for op in &self.operations {
            match (&op.kind, &op.move_to) {
                (OperationKind::Move, Some(to)) => {
                    writeln!(f, "{MARKER}{}: {} -> {}", op.kind.marker(), op.path, to)?
                }
                _ => writeln!(f, "{MARKER}{}: {}", op.kind.marker(), op.path)?,
            }
            if let Some(content) = &op.content {
                for line in content.lines() {
                    writeln!(f, "+{line}")?;
                }
            }
            for hunk in &op.hunks {
                if hunk.anchor.is_empty() {
                    writeln!(f, "@@")?;
                } else {
                    writeln!(f, "@@ {} @@", hunk.anchor)?;
                }
                for line in &hunk.lines {
                    let tag = match line.tag {
                        LineTag::Context => ' ',
                        LineTag::Remove => '-',
                        LineTag::Add => '+',
                    };
                    writeln!(f, "{tag}{}", line.text)?;
                }
            }
        }
        writeln!(f, "{END}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CALC: &str = "\
*** Begin Patch
*** Update File: calculator.py
@@ class Calculator @@
 class Calculator:
     def add(self, a, b):
-        pass
+        return a + b

*** Add File: utils.py
+def helper():
+    return 42
*** Delete File: old.py
*** Move File: a.py -> b.py
*** End Patch
";

    fn reason(text: &str) -> (usize, ParseFailure) {
        let err = parse_patch(text).unwrap_err();
        (err.line, err.reason)
    }

    #[test]
    fn parses_all_operation_kinds() {
        let doc = parse_patch(CALC).unwrap();
        let kinds: Vec<_> = doc.operations.iter().map(|o| o.kind).collect();
        assert_eq!(
            kinds,
            [OperationKind::Update, OperationKind::Add, OperationKind::Delete, OperationKind::Move]
        );

        let hunk = &doc.operations[0].hunks[0];
        assert_eq!(hunk.anchor, "class Calculator");
        assert_eq!(
            hunk.pattern(),
            ["class Calculator:", "    def add(self, a, b):", "        pass"]
        );
        assert_eq!(
            hunk.replacement(),
            ["class Calculator:", "    def add(self, a, b):", "        return a + b"]
        );
        assert_eq!(doc.operations[1].content.as_deref(), Some("def helper():\n    return 42\n"));
        assert_eq!(doc.operations[3].move_to.as_deref(), Some("b.py"));
    }

    #[test]
    fn summary_counts_operations_and_hunks() {
        let s = validate_patch(CALC).unwrap();
        assert_eq!(
            s,
            PatchSummary { adds: 1, updates: 1, deletes: 1, moves: 1, hunks: 1 }
        );
    }

    #[test]
    fn multiple_hunks_and_unprefixed_context() {
        let text = "\
*** Begin Patch
*** Update File: m.py
@@ def one @@
def one():
-    return 1
+    return 11
@@ def two @@
 def two():
-    return 2
+    return 22
*** End Patch";
        let doc = parse_patch(text).unwrap();
        let hunks = &doc.operations[0].hunks;
        assert_eq!(hunks.len(), 2);
        assert_eq!(hunks[0].lines[0], PatchLine::context("def one():"));
        assert_eq!(hunks[1].anchor, "def two");
    }

    #[test]
    fn interior_blank_lines_are_context_trailing_are_dropped() {
        let text = "\
*** Begin Patch
*** Update File: m.py
@@ def f @@
 def f():

-    return 1
+    return 2


*** End Patch
";
        let doc = parse_patch(text).unwrap();
        let lines = &doc.operations[0].hunks[0].lines;
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[1], PatchLine::context(""));
    }

    #[test]
    fn rejects_missing_frame() {
        assert_eq!(reason("*** Update File: a\n").1, ParseFailure::MissingBegin);
        assert_eq!(reason("").1, ParseFailure::MissingBegin);
        assert_eq!(
            reason("*** Begin Patch\n*** Delete File: a\n"),
            (2, ParseFailure::MissingEnd)
        );
        assert_eq!(
            reason("*** Begin Patch\n*** Delete File: a\n*** End Patch\nmore\n"),
            (4, ParseFailure::TrailingContent)
        );
        assert_eq!(reason("*** Begin Patch\n*** End Patch\n"), (2, ParseFailure::Empty));
    }

    #[test]
    fn rejects_structural_violations_with_line_numbers() {
        assert_eq!(
            reason("*** Begin Patch\n*** Update File: a.py\n*** End Patch\n"),
            (2, ParseFailure::NoHunks)
        );
        assert_eq!(
            reason("*** Begin Patch\n*** Update File: a.py\n@@ def f @@\n+x = 1\n*** End Patch\n"),
            (3, ParseFailure::NoAnchorContext)
        );
        assert_eq!(
            reason("*** Begin Patch\n*** Add File: a.py\n+ok\n-bad\n*** End Patch\n"),
            (4, ParseFailure::RemovalInAdd)
        );
        assert_eq!(
            reason("*** Begin Patch\n*** Delete File: a.py\n@@ x @@\n*** End Patch\n"),
            (3, ParseFailure::UnexpectedBody(OperationKind::Delete))
        );
        assert_eq!(
            reason("*** Begin Patch\n*** Update File: a.py\n x\n*** End Patch\n"),
            (3, ParseFailure::MissingAnchor)
        );
        assert_eq!(
            reason("*** Begin Patch\n*** Rename File: a.py\n*** End Patch\n"),
            (2, ParseFailure::UnknownMarker("Rename File".into()))
        );
        assert_eq!(
            reason("*** Begin Patch\n*** Move File: a.py\n*** End Patch\n"),
            (2, ParseFailure::MalformedMove)
        );
        assert_eq!(
            reason("*** Begin Patch\n*** Add File:\n*** End Patch\n"),
            (2, ParseFailure::MissingPath)
        );
    }

    #[test]
    fn hunk_with_only_blank_body_has_no_context() {
        assert_eq!(
            reason("*** Begin Patch\n*** Update File: a.py\n@@ f @@\n\n*** End Patch\n"),
            (3, ParseFailure::NoAnchorContext)
        );
    }

    #[test]
    fn extracts_block_from_chatter_and_fences() {
        let raw = "Sure, here is the patch:\n```\n*** Begin Patch\n*** Delete File: x.py\n*** End Patch\n```\nDone.";
        let block = extract_patch_block(raw).unwrap();
        assert_eq!(block, "*** Begin Patch\n*** Delete File: x.py\n*** End Patch");
        assert!(parse_patch(block).is_ok());
        assert!(extract_patch_block("no patch here").is_none());
    }

    #[test]
    fn rendering_parses_back_to_the_same_document() {
        let doc = parse_patch(CALC).unwrap();
        let again = parse_patch(&doc.to_string()).unwrap();
        assert_eq!(doc, again);
    }

    #[test]
    fn parsed_document_snapshot() {
        let doc = parse_patch("*** Begin Patch\n*** Update File: a.py\n@@ def f @@\n def f():\n-    return 1\n+    return 2\n*** End Patch\n").unwrap();
        insta::assert_yaml_snapshot!(doc, @r#"
        operations:
          - kind: update
            path: a.py
            hunks:
              - anchor: def f
                lines:
                  - tag: context
                    text: "def f():"
                  - tag: remove
                    text: "    return 1"
                  - tag: add
                    text: "    return 2"
        "#);
    }
}
