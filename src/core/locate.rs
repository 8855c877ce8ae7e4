//! Filepath: src/core/locate.rs
//! Hunk location and application over immutable file text.
//!
//! Each hunk is located by exact, then whitespace-tolerant, then
//! anchor-scoped matching; the first strategy with a single hit wins.
//! Every edit returns a new `FileText`, so later hunks always match
//! against the output of earlier ones.

use std::{collections::HashSet, fmt, sync::LazyLock};

use regex::Regex;
use serde::Serialize;
use tracing::trace;

use crate::core::{
    error::{MatchError, MatchFailure},
    index::SymbolIndexer,
    patch::{Hunk, LineTag},
    symbols::{ByteSpan, Language, Symbol},
};

/// Lines scanned after an anchor line when no symbol carries the anchor
const ANCHOR_WINDOW: usize = 100;

/// Suggestion previews are capped unless diagnostics are verbose
const PREVIEW_LINES: usize = 5;

static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\w+").expect("literal regex"));
static IDENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").expect("literal regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineEnding {
    Lf,
    Crlf,
}

impl LineEnding {
    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::Crlf => "\r\n",
        }
    }
}

/// File content as lines, each remembering its own terminator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileText {
    lines: Vec<String>,
    /// Terminator after each line; nominal for an unterminated last line
    endings: Vec<LineEnding>,
    final_newline: bool,
}

impl FileText {
    pub fn parse(content: &str) -> Self {
        let mut lines = Vec::new();
        let mut endings = Vec::new();

        for segment in content.split_inclusive('\n') {
            let (text, ending) = match segment.strip_suffix('\n') {
                Some(body) => match body.strip_suffix('\r') {
                    Some(text) => (text, LineEnding::Crlf),
                    None => (body, LineEnding::Lf),
                },
                // Unterminated last line borrows the style above it
                None => (segment, endings.last().copied().unwrap_or(LineEnding::Lf)),
            };
            lines.push(text.to_string());
            endings.push(ending);
        }

        Self {
            lines,
            endings,
            final_newline: content.ends_with('\n'),
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Terminator of the 0-based line `i`
    pub fn ending_at(&self, i: usize) -> Option<LineEnding> {
        self.endings.get(i).copied()
    }

    /// Back to a string, every line with its own terminator
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.lines.iter().map(|l| l.len() + 2).sum());
        let last = self.lines.len().saturating_sub(1);
        for (i, (line, ending)) in self.lines.iter().zip(&self.endings).enumerate() {
            out.push_str(line);
            if i < last || self.final_newline {
                out.push_str(ending.as_str());
            }
        }
        out
    }

    /// New text with `len` lines at `start` replaced by `with`
    pub fn splice(&self, start: usize, len: usize, with: Vec<(String, LineEnding)>) -> Self {
        let end = (start + len).min(self.lines.len());
        let mut lines = Vec::with_capacity(self.lines.len() + with.len());
        let mut endings = Vec::with_capacity(lines.capacity());

        lines.extend_from_slice(&self.lines[..start]);
        endings.extend_from_slice(&self.endings[..start]);
        for (line, ending) in with {
            lines.push(line);
            endings.push(ending);
        }
        lines.extend_from_slice(&self.lines[end..]);
        endings.extend_from_slice(&self.endings[end..]);

        Self {
            // Empty files gain a terminated last line
            final_newline: self.final_newline || self.lines.is_empty(),
            lines,
            endings,
        }
    }

    /// Byte span of lines `[start, start + len)` in `render()` output,
    /// without the terminator of the last line
    pub fn byte_span(&self, start: usize, len: usize) -> ByteSpan {
        let offset = |line: usize| -> usize {
            self.lines[..line]
                .iter()
                .zip(&self.endings)
                .map(|(l, e)| l.len() + e.as_str().len())
                .sum()
        };
        let s = offset(start.min(self.lines.len()));
        let end_line = (start + len).min(self.lines.len());
        let e = if end_line > start { offset(end_line) - self.endings[end_line - 1].as_str().len() } else { s };
        ByteSpan::new(s, e)
    }
}

/// Matching step that located a hunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    Exact,
    Fuzzy,
    AnchorScoped,
}

impl fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MatchStrategy::Exact => "exact",
            MatchStrategy::Fuzzy => "fuzzy",
            MatchStrategy::AnchorScoped => "anchor_scoped",
        })
    }
}

/// Candidate location offered when a hunk fails
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub span: ByteSpan,
    /// 1-based inclusive lines
    pub start_line: usize,
    pub end_line: usize,
    /// Token-overlap ratio in `[0, 1]`
    pub score: f64,
    pub preview: String,
}

/// Where and how one hunk landed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HunkOutcome {
    pub strategy: MatchStrategy,
    /// Span of the post-image in the edited content
    pub span: ByteSpan,
    /// 1-based first line of the post-image
    pub start_line: usize,
}

/// Tuning knobs for location and diagnostics
#[derive(Debug, Clone, Copy)]
pub struct LocateOptions {
    pub suggestion_limit: usize,
    pub min_similarity: f64,
    pub verbose: bool,
}

impl Default for LocateOptions {
    fn default() -> Self {
        Self {
            suggestion_limit: 3,
            min_similarity: 0.0,
            verbose: false,
        }
    }
}

/// Locates and applies hunks for one file
pub struct Locator<'a> {
    indexer: &'a SymbolIndexer,
    language: Language,
    options: LocateOptions,
}

impl<'a> Locator<'a> {
    pub fn new(indexer: &'a SymbolIndexer, language: Language, options: LocateOptions) -> Self {
        Self {
            indexer,
            language,
            options,
        }
    }

    /// Apply `hunks` in order; each sees the previous one's output.
    /// Stops at the first hunk that cannot be placed.
    pub fn apply_hunks(&self, text: FileText, hunks: &[Hunk]) -> Result<(FileText, Vec<HunkOutcome>), MatchError> {
        hunks
            .iter()
            .enumerate()
            .try_fold((text, Vec::with_capacity(hunks.len())), |(text, mut done), (i, hunk)| {
                let (next, outcome) = self.apply_hunk(&text, hunk, i + 1)?;
                done.push(outcome);
                Ok((next, done))
            })
    }

    /// Locate one hunk and return the edited text
    pub fn apply_hunk(&self, text: &FileText, hunk: &Hunk, number: usize) -> Result<(FileText, HunkOutcome), MatchError> {
        let (start, strategy) = self.locate(text, hunk, number)?;
        let pattern_len = hunk.pattern().len();

        // Context keeps the file's own text and terminator; additions take
        // the patch text and the terminator of the line above them
        let mut above = start.checked_sub(1).and_then(|i| text.ending_at(i));
        let mut k = start;
        let mut post = Vec::with_capacity(hunk.lines.len());
        for line in &hunk.lines {
            match line.tag {
                LineTag::Context => {
                    let ending = text.endings[k];
                    post.push((text.lines[k].clone(), ending));
                    above = Some(ending);
                    k += 1;
                }
                LineTag::Remove => k += 1,
                LineTag::Add => {
                    let ending = above.or_else(|| text.ending_at(start)).unwrap_or(LineEnding::Lf);
                    post.push((line.text.clone(), ending));
                    above = Some(ending);
                }
            }
        }

        let post_len = post.len();
        let next = text.splice(start, pattern_len, post);
        trace!(hunk = number, %strategy, line = start + 1, "hunk applied");
        let outcome = HunkOutcome {
            strategy,
            span: next.byte_span(start, post_len),
            start_line: start + 1,
        };
        Ok((next, outcome))
    }

    /// Zero-based start line of the hunk's pattern
    fn locate(&self, text: &FileText, hunk: &Hunk, number: usize) -> Result<(usize, MatchStrategy), MatchError> {
        let pattern = hunk.pattern();
        let all = 0..text.line_count();
        let mut tried = Vec::with_capacity(3);

        tried.push(MatchStrategy::Exact);
        let exact = exact_hits(text.lines(), &pattern, all.clone());
        trace!(hunk = number, hits = exact.len(), "exact match");
        if let [only] = exact[..] {
            return Ok((only, MatchStrategy::Exact));
        }

        tried.push(MatchStrategy::Fuzzy);
        let fuzzy = fuzzy_hits(text.lines(), &pattern, all);
        trace!(hunk = number, hits = fuzzy.len(), "fuzzy match");
        if let [only] = fuzzy[..] {
            return Ok((only, MatchStrategy::Fuzzy));
        }

        let mut scoped = Vec::new();
        if !hunk.anchor.trim().is_empty() {
            tried.push(MatchStrategy::AnchorScoped);
            for range in self.anchor_scopes(text, &hunk.anchor) {
                let mut hits = exact_hits(text.lines(), &pattern, range.clone());
                if hits.is_empty() {
                    hits = fuzzy_hits(text.lines(), &pattern, range);
                }
                for h in hits {
                    if !scoped.contains(&h) {
                        scoped.push(h);
                    }
                }
            }
            scoped.sort_unstable();
            trace!(hunk = number, hits = scoped.len(), "anchor-scoped match");
            if let [only] = scoped[..] {
                return Ok((only, MatchStrategy::AnchorScoped));
            }
        }

        // Report the narrowest tied set
        let tied = [scoped, fuzzy, exact].into_iter().find(|h| h.len() > 1);
        if let Some(tied) = tied {
            let failure = MatchFailure::Ambiguous { candidates: tied.len() };
            return Err(self.failure(text, hunk, number, failure, tried, tied));
        }

        // Post-image with its additions present: the edit was already made
        let replacement = hunk.replacement();
        if hunk.adds_lines() {
            let present = fuzzy_hits(text.lines(), &replacement, 0..text.line_count());
            if present.len() == 1 {
                return Err(self.failure(text, hunk, number, MatchFailure::AlreadyApplied, tried, present));
            }
        }

        Err(self.failure(text, hunk, number, MatchFailure::NotFound, tried, Vec::new()))
    }

    /// Line ranges of the symbols the anchor names, best ones only
    fn anchor_scopes(&self, text: &FileText, anchor: &str) -> Vec<std::ops::Range<usize>> {
        let tokens: HashSet<&str> = IDENT.find_iter(anchor).map(|m| m.as_str()).collect();
        let content = text.render();
        let symbols = self.indexer.index(&content, self.language).symbols;

        let scored: Vec<(usize, &Symbol)> = symbols
            .iter()
            .filter(|s| tokens.contains(s.name.as_str()))
            .map(|s| (chain_score(&symbols, s, &tokens), s))
            .collect();

        if let Some(best) = scored.iter().map(|(score, _)| *score).max() {
            return scored
                .iter()
                .filter(|(score, _)| *score == best)
                .map(|(_, s)| s.start_line.saturating_sub(1)..s.end_line.min(text.line_count()))
                .collect();
        }

        // No symbol carries the anchor: scan after lines that contain it
        let needle = normalize(anchor);
        text.lines()
            .iter()
            .enumerate()
            .filter(|(_, l)| normalize(l).contains(&needle))
            .map(|(i, _)| i..(i + ANCHOR_WINDOW).min(text.line_count()))
            .collect()
    }

    fn failure(
        &self,
        text: &FileText,
        hunk: &Hunk,
        number: usize,
        failure: MatchFailure,
        tried: Vec<MatchStrategy>,
        candidates: Vec<usize>,
    ) -> MatchError {
        let pattern = hunk.pattern();
        let window = match failure {
            MatchFailure::AlreadyApplied => hunk.replacement().len(),
            _ => pattern.len(),
        };

        let suggestions = if candidates.is_empty() {
            self.similar_windows(text, &pattern)
        } else {
            candidates
                .into_iter()
                .take(self.options.suggestion_limit)
                .map(|start| {
                    let end = (start + window).min(text.line_count());
                    self.suggestion(text, start, window, similarity(&pattern, &text.lines()[start..end]))
                })
                .collect()
        };

        MatchError {
            hunk: number,
            anchor: hunk.anchor.clone(),
            failure,
            tried,
            suggestions,
        }
    }

    /// Top-k windows of the pattern's height by token overlap
    fn similar_windows(&self, text: &FileText, pattern: &[&str]) -> Vec<Suggestion> {
        let n = pattern.len();
        if n == 0 || text.line_count() < n {
            return Vec::new();
        }
        let wanted = token_set(pattern.iter().copied());

        let mut scored: Vec<(usize, f64)> = (0..=text.line_count() - n)
            .map(|i| (i, jaccard(&wanted, &token_set(text.lines()[i..i + n].iter().map(String::as_str)))))
            .filter(|(_, score)| *score > self.options.min_similarity)
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        scored
            .into_iter()
            .take(self.options.suggestion_limit)
            .map(|(i, score)| self.suggestion(text, i, n, score))
            .collect()
    }

    fn suggestion(&self, text: &FileText, start: usize, len: usize, score: f64) -> Suggestion {
        let end = (start + len).min(text.line_count());
        let shown = if self.options.verbose { end } else { end.min(start + PREVIEW_LINES) };
        Suggestion {
            span: text.byte_span(start, end - start),
            start_line: start + 1,
            end_line: end,
            score,
            preview: text.lines()[start..shown].join("\n"),
        }
    }
}

/// Names along the ancestor chain that the anchor mentions
fn chain_score(symbols: &[Symbol], sym: &Symbol, tokens: &HashSet<&str>) -> usize {
    let mut score = 0;
    let mut cur = Some(sym);
    while let Some(s) = cur {
        if tokens.contains(s.name.as_str()) {
            score += 1;
        }
        cur = s.parent.and_then(|p| symbols.get(p));
    }
    score
}

fn exact_hits(lines: &[String], pattern: &[&str], range: std::ops::Range<usize>) -> Vec<usize> {
    windows(range, pattern.len())
        .filter(|&i| lines[i..i + pattern.len()].iter().zip(pattern).all(|(a, b)| a == b))
        .collect()
}

fn fuzzy_hits(lines: &[String], pattern: &[&str], range: std::ops::Range<usize>) -> Vec<usize> {
    let wanted: Vec<String> = pattern.iter().map(|l| normalize(l)).collect();
    windows(range, pattern.len())
        .filter(|&i| lines[i..i + wanted.len()].iter().zip(&wanted).all(|(a, b)| normalize(a) == *b))
        .collect()
}

/// Start lines of every `len`-line window inside `range`
fn windows(range: std::ops::Range<usize>, len: usize) -> impl Iterator<Item = usize> {
    let last = if len == 0 || range.end < range.start + len { None } else { Some(range.end - len) };
    last.into_iter().flat_map(move |last| range.start..=last)
}

/// Whitespace-insensitive form of a line: runs collapse to one space
pub fn normalize(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Token-overlap ratio between a pattern and a window
pub fn similarity(pattern: &[&str], window: &[String]) -> f64 {
    jaccard(
        &token_set(pattern.iter().copied()),
        &token_set(window.iter().map(String::as_str)),
    )
}

fn token_set<'t>(lines: impl Iterator<Item = &'t str>) -> HashSet<&'t str> {
    lines.flat_map(|l| WORD.find_iter(l).map(|m| m.as_str())).collect()
}

fn jaccard(a: &HashSet<&str>, b: &HashSet<&str>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 1.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        index::StrategyChain,
        patch::{Hunk, PatchLine},
        symbols::Strategy,
    };

    fn indexer() -> SymbolIndexer {
        SymbolIndexer::new(StrategyChain::preferred(Strategy::Grammar))
    }

    fn apply(src: &str, hunk: Hunk) -> Result<(String, HunkOutcome), MatchError> {
        let ix = indexer();
        let loc = Locator::new(&ix, Language::Python, LocateOptions::default());
        loc.apply_hunk(&FileText::parse(src), &hunk, 1)
            .map(|(t, o)| (t.render(), o))
    }

    #[test]
    fn file_text_round_trips_endings() {
        for src in ["", "a", "a\n", "a\r\nb\r\n", "a\n\n", "\n", "a\r\nb\nc", "a\r"] {
            assert_eq!(FileText::parse(src).render(), src);
        }
        let crlf = FileText::parse("x\r\ny\r\n").splice(1, 1, vec![("z".into(), LineEnding::Crlf), ("w".into(), LineEnding::Crlf)]);
        assert_eq!(crlf.render(), "x\r\nz\r\nw\r\n");
        assert_eq!(crlf.byte_span(1, 2), ByteSpan::new(3, 7));
    }

    #[test]
    fn exact_match_replaces_and_keeps_file_context() {
        let src = "def f():\n    x = 1\n    return x\n";
        let hunk = Hunk::new(
            "def f",
            vec![PatchLine::context("    x = 1"), PatchLine::remove("    return x"), PatchLine::add("    return x + 1")],
        );
        let (out, outcome) = apply(src, hunk).unwrap();
        assert_eq!(out, "def f():\n    x = 1\n    return x + 1\n");
        assert_eq!(outcome.strategy, MatchStrategy::Exact);
        assert_eq!(outcome.start_line, 2);
        assert_eq!(&out[outcome.span.start..outcome.span.end], "    x = 1\n    return x + 1");
    }

    #[test]
    fn fuzzy_tolerates_whitespace_only() {
        let src = "def f():\n    x  =  1\t\n    return x\n";
        let ok = Hunk::new("", vec![PatchLine::context("x = 1"), PatchLine::add("    y = 2")]);
        let (out, outcome) = apply(src, ok).unwrap();
        assert_eq!(outcome.strategy, MatchStrategy::Fuzzy);
        // Context keeps the file's spelling
        assert!(out.contains("    x  =  1\t\n    y = 2\n"));

        let substituted = Hunk::new("", vec![PatchLine::context("x = 2"), PatchLine::add("y")]);
        let err = apply(src, substituted).unwrap_err();
        assert_eq!(err.failure, MatchFailure::NotFound);
    }

    #[test]
    fn anchor_scope_disambiguates_repeated_lines() {
        let src = "def a():\n    return 0\n\ndef b():\n    return 0\n";
        let hunk = Hunk::new("def b", vec![PatchLine::remove("    return 0"), PatchLine::add("    return 1")]);
        let (out, outcome) = apply(src, hunk).unwrap();
        assert_eq!(outcome.strategy, MatchStrategy::AnchorScoped);
        assert_eq!(out, "def a():\n    return 0\n\ndef b():\n    return 1\n");
    }

    #[test]
    fn identical_bodies_under_one_anchor_are_ambiguous() {
        let src = "class A:\n    def run(self):\n        go()\n\nclass B:\n    def run(self):\n        go()\n";
        let hunk = Hunk::new("def run", vec![PatchLine::context("        go()"), PatchLine::add("        stop()")]);
        let err = apply(src, hunk).unwrap_err();
        assert_eq!(err.failure, MatchFailure::Ambiguous { candidates: 2 });
        assert_eq!(err.suggestions.len(), 2);
        assert_eq!(err.suggestions[0].score, err.suggestions[1].score);
        assert_eq!(err.tried, [MatchStrategy::Exact, MatchStrategy::Fuzzy, MatchStrategy::AnchorScoped]);
    }

    #[test]
    fn mixed_endings_survive_outside_the_hunk() {
        let src = "a = 1\r\nb = 2\nc = 3\n";
        let hunk = Hunk::new("", vec![PatchLine::remove("c = 3"), PatchLine::add("c = 4")]);
        let (out, _) = apply(src, hunk).unwrap();
        assert_eq!(out, "a = 1\r\nb = 2\nc = 4\n");

        // Insertions follow the line above them
        let src = "a = 1\nb = 2\r\nc = 3\n";
        let hunk = Hunk::new("", vec![PatchLine::context("b = 2"), PatchLine::add("b2 = 0")]);
        let (out, outcome) = apply(src, hunk).unwrap();
        assert_eq!(out, "a = 1\nb = 2\r\nb2 = 0\r\nc = 3\n");
        assert_eq!(&out[outcome.span.start..outcome.span.end], "b = 2\r\nb2 = 0");
    }

    #[test]
    fn reapplying_an_insertion_is_reported() {
        let src = "def f():\n    return x\n";
        let hunk = Hunk::new(
            "def f",
            vec![PatchLine::context("def f():"), PatchLine::add("    x = 1"), PatchLine::context("    return x")],
        );
        let (once, _) = apply(src, hunk.clone()).unwrap();
        let err = apply(&once, hunk).unwrap_err();
        assert_eq!(err.failure, MatchFailure::AlreadyApplied);
    }

    #[test]
    fn insertion_matching_the_next_line_still_applies() {
        let src = "x = compute()\nprint(x)\nprint(x)\n";
        let hunk = Hunk::new("", vec![PatchLine::context("x = compute()"), PatchLine::add("print(x)")]);
        let (out, outcome) = apply(src, hunk).unwrap();
        assert_eq!(out, "x = compute()\nprint(x)\nprint(x)\nprint(x)\n");
        assert_eq!(outcome.strategy, MatchStrategy::Exact);
    }

    #[test]
    fn missing_deletion_target_is_not_found() {
        let src = "def f():\n    y = 1\n    return total\n";
        let hunk = Hunk::new("def f", vec![PatchLine::remove("    x = 1"), PatchLine::context("    return total")]);
        let err = apply(src, hunk).unwrap_err();
        assert_eq!(err.failure, MatchFailure::NotFound);
    }

    #[test]
    fn not_found_ranks_similar_windows() {
        let src = "alpha beta\ngamma delta\nalpha gamma\n";
        let hunk = Hunk::new("", vec![PatchLine::remove("alpha beta gamma")]);
        let err = apply(src, hunk).unwrap_err();
        assert_eq!(err.failure, MatchFailure::NotFound);
        assert_eq!(err.suggestions[0].start_line, 1);
        assert!(err.suggestions.windows(2).all(|w| w[0].score >= w[1].score));
    }
}
