//! Filepath: src/core/select.rs
//! Relevance scoring and budgeted section selection.
//!
//! Symbols are scored against task keywords, taken greedily by score,
//! widened by a few surrounding lines, and merged so that no line is
//! counted twice against the budget.

use std::{cmp::Ordering, collections::HashSet, sync::LazyLock};

use itertools::Itertools;
use regex::Regex;
use serde::Serialize;

use crate::{
    core::symbols::{ByteSpan, Symbol},
    infra::line_index::NewlineIndex,
};

static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Za-z0-9_]+").expect("literal regex"));

const STOPWORDS: &[&str] = &[
    "add", "create", "update", "modify", "write", "implement", "function", "class", "method", "file", "code", "to",
    "the", "a", "an", "with", "for", "in", "that", "is", "and", "or", "of", "from", "by", "at", "on",
];

const NAME_WEIGHT: f64 = 3.0;
const DECLARATION_WEIGHT: f64 = 2.0;
const DOC_WEIGHT: f64 = 1.0;

/// How the sections of a context were chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextMode {
    /// Budgeted sections around matching symbols
    Selected,
    /// Nothing matched; the leading lines stand in
    NoMatch,
    /// Below the small-file threshold; the whole file, no budget
    WholeFile,
    /// Target does not exist yet
    NewFile,
}

/// One contiguous slice of the file handed to the generator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelevantSection {
    pub span: ByteSpan,
    /// 1-based inclusive lines
    pub start_line: usize,
    pub end_line: usize,
    pub text: String,
    pub score: f64,
    /// Index into the symbol list of the best symbol in this section
    pub symbol: Option<usize>,
    /// Cut to fit the budget
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectOptions {
    pub budget_lines: usize,
    pub surrounding_lines: usize,
    pub header_lines: usize,
}

impl Default for SelectOptions {
    fn default() -> Self {
        Self {
            budget_lines: 50,
            surrounding_lines: 3,
            header_lines: 25,
        }
    }
}

/// Sections in reading order plus bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Selection {
    pub mode: ContextMode,
    pub sections: Vec<RelevantSection>,
    pub selected_lines: usize,
}

/// Lowercased task keywords, stopwords and short words removed.
/// Identifiers also contribute their snake_case and camelCase parts.
pub fn task_keywords(task: &str) -> Vec<String> {
    WORD.find_iter(task)
        .flat_map(|m| {
            let word = m.as_str();
            std::iter::once(word.to_lowercase()).chain(split_identifier(word))
        })
        .filter(|w| w.len() > 2 && !STOPWORDS.contains(&w.as_str()))
        .unique()
        .collect()
}

/// `parseData_v2` -> `parse`, `data`, `v2`
fn split_identifier(word: &str) -> Vec<String> {
    let mut parts = Vec::new();
    for chunk in word.split('_').filter(|c| !c.is_empty()) {
        let mut cur = String::new();
        let mut prev_lower = false;
        for c in chunk.chars() {
            if c.is_uppercase() && prev_lower && !cur.is_empty() {
                parts.push(std::mem::take(&mut cur).to_lowercase());
            }
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
            cur.push(c);
        }
        if !cur.is_empty() {
            parts.push(cur.to_lowercase());
        }
    }
    parts
}

fn token_set(text: &str) -> HashSet<String> {
    WORD.find_iter(text)
        .flat_map(|m| std::iter::once(m.as_str().to_lowercase()).chain(split_identifier(m.as_str())))
        .collect()
}

/// Weighted keyword overlap with name, declaration line and docs
pub fn score_symbol(symbol: &Symbol, keywords: &[String]) -> f64 {
    let name = token_set(&symbol.name);
    let declaration = token_set(&symbol.declaration);
    let doc = symbol.doc.as_deref().map(token_set).unwrap_or_default();

    keywords
        .iter()
        .map(|k| {
            let mut s = 0.0;
            if name.contains(k) {
                s += NAME_WEIGHT;
            }
            if declaration.contains(k) {
                s += DECLARATION_WEIGHT;
            }
            if doc.contains(k) {
                s += DOC_WEIGHT;
            }
            s
        })
        .sum()
}

/// Pick sections of `content` for `keywords` within the line budget
pub fn select(symbols: &[Symbol], content: &str, keywords: &[String], opts: &SelectOptions) -> Selection {
    let index = NewlineIndex::build(content.as_bytes());
    let total = index.line_count();
    // A zero budget still shows one line of the best match
    let budget = opts.budget_lines.max(1);

    let mut ranked: Vec<(usize, f64)> = symbols
        .iter()
        .enumerate()
        .map(|(i, s)| (i, score_symbol(s, keywords)))
        .filter(|(_, score)| *score > 0.0)
        .collect();
    ranked.sort_by(|a, b| {
        let (sa, sb) = (&symbols[a.0], &symbols[b.0]);
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then(sa.depth.cmp(&sb.depth))
            .then(sa.span.start.cmp(&sb.span.start))
    });

    if ranked.is_empty() {
        let end = opts.header_lines.min(budget).min(total);
        let sections = (end > 0)
            .then(|| section(content, &index, 1, end, 0.0, None, false))
            .into_iter()
            .collect();
        return Selection {
            mode: ContextMode::NoMatch,
            sections,
            selected_lines: end,
        };
    }

    // (first, last, score, symbol, truncated), 1-based inclusive
    let mut picked: Vec<(usize, usize, f64, usize, bool)> = Vec::new();
    let mut covered = vec![false; total + 1];
    let mut used = 0usize;

    for (i, score) in ranked {
        let sym = &symbols[i];
        let first = sym.start_line.saturating_sub(opts.surrounding_lines).max(1);
        let mut last = (sym.end_line + opts.surrounding_lines).min(total);
        let fresh = (first..=last).filter(|&l| !covered[l]).count();
        let mut truncated = false;

        if used + fresh > budget {
            // The best match always survives, cut to the budget
            if !picked.is_empty() {
                break;
            }
            last = first + budget - 1;
            truncated = true;
        }

        for l in first..=last {
            if !covered[l] {
                covered[l] = true;
                used += 1;
            }
        }
        picked.push((first, last, score, i, truncated));
        if truncated {
            break;
        }
    }

    // Merge overlapping or touching ranges; the best score names the section
    picked.sort_by_key(|p| p.0);
    let mut merged: Vec<(usize, usize, f64, usize, bool)> = Vec::new();
    for p in picked {
        match merged.last_mut() {
            Some(m) if p.0 <= m.1 + 1 => {
                m.1 = m.1.max(p.1);
                m.4 |= p.4;
                if p.2 > m.2 {
                    m.2 = p.2;
                    m.3 = p.3;
                }
            }
            _ => merged.push(p),
        }
    }

    let sections = merged
        .into_iter()
        .map(|(first, last, score, sym, truncated)| section(content, &index, first, last, score, Some(sym), truncated))
        .collect();

    Selection {
        mode: ContextMode::Selected,
        sections,
        selected_lines: used,
    }
}

/// Section covering whole lines `first..=last`
pub fn section(
    content: &str,
    index: &NewlineIndex,
    first: usize,
    last: usize,
    score: f64,
    symbol: Option<usize>,
    truncated: bool,
) -> RelevantSection {
    let bytes = content.as_bytes();
    let start = index.start_byte_of_line(first).unwrap_or(0);
    let end = index.end_byte_of_line(last, bytes).unwrap_or(content.len());
    RelevantSection {
        span: ByteSpan::new(start, end),
        start_line: first,
        end_line: last,
        text: content.get(start..end).unwrap_or_default().to_string(),
        score,
        symbol,
        truncated,
    }
}
