//! Filepath: src/parsers/heuristic.rs
//! Line-pattern scanner usable for any text.
//!
//! Declarations are recognised by per-language regexes; a declaration's
//! extent comes from indentation (Python-like) or brace depth (C-like).
//! Never fails: unrecognised text yields an empty list.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::{
    core::{
        error::ExtractionError,
        symbols::{ByteSpan, Language, RawSymbol, Strategy, SymbolExtractor, SymbolKind},
    },
    infra::line_index::NewlineIndex,
    parsers::docs,
};

struct Rule {
    re: Regex,
    kind: SymbolKind,
}

fn rules(specs: &[(&str, SymbolKind)]) -> Vec<Rule> {
    specs
        .iter()
        .filter_map(|(pattern, kind)| {
            // Patterns are literals below; a bad one is skipped, not fatal
            Regex::new(pattern).ok().map(|re| Rule { re, kind: *kind })
        })
        .collect()
}

static PYTHON: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    rules(&[
        (r"^\s*(?:async\s+)?def\s+(?P<name>[A-Za-z_]\w*)", SymbolKind::Function),
        (r"^\s*class\s+(?P<name>[A-Za-z_]\w*)", SymbolKind::Type),
        (r"^(?P<name>[A-Z][A-Z0-9_]*)\s*(?::[^=]+)?=[^=]", SymbolKind::Constant),
    ])
});

static RUST: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    rules(&[
        (
            r#"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:(?:const|async|unsafe|extern(?:\s+"[^"]*")?)\s+)*fn\s+(?P<name>[A-Za-z_]\w*)"#,
            SymbolKind::Function,
        ),
        (
            r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:struct|enum|union|trait)\s+(?P<name>[A-Za-z_]\w*)",
            SymbolKind::Type,
        ),
        (
            r"^\s*(?:unsafe\s+)?impl(?:\s*<[^{]*?>)?\s+(?:[\w:]+(?:<[^{]*?>)?\s+for\s+)?&?(?:\w+::)*(?P<name>[A-Za-z_]\w*)",
            SymbolKind::Type,
        ),
        (
            r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:const|static)\s+(?:mut\s+)?(?P<name>[A-Z_][A-Z0-9_]*)\s*:",
            SymbolKind::Constant,
        ),
    ])
});

static GO: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    rules(&[
        (r"^func\s+\([^)]*\)\s*(?P<name>[A-Za-z_]\w*)", SymbolKind::Method),
        (r"^func\s+(?P<name>[A-Za-z_]\w*)", SymbolKind::Function),
        (r"^type\s+(?P<name>[A-Za-z_]\w*)\s+(?:struct|interface)", SymbolKind::Type),
        (r"^const\s+(?P<name>[A-Za-z_]\w*)\s*=", SymbolKind::Constant),
    ])
});

static JS: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    rules(&[
        (
            r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*(?P<name>[A-Za-z_$][\w$]*)",
            SymbolKind::Function,
        ),
        (
            r"^\s*(?:export\s+)?(?:const|let|var)\s+(?P<name>[A-Za-z_$][\w$]*)\s*(?::[^=]+)?=\s*(?:async\s+)?(?:\([^)]*\)|[A-Za-z_$][\w$]*)\s*(?::[^=]+)?=>",
            SymbolKind::Function,
        ),
        (
            r"^\s*(?:export\s+)?(?:default\s+)?(?:abstract\s+)?(?:class|interface|enum)\s+(?P<name>[A-Za-z_$][\w$]*)",
            SymbolKind::Type,
        ),
        (
            r"^\s+(?:(?:public|private|protected|static|async|override|readonly)\s+)*(?P<name>[A-Za-z_$][\w$]*)\s*\([^)]*\)\s*(?::[^{]*)?\{",
            SymbolKind::Function,
        ),
    ])
});

static CPP: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    rules(&[
        (r"^\s*(?:class|struct)\s+(?P<name>[A-Za-z_]\w*)[^;]*$", SymbolKind::Type),
        (
            r"^\s*(?:[\w:<>,\*&~]+\s+)+[\*&]*(?P<name>[A-Za-z_~][\w:~]*)\s*\([^;]*$",
            SymbolKind::Function,
        ),
    ])
});

static GENERIC: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    rules(&[
        (r"^\s*(?:function|func|fn|sub|proc)\s+(?P<name>[A-Za-z_]\w*)", SymbolKind::Function),
        (r"(?:def|void|int|bool|string)\s+(?P<name>\w+)\s*\(", SymbolKind::Function),
        (r"class\s+(?P<name>\w+)\s*[\(:{]", SymbolKind::Type),
    ])
});

/// Control-flow words that look like calls to the C-like patterns
const NOT_NAMES: &[&str] = &[
    "if", "for", "while", "switch", "catch", "return", "else", "do", "sizeof", "new", "delete", "function",
];

fn rules_for(lang: Language) -> &'static [Rule] {
    match lang {
        Language::Python => &PYTHON,
        Language::Rust => &RUST,
        Language::Go => &GO,
        Language::JavaScript | Language::TypeScript | Language::Tsx => &JS,
        Language::Cpp => &CPP,
        Language::Unknown => &GENERIC,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Indent,
    Brace,
}

/// Regex and block-shape scanner
#[derive(Debug, Default)]
pub struct HeuristicExtractor;

impl HeuristicExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl SymbolExtractor for HeuristicExtractor {
    fn strategy(&self) -> Strategy {
        Strategy::Heuristic
    }

    fn supports(&self, _lang: Language) -> bool {
        true
    }

    fn extract(&self, content: &str, lang: Language) -> Result<Vec<RawSymbol>, ExtractionError> {
        let scanner = Scanner::new(content, lang);
        let out = scanner.scan();
        debug!(symbols = out.len(), %lang, "heuristic scan complete");
        Ok(out)
    }
}

struct Scanner<'a> {
    src: &'a str,
    lang: Language,
    /// (start byte, text without terminator) per line
    lines: Vec<(usize, &'a str)>,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str, lang: Language) -> Self {
        let index = NewlineIndex::build(src.as_bytes());
        let bytes = src.as_bytes();
        let lines = (1..=index.line_count())
            .filter_map(|l| {
                let s = index.start_byte_of_line(l)?;
                let e = index.end_byte_of_line(l, bytes)?;
                Some((s, src.get(s..e)?))
            })
            .collect();
        Self { src, lang, lines }
    }

    fn scan(&self) -> Vec<RawSymbol> {
        let rules = rules_for(self.lang);
        let mut out = Vec::new();

        for (i, &(start, text)) in self.lines.iter().enumerate() {
            if self.is_comment(text) {
                continue;
            }
            let Some((kind, name, name_col)) = rules.iter().find_map(|r| {
                let caps = r.re.captures(text)?;
                let m = caps.name("name")?;
                Some((r.kind, m.as_str(), m.start()))
            }) else {
                continue;
            };

            let name = name.rsplit("::").next().unwrap_or(name);
            if NOT_NAMES.contains(&name) {
                continue;
            }

            let Some(last) = self.block_end(i, self.shape(text)) else {
                continue;
            };
            let first = self.extend_upwards(i);
            let end = self.lines[last].0 + self.lines[last].1.len();

            out.push(
                RawSymbol::new(name, kind, ByteSpan::new(self.lines[first].0, end))
                    .with_name_at(start + name_col)
                    .with_doc(self.doc(first, i)),
            );
        }

        out
    }

    fn shape(&self, decl: &str) -> Shape {
        match self.lang {
            Language::Python => Shape::Indent,
            Language::Unknown if decl.trim_end().ends_with(':') => Shape::Indent,
            _ => Shape::Brace,
        }
    }

    fn is_comment(&self, text: &str) -> bool {
        let t = text.trim_start();
        if self.lang.is_indent_scoped() {
            return t.starts_with('#');
        }
        t.starts_with("//") || t.starts_with("/*") || t.starts_with('*')
    }

    /// Index of the last line belonging to the declaration at `i`.
    /// None for brace languages when the line is only a prototype.
    fn block_end(&self, i: usize, shape: Shape) -> Option<usize> {
        match shape {
            Shape::Indent => Some(self.indent_end(i)),
            Shape::Brace => self.brace_end(i),
        }
    }

    fn indent_end(&self, i: usize) -> usize {
        let base = indent_of(self.lines[i].1);

        let (header_end, inline_body) = self.header_end(i);
        if inline_body {
            return header_end;
        }

        let mut last = header_end;
        for j in header_end + 1..self.lines.len() {
            let text = self.lines[j].1;
            if text.trim().is_empty() {
                continue;
            }
            if indent_of(text) <= base {
                break;
            }
            last = j;
        }
        last
    }

    /// Last line of the header starting at `i`, and whether a statement
    /// follows its colon on that line (`def f(): return 1`).
    /// Headers only continue while brackets are open or a line ends in `\`.
    fn header_end(&self, i: usize) -> (usize, bool) {
        let mut depth = 0i32;

        for j in i..self.lines.len().min(i + 10) {
            let text = self.lines[j].1;
            let mut quote: Option<char> = None;
            let mut escaped = false;

            for (k, c) in text.char_indices() {
                if let Some(q) = quote {
                    match c {
                        _ if escaped => escaped = false,
                        '\\' => escaped = true,
                        _ if c == q => quote = None,
                        _ => {}
                    }
                    continue;
                }
                match c {
                    '"' | '\'' => quote = Some(c),
                    '#' => break,
                    '(' | '[' | '{' => depth += 1,
                    ')' | ']' | '}' => depth -= 1,
                    ':' if depth <= 0 => {
                        let rest = text[k + 1..].trim();
                        return (j, !rest.is_empty() && !rest.starts_with('#'));
                    }
                    _ => {}
                }
            }

            if depth <= 0 && !text.trim_end().ends_with('\\') {
                return (j, false);
            }
        }
        (i, false)
    }

    fn brace_end(&self, i: usize) -> Option<usize> {
        let mut depth = 0i32;
        let mut opened = false;

        for j in i..self.lines.len() {
            let chars: Vec<char> = self.lines[j].1.chars().collect();
            let mut k = 0usize;
            let mut in_str = false;

            while k < chars.len() {
                let c = chars[k];
                if in_str {
                    match c {
                        '\\' => k += 1,
                        '"' => in_str = false,
                        _ => {}
                    }
                    k += 1;
                    continue;
                }
                match c {
                    '"' => in_str = true,
                    // Char literals like '{' but not lifetimes like 'a
                    '\'' if chars.get(k + 2) == Some(&'\'') => k += 2,
                    '/' if chars.get(k + 1) == Some(&'/') => break,
                    ';' if !opened && depth == 0 => {
                        // `fn f();` or a C prototype: single-line symbol at most
                        return (self.lang == Language::Rust).then_some(j);
                    }
                    '{' => {
                        depth += 1;
                        opened = true;
                    }
                    '}' => {
                        depth -= 1;
                        if opened && depth <= 0 {
                            return Some(j);
                        }
                    }
                    _ => {}
                }
                k += 1;
            }

            // Give up on declarations whose body never opens
            if !opened && j >= i + 3 {
                return Some(i);
            }
        }

        // Unbalanced braces run to the end of the text
        Some(if opened { self.lines.len() - 1 } else { i })
    }

    /// Pull decorators and attributes above the declaration into its span
    fn extend_upwards(&self, i: usize) -> usize {
        let mut first = i;
        while first > 0 {
            let t = self.lines[first - 1].1.trim_start();
            let attached = match self.lang {
                Language::Python => t.starts_with('@'),
                Language::Rust => t.starts_with("#["),
                Language::Cpp => t.starts_with("template"),
                Language::JavaScript | Language::TypeScript | Language::Tsx => t.starts_with('@'),
                _ => false,
            };
            if !attached {
                break;
            }
            first -= 1;
        }
        first
    }

    fn doc(&self, first: usize, decl: usize) -> Option<String> {
        if self.lang == Language::Python {
            if let Some(d) = self.python_docstring(decl) {
                return Some(d);
            }
        }

        // Contiguous comment block directly above
        let mut top = first;
        while top > 0 && self.is_comment(self.lines[top - 1].1) && !self.lines[top - 1].1.trim().is_empty() {
            top -= 1;
        }
        if top == first {
            return None;
        }
        let block = self.lines[top..first].iter().map(|(_, t)| *t).collect::<Vec<_>>().join("\n");
        Some(docs::strip_comment_markers(&block))
    }

    fn python_docstring(&self, decl: usize) -> Option<String> {
        let header_end = (decl..self.lines.len().min(decl + 10))
            .find(|&j| self.lines[j].1.trim_end().ends_with(':'))?;
        let first = (header_end + 1..self.lines.len()).find(|&j| !self.lines[j].1.trim().is_empty())?;
        let t = self.lines[first].1.trim();
        let quote = ["\"\"\"", "'''"]
            .into_iter()
            .find(|q| t.trim_start_matches(['r', 'R', 'u', 'U']).starts_with(q))?;

        // Find the closing quote, possibly on the same line
        let opening = t.find(quote)? + quote.len();
        let close = if t[opening..].contains(quote) {
            first
        } else {
            (first + 1..self.lines.len()).find(|&j| self.lines[j].1.contains(quote))?
        };
        let (s, _) = self.lines[first];
        let (ls, lt) = self.lines[close];
        let raw = self.src.get(s..ls + lt.len())?;
        Some(docs::unquote_python_string(raw))
    }
}

fn indent_of(text: &str) -> usize {
    text.len() - text.trim_start().len()
}
