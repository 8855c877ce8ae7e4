//! Filepath: src/parsers/docs.rs
//! Documentation attached to declarations: Python docstrings and
//! comment blocks that directly precede a declaration.

use tree_sitter::Node;

use crate::infra::utils::{TsNodeUtils, Utf8Utils};

/// First-statement string literal of a Python function or class body
pub fn python_docstring(node: Node, src: &str) -> Option<String> {
    let body = node.child_by_field_name("body")?;
    let first = body.named_child(0)?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let lit = first.named_child(0).filter(|n| n.kind() == "string")?;
    Utf8Utils::node_text(src, lit).map(unquote_python_string)
}

/// Strip string prefixes and quotes, then dedent
pub fn unquote_python_string(raw: &str) -> String {
    let s = raw.trim();

    // Legal prefixes are at most two letters (r, u, b, f combos)
    let prefix = s
        .chars()
        .take(2)
        .take_while(|c| matches!(c.to_ascii_lowercase(), 'r' | 'u' | 'b' | 'f'))
        .count();
    let s = &s[prefix..];

    for q in ["\"\"\"", "'''"] {
        if s.len() >= 2 * q.len() && s.starts_with(q) && s.ends_with(q) {
            return dedent(&s[q.len()..s.len() - q.len()]);
        }
    }
    for q in ['"', '\''] {
        if s.len() >= 2 && s.starts_with(q) && s.ends_with(q) {
            return s[1..s.len() - 1].to_string();
        }
    }

    s.to_string()
}

/// Remove the common leading indentation of non-blank lines after the first
pub fn dedent(s: &str) -> String {
    let lines: Vec<&str> = s.lines().collect();

    // PEP 257: the first line is not part of the indentation calculation
    let indent = lines
        .iter()
        .skip(1)
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);

    lines
        .iter()
        .enumerate()
        .map(|(i, l)| {
            if i == 0 {
                l.trim()
            } else {
                l.get(indent..).unwrap_or_else(|| l.trim_start()).trim_end()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Comment siblings immediately above `node`, joined top-down.
/// Attributes and decorators between the comments and the node are skipped.
pub fn leading_comments(node: Node, src: &str) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();
    let mut boundary_row = node.start_position().row;
    let mut cur = node.prev_sibling();

    while let Some(n) = cur {
        // A blank line ends the block
        if last_row(n) + 1 < boundary_row {
            break;
        }
        if TsNodeUtils::is_comment(n) {
            if let Some(text) = Utf8Utils::node_text(src, n) {
                parts.push(strip_comment_markers(text));
            }
        } else if !matches!(n.kind(), "attribute_item" | "decorator") {
            break;
        }
        boundary_row = n.start_position().row;
        cur = n.prev_sibling();
    }

    parts.reverse();
    let joined = parts.join("\n").trim().to_string();
    (!joined.is_empty()).then_some(joined)
}

/// Last row holding text; line comments may swallow their newline
fn last_row(n: Node) -> usize {
    let end = n.end_position();
    if end.column == 0 && end.row > n.start_position().row {
        end.row - 1
    } else {
        end.row
    }
}

/// Strip `//`, `///`, `#`, and `/* */` markers from a comment
pub fn strip_comment_markers(text: &str) -> String {
    let t = text.trim();

    if let Some(body) = t.strip_prefix("/*") {
        let body = body.strip_suffix("*/").unwrap_or(body);
        return body
            .lines()
            .map(|l| l.trim().trim_start_matches('*').trim())
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
    }

    t.lines()
        .map(|l| {
            l.trim()
                .trim_start_matches('/')
                .trim_start_matches('!')
                .trim_start_matches('#')
                .trim()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unquotes_triple_and_prefixed_strings() {
        let d = unquote_python_string("r\"\"\"Summary line.\n\n    More detail.\n    \"\"\"");
        assert_eq!(d, "Summary line.\n\nMore detail.");
        assert_eq!(unquote_python_string("'one line'"), "one line");
    }

    #[test]
    fn strips_line_and_block_markers() {
        assert_eq!(strip_comment_markers("/// Adds numbers"), "Adds numbers");
        assert_eq!(strip_comment_markers("# helper"), "helper");
        assert_eq!(strip_comment_markers("/**\n * Parses input\n */"), "Parses input");
    }

    #[test]
    fn leading_comments_skip_attributes_and_stop_at_blank_lines() {
        let src = "// unrelated\n\n/// Docs here\n#[inline]\nfn f() {}\n";
        let mut p = tree_sitter::Parser::new();
        p.set_language(&tree_sitter_rust::LANGUAGE.into()).unwrap();
        let tree = p.parse(src, None).unwrap();
        let root = tree.root_node();
        let f = (0..root.named_child_count())
            .filter_map(|i| root.named_child(i))
            .find(|n| n.kind() == "function_item")
            .unwrap();
        assert_eq!(leading_comments(f, src).as_deref(), Some("Docs here"));
    }
}
