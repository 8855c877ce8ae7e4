//! Filepath: src/parsers/grammar.rs
//! Tree-sitter strategy: one walker, per-language declaration tables.
//!
//! Every declaration node becomes a `RawSymbol` with the node's exact
//! byte range. Names come from the grammar's `name` field, or from the
//! declarator chain for C++. Nesting and method promotion are left to
//! `SymbolNester`.

use tracing::{debug, instrument};
use tree_sitter::{Language as TsLanguage, Node, Parser};

use crate::{
    core::{
        error::ExtractionError,
        symbols::{ByteSpan, Language, RawSymbol, Strategy, SymbolExtractor, SymbolKind},
    },
    infra::utils::{TsNodeUtils, Utf8Utils},
    parsers::docs,
};

/// Declaration node kinds that become symbols, per language
fn declarations(lang: Language) -> &'static [(&'static str, SymbolKind)] {
    use SymbolKind::*;
    match lang {
        Language::Rust => &[
            ("function_item", Function),
            ("function_signature_item", Function),
            ("struct_item", Type),
            ("enum_item", Type),
            ("union_item", Type),
            ("trait_item", Type),
            ("impl_item", Type),
            ("type_item", Type),
            ("const_item", Constant),
            ("static_item", Constant),
        ],
        Language::Python => &[("function_definition", Function), ("class_definition", Type)],
        Language::JavaScript | Language::TypeScript | Language::Tsx => &[
            ("function_declaration", Function),
            ("generator_function_declaration", Function),
            ("method_definition", Function),
            ("variable_declarator", Function),
            ("class_declaration", Type),
            ("abstract_class_declaration", Type),
            ("interface_declaration", Type),
            ("enum_declaration", Type),
            ("type_alias_declaration", Type),
        ],
        Language::Go => &[
            ("function_declaration", Function),
            ("method_declaration", Method),
            ("type_spec", Type),
            ("const_spec", Constant),
        ],
        Language::Cpp => &[
            ("function_definition", Function),
            ("class_specifier", Type),
            ("struct_specifier", Type),
            ("enum_specifier", Type),
        ],
        Language::Unknown => &[],
    }
}

fn grammar(lang: Language) -> Option<TsLanguage> {
    match lang {
        Language::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
        Language::Python => Some(tree_sitter_python::LANGUAGE.into()),
        Language::JavaScript => Some(tree_sitter_javascript::LANGUAGE.into()),
        Language::TypeScript => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
        Language::Tsx => Some(tree_sitter_typescript::LANGUAGE_TSX.into()),
        Language::Go => Some(tree_sitter_go::LANGUAGE.into()),
        Language::Cpp => Some(tree_sitter_cpp::LANGUAGE.into()),
        Language::Unknown => None,
    }
}

/// Multi-language grammar-based extractor
#[derive(Debug, Default)]
pub struct GrammarExtractor;

impl GrammarExtractor {
    pub fn new() -> Self {
        Self
    }

    fn failed(message: impl Into<String>) -> ExtractionError {
        ExtractionError::Failed {
            strategy: Strategy::Grammar,
            message: message.into(),
        }
    }
}

impl SymbolExtractor for GrammarExtractor {
    fn strategy(&self) -> Strategy {
        Strategy::Grammar
    }

    fn supports(&self, lang: Language) -> bool {
        grammar(lang).is_some()
    }

    #[instrument(level = "debug", skip(self, content), fields(bytes = content.len()))]
    fn extract(&self, content: &str, lang: Language) -> Result<Vec<RawSymbol>, ExtractionError> {
        let ts_lang = grammar(lang).ok_or(ExtractionError::Unsupported {
            strategy: Strategy::Grammar,
            language: lang,
        })?;

        let mut parser = Parser::new();
        parser
            .set_language(&ts_lang)
            .map_err(|e| Self::failed(format!("grammar rejected: {e}")))?;

        let tree = parser
            .parse(content, None)
            .ok_or_else(|| Self::failed("parser returned no tree"))?;
        let root = tree.root_node();

        // Error-recovered trees carry unreliable spans
        if root.has_error() {
            let at = first_error(root).map(|n| n.start_position().row + 1).unwrap_or(1);
            return Err(Self::failed(format!("syntax error near line {at}")));
        }

        let walker = Walker {
            src: content,
            lang,
            kinds: declarations(lang),
        };
        let mut out = Vec::new();
        walker.walk(root, &mut out);
        debug!(symbols = out.len(), "grammar walk complete");
        Ok(out)
    }
}

fn first_error(node: Node) -> Option<Node> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    children.into_iter().filter(|c| c.has_error()).find_map(first_error)
}

struct Walker<'a> {
    src: &'a str,
    lang: Language,
    kinds: &'static [(&'static str, SymbolKind)],
}

impl Walker<'_> {
    fn walk(&self, node: Node, out: &mut Vec<RawSymbol>) {
        if let Some(&(_, kind)) = self.kinds.iter().find(|(k, _)| *k == node.kind()) {
            if let Some(sym) = self.symbol(node, kind) {
                out.push(sym);
            }
        } else if self.lang == Language::Python && node.kind() == "expression_statement" {
            if let Some(sym) = self.python_constant(node) {
                out.push(sym);
            }
        }

        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.walk(child, out);
        }
    }

    fn symbol(&self, node: Node, kind: SymbolKind) -> Option<RawSymbol> {
        // Arrow functions bound to names count, plain variables do not
        if node.kind() == "variable_declarator" {
            let value = node.child_by_field_name("value")?;
            if !matches!(value.kind(), "arrow_function" | "function_expression" | "function") {
                return None;
            }
        }

        // Forward declarations and references have no body
        if matches!(node.kind(), "class_specifier" | "struct_specifier" | "enum_specifier")
            && node.child_by_field_name("body").is_none()
        {
            return None;
        }

        // Only module-level constants
        if node.kind() == "const_spec" && TsNodeUtils::has_ancestor(node, "function_declaration") {
            return None;
        }

        let name_node = self.name_node(node)?;
        let raw_name = Utf8Utils::node_text(self.src, name_node)?;
        let name = clean_name(raw_name);
        if name.is_empty() {
            return None;
        }

        // Bound arrow functions span their whole declaration statement
        let span_node = match node.parent() {
            Some(p) if node.kind() == "variable_declarator" && p.named_child_count() == 1 => p,
            _ => node,
        };

        Some(
            RawSymbol::new(name, kind, ByteSpan::new(span_node.start_byte(), span_node.end_byte()))
                .with_name_at(name_node.start_byte())
                .with_doc(self.doc(span_node)),
        )
    }

    fn name_node<'t>(&self, node: Node<'t>) -> Option<Node<'t>> {
        match (self.lang, node.kind()) {
            (Language::Rust, "impl_item") => node.child_by_field_name("type"),
            (Language::Cpp, "function_definition") => TsNodeUtils::descend_field(
                node.child_by_field_name("declarator")?,
                "declarator",
                &[
                    "identifier",
                    "field_identifier",
                    "qualified_identifier",
                    "destructor_name",
                    "operator_name",
                ],
            ),
            _ => node.child_by_field_name("name"),
        }
    }

    fn python_constant(&self, stmt: Node) -> Option<RawSymbol> {
        if stmt.parent()?.kind() != "module" {
            return None;
        }
        let assign = stmt.named_child(0).filter(|n| n.kind() == "assignment")?;
        let left = assign.child_by_field_name("left").filter(|n| n.kind() == "identifier")?;
        let name = Utf8Utils::node_text(self.src, left)?;
        if !is_constant_name(name) {
            return None;
        }
        Some(
            RawSymbol::new(name, SymbolKind::Constant, ByteSpan::new(stmt.start_byte(), stmt.end_byte()))
                .with_name_at(left.start_byte()),
        )
    }

    fn doc(&self, node: Node) -> Option<String> {
        match self.lang {
            Language::Python => docs::python_docstring(node, self.src),
            _ => docs::leading_comments(node, self.src),
        }
    }
}

/// `Foo<T>` -> `Foo`, `ns::Foo::bar` -> `bar`, `~Foo` kept
fn clean_name(raw: &str) -> String {
    let base = raw.split('<').next().unwrap_or(raw);
    let last = base.rsplit("::").next().unwrap_or(base);
    last.trim().trim_start_matches('&').to_string()
}

/// SCREAMING_CASE names are constants
pub fn is_constant_name(name: &str) -> bool {
    name.chars().any(|c| c.is_ascii_uppercase())
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::symbols::{Symbol, SymbolNester};

    fn index(src: &str, lang: Language) -> Vec<Symbol> {
        let raw = GrammarExtractor::new().extract(src, lang).expect("extract");
        SymbolNester::nest(src, raw)
    }

    fn get<'a>(syms: &'a [Symbol], name: &str) -> &'a Symbol {
        syms.iter()
            .find(|s| s.name == name)
            .unwrap_or_else(|| panic!("missing symbol {name}"))
    }

    #[test]
    fn python_classes_methods_constants_and_docstrings() {
        let src = r#"MAX_RETRIES = 3
lower = 1

class Calculator:
    """Adds things."""

    def add(self, a, b):
        return a + b

def parse_data(data):
    return json.loads(data)
"#;
        let syms = index(src, Language::Python);
        let names: Vec<_> = syms.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["MAX_RETRIES", "Calculator", "add", "parse_data"]);

        let calc = get(&syms, "Calculator");
        assert_eq!(calc.kind, SymbolKind::Type);
        assert_eq!(calc.doc.as_deref(), Some("Adds things."));

        let add = get(&syms, "add");
        assert_eq!(add.kind, SymbolKind::Method);
        assert_eq!(add.parent, Some(1));
        assert!(calc.span.contains(&add.span));

        let parse = get(&syms, "parse_data");
        assert_eq!(&src[parse.span.start..parse.span.end], "def parse_data(data):\n    return json.loads(data)");
        assert_eq!(parse.declaration, "def parse_data(data):");
    }

    #[test]
    fn rust_impl_blocks_hold_methods() {
        let src = r#"
/// A point.
pub struct Point { x: i32 }

impl<T> Shape for Point {
    fn area(&self) -> i32 { 0 }
}

const LIMIT: usize = 4;
"#;
        let syms = index(src, Language::Rust);
        assert_eq!(get(&syms, "Point").doc.as_deref(), Some("A point."));
        let area = get(&syms, "area");
        assert_eq!(area.kind, SymbolKind::Method);
        let parent = &syms[area.parent.unwrap()];
        assert_eq!((parent.name.as_str(), parent.kind), ("Point", SymbolKind::Type));
        assert_eq!(get(&syms, "LIMIT").kind, SymbolKind::Constant);
    }

    #[test]
    fn cpp_declarators_and_qualified_methods() {
        let src = r#"
class Engine {
public:
    void start() { running = true; }
};

int Engine::stop() { return 0; }
"#;
        let syms = index(src, Language::Cpp);
        assert_eq!(get(&syms, "start").kind, SymbolKind::Method);
        assert_eq!(get(&syms, "stop").kind, SymbolKind::Function);
        assert_eq!(get(&syms, "Engine").kind, SymbolKind::Type);
    }

    #[test]
    fn javascript_arrow_functions_and_classes() {
        let src = "const load = async (url) => fetch(url);\nconst n = 3;\nclass Store {\n  read(key) { return key; }\n}\n";
        let syms = index(src, Language::JavaScript);
        let load = get(&syms, "load");
        assert_eq!(load.kind, SymbolKind::Function);
        assert_eq!(load.span.start, 0);
        assert!(syms.iter().all(|s| s.name != "n"));
        assert_eq!(get(&syms, "read").kind, SymbolKind::Method);
    }

    #[test]
    fn go_functions_methods_and_types() {
        let src = "package main\n\ntype Server struct{}\n\nfunc (s *Server) Run() {}\n\nfunc main() {}\n";
        let syms = index(src, Language::Go);
        assert_eq!(get(&syms, "Server").kind, SymbolKind::Type);
        assert_eq!(get(&syms, "Run").kind, SymbolKind::Method);
        assert_eq!(get(&syms, "main").kind, SymbolKind::Function);
    }

    #[test]
    fn syntax_errors_and_unknown_languages_fail() {
        let ex = GrammarExtractor::new();
        assert!(matches!(
            ex.extract("def broken(:\n", Language::Python),
            Err(ExtractionError::Failed { .. })
        ));
        assert!(!ex.supports(Language::Unknown));
        assert!(matches!(
            ex.extract("x", Language::Unknown),
            Err(ExtractionError::Unsupported { .. })
        ));
    }

    #[test]
    fn constant_names() {
        assert!(is_constant_name("MAX_RETRIES"));
        assert!(is_constant_name("V2"));
        assert!(!is_constant_name("lower"));
        assert!(!is_constant_name("_"));
    }
}
