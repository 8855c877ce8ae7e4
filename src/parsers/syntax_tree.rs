//! Filepath: src/parsers/syntax_tree.rs
//! Rust-only strategy built on `syn`'s full AST.
//!
//! More precise than the grammar walker for Rust (doc attributes are
//! read as attributes, impl targets are resolved to their type name),
//! and strict: any other language or any syntax error fails fast so the
//! dispatcher can fall back.

use syn::{spanned::Spanned, AttrStyle, Attribute, ImplItem, Item, TraitItem};
use tracing::{debug, instrument};

use crate::{
    core::{
        error::ExtractionError,
        symbols::{ByteSpan, Language, RawSymbol, Strategy, SymbolExtractor, SymbolKind},
    },
    infra::line_index::NewlineIndex,
};

#[derive(Debug, Default)]
pub struct SyntaxTreeExtractor;

impl SyntaxTreeExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl SymbolExtractor for SyntaxTreeExtractor {
    fn strategy(&self) -> Strategy {
        Strategy::SyntaxTree
    }

    fn supports(&self, lang: Language) -> bool {
        lang == Language::Rust
    }

    #[instrument(level = "debug", skip(self, content), fields(bytes = content.len()))]
    fn extract(&self, content: &str, lang: Language) -> Result<Vec<RawSymbol>, ExtractionError> {
        if !self.supports(lang) {
            return Err(ExtractionError::Unsupported {
                strategy: Strategy::SyntaxTree,
                language: lang,
            });
        }

        // Span locations live in a thread-local map that never shrinks;
        // it is dropped with this worker
        let symbols = std::thread::scope(|scope| scope.spawn(|| walk(content)).join()).map_err(|_| {
            ExtractionError::Failed {
                strategy: Strategy::SyntaxTree,
                message: "parser thread panicked".to_string(),
            }
        })??;
        debug!(symbols = symbols.len(), "syntax tree walk complete");
        Ok(symbols)
    }
}

fn walk(content: &str) -> Result<Vec<RawSymbol>, ExtractionError> {
    // parse_str keeps spans aligned with `content` (no BOM/shebang stripping)
    let file: syn::File = syn::parse_str(content).map_err(|e| ExtractionError::Failed {
        strategy: Strategy::SyntaxTree,
        message: format!("line {}: {e}", e.span().start().line),
    })?;

    let mut collector = Collector {
        src: content,
        index: NewlineIndex::build(content.as_bytes()),
        out: Vec::new(),
    };
    collector.items(&file.items);
    Ok(collector.out)
}

struct Collector<'a> {
    src: &'a str,
    index: NewlineIndex,
    out: Vec<RawSymbol>,
}

impl Collector<'_> {
    fn items(&mut self, items: &[Item]) {
        for item in items {
            self.item(item);
        }
    }

    fn item(&mut self, item: &Item) {
        match item {
            Item::Fn(f) => self.push(&f.sig.ident, SymbolKind::Function, item, &f.attrs),
            Item::Struct(s) => self.push(&s.ident, SymbolKind::Type, item, &s.attrs),
            Item::Enum(e) => self.push(&e.ident, SymbolKind::Type, item, &e.attrs),
            Item::Union(u) => self.push(&u.ident, SymbolKind::Type, item, &u.attrs),
            Item::Type(t) => self.push(&t.ident, SymbolKind::Type, item, &t.attrs),
            Item::Const(c) => self.push(&c.ident, SymbolKind::Constant, item, &c.attrs),
            Item::Static(s) => self.push(&s.ident, SymbolKind::Constant, item, &s.attrs),
            Item::Trait(t) => {
                self.push(&t.ident, SymbolKind::Type, item, &t.attrs);
                for ti in &t.items {
                    if let TraitItem::Fn(f) = ti {
                        self.push(&f.sig.ident, SymbolKind::Function, ti, &f.attrs);
                    }
                }
            }
            Item::Impl(imp) => {
                if let Some(ident) = impl_target(&imp.self_ty) {
                    self.push(ident, SymbolKind::Type, item, &imp.attrs);
                }
                for ii in &imp.items {
                    match ii {
                        ImplItem::Fn(f) => self.push(&f.sig.ident, SymbolKind::Function, ii, &f.attrs),
                        ImplItem::Const(c) => self.push(&c.ident, SymbolKind::Constant, ii, &c.attrs),
                        _ => {}
                    }
                }
            }
            // Modules are scopes, not symbols; their items still count
            Item::Mod(m) => {
                if let Some((_, inner)) = &m.content {
                    self.items(inner);
                }
            }
            _ => {}
        }
    }

    fn push<N: Spanned>(&mut self, ident: &syn::Ident, kind: SymbolKind, node: &N, attrs: &[Attribute]) {
        let full = node.span();
        let Some(mut start) = self.offset(full.start()) else { return };
        let Some(end) = self.offset(full.end()) else { return };

        // Start after outer attributes so spans match the grammar strategy
        for attr in attrs.iter().filter(|a| matches!(a.style, AttrStyle::Outer)) {
            if let Some(after) = self.offset(attr.span().end()) {
                start = start.max(after);
            }
        }
        start = skip_whitespace(self.src, start);

        let Some(name_at) = self.offset(ident.span().start()) else { return };
        if start >= end {
            return;
        }

        self.out.push(
            RawSymbol::new(ident.to_string(), kind, ByteSpan::new(start, end))
                .with_name_at(name_at)
                .with_doc(doc_text(attrs)),
        );
    }

    fn offset(&self, at: proc_macro2::LineColumn) -> Option<usize> {
        self.index.offset_of(at.line, at.column, self.src)
    }
}

/// `impl Trait for path::Foo<T>` -> `Foo`
fn impl_target(ty: &syn::Type) -> Option<&syn::Ident> {
    match ty {
        syn::Type::Path(p) => p.path.segments.last().map(|s| &s.ident),
        syn::Type::Reference(r) => impl_target(&r.elem),
        _ => None,
    }
}

/// Joined `#[doc = "..."]` values (what `///` desugars to)
fn doc_text(attrs: &[Attribute]) -> Option<String> {
    let lines: Vec<String> = attrs
        .iter()
        .filter(|a| a.path().is_ident("doc"))
        .filter_map(|a| match &a.meta {
            syn::Meta::NameValue(nv) => match &nv.value {
                syn::Expr::Lit(syn::ExprLit {
                    lit: syn::Lit::Str(s), ..
                }) => Some(s.value().trim().to_string()),
                _ => None,
            },
            _ => None,
        })
        .collect();
    (!lines.is_empty()).then(|| lines.join("\n"))
}

fn skip_whitespace(src: &str, mut at: usize) -> usize {
    let bytes = src.as_bytes();
    while at < bytes.len() && bytes[at].is_ascii_whitespace() {
        at += 1;
    }
    at
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::symbols::{Symbol, SymbolNester};

    fn index(src: &str) -> Vec<Symbol> {
        let raw = SyntaxTreeExtractor::new().extract(src, Language::Rust).expect("extract");
        SymbolNester::nest(src, raw)
    }

    #[test]
    fn spans_start_after_attributes_and_docs() {
        let src = "/// Adds two numbers.\n#[inline]\npub fn add(a: i32, b: i32) -> i32 {\n    a + b\n}\n";
        let syms = index(src);
        assert_eq!(syms.len(), 1);
        let add = &syms[0];
        assert_eq!(add.doc.as_deref(), Some("Adds two numbers."));
        assert_eq!(&src[add.span.start..add.span.end], "pub fn add(a: i32, b: i32) -> i32 {\n    a + b\n}");
        assert_eq!((add.start_line, add.end_line), (3, 5));
    }

    #[test]
    fn impl_and_trait_members_nest_under_their_type() {
        let src = r#"
struct Stack { items: Vec<u8> }

impl Stack {
    const CAP: usize = 8;
    fn push(&mut self, v: u8) { self.items.push(v); }
}

trait Sized2 {
    fn size(&self) -> usize;
}

mod inner {
    pub fn helper() {}
}
"#;
        let syms = index(src);
        let push = syms.iter().find(|s| s.name == "push").unwrap();
        assert_eq!(push.kind, SymbolKind::Method);
        assert_eq!(syms[push.parent.unwrap()].name, "Stack");
        let size = syms.iter().find(|s| s.name == "size").unwrap();
        assert_eq!(size.kind, SymbolKind::Method);
        let helper = syms.iter().find(|s| s.name == "helper").unwrap();
        assert_eq!((helper.kind, helper.parent), (SymbolKind::Function, None));
        assert!(syms.iter().any(|s| s.name == "CAP" && s.kind == SymbolKind::Constant));
    }

    #[test]
    fn multibyte_text_keeps_byte_offsets_exact() {
        let src = "const GRÜSSE: &str = \"héllo\";\nfn wörter() {}\n";
        let syms = index(src);
        let f = syms.iter().find(|s| s.name == "wörter").unwrap();
        assert_eq!(&src[f.span.start..f.span.end], "fn wörter() {}");
    }

    #[test]
    fn repeated_parses_on_one_thread_agree() {
        let src = "fn a() {}\n\nfn b() {\n    a();\n}\n";
        let first = SyntaxTreeExtractor::new().extract(src, Language::Rust).expect("extract");
        for _ in 0..50 {
            let again = SyntaxTreeExtractor::new().extract(src, Language::Rust).expect("extract");
            assert_eq!(again, first);
        }
        assert_eq!(&src[first[1].span.start..first[1].span.end], "fn b() {\n    a();\n}");
    }

    #[test]
    fn other_languages_and_syntax_errors_fail_fast() {
        let ex = SyntaxTreeExtractor::new();
        assert!(matches!(
            ex.extract("def f():\n    pass\n", Language::Python),
            Err(ExtractionError::Unsupported { .. })
        ));
        assert!(matches!(
            ex.extract("fn broken( {", Language::Rust),
            Err(ExtractionError::Failed { .. })
        ));
    }
}
