//! Filepath: src/infra/utils.rs
//! Tree-sitter node helpers organized by small, focused structs.
//! All functions are associated fns to keep call sites
//! ergonomic, testable, and discoverable.

use tree_sitter::Node;

/// UTF-8 safe slicing helpers
pub struct Utf8Utils;

impl Utf8Utils
{
    /// Return a substring by byte range if it is on a char
    /// boundary within `full`, else None
    pub fn slice_str(
        full: &str,
        start: usize,
        end: usize,
    ) -> Option<&str>
    {
        if start > end || end > full.len()
        {
            return None;
        }

        // Use get(..) to enforce char boundary safety
        full.get(start..end)
    }

    /// Text covered by a node, None on invalid boundaries
    pub fn node_text<'a>(
        full: &'a str,
        node: Node,
    ) -> Option<&'a str>
    {
        Self::slice_str(full, node.start_byte(), node.end_byte())
    }
}

/// Common Tree-sitter node helpers
pub struct TsNodeUtils;

impl TsNodeUtils
{
    /// Check if `node` has an ancestor of the given kind
    pub fn has_ancestor(
        mut node: Node,
        kind: &str,
    ) -> bool
    {
        while let Some(p) = node.parent()
        {
            if p.kind() == kind
            {
                return true;
            }

            node = p;
        }

        false
    }

    /// Follow `field` links down until a node of one of `kinds`
    pub fn descend_field<'a>(
        mut node: Node<'a>,
        field: &str,
        kinds: &[&str],
    ) -> Option<Node<'a>>
    {
        // Declarators nest: pointer -> function -> identifier
        for _ in 0..16
        {
            if kinds.contains(&node.kind())
            {
                return Some(node);
            }
            node = node.child_by_field_name(field)?;
        }

        None
    }

    /// Whether a node is any flavour of comment
    pub fn is_comment(node: Node) -> bool
    {
        node.kind()
            .contains("comment")
    }
}
