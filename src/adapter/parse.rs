//! Syntax tree construction
//!
//! The AST fingerprint path consumes a plain tree of kind-labelled
//! nodes. The same collapse rules as tokenization apply: comments are
//! dropped and string/char literals become a single leaf, so the tree
//! is invariant under reformatting and renaming-by-kind.

use crate::adapter::tokenize::{classify, normalized_kind, TokenClass};
use tree_sitter::Node;

/// One syntax-tree node: a kind label, 1-indexed source lines, and
/// children in source order.
#[derive(Debug, Clone)]
pub struct AstNode {
    pub kind: &'static str,
    pub start_line: u32,
    pub end_line: u32,
    pub children: Vec<AstNode>,
}

impl AstNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// A parsed file ready for subtree hashing.
#[derive(Debug, Clone)]
pub struct SyntaxTree {
    pub root: AstNode,
}

pub(crate) fn build_tree(root: Node) -> SyntaxTree {
    SyntaxTree {
        root: build(root).unwrap_or(AstNode {
            kind: root.kind(),
            start_line: root.start_position().row as u32 + 1,
            end_line: root.end_position().row as u32 + 1,
            children: Vec::new(),
        }),
    }
}

fn build(node: Node) -> Option<AstNode> {
    if node.is_missing() {
        return None;
    }
    let class = classify(node.kind());
    match class {
        TokenClass::Comment => None,
        TokenClass::Str | TokenClass::Char => Some(leaf(node, class)),
        _ if node.child_count() == 0 => Some(leaf(node, class)),
        _ => {
            let mut cursor = node.walk();
            let children: Vec<AstNode> = node
                .children(&mut cursor)
                .filter_map(build)
                .collect();
            Some(AstNode {
                kind: node.kind(),
                start_line: node.start_position().row as u32 + 1,
                end_line: node.end_position().row as u32 + 1,
                children,
            })
        }
    }
}

fn leaf(node: Node, class: TokenClass) -> AstNode {
    AstNode {
        kind: normalized_kind(class, node.kind()),
        start_line: node.start_position().row as u32 + 1,
        end_line: node.end_position().row as u32 + 1,
        children: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{Adapter, Language};

    fn flatten<'a>(node: &'a AstNode, out: &mut Vec<&'a str>) {
        out.push(node.kind);
        for child in &node.children {
            flatten(child, out);
        }
    }

    #[test]
    fn tree_has_module_root_and_source_order() {
        let adapter = Adapter::new(Language::Python);
        let tree = adapter.parse(b"def f(x):\n    return x + 1\n").unwrap();
        assert_eq!(tree.root.kind, "module");
        assert_eq!(tree.root.children.len(), 1);
        assert_eq!(tree.root.children[0].kind, "function_definition");
        assert_eq!(tree.root.start_line, 1);

        let mut kinds = Vec::new();
        flatten(&tree.root, &mut kinds);
        let def = kinds.iter().position(|k| *k == "def").unwrap();
        let ret = kinds.iter().position(|k| *k == "return").unwrap();
        assert!(def < ret);
    }

    #[test]
    fn comments_do_not_appear() {
        let adapter = Adapter::new(Language::Python);
        let bare = adapter.parse(b"x = 1\n").unwrap();
        let noisy = adapter.parse(b"# leading\nx = 1  # trailing\n").unwrap();

        let mut a = Vec::new();
        let mut b = Vec::new();
        flatten(&bare.root, &mut a);
        flatten(&noisy.root, &mut b);
        assert_eq!(a, b);
    }

    #[test]
    fn strings_collapse_to_a_leaf() {
        let adapter = Adapter::new(Language::Python);
        let tree = adapter.parse(b"s = f\"v={x}\"\n").unwrap();
        let mut kinds = Vec::new();
        flatten(&tree.root, &mut kinds);
        assert!(kinds.contains(&"<str>"));
        assert!(!kinds.contains(&"interpolation"));
    }
}
