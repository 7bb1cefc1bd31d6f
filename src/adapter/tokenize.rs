//! Normalized tokenization
//!
//! The token stream is what makes similarity rename-resistant: all
//! identifiers collapse to one placeholder kind, numeric and string
//! literals collapse per kind, and comments never appear. Whitespace
//! has no node in the concrete tree, so it is dropped for free.

use tree_sitter::Node;

/// Normalization class of a concrete-tree node kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenClass {
    Identifier,
    Number,
    Str,
    Char,
    Comment,
    Plain,
}

/// One normalized token with its 1-indexed source lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    /// Normalized kind label (placeholder for identifiers/literals,
    /// grammar kind otherwise)
    pub kind: &'static str,
    pub start_line: u32,
    pub end_line: u32,
}

pub(crate) const IDENT_KIND: &str = "<id>";
pub(crate) const NUMBER_KIND: &str = "<num>";
pub(crate) const STRING_KIND: &str = "<str>";
pub(crate) const CHAR_KIND: &str = "<char>";

pub(crate) fn classify(kind: &str) -> TokenClass {
    if kind.contains("comment") {
        return TokenClass::Comment;
    }
    if kind == "identifier" || kind.ends_with("_identifier") || kind.ends_with("identifier_pattern")
    {
        return TokenClass::Identifier;
    }
    match kind {
        "string" | "string_literal" | "raw_string_literal" | "interpreted_string_literal"
        | "template_string" | "concatenated_string" | "string_fragment" => TokenClass::Str,
        "char_literal" | "character_literal" | "rune_literal" => TokenClass::Char,
        "integer" | "float" | "number" | "number_literal" | "int_literal" | "float_literal"
        | "integer_literal" | "decimal_integer_literal" | "hex_integer_literal"
        | "octal_integer_literal" | "binary_integer_literal"
        | "decimal_floating_point_literal" | "hex_floating_point_literal"
        | "imaginary_literal" => TokenClass::Number,
        _ => TokenClass::Plain,
    }
}

pub(crate) fn normalized_kind(class: TokenClass, kind: &'static str) -> &'static str {
    match class {
        TokenClass::Identifier => IDENT_KIND,
        TokenClass::Number => NUMBER_KIND,
        TokenClass::Str => STRING_KIND,
        TokenClass::Char => CHAR_KIND,
        TokenClass::Comment | TokenClass::Plain => kind,
    }
}

/// Walk the concrete tree and emit the normalized leaf stream.
///
/// String and char nodes are collapsed before descent so multi-part
/// literals (fragments, escapes, interpolation) yield one token.
pub(crate) fn collect_tokens(root: Node) -> Vec<Token> {
    let mut tokens = Vec::new();
    walk(root, &mut tokens);
    tokens
}

fn walk(node: Node, out: &mut Vec<Token>) {
    if node.is_missing() {
        return;
    }
    let class = classify(node.kind());
    match class {
        TokenClass::Comment => {}
        TokenClass::Str | TokenClass::Char => out.push(token_of(node, class)),
        _ if node.child_count() == 0 => out.push(token_of(node, class)),
        _ => {
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                walk(child, out);
            }
        }
    }
}

fn token_of(node: Node, class: TokenClass) -> Token {
    Token {
        kind: normalized_kind(class, node.kind()),
        start_line: node.start_position().row as u32 + 1,
        end_line: node.end_position().row as u32 + 1,
    }
}
