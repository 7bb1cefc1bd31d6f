//! Language Adapter
//!
//! Maps a language tag to its Tree-sitter grammar and exposes the two
//! operations the engine needs: `tokenize` (normalized leaf stream)
//! and `parse` (kind-labelled syntax tree). The core engine never sees
//! language-specific logic beyond the tag.

pub mod language;
pub mod parse;
pub mod tokenize;

pub use language::{Adapter, Language};
pub use parse::{AstNode, SyntaxTree};
pub use tokenize::{Token, TokenClass};
