//! Language tags and grammar bindings
//!
//! Each supported language is a variant of [`Language`], selected by
//! the job's language field. The [`Adapter`] owns a parser for one
//! language and exposes the `tokenize`/`parse` capability surface.

use crate::{Error, Result};
use crate::adapter::parse::{build_tree, SyntaxTree};
use crate::adapter::tokenize::{collect_tokens, Token};
use std::str::FromStr;
use tree_sitter::Parser;

/// Source languages the engine can analyze.
///
/// Comparison is always within a single language; the tag picks the
/// Tree-sitter grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    JavaScript,
    TypeScript,
    C,
    Cpp,
    Java,
    Go,
    Rust,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Java => "java",
            Language::Go => "go",
            Language::Rust => "rust",
        }
    }

    /// File extensions handled when ingesting a directory.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Language::Python => &["py", "pyi"],
            Language::JavaScript => &["js", "mjs", "cjs", "jsx"],
            Language::TypeScript => &["ts", "mts", "cts"],
            Language::C => &["c", "h"],
            Language::Cpp => &["cpp", "cc", "cxx", "hpp", "hh"],
            Language::Java => &["java"],
            Language::Go => &["go"],
            Language::Rust => &["rs"],
        }
    }

    fn grammar(&self) -> tree_sitter::Language {
        match self {
            Language::Python => tree_sitter_python::LANGUAGE.into(),
            Language::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            Language::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Language::C => tree_sitter_c::LANGUAGE.into(),
            Language::Cpp => tree_sitter_cpp::LANGUAGE.into(),
            Language::Java => tree_sitter_java::LANGUAGE.into(),
            Language::Go => tree_sitter_go::LANGUAGE.into(),
            Language::Rust => tree_sitter_rust::LANGUAGE.into(),
        }
    }

    pub fn all() -> &'static [Language] {
        &[
            Language::Python,
            Language::JavaScript,
            Language::TypeScript,
            Language::C,
            Language::Cpp,
            Language::Java,
            Language::Go,
            Language::Rust,
        ]
    }
}

impl FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "python" | "py" => Ok(Language::Python),
            "javascript" | "js" => Ok(Language::JavaScript),
            "typescript" | "ts" => Ok(Language::TypeScript),
            "c" => Ok(Language::C),
            "cpp" | "c++" | "cxx" => Ok(Language::Cpp),
            "java" => Ok(Language::Java),
            "go" | "golang" => Ok(Language::Go),
            "rust" | "rs" => Ok(Language::Rust),
            _ => Err(Error::UnsupportedLanguage(s.to_string())),
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parser for one language, exposing the engine-facing operations.
pub struct Adapter {
    language: Language,
    parser: std::sync::Mutex<Parser>,
}

impl Adapter {
    pub fn new(language: Language) -> Self {
        let mut parser = Parser::new();
        parser
            .set_language(&language.grammar())
            .expect("Error loading grammar");
        Self {
            language,
            parser: std::sync::Mutex::new(parser),
        }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Produce the normalized token stream.
    ///
    /// Tokenization tolerates syntax errors: leaves of an error-bearing
    /// tree are still emitted so the token path survives a failed parse.
    pub fn tokenize(&self, bytes: &[u8]) -> Result<Vec<Token>> {
        let mut parser = self
            .parser
            .lock()
            .map_err(|_| Error::Tokenize("failed to lock parser".to_string()))?;
        let tree = parser
            .parse(bytes, None)
            .ok_or_else(|| Error::Tokenize(format!("{} parser produced no tree", self.language)))?;
        Ok(collect_tokens(tree.root_node()))
    }

    /// Produce the syntax tree for AST fingerprinting.
    ///
    /// A root containing syntax errors is a `Parse` failure; callers
    /// fall back to an empty AST fingerprint.
    pub fn parse(&self, bytes: &[u8]) -> Result<SyntaxTree> {
        let mut parser = self
            .parser
            .lock()
            .map_err(|_| Error::Parse("failed to lock parser".to_string()))?;
        let tree = parser
            .parse(bytes, None)
            .ok_or_else(|| Error::Parse(format!("{} parser produced no tree", self.language)))?;
        if tree.root_node().has_error() {
            return Err(Error::Parse(format!(
                "{} source contains syntax errors",
                self.language
            )));
        }
        Ok(build_tree(tree.root_node()))
    }
}
