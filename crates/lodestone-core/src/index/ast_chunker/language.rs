//! Language detection from file paths

use std::path::Path;
use tree_sitter::Language as TsLanguage;

/// Languages with a tree-sitter grammar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    TypeScriptTsx,
    Go,
}

impl Language {
    pub const ALL: [Language; 6] = [
        Self::Rust,
        Self::Python,
        Self::JavaScript,
        Self::TypeScript,
        Self::TypeScriptTsx,
        Self::Go,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rust => "rust",
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::TypeScriptTsx => "tsx",
            Self::Go => "go",
        }
    }

    /// Detect language from file path extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        Self::from_extension(ext)
    }

    /// Detect language from file extension string
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "rs" => Some(Self::Rust),
            "py" | "pyi" => Some(Self::Python),
            "js" | "mjs" | "cjs" | "jsx" => Some(Self::JavaScript),
            "ts" | "mts" | "cts" => Some(Self::TypeScript),
            "tsx" => Some(Self::TypeScriptTsx),
            "go" => Some(Self::Go),
            _ => None,
        }
    }

    /// Grammar for this language
    pub(crate) fn grammar(&self) -> TsLanguage {
        match self {
            Self::Rust => tree_sitter_rust::LANGUAGE.into(),
            Self::Python => tree_sitter_python::LANGUAGE.into(),
            Self::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            Self::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Self::TypeScriptTsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            Self::Go => tree_sitter_go::LANGUAGE.into(),
        }
    }
}

/// Language tag for any indexable path.
///
/// Grammar-backed languages use [`Language::as_str`]; other well-known
/// extensions still get a tag so results can be filtered by language.
pub fn language_tag(path: &Path) -> Option<&'static str> {
    if let Some(lang) = Language::from_path(path) {
        return Some(lang.as_str());
    }
    let ext = path.extension()?.to_str()?.to_lowercase();
    let tag = match ext.as_str() {
        "md" | "markdown" | "mdx" => "markdown",
        "txt" | "rst" => "text",
        "java" => "java",
        "kt" | "kts" => "kotlin",
        "c" | "h" => "c",
        "cc" | "cpp" | "cxx" | "hpp" | "hh" => "cpp",
        "cs" => "csharp",
        "rb" => "ruby",
        "php" => "php",
        "swift" => "swift",
        "scala" => "scala",
        "sh" | "bash" | "zsh" => "shell",
        "sql" => "sql",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        "toml" => "toml",
        "html" | "htm" => "html",
        "css" | "scss" => "css",
        _ => return None,
    };
    Some(tag)
}

/// Whether chunks in this language should also get a code embedding
pub fn is_code_language(tag: &str) -> bool {
    !matches!(
        tag,
        "markdown" | "text" | "json" | "yaml" | "toml" | "html" | "css"
    )
}
