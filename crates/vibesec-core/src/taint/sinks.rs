//! Sink classification for taint flows
//!
//! A query names its own sinks, so classification only decides which
//! remediation advice applies to a flow. It looks at the callee-like words
//! in the sink node's text, the same way the built-in sink table groups
//! dangerous operations by category.

use serde::Serialize;

use crate::syntax::SyntaxNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaintSinkCategory {
    SqlInjection,
    CommandInjection,
    CodeExecution,
    XssSink,
    PathTraversal,
    NetworkRequest,
    Deserialization,
    Unknown,
}

impl TaintSinkCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaintSinkCategory::SqlInjection => "sql_injection",
            TaintSinkCategory::CommandInjection => "command_injection",
            TaintSinkCategory::CodeExecution => "code_execution",
            TaintSinkCategory::XssSink => "xss_sink",
            TaintSinkCategory::PathTraversal => "path_traversal",
            TaintSinkCategory::NetworkRequest => "network_request",
            TaintSinkCategory::Deserialization => "deserialization",
            TaintSinkCategory::Unknown => "unknown",
        }
    }

    pub fn classify(node: &SyntaxNode) -> Self {
        let text = node.text.to_ascii_lowercase();
        let words: Vec<&str> = text
            .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
            .filter(|w| !w.is_empty())
            .collect();

        SINK_KEYWORDS
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|kw| words.contains(kw)))
            .map(|(category, _)| *category)
            .unwrap_or(TaintSinkCategory::Unknown)
    }

    pub fn recommendations(&self) -> Vec<String> {
        let specific: &[&str] = match self {
            TaintSinkCategory::SqlInjection => &[
                "Use parameterized queries or prepared statements instead of building SQL strings",
                "Use an ORM or query builder that escapes values",
            ],
            TaintSinkCategory::CommandInjection => &[
                "Avoid passing untrusted data to shell commands",
                "Pass arguments as a list without a shell and allow-list accepted values",
            ],
            TaintSinkCategory::CodeExecution => &[
                "Never evaluate untrusted data as code",
                "Replace dynamic evaluation with explicit dispatch or a safe parser",
            ],
            TaintSinkCategory::XssSink => &[
                "Encode output for the HTML context it is written to",
                "Prefer text APIs such as textContent over HTML injection",
            ],
            TaintSinkCategory::PathTraversal => &[
                "Resolve the path and verify it stays inside an allowed base directory",
                "Reject path separators and `..` segments in user-supplied names",
            ],
            TaintSinkCategory::NetworkRequest => &[
                "Validate request targets against an allow-list of hosts",
            ],
            TaintSinkCategory::Deserialization => &[
                "Deserialize untrusted data only with safe loaders and explicit schemas",
            ],
            TaintSinkCategory::Unknown => &[],
        };

        std::iter::once("Validate and sanitize untrusted input before it reaches the sink")
            .chain(specific.iter().copied())
            .map(str::to_string)
            .collect()
    }
}

const SINK_KEYWORDS: &[(TaintSinkCategory, &[&str])] = &[
    (
        TaintSinkCategory::CodeExecution,
        &["eval", "function", "settimeout", "setinterval", "runincontext", "compile"],
    ),
    (
        TaintSinkCategory::CommandInjection,
        &["exec", "execsync", "spawn", "system", "popen", "subprocess", "child_process", "shell_exec"],
    ),
    (
        TaintSinkCategory::SqlInjection,
        &["query", "execute", "executemany", "raw", "cursor", "sql", "knex", "sequelize"],
    ),
    (
        TaintSinkCategory::XssSink,
        &["innerhtml", "outerhtml", "write", "writeln", "insertadjacenthtml", "render_template_string", "html"],
    ),
    (
        TaintSinkCategory::PathTraversal,
        &["open", "readfile", "readfilesync", "writefile", "send_file", "sendfile", "createreadstream", "unlink"],
    ),
    (
        TaintSinkCategory::NetworkRequest,
        &["fetch", "axios", "urlopen", "requests", "http"],
    ),
    (
        TaintSinkCategory::Deserialization,
        &["pickle", "loads", "unserialize", "yaml"],
    ),
];
