//! Best-effort programming-language detection
//!
//! Counts fixed substring indicators per language and picks the highest
//! score. This is a presentation heuristic for choosing a syntax-highlight
//! hint, not a parser.

/// Indicator substrings per language, matched case-insensitively.
///
/// Order matters: ties go to the earlier entry.
const LANGUAGE_INDICATORS: &[(&str, &[&str])] = &[
    (
        "python",
        &[
            "def ",
            "import ",
            "from ",
            "class ",
            "print(",
            "if __name__",
            "__init__",
            "self.",
            "elif ",
            "except:",
        ],
    ),
    (
        "javascript",
        &[
            "function ",
            "const ",
            "let ",
            "var ",
            "=>",
            "console.log",
            "require(",
            "module.exports",
            "async ",
        ],
    ),
    (
        "typescript",
        &[
            "interface ",
            "type ",
            ": string",
            ": number",
            "private ",
            "public ",
            "readonly ",
            "import type",
        ],
    ),
    (
        "java",
        &[
            "public class",
            "private void",
            "public static void",
            "system.out.println",
            "import java.",
            "@override",
        ],
    ),
    (
        "cpp",
        &[
            "#include",
            "std::",
            "int main(",
            "cout <<",
            "endl",
            "namespace ",
            "template<",
        ],
    ),
    (
        "rust",
        &[
            "fn ",
            "let mut",
            "impl ",
            "pub fn",
            "use ",
            "println!",
            "match ",
            "some(",
            "ok(",
            "err(",
        ],
    ),
    (
        "go",
        &[
            "package main",
            "func main()",
            "import (",
            "fmt.",
            "go func",
            "defer ",
            "chan ",
            "interface{}",
        ],
    ),
    (
        "bash",
        &[
            "#!/bin/bash",
            "echo ",
            "if [",
            "export ",
            "source ",
            "chmod ",
            "awk ",
            "sed ",
        ],
    ),
    (
        "html",
        &[
            "<html", "<div", "<span", "<p>", "<!doctype", "class=", "id=",
        ],
    ),
    (
        "css",
        &[
            "color:",
            "background-",
            "margin:",
            "padding:",
            "font-size",
            "display:",
            "@media",
        ],
    ),
    (
        "sql",
        &[
            "select ",
            "from ",
            "where ",
            "insert ",
            "update ",
            "delete ",
            "join ",
            "create table",
        ],
    ),
];

/// Classify `code` by indicator counting.
///
/// Returns the best-scoring language tag, or `"text"` when nothing
/// matches. Best-effort only: callers must not rely on it for anything
/// beyond highlight hints.
pub fn detect_language(code: &str) -> &'static str {
    let lower = code.to_lowercase();
    let mut best = ("text", 0usize);
    for (lang, indicators) in LANGUAGE_INDICATORS {
        let score = indicators
            .iter()
            .filter(|&&indicator| lower.contains(indicator))
            .count();
        if score > best.1 {
            best = (lang, score);
        }
    }
    best.0
}

/// Wrap `code` in a fenced markdown block, detecting the language when no
/// hint is supplied.
pub fn format_code_block(code: &str, language: Option<&str>) -> String {
    let lang = match language {
        Some(lang) => lang,
        None => detect_language(code),
    };
    format!("```{lang}\n{code}\n```")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_python() {
        assert_eq!(detect_language("def foo():\n    return 1"), "python");
    }

    #[test]
    fn test_detects_rust() {
        assert_eq!(detect_language("fn main() { println!(\"x\"); }"), "rust");
    }

    #[test]
    fn test_detects_sql() {
        assert_eq!(
            detect_language("SELECT name FROM users WHERE id = 1"),
            "sql"
        );
    }

    #[test]
    fn test_unknown_is_text() {
        assert_eq!(detect_language("just a plain sentence without markers"), "text");
    }

    #[test]
    fn test_format_code_block_with_hint() {
        assert_eq!(
            format_code_block("x = 1", Some("python")),
            "```python\nx = 1\n```"
        );
    }

    #[test]
    fn test_format_code_block_detects() {
        let block = format_code_block("def foo():\n    pass", None);
        assert!(block.starts_with("```python\n"));
        assert!(block.ends_with("\n```"));
    }
}
