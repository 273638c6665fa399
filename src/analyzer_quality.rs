//! JavaScript/TypeScript code quality analyzer.
//!
//! Heuristic checks over non-excluded source files: `any` types, `var`
//! declarations, console statements, loose equality, cyclomatic
//! complexity, function and file length, and commented-out code.
//! Files that cannot be read are skipped.

use anyhow::Result;
use regex::Regex;

use crate::audit::{read_lossy, Analyzer, AuditTarget};
use crate::models::{Effort, Finding, Severity};

const JS_EXTENSIONS: &[&str] = &["js", "jsx", "ts", "tsx"];
const SIZE_EXTENSIONS: &[&str] = &["js", "jsx", "ts", "tsx", "py", "java", "go", "rs"];

/// Tokens that mark a commented-out line as code rather than prose.
const CODE_TOKENS: &[&str] = &[
    "function", "const", "let", "var", "if", "for", "while", "{", "}", ";",
];

pub struct QualityAnalyzer;

impl Analyzer for QualityAnalyzer {
    fn name(&self) -> &'static str {
        "quality"
    }

    fn analyze(&self, target: &AuditTarget) -> Result<Vec<Finding>> {
        let patterns = Patterns::new()?;
        let mut findings = Vec::new();

        if target.has_tech("javascript") || target.has_tech("typescript") {
            for path in target.files_with_extensions(JS_EXTENSIONS) {
                let Some(content) = read_lossy(&path) else {
                    continue;
                };
                let file = target.relative(&path);
                let is_ts = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map_or(false, |ext| ext == "ts" || ext == "tsx");

                if is_ts {
                    check_any_usage(&patterns, &file, &content, &mut findings);
                }
                check_var_usage(&patterns, &file, &content, &mut findings);
                check_console(&patterns, &path, &file, &content, &mut findings);
                check_loose_equality(&patterns, &file, &content, &mut findings);
                check_complexity(&patterns, &file, &content, &mut findings);
                check_function_length(&patterns, &file, &content, &mut findings);
                check_dead_code(&file, &content, &mut findings);
            }
        }

        for path in target.files_with_extensions(SIZE_EXTENSIONS) {
            let Some(content) = read_lossy(&path) else {
                continue;
            };
            check_file_length(&target.relative(&path), &content, &mut findings);
        }

        Ok(findings)
    }
}

struct Patterns {
    any_type: Regex,
    var_decl: Regex,
    console: Regex,
    loose_eq: Regex,
    func_start: Regex,
}

impl Patterns {
    fn new() -> Result<Self> {
        Ok(Self {
            any_type: Regex::new(r":\s*any\b|<any>|Array<any>|\bany\[\]")?,
            var_decl: Regex::new(r"\bvar\s+\w+")?,
            console: Regex::new(r"\bconsole\.(log|debug|info|warn|error)\(")?,
            loose_eq: Regex::new(r"[^!<>]==[^=]|[^!<>]!=[^=]")?,
            func_start: Regex::new(
                r"(function\s+\w+|const\s+\w+\s*=\s*\([^)]*\)\s*=>|\w+\s*\([^)]*\)\s*\{)",
            )?,
        })
    }
}

fn is_comment_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("//") || trimmed.starts_with("/*") || trimmed.starts_with('*')
}

fn finding(
    severity: Severity,
    subcategory: &str,
    file: &str,
    line: usize,
    message: String,
    remediation: &str,
    effort: Effort,
) -> Finding {
    Finding {
        severity,
        category: "quality".to_string(),
        subcategory: subcategory.to_string(),
        file: file.to_string(),
        line,
        message,
        remediation: remediation.to_string(),
        effort,
    }
}

fn check_any_usage(patterns: &Patterns, file: &str, content: &str, findings: &mut Vec<Finding>) {
    for (idx, line) in content.lines().enumerate() {
        if is_comment_line(line) {
            continue;
        }
        if patterns.any_type.is_match(line) {
            findings.push(finding(
                Severity::Medium,
                "typescript_strict_mode",
                file,
                idx + 1,
                "Use of 'any' type defeats TypeScript strict mode".to_string(),
                "Replace 'any' with a specific type or 'unknown' with type guards",
                Effort::Low,
            ));
        }
    }
}

fn check_var_usage(patterns: &Patterns, file: &str, content: &str, findings: &mut Vec<Finding>) {
    for (idx, line) in content.lines().enumerate() {
        if is_comment_line(line) {
            continue;
        }
        if patterns.var_decl.is_match(line) {
            findings.push(finding(
                Severity::Low,
                "modern_javascript",
                file,
                idx + 1,
                "'var' declaration is function-scoped".to_string(),
                "Replace 'var' with 'const' or 'let'",
                Effort::Low,
            ));
        }
    }
}

fn check_console(
    patterns: &Patterns,
    path: &std::path::Path,
    file: &str,
    content: &str,
    findings: &mut Vec<Finding>,
) {
    // Console output is expected in tests.
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    if name.contains("test") || name.contains("spec") || file.contains("__tests__") {
        return;
    }

    for (idx, line) in content.lines().enumerate() {
        if line.trim_start().starts_with("//") {
            continue;
        }
        if patterns.console.is_match(line) {
            findings.push(finding(
                Severity::Medium,
                "production_code",
                file,
                idx + 1,
                "Console statement in production code".to_string(),
                "Remove the console statement or route through a logging framework",
                Effort::Low,
            ));
        }
    }
}

fn check_loose_equality(
    patterns: &Patterns,
    file: &str,
    content: &str,
    findings: &mut Vec<Finding>,
) {
    for (idx, line) in content.lines().enumerate() {
        if is_comment_line(line) {
            continue;
        }
        if patterns.loose_eq.is_match(line) {
            findings.push(finding(
                Severity::Low,
                "code_smell",
                file,
                idx + 1,
                "Loose equality operator (== / !=)".to_string(),
                "Use '===' and '!==' to avoid type coercion",
                Effort::Low,
            ));
        }
    }
}

/// Simplified cyclomatic complexity: 1 per function plus one for each
/// decision point (if, else if, while, for, case, catch, &&, ||, ?).
fn check_complexity(patterns: &Patterns, file: &str, content: &str, findings: &mut Vec<Finding>) {
    let mut current: Option<(usize, u32)> = None;

    let mut flush = |start: usize, complexity: u32, findings: &mut Vec<Finding>| {
        if complexity <= 10 {
            return;
        }
        let severity = if complexity > 20 {
            Severity::Critical
        } else if complexity > 15 {
            Severity::High
        } else {
            Severity::Medium
        };
        let effort = if complexity < 20 {
            Effort::Medium
        } else {
            Effort::High
        };
        findings.push(finding(
            severity,
            "complexity",
            file,
            start,
            format!("High cyclomatic complexity ({})", complexity),
            "Refactor into smaller functions and extract complex conditions",
            effort,
        ));
    };

    for (idx, line) in content.lines().enumerate() {
        if patterns.func_start.is_match(line) {
            if let Some((start, complexity)) = current.take() {
                flush(start, complexity, findings);
            }
            current = Some((idx + 1, 1));
        }

        if let Some((_, complexity)) = current.as_mut() {
            *complexity += count_decision_points(line);
        }
    }
    if let Some((start, complexity)) = current {
        flush(start, complexity, findings);
    }
}

fn count_decision_points(line: &str) -> u32 {
    let count = |needle: &str| line.matches(needle).count() as u32;
    count("if ") + count("else if") + count("while ") + count("for ") + count("case ")
        + count("catch ")
        + count("&&")
        + count("||")
        + count("?")
}

/// Function length by brace tracking from each function start.
fn check_function_length(
    patterns: &Patterns,
    file: &str,
    content: &str,
    findings: &mut Vec<Finding>,
) {
    let mut current: Option<(usize, usize, i32)> = None; // (start, lines, brace depth)

    let mut flush = |start: usize, lines: usize, findings: &mut Vec<Finding>| {
        if lines <= 50 {
            return;
        }
        let severity = if lines > 100 {
            Severity::High
        } else {
            Severity::Medium
        };
        findings.push(finding(
            severity,
            "function_length",
            file,
            start,
            format!("Long function ({} lines)", lines),
            "Extract smaller functions for distinct responsibilities",
            Effort::Medium,
        ));
    };

    for (idx, line) in content.lines().enumerate() {
        if patterns.func_start.is_match(line) {
            if let Some((start, lines, _)) = current.take() {
                flush(start, lines, findings);
            }
            current = Some((idx + 1, 0, 0));
        }

        if let Some((start, lines, depth)) = current.as_mut() {
            *lines += 1;
            *depth += line.matches('{').count() as i32 - line.matches('}').count() as i32;
            if *depth == 0 && *lines > 1 {
                let (s, l) = (*start, *lines);
                current = None;
                flush(s, l, findings);
            }
        }
    }
    if let Some((start, lines, _)) = current {
        flush(start, lines, findings);
    }
}

fn check_file_length(file: &str, content: &str, findings: &mut Vec<Finding>) {
    let lines = content.lines().count();
    if lines <= 500 {
        return;
    }
    let severity = if lines > 1000 {
        Severity::High
    } else {
        Severity::Medium
    };
    findings.push(finding(
        severity,
        "file_length",
        file,
        1,
        format!("Large file ({} lines)", lines),
        "Split into smaller, focused modules",
        Effort::High,
    ));
}

/// Five or more consecutive `//` lines containing code tokens are
/// reported as a commented-out code block.
fn check_dead_code(file: &str, content: &str, findings: &mut Vec<Finding>) {
    let mut block_size = 0usize;
    let mut block_start = 0usize;

    let mut flush = |start: usize, size: usize, findings: &mut Vec<Finding>| {
        if size >= 5 {
            findings.push(finding(
                Severity::Low,
                "dead_code",
                file,
                start,
                format!("Commented-out code block ({} lines)", size),
                "Delete commented code; version control keeps the history",
                Effort::Low,
            ));
        }
    };

    for (idx, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        let is_commented_code = trimmed.starts_with("//")
            && CODE_TOKENS.iter().any(|token| trimmed.contains(token));

        if is_commented_code {
            if block_size == 0 {
                block_start = idx + 1;
            }
            block_size += 1;
        } else {
            flush(block_start, block_size, findings);
            block_size = 0;
        }
    }
    flush(block_start, block_size, findings);
}
