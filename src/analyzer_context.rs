//! CLAUDE.md hygiene analyzer (opt-in via `--scope context`).
//!
//! Instruction files ride along in every session, so they get their
//! own checks: leaked secrets, size and token budget, Markdown
//! structure, vague directives, and broken references. Looks for
//! CLAUDE.md at the target root and one directory level down.

use std::path::{Path, PathBuf};

use anyhow::Result;
use regex::Regex;

use crate::audit::{read_lossy, Analyzer, AuditTarget};
use crate::models::{Effort, Finding, Severity};

pub struct ContextAnalyzer;

impl Analyzer for ContextAnalyzer {
    fn name(&self) -> &'static str {
        "context"
    }

    fn analyze(&self, target: &AuditTarget) -> Result<Vec<Finding>> {
        let patterns = ContextPatterns::new()?;
        let mut findings = Vec::new();

        for path in find_context_files(&target.root) {
            let Some(content) = read_lossy(&path) else {
                continue;
            };
            let file = target.relative(&path);
            check_secrets(&patterns, &file, &content, &mut findings);
            check_size(&file, &content, &mut findings);
            check_structure(&patterns, &file, &content, &mut findings);
            check_content(&patterns, &file, &content, &mut findings);
            check_references(&patterns, &path, &file, &content, &mut findings);
        }

        Ok(findings)
    }
}

/// CLAUDE.md at the root plus one level of subdirectories.
fn find_context_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let direct = root.join("CLAUDE.md");
    if direct.is_file() {
        files.push(direct);
    }
    if let Ok(entries) = std::fs::read_dir(root) {
        let mut nested: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .map(|p| p.join("CLAUDE.md"))
            .filter(|p| p.is_file())
            .collect();
        nested.sort();
        files.append(&mut nested);
    }
    files
}

struct ContextPatterns {
    secrets: Vec<(&'static str, Regex)>,
    h1: Regex,
    h2: Regex,
    header: Regex,
    dash_bullet: Regex,
    star_bullet: Regex,
    vague: Vec<Regex>,
    emphasis: Regex,
    import: Regex,
    md_link: Regex,
}

impl ContextPatterns {
    fn new() -> Result<Self> {
        Ok(Self {
            secrets: vec![
                (
                    "api key",
                    Regex::new(r#"(?i)(api[_-]?key|apikey)\s*[=:]\s*["']([a-zA-Z0-9_-]{20,})["']"#)?,
                ),
                ("aws key", Regex::new(r"AKIA[0-9A-Z]{16}")?),
                (
                    "generic secret",
                    Regex::new(r#"(?i)(secret|password|passwd|pwd)\s*[=:]\s*["']([^"'\s]{8,})["']"#)?,
                ),
                (
                    "private key",
                    Regex::new(r"-----BEGIN (RSA |)PRIVATE KEY-----")?,
                ),
                (
                    "jwt",
                    Regex::new(r"eyJ[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+")?,
                ),
                ("github token", Regex::new(r"gh[pousr]_[A-Za-z0-9_]{36}")?),
                (
                    "slack token",
                    Regex::new(r"xox[baprs]-[0-9]{10,12}-[0-9]{10,12}-[a-zA-Z0-9]{24,32}")?,
                ),
                ("openai key", Regex::new(r"sk-[a-zA-Z0-9]{20,}")?),
                (
                    "database connection string",
                    Regex::new(r"(postgres|mysql|mongodb)://[^:]+:[^@]+@")?,
                ),
                (
                    "internal IP address",
                    Regex::new(r"\b(10|172\.(1[6-9]|2[0-9]|3[01])|192\.168)\.\d{1,3}\.\d{1,3}\b")?,
                ),
            ],
            h1: Regex::new(r"(?m)^#\s+")?,
            h2: Regex::new(r"(?m)^##\s+")?,
            header: Regex::new(r"(?m)^#{1,6}\s+(.+)$")?,
            dash_bullet: Regex::new(r"(?m)^\s*-\s+")?,
            star_bullet: Regex::new(r"(?m)^\s*\*\s+")?,
            vague: vec![
                Regex::new(
                    r"(?i)\b(write|make|keep it|be)\s+(good|clean|simple|consistent|professional)\b",
                )?,
                Regex::new(r"(?i)\bfollow\s+best\s+practices\b")?,
            ],
            emphasis: Regex::new(r"(?i)\b(critical|must|required|mandatory)\b")?,
            import: Regex::new(r"(?m)^\s*@(\S+)")?,
            md_link: Regex::new(r"\[([^\]]+)\]\(([^)]+)\)")?,
        })
    }
}

fn context_finding(
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
        category: "context".to_string(),
        subcategory: subcategory.to_string(),
        file: file.to_string(),
        line,
        message,
        remediation: remediation.to_string(),
        effort,
    }
}

fn check_secrets(
    patterns: &ContextPatterns,
    file: &str,
    content: &str,
    findings: &mut Vec<Finding>,
) {
    for (name, pattern) in &patterns.secrets {
        for m in pattern.find_iter(content) {
            let line = content[..m.start()].matches('\n').count() + 1;
            // The matched text stays out of the report.
            findings.push(context_finding(
                Severity::Critical,
                "secrets",
                file,
                line,
                format!("Potential {} in instruction file ([REDACTED])", name),
                "Remove the value, rotate the credential, and reference documentation instead",
                Effort::Low,
            ));
        }
    }
}

fn check_size(file: &str, content: &str, findings: &mut Vec<Finding>) {
    let lines = content.lines().count();

    if lines > 500 {
        findings.push(context_finding(
            Severity::High,
            "size",
            file,
            1,
            format!("Instruction file has {} lines (recommended < 300)", lines),
            "Trim to the essentials and move detail behind @imports",
            Effort::Medium,
        ));
    } else if lines > 300 {
        findings.push(context_finding(
            Severity::Medium,
            "size",
            file,
            1,
            format!("Instruction file has {} lines (recommended 100-300)", lines),
            "Move detailed documentation behind @imports",
            Effort::Medium,
        ));
    } else if lines < 50 {
        findings.push(context_finding(
            Severity::Info,
            "size",
            file,
            1,
            format!("Instruction file has only {} lines", lines),
            "Consider adding a project overview, standards, and common commands",
            Effort::Low,
        ));
    }

    let token_estimate = content.len() / 4;
    if token_estimate > 10_000 {
        findings.push(context_finding(
            Severity::Medium,
            "size",
            file,
            1,
            format!("High token footprint (~{} tokens)", token_estimate),
            "Aim for under 3,000 tokens; import details instead of inlining them",
            Effort::Medium,
        ));
    }
}

fn check_structure(
    patterns: &ContextPatterns,
    file: &str,
    content: &str,
    findings: &mut Vec<Finding>,
) {
    let lines = content.lines().count();

    if !patterns.h1.is_match(content) {
        findings.push(context_finding(
            Severity::Low,
            "structure",
            file,
            1,
            "No top-level header".to_string(),
            "Add an H1 with the project name",
            Effort::Low,
        ));
    }

    let section_count = patterns.h2.find_iter(content).count();
    if section_count < 3 {
        findings.push(context_finding(
            Severity::Low,
            "structure",
            file,
            1,
            format!("Only {} main sections", section_count),
            "Organize into sections: standards, workflow, commands, reference",
            Effort::Low,
        ));
    }

    let headers: Vec<String> = patterns
        .header
        .captures_iter(content)
        .map(|c| c[1].trim().to_lowercase())
        .collect();
    if lines > 100 && headers.len() < 5 {
        findings.push(context_finding(
            Severity::Low,
            "structure",
            file,
            1,
            format!("{} lines with only {} headers", lines, headers.len()),
            "Break content into smaller sections with clear headers",
            Effort::Low,
        ));
    }

    let mut seen = std::collections::HashSet::new();
    let mut duplicates = Vec::new();
    for header in &headers {
        if !seen.insert(header.clone()) && !duplicates.contains(header) {
            duplicates.push(header.clone());
        }
    }
    if !duplicates.is_empty() {
        findings.push(context_finding(
            Severity::Low,
            "structure",
            file,
            1,
            format!("Duplicate section headers: {}", duplicates.join(", ")),
            "Consolidate duplicate sections or rename them",
            Effort::Low,
        ));
    }

    let dash = patterns.dash_bullet.find_iter(content).count();
    let star = patterns.star_bullet.find_iter(content).count();
    if dash > 5 && star > 5 {
        findings.push(context_finding(
            Severity::Low,
            "structure",
            file,
            1,
            "Mixed bullet styles (- and *)".to_string(),
            "Pick one bullet style throughout",
            Effort::Low,
        ));
    }
}

fn check_content(
    patterns: &ContextPatterns,
    file: &str,
    content: &str,
    findings: &mut Vec<Finding>,
) {
    for (idx, line) in content.lines().enumerate() {
        if patterns.vague.iter().any(|p| p.is_match(line)) {
            findings.push(context_finding(
                Severity::Low,
                "content",
                file,
                idx + 1,
                "Vague directive".to_string(),
                "Replace with a measurable standard (e.g. function length limits)",
                Effort::Low,
            ));
        }
    }

    let lines = content.lines().count();
    if lines > 100 && !patterns.emphasis.is_match(content) {
        findings.push(context_finding(
            Severity::Low,
            "content",
            file,
            1,
            "No CRITICAL/MUST emphasis markers".to_string(),
            "Mark must-follow rules so they stand out from suggestions",
            Effort::Low,
        ));
    }
}

fn check_references(
    patterns: &ContextPatterns,
    path: &Path,
    file: &str,
    content: &str,
    findings: &mut Vec<Finding>,
) {
    let base = path.parent().unwrap_or(Path::new("."));
    let mut import_count = 0usize;

    for (idx, line) in content.lines().enumerate() {
        if let Some(captures) = patterns.import.captures(line) {
            import_count += 1;
            let target = &captures[1];
            if target.starts_with("http://") || target.starts_with("https://") {
                continue;
            }
            if !base.join(target).exists() {
                findings.push(context_finding(
                    Severity::Medium,
                    "references",
                    file,
                    idx + 1,
                    format!("Broken @import target: {}", target),
                    "Fix the import path or remove the import",
                    Effort::Low,
                ));
            }
        }
    }

    for captures in patterns.md_link.captures_iter(content) {
        let target = &captures[2];
        if target.starts_with("http") || target.starts_with('#') || target.starts_with('/') {
            continue;
        }
        let target = target.split('#').next().unwrap_or(target);
        if target.is_empty() {
            continue;
        }
        if !base.join(target).exists() {
            let offset = captures.get(0).map(|m| m.start()).unwrap_or(0);
            let line = content[..offset].matches('\n').count() + 1;
            findings.push(context_finding(
                Severity::Medium,
                "references",
                file,
                line,
                format!("Broken link target: {}", target),
                "Fix the link or remove it",
                Effort::Low,
            ));
        }
    }

    if import_count > 10 {
        findings.push(context_finding(
            Severity::Low,
            "references",
            file,
            1,
            format!("{} @imports", import_count),
            "Consolidate related documentation",
            Effort::Low,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyze_claude_md(content: &str) -> Vec<Finding> {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("CLAUDE.md"), content).unwrap();
        let target = AuditTarget::discover(tmp.path(), &[]).unwrap();
        ContextAnalyzer.analyze(&target).unwrap()
    }

    fn count(findings: &[Finding], subcategory: &str) -> usize {
        findings
            .iter()
            .filter(|f| f.subcategory == subcategory)
            .count()
    }

    #[test]
    fn test_secret_is_redacted() {
        let findings = analyze_claude_md(
            "# Project\n\nUse key sk-abcdefghij1234567890x for the staging API.\n",
        );
        let secret = findings
            .iter()
            .find(|f| f.subcategory == "secrets")
            .unwrap();
        assert_eq!(secret.severity, Severity::Critical);
        assert!(secret.message.contains("[REDACTED]"));
        assert!(!secret.message.contains("abcdefghij"));
        assert_eq!(secret.line, 3);
    }

    #[test]
    fn test_internal_ip_detected() {
        let findings =
            analyze_claude_md("# Net\n\nDeploy host is 192.168.1.50 behind the VPN.\n");
        assert!(findings
            .iter()
            .any(|f| f.subcategory == "secrets" && f.message.contains("internal IP")));
    }

    #[test]
    fn test_sparse_file_is_info() {
        let findings = analyze_claude_md("# Tiny\n");
        assert!(findings
            .iter()
            .any(|f| f.subcategory == "size" && f.severity == Severity::Info));
    }

    #[test]
    fn test_oversized_file_is_high() {
        let content = format!("# Big\n\n{}", "standards line\n".repeat(520));
        let findings = analyze_claude_md(&content);
        assert!(findings
            .iter()
            .any(|f| f.subcategory == "size" && f.severity == Severity::High));
    }

    #[test]
    fn test_structure_checks() {
        // No H1, no sections, mixed bullets.
        let bullets: String = (0..6)
            .map(|i| format!("- dash {}\n* star {}\n", i, i))
            .collect();
        let findings = analyze_claude_md(&bullets);
        assert!(findings
            .iter()
            .any(|f| f.message.contains("No top-level header")));
        assert!(findings.iter().any(|f| f.message.contains("main sections")));
        assert!(findings
            .iter()
            .any(|f| f.message.contains("Mixed bullet styles")));
    }

    #[test]
    fn test_duplicate_headers() {
        let findings = analyze_claude_md("# A\n\n## Setup\ntext\n## Setup\ntext\n## Other\n## More\n");
        assert!(findings
            .iter()
            .any(|f| f.message.contains("Duplicate section headers: setup")));
    }

    #[test]
    fn test_vague_directives() {
        let findings =
            analyze_claude_md("# Rules\n\nWrite clean code.\nFollow best practices.\n");
        assert_eq!(count(&findings, "content"), 2);
    }

    #[test]
    fn test_broken_import_and_link() {
        let findings = analyze_claude_md(
            "# Refs\n\n@docs/absent.md\n\nSee [the guide](guides/missing.md).\n",
        );
        assert_eq!(count(&findings, "references"), 2);
    }

    #[test]
    fn test_nested_claude_md_found() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("web")).unwrap();
        std::fs::write(
            tmp.path().join("web/CLAUDE.md"),
            "# Web\n\nUse key sk-abcdefghij1234567890x here.\n",
        )
        .unwrap();
        let target = AuditTarget::discover(tmp.path(), &[]).unwrap();
        let findings = ContextAnalyzer.analyze(&target).unwrap();
        assert!(findings.iter().any(|f| f.subcategory == "secrets"));
    }
}
