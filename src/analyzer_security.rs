//! Security analyzer: hardcoded secrets, known-vulnerable npm ranges,
//! and JavaScript anti-patterns.
//!
//! Secret findings name the matched pattern but never echo the value.

use std::path::Path;

use anyhow::Result;
use regex::Regex;

use crate::audit::{read_lossy, Analyzer, AuditTarget};
use crate::models::{Effort, Finding, Severity};

const SECRET_EXTENSIONS: &[&str] = &[
    "js", "jsx", "ts", "tsx", "py", "java", "go", "rb", "php", "yml", "yaml", "json", "env",
];
const SKIP_FILES: &[&str] = &[".env.example", "package-lock.json", "yarn.lock"];
const JS_EXTENSIONS: &[&str] = &["js", "jsx", "ts", "tsx"];

/// Values that look like secrets but are clearly placeholders.
const PLACEHOLDERS: &[&str] = &[
    "your_api_key",
    "your_secret",
    "example",
    "placeholder",
    "test",
    "dummy",
    "sample",
    "xxx",
    "000",
    "abc123",
    "changeme",
    "replace_me",
    "my_api_key",
    "your_key_here",
    "insert_key_here",
];

/// Dependency ranges with published advisories. Presence of the
/// package at all is flagged; real range resolution belongs to
/// `npm audit`.
const VULNERABLE_PACKAGES: &[(&str, &str, &str)] = &[
    ("lodash", "< 4.17.21", "prototype pollution"),
    ("axios", "< 0.21.1", "SSRF"),
    ("node-fetch", "< 2.6.7", "information exposure"),
];

pub struct SecurityAnalyzer;

impl Analyzer for SecurityAnalyzer {
    fn name(&self) -> &'static str {
        "security"
    }

    fn analyze(&self, target: &AuditTarget) -> Result<Vec<Finding>> {
        let mut findings = Vec::new();

        let secrets = secret_patterns()?;
        for path in target.files_with_extensions(SECRET_EXTENSIONS) {
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default();
            if SKIP_FILES.contains(&name) {
                continue;
            }
            let Some(content) = read_lossy(&path) else {
                continue;
            };
            scan_secrets(&secrets, &target.relative(&path), &content, &mut findings);
        }

        if target.has_tech("javascript") {
            scan_npm_dependencies(&target.root, &mut findings);

            let antipatterns = antipattern_rules()?;
            for path in target.files_with_extensions(JS_EXTENSIONS) {
                let Some(content) = read_lossy(&path) else {
                    continue;
                };
                scan_antipatterns(
                    &antipatterns,
                    &target.relative(&path),
                    &content,
                    &mut findings,
                );
            }
        }

        Ok(findings)
    }
}

fn secret_patterns() -> Result<Vec<(&'static str, Regex)>> {
    Ok(vec![
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
    ])
}

fn is_placeholder(text: &str) -> bool {
    let lower = text.to_lowercase();
    PLACEHOLDERS.iter().any(|p| lower.contains(p))
}

fn scan_secrets(
    patterns: &[(&'static str, Regex)],
    file: &str,
    content: &str,
    findings: &mut Vec<Finding>,
) {
    for (name, pattern) in patterns {
        for m in pattern.find_iter(content) {
            if is_placeholder(m.as_str()) {
                continue;
            }
            let line = content[..m.start()].matches('\n').count() + 1;
            findings.push(Finding {
                severity: Severity::Critical,
                category: "security".to_string(),
                subcategory: "secrets".to_string(),
                file: file.to_string(),
                line,
                message: format!("Potential {} found in code", name),
                remediation: "Remove the secret, rotate the credential, and load it from the environment or a secret manager".to_string(),
                effort: Effort::Low,
            });
        }
    }
}

fn scan_npm_dependencies(root: &Path, findings: &mut Vec<Finding>) {
    let Some(content) = read_lossy(&root.join("package.json")) else {
        return;
    };
    let Ok(pkg) = serde_json::from_str::<serde_json::Value>(&content) else {
        return;
    };

    for (name, fixed_range, issue) in VULNERABLE_PACKAGES {
        let declared = ["dependencies", "devDependencies"]
            .iter()
            .find_map(|key| pkg.get(key).and_then(|d| d.get(name)))
            .and_then(|v| v.as_str());
        if let Some(version) = declared {
            findings.push(Finding {
                severity: Severity::High,
                category: "security".to_string(),
                subcategory: "dependencies".to_string(),
                file: "package.json".to_string(),
                line: 0,
                message: format!(
                    "Potentially vulnerable dependency {} ({}): versions {} have a {} advisory",
                    name, version, fixed_range, issue
                ),
                remediation: format!(
                    "Update {} to {} or later and run npm audit",
                    name,
                    fixed_range.replace("< ", ">= ")
                ),
                effort: Effort::Low,
            });
        }
    }
}

fn antipattern_rules() -> Result<Vec<(Regex, &'static str, &'static str)>> {
    Ok(vec![
        (
            Regex::new(r"\beval\s*\(")?,
            "Use of eval()",
            "Refactor to avoid eval(); it executes arbitrary code",
        ),
        (
            Regex::new(r"dangerouslySetInnerHTML")?,
            "dangerouslySetInnerHTML without sanitization",
            "Sanitize the HTML content or render text instead",
        ),
        (
            Regex::new(r"\.innerHTML\s*=")?,
            "Direct innerHTML assignment",
            "Use textContent for text or sanitize HTML before assigning",
        ),
        (
            Regex::new(r"document\.write\s*\(")?,
            "Use of document.write()",
            "Use DOM manipulation methods instead",
        ),
    ])
}

fn scan_antipatterns(
    rules: &[(Regex, &'static str, &'static str)],
    file: &str,
    content: &str,
    findings: &mut Vec<Finding>,
) {
    for (pattern, message, remediation) in rules {
        for (idx, line) in content.lines().enumerate() {
            if pattern.is_match(line) {
                findings.push(Finding {
                    severity: Severity::High,
                    category: "security".to_string(),
                    subcategory: "code_security".to_string(),
                    file: file.to_string(),
                    line: idx + 1,
                    message: message.to_string(),
                    remediation: remediation.to_string(),
                    effort: Effort::Medium,
                });
            }
        }
    }
}
