//! Testing analyzer: test-to-source file ratio and coverage report
//! thresholds (Istanbul/c8 summary format).

use anyhow::Result;
use serde_json::Value;

use crate::audit::{read_lossy, Analyzer, AuditTarget};
use crate::models::{Effort, Finding, Severity};

const SOURCE_EXTENSIONS: &[&str] = &["js", "jsx", "ts", "tsx", "py"];
const TEST_SUFFIXES: &[&str] = &[
    ".test.js", ".test.ts", ".test.jsx", ".test.tsx", ".spec.js", ".spec.ts",
];
const TEST_DIRS: &[&str] = &["__tests__", "tests", "test", "spec"];

const COVERAGE_REPORTS: &[&str] = &[
    "coverage/coverage-summary.json",
    "coverage/coverage-final.json",
    ".nyc_output/coverage-summary.json",
];

pub struct TestingAnalyzer;

impl Analyzer for TestingAnalyzer {
    fn name(&self) -> &'static str {
        "testing"
    }

    fn analyze(&self, target: &AuditTarget) -> Result<Vec<Finding>> {
        let mut findings = Vec::new();
        check_test_ratio(target, &mut findings);
        check_coverage_reports(target, &mut findings);
        Ok(findings)
    }
}

fn is_test_file(relative: &str) -> bool {
    if TEST_SUFFIXES.iter().any(|suffix| relative.ends_with(suffix)) {
        return true;
    }
    relative
        .split('/')
        .any(|part| TEST_DIRS.contains(&part))
}

fn check_test_ratio(target: &AuditTarget, findings: &mut Vec<Finding>) {
    let mut test_files = 0usize;
    let mut source_files = 0usize;

    for path in target.all_files() {
        let relative = target.relative(&path);
        if is_test_file(&relative) {
            test_files += 1;
        } else if path
            .extension()
            .and_then(|e| e.to_str())
            .map_or(false, |ext| SOURCE_EXTENSIONS.contains(&ext))
        {
            source_files += 1;
        }
    }

    if source_files == 0 {
        return;
    }
    let ratio = test_files as f64 / source_files as f64 * 100.0;

    let (severity, effort) = if ratio < 20.0 {
        (Severity::High, Effort::High)
    } else if ratio < 50.0 {
        (Severity::Medium, Effort::Medium)
    } else {
        return;
    };
    findings.push(Finding {
        severity,
        category: "testing".to_string(),
        subcategory: "test_coverage".to_string(),
        file: String::new(),
        line: 0,
        message: format!(
            "Low test file ratio ({:.1}%): {} test files for {} source files",
            ratio, test_files, source_files
        ),
        remediation: "Add tests for untested modules, critical paths first".to_string(),
        effort,
    });
}

fn check_coverage_reports(target: &AuditTarget, findings: &mut Vec<Finding>) {
    let Some((report_path, totals)) = read_coverage_totals(target) else {
        findings.push(Finding {
            severity: Severity::Medium,
            category: "testing".to_string(),
            subcategory: "test_infrastructure".to_string(),
            file: String::new(),
            line: 0,
            message: "No coverage report found".to_string(),
            remediation: "Configure the test runner to emit coverage (jest --coverage, vitest --coverage)".to_string(),
            effort: Effort::Low,
        });
        return;
    };

    if let Some(lines_pct) = pct(&totals, "lines") {
        if lines_pct < 80.0 {
            let severity = if lines_pct < 50.0 {
                Severity::High
            } else {
                Severity::Medium
            };
            findings.push(Finding {
                severity,
                category: "testing".to_string(),
                subcategory: "test_coverage".to_string(),
                file: report_path.clone(),
                line: 0,
                message: format!("Line coverage below target ({:.1}% of 80%)", lines_pct),
                remediation: format!("Add tests to raise line coverage by {:.1}%", 80.0 - lines_pct),
                effort: Effort::High,
            });
        }
    }

    if let Some(branches_pct) = pct(&totals, "branches") {
        if branches_pct < 75.0 {
            findings.push(Finding {
                severity: Severity::Medium,
                category: "testing".to_string(),
                subcategory: "test_coverage".to_string(),
                file: report_path,
                line: 0,
                message: format!("Branch coverage below target ({:.1}% of 75%)", branches_pct),
                remediation: "Add tests for edge cases and conditional branches".to_string(),
                effort: Effort::Medium,
            });
        }
    }
}

/// First parseable coverage report, as (relative path, `total` object).
fn read_coverage_totals(target: &AuditTarget) -> Option<(String, Value)> {
    for relative in COVERAGE_REPORTS {
        let path = target.root.join(relative);
        let Some(content) = read_lossy(&path) else {
            continue;
        };
        let Ok(parsed) = serde_json::from_str::<Value>(&content) else {
            continue;
        };
        if let Some(total) = parsed.get("total") {
            return Some((relative.to_string(), total.clone()));
        }
    }
    None
}

fn pct(totals: &Value, metric: &str) -> Option<f64> {
    totals.get(metric)?.get("pct")?.as_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyze_files(files: &[(&str, &str)]) -> Vec<Finding> {
        let tmp = tempfile::tempdir().unwrap();
        for (name, content) in files {
            let path = tmp.path().join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(path, content).unwrap();
        }
        let target = AuditTarget::discover(tmp.path(), &[]).unwrap();
        TestingAnalyzer.analyze(&target).unwrap()
    }

    #[test]
    fn test_is_test_file() {
        assert!(is_test_file("src/app.test.ts"));
        assert!(is_test_file("src/__tests__/util.js"));
        assert!(is_test_file("tests/integration.py"));
        assert!(!is_test_file("src/app.ts"));
        assert!(!is_test_file("src/contest.ts"));
    }

    #[test]
    fn test_low_ratio_is_high_severity() {
        let files: Vec<(String, &str)> = (0..10)
            .map(|i| (format!("src/mod{}.js", i), "const x = 1;\n"))
            .collect();
        let refs: Vec<(&str, &str)> = files.iter().map(|(n, c)| (n.as_str(), *c)).collect();
        let findings = analyze_files(&refs);
        let ratio = findings
            .iter()
            .find(|f| f.subcategory == "test_coverage")
            .unwrap();
        assert_eq!(ratio.severity, Severity::High);
    }

    #[test]
    fn test_healthy_ratio_no_finding() {
        let findings = analyze_files(&[
            ("src/a.js", "x"),
            ("src/b.js", "x"),
            ("src/a.test.js", "x"),
            ("src/b.test.js", "x"),
        ]);
        assert!(findings.iter().all(|f| f.subcategory != "test_coverage"));
    }

    #[test]
    fn test_coverage_thresholds() {
        let findings = analyze_files(&[
            ("src/a.js", "x"),
            ("src/a.test.js", "x"),
            (
                "coverage/coverage-summary.json",
                r#"{"total": {"lines": {"pct": 42.5}, "branches": {"pct": 60.0}}}"#,
            ),
        ]);
        let lines = findings
            .iter()
            .find(|f| f.message.contains("Line coverage"))
            .unwrap();
        assert_eq!(lines.severity, Severity::High);
        assert!(findings.iter().any(|f| f.message.contains("Branch coverage")));
    }

    #[test]
    fn test_missing_report_flagged_once() {
        let findings = analyze_files(&[("src/a.js", "x"), ("src/a.test.js", "x")]);
        assert_eq!(
            findings
                .iter()
                .filter(|f| f.subcategory == "test_infrastructure")
                .count(),
            1
        );
    }

    #[test]
    fn test_malformed_report_treated_as_missing() {
        let findings = analyze_files(&[
            ("src/a.js", "x"),
            ("src/a.test.js", "x"),
            ("coverage/coverage-summary.json", "not json"),
        ]);
        assert!(findings
            .iter()
            .any(|f| f.subcategory == "test_infrastructure"));
    }
}
