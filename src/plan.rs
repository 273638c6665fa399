//! Remediation planner.
//!
//! Turns an audit into a prioritized action plan: P0-P3 severity
//! buckets ordered by a priority score, effort subtotals in
//! person-days, and a suggested timeline.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Result};
use chrono::{Duration, Local};

use crate::audit::{build_report, emit};
use crate::config::Config;
use crate::models::{AuditReport, Effort, Finding, Severity};

pub fn run_plan(
    config: &Config,
    path: &Path,
    format: &str,
    output: Option<&Path>,
) -> Result<()> {
    match format {
        "markdown" | "text" => {}
        _ => bail!("Unknown output format: {}. Use markdown or text.", format),
    }

    let report = build_report(config, path, None)?;
    let rendered = render_plan(&report, format == "markdown");
    emit(&rendered, output)
}

/// Priority score: impact x 10 + frequency x 5 - effort x 2, floored
/// at zero. Impact follows severity, frequency follows category
/// (security and testing issues affect everything).
pub fn priority_score(finding: &Finding) -> i64 {
    let impact = match finding.severity {
        Severity::Critical => 10,
        Severity::High => 7,
        Severity::Medium => 4,
        Severity::Low => 2,
        Severity::Info => 1,
    };
    let frequency = match finding.category.as_str() {
        "security" | "testing" => 10,
        "quality" | "performance" => 6,
        _ => 3,
    };
    let effort = match finding.effort {
        Effort::Low => 2,
        Effort::Medium => 5,
        Effort::High => 8,
    };
    (impact * 10 + frequency * 5 - effort * 2).max(0)
}

fn effort_days(effort: Effort) -> f64 {
    match effort {
        Effort::Low => 0.5,
        Effort::Medium => 2.0,
        Effort::High => 5.0,
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Findings of one severity, ordered by descending priority score.
fn bucket<'a>(report: &'a AuditReport, severity: Severity) -> Vec<&'a Finding> {
    let mut findings: Vec<&Finding> = report
        .all_findings()
        .filter(|f| f.severity == severity)
        .collect();
    findings.sort_by_key(|f| std::cmp::Reverse(priority_score(f)));
    findings
}

fn render_plan(report: &AuditReport, markdown: bool) -> String {
    let h1 = if markdown { "# " } else { "" };
    let h2 = if markdown { "## " } else { "" };
    let today = Local::now().date_naive();

    let p0 = bucket(report, Severity::Critical);
    let p1 = bucket(report, Severity::High);
    let p2 = bucket(report, Severity::Medium);
    let p3 = bucket(report, Severity::Low);

    let mut out = Vec::new();
    out.push(format!("{}Remediation Plan: {}", h1, report.target));
    out.push(String::new());
    out.push(format!("Generated: {}", report.generated_at));
    out.push(format!(
        "Findings: {} (score {:.1}/100, SQALE {})",
        report.total_findings(),
        report.overall_score,
        report.sqale_rating
    ));

    if !p0.is_empty() {
        out.push(String::new());
        out.push(format!("{}P0: Critical (fix within 24 hours)", h2));
        out.push(String::new());
        for (i, finding) in p0.iter().enumerate() {
            out.push(format!(
                "{}. [{}] {} ({})",
                i + 1,
                finding.category,
                finding.message,
                location(finding)
            ));
            out.push(format!("   Action: {}", finding.remediation));
            out.push(format!(
                "   Effort: {} | Priority score: {}",
                finding.effort.as_str(),
                priority_score(finding)
            ));
        }
    }

    if !p1.is_empty() {
        out.push(String::new());
        out.push(format!("{}P1: High (fix within 2 weeks)", h2));
        out.push(String::new());
        for (i, finding) in p1.iter().take(10).enumerate() {
            out.push(format!(
                "{}. [{}] {} ({})",
                i + 1,
                finding.category,
                finding.message,
                location(finding)
            ));
            out.push(format!("   Action: {}", finding.remediation));
        }
        if p1.len() > 10 {
            out.push(format!("... and {} more high-priority findings", p1.len() - 10));
        }
    }

    if !p2.is_empty() {
        out.push(String::new());
        out.push(format!("{}P2: Medium (fix this quarter)", h2));
        out.push(String::new());
        out.push(format!("Total: {} findings, grouped by type:", p2.len()));
        for (subcategory, count) in group_by_subcategory(&p2) {
            out.push(format!("- {}: {}", subcategory, count));
        }
    }

    if !p3.is_empty() {
        out.push(String::new());
        out.push(format!("{}P3: Low (backlog)", h2));
        out.push(String::new());
        out.push(format!(
            "{} minor findings; address during dedicated cleanup time.",
            p3.len()
        ));
    }

    // Effort summary.
    let critical_high: f64 = p0
        .iter()
        .chain(p1.iter())
        .map(|f| effort_days(f.effort))
        .sum();
    let medium: f64 = p2.iter().map(|f| effort_days(f.effort)).sum();
    let low: f64 = p3.iter().map(|f| effort_days(f.effort)).sum();

    out.push(String::new());
    out.push(format!("{}Effort Summary", h2));
    out.push(String::new());
    out.push(format!(
        "Total estimated effort: {} person-days",
        round1(critical_high + medium + low)
    ));
    out.push(format!("- Critical/High: {} days", round1(critical_high)));
    out.push(format!("- Medium: {} days", round1(medium)));
    out.push(format!("- Low: {} days", round1(low)));

    out.push(String::new());
    out.push(format!("{}Suggested Timeline", h2));
    out.push(String::new());
    if !p0.is_empty() {
        out.push(format!("- {}: all P0 findings resolved", today + Duration::days(1)));
    }
    if !p1.is_empty() {
        out.push(format!("- {}: P1 findings addressed", today + Duration::weeks(2)));
    }
    if !p2.is_empty() {
        out.push(format!("- {}: P2 findings resolved", today + Duration::weeks(12)));
    }

    out.push(String::new());
    out.push("Priority scoring: impact x 10 + frequency x 5 - effort x 2.".to_string());

    out.join("\n")
}

fn group_by_subcategory(findings: &[&Finding]) -> BTreeMap<String, usize> {
    let mut groups = BTreeMap::new();
    for finding in findings {
        *groups.entry(finding.subcategory.clone()).or_insert(0) += 1;
    }
    groups
}

fn location(finding: &Finding) -> String {
    if finding.file.is_empty() {
        "project".to_string()
    } else if finding.line > 0 {
        format!("{}:{}", finding.file, finding.line)
    } else {
        finding.file.clone()
    }
}
