//! Core data models used throughout skilldex.
//!
//! These types represent audit findings, analyzer reports, and the
//! conversation records that flow through the processing and search
//! pipeline.

use serde::Serialize;

/// Severity of a single finding, ordered from most to least urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }

    /// Penalty weight applied against an analyzer's 100-point score.
    pub fn score_weight(&self) -> u32 {
        match self {
            Severity::Critical => 10,
            Severity::High => 5,
            Severity::Medium => 2,
            Severity::Low => 1,
            Severity::Info => 0,
        }
    }

    /// Estimated remediation hours for the SQALE debt ratio.
    pub fn remediation_hours(&self) -> f64 {
        match self {
            Severity::Critical => 8.0,
            Severity::High => 4.0,
            Severity::Medium => 2.0,
            Severity::Low => 0.5,
            Severity::Info => 0.0,
        }
    }
}

/// Estimated effort to fix a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Effort {
    Low,
    Medium,
    High,
}

impl Effort {
    pub fn as_str(&self) -> &'static str {
        match self {
            Effort::Low => "low",
            Effort::Medium => "medium",
            Effort::High => "high",
        }
    }
}

/// One detected issue.
#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub severity: Severity,
    pub category: String,
    pub subcategory: String,
    pub file: String,
    pub line: usize,
    pub message: String,
    pub remediation: String,
    pub effort: Effort,
}

/// Output of a single analyzer: its findings and a 0-100 score.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzerReport {
    pub analyzer: String,
    pub score: f64,
    pub findings: Vec<Finding>,
}

/// What discovery learned about the target before analyzers ran.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoverySummary {
    pub tech_stack: Vec<String>,
    pub project_type: String,
    pub file_count: usize,
    pub total_lines: usize,
}

/// Full audit output: discovery, per-analyzer reports, and overall scores.
#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub target: String,
    pub discovery: DiscoverySummary,
    pub reports: Vec<AnalyzerReport>,
    pub overall_score: f64,
    pub sqale_rating: char,
    pub generated_at: String,
}

impl AuditReport {
    pub fn all_findings(&self) -> impl Iterator<Item = &Finding> {
        self.reports.iter().flat_map(|r| r.findings.iter())
    }

    pub fn total_findings(&self) -> usize {
        self.reports.iter().map(|r| r.findings.len()).sum()
    }
}

/// One parsed session log as stored in the conversations table.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationRecord {
    pub id: String,
    pub project_path: String,
    pub timestamp: String,
    pub message_count: i64,
    pub user_messages: i64,
    pub assistant_messages: i64,
    pub files_read: Vec<String>,
    pub files_written: Vec<String>,
    pub files_edited: Vec<String>,
    pub tools_used: Vec<String>,
    pub topics: Vec<String>,
    pub first_user_message: Option<String>,
    pub last_assistant_message: Option<String>,
    pub conversation_hash: String,
    pub file_size_bytes: i64,
}

/// A conversation matched by search, with its score and how it matched.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub record: ConversationRecord,
    /// Cosine similarity for semantic hits; 0.0 for filter-only matches.
    pub score: f64,
    pub match_kind: String,
}

/// Score an analyzer's findings: 100 minus severity-weighted penalties,
/// with the penalty capped at 100. No findings scores 100.
pub fn analyzer_score(findings: &[Finding]) -> f64 {
    let penalty: u32 = findings.iter().map(|f| f.severity.score_weight()).sum();
    let penalty = penalty.min(100);
    100.0 - penalty as f64
}

/// Overall score: arithmetic mean of analyzer scores, one decimal.
pub fn overall_score(reports: &[AnalyzerReport]) -> f64 {
    if reports.is_empty() {
        return 100.0;
    }
    let sum: f64 = reports.iter().map(|r| r.score).sum();
    let mean = sum / reports.len() as f64;
    (mean * 10.0).round() / 10.0
}

/// SQALE rating: estimated remediation time over development time
/// (LOC / 50 hours), graded A-E.
pub fn sqale_rating<'a>(findings: impl Iterator<Item = &'a Finding>, total_lines: usize) -> char {
    let remediation: f64 = findings.map(|f| f.severity.remediation_hours()).sum();
    let development = total_lines as f64 / 50.0;
    if development <= 0.0 {
        return 'A';
    }
    let debt_ratio = remediation / development * 100.0;

    if debt_ratio <= 5.0 {
        'A'
    } else if debt_ratio <= 10.0 {
        'B'
    } else if debt_ratio <= 20.0 {
        'C'
    } else if debt_ratio <= 50.0 {
        'D'
    } else {
        'E'
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(severity: Severity) -> Finding {
        Finding {
            severity,
            category: "quality".to_string(),
            subcategory: "test".to_string(),
            file: "src/app.ts".to_string(),
            line: 1,
            message: "test finding".to_string(),
            remediation: "fix it".to_string(),
            effort: Effort::Low,
        }
    }

    #[test]
    fn test_score_no_findings_is_perfect() {
        assert_eq!(analyzer_score(&[]), 100.0);
    }

    #[test]
    fn test_score_weights() {
        let findings = vec![
            finding(Severity::Critical), // 10
            finding(Severity::High),     // 5
            finding(Severity::Medium),   // 2
            finding(Severity::Low),      // 1
        ];
        assert_eq!(analyzer_score(&findings), 82.0);
    }

    #[test]
    fn test_score_penalty_capped() {
        let findings: Vec<Finding> = (0..20).map(|_| finding(Severity::Critical)).collect();
        assert_eq!(analyzer_score(&findings), 0.0);
    }

    #[test]
    fn test_overall_score_mean() {
        let reports = vec![
            AnalyzerReport {
                analyzer: "a".to_string(),
                score: 100.0,
                findings: vec![],
            },
            AnalyzerReport {
                analyzer: "b".to_string(),
                score: 81.0,
                findings: vec![],
            },
        ];
        assert_eq!(overall_score(&reports), 90.5);
    }

    #[test]
    fn test_overall_score_empty() {
        assert_eq!(overall_score(&[]), 100.0);
    }

    #[test]
    fn test_sqale_clean_project() {
        let findings: Vec<Finding> = vec![];
        assert_eq!(sqale_rating(findings.iter(), 5000), 'A');
    }

    #[test]
    fn test_sqale_zero_lines_is_a() {
        let findings = vec![finding(Severity::Critical)];
        assert_eq!(sqale_rating(findings.iter(), 0), 'A');
    }

    #[test]
    fn test_sqale_boundaries() {
        // 1000 LOC => 20 development hours.
        // One medium (2h) => ratio 10% => B (boundary inclusive).
        let findings = vec![finding(Severity::Medium)];
        assert_eq!(sqale_rating(findings.iter(), 1000), 'B');

        // One critical (8h) => ratio 40% => D.
        let findings = vec![finding(Severity::Critical)];
        assert_eq!(sqale_rating(findings.iter(), 1000), 'D');

        // Three criticals (24h) => ratio 120% => E.
        let findings: Vec<Finding> = (0..3).map(|_| finding(Severity::Critical)).collect();
        assert_eq!(sqale_rating(findings.iter(), 1000), 'E');

        // One low (0.5h) => ratio 2.5% => A.
        let findings = vec![finding(Severity::Low)];
        assert_eq!(sqale_rating(findings.iter(), 1000), 'A');
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical < Severity::High);
        assert!(Severity::High < Severity::Medium);
        assert!(Severity::Low < Severity::Info);
    }
}
