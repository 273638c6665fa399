//! Codebase audit engine.
//!
//! Orchestrates static analysis of a target tree: a lightweight
//! discovery pass (tech stack, project type, file and line counts)
//! followed by the selected analyzers. Each analyzer implements
//! [`Analyzer`] and runs catch-and-continue, so one failing analyzer
//! never aborts the audit.
//!
//! ```text
//! discover(target) ──► AuditTarget
//!                         │
//!        ┌────────────────┼────────────────┐
//!        ▼                ▼                ▼
//!    quality          security         testing  (context opt-in)
//!        └────────────────┼────────────────┘
//!                         ▼
//!            AuditReport ──► text | json | markdown
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::analyzer_context::ContextAnalyzer;
use crate::analyzer_quality::QualityAnalyzer;
use crate::analyzer_security::SecurityAnalyzer;
use crate::analyzer_testing::TestingAnalyzer;
use crate::config::Config;
use crate::models::{
    analyzer_score, overall_score, sqale_rating, AnalyzerReport, AuditReport, DiscoverySummary,
    Finding,
};

/// Extensions counted as source code during discovery.
const SOURCE_EXTENSIONS: &[&str] = &["js", "jsx", "ts", "tsx", "py", "java", "go", "rs", "rb"];

/// A static analyzer that inspects the target tree and reports findings.
pub trait Analyzer {
    /// Scope name used by `--scope` and in report sections.
    fn name(&self) -> &'static str;

    /// Inspect the target and return findings. Errors are reported as
    /// warnings by the engine; the audit continues without this
    /// analyzer's section.
    fn analyze(&self, target: &AuditTarget) -> Result<Vec<Finding>>;
}

/// Everything an analyzer needs to know about the tree under audit.
pub struct AuditTarget {
    pub root: PathBuf,
    pub discovery: DiscoverySummary,
    exclude: GlobSet,
}

impl AuditTarget {
    /// Walk the target once and collect the discovery summary.
    pub fn discover(root: &Path, exclude_dirs: &[String]) -> Result<Self> {
        let exclude = build_exclude_set(exclude_dirs)?;

        let mut file_count = 0usize;
        let mut total_lines = 0usize;
        let mut has_ts = false;
        let mut has_py = false;

        for entry in WalkDir::new(root)
            .into_iter()
            .filter_entry(|e| !exclude.is_match(e.path()))
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            file_count += 1;

            let ext = entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or_default();
            match ext {
                "ts" | "tsx" => has_ts = true,
                "py" => has_py = true,
                _ => {}
            }
            if SOURCE_EXTENSIONS.contains(&ext) {
                if let Some(content) = read_lossy(entry.path()) {
                    total_lines += count_code_lines(&content);
                }
            }
        }

        let package = read_package_json(root);
        let tech_stack = detect_tech_stack(root, package.as_ref(), has_ts, has_py);
        let project_type = detect_project_type(root, package.as_ref());

        Ok(Self {
            root: root.to_path_buf(),
            discovery: DiscoverySummary {
                tech_stack,
                project_type,
                file_count,
                total_lines,
            },
            exclude,
        })
    }

    pub fn has_tech(&self, name: &str) -> bool {
        self.discovery.tech_stack.iter().any(|t| t == name)
    }

    pub fn is_excluded(&self, path: &Path) -> bool {
        self.exclude.is_match(path)
    }

    /// All non-excluded files, in a stable walk order.
    pub fn all_files(&self) -> Vec<PathBuf> {
        self.walk().collect()
    }

    /// Non-excluded files whose extension is in `extensions` (no dots).
    pub fn files_with_extensions(&self, extensions: &[&str]) -> Vec<PathBuf> {
        self.walk()
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map_or(false, |ext| extensions.contains(&ext))
            })
            .collect()
    }

    /// Path relative to the audit root, as reported in findings.
    pub fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .display()
            .to_string()
    }

    fn walk(&self) -> impl Iterator<Item = PathBuf> + '_ {
        WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !self.exclude.is_match(e.path()))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
    }
}

pub fn run_audit(
    config: &Config,
    path: &Path,
    scope: Option<&str>,
    format: &str,
    output: Option<&Path>,
) -> Result<()> {
    match format {
        "text" | "json" | "markdown" => {}
        _ => bail!("Unknown output format: {}. Use text, json, or markdown.", format),
    }

    let report = build_report(config, path, scope)?;
    let rendered = render_report(&report, format)?;
    emit(&rendered, output)
}

/// Run discovery plus the selected analyzers and assemble the report.
/// Shared with the remediation planner.
pub fn build_report(config: &Config, path: &Path, scope: Option<&str>) -> Result<AuditReport> {
    if !path.exists() {
        bail!("Audit target does not exist: {}", path.display());
    }

    let target = AuditTarget::discover(path, &config.audit.exclude_dirs)?;
    let analyzers = select_analyzers(scope)?;

    let mut reports = Vec::new();
    for analyzer in &analyzers {
        match analyzer.analyze(&target) {
            Ok(findings) => reports.push(AnalyzerReport {
                analyzer: analyzer.name().to_string(),
                score: analyzer_score(&findings),
                findings,
            }),
            Err(err) => {
                eprintln!("Warning: {} analyzer failed: {:#}", analyzer.name(), err);
            }
        }
    }

    let overall = overall_score(&reports);
    let sqale = sqale_rating(
        reports.iter().flat_map(|r| r.findings.iter()),
        target.discovery.total_lines,
    );

    Ok(AuditReport {
        target: path.display().to_string(),
        discovery: target.discovery,
        reports,
        overall_score: overall,
        sqale_rating: sqale,
        generated_at: Utc::now().to_rfc3339(),
    })
}

fn select_analyzers(scope: Option<&str>) -> Result<Vec<Box<dyn Analyzer>>> {
    let names: Vec<&str> = match scope {
        Some(s) => s
            .split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .collect(),
        None => vec!["quality", "security", "testing"],
    };
    if names.is_empty() {
        bail!("--scope must name at least one analyzer");
    }

    names
        .iter()
        .map(|name| match *name {
            "quality" => Ok(Box::new(QualityAnalyzer) as Box<dyn Analyzer>),
            "security" => Ok(Box::new(SecurityAnalyzer) as Box<dyn Analyzer>),
            "testing" => Ok(Box::new(TestingAnalyzer) as Box<dyn Analyzer>),
            "context" => Ok(Box::new(ContextAnalyzer) as Box<dyn Analyzer>),
            other => bail!(
                "Unknown analyzer scope: {}. Use quality, security, testing, or context.",
                other
            ),
        })
        .collect()
}

// ============ Discovery helpers ============

fn build_exclude_set(exclude_dirs: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for name in exclude_dirs {
        builder.add(Glob::new(&format!("**/{}", name))?);
        builder.add(Glob::new(&format!("**/{}/**", name))?);
    }
    builder.build().map_err(Into::into)
}

fn read_package_json(root: &Path) -> Option<serde_json::Value> {
    let content = fs::read_to_string(root.join("package.json")).ok()?;
    serde_json::from_str(&content).ok()
}

fn detect_tech_stack(
    root: &Path,
    package: Option<&serde_json::Value>,
    has_ts: bool,
    has_py: bool,
) -> Vec<String> {
    let has_pkg = root.join("package.json").exists();
    let checks: [(&str, bool); 8] = [
        ("javascript", has_pkg),
        ("typescript", has_ts),
        (
            "python",
            root.join("setup.py").exists() || root.join("pyproject.toml").exists() || has_py,
        ),
        ("react", has_dependency(package, "react")),
        ("vue", has_dependency(package, "vue")),
        ("angular", has_dependency(package, "@angular/core")),
        ("node", has_pkg),
        ("docker", root.join("Dockerfile").exists()),
    ];

    checks
        .iter()
        .filter(|(_, present)| *present)
        .map(|(name, _)| name.to_string())
        .collect()
}

fn has_dependency(package: Option<&serde_json::Value>, name: &str) -> bool {
    let Some(pkg) = package else { return false };
    ["dependencies", "devDependencies"]
        .iter()
        .any(|key| pkg.get(key).and_then(|d| d.get(name)).is_some())
}

fn detect_project_type(root: &Path, package: Option<&serde_json::Value>) -> String {
    if let Some(pkg) = package {
        if pkg.get("private").and_then(|v| v.as_bool()) == Some(false) {
            return "library".to_string();
        }
        if pkg.get("bin").is_some() {
            return "cli".to_string();
        }
        return "web_app".to_string();
    }
    if root.join("setup.py").exists() {
        return "python_package".to_string();
    }
    "unknown".to_string()
}

/// Count non-blank lines that are not obviously comments.
fn count_code_lines(content: &str) -> usize {
    content
        .lines()
        .filter(|line| {
            let trimmed = line.trim();
            !trimmed.is_empty()
                && !trimmed.starts_with("//")
                && !trimmed.starts_with('#')
                && !trimmed.starts_with("/*")
                && !trimmed.starts_with('*')
        })
        .count()
}

/// Read a file as UTF-8, replacing invalid sequences. `None` on IO
/// errors so analyzers can skip unreadable files.
pub(crate) fn read_lossy(path: &Path) -> Option<String> {
    fs::read(path)
        .ok()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

pub(crate) fn emit(rendered: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            fs::write(path, rendered)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            println!("Report written to {}", path.display());
        }
        None => println!("{}", rendered),
    }
    Ok(())
}

// ============ Report rendering ============

fn render_report(report: &AuditReport, format: &str) -> Result<String> {
    match format {
        "json" => Ok(serde_json::to_string_pretty(report)?),
        "markdown" => Ok(render_markdown(report)),
        _ => Ok(render_text(report)),
    }
}

/// Location string for a finding: `file:line`, bare file, or
/// `(project)` for tree-wide findings.
fn location(finding: &Finding) -> String {
    if finding.file.is_empty() {
        "(project)".to_string()
    } else if finding.line > 0 {
        format!("{}:{}", finding.file, finding.line)
    } else {
        finding.file.clone()
    }
}

fn render_text(report: &AuditReport) -> String {
    let mut out = Vec::new();
    out.push(format!("Audit: {}", report.target));
    out.push(String::new());
    out.push(format!(
        "  Stack:   {}",
        if report.discovery.tech_stack.is_empty() {
            "none detected".to_string()
        } else {
            report.discovery.tech_stack.join(", ")
        }
    ));
    out.push(format!("  Type:    {}", report.discovery.project_type));
    out.push(format!("  Files:   {}", report.discovery.file_count));
    out.push(format!("  Lines:   {}", report.discovery.total_lines));

    for analyzer in &report.reports {
        out.push(String::new());
        out.push(format!(
            "[{}] score {:.1}/100 ({} finding{})",
            analyzer.analyzer,
            analyzer.score,
            analyzer.findings.len(),
            if analyzer.findings.len() == 1 { "" } else { "s" }
        ));
        for finding in &analyzer.findings {
            out.push(format!(
                "  {:<8} {}  {}",
                finding.severity.as_str(),
                location(finding),
                finding.message
            ));
            out.push(format!("           fix: {}", finding.remediation));
        }
    }

    out.push(String::new());
    out.push(format!("Overall score: {:.1}/100", report.overall_score));
    out.push(format!("SQALE rating:  {}", report.sqale_rating));

    out.join("\n")
}

fn render_markdown(report: &AuditReport) -> String {
    let mut out = Vec::new();
    out.push(format!("# Audit Report: {}", report.target));
    out.push(String::new());
    out.push(format!("**Generated:** {}", report.generated_at));
    out.push(format!(
        "**Stack:** {}",
        if report.discovery.tech_stack.is_empty() {
            "none detected".to_string()
        } else {
            report.discovery.tech_stack.join(", ")
        }
    ));
    out.push(format!("**Type:** {}", report.discovery.project_type));
    out.push(format!("**Files:** {}", report.discovery.file_count));
    out.push(format!("**Lines of code:** {}", report.discovery.total_lines));

    for analyzer in &report.reports {
        out.push(String::new());
        out.push(format!("## {} ({:.1}/100)", analyzer.analyzer, analyzer.score));
        out.push(String::new());
        if analyzer.findings.is_empty() {
            out.push("No findings.".to_string());
        }
        for finding in &analyzer.findings {
            out.push(format!(
                "- **{}** `{}`: {}",
                finding.severity.as_str(),
                location(finding),
                finding.message
            ));
            out.push(format!("  - Fix: {}", finding.remediation));
        }
    }

    out.push(String::new());
    out.push("## Summary".to_string());
    out.push(String::new());
    out.push(format!("**Overall score:** {:.1}/100", report.overall_score));
    out.push(format!("**SQALE rating:** {}", report.sqale_rating));

    out.join("\n")
}
