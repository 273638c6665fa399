//! Skill quality validation.
//!
//! Scores each skill directory across seven weighted dimensions
//! (structure, frontmatter, spec limits, description quality,
//! progressive disclosure, instructions, testing docs). A skill passes
//! with no errors and a weighted score of at least 70.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use regex::Regex;
use std::sync::OnceLock;

use crate::frontmatter::{
    self, Frontmatter, MAX_DESCRIPTION_LENGTH, MAX_NAME_LENGTH, MIN_DESCRIPTION_LENGTH,
};

const MAX_SKILL_MD_LINES: usize = 200;

const WEIGHTS: &[(&str, f64)] = &[
    ("file_structure", 0.10),
    ("frontmatter", 0.15),
    ("spec_compliance", 0.15),
    ("description_quality", 0.20),
    ("progressive_disclosure", 0.20),
    ("main_instructions", 0.10),
    ("testing_invocation", 0.10),
];

const ACTION_VERBS: &[&str] = &[
    "validates", "generates", "creates", "audits", "analyzes", "automates", "detects",
    "provides", "extracts", "configures", "transforms", "builds", "processes", "enables",
    "supports",
];

/// Scored validation result for one skill directory.
#[derive(Debug)]
pub struct SkillValidation {
    pub path: String,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub score: f64,
}

impl SkillValidation {
    pub fn passed(&self) -> bool {
        self.errors.is_empty() && self.score >= 70.0
    }

    pub fn grade(&self) -> char {
        grade(self.score)
    }
}

pub fn grade(score: f64) -> char {
    if score >= 90.0 {
        'A'
    } else if score >= 80.0 {
        'B'
    } else if score >= 70.0 {
        'C'
    } else if score >= 60.0 {
        'D'
    } else {
        'F'
    }
}

pub fn run_skills(root: &Path, target: Option<&Path>, verbose: bool) -> Result<()> {
    let skill_dirs = discover_skills(root, target)?;
    if skill_dirs.is_empty() {
        println!("No skills found to validate.");
        return Ok(());
    }

    let mut results: Vec<SkillValidation> = skill_dirs
        .iter()
        .map(|dir| validate_skill(root, dir))
        .collect();
    results.sort_by(|a, b| a.path.cmp(&b.path));

    println!("Skills Validation Results");
    println!("{}", "=".repeat(60));
    let mut passed_count = 0usize;
    let mut total_score = 0.0;
    for result in &results {
        let status = if result.passed() {
            passed_count += 1;
            "PASS"
        } else {
            "FAIL"
        };
        println!(
            "{} {} ({:.0}%) {}",
            status,
            result.grade(),
            result.score,
            result.path
        );
        for error in &result.errors {
            println!("     error: {}", error);
        }
        if verbose || !result.passed() {
            let shown = if verbose { result.warnings.len() } else { 3 };
            for warning in result.warnings.iter().take(shown) {
                println!("     warning: {}", warning);
            }
            if result.warnings.len() > shown {
                println!("     ... and {} more warnings", result.warnings.len() - shown);
            }
        }
        total_score += result.score;
    }

    let avg = total_score / results.len() as f64;
    println!("{}", "=".repeat(60));
    println!("Total skills:  {}", results.len());
    println!("Passed:        {}/{}", passed_count, results.len());
    println!("Average score: {:.0}% (Grade {})", avg, grade(avg));

    if passed_count == results.len() {
        Ok(())
    } else {
        bail!("{} skill(s) failed validation", results.len() - passed_count);
    }
}

/// Skill directories under `plugins/*/skills/` or `skills/`, or under
/// an explicit target. A skill directory is any directory containing
/// a SKILL.md.
pub fn discover_skills(root: &Path, target: Option<&Path>) -> Result<Vec<PathBuf>> {
    if let Some(target) = target {
        let target = if target.is_absolute() {
            target.to_path_buf()
        } else {
            root.join(target)
        };
        if !target.is_dir() {
            bail!("{} is not a directory", target.display());
        }
        if target.join("SKILL.md").exists() {
            return Ok(vec![target]);
        }
        let mut dirs = Vec::new();
        collect_skill_dirs(&target, &mut dirs)?;
        return Ok(dirs);
    }

    let plugins_dir = root.join("plugins");
    let skills_dir = root.join("skills");
    let mut dirs = Vec::new();

    if plugins_dir.is_dir() {
        for entry in std::fs::read_dir(&plugins_dir)? {
            let plugin_skills = entry?.path().join("skills");
            if plugin_skills.is_dir() {
                collect_skill_dirs(&plugin_skills, &mut dirs)?;
            }
        }
    } else if skills_dir.is_dir() {
        collect_skill_dirs(&skills_dir, &mut dirs)?;
    } else {
        bail!("Neither plugins/ nor skills/ directory found under {}", root.display());
    }
    Ok(dirs)
}

fn collect_skill_dirs(base: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(base)? {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }
        if path.join("SKILL.md").exists() {
            out.push(path);
        } else {
            collect_skill_dirs(&path, out)?;
        }
    }
    Ok(())
}

pub fn validate_skill(root: &Path, dir: &Path) -> SkillValidation {
    let rel = dir
        .strip_prefix(root)
        .unwrap_or(dir)
        .to_string_lossy()
        .to_string();
    let mut v = Validator {
        dir,
        errors: Vec::new(),
        warnings: Vec::new(),
    };

    let content = match std::fs::read_to_string(dir.join("SKILL.md")) {
        Ok(content) => content,
        Err(_) => {
            return SkillValidation {
                path: rel,
                errors: vec!["Missing SKILL.md file".to_string()],
                warnings: Vec::new(),
                score: 0.0,
            };
        }
    };

    let fm = match frontmatter::parse(&content) {
        Ok((fm, _)) => fm,
        Err(e) => {
            v.errors.push(e.to_string());
            Frontmatter::default()
        }
    };

    let scores = [
        ("file_structure", v.file_structure()),
        ("frontmatter", v.frontmatter(&fm)),
        ("spec_compliance", v.spec_compliance(&fm, &content)),
        ("description_quality", v.description_quality(&fm)),
        ("progressive_disclosure", v.progressive_disclosure(&content)),
        ("main_instructions", v.main_instructions(&content)),
        ("testing_invocation", v.testing_invocation(&content)),
    ];

    let score = WEIGHTS
        .iter()
        .map(|(name, weight)| {
            let dim = scores
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, s)| *s)
                .unwrap_or(0.0);
            dim * weight
        })
        .sum();

    SkillValidation {
        path: rel,
        errors: v.errors,
        warnings: v.warnings,
        score,
    }
}

struct Validator<'a> {
    dir: &'a Path,
    errors: Vec<String>,
    warnings: Vec<String>,
}

pub(crate) fn md_link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").unwrap())
}

fn header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^#{1,3} ").unwrap())
}

impl Validator<'_> {
    fn file_structure(&mut self) -> f64 {
        let mut score: f64 = 100.0;
        for required in ["SKILL.md", "README.md", "CHANGELOG.md"] {
            if !self.dir.join(required).exists() {
                self.errors.push(format!("Missing required file: {}", required));
                score -= 20.0;
            }
        }
        if self.dir.join("plugin.json").exists() {
            self.warnings
                .push("Contains plugin.json (not part of the skill schema)".to_string());
            score -= 5.0;
        }
        score.max(0.0)
    }

    fn frontmatter(&mut self, fm: &Frontmatter) -> f64 {
        let mut score: f64 = 100.0;
        match &fm.name {
            None => {
                self.errors
                    .push("Frontmatter missing required field: name".to_string());
                score -= 30.0;
            }
            Some(name) => {
                if !frontmatter::is_kebab_case(name) {
                    self.warnings.push(format!(
                        "Name '{}' should be lowercase with hyphens (kebab-case)",
                        name
                    ));
                    score -= 10.0;
                }
            }
        }
        if fm.description.is_none() {
            self.errors
                .push("Frontmatter missing required field: description".to_string());
            score -= 30.0;
        }
        score.max(0.0)
    }

    fn spec_compliance(&mut self, fm: &Frontmatter, content: &str) -> f64 {
        let mut score: f64 = 100.0;

        if let Some(name) = &fm.name {
            if name.len() > MAX_NAME_LENGTH {
                self.errors.push(format!(
                    "Name exceeds limit: {}/{} chars",
                    name.len(),
                    MAX_NAME_LENGTH
                ));
                score -= 30.0;
            }
            let dir_name = self
                .dir
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            if *name != dir_name {
                self.errors.push(format!(
                    "Name '{}' does not match directory '{}'",
                    name, dir_name
                ));
                score -= 25.0;
            }
        }

        if let Some(desc) = &fm.description {
            if desc.len() > MAX_DESCRIPTION_LENGTH {
                self.errors.push(format!(
                    "Description exceeds limit: {}/{} chars",
                    desc.len(),
                    MAX_DESCRIPTION_LENGTH
                ));
                score -= 20.0;
            }
            let words = desc.split_whitespace().count();
            if words > 150 {
                self.warnings
                    .push(format!("Description has {} words (recommended: ~100)", words));
                score -= 5.0;
            }
        }

        if fm.version.is_none() {
            self.warnings
                .push("Missing 'version' field in frontmatter".to_string());
            score -= 10.0;
        }

        self.check_referenced_files(content);
        self.check_script_permissions();

        score.max(0.0)
    }

    /// Local markdown links must resolve relative to the skill dir.
    fn check_referenced_files(&mut self, content: &str) {
        for captures in md_link_re().captures_iter(content) {
            let path = &captures[2];
            if path.starts_with("http") || path.starts_with('#') {
                continue;
            }
            // Strip anchors before checking the filesystem.
            let file_part = path.split('#').next().unwrap_or(path);
            if !self.dir.join(file_part).exists() {
                self.warnings.push(format!("Referenced file not found: {}", path));
            }
        }
    }

    fn check_script_permissions(&mut self) {
        let scripts = self.dir.join("scripts");
        if !scripts.is_dir() {
            return;
        }
        for entry in walkdir::WalkDir::new(&scripts)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("sh") {
                continue;
            }
            if !is_executable(path) {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                self.warnings
                    .push(format!("Script missing execute permission: {}", name));
            }
        }
    }

    fn description_quality(&mut self, fm: &Frontmatter) -> f64 {
        let Some(desc) = &fm.description else {
            return 0.0;
        };
        let mut score: f64 = 100.0;
        let lower = desc.to_lowercase();

        if desc.len() < MIN_DESCRIPTION_LENGTH {
            self.warnings.push(format!(
                "Description too short ({} chars, min {})",
                desc.len(),
                MIN_DESCRIPTION_LENGTH
            ));
            score -= 15.0;
        }

        if !lower.contains("when") && !lower.contains("for") {
            self.warnings
                .push("Consider adding trigger context ('When...' or 'Use when...')".to_string());
            score -= 10.0;
        }

        if !ACTION_VERBS.iter().any(|v| lower.contains(v)) {
            self.warnings.push(
                "Description lacks specific action verbs (validates, generates, creates, etc.)"
                    .to_string(),
            );
            score -= 15.0;
        }

        let boundary_markers = ["not for", "not suitable", "cannot", "doesn't", "limitations"];
        if !boundary_markers.iter().any(|m| lower.contains(m)) {
            self.warnings
                .push("Description should state what the skill is NOT for".to_string());
            score -= 10.0;
        }

        let use_case_markers = ["when", "for", "use case", "use for"];
        if !use_case_markers.iter().any(|m| lower.contains(m)) {
            self.warnings
                .push("Description should include specific use cases".to_string());
            score -= 10.0;
        }

        score.max(0.0)
    }

    fn progressive_disclosure(&mut self, content: &str) -> f64 {
        let mut score: f64 = 100.0;
        let line_count = content.lines().count();

        if line_count > MAX_SKILL_MD_LINES {
            let over = line_count - MAX_SKILL_MD_LINES;
            self.warnings.push(format!(
                "SKILL.md has {} lines (target <= {}, over by {})",
                line_count, MAX_SKILL_MD_LINES, over
            ));
            score -= (over / 10 * 5).min(30) as f64;
        }

        let refs = ["workflow/", "modes/", "reference/", "examples/"]
            .iter()
            .filter(|r| content.contains(*r))
            .count();
        if refs == 0 && line_count > 150 {
            self.warnings.push(
                "Large SKILL.md without references to workflow/, reference/, or examples/"
                    .to_string(),
            );
            score -= 20.0;
        }

        score.max(0.0)
    }

    fn main_instructions(&mut self, content: &str) -> f64 {
        let mut score: f64 = 100.0;
        let lower = content.to_lowercase();

        if !lower.contains("## overview") && !lower.contains("# overview") {
            self.warnings
                .push("Missing recommended section: overview".to_string());
            score -= 15.0;
        }
        let when_markers = ["## when to use", "trigger phrase", "use case"];
        if !when_markers.iter().any(|m| lower.contains(m)) {
            self.warnings
                .push("Missing recommended section: when to use".to_string());
            score -= 15.0;
        }

        if !header_re().is_match(content) {
            self.warnings
                .push("SKILL.md lacks markdown headers for structure".to_string());
            score -= 10.0;
        }

        if !lower.contains("limitation") && !lower.contains("not for") {
            self.warnings
                .push("Missing limitations or 'NOT for' section".to_string());
            score -= 10.0;
        }

        score.max(0.0)
    }

    fn testing_invocation(&mut self, content: &str) -> f64 {
        let mut score: f64 = 100.0;
        let lower = content.to_lowercase();

        if !lower.contains("trigger") {
            self.warnings
                .push("Missing trigger phrases documentation".to_string());
            score -= 30.0;
        }
        if !lower.contains("example") && !content.contains("```") {
            self.warnings.push("No usage examples found".to_string());
            score -= 20.0;
        }

        score.max(0.0)
    }
}

#[cfg(unix)]
pub(crate) fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
pub(crate) fn is_executable(_path: &Path) -> bool {
    true
}
