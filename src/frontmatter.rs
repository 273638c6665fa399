//! SKILL.md frontmatter parsing and field rules.
//!
//! Every skill descriptor starts with a YAML frontmatter block holding
//! at least `name` and `description`. The skill and release validators
//! share this module so the two never disagree about what a valid
//! frontmatter looks like.

use std::sync::OnceLock;

use anyhow::Result;
use regex::Regex;
use serde::Deserialize;

/// Maximum skill name length (marketplace spec limit).
pub const MAX_NAME_LENGTH: usize = 64;
/// Maximum description length (marketplace spec limit).
pub const MAX_DESCRIPTION_LENGTH: usize = 1024;
/// Minimum description length for a meaningful entry.
pub const MIN_DESCRIPTION_LENGTH: usize = 50;

/// Fields recognized in SKILL.md frontmatter. Unknown keys are kept
/// out of the struct but do not fail parsing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Frontmatter {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

fn frontmatter_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^---\s*\n([\s\S]*?)\n---\s*\n([\s\S]*)$").unwrap())
}

fn semver_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\d+\.\d+\.\d+(-[a-zA-Z0-9.-]+)?(\+[a-zA-Z0-9.-]+)?$").unwrap()
    })
}

fn kebab_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9-]+$").unwrap())
}

/// Split content into (yaml frontmatter, body). `None` when the file
/// does not open with a frontmatter block.
pub fn extract(content: &str) -> Option<(&str, &str)> {
    let captures = frontmatter_re().captures(content)?;
    let yaml = captures.get(1)?.as_str();
    let body = captures.get(2).map(|m| m.as_str()).unwrap_or("");
    Some((yaml, body))
}

/// Parse the frontmatter block of a SKILL.md file. Block scalars
/// (`>-`, `|`) are folded by serde_yaml, so multi-line descriptions
/// come back as single strings.
pub fn parse(content: &str) -> Result<(Frontmatter, &str)> {
    let (yaml, body) = extract(content)
        .ok_or_else(|| anyhow::anyhow!("No YAML frontmatter block found (expected leading ---)"))?;
    let frontmatter: Frontmatter =
        serde_yaml::from_str(yaml).map_err(|e| anyhow::anyhow!("Invalid frontmatter YAML: {}", e))?;
    Ok((frontmatter, body))
}

pub fn is_valid_semver(version: &str) -> bool {
    semver_re().is_match(version)
}

pub fn is_kebab_case(name: &str) -> bool {
    kebab_re().is_match(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_and_parse() {
        let content = "---\nname: code-reviewer\ndescription: Reviews code for best practices. Use when reviewing pull requests.\nversion: 1.2.0\n---\n\n# Code Reviewer\n";
        let (fm, body) = parse(content).unwrap();
        assert_eq!(fm.name.as_deref(), Some("code-reviewer"));
        assert_eq!(fm.version.as_deref(), Some("1.2.0"));
        assert!(body.contains("# Code Reviewer"));
    }

    #[test]
    fn test_extract_requires_leading_block() {
        assert!(extract("# No frontmatter here\n").is_none());
        // Missing closing delimiter.
        assert!(extract("---\nname: x\n").is_none());
    }

    #[test]
    fn test_block_scalar_description_folds() {
        let content = "---\nname: demo\ndescription: >-\n  Validates marketplace manifests and skill bundles.\n  Use when preparing a release.\n---\nbody\n";
        let (fm, _) = parse(content).unwrap();
        let desc = fm.description.unwrap();
        assert!(desc.contains("Validates marketplace manifests"));
        assert!(!desc.contains('\n'));
    }

    #[test]
    fn test_semver() {
        assert!(is_valid_semver("1.0.0"));
        assert!(is_valid_semver("2.1.3-beta.1"));
        assert!(is_valid_semver("1.0.0+build.5"));
        assert!(!is_valid_semver("1.0"));
        assert!(!is_valid_semver("v1.0.0"));
    }

    #[test]
    fn test_kebab_case() {
        assert!(is_kebab_case("codebase-auditor"));
        assert!(!is_kebab_case("Codebase_Auditor"));
        assert!(!is_kebab_case("skill name"));
    }
}
