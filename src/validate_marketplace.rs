//! Marketplace manifest validation.
//!
//! Checks `.claude-plugin/marketplace.json` against the marketplace
//! schema: required fields, plugin entries, source isolation (root
//! sources duplicate the whole repository into every plugin cache),
//! and on-disk skill directories.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Result};
use serde_json::Value;

use crate::frontmatter;

/// Outcome of one marketplace validation pass.
#[derive(Debug, Default)]
pub struct MarketplaceReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub marketplace_name: String,
    pub plugin_count: usize,
    pub skill_count: usize,
}

impl MarketplaceReport {
    pub fn passed(&self) -> bool {
        self.errors.is_empty()
    }
}

pub fn run_marketplace(root: &Path) -> Result<()> {
    let report = validate_marketplace(root)?;

    for error in &report.errors {
        println!("error: {}", error);
    }
    for warning in &report.warnings {
        println!("warning: {}", warning);
    }

    if report.passed() {
        println!("Marketplace validation passed.");
        println!("  Marketplace:   {}", report.marketplace_name);
        println!("  Plugin groups: {}", report.plugin_count);
        println!("  Total skills:  {}", report.skill_count);
        println!("  Warnings:      {}", report.warnings.len());
        Ok(())
    } else {
        bail!("Marketplace validation failed with {} error(s)", report.errors.len());
    }
}

pub fn validate_marketplace(root: &Path) -> Result<MarketplaceReport> {
    let mut report = MarketplaceReport::default();

    let manifest_path = root.join(".claude-plugin").join("marketplace.json");
    let content = match std::fs::read_to_string(&manifest_path) {
        Ok(content) => content,
        Err(_) => {
            report
                .errors
                .push(format!("marketplace.json not found at {}", manifest_path.display()));
            return Ok(report);
        }
    };
    let manifest: Value = match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            report.errors.push(format!("Invalid JSON in marketplace.json: {}", e));
            return Ok(report);
        }
    };

    check_structure(&manifest, &mut report);
    check_owner(&manifest, &mut report);
    check_metadata(&manifest, &mut report);
    check_plugins(&manifest, &mut report);
    check_source_isolation(&manifest, &mut report);
    check_skill_references(&manifest, &mut report);
    check_skill_files(root, &manifest, &mut report);

    report.marketplace_name = manifest
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();
    if let Some(plugins) = plugins(&manifest) {
        report.plugin_count = plugins.len();
        report.skill_count = plugins
            .iter()
            .filter_map(|p| p.get("skills").and_then(|s| s.as_array()))
            .map(|s| s.len())
            .sum();
    }

    Ok(report)
}

fn plugins(manifest: &Value) -> Option<&Vec<Value>> {
    manifest.get("plugins")?.as_array()
}

fn plugin_name(plugin: &Value, idx: usize) -> String {
    plugin
        .get("name")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("plugin #{}", idx))
}

/// Skill paths of one plugin, string entries only.
fn skill_paths(plugin: &Value) -> Vec<&str> {
    plugin
        .get("skills")
        .and_then(|s| s.as_array())
        .map(|skills| skills.iter().filter_map(|s| s.as_str()).collect())
        .unwrap_or_default()
}

fn check_structure(manifest: &Value, report: &mut MarketplaceReport) {
    for field in ["name", "owner", "metadata", "plugins"] {
        if manifest.get(field).is_none() {
            report.errors.push(format!("Missing required field: '{}'", field));
        }
    }
}

fn check_owner(manifest: &Value, report: &mut MarketplaceReport) {
    let Some(owner) = manifest.get("owner") else {
        return;
    };
    if !owner.is_object() {
        report.errors.push("'owner' must be an object".to_string());
        return;
    }
    if owner.get("name").is_none() {
        report.errors.push("'owner.name' is required".to_string());
    }
    if owner.get("email").is_none() {
        report.warnings.push("'owner.email' is recommended".to_string());
    }
}

fn check_metadata(manifest: &Value, report: &mut MarketplaceReport) {
    let Some(metadata) = manifest.get("metadata") else {
        return;
    };
    if !metadata.is_object() {
        report.errors.push("'metadata' must be an object".to_string());
        return;
    }
    if metadata.get("description").is_none() {
        report
            .warnings
            .push("'metadata.description' is recommended".to_string());
    }
    match metadata.get("version").and_then(|v| v.as_str()) {
        None => report.warnings.push("'metadata.version' is recommended".to_string()),
        Some(version) if !frontmatter::is_valid_semver(version) => {
            report.warnings.push(format!(
                "Version '{}' does not follow semantic versioning (e.g. 1.0.0)",
                version
            ));
        }
        Some(_) => {}
    }
}

fn check_plugins(manifest: &Value, report: &mut MarketplaceReport) {
    let Some(plugins_value) = manifest.get("plugins") else {
        return;
    };
    let Some(plugins) = plugins_value.as_array() else {
        report.errors.push("'plugins' must be an array".to_string());
        return;
    };
    if plugins.is_empty() {
        report.warnings.push("No plugins defined in marketplace".to_string());
        return;
    }

    let mut names = HashSet::new();
    for (idx, plugin) in plugins.iter().enumerate() {
        let name = plugin_name(plugin, idx);

        for field in ["name", "description", "source", "strict", "skills"] {
            if plugin.get(field).is_none() {
                report
                    .errors
                    .push(format!("Plugin '{}': missing required field '{}'", name, field));
            }
        }

        if let Some(n) = plugin.get("name").and_then(|v| v.as_str()) {
            if !names.insert(n.to_string()) {
                report.errors.push(format!("Plugin '{}': duplicate plugin name", n));
            }
        }

        if let Some(source) = plugin.get("source") {
            match source.as_str() {
                None => report
                    .errors
                    .push(format!("Plugin '{}': 'source' must be a string", name)),
                Some(s) if !s.starts_with("./") => report
                    .warnings
                    .push(format!("Plugin '{}': source should start with './'", name)),
                Some(_) => {}
            }
        }

        if let Some(strict) = plugin.get("strict") {
            if !strict.is_boolean() {
                report
                    .errors
                    .push(format!("Plugin '{}': 'strict' must be a boolean", name));
            }
        }

        if let Some(skills) = plugin.get("skills") {
            match skills.as_array() {
                None => report
                    .errors
                    .push(format!("Plugin '{}': 'skills' must be an array", name)),
                Some(s) if s.is_empty() => report
                    .warnings
                    .push(format!("Plugin '{}': empty skills array", name)),
                Some(_) => {}
            }
        }
    }
}

/// Plugins sharing the repository root as their source get the whole
/// tree cached once per plugin. Skills make that an error; hooks-only
/// plugins get a warning.
fn check_source_isolation(manifest: &Value, report: &mut MarketplaceReport) {
    let Some(plugins) = plugins(manifest) else {
        return;
    };

    let mut with_skills = Vec::new();
    let mut hooks_only = Vec::new();

    for (idx, plugin) in plugins.iter().enumerate() {
        let Some(source) = plugin.get("source").and_then(|v| v.as_str()) else {
            continue;
        };
        if !matches!(source, "./" | "." | "") {
            continue;
        }
        if skill_paths(plugin).is_empty() {
            hooks_only.push(plugin_name(plugin, idx));
        } else {
            with_skills.push(plugin_name(plugin, idx));
        }
    }

    if !with_skills.is_empty() {
        report.errors.push(format!(
            "Cache duplication risk: plugin(s) [{}] use root source './'; use isolated paths like './plugins/<name>'",
            with_skills.join(", ")
        ));
    }
    if !hooks_only.is_empty() {
        report.warnings.push(format!(
            "Plugin(s) [{}] use root source './'; consider isolated paths for consistency",
            hooks_only.join(", ")
        ));
    }
}

fn check_skill_references(manifest: &Value, report: &mut MarketplaceReport) {
    let Some(plugins) = plugins(manifest) else {
        return;
    };

    let mut seen = HashSet::new();
    for (idx, plugin) in plugins.iter().enumerate() {
        let name = plugin_name(plugin, idx);
        let Some(skills) = plugin.get("skills").and_then(|s| s.as_array()) else {
            continue;
        };
        for skill in skills {
            let Some(path) = skill.as_str() else {
                report
                    .errors
                    .push(format!("Plugin '{}': skill path must be a string", name));
                continue;
            };
            if !path.starts_with("./") {
                report.warnings.push(format!(
                    "Plugin '{}': skill path '{}' should start with './'",
                    name, path
                ));
            }
            if !seen.insert(path.to_string()) {
                report
                    .warnings
                    .push(format!("Skill '{}' is referenced in multiple plugins", path));
            }
        }
    }
}

fn check_skill_files(root: &Path, manifest: &Value, report: &mut MarketplaceReport) {
    let Some(plugins) = plugins(manifest) else {
        return;
    };

    for (idx, plugin) in plugins.iter().enumerate() {
        let name = plugin_name(plugin, idx);
        for skill_path in skill_paths(plugin) {
            let skill_dir = root.join(skill_path.trim_start_matches("./"));

            if !skill_dir.exists() {
                report.errors.push(format!(
                    "Plugin '{}': skill directory not found: {}",
                    name, skill_path
                ));
                continue;
            }
            if !skill_dir.is_dir() {
                report.errors.push(format!(
                    "Plugin '{}': skill path is not a directory: {}",
                    name, skill_path
                ));
                continue;
            }

            let skill_md = skill_dir.join("SKILL.md");
            match std::fs::read_to_string(&skill_md) {
                Err(_) => {
                    report.errors.push(format!(
                        "Plugin '{}': missing SKILL.md at {}/SKILL.md",
                        name, skill_path
                    ));
                    continue;
                }
                Ok(content) if content.trim().is_empty() => {
                    report
                        .errors
                        .push(format!("Plugin '{}': SKILL.md is empty in {}", name, skill_path));
                }
                Ok(content) if content.len() < 100 => {
                    report.warnings.push(format!(
                        "Plugin '{}': SKILL.md seems very short in {} ({} chars)",
                        name,
                        skill_path,
                        content.len()
                    ));
                }
                Ok(_) => {}
            }

            // marketplace.json is the single source of truth.
            if skill_dir.join("plugin.json").exists() {
                report.warnings.push(format!(
                    "Skill '{}' contains plugin.json (marketplace.json already describes it)",
                    skill_path
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn valid_skill_md() -> String {
        format!(
            "---\nname: demo-skill\ndescription: {}\n---\n\n# Demo\n\n{}\n",
            "Validates demo things. Use when demoing the validator pipeline.",
            "Body text long enough to clear the length warning threshold for SKILL.md files."
        )
    }

    fn seed_valid_marketplace(root: &Path) {
        write(
            root,
            ".claude-plugin/marketplace.json",
            r#"{
                "name": "demo-marketplace",
                "owner": {"name": "Demo", "email": "demo@example.com"},
                "metadata": {"description": "demo", "version": "1.0.0"},
                "plugins": [
                    {
                        "name": "analysis",
                        "description": "analysis tools",
                        "source": "./plugins/analysis",
                        "strict": true,
                        "skills": ["./plugins/analysis/skills/demo-skill"]
                    }
                ]
            }"#,
        );
        write(
            root,
            "plugins/analysis/skills/demo-skill/SKILL.md",
            &valid_skill_md(),
        );
    }

    #[test]
    fn test_valid_marketplace_passes() {
        let tmp = tempfile::tempdir().unwrap();
        seed_valid_marketplace(tmp.path());
        let report = validate_marketplace(tmp.path()).unwrap();
        assert!(report.passed(), "errors: {:?}", report.errors);
        assert_eq!(report.marketplace_name, "demo-marketplace");
        assert_eq!(report.plugin_count, 1);
        assert_eq!(report.skill_count, 1);
    }

    #[test]
    fn test_missing_manifest_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        let report = validate_marketplace(tmp.path()).unwrap();
        assert!(!report.passed());
        assert!(report.errors[0].contains("marketplace.json not found"));
    }

    #[test]
    fn test_invalid_json_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), ".claude-plugin/marketplace.json", "{nope");
        let report = validate_marketplace(tmp.path()).unwrap();
        assert!(report.errors[0].contains("Invalid JSON"));
    }

    #[test]
    fn test_missing_required_fields() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), ".claude-plugin/marketplace.json", r#"{"name": "x"}"#);
        let report = validate_marketplace(tmp.path()).unwrap();
        assert!(report.errors.iter().any(|e| e.contains("'owner'")));
        assert!(report.errors.iter().any(|e| e.contains("'metadata'")));
        assert!(report.errors.iter().any(|e| e.contains("'plugins'")));
    }

    #[test]
    fn test_root_source_with_skills_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        seed_valid_marketplace(tmp.path());
        write(
            tmp.path(),
            ".claude-plugin/marketplace.json",
            r#"{
                "name": "demo",
                "owner": {"name": "Demo", "email": "d@e.com"},
                "metadata": {"description": "d", "version": "1.0.0"},
                "plugins": [
                    {
                        "name": "everything",
                        "description": "all of it",
                        "source": "./",
                        "strict": true,
                        "skills": ["./plugins/analysis/skills/demo-skill"]
                    }
                ]
            }"#,
        );
        let report = validate_marketplace(tmp.path()).unwrap();
        assert!(report
            .errors
            .iter()
            .any(|e| e.contains("Cache duplication risk")));
    }

    #[test]
    fn test_duplicate_plugin_names_and_skill_refs() {
        let tmp = tempfile::tempdir().unwrap();
        seed_valid_marketplace(tmp.path());
        write(
            tmp.path(),
            ".claude-plugin/marketplace.json",
            r#"{
                "name": "demo",
                "owner": {"name": "Demo", "email": "d@e.com"},
                "metadata": {"description": "d", "version": "1.0.0"},
                "plugins": [
                    {"name": "a", "description": "d", "source": "./plugins/analysis",
                     "strict": true, "skills": ["./plugins/analysis/skills/demo-skill"]},
                    {"name": "a", "description": "d", "source": "./plugins/analysis",
                     "strict": true, "skills": ["./plugins/analysis/skills/demo-skill"]}
                ]
            }"#,
        );
        let report = validate_marketplace(tmp.path()).unwrap();
        assert!(report.errors.iter().any(|e| e.contains("duplicate plugin name")));
        assert!(report
            .warnings
            .iter()
            .any(|w| w.contains("referenced in multiple plugins")));
    }

    #[test]
    fn test_missing_skill_dir_and_plugin_json_warning() {
        let tmp = tempfile::tempdir().unwrap();
        seed_valid_marketplace(tmp.path());
        write(
            tmp.path(),
            "plugins/analysis/skills/demo-skill/plugin.json",
            "{}",
        );
        write(
            tmp.path(),
            ".claude-plugin/marketplace.json",
            r#"{
                "name": "demo",
                "owner": {"name": "Demo", "email": "d@e.com"},
                "metadata": {"description": "d", "version": "1.0.0"},
                "plugins": [
                    {"name": "a", "description": "d", "source": "./plugins/analysis",
                     "strict": true,
                     "skills": ["./plugins/analysis/skills/demo-skill", "./plugins/analysis/skills/ghost"]}
                ]
            }"#,
        );
        let report = validate_marketplace(tmp.path()).unwrap();
        assert!(report
            .errors
            .iter()
            .any(|e| e.contains("skill directory not found")));
        assert!(report.warnings.iter().any(|w| w.contains("plugin.json")));
    }

    #[test]
    fn test_bad_semver_warns() {
        let tmp = tempfile::tempdir().unwrap();
        write(
            tmp.path(),
            ".claude-plugin/marketplace.json",
            r#"{
                "name": "demo",
                "owner": {"name": "Demo", "email": "d@e.com"},
                "metadata": {"description": "d", "version": "v2"},
                "plugins": []
            }"#,
        );
        let report = validate_marketplace(tmp.path()).unwrap();
        assert!(report
            .warnings
            .iter()
            .any(|w| w.contains("semantic versioning")));
    }
}
