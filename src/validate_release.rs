//! Combined pre-release gate.
//!
//! Runs the release-specific checks, then the marketplace and skills
//! validators, and aggregates the results. Quick mode skips the slow
//! filesystem sweeps (link resolution, script permissions, changelog
//! content). Exit is zero only when no check produced an error.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use chrono::Local;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use crate::frontmatter;
use crate::validate_marketplace::validate_marketplace;
use crate::validate_skills::{discover_skills, is_executable, md_link_re, validate_skill};

type CheckResult = (bool, String);

pub fn run_release(root: &Path, quick: bool, verbose: bool) -> Result<()> {
    println!("Pre-Release Validation");
    println!("Timestamp: {}", Local::now().to_rfc3339());
    println!("Mode: {}", if quick { "Quick" } else { "Full" });
    println!();

    let manifest_path = root.join(".claude-plugin").join("marketplace.json");
    let content = std::fs::read_to_string(&manifest_path)
        .map_err(|e| anyhow::anyhow!("Failed to load {}: {}", manifest_path.display(), e))?;
    let manifest: Value = serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Invalid JSON in marketplace.json: {}", e))?;

    let mut checks: Vec<(&str, CheckResult)> = vec![
        ("Marketplace schema", check_schema(&manifest)),
        ("Skill paths exist", check_skill_paths(root, &manifest)),
        ("SKILL.md frontmatter", check_frontmatter(root, &manifest)),
        ("Name-directory match", check_name_directory(root, &manifest)),
        ("No duplicate skills", check_no_duplicates(&manifest)),
        ("Version is semver", check_version(&manifest)),
        ("Required files", check_required_files(root, &manifest)),
        ("No plugin.json files", check_no_plugin_json(root, &manifest)),
        ("Description lengths", check_descriptions(root, &manifest)),
        ("Source layout", check_source_layout(&manifest)),
    ];
    if !quick {
        checks.push(("Internal links", check_internal_links(root, &manifest)));
        checks.push(("Script permissions", check_script_permissions(root, &manifest)));
        checks.push(("Changelog entries", check_changelogs(root, &manifest)));
    }

    println!("Automated checks:");
    let mut failed = 0usize;
    for (name, (passed, message)) in &checks {
        if *passed {
            println!("  PASS  {}", name);
            if verbose && !message.is_empty() {
                println!("        {}", message);
            }
        } else {
            failed += 1;
            println!("  FAIL  {}", name);
            println!("        {}", message);
        }
    }

    println!();
    println!("Validation passes:");
    let marketplace = validate_marketplace(root)?;
    if marketplace.passed() {
        println!("  PASS  Marketplace validation ({} warnings)", marketplace.warnings.len());
    } else {
        failed += 1;
        println!("  FAIL  Marketplace validation");
        for error in &marketplace.errors {
            println!("        {}", error);
        }
    }

    match discover_skills(root, None) {
        Ok(dirs) => {
            let results: Vec<_> = dirs.iter().map(|d| validate_skill(root, d)).collect();
            let failing: Vec<_> = results.iter().filter(|r| !r.passed()).collect();
            if failing.is_empty() {
                println!("  PASS  Skills validation ({} skills)", results.len());
            } else {
                failed += 1;
                println!("  FAIL  Skills validation ({}/{} failed)", failing.len(), results.len());
                for result in &failing {
                    println!("        {} ({:.0}%)", result.path, result.score);
                }
            }
        }
        Err(e) => {
            failed += 1;
            println!("  FAIL  Skills validation");
            println!("        {}", e);
        }
    }

    let plugins = manifest
        .get("plugins")
        .and_then(|p| p.as_array())
        .cloned()
        .unwrap_or_default();
    let total_skills: usize = plugins
        .iter()
        .filter_map(|p| p.get("skills").and_then(|s| s.as_array()))
        .map(|s| s.len())
        .sum();
    let version = manifest
        .pointer("/metadata/version")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");

    println!();
    println!("Summary:");
    println!("  Marketplace version: {}", version);
    println!("  Plugin groups:       {}", plugins.len());
    println!("  Total skills:        {}", total_skills);
    println!("  Checks passed:       {}/{}", checks.len() + 2 - failed, checks.len() + 2);

    println!();
    println!("Manual checklist (not automated):");
    println!("  - Fresh install from a clean plugin cache");
    println!("  - Skill versions bumped and changelogs updated");
    println!("  - Clean git status before tagging");

    if failed == 0 {
        println!();
        println!("All automated checks passed.");
        Ok(())
    } else {
        bail!("{} release check(s) failed", failed);
    }
}

fn name_field_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^name:\s*(.+)$").unwrap())
}

/// Every `(plugin name, skill path)` pair in manifest order.
fn skill_refs(manifest: &Value) -> Vec<(String, String)> {
    let mut refs = Vec::new();
    let Some(plugins) = manifest.get("plugins").and_then(|p| p.as_array()) else {
        return refs;
    };
    for plugin in plugins {
        let plugin_name = plugin
            .get("name")
            .and_then(|n| n.as_str())
            .unwrap_or("unknown")
            .to_string();
        if let Some(skills) = plugin.get("skills").and_then(|s| s.as_array()) {
            for skill in skills.iter().filter_map(|s| s.as_str()) {
                refs.push((plugin_name.clone(), skill.to_string()));
            }
        }
    }
    refs
}

fn skill_dir(root: &Path, skill_path: &str) -> PathBuf {
    root.join(skill_path.trim_start_matches("./"))
}

fn dir_name(skill_path: &str) -> String {
    skill_path.rsplit('/').next().unwrap_or(skill_path).to_string()
}

fn check_schema(manifest: &Value) -> CheckResult {
    let missing: Vec<&str> = ["name", "owner", "metadata", "plugins"]
        .into_iter()
        .filter(|f| manifest.get(f).is_none())
        .collect();
    if missing.is_empty() {
        let version = manifest
            .pointer("/metadata/version")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        (true, format!("Version {}", version))
    } else {
        (false, format!("Missing required fields: {}", missing.join(", ")))
    }
}

fn check_skill_paths(root: &Path, manifest: &Value) -> CheckResult {
    let refs = skill_refs(manifest);
    let missing: Vec<String> = refs
        .iter()
        .filter(|(_, path)| !skill_dir(root, path).exists())
        .map(|(_, path)| path.clone())
        .collect();
    if missing.is_empty() {
        (true, format!("All {} skill paths exist", refs.len()))
    } else {
        (false, format!("Missing: {}", missing.join(", ")))
    }
}

/// Frontmatter block must open the file and declare name/description
/// near the top. Deep parsing belongs to the skills validator; this is
/// the cheap release-time sanity pass.
fn check_frontmatter(root: &Path, manifest: &Value) -> CheckResult {
    let mut issues = Vec::new();
    for (_, path) in skill_refs(manifest) {
        let Ok(content) = std::fs::read_to_string(skill_dir(root, &path).join("SKILL.md")) else {
            continue;
        };
        let name = dir_name(&path);
        if !content.starts_with("---") {
            issues.push(format!("{}: missing frontmatter", name));
            continue;
        }
        let head: String = content.chars().take(1000).collect();
        if !head.chars().take(500).collect::<String>().contains("name:") {
            issues.push(format!("{}: missing name in frontmatter", name));
        }
        if !head.contains("description:") {
            issues.push(format!("{}: missing description in frontmatter", name));
        }
    }
    if issues.is_empty() {
        (true, "All frontmatter valid".to_string())
    } else {
        (false, format!("{} issue(s): {}", issues.len(), issues[0]))
    }
}

fn check_name_directory(root: &Path, manifest: &Value) -> CheckResult {
    let mut mismatches = Vec::new();
    for (_, path) in skill_refs(manifest) {
        let Ok(content) = std::fs::read_to_string(skill_dir(root, &path).join("SKILL.md")) else {
            continue;
        };
        if let Some(captures) = name_field_re().captures(&content) {
            let declared = captures[1].trim().trim_matches(|c| c == '"' || c == '\'');
            let dir = dir_name(&path);
            if declared != dir {
                mismatches.push(format!("{} (frontmatter: {})", dir, declared));
            }
        }
    }
    if mismatches.is_empty() {
        (true, "All names match directories".to_string())
    } else {
        (false, format!("Mismatches: {}", mismatches.join(", ")))
    }
}

fn check_no_duplicates(manifest: &Value) -> CheckResult {
    let mut seen: HashMap<String, String> = HashMap::new();
    let mut duplicates = Vec::new();
    for (plugin, path) in skill_refs(manifest) {
        if let Some(first) = seen.get(&path) {
            duplicates.push(format!("{} (in {} and {})", path, first, plugin));
        } else {
            seen.insert(path, plugin);
        }
    }
    if duplicates.is_empty() {
        (true, format!("{} unique skills", seen.len()))
    } else {
        (false, format!("Duplicates: {}", duplicates[0]))
    }
}

fn check_version(manifest: &Value) -> CheckResult {
    match manifest.pointer("/metadata/version").and_then(|v| v.as_str()) {
        None => (false, "No version in metadata".to_string()),
        Some(version) if !frontmatter::is_valid_semver(version) => {
            (false, format!("Invalid semver: {}", version))
        }
        Some(version) => (true, format!("Version {} is valid semver", version)),
    }
}

fn check_required_files(root: &Path, manifest: &Value) -> CheckResult {
    let mut missing = Vec::new();
    for (_, path) in skill_refs(manifest) {
        let dir = skill_dir(root, &path);
        for required in ["SKILL.md", "README.md", "CHANGELOG.md"] {
            if !dir.join(required).exists() {
                missing.push(format!("{}/{}", dir_name(&path), required));
            }
        }
    }
    if missing.is_empty() {
        (true, "All required files present".to_string())
    } else {
        (false, format!("Missing: {}", missing.join(", ")))
    }
}

fn check_no_plugin_json(root: &Path, manifest: &Value) -> CheckResult {
    let mut found = Vec::new();
    for (_, path) in skill_refs(manifest) {
        let dir = skill_dir(root, &path);
        if !dir.is_dir() {
            continue;
        }
        for entry in walkdir::WalkDir::new(&dir).into_iter().filter_map(|e| e.ok()) {
            if entry.file_name() == "plugin.json" {
                found.push(dir_name(&path));
                break;
            }
        }
    }
    if found.is_empty() {
        (true, "No plugin.json files".to_string())
    } else {
        (false, format!("Found in: {}", found.join(", ")))
    }
}

/// Block-scalar descriptions are folded by the YAML parser before
/// measuring, so multi-line descriptions are judged by their real
/// length.
fn check_descriptions(root: &Path, manifest: &Value) -> CheckResult {
    let mut issues = Vec::new();
    for (_, path) in skill_refs(manifest) {
        let Ok(content) = std::fs::read_to_string(skill_dir(root, &path).join("SKILL.md")) else {
            continue;
        };
        let Ok((fm, _)) = frontmatter::parse(&content) else {
            continue;
        };
        if let Some(desc) = fm.description {
            if desc.len() > frontmatter::MAX_DESCRIPTION_LENGTH {
                issues.push(format!("{}: description > 1024 chars", dir_name(&path)));
            } else if desc.len() < frontmatter::MIN_DESCRIPTION_LENGTH {
                issues.push(format!("{}: description < 50 chars", dir_name(&path)));
            }
        }
    }
    if issues.is_empty() {
        (true, "All descriptions within limits".to_string())
    } else {
        (false, issues.join(", "))
    }
}

/// Plugin sources must be isolated `./`-relative paths at most two
/// levels deep. Root sources duplicate the repository into every
/// plugin cache.
fn check_source_layout(manifest: &Value) -> CheckResult {
    let mut issues = Vec::new();
    let Some(plugins) = manifest.get("plugins").and_then(|p| p.as_array()) else {
        return (true, String::new());
    };
    for plugin in plugins {
        let name = plugin.get("name").and_then(|n| n.as_str()).unwrap_or("unknown");
        let source = plugin.get("source").and_then(|s| s.as_str()).unwrap_or("");
        if matches!(source, "./" | "." | "") {
            issues.push(format!("Plugin {}: root source '{}'", name, source));
            continue;
        }
        if !source.starts_with("./") {
            issues.push(format!("Plugin {}: source '{}' is not ./-relative", name, source));
            continue;
        }
        let depth = source.trim_start_matches("./").trim_end_matches('/').split('/').count();
        if depth > 2 {
            issues.push(format!("Plugin {}: source '{}' nested too deep", name, source));
        }
    }
    if issues.is_empty() {
        (true, "All sources isolated".to_string())
    } else {
        (false, issues[0].clone())
    }
}

fn check_internal_links(root: &Path, manifest: &Value) -> CheckResult {
    let mut broken = Vec::new();
    for (_, path) in skill_refs(manifest) {
        let dir = skill_dir(root, &path);
        if !dir.is_dir() {
            continue;
        }
        for entry in walkdir::WalkDir::new(&dir).into_iter().filter_map(|e| e.ok()) {
            if entry.path().extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let Ok(content) = std::fs::read_to_string(entry.path()) else {
                continue;
            };
            for captures in md_link_re().captures_iter(&content) {
                let link = &captures[2];
                if link.starts_with("http") || link.starts_with('#') {
                    continue;
                }
                let file_part = link.split('#').next().unwrap_or(link);
                let base = entry.path().parent().unwrap_or(&dir);
                if !base.join(file_part).exists() {
                    broken.push(format!(
                        "{}: {}",
                        entry.path().file_name().unwrap_or_default().to_string_lossy(),
                        link
                    ));
                }
            }
        }
    }
    if broken.is_empty() {
        (true, "All internal links valid".to_string())
    } else {
        (false, format!("{} broken link(s): {}", broken.len(), broken[0]))
    }
}

fn check_script_permissions(root: &Path, manifest: &Value) -> CheckResult {
    let mut issues = Vec::new();
    for (_, path) in skill_refs(manifest) {
        let dir = skill_dir(root, &path);
        if !dir.is_dir() {
            continue;
        }
        for entry in walkdir::WalkDir::new(&dir).into_iter().filter_map(|e| e.ok()) {
            if entry.path().extension().and_then(|e| e.to_str()) != Some("sh") {
                continue;
            }
            if !is_executable(entry.path()) {
                issues.push(entry.file_name().to_string_lossy().to_string());
            }
        }
    }
    if issues.is_empty() {
        (true, "All scripts executable".to_string())
    } else {
        (false, format!("Missing +x: {}", issues.join(", ")))
    }
}

fn check_changelogs(root: &Path, manifest: &Value) -> CheckResult {
    let mut empty = Vec::new();
    for (_, path) in skill_refs(manifest) {
        let changelog = skill_dir(root, &path).join("CHANGELOG.md");
        if let Ok(content) = std::fs::read_to_string(&changelog) {
            if content.trim().len() < 50 {
                empty.push(dir_name(&path));
            }
        }
    }
    if empty.is_empty() {
        (true, "All changelogs have content".to_string())
    } else {
        (false, format!("Empty changelogs: {}", empty.join(", ")))
    }
}
