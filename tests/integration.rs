use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn sdx_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("sdx");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::create_dir_all(root.join("data")).unwrap();

    // Two session logs in distinct project directories
    let sessions_auth = root.join("transcripts").join("webapp-auth");
    fs::create_dir_all(&sessions_auth).unwrap();
    fs::write(
        sessions_auth.join("session-one.jsonl"),
        concat!(
            r#"{"type":"user","message":{"content":"Fix the authentication bug in the login flow"}}"#,
            "\n",
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"Reading src/auth.ts to find the issue"},{"type":"tool_use","name":"Read"}]}}"#,
            "\n",
            r#"{"type":"user","message":{"content":"looks good, apply the fix"}}"#,
            "\n",
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"Editing src/auth.ts with the corrected jwt check"},{"type":"tool_use","name":"Edit"}]}}"#,
            "\n",
        ),
    )
    .unwrap();

    let sessions_docs = root.join("transcripts").join("docs-site");
    fs::create_dir_all(&sessions_docs).unwrap();
    fs::write(
        sessions_docs.join("session-two.jsonl"),
        concat!(
            r#"{"type":"user","message":{"content":"Refactor the css styling for the docs deployment"}}"#,
            "\n",
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"Writing styles/main.css with the new layout"},{"type":"tool_use","name":"Write"}]}}"#,
            "\n",
        ),
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/sdx.sqlite"

[transcripts]
dir = "{root}/transcripts"

[search]
default_limit = 10
overfetch_factor = 2
"#,
        root = root.display()
    );

    let config_path = config_dir.join("sdx.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

/// A small JS project with known findings for audit/plan.
fn setup_audit_project(root: &Path) -> PathBuf {
    let project = root.join("webapp");
    fs::create_dir_all(project.join("src")).unwrap();
    fs::write(
        project.join("package.json"),
        r#"{"name": "webapp", "dependencies": {"lodash": "^4.17.0"}}"#,
    )
    .unwrap();
    fs::write(
        project.join("src").join("app.js"),
        "var counter = 0;\nconsole.log(counter);\neval(userInput);\n",
    )
    .unwrap();
    fs::write(
        project.join("src").join("app.test.js"),
        "test('counts', () => { expect(1).toBe(1); });\n",
    )
    .unwrap();
    project
}

/// A marketplace tree that passes every validator.
fn setup_marketplace(root: &Path) -> PathBuf {
    let market = root.join("marketplace");
    let skill = market.join("plugins/core/skills/release-gate");
    fs::create_dir_all(market.join(".claude-plugin")).unwrap();
    fs::create_dir_all(&skill).unwrap();

    fs::write(
        market.join(".claude-plugin/marketplace.json"),
        r#"{
            "name": "demo-marketplace",
            "owner": {"name": "Demo", "email": "demo@example.com"},
            "metadata": {"description": "demo skills", "version": "1.0.0"},
            "plugins": [{
                "name": "core",
                "description": "core tools",
                "source": "./plugins/core",
                "strict": true,
                "skills": ["./plugins/core/skills/release-gate"]
            }]
        }"#,
    )
    .unwrap();
    fs::write(
        skill.join("SKILL.md"),
        concat!(
            "---\n",
            "name: release-gate\n",
            "description: Validates release readiness of skill bundles. Use when cutting a release. NOT for runtime checks.\n",
            "version: 1.0.0\n",
            "---\n\n",
            "# Release Gate\n\n",
            "## Overview\n\nChecks the marketplace before tagging.\n\n",
            "## When to Use\n\nTrigger phrases: \"validate the release\".\n\n",
            "## Limitations\n\nAutomated checks only.\n\n",
            "## Examples\n\n```\nsdx validate release\n```\n",
        ),
    )
    .unwrap();
    fs::write(skill.join("README.md"), "# Release Gate\n").unwrap();
    fs::write(
        skill.join("CHANGELOG.md"),
        "## 1.0.0\n- initial release with full validation coverage\n",
    )
    .unwrap();
    market
}

fn run_sdx(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = sdx_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run sdx binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_sdx(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data").join("sdx.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_sdx(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_sdx(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_process_loads_sessions() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_sdx(&config_path, &["process"]);
    assert!(success, "process failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("scanned: 2 files"));
    assert!(stdout.contains("processed: 2"));
    assert!(stdout.contains("ok"));
}

#[test]
fn test_process_incremental_skips_unchanged() {
    let (_tmp, config_path) = setup_test_env();

    run_sdx(&config_path, &["process"]);
    let (stdout, _, success) = run_sdx(&config_path, &["process"]);
    assert!(success);
    assert!(
        stdout.contains("skipped: 2 (unchanged)"),
        "Expected unchanged files skipped, got: {}",
        stdout
    );
}

#[test]
fn test_process_reindex_reprocesses() {
    let (_tmp, config_path) = setup_test_env();

    run_sdx(&config_path, &["process"]);
    let (stdout, _, success) = run_sdx(&config_path, &["process", "--reindex"]);
    assert!(success);
    assert!(stdout.contains("processed: 2"));
}

#[test]
fn test_process_project_filter() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_sdx(&config_path, &["process", "--project", "webapp"]);
    assert!(success);
    assert!(stdout.contains("scanned: 1 files"));
}

#[test]
fn test_process_dry_run_writes_nothing() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_sdx(&config_path, &["process", "--dry-run"]);
    assert!(success);
    assert!(stdout.contains("dry-run"));
    assert!(stdout.contains("would process: 2"));

    // Nothing was recorded, so a real run still processes both files.
    let (stdout, _, _) = run_sdx(&config_path, &["process"]);
    assert!(stdout.contains("processed: 2"));
}

#[test]
fn test_process_tolerates_malformed_lines() {
    let (tmp, config_path) = setup_test_env();
    fs::write(
        tmp.path().join("transcripts/webapp-auth/broken.jsonl"),
        "not json at all\n{\"type\":\"user\",\"message\":{\"content\":\"still a session\"}}\n",
    )
    .unwrap();

    let (stdout, stderr, success) = run_sdx(&config_path, &["process"]);
    assert!(success, "process should survive malformed lines");
    assert!(stdout.contains("processed: 3"));
    assert!(stderr.contains("unparseable lines"));
}

#[test]
fn test_search_keyword() {
    let (_tmp, config_path) = setup_test_env();

    run_sdx(&config_path, &["process"]);
    let (stdout, _, success) = run_sdx(&config_path, &["search", "authentication", "--keyword"]);
    assert!(success, "search failed");
    assert!(stdout.contains("Found 1 conversations"));
    assert!(stdout.contains("webapp-auth"));
}

#[test]
fn test_search_semantic_falls_back_to_keyword_when_disabled() {
    let (_tmp, config_path) = setup_test_env();

    run_sdx(&config_path, &["process"]);
    let (stdout, stderr, success) = run_sdx(&config_path, &["search", "authentication"]);
    assert!(success, "fallback search should succeed, stderr={}", stderr);
    assert!(stderr.contains("embedding provider is disabled"));
    assert!(stdout.contains("Found 1 conversations"));
}

#[test]
fn test_search_by_file_without_query() {
    let (_tmp, config_path) = setup_test_env();

    run_sdx(&config_path, &["process"]);
    let (stdout, _, success) = run_sdx(&config_path, &["search", "--file", "auth.ts"]);
    assert!(success);
    assert!(stdout.contains("Found 1 conversations"));
}

#[test]
fn test_search_by_tool() {
    let (_tmp, config_path) = setup_test_env();

    run_sdx(&config_path, &["process"]);
    let (stdout, _, success) = run_sdx(&config_path, &["search", "--tool", "Write"]);
    assert!(success);
    assert!(stdout.contains("docs-site"));
}

#[test]
fn test_search_without_query_or_filter_errors() {
    let (_tmp, config_path) = setup_test_env();

    run_sdx(&config_path, &["process"]);
    let (_, stderr, success) = run_sdx(&config_path, &["search"]);
    assert!(!success, "search with no query and no filter should fail");
    assert!(stderr.contains("--file"));
}

#[test]
fn test_search_without_database_errors() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_sdx(&config_path, &["search", "anything"]);
    assert!(!success);
    assert!(
        stderr.contains("sdx process"),
        "Should point at sdx process, got: {}",
        stderr
    );
}

#[test]
fn test_search_deterministic() {
    let (_tmp, config_path) = setup_test_env();

    run_sdx(&config_path, &["process"]);
    let (stdout1, _, _) = run_sdx(&config_path, &["search", "the", "--keyword"]);
    let (stdout2, _, _) = run_sdx(&config_path, &["search", "the", "--keyword"]);
    assert_eq!(stdout1, stdout2, "Search results should be deterministic");
}

#[test]
fn test_search_json_format() {
    let (_tmp, config_path) = setup_test_env();

    run_sdx(&config_path, &["process"]);
    let (stdout, _, success) = run_sdx(
        &config_path,
        &["search", "authentication", "--keyword", "--format", "json"],
    );
    assert!(success);
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed[0]["match_kind"], "keyword");
}

#[test]
fn test_embed_pending_errors_when_disabled() {
    let (_tmp, config_path) = setup_test_env();

    run_sdx(&config_path, &["process"]);
    let (_, stderr, success) = run_sdx(&config_path, &["embed", "pending"]);
    assert!(!success, "embed pending should fail when provider disabled");
    assert!(stderr.contains("disabled"));
}

#[test]
fn test_embed_rebuild_errors_when_disabled() {
    let (_tmp, config_path) = setup_test_env();

    run_sdx(&config_path, &["process"]);
    let (_, stderr, success) = run_sdx(&config_path, &["embed", "rebuild"]);
    assert!(!success, "embed rebuild should fail when provider disabled");
    assert!(stderr.contains("disabled"));
}

#[test]
fn test_audit_reports_findings() {
    let (tmp, config_path) = setup_test_env();
    let project = setup_audit_project(tmp.path());

    let (stdout, stderr, success) = run_sdx(&config_path, &["audit", project.to_str().unwrap()]);
    assert!(success, "audit failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Audit: "));
    assert!(stdout.contains("Overall score"));
    assert!(stdout.contains("SQALE rating"));
    // The fixture plants a var declaration and an eval() call.
    assert!(stdout.contains("var"), "expected var finding, got: {}", stdout);
    assert!(stdout.contains("eval"), "expected eval finding, got: {}", stdout);
}

#[test]
fn test_audit_scope_restricts_analyzers() {
    let (tmp, config_path) = setup_test_env();
    let project = setup_audit_project(tmp.path());

    let (stdout, _, success) = run_sdx(
        &config_path,
        &["audit", project.to_str().unwrap(), "--scope", "security", "--format", "json"],
    );
    assert!(success);
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let reports = parsed["reports"].as_array().unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0]["analyzer"], "security");
}

#[test]
fn test_audit_unknown_format_errors() {
    let (tmp, config_path) = setup_test_env();
    let project = setup_audit_project(tmp.path());

    let (_, stderr, success) = run_sdx(
        &config_path,
        &["audit", project.to_str().unwrap(), "--format", "xml"],
    );
    assert!(!success);
    assert!(stderr.contains("Unknown output format"));
}

#[test]
fn test_audit_missing_path_errors() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_sdx(&config_path, &["audit", "/nonexistent/project"]);
    assert!(!success);
    assert!(stderr.contains("does not exist"));
}

#[test]
fn test_plan_renders_buckets() {
    let (tmp, config_path) = setup_test_env();
    let project = setup_audit_project(tmp.path());

    let (stdout, stderr, success) = run_sdx(&config_path, &["plan", project.to_str().unwrap()]);
    assert!(success, "plan failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Remediation Plan:"));
    assert!(stdout.contains("Effort Summary"));
    assert!(stdout.contains("Priority scoring"));
}

#[test]
fn test_plan_output_file() {
    let (tmp, config_path) = setup_test_env();
    let project = setup_audit_project(tmp.path());
    let out_path = tmp.path().join("plan.md");

    let (_, _, success) = run_sdx(
        &config_path,
        &[
            "plan",
            project.to_str().unwrap(),
            "--output",
            out_path.to_str().unwrap(),
        ],
    );
    assert!(success);
    let written = fs::read_to_string(&out_path).unwrap();
    assert!(written.contains("Remediation Plan"));
}

#[test]
fn test_validate_marketplace_passes_on_valid_tree() {
    let (tmp, config_path) = setup_test_env();
    let market = setup_marketplace(tmp.path());

    let (stdout, _, success) = run_sdx(
        &config_path,
        &["validate", "marketplace", "--root", market.to_str().unwrap()],
    );
    assert!(success, "marketplace validation should pass, got: {}", stdout);
    assert!(stdout.contains("Marketplace validation passed"));
    assert!(stdout.contains("demo-marketplace"));
}

#[test]
fn test_validate_marketplace_fails_without_manifest() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_sdx(
        &config_path,
        &["validate", "marketplace", "--root", tmp.path().to_str().unwrap()],
    );
    assert!(!success, "validation without a manifest should exit 1");
    assert!(stdout.contains("marketplace.json not found"));
}

#[test]
fn test_validate_skills_passes_on_valid_tree() {
    let (tmp, config_path) = setup_test_env();
    let market = setup_marketplace(tmp.path());

    let (stdout, _, success) = run_sdx(
        &config_path,
        &["validate", "skills", "--root", market.to_str().unwrap()],
    );
    assert!(success, "skills validation should pass, got: {}", stdout);
    assert!(stdout.contains("PASS"));
    assert!(stdout.contains("Passed:        1/1"));
}

#[test]
fn test_validate_skills_fails_on_broken_skill() {
    let (tmp, config_path) = setup_test_env();
    let market = setup_marketplace(tmp.path());
    // Wreck the skill: frontmatter name no longer matches the directory.
    fs::write(
        market.join("plugins/core/skills/release-gate/SKILL.md"),
        "---\nname: wrong-name\ndescription: short\n---\nbody\n",
    )
    .unwrap();

    let (stdout, _, success) = run_sdx(
        &config_path,
        &["validate", "skills", "--root", market.to_str().unwrap()],
    );
    assert!(!success, "broken skill should fail validation");
    assert!(stdout.contains("FAIL"));
}

#[test]
fn test_validate_release_passes_on_valid_tree() {
    let (tmp, config_path) = setup_test_env();
    let market = setup_marketplace(tmp.path());

    let (stdout, _, success) = run_sdx(
        &config_path,
        &["validate", "release", "--root", market.to_str().unwrap()],
    );
    assert!(success, "release validation should pass, got: {}", stdout);
    assert!(stdout.contains("All automated checks passed"));
    assert!(stdout.contains("Manual checklist"));
}

#[test]
fn test_validate_release_quick_skips_slow_checks() {
    let (tmp, config_path) = setup_test_env();
    let market = setup_marketplace(tmp.path());
    // An empty changelog fails the full gate but not --quick.
    fs::write(market.join("plugins/core/skills/release-gate/CHANGELOG.md"), "todo\n").unwrap();

    let (_, _, full_success) = run_sdx(
        &config_path,
        &["validate", "release", "--root", market.to_str().unwrap()],
    );
    assert!(!full_success, "full gate should catch the empty changelog");

    let (_, _, quick_success) = run_sdx(
        &config_path,
        &["validate", "release", "--root", market.to_str().unwrap(), "--quick"],
    );
    assert!(quick_success, "--quick should skip the changelog check");
}

#[test]
fn test_validate_release_fails_on_missing_skill() {
    let (tmp, config_path) = setup_test_env();
    let market = setup_marketplace(tmp.path());
    fs::remove_dir_all(market.join("plugins/core/skills/release-gate")).unwrap();

    let (stdout, _, success) = run_sdx(
        &config_path,
        &["validate", "release", "--root", market.to_str().unwrap()],
    );
    assert!(!success);
    assert!(stdout.contains("FAIL"));
}

#[test]
fn test_stats_summarizes_database() {
    let (_tmp, config_path) = setup_test_env();

    run_sdx(&config_path, &["process"]);
    let (stdout, _, success) = run_sdx(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Conversations: 2"));
    assert!(stdout.contains("Top tools:"));
}

#[test]
fn test_stats_without_database_errors() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_sdx(&config_path, &["stats"]);
    assert!(!success);
    assert!(stderr.contains("sdx process"));
}

#[test]
fn test_insights_weekly() {
    let (_tmp, config_path) = setup_test_env();

    run_sdx(&config_path, &["process"]);
    let (stdout, stderr, success) = run_sdx(&config_path, &["insights", "weekly"]);
    assert!(success, "insights failed: {}", stderr);
    assert!(stdout.contains("## Insights & Recommendations"));
}

#[test]
fn test_insights_tools_report() {
    let (_tmp, config_path) = setup_test_env();

    run_sdx(&config_path, &["process"]);
    let (stdout, _, success) = run_sdx(&config_path, &["insights", "tools"]);
    assert!(success);
    assert!(stdout.contains("# Tool Usage Analytics"));
    assert!(stdout.contains("Read"));
}

#[test]
fn test_insights_output_file() {
    let (tmp, config_path) = setup_test_env();
    let out_path = tmp.path().join("report.md");

    run_sdx(&config_path, &["process"]);
    let (stdout, _, success) = run_sdx(
        &config_path,
        &["insights", "files", "--output", out_path.to_str().unwrap()],
    );
    assert!(success);
    assert!(stdout.contains("Report written to"));
    let written = fs::read_to_string(&out_path).unwrap();
    assert!(written.contains("# File Interaction Heatmap"));
}

#[test]
fn test_insights_unknown_report_errors() {
    let (_tmp, config_path) = setup_test_env();

    run_sdx(&config_path, &["process"]);
    let (_, stderr, success) = run_sdx(&config_path, &["insights", "monthly"]);
    assert!(!success);
    assert!(stderr.contains("monthly"));
}
