//! Session transcript parsing.
//!
//! Turns one `*.jsonl` session log into a [`ParsedSession`]: message
//! counts, preview text, file interactions, tool usage, and topic
//! keywords. Malformed lines are counted and skipped, never fatal.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::models::ConversationRecord;

/// Keywords scanned for in early conversation text to tag topics.
/// Matched as lowercase substrings, in this order.
const TOPIC_KEYWORDS: &[&str] = &[
    "authentication",
    "auth",
    "login",
    "jwt",
    "oauth",
    "testing",
    "test",
    "unit test",
    "integration test",
    "bug",
    "fix",
    "error",
    "issue",
    "debug",
    "performance",
    "optimization",
    "optimize",
    "slow",
    "refactor",
    "refactoring",
    "cleanup",
    "feature",
    "implement",
    "add",
    "create",
    "database",
    "sql",
    "query",
    "schema",
    "api",
    "endpoint",
    "rest",
    "graphql",
    "typescript",
    "javascript",
    "react",
    "node",
    "css",
    "style",
    "styling",
    "tailwind",
    "security",
    "vulnerability",
    "xss",
    "csrf",
    "deploy",
    "deployment",
    "ci/cd",
    "docker",
];

/// At most this many topics are stored per conversation.
const MAX_TOPICS: usize = 10;

/// Stored message previews are cut at this many characters.
const PREVIEW_CHARS: usize = 500;

/// Topic extraction stops reading after this many user messages.
const TOPIC_USER_MESSAGES: usize = 3;

/// Assistant text contributes at most this many characters to topic text.
const TOPIC_ASSISTANT_CHARS: usize = 200;

/// A parsed session file, ready to be written to the database.
#[derive(Debug)]
pub struct ParsedSession {
    pub record: ConversationRecord,
    /// Tool name and occurrence count, in order of first appearance.
    pub tool_counts: Vec<(String, i64)>,
    /// Lines that failed to parse as JSON and were skipped.
    pub skipped_lines: usize,
}

/// Extracts conversation metadata from `*.jsonl` session logs.
///
/// Compiles its patterns once; reuse a single extractor across files.
pub struct SessionExtractor {
    tool_json: Regex,
    tool_xml: Regex,
    read_patterns: Vec<Regex>,
    write_patterns: Vec<Regex>,
    edit_patterns: Vec<Regex>,
}

impl SessionExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            tool_json: Regex::new(r#""name":\s*"([A-Z][a-zA-Z]+)""#)?,
            tool_xml: Regex::new(r"<tool>([A-Z][a-zA-Z]+)</tool>")?,
            read_patterns: compile_insensitive(&[
                r"Reading\s+(.+\.(?:py|js|ts|tsx|jsx|md|json|yaml|yml))",
                r"Read\s+file:\s*(.+)",
                r#""file_path":\s*"([^"]+)""#,
            ])?,
            write_patterns: compile_insensitive(&[
                r"Writing\s+(.+\.(?:py|js|ts|tsx|jsx|md|json|yaml|yml))",
                r"Created\s+file:\s*(.+)",
                r"Write\s+(.+)",
            ])?,
            edit_patterns: compile_insensitive(&[
                r"Editing\s+(.+\.(?:py|js|ts|tsx|jsx|md|json|yaml|yml))",
                r"Modified\s+file:\s*(.+)",
                r"Edit\s+(.+)",
            ])?,
        })
    }

    /// Parse one session log into a conversation record.
    ///
    /// The record's id is the file stem, its project is the parent
    /// directory name, and its timestamp is the file's mtime.
    pub fn parse_session(&self, path: &Path) -> Result<ParsedSession> {
        let bytes = fs::read(path)
            .with_context(|| format!("Failed to read session file {}", path.display()))?;
        let meta = fs::metadata(path)
            .with_context(|| format!("Failed to stat session file {}", path.display()))?;

        let conversation_hash = sha256_hex(&bytes);

        let text = String::from_utf8_lossy(&bytes);
        let mut messages = Vec::new();
        let mut skipped_lines = 0usize;
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(line) {
                Ok(v) => messages.push(v),
                Err(_) => skipped_lines += 1,
            }
        }

        let mut user_messages = 0i64;
        let mut assistant_messages = 0i64;
        let mut first_user: Option<String> = None;
        let mut last_assistant: Option<String> = None;
        let mut tool_counts: Vec<(String, i64)> = Vec::new();
        let mut files_read: Vec<String> = Vec::new();
        let mut files_written: Vec<String> = Vec::new();
        let mut files_edited: Vec<String> = Vec::new();

        // Early conversation text fed to the topic keyword scan.
        let mut topic_text = String::new();
        let mut topic_users = 0usize;

        for msg in &messages {
            let content = message_text(msg);
            match msg.get("type").and_then(Value::as_str) {
                Some("user") => {
                    user_messages += 1;
                    if content.is_empty() {
                        continue;
                    }
                    if first_user.is_none() {
                        first_user = Some(truncate_chars(&content, PREVIEW_CHARS));
                    }
                    if topic_users < TOPIC_USER_MESSAGES {
                        topic_text.push_str(&content);
                        topic_text.push(' ');
                        topic_users += 1;
                    }
                }
                Some("assistant") => {
                    assistant_messages += 1;
                    for name in block_tool_names(msg) {
                        bump_tool(&mut tool_counts, &name);
                    }
                    if content.is_empty() {
                        continue;
                    }
                    last_assistant = Some(truncate_chars(&content, PREVIEW_CHARS));
                    for re in [&self.tool_json, &self.tool_xml] {
                        for cap in re.captures_iter(&content) {
                            if let Some(m) = cap.get(1) {
                                bump_tool(&mut tool_counts, m.as_str());
                            }
                        }
                    }
                    collect_paths(&self.read_patterns, &content, &mut files_read);
                    collect_paths(&self.write_patterns, &content, &mut files_written);
                    collect_paths(&self.edit_patterns, &content, &mut files_edited);
                    if topic_users < TOPIC_USER_MESSAGES {
                        topic_text.push_str(&truncate_chars(&content, TOPIC_ASSISTANT_CHARS));
                        topic_text.push(' ');
                    }
                }
                _ => {}
            }
        }

        let timestamp = match meta.modified() {
            Ok(t) => DateTime::<Utc>::from(t),
            Err(_) => Utc::now(),
        };

        let record = ConversationRecord {
            id: file_stem(path),
            project_path: parent_name(path),
            timestamp: timestamp.to_rfc3339(),
            message_count: messages.len() as i64,
            user_messages,
            assistant_messages,
            files_read,
            files_written,
            files_edited,
            tools_used: tool_counts.iter().map(|(name, _)| name.clone()).collect(),
            topics: extract_topics(&topic_text),
            first_user_message: first_user,
            last_assistant_message: last_assistant,
            conversation_hash,
            file_size_bytes: meta.len() as i64,
        };

        Ok(ParsedSession {
            record,
            tool_counts,
            skipped_lines,
        })
    }
}

/// SHA-256 of the file's bytes, hex-encoded. Drives the incremental
/// skip decision without a full parse.
pub fn file_sha256(path: &Path) -> Result<String> {
    let bytes =
        fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(sha256_hex(&bytes))
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn compile_insensitive(patterns: &[&str]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            RegexBuilder::new(p)
                .case_insensitive(true)
                .build()
                .map_err(Into::into)
        })
        .collect()
}

/// Flatten `message.content` to plain text. Content is either a string
/// or an array of blocks; text blocks are joined with a space.
fn message_text(msg: &Value) -> String {
    match msg.pointer("/message/content") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(blocks)) => blocks
            .iter()
            .map(|b| {
                if b.get("type").and_then(Value::as_str) == Some("text") {
                    b.get("text").and_then(Value::as_str).unwrap_or("")
                } else {
                    ""
                }
            })
            .collect::<Vec<_>>()
            .join(" "),
        _ => String::new(),
    }
}

/// Tool names of `tool_use` content blocks, in block order.
fn block_tool_names(msg: &Value) -> Vec<String> {
    match msg.pointer("/message/content") {
        Some(Value::Array(blocks)) => blocks
            .iter()
            .filter(|b| b.get("type").and_then(Value::as_str) == Some("tool_use"))
            .filter_map(|b| b.get("name").and_then(Value::as_str))
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn bump_tool(counts: &mut Vec<(String, i64)>, name: &str) {
    if let Some(entry) = counts.iter_mut().find(|(n, _)| n == name) {
        entry.1 += 1;
    } else {
        counts.push((name.to_string(), 1));
    }
}

/// Run every pattern over the text and append trimmed capture-1 matches,
/// keeping first-appearance order and dropping duplicates.
fn collect_paths(patterns: &[Regex], text: &str, out: &mut Vec<String>) {
    for re in patterns {
        for cap in re.captures_iter(text) {
            if let Some(m) = cap.get(1) {
                let p = m.as_str().trim();
                if !p.is_empty() && !out.iter().any(|existing| existing == p) {
                    out.push(p.to_string());
                }
            }
        }
    }
}

/// Substring-match the keyword list against lowercased topic text.
/// Keeps at most [`MAX_TOPICS`], in keyword-list order.
fn extract_topics(topic_text: &str) -> Vec<String> {
    let lower = topic_text.to_lowercase();
    let mut topics = Vec::new();
    for kw in TOPIC_KEYWORDS {
        if topics.len() == MAX_TOPICS {
            break;
        }
        if lower.contains(kw) {
            topics.push((*kw).to_string());
        }
    }
    topics
}

/// Character-boundary-safe prefix of `text`.
fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn parent_name(path: &Path) -> String {
    path.parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write_session(root: &Path, project: &str, name: &str, lines: &[&str]) -> PathBuf {
        let dir = root.join(project);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, lines.join("\n")).unwrap();
        path
    }

    fn extractor() -> SessionExtractor {
        SessionExtractor::new().unwrap()
    }

    #[test]
    fn parses_string_content_messages() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_session(
            dir.path(),
            "webapp",
            "abc123.jsonl",
            &[
                r#"{"type":"summary","summary":"compacted"}"#,
                r#"{"type":"user","message":{"content":"please fix the login bug"}}"#,
                r#"{"type":"assistant","message":{"content":"I found the issue in auth.py"}}"#,
                r#"{"type":"user","message":{"content":"thanks"}}"#,
            ],
        );

        let parsed = extractor().parse_session(&path).unwrap();
        let rec = &parsed.record;
        assert_eq!(rec.id, "abc123");
        assert_eq!(rec.project_path, "webapp");
        assert_eq!(rec.message_count, 4);
        assert_eq!(rec.user_messages, 2);
        assert_eq!(rec.assistant_messages, 1);
        assert_eq!(
            rec.first_user_message.as_deref(),
            Some("please fix the login bug")
        );
        assert_eq!(
            rec.last_assistant_message.as_deref(),
            Some("I found the issue in auth.py")
        );
        assert_eq!(rec.conversation_hash.len(), 64);
        assert!(rec.file_size_bytes > 0);
        assert_eq!(parsed.skipped_lines, 0);
    }

    #[test]
    fn joins_text_blocks_and_counts_tool_use_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_session(
            dir.path(),
            "webapp",
            "s1.jsonl",
            &[
                concat!(
                    r#"{"type":"assistant","message":{"content":["#,
                    r#"{"type":"text","text":"Let me check."},"#,
                    r#"{"type":"tool_use","name":"Bash","input":{}},"#,
                    r#"{"type":"text","text":"Done."}"#,
                    r#"]}}"#
                ),
            ],
        );

        let parsed = extractor().parse_session(&path).unwrap();
        assert_eq!(
            parsed.record.last_assistant_message.as_deref(),
            Some("Let me check.  Done.")
        );
        assert_eq!(parsed.tool_counts, vec![("Bash".to_string(), 1)]);
    }

    #[test]
    fn extracts_tools_from_assistant_text_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_session(
            dir.path(),
            "webapp",
            "s2.jsonl",
            &[
                r#"{"type":"user","message":{"content":"try \"name\": \"Grep\" please"}}"#,
                r#"{"type":"assistant","message":{"content":"calling {\"name\": \"Read\"} then <tool>Bash</tool> and \"name\": \"Read\" again"}}"#,
            ],
        );

        let parsed = extractor().parse_session(&path).unwrap();
        assert_eq!(
            parsed.tool_counts,
            vec![("Read".to_string(), 2), ("Bash".to_string(), 1)]
        );
        assert_eq!(parsed.record.tools_used, vec!["Read", "Bash"]);
    }

    #[test]
    fn extracts_file_interactions_with_dedup() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_session(
            dir.path(),
            "webapp",
            "s3.jsonl",
            &[
                r#"{"type":"assistant","message":{"content":"Reading src/app.py"}}"#,
                r#"{"type":"assistant","message":{"content":"see {\"file_path\": \"/tmp/notes.md\"} for details"}}"#,
                r#"{"type":"assistant","message":{"content":"Reading src/app.py"}}"#,
                r#"{"type":"assistant","message":{"content":"Created file: src/new.rs"}}"#,
                r#"{"type":"assistant","message":{"content":"Modified file: src/lib.rs"}}"#,
            ],
        );

        let parsed = extractor().parse_session(&path).unwrap();
        let rec = &parsed.record;
        assert_eq!(rec.files_read, vec!["src/app.py", "/tmp/notes.md"]);
        assert_eq!(rec.files_written, vec!["src/new.rs"]);
        assert_eq!(rec.files_edited, vec!["src/lib.rs"]);
    }

    #[test]
    fn counts_malformed_lines_without_failing() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_session(
            dir.path(),
            "webapp",
            "s4.jsonl",
            &[
                r#"{"type":"user","message":{"content":"hello"}}"#,
                "this is not json",
                "{broken",
                r#"{"type":"assistant","message":{"content":"hi"}}"#,
            ],
        );

        let parsed = extractor().parse_session(&path).unwrap();
        assert_eq!(parsed.skipped_lines, 2);
        assert_eq!(parsed.record.message_count, 2);
    }

    #[test]
    fn truncates_previews_to_500_chars() {
        let dir = tempfile::tempdir().unwrap();
        let long = "x".repeat(700);
        let line = format!(r#"{{"type":"user","message":{{"content":"{long}"}}}}"#);
        let path = write_session(dir.path(), "webapp", "s5.jsonl", &[&line]);

        let parsed = extractor().parse_session(&path).unwrap();
        let first = parsed.record.first_user_message.unwrap();
        assert_eq!(first.chars().count(), 500);
    }

    #[test]
    fn topic_keywords_match_as_substrings_in_list_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_session(
            dir.path(),
            "webapp",
            "s6.jsonl",
            &[
                r#"{"type":"user","message":{"content":"the database query is slow, needs authentication too"}}"#,
            ],
        );

        let topics = extractor().parse_session(&path).unwrap().record.topics;
        // "auth" matches inside "authentication"; list order is kept.
        assert_eq!(topics, vec!["authentication", "auth", "slow", "database", "query"]);
    }

    #[test]
    fn topics_stop_after_three_user_messages() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_session(
            dir.path(),
            "webapp",
            "s7.jsonl",
            &[
                r#"{"type":"user","message":{"content":"one"}}"#,
                r#"{"type":"user","message":{"content":"two"}}"#,
                r#"{"type":"user","message":{"content":"three"}}"#,
                r#"{"type":"user","message":{"content":"docker deployment please"}}"#,
            ],
        );

        let topics = extractor().parse_session(&path).unwrap().record.topics;
        assert!(topics.is_empty());
    }

    #[test]
    fn topics_cap_at_ten() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_session(
            dir.path(),
            "webapp",
            "s8.jsonl",
            &[
                r#"{"type":"user","message":{"content":"auth login jwt oauth testing bug fix error issue debug performance slow refactor"}}"#,
            ],
        );

        let topics = extractor().parse_session(&path).unwrap().record.topics;
        assert_eq!(topics.len(), 10);
    }

    #[test]
    fn empty_messages_do_not_set_previews() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_session(
            dir.path(),
            "webapp",
            "s9.jsonl",
            &[
                r#"{"type":"user","message":{"content":""}}"#,
                r#"{"type":"assistant","message":{"content":[]}}"#,
            ],
        );

        let parsed = extractor().parse_session(&path).unwrap();
        assert_eq!(parsed.record.user_messages, 1);
        assert_eq!(parsed.record.assistant_messages, 1);
        assert!(parsed.record.first_user_message.is_none());
        assert!(parsed.record.last_assistant_message.is_none());
    }
}
