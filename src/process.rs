//! Session-log processing pipeline.
//!
//! Scans the transcripts directory for `<project>/<session>.jsonl` files,
//! parses each into a conversation record, and loads the rows into
//! SQLite. A per-file content hash makes re-runs incremental; a file
//! that fails to parse is reported and skipped, never fatal.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use walkdir::WalkDir;

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::transcript::{self, ParsedSession, SessionExtractor};

enum FileOutcome {
    Processed,
    Unchanged,
}

pub async fn run_process(
    config: &Config,
    project: Option<String>,
    reindex: bool,
    dry_run: bool,
) -> Result<()> {
    // Schema creation is idempotent; processing works on a fresh database.
    migrate::run_migrations(config).await?;
    let pool = db::connect(config).await?;

    let files = scan_transcripts(&config.transcripts.dir, project.as_deref())?;
    let extractor = SessionExtractor::new()?;

    let mut processed = 0u64;
    let mut skipped = 0u64;
    let mut failed = 0u64;

    for path in &files {
        match process_file(&pool, &extractor, path, reindex, dry_run).await {
            Ok(FileOutcome::Processed) => processed += 1,
            Ok(FileOutcome::Unchanged) => skipped += 1,
            Err(err) => {
                eprintln!("Warning: skipping {}: {:#}", path.display(), err);
                failed += 1;
            }
        }
    }

    if dry_run {
        println!("process (dry-run)");
        println!("  scanned: {} files", files.len());
        println!("  would process: {}", processed);
        println!("  unchanged: {}", skipped);
        println!("  failed: {}", failed);
    } else {
        println!("process");
        println!("  scanned: {} files", files.len());
        println!("  processed: {}", processed);
        println!("  skipped: {} (unchanged)", skipped);
        println!("  failed: {}", failed);
    }
    println!("ok");

    pool.close().await;
    Ok(())
}

/// Collect `<project>/<session>.jsonl` files one level below the
/// transcripts root, sorted for deterministic runs.
fn scan_transcripts(root: &Path, project: Option<&str>) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        bail!("Transcripts directory not found: {}", root.display());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .min_depth(2)
        .max_depth(2)
        .sort_by_file_name()
    {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
            continue;
        }
        if let Some(filter) = project {
            let dir_name = path
                .parent()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if !dir_name.contains(filter) {
                continue;
            }
        }
        files.push(path.to_path_buf());
    }
    Ok(files)
}

async fn process_file(
    pool: &SqlitePool,
    extractor: &SessionExtractor,
    path: &Path,
    reindex: bool,
    dry_run: bool,
) -> Result<FileOutcome> {
    let hash = transcript::file_sha256(path)?;
    let path_str = path.to_string_lossy().to_string();

    if !reindex {
        let stored: Option<String> =
            sqlx::query_scalar("SELECT file_hash FROM processing_state WHERE file_path = ?")
                .bind(&path_str)
                .fetch_optional(pool)
                .await?;
        if stored.as_deref() == Some(hash.as_str()) {
            return Ok(FileOutcome::Unchanged);
        }
    }

    if dry_run {
        return Ok(FileOutcome::Processed);
    }

    let parsed = extractor.parse_session(path)?;
    if parsed.skipped_lines > 0 {
        eprintln!(
            "Warning: {} unparseable lines in {}",
            parsed.skipped_lines,
            path.display()
        );
    }
    store_session(pool, &path_str, &parsed).await?;
    Ok(FileOutcome::Processed)
}

/// Write one parsed session in a single transaction: upsert the
/// conversation row, replace its child rows, record the file hash.
async fn store_session(pool: &SqlitePool, file_path: &str, parsed: &ParsedSession) -> Result<()> {
    let rec = &parsed.record;
    let now = Utc::now().to_rfc3339();
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO conversations
            (id, project_path, timestamp, message_count, user_messages, assistant_messages,
             files_read, files_written, files_edited, tools_used, topics,
             first_user_message, last_assistant_message, conversation_hash,
             file_size_bytes, processed_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            project_path = excluded.project_path,
            timestamp = excluded.timestamp,
            message_count = excluded.message_count,
            user_messages = excluded.user_messages,
            assistant_messages = excluded.assistant_messages,
            files_read = excluded.files_read,
            files_written = excluded.files_written,
            files_edited = excluded.files_edited,
            tools_used = excluded.tools_used,
            topics = excluded.topics,
            first_user_message = excluded.first_user_message,
            last_assistant_message = excluded.last_assistant_message,
            conversation_hash = excluded.conversation_hash,
            file_size_bytes = excluded.file_size_bytes,
            processed_at = excluded.processed_at
        "#,
    )
    .bind(&rec.id)
    .bind(&rec.project_path)
    .bind(&rec.timestamp)
    .bind(rec.message_count)
    .bind(rec.user_messages)
    .bind(rec.assistant_messages)
    .bind(serde_json::to_string(&rec.files_read)?)
    .bind(serde_json::to_string(&rec.files_written)?)
    .bind(serde_json::to_string(&rec.files_edited)?)
    .bind(serde_json::to_string(&rec.tools_used)?)
    .bind(serde_json::to_string(&rec.topics)?)
    .bind(&rec.first_user_message)
    .bind(&rec.last_assistant_message)
    .bind(&rec.conversation_hash)
    .bind(rec.file_size_bytes)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM file_interactions WHERE conversation_id = ?")
        .bind(&rec.id)
        .execute(&mut *tx)
        .await?;
    for (kind, paths) in [
        ("read", &rec.files_read),
        ("write", &rec.files_written),
        ("edit", &rec.files_edited),
    ] {
        for file in paths {
            sqlx::query(
                "INSERT INTO file_interactions (conversation_id, file_path, interaction_type) VALUES (?, ?, ?)",
            )
            .bind(&rec.id)
            .bind(file)
            .bind(kind)
            .execute(&mut *tx)
            .await?;
        }
    }

    sqlx::query("DELETE FROM tool_usage WHERE conversation_id = ?")
        .bind(&rec.id)
        .execute(&mut *tx)
        .await?;
    for (tool, count) in &parsed.tool_counts {
        sqlx::query(
            "INSERT INTO tool_usage (conversation_id, tool_name, usage_count) VALUES (?, ?, ?)",
        )
        .bind(&rec.id)
        .bind(tool)
        .bind(*count)
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query(
        r#"
        INSERT INTO processing_state (file_path, last_modified, last_processed, file_hash)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(file_path) DO UPDATE SET
            last_modified = excluded.last_modified,
            last_processed = excluded.last_processed,
            file_hash = excluded.file_hash
        "#,
    )
    .bind(file_path)
    .bind(&rec.timestamp)
    .bind(&now)
    .bind(&rec.conversation_hash)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_finds_session_files_one_level_deep() {
        let root = tempfile::tempdir().unwrap();
        let proj_a = root.path().join("alpha");
        let proj_b = root.path().join("beta");
        std::fs::create_dir_all(&proj_a).unwrap();
        std::fs::create_dir_all(&proj_b).unwrap();
        std::fs::write(proj_a.join("s1.jsonl"), "{}").unwrap();
        std::fs::write(proj_a.join("notes.txt"), "skip me").unwrap();
        std::fs::write(proj_b.join("s2.jsonl"), "{}").unwrap();
        // Top-level files are not session logs.
        std::fs::write(root.path().join("stray.jsonl"), "{}").unwrap();

        let files = scan_transcripts(root.path(), None).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["s1.jsonl", "s2.jsonl"]);
    }

    #[test]
    fn scan_filters_by_project_substring() {
        let root = tempfile::tempdir().unwrap();
        for proj in ["webapp-frontend", "webapp-backend", "cli-tool"] {
            let dir = root.path().join(proj);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("s.jsonl"), "{}").unwrap();
        }

        let files = scan_transcripts(root.path(), Some("webapp")).unwrap();
        assert_eq!(files.len(), 2);
        let files = scan_transcripts(root.path(), Some("cli")).unwrap();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn scan_rejects_missing_root() {
        let root = tempfile::tempdir().unwrap();
        let missing = root.path().join("nope");
        assert!(scan_transcripts(&missing, None).is_err());
    }
}
