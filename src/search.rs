//! Conversation search.
//!
//! Four ways in: semantic (embed the query, rank stored vectors by
//! cosine similarity), keyword (SQL LIKE over previews and topics),
//! by touched file, and by tool name. All modes render through the
//! same text / json / markdown formatters.

use anyhow::{bail, Result};
use chrono::DateTime;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::embedding;
use crate::models::{ConversationRecord, SearchHit};

const CONVERSATION_COLUMNS: &str = "id, project_path, timestamp, message_count, user_messages, \
     assistant_messages, files_read, files_written, files_edited, tools_used, topics, \
     first_user_message, last_assistant_message, conversation_hash, file_size_bytes";

#[allow(clippy::too_many_arguments)]
pub async fn run_search(
    config: &Config,
    query: Option<&str>,
    keyword: bool,
    file: Option<String>,
    tool: Option<String>,
    date_from: Option<String>,
    date_to: Option<String>,
    limit: Option<i64>,
    format: &str,
) -> Result<()> {
    match format {
        "text" | "json" | "markdown" => {}
        _ => bail!("Unknown output format: {}. Use text, json, or markdown.", format),
    }

    let query = query.map(str::trim).filter(|q| !q.is_empty());
    if query.is_none() && file.is_none() && tool.is_none() {
        bail!("Provide a query, --file, or --tool");
    }

    let pool = db::connect_existing(config).await?;
    let limit = limit.unwrap_or(config.search.default_limit).max(1);

    let hits = if let Some(ref tool_name) = tool {
        search_by_tool(&pool, tool_name, limit).await?
    } else if let Some(q) = query {
        let date_from = date_from.as_deref();
        let date_to = date_to.as_deref();
        let file = file.as_deref();
        if keyword {
            search_keyword(&pool, q, limit, date_from, date_to, file).await?
        } else if config.embedding.is_enabled() {
            search_semantic(&pool, config, q, limit, date_from, date_to, file).await?
        } else {
            eprintln!("Warning: embedding provider is disabled, using keyword search");
            search_keyword(&pool, q, limit, date_from, date_to, file).await?
        }
    } else {
        // --file with no query; the usage guard above rules out None
        let pattern = file.as_deref().unwrap_or_default();
        search_by_file(&pool, pattern, limit).await?
    };

    println!("{}", format_results(&hits, format)?);

    pool.close().await;
    Ok(())
}

// ============ Semantic search ============

/// Embed the query, rank every stored vector by cosine similarity, then
/// post-filter the over-fetched candidates by date range and file
/// substring until `limit` hits remain.
async fn search_semantic(
    pool: &SqlitePool,
    config: &Config,
    query: &str,
    limit: i64,
    date_from: Option<&str>,
    date_to: Option<&str>,
    file_pattern: Option<&str>,
) -> Result<Vec<SearchHit>> {
    let query_vec = embedding::embed_query(&config.embedding, query).await?;

    let rows = sqlx::query("SELECT conversation_id, vector FROM embeddings")
        .fetch_all(pool)
        .await?;

    let mut scored: Vec<(String, f64)> = rows
        .iter()
        .map(|row| {
            let blob: Vec<u8> = row.get("vector");
            let vec = embedding::blob_to_vec(&blob);
            let similarity = embedding::cosine_similarity(&query_vec, &vec) as f64;
            (row.get("conversation_id"), similarity)
        })
        .collect();

    // Similarity desc, id asc for a stable order
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    let overfetch = limit.saturating_mul(config.search.overfetch_factor).max(limit);
    scored.truncate(overfetch as usize);

    let sql = format!(
        "SELECT {} FROM conversations WHERE id = ?",
        CONVERSATION_COLUMNS
    );

    let mut hits = Vec::new();
    for (id, score) in &scored {
        let row = sqlx::query(&sql).bind(id).fetch_optional(pool).await?;
        let Some(row) = row else { continue };
        let record = row_to_record(&row);

        // RFC 3339 timestamps compare correctly as strings
        if let Some(from) = date_from {
            if record.timestamp.as_str() < from {
                continue;
            }
        }
        if let Some(to) = date_to {
            if record.timestamp.as_str() > to {
                continue;
            }
        }
        if let Some(pattern) = file_pattern {
            let touched = record
                .files_read
                .iter()
                .chain(&record.files_written)
                .chain(&record.files_edited)
                .any(|f| f.contains(pattern));
            if !touched {
                continue;
            }
        }

        hits.push(SearchHit {
            record,
            score: *score,
            match_kind: "semantic".to_string(),
        });
        if hits.len() >= limit as usize {
            break;
        }
    }

    Ok(hits)
}

// ============ Keyword search ============

async fn search_keyword(
    pool: &SqlitePool,
    query: &str,
    limit: i64,
    date_from: Option<&str>,
    date_to: Option<&str>,
    file_pattern: Option<&str>,
) -> Result<Vec<SearchHit>> {
    let mut sql = format!(
        "SELECT {} FROM conversations \
         WHERE (first_user_message LIKE ? OR last_assistant_message LIKE ? OR topics LIKE ?)",
        CONVERSATION_COLUMNS
    );
    if date_from.is_some() {
        sql.push_str(" AND timestamp >= ?");
    }
    if date_to.is_some() {
        sql.push_str(" AND timestamp <= ?");
    }
    if file_pattern.is_some() {
        sql.push_str(" AND (files_read LIKE ? OR files_written LIKE ? OR files_edited LIKE ?)");
    }
    sql.push_str(" ORDER BY timestamp DESC, id ASC LIMIT ?");

    let like = format!("%{}%", query);
    let mut q = sqlx::query(&sql).bind(&like).bind(&like).bind(&like);
    if let Some(from) = date_from {
        q = q.bind(from.to_string());
    }
    if let Some(to) = date_to {
        q = q.bind(to.to_string());
    }
    if let Some(pattern) = file_pattern {
        let file_like = format!("%{}%", pattern);
        q = q.bind(file_like.clone()).bind(file_like.clone()).bind(file_like);
    }
    let rows = q.bind(limit).fetch_all(pool).await?;

    Ok(rows
        .iter()
        .map(|row| SearchHit {
            record: row_to_record(row),
            score: 0.0,
            match_kind: "keyword".to_string(),
        })
        .collect())
}

// ============ File and tool filters ============

async fn search_by_file(
    pool: &SqlitePool,
    file_pattern: &str,
    limit: i64,
) -> Result<Vec<SearchHit>> {
    let sql = format!(
        "SELECT DISTINCT {} FROM conversations c \
         JOIN file_interactions fi ON c.id = fi.conversation_id \
         WHERE fi.file_path LIKE ? \
         ORDER BY c.timestamp DESC, c.id ASC \
         LIMIT ?",
        qualified_columns("c")
    );
    let rows = sqlx::query(&sql)
        .bind(format!("%{}%", file_pattern))
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| SearchHit {
            record: row_to_record(row),
            score: 0.0,
            match_kind: "file".to_string(),
        })
        .collect())
}

async fn search_by_tool(pool: &SqlitePool, tool_name: &str, limit: i64) -> Result<Vec<SearchHit>> {
    let sql = format!(
        "SELECT DISTINCT {} FROM conversations c \
         JOIN tool_usage tu ON c.id = tu.conversation_id \
         WHERE tu.tool_name LIKE ? \
         ORDER BY c.timestamp DESC, c.id ASC \
         LIMIT ?",
        qualified_columns("c")
    );
    let rows = sqlx::query(&sql)
        .bind(format!("%{}%", tool_name))
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| SearchHit {
            record: row_to_record(row),
            score: 0.0,
            match_kind: "tool".to_string(),
        })
        .collect())
}

fn qualified_columns(alias: &str) -> String {
    CONVERSATION_COLUMNS
        .split(", ")
        .map(|col| format!("{}.{}", alias, col.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn row_to_record(row: &SqliteRow) -> ConversationRecord {
    ConversationRecord {
        id: row.get("id"),
        project_path: row.get("project_path"),
        timestamp: row.get("timestamp"),
        message_count: row.get("message_count"),
        user_messages: row.get("user_messages"),
        assistant_messages: row.get("assistant_messages"),
        files_read: json_list(row.get("files_read")),
        files_written: json_list(row.get("files_written")),
        files_edited: json_list(row.get("files_edited")),
        tools_used: json_list(row.get("tools_used")),
        topics: json_list(row.get("topics")),
        first_user_message: row.get("first_user_message"),
        last_assistant_message: row.get("last_assistant_message"),
        conversation_hash: row.get("conversation_hash"),
        file_size_bytes: row.get("file_size_bytes"),
    }
}

fn json_list(raw: Option<String>) -> Vec<String> {
    raw.and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

// ============ Output formatting ============

fn format_results(hits: &[SearchHit], format: &str) -> Result<String> {
    match format {
        "json" => Ok(serde_json::to_string_pretty(hits)?),
        "markdown" => Ok(format_markdown(hits)),
        _ => Ok(format_text(hits)),
    }
}

fn format_text(hits: &[SearchHit]) -> String {
    let mut out = vec![format!("\nFound {} conversations:\n", hits.len())];

    for (i, hit) in hits.iter().enumerate() {
        let rec = &hit.record;
        out.push(format!("{}. {}{}", i + 1, similarity_tag(hit), rec.id));
        out.push(format!("   Date: {}", display_date(&rec.timestamp)));
        out.push(format!("   Project: {}", rec.project_path));
        out.push(format!("   Messages: {}", rec.message_count));

        if !rec.topics.is_empty() {
            out.push(format!("   Topics: {}", join_first(&rec.topics, 3)));
        }
        let all_files = touched_files(rec);
        if !all_files.is_empty() {
            out.push(format!("   Files: {}", join_first(&all_files, 3)));
        }
        if let Some(first) = rec.first_user_message.as_deref().filter(|s| !s.is_empty()) {
            let preview = first.chars().take(150).collect::<String>().replace('\n', " ");
            out.push(format!("   Preview: {}...", preview));
        }
        out.push(String::new());
    }

    out.join("\n")
}

fn format_markdown(hits: &[SearchHit]) -> String {
    let mut out = vec![format!("# Search Results ({} found)\n", hits.len())];

    for (i, hit) in hits.iter().enumerate() {
        let rec = &hit.record;
        out.push(format!("## {}. {}{}", i + 1, similarity_tag(hit), rec.id));
        out.push(format!("**Date:** {}", display_date(&rec.timestamp)));
        out.push(format!("**Project:** {}", rec.project_path));
        out.push(format!("**Messages:** {}", rec.message_count));

        if !rec.topics.is_empty() {
            out.push(format!("**Topics:** {}", rec.topics.join(", ")));
        }
        let all_files = touched_files(rec);
        if !all_files.is_empty() {
            out.push(format!("**Files:** {}", join_first(&all_files, 5)));
            if all_files.len() > 5 {
                out.push(format!("  _(and {} more)_", all_files.len() - 5));
            }
        }
        if !rec.tools_used.is_empty() {
            out.push(format!("**Tools:** {}", join_first(&rec.tools_used, 5)));
        }
        if let Some(first) = rec.first_user_message.as_deref().filter(|s| !s.is_empty()) {
            let snippet: String = first.chars().take(200).collect();
            out.push(format!("\n**Snippet:** {}...", snippet));
        }
        out.push(String::new());
    }

    out.join("\n")
}

fn similarity_tag(hit: &SearchHit) -> String {
    if hit.match_kind == "semantic" {
        format!("[Similarity: {:.3}] ", hit.score)
    } else {
        String::new()
    }
}

/// `%b %d, %Y %H:%M` rendering of an RFC 3339 timestamp; the raw string
/// when it does not parse.
fn display_date(timestamp: &str) -> String {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|dt| dt.format("%b %d, %Y %H:%M").to_string())
        .unwrap_or_else(|_| timestamp.to_string())
}

fn join_first(items: &[String], n: usize) -> String {
    items.iter().take(n).cloned().collect::<Vec<_>>().join(", ")
}

fn touched_files(rec: &ConversationRecord) -> Vec<String> {
    let mut files = rec.files_read.clone();
    files.extend(rec.files_written.iter().cloned());
    files.extend(rec.files_edited.iter().cloned());
    files
}
