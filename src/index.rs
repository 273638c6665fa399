//! Embedding index maintenance.
//!
//! Builds one searchable document per conversation (preview text, topics,
//! touched files), embeds it with the configured provider, and upserts
//! the vector into the `embeddings` table keyed by conversation id. A
//! hash of the document text decides staleness on later runs.

use anyhow::{bail, Result};
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::embedding;

/// Find and embed conversations that are missing or have stale embeddings.
pub async fn run_embed_pending(
    config: &Config,
    limit: Option<usize>,
    batch_size_override: Option<usize>,
    dry_run: bool,
) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let provider = embedding::create_provider(&config.embedding)?;
    let pool = db::connect_existing(config).await?;
    let batch_size = batch_size_override.unwrap_or(config.embedding.batch_size);

    let pending = find_pending(&pool, provider.model_name(), limit).await?;

    if dry_run {
        println!("embed pending (dry-run)");
        println!("  conversations needing embeddings: {}", pending.len());
        pool.close().await;
        return Ok(());
    }

    if pending.is_empty() {
        println!("embed pending");
        println!("  all conversations up to date");
        pool.close().await;
        return Ok(());
    }

    let total = pending.len();
    let (embedded, failed) =
        embed_batches(&pool, config, provider.as_ref(), &pending, batch_size).await?;

    println!("embed pending");
    println!("  total pending: {}", total);
    println!("  embedded: {}", embedded);
    println!("  failed: {}", failed);

    pool.close().await;
    Ok(())
}

/// Delete all embeddings and regenerate for every conversation.
pub async fn run_embed_rebuild(config: &Config, batch_size_override: Option<usize>) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let provider = embedding::create_provider(&config.embedding)?;
    let pool = db::connect_existing(config).await?;
    let batch_size = batch_size_override.unwrap_or(config.embedding.batch_size);

    sqlx::query("DELETE FROM embeddings").execute(&pool).await?;
    println!("embed rebuild: cleared existing embeddings");

    let all = find_pending(&pool, provider.model_name(), None).await?;

    if all.is_empty() {
        println!("  no conversations to embed");
        pool.close().await;
        return Ok(());
    }

    let total = all.len();
    let (embedded, failed) =
        embed_batches(&pool, config, provider.as_ref(), &all, batch_size).await?;

    println!("embed rebuild");
    println!("  total conversations: {}", total);
    println!("  embedded: {}", embedded);
    println!("  failed: {}", failed);

    pool.close().await;
    Ok(())
}

struct PendingConversation {
    id: String,
    text: String,
    text_hash: String,
}

/// Conversations with no embedding for this model, or whose document
/// text no longer matches the stored hash. Conversations that produce
/// an empty document are never pending.
async fn find_pending(
    pool: &SqlitePool,
    model: &str,
    limit: Option<usize>,
) -> Result<Vec<PendingConversation>> {
    let rows = sqlx::query(
        r#"
        SELECT c.id, c.first_user_message, c.last_assistant_message,
               c.topics, c.files_read, c.files_written, c.files_edited,
               e.hash AS stored_hash
        FROM conversations c
        LEFT JOIN embeddings e ON e.conversation_id = c.id AND e.model = ?
        ORDER BY c.id
        "#,
    )
    .bind(model)
    .fetch_all(pool)
    .await?;

    let mut results = Vec::new();
    for row in &rows {
        let first: Option<String> = row.get("first_user_message");
        let last: Option<String> = row.get("last_assistant_message");
        let topics = json_list(row.get("topics"));
        let mut files = json_list(row.get("files_read"));
        files.extend(json_list(row.get("files_written")));
        files.extend(json_list(row.get("files_edited")));

        let text = document_text(first.as_deref(), last.as_deref(), &topics, &files);
        if text.is_empty() {
            continue;
        }
        let text_hash = hash_text(&text);

        let stored: Option<String> = row.get("stored_hash");
        if stored.as_deref() == Some(text_hash.as_str()) {
            continue;
        }

        results.push(PendingConversation {
            id: row.get("id"),
            text,
            text_hash,
        });
        if let Some(lim) = limit {
            if results.len() >= lim {
                break;
            }
        }
    }

    Ok(results)
}

async fn embed_batches(
    pool: &SqlitePool,
    config: &Config,
    provider: &dyn embedding::EmbeddingProvider,
    pending: &[PendingConversation],
    batch_size: usize,
) -> Result<(u64, u64)> {
    let mut embedded = 0u64;
    let mut failed = 0u64;

    for batch in pending.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|p| p.text.clone()).collect();

        match embedding::embed_texts(&config.embedding, &texts).await {
            Ok(vectors) => {
                for (item, vec) in batch.iter().zip(vectors.iter()) {
                    let blob = embedding::vec_to_blob(vec);
                    upsert_embedding(
                        pool,
                        &item.id,
                        provider.model_name(),
                        provider.dims(),
                        &item.text_hash,
                        &blob,
                    )
                    .await?;
                    embedded += 1;
                }
            }
            Err(e) => {
                eprintln!("Warning: embedding batch failed: {}", e);
                failed += batch.len() as u64;
            }
        }
    }

    Ok((embedded, failed))
}

async fn upsert_embedding(
    pool: &SqlitePool,
    conversation_id: &str,
    model: &str,
    dims: usize,
    text_hash: &str,
    blob: &[u8],
) -> Result<()> {
    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO embeddings (conversation_id, model, dims, hash, vector, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(conversation_id) DO UPDATE SET
            model = excluded.model,
            dims = excluded.dims,
            hash = excluded.hash,
            vector = excluded.vector,
            created_at = excluded.created_at
        "#,
    )
    .bind(conversation_id)
    .bind(model)
    .bind(dims as i64)
    .bind(text_hash)
    .bind(blob)
    .bind(&now)
    .execute(pool)
    .await?;

    Ok(())
}

/// Searchable text for one conversation: previews, topics, and every
/// touched file, sections joined by blank lines, empty sections omitted.
fn document_text(
    first_user: Option<&str>,
    last_assistant: Option<&str>,
    topics: &[String],
    files: &[String],
) -> String {
    let mut parts = Vec::new();
    if let Some(first) = first_user.filter(|s| !s.is_empty()) {
        parts.push(format!("User: {}", first));
    }
    if let Some(last) = last_assistant.filter(|s| !s.is_empty()) {
        parts.push(format!("Assistant: {}", last));
    }
    if !topics.is_empty() {
        parts.push(format!("Topics: {}", topics.join(", ")));
    }
    if !files.is_empty() {
        parts.push(format!("Files: {}", files.join(", ")));
    }
    parts.join("\n\n")
}

fn json_list(raw: Option<String>) -> Vec<String> {
    raw.and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
