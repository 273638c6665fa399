use anyhow::Result;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    // Create conversations table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS conversations (
            id TEXT PRIMARY KEY,
            project_path TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            message_count INTEGER NOT NULL,
            user_messages INTEGER NOT NULL,
            assistant_messages INTEGER NOT NULL,
            files_read TEXT,
            files_written TEXT,
            files_edited TEXT,
            tools_used TEXT,
            topics TEXT,
            first_user_message TEXT,
            last_assistant_message TEXT,
            conversation_hash TEXT UNIQUE NOT NULL,
            file_size_bytes INTEGER NOT NULL,
            processed_at TEXT NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Create file_interactions table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS file_interactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            conversation_id TEXT NOT NULL,
            file_path TEXT NOT NULL,
            interaction_type TEXT NOT NULL,
            FOREIGN KEY (conversation_id) REFERENCES conversations(id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Create tool_usage table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tool_usage (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            conversation_id TEXT NOT NULL,
            tool_name TEXT NOT NULL,
            usage_count INTEGER NOT NULL,
            FOREIGN KEY (conversation_id) REFERENCES conversations(id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Create processing_state table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS processing_state (
            file_path TEXT PRIMARY KEY,
            last_modified TEXT NOT NULL,
            last_processed TEXT NOT NULL,
            file_hash TEXT NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Create embeddings table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS embeddings (
            conversation_id TEXT PRIMARY KEY,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            hash TEXT NOT NULL,
            vector BLOB NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY (conversation_id) REFERENCES conversations(id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Create indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_timestamp ON conversations(timestamp)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_project ON conversations(project_path)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_processed ON conversations(processed_at)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_file_path ON file_interactions(file_path)")
        .execute(&pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_conversation ON file_interactions(conversation_id)",
    )
    .execute(&pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tool_name ON tool_usage(tool_name)")
        .execute(&pool)
        .await?;

    pool.close().await;
    Ok(())
}
