//! Database statistics and health overview.
//!
//! Provides a quick summary of what's indexed: conversation and message
//! counts, embedding coverage, and the most-touched files and tools.
//! Used by `sdx stats` to give confidence that processing and embedding
//! runs are working as expected.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect_existing(config).await?;

    let total_conversations: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM conversations")
        .fetch_one(&pool)
        .await?;

    let total_messages: i64 =
        sqlx::query_scalar::<_, Option<i64>>("SELECT SUM(message_count) FROM conversations")
            .fetch_one(&pool)
            .await?
            .unwrap_or(0);

    let total_embedded: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM embeddings")
        .fetch_one(&pool)
        .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Skilldex — Database Stats");
    println!("=========================");
    println!();
    println!("  Database:      {}", config.db.path.display());
    println!("  Size:          {}", format_bytes(db_size));
    println!();
    println!("  Conversations: {}", total_conversations);
    println!("  Messages:      {}", total_messages);
    println!(
        "  Embedded:      {} / {} ({}%)",
        total_embedded,
        total_conversations,
        if total_conversations > 0 {
            (total_embedded * 100) / total_conversations
        } else {
            0
        }
    );

    let range =
        sqlx::query("SELECT MIN(timestamp) AS earliest, MAX(timestamp) AS latest FROM conversations")
            .fetch_one(&pool)
            .await?;
    let earliest: Option<String> = range.get("earliest");
    let latest: Option<String> = range.get("latest");
    if let (Some(earliest), Some(latest)) = (earliest, latest) {
        println!();
        println!("  Earliest:      {}", format_ts_absolute(&earliest));
        println!("  Latest:        {}", format_ts_relative(&latest));
    }

    let file_rows = sqlx::query(
        r#"
        SELECT file_path, COUNT(*) AS interactions
        FROM file_interactions
        GROUP BY file_path
        ORDER BY interactions DESC, file_path ASC
        LIMIT 10
        "#,
    )
    .fetch_all(&pool)
    .await?;

    if !file_rows.is_empty() {
        println!();
        println!("  Top files:");
        println!("  {:<48} {:>12}", "FILE", "INTERACTIONS");
        println!("  {}", "-".repeat(61));
        for row in &file_rows {
            let path: String = row.get("file_path");
            let interactions: i64 = row.get("interactions");
            println!("  {:<48} {:>12}", path, interactions);
        }
    }

    let tool_rows = sqlx::query(
        r#"
        SELECT tool_name, SUM(usage_count) AS uses
        FROM tool_usage
        GROUP BY tool_name
        ORDER BY uses DESC, tool_name ASC
        LIMIT 10
        "#,
    )
    .fetch_all(&pool)
    .await?;

    if !tool_rows.is_empty() {
        println!();
        println!("  Top tools:");
        println!("  {:<24} {:>8}", "TOOL", "USES");
        println!("  {}", "-".repeat(33));
        for row in &tool_rows {
            let name: String = row.get("tool_name");
            let uses: i64 = row.get::<Option<i64>, _>("uses").unwrap_or(0);
            println!("  {:<24} {:>8}", name, uses);
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format an RFC 3339 timestamp as a relative time string
/// (e.g. "3 hours ago"). Falls back to an absolute rendering for
/// unparseable input, future timestamps, or anything over 30 days old.
fn format_ts_relative(ts: &str) -> String {
    let parsed = match chrono::DateTime::parse_from_rfc3339(ts) {
        Ok(dt) => dt,
        Err(_) => return ts.to_string(),
    };

    let now = chrono::Utc::now().timestamp();
    let delta = now - parsed.timestamp();

    if delta < 0 {
        return format_ts_absolute(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_absolute(ts)
    }
}

fn format_ts_absolute(ts: &str) -> String {
    chrono::DateTime::parse_from_rfc3339(ts)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|_| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_bytes_picks_sensible_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.00 GB");
    }

    #[test]
    fn format_ts_relative_buckets_recent_times() {
        let now = chrono::Utc::now();
        let mins_ago = (now - chrono::Duration::minutes(5)).to_rfc3339();
        assert_eq!(format_ts_relative(&mins_ago), "5 mins ago");

        let hour_ago = (now - chrono::Duration::hours(1)).to_rfc3339();
        assert_eq!(format_ts_relative(&hour_ago), "1 hour ago");

        let days_ago = (now - chrono::Duration::days(3)).to_rfc3339();
        assert_eq!(format_ts_relative(&days_ago), "3 days ago");
    }

    #[test]
    fn format_ts_relative_falls_back_to_absolute() {
        let old = "2020-01-15T08:30:00+00:00";
        assert_eq!(format_ts_relative(old), "2020-01-15 08:30");
        assert_eq!(format_ts_relative("garbage"), "garbage");
    }

    #[test]
    fn format_ts_absolute_parses_rfc3339() {
        assert_eq!(
            format_ts_absolute("2025-10-05T14:30:00+00:00"),
            "2025-10-05 14:30"
        );
    }
}
