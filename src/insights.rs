//! Aggregate reports over the conversation store.
//!
//! Three report types: `weekly` (activity summary with charts and
//! recommendations), `files` (interaction hotspot detail), `tools`
//! (per-tool usage totals). All reports honor an optional date range
//! and render as Markdown to stdout or a file.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{Duration, Utc};
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;

const CHART_WIDTH: usize = 40;

const WEEKDAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

pub async fn run_insights(
    config: &Config,
    report: &str,
    date_from: Option<String>,
    date_to: Option<String>,
    output: Option<PathBuf>,
) -> Result<()> {
    let pool = db::connect_existing(config).await?;

    let date_from = date_from.as_deref();
    let date_to = date_to.as_deref();
    let text = match report {
        "weekly" => weekly_report(&pool, date_from, date_to).await?,
        "files" => files_report(&pool, date_from, date_to).await?,
        "tools" => tools_report(&pool, date_from, date_to).await?,
        other => bail!("Unknown report: {}. Use weekly, files, or tools.", other),
    };

    match output {
        Some(path) => {
            fs::write(&path, &text)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            println!("Report written to {}", path.display());
        }
        None => println!("{}", text),
    }

    pool.close().await;
    Ok(())
}

// ============ Reports ============

async fn weekly_report(
    pool: &SqlitePool,
    date_from: Option<&str>,
    date_to: Option<&str>,
) -> Result<String> {
    let default_from = (Utc::now() - Duration::days(7)).format("%Y-%m-%d").to_string();
    let default_to = Utc::now().format("%Y-%m-%d").to_string();
    let date_from = Some(date_from.unwrap_or(&default_from));
    let date_to = Some(date_to.unwrap_or(&default_to));

    let overview = fetch_overview(pool, date_from, date_to).await?;
    let hotspots = fetch_file_hotspots(pool, date_from, date_to, 10).await?;
    let tools = fetch_tool_usage(pool, date_from, date_to).await?;
    let topics = fetch_topic_counts(pool, date_from, date_to).await?;
    let timeline = fetch_timeline(pool, date_from, date_to).await?;
    let weekdays = fetch_weekday_distribution(pool, date_from, date_to).await?;

    let mut lines = vec![
        "# Weekly Insights Report".to_string(),
        format!(
            "**Period:** {} to {}",
            date_from.unwrap_or_default(),
            date_to.unwrap_or_default()
        ),
        format!("**Generated:** {}", Utc::now().format("%Y-%m-%d %H:%M")),
        String::new(),
        "## Overview".to_string(),
        format!("- **Total Conversations:** {}", overview.total_conversations),
        format!("- **Active Days:** {}", overview.active_days),
        format!("- **Total Messages:** {}", overview.total_messages),
        format!("- **Avg Messages/Conversation:** {:.1}", overview.avg_messages),
        String::new(),
        "## Activity Timeline".to_string(),
        "```".to_string(),
        bar_chart(&timeline, CHART_WIDTH),
        "```".to_string(),
        String::new(),
        "## Weekday Distribution".to_string(),
        "```".to_string(),
        bar_chart(&weekdays, CHART_WIDTH),
        "```".to_string(),
        String::new(),
    ];

    if !hotspots.is_empty() {
        lines.push("## File Hotspots (Top 10)".to_string());
        lines.push(String::new());
        for (i, hs) in hotspots.iter().enumerate() {
            lines.push(format!(
                "{}. **{}** ({} conversations, R:{} W:{} E:{})",
                i + 1,
                hs.file_path,
                hs.conversation_count,
                hs.read_count,
                hs.write_count,
                hs.edit_count
            ));
        }
        lines.push(String::new());
    }

    if !tools.is_empty() {
        lines.push("## Tool Usage".to_string());
        lines.push(String::new());
        let top: Vec<(String, i64)> = tools
            .iter()
            .take(10)
            .map(|t| (t.tool_name.clone(), t.total_uses))
            .collect();
        lines.push("```".to_string());
        lines.push(bar_chart(&top, CHART_WIDTH));
        lines.push("```".to_string());
        lines.push(String::new());
    }

    if !topics.is_empty() {
        lines.push("## Top Topics".to_string());
        lines.push(String::new());
        let top: Vec<(String, i64)> = topics.iter().take(15).cloned().collect();
        lines.push("```".to_string());
        lines.push(bar_chart(&top, CHART_WIDTH));
        lines.push("```".to_string());
        lines.push(String::new());
    }

    lines.push("## Insights & Recommendations".to_string());
    lines.push(String::new());
    lines.extend(recommendations(&hotspots, &topics, overview.active_days));

    Ok(lines.join("\n"))
}

async fn files_report(
    pool: &SqlitePool,
    date_from: Option<&str>,
    date_to: Option<&str>,
) -> Result<String> {
    let hotspots = fetch_file_hotspots(pool, date_from, date_to, 50).await?;

    let mut lines = vec![
        "# File Interaction Heatmap".to_string(),
        format!("**Generated:** {}", Utc::now().format("%Y-%m-%d %H:%M")),
        String::new(),
        "## File Hotspots".to_string(),
        String::new(),
    ];

    if hotspots.is_empty() {
        lines.push("No file interactions found in the specified period.".to_string());
        return Ok(lines.join("\n"));
    }

    for (i, hs) in hotspots.iter().enumerate() {
        lines.push(format!("### {}. {}", i + 1, hs.file_path));
        lines.push(format!("- **Conversations:** {}", hs.conversation_count));
        lines.push(format!("- **Reads:** {}", hs.read_count));
        lines.push(format!("- **Writes:** {}", hs.write_count));
        lines.push(format!("- **Edits:** {}", hs.edit_count));
        lines.push(format!(
            "- **Total Interactions:** {}",
            hs.read_count + hs.write_count + hs.edit_count
        ));
        lines.push(String::new());
    }

    Ok(lines.join("\n"))
}

async fn tools_report(
    pool: &SqlitePool,
    date_from: Option<&str>,
    date_to: Option<&str>,
) -> Result<String> {
    let tools = fetch_tool_usage(pool, date_from, date_to).await?;

    let mut lines = vec![
        "# Tool Usage Analytics".to_string(),
        format!("**Generated:** {}", Utc::now().format("%Y-%m-%d %H:%M")),
        String::new(),
        "## Tool Statistics".to_string(),
        String::new(),
    ];

    if tools.is_empty() {
        lines.push("No tool usage data found.".to_string());
        return Ok(lines.join("\n"));
    }

    let total_uses: i64 = tools.iter().map(|t| t.total_uses).sum();
    for (i, tool) in tools.iter().enumerate() {
        let percentage = if total_uses > 0 {
            tool.total_uses as f64 / total_uses as f64 * 100.0
        } else {
            0.0
        };
        lines.push(format!("### {}. {}", i + 1, tool.tool_name));
        lines.push(format!("- **Total Uses:** {}", tool.total_uses));
        lines.push(format!("- **Used in Conversations:** {}", tool.conversation_count));
        lines.push(format!("- **Percentage of Total:** {:.1}%", percentage));
        lines.push(String::new());
    }

    Ok(lines.join("\n"))
}

// ============ Aggregate queries ============

struct Overview {
    total_conversations: i64,
    total_messages: i64,
    avg_messages: f64,
    active_days: i64,
}

struct FileHotspot {
    file_path: String,
    conversation_count: i64,
    read_count: i64,
    write_count: i64,
    edit_count: i64,
}

struct ToolUse {
    tool_name: String,
    conversation_count: i64,
    total_uses: i64,
}

/// `WHERE` fragment for an optional timestamp range. RFC 3339
/// timestamps compare correctly as strings, so bare `YYYY-MM-DD`
/// bounds act as day prefixes.
fn date_filter(prefix: &str, date_from: Option<&str>, date_to: Option<&str>) -> String {
    let mut conds = Vec::new();
    if date_from.is_some() {
        conds.push(format!("{}timestamp >= ?", prefix));
    }
    if date_to.is_some() {
        conds.push(format!("{}timestamp <= ?", prefix));
    }
    if conds.is_empty() {
        "1=1".to_string()
    } else {
        conds.join(" AND ")
    }
}

fn bind_dates<'q>(
    query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    date_from: Option<&str>,
    date_to: Option<&str>,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    let mut query = query;
    if let Some(from) = date_from {
        query = query.bind(from.to_string());
    }
    if let Some(to) = date_to {
        query = query.bind(to.to_string());
    }
    query
}

async fn fetch_overview(
    pool: &SqlitePool,
    date_from: Option<&str>,
    date_to: Option<&str>,
) -> Result<Overview> {
    let sql = format!(
        "SELECT COUNT(*) AS total_conversations, \
                SUM(message_count) AS total_messages, \
                AVG(message_count) AS avg_messages, \
                COUNT(DISTINCT DATE(timestamp)) AS active_days \
         FROM conversations WHERE {}",
        date_filter("", date_from, date_to)
    );
    let row = bind_dates(sqlx::query(&sql), date_from, date_to)
        .fetch_one(pool)
        .await?;

    Ok(Overview {
        total_conversations: row.get("total_conversations"),
        total_messages: row.get::<Option<i64>, _>("total_messages").unwrap_or(0),
        avg_messages: row.get::<Option<f64>, _>("avg_messages").unwrap_or(0.0),
        active_days: row.get("active_days"),
    })
}

async fn fetch_file_hotspots(
    pool: &SqlitePool,
    date_from: Option<&str>,
    date_to: Option<&str>,
    limit: i64,
) -> Result<Vec<FileHotspot>> {
    let sql = format!(
        "SELECT fi.file_path, \
                COUNT(DISTINCT fi.conversation_id) AS conversation_count, \
                SUM(CASE WHEN fi.interaction_type = 'read' THEN 1 ELSE 0 END) AS read_count, \
                SUM(CASE WHEN fi.interaction_type = 'write' THEN 1 ELSE 0 END) AS write_count, \
                SUM(CASE WHEN fi.interaction_type = 'edit' THEN 1 ELSE 0 END) AS edit_count \
         FROM file_interactions fi \
         JOIN conversations c ON fi.conversation_id = c.id \
         WHERE {} \
         GROUP BY fi.file_path \
         ORDER BY conversation_count DESC, fi.file_path ASC \
         LIMIT ?",
        date_filter("c.", date_from, date_to)
    );
    let rows = bind_dates(sqlx::query(&sql), date_from, date_to)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| FileHotspot {
            file_path: row.get("file_path"),
            conversation_count: row.get("conversation_count"),
            read_count: row.get("read_count"),
            write_count: row.get("write_count"),
            edit_count: row.get("edit_count"),
        })
        .collect())
}

async fn fetch_tool_usage(
    pool: &SqlitePool,
    date_from: Option<&str>,
    date_to: Option<&str>,
) -> Result<Vec<ToolUse>> {
    let sql = format!(
        "SELECT tu.tool_name, \
                COUNT(DISTINCT tu.conversation_id) AS conversation_count, \
                SUM(tu.usage_count) AS total_uses \
         FROM tool_usage tu \
         JOIN conversations c ON tu.conversation_id = c.id \
         WHERE {} \
         GROUP BY tu.tool_name \
         ORDER BY total_uses DESC, tu.tool_name ASC",
        date_filter("c.", date_from, date_to)
    );
    let rows = bind_dates(sqlx::query(&sql), date_from, date_to)
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| ToolUse {
            tool_name: row.get("tool_name"),
            conversation_count: row.get("conversation_count"),
            total_uses: row.get::<Option<i64>, _>("total_uses").unwrap_or(0),
        })
        .collect())
}

async fn fetch_topic_counts(
    pool: &SqlitePool,
    date_from: Option<&str>,
    date_to: Option<&str>,
) -> Result<Vec<(String, i64)>> {
    let sql = format!(
        "SELECT topics FROM conversations WHERE {} AND topics IS NOT NULL",
        date_filter("", date_from, date_to)
    );
    let rows = bind_dates(sqlx::query(&sql), date_from, date_to)
        .fetch_all(pool)
        .await?;

    let mut counts: BTreeMap<String, i64> = BTreeMap::new();
    for row in &rows {
        let raw: String = row.get("topics");
        let topics: Vec<String> = serde_json::from_str(&raw).unwrap_or_default();
        for topic in topics {
            *counts.entry(topic).or_insert(0) += 1;
        }
    }

    Ok(rank_counts(counts, 20))
}

async fn fetch_timeline(
    pool: &SqlitePool,
    date_from: Option<&str>,
    date_to: Option<&str>,
) -> Result<Vec<(String, i64)>> {
    let sql = format!(
        "SELECT DATE(timestamp) AS date, COUNT(*) AS count \
         FROM conversations WHERE {} \
         GROUP BY DATE(timestamp) ORDER BY date",
        date_filter("", date_from, date_to)
    );
    let rows = bind_dates(sqlx::query(&sql), date_from, date_to)
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| (row.get("date"), row.get("count")))
        .collect())
}

async fn fetch_weekday_distribution(
    pool: &SqlitePool,
    date_from: Option<&str>,
    date_to: Option<&str>,
) -> Result<Vec<(String, i64)>> {
    let sql = format!(
        "SELECT CAST(strftime('%w', timestamp) AS INTEGER) AS weekday, COUNT(*) AS count \
         FROM conversations WHERE {} \
         GROUP BY weekday",
        date_filter("", date_from, date_to)
    );
    let rows = bind_dates(sqlx::query(&sql), date_from, date_to)
        .fetch_all(pool)
        .await?;

    let counts: Vec<(i64, i64)> = rows
        .iter()
        .map(|row| (row.get("weekday"), row.get("count")))
        .collect();
    Ok(monday_first(&counts))
}

// ============ Rendering helpers ============

/// Re-key SQLite weekday numbers (Sunday = 0) into a Monday-first,
/// zero-filled week.
fn monday_first(counts: &[(i64, i64)]) -> Vec<(String, i64)> {
    let mut week = [0i64; 7];
    for (weekday, count) in counts {
        let index = ((weekday + 6) % 7) as usize;
        if index < 7 {
            week[index] = *count;
        }
    }
    WEEKDAYS
        .iter()
        .zip(week.iter())
        .map(|(name, count)| (name.to_string(), *count))
        .collect()
}

fn rank_counts(counts: BTreeMap<String, i64>, cap: usize) -> Vec<(String, i64)> {
    let mut ranked: Vec<(String, i64)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.truncate(cap);
    ranked
}

fn bar_chart(data: &[(String, i64)], max_width: usize) -> String {
    if data.is_empty() {
        return "No data".to_string();
    }

    let max_value = data.iter().map(|(_, v)| *v).max().unwrap_or(0);
    let mut lines = Vec::new();
    for (label, value) in data {
        let bar_len = if max_value > 0 {
            (*value as f64 / max_value as f64 * max_width as f64) as usize
        } else {
            0
        };
        lines.push(format!("{:15} {} {}", label, "█".repeat(bar_len), value));
    }

    lines.join("\n")
}

fn recommendations(
    hotspots: &[FileHotspot],
    topics: &[(String, i64)],
    active_days: i64,
) -> Vec<String> {
    let mut lines = Vec::new();

    if let Some(top) = hotspots.first() {
        if top.conversation_count >= 5 {
            lines.push(format!(
                "- **High Activity File:** `{}` was modified in {} conversations. \
                 Consider reviewing for refactoring opportunities.",
                top.file_path, top.conversation_count
            ));
        }
    }

    if let Some((topic, count)) = topics.first() {
        if *count >= 3 {
            lines.push(format!(
                "- **Trending Topic:** '{}' appeared in {} conversations. \
                 This might warrant documentation or team knowledge sharing.",
                topic, count
            ));
        }
    }

    if active_days < 3 {
        lines.push(format!(
            "- **Low Activity:** Only {} active days this week. \
             Consider scheduling regular development sessions.",
            active_days
        ));
    }

    if lines.is_empty() {
        lines.push("- No significant patterns detected this period.".to_string());
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bar_chart_renders_no_data_for_empty() {
        assert_eq!(bar_chart(&[], 40), "No data");
    }

    #[test]
    fn bar_chart_scales_to_max_width() {
        let data = vec![("alpha".to_string(), 4), ("beta".to_string(), 2)];
        let chart = bar_chart(&data, 40);
        let lines: Vec<&str> = chart.lines().collect();
        assert_eq!(lines[0], format!("{:15} {} {}", "alpha", "█".repeat(40), 4));
        assert_eq!(lines[1], format!("{:15} {} {}", "beta", "█".repeat(20), 2));
    }

    #[test]
    fn bar_chart_handles_all_zero_values() {
        let data = vec![("quiet".to_string(), 0)];
        let chart = bar_chart(&data, 40);
        assert_eq!(chart, format!("{:15}  {}", "quiet", 0));
    }

    #[test]
    fn monday_first_orders_and_zero_fills() {
        // SQLite weekday 0 is Sunday, 3 is Wednesday
        let week = monday_first(&[(0, 2), (3, 5)]);
        assert_eq!(week.len(), 7);
        assert_eq!(week[0], ("Monday".to_string(), 0));
        assert_eq!(week[2], ("Wednesday".to_string(), 5));
        assert_eq!(week[6], ("Sunday".to_string(), 2));
    }

    #[test]
    fn rank_counts_sorts_by_count_then_name() {
        let mut counts = BTreeMap::new();
        counts.insert("zebra".to_string(), 3);
        counts.insert("apple".to_string(), 3);
        counts.insert("mango".to_string(), 7);
        let ranked = rank_counts(counts, 20);
        assert_eq!(ranked[0].0, "mango");
        assert_eq!(ranked[1].0, "apple");
        assert_eq!(ranked[2].0, "zebra");
    }

    #[test]
    fn rank_counts_honors_cap() {
        let mut counts = BTreeMap::new();
        for i in 0..30 {
            counts.insert(format!("topic{:02}", i), 1);
        }
        assert_eq!(rank_counts(counts, 20).len(), 20);
    }

    #[test]
    fn recommendations_flag_hot_files_topics_and_low_activity() {
        let hotspots = vec![FileHotspot {
            file_path: "src/auth.py".to_string(),
            conversation_count: 6,
            read_count: 3,
            write_count: 1,
            edit_count: 2,
        }];
        let topics = vec![("authentication".to_string(), 4)];
        let recs = recommendations(&hotspots, &topics, 2);
        assert_eq!(recs.len(), 3);
        assert!(recs[0].contains("High Activity File"));
        assert!(recs[0].contains("src/auth.py"));
        assert!(recs[1].contains("Trending Topic"));
        assert!(recs[2].contains("Low Activity"));
    }

    #[test]
    fn recommendations_fall_back_when_nothing_stands_out() {
        let recs = recommendations(&[], &[], 5);
        assert_eq!(recs, vec!["- No significant patterns detected this period.".to_string()]);
    }

    #[test]
    fn date_filter_builds_expected_clauses() {
        assert_eq!(date_filter("", None, None), "1=1");
        assert_eq!(date_filter("", Some("2025-01-01"), None), "timestamp >= ?");
        assert_eq!(
            date_filter("c.", Some("2025-01-01"), Some("2025-02-01")),
            "c.timestamp >= ? AND c.timestamp <= ?"
        );
    }
}
