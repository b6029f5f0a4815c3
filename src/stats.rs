//! Store statistics.
//!
//! `courier store stats` prints every collection with its record count,
//! vector dimensionality and when records were last added.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::store::Store;

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionStats {
    pub name: String,
    pub records: i64,
    pub dims: Option<i64>,
    pub last_added_ts: Option<i64>,
}

pub async fn collection_stats(store: &Store) -> Result<Vec<CollectionStats>> {
    let rows = sqlx::query(
        r#"
        SELECT
            c.name AS name,
            COUNT(r.id) AS records,
            MAX(r.dims) AS dims,
            MAX(r.created_at) AS last_added
        FROM collections c
        LEFT JOIN records r ON r.collection = c.name
        GROUP BY c.name
        ORDER BY c.name
        "#,
    )
    .fetch_all(store.pool())
    .await?;

    Ok(rows
        .iter()
        .map(|row| CollectionStats {
            name: row.get("name"),
            records: row.get("records"),
            dims: row.get("dims"),
            last_added_ts: row.get("last_added"),
        })
        .collect())
}

/// Run the stats command: query the store and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let store = Store::open(&config.store).await?;
    let stats = collection_stats(&store).await?;

    let db_size = std::fs::metadata(&config.store.path)
        .map(|m| m.len())
        .unwrap_or(0);
    let total: i64 = stats.iter().map(|s| s.records).sum();

    println!("Courier Store Stats");
    println!("===================");
    println!();
    println!("  Store:       {}", config.store.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Collections: {}", stats.len());
    println!("  Records:     {}", total);

    if !stats.is_empty() {
        println!();
        println!(
            "  {:<24} {:>8} {:>6}   {}",
            "COLLECTION", "RECORDS", "DIMS", "LAST ADDED"
        );
        println!("  {}", "-".repeat(60));
        for s in &stats {
            let dims = s.dims.map(|d| d.to_string()).unwrap_or_else(|| "-".into());
            let last = s.last_added_ts.map_or_else(|| "never".to_string(), format_age);
            println!("  {:<24} {:>8} {:>6}   {}", s.name, s.records, dims, last);
        }
    }

    println!();
    store.close().await;
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 3] = ["KB", "MB", "GB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// "just now", "5 mins ago", "1 day ago"; a date after 30 days or for
/// timestamps in the future.
fn format_age(ts: i64) -> String {
    // (upper bound, seconds per unit, unit)
    const STEPS: [(i64, i64, &str); 3] = [
        (3_600, 60, "min"),
        (86_400, 3_600, "hour"),
        (86_400 * 30, 86_400, "day"),
    ];
    let age = chrono::Utc::now().timestamp() - ts;
    if (0..60).contains(&age) {
        return "just now".to_string();
    }
    STEPS
        .iter()
        .find(|(limit, _, _)| age >= 0 && age < *limit)
        .map(|(_, per, unit)| {
            let n = age / per;
            format!("{} {}{} ago", n, unit, if n == 1 { "" } else { "s" })
        })
        .unwrap_or_else(|| format_date(ts))
}

fn format_date(ts: i64) -> String {
    match chrono::DateTime::from_timestamp(ts, 0) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
        None => ts.to_string(),
    }
}
