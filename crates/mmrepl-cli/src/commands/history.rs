//! History command - Inspect the conflict-history store
//!
//! Provides the `mmrepl history` CLI command which:
//! 1. Lists the most recent conflicts
//! 2. Shows one conflict in full
//! 3. Summarises conflicts by type and resolution

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;
use mmrepl_audit::format::server_log_line;
use mmrepl_cache::{DatabasePool, SqliteConflictHistory};
use mmrepl_core::{config::Config, ports::StoredConflict};
use tracing::info;

use crate::output::{get_formatter, OutputFormat, OutputFormatter};

/// History subcommands
#[derive(Debug, Subcommand)]
pub enum HistoryCommand {
    /// List recent conflicts, newest first
    List {
        /// Maximum number of conflicts to show
        #[arg(long, default_value_t = 20)]
        limit: u32,
        /// Conflict-history database (defaults to storage.history_db)
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Show one conflict in full
    Show {
        /// Conflict id
        id: i64,
        /// Conflict-history database (defaults to storage.history_db)
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Count conflicts by type and resolution
    Stats {
        /// Conflict-history database (defaults to storage.history_db)
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

impl HistoryCommand {
    /// Execute the history command
    pub async fn execute(&self, format: OutputFormat, config: &Config) -> Result<()> {
        let formatter = get_formatter(format);

        let db = match self {
            HistoryCommand::List { db, .. }
            | HistoryCommand::Show { db, .. }
            | HistoryCommand::Stats { db } => {
                db.clone().unwrap_or_else(|| config.storage.history_db.clone())
            }
        };

        let Some(history) = open_history(&db, &*formatter).await? else {
            return Ok(());
        };

        match self {
            HistoryCommand::List { limit, .. } => {
                execute_list(&history, *limit, format, &*formatter, config).await
            }
            HistoryCommand::Show { id, .. } => {
                execute_show(&history, *id, format, &*formatter, config).await
            }
            HistoryCommand::Stats { .. } => execute_stats(&history, format, &*formatter).await,
        }
    }
}

/// Open the store read-only, reporting a missing file instead of failing
async fn open_history(
    db: &Path,
    formatter: &dyn OutputFormatter,
) -> Result<Option<SqliteConflictHistory>> {
    if !db.exists() {
        formatter.error(&format!(
            "No conflict history at {}. Enable conflicts.log_to_table to record conflicts.",
            db.display()
        ));
        return Ok(None);
    }

    let pool = DatabasePool::open_read_only(db)
        .await
        .context("Failed to open conflict history")?;
    Ok(Some(SqliteConflictHistory::new(pool.pool().clone())))
}

fn node_names(config: &Config) -> HashMap<mmrepl_core::domain::NodeId, String> {
    config
        .node
        .name
        .iter()
        .map(|name| (config.node.node_id(), name.clone()))
        .collect()
}

async fn execute_list(
    history: &SqliteConflictHistory,
    limit: u32,
    format: OutputFormat,
    formatter: &dyn OutputFormatter,
    config: &Config,
) -> Result<()> {
    let conflicts = history
        .recent(limit)
        .await
        .context("Failed to query conflict history")?;

    info!(count = conflicts.len(), "Retrieved conflicts");

    if format.is_json() {
        let json = serde_json::json!({
            "count": conflicts.len(),
            "conflicts": conflicts,
        });
        formatter.print_json(&json);
        return Ok(());
    }

    if conflicts.is_empty() {
        formatter.success("No conflicts recorded");
        return Ok(());
    }

    formatter.success(&format!(
        "{} conflict{}",
        conflicts.len(),
        if conflicts.len() == 1 { "" } else { "s" }
    ));
    formatter.info("");
    formatter.info(&format!(
        "{:>8}  {:<19}  {:<18}  {:<30}  {}",
        "ID", "Detected", "Type", "Resolution", "Object"
    ));

    let names = node_names(config);
    for conflict in &conflicts {
        formatter.info(&list_row(conflict));
        if let Ok(line) = server_log_line(&conflict.record, &names) {
            formatter.info(&format!("          {}", line));
        }
    }

    formatter.info("");
    formatter.info("Use 'mmrepl history show <id>' for details.");

    Ok(())
}

fn list_row(conflict: &StoredConflict) -> String {
    let record = &conflict.record;
    format!(
        "{:>8}  {:<19}  {:<18}  {:<30}  {}",
        conflict.id,
        record.local_conflict_time().format("%Y-%m-%d %H:%M:%S"),
        record.conflict_type().as_str(),
        record.resolution().as_str(),
        record.object_display().unwrap_or_else(|| "-".into())
    )
}

async fn execute_show(
    history: &SqliteConflictHistory,
    id: i64,
    format: OutputFormat,
    formatter: &dyn OutputFormatter,
    config: &Config,
) -> Result<()> {
    let Some(conflict) = history
        .get(id)
        .await
        .context("Failed to query conflict history")?
    else {
        formatter.error(&format!("No conflict with id {}", id));
        return Ok(());
    };

    if format.is_json() {
        let json = serde_json::to_value(&conflict).context("Failed to serialize conflict")?;
        formatter.print_json(&json);
        return Ok(());
    }

    let record = &conflict.record;
    formatter.success(&format!("Conflict {}", conflict.id));
    formatter.info("");
    formatter.info(&format!("Type:            {}", record.conflict_type()));
    formatter.info(&format!("Resolution:      {}", record.resolution()));
    formatter.info(&format!(
        "Object:          {}",
        record.object_display().unwrap_or_else(|| "-".into())
    ));
    formatter.info(&format!(
        "Detected:        {} (txid {}, lsn {}) on {}",
        record.local_conflict_time().to_rfc3339(),
        record.local_conflict_txid(),
        record.local_conflict_lsn(),
        record.local_node()
    ));
    formatter.info(&format!(
        "Remote:          {} txid {} committed {} at {}",
        record.remote_node(),
        record.remote_txid(),
        record.remote_commit_time().to_rfc3339(),
        record.remote_commit_lsn()
    ));

    if record.local_tuple_null() {
        formatter.info("Local row:       (none)");
    } else {
        formatter.info(&format!(
            "Local row:       xmin {} origin {} committed {}",
            record
                .local_tuple_xmin()
                .map(|x| x.to_string())
                .unwrap_or_else(|| "-".into()),
            record
                .local_tuple_origin()
                .map(|n| n.to_string())
                .unwrap_or_else(|| "unknown".into()),
            record
                .local_commit_time()
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "-".into())
        ));
    }
    if let Some(key) = record.key_text() {
        formatter.info(&format!("Key:            {}", key));
    }
    if let Some(tuple) = record.local_tuple() {
        formatter.info(&format!("Local tuple:     {}", tuple.to_json()));
    }
    if let Some(tuple) = record.remote_tuple() {
        formatter.info(&format!("Remote tuple:    {}", tuple.to_json()));
    }
    if let Some(err) = record.apply_error() {
        formatter.info(&format!("Apply error:     {}", err));
        for (label, value) in [
            ("Detail", &err.detail),
            ("Hint", &err.hint),
            ("Context", &err.context),
            ("Constraint", &err.constraint),
            ("Function", &err.function),
        ] {
            if let Some(value) = value {
                formatter.info(&format!("  {:<12}  {}", label, value));
            }
        }
    }

    formatter.info("");
    if let Ok(line) = server_log_line(record, &node_names(config)) {
        formatter.info(&line);
    }

    Ok(())
}

async fn execute_stats(
    history: &SqliteConflictHistory,
    format: OutputFormat,
    formatter: &dyn OutputFormatter,
) -> Result<()> {
    let stats = history
        .stats()
        .await
        .context("Failed to compute conflict statistics")?;

    if format.is_json() {
        let by_type: serde_json::Map<String, serde_json::Value> = stats
            .by_type
            .iter()
            .map(|(t, n)| (t.as_str().to_string(), (*n).into()))
            .collect();
        let by_resolution: serde_json::Map<String, serde_json::Value> = stats
            .by_resolution
            .iter()
            .map(|(r, n)| (r.as_str().to_string(), (*n).into()))
            .collect();
        formatter.print_json(&serde_json::json!({
            "total": stats.total,
            "by_type": by_type,
            "by_resolution": by_resolution,
        }));
        return Ok(());
    }

    formatter.success(&format!("{} conflicts recorded", stats.total));
    if stats.total == 0 {
        return Ok(());
    }

    formatter.info("");
    formatter.info("By type:");
    for (conflict_type, n) in &stats.by_type {
        formatter.info(&format!("  {:<32} {:>8}", conflict_type.as_str(), n));
    }
    formatter.info("");
    formatter.info("By resolution:");
    for (resolution, n) in &stats.by_resolution {
        formatter.info(&format!("  {:<32} {:>8}", resolution.as_str(), n));
    }

    Ok(())
}
