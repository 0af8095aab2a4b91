//! System status dashboard command.

use anyhow::Result;
use console::style;

use crate::state::AppState;

/// Display system status dashboard.
///
/// Shows per-queue depth, DLQ size, active workflow count, and where the
/// data lives.
pub async fn status(state: &AppState, json: bool) -> Result<()> {
    let stats = state.queue_service.all_stats().await?;
    let workflows = state.definitions.list(true).await.unwrap_or_default();

    let pending: u64 = stats.iter().map(|s| s.pending).sum();
    let active: u64 = stats.iter().map(|s| s.active).sum();
    let failed: u64 = stats.iter().map(|s| s.failed).sum();
    let dead_lettered: u64 = stats.iter().map(|s| s.dead_lettered).sum();
    let paused = stats.iter().filter(|s| s.paused).count();

    if json {
        let status = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "data_dir": state.data_dir.display().to_string(),
            "queues": {
                "total": stats.len(),
                "paused": paused,
                "pending_jobs": pending,
                "active_jobs": active,
                "failed_jobs": failed,
            },
            "dlq_entries": dead_lettered,
            "active_workflows": workflows.len(),
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Pressroom v{}",
        style("⚡").bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!();

    println!("  {}", style("── Queues ──").dim());
    println!("  Total:   {}", style(stats.len()).bold());
    println!("  Pending: {}", style(pending).yellow());
    println!("  Active:  {}", style(active).green());
    if failed > 0 {
        println!("  Failed:  {}", style(failed).red());
    }
    if paused > 0 {
        println!("  Paused:  {}", style(paused).yellow());
    }
    println!();

    println!("  {}", style("── Dead letters ──").dim());
    if dead_lettered > 0 {
        println!("  Entries: {}", style(dead_lettered).red().bold());
    } else {
        println!("  Entries: {}", style(0).green());
    }
    println!();

    println!("  {}", style("── Workflows ──").dim());
    println!("  Active: {}", style(workflows.len()).bold());
    for def in &workflows {
        println!(
            "    {} {} v{}",
            style("•").dim(),
            style(&def.key).cyan(),
            def.version
        );
    }
    println!();

    println!("  {}", style("── System ──").dim());
    println!("  Data dir: {}", style(state.data_dir.display()).dim());
    println!("  Database: {}", style("SQLite (WAL mode)").dim());
    println!();

    Ok(())
}
