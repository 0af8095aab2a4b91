//! Dead-letter queue CLI commands: list, show, replay, purge.

use anyhow::{Context, Result};
use comfy_table::{presets, Cell, Color, ContentArrangement, Table};
use console::style;
use dialoguer::Confirm;
use uuid::Uuid;

use pressroom_types::dlq::DlqFilter;

use crate::cli::queue::short_id;
use crate::state::AppState;

/// List dead-letter entries, most recent failure first.
pub async fn list_entries(
    state: &AppState,
    queue: Option<&str>,
    search: Option<&str>,
    limit: u32,
    json: bool,
) -> Result<()> {
    let filter = DlqFilter {
        queue: queue.map(str::to_string),
        search: search.map(str::to_string),
        ..Default::default()
    };
    let entries = state.dlq_service.list(&filter, limit, 0).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!();
        println!(
            "  {} Dead-letter queue is empty",
            style("✓").green().bold()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("ID").fg(Color::White),
        Cell::new("Queue").fg(Color::White),
        Cell::new("Job").fg(Color::White),
        Cell::new("Error").fg(Color::White),
        Cell::new("Replays").fg(Color::White),
        Cell::new("Failed at").fg(Color::White),
    ]);

    for entry in &entries {
        let error = if entry.error.len() > 40 {
            format!("{}...", &entry.error[..37])
        } else {
            entry.error.clone()
        };
        table.add_row(vec![
            Cell::new(short_id(&entry.id.to_string())).fg(Color::DarkGrey),
            Cell::new(&entry.original_queue).fg(Color::Cyan),
            Cell::new(&entry.job_name),
            Cell::new(error).fg(Color::Red),
            Cell::new(entry.replay_count),
            Cell::new(entry.failed_at.format("%Y-%m-%d %H:%M:%S").to_string())
                .fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!(
        "  {} entr{}",
        style(entries.len()).bold(),
        if entries.len() == 1 { "y" } else { "ies" }
    );
    println!();

    Ok(())
}

/// Show one dead-letter entry in full.
pub async fn show_entry(state: &AppState, id: &str, json: bool) -> Result<()> {
    let id = Uuid::parse_str(id).context("invalid entry UUID")?;
    let entry = state.dlq_service.get(&id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
        return Ok(());
    }

    println!();
    println!(
        "  {}  {}",
        style("Entry:").bold(),
        style(entry.id.to_string()).dim()
    );
    println!(
        "  {}  {}",
        style("Queue:").bold(),
        style(&entry.original_queue).cyan()
    );
    println!("  {}  {}", style("Job:").bold(), entry.job_name);
    println!(
        "  {}  {}",
        style("Job ID:").bold(),
        style(&entry.original_job_id).dim()
    );
    println!(
        "  {}  {}",
        style("Error:").bold(),
        style(&entry.error).red()
    );
    println!(
        "  {}  {} (after {} attempts)",
        style("Failed:").bold(),
        entry.failed_at.format("%Y-%m-%d %H:%M:%S"),
        entry.attempts_made
    );
    println!(
        "  {}  {}/{}",
        style("Replays:").bold(),
        entry.replay_count,
        state.dlq_service.max_replays()
    );
    println!(
        "  {}  {}",
        style("Payload:").bold(),
        serde_json::to_string(&entry.payload).unwrap_or_default()
    );
    println!();

    Ok(())
}

/// Replay entries back onto their original queues.
///
/// Each id succeeds or fails on its own; one bad id never blocks the rest.
pub async fn replay(state: &AppState, ids: &[String], json: bool) -> Result<()> {
    let mut uuids = Vec::with_capacity(ids.len());
    for id in ids {
        uuids.push(Uuid::parse_str(id).with_context(|| format!("invalid entry UUID '{id}'"))?);
    }

    let results = state.dlq_service.replay_many(&uuids).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    println!();
    for result in &results {
        match &result.error {
            None => println!(
                "  {} {} replayed",
                style("✓").green().bold(),
                style(result.id.to_string()).dim()
            ),
            Some(err) => println!(
                "  {} {} {}",
                style("✗").red().bold(),
                style(result.id.to_string()).dim(),
                style(err).red()
            ),
        }
    }
    let ok = results.iter().filter(|r| r.ok).count();
    println!();
    println!(
        "  {} of {} replayed",
        style(ok).bold(),
        results.len()
    );
    println!();

    Ok(())
}

/// Drop dead-letter entries after confirmation.
pub async fn purge(state: &AppState, queue: Option<&str>, force: bool, json: bool) -> Result<()> {
    let filter = DlqFilter {
        queue: queue.map(str::to_string),
        ..Default::default()
    };

    if !force {
        let prompt = match queue {
            Some(q) => format!(
                "Drop all dead-letter entries from '{}'?",
                style(q).red().bold()
            ),
            None => format!(
                "Drop the {} dead-letter queue?",
                style("ENTIRE").red().bold()
            ),
        };
        let confirmed = Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()?;
        if !confirmed {
            println!("  Aborted.");
            return Ok(());
        }
    }

    let removed = state.dlq_service.purge(&filter).await?;

    if json {
        println!("{}", serde_json::json!({"removed": removed}));
    } else {
        println!(
            "  {} Removed {} entr{}",
            style("✓").green().bold(),
            style(removed).bold(),
            if removed == 1 { "y" } else { "ies" }
        );
    }
    Ok(())
}
