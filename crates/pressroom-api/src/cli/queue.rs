//! Queue CLI commands: list, jobs, show, pause, resume, purge.

use anyhow::{bail, Result};
use comfy_table::{presets, Cell, Color, ContentArrangement, Table};
use console::style;
use dialoguer::Confirm;

use pressroom_types::job::{Job, JobState};

use crate::state::AppState;

/// List all queues with their stats in a colored table.
pub async fn list_queues(state: &AppState, json: bool) -> Result<()> {
    let stats = state.queue_service.all_stats().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    if stats.is_empty() {
        println!();
        println!(
            "  {} No queues yet. Enqueue a job or fire a trigger to create one.",
            style("i").blue().bold()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Queue").fg(Color::White),
        Cell::new("Pending").fg(Color::White),
        Cell::new("Active").fg(Color::White),
        Cell::new("Completed").fg(Color::White),
        Cell::new("Failed").fg(Color::White),
        Cell::new("DLQ").fg(Color::White),
        Cell::new("State").fg(Color::White),
    ]);

    for s in &stats {
        let state_cell = if s.paused {
            Cell::new("⏸ paused").fg(Color::Yellow)
        } else {
            Cell::new("● running").fg(Color::Green)
        };
        let dlq_cell = if s.dead_lettered > 0 {
            Cell::new(s.dead_lettered).fg(Color::Red)
        } else {
            Cell::new(0).fg(Color::DarkGrey)
        };
        table.add_row(vec![
            Cell::new(&s.queue).fg(Color::Cyan),
            Cell::new(s.pending),
            Cell::new(s.active),
            Cell::new(s.completed).fg(Color::DarkGrey),
            Cell::new(s.failed).fg(Color::DarkGrey),
            dlq_cell,
            state_cell,
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!(
        "  {} queue{}",
        style(stats.len()).bold(),
        if stats.len() == 1 { "" } else { "s" }
    );
    println!();

    Ok(())
}

/// List jobs in a queue, newest first.
pub async fn list_jobs(
    state: &AppState,
    queue: &str,
    state_filter: Option<&str>,
    limit: u32,
    json: bool,
) -> Result<()> {
    let state_filter = state_filter.map(parse_job_state).transpose()?;
    let jobs = state
        .queue_service
        .list_jobs(queue, state_filter, limit)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&jobs)?);
        return Ok(());
    }

    if jobs.is_empty() {
        println!();
        println!(
            "  {} No jobs in '{}'",
            style("i").blue().bold(),
            style(queue).cyan()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("ID").fg(Color::White),
        Cell::new("Name").fg(Color::White),
        Cell::new("State").fg(Color::White),
        Cell::new("Attempts").fg(Color::White),
        Cell::new("Priority").fg(Color::White),
        Cell::new("Run at").fg(Color::White),
    ]);

    for job in &jobs {
        table.add_row(vec![
            Cell::new(short_id(&job.id)).fg(Color::DarkGrey),
            Cell::new(&job.name).fg(Color::Cyan),
            state_cell(&job.state),
            Cell::new(format!("{}/{}", job.attempts_made, job.attempts)),
            Cell::new(job.priority),
            Cell::new(job.run_at.format("%Y-%m-%d %H:%M:%S").to_string()).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();

    Ok(())
}

/// Show one job in full.
pub async fn show_job(state: &AppState, queue: &str, id: &str, json: bool) -> Result<()> {
    let job = state
        .queue_service
        .get_job(queue, id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("job '{id}' not found in queue '{queue}'"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&job)?);
        return Ok(());
    }

    print_job(&job);
    Ok(())
}

fn print_job(job: &Job) {
    println!();
    println!("  {}  {}", style("Job:").bold(), style(&job.name).cyan());
    println!("  {}  {}", style("ID:").bold(), style(&job.id).dim());
    println!("  {}  {}", style("Queue:").bold(), job.queue);
    println!(
        "  {}  {}",
        style("State:").bold(),
        format_state(&job.state)
    );
    println!(
        "  {}  {}/{}",
        style("Attempts:").bold(),
        job.attempts_made,
        job.attempts
    );
    if job.replay_count > 0 {
        println!("  {}  {}", style("Replays:").bold(), job.replay_count);
    }
    if let Some(err) = &job.last_error {
        println!("  {}  {}", style("Last error:").bold(), style(err).red());
    }
    println!(
        "  {}  {}",
        style("Payload:").bold(),
        serde_json::to_string(&job.payload).unwrap_or_default()
    );
    println!();
}

/// Pause claiming from a queue.
pub async fn pause(state: &AppState, queue: &str, json: bool) -> Result<()> {
    state.queue_service.pause(queue);
    if json {
        println!("{}", serde_json::json!({"queue": queue, "paused": true}));
    } else {
        println!(
            "  {} Queue '{}' paused",
            style("⏸").yellow().bold(),
            style(queue).cyan()
        );
    }
    Ok(())
}

/// Resume claiming from a queue.
pub async fn resume(state: &AppState, queue: &str, json: bool) -> Result<()> {
    state.queue_service.resume(queue);
    if json {
        println!("{}", serde_json::json!({"queue": queue, "paused": false}));
    } else {
        println!(
            "  {} Queue '{}' resumed",
            style("▶").green().bold(),
            style(queue).cyan()
        );
    }
    Ok(())
}

/// Drop all pending jobs from a queue after confirmation.
pub async fn purge(state: &AppState, queue: &str, force: bool, json: bool) -> Result<()> {
    if !force {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Drop all pending jobs from '{}'?",
                style(queue).red().bold()
            ))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("  Aborted.");
            return Ok(());
        }
    }

    let removed = state.queue_service.purge(queue).await?;

    if json {
        println!("{}", serde_json::json!({"queue": queue, "removed": removed}));
    } else {
        println!(
            "  {} Removed {} pending job{} from '{}'",
            style("✓").green().bold(),
            style(removed).bold(),
            if removed == 1 { "" } else { "s" },
            style(queue).cyan()
        );
    }
    Ok(())
}

pub(crate) fn parse_job_state(s: &str) -> Result<JobState> {
    match s {
        "pending" => Ok(JobState::Pending),
        "active" => Ok(JobState::Active),
        "completed" => Ok(JobState::Completed),
        "failed" => Ok(JobState::Failed),
        other => bail!("unknown job state '{other}' (expected pending, active, completed, failed)"),
    }
}

pub(crate) fn state_cell(state: &JobState) -> Cell {
    match state {
        JobState::Pending => Cell::new("○ pending").fg(Color::Yellow),
        JobState::Active => Cell::new("● active").fg(Color::Green),
        JobState::Completed => Cell::new("✓ completed").fg(Color::DarkGrey),
        JobState::Failed => Cell::new("✗ failed").fg(Color::Red),
    }
}

fn format_state(state: &JobState) -> String {
    match state {
        JobState::Pending => format!("{}", style("pending").yellow()),
        JobState::Active => format!("{}", style("active").green()),
        JobState::Completed => format!("{}", style("completed").dim()),
        JobState::Failed => format!("{}", style("failed").red()),
    }
}

pub(crate) fn short_id(id: &str) -> String {
    if id.len() > 12 {
        format!("{}…", &id[..12])
    } else {
        id.to_string()
    }
}
