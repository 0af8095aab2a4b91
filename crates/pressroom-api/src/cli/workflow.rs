//! Workflow CLI commands: apply, list, show, instances, trigger.

use std::path::Path;

use anyhow::{bail, Context, Result};
use comfy_table::{presets, Cell, Color, ContentArrangement, Table};
use console::style;
use uuid::Uuid;

use pressroom_types::workflow::{
    InstanceStatus, StepExecStatus, WorkflowDefinition, WorkflowSpec,
};

use crate::cli::queue::short_id;
use crate::state::AppState;

/// Register a workflow definition from a YAML or JSON file.
///
/// The file holds a `WorkflowSpec`; version numbering and activation are
/// handled by the definition service.
pub async fn apply(state: &AppState, file: &Path, json: bool) -> Result<()> {
    let raw = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;

    let spec: WorkflowSpec = match file.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&raw)
            .with_context(|| format!("invalid workflow JSON in {}", file.display()))?,
        _ => serde_yaml_ng::from_str(&raw)
            .with_context(|| format!("invalid workflow YAML in {}", file.display()))?,
    };

    let def = state.definitions.apply(spec).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&def)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Workflow '{}' v{} registered and activated",
        style("✓").green().bold(),
        style(&def.key).cyan(),
        style(def.version).bold()
    );
    println!(
        "  {}  {}",
        style("ID:").bold(),
        style(def.id.to_string()).dim()
    );
    if !def.triggers.is_empty() {
        let triggers: Vec<&str> = def
            .triggers
            .iter()
            .map(|t| t.trigger_type.as_str())
            .collect();
        println!("  {}  {}", style("Triggers:").bold(), triggers.join(", "));
    }
    println!(
        "  {}  {}",
        style("Steps:").bold(),
        def.steps
            .iter()
            .map(|s| s.key.as_str())
            .collect::<Vec<_>>()
            .join(" → ")
    );
    println!();

    Ok(())
}

/// List workflow definition versions.
pub async fn list(state: &AppState, active_only: bool, json: bool) -> Result<()> {
    let defs = state.definitions.list(active_only).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&defs)?);
        return Ok(());
    }

    if defs.is_empty() {
        println!();
        println!(
            "  {} No workflows registered. Add one with: {}",
            style("i").blue().bold(),
            style("pressd apply workflow.yaml").yellow()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Key").fg(Color::White),
        Cell::new("Version").fg(Color::White),
        Cell::new("Name").fg(Color::White),
        Cell::new("Triggers").fg(Color::White),
        Cell::new("Steps").fg(Color::White),
        Cell::new("Active").fg(Color::White),
    ]);

    for def in &defs {
        let triggers: Vec<&str> = def
            .triggers
            .iter()
            .map(|t| t.trigger_type.as_str())
            .collect();
        let active_cell = if def.is_active {
            Cell::new("● active").fg(Color::Green)
        } else {
            Cell::new("◌ inactive").fg(Color::DarkGrey)
        };
        table.add_row(vec![
            Cell::new(&def.key).fg(Color::Cyan),
            Cell::new(def.version),
            Cell::new(&def.name),
            Cell::new(triggers.join(", ")),
            Cell::new(def.steps.len()),
            active_cell,
        ]);
    }

    println!();
    println!("{table}");
    println!();

    Ok(())
}

/// Show one definition version in full.
pub async fn show(state: &AppState, id: &str, json: bool) -> Result<()> {
    let id = Uuid::parse_str(id).context("invalid workflow UUID")?;
    let def = state.definitions.get(&id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&def)?);
        return Ok(());
    }

    print_definition(&def);
    Ok(())
}

fn print_definition(def: &WorkflowDefinition) {
    println!();
    println!(
        "  {} {} v{} {}",
        style(&def.name).bold(),
        style(format!("({})", def.key)).cyan(),
        def.version,
        if def.is_active {
            style("active").green()
        } else {
            style("inactive").dim()
        }
    );
    println!(
        "  {}  {}",
        style("ID:").bold(),
        style(def.id.to_string()).dim()
    );
    for trigger in &def.triggers {
        println!("  {}  {}", style("Trigger:").bold(), trigger.trigger_type);
    }
    println!();
    for (i, step) in def.steps.iter().enumerate() {
        println!(
            "  {} {} {}",
            style(format!("{}.", i + 1)).dim(),
            style(&step.key).cyan(),
            style(format!("[{}]", step.action.as_str())).dim()
        );
        if let Some(cond) = &step.condition {
            println!(
                "     if {} == {}",
                cond.left,
                serde_json::to_string(&cond.right.to_json()).unwrap_or_default()
            );
        }
        if step.retries > 0 {
            println!(
                "     retries: {} (delay {}ms)",
                step.retries, step.retry_delay_ms
            );
        }
        if let Some(target) = &step.rollback_to {
            println!("     rollback_to: {target}");
        }
    }
    println!();
}

/// List workflow instances, newest first.
pub async fn list_instances(
    state: &AppState,
    workflow_key: Option<&str>,
    status: Option<&str>,
    limit: u32,
    json: bool,
) -> Result<()> {
    let status = status.map(parse_instance_status).transpose()?;
    let instances = state
        .runner
        .list_instances(workflow_key, status, limit)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&instances)?);
        return Ok(());
    }

    if instances.is_empty() {
        println!();
        println!("  {} No instances found", style("i").blue().bold());
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("ID").fg(Color::White),
        Cell::new("Workflow").fg(Color::White),
        Cell::new("Status").fg(Color::White),
        Cell::new("Step").fg(Color::White),
        Cell::new("Started").fg(Color::White),
    ]);

    for inst in &instances {
        table.add_row(vec![
            Cell::new(short_id(&inst.id.to_string())).fg(Color::DarkGrey),
            Cell::new(&inst.workflow_key).fg(Color::Cyan),
            instance_status_cell(&inst.status),
            Cell::new(inst.current_step),
            Cell::new(inst.started_at.format("%Y-%m-%d %H:%M:%S").to_string())
                .fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();

    Ok(())
}

/// Show one instance with its step execution audit trail.
pub async fn show_instance(state: &AppState, id: &str, json: bool) -> Result<()> {
    let id = Uuid::parse_str(id).context("invalid instance UUID")?;
    let instance = state.runner.get_instance(&id).await?;
    let steps = state.runner.step_executions(&id).await?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "instance": instance,
                "steps": steps,
            }))?
        );
        return Ok(());
    }

    println!();
    println!(
        "  {} {} {}",
        style("Instance").bold(),
        style(instance.id.to_string()).dim(),
        format_instance_status(&instance.status)
    );
    println!(
        "  {}  {}",
        style("Workflow:").bold(),
        style(&instance.workflow_key).cyan()
    );
    println!(
        "  {}  {}",
        style("Started:").bold(),
        instance.started_at.format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(done) = &instance.completed_at {
        println!(
            "  {}  {}",
            style("Finished:").bold(),
            done.format("%Y-%m-%d %H:%M:%S")
        );
    }
    if !instance.context.is_empty() {
        let ctx: serde_json::Map<String, serde_json::Value> = instance
            .context
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        println!(
            "  {}  {}",
            style("Context:").bold(),
            serde_json::to_string(&ctx).unwrap_or_default()
        );
    }

    if steps.is_empty() {
        println!();
        return Ok(());
    }

    println!();
    for step in &steps {
        let marker = match step.status {
            StepExecStatus::Completed => style("✓").green(),
            StepExecStatus::Running => style("●").yellow(),
            StepExecStatus::Skipped => style("○").dim(),
            StepExecStatus::Failed => style("✗").red(),
        };
        print!(
            "  {} {} ({} attempt{})",
            marker,
            style(&step.step_key).cyan(),
            step.attempts,
            if step.attempts == 1 { "" } else { "s" }
        );
        if let Some(err) = &step.error {
            print!(" {}", style(err).red());
        }
        println!();
    }
    println!();

    Ok(())
}

/// Fire a business trigger and report the dispatched jobs.
pub async fn trigger(
    state: &AppState,
    trigger_type: &str,
    payload: Option<&str>,
    workspace: Option<&str>,
    json: bool,
) -> Result<()> {
    let payload: serde_json::Value = match payload {
        Some(raw) => serde_json::from_str(raw).context("payload must be valid JSON")?,
        None => serde_json::json!({}),
    };
    let workspace = workspace
        .map(Uuid::parse_str)
        .transpose()
        .context("invalid workspace UUID")?;

    let jobs = state
        .dispatcher
        .dispatch(trigger_type, payload, workspace)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&jobs)?);
        return Ok(());
    }

    if jobs.is_empty() {
        println!();
        println!(
            "  {} No active workflow subscribes to '{}'",
            style("i").blue().bold(),
            style(trigger_type).cyan()
        );
        println!();
        return Ok(());
    }

    println!();
    println!(
        "  {} Trigger '{}' dispatched to {} workflow{}",
        style("✓").green().bold(),
        style(trigger_type).cyan(),
        style(jobs.len()).bold(),
        if jobs.len() == 1 { "" } else { "s" }
    );
    for job in &jobs {
        println!("    {} job {}", style("•").dim(), style(&job.id).dim());
    }
    println!();

    Ok(())
}

/// Start one instance of a definition version on demand.
pub async fn run(state: &AppState, id: &str, payload: Option<&str>, json: bool) -> Result<()> {
    let id = Uuid::parse_str(id).context("invalid workflow UUID")?;
    let payload: serde_json::Value = match payload {
        Some(raw) => serde_json::from_str(raw).context("payload must be valid JSON")?,
        None => serde_json::json!({}),
    };

    let job = state.dispatcher.run(&id, payload).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&job)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Run dispatched as job {}",
        style("✓").green().bold(),
        style(&job.id).dim()
    );
    println!();

    Ok(())
}

fn parse_instance_status(s: &str) -> Result<InstanceStatus> {
    match s {
        "running" => Ok(InstanceStatus::Running),
        "completed" => Ok(InstanceStatus::Completed),
        "failed" => Ok(InstanceStatus::Failed),
        "rollback" => Ok(InstanceStatus::Rollback),
        other => {
            bail!("unknown instance status '{other}' (expected running, completed, failed, rollback)")
        }
    }
}

fn instance_status_cell(status: &InstanceStatus) -> Cell {
    match status {
        InstanceStatus::Running => Cell::new("● running").fg(Color::Green),
        InstanceStatus::Completed => Cell::new("✓ completed").fg(Color::DarkGrey),
        InstanceStatus::Failed => Cell::new("✗ failed").fg(Color::Red),
        InstanceStatus::Rollback => Cell::new("↺ rollback").fg(Color::Yellow),
    }
}

fn format_instance_status(status: &InstanceStatus) -> String {
    match status {
        InstanceStatus::Running => format!("{}", style("running").green()),
        InstanceStatus::Completed => format!("{}", style("completed").dim()),
        InstanceStatus::Failed => format!("{}", style("failed").red()),
        InstanceStatus::Rollback => format!("{}", style("rollback").yellow()),
    }
}
