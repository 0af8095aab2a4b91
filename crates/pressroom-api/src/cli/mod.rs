//! CLI command definitions and dispatch for the `pressd` binary.
//!
//! Uses clap derive macros for argument parsing. The CLI follows a verb-noun
//! pattern (e.g., `pressd list queues`, `pressd show instance <id>`).

pub mod dlq;
pub mod queue;
pub mod status;
pub mod workflow;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Workflow orchestration and job queue engine for Pressroom.
#[derive(Parser)]
#[command(name = "pressd", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the REST API server and queue workers.
    Serve {
        /// Port to listen on.
        #[arg(short, long, default_value = "7700")]
        port: u16,

        /// Host to bind to.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Export spans via the OpenTelemetry stdout exporter.
        #[arg(long)]
        otel: bool,
    },

    /// Register a workflow definition from a YAML or JSON file.
    Apply {
        /// Path to the workflow spec file.
        file: PathBuf,
    },

    /// List resources.
    #[command(alias = "ls")]
    List {
        #[command(subcommand)]
        resource: ListResource,
    },

    /// Show details of a resource.
    Show {
        #[command(subcommand)]
        resource: ShowResource,
    },

    /// Fire a business trigger, fanning out to subscribed workflows.
    Trigger {
        /// Trigger type, e.g. `article.published`.
        trigger_type: String,

        /// Optional JSON payload for the trigger.
        #[arg(long)]
        payload: Option<String>,

        /// Workspace UUID to scope the trigger to (omit for global only).
        #[arg(long)]
        workspace: Option<String>,
    },

    /// Start one instance of a workflow definition version on demand.
    Run {
        /// Definition UUID.
        id: String,

        /// Optional JSON payload for the run.
        #[arg(long)]
        payload: Option<String>,
    },

    /// Pause claiming from a queue.
    Pause {
        /// Queue name.
        queue: String,
    },

    /// Resume claiming from a queue.
    Resume {
        /// Queue name.
        queue: String,
    },

    /// Replay dead-letter entries back onto their original queues.
    Replay {
        /// Entry UUIDs to replay.
        ids: Vec<String>,
    },

    /// Purge pending jobs from a queue, or the dead-letter queue.
    Purge {
        #[command(subcommand)]
        resource: PurgeResource,
    },

    /// System status dashboard.
    Status,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum ListResource {
    /// List all queues with their stats.
    Queues,

    /// List jobs in a queue.
    Jobs {
        /// Queue name.
        queue: String,

        /// Filter by state (pending, active, completed, failed).
        #[arg(long)]
        state: Option<String>,

        /// Maximum number of jobs to display.
        #[arg(long, default_value = "50")]
        limit: u32,
    },

    /// List workflow definition versions.
    Workflows {
        /// Only show active versions.
        #[arg(long)]
        active: bool,
    },

    /// List workflow instances, newest first.
    Instances {
        /// Filter by workflow key.
        #[arg(long)]
        workflow: Option<String>,

        /// Filter by status (running, completed, failed, rollback).
        #[arg(long)]
        status: Option<String>,

        /// Maximum number of instances to display.
        #[arg(long, default_value = "50")]
        limit: u32,
    },

    /// List dead-letter entries, most recent failure first.
    Dlq {
        /// Filter by original queue.
        #[arg(long)]
        queue: Option<String>,

        /// Substring search over error message and job id.
        #[arg(long)]
        search: Option<String>,

        /// Maximum number of entries to display.
        #[arg(long, default_value = "50")]
        limit: u32,
    },
}

#[derive(Subcommand)]
pub enum ShowResource {
    /// Show one job.
    Job {
        /// Queue name.
        queue: String,

        /// Job ID.
        id: String,
    },

    /// Show one workflow definition version.
    Workflow {
        /// Definition UUID.
        id: String,
    },

    /// Show one workflow instance with its step executions.
    Instance {
        /// Instance UUID.
        id: String,
    },

    /// Show one dead-letter entry.
    Dlq {
        /// Entry UUID.
        id: String,
    },
}

#[derive(Subcommand)]
pub enum PurgeResource {
    /// Drop all pending jobs from a queue.
    Queue {
        /// Queue name.
        queue: String,

        /// Skip confirmation prompt.
        #[arg(long)]
        force: bool,
    },

    /// Drop dead-letter entries.
    Dlq {
        /// Only entries from this original queue (omit for all).
        #[arg(long)]
        queue: Option<String>,

        /// Skip confirmation prompt.
        #[arg(long)]
        force: bool,
    },
}
