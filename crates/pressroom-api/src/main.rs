//! Pressroom CLI and REST API entry point.
//!
//! Binary name: `pressd`
//!
//! Parses CLI arguments, initializes the database and services, then
//! dispatches to the appropriate command handler or starts the REST API
//! server with its queue worker pools.

mod cli;
mod http;
mod jobs;
mod state;

use clap::Parser;
use clap_complete::generate;

use cli::{Cli, Commands, ListResource, PurgeResource, ShowResource};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up tracing based on verbosity; RUST_LOG overrides.
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,pressroom=debug",
        _ => "trace",
    };
    let otel = matches!(cli.command, Commands::Serve { otel: true, .. });
    pressroom_observe::tracing_setup::init_tracing(otel, filter)
        .map_err(|e| anyhow::anyhow!("tracing init failed: {e}"))?;

    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "pressd", &mut std::io::stdout());
        return Ok(());
    }

    // Initialize application state (DB, services)
    let state = AppState::init().await?;

    match cli.command {
        Commands::Serve { port, host, .. } => {
            serve(state, &host, port).await?;
        }

        Commands::Apply { file } => {
            cli::workflow::apply(&state, &file, cli.json).await?;
        }

        Commands::List { resource } => match resource {
            ListResource::Queues => {
                cli::queue::list_queues(&state, cli.json).await?;
            }
            ListResource::Jobs {
                queue,
                state: job_state,
                limit,
            } => {
                cli::queue::list_jobs(&state, &queue, job_state.as_deref(), limit, cli.json)
                    .await?;
            }
            ListResource::Workflows { active } => {
                cli::workflow::list(&state, active, cli.json).await?;
            }
            ListResource::Instances {
                workflow,
                status,
                limit,
            } => {
                cli::workflow::list_instances(
                    &state,
                    workflow.as_deref(),
                    status.as_deref(),
                    limit,
                    cli.json,
                )
                .await?;
            }
            ListResource::Dlq {
                queue,
                search,
                limit,
            } => {
                cli::dlq::list_entries(&state, queue.as_deref(), search.as_deref(), limit, cli.json)
                    .await?;
            }
        },

        Commands::Show { resource } => match resource {
            ShowResource::Job { queue, id } => {
                cli::queue::show_job(&state, &queue, &id, cli.json).await?;
            }
            ShowResource::Workflow { id } => {
                cli::workflow::show(&state, &id, cli.json).await?;
            }
            ShowResource::Instance { id } => {
                cli::workflow::show_instance(&state, &id, cli.json).await?;
            }
            ShowResource::Dlq { id } => {
                cli::dlq::show_entry(&state, &id, cli.json).await?;
            }
        },

        Commands::Trigger {
            trigger_type,
            payload,
            workspace,
        } => {
            cli::workflow::trigger(
                &state,
                &trigger_type,
                payload.as_deref(),
                workspace.as_deref(),
                cli.json,
            )
            .await?;
        }

        Commands::Run { id, payload } => {
            cli::workflow::run(&state, &id, payload.as_deref(), cli.json).await?;
        }

        Commands::Pause { queue } => {
            cli::queue::pause(&state, &queue, cli.json).await?;
        }

        Commands::Resume { queue } => {
            cli::queue::resume(&state, &queue, cli.json).await?;
        }

        Commands::Replay { ids } => {
            cli::dlq::replay(&state, &ids, cli.json).await?;
        }

        Commands::Purge { resource } => match resource {
            PurgeResource::Queue { queue, force } => {
                cli::queue::purge(&state, &queue, force, cli.json).await?;
            }
            PurgeResource::Dlq { queue, force } => {
                cli::dlq::purge(&state, queue.as_deref(), force, cli.json).await?;
            }
        },

        Commands::Status => {
            cli::status::status(&state, cli.json).await?;
        }

        Commands::Completions { .. } => unreachable!("handled above"),
    }

    pressroom_observe::tracing_setup::shutdown_tracing();
    Ok(())
}

/// Start the REST API server and queue worker pools.
async fn serve(state: AppState, host: &str, port: u16) -> anyhow::Result<()> {
    // Ensure an API key exists, print it if new
    let api_key = http::extractors::auth::ensure_api_key(&state).await?;
    if api_key.starts_with("prsm_") {
        println!();
        println!(
            "  {} API key generated (save this -- it won't be shown again):",
            console::style("🔑").bold()
        );
        println!();
        println!("  {}", console::style(&api_key).yellow().bold());
        println!();
    }

    let worker_handles = state.spawn_workers().await?;
    tracing::info!(tasks = worker_handles.len(), "worker pools started");

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    println!(
        "  {} Pressroom API listening on {}",
        console::style("⚡").bold(),
        console::style(format!("http://{addr}")).cyan()
    );
    println!("  {}", console::style("Press Ctrl+C to stop").dim());

    let cancel = state.cancel.clone();
    let router = http::router::build_router(state);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop workers and sweepers, then wait for in-flight jobs to settle.
    cancel.cancel();
    for handle in worker_handles {
        let _ = handle.await;
    }

    println!("\n  Server stopped.");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
