//! Axum router configuration with middleware.
//!
//! All routes are under `/api/v1/`.
//! Middleware: CORS, tracing.

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // Queues and jobs
        .route("/queues", get(handlers::queue::list_queues))
        .route("/queues/schemas", get(handlers::queue::job_schemas))
        .route("/queues/{queue}", get(handlers::queue::queue_stats))
        .route(
            "/queues/{queue}/jobs",
            get(handlers::queue::list_jobs).post(handlers::queue::enqueue_job),
        )
        .route("/queues/{queue}/jobs/{id}", get(handlers::queue::get_job))
        .route("/queues/{queue}/pause", post(handlers::queue::pause_queue))
        .route("/queues/{queue}/resume", post(handlers::queue::resume_queue))
        .route("/queues/{queue}/purge", post(handlers::queue::purge_queue))
        .route("/queues/{queue}/health", get(handlers::queue::queue_health))
        .route("/monitor", get(handlers::queue::all_health))
        // Dead-letter queue
        .route("/dlq", get(handlers::dlq::list_entries))
        .route("/dlq/replay", post(handlers::dlq::replay_many))
        .route("/dlq/delete", post(handlers::dlq::delete_many))
        .route("/dlq/purge", post(handlers::dlq::purge_entries))
        .route("/dlq/{id}", get(handlers::dlq::get_entry))
        .route("/dlq/{id}", delete(handlers::dlq::delete_entry))
        .route("/dlq/{id}/replay", post(handlers::dlq::replay_entry))
        // Workflow definitions
        .route(
            "/workflows",
            get(handlers::workflow::list_workflows).post(handlers::workflow::apply_workflow),
        )
        .route("/workflows/{id}", get(handlers::workflow::get_workflow))
        .route(
            "/workflows/{id}",
            delete(handlers::workflow::deactivate_workflow),
        )
        .route("/workflows/{id}/run", post(handlers::workflow::run_workflow))
        // Triggers and instances
        .route("/triggers", post(handlers::workflow::dispatch_trigger))
        .route("/instances", get(handlers::workflow::list_instances))
        .route("/instances/{id}", get(handlers::workflow::get_instance))
        .route(
            "/instances/{id}/steps",
            get(handlers::workflow::instance_steps),
        )
        // Dashboard stats
        .route("/stats", get(handlers::stats::get_stats));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(health_check))
        .route("/ws/events", get(handlers::ws::ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Simple health check endpoint (no auth required).
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
