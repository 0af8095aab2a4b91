//! Application state wiring all services together.
//!
//! AppState holds the concrete service instances used by both CLI and REST
//! API. Services are generic over repository traits, but AppState pins them
//! to the SQLite infra implementations.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use pressroom_core::dlq::DlqService;
use pressroom_core::event::EventBus;
use pressroom_core::monitor::QueueMonitor;
use pressroom_core::queue::service::QueueDefaults;
use pressroom_core::queue::{QueueService, QueueWorkers, SchemaRegistry, WorkerConfig};
use pressroom_core::queue::worker::spawn_retention_sweeper;
use pressroom_core::registry::{BoxStepHandler, ProcessorMap};
use pressroom_core::workflow::{
    register_engine_schemas, DefinitionService, DispatchProcessor, StepProcessor,
    TriggerDispatcher, WorkflowRunner, JOB_DISPATCH, JOB_STEP, WORKFLOW_QUEUE,
};
use pressroom_infra::config::{data_dir, load_config};
use pressroom_infra::handlers::{build_step_registry, DispatchHandler, NotifyHandler};
use pressroom_infra::sqlite::{
    DatabasePool, SqliteDlqRepository, SqliteJobRepository, SqliteWorkflowRepository,
};
use pressroom_types::config::PressroomConfig;

use crate::jobs::{self, HandlerJobProcessor, JOB_NOTIFY_BROADCAST, JOB_WEBHOOK_DELIVER};

/// Concrete type aliases for the service generics pinned to infra implementations.
pub type ConcreteQueueService = QueueService<SqliteJobRepository>;
pub type ConcreteDlqService = DlqService<SqliteDlqRepository, SqliteJobRepository>;
pub type ConcreteDefinitionService = DefinitionService<SqliteWorkflowRepository>;
pub type ConcreteDispatcher = TriggerDispatcher<SqliteWorkflowRepository, SqliteJobRepository>;
pub type ConcreteRunner = WorkflowRunner<SqliteWorkflowRepository, SqliteJobRepository>;

/// Shared application state holding all services.
///
/// Used by both CLI commands and REST API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: PressroomConfig,
    pub data_dir: PathBuf,
    pub db_pool: DatabasePool,
    pub bus: EventBus,
    pub schemas: Arc<SchemaRegistry>,
    pub queue_service: Arc<ConcreteQueueService>,
    pub dlq_service: Arc<ConcreteDlqService>,
    pub definitions: Arc<ConcreteDefinitionService>,
    pub dispatcher: Arc<ConcreteDispatcher>,
    pub runner: Arc<ConcreteRunner>,
    pub monitor: Arc<QueueMonitor>,
    pub notifications: NotifyHandler,
    pub processors: ProcessorMap,
    pub cancel: CancellationToken,
}

impl AppState {
    /// Initialize the application state: connect to DB, wire services.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = data_dir();
        tokio::fs::create_dir_all(&data_dir).await?;

        let config = load_config(&data_dir).await;

        let db_url = format!(
            "sqlite://{}?mode=rwc",
            data_dir.join("pressroom.db").display()
        );
        let db_pool = DatabasePool::new(&db_url).await?;

        let bus = EventBus::new(config.event_capacity);
        let cancel = CancellationToken::new();

        // Every job name the daemon accepts, engine and built-ins alike.
        let schemas = Arc::new(jobs::register_builtin_schemas(register_engine_schemas(
            SchemaRegistry::new(),
        )));

        let jobs_repo = Arc::new(SqliteJobRepository::new(db_pool.clone()));
        let dlq_repo = Arc::new(SqliteDlqRepository::new(db_pool.clone()));
        let workflow_repo = Arc::new(SqliteWorkflowRepository::new(db_pool.clone()));

        let monitor = QueueMonitor::spawn(bus.clone(), cancel.clone());
        let queue_service = Arc::new(
            QueueService::new(
                jobs_repo.clone(),
                schemas.clone(),
                bus.clone(),
                QueueDefaults {
                    default_attempts: config.default_job_attempts,
                    stats_ttl: Duration::from_secs(config.stats_ttl_secs),
                },
            )
            .with_monitor(monitor.clone()),
        );
        let dlq_service = Arc::new(DlqService::new(
            dlq_repo,
            jobs_repo,
            bus.clone(),
            config.max_replays,
        ));

        let dispatch_secret = std::env::var("PRESSROOM_DISPATCH_SECRET").ok();
        let notifications = NotifyHandler::new(config.event_capacity);
        let step_registry = Arc::new(build_step_registry(
            notifications.clone(),
            data_dir.join("search-index"),
            dispatch_secret.clone(),
        ));

        let runner = Arc::new(WorkflowRunner::new(
            workflow_repo.clone(),
            queue_service.clone(),
            step_registry,
            bus.clone(),
        ));
        let dispatcher = Arc::new(TriggerDispatcher::new(
            workflow_repo.clone(),
            queue_service.clone(),
        ));
        let definitions = Arc::new(DefinitionService::new(workflow_repo));

        let processors = ProcessorMap::new()
            .register(JOB_DISPATCH, DispatchProcessor::new(runner.clone()))
            .register(JOB_STEP, StepProcessor::new(runner.clone()))
            .register(
                JOB_WEBHOOK_DELIVER,
                HandlerJobProcessor::new(BoxStepHandler::new(DispatchHandler::new(
                    dispatch_secret,
                ))),
            )
            .register(
                JOB_NOTIFY_BROADCAST,
                HandlerJobProcessor::new(BoxStepHandler::new(notifications.clone())),
            );

        Ok(Self {
            config,
            data_dir,
            db_pool,
            bus,
            schemas,
            queue_service,
            dlq_service,
            definitions,
            dispatcher,
            runner,
            monitor,
            notifications,
            processors,
            cancel,
        })
    }

    /// Spawn worker pools and background sweepers for `serve`.
    ///
    /// Covers the workflow engine queue plus every queue that already holds
    /// jobs. Queues first seen after startup are admin-visible but get no
    /// workers until the daemon restarts.
    pub async fn spawn_workers(&self) -> anyhow::Result<Vec<JoinHandle<()>>> {
        let worker_config = WorkerConfig {
            workers: self.config.workers_per_queue,
            poll_interval: Duration::from_millis(self.config.poll_interval_ms),
            stall_timeout: Duration::from_secs(self.config.stall_timeout_secs),
        };

        let mut queues = self.queue_service.list_queues().await?;
        if !queues.iter().any(|q| q == WORKFLOW_QUEUE) {
            queues.push(WORKFLOW_QUEUE.to_string());
        }

        let mut handles = Vec::new();
        for queue in queues {
            tracing::info!(queue = %queue, workers = worker_config.workers, "starting workers");
            let workers = QueueWorkers::new(
                queue,
                self.queue_service.clone(),
                self.dlq_service.clone(),
                self.processors.clone(),
                worker_config.clone(),
                self.cancel.clone(),
            );
            handles.extend(workers.spawn());
        }

        handles.push(spawn_retention_sweeper(
            self.queue_service.clone(),
            Duration::from_secs(self.config.completed_retention_hours * 3600),
            self.cancel.clone(),
        ));

        Ok(handles)
    }
}
