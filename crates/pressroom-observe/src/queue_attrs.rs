//! OpenTelemetry Messaging Semantic Convention attribute constants.
//!
//! These follow the OTel messaging semantic conventions for consistent job
//! queue instrumentation across the codebase. All constants are string
//! slices usable in `tracing::span!` and `tracing::info_span!` field names.
//!
//! Span naming convention: `"{operation} {queue}"` (e.g., `"process publishing"`).

// --- Required attributes ---

/// The messaging operation being performed (e.g., "publish", "process").
pub const MESSAGING_OPERATION_NAME: &str = "messaging.operation.name";

/// The messaging system identifier.
pub const MESSAGING_SYSTEM: &str = "messaging.system";

// --- Recommended attributes ---

/// The queue the job belongs to.
pub const MESSAGING_DESTINATION_NAME: &str = "messaging.destination.name";

/// The job's unique identifier.
pub const MESSAGING_MESSAGE_ID: &str = "messaging.message.id";

/// Delivery attempt number, starting at 1.
pub const MESSAGING_DELIVERY_ATTEMPT: &str = "messaging.delivery.attempt";

// --- Pressroom-specific attributes ---

/// The registered job name (e.g., "article.publish").
pub const PRESSROOM_JOB_NAME: &str = "pressroom.job.name";

/// The workflow instance a step job belongs to.
pub const PRESSROOM_INSTANCE_ID: &str = "pressroom.workflow.instance_id";

/// The step key being executed.
pub const PRESSROOM_STEP_KEY: &str = "pressroom.workflow.step_key";

// --- Operation name values ---

/// Enqueue a job.
pub const OP_PUBLISH: &str = "publish";

/// Claim and process a job.
pub const OP_PROCESS: &str = "process";

/// Replay a dead-lettered job.
pub const OP_REPLAY: &str = "replay";

// --- System name values ---

/// Pressroom's embedded SQLite-backed queue.
pub const SYSTEM_PRESSROOM: &str = "pressroom";
