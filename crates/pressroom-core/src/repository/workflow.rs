//! Workflow repository trait definition.
//!
//! Defines the storage interface for workflow definitions, instances, and
//! step execution logs. The infrastructure layer (pressroom-infra)
//! implements this trait with SQLite persistence.
//!
//! Uses native async fn in traits (Rust 2024 edition, no async_trait macro).

use pressroom_types::error::RepositoryError;
use pressroom_types::workflow::{
    InstanceStatus, WorkflowDefinition, WorkflowInstance, WorkflowStepExecution,
};
use uuid::Uuid;

/// Repository trait for workflow persistence.
///
/// Covers three entity families:
/// - **Definitions:** versioned, append-only workflow definitions.
/// - **Instances:** one triggered run of a definition version.
/// - **Step executions:** the per-step audit trail of an instance.
pub trait WorkflowRepository: Send + Sync {
    // -----------------------------------------------------------------------
    // Definitions
    // -----------------------------------------------------------------------

    /// Insert a new definition version and, when it is active, deactivate
    /// every other version of the same key in the same transaction.
    fn save_definition(
        &self,
        def: &WorkflowDefinition,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get a definition version by its UUID.
    fn get_definition(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<WorkflowDefinition>, RepositoryError>> + Send;

    /// Get the active version for a definition key, if any.
    fn get_active_definition(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<Option<WorkflowDefinition>, RepositoryError>> + Send;

    /// Highest version number saved for a key, if any version exists.
    fn latest_version(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<Option<u32>, RepositoryError>> + Send;

    /// List definitions, optionally restricted to active versions.
    fn list_definitions(
        &self,
        active_only: bool,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowDefinition>, RepositoryError>> + Send;

    /// Active definitions subscribed to an exact trigger type.
    fn find_by_trigger(
        &self,
        trigger_type: &str,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowDefinition>, RepositoryError>> + Send;

    /// Deactivate one definition version. Returns `true` if it existed.
    fn deactivate_definition(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Instances
    // -----------------------------------------------------------------------

    fn create_instance(
        &self,
        instance: &WorkflowInstance,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn get_instance(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<WorkflowInstance>, RepositoryError>> + Send;

    /// Persist the instance's context, cursor, and status.
    fn update_instance(
        &self,
        instance: &WorkflowInstance,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// List instances, newest first, optionally filtered.
    fn list_instances(
        &self,
        workflow_key: Option<&str>,
        status: Option<InstanceStatus>,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowInstance>, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Step executions
    // -----------------------------------------------------------------------

    fn insert_step_execution(
        &self,
        exec: &WorkflowStepExecution,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn update_step_execution(
        &self,
        exec: &WorkflowStepExecution,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// All executions for an instance, in start order.
    fn list_step_executions(
        &self,
        instance_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowStepExecution>, RepositoryError>> + Send;
}
