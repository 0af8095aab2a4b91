//! SQLite workflow repository implementation.
//!
//! Definitions are stored as a JSON document per version with denormalized
//! columns for lookups. Trigger subscriptions are mirrored into the
//! `workflow_triggers` table in the same transaction so dispatch can match
//! on an indexed exact-type column instead of scanning definition JSON.

use pressroom_core::repository::WorkflowRepository;
use pressroom_types::error::RepositoryError;
use pressroom_types::workflow::{
    InstanceStatus, StepExecStatus, WorkflowDefinition, WorkflowInstance, WorkflowStepExecution,
};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, parse_uuid, query_err};

/// SQLite-backed implementation of `WorkflowRepository`.
pub struct SqliteWorkflowRepository {
    pool: DatabasePool,
}

impl SqliteWorkflowRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Row mapping helpers
// ---------------------------------------------------------------------------

fn definition_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<WorkflowDefinition, RepositoryError> {
    let doc: String = row.try_get("definition").map_err(query_err)?;
    let mut def: WorkflowDefinition = serde_json::from_str(&doc)
        .map_err(|e| RepositoryError::Query(format!("invalid definition JSON: {e}")))?;
    // The column is the activation source of truth: deactivation flips it
    // without rewriting the stored document.
    let is_active: i64 = row.try_get("is_active").map_err(query_err)?;
    def.is_active = is_active != 0;
    Ok(def)
}

fn instance_status_str(status: InstanceStatus) -> &'static str {
    match status {
        InstanceStatus::Running => "running",
        InstanceStatus::Completed => "completed",
        InstanceStatus::Failed => "failed",
        InstanceStatus::Rollback => "rollback",
    }
}

fn parse_instance_status(s: &str) -> Result<InstanceStatus, RepositoryError> {
    match s {
        "running" => Ok(InstanceStatus::Running),
        "completed" => Ok(InstanceStatus::Completed),
        "failed" => Ok(InstanceStatus::Failed),
        "rollback" => Ok(InstanceStatus::Rollback),
        other => Err(RepositoryError::Query(format!(
            "invalid instance status: {other}"
        ))),
    }
}

fn exec_status_str(status: StepExecStatus) -> &'static str {
    match status {
        StepExecStatus::Running => "running",
        StepExecStatus::Completed => "completed",
        StepExecStatus::Skipped => "skipped",
        StepExecStatus::Failed => "failed",
    }
}

fn parse_exec_status(s: &str) -> Result<StepExecStatus, RepositoryError> {
    match s {
        "running" => Ok(StepExecStatus::Running),
        "completed" => Ok(StepExecStatus::Completed),
        "skipped" => Ok(StepExecStatus::Skipped),
        "failed" => Ok(StepExecStatus::Failed),
        other => Err(RepositoryError::Query(format!(
            "invalid step execution status: {other}"
        ))),
    }
}

fn instance_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<WorkflowInstance, RepositoryError> {
    let id: String = row.try_get("id").map_err(query_err)?;
    let workflow_id: String = row.try_get("workflow_id").map_err(query_err)?;
    let context_json: String = row.try_get("context").map_err(query_err)?;
    let status: String = row.try_get("status").map_err(query_err)?;
    let started_at: String = row.try_get("started_at").map_err(query_err)?;
    let completed_at: Option<String> = row.try_get("completed_at").map_err(query_err)?;
    let current_step: i64 = row.try_get("current_step").map_err(query_err)?;

    Ok(WorkflowInstance {
        id: parse_uuid(&id)?,
        workflow_id: parse_uuid(&workflow_id)?,
        workflow_key: row.try_get("workflow_key").map_err(query_err)?,
        context: serde_json::from_str(&context_json)
            .map_err(|e| RepositoryError::Query(format!("invalid context JSON: {e}")))?,
        current_step: current_step as u32,
        status: parse_instance_status(&status)?,
        started_at: parse_datetime(&started_at)?,
        completed_at: completed_at.as_deref().map(parse_datetime).transpose()?,
    })
}

fn execution_from_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<WorkflowStepExecution, RepositoryError> {
    let id: String = row.try_get("id").map_err(query_err)?;
    let instance_id: String = row.try_get("instance_id").map_err(query_err)?;
    let input_json: String = row.try_get("input").map_err(query_err)?;
    let output_json: Option<String> = row.try_get("output").map_err(query_err)?;
    let status: String = row.try_get("status").map_err(query_err)?;
    let attempts: i64 = row.try_get("attempts").map_err(query_err)?;
    let started_at: String = row.try_get("started_at").map_err(query_err)?;
    let finished_at: Option<String> = row.try_get("finished_at").map_err(query_err)?;

    Ok(WorkflowStepExecution {
        id: parse_uuid(&id)?,
        instance_id: parse_uuid(&instance_id)?,
        step_key: row.try_get("step_key").map_err(query_err)?,
        input: serde_json::from_str(&input_json)
            .map_err(|e| RepositoryError::Query(format!("invalid input JSON: {e}")))?,
        status: parse_exec_status(&status)?,
        output: output_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| RepositoryError::Query(format!("invalid output JSON: {e}")))?,
        error: row.try_get("error").map_err(query_err)?,
        attempts: attempts as u32,
        started_at: parse_datetime(&started_at)?,
        finished_at: finished_at.as_deref().map(parse_datetime).transpose()?,
    })
}

// ---------------------------------------------------------------------------
// WorkflowRepository impl
// ---------------------------------------------------------------------------

impl WorkflowRepository for SqliteWorkflowRepository {
    async fn save_definition(&self, def: &WorkflowDefinition) -> Result<(), RepositoryError> {
        let doc = serde_json::to_string(def)
            .map_err(|e| RepositoryError::Query(format!("serialize definition: {e}")))?;

        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        if def.is_active {
            sqlx::query("UPDATE workflows SET is_active = 0 WHERE key = ?")
                .bind(&def.key)
                .execute(&mut *tx)
                .await
                .map_err(query_err)?;
        }

        sqlx::query(
            "INSERT INTO workflows (id, key, version, is_active, definition, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(def.id.to_string())
        .bind(&def.key)
        .bind(def.version as i64)
        .bind(def.is_active as i64)
        .bind(&doc)
        .bind(format_datetime(&def.created_at))
        .execute(&mut *tx)
        .await
        .map_err(query_err)?;

        for trigger in &def.triggers {
            sqlx::query(
                "INSERT OR IGNORE INTO workflow_triggers (workflow_id, trigger_type) VALUES (?, ?)",
            )
            .bind(def.id.to_string())
            .bind(&trigger.trigger_type)
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;
        }

        tx.commit().await.map_err(query_err)?;
        Ok(())
    }

    async fn get_definition(
        &self,
        id: &Uuid,
    ) -> Result<Option<WorkflowDefinition>, RepositoryError> {
        let row = sqlx::query("SELECT definition, is_active FROM workflows WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;
        row.as_ref().map(definition_from_row).transpose()
    }

    async fn get_active_definition(
        &self,
        key: &str,
    ) -> Result<Option<WorkflowDefinition>, RepositoryError> {
        let row =
            sqlx::query("SELECT definition, is_active FROM workflows WHERE key = ? AND is_active = 1")
            .bind(key)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;
        row.as_ref().map(definition_from_row).transpose()
    }

    async fn latest_version(&self, key: &str) -> Result<Option<u32>, RepositoryError> {
        let row: (Option<i64>,) =
            sqlx::query_as("SELECT MAX(version) FROM workflows WHERE key = ?")
                .bind(key)
                .fetch_one(&self.pool.reader)
                .await
                .map_err(query_err)?;
        Ok(row.0.map(|v| v as u32))
    }

    async fn list_definitions(
        &self,
        active_only: bool,
    ) -> Result<Vec<WorkflowDefinition>, RepositoryError> {
        let sql = if active_only {
            "SELECT definition, is_active FROM workflows WHERE is_active = 1 \
             ORDER BY key, version DESC"
        } else {
            "SELECT definition, is_active FROM workflows ORDER BY key, version DESC"
        };
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_err)?;
        rows.iter().map(definition_from_row).collect()
    }

    async fn find_by_trigger(
        &self,
        trigger_type: &str,
    ) -> Result<Vec<WorkflowDefinition>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT w.definition, w.is_active FROM workflows w \
             JOIN workflow_triggers t ON t.workflow_id = w.id \
             WHERE t.trigger_type = ? AND w.is_active = 1 \
             ORDER BY w.key",
        )
        .bind(trigger_type)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;
        rows.iter().map(definition_from_row).collect()
    }

    async fn deactivate_definition(&self, id: &Uuid) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE workflows SET is_active = 0 WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(query_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_instance(&self, instance: &WorkflowInstance) -> Result<(), RepositoryError> {
        let context_json = serde_json::to_string(&instance.context)
            .map_err(|e| RepositoryError::Query(format!("serialize context: {e}")))?;

        sqlx::query(
            "INSERT INTO workflow_instances \
             (id, workflow_id, workflow_key, context, current_step, status, started_at, completed_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(instance.id.to_string())
        .bind(instance.workflow_id.to_string())
        .bind(&instance.workflow_key)
        .bind(&context_json)
        .bind(instance.current_step as i64)
        .bind(instance_status_str(instance.status))
        .bind(format_datetime(&instance.started_at))
        .bind(instance.completed_at.as_ref().map(format_datetime))
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;
        Ok(())
    }

    async fn get_instance(&self, id: &Uuid) -> Result<Option<WorkflowInstance>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM workflow_instances WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;
        row.as_ref().map(instance_from_row).transpose()
    }

    async fn update_instance(&self, instance: &WorkflowInstance) -> Result<(), RepositoryError> {
        let context_json = serde_json::to_string(&instance.context)
            .map_err(|e| RepositoryError::Query(format!("serialize context: {e}")))?;

        sqlx::query(
            "UPDATE workflow_instances SET context = ?, current_step = ?, status = ?, \
             completed_at = ? WHERE id = ?",
        )
        .bind(&context_json)
        .bind(instance.current_step as i64)
        .bind(instance_status_str(instance.status))
        .bind(instance.completed_at.as_ref().map(format_datetime))
        .bind(instance.id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;
        Ok(())
    }

    async fn list_instances(
        &self,
        workflow_key: Option<&str>,
        status: Option<InstanceStatus>,
        limit: u32,
    ) -> Result<Vec<WorkflowInstance>, RepositoryError> {
        let mut clauses = vec!["1 = 1"];
        let mut binds: Vec<String> = Vec::new();
        if let Some(key) = workflow_key {
            clauses.push("workflow_key = ?");
            binds.push(key.to_string());
        }
        if let Some(status) = status {
            clauses.push("status = ?");
            binds.push(instance_status_str(status).to_string());
        }
        let sql = format!(
            "SELECT * FROM workflow_instances WHERE {} ORDER BY started_at DESC LIMIT ?",
            clauses.join(" AND ")
        );
        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = query.bind(bind);
        }
        let rows = query
            .bind(limit as i64)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_err)?;
        rows.iter().map(instance_from_row).collect()
    }

    async fn insert_step_execution(
        &self,
        exec: &WorkflowStepExecution,
    ) -> Result<(), RepositoryError> {
        let input_json = serde_json::to_string(&exec.input)
            .map_err(|e| RepositoryError::Query(format!("serialize input: {e}")))?;
        let output_json = exec
            .output
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| RepositoryError::Query(format!("serialize output: {e}")))?;

        sqlx::query(
            "INSERT INTO workflow_step_executions \
             (id, instance_id, step_key, input, status, output, error, attempts, started_at, finished_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(exec.id.to_string())
        .bind(exec.instance_id.to_string())
        .bind(&exec.step_key)
        .bind(&input_json)
        .bind(exec_status_str(exec.status))
        .bind(output_json)
        .bind(&exec.error)
        .bind(exec.attempts as i64)
        .bind(format_datetime(&exec.started_at))
        .bind(exec.finished_at.as_ref().map(format_datetime))
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;
        Ok(())
    }

    async fn update_step_execution(
        &self,
        exec: &WorkflowStepExecution,
    ) -> Result<(), RepositoryError> {
        let output_json = exec
            .output
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| RepositoryError::Query(format!("serialize output: {e}")))?;

        sqlx::query(
            "UPDATE workflow_step_executions SET status = ?, output = ?, error = ?, \
             attempts = ?, finished_at = ? WHERE id = ?",
        )
        .bind(exec_status_str(exec.status))
        .bind(output_json)
        .bind(&exec.error)
        .bind(exec.attempts as i64)
        .bind(exec.finished_at.as_ref().map(format_datetime))
        .bind(exec.id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;
        Ok(())
    }

    async fn list_step_executions(
        &self,
        instance_id: &Uuid,
    ) -> Result<Vec<WorkflowStepExecution>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM workflow_step_executions WHERE instance_id = ? \
             ORDER BY started_at ASC",
        )
        .bind(instance_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;
        rows.iter().map(execution_from_row).collect()
    }
}
