//! Dead-letter repository trait definition.

use pressroom_types::dlq::{DlqEntry, DlqFilter};
use pressroom_types::error::RepositoryError;
use uuid::Uuid;

/// Repository trait for dead-letter entry persistence.
///
/// Entries are unique per (original_queue, original_job_id); `upsert_entry`
/// replaces the failure details of an existing entry for the same job while
/// keeping the higher replay count.
pub trait DlqRepository: Send + Sync {
    /// Insert or update the entry for this queue/job pair. Returns the
    /// stored entry.
    fn upsert_entry(
        &self,
        entry: &DlqEntry,
    ) -> impl std::future::Future<Output = Result<DlqEntry, RepositoryError>> + Send;

    fn get_entry(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<DlqEntry>, RepositoryError>> + Send;

    /// List entries matching the filter, most recent failure first.
    fn list_entries(
        &self,
        filter: &DlqFilter,
        limit: u32,
        offset: u32,
    ) -> impl std::future::Future<Output = Result<Vec<DlqEntry>, RepositoryError>> + Send;

    /// Delete one entry. Returns `true` if it existed.
    fn delete_entry(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Delete all entries matching the filter. Returns the number removed.
    fn purge_entries(
        &self,
        filter: &DlqFilter,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;

    /// Number of entries originating from one queue.
    fn count_for_queue(
        &self,
        queue: &str,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;
}
