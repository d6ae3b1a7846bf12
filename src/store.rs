//! Persistence boundary. The engine operates exclusively through this trait,
//! enabling pluggable backends (MemoryStore for tests and single-process
//! deployments, Postgres for production).

use crate::types::{DecreeAssignment, Document, Stage, StageInstance, StageState};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Store-level failures. `Conflict` is the optimistic-concurrency signal the
/// engine translates into `ConcurrentModification`.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("version conflict on document {document_id}")]
    Conflict { document_id: Uuid },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// One atomic stage transition: close the current instance, open the next,
/// move the document's stage pointer. A backend must persist all of it or
/// none of it, and must reject the commit when `expected_version` no longer
/// matches the stored document.
#[derive(Clone, Debug)]
pub struct StageTransition {
    pub document_id: Uuid,
    pub expected_version: u64,
    pub new_stage: Stage,
    /// The instance being closed, with `completed_at` (and skip fields) set.
    pub closed: StageInstance,
    /// The instance being opened for `new_stage`.
    pub opened: StageInstance,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    // ── Documents ──

    /// Persist a new document together with its first open instance.
    async fn insert_document(
        &self,
        document: &Document,
        first_instance: &StageInstance,
    ) -> Result<(), StoreError>;

    async fn load_document(&self, id: Uuid) -> Result<Option<Document>, StoreError>;

    // ── Stage instances ──

    async fn load_instance(&self, id: Uuid) -> Result<Option<StageInstance>, StoreError>;

    /// All instances for a document, ordered by `sequence`.
    async fn instances_for(&self, document_id: Uuid) -> Result<Vec<StageInstance>, StoreError>;

    /// Commit a full stage transition as one unit (see [`StageTransition`]).
    async fn commit_transition(&self, txn: &StageTransition) -> Result<(), StoreError>;

    /// Replace the current instance's annotations without moving the
    /// document's stage. Same version guard as `commit_transition`.
    async fn update_current_instance(
        &self,
        document_id: Uuid,
        expected_version: u64,
        instance: &StageInstance,
    ) -> Result<(), StoreError>;

    /// Open instances whose `due_at` has passed. Feeds the reminder sweep.
    async fn overdue_instances(&self, now: DateTime<Utc>)
        -> Result<Vec<StageInstance>, StoreError>;

    /// All instances in the given lifecycle state, across documents.
    async fn instances_in_state(&self, state: StageState)
        -> Result<Vec<StageInstance>, StoreError>;

    // ── Decree assignments ──

    async fn insert_assignments(&self, assignments: &[DecreeAssignment])
        -> Result<(), StoreError>;

    async fn assignments_for(
        &self,
        document_id: Uuid,
    ) -> Result<Vec<DecreeAssignment>, StoreError>;
}
