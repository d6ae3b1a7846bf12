//! In-memory store: a tokio mutex around plain maps. The backing store for
//! tests and single-process deployments.

use crate::store::{DocumentStore, StageTransition, StoreError};
use crate::types::{DecreeAssignment, Document, StageInstance, StageState};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    documents: HashMap<Uuid, Document>,
    instances: HashMap<Uuid, StageInstance>,
    assignments: Vec<DecreeAssignment>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert_document(
        &self,
        document: &Document,
        first_instance: &StageInstance,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.documents.insert(document.id, document.clone());
        inner
            .instances
            .insert(first_instance.id, first_instance.clone());
        Ok(())
    }

    async fn load_document(&self, id: Uuid) -> Result<Option<Document>, StoreError> {
        Ok(self.inner.lock().await.documents.get(&id).cloned())
    }

    async fn load_instance(&self, id: Uuid) -> Result<Option<StageInstance>, StoreError> {
        Ok(self.inner.lock().await.instances.get(&id).cloned())
    }

    async fn instances_for(&self, document_id: Uuid) -> Result<Vec<StageInstance>, StoreError> {
        let inner = self.inner.lock().await;
        let mut out: Vec<StageInstance> = inner
            .instances
            .values()
            .filter(|i| i.document_id == document_id)
            .cloned()
            .collect();
        out.sort_by_key(|i| i.sequence);
        Ok(out)
    }

    async fn commit_transition(&self, txn: &StageTransition) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let doc = inner
            .documents
            .get_mut(&txn.document_id)
            .ok_or_else(|| anyhow::anyhow!("document {} not stored", txn.document_id))?;
        if doc.version != txn.expected_version {
            return Err(StoreError::Conflict {
                document_id: txn.document_id,
            });
        }
        doc.stage = txn.new_stage;
        doc.current_instance = txn.opened.id;
        doc.version += 1;
        inner.instances.insert(txn.closed.id, txn.closed.clone());
        inner.instances.insert(txn.opened.id, txn.opened.clone());
        Ok(())
    }

    async fn update_current_instance(
        &self,
        document_id: Uuid,
        expected_version: u64,
        instance: &StageInstance,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let doc = inner
            .documents
            .get_mut(&document_id)
            .ok_or_else(|| anyhow::anyhow!("document {document_id} not stored"))?;
        if doc.version != expected_version {
            return Err(StoreError::Conflict { document_id });
        }
        doc.version += 1;
        inner.instances.insert(instance.id, instance.clone());
        Ok(())
    }

    async fn overdue_instances(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<StageInstance>, StoreError> {
        let inner = self.inner.lock().await;
        let mut out: Vec<StageInstance> = inner
            .instances
            .values()
            .filter(|i| i.is_open() && i.due_at.is_some_and(|due| due < now))
            .cloned()
            .collect();
        out.sort_by_key(|i| i.due_at);
        Ok(out)
    }

    async fn instances_in_state(
        &self,
        state: StageState,
    ) -> Result<Vec<StageInstance>, StoreError> {
        let inner = self.inner.lock().await;
        let mut out: Vec<StageInstance> = inner
            .instances
            .values()
            .filter(|i| i.state() == state)
            .cloned()
            .collect();
        out.sort_by_key(|i| (i.document_id, i.sequence));
        Ok(out)
    }

    async fn insert_assignments(
        &self,
        assignments: &[DecreeAssignment],
    ) -> Result<(), StoreError> {
        self.inner
            .lock()
            .await
            .assignments
            .extend_from_slice(assignments);
        Ok(())
    }

    async fn assignments_for(
        &self,
        document_id: Uuid,
    ) -> Result<Vec<DecreeAssignment>, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .assignments
            .iter()
            .filter(|a| a.document_id == document_id)
            .cloned()
            .collect())
    }
}
