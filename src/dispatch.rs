//! Event dispatch: an explicit subscription registry the engine emits into.
//!
//! Delivery is fire-and-forget relative to the triggering request — the bus
//! spawns delivery tasks and a failing sink is logged, never propagated back
//! to the caller. Sinks are the notification/audit collaborators; what they
//! do with a record (WebSocket push, persisted notification row, email) is
//! entirely their concern.

use crate::events::EventRecord;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::warn;
use uuid::Uuid;

/// Handle returned by `EventBus::subscribe`, used to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct SubscriberId(u64);

/// A delivery target for workflow events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Short name for log lines.
    fn name(&self) -> &'static str;

    async fn deliver(&self, record: &EventRecord) -> Result<()>;
}

// ─── EventBus ─────────────────────────────────────────────────

#[derive(Default)]
pub struct EventBus {
    sinks: RwLock<BTreeMap<SubscriberId, Arc<dyn EventSink>>>,
    next_id: AtomicU64,
    inflight: Mutex<Vec<JoinHandle<()>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, sink: Arc<dyn EventSink>) -> SubscriberId {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.sinks.write().await.insert(id, sink);
        id
    }

    /// Returns true if the subscriber was registered.
    pub async fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.sinks.write().await.remove(&id).is_some()
    }

    /// Fan `record` out to every registered sink without blocking on
    /// delivery. Sink failures are logged at warn level.
    pub async fn emit(&self, record: EventRecord) {
        let sinks: Vec<Arc<dyn EventSink>> = self.sinks.read().await.values().cloned().collect();
        let mut inflight = self.inflight.lock().await;
        inflight.retain(|h| !h.is_finished());
        for sink in sinks {
            let record = record.clone();
            inflight.push(tokio::spawn(async move {
                if let Err(e) = sink.deliver(&record).await {
                    warn!(
                        sink = sink.name(),
                        event = record.kind.name(),
                        document_id = %record.document_id,
                        "event delivery failed: {e:#}"
                    );
                }
            }));
        }
    }

    /// Await all in-flight deliveries. Test and shutdown aid only.
    pub async fn drain(&self) {
        let handles: Vec<_> = self.inflight.lock().await.drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
    }
}

// ─── AuditRecorder ────────────────────────────────────────────

/// Append-only audit log. Entries are never mutated or deleted; queries are
/// keyed by document, actor, and timestamp range.
#[derive(Default)]
pub struct AuditRecorder {
    entries: RwLock<Vec<EventRecord>>,
}

impl AuditRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<EventRecord> {
        self.entries.read().await.clone()
    }

    pub async fn by_document(&self, document_id: Uuid) -> Vec<EventRecord> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|r| r.document_id == document_id)
            .cloned()
            .collect()
    }

    pub async fn by_actor(&self, actor_id: Uuid) -> Vec<EventRecord> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|r| r.actor_id == actor_id)
            .cloned()
            .collect()
    }

    pub async fn in_range(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<EventRecord> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|r| r.at >= from && r.at < to)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventSink for AuditRecorder {
    fn name(&self) -> &'static str {
        "audit"
    }

    async fn deliver(&self, record: &EventRecord) -> Result<()> {
        self.entries.write().await.push(record.clone());
        Ok(())
    }
}
