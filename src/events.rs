//! Workflow events — the records handed to the notification bus and the
//! audit log on every committed operation. One operation emits one record,
//! except decree which fans out one per targeted department.

use crate::types::Stage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What happened, with the operation-specific payload inline.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// A document entered its first stage.
    WorkflowStarted { stage: Stage },
    StageAdvanced { from: Stage, to: Stage },
    /// Distinct from StageAdvanced: carries the mandatory skip reason.
    StageSkipped {
        from: Stage,
        to: Stage,
        reason: String,
    },
    /// Annotation-only update of the current stage instance.
    StageUpdated { due_at: Option<DateTime<Utc>> },
    /// One per targeted department of a decree fan-out.
    DocumentDecreed {
        department_id: Uuid,
        due_at: DateTime<Utc>,
    },
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::WorkflowStarted { .. } => "WORKFLOW_STARTED",
            EventKind::StageAdvanced { .. } => "STAGE_ADVANCED",
            EventKind::StageSkipped { .. } => "STAGE_SKIPPED",
            EventKind::StageUpdated { .. } => "STAGE_UPDATED",
            EventKind::DocumentDecreed { .. } => "DOCUMENT_DECREED",
        }
    }
}

/// The envelope delivered to every sink: `{kind, documentId, actorId,
/// timestamp, payload}` with the payload folded into `kind`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: Uuid,
    pub document_id: Uuid,
    pub actor_id: Uuid,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl EventRecord {
    pub fn new(document_id: Uuid, actor_id: Uuid, at: DateTime<Utc>, kind: EventKind) -> Self {
        Self {
            id: Uuid::now_v7(),
            document_id,
            actor_id,
            at,
            kind,
        }
    }
}
