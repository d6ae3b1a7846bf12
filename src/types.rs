use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

// ─── Direction ────────────────────────────────────────────────

/// Whether a document entered the ministry or is being produced by it.
/// Fixed at intake; selects which stage sequence applies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "OUT")]
    Out,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::In => write!(f, "IN"),
            Direction::Out => write!(f, "OUT"),
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = crate::error::WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN" => Ok(Direction::In),
            "OUT" => Ok(Direction::Out),
            _ => Err(crate::error::WorkflowError::InvalidDirection),
        }
    }
}

// ─── Stage ────────────────────────────────────────────────────

/// Union of the stage names of both sequences. Membership in a given
/// direction's sequence is decided by the catalog, not by this enum.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Pending,
    ManualEntry,
    Received,
    Registration,
    Distribution,
    Analysis,
    DraftResponse,
    Review,
    SignatureProtocol,
    Acknowledgment,
    Archived,
    Draft,
    Revision,
    PrintedSent,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Pending => "PENDING",
            Stage::ManualEntry => "MANUAL_ENTRY",
            Stage::Received => "RECEIVED",
            Stage::Registration => "REGISTRATION",
            Stage::Distribution => "DISTRIBUTION",
            Stage::Analysis => "ANALYSIS",
            Stage::DraftResponse => "DRAFT_RESPONSE",
            Stage::Review => "REVIEW",
            Stage::SignatureProtocol => "SIGNATURE_PROTOCOL",
            Stage::Acknowledgment => "ACKNOWLEDGMENT",
            Stage::Archived => "ARCHIVED",
            Stage::Draft => "DRAFT",
            Stage::Revision => "REVISION",
            Stage::PrintedSent => "PRINTED_SENT",
        };
        write!(f, "{name}")
    }
}

impl Stage {
    /// All stage names, for lookup by wire name.
    const ALL: &'static [Stage] = &[
        Stage::Pending,
        Stage::ManualEntry,
        Stage::Received,
        Stage::Registration,
        Stage::Distribution,
        Stage::Analysis,
        Stage::DraftResponse,
        Stage::Review,
        Stage::SignatureProtocol,
        Stage::Acknowledgment,
        Stage::Archived,
        Stage::Draft,
        Stage::Revision,
        Stage::PrintedSent,
    ];
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .iter()
            .find(|stage| stage.to_string() == s)
            .copied()
            .ok_or_else(|| format!("unknown stage name {s:?}"))
    }
}

// ─── Actor / roles ────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Minister,
    Staff,
}

/// The authenticated caller on whose behalf an operation runs.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

// ─── Document ─────────────────────────────────────────────────

/// A tracked document. `stage` is mutated exclusively by the workflow
/// engine; `current_instance` always points at the one open StageInstance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    /// Human-readable correlative number assigned at intake.
    pub correlative_number: String,
    pub direction: Direction,
    pub stage: Stage,
    /// Explicit FK to the open StageInstance for this document.
    pub current_instance: Uuid,
    /// Weak reference to the case file grouping this document, if any.
    pub expediente_id: Option<Uuid>,
    /// Optimistic-concurrency counter, bumped on every committed transition.
    pub version: u64,
    pub created_at: DateTime<Utc>,
}

// ─── StageInstance ────────────────────────────────────────────

/// Record of a document's occupancy of one stage. Immutable once
/// `completed_at` is set.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StageInstance {
    pub id: Uuid,
    pub document_id: Uuid,
    pub stage: Stage,
    /// Ordinal within the document's history. Keeps stage order stable even
    /// when consecutive instances share a coarse-resolution timestamp.
    pub sequence: u32,
    pub entered_at: DateTime<Utc>,
    pub due_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Ordered weak references into the file store.
    pub attachment_ids: Vec<Uuid>,
    pub skipped: bool,
    /// Present iff `skipped`.
    pub skip_reason: Option<String>,
}

impl StageInstance {
    /// Fresh open instance for a document entering `stage`.
    pub fn open(document_id: Uuid, stage: Stage, sequence: u32, entered_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            document_id,
            stage,
            sequence,
            entered_at,
            due_at: None,
            completed_at: None,
            notes: None,
            metadata: BTreeMap::new(),
            attachment_ids: Vec::new(),
            skipped: false,
            skip_reason: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.completed_at.is_none()
    }

    pub fn state(&self) -> StageState {
        if self.skipped {
            StageState::Skipped
        } else if self.completed_at.is_some() {
            StageState::Completed
        } else {
            StageState::Open
        }
    }
}

/// Lifecycle state of a stage instance. Skipped instances also carry a
/// `completed_at`, so the check order matters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageState {
    Open,
    Completed,
    Skipped,
}

// ─── DecreeAssignment ─────────────────────────────────────────

/// One department's share of a decree fan-out. All assignments created by
/// the same decree call carry the same `due_at`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DecreeAssignment {
    pub id: Uuid,
    pub document_id: Uuid,
    pub department_id: Uuid,
    pub due_at: DateTime<Utc>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ─── Operation payloads ───────────────────────────────────────

/// Caller payload for `advance_stage`. Everything lands on the instance
/// being completed.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AdvanceRequest {
    pub notes: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub attachment_ids: Vec<Uuid>,
}

/// Caller payload for `update_stage` — annotation only, never a transition.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub custom_deadline: Option<String>,
    pub deadline_hours: Option<i64>,
    pub notes: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Caller payload for `decree`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DecreeRequest {
    pub department_ids: Vec<Uuid>,
    pub custom_deadline: Option<String>,
    pub deadline_hours: Option<i64>,
    pub notes: Option<String>,
}

// ─── Workflow status (read model) ─────────────────────────────

/// Progress summary for one document, in stage order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowStatus {
    pub document_id: Uuid,
    pub current_stage: Stage,
    pub completed: bool,
    pub total_stages: usize,
    pub completed_stages: usize,
    /// Rounded percentage of completed+skipped stages.
    pub progress: u8,
    pub stages: Vec<StageInstance>,
}
