//! despacho-core — the workflow stage-progression engine of a ministerial
//! document-management system.
//!
//! A document is created with a fixed direction (incoming or outgoing) and
//! moves through that direction's ordered stage sequence, one
//! [`StageInstance`](types::StageInstance) per visited stage. The
//! [`WorkflowEngine`](engine::WorkflowEngine) owns every transition:
//!
//! - `advance_stage` — close the current stage, open the next
//! - `skip_stage` — admin-only skip with a mandatory justification
//! - `update_stage` — deadline/notes annotation, never a transition
//! - `decree` — fan a document out to departments with a shared deadline
//!
//! Transitions commit atomically through a pluggable [`store`], guarded by
//! an optimistic version check; committed operations emit events to the
//! [`dispatch`] bus (notifications, audit) on a best-effort basis.
//!
//! # Example
//!
//! ```no_run
//! use despacho_core::directory::StaticDirectory;
//! use despacho_core::dispatch::{AuditRecorder, EventBus};
//! use despacho_core::engine::WorkflowEngine;
//! use despacho_core::store_memory::MemoryStore;
//! use despacho_core::types::{Actor, AdvanceRequest, Direction, Role};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), despacho_core::error::WorkflowError> {
//! let bus = Arc::new(EventBus::new());
//! bus.subscribe(Arc::new(AuditRecorder::new())).await;
//! let engine = WorkflowEngine::new(
//!     Arc::new(MemoryStore::new()),
//!     bus,
//!     Arc::new(StaticDirectory::default()),
//! );
//!
//! let clerk = Actor::new(uuid::Uuid::now_v7(), Role::Staff);
//! let doc = engine
//!     .start_workflow(clerk, Direction::In, "ME-2026-0001".into(), None)
//!     .await?;
//! engine
//!     .advance_stage(doc.id, clerk, AdvanceRequest::default())
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod deadline;
pub mod directory;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod events;
pub mod store;
pub mod store_memory;
#[cfg(feature = "postgres")]
pub mod store_postgres;
pub mod types;

pub use engine::WorkflowEngine;
pub use error::WorkflowError;
pub use types::{
    Actor, AdvanceRequest, DecreeAssignment, DecreeRequest, Direction, Document, Role, Stage,
    StageInstance, StageState, UpdateRequest, WorkflowStatus,
};
